use analitica_cli::gen;

use anyhow::Result;
use clap::Parser;

/// Generate the reporting service sources from `analitica.tx` and
/// `example.ana` in the current directory.
#[derive(Parser, Debug)]
#[clap(version, about)]
struct Cli {}

fn main() -> Result<()> {
    let _cli = Cli::parse();

    gen::exec(std::path::Path::new("."))
}
