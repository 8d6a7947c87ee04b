use analitica_codegen::Config;
use analitica_core::{Metamodel, RawModel, Registry, Schema};

use anyhow::Result;
use std::fs;
use std::path::Path;

pub const GRAMMAR_FILE: &str = "analitica.tx";
pub const MODEL_FILE: &str = "example.ana";

/// Run the full pipeline against `dir`: load the grammar and the model,
/// resolve, classify, render, then write the three artifacts.
///
/// Every artifact is rendered before any file is touched, so a failing run
/// leaves the directory exactly as it was.
pub fn exec(dir: &Path) -> Result<()> {
    let metamodel = Metamodel::from_file(dir.join(GRAMMAR_FILE))?;
    let raw = RawModel::from_file(&metamodel, dir.join(MODEL_FILE))?;

    let schema = Schema::from_decls(&raw.entities)?;
    let registry = Registry::build(&raw.operations, &schema)?;

    let output = analitica_codegen::generate(&schema, &registry, &Config::default());

    for artifact in &output.artifacts {
        let target = dir.join(artifact.kind.file_name());
        let tmp = dir.join(format!("{}.tmp", artifact.kind.file_name()));

        let written = fs::write(&tmp, &artifact.body).and_then(|()| fs::rename(&tmp, &target));
        if let Err(err) = written {
            // Don't leave a stray temporary behind.
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }

        println!("  {:>10}    {}", "writing", target.display());
    }

    Ok(())
}
