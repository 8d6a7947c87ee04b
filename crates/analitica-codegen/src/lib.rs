//! Template renderer.
//!
//! Fills the three target artifacts (data model, storage configuration,
//! reporting service) from the resolved entity graph and the classified
//! operations. Rendering is pure and total: the same resolved model always
//! produces byte-identical artifacts.

mod database;
mod models;
mod service;

use analitica_core::{Registry, Schema};

/// Generation options. The storage artifact is fixed boilerplate
/// parameterized only by the connection string.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:///./analitica.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Models,
    Database,
    Service,
}

impl ArtifactKind {
    pub fn file_name(self) -> &'static str {
        match self {
            ArtifactKind::Models => "models.py",
            ArtifactKind::Database => "database.py",
            ArtifactKind::Service => "main.py",
        }
    }
}

#[derive(Debug)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub body: String,
}

#[derive(Debug)]
pub struct Output {
    pub artifacts: Vec<Artifact>,
}

pub(crate) struct Context<'a> {
    pub schema: &'a Schema,
    pub registry: &'a Registry,
    pub config: &'a Config,
}

/// The template registry: one renderer per artifact kind, each an explicit
/// function of the resolved model rather than of ambient globals.
const TEMPLATES: &[(ArtifactKind, fn(&Context<'_>) -> String)] = &[
    (ArtifactKind::Models, models::render),
    (ArtifactKind::Database, database::render),
    (ArtifactKind::Service, service::render),
];

pub fn generate(schema: &Schema, registry: &Registry, config: &Config) -> Output {
    let context = Context {
        schema,
        registry,
        config,
    };

    Output {
        artifacts: TEMPLATES
            .iter()
            .map(|(kind, render)| Artifact {
                kind: *kind,
                body: render(&context),
            })
            .collect(),
    }
}
