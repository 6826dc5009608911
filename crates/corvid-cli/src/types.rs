//! Shared types used across CLI commands.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// What `check` reports about a model that lowered cleanly.
#[derive(Debug, Serialize)]
pub(crate) struct ModelSummary {
    pub(crate) file: String,
    pub(crate) source_sha256: String,
    pub(crate) attacker: String,
    pub(crate) principals: Vec<String>,
    pub(crate) constants: usize,
    pub(crate) messages: usize,
    pub(crate) phases: usize,
    pub(crate) queries: Vec<String>,
}
