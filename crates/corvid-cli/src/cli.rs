//! CLI argument definitions: top-level `Cli` struct and `Commands` enum.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub(crate) const CLI_LONG_ABOUT: &str =
    "Symbolic verifier for cryptographic protocol models.\n\n\
    Typical use:\n  \
    1. corvid check my_protocol.vp\n  \
    2. corvid verify my_protocol.vp\n\n\
    Use --attacker to verify against a different attacker than the model declares.";

#[derive(Parser)]
#[command(name = "corvid")]
#[command(about = "Symbolic verifier for cryptographic protocol models")]
#[command(long_about = CLI_LONG_ABOUT)]
#[command(version)]
pub(crate) struct Cli {
    /// Log search progress at debug level (overridden by RUST_LOG)
    #[arg(long, short, global = true, default_value_t = false)]
    pub(crate) verbose: bool,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Verify every query of a model
    #[command(display_order = 10)]
    Verify {
        /// Path to the .vp model file
        file: PathBuf,

        /// Output format: text | json
        #[arg(long, default_value = "text")]
        format: String,

        /// Attacker to verify against: passive | active (default: as declared)
        #[arg(long)]
        attacker: Option<String>,

        /// Worker threads for the search (default: one per core)
        #[arg(long)]
        threads: Option<usize>,

        /// Nesting limit for value resolution
        #[arg(long, default_value_t = corvid_ir::resolve::DEFAULT_MAX_DEPTH)]
        max_depth: usize,

        /// Stage after which the search stops once the attacker learns nothing new
        #[arg(long, default_value_t = 5)]
        exhaustion_stage: usize,

        /// Analyse every mutation combination, not only the ones that change
        /// something since the previous combination
        #[arg(long, default_value_t = false)]
        exhaustive: bool,
    },

    /// Parse and sanity-check a model without verifying it
    #[command(display_order = 20)]
    Check {
        /// Path to the .vp model file
        file: PathBuf,

        /// Output format: text | json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Print the parsed syntax tree of a model as JSON
    #[command(display_order = 30)]
    Parse {
        /// Path to the .vp model file
        file: PathBuf,
    },
}
