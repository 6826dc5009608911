#![doc = include_str!("../README.md")]

//! Corvid verification engine.
//!
//! This crate runs the attacker search over a compiled model: the honest
//! run, deduction to a fixed point, staged mutation for the active
//! attacker, query evaluation, and result reporting.

pub mod analysis;
pub mod attacker_state;
pub mod inject;
pub mod mutation_map;
pub mod pipeline;
pub mod query;
pub mod result;

pub use attacker_state::AttackerState;
pub use pipeline::{
    check, verify, verify_active, verify_model, verify_passive, PipelineError, PipelineOptions,
    WorthwhilePolicy,
};
pub use result::{QueryResult, QueryStatus, SearchStats, VerificationReport};
