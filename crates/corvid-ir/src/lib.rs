#![doc = include_str!("../README.md")]

//! Corvid symbolic model and lowering.
//!
//! This crate defines the term algebra (constants, primitives, equations),
//! the primitive rule table, equivalence and rewriting, the knowledge map,
//! per-principal state with its resolution rules, and the lowering pass from
//! the DSL AST into these structures.

pub mod knowledge_map;
pub mod lowering;
pub mod primitive;
pub mod principal_state;
#[cfg(any(test, feature = "proptest"))]
pub mod proptest_generators;
pub mod query;
pub mod resolve;
pub mod rewrite;
pub mod value;

pub use knowledge_map::KnowledgeMap;
pub use lowering::{lower, lower_with_source, CompiledModel, LoweringError, SpannedLoweringError};
pub use principal_state::PrincipalState;
pub use value::{Constant, Equation, Primitive, PrincipalId, Value};
