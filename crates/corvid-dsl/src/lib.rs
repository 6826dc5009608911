#![doc = include_str!("../README.md")]

//! Surface syntax for corvid protocol models.
//!
//! The [`parser`] turns `.vp` source text into the [`ast::Model`] consumed by
//! `corvid-ir`. Errors are reported as [`miette`] diagnostics pointing at the
//! offending source span.

pub mod ast;
pub mod errors;
pub mod parser;

pub use parser::parse;
