//! Core types shared across the crate.
//!
//! Currently this is the error type and the crate-wide [`Result`] alias.
//! Every fallible operation in the pipeline reports through [`QueryError`]
//! so that callers (and the batch orchestrator) see a single taxonomy.

pub mod error;

pub use error::{QueryError, Result};
