//! # panelrunner
//!
//! Execute dashboard panel queries against heterogeneous observability
//! backends.
//!
//! A dashboard document stores its queries as templates: panel targets
//! reference template variables (`$job`, `${env}`, `[[cluster]]`) and
//! backend-specific temporal macros (`$__range`, `$__timeFilter(col)`)
//! that only make sense once a concrete time window and variable
//! environment are chosen. This crate resolves all of that and dispatches
//! the finished query to the right backend adapter:
//!
//! 1. Locate the panel and query target inside the dashboard JSON
//!    ([`dashboard`]).
//! 2. Build the variable environment from dashboard definitions, defaults,
//!    and caller overrides ([`dashboard::variables`]).
//! 3. Substitute variable references and expand the backend's macro
//!    dialect ([`template`], [`template::macros`]).
//! 4. Resolve the datasource, including variable-valued datasource UIDs
//!    and caller overrides ([`runner`]).
//! 5. Dispatch to the adapter for the datasource's canonical kind and
//!    shape the result ([`backend`]), attaching recovery hints when it
//!    comes back empty ([`hints`]).
//!
//! Backends are pluggable: the crate defines provider and adapter traits
//! in [`backend`] and never talks to the network itself.
//!
//! ## Modules
//!
//! - [`runner`]: the [`runner::PanelQueryRunner`] pipeline, single and batch
//! - [`dashboard`]: panel location, target extraction, variable resolution
//! - [`template`]: variable reference syntax and substitution
//! - [`backend`]: datasource kinds, result shapes, adapter traits
//! - [`selector`]: label matchers for filtering metrics results
//! - [`timerange`]: absolute and relative time expression parsing
//! - [`hints`]: empty-result recovery hints
//! - [`core`]: the error type shared across the crate

pub mod backend;
pub mod core;
pub mod dashboard;
pub mod hints;
pub mod runner;
pub mod selector;
pub mod template;
pub mod timerange;
mod value;

pub use crate::core::{QueryError, Result};
pub use runner::{
    BatchQueryResult, PanelQueryResult, PanelQueryRunner, RunPanelQueriesParams,
    RunPanelQueryParams,
};
pub use timerange::TimeRange;
