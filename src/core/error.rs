//! Error handling for panelrunner.
//!
//! The error system follows two principles:
//! 1. **Strongly-typed errors** for precise handling in code: every failure
//!    mode in the pipeline has its own [`QueryError`] variant.
//! 2. **Actionable messages**: errors that stem from an unresolvable
//!    reference carry a recovery hint (the known alternatives) rather than
//!    leaving the caller to guess.
//!
//! # Error categories
//!
//! - **Not found**: [`QueryError::DashboardFetch`], [`QueryError::NoPanels`],
//!   [`QueryError::PanelNotFound`]
//! - **Target extraction**: [`QueryError::NoQueryTargets`],
//!   [`QueryError::QueryIndexOutOfRange`], [`QueryError::MissingDatasource`],
//!   [`QueryError::QueryNotFound`]
//! - **Reference resolution**: [`QueryError::UnresolvedDatasourceVariable`],
//!   [`QueryError::DatasourceNotFound`], [`QueryError::DatasourceForbidden`],
//!   [`QueryError::DatasourceLookup`]
//! - **Dispatch**: [`QueryError::UnsupportedBackend`],
//!   [`QueryError::MathExpressionPanel`], [`QueryError::BackendExecution`]
//! - **Malformed input**: [`QueryError::InvalidPattern`],
//!   [`QueryError::InvalidTimeRange`], [`QueryError::MalformedDashboard`],
//!   [`QueryError::NoPanelIds`]
//! - **Cancellation**: [`QueryError::Cancelled`]
//!
//! All errors are data. Within a single-panel pipeline any error aborts that
//! pipeline; the batch orchestrator catches it at exactly one boundary and
//! records it in the per-panel error map, never aborting sibling panels.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = QueryError> = std::result::Result<T, E>;

/// All failure modes of the panel-query pipeline.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The dashboard document could not be fetched from its provider.
    ///
    /// Fetch failures are opaque to this crate; the provider's error is
    /// carried as the source.
    #[error("fetching dashboard '{uid}': {source}")]
    DashboardFetch {
        /// UID of the dashboard that could not be fetched
        uid: String,
        /// The provider's underlying error
        #[source]
        source: anyhow::Error,
    },

    /// The dashboard document has no `panels` sequence.
    #[error("dashboard has no panels")]
    NoPanels,

    /// No panel with the requested id exists in the dashboard, including
    /// panels nested one level inside row groupings.
    #[error("panel with ID {id} not found")]
    PanelNotFound {
        /// The panel id that was requested
        id: i64,
    },

    /// The panel exists but carries no query targets at all.
    #[error("panel has no query targets")]
    NoQueryTargets,

    /// The requested query index is outside the panel's target sequence.
    ///
    /// The message reports the valid range so the caller can retry without
    /// first listing the panel's queries.
    #[error(
        "query index {index} out of range (panel has {count} queries, valid range: 0-{})",
        .count.saturating_sub(1)
    )]
    QueryIndexOutOfRange {
        /// The requested zero-based query index
        index: usize,
        /// Number of targets the panel actually has
        count: usize,
    },

    /// Neither the target nor the panel carries a datasource reference.
    #[error("could not determine datasource for panel")]
    MissingDatasource,

    /// None of the known query-body fields held a non-empty query.
    #[error(
        "could not extract query from panel target (checked: expr, query, expression, rawSql, rawQuery)"
    )]
    QueryNotFound,

    /// A datasource UID was a template-variable reference that the resolved
    /// environment does not define.
    #[error(
        "datasource variable '{reference}' not found. Hint: use 'datasource_uid' and \
         'datasource_type' to override. Available {expected_type} datasources: [{}]",
        .available.join(", ")
    )]
    UnresolvedDatasourceVariable {
        /// The unresolved reference as written in the dashboard (e.g. `$ds`)
        reference: String,
        /// The datasource type expected by the panel, if known
        expected_type: String,
        /// Known datasources of the expected type, as a recovery hint
        available: Vec<String>,
    },

    /// Datasource lookup succeeded in reaching the provider but the UID is
    /// unknown to it.
    #[error("datasource '{uid}' not found. Available datasources: [{}]", .available.join(", "))]
    DatasourceNotFound {
        /// The datasource UID that was looked up
        uid: String,
        /// Known datasources, as a recovery hint
        available: Vec<String>,
    },

    /// The caller is not allowed to read the referenced datasource.
    #[error(
        "permission denied for datasource '{uid}'. Hint: provide both 'datasource_uid' and \
         'datasource_type' to override. Available datasources: [{}]",
        .available.join(", ")
    )]
    DatasourceForbidden {
        /// The datasource UID that was looked up
        uid: String,
        /// Known datasources, as a recovery hint
        available: Vec<String>,
    },

    /// Datasource lookup failed for a reason other than not-found/forbidden.
    #[error("fetching datasource '{uid}': {source}")]
    DatasourceLookup {
        /// The datasource UID that was looked up
        uid: String,
        /// The provider's underlying error
        #[source]
        source: anyhow::Error,
    },

    /// The datasource type has no execution adapter. Terminal; the message
    /// names the native tools to use directly instead of guessing a fallback.
    #[error(
        "datasource type '{datasource_type}' is not supported by run_panel_query; use the native \
         query tool (query_prometheus, query_loki_logs, query_clickhouse, query_cloudwatch) directly"
    )]
    UnsupportedBackend {
        /// The unrecognized datasource type string
        datasource_type: String,
    },

    /// The target is a server-side math expression over other queries, which
    /// cannot be executed as a single panel query.
    #[error(
        "math expression panels require executing multiple queries; use query_cloudwatch directly \
         for the underlying metrics"
    )]
    MathExpressionPanel,

    /// A selector carried a regular expression that does not compile.
    #[error("invalid regular expression '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Why it failed to compile
        reason: String,
    },

    /// A start/end time string could not be parsed.
    #[error("invalid time '{input}': {reason}")]
    InvalidTimeRange {
        /// The time string as supplied by the caller
        input: String,
        /// Why it could not be parsed
        reason: String,
    },

    /// The dashboard document does not have the expected shape.
    #[error("malformed dashboard: {reason}")]
    MalformedDashboard {
        /// What was wrong with the document
        reason: String,
    },

    /// A batch request carried no panel ids.
    #[error("panel_ids is required and must not be empty")]
    NoPanelIds,

    /// The backend adapter itself failed. Terminal for that one panel.
    #[error("executing query: {source}")]
    BackendExecution {
        /// The adapter's underlying error
        #[source]
        source: anyhow::Error,
    },

    /// The request was cancelled before this panel's query completed.
    #[error("query cancelled")]
    Cancelled,
}
