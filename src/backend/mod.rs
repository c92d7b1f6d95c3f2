//! Canonical datasource kinds, backend result shapes, and the trait
//! boundary to external collaborators.
//!
//! The dispatcher routes on a small fixed set of [`DatasourceKind`]s,
//! collapsing vendor-specific type strings (`grafana-clickhouse-datasource`)
//! and casing to one canonical short name. Execution itself happens behind
//! the adapter traits: this crate prepares the query and interprets
//! emptiness of the result, nothing more. The [`Backends`] table is the
//! explicit adapter mapping, built once by the caller and passed by
//! reference into the runner; there is no global registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::timerange::TimeRange;

/// Canonical datasource type, the routing key for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasourceKind {
    /// Metrics time-series store (range queries, duration macro dialect)
    Prometheus,
    /// Log store (range queries, no macro dialect)
    Loki,
    /// Columnar SQL store (epoch macro dialect)
    Clickhouse,
    /// Cloud metrics with structured multi-field targets
    Cloudwatch,
}

impl DatasourceKind {
    /// Collapse a raw datasource type string to its canonical kind.
    ///
    /// Matching is case-insensitive and substring-based so that vendor ids
    /// like `grafana-clickhouse-datasource` normalize without a lookup
    /// table. Unrecognized types yield `None`; the dispatcher turns that
    /// into an unsupported-backend error rather than guessing a fallback.
    pub fn normalize(raw: &str) -> Option<Self> {
        let lowered = raw.to_ascii_lowercase();
        if lowered.contains("prometheus") {
            Some(Self::Prometheus)
        } else if lowered.contains("loki") {
            Some(Self::Loki)
        } else if lowered.contains("clickhouse") {
            Some(Self::Clickhouse)
        } else if lowered.contains("cloudwatch") {
            Some(Self::Cloudwatch)
        } else {
            None
        }
    }

    /// The canonical short name.
    pub fn canonical_name(self) -> &'static str {
        match self {
            Self::Prometheus => "prometheus",
            Self::Loki => "loki",
            Self::Clickhouse => "clickhouse",
            Self::Cloudwatch => "cloudwatch",
        }
    }
}

impl fmt::Display for DatasourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// One sample of a time series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    /// Sample timestamp, Unix milliseconds
    pub timestamp_ms: i64,
    /// Sample value
    pub value: f64,
}

/// One series of a metrics result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Label set identifying the series
    pub labels: BTreeMap<String, String>,
    /// Ordered samples
    pub points: Vec<SamplePoint>,
}

/// One log line of a logs result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Entry timestamp, RFC 3339
    pub timestamp: String,
    /// The log line itself
    pub line: String,
    /// Stream labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// A column/row tabular result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableResult {
    /// Column names, in order
    pub columns: Vec<String>,
    /// Rows, one value per column
    pub rows: Vec<Vec<Value>>,
}

/// What a backend adapter returned, shaped per backend family. Opaque to
/// the pipeline except for [`BackendResult::is_empty`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BackendResult {
    /// Time-series matrix from a metrics range query
    Series(Vec<TimeSeries>),
    /// Ordered log entries from a log range query
    Logs(Vec<LogEntry>),
    /// Tabular result from a SQL query
    Table(TableResult),
    /// Generic multi-series structure from a structured-target query
    Raw(Value),
}

impl BackendResult {
    /// Whether the result carries no data at all. Absent/null values,
    /// zero-length sequences, and zero-row tables all count as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Series(series) => series.is_empty(),
            Self::Logs(entries) => entries.is_empty(),
            Self::Table(table) => table.rows.is_empty(),
            Self::Raw(value) => match value {
                Value::Null => true,
                Value::Array(items) => items.is_empty(),
                Value::Object(map) => map.is_empty(),
                _ => false,
            },
        }
    }
}

/// A datasource as reported by the datasource provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasourceInfo {
    /// Stable UID
    pub uid: String,
    /// Human-readable name
    pub name: String,
    /// Raw type string (not yet normalized)
    #[serde(rename = "type")]
    pub kind: String,
}

/// Why a datasource lookup failed, distinguishable by kind so the runner
/// can attach the right recovery hint.
#[derive(Debug, Error)]
pub enum DatasourceLookupError {
    /// The UID is unknown to the provider
    #[error("datasource '{uid}' not found")]
    NotFound {
        /// The UID that was looked up
        uid: String,
    },
    /// The caller may not read this datasource
    #[error("permission denied for datasource '{uid}'")]
    Forbidden {
        /// The UID that was looked up
        uid: String,
    },
    /// Any other provider failure
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Fetches dashboard documents by UID. Fetch failures are opaque.
#[async_trait]
pub trait DashboardProvider: Send + Sync {
    /// Fetch the dashboard document for `uid`.
    async fn fetch_dashboard(&self, uid: &str) -> anyhow::Result<Value>;
}

/// Looks up and lists datasources.
#[async_trait]
pub trait DatasourceProvider: Send + Sync {
    /// Resolve a datasource by UID.
    async fn datasource_by_uid(&self, uid: &str)
    -> Result<DatasourceInfo, DatasourceLookupError>;

    /// List datasources, optionally filtered by raw type string. Used only
    /// to build "available datasources" recovery hints.
    async fn list_datasources(&self, kind: Option<&str>) -> anyhow::Result<Vec<DatasourceInfo>>;
}

/// Executes metrics range queries.
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Run `expr` against the datasource over `range`.
    async fn query_range(
        &self,
        datasource_uid: &str,
        expr: &str,
        range: &TimeRange,
    ) -> anyhow::Result<Vec<TimeSeries>>;
}

/// Executes log range queries.
#[async_trait]
pub trait LogsBackend: Send + Sync {
    /// Run `query` against the datasource over `range`.
    async fn query_range(
        &self,
        datasource_uid: &str,
        query: &str,
        range: &TimeRange,
    ) -> anyhow::Result<Vec<LogEntry>>;
}

/// Executes tabular SQL queries.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    /// Run `sql` (temporal macros already expanded) against the datasource.
    /// The variable environment is passed through for backends that perform
    /// additional server-side interpolation.
    async fn query(
        &self,
        datasource_uid: &str,
        sql: &str,
        range: &TimeRange,
        variables: &BTreeMap<String, String>,
    ) -> anyhow::Result<TableResult>;
}

/// Executes structured multi-field query targets.
#[async_trait]
pub trait RawTargetBackend: Send + Sync {
    /// Run the raw target object (variables already substituted) against
    /// the datasource over `range`.
    async fn query(
        &self,
        datasource_uid: &str,
        target: Map<String, Value>,
        range: &TimeRange,
    ) -> anyhow::Result<Value>;
}

/// The adapter table: one execution adapter per canonical kind, built once
/// at startup and passed by reference into the runner.
#[derive(Clone)]
pub struct Backends {
    /// Prometheus-family adapter
    pub metrics: Arc<dyn MetricsBackend>,
    /// Loki-family adapter
    pub logs: Arc<dyn LogsBackend>,
    /// ClickHouse-family adapter
    pub sql: Arc<dyn SqlBackend>,
    /// CloudWatch-family adapter
    pub raw: Arc<dyn RawTargetBackend>,
}
