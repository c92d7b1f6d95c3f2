//! The panel-query pipeline: locate a panel's target, resolve its template
//! variables and datasource, expand temporal macros, and dispatch to the
//! backend adapter for the datasource's kind.
//!
//! [`PanelQueryRunner`] is the entry point. [`PanelQueryRunner::run_panel_query`]
//! executes one target; [`PanelQueryRunner::run_panel_queries`] executes one
//! target per panel across a list of panel ids, collecting per-panel
//! successes and failures without aborting the batch.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::{
    Backends, DashboardProvider, DatasourceKind, DatasourceLookupError, DatasourceProvider,
    BackendResult,
};
use crate::core::{QueryError, Result};
use crate::dashboard::{self, DatasourceRef, TargetInfo};
use crate::hints::empty_result_hints;
use crate::template;
use crate::template::macros::{expand_metrics_macros, expand_sql_macros};
use crate::timerange::TimeRange;

const DEFAULT_START: &str = "now-1h";
const DEFAULT_END: &str = "now";

/// How many datasources an "available datasources" recovery hint lists.
const AVAILABLE_LIMIT: usize = 10;

/// Parameters of a single-panel query.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunPanelQueryParams {
    /// UID of the dashboard to query
    pub dashboard_uid: String,
    /// Id of the panel inside the dashboard
    pub panel_id: i64,
    /// Which of the panel's targets to execute (0-based)
    pub query_index: usize,
    /// Start of the time window; defaults to one hour ago
    pub start: Option<String>,
    /// End of the time window; defaults to now
    pub end: Option<String>,
    /// Template-variable overrides, applied over the dashboard's values
    pub variables: BTreeMap<String, String>,
    /// Override the panel's datasource UID
    pub datasource_uid: Option<String>,
    /// Override the datasource type. Only honored together with
    /// `datasource_uid`; a type override on its own is ignored.
    pub datasource_type: Option<String>,
}

/// Parameters of a multi-panel batch query. Every field other than
/// `panel_ids` has single-panel semantics, applied to each panel.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunPanelQueriesParams {
    /// UID of the dashboard to query
    pub dashboard_uid: String,
    /// Panels to execute, one target each; must not be empty
    pub panel_ids: Vec<i64>,
    /// Which target of each panel to execute (0-based)
    pub query_index: usize,
    /// Start of the time window; defaults to one hour ago
    pub start: Option<String>,
    /// End of the time window; defaults to now
    pub end: Option<String>,
    /// Template-variable overrides, applied over the dashboard's values
    pub variables: BTreeMap<String, String>,
    /// Override every panel's datasource UID
    pub datasource_uid: Option<String>,
    /// Override the datasource type; only honored with `datasource_uid`
    pub datasource_type: Option<String>,
}

/// The resolved time window, echoed back in results as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeRangeEcho {
    /// Start expression as resolved (submitted or the default)
    pub start: String,
    /// End expression as resolved (submitted or the default)
    pub end: String,
}

/// Outcome of one panel query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelQueryResult {
    /// Id of the queried panel
    pub panel_id: i64,
    /// Title of the queried panel
    pub panel_title: String,
    /// Canonical datasource type the query was dispatched to
    pub datasource_type: String,
    /// UID of the datasource the query ran against
    pub datasource_uid: String,
    /// The executed query, variables substituted and macros expanded.
    /// Empty for structured-target backends with no query body.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub query: String,
    /// The time window the query covered
    pub time_range: TimeRangeEcho,
    /// Backend result, shaped per backend family
    pub results: BackendResult,
    /// Recovery hints; present only when the result was empty
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
}

/// Outcome of a batch. `results` and `errors` are disjoint and together
/// cover every requested panel id exactly once.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchQueryResult {
    /// The dashboard that was queried
    pub dashboard_uid: String,
    /// Per-panel successes, keyed by panel id
    pub results: BTreeMap<i64, PanelQueryResult>,
    /// Per-panel failure messages, keyed by panel id
    pub errors: BTreeMap<i64, String>,
    /// The shared time window
    pub time_range: TimeRangeEcho,
}

/// Executes dashboard panel queries against pluggable providers and
/// backend adapters.
#[derive(Clone)]
pub struct PanelQueryRunner {
    dashboards: Arc<dyn DashboardProvider>,
    datasources: Arc<dyn DatasourceProvider>,
    backends: Backends,
}

impl PanelQueryRunner {
    /// Build a runner over the given providers and adapter table.
    pub fn new(
        dashboards: Arc<dyn DashboardProvider>,
        datasources: Arc<dyn DatasourceProvider>,
        backends: Backends,
    ) -> Self {
        Self { dashboards, datasources, backends }
    }

    /// Execute one panel target end to end.
    pub async fn run_panel_query(&self, params: RunPanelQueryParams) -> Result<PanelQueryResult> {
        let (range, echo) = resolve_time_range(params.start.as_deref(), params.end.as_deref())?;

        let dashboard = self.fetch_dashboard(&params.dashboard_uid).await?;
        self.run_single(&dashboard, &params, &range, &echo).await
    }

    /// Execute one target per panel across `panel_ids`.
    ///
    /// Panels are executed sequentially against a shared dashboard fetch.
    /// A failing panel is recorded in `errors` and does not stop the batch.
    pub async fn run_panel_queries(&self, params: RunPanelQueriesParams) -> Result<BatchQueryResult> {
        self.run_panel_queries_with_cancel(params, CancellationToken::new()).await
    }

    /// Batch execution with cooperative cancellation. Once `cancel` fires,
    /// the in-flight panel is recorded as cancelled and every remaining
    /// panel is recorded as skipped; already-collected results are kept.
    pub async fn run_panel_queries_with_cancel(
        &self,
        params: RunPanelQueriesParams,
        cancel: CancellationToken,
    ) -> Result<BatchQueryResult> {
        if params.panel_ids.is_empty() {
            return Err(QueryError::NoPanelIds);
        }
        let (range, echo) = resolve_time_range(params.start.as_deref(), params.end.as_deref())?;

        let dashboard = self.fetch_dashboard(&params.dashboard_uid).await?;

        let single = RunPanelQueryParams {
            dashboard_uid: params.dashboard_uid.clone(),
            panel_id: 0,
            query_index: params.query_index,
            start: params.start.clone(),
            end: params.end.clone(),
            variables: params.variables.clone(),
            datasource_uid: params.datasource_uid.clone(),
            datasource_type: params.datasource_type.clone(),
        };

        let mut results = BTreeMap::new();
        let mut errors = BTreeMap::new();

        for &panel_id in &params.panel_ids {
            if cancel.is_cancelled() {
                errors.insert(panel_id, "query cancelled before execution".to_string());
                continue;
            }

            debug!(panel_id, dashboard_uid = %params.dashboard_uid, "executing batch panel");
            let panel_params = RunPanelQueryParams { panel_id, ..single.clone() };

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(QueryError::Cancelled),
                outcome = self.run_single(&dashboard, &panel_params, &range, &echo) => outcome,
            };

            match outcome {
                Ok(result) => {
                    results.insert(panel_id, result);
                }
                Err(err) => {
                    errors.insert(panel_id, err.to_string());
                }
            }
        }

        Ok(BatchQueryResult {
            dashboard_uid: params.dashboard_uid,
            results,
            errors,
            time_range: echo,
        })
    }

    async fn fetch_dashboard(&self, uid: &str) -> Result<Value> {
        self.dashboards.fetch_dashboard(uid).await.map_err(|source| {
            QueryError::DashboardFetch { uid: uid.to_string(), source }
        })
    }

    /// The single-panel pipeline against an already-fetched dashboard.
    async fn run_single(
        &self,
        dashboard: &Value,
        params: &RunPanelQueryParams,
        range: &TimeRange,
        echo: &TimeRangeEcho,
    ) -> Result<PanelQueryResult> {
        let panel = dashboard::find_panel(dashboard, params.panel_id)?;
        let target = dashboard::extract_target(panel, params.query_index)?;
        if target.datasource.kind == "__expr__" || target.datasource.kind == "expression" {
            return Err(QueryError::MathExpressionPanel);
        }

        let environment = dashboard::variables::resolve_variables(dashboard, &params.variables);

        let (ds_uid, ds_type) = self
            .resolve_datasource(&target.datasource, params, &environment)
            .await?;
        let kind = DatasourceKind::normalize(&ds_type)
            .ok_or(QueryError::UnsupportedBackend { datasource_type: ds_type.clone() })?;

        let resolved_query = template::substitute_variables(&target.query, &environment);
        debug!(
            panel_id = params.panel_id,
            datasource = %ds_uid,
            kind = %kind,
            query = %resolved_query,
            "dispatching panel query"
        );

        let (executed_query, results) = self
            .dispatch(kind, &ds_uid, &resolved_query, &target, range, &environment)
            .await?;

        let hints = if results.is_empty() {
            empty_result_hints(kind, &executed_query)
        } else {
            Vec::new()
        };

        Ok(PanelQueryResult {
            panel_id: params.panel_id,
            panel_title: target.panel_title,
            datasource_type: kind.canonical_name().to_string(),
            datasource_uid: ds_uid,
            query: executed_query,
            time_range: echo.clone(),
            results,
            hints,
        })
    }

    /// Determine the effective datasource UID and type string.
    ///
    /// An explicit `datasource_uid` override wins outright; its type comes
    /// from the paired `datasource_type` override when given, otherwise
    /// from a provider lookup. Without an override, a variable-reference
    /// UID is resolved through the variable environment first, then the
    /// type is filled in by lookup when the dashboard omitted it.
    async fn resolve_datasource(
        &self,
        panel_ds: &DatasourceRef,
        params: &RunPanelQueryParams,
        environment: &BTreeMap<String, String>,
    ) -> Result<(String, String)> {
        let (uid, mut kind) = match &params.datasource_uid {
            Some(uid) => (uid.clone(), params.datasource_type.clone().unwrap_or_default()),
            None => {
                let mut uid = panel_ds.uid.clone();
                if template::is_variable_reference(&uid) {
                    let name = template::extract_variable_name(&uid);
                    match environment.get(name) {
                        Some(value) => uid = value.clone(),
                        None => {
                            return Err(QueryError::UnresolvedDatasourceVariable {
                                reference: panel_ds.uid.clone(),
                                expected_type: panel_ds.kind.clone(),
                                available: self
                                    .available_datasources(Some(&panel_ds.kind))
                                    .await,
                            });
                        }
                    }
                }
                (uid, panel_ds.kind.clone())
            }
        };

        if kind.is_empty() {
            kind = match self.datasources.datasource_by_uid(&uid).await {
                Ok(info) => info.kind,
                Err(DatasourceLookupError::NotFound { uid }) => {
                    let available = self.available_datasources(None).await;
                    return Err(QueryError::DatasourceNotFound { uid, available });
                }
                Err(DatasourceLookupError::Forbidden { uid }) => {
                    let available = self.available_datasources(None).await;
                    return Err(QueryError::DatasourceForbidden { uid, available });
                }
                Err(DatasourceLookupError::Other(source)) => {
                    return Err(QueryError::DatasourceLookup { uid, source });
                }
            };
        }

        Ok((uid, kind))
    }

    /// Expand backend-specific macros and hand off to the adapter for
    /// `kind`. Returns the query as executed alongside the result.
    async fn dispatch(
        &self,
        kind: DatasourceKind,
        ds_uid: &str,
        resolved_query: &str,
        target: &TargetInfo,
        range: &TimeRange,
        environment: &BTreeMap<String, String>,
    ) -> Result<(String, BackendResult)> {
        match kind {
            DatasourceKind::Prometheus => {
                let expr = expand_metrics_macros(resolved_query, range);
                let series = self
                    .backends
                    .metrics
                    .query_range(ds_uid, &expr, range)
                    .await
                    .map_err(|source| QueryError::BackendExecution { source })?;
                Ok((expr, BackendResult::Series(series)))
            }
            DatasourceKind::Loki => {
                let entries = self
                    .backends
                    .logs
                    .query_range(ds_uid, resolved_query, range)
                    .await
                    .map_err(|source| QueryError::BackendExecution { source })?;
                Ok((resolved_query.to_string(), BackendResult::Logs(entries)))
            }
            DatasourceKind::Clickhouse => {
                let sql = expand_sql_macros(resolved_query, range);
                let table = self
                    .backends
                    .sql
                    .query(ds_uid, &sql, range, environment)
                    .await
                    .map_err(|source| QueryError::BackendExecution { source })?;
                Ok((sql, BackendResult::Table(table)))
            }
            DatasourceKind::Cloudwatch => {
                let raw = self.prepare_raw_target(target, ds_uid, environment)?;
                let value = self
                    .backends
                    .raw
                    .query(ds_uid, raw, range)
                    .await
                    .map_err(|source| QueryError::BackendExecution { source })?;
                Ok((resolved_query.to_string(), BackendResult::Raw(value)))
            }
        }
    }

    /// Prepare a structured target for raw dispatch: substitute variables
    /// through every string field, pin the datasource to the resolved UID,
    /// and default the reference id.
    fn prepare_raw_target(
        &self,
        target: &TargetInfo,
        ds_uid: &str,
        environment: &BTreeMap<String, String>,
    ) -> Result<serde_json::Map<String, Value>> {
        let substituted =
            template::substitute_in_value(&Value::Object(target.raw_target.clone()), environment);
        let Value::Object(mut raw) = substituted else {
            return Err(QueryError::MalformedDashboard {
                reason: "target did not survive substitution as an object".to_string(),
            });
        };

        raw.insert(
            "datasource".to_string(),
            serde_json::json!({ "uid": ds_uid, "type": "cloudwatch" }),
        );
        if !raw.get("refId").is_some_and(|r| r.as_str().is_some_and(|s| !s.is_empty())) {
            raw.insert("refId".to_string(), Value::String("A".to_string()));
        }
        Ok(raw)
    }

    /// Known datasources formatted as `Name (uid)` for recovery hints,
    /// capped at a handful. Listing failures degrade to an empty hint
    /// rather than masking the original error.
    async fn available_datasources(&self, kind: Option<&str>) -> Vec<String> {
        let kind = kind.filter(|k| !k.is_empty());
        match self.datasources.list_datasources(kind).await {
            Ok(list) => list
                .into_iter()
                .take(AVAILABLE_LIMIT)
                .map(|ds| format!("{} ({})", ds.name, ds.uid))
                .collect(),
            Err(err) => {
                debug!(error = %err, "listing datasources for hint failed");
                Vec::new()
            }
        }
    }
}

fn resolve_time_range(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(TimeRange, TimeRangeEcho)> {
    let start = start.unwrap_or(DEFAULT_START);
    let end = end.unwrap_or(DEFAULT_END);
    let range = TimeRange::parse(start, end)?;
    Ok((range, TimeRangeEcho { start: start.to_string(), end: end.to_string() }))
}
