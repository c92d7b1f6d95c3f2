//! End-to-end pipeline tests over in-memory providers and backend
//! adapters: variable resolution, datasource resolution and overrides,
//! macro expansion, per-kind dispatch, batching, and cancellation.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use panelrunner::backend::{
    Backends, DashboardProvider, DatasourceInfo, DatasourceLookupError, DatasourceProvider,
    LogEntry, LogsBackend, MetricsBackend, RawTargetBackend, SamplePoint, SqlBackend, TableResult,
    TimeSeries,
};
use panelrunner::runner::{PanelQueryRunner, RunPanelQueriesParams, RunPanelQueryParams};
use panelrunner::{QueryError, TimeRange};

struct FakeDashboards {
    dashboard: Value,
}

#[async_trait]
impl DashboardProvider for FakeDashboards {
    async fn fetch_dashboard(&self, uid: &str) -> anyhow::Result<Value> {
        if uid == "obs-main" {
            Ok(self.dashboard.clone())
        } else {
            Err(anyhow::anyhow!("dashboard not found"))
        }
    }
}

struct FakeDatasources {
    datasources: Vec<DatasourceInfo>,
}

impl Default for FakeDatasources {
    fn default() -> Self {
        Self {
            datasources: vec![
                DatasourceInfo {
                    uid: "prom-main".to_string(),
                    name: "Prometheus Main".to_string(),
                    kind: "prometheus".to_string(),
                },
                DatasourceInfo {
                    uid: "prom-staging".to_string(),
                    name: "Prometheus Staging".to_string(),
                    kind: "prometheus".to_string(),
                },
                DatasourceInfo {
                    uid: "loki-main".to_string(),
                    name: "Loki".to_string(),
                    kind: "loki".to_string(),
                },
                DatasourceInfo {
                    uid: "ch-main".to_string(),
                    name: "ClickHouse".to_string(),
                    kind: "grafana-clickhouse-datasource".to_string(),
                },
                DatasourceInfo {
                    uid: "cw-main".to_string(),
                    name: "CloudWatch".to_string(),
                    kind: "cloudwatch".to_string(),
                },
            ],
        }
    }
}

#[async_trait]
impl DatasourceProvider for FakeDatasources {
    async fn datasource_by_uid(&self, uid: &str) -> Result<DatasourceInfo, DatasourceLookupError> {
        self.datasources
            .iter()
            .find(|ds| ds.uid == uid)
            .cloned()
            .ok_or_else(|| DatasourceLookupError::NotFound { uid: uid.to_string() })
    }

    async fn list_datasources(&self, kind: Option<&str>) -> anyhow::Result<Vec<DatasourceInfo>> {
        Ok(self
            .datasources
            .iter()
            .filter(|ds| kind.is_none_or(|k| ds.kind == k))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct FakeMetrics {
    series: Vec<TimeSeries>,
    last_expr: Mutex<Option<String>>,
}

#[async_trait]
impl MetricsBackend for FakeMetrics {
    async fn query_range(
        &self,
        _datasource_uid: &str,
        expr: &str,
        _range: &TimeRange,
    ) -> anyhow::Result<Vec<TimeSeries>> {
        *self.last_expr.lock().unwrap() = Some(expr.to_string());
        Ok(self.series.clone())
    }
}

/// Metrics adapter that never completes; signals once a call has started.
struct StalledMetrics {
    started: Arc<tokio::sync::Notify>,
}

#[async_trait]
impl MetricsBackend for StalledMetrics {
    async fn query_range(
        &self,
        _datasource_uid: &str,
        _expr: &str,
        _range: &TimeRange,
    ) -> anyhow::Result<Vec<TimeSeries>> {
        self.started.notify_one();
        std::future::pending().await
    }
}

#[derive(Default)]
struct FakeLogs {
    entries: Vec<LogEntry>,
}

#[async_trait]
impl LogsBackend for FakeLogs {
    async fn query_range(
        &self,
        _datasource_uid: &str,
        _query: &str,
        _range: &TimeRange,
    ) -> anyhow::Result<Vec<LogEntry>> {
        Ok(self.entries.clone())
    }
}

#[derive(Default)]
struct FakeSql {
    table: TableResult,
    last_sql: Mutex<Option<String>>,
}

#[async_trait]
impl SqlBackend for FakeSql {
    async fn query(
        &self,
        _datasource_uid: &str,
        sql: &str,
        _range: &TimeRange,
        _variables: &BTreeMap<String, String>,
    ) -> anyhow::Result<TableResult> {
        *self.last_sql.lock().unwrap() = Some(sql.to_string());
        Ok(self.table.clone())
    }
}

#[derive(Default)]
struct FakeRaw {
    response: Value,
    last_target: Mutex<Option<Map<String, Value>>>,
}

#[async_trait]
impl RawTargetBackend for FakeRaw {
    async fn query(
        &self,
        _datasource_uid: &str,
        target: Map<String, Value>,
        _range: &TimeRange,
    ) -> anyhow::Result<Value> {
        *self.last_target.lock().unwrap() = Some(target);
        Ok(self.response.clone())
    }
}

fn sample_dashboard() -> Value {
    json!({
        "uid": "obs-main",
        "title": "Service Overview",
        "templating": {
            "list": [
                {
                    "name": "job",
                    "type": "query",
                    "current": {"value": "api-server", "text": "api-server"}
                },
                {
                    "name": "env",
                    "type": "custom",
                    "current": {"value": ["$__all"], "text": ["All"]},
                    "options": [{"value": "production", "text": "production"}]
                }
            ]
        },
        "panels": [
            {
                "id": 5,
                "title": "Request Rate",
                "type": "timeseries",
                "datasource": {"uid": "prom-main", "type": "prometheus"},
                "targets": [
                    {
                        "refId": "A",
                        "expr": "rate(http_requests_total{job=\"$job\"}[5m])"
                    }
                ]
            },
            {
                "id": 6,
                "title": "Placeholder",
                "type": "text",
                "targets": []
            },
            {
                "id": 7,
                "title": "Error Logs",
                "datasource": {"uid": "loki-main", "type": "loki"},
                "targets": [
                    {"refId": "A", "expr": "{job=\"$job\"} |= \"error\""}
                ]
            },
            {
                "id": 8,
                "title": "Slow Queries",
                "datasource": {"uid": "ch-main", "type": "grafana-clickhouse-datasource"},
                "targets": [
                    {
                        "refId": "A",
                        "rawSql": "SELECT count() FROM logs WHERE $__timeFilter(ts) AND env = '$env'"
                    }
                ]
            },
            {
                "id": 9,
                "title": "Queue Depth",
                "datasource": {"uid": "cw-main", "type": "cloudwatch"},
                "targets": [
                    {
                        "namespace": "AWS/SQS",
                        "metricName": "ApproximateNumberOfMessagesVisible",
                        "dimensions": {"QueueName": "$job-events"},
                        "statistic": "Average"
                    }
                ]
            },
            {
                "id": 10,
                "title": "Variable Datasource",
                "datasource": {"uid": "$ds", "type": "prometheus"},
                "targets": [{"refId": "A", "expr": "up"}]
            },
            {
                "id": 11,
                "title": "Unsupported",
                "datasource": {"uid": "influx-main", "type": "influxdb"},
                "targets": [{"refId": "A", "query": "SELECT * FROM cpu"}]
            },
            {
                "id": 12,
                "title": "Computed",
                "datasource": {"uid": "cw-main", "type": "cloudwatch"},
                "targets": [
                    {
                        "refId": "B",
                        "expression": "m1 / m2",
                        "datasource": {"uid": "__expr__", "type": "__expr__"}
                    }
                ]
            }
        ]
    })
}

struct World {
    runner: PanelQueryRunner,
    metrics: Arc<FakeMetrics>,
    sql: Arc<FakeSql>,
    raw: Arc<FakeRaw>,
}

fn world_with(metrics: FakeMetrics, sql: FakeSql, raw: FakeRaw) -> World {
    let metrics = Arc::new(metrics);
    let sql = Arc::new(sql);
    let raw = Arc::new(raw);
    let backends = Backends {
        metrics: metrics.clone(),
        logs: Arc::new(FakeLogs::default()),
        sql: sql.clone(),
        raw: raw.clone(),
    };
    let runner = PanelQueryRunner::new(
        Arc::new(FakeDashboards { dashboard: sample_dashboard() }),
        Arc::new(FakeDatasources::default()),
        backends,
    );
    World { runner, metrics, sql, raw }
}

fn world() -> World {
    world_with(FakeMetrics::default(), FakeSql::default(), FakeRaw::default())
}

fn params(panel_id: i64) -> RunPanelQueryParams {
    RunPanelQueryParams {
        dashboard_uid: "obs-main".to_string(),
        panel_id,
        ..Default::default()
    }
}

#[tokio::test]
async fn metrics_panel_resolves_variables_before_dispatch() {
    let world = world();
    let result = world.runner.run_panel_query(params(5)).await.unwrap();

    assert_eq!(result.panel_id, 5);
    assert_eq!(result.panel_title, "Request Rate");
    assert_eq!(result.datasource_type, "prometheus");
    assert_eq!(result.datasource_uid, "prom-main");
    assert_eq!(result.query, "rate(http_requests_total{job=\"api-server\"}[5m])");
    assert_eq!(result.time_range.start, "now-1h");
    assert_eq!(result.time_range.end, "now");
}

#[tokio::test]
async fn empty_metrics_result_carries_discovery_hints() {
    let world = world();
    let result = world.runner.run_panel_query(params(5)).await.unwrap();

    assert!(result.results.is_empty());
    assert!(result.hints[0].starts_with("No data found"));
    assert!(result.hints.iter().any(|h| h.contains("list_prometheus_metric_names")));
    assert!(result.hints.iter().any(|h| h.contains("Query executed")));
}

#[tokio::test]
async fn non_empty_result_has_no_hints() {
    let series = vec![TimeSeries {
        labels: BTreeMap::from([("job".to_string(), "api-server".to_string())]),
        points: vec![SamplePoint { timestamp_ms: 1_700_000_000_000, value: 42.0 }],
    }];
    let world = world_with(
        FakeMetrics { series, ..Default::default() },
        FakeSql::default(),
        FakeRaw::default(),
    );
    let result = world.runner.run_panel_query(params(5)).await.unwrap();

    assert!(!result.results.is_empty());
    assert!(result.hints.is_empty());
}

#[tokio::test]
async fn caller_variables_override_dashboard_current_values() {
    let world = world();
    let mut p = params(5);
    p.variables.insert("job".to_string(), "worker".to_string());
    let result = world.runner.run_panel_query(p).await.unwrap();

    assert_eq!(result.query, "rate(http_requests_total{job=\"worker\"}[5m])");
}

#[tokio::test]
async fn datasource_uid_override_wins_over_panel_datasource() {
    let world = world();
    let mut p = params(5);
    p.datasource_uid = Some("prom-staging".to_string());
    let result = world.runner.run_panel_query(p).await.unwrap();

    assert_eq!(result.datasource_uid, "prom-staging");
    assert_eq!(result.datasource_type, "prometheus");
}

#[tokio::test]
async fn type_override_without_uid_override_is_ignored() {
    let world = world();
    let mut p = params(5);
    p.datasource_type = Some("loki".to_string());
    let result = world.runner.run_panel_query(p).await.unwrap();

    // panel's own datasource still governs dispatch
    assert_eq!(result.datasource_uid, "prom-main");
    assert_eq!(result.datasource_type, "prometheus");
}

#[tokio::test]
async fn variable_datasource_resolves_through_environment() {
    let world = world();
    let mut p = params(10);
    p.variables.insert("ds".to_string(), "prom-staging".to_string());
    let result = world.runner.run_panel_query(p).await.unwrap();

    assert_eq!(result.datasource_uid, "prom-staging");
}

#[tokio::test]
async fn unresolved_variable_datasource_lists_available() {
    let world = world();
    let err = world.runner.run_panel_query(params(10)).await.unwrap_err();

    let QueryError::UnresolvedDatasourceVariable { reference, expected_type, available } = err
    else {
        panic!("expected UnresolvedDatasourceVariable, got {err:?}");
    };
    assert_eq!(reference, "$ds");
    assert_eq!(expected_type, "prometheus");
    assert_eq!(
        available,
        vec!["Prometheus Main (prom-main)".to_string(), "Prometheus Staging (prom-staging)".to_string()]
    );
}

#[tokio::test]
async fn unsupported_datasource_type_names_native_tools() {
    let world = world();
    let err = world.runner.run_panel_query(params(11)).await.unwrap_err();

    assert!(matches!(err, QueryError::UnsupportedBackend { .. }));
    let message = err.to_string();
    assert!(message.contains("influxdb"));
    assert!(message.contains("query_prometheus"));
}

#[tokio::test]
async fn metrics_macros_expand_before_execution() {
    let world = world();
    let mut p = params(5);
    p.variables.insert("job".to_string(), "api-server".to_string());
    world.runner.run_panel_query(p).await.unwrap();

    // no macros in this expr, so it passes through unchanged
    let expr = world.metrics.last_expr.lock().unwrap().clone().unwrap();
    assert_eq!(expr, "rate(http_requests_total{job=\"api-server\"}[5m])");
}

#[tokio::test]
async fn sql_time_filter_and_variables_expand_before_execution() {
    let world = world();
    world.runner.run_panel_query(params(8)).await.unwrap();

    let sql = world.sql.last_sql.lock().unwrap().clone().unwrap();
    assert!(sql.contains("ts >= toDateTime("), "{sql}");
    assert!(sql.contains("ts <= toDateTime("), "{sql}");
    // env's current value is the all-values sentinel, so its first option
    // serves as the default
    assert!(sql.contains("env = 'production'"), "{sql}");
    assert!(!sql.contains("$__timeFilter"), "{sql}");
}

#[tokio::test]
async fn caller_override_beats_option_default() {
    let world = world();
    let mut p = params(8);
    p.variables.insert("env".to_string(), "staging".to_string());
    world.runner.run_panel_query(p).await.unwrap();

    let sql = world.sql.last_sql.lock().unwrap().clone().unwrap();
    assert!(sql.contains("env = 'staging'"), "{sql}");
}

#[tokio::test]
async fn cloudwatch_target_is_substituted_and_pinned() {
    let world = world();
    let result = world.runner.run_panel_query(params(9)).await.unwrap();

    assert_eq!(result.datasource_type, "cloudwatch");
    let target = world.raw.last_target.lock().unwrap().clone().unwrap();
    assert_eq!(target["dimensions"]["QueueName"], json!("api-server-events"));
    assert_eq!(target["datasource"], json!({"uid": "cw-main", "type": "cloudwatch"}));
    assert_eq!(target["refId"], json!("A"));
    assert_eq!(target["namespace"], json!("AWS/SQS"));
}

#[tokio::test]
async fn math_expression_target_is_rejected() {
    let world = world();
    let err = world.runner.run_panel_query(params(12)).await.unwrap_err();
    assert!(matches!(err, QueryError::MathExpressionPanel), "{err:?}");
}

#[tokio::test]
async fn missing_panel_and_bad_index_report_precisely() {
    let world = world();

    let err = world.runner.run_panel_query(params(999)).await.unwrap_err();
    assert!(matches!(err, QueryError::PanelNotFound { id: 999 }));

    let mut p = params(5);
    p.query_index = 3;
    let err = world.runner.run_panel_query(p).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "query index 3 out of range (panel has 1 queries, valid range: 0-0)"
    );
}

#[tokio::test]
async fn batch_results_and_errors_are_disjoint_and_exhaustive() {
    let world = world();
    let batch = world
        .runner
        .run_panel_queries(RunPanelQueriesParams {
            dashboard_uid: "obs-main".to_string(),
            panel_ids: vec![5, 6, 7],
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(batch.dashboard_uid, "obs-main");
    assert_eq!(batch.results.keys().copied().collect::<Vec<_>>(), vec![5, 7]);
    assert_eq!(batch.errors.keys().copied().collect::<Vec<_>>(), vec![6]);
    assert_eq!(batch.errors[&6], "panel has no query targets");
    assert_eq!(batch.time_range.start, "now-1h");
}

#[tokio::test]
async fn batch_requires_panel_ids() {
    let world = world();
    let err = world
        .runner
        .run_panel_queries(RunPanelQueriesParams {
            dashboard_uid: "obs-main".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::NoPanelIds));
}

#[tokio::test]
async fn cancelled_batch_skips_remaining_panels() {
    let world = world();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let batch = world
        .runner
        .run_panel_queries_with_cancel(
            RunPanelQueriesParams {
                dashboard_uid: "obs-main".to_string(),
                panel_ids: vec![5, 7],
                ..Default::default()
            },
            cancel,
        )
        .await
        .unwrap();

    assert!(batch.results.is_empty());
    assert_eq!(batch.errors[&5], "query cancelled before execution");
    assert_eq!(batch.errors[&7], "query cancelled before execution");
}

#[tokio::test]
async fn cancellation_abandons_the_in_flight_call() {
    let started = Arc::new(tokio::sync::Notify::new());
    let backends = Backends {
        metrics: Arc::new(StalledMetrics { started: started.clone() }),
        logs: Arc::new(FakeLogs::default()),
        sql: Arc::new(FakeSql::default()),
        raw: Arc::new(FakeRaw::default()),
    };
    let runner = PanelQueryRunner::new(
        Arc::new(FakeDashboards { dashboard: sample_dashboard() }),
        Arc::new(FakeDatasources::default()),
        backends,
    );

    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let runner = runner.clone();
        let cancel = cancel.clone();
        async move {
            runner
                .run_panel_queries_with_cancel(
                    RunPanelQueriesParams {
                        dashboard_uid: "obs-main".to_string(),
                        // loki panel first so one result is already collected
                        // when the metrics panel stalls
                        panel_ids: vec![7, 5, 8],
                        ..Default::default()
                    },
                    cancel,
                )
                .await
        }
    });

    // fire the token only once panel 5's backend call is in flight
    started.notified().await;
    cancel.cancel();
    let batch = task.await.unwrap().unwrap();

    assert_eq!(batch.results.keys().copied().collect::<Vec<_>>(), vec![7]);
    assert_eq!(batch.errors[&5], "query cancelled");
    assert_eq!(batch.errors[&8], "query cancelled before execution");
}
