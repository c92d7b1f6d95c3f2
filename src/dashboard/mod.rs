//! Panel and query-target location inside dashboard documents.
//!
//! A dashboard is an externally owned JSON tree with a top-level `panels`
//! sequence. Panels of `type == "row"` are grouping nodes carrying exactly
//! one nested level of `panels`; that nesting is treated as a fixed extra
//! level, not a general recursive case, matching the observed dashboard
//! schema. Lookup by id searches both levels with the same call.
//!
//! Each panel carries an ordered sequence of query `targets`. The query
//! body lives under a backend-specific field name; extraction probes the
//! known field names in a fixed priority order ([`QUERY_FIELDS`]). Backends
//! with structured, multi-field targets (cloudwatch) may legitimately have
//! no single query string, so the raw target object is always retained for
//! the dispatcher.

pub mod queries;
pub mod variables;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{QueryError, Result};
use crate::value::{array_field, int_field, object_field, str_field};

/// Query-body field names, probed in priority order: `expr` (metrics),
/// `query` (logs, SQL, generic), `expression` (cloud metrics), `rawSql`,
/// `rawQuery` (SQL databases).
pub const QUERY_FIELDS: [&str; 5] = ["expr", "query", "expression", "rawSql", "rawQuery"];

/// A `{uid, type}` datasource reference as it appears in dashboards.
/// Either field may be empty when the dashboard omits it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasourceRef {
    /// Datasource UID; may itself be a template-variable reference
    #[serde(default)]
    pub uid: String,
    /// Datasource type string, when the dashboard records it
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// Everything the pipeline needs from one located query target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetInfo {
    /// Title of the owning panel
    pub panel_title: String,
    /// Effective datasource reference (target-level wins over panel-level)
    pub datasource: DatasourceRef,
    /// The extracted query body; empty only for structured-query backends
    pub query: String,
    /// The raw target object, verbatim, for structured-query dispatch
    pub raw_target: Map<String, Value>,
}

/// Find a panel by id, searching top-level panels and one nested level
/// inside row groupings. First match wins.
pub fn find_panel(dashboard: &Value, panel_id: i64) -> Result<&Map<String, Value>> {
    let db = dashboard.as_object().ok_or_else(|| QueryError::MalformedDashboard {
        reason: "dashboard is not a JSON object".to_string(),
    })?;
    let panels = array_field(db, "panels").ok_or(QueryError::NoPanels)?;

    for entry in panels {
        let Some(panel) = entry.as_object() else { continue };
        if int_field(panel, "id") == Some(panel_id) {
            return Ok(panel);
        }
        if str_field(panel, "type") == Some("row") {
            for nested in array_field(panel, "panels").into_iter().flatten() {
                if let Some(nested_panel) = nested.as_object() {
                    if int_field(nested_panel, "id") == Some(panel_id) {
                        return Ok(nested_panel);
                    }
                }
            }
        }
    }

    Err(QueryError::PanelNotFound {
        id: panel_id,
    })
}

/// All panels in the dashboard, with row-nested panels flattened into the
/// same sequence as their siblings.
pub fn collect_panels(dashboard: &Value) -> Vec<&Map<String, Value>> {
    let mut result = Vec::new();
    let Some(panels) = dashboard.as_object().and_then(|db| array_field(db, "panels")) else {
        return result;
    };

    for entry in panels {
        let Some(panel) = entry.as_object() else { continue };
        result.push(panel);
        if str_field(panel, "type") == Some("row") {
            for nested in array_field(panel, "panels").into_iter().flatten() {
                if let Some(nested_panel) = nested.as_object() {
                    result.push(nested_panel);
                }
            }
        }
    }
    result
}

/// Read a panel-or-target `datasource` object into a [`DatasourceRef`].
fn datasource_ref(obj: &Map<String, Value>) -> Option<DatasourceRef> {
    object_field(obj, "datasource").map(|ds| DatasourceRef {
        uid: str_field(ds, "uid").unwrap_or_default().to_string(),
        kind: str_field(ds, "type").unwrap_or_default().to_string(),
    })
}

/// Extract the query body from a target by probing [`QUERY_FIELDS`] in
/// order; the first non-empty match wins.
pub fn extract_query_body(target: &Map<String, Value>) -> Option<&str> {
    QUERY_FIELDS.iter().find_map(|field| str_field(target, field).filter(|s| !s.is_empty()))
}

/// Extract the `query_index`-th target of a panel together with its
/// effective datasource.
///
/// Errors: [`QueryError::NoQueryTargets`] for an empty target sequence,
/// [`QueryError::QueryIndexOutOfRange`] with the valid range,
/// [`QueryError::MissingDatasource`] when neither the target nor the panel
/// names a datasource, and [`QueryError::QueryNotFound`] when no query body
/// could be extracted for a backend that needs one.
pub fn extract_target(panel: &Map<String, Value>, query_index: usize) -> Result<TargetInfo> {
    let panel_title = str_field(panel, "title").unwrap_or_default().to_string();

    let targets = array_field(panel, "targets").filter(|t| !t.is_empty());
    let Some(targets) = targets else {
        return Err(QueryError::NoQueryTargets);
    };
    if query_index >= targets.len() {
        return Err(QueryError::QueryIndexOutOfRange {
            index: query_index,
            count: targets.len(),
        });
    }
    let target = targets[query_index].as_object().ok_or_else(|| QueryError::MalformedDashboard {
        reason: format!("target {query_index} is not a JSON object"),
    })?;

    // target-level datasource overrides the panel-level one, field-wise
    let mut datasource = datasource_ref(panel).unwrap_or_default();
    if let Some(target_ds) = datasource_ref(target) {
        if !target_ds.uid.is_empty() {
            datasource.uid = target_ds.uid;
        }
        if !target_ds.kind.is_empty() {
            datasource.kind = target_ds.kind;
        }
    }
    if datasource.uid.is_empty() {
        return Err(QueryError::MissingDatasource);
    }

    let query = extract_query_body(target).unwrap_or_default().to_string();
    // structured multi-field targets carry no single query string
    if query.is_empty() && !datasource.kind.to_ascii_lowercase().contains("cloudwatch") {
        return Err(QueryError::QueryNotFound);
    }

    Ok(TargetInfo {
        panel_title,
        datasource,
        query,
        raw_target: target.clone(),
    })
}
