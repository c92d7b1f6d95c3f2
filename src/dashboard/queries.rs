//! Read-only listing of every query a dashboard contains.
//!
//! Discovery companion to the runner: callers use this to find panel ids,
//! query indices, and the variables a query depends on before executing
//! anything. Each target of each panel (rows flattened) yields one
//! [`PanelQuery`] with the raw and variable-substituted query, the
//! effective datasource (its uid substituted through the environment too),
//! and the referenced variables with their resolved values.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::variables::{VariableInfo, resolve_variables, variable_definitions};
use super::{DatasourceRef, collect_panels, extract_query_body};
use crate::template::{find_variables, substitute_variables};
use crate::value::{array_field, int_field, object_field, str_field};

/// One query target of one panel, with variable analysis applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelQuery {
    /// Id of the owning panel
    pub panel_id: i64,
    /// Title of the owning panel
    pub panel_title: String,
    /// Target reference id (`refId`), when present
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ref_id: String,
    /// The query body as written in the dashboard
    pub query: String,
    /// The query with template variables substituted
    pub processed_query: String,
    /// Effective datasource, uid substituted through the environment
    pub datasource: DatasourceRef,
    /// Variables the query references, with their resolved values
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_variables: Vec<VariableInfo>,
}

/// List every query in the dashboard, rows flattened, with variables
/// resolved against the dashboard definitions plus `overrides`.
pub fn panel_queries(dashboard: &Value, overrides: &BTreeMap<String, String>) -> Vec<PanelQuery> {
    let definitions = variable_definitions(dashboard);
    let environment = resolve_variables(dashboard, overrides);
    let mut queries = Vec::new();

    for panel in collect_panels(dashboard) {
        let panel_id = int_field(panel, "id").unwrap_or_default();
        let panel_title = str_field(panel, "title").unwrap_or_default().to_string();
        let panel_ds = object_field(panel, "datasource");

        for target in array_field(panel, "targets").into_iter().flatten() {
            let Some(target) = target.as_object() else { continue };
            let Some(query) = extract_query_body(target) else { continue };

            let mut datasource = DatasourceRef::default();
            for ds in [panel_ds, object_field(target, "datasource")].into_iter().flatten() {
                if let Some(uid) = str_field(ds, "uid").filter(|s| !s.is_empty()) {
                    datasource.uid = uid.to_string();
                }
                if let Some(kind) = str_field(ds, "type").filter(|s| !s.is_empty()) {
                    datasource.kind = kind.to_string();
                }
            }
            datasource.uid = substitute_variables(&datasource.uid, &environment);

            let required_variables = find_variables(query)
                .into_iter()
                .map(|name| {
                    let mut info = definitions.get(&name).cloned().unwrap_or(VariableInfo {
                        name: name.clone(),
                        ..VariableInfo::default()
                    });
                    if let Some(value) = environment.get(&name) {
                        info.current_value = value.clone();
                    }
                    info
                })
                .collect();

            queries.push(PanelQuery {
                panel_id,
                panel_title: panel_title.clone(),
                ref_id: str_field(target, "refId").unwrap_or_default().to_string(),
                query: query.to_string(),
                processed_query: substitute_variables(query, &environment),
                datasource,
                required_variables,
            });
        }
    }

    queries
}
