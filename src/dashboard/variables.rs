//! Template-variable resolution from dashboard definitions.
//!
//! Variables live under `templating.list`. Each definition carries a
//! `current` selection (`value`, possibly multi-valued, and a display
//! `text`), an `options` list, and for constant-type variables the value in
//! its `query` field. The effective environment layers, lowest to highest
//! precedence: current value → current text → definition default → caller
//! override. Overrides may introduce names the dashboard never defines.
//!
//! Multi-valued selections collapse to their first value; fan-out (running
//! a query once per value) is deliberately not attempted. The all-values
//! sentinel (`$__all` value or `All` text) counts as no concrete value.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::value::{array_field, object_field, str_field};

/// The all-values sentinel as it appears in `current.value`.
const ALL_VALUE: &str = "$__all";
/// The all-values sentinel as it appears in `current.text`.
const ALL_TEXT: &str = "All";

/// One variable definition with its resolved current and default values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableInfo {
    /// Variable name, unique within the dashboard
    pub name: String,
    /// Current value from the dashboard (or a caller override, once applied)
    #[serde(skip_serializing_if = "String::is_empty")]
    pub current_value: String,
    /// Default value from the dashboard definition
    #[serde(skip_serializing_if = "String::is_empty")]
    pub default_value: String,
}

/// First string of a possibly multi-valued `current.value`, skipping the
/// all-values sentinel.
fn current_value(current: &serde_json::Map<String, Value>) -> Option<&str> {
    let selected = match current.get("value") {
        Some(Value::String(s)) => Some(s.as_str()),
        // multi-value selection collapses to its first value
        Some(Value::Array(items)) => items.first().and_then(Value::as_str),
        _ => None,
    };
    selected.filter(|v| !v.is_empty() && *v != ALL_VALUE)
}

/// Extract every variable definition from the dashboard's templating
/// section, keyed by name. Definitions without a name are skipped.
pub fn variable_definitions(dashboard: &Value) -> BTreeMap<String, VariableInfo> {
    let mut variables = BTreeMap::new();
    let Some(list) = dashboard
        .as_object()
        .and_then(|db| object_field(db, "templating"))
        .and_then(|t| array_field(t, "list"))
    else {
        return variables;
    };

    for entry in list {
        let Some(definition) = entry.as_object() else { continue };
        let Some(name) = str_field(definition, "name").filter(|n| !n.is_empty()) else {
            continue;
        };

        let mut info = VariableInfo {
            name: name.to_string(),
            ..VariableInfo::default()
        };

        if let Some(current) = object_field(definition, "current") {
            if let Some(value) = current_value(current) {
                info.current_value = value.to_string();
            } else if let Some(text) =
                str_field(current, "text").filter(|t| !t.is_empty() && *t != ALL_TEXT)
            {
                // display text is the fallback when no concrete value is selected
                info.current_value = text.to_string();
            }
        }

        if let Some(first_option) = array_field(definition, "options")
            .and_then(|options| options.first())
            .and_then(Value::as_object)
        {
            if let Some(value) = str_field(first_option, "value").filter(|v| *v != ALL_VALUE) {
                info.default_value = value.to_string();
            }
        }
        if info.default_value.is_empty() && str_field(definition, "type") == Some("constant") {
            // constant variables keep their value in the query field
            if let Some(query) = str_field(definition, "query") {
                info.default_value = query.to_string();
            }
        }

        variables.insert(info.name.clone(), info);
    }

    variables
}

/// Build the effective variable environment for a request.
///
/// Pure function of the dashboard document and the caller's overrides;
/// overrides win and may add names absent from the dashboard. Variables
/// whose only selection is the all-values sentinel are excluded entirely.
pub fn resolve_variables(
    dashboard: &Value,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut environment = BTreeMap::new();

    for (name, info) in variable_definitions(dashboard) {
        if !info.current_value.is_empty() {
            environment.insert(name, info.current_value);
        } else if !info.default_value.is_empty() {
            environment.insert(name, info.default_value);
        }
    }
    for (name, value) in overrides {
        environment.insert(name.clone(), value.clone());
    }

    environment
}
