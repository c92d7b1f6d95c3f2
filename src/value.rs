//! Field accessors for semi-structured dashboard documents.
//!
//! Dashboard documents are externally defined JSON trees whose shape is only
//! partially known, so the crate reads them through tolerant accessors over
//! [`serde_json::Map`] instead of typed recursive structures. A missing field
//! or a field of the wrong kind is simply `None`; only the pipeline decides
//! which absences are errors.

use serde_json::{Map, Value};

/// String field, or `None` when absent or not a string.
pub(crate) fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

/// Integer field. Accepts any JSON number with an integral value.
pub(crate) fn int_field(obj: &Map<String, Value>, key: &str) -> Option<i64> {
    obj.get(key).and_then(Value::as_i64)
}

/// Array field, or `None` when absent or not an array.
pub(crate) fn array_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Vec<Value>> {
    obj.get(key).and_then(Value::as_array)
}

/// Object field, or `None` when absent or not an object.
pub(crate) fn object_field<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
) -> Option<&'a Map<String, Value>> {
    obj.get(key).and_then(Value::as_object)
}
