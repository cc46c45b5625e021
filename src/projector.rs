//! Schema projector: derives typed, queryable columns from a free-form
//! content payload.
//!
//! Every collection has a fixed whitelist of columns ([`Collection::columns`]).
//! Projection reads those keys out of the payload, coerces each to its
//! declared type, and drops anything that does not coerce. Payload keys
//! outside the whitelist are never promoted; they stay in the canonical
//! content untouched.
//!
//! Coercion is deliberately soft-fail: the payload comes from a best-effort
//! AI extraction, so a non-numeric `mood_score` yields an absent column, not
//! an error. Projection is pure and idempotent — same payload in, same fields
//! out, with no clock access.

use serde_json::Value;

use crate::types::{Collection, ColumnType, Content, FieldValue, Fields};

/// Project a content payload onto the collection's typed columns.
pub fn project(collection: Collection, content: &Content) -> Fields {
    let mut fields = Fields::new();
    for col in collection.columns() {
        let Some(value) = content.get(col.name) else {
            continue;
        };
        let coerced = match col.ty {
            ColumnType::Integer => coerce_integer(value).map(FieldValue::Int),
            ColumnType::Real => coerce_real(value).map(FieldValue::Real),
            // Enum values are carried as text; validity is enforced by the
            // relational engine's CHECK constraint, not here.
            ColumnType::Text | ColumnType::Enum(_) => coerce_text(value).map(FieldValue::Text),
        };
        if let Some(v) = coerced {
            fields.insert(col.name.to_string(), v);
        }
    }
    fields
}

/// Integer coercion: JSON integers, integral floats, numeric strings, and
/// booleans (as 0/1). Anything else is absent.
fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let t = s.trim();
            t.parse::<i64>().ok().or_else(|| {
                t.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Real coercion: JSON numbers and finite numeric strings. Non-finite values
/// (`"nan"`, `"inf"`) are rejected: they have no JSON representation and
/// would poison the flat backend's serialized collection file.
fn coerce_real(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Text coercion: strings pass through unchanged; scalar values render to
/// their JSON text; string arrays (e.g. tags) join with ", ". Nested objects
/// never become columns.
fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        _ => None,
    }
}
