//! Path expressions over response documents.
//!
//! Control-plane responses are dynamic JSON trees. This module is the sole
//! accessor for them: call sites select values with declarative path
//! expressions instead of chaining unchecked indexing on wire data.
//!
//! Supported syntax:
//!
//! - dotted fields: `metadata.uid`
//! - list indexing: `networks[0].id`
//! - list filtering: `networks[?id=='abc']` (keeps matching elements)
//! - pipe-first: `networks[?id=='abc']|[0].status`
//!
//! A path that does not resolve yields the caller's default. Extraction
//! never errors: missing optional fields must not abort a read.
//!
//! # Example
//!
//! ```
//! use nimbus_provider_sdk::path::path_search;
//! use serde_json::json;
//!
//! let doc = json!({"network": {"id": "n-1", "status": "ACTIVE"}});
//! let status = path_search("network.status", &doc, json!(""));
//! assert_eq!(status, json!("ACTIVE"));
//!
//! let missing = path_search("network.cidr", &doc, json!("10.0.0.0/8"));
//! assert_eq!(missing, json!("10.0.0.0/8"));
//! ```

use serde_json::Value;

/// One parsed step of a path expression.
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    /// A map key lookup.
    Field(String),
    /// A list index lookup.
    Index(usize),
    /// A list filter keeping elements whose `field` equals `value`.
    Filter { field: String, value: String },
}

/// Extract the value selected by `expr` from `document`, or `default` if any
/// segment of the path is absent or mistyped.
///
/// Numbers come back as JSON numbers (f64-backed on the wire); narrow them
/// with [`path_i64`] or `as_f64` at the call site.
pub fn path_search(expr: &str, document: &Value, default: Value) -> Value {
    search(expr, document).unwrap_or(default)
}

/// Extract a string, or `default` if the path is absent or not a string.
pub fn path_str(expr: &str, document: &Value, default: &str) -> String {
    match search(expr, document) {
        Some(Value::String(s)) => s,
        _ => default.to_string(),
    }
}

/// Extract an integer, narrowing the document's f64-backed numbers.
pub fn path_i64(expr: &str, document: &Value, default: i64) -> i64 {
    match search(expr, document) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(default),
        _ => default,
    }
}

/// Extract a boolean, or `default` if the path is absent or not a boolean.
pub fn path_bool(expr: &str, document: &Value, default: bool) -> bool {
    match search(expr, document) {
        Some(Value::Bool(b)) => b,
        _ => default,
    }
}

/// Extract an array, or an empty vector if the path is absent or not a list.
pub fn path_array(expr: &str, document: &Value) -> Vec<Value> {
    match search(expr, document) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

fn search(expr: &str, document: &Value) -> Option<Value> {
    let mut current = document.clone();
    for stage in expr.split('|') {
        let segments = parse_stage(stage.trim())?;
        for segment in &segments {
            current = apply(segment, &current)?;
        }
    }
    if current.is_null() {
        return None;
    }
    Some(current)
}

fn apply(segment: &Segment, value: &Value) -> Option<Value> {
    match segment {
        Segment::Field(name) => value.as_object()?.get(name).cloned(),
        Segment::Index(i) => value.as_array()?.get(*i).cloned(),
        Segment::Filter { field, value: want } => {
            let items = value.as_array()?;
            let kept: Vec<Value> = items
                .iter()
                .filter(|item| {
                    item.get(field)
                        .and_then(Value::as_str)
                        .map(|s| s == want)
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
            Some(Value::Array(kept))
        }
    }
}

/// Parse one pipe stage into segments. Returns `None` on syntax the
/// extractor does not understand, which resolves to the default.
fn parse_stage(stage: &str) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();
    for part in stage.split('.') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let mut rest = part;
        // Leading field name, if any (a stage like `[0]` has none).
        if !rest.starts_with('[') {
            let end = rest.find('[').unwrap_or(rest.len());
            segments.push(Segment::Field(rest[..end].to_string()));
            rest = &rest[end..];
        }
        // Trailing bracket expressions.
        while let Some(inner) = rest.strip_prefix('[') {
            let close = inner.find(']')?;
            let body = &inner[..close];
            if let Some(filter) = body.strip_prefix('?') {
                let (field, want) = filter.split_once("==")?;
                let want = want.trim().strip_prefix('\'')?.strip_suffix('\'')?;
                segments.push(Segment::Filter {
                    field: field.trim().to_string(),
                    value: want.to_string(),
                });
            } else {
                segments.push(Segment::Index(body.trim().parse().ok()?));
            }
            rest = &inner[close + 1..];
        }
        if !rest.is_empty() {
            return None;
        }
    }
    Some(segments)
}
