//! Schema validation helpers.
//!
//! Validates a `serde_json::Value` desired-state document against a
//! [`Schema`] before any remote call is issued, and checks updates for
//! mutation of immutable-after-create attributes.
//!
//! # Example
//!
//! ```
//! use nimbus_provider_sdk::schema::{Schema, Attribute};
//! use nimbus_provider_sdk::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("port", Attribute::optional_int64());
//!
//! assert!(validate(&schema, &json!({"name": "n", "port": 8080})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"port": "not a number"}));
//! assert_eq!(diagnostics.len(), 2);
//! ```

use crate::schema::{
    Attribute, AttributeType, Block, BlockNestingMode, Diagnostic, DiagnosticSeverity, NestedBlock,
    Schema,
};
use serde_json::Value;

/// Validate a desired-state document against a schema.
///
/// Returns a diagnostic per violation; an empty list means valid.
/// Required attributes must be present and non-null, optional ones may be
/// absent, computed-only ones are skipped, types must match, and nested
/// blocks are validated recursively with their item constraints.
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// [`validate`], as a `Result` for `?`-style call sites.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Whether a document is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

/// Names of `force_new` attributes whose value differs between the prior
/// and desired documents. A non-empty result means the update must be
/// refused: immutable attributes can only change through replacement.
pub fn immutable_violations(schema: &Schema, prior: &Value, desired: &Value) -> Vec<String> {
    schema
        .force_new_attributes()
        .into_iter()
        .filter(|name| {
            let before = prior.get(name).unwrap_or(&Value::Null);
            let after = desired.get(name).unwrap_or(&Value::Null);
            // An absent desired value means "leave as is", not a change.
            !after.is_null() && before != after
        })
        .map(str::to_string)
        .collect()
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value)))
                    .with_attribute_if_not_empty(path),
            );
            return;
        }
    };

    for (name, attr) in &block.attributes {
        let attr_path = join_path(path, name);
        validate_attribute(attr, obj.get(name), &attr_path, diagnostics);
    }

    for (name, nested) in &block.blocks {
        let block_path = join_path(path, name);
        validate_nested_block(nested, obj.get(name), &block_path, diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.is_computed_only() {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{path}'"))
                        .with_attribute(path),
                );
            }
        }
        Some(v) => validate_attribute_type(&attr.attr_type, v, path, diagnostics),
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        }
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        }
        AttributeType::Float64 => {
            if !value.is_number() {
                diagnostics.push(type_error(path, "float64", value));
            }
        }
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        }
        AttributeType::List(element_type) | AttributeType::Set(element_type) => {
            if let Some(items) = value.as_array() {
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{path}.{i}");
                    validate_attribute_type(element_type, item, &item_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "list", value));
            }
        }
        AttributeType::Map(value_type) => {
            if let Some(obj) = value.as_object() {
                for (key, val) in obj {
                    let key_path = format!("{path}.{key}");
                    validate_attribute_type(value_type, val, &key_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "map", value));
            }
        }
        AttributeType::Dynamic => {}
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match nested.nesting_mode {
        BlockNestingMode::Single => {
            if let Some(v) = value {
                validate_block(&nested.block, v, path, diagnostics);
            } else if nested.min_items > 0 {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required block '{path}'"))
                        .with_attribute(path),
                );
            }
        }
        BlockNestingMode::List | BlockNestingMode::Set => {
            let items = match value {
                None | Some(Value::Null) => {
                    if nested.min_items > 0 {
                        diagnostics.push(
                            Diagnostic::error(format!("Missing required block '{path}'"))
                                .with_attribute(path),
                        );
                    }
                    return;
                }
                Some(Value::Array(items)) => items,
                Some(other) => {
                    diagnostics.push(type_error(path, "list of blocks", other));
                    return;
                }
            };

            if (items.len() as u32) < nested.min_items {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{path}' requires at least {} item(s), got {}",
                        nested.min_items,
                        items.len()
                    ))
                    .with_attribute(path),
                );
            }
            if nested.max_items > 0 && (items.len() as u32) > nested.max_items {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{path}' allows at most {} item(s), got {}",
                        nested.max_items,
                        items.len()
                    ))
                    .with_attribute(path),
                );
            }
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{path}.{i}");
                validate_block(&nested.block, item, &item_path, diagnostics);
            }
        }
    }
}

fn type_error(path: &str, expected: &str, value: &Value) -> Diagnostic {
    Diagnostic::error(format!("Type mismatch for attribute '{path}'"))
        .with_detail(format!(
            "Expected {expected}, got {}",
            value_type_name(value)
        ))
        .with_attribute(path)
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        _ => false,
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}.{name}")
    }
}

/// Whether any diagnostic in the list is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics
        .iter()
        .any(|d| d.severity == DiagnosticSeverity::Error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Block, NestedBlock, Schema};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::v0()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("cidr", Attribute::required_string().with_force_new())
            .with_attribute("port", Attribute::optional_int64())
            .with_attribute("id", Attribute::computed_string())
            .with_block(
                "rules",
                NestedBlock::list(
                    Block::new()
                        .with_attribute("protocol", Attribute::required_string())
                        .with_attribute("port", Attribute::required_int64()),
                )
                .with_max_items(2),
            )
    }

    #[test]
    fn test_valid_document() {
        let doc = json!({
            "name": "net", "cidr": "10.0.0.0/16", "port": 443,
            "rules": [{"protocol": "tcp", "port": 22}]
        });
        assert!(is_valid(&schema(), &doc));
    }

    #[test]
    fn test_missing_required_attribute() {
        let diagnostics = validate(&schema(), &json!({"name": "net"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("cidr"));
    }

    #[test]
    fn test_type_mismatch() {
        let doc = json!({"name": "net", "cidr": "10.0.0.0/16", "port": "https"});
        let diagnostics = validate(&schema(), &doc);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Type mismatch"));
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("port"));
    }

    #[test]
    fn test_computed_attributes_skipped() {
        // `id` is server-assigned; supplying or omitting it is fine.
        let doc = json!({"name": "net", "cidr": "10.0.0.0/16"});
        assert!(is_valid(&schema(), &doc));
    }

    #[test]
    fn test_nested_block_item_constraints() {
        let doc = json!({
            "name": "net", "cidr": "10.0.0.0/16",
            "rules": [
                {"protocol": "tcp", "port": 22},
                {"protocol": "udp", "port": 53},
                {"protocol": "tcp", "port": 80}
            ]
        });
        let diagnostics = validate(&schema(), &doc);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at most 2"));
    }

    #[test]
    fn test_nested_block_attribute_errors_carry_index() {
        let doc = json!({
            "name": "net", "cidr": "10.0.0.0/16",
            "rules": [{"protocol": "tcp"}]
        });
        let diagnostics = validate(&schema(), &doc);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("rules.0.port"));
    }

    #[test]
    fn test_validate_result() {
        assert!(validate_result(&schema(), &json!({"name": "n"})).is_err());
    }

    #[test]
    fn test_immutable_violations() {
        let s = schema();
        let prior = json!({"name": "net", "cidr": "10.0.0.0/16"});

        let same = json!({"name": "renamed", "cidr": "10.0.0.0/16"});
        assert!(immutable_violations(&s, &prior, &same).is_empty());

        let changed = json!({"name": "net", "cidr": "172.16.0.0/12"});
        assert_eq!(immutable_violations(&s, &prior, &changed), vec!["cidr"]);

        // Absent in desired means unchanged, not cleared.
        let absent = json!({"name": "net"});
        assert!(immutable_violations(&s, &prior, &absent).is_empty());
    }
}
