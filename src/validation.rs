//! Schema validation helpers.
//!
//! Validates a `serde_json::Value` configuration against a [`Schema`],
//! producing one [`Diagnostic`] per problem with the attribute path set.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_fastly::schema::{Attribute, Schema};
//! use hemmer_provider_fastly::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute(
//!         "format_version",
//!         Attribute::optional_int64().with_allowed_values([1, 2]),
//!     );
//!
//! assert!(validate(&schema, &json!({"name": "kafka", "format_version": 2})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "kafka", "format_version": 3}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("format_version".to_string()));
//! ```

use crate::schema::{Attribute, AttributeType, Block, BlockNestingMode, Diagnostic, NestedBlock, Schema};
use serde_json::Value;

/// Validate a JSON value against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
///
/// - Required attributes must be present and non-null
/// - Computed-only attributes are skipped
/// - Attribute types must match the schema
/// - Values must be among the attribute's allowed values, if any
/// - Nested blocks are validated recursively with min/max item constraints
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// Validate a JSON value against a schema, returning Ok if valid or Err with diagnostics.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a JSON value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        _ => {
            let diagnostic =
                Diagnostic::error("Expected object").with_detail(format!("Got {}", value_type_name(value)));
            diagnostics.push(if path.is_empty() {
                diagnostic
            } else {
                diagnostic.with_attribute(path)
            });
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
    // Computed-only attributes are owned by the provider.
    if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        }
        Some(v) => {
            if validate_attribute_type(&attr.attr_type, v, path, diagnostics) {
                validate_allowed_values(attr, v, path, diagnostics);
            }
        }
    }
}

/// Returns `true` if the value has the expected type.
fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let before = diagnostics.len();
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
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        }
        AttributeType::List(element_type) => match value.as_array() {
            Some(arr) => {
                for (i, elem) in arr.iter().enumerate() {
                    let elem_path = format!("{}.{}", path, i);
                    validate_attribute_type(element_type, elem, &elem_path, diagnostics);
                }
            }
            None => diagnostics.push(type_error(path, "list", value)),
        }
    }
    diagnostics.len() == before
}

fn validate_allowed_values(
    attr: &Attribute,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.allowed_values.is_empty() || attr.allowed_values.iter().any(|v| same_value(v, value)) {
        return;
    }

    let allowed = attr
        .allowed_values
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ");

    diagnostics.push(
        Diagnostic::error(format!("Invalid value for attribute '{}'", path))
            .with_detail(format!("Expected one of: {}; got {}", allowed, value))
            .with_attribute(path),
    );
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match nested.nesting_mode {
        BlockNestingMode::Single => match value {
            None | Some(Value::Null) => {
                if nested.min_items > 0 {
                    diagnostics.push(
                        Diagnostic::error(format!("Missing required block '{}'", path))
                            .with_detail("At least one block is required")
                            .with_attribute(path),
                    );
                }
            }
            Some(v) => validate_block(&nested.block, v, path, diagnostics),
        }
        // Sets travel as JSON arrays, so both modes share the checks.
        BlockNestingMode::List | BlockNestingMode::Set => {
            validate_block_items(nested, value, path, diagnostics)
        }
    }
}

fn validate_block_items(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let items: &[Value] = match value {
        None | Some(Value::Null) => &[],
        Some(Value::Array(arr)) => arr,
        Some(v) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", value_type_name(v)))
                    .with_attribute(path),
            );
            return;
        }
    };

    let len = items.len() as u32;
    if len < nested.min_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' requires at least {} item(s), got {}",
                path, nested.min_items, len
            ))
            .with_attribute(path),
        );
    }

    for (i, item) in items.iter().enumerate() {
        let item_path = format!("{}.{}", path, i);
        validate_block(&nested.block, item, &item_path, diagnostics);
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64()
                || n.as_f64()
                    .map(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
                    .unwrap_or(false)
        }
        _ => false,
    }
}

/// Compare values, treating integral floats and integers as equal.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeFlags, Block, NestedBlock, Schema};
    use serde_json::json;

    fn kafka_schema() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("service_id", Attribute::required_string())
            .with_block(
                "logging_kafka",
                NestedBlock::set(
                    Block::new()
                        .with_attribute("name", Attribute::required_string())
                        .with_attribute("topic", Attribute::required_string())
                        .with_attribute("request_max_bytes", Attribute::optional_int64())
                        .with_attribute(
                            "compression_codec",
                            Attribute::optional_string().with_allowed_values(["gzip", "snappy", "lz4"]),
                        )
                        .with_attribute(
                            "format_version",
                            Attribute::optional_int64().with_allowed_values([1, 2]),
                        ),
                ),
            )
    }

    #[test]
    fn test_validate_required_string() {
        let schema = Schema::v0().with_attribute("service_id", Attribute::required_string());

        assert!(validate(&schema, &json!({"service_id": "abc"})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("service_id".to_string()));

        let diagnostics = validate(&schema, &json!({"service_id": null}));
        assert_eq!(diagnostics.len(), 1);

        let diagnostics = validate(&schema, &json!({"service_id": 123}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_computed_attribute_skipped() {
        let schema = Schema::v0().with_attribute("id", Attribute::computed_string());
        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"id": 123})).is_empty());
    }

    #[test]
    fn test_validate_int64() {
        let schema = Schema::v0().with_attribute("version", Attribute::required_int64());

        assert!(validate(&schema, &json!({"version": 3})).is_empty());
        assert!(validate(&schema, &json!({"version": 3.0})).is_empty());
        assert_eq!(validate(&schema, &json!({"version": 3.5})).len(), 1);
        assert_eq!(validate(&schema, &json!({"version": "3"})).len(), 1);
    }

    #[test]
    fn test_validate_list() {
        let schema = Schema::v0().with_attribute(
            "brokers",
            Attribute::new(
                AttributeType::list(AttributeType::String),
                AttributeFlags::required(),
            ),
        );

        assert!(validate(&schema, &json!({"brokers": ["a:9092", "b:9092"]})).is_empty());

        let diagnostics = validate(&schema, &json!({"brokers": ["a:9092", 9092]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("brokers.1".to_string()));

        assert_eq!(validate(&schema, &json!({"brokers": "a:9092"})).len(), 1);
    }

    #[test]
    fn test_validate_allowed_values() {
        let schema = kafka_schema();

        let ok = json!({
            "service_id": "abc",
            "logging_kafka": [{"name": "k", "topic": "t", "compression_codec": "lz4", "format_version": 1}]
        });
        assert!(validate(&schema, &ok).is_empty());

        let bad = json!({
            "service_id": "abc",
            "logging_kafka": [{"name": "k", "topic": "t", "compression_codec": "zstd", "format_version": 3}]
        });
        let diagnostics = validate(&schema, &bad);
        assert_eq!(diagnostics.len(), 2);
        let paths: Vec<_> = diagnostics.iter().filter_map(|d| d.attribute.clone()).collect();
        assert!(paths.contains(&"logging_kafka.0.compression_codec".to_string()));
        assert!(paths.contains(&"logging_kafka.0.format_version".to_string()));
        assert!(diagnostics[0].detail.as_ref().unwrap().contains("Expected one of"));
    }

    #[test]
    fn test_validate_allowed_values_integral_float() {
        let schema = Schema::v0().with_attribute(
            "format_version",
            Attribute::optional_int64().with_allowed_values([1, 2]),
        );
        assert!(validate(&schema, &json!({"format_version": 2.0})).is_empty());
    }

    #[test]
    fn test_wrong_type_skips_allowed_values() {
        let schema = Schema::v0().with_attribute(
            "format_version",
            Attribute::optional_int64().with_allowed_values([1, 2]),
        );
        let diagnostics = validate(&schema, &json!({"format_version": "two"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_set_block_items() {
        let schema = kafka_schema();

        let diagnostics = validate(
            &schema,
            &json!({"service_id": "abc", "logging_kafka": [{"name": "k"}]}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute,
            Some("logging_kafka.0.topic".to_string())
        );

        let diagnostics = validate(
            &schema,
            &json!({"service_id": "abc", "logging_kafka": {"name": "k"}}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected list"));

        // Absent sets are fine.
        assert!(validate(&schema, &json!({"service_id": "abc"})).is_empty());
    }

    #[test]
    fn test_validate_block_item_limits() {
        let schema = Schema::v0().with_block(
            "logging_kafka",
            NestedBlock::set(Block::new().with_attribute("name", Attribute::required_string()))
                .with_min_items(1),
        );

        let diagnostics = validate(&schema, &json!({"logging_kafka": []}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at least 1"));

        // Sets have no upper bound.
        let diagnostics = validate(
            &schema,
            &json!({"logging_kafka": [{"name": "a"}, {"name": "b"}, {"name": "c"}]}),
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_validate_single_block() {
        let schema = Schema::v0().with_block(
            "tls",
            NestedBlock::single(Block::new().with_attribute("hostname", Attribute::required_string()))
                .with_min_items(1),
        );

        assert_eq!(validate(&schema, &json!({})).len(), 1);
        let diagnostics = validate(&schema, &json!({"tls": {"hostname": 1}}));
        assert_eq!(diagnostics[0].attribute, Some("tls.hostname".to_string()));
    }

    #[test]
    fn test_is_valid_and_result_helpers() {
        let schema = Schema::v0().with_attribute("service_id", Attribute::required_string());

        assert!(is_valid(&schema, &json!({"service_id": "abc"})));
        assert!(!is_valid(&schema, &json!({})));

        assert!(validate_result(&schema, &json!({"service_id": "abc"})).is_ok());
        assert_eq!(validate_result(&schema, &json!({})).unwrap_err().len(), 1);
    }

    #[test]
    fn test_validate_root_not_object() {
        let schema = Schema::v0().with_attribute("service_id", Attribute::required_string());
        let diagnostics = validate(&schema, &json!("not an object"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected object"));
        assert_eq!(diagnostics[0].attribute, None);
    }
}
