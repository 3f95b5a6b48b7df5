//! Schema types for describing provider and resource structure.
//!
//! Schemas are the contract exposed to the host: attribute names, types,
//! required/optional/computed/sensitive flags, defaults and allowed values.
//! The provider also uses them to normalize proposed state before planning.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The type of an attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// A string value.
    String,
    /// A 64-bit integer.
    Int64,
    /// A boolean value.
    Bool,
    /// A list of values of a single type.
    List(Box<AttributeType>),
}

impl AttributeType {
    /// Create a list type.
    pub fn list(element_type: AttributeType) -> Self {
        Self::List(Box::new(element_type))
    }
}

/// Describes how an attribute can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// The attribute is required in configuration.
    pub required: bool,
    /// The attribute is optional in configuration.
    pub optional: bool,
    /// The attribute is computed by the provider (read-only).
    pub computed: bool,
    /// The attribute is sensitive and should be hidden in logs/UI.
    pub sensitive: bool,
}

impl AttributeFlags {
    /// Create flags for a required attribute.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    /// Create flags for an optional attribute.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    /// Create flags for a computed attribute (read-only, set by provider).
    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Default::default()
        }
    }
}

/// A transformation applied to a configured value before it is stored in state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalizer {
    /// Strip leading and trailing whitespace (PEM material pasted from heredocs).
    TrimSpace,
}

impl Normalizer {
    /// Apply the normalizer to a value. Non-matching types pass through.
    pub fn apply(self, value: Value) -> Value {
        match (self, value) {
            (Normalizer::TrimSpace, Value::String(s)) => Value::String(s.trim().to_string()),
            (_, other) => other,
        }
    }
}

/// Describes a single attribute in a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// The type of the attribute.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Flags describing how the attribute can be used.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Human-readable description of the attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// If set, changing this attribute forces resource replacement.
    #[serde(default)]
    pub force_new: bool,
    /// Default value for the attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// The only values the attribute may take. Empty means unrestricted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<Value>,
    /// Normalization applied to configured values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalizer: Option<Normalizer>,
}

impl Attribute {
    /// Create a new attribute with the given type and flags.
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
            force_new: false,
            default: None,
            allowed_values: Vec::new(),
            normalizer: None,
        }
    }

    /// Create a required string attribute.
    pub fn required_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::required())
    }

    /// Create an optional string attribute.
    pub fn optional_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional())
    }

    /// Create a computed string attribute.
    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::computed())
    }

    /// Create a required int64 attribute.
    pub fn required_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::required())
    }

    /// Create an optional int64 attribute.
    pub fn optional_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::optional())
    }

    /// Create an optional bool attribute.
    pub fn optional_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional())
    }

    /// Set the description for this attribute.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark this attribute as forcing resource replacement when changed.
    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Set a default value for this attribute.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Restrict the attribute to the given values.
    pub fn with_allowed_values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Normalize configured values with `normalizer`.
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Mark this attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }
}

/// The nesting mode for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockNestingMode {
    /// A single nested block (at most one).
    #[default]
    Single,
    /// A list of nested blocks (zero or more, ordered).
    List,
    /// A set of nested blocks (zero or more, unordered, unique).
    Set,
}

/// A nested block within a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Block {
    /// The attributes within this block.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Attribute>,
    /// Nested blocks within this block.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub blocks: BTreeMap<String, NestedBlock>,
    /// Human-readable description of the block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Block {
    /// Create a new empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute to this block.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block to this block.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.blocks.insert(name.into(), block);
        self
    }

    /// Set the description for this block.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether `name` is an attribute or nested block of this block.
    pub fn has_field(&self, name: &str) -> bool {
        self.attributes.contains_key(name) || self.blocks.contains_key(name)
    }

    /// Normalize an object against this block.
    ///
    /// Drops `null` and empty-string members, fills in defaults, applies
    /// attribute normalizers, and turns absent list/set blocks into empty
    /// arrays. Non-object values are returned untouched.
    ///
    /// An empty string counts as unset, the same way the API reports an
    /// optional field nobody configured.
    pub fn normalize(&self, value: Value) -> Value {
        let mut obj = match value {
            Value::Object(obj) => obj,
            other => return other,
        };

        obj.retain(|_, v| !is_unset(v));

        for (name, attr) in &self.attributes {
            let value = obj.remove(name).map(|v| match attr.normalizer {
                Some(normalizer) => normalizer.apply(v),
                None => v,
            });
            match value.filter(|v| !is_unset(v)) {
                Some(v) => {
                    obj.insert(name.clone(), v);
                }
                None => {
                    if let Some(default) = &attr.default {
                        obj.insert(name.clone(), default.clone());
                    }
                }
            }
        }

        for (name, nested) in &self.blocks {
            let normalized = match (obj.remove(name), nested.nesting_mode) {
                (Some(Value::Array(items)), BlockNestingMode::List | BlockNestingMode::Set) => {
                    Value::Array(
                        items
                            .into_iter()
                            .map(|item| nested.block.normalize(item))
                            .collect(),
                    )
                }
                (None, BlockNestingMode::List | BlockNestingMode::Set) => Value::Array(Vec::new()),
                (Some(item), BlockNestingMode::Single) => nested.block.normalize(item),
                (None, BlockNestingMode::Single) => continue,
                (Some(other), _) => other,
            };
            obj.insert(name.clone(), normalized);
        }

        Value::Object(obj)
    }
}

fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// A nested block with its nesting mode and constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedBlock {
    /// The block definition.
    #[serde(flatten)]
    pub block: Block,
    /// How the block is nested (single, list, set).
    #[serde(default)]
    pub nesting_mode: BlockNestingMode,
    /// Minimum number of blocks required.
    #[serde(default)]
    pub min_items: u32,
    /// Maximum number of blocks allowed (0 = unlimited).
    #[serde(default)]
    pub max_items: u32,
}

impl NestedBlock {
    fn with_mode(block: Block, nesting_mode: BlockNestingMode, max_items: u32) -> Self {
        Self {
            block,
            nesting_mode,
            min_items: 0,
            max_items,
        }
    }

    /// Create a single nested block (0 or 1 allowed).
    pub fn single(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::Single, 1)
    }

    /// Create a list of nested blocks.
    pub fn list(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::List, 0)
    }

    /// Create a set of nested blocks.
    pub fn set(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::Set, 0)
    }

    /// Set the minimum number of blocks required.
    pub fn with_min_items(mut self, min: u32) -> Self {
        self.min_items = min;
        self
    }
}

/// Schema for a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// The version of this schema (for state upgrades).
    #[serde(default)]
    pub version: u64,
    /// The root block containing all attributes and nested blocks.
    #[serde(flatten)]
    pub block: Block,
}

impl Schema {
    /// Create a new schema with the given version.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            block: Block::new(),
        }
    }

    /// Create a schema at version 0.
    pub fn v0() -> Self {
        Self::new(0)
    }

    /// Add an attribute to the schema.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.block.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block to the schema.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.block.blocks.insert(name.into(), block);
        self
    }

    /// Normalize a state object against the root block. See [`Block::normalize`].
    pub fn normalize(&self, value: Value) -> Value {
        self.block.normalize(value)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::v0()
    }
}

/// Schema for the provider configuration and every resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    /// Schema for provider configuration.
    #[serde(default)]
    pub provider: Schema,
    /// Schemas for each resource type.
    #[serde(default)]
    pub resources: BTreeMap<String, Schema>,
}

impl ProviderSchema {
    /// Create a new empty provider schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider configuration schema.
    pub fn with_provider_config(mut self, schema: Schema) -> Self {
        self.provider = schema;
        self
    }

    /// Add a resource schema.
    pub fn with_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(name.into(), schema);
        self
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// An error that prevents the operation from completing.
    Error,
    /// A warning that doesn't prevent the operation but should be addressed.
    Warning,
}

/// A diagnostic message from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity of the diagnostic.
    pub severity: DiagnosticSeverity,
    /// A short summary of the issue.
    pub summary: String,
    /// A detailed description of the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The attribute path where the issue occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Add detail to this diagnostic.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the attribute path for this diagnostic.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Whether this diagnostic is an error.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn endpoint_block() -> Block {
        Block::new()
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "use_tls",
                Attribute::optional_bool().with_default(json!(false)),
            )
            .with_attribute(
                "tls_ca_cert",
                Attribute::optional_string()
                    .sensitive()
                    .with_normalizer(Normalizer::TrimSpace),
            )
    }

    #[test]
    fn test_attribute_builders() {
        let attr = Attribute::required_string()
            .with_description("Target service")
            .with_force_new();
        assert_eq!(attr.attr_type, AttributeType::String);
        assert!(attr.flags.required);
        assert!(attr.force_new);

        let attr = Attribute::optional_int64()
            .with_default(json!(2))
            .with_allowed_values([1, 2]);
        assert_eq!(attr.default, Some(json!(2)));
        assert_eq!(attr.allowed_values, vec![json!(1), json!(2)]);

        let attr = Attribute::optional_string().sensitive();
        assert!(attr.flags.sensitive);
        assert!(attr.flags.optional);
    }

    #[test]
    fn test_normalize_applies_defaults_and_trims() {
        let block = endpoint_block();
        let normalized = block.normalize(json!({
            "name": "kafka",
            "tls_ca_cert": "\n-----BEGIN CERTIFICATE-----\n...\n-----END CERTIFICATE-----\n\n",
            "user": null
        }));

        assert_eq!(
            normalized,
            json!({
                "name": "kafka",
                "use_tls": false,
                "tls_ca_cert": "-----BEGIN CERTIFICATE-----\n...\n-----END CERTIFICATE-----"
            })
        );
    }

    #[test]
    fn test_normalize_treats_empty_strings_as_unset() {
        let normalized = endpoint_block().normalize(json!({
            "name": "kafka",
            "user": "",
            "tls_ca_cert": " \n "
        }));
        assert_eq!(normalized, json!({"name": "kafka", "use_tls": false}));
    }

    #[test]
    fn test_normalize_keeps_explicit_values() {
        let normalized = endpoint_block().normalize(json!({"name": "kafka", "use_tls": true}));
        assert_eq!(normalized["use_tls"], true);
    }

    #[test]
    fn test_normalize_nested_sets() {
        let schema = Schema::v0()
            .with_attribute("service_id", Attribute::required_string())
            .with_block("logging_kafka", NestedBlock::set(endpoint_block()));

        let normalized = schema.normalize(json!({"service_id": "abc"}));
        assert_eq!(normalized["logging_kafka"], json!([]));

        let normalized = schema.normalize(json!({
            "service_id": "abc",
            "logging_kafka": [{"name": "one"}, {"name": "two", "use_tls": true}]
        }));
        assert_eq!(
            normalized["logging_kafka"],
            json!([
                {"name": "one", "use_tls": false},
                {"name": "two", "use_tls": true}
            ])
        );
    }

    #[test]
    fn test_schema_serializes_flags() {
        let schema = Schema::v0().with_attribute(
            "password",
            Attribute::optional_string().sensitive(),
        );
        let encoded = serde_json::to_value(&schema).unwrap();
        assert_eq!(encoded["attributes"]["password"]["sensitive"], true);
        assert_eq!(encoded["attributes"]["password"]["type"], "string");
    }

    #[test]
    fn test_provider_schema() {
        let provider_schema = ProviderSchema::new()
            .with_provider_config(
                Schema::v0().with_attribute("api_key", Attribute::optional_string().sensitive()),
            )
            .with_resource(
                "fastly_service_vcl",
                Schema::v0().with_attribute("id", Attribute::computed_string()),
            );

        assert!(provider_schema
            .provider
            .block
            .attributes
            .contains_key("api_key"));
        assert!(provider_schema.resources.contains_key("fastly_service_vcl"));
    }

    #[test]
    fn test_diagnostic() {
        let err = Diagnostic::error("Invalid value")
            .with_detail("Must be one of: 1, 2")
            .with_attribute("logging_kafka.0.format_version");

        assert!(err.is_error());
        assert_eq!(err.detail, Some("Must be one of: 1, 2".to_string()));
        assert!(!Diagnostic::warning("heads up").is_error());
    }

    #[test]
    fn test_nested_block_modes() {
        let single = NestedBlock::single(Block::new());
        assert_eq!(single.nesting_mode, BlockNestingMode::Single);
        assert_eq!(single.max_items, 1);

        let set = NestedBlock::set(Block::new()).with_min_items(1);
        assert_eq!(set.nesting_mode, BlockNestingMode::Set);
        assert_eq!(set.min_items, 1);
        assert_eq!(set.max_items, 0);
    }
}
