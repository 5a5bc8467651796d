//! Schema types describing provider and resource structure.
//!
//! Schemas describe the shape of the provider configuration and of each
//! resource type's declarative state. The host keys its CRUD callbacks by
//! these field maps; the provider uses them for validation, plan diffing
//! and default resolution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ProviderError;

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
    /// A set of unique values of a single type.
    Set(Box<AttributeType>),
    /// A map from string keys to values of a single type.
    Map(Box<AttributeType>),
}

impl AttributeType {
    /// Create a list type.
    pub fn list(element_type: AttributeType) -> Self {
        Self::List(Box::new(element_type))
    }

    /// Create a set type.
    pub fn set(element_type: AttributeType) -> Self {
        Self::Set(Box::new(element_type))
    }

    /// Create a map type.
    pub fn map(element_type: AttributeType) -> Self {
        Self::Map(Box::new(element_type))
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

    /// Create flags for an optional+computed attribute (can be set, but is
    /// filled in by the provider when absent).
    pub fn optional_computed() -> Self {
        Self {
            optional: true,
            computed: true,
            ..Default::default()
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
    pub default: Option<serde_json::Value>,
    /// Environment variable consulted when the attribute is absent from
    /// configuration, before `default` applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_default: Option<String>,
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
            env_default: None,
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
    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Set a default value for this attribute.
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Default the attribute from an environment variable when it is not
    /// set in configuration.
    pub fn with_env_default(mut self, var: impl Into<String>) -> Self {
        self.env_default = Some(var.into());
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
///
/// Blocks describe complex repeated structures with their own attributes
/// (e.g. the `ip_pools` entries of a subnet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// The attributes within this block.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, Attribute>,
    /// Nested blocks within this block.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub blocks: HashMap<String, NestedBlock>,
    /// Human-readable description of the block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Block {
    /// Create a new empty block.
    pub fn new() -> Self {
        Self {
            attributes: HashMap::new(),
            blocks: HashMap::new(),
            description: None,
        }
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
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
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
    /// Create a single nested block (0 or 1 allowed).
    pub fn single(block: Block) -> Self {
        Self {
            block,
            nesting_mode: BlockNestingMode::Single,
            min_items: 0,
            max_items: 1,
        }
    }

    /// Create a list of nested blocks.
    pub fn list(block: Block) -> Self {
        Self {
            block,
            nesting_mode: BlockNestingMode::List,
            min_items: 0,
            max_items: 0,
        }
    }

    /// Create a set of nested blocks.
    pub fn set(block: Block) -> Self {
        Self {
            block,
            nesting_mode: BlockNestingMode::Set,
            min_items: 0,
            max_items: 0,
        }
    }
}

/// Schema for a resource type or the provider configuration.
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

    /// Fill absent top-level attributes from their environment variable or
    /// static default.
    ///
    /// Resolution order per attribute: configured value, then the
    /// `env_default` variable when set and present in the environment,
    /// then the static `default`. Environment values are coerced to the
    /// attribute type; a value that cannot be coerced is a validation
    /// error naming the variable.
    pub fn apply_defaults(&self, value: &mut serde_json::Value) -> Result<(), ProviderError> {
        let obj = match value.as_object_mut() {
            Some(obj) => obj,
            None => return Ok(()),
        };

        for (name, attr) in &self.block.attributes {
            let missing = matches!(obj.get(name), None | Some(serde_json::Value::Null));
            if !missing {
                continue;
            }

            if let Some(var) = &attr.env_default {
                if let Ok(raw) = std::env::var(var) {
                    obj.insert(name.clone(), coerce_env_value(&attr.attr_type, var, &raw)?);
                    continue;
                }
            }

            if let Some(default) = &attr.default {
                obj.insert(name.clone(), default.clone());
            }
        }

        Ok(())
    }
}

fn coerce_env_value(
    attr_type: &AttributeType,
    var: &str,
    raw: &str,
) -> Result<serde_json::Value, ProviderError> {
    match attr_type {
        AttributeType::String => Ok(serde_json::Value::String(raw.to_string())),
        AttributeType::Int64 => raw
            .parse::<i64>()
            .map(serde_json::Value::from)
            .map_err(|_| {
                ProviderError::Validation(format!("{var} must be an integer, got {raw:?}"))
            }),
        AttributeType::Bool => raw
            .parse::<bool>()
            .map(serde_json::Value::from)
            .map_err(|_| {
                ProviderError::Validation(format!("{var} must be a boolean, got {raw:?}"))
            }),
        _ => Err(ProviderError::Validation(format!(
            "{var} cannot default a collection attribute"
        ))),
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::v0()
    }
}

/// Schema for the provider and every resource type it serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    /// Schema for provider configuration.
    #[serde(default)]
    pub provider: Schema,
    /// Schemas for each resource type.
    #[serde(default)]
    pub resources: HashMap<String, Schema>,
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_builders() {
        let attr = Attribute::required_string()
            .with_description("Owning cloud project")
            .with_env_default("OVH_PROJECT_ID")
            .force_new();

        assert_eq!(attr.attr_type, AttributeType::String);
        assert!(attr.flags.required);
        assert!(attr.force_new);
        assert_eq!(attr.env_default.as_deref(), Some("OVH_PROJECT_ID"));
    }

    #[test]
    fn test_schema_builder() {
        let schema = Schema::v0()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("status", Attribute::computed_string())
            .with_block(
                "ip_pools",
                NestedBlock::set(Block::new().with_attribute("network", Attribute::required_string())),
            );

        assert_eq!(schema.version, 0);
        assert!(schema.block.attributes.contains_key("name"));
        assert!(schema.block.blocks.contains_key("ip_pools"));
    }

    #[test]
    fn test_apply_defaults_static() {
        let schema = Schema::v0()
            .with_attribute("vlan_id", Attribute::optional_int64().with_default(json!(0)));

        let mut state = json!({});
        schema.apply_defaults(&mut state).unwrap();
        assert_eq!(state["vlan_id"], json!(0));

        // Configured values win over defaults.
        let mut state = json!({"vlan_id": 42});
        schema.apply_defaults(&mut state).unwrap();
        assert_eq!(state["vlan_id"], json!(42));
    }

    #[test]
    fn test_apply_defaults_env() {
        let schema = Schema::v0().with_attribute(
            "project_id",
            Attribute::required_string().with_env_default("TEST_SCHEMA_PROJECT_ID"),
        );

        std::env::set_var("TEST_SCHEMA_PROJECT_ID", "abcdef");
        let mut state = json!({});
        schema.apply_defaults(&mut state).unwrap();
        assert_eq!(state["project_id"], json!("abcdef"));
        std::env::remove_var("TEST_SCHEMA_PROJECT_ID");
    }

    #[test]
    fn test_apply_defaults_env_coercion() {
        let schema = Schema::v0().with_attribute(
            "ttl",
            Attribute::optional_int64()
                .with_env_default("TEST_SCHEMA_TTL")
                .with_default(json!(3600)),
        );

        std::env::set_var("TEST_SCHEMA_TTL", "300");
        let mut state = json!({});
        schema.apply_defaults(&mut state).unwrap();
        assert_eq!(state["ttl"], json!(300));

        std::env::set_var("TEST_SCHEMA_TTL", "not-a-number");
        let mut state = json!({});
        let err = schema.apply_defaults(&mut state).unwrap_err();
        assert!(format!("{}", err).contains("TEST_SCHEMA_TTL"));
        std::env::remove_var("TEST_SCHEMA_TTL");
    }

    #[test]
    fn test_apply_defaults_falls_back_to_static_without_env() {
        let schema = Schema::v0().with_attribute(
            "ttl",
            Attribute::optional_int64()
                .with_env_default("TEST_SCHEMA_TTL_UNSET")
                .with_default(json!(3600)),
        );

        let mut state = json!({});
        schema.apply_defaults(&mut state).unwrap();
        assert_eq!(state["ttl"], json!(3600));
    }

    #[test]
    fn test_provider_schema() {
        let provider_schema = ProviderSchema::new()
            .with_provider_config(
                Schema::v0()
                    .with_attribute("application_secret", Attribute::optional_string().sensitive()),
            )
            .with_resource(
                "ovh_domain_record",
                Schema::v0().with_attribute("domain", Attribute::required_string()),
            );

        assert!(provider_schema
            .provider
            .block
            .attributes
            .contains_key("application_secret"));
        assert!(provider_schema.resources.contains_key("ovh_domain_record"));
    }

    #[test]
    fn test_diagnostic() {
        let err = Diagnostic::error("Invalid configuration")
            .with_detail("endpoint must be one of ovh-eu, ovh-ca")
            .with_attribute("endpoint");

        assert_eq!(err.severity, DiagnosticSeverity::Error);
        assert_eq!(err.attribute.as_deref(), Some("endpoint"));
    }
}
