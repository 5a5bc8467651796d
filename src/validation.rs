//! Schema validation helpers.
//!
//! Validates a `serde_json::Value` state document against a [`Schema`],
//! producing [`Diagnostic`]s for anything a host would reject: missing
//! required attributes, type mismatches, and nested-block cardinality.

use serde_json::Value;

use crate::schema::{
    Attribute, AttributeType, Block, BlockNestingMode, Diagnostic, NestedBlock, Schema,
};

/// Validate a JSON value against a schema.
///
/// Returns a list of diagnostics for any validation errors found; an
/// empty list means the value is valid. Computed-only attributes are
/// skipped, since the provider fills those in.
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// Validate a JSON value against a schema, returning `Err` with the
/// diagnostics when anything is invalid.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        // Null is valid for an optional block; nothing more to check.
        Value::Null => return,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value))),
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
    // Computed-only attributes are set by the provider.
    if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            // An env-default or static default satisfies a required
            // attribute at resolution time.
            if attr.flags.required && attr.env_default.is_none() && attr.default.is_none() {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
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
            if value.as_i64().is_none() {
                diagnostics.push(type_error(path, "int64", value));
            }
        }
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        }
        AttributeType::List(element) | AttributeType::Set(element) => {
            if let Some(arr) = value.as_array() {
                for (i, elem) in arr.iter().enumerate() {
                    validate_attribute_type(element, elem, &format!("{}.{}", path, i), diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "list", value));
            }
        }
        AttributeType::Map(element) => {
            if let Some(obj) = value.as_object() {
                for (key, val) in obj {
                    validate_attribute_type(element, val, &format!("{}.{}", path, key), diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "map", value));
            }
        }
    }
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
                            .with_attribute(path),
                    );
                }
            }
            Some(v) => validate_block(&nested.block, v, path, diagnostics),
        },
        BlockNestingMode::List | BlockNestingMode::Set => match value {
            None | Some(Value::Null) => {
                if nested.min_items > 0 {
                    diagnostics.push(
                        Diagnostic::error(format!(
                            "Block '{}' requires at least {} item(s)",
                            path, nested.min_items
                        ))
                        .with_attribute(path),
                    );
                }
            }
            Some(Value::Array(arr)) => {
                let len = arr.len() as u32;
                if len < nested.min_items {
                    diagnostics.push(
                        Diagnostic::error(format!(
                            "Block '{}' requires at least {} item(s), got {}",
                            path, nested.min_items, len
                        ))
                        .with_attribute(path),
                    );
                }
                if nested.max_items > 0 && len > nested.max_items {
                    diagnostics.push(
                        Diagnostic::error(format!(
                            "Block '{}' allows at most {} item(s), got {}",
                            path, nested.max_items, len
                        ))
                        .with_attribute(path),
                    );
                }
                for (i, item) in arr.iter().enumerate() {
                    validate_block(&nested.block, item, &format!("{}.{}", path, i), diagnostics);
                }
            }
            Some(v) => {
                diagnostics.push(
                    Diagnostic::error(format!("Expected list for block '{}'", path))
                        .with_detail(format!("Got {}", value_type_name(v)))
                        .with_attribute(path),
                );
            }
        },
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

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}
