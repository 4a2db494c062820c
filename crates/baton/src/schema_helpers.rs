//! JSON Schema helpers for schemars-derived tool parameters.

use crate::types::tool::ToolSchema;

/// Generate a tool input schema from a `JsonSchema` type.
///
/// Uses draft-07 with inlined subschemas so clients that do not resolve
/// `$ref` still see every property.
pub fn schema_for<T: schemars::JsonSchema>() -> ToolSchema {
    let settings = schemars::generate::SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
    });
    let generator = settings.into_generator();
    let schema = generator.into_root_schema_for::<T>();
    let value = serde_json::to_value(&schema).unwrap_or_default();
    ToolSchema::from_value(value)
}
