//! Minimal structural validation for JSON configuration files.
//!
//! Only objects and non-empty strings are supported. Messages name the
//! offending value by its `root/a/b` path.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schema {
    /// A non-empty string
    String,
    Object {
        properties: Vec<(&'static str, Schema)>,
        required: Vec<&'static str>,
    },
}

impl Schema {
    pub fn object(properties: Vec<(&'static str, Schema)>, required: Vec<&'static str>) -> Self {
        Schema::Object {
            properties,
            required,
        }
    }

    /// Object whose listed fields are all required non-empty strings
    pub fn required_strings(fields: &[&'static str]) -> Self {
        Schema::object(
            fields.iter().map(|field| (*field, Schema::String)).collect(),
            fields.to_vec(),
        )
    }
}

/// Check `data` against `schema`, returning the first violation found.
pub fn validate(name: &str, data: &Value, schema: &Schema) -> Result<(), String> {
    match schema {
        Schema::String => validate_str(name, data),
        Schema::Object {
            properties,
            required,
        } => validate_object(name, data, properties, required),
    }
}

fn validate_str(name: &str, data: &Value) -> Result<(), String> {
    match data {
        Value::String(s) if s.is_empty() => Err(format!("{}: string should not be empty", name)),
        Value::String(_) => Ok(()),
        _ => Err(format!("{}: expecting a string", name)),
    }
}

fn validate_object(
    name: &str,
    data: &Value,
    properties: &[(&'static str, Schema)],
    required: &[&'static str],
) -> Result<(), String> {
    let Value::Object(fields) = data else {
        return Err(format!("{}: a dict is required", name));
    };

    if let Some(missing) = required.iter().find(|key| !fields.contains_key(**key)) {
        return Err(format!("{}: field '{}' is required", name, missing));
    }

    for (field, field_schema) in properties {
        if let Some(value) = fields.get(*field) {
            validate(&format!("{}/{}", name, field), value, field_schema)?;
        }
    }

    if let Some(unexpected) = fields
        .keys()
        .find(|key| !properties.iter().any(|(field, _)| *field == key.as_str()))
    {
        return Err(format!("{}: field '{}' not expected", name, unexpected));
    }

    Ok(())
}
