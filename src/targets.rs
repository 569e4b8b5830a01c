use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use jsonschema::JSONSchema;
use serde::Deserialize;
use serde_json::{Value, json};

/// Classes a rule applies to, with the method bodies to scan in each.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub(crate) struct ClassTarget {
    #[serde(rename = "class")]
    pub(crate) class_name: String,
    pub(crate) methods: Vec<String>,
}

/// A `name(desc)ret` method identifier cut at the first parenthesis.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct MethodTarget {
    pub(crate) name: String,
    pub(crate) descriptor: String,
}

impl MethodTarget {
    pub(crate) fn parse(identifier: &str) -> Self {
        match identifier.find('(') {
            Some(split) => MethodTarget {
                name: identifier[..split].to_string(),
                descriptor: identifier[split..].to_string(),
            },
            None => MethodTarget {
                name: identifier.to_string(),
                descriptor: String::new(),
            },
        }
    }
}

impl fmt::Display for MethodTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}

pub(crate) fn load_targets(path: &Path) -> Result<Vec<ClassTarget>> {
    let data =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_targets(&data, &path.display().to_string())
}

/// Parse a target data document, `source` naming it in errors.
pub(crate) fn parse_targets(data: &str, source: &str) -> Result<Vec<ClassTarget>> {
    let value: Value =
        serde_json::from_str(data).with_context(|| format!("failed to parse {source}"))?;
    targets_from_value(value, source)
}

pub(crate) fn targets_from_value(value: Value, source: &str) -> Result<Vec<ClassTarget>> {
    validate_targets(&value).with_context(|| format!("invalid target data in {source}"))?;
    serde_json::from_value(value).with_context(|| format!("failed to read targets from {source}"))
}

fn validate_targets(value: &Value) -> Result<()> {
    let schema = targets_schema();
    let compiled = JSONSchema::compile(&schema)
        .map_err(|err| anyhow::anyhow!("failed to compile target schema: {err}"))?;
    if let Err(errors) = compiled.validate(value) {
        let messages: Vec<String> = errors.map(|err| err.to_string()).collect();
        anyhow::bail!("{}", messages.join("; "));
    }
    Ok(())
}

fn targets_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "required": ["class", "methods"],
            "properties": {
                "class": { "type": "string", "minLength": 1 },
                "methods": {
                    "type": "array",
                    "items": { "type": "string", "minLength": 1 }
                }
            }
        }
    })
}
