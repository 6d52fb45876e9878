//! package.json

use super::{Dependency, ManifestError};
use serde_json::{Map, Value};

const DEPENDENCY_SECTIONS: &[&str] = &["dependencies", "devDependencies"];

fn parse_object(content: &str) -> Result<Map<String, Value>, ManifestError> {
    match serde_json::from_str::<Value>(content)? {
        Value::Object(map) => Ok(map),
        other => Err(ManifestError::Structure(format!(
            "package.json root must be an object, found {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn parse_package_json(content: &str) -> Result<Vec<Dependency>, ManifestError> {
    let root = parse_object(content)?;
    let mut deps = Vec::new();

    for section in DEPENDENCY_SECTIONS {
        if let Some(entries) = root.get(*section).and_then(|v| v.as_object()) {
            for (name, version) in entries {
                if deps.iter().any(|d: &Dependency| &d.name == name) {
                    continue;
                }
                deps.push(Dependency::new(
                    name.clone(),
                    version.as_str().map(String::from),
                ));
            }
        }
    }

    Ok(deps)
}

/// The `main` entry, if declared.
pub fn main_entry(content: &str) -> Option<String> {
    parse_object(content)
        .ok()?
        .get("main")
        .and_then(|v| v.as_str())
        .map(String::from)
}

/// True when the package declares `"type": "module"`, making `.js` files ES modules.
pub fn is_module_package(content: &str) -> bool {
    parse_object(content)
        .ok()
        .and_then(|root| root.get("type").and_then(|v| v.as_str()).map(|t| t == "module"))
        .unwrap_or(false)
}

/// Adds missing packages to `dependencies`, keeping existing key order. A package already
/// declared in `dependencies` or `devDependencies` is left alone. Returns `Ok(None)` when
/// nothing had to be added.
pub fn add_dependencies(
    content: &str,
    additions: &[(&str, &str)],
) -> Result<Option<String>, ManifestError> {
    let mut root = parse_object(content)?;

    let declared: Vec<String> = parse_package_json(content)?
        .into_iter()
        .map(|d| d.name)
        .collect();

    let missing: Vec<&(&str, &str)> = additions
        .iter()
        .filter(|(name, _)| !declared.iter().any(|d| d == name))
        .collect();

    if missing.is_empty() {
        return Ok(None);
    }

    let deps = root
        .entry("dependencies")
        .or_insert_with(|| Value::Object(Map::new()));
    let deps = deps.as_object_mut().ok_or_else(|| {
        ManifestError::Structure("\"dependencies\" must be an object".to_string())
    })?;

    for (name, version) in missing {
        deps.insert((*name).to_string(), Value::String((*version).to_string()));
    }

    let mut rendered = serde_json::to_string_pretty(&Value::Object(root))?;
    rendered.push('\n');
    Ok(Some(rendered))
}
