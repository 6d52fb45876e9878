//! requirements.txt, Pipfile and pyproject.toml

use super::{Dependency, ManifestError};
use crate::stack::signature::normalize_package_name;
use crate::stack::Language;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Header line written above dependencies appended by the instrumentor.
pub const APPENDED_BLOCK_HEADER: &str = "# obsinject: OpenTelemetry";

fn requirement_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)\s*(?:\[[^\]]*\])?\s*([^;]*)").unwrap()
    })
}

/// Parses a single PEP 508 requirement (`Flask[async]>=2.3; python_version>"3.8"`).
pub fn parse_requirement(line: &str) -> Option<Dependency> {
    let caps = requirement_re().captures(line.trim())?;
    let name = caps.get(1)?.as_str().to_string();
    let spec = caps
        .get(2)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());
    Some(Dependency::new(name, spec))
}

/// Line-oriented requirements file. Options (`-r`, `-e`, `--index-url`), comments and
/// direct URLs are skipped rather than treated as errors.
pub fn parse_requirements(content: &str) -> Vec<Dependency> {
    let mut seen = HashSet::new();
    let mut deps = Vec::new();

    for raw in content.lines() {
        let line = match raw.find(" #") {
            Some(idx) => &raw[..idx],
            None => raw,
        }
        .trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with('-') || line.contains("://") {
            continue;
        }

        if let Some(dep) = parse_requirement(line) {
            if seen.insert(normalize_package_name(Language::Python, &dep.name)) {
                deps.push(dep);
            }
        }
    }

    deps
}

fn toml_table_dependencies(table: &toml::value::Table, deps: &mut Vec<Dependency>) {
    for (name, value) in table {
        if name == "python" {
            continue;
        }
        let version = match value {
            toml::Value::String(s) => Some(s.clone()),
            toml::Value::Table(t) => t.get("version").and_then(|v| v.as_str()).map(String::from),
            _ => None,
        };
        deps.push(Dependency::new(name.clone(), version));
    }
}

pub fn parse_pipfile(content: &str) -> Result<Vec<Dependency>, ManifestError> {
    let parsed: toml::Value = toml::from_str(content)?;
    let mut deps = Vec::new();

    for section in ["packages", "dev-packages"] {
        if let Some(table) = parsed.get(section).and_then(|v| v.as_table()) {
            toml_table_dependencies(table, &mut deps);
        }
    }

    Ok(deps)
}

/// PEP 621 `[project] dependencies` and Poetry's `[tool.poetry.dependencies]`.
pub fn parse_pyproject(content: &str) -> Result<Vec<Dependency>, ManifestError> {
    let parsed: toml::Value = toml::from_str(content)?;
    let mut deps = Vec::new();

    if let Some(list) = parsed
        .get("project")
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.as_array())
    {
        deps.extend(
            list.iter()
                .filter_map(|v| v.as_str())
                .filter_map(parse_requirement),
        );
    }

    if let Some(poetry) = parsed
        .get("tool")
        .and_then(|t| t.get("poetry"))
        .and_then(|p| p.as_table())
    {
        for section in ["dependencies", "dev-dependencies"] {
            if let Some(table) = poetry.get(section).and_then(|d| d.as_table()) {
                toml_table_dependencies(table, &mut deps);
            }
        }
    }

    Ok(deps)
}

/// Appends the requirements not already declared. Returns `None` when every
/// requirement is present, so callers can skip the write entirely.
pub fn append_requirements(existing: &str, additions: &[&str]) -> Option<String> {
    let declared: HashSet<String> = parse_requirements(existing)
        .iter()
        .map(|d| normalize_package_name(Language::Python, &d.name))
        .collect();

    let missing: Vec<&str> = additions
        .iter()
        .copied()
        .filter(|req| {
            parse_requirement(req)
                .map(|d| !declared.contains(&normalize_package_name(Language::Python, &d.name)))
                .unwrap_or(false)
        })
        .collect();

    if missing.is_empty() {
        return None;
    }

    let mut updated = existing.trim_end().to_string();
    if !updated.is_empty() {
        updated.push_str("\n\n");
    }
    updated.push_str(APPENDED_BLOCK_HEADER);
    updated.push('\n');
    for req in missing {
        updated.push_str(req);
        updated.push('\n');
    }
    Some(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requirements() {
        let content = r#"
# web
Flask==2.3.0
requests>=2.31  # http client
gunicorn
-r base.txt
-e git+https://github.com/org/lib.git#egg=lib
uvicorn[standard]~=0.24.0 ; python_version >= "3.8"
"#;
        let deps = parse_requirements(content);
        let names: Vec<_> = deps.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Flask", "requests", "gunicorn", "uvicorn"]);
        assert_eq!(deps[0].version.as_deref(), Some("==2.3.0"));
        assert_eq!(deps[1].version.as_deref(), Some(">=2.31"));
        assert_eq!(deps[2].version, None);
        assert_eq!(deps[3].version_number().as_deref(), Some("0.24.0"));
    }

    #[test]
    fn test_parse_requirements_dedupes_normalized_names() {
        let deps = parse_requirements("Flask==2.0\nflask==2.1\n");
        assert_eq!(deps.len(), 1);
    }

    #[test]
    fn test_parse_pipfile() {
        let content = r#"
[[source]]
url = "https://pypi.org/simple"

[packages]
django = "==4.2.7"
celery = {version = ">=5.3", extras = ["redis"]}

[dev-packages]
pytest = "*"

[requires]
python_version = "3.11"
"#;
        let deps = parse_pipfile(content).unwrap();
        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0], Dependency::new("celery", Some(">=5.3".to_string())));
        assert!(deps.iter().any(|d| d.name == "django"
            && d.version_number().as_deref() == Some("4.2.7")));
    }

    #[test]
    fn test_parse_pipfile_rejects_invalid_toml() {
        assert!(parse_pipfile("[packages\nflask = ").is_err());
    }

    #[test]
    fn test_parse_pyproject_pep621_and_poetry() {
        let pep621 = r#"
[project]
name = "svc"
dependencies = ["fastapi>=0.104.1", "uvicorn[standard]"]
"#;
        let deps = parse_pyproject(pep621).unwrap();
        assert_eq!(deps[0].name, "fastapi");
        assert_eq!(deps[0].version_number().as_deref(), Some("0.104.1"));

        let poetry = r#"
[tool.poetry.dependencies]
python = "^3.11"
flask = "^3.0.0"
"#;
        let deps = parse_pyproject(poetry).unwrap();
        assert_eq!(deps, vec![Dependency::new("flask", Some("^3.0.0".to_string()))]);
    }

    #[test]
    fn test_append_requirements_only_adds_missing() {
        let existing = "Flask==2.3.0\nopentelemetry-api>=1.21.0\n";
        let updated = append_requirements(
            existing,
            &["opentelemetry-api>=1.21.0", "opentelemetry-sdk>=1.21.0"],
        )
        .unwrap();

        assert!(updated.starts_with("Flask==2.3.0\nopentelemetry-api>=1.21.0\n\n"));
        assert!(updated.contains(APPENDED_BLOCK_HEADER));
        assert_eq!(updated.matches("opentelemetry-api").count(), 1);
        assert_eq!(updated.matches("opentelemetry-sdk").count(), 1);
    }

    #[test]
    fn test_append_requirements_is_idempotent() {
        let first = append_requirements("flask\n", &["opentelemetry-sdk>=1.21.0"]).unwrap();
        assert_eq!(append_requirements(&first, &["opentelemetry-sdk>=1.21.0"]), None);
    }

    #[test]
    fn test_append_requirements_to_empty_file() {
        let created = append_requirements("", &["opentelemetry-api>=1.21.0"]).unwrap();
        assert_eq!(
            created,
            format!("{}\nopentelemetry-api>=1.21.0\n", APPENDED_BLOCK_HEADER)
        );
    }
}
