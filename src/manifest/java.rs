//! pom.xml and Gradle build scripts

use super::{Dependency, ManifestError};
use regex::Regex;
use roxmltree::{Document, Node};
use std::collections::HashSet;
use std::sync::OnceLock;

fn child_text<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<&'a str> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == tag)
        .and_then(|c| c.text())
        .map(str::trim)
}

fn coordinate(node: Node<'_, '_>) -> Option<Dependency> {
    let group = child_text(node, "groupId")?;
    let artifact = child_text(node, "artifactId")?;
    Some(Dependency::new(
        format!("{}:{}", group, artifact),
        child_text(node, "version").map(String::from),
    ))
}

/// Declared `<dependency>` coordinates plus the `<parent>` (where Spring Boot usually
/// pins its version), as `group:artifact`.
pub fn parse_pom(content: &str) -> Result<Vec<Dependency>, ManifestError> {
    let doc = Document::parse(content)?;
    let root = doc.root_element();
    if root.tag_name().name() != "project" {
        return Err(ManifestError::Structure(format!(
            "expected <project> root, found <{}>",
            root.tag_name().name()
        )));
    }

    let mut seen = HashSet::new();
    let mut deps = Vec::new();

    let parent = root
        .children()
        .find(|c| c.is_element() && c.tag_name().name() == "parent");
    let declared = root
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "dependency");

    for node in parent.into_iter().chain(declared) {
        if let Some(dep) = coordinate(node) {
            if seen.insert(dep.name.clone()) {
                deps.push(dep);
            }
        }
    }

    Ok(deps)
}

fn gradle_dependency_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?:implementation|api|compileOnly|runtimeOnly|testImplementation|developmentOnly)\s*\(?\s*["']([^:"']+):([^:"']+)(?::([^"']*))?["']"#,
        )
        .unwrap()
    })
}

fn gradle_plugin_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"id\s*\(?\s*["']([\w.-]+)["']\s*\)?\s*version\s*["']([^"']+)["']"#).unwrap()
    })
}

/// Dependency and plugin declarations from a Groovy or Kotlin DSL build script.
pub fn parse_gradle(content: &str) -> Vec<Dependency> {
    let mut seen = HashSet::new();
    let mut deps = Vec::new();

    for caps in gradle_plugin_re().captures_iter(content) {
        let name = caps[1].to_string();
        if seen.insert(name.clone()) {
            deps.push(Dependency::new(name, Some(caps[2].to_string())));
        }
    }

    for caps in gradle_dependency_re().captures_iter(content) {
        let name = format!("{}:{}", &caps[1], &caps[2]);
        if seen.insert(name.clone()) {
            let version = caps
                .get(3)
                .map(|v| v.as_str().trim().to_string())
                .filter(|v| !v.is_empty());
            deps.push(Dependency::new(name, version));
        }
    }

    deps
}
