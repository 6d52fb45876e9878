//! Dependency manifest parsers, one per ecosystem format.
//!
//! Manifest text comes from inside an untrusted target, so every format goes through a
//! real parser (TOML, JSON, XML) rather than substring scraping. Gradle build scripts
//! are code, not data, so they get a declaration scanner instead.

pub mod java;
pub mod node;
pub mod python;

use crate::stack::Language;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("unexpected manifest structure: {0}")]
    Structure(String),
}

/// A declared dependency. `version` holds the raw specifier (`==2.3.0`, `^4.18.2`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub name: String,
    pub version: Option<String>,
}

impl Dependency {
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// First dotted version number inside the specifier, if any.
    pub fn version_number(&self) -> Option<String> {
        self.version.as_deref().and_then(version_number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ManifestKind {
    Requirements,
    Pipfile,
    PyProject,
    PackageJson,
    Pom,
    Gradle,
    GradleKts,
}

impl ManifestKind {
    pub fn all() -> &'static [ManifestKind] {
        &[
            ManifestKind::Requirements,
            ManifestKind::Pipfile,
            ManifestKind::PyProject,
            ManifestKind::PackageJson,
            ManifestKind::Pom,
            ManifestKind::Gradle,
            ManifestKind::GradleKts,
        ]
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            ManifestKind::Requirements => "requirements.txt",
            ManifestKind::Pipfile => "Pipfile",
            ManifestKind::PyProject => "pyproject.toml",
            ManifestKind::PackageJson => "package.json",
            ManifestKind::Pom => "pom.xml",
            ManifestKind::Gradle => "build.gradle",
            ManifestKind::GradleKts => "build.gradle.kts",
        }
    }

    pub fn ecosystem(&self) -> Language {
        match self {
            ManifestKind::Requirements | ManifestKind::Pipfile | ManifestKind::PyProject => {
                Language::Python
            }
            ManifestKind::PackageJson => Language::NodeJs,
            ManifestKind::Pom | ManifestKind::Gradle | ManifestKind::GradleKts => Language::Java,
        }
    }

    pub fn for_ecosystem(language: Language) -> impl Iterator<Item = ManifestKind> {
        Self::all()
            .iter()
            .copied()
            .filter(move |k| k.ecosystem() == language)
    }

    pub fn parse(&self, content: &str) -> Result<Vec<Dependency>, ManifestError> {
        match self {
            ManifestKind::Requirements => Ok(python::parse_requirements(content)),
            ManifestKind::Pipfile => python::parse_pipfile(content),
            ManifestKind::PyProject => python::parse_pyproject(content),
            ManifestKind::PackageJson => node::parse_package_json(content),
            ManifestKind::Pom => java::parse_pom(content),
            ManifestKind::Gradle | ManifestKind::GradleKts => Ok(java::parse_gradle(content)),
        }
    }
}

pub fn version_number(spec: &str) -> Option<String> {
    static VERSION_RE: OnceLock<Regex> = OnceLock::new();
    let re = VERSION_RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)+|\d+").unwrap());
    re.find(spec).map(|m| m.as_str().to_string())
}
