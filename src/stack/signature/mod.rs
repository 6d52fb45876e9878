//! Per-framework fingerprints
//!
//! Each framework module declares a single `SIGNATURE` constant. The records are plain
//! static data; regexes are compiled once by [`crate::stack::SignatureRegistry`].

use super::{Framework, Language};
use serde::Serialize;

pub mod django;
pub mod express;
pub mod fastapi;
pub mod flask;
pub mod nestjs;
pub mod spring_boot;

/// HTTP response header whose value identifies a framework (case-insensitive substring).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HeaderPattern {
    pub name: &'static str,
    pub contains: &'static str,
}

/// Regex extracting a version from a manifest's raw text. Capture group 1 is the version.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct VersionPattern {
    pub manifest: &'static str,
    pub pattern: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameworkSignature {
    pub framework: Framework,
    pub display_name: &'static str,
    pub description: &'static str,
    /// Files whose presence and content point at the framework
    pub file_names: &'static [&'static str],
    /// Dependency names as they appear in the ecosystem's manifests
    pub package_names: &'static [&'static str],
    pub env_keys: &'static [&'static str],
    pub process_patterns: &'static [&'static str],
    pub http_headers: &'static [HeaderPattern],
    /// Well-known paths served by the framework out of the box
    pub endpoints: &'static [&'static str],
    pub common_ports: &'static [u16],
    pub version_patterns: &'static [VersionPattern],
}

impl FrameworkSignature {
    pub fn language(&self) -> Language {
        self.framework.language()
    }

    /// True when `name` is one of this framework's packages. Python names are
    /// compared case-insensitively with `-`/`_`/`.` folded, as pip does. Maven
    /// coordinates (`group:artifact`) match when they contain a package name.
    pub fn matches_package(&self, name: &str) -> bool {
        let language = self.language();
        let candidate = normalize_package_name(language, name);
        self.package_names.iter().any(|p| {
            let pattern = normalize_package_name(language, p);
            match language {
                Language::Java => candidate.contains(&pattern),
                _ => candidate == pattern,
            }
        })
    }
}

pub fn normalize_package_name(language: Language, name: &str) -> String {
    match language {
        Language::Python => name
            .trim()
            .to_lowercase()
            .replace(['_', '.'], "-"),
        _ => name.trim().to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_package_normalization() {
        assert_eq!(normalize_package_name(Language::Python, "Flask"), "flask");
        assert_eq!(
            normalize_package_name(Language::Python, "Flask_SQLAlchemy"),
            "flask-sqlalchemy"
        );
        assert_eq!(
            normalize_package_name(Language::NodeJs, "@nestjs/core"),
            "@nestjs/core"
        );
    }

    #[test]
    fn test_matches_package_case_insensitive() {
        assert!(flask::SIGNATURE.matches_package("Flask"));
        assert!(flask::SIGNATURE.matches_package("flask"));
        assert!(!flask::SIGNATURE.matches_package("flask-cors"));
        assert!(nestjs::SIGNATURE.matches_package("@nestjs/core"));
    }

    #[test]
    fn test_maven_coordinates_match_by_containment() {
        assert!(spring_boot::SIGNATURE
            .matches_package("org.springframework.boot:spring-boot-starter-web"));
        assert!(!spring_boot::SIGNATURE.matches_package("org.springframework:spring-core"));
    }
}
