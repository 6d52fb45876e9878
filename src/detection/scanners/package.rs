use super::{Indicator, Scanner};
use crate::detection::{Evidence, EvidenceCategory};
use crate::manifest::ManifestKind;
use crate::runtime::Target;
use crate::stack::{Language, SignatureRegistry};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

/// Per-manifest reliability. A structured descriptor beats a loose list.
fn manifest_weight(kind: ManifestKind) -> f64 {
    match kind {
        ManifestKind::PackageJson => 0.8,
        ManifestKind::Requirements | ManifestKind::PyProject => 0.7,
        ManifestKind::Pom | ManifestKind::Gradle | ManifestKind::GradleKts => 0.7,
        ManifestKind::Pipfile => 0.6,
    }
}

const ECOSYSTEMS: &[Language] = &[Language::Python, Language::NodeJs, Language::Java];

/// Scores declared dependencies from each manifest with that ecosystem's parser.
pub fn classify_manifest(kind: ManifestKind, content: &str) -> Result<Evidence> {
    let registry = SignatureRegistry::global();
    let deps = kind
        .parse(content)
        .with_context(|| format!("failed to parse {}", kind.file_name()))?;

    let mut evidence = Evidence::new();
    for sig in registry.by_language(kind.ecosystem()) {
        let mut matching = deps.iter().filter(|d| sig.matches_package(&d.name)).peekable();
        if matching.peek().is_none() {
            continue;
        }
        evidence.add(sig.framework, manifest_weight(kind));

        if let Some(version) = matching
            .find_map(|d| d.version_number())
            .or_else(|| registry.extract_version(sig.framework, kind.file_name(), content))
        {
            evidence.set_version(sig.framework, version);
        }
    }
    Ok(evidence)
}

#[derive(Debug, Default)]
pub struct PackageScanner;

impl PackageScanner {
    /// One ecosystem's manifests. A parse failure here is returned so the caller can
    /// drop this ecosystem alone.
    async fn scan_ecosystem(&self, target: &Target, language: Language) -> Result<Evidence> {
        let mut evidence = Evidence::new();
        for kind in ManifestKind::for_ecosystem(language) {
            let path = target.path(kind.file_name());
            if let Some(content) = target.read_file(&path).await? {
                evidence.merge(classify_manifest(kind, &content)?);
            }
        }
        Ok(evidence)
    }
}

#[async_trait]
impl Scanner for PackageScanner {
    fn category(&self) -> EvidenceCategory {
        EvidenceCategory::Package
    }

    async fn try_scan(&self, target: &Target) -> Result<Evidence> {
        let results = futures_util::future::join_all(
            ECOSYSTEMS
                .iter()
                .map(|language| async move { (*language, self.scan_ecosystem(target, *language).await) }),
        )
        .await;

        let mut evidence = Evidence::new();
        for (language, result) in results {
            match result {
                Ok(found) => evidence.merge(found),
                Err(e) => debug!(
                    target_id = %target.id(),
                    ecosystem = %language,
                    error = %format!("{:#}", e),
                    "ecosystem skipped"
                ),
            }
        }
        Ok(evidence)
    }

    fn indicators(&self) -> Vec<Indicator> {
        ManifestKind::all()
            .iter()
            .flat_map(|kind| {
                SignatureRegistry::global()
                    .by_language(kind.ecosystem())
                    .into_iter()
                    .flat_map(move |sig| {
                        sig.package_names.iter().map(move |p| {
                            Indicator::new(
                                EvidenceCategory::Package,
                                sig.framework,
                                format!("{}: {}", kind.file_name(), p),
                                manifest_weight(*kind),
                            )
                        })
                    })
            })
            .collect()
    }
}
