use super::{Indicator, Scanner};
use crate::detection::{Evidence, EvidenceCategory};
use crate::runtime::Target;
use crate::stack::{FrameworkSignature, SignatureRegistry};
use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::trace;

const CONTENT_WEIGHT: f64 = 0.6;

/// Reads every candidate file named by any signature from the working directory
/// and credits a framework when the file mentions one of its package names.
#[derive(Debug, Default)]
pub struct FileScanner;

fn signatures_for_file(file: &str) -> impl Iterator<Item = &'static FrameworkSignature> + '_ {
    SignatureRegistry::global()
        .all()
        .filter(move |sig| sig.file_names.iter().any(|f| *f == file))
}

/// Credits each framework at most once per file.
pub fn classify_file(file: &str, content: &str) -> Evidence {
    let mut evidence = Evidence::new();
    let lowered = content.to_lowercase();
    for sig in signatures_for_file(file) {
        if sig
            .package_names
            .iter()
            .any(|p| lowered.contains(&p.to_lowercase()))
        {
            evidence.add(sig.framework, CONTENT_WEIGHT);
        }
    }
    evidence
}

#[async_trait]
impl Scanner for FileScanner {
    fn category(&self) -> EvidenceCategory {
        EvidenceCategory::File
    }

    async fn try_scan(&self, target: &Target) -> anyhow::Result<Evidence> {
        let files = SignatureRegistry::global().candidate_files();
        let reads = files.iter().map(|file| async move {
            let path = target.path(file);
            (*file, target.read_file(&path).await)
        });

        let mut evidence = Evidence::new();
        for (file, content) in join_all(reads).await {
            match content {
                Ok(Some(content)) => evidence.merge(classify_file(file, &content)),
                Ok(None) => {}
                Err(e) => trace!(target_id = %target.id(), file, error = %e, "file unreadable"),
            }
        }
        Ok(evidence)
    }

    fn indicators(&self) -> Vec<Indicator> {
        SignatureRegistry::global()
            .candidate_files()
            .into_iter()
            .flat_map(|file| {
                signatures_for_file(file).map(move |sig| {
                    Indicator::new(
                        self.category(),
                        sig.framework,
                        format!("{} mentions {}", file, sig.package_names.join(" | ")),
                        CONTENT_WEIGHT,
                    )
                })
            })
            .collect()
    }
}
