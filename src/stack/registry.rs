use super::signature::{self, FrameworkSignature};
use super::{Framework, Language};
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

static REGISTRY: OnceLock<SignatureRegistry> = OnceLock::new();

/// Read-only knowledge base of framework fingerprints.
///
/// Built once per process; there is no mutation path after construction.
pub struct SignatureRegistry {
    entries: Vec<RegistryEntry>,
}

struct RegistryEntry {
    signature: &'static FrameworkSignature,
    version_patterns: Vec<(&'static str, Regex)>,
}

fn signature_for(framework: Framework) -> Option<&'static FrameworkSignature> {
    match framework {
        Framework::Flask => Some(&signature::flask::SIGNATURE),
        Framework::Django => Some(&signature::django::SIGNATURE),
        Framework::FastApi => Some(&signature::fastapi::SIGNATURE),
        Framework::Express => Some(&signature::express::SIGNATURE),
        Framework::NestJs => Some(&signature::nestjs::SIGNATURE),
        Framework::SpringBoot => Some(&signature::spring_boot::SIGNATURE),
        Framework::Unknown => None,
    }
}

impl SignatureRegistry {
    pub fn global() -> &'static SignatureRegistry {
        REGISTRY.get_or_init(Self::build)
    }

    fn build() -> Self {
        let entries = Framework::all_variants()
            .iter()
            .filter_map(|fw| signature_for(*fw))
            .map(|signature| RegistryEntry {
                signature,
                version_patterns: signature
                    .version_patterns
                    .iter()
                    .filter_map(|vp| match Regex::new(vp.pattern) {
                        Ok(re) => Some((vp.manifest, re)),
                        Err(e) => {
                            warn!(
                                framework = %signature.framework,
                                pattern = vp.pattern,
                                error = %e,
                                "Skipping invalid version pattern"
                            );
                            None
                        }
                    })
                    .collect(),
            })
            .collect();

        Self { entries }
    }

    pub fn get(&self, framework: Framework) -> Option<&'static FrameworkSignature> {
        self.entries
            .iter()
            .find(|e| e.signature.framework == framework)
            .map(|e| e.signature)
    }

    /// All signatures in `Framework` declaration order.
    pub fn all(&self) -> impl Iterator<Item = &'static FrameworkSignature> + '_ {
        self.entries.iter().map(|e| e.signature)
    }

    pub fn by_language(&self, language: Language) -> Vec<&'static FrameworkSignature> {
        self.all().filter(|s| s.language() == language).collect()
    }

    /// Runs the framework's version patterns registered for `manifest` against its raw text.
    pub fn extract_version(
        &self,
        framework: Framework,
        manifest: &str,
        content: &str,
    ) -> Option<String> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.signature.framework == framework)?;

        entry
            .version_patterns
            .iter()
            .filter(|(name, _)| *name == manifest)
            .find_map(|(_, re)| re.captures(content))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Distinct candidate file names across all signatures, in first-seen order.
    pub fn candidate_files(&self) -> Vec<&'static str> {
        let mut files: Vec<&'static str> = Vec::new();
        for sig in self.all() {
            for file in sig.file_names {
                if !files.contains(file) {
                    files.push(file);
                }
            }
        }
        files
    }
}
