use super::{Indicator, Scanner};
use crate::detection::{Evidence, EvidenceCategory};
use crate::runtime::Target;
use crate::stack::SignatureRegistry;
use async_trait::async_trait;

const ENV_WEIGHT: f64 = 0.4;

/// Matches declared environment variable names against each signature's keys.
/// Values are never inspected.
#[derive(Debug, Default)]
pub struct EnvScanner;

#[async_trait]
impl Scanner for EnvScanner {
    fn category(&self) -> EvidenceCategory {
        EvidenceCategory::Env
    }

    async fn try_scan(&self, target: &Target) -> anyhow::Result<Evidence> {
        let mut evidence = Evidence::new();
        for (key, _) in &target.info().env {
            for signature in SignatureRegistry::global().all() {
                if signature.env_keys.iter().any(|k| *k == key.as_str()) {
                    evidence.add(signature.framework, ENV_WEIGHT);
                }
            }
        }
        Ok(evidence)
    }

    fn indicators(&self) -> Vec<Indicator> {
        SignatureRegistry::global()
            .all()
            .flat_map(|sig| {
                sig.env_keys
                    .iter()
                    .map(move |key| Indicator::new(self.category(), sig.framework, *key, ENV_WEIGHT))
            })
            .collect()
    }
}
