//! The six signal scanners.
//!
//! A scanner inspects one surface of one target. Scanners fail closed: whatever
//! goes wrong inside [`Scanner::try_scan`] is logged at debug level and turned into
//! empty evidence by [`Scanner::scan`], so one broken probe never aborts detection.

pub mod env;
pub mod file;
pub mod http;
pub mod package;
pub mod port;
pub mod process;

pub use env::EnvScanner;
pub use file::FileScanner;
pub use http::HttpScanner;
pub use package::PackageScanner;
pub use port::PortScanner;
pub use process::ProcessScanner;

use super::{Evidence, EvidenceCategory};
use crate::runtime::Target;
use crate::stack::Framework;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Instant;
use tracing::debug;

/// One entry of a scanner's lookup table, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Indicator {
    pub category: EvidenceCategory,
    pub framework: Framework,
    pub indicator: String,
    pub weight: f64,
}

impl Indicator {
    pub fn new(
        category: EvidenceCategory,
        framework: Framework,
        indicator: impl Into<String>,
        weight: f64,
    ) -> Self {
        Self {
            category,
            framework,
            indicator: indicator.into(),
            weight,
        }
    }
}

#[async_trait]
pub trait Scanner: Send + Sync {
    fn category(&self) -> EvidenceCategory;

    async fn try_scan(&self, target: &Target) -> anyhow::Result<Evidence>;

    fn indicators(&self) -> Vec<Indicator>;

    async fn scan(&self, target: &Target) -> Evidence {
        let started = Instant::now();
        match self.try_scan(target).await {
            Ok(evidence) => {
                debug!(
                    target_id = %target.id(),
                    scanner = %self.category(),
                    hits = evidence.scores.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "scan complete"
                );
                evidence
            }
            Err(e) => {
                debug!(
                    target_id = %target.id(),
                    scanner = %self.category(),
                    error = %e,
                    "scanner failed, contributing no evidence"
                );
                Evidence::default()
            }
        }
    }
}
