//! Weighted-evidence aggregation over the six scanners.

use super::scanners::{
    EnvScanner, FileScanner, HttpScanner, Indicator, PackageScanner, PortScanner,
    ProcessScanner, Scanner,
};
use super::{DetectionResult, Evidence, EvidenceCategory};
use crate::config::{CategoryWeights, ObsConfig};
use crate::runtime::{ContainerRuntime, HttpClient, RuntimeError, Target};
use crate::stack::Framework;
use crate::util::batch::run_isolated;
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Priority among equal top scores: more specific frameworks first.
pub const TIE_BREAK_ORDER: &[Framework] = &[
    Framework::NestJs,
    Framework::SpringBoot,
    Framework::Django,
    Framework::FastApi,
    Framework::Flask,
    Framework::Express,
];

const SCORE_EPSILON: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("target not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Runtime(RuntimeError),

    #[error("detection of {target} exceeded {}s", .timeout.as_secs())]
    Timeout { target: String, timeout: Duration },

    #[error("detection of {target} aborted: {message}")]
    Aborted { target: String, message: String },
}

impl From<RuntimeError> for DetectError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::NotFound(id) => DetectError::NotFound(id),
            other => DetectError::Runtime(other),
        }
    }
}

/// Outcome of combining evidence, before target identity is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub framework: Framework,
    pub confidence: f64,
    pub version: Option<String>,
}

impl Classification {
    fn unknown() -> Self {
        Self {
            framework: Framework::Unknown,
            confidence: 0.0,
            version: None,
        }
    }
}

/// Sums `score × weight` per framework across categories and picks the maximum.
/// Ties within [`SCORE_EPSILON`] resolve by [`TIE_BREAK_ORDER`], so the result
/// depends only on the evidence, never on iteration order.
pub fn combine(
    evidence: &BTreeMap<EvidenceCategory, Evidence>,
    weights: &CategoryWeights,
) -> Classification {
    let mut totals: BTreeMap<Framework, f64> = BTreeMap::new();
    let mut versions: BTreeMap<Framework, &str> = BTreeMap::new();

    for (category, found) in evidence {
        let weight = weights.get(*category);
        for (framework, score) in &found.scores {
            let contribution = score * weight;
            if contribution > 0.0 {
                *totals.entry(*framework).or_insert(0.0) += contribution;
            }
        }
        for (framework, version) in &found.versions {
            versions.entry(*framework).or_insert(version.as_str());
        }
    }

    let Some(best) = totals.values().copied().reduce(f64::max) else {
        return Classification::unknown();
    };

    let Some(framework) = TIE_BREAK_ORDER
        .iter()
        .copied()
        .find(|fw| totals.get(fw).is_some_and(|s| best - s <= SCORE_EPSILON))
    else {
        return Classification::unknown();
    };

    Classification {
        framework,
        confidence: best.min(1.0),
        version: versions.get(&framework).map(|v| v.to_string()),
    }
}

/// Runs every scanner against a target and classifies the result.
///
/// Cheap to clone; clones share the scanners and the runtime handle.
#[derive(Clone)]
pub struct FrameworkDetector {
    runtime: Arc<dyn ContainerRuntime>,
    scanners: Arc<Vec<Box<dyn Scanner>>>,
    weights: CategoryWeights,
    probe_timeout: Duration,
    target_timeout: Duration,
    max_concurrency: usize,
}

impl FrameworkDetector {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        http: Arc<dyn HttpClient>,
        config: &ObsConfig,
    ) -> Self {
        let scanners: Vec<Box<dyn Scanner>> = vec![
            Box::new(PackageScanner),
            Box::new(FileScanner),
            Box::new(ProcessScanner),
            Box::new(EnvScanner),
            Box::new(HttpScanner::new(http)),
            Box::new(PortScanner),
        ];

        Self {
            runtime,
            scanners: Arc::new(scanners),
            weights: config.weights,
            probe_timeout: config.probe_timeout(),
            target_timeout: config.target_timeout(),
            max_concurrency: config.max_concurrency,
        }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    pub fn weights(&self) -> &CategoryWeights {
        &self.weights
    }

    /// Detects the framework of one target under the per-target deadline.
    pub async fn detect(&self, target_id: &str) -> Result<DetectionResult, DetectError> {
        let work = async {
            let target = Target::open(self.runtime.clone(), target_id, self.probe_timeout).await?;
            Ok::<_, DetectError>(self.detect_target(&target).await)
        };

        match tokio::time::timeout(self.target_timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(target_id, timeout_secs = self.target_timeout.as_secs(), "Detection timed out");
                Err(DetectError::Timeout {
                    target: target_id.to_string(),
                    timeout: self.target_timeout,
                })
            }
        }
    }

    /// Detection against an already opened target. Never fails: scanners that
    /// cannot run contribute nothing.
    pub async fn detect_target(&self, target: &Target) -> DetectionResult {
        let started = Instant::now();

        let evidence: BTreeMap<EvidenceCategory, Evidence> = join_all(
            self.scanners
                .iter()
                .map(|scanner| async move { (scanner.category(), scanner.scan(target).await) }),
        )
        .await
        .into_iter()
        .collect();

        let classification = combine(&evidence, &self.weights);

        info!(
            target_id = %target.id(),
            target_name = %target.name(),
            framework = %classification.framework,
            confidence = classification.confidence,
            version = classification.version.as_deref().unwrap_or("-"),
            duration_ms = started.elapsed().as_millis() as u64,
            "Detection complete"
        );

        DetectionResult {
            target_id: target.id().to_string(),
            target_name: target.name().to_string(),
            language: classification.framework.language(),
            framework: classification.framework,
            version: classification.version,
            confidence: classification.confidence,
            evidence,
            detected_at: chrono::Utc::now(),
        }
    }

    /// Detects every id independently. One target's failure or panic is recorded
    /// against that id and never affects the others.
    pub async fn detect_many(
        &self,
        target_ids: &[String],
    ) -> BTreeMap<String, Result<DetectionResult, DetectError>> {
        let results = run_isolated(target_ids.to_vec(), self.max_concurrency, |id| {
            let detector = self.clone();
            async move { detector.detect(&id).await }
        })
        .await;

        results
            .into_iter()
            .map(|(id, outcome)| {
                let result = outcome.unwrap_or_else(|message| {
                    Err(DetectError::Aborted {
                        target: id.clone(),
                        message,
                    })
                });
                (id, result)
            })
            .collect()
    }

    /// [`Self::detect_many`] over every running target.
    pub async fn detect_all(
        &self,
    ) -> Result<BTreeMap<String, Result<DetectionResult, DetectError>>, DetectError> {
        let ids: Vec<String> = self
            .runtime
            .list_targets()
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect();
        Ok(self.detect_many(&ids).await)
    }

    /// Every lookup table the scanners consult.
    pub fn indicators(&self) -> Vec<Indicator> {
        self.scanners.iter().flat_map(|s| s.indicators()).collect()
    }
}
