use super::{Evidence, EvidenceCategory};
use crate::stack::{Framework, Language};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Default threshold for [`DetectionResult::is_confident`].
pub const CONFIDENT_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub target_id: String,
    pub target_name: String,
    pub framework: Framework,
    pub language: Language,
    pub version: Option<String>,
    /// Weighted score of the winning framework, capped at 1.0
    pub confidence: f64,
    /// Raw per-scanner evidence, kept for audit
    pub evidence: BTreeMap<EvidenceCategory, Evidence>,
    pub detected_at: DateTime<Utc>,
}

impl DetectionResult {
    pub fn is_known(&self) -> bool {
        self.framework.is_known()
    }

    pub fn is_confident(&self, threshold: f64) -> bool {
        self.is_known() && self.confidence >= threshold
    }

    /// Categories that contributed anything at all.
    pub fn contributing_categories(&self) -> Vec<EvidenceCategory> {
        self.evidence
            .iter()
            .filter(|(_, e)| !e.is_empty())
            .map(|(c, _)| *c)
            .collect()
    }
}
