use crate::stack::Framework;
use serde::Serialize;
use std::collections::BTreeMap;

crate::define_id_enum! {
    /// Observable surface a scanner inspects
    EvidenceCategory {
        Package => "package" : "Package",
        File => "file" : "File",
        Process => "process" : "Process",
        Env => "env" : "Environment",
        Http => "http" : "HTTP",
        Port => "port" : "Port",
    }
}

/// One scanner's findings for one target: additive per-framework scores and,
/// separately, any versions it managed to read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Evidence {
    pub scores: BTreeMap<Framework, f64>,
    pub versions: BTreeMap<Framework, String>,
}

impl Evidence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, framework: Framework, score: f64) {
        if framework.is_known() && score > 0.0 {
            *self.scores.entry(framework).or_insert(0.0) += score;
        }
    }

    /// Keeps the first version recorded for a framework.
    pub fn set_version(&mut self, framework: Framework, version: impl Into<String>) {
        if framework.is_known() {
            self.versions.entry(framework).or_insert_with(|| version.into());
        }
    }

    /// Folds another pass of the same scanner into this one.
    pub fn merge(&mut self, other: Evidence) {
        for (framework, score) in other.scores {
            self.add(framework, score);
        }
        for (framework, version) in other.versions {
            self.set_version(framework, version);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn score(&self, framework: Framework) -> f64 {
        self.scores.get(&framework).copied().unwrap_or(0.0)
    }
}
