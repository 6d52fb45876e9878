//! Output formatting for JSON, YAML and human-readable text.
//!
//! JSON and YAML render the library types directly through serde; the human
//! formatter draws the same data as a small report.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::detection::{DetectError, DetectionResult, Indicator, CONFIDENT_THRESHOLD};
use crate::instrument::{InstrumentationResult, InstrumentationStatus};
use crate::stack::FrameworkSignature;

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";
const CHECK: &str = "\u{2713}";
const CROSS: &str = "\u{2717}";
const WARN: &str = "\u{26A0}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    Yaml,
    Human,
}

/// Per-target entry of a batch detection, flattened for serialization.
#[derive(Serialize)]
#[serde(untagged)]
enum DetectionEntry<'a> {
    Detected(&'a DetectionResult),
    Failed { error: String },
}

#[derive(Serialize)]
struct CheckReport<'a> {
    target: &'a str,
    operation: &'a str,
    success: bool,
}

#[derive(Serialize)]
struct StatusReport<'a> {
    target: &'a str,
    status: InstrumentationStatus,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn serialized<T: Serialize + ?Sized>(&self, value: &T, what: &str) -> Option<Result<String>> {
        match self.format {
            OutputFormat::Json => Some(
                serde_json::to_string_pretty(value)
                    .with_context(|| format!("Failed to serialize {} to JSON", what)),
            ),
            OutputFormat::Yaml => Some(
                serde_yaml::to_string(value).with_context(|| format!("Failed to serialize {} to YAML", what)),
            ),
            OutputFormat::Human => None,
        }
    }

    pub fn format_detection(&self, result: &DetectionResult) -> Result<String> {
        if let Some(rendered) = self.serialized(result, "detection result") {
            return rendered;
        }
        Ok(detection_human(result))
    }

    pub fn format_detections(
        &self,
        results: &BTreeMap<String, Result<DetectionResult, DetectError>>,
    ) -> Result<String> {
        let entries: BTreeMap<&str, DetectionEntry<'_>> = results
            .iter()
            .map(|(id, r)| {
                let entry = match r {
                    Ok(result) => DetectionEntry::Detected(result),
                    Err(e) => DetectionEntry::Failed { error: e.to_string() },
                };
                (id.as_str(), entry)
            })
            .collect();
        if let Some(rendered) = self.serialized(&entries, "detection results") {
            return rendered;
        }

        let mut output = String::new();
        for (id, result) in results {
            match result {
                Ok(result) => output.push_str(&detection_human(result)),
                Err(e) => output.push_str(&format!("{} {}\n{}\n\nError: {}\n", CROSS, id, RULE, e)),
            }
            output.push('\n');
        }
        output.push_str(&format!("{} target(s) scanned\n", results.len()));
        Ok(output)
    }

    pub fn format_instrumentation(&self, result: &InstrumentationResult) -> Result<String> {
        if let Some(rendered) = self.serialized(result, "instrumentation result") {
            return rendered;
        }
        Ok(instrumentation_human(result))
    }

    pub fn format_instrumentations(&self, results: &BTreeMap<String, InstrumentationResult>) -> Result<String> {
        if let Some(rendered) = self.serialized(results, "instrumentation results") {
            return rendered;
        }

        let mut output = String::new();
        for result in results.values() {
            output.push_str(&instrumentation_human(result));
            output.push('\n');
        }
        let succeeded = results.values().filter(|r| r.is_successful()).count();
        output.push_str(&format!("{}/{} target(s) instrumented\n", succeeded, results.len()));
        Ok(output)
    }

    /// Outcome of `verify` or `rollback` for one target.
    pub fn format_check(&self, target: &str, operation: &str, success: bool) -> Result<String> {
        let report = CheckReport {
            target,
            operation,
            success,
        };
        if let Some(rendered) = self.serialized(&report, "check result") {
            return rendered;
        }
        let symbol = if success { CHECK } else { CROSS };
        let outcome = if success { "succeeded" } else { "failed" };
        Ok(format!("{} {} {} for {}\n", symbol, operation, outcome, target))
    }

    pub fn format_status(&self, target: &str, status: InstrumentationStatus) -> Result<String> {
        if let Some(rendered) = self.serialized(&StatusReport { target, status }, "status") {
            return rendered;
        }
        Ok(format!("{}: {}\n", target, status.name()))
    }

    pub fn format_signatures(&self, signatures: &[&FrameworkSignature]) -> Result<String> {
        if let Some(rendered) = self.serialized(signatures, "signatures") {
            return rendered;
        }

        let mut output = String::from("Framework Signatures\n");
        output.push_str(RULE);
        output.push_str("\n\n");
        for sig in signatures {
            output.push_str(&format!("{} ({})\n", sig.display_name, sig.language().name()));
            output.push_str(&format!("  {}\n", sig.description));
            output.push_str(&format!("\u{251C}\u{2500} Packages:  {}\n", sig.package_names.join(", ")));
            output.push_str(&format!("\u{251C}\u{2500} Files:     {}\n", sig.file_names.join(", ")));
            output.push_str(&format!("\u{251C}\u{2500} Env:       {}\n", sig.env_keys.join(", ")));
            output.push_str(&format!("\u{251C}\u{2500} Endpoints: {}\n", sig.endpoints.join(", ")));
            let ports: Vec<String> = sig.common_ports.iter().map(|p| p.to_string()).collect();
            output.push_str(&format!("\u{2514}\u{2500} Ports:     {}\n\n", ports.join(", ")));
        }
        Ok(output)
    }

    pub fn format_indicators(&self, indicators: &[Indicator]) -> Result<String> {
        if let Some(rendered) = self.serialized(indicators, "indicators") {
            return rendered;
        }

        let mut by_category: BTreeMap<_, Vec<&Indicator>> = BTreeMap::new();
        for indicator in indicators {
            by_category.entry(indicator.category).or_default().push(indicator);
        }

        let mut output = String::from("Scanner Indicators\n");
        output.push_str(RULE);
        output.push('\n');
        for (category, entries) in by_category {
            output.push_str(&format!("\n{}:\n", category.name()));
            for indicator in entries {
                output.push_str(&format!(
                    "  {:<40} {:<12} {:.2}\n",
                    indicator.indicator,
                    indicator.framework.name(),
                    indicator.weight
                ));
            }
        }
        Ok(output)
    }
}

fn confidence_bar(confidence: f64) -> String {
    let filled = ((confidence.clamp(0.0, 1.0)) * 10.0) as usize;
    "\u{2588}".repeat(filled) + &"\u{2591}".repeat(10 - filled)
}

fn detection_human(result: &DetectionResult) -> String {
    let mut output = String::new();

    if result.is_confident(CONFIDENT_THRESHOLD) {
        output.push_str(&format!("{} {}\n", CHECK, result.target_name));
    } else {
        output.push_str(&format!("{} {} (Low Confidence)\n", WARN, result.target_name));
    }
    output.push_str(RULE);
    output.push_str("\n\n");

    output.push_str(&format!("Framework:  {}\n", result.framework.name()));
    output.push_str(&format!("Language:   {}\n", result.language.name()));
    output.push_str(&format!(
        "Version:    {}\n",
        result.version.as_deref().unwrap_or("(unknown)")
    ));
    output.push_str(&format!(
        "Confidence: {} {}%\n",
        confidence_bar(result.confidence),
        (result.confidence * 100.0).round() as u8
    ));

    let contributing = result.contributing_categories();
    if !contributing.is_empty() {
        output.push_str("\nEvidence:\n");
        for (i, category) in contributing.iter().enumerate() {
            let connector = if i + 1 == contributing.len() { "\u{2514}" } else { "\u{251C}" };
            let scores: Vec<String> = result.evidence[category]
                .scores
                .iter()
                .map(|(fw, score)| format!("{} {:.2}", fw.name(), score))
                .collect();
            output.push_str(&format!(
                "{}\u{2500} {:<12} {}\n",
                connector,
                category.name(),
                scores.join(", ")
            ));
        }
    }

    output.push_str(&format!("\nDetected at {}\n", result.detected_at.to_rfc3339()));
    output
}

fn instrumentation_human(result: &InstrumentationResult) -> String {
    let mut output = String::new();

    let symbol = if result.is_successful() { CHECK } else { CROSS };
    output.push_str(&format!(
        "{} {} ({})\n",
        symbol,
        result.target_name,
        result.framework.name()
    ));
    output.push_str(RULE);
    output.push_str("\n\n");
    output.push_str(&format!("Status: {}\n", result.status.name()));

    if !result.modifications.is_empty() {
        output.push_str("\nModifications:\n");
        for (i, step) in result.modifications.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, step));
        }
    }

    if let Some(ref error) = result.error {
        output.push_str(&format!("\nError: {}\n", error));
    }

    let endpoints = result.endpoints();
    if !endpoints.is_empty() {
        output.push_str("\nTelemetry Endpoints:\n");
        for (signal, url) in endpoints {
            output.push_str(&format!("  {:<8} {}\n", signal, url));
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Evidence, EvidenceCategory};
    use crate::stack::{Framework, Language, SignatureRegistry};

    fn flask_result() -> DetectionResult {
        let mut package = Evidence::new();
        package.add(Framework::Flask, 0.7);
        package.set_version(Framework::Flask, "2.3.0");
        let mut evidence = BTreeMap::new();
        evidence.insert(EvidenceCategory::Package, package);
        evidence.insert(EvidenceCategory::Port, Evidence::new());

        DetectionResult {
            target_id: "abc123".to_string(),
            target_name: "web".to_string(),
            framework: Framework::Flask,
            language: Language::Python,
            version: Some("2.3.0".to_string()),
            confidence: 0.82,
            evidence,
            detected_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_detection_json() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format_detection(&flask_result()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["framework"], "flask");
        assert_eq!(value["language"], "python");
        assert_eq!(value["evidence"]["package"]["versions"]["flask"], "2.3.0");
    }

    #[test]
    fn test_detection_yaml() {
        let formatter = OutputFormatter::new(OutputFormat::Yaml);
        let output = formatter.format_detection(&flask_result()).unwrap();
        assert!(output.contains("framework: flask"));
        assert!(output.contains("target_name: web"));
    }

    #[test]
    fn test_detection_human() {
        let formatter = OutputFormatter::new(OutputFormat::Human);
        let output = formatter.format_detection(&flask_result()).unwrap();
        assert!(output.starts_with("\u{2713} web"));
        assert!(output.contains("Framework:  Flask"));
        assert!(output.contains("Version:    2.3.0"));
        assert!(output.contains("82%"));
        assert!(output.contains("Package"));
        assert!(!output.contains("Port "));
    }

    #[test]
    fn test_batch_detection_json_records_errors() {
        let mut results = BTreeMap::new();
        results.insert("web".to_string(), Ok(flask_result()));
        results.insert(
            "ghost".to_string(),
            Err(DetectError::NotFound("ghost".to_string())),
        );

        let output = OutputFormatter::new(OutputFormat::Json)
            .format_detections(&results)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["web"]["framework"], "flask");
        assert!(value["ghost"]["error"].as_str().unwrap().contains("ghost"));
    }

    #[test]
    fn test_instrumentation_human_lists_steps_and_error() {
        let result = InstrumentationResult::failed(
            "abc",
            "web",
            Framework::Flask,
            vec!["Added OpenTelemetry packages to requirements.txt".to_string()],
            "install dependencies: pip exited with 1",
        );
        let output = OutputFormatter::new(OutputFormat::Human)
            .format_instrumentation(&result)
            .unwrap();
        assert!(output.starts_with("\u{2717} web (Flask)"));
        assert!(output.contains("  1. Added OpenTelemetry packages to requirements.txt"));
        assert!(output.contains("Error: install dependencies: pip exited with 1"));
    }

    #[test]
    fn test_check_and_status() {
        let human = OutputFormatter::new(OutputFormat::Human);
        assert_eq!(human.format_check("web", "verify", true).unwrap(), "\u{2713} verify succeeded for web\n");
        assert_eq!(
            human.format_status("web", InstrumentationStatus::NotInstrumented).unwrap(),
            "web: Not instrumented\n"
        );

        let json = OutputFormatter::new(OutputFormat::Json);
        let value: serde_json::Value =
            serde_json::from_str(&json.format_status("web", InstrumentationStatus::Instrumented).unwrap()).unwrap();
        assert_eq!(value["status"], "instrumented");
    }

    #[test]
    fn test_signatures_human() {
        let signatures: Vec<_> = SignatureRegistry::global().all().collect();
        let output = OutputFormatter::new(OutputFormat::Human)
            .format_signatures(&signatures)
            .unwrap();
        assert!(output.contains("Spring Boot (Java)"));
        assert!(output.contains("FastAPI (Python)"));
    }
}
