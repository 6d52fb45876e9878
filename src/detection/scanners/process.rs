use super::{Indicator, Scanner};
use crate::detection::{Evidence, EvidenceCategory};
use crate::runtime::Target;
use crate::stack::Framework;
use anyhow::{bail, Result};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;

const SPECIFIC_WEIGHT: f64 = 0.8;
const GENERIC_WEIGHT: f64 = 0.6;
const MAX_PROC_ENTRIES: usize = 64;

/// Most specific first. Only the first match counts.
const PROCESS_PATTERNS: &[(&str, Framework)] = &[
    (r"python.*app\.py", Framework::Flask),
    (r"python.*manage\.py", Framework::Django),
    (r"python.*main\.py", Framework::FastApi),
    (r"python", Framework::Flask),
    (r"gunicorn", Framework::Flask),
    (r"uvicorn", Framework::FastApi),
    (r"node.*app\.js", Framework::Express),
    (r"node.*server\.js", Framework::Express),
    (r"node", Framework::Express),
    (r"npm", Framework::Express),
    (r"java.*\.jar", Framework::SpringBoot),
    (r"java", Framework::SpringBoot),
];

struct CompiledPattern {
    source: &'static str,
    regex: Regex,
    framework: Framework,
}

fn pattern_weight(pattern: &str) -> f64 {
    if pattern.contains(".*") {
        SPECIFIC_WEIGHT
    } else {
        GENERIC_WEIGHT
    }
}

fn compiled_patterns() -> &'static [CompiledPattern] {
    static PATTERNS: OnceLock<Vec<CompiledPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        PROCESS_PATTERNS
            .iter()
            .map(|(source, framework)| CompiledPattern {
                source: *source,
                regex: RegexBuilder::new(source)
                    .case_insensitive(true)
                    .build()
                    .unwrap(),
                framework: *framework,
            })
            .collect()
    })
}

/// Classifies the process listing. Pure so it can be tested without a target.
pub fn classify_processes(listing: &str) -> Evidence {
    let mut evidence = Evidence::new();
    if let Some(p) = compiled_patterns()
        .iter()
        .find(|p| p.regex.is_match(listing))
    {
        evidence.add(p.framework, pattern_weight(p.source));
    }
    evidence
}

#[derive(Debug, Default)]
pub struct ProcessScanner;

impl ProcessScanner {
    async fn listing(&self, target: &Target) -> Result<String> {
        let ps = target.exec(&["ps", "aux"]).await?;
        if ps.is_success() {
            return Ok(ps.stdout);
        }

        // Minimal images often ship without procps.
        let ls = target.exec(&["ls", "/proc"]).await?;
        if !ls.is_success() {
            bail!("neither ps nor /proc is available");
        }

        let mut lines = Vec::new();
        for pid in ls
            .stdout
            .split_whitespace()
            .filter(|e| e.chars().all(|c| c.is_ascii_digit()))
            .take(MAX_PROC_ENTRIES)
        {
            let path = format!("/proc/{}/cmdline", pid);
            if let Some(cmdline) = target.read_file(&path).await? {
                let cmdline = cmdline.replace('\0', " ");
                let cmdline = cmdline.trim();
                if !cmdline.is_empty() {
                    lines.push(cmdline.to_string());
                }
            }
        }
        Ok(lines.join("\n"))
    }
}

#[async_trait]
impl Scanner for ProcessScanner {
    fn category(&self) -> EvidenceCategory {
        EvidenceCategory::Process
    }

    async fn try_scan(&self, target: &Target) -> Result<Evidence> {
        let listing = self.listing(target).await?;
        Ok(classify_processes(&listing))
    }

    fn indicators(&self) -> Vec<Indicator> {
        PROCESS_PATTERNS
            .iter()
            .map(|(source, fw)| Indicator::new(self.category(), *fw, *source, pattern_weight(source)))
            .collect()
    }
}
