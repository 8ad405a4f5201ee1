//! Security scan aggregation over SARIF results
//!
//! Findings are grouped by severity. Codes on the exception list are downgraded to
//! warnings whatever severity the scanner reported; remaining errors fail the run.

use crate::domain::checks::{CheckResult, CheckStatus, GuardianError, GuardianResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Severity reported by the scanner (SARIF `level`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    Error,
    Warning,
    Note,
    None,
}

impl FindingSeverity {
    /// Map a resolved SARIF level; absent or unknown levels are `warning`
    pub fn from_level(level: Option<&str>) -> Self {
        match level.map(str::to_ascii_lowercase).as_deref() {
            Some("error") => Self::Error,
            Some("note") => Self::Note,
            Some("none") => Self::None,
            Some("warning") | None => Self::Warning,
            Some(other) => {
                tracing::debug!("Unknown SARIF level '{}', treating as warning", other);
                Self::Warning
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Note => "note",
            Self::None => "none",
        }
    }
}

/// One scanner finding
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SarifFinding {
    pub severity: FindingSeverity,
    pub rule_code: String,
    pub description: String,
}

impl SarifFinding {
    pub fn new(
        severity: FindingSeverity,
        rule_code: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self { severity, rule_code: rule_code.into(), description: description.into() }
    }
}

#[derive(Debug, Deserialize)]
struct SarifLog {
    #[serde(default)]
    runs: Vec<SarifRun>,
}

#[derive(Debug, Deserialize)]
struct SarifRun {
    #[serde(default)]
    tool: Option<SarifTool>,
    #[serde(default)]
    results: Option<Vec<SarifResult>>,
}

#[derive(Debug, Deserialize)]
struct SarifTool {
    #[serde(default)]
    driver: Option<SarifDriver>,
}

#[derive(Debug, Deserialize)]
struct SarifDriver {
    #[serde(default)]
    rules: Option<Vec<SarifRule>>,
}

/// `reportingDescriptor`: rule metadata declared by the tool
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SarifRule {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    default_configuration: Option<SarifRuleConfiguration>,
}

#[derive(Debug, Deserialize)]
struct SarifRuleConfiguration {
    #[serde(default)]
    level: Option<String>,
}

/// `reportingDescriptorReference` on a result
#[derive(Debug, Deserialize)]
struct SarifRuleReference {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    index: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SarifResult {
    #[serde(default)]
    rule_id: Option<String>,
    #[serde(default)]
    rule_index: Option<i64>,
    #[serde(default)]
    rule: Option<SarifRuleReference>,
    /// `fail` when absent; `pass`, `notApplicable`, `informational`, `review`
    /// and `open` are not violations
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    message: Option<SarifMessage>,
}

#[derive(Debug, Deserialize)]
struct SarifMessage {
    #[serde(default)]
    text: Option<String>,
}

impl SarifResult {
    fn is_violation(&self) -> bool {
        self.kind.as_deref().map_or(true, |kind| kind.eq_ignore_ascii_case("fail"))
    }

    fn rule_code(&self) -> Option<&str> {
        self.rule_id.as_deref().or_else(|| self.rule.as_ref().and_then(|r| r.id.as_deref()))
    }

    fn rule_index(&self) -> Option<usize> {
        self.rule_index
            .or_else(|| self.rule.as_ref().and_then(|r| r.index))
            .and_then(|index| usize::try_from(index).ok())
    }

    /// The rule this result refers to, by index first and then by id.
    /// Hierarchical ids (`R1/sub`) fall back to their leading component.
    fn find_rule<'r>(&self, rules: &'r [SarifRule]) -> Option<&'r SarifRule> {
        if let Some(rule) = self.rule_index().and_then(|index| rules.get(index)) {
            return Some(rule);
        }

        let code = self.rule_code()?;
        let by_id = |wanted: &str| rules.iter().find(|rule| rule.id.as_deref() == Some(wanted));
        by_id(code).or_else(|| code.split_once('/').and_then(|(base, _)| by_id(base)))
    }

    /// Effective level: the result's own, else the rule's default configuration
    fn effective_level<'s>(&'s self, rules: &'s [SarifRule]) -> Option<&'s str> {
        self.level.as_deref().or_else(|| {
            self.find_rule(rules)
                .and_then(|rule| rule.default_configuration.as_ref())
                .and_then(|config| config.level.as_deref())
        })
    }
}

/// Parse the violations of every run in a SARIF document
pub fn parse_sarif(text: &str) -> Result<Vec<SarifFinding>, serde_json::Error> {
    let log: SarifLog = serde_json::from_str(text)?;

    let mut findings = Vec::new();
    for run in log.runs {
        let rules = run
            .tool
            .and_then(|tool| tool.driver)
            .and_then(|driver| driver.rules)
            .unwrap_or_default();

        for result in run.results.unwrap_or_default() {
            if !result.is_violation() {
                tracing::debug!(
                    "Skipping SARIF result {:?} of kind {:?}",
                    result.rule_code(),
                    result.kind
                );
                continue;
            }

            findings.push(SarifFinding {
                severity: FindingSeverity::from_level(result.effective_level(&rules)),
                rule_code: result
                    .rule_code()
                    .or_else(|| result.find_rule(&rules).and_then(|rule| rule.id.as_deref()))
                    .unwrap_or("unknown")
                    .to_string(),
                description: result
                    .message
                    .as_ref()
                    .and_then(|m| m.text.clone())
                    .unwrap_or_default(),
            });
        }
    }

    Ok(findings)
}

/// Read and parse a SARIF file
pub fn load_findings(path: &Path) -> GuardianResult<Vec<SarifFinding>> {
    let text = fs::read_to_string(path)?;
    parse_sarif(&text).map_err(|e| GuardianError::parse(path.display().to_string(), e.to_string()))
}

/// How a finding counts towards the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Disposition {
    /// Error not on the exception list
    Failure,
    /// Downgraded by the exception list
    Excepted,
    /// Warning, note or anything else
    Informational,
}

/// Aggregated outcome of a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanVerdict {
    pub overall: CheckStatus,
    /// Findings per reported severity
    pub counts: BTreeMap<FindingSeverity, usize>,
    pub hard_failures: usize,
    pub downgraded: usize,
    /// One line per finding, failures first; stable regardless of input order
    pub detail: Vec<String>,
}

/// Group findings by severity, apply exceptions and derive the verdict
pub fn aggregate(findings: &[SarifFinding], exceptions: &[String]) -> ScanVerdict {
    let exceptions: BTreeSet<&str> = exceptions.iter().map(String::as_str).collect();

    let mut groups: BTreeMap<(Disposition, FindingSeverity), Vec<&SarifFinding>> = BTreeMap::new();
    let mut counts: BTreeMap<FindingSeverity, usize> = BTreeMap::new();

    for finding in findings {
        let disposition = if exceptions.contains(finding.rule_code.as_str()) {
            Disposition::Excepted
        } else if finding.severity == FindingSeverity::Error {
            Disposition::Failure
        } else {
            Disposition::Informational
        };

        groups.entry((disposition, finding.severity)).or_default().push(finding);
        *counts.entry(finding.severity).or_default() += 1;
    }

    let count_of = |wanted: Disposition| -> usize {
        groups.iter().filter(|((d, _), _)| *d == wanted).map(|(_, items)| items.len()).sum()
    };
    let hard_failures = count_of(Disposition::Failure);
    let downgraded = count_of(Disposition::Excepted);

    let overall = if hard_failures > 0 {
        CheckStatus::Fail
    } else if !findings.is_empty() {
        CheckStatus::Warn
    } else {
        CheckStatus::Pass
    };

    let mut detail = Vec::new();
    for ((disposition, severity), mut items) in groups {
        items.sort_by(|a, b| {
            a.rule_code.cmp(&b.rule_code).then_with(|| a.description.cmp(&b.description))
        });
        for finding in items {
            detail.push(describe(disposition, severity, finding));
        }
    }

    ScanVerdict { overall, counts, hard_failures, downgraded, detail }
}

fn describe(disposition: Disposition, severity: FindingSeverity, finding: &SarifFinding) -> String {
    match disposition {
        Disposition::Failure => format!("Error: [{}] {}", finding.rule_code, finding.description),
        Disposition::Excepted => format!(
            "Warning: [{}] {} (reported as {}, allowed by exception)",
            finding.rule_code,
            finding.description,
            severity.as_str()
        ),
        Disposition::Informational => match severity {
            FindingSeverity::Warning => {
                format!("Warning: [{}] {}", finding.rule_code, finding.description)
            }
            other => format!(
                "Warning ({}): [{}] {}",
                other.as_str(),
                finding.rule_code,
                finding.description
            ),
        },
    }
}

/// Report item for the security scan; a missing document fails
pub fn check_security_scan(scan: Option<&Path>, exceptions: &[String]) -> CheckResult {
    let label = "Security scan results have no blocking findings.";

    let Some(path) = scan else {
        return CheckResult::fail(label).with_detail("Security scan results were not supplied.");
    };

    if !path.is_file() {
        return CheckResult::fail(label)
            .with_detail(format!("Security scan results not found at {}.", path.display()));
    }

    let findings = match load_findings(path) {
        Ok(findings) => findings,
        Err(e) => {
            tracing::warn!("Failed to read security scan results: {}", e);
            return CheckResult::fail(label)
                .with_detail(format!("Security scan results could not be read: {e}"));
        }
    };

    let verdict = aggregate(&findings, exceptions);
    tracing::debug!(
        "Security scan: {} findings, {} blocking, {} downgraded",
        findings.len(),
        verdict.hard_failures,
        verdict.downgraded
    );

    CheckResult::new(label, verdict.overall).with_details(verdict.detail)
}
