//! Core domain models for compliance checks and validation reports
//!
//! Architecture: Rich Domain Models - Check results carry their own verdict and remediation
//! - CheckResult is the atomic unit every checker returns
//! - ComplianceReport acts as an aggregate root over ordered report sections
//! - The overall verdict is always derived from the items, never stored

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tri-state outcome of a single check or an aggregated check group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// Requirement satisfied
    Pass,
    /// Requirement satisfied, but something deserves attention
    Warn,
    /// Requirement violated; fails the whole report
    Fail,
}

impl CheckStatus {
    /// Whether this status fails the report
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Fail)
    }

    /// Convert to string for display
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Warn => "warn",
            Self::Fail => "fail",
        }
    }

    /// The more severe of two statuses
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }
}

/// Outcome of one compliance check: a verdict, a short label and itemized detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Short label shown next to the glyph, e.g. `README.md is in place.`
    pub label: String,
    /// Verdict of this check
    pub status: CheckStatus,
    /// Itemized remediation detail, one line per problem
    pub details: Vec<String>,
}

impl CheckResult {
    /// Create a check result without detail
    pub fn new(label: impl Into<String>, status: CheckStatus) -> Self {
        Self { label: label.into(), status, details: Vec::new() }
    }

    pub fn pass(label: impl Into<String>) -> Self {
        Self::new(label, CheckStatus::Pass)
    }

    pub fn warn(label: impl Into<String>) -> Self {
        Self::new(label, CheckStatus::Warn)
    }

    pub fn fail(label: impl Into<String>) -> Self {
        Self::new(label, CheckStatus::Fail)
    }

    /// Append one line of detail
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }

    /// Append several lines of detail
    pub fn with_details<I, S>(mut self, details: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.details.extend(details.into_iter().map(Into::into));
        self
    }

    /// Whether this check counts as passed (warnings pass)
    pub fn passed(&self) -> bool {
        !self.status.is_blocking()
    }

    /// Compose two results: the worse status wins and details are concatenated.
    /// The label of `self` is kept.
    pub fn combine(mut self, other: CheckResult) -> Self {
        self.status = self.status.worst(other.status);
        self.details.extend(other.details);
        self
    }

    /// Fold any number of results into one labelled result.
    /// An empty input yields a passing result.
    pub fn all<I>(label: impl Into<String>, results: I) -> Self
    where
        I: IntoIterator<Item = CheckResult>,
    {
        results.into_iter().fold(Self::pass(label), Self::combine)
    }

    /// Format for single-line display
    pub fn format_display(&self) -> String {
        format!("[{}] {}", self.status.as_str(), self.label)
    }
}

/// The four rule groups, in canonical report order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckGroup {
    RepositoryManagement,
    SourceStructure,
    Functional,
    Security,
}

impl CheckGroup {
    /// Every group in the order sections are rendered
    pub const ALL: [CheckGroup; 4] =
        [Self::RepositoryManagement, Self::SourceStructure, Self::Functional, Self::Security];

    /// Section heading for this group
    pub fn title(self) -> &'static str {
        match self {
            Self::RepositoryManagement => "Repository Management",
            Self::SourceStructure => "Source code structure and conventions",
            Self::Functional => "Functional Requirements",
            Self::Security => "Security Requirements",
        }
    }
}

/// One titled group of check results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    pub group: CheckGroup,
    pub title: String,
    pub items: Vec<CheckResult>,
}

impl ReportSection {
    pub fn new(group: CheckGroup) -> Self {
        Self { group, title: group.title().to_string(), items: Vec::new() }
    }

    pub fn push(&mut self, item: CheckResult) {
        self.items.push(item);
    }

    /// Whether every item in this section passed
    pub fn passed(&self) -> bool {
        self.items.iter().all(CheckResult::passed)
    }
}

/// Count of items by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pass: usize,
    pub warn: usize,
    pub fail: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pass + self.warn + self.fail
    }

    pub fn add(&mut self, status: CheckStatus) {
        match status {
            CheckStatus::Pass => self.pass += 1,
            CheckStatus::Warn => self.warn += 1,
            CheckStatus::Fail => self.fail += 1,
        }
    }
}

/// Complete compliance report for one repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceReport {
    /// Repository that was audited
    pub repository: PathBuf,
    /// Sections in canonical group order
    pub sections: Vec<ReportSection>,
    /// When the validation was performed
    pub generated_at: DateTime<Utc>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u64,
    /// Fingerprint of the policy used for this run
    pub config_fingerprint: Option<String>,
}

impl ComplianceReport {
    /// Create an empty report
    pub fn new(repository: impl Into<PathBuf>) -> Self {
        Self {
            repository: repository.into(),
            sections: Vec::new(),
            generated_at: Utc::now(),
            execution_time_ms: 0,
            config_fingerprint: None,
        }
    }

    /// Add a section, keeping sections in canonical group order
    pub fn add_section(&mut self, section: ReportSection) {
        self.sections.push(section);
        self.sections.sort_by_key(|s| s.group);
    }

    /// Logical AND over every item of every section
    pub fn overall_passed(&self) -> bool {
        self.items().all(CheckResult::passed)
    }

    /// Iterate every item across all sections
    pub fn items(&self) -> impl Iterator<Item = &CheckResult> {
        self.sections.iter().flat_map(|s| s.items.iter())
    }

    /// Items that fail the report
    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.items().filter(|item| !item.passed())
    }

    /// Look up a section by group
    pub fn section(&self, group: CheckGroup) -> Option<&ReportSection> {
        self.sections.iter().find(|s| s.group == group)
    }

    /// Count items by status
    pub fn summary(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for item in self.items() {
            counts.add(item.status);
        }
        counts
    }

    pub fn set_execution_time(&mut self, duration_ms: u64) {
        self.execution_time_ms = duration_ms;
    }

    pub fn set_config_fingerprint(&mut self, fingerprint: impl Into<String>) {
        self.config_fingerprint = Some(fingerprint.into());
    }
}

/// Error types that abort a validation run
#[derive(Debug, thiserror::Error)]
pub enum GuardianError {
    /// Policy configuration could not be loaded or is inconsistent
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// File could not be read or accessed
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// The audited path is not a directory
    #[error("The path {} is not a valid directory", path.display())]
    InvalidRepository { path: PathBuf },

    /// A structured document could not be parsed
    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    /// An external tool could not be started
    #[error("Tool error ({program}): {message}")]
    Tool { program: String, message: String },

    /// Validation operation failed
    #[error("Validation error: {message}")]
    Validation { message: String },
}

impl GuardianError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create a parse error
    pub fn parse(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse { file: file.into(), message: message.into() }
    }

    /// Create a tool error
    pub fn tool(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool { program: program.into(), message: message.into() }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }
}

/// Result type for Guardian operations
pub type GuardianResult<T> = Result<T, GuardianError>;
