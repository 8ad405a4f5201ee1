//! Template Guardian - Compliance validation for template repositories
//!
//! Architecture: Clean Architecture - Library interface serves as the application layer
//! - Pure domain logic separated from infrastructure concerns
//! - A declarative rule catalog drives one generic file resolver
//! - External tools sit behind the `ToolRunner` seam

pub mod analyzer;
pub mod checks;
pub mod config;
pub mod domain;
pub mod report;
pub mod resolver;

// Re-export main types for convenient access
pub use domain::checks::{
    CheckGroup, CheckResult, CheckStatus, ComplianceReport, GuardianError, GuardianResult,
    ReportSection, StatusCounts,
};

pub use config::{
    ConfigBuilder, FolderRule, PolicyConfig, ToolCommand, ValidationRule, WorkflowPolicy,
    WorkflowRule,
};

pub use analyzer::{CatalogStats, ComplianceAnalyzer, ValidationOptions};

pub use checks::{ProcessRunner, ToolOutput, ToolRunner};

pub use report::{OutputFormat, ReportFormatter, ReportOptions};

pub use resolver::{resolve, ResolvedFile};

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Main validator providing high-level validation operations
pub struct TemplateValidator {
    analyzer: ComplianceAnalyzer,
    report_formatter: ReportFormatter,
}

impl TemplateValidator {
    /// Create a new validator with the given configuration
    pub fn new_with_config(config: PolicyConfig) -> GuardianResult<Self> {
        let report_formatter = ReportFormatter::default().with_presentation(config.report.clone());
        let analyzer = ComplianceAnalyzer::new(config)?;

        Ok(Self { analyzer, report_formatter })
    }

    /// Create a validator with the built-in catalog
    pub fn new() -> GuardianResult<Self> {
        Self::new_with_config(PolicyConfig::default())
    }

    /// Create a validator loading configuration from file
    pub fn from_config_file<P: AsRef<Path>>(path: P) -> GuardianResult<Self> {
        let config = PolicyConfig::load_from_file(path)?;
        Self::new_with_config(config)
    }

    /// Replace the runner used for provisioning and linting
    pub fn with_tool_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.analyzer = self.analyzer.with_runner(runner);
        self
    }

    /// Set custom report formatter; the catalog's title and help link still apply
    pub fn with_report_formatter(mut self, formatter: ReportFormatter) -> Self {
        self.report_formatter = formatter.with_presentation(self.analyzer.config().report.clone());
        self
    }

    /// Validate one repository
    pub fn validate<P: AsRef<Path>>(
        &self,
        repository: P,
        options: &ValidationOptions,
    ) -> GuardianResult<ComplianceReport> {
        self.analyzer.analyze_repository(repository, options)
    }

    /// Format a compliance report for output
    pub fn format_report(
        &self,
        report: &ComplianceReport,
        format: OutputFormat,
    ) -> GuardianResult<String> {
        self.report_formatter.format_report(report, format)
    }

    /// Write a formatted report to a writer
    pub fn write_report<W: Write>(
        &self,
        report: &ComplianceReport,
        format: OutputFormat,
        writer: W,
    ) -> GuardianResult<()> {
        self.report_formatter.write_report(report, format, writer)
    }

    pub fn config(&self) -> &PolicyConfig {
        self.analyzer.config()
    }

    /// Get catalog statistics
    pub fn catalog_statistics(&self) -> CatalogStats {
        self.analyzer.catalog_stats()
    }
}

/// Convenience function to create a validator with default settings
pub fn create_validator() -> GuardianResult<TemplateValidator> {
    TemplateValidator::new()
}

/// Convenience function to validate a repository with default settings
pub fn validate_repository<P: AsRef<Path>>(repository: P) -> GuardianResult<ComplianceReport> {
    let validator = TemplateValidator::new()?;
    validator.validate(repository, &ValidationOptions::default())
}
