//! Main validation orchestrator for Template Guardian
//!
//! CDD Principle: Domain Services - Analyzer orchestrates the four check groups
//! - Runs repository management, source structure, functional and security checks
//! - Groups run concurrently on the rayon pool, sections are always emitted in order
//! - Only an invalid repository path aborts a run; every other problem becomes a report item

use crate::checks::{
    check_functional, check_security_scan, check_topics, check_workflow_rule, ProcessRunner,
    ToolRunner,
};
use crate::config::{GroupPolicy, PolicyConfig};
use crate::domain::checks::{
    CheckGroup, CheckResult, ComplianceReport, GuardianError, GuardianResult, ReportSection,
};
use crate::resolver;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Options for one validation run
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    /// Run the provisioning "up" command
    pub provision_up: bool,
    /// Run the provisioning "down" command after "up"
    pub provision_down: bool,
    /// Comma-separated topics the repository is tagged with
    pub topics: Option<String>,
    /// Comma-separated topics to require instead of the catalog's
    pub expected_topics: Option<String>,
    /// SARIF document produced by the security scanner
    pub security_scan: Option<PathBuf>,
    /// Whether to run check groups in parallel
    pub parallel: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            provision_up: false,
            provision_down: false,
            topics: None,
            expected_topics: None,
            security_scan: None,
            parallel: true,
        }
    }
}

/// Orchestrates a full compliance run against one repository
pub struct ComplianceAnalyzer {
    config: PolicyConfig,
    runner: Arc<dyn ToolRunner>,
}

impl ComplianceAnalyzer {
    /// Create an analyzer; the configuration is validated before any check runs
    pub fn new(config: PolicyConfig) -> GuardianResult<Self> {
        config.validate()?;
        Ok(Self { config, runner: Arc::new(ProcessRunner) })
    }

    /// Create an analyzer with the built-in catalog
    pub fn with_defaults() -> GuardianResult<Self> {
        Self::new(PolicyConfig::default())
    }

    /// Replace the runner used for provisioning and linting
    pub fn with_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Run every check group and assemble the report
    pub fn analyze_repository<P: AsRef<Path>>(
        &self,
        root: P,
        options: &ValidationOptions,
    ) -> GuardianResult<ComplianceReport> {
        let start_time = Instant::now();
        let root = root.as_ref();

        if !root.is_dir() {
            return Err(GuardianError::InvalidRepository { path: root.to_path_buf() });
        }

        tracing::debug!(
            "Validating {} (up: {}, down: {}, parallel: {})",
            root.display(),
            options.provision_up,
            options.provision_down,
            options.parallel
        );

        // Order of ALL is canonical; collect() keeps it under par_iter too
        let sections: Vec<ReportSection> = if options.parallel {
            CheckGroup::ALL.par_iter().map(|group| self.run_group(*group, root, options)).collect()
        } else {
            CheckGroup::ALL.iter().map(|group| self.run_group(*group, root, options)).collect()
        };

        let mut report = ComplianceReport::new(root);
        for section in sections {
            report.add_section(section);
        }

        report.set_config_fingerprint(self.config.fingerprint());
        report.set_execution_time(start_time.elapsed().as_millis() as u64);

        tracing::debug!(
            "Validation of {} finished in {}ms: {}",
            root.display(),
            report.execution_time_ms,
            if report.overall_passed() { "passed" } else { "failed" }
        );

        Ok(report)
    }

    /// Evaluate one group into its report section
    pub fn run_group(
        &self,
        group: CheckGroup,
        root: &Path,
        options: &ValidationOptions,
    ) -> ReportSection {
        let mut section = ReportSection::new(group);

        match group {
            CheckGroup::RepositoryManagement => {
                self.run_rules(&self.config.repository_management, root, &mut section);
                if let Some(item) = self.topic_item(options) {
                    section.push(item);
                }
            }
            CheckGroup::SourceStructure => {
                self.run_rules(&self.config.source_structure, root, &mut section);
            }
            CheckGroup::Functional => {
                let items = check_functional(
                    &self.config.provisioning,
                    self.runner.as_ref(),
                    root,
                    options.provision_up,
                    options.provision_down,
                );
                for item in items {
                    section.push(item);
                }
            }
            CheckGroup::Security => {
                section.push(check_security_scan(
                    options.security_scan.as_deref(),
                    &self.config.scan.severity_exceptions,
                ));
                self.run_rules(&self.config.security, root, &mut section);
            }
        }

        section
    }

    /// Files, then folders, then workflow rules, each in catalog order
    fn run_rules(&self, policy: &GroupPolicy, root: &Path, section: &mut ReportSection) {
        for rule in &policy.files {
            section.push(resolver::evaluate(rule, root).to_check_result());
        }
        for rule in &policy.folders {
            section.push(resolver::check_folder(rule, root));
        }
        for rule in &policy.workflows {
            section.push(check_workflow_rule(rule, root));
        }
    }

    /// Topic check, when any topics are expected
    fn topic_item(&self, options: &ValidationOptions) -> Option<CheckResult> {
        let expected: Vec<String> = match &options.expected_topics {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect(),
            None => self.config.topics.required.clone(),
        };

        if expected.is_empty() {
            return None;
        }
        Some(check_topics(options.topics.as_deref(), &expected))
    }

    /// Get configuration fingerprint recorded in reports
    pub fn config_fingerprint(&self) -> String {
        self.config.fingerprint()
    }

    /// Get statistics about the configured catalog
    pub fn catalog_stats(&self) -> CatalogStats {
        let mut stats = CatalogStats::default();

        for group in CheckGroup::ALL {
            let Some(policy) = self.config.group(group) else {
                continue;
            };
            stats.file_rules += policy.files.len();
            stats.marker_rules += policy.files.iter().filter(|r| !r.markers().is_empty()).count();
            stats.folder_rules += policy.folders.len();
            stats.workflow_rules += policy.workflows.len();
        }

        stats.required_topics = self.config.topics.required.len();
        stats.severity_exceptions = self.config.scan.severity_exceptions.len();
        stats.linter_configured = self.config.provisioning.lint.is_some();
        stats
    }
}

/// Statistics about the rule catalog
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CatalogStats {
    pub file_rules: usize,
    /// File rules that also assert content markers
    pub marker_rules: usize,
    pub folder_rules: usize,
    pub workflow_rules: usize,
    pub required_topics: usize,
    pub severity_exceptions: usize,
    pub linter_configured: bool,
}

impl CatalogStats {
    pub fn total_rules(&self) -> usize {
        self.file_rules + self.folder_rules + self.workflow_rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::ToolOutput;
    use crate::domain::checks::CheckStatus;
    use std::fs;
    use tempfile::TempDir;

    struct PassingRunner;

    impl ToolRunner for PassingRunner {
        fn run(&self, _: &str, _: &[String], _: &Path) -> GuardianResult<ToolOutput> {
            Ok(ToolOutput { success: true, exit_code: Some(0), ..Default::default() })
        }
    }

    fn analyzer() -> ComplianceAnalyzer {
        ComplianceAnalyzer::with_defaults().unwrap().with_runner(Arc::new(PassingRunner))
    }

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn compliant_repo() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(
            root,
            "README.md",
            "## Features\n## Getting Started\n## Guidance\n## Resources\n",
        );
        write(root, "LICENSE", "MIT");
        write(root, ".github/SECURITY.md", "");
        write(root, "CONTRIBUTING.md", "");
        write(root, "CODE_OF_CONDUCT.md", "");
        write(root, ".github/ISSUE_TEMPLATE/ISSUE_TEMPLATE.md", "");
        write(root, "azure.yaml", "name: sample");
        write(root, ".github/workflows/ci.yml", "jobs:\n  test:\n    steps:\n      - run: make test\n");
        write(root, "infra/main.bicep", "");
        write(root, ".devcontainer/devcontainer.json", "{}");
        write(
            root,
            ".github/workflows/azure-dev.yml",
            "jobs:\n  deploy:\n    steps:\n      - uses: Azure/setup-azd@v1.0.0\n",
        );
        write(
            root,
            ".github/workflows/scan.yaml",
            "jobs:\n  scan:\n    steps:\n      - uses: microsoft/security-devops-action@latest\n",
        );
        write(root, "scan.sarif", r#"{"version":"2.1.0","runs":[{"results":[]}]}"#);
        temp_dir
    }

    fn options(root: &Path) -> ValidationOptions {
        ValidationOptions {
            topics: Some("azd-templates,ai-azd-templates".to_string()),
            security_scan: Some(root.join("scan.sarif")),
            ..Default::default()
        }
    }

    #[test]
    fn test_compliant_repository_passes() {
        let repo = compliant_repo();
        let report = analyzer().analyze_repository(repo.path(), &options(repo.path())).unwrap();

        let failures: Vec<_> = report.failures().map(|item| item.label.clone()).collect();
        assert!(failures.is_empty(), "unexpected failures: {failures:?}");
        assert!(report.overall_passed());
        assert!(report.config_fingerprint.is_some());
    }

    #[test]
    fn test_sections_are_canonical_in_both_modes() {
        let repo = compliant_repo();
        let parallel = analyzer().analyze_repository(repo.path(), &options(repo.path())).unwrap();

        let sequential_options = ValidationOptions { parallel: false, ..options(repo.path()) };
        let sequential = analyzer().analyze_repository(repo.path(), &sequential_options).unwrap();

        let groups = |report: &ComplianceReport| -> Vec<CheckGroup> {
            report.sections.iter().map(|s| s.group).collect()
        };
        assert_eq!(groups(&parallel), CheckGroup::ALL.to_vec());
        assert_eq!(groups(&parallel), groups(&sequential));

        let labels = |report: &ComplianceReport| -> Vec<String> {
            report.items().map(|item| item.label.clone()).collect()
        };
        assert_eq!(labels(&parallel), labels(&sequential));
    }

    #[test]
    fn test_invalid_repository_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, "").unwrap();

        let result = analyzer().analyze_repository(&file, &ValidationOptions::default());
        assert!(matches!(result, Err(GuardianError::InvalidRepository { .. })));
    }

    #[test]
    fn test_expected_topics_override_catalog() {
        let repo = compliant_repo();
        let options = ValidationOptions {
            topics: Some("azd-templates".to_string()),
            expected_topics: Some("azd-templates, ".to_string()),
            ..options(repo.path())
        };
        let report = analyzer().analyze_repository(repo.path(), &options).unwrap();

        let section = report.section(CheckGroup::RepositoryManagement).unwrap();
        let topic = section.items.last().unwrap();
        assert_eq!(topic.label, "Topics on repo contain azd-templates.");
        assert!(topic.passed());
    }

    #[test]
    fn test_scan_failure_is_reported_not_raised() {
        let repo = compliant_repo();
        let options = ValidationOptions { security_scan: None, ..options(repo.path()) };
        let report = analyzer().analyze_repository(repo.path(), &options).unwrap();

        let security = report.section(CheckGroup::Security).unwrap();
        assert_eq!(security.items[0].status, CheckStatus::Fail);
        assert!(!report.overall_passed());
    }

    #[test]
    fn test_missing_ci_workflow_fails_source_structure() {
        let repo = compliant_repo();
        fs::remove_file(repo.path().join(".github/workflows/ci.yml")).unwrap();
        let report = analyzer().analyze_repository(repo.path(), &options(repo.path())).unwrap();

        let section = report.section(CheckGroup::SourceStructure).unwrap();
        let ci = section
            .items
            .iter()
            .find(|item| item.label == ".github/workflows/ci.yml is in place.")
            .unwrap();
        assert_eq!(ci.status, CheckStatus::Fail);
        assert_eq!(ci.details, vec![".github/workflows/ci.yml is missing."]);
        assert!(!report.overall_passed());

        // Either extension satisfies the rule
        write(repo.path(), ".github/workflows/ci.yaml", "jobs: {}\n");
        let report = analyzer().analyze_repository(repo.path(), &options(repo.path())).unwrap();
        assert!(report.overall_passed());
    }

    #[test]
    fn test_catalog_stats() {
        let stats = analyzer().catalog_stats();
        assert_eq!(stats.file_rules, 10);
        assert_eq!(stats.marker_rules, 1);
        assert_eq!(stats.folder_rules, 2);
        assert_eq!(stats.workflow_rules, 2);
        assert_eq!(stats.total_rules(), 14);
        assert_eq!(stats.required_topics, 2);
        assert!(stats.linter_configured);
    }
}
