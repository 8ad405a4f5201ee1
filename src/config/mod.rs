//! Policy catalog loading and management for Template Guardian
//!
//! Architecture: Anti-Corruption Layer - Configuration translates external YAML formats
//! - Raw YAML structures are converted to immutable rule records
//! - The default catalog is embedded in the domain, not in infrastructure
//! - One generic resolver consumes every rule; no per-file procedures

use crate::domain::checks::{CheckGroup, GuardianError, GuardianResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Main policy configuration: the full rule catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Configuration format version
    pub version: String,
    /// Repository metadata rules (documentation set)
    #[serde(default)]
    pub repository_management: GroupPolicy,
    /// Source tree and CI structure rules
    #[serde(default)]
    pub source_structure: GroupPolicy,
    /// Security rules (workflow actions)
    #[serde(default)]
    pub security: GroupPolicy,
    /// Repository topic requirements
    #[serde(default)]
    pub topics: TopicPolicy,
    /// Provisioning and template-linter commands
    pub provisioning: ProvisioningPolicy,
    /// Security scan aggregation settings
    #[serde(default)]
    pub scan: ScanPolicy,
    /// Report presentation settings
    #[serde(default)]
    pub report: ReportPolicy,
}

/// Rules evaluated within one report group
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupPolicy {
    /// Files that must exist (and optionally contain markers)
    #[serde(default)]
    pub files: Vec<ValidationRule>,
    /// Folders that must exist
    #[serde(default)]
    pub folders: Vec<FolderRule>,
    /// Required CI workflow actions
    #[serde(default)]
    pub workflows: Vec<WorkflowRule>,
}

impl GroupPolicy {
    pub fn rule_count(&self) -> usize {
        self.files.len() + self.folders.len() + self.workflows.len()
    }
}

/// Declarative file requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Unique identifier for this rule
    pub id: String,
    /// Logical file name without extension, e.g. `README`
    pub name: String,
    /// Acceptable extensions in preference order; `""` means no extension.
    /// The first entry forms the display name.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Directories the file may live in, relative to the repository root; `""` is the root
    #[serde(default = "default_directories")]
    pub directories: Vec<String>,
    /// Whether directory and file names are compared case-sensitively
    #[serde(default)]
    pub case_sensitive: bool,
    /// Substrings (usually headings) the file text must contain
    #[serde(default)]
    pub required_markers: Option<Vec<String>>,
}

impl ValidationRule {
    /// Create a case-insensitive rule for `name` with no extension at the repository root
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            extensions: default_extensions(),
            directories: default_directories(),
            case_sensitive: false,
            required_markers: None,
        }
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn in_directories<I, S>(mut self, directories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.directories = directories.into_iter().map(Into::into).collect();
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn with_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_markers = Some(markers.into_iter().map(Into::into).collect());
        self
    }

    /// File name for one extension: `name` alone when the extension is empty
    pub fn file_name_for(&self, extension: &str) -> String {
        if extension.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, extension)
        }
    }

    /// Canonical name shown in reports, e.g. `infra/main.bicep`
    pub fn display_name(&self) -> String {
        let file = self.file_name_for(self.extensions.first().map(String::as_str).unwrap_or(""));
        match self.directories.first().map(|d| d.trim_matches('/')) {
            Some(dir) if !dir.is_empty() => format!("{dir}/{file}"),
            _ => file,
        }
    }

    /// Markers the file must contain; empty when the rule has none
    pub fn markers(&self) -> &[String] {
        self.required_markers.as_deref().unwrap_or(&[])
    }
}

/// Declarative folder requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRule {
    pub id: String,
    /// Folder path relative to the repository root, e.g. `.github/workflows`
    pub path: String,
    #[serde(default)]
    pub case_sensitive: bool,
}

impl FolderRule {
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self { id: id.into(), path: path.into(), case_sensitive: false }
    }
}

/// How a workflow rule decides which files must carry the required actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPolicy {
    /// One named workflow file; every job must use every action
    StrictPerJob,
    /// At least one workflow file in the directory passes the strict test
    AnyFile,
}

/// Required CI actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRule {
    pub id: String,
    pub policy: WorkflowPolicy,
    /// Logical workflow file name; required for `strict_per_job`
    #[serde(default)]
    pub workflow: Option<String>,
    /// Action identifiers without version pins, e.g. `Azure/setup-azd`
    pub required_actions: Vec<String>,
    /// Workflow directory relative to the repository root
    #[serde(default = "default_workflow_directory")]
    pub directory: String,
    /// Glob patterns selecting workflow files inside the directory
    #[serde(default = "default_workflow_patterns")]
    pub file_patterns: Vec<String>,
}

impl WorkflowRule {
    /// Every job of the named workflow must use every action
    pub fn strict(
        id: impl Into<String>,
        workflow: impl Into<String>,
        required_actions: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            policy: WorkflowPolicy::StrictPerJob,
            workflow: Some(workflow.into()),
            required_actions,
            directory: default_workflow_directory(),
            file_patterns: default_workflow_patterns(),
        }
    }

    /// Some workflow file in the directory must satisfy the strict test
    pub fn any_file(id: impl Into<String>, required_actions: Vec<String>) -> Self {
        Self {
            id: id.into(),
            policy: WorkflowPolicy::AnyFile,
            workflow: None,
            required_actions,
            directory: default_workflow_directory(),
            file_patterns: default_workflow_patterns(),
        }
    }

    /// Resolution rule for the named workflow file of a strict rule
    pub fn workflow_file_rule(&self) -> Option<ValidationRule> {
        let name = self.workflow.as_ref()?;
        Some(
            ValidationRule::new(format!("{}_file", self.id), name.clone())
                .with_extensions(["yml", "yaml"])
                .in_directories([self.directory.clone()]),
        )
    }
}

/// Repository topic requirements
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicPolicy {
    /// Topics the repository must be tagged with; empty disables the check
    #[serde(default)]
    pub required: Vec<String>,
}

/// An external command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { program: program.into(), args: args.into_iter().map(Into::into).collect() }
    }

    /// Command line for display
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Provisioning ("up"/"down") and template-linter commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningPolicy {
    pub up: ToolCommand,
    pub down: ToolCommand,
    /// Linter run when provisioning is not requested; `{template}` is replaced
    /// with the resolved template path
    #[serde(default)]
    pub lint: Option<ToolCommand>,
    /// The infrastructure template the linter checks
    pub lint_target: ValidationRule,
}

/// Security scan aggregation settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanPolicy {
    /// Rule codes downgraded to warnings regardless of reported severity
    #[serde(default)]
    pub severity_exceptions: Vec<String>,
}

/// Report presentation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPolicy {
    /// Banner title, followed by PASSED/FAILED
    pub title: String,
    /// Fixed "how to fix" link appended to failing items
    pub help_link: String,
}

impl Default for ReportPolicy {
    fn default() -> Self {
        Self {
            title: "AI Gallery Standard Validation".to_string(),
            help_link: "https://azure.github.io/ai-apps/".to_string(),
        }
    }
}

impl PolicyConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> GuardianResult<Self> {
        let contents = fs::read_to_string(&path).map_err(|e| {
            GuardianError::config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            GuardianError::config(format!(
                "Failed to parse config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from string content
    pub fn load_from_str(content: &str) -> GuardianResult<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| GuardianError::config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Built-in catalog for AI gallery templates
    pub fn with_defaults() -> Self {
        let readme_sections = ["## Features", "## Getting Started", "## Guidance", "## Resources"];

        Self {
            version: "1.0".to_string(),
            repository_management: GroupPolicy {
                files: vec![
                    ValidationRule::new("readme", "README")
                        .with_extensions(["md"])
                        .with_markers(readme_sections),
                    ValidationRule::new("license", "LICENSE").with_extensions(["", "md", "txt"]),
                    ValidationRule::new("security", "SECURITY")
                        .with_extensions(["md"])
                        .in_directories(["", ".github"]),
                    ValidationRule::new("contributing", "CONTRIBUTING")
                        .with_extensions(["md"])
                        .in_directories(["", ".github"]),
                    ValidationRule::new("code_of_conduct", "CODE_OF_CONDUCT")
                        .with_extensions(["md"])
                        .in_directories(["", ".github"]),
                    ValidationRule::new("issue_template", "ISSUE_TEMPLATE")
                        .with_extensions(["md"])
                        .in_directories([".github", ".github/ISSUE_TEMPLATE"]),
                ],
                folders: Vec::new(),
                workflows: Vec::new(),
            },
            source_structure: GroupPolicy {
                files: vec![
                    ValidationRule::new("azure_dev_workflow", "azure-dev")
                        .with_extensions(["yml", "yaml"])
                        .in_directories([".github/workflows"]),
                    ValidationRule::new("ci_workflow", "ci")
                        .with_extensions(["yml", "yaml"])
                        .in_directories([".github/workflows"]),
                    ValidationRule::new("azure_yaml", "azure").with_extensions(["yaml", "yml"]),
                    ValidationRule::new("infra_main", "main")
                        .with_extensions(["bicep"])
                        .in_directories(["infra"]),
                ],
                folders: vec![
                    FolderRule::new("devcontainer", ".devcontainer"),
                    FolderRule::new("workflows_folder", ".github/workflows"),
                ],
                workflows: vec![WorkflowRule::strict(
                    "azure_dev_actions",
                    "azure-dev",
                    vec!["Azure/setup-azd".to_string()],
                )],
            },
            security: GroupPolicy {
                files: Vec::new(),
                folders: Vec::new(),
                workflows: vec![WorkflowRule::any_file(
                    "security_scan_action",
                    vec!["microsoft/security-devops-action".to_string()],
                )],
            },
            topics: TopicPolicy {
                required: vec!["azd-templates".to_string(), "ai-azd-templates".to_string()],
            },
            provisioning: ProvisioningPolicy {
                up: ToolCommand::new("azd", ["up", "--no-prompt"]),
                down: ToolCommand::new("azd", ["down", "--force", "--purge"]),
                lint: Some(ToolCommand::new(
                    "az",
                    ["bicep", "build", "--file", "{template}", "--stdout"],
                )),
                lint_target: ValidationRule::new("lint_target", "main")
                    .with_extensions(["bicep"])
                    .in_directories(["infra"]),
            },
            scan: ScanPolicy::default(),
            report: ReportPolicy::default(),
        }
    }

    /// Rules for one report group; the functional group has none
    pub fn group(&self, group: CheckGroup) -> Option<&GroupPolicy> {
        match group {
            CheckGroup::RepositoryManagement => Some(&self.repository_management),
            CheckGroup::SourceStructure => Some(&self.source_structure),
            CheckGroup::Security => Some(&self.security),
            CheckGroup::Functional => None,
        }
    }

    fn group_mut(&mut self, group: CheckGroup) -> GuardianResult<&mut GroupPolicy> {
        match group {
            CheckGroup::RepositoryManagement => Ok(&mut self.repository_management),
            CheckGroup::SourceStructure => Ok(&mut self.source_structure),
            CheckGroup::Security => Ok(&mut self.security),
            CheckGroup::Functional => Err(GuardianError::config(
                "The functional group is driven by provisioning commands, not rules",
            )),
        }
    }

    /// Total number of declarative rules in the catalog
    pub fn rule_count(&self) -> usize {
        self.repository_management.rule_count()
            + self.source_structure.rule_count()
            + self.security.rule_count()
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> GuardianResult<()> {
        if !["1.0"].contains(&self.version.as_str()) {
            return Err(GuardianError::config(format!(
                "Unsupported configuration version: {}. Supported versions: 1.0",
                self.version
            )));
        }

        let mut ids = HashSet::new();
        let groups = [&self.repository_management, &self.source_structure, &self.security];

        let file_rules = groups
            .iter()
            .flat_map(|g| g.files.iter())
            .chain(std::iter::once(&self.provisioning.lint_target));
        for rule in file_rules {
            if !ids.insert(rule.id.as_str()) {
                return Err(GuardianError::config(format!("Duplicate rule ID '{}'", rule.id)));
            }
            validate_file_rule(rule)?;
        }

        for folder in groups.iter().flat_map(|g| g.folders.iter()) {
            if !ids.insert(folder.id.as_str()) {
                return Err(GuardianError::config(format!("Duplicate rule ID '{}'", folder.id)));
            }
            if folder.path.trim_matches('/').is_empty() {
                return Err(GuardianError::config(format!(
                    "Folder rule '{}' must name a folder below the repository root",
                    folder.id
                )));
            }
        }

        for workflow in groups.iter().flat_map(|g| g.workflows.iter()) {
            if !ids.insert(workflow.id.as_str()) {
                return Err(GuardianError::config(format!(
                    "Duplicate rule ID '{}'",
                    workflow.id
                )));
            }
            validate_workflow_rule(workflow)?;
        }

        let commands = [&self.provisioning.up, &self.provisioning.down]
            .into_iter()
            .chain(self.provisioning.lint.as_ref());
        for command in commands {
            if command.program.trim().is_empty() {
                return Err(GuardianError::config("Tool commands must name a program"));
            }
        }

        Ok(())
    }

    /// Convert to YAML for display or export
    pub fn to_yaml(&self) -> GuardianResult<String> {
        serde_yaml::to_string(self)
            .map_err(|e| GuardianError::config(format!("Failed to serialize config: {e}")))
    }

    /// Create a fingerprint of the configuration recorded in reports
    pub fn fingerprint(&self) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();

        // Every collection in the catalog is an ordered Vec, so the JSON form is stable
        serde_json::to_string(self).unwrap_or_default().hash(&mut hasher);

        format!("{:x}", hasher.finish())
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn validate_file_rule(rule: &ValidationRule) -> GuardianResult<()> {
    if rule.name.trim().is_empty() {
        return Err(GuardianError::config(format!("Rule '{}' has an empty file name", rule.id)));
    }
    if rule.extensions.is_empty() {
        return Err(GuardianError::config(format!(
            "Rule '{}' must list at least one extension (use \"\" for none)",
            rule.id
        )));
    }
    if rule.directories.is_empty() {
        return Err(GuardianError::config(format!(
            "Rule '{}' must list at least one directory (use \"\" for the repository root)",
            rule.id
        )));
    }
    Ok(())
}

fn validate_workflow_rule(rule: &WorkflowRule) -> GuardianResult<()> {
    if rule.required_actions.is_empty() {
        return Err(GuardianError::config(format!(
            "Workflow rule '{}' requires no actions",
            rule.id
        )));
    }
    if rule.policy == WorkflowPolicy::StrictPerJob && rule.workflow.is_none() {
        return Err(GuardianError::config(format!(
            "Workflow rule '{}' uses strict_per_job and must name a workflow",
            rule.id
        )));
    }
    if rule.file_patterns.is_empty() {
        return Err(GuardianError::config(format!(
            "Workflow rule '{}' has no file patterns",
            rule.id
        )));
    }
    for pattern in &rule.file_patterns {
        glob::Pattern::new(pattern).map_err(|e| {
            GuardianError::config(format!(
                "Invalid file pattern '{}' in workflow rule '{}': {}",
                pattern, rule.id, e
            ))
        })?;
    }
    Ok(())
}

fn default_extensions() -> Vec<String> {
    vec![String::new()]
}

fn default_directories() -> Vec<String> {
    vec![String::new()]
}

fn default_workflow_directory() -> String {
    ".github/workflows".to_string()
}

fn default_workflow_patterns() -> Vec<String> {
    vec!["*.yml".to_string(), "*.yaml".to_string()]
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: PolicyConfig,
}

impl ConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self { config: PolicyConfig::default() }
    }

    /// Start from an empty catalog that keeps the default commands and report settings
    pub fn empty() -> Self {
        let mut config = PolicyConfig::default();
        config.repository_management = GroupPolicy::default();
        config.source_structure = GroupPolicy::default();
        config.security = GroupPolicy::default();
        config.topics = TopicPolicy::default();
        Self { config }
    }

    /// Add a file rule to a group
    pub fn add_file_rule(mut self, group: CheckGroup, rule: ValidationRule) -> GuardianResult<Self> {
        self.config.group_mut(group)?.files.push(rule);
        Ok(self)
    }

    /// Add a folder rule to a group
    pub fn add_folder_rule(mut self, group: CheckGroup, rule: FolderRule) -> GuardianResult<Self> {
        self.config.group_mut(group)?.folders.push(rule);
        Ok(self)
    }

    /// Add a workflow rule to a group
    pub fn add_workflow_rule(
        mut self,
        group: CheckGroup,
        rule: WorkflowRule,
    ) -> GuardianResult<Self> {
        self.config.group_mut(group)?.workflows.push(rule);
        Ok(self)
    }

    /// Downgrade a scan rule code to a warning
    pub fn severity_exception(mut self, code: impl Into<String>) -> Self {
        self.config.scan.severity_exceptions.push(code.into());
        self
    }

    /// Replace the required topics
    pub fn required_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.topics.required = topics.into_iter().map(Into::into).collect();
        self
    }

    /// Replace or remove the template-linter command
    pub fn lint_command(mut self, command: Option<ToolCommand>) -> Self {
        self.config.provisioning.lint = command;
        self
    }

    /// Set the help link appended to failing items
    pub fn help_link(mut self, link: impl Into<String>) -> Self {
        self.config.report.help_link = link.into();
        self
    }

    /// Build the final configuration
    pub fn build(self) -> GuardianResult<PolicyConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
