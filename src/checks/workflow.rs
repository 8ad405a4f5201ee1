//! CI workflow policy checks
//!
//! Workflows are parsed into a minimal model (jobs, steps, `uses`) and every job
//! is tested for the required actions. Version pins (`@v1`, `@<sha>`) are ignored.

use crate::config::{WorkflowPolicy, WorkflowRule};
use crate::domain::checks::{CheckResult, GuardianError, GuardianResult};
use crate::resolver;
use glob::{MatchOptions, Pattern};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// The part of a workflow document the policy cares about
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowDefinition {
    /// Absent `jobs` means there is nothing to check
    #[serde(default)]
    pub jobs: Option<BTreeMap<String, Job>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub steps: Option<Vec<Step>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Step {
    /// `actionIdentifier[@ref]`
    #[serde(default)]
    pub uses: Option<String>,
}

impl WorkflowDefinition {
    /// Parse a workflow document
    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Read and parse a workflow file
    pub fn load(path: &Path) -> GuardianResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
            .map_err(|e| GuardianError::parse(path.display().to_string(), e.to_string()))
    }

    /// Whether the document defines at least one job
    pub fn has_jobs(&self) -> bool {
        self.jobs.as_ref().is_some_and(|jobs| !jobs.is_empty())
    }

    /// Names of jobs none of whose steps use `action`
    pub fn jobs_missing(&self, action: &str) -> Vec<&str> {
        let Some(jobs) = &self.jobs else {
            return Vec::new();
        };

        jobs.iter()
            .filter(|(_, job)| !job.uses_action(action))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

impl Job {
    /// Whether any step references `action`, ignoring version pins
    pub fn uses_action(&self, action: &str) -> bool {
        self.steps
            .iter()
            .flatten()
            .filter_map(|step| step.uses.as_deref())
            .any(|reference| normalize_action(reference) == normalize_action(action))
    }
}

/// Strip the `@ref` suffix from an action reference
pub fn normalize_action(reference: &str) -> &str {
    reference.split_once('@').map_or(reference, |(action, _)| action).trim()
}

/// A workflow file as discovered on disk
#[derive(Debug, Clone)]
pub struct WorkflowFile {
    /// Name shown in report detail, relative to the repository root
    pub name: String,
    /// Parsed document, or the reason it could not be parsed
    pub definition: Result<WorkflowDefinition, String>,
}

impl WorkflowFile {
    /// Load a workflow file; parse failures are kept, not raised
    pub fn load(path: &Path, root: &Path) -> Self {
        let name = display_path(path, root);
        let definition = WorkflowDefinition::load(path).map_err(|e| {
            tracing::warn!("Skipping workflow {}: {}", name, e);
            e.to_string()
        });
        Self { name, definition }
    }
}

/// Per-file outcome of the strict-per-job test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub name: String,
    pub passed: bool,
    pub reasons: Vec<String>,
}

/// Result of testing a set of workflow files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCheck {
    /// Whether at least one file passed the strict-per-job test
    pub satisfied_by_any: bool,
    pub per_file: Vec<FileOutcome>,
}

/// Strict-per-job failures for one document, one item per missing (action, file) pair
pub fn strict_failures(
    definition: &WorkflowDefinition,
    file_name: &str,
    required_actions: &[String],
) -> Vec<String> {
    required_actions
        .iter()
        .filter_map(|action| {
            let jobs = definition.jobs_missing(action);
            (!jobs.is_empty()).then(|| {
                format!(
                    "`{}` is missing in {} (jobs: {}).",
                    normalize_action(action),
                    file_name,
                    jobs.join(", ")
                )
            })
        })
        .collect()
}

/// Test every file; a file passes only when it parsed, defines jobs, and every job uses every action
pub fn check_required_actions(files: &[WorkflowFile], required_actions: &[String]) -> ActionCheck {
    let per_file: Vec<FileOutcome> = files
        .iter()
        .map(|file| {
            let reasons = match &file.definition {
                Err(e) => vec![format!("{} could not be parsed: {}", file.name, e)],
                Ok(definition) if !definition.has_jobs() => {
                    vec![format!("{} defines no jobs.", file.name)]
                }
                Ok(definition) => strict_failures(definition, &file.name, required_actions),
            };
            FileOutcome { name: file.name.clone(), passed: reasons.is_empty(), reasons }
        })
        .collect();

    ActionCheck { satisfied_by_any: per_file.iter().any(|f| f.passed), per_file }
}

/// Evaluate a workflow rule against a repository
pub fn check_workflow_rule(rule: &WorkflowRule, root: &Path) -> CheckResult {
    match rule.policy {
        WorkflowPolicy::StrictPerJob => check_strict_rule(rule, root),
        WorkflowPolicy::AnyFile => check_any_file_rule(rule, root),
    }
}

fn check_strict_rule(rule: &WorkflowRule, root: &Path) -> CheckResult {
    let Some(file_rule) = rule.workflow_file_rule() else {
        return CheckResult::fail(format!("Workflow rule {}", rule.id))
            .with_detail("The rule names no workflow file.");
    };

    let display = file_rule.display_name();
    let label = format!("{} used in every job of {}.", action_list(rule), display);

    let resolved = resolver::resolve(&file_rule, root);
    let Some(path) = resolved.path else {
        return CheckResult::fail(label).with_detail(format!("{display} is missing."));
    };

    let file = WorkflowFile::load(&path, root);
    match &file.definition {
        // Nothing could be checked, which does not count as a violation
        Err(e) => CheckResult::warn(label)
            .with_detail(format!("{} could not be parsed, no jobs were checked: {}", file.name, e)),
        Ok(definition) => {
            let failures = strict_failures(definition, &file.name, &rule.required_actions);
            if failures.is_empty() {
                CheckResult::pass(label)
            } else {
                CheckResult::fail(label).with_details(failures)
            }
        }
    }
}

fn check_any_file_rule(rule: &WorkflowRule, root: &Path) -> CheckResult {
    let label = format!("{} used in a workflow in {}.", action_list(rule), rule.directory);

    let Some(directory) = resolver::find_directory(root, &rule.directory, false) else {
        return CheckResult::fail(label).with_detail(format!("{} is missing.", rule.directory));
    };

    let paths = match workflow_files(&directory, &rule.file_patterns) {
        Ok(paths) => paths,
        Err(e) => return CheckResult::fail(label).with_detail(e.to_string()),
    };
    if paths.is_empty() {
        return CheckResult::fail(label)
            .with_detail(format!("No workflow files found in {}.", rule.directory));
    }

    let files: Vec<WorkflowFile> = paths.iter().map(|path| WorkflowFile::load(path, root)).collect();
    let outcome = check_required_actions(&files, &rule.required_actions);

    if outcome.satisfied_by_any {
        if let Some(file) = outcome.per_file.iter().find(|f| f.passed) {
            tracing::debug!("Workflow rule '{}' satisfied by {}", rule.id, file.name);
        }
        return CheckResult::pass(label);
    }

    let reasons = outcome.per_file.into_iter().flat_map(|f| f.reasons);
    CheckResult::fail(label).with_details(reasons)
}

/// Workflow files directly inside `directory` matching any pattern, sorted by name
pub fn workflow_files(directory: &Path, patterns: &[String]) -> GuardianResult<Vec<PathBuf>> {
    let patterns = patterns
        .iter()
        .map(|p| Pattern::new(p).map_err(|e| GuardianError::config(format!("Invalid pattern '{p}': {e}"))))
        .collect::<GuardianResult<Vec<_>>>()?;
    let options = MatchOptions { case_sensitive: false, ..MatchOptions::new() };

    let mut files: Vec<PathBuf> = fs::read_dir(directory)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy())
                .is_some_and(|name| patterns.iter().any(|p| p.matches_with(&name, options)))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn action_list(rule: &WorkflowRule) -> String {
    rule.required_actions
        .iter()
        .map(|action| format!("`{}`", normalize_action(action)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_path(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::checks::CheckStatus;
    use tempfile::TempDir;

    const DEPLOY: &str = r#"
name: Deploy
on: [push]
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - uses: Azure/setup-azd@v1.0.0
      - run: azd provision
  deploy:
    runs-on: ubuntu-latest
    steps:
      - uses: Azure/setup-azd@main
"#;

    const PARTIAL: &str = r#"
jobs:
  build:
    steps:
      - uses: Azure/setup-azd@v1
  lint:
    steps:
      - run: echo lint
"#;

    fn actions(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn workflow_dir(root: &Path) -> PathBuf {
        let dir = root.join(".github/workflows");
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_normalize_action_drops_version_pin() {
        assert_eq!(normalize_action("Azure/setup-azd@v1.0.0"), "Azure/setup-azd");
        assert_eq!(normalize_action("actions/checkout@a1b2@c3"), "actions/checkout");
        assert_eq!(normalize_action("Azure/setup-azd"), "Azure/setup-azd");
    }

    #[test]
    fn test_every_job_must_use_every_action() {
        let definition = WorkflowDefinition::parse(DEPLOY).unwrap();
        assert!(strict_failures(&definition, "deploy.yml", &actions(&["Azure/setup-azd"])).is_empty());

        let failures =
            strict_failures(&definition, "deploy.yml", &actions(&["actions/checkout@v3"]));
        assert_eq!(failures, vec!["`actions/checkout` is missing in deploy.yml (jobs: deploy)."]);
    }

    #[test]
    fn test_failures_are_itemized_per_action() {
        let definition = WorkflowDefinition::parse(PARTIAL).unwrap();
        let failures = strict_failures(
            &definition,
            "ci.yml",
            &actions(&["Azure/setup-azd", "microsoft/security-devops-action"]),
        );
        assert_eq!(
            failures,
            vec![
                "`Azure/setup-azd` is missing in ci.yml (jobs: lint).",
                "`microsoft/security-devops-action` is missing in ci.yml (jobs: build, lint).",
            ]
        );
    }

    #[test]
    fn test_no_jobs_is_vacuously_satisfied() {
        let definition = WorkflowDefinition::parse("name: empty\non: push\n").unwrap();
        assert!(!definition.has_jobs());
        assert!(strict_failures(&definition, "empty.yml", &actions(&["a/b"])).is_empty());
    }

    #[test]
    fn test_job_without_steps_fails() {
        let definition = WorkflowDefinition::parse(
            "jobs:\n  call:\n    uses: org/repo/.github/workflows/reuse.yml@main\n",
        )
        .unwrap();
        assert_eq!(definition.jobs_missing("a/b"), vec!["call"]);
    }

    #[test]
    fn test_any_file_passes_when_one_file_passes() {
        let files = vec![
            WorkflowFile {
                name: "a.yml".into(),
                definition: Ok(WorkflowDefinition::parse(PARTIAL).unwrap()),
            },
            WorkflowFile {
                name: "b.yml".into(),
                definition: Ok(WorkflowDefinition::parse(DEPLOY).unwrap()),
            },
        ];
        let outcome = check_required_actions(&files, &actions(&["Azure/setup-azd"]));
        assert!(outcome.satisfied_by_any);
        assert!(!outcome.per_file[0].passed);
        assert!(outcome.per_file[1].passed);
    }

    #[test]
    fn test_unparsable_or_jobless_files_do_not_satisfy_any_file() {
        let files = vec![
            WorkflowFile { name: "broken.yml".into(), definition: Err("bad indentation".into()) },
            WorkflowFile {
                name: "empty.yml".into(),
                definition: Ok(WorkflowDefinition::parse("name: empty\n").unwrap()),
            },
        ];
        let outcome = check_required_actions(&files, &actions(&["a/b"]));
        assert!(!outcome.satisfied_by_any);
        assert_eq!(outcome.per_file[0].reasons, vec!["broken.yml could not be parsed: bad indentation"]);
        assert_eq!(outcome.per_file[1].reasons, vec!["empty.yml defines no jobs."]);
    }

    #[test]
    fn test_strict_rule_against_repository() {
        let temp_dir = TempDir::new().unwrap();
        let rule = WorkflowRule::strict("deploy", "azure-dev", actions(&["Azure/setup-azd"]));

        let missing = check_workflow_rule(&rule, temp_dir.path());
        assert_eq!(missing.status, CheckStatus::Fail);
        assert_eq!(missing.details, vec![".github/workflows/azure-dev.yml is missing."]);

        let dir = workflow_dir(temp_dir.path());
        fs::write(dir.join("Azure-Dev.YAML"), PARTIAL).unwrap();
        let partial = check_workflow_rule(&rule, temp_dir.path());
        assert_eq!(partial.status, CheckStatus::Fail);
        assert_eq!(
            partial.details,
            vec!["`Azure/setup-azd` is missing in .github/workflows/Azure-Dev.YAML (jobs: lint)."]
        );

        fs::write(dir.join("Azure-Dev.YAML"), DEPLOY).unwrap();
        assert_eq!(check_workflow_rule(&rule, temp_dir.path()).status, CheckStatus::Pass);
    }

    #[test]
    fn test_strict_rule_with_unparsable_file_warns() {
        let temp_dir = TempDir::new().unwrap();
        let dir = workflow_dir(temp_dir.path());
        fs::write(dir.join("azure-dev.yml"), "jobs: [unclosed").unwrap();

        let rule = WorkflowRule::strict("deploy", "azure-dev", actions(&["Azure/setup-azd"]));
        let item = check_workflow_rule(&rule, temp_dir.path());
        assert_eq!(item.status, CheckStatus::Warn);
        assert!(item.passed());
    }

    #[test]
    fn test_any_file_rule_against_repository() {
        let temp_dir = TempDir::new().unwrap();
        let rule = WorkflowRule::any_file("scan", actions(&["microsoft/security-devops-action"]));

        let no_dir = check_workflow_rule(&rule, temp_dir.path());
        assert_eq!(no_dir.details, vec![".github/workflows is missing."]);

        let dir = workflow_dir(temp_dir.path());
        let empty = check_workflow_rule(&rule, temp_dir.path());
        assert_eq!(empty.details, vec!["No workflow files found in .github/workflows."]);

        fs::write(dir.join("ci.yml"), PARTIAL).unwrap();
        fs::write(dir.join("notes.txt"), "not a workflow").unwrap();
        let failing = check_workflow_rule(&rule, temp_dir.path());
        assert!(!failing.passed());
        assert_eq!(failing.details.len(), 1);

        fs::write(
            dir.join("security.yaml"),
            "jobs:\n  scan:\n    steps:\n      - uses: microsoft/security-devops-action@v1.6.0\n",
        )
        .unwrap();
        assert!(check_workflow_rule(&rule, temp_dir.path()).passed());
    }
}
