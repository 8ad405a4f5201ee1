//! Functional requirements: provisioning and template-linter invocations
//!
//! Tools run as child processes with the repository as their working directory.
//! The validator never changes its own working directory.

use crate::config::{ProvisioningPolicy, ToolCommand};
use crate::domain::checks::{CheckResult, GuardianError, GuardianResult};
use crate::resolver;
use std::path::Path;
use std::process::Command;

/// Placeholder replaced with the resolved template path in linter arguments
pub const TEMPLATE_PLACEHOLDER: &str = "{template}";

/// Captured outcome of one tool invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Captured output lines for report detail, stderr first
    fn output_lines(&self) -> Vec<String> {
        [&self.stderr, &self.stdout]
            .into_iter()
            .flat_map(|text| text.lines())
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Runs external programs on behalf of the functional checks
pub trait ToolRunner: Send + Sync {
    /// Run `program` with `args` in `working_dir`; `Err` only when it cannot be started
    fn run(&self, program: &str, args: &[String], working_dir: &Path) -> GuardianResult<ToolOutput>;
}

/// Runs tools as child processes with captured output
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&self, program: &str, args: &[String], working_dir: &Path) -> GuardianResult<ToolOutput> {
        let output = Command::new(program)
            .args(args)
            .current_dir(working_dir)
            .output()
            .map_err(|e| GuardianError::tool(program, e.to_string()))?;

        Ok(ToolOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run a command and turn its outcome into a report item
///
/// `template` substitutes every `{template}` placeholder in the arguments.
pub fn run_tool(
    runner: &dyn ToolRunner,
    command: &ToolCommand,
    label: &str,
    root: &Path,
    template: Option<&Path>,
) -> CheckResult {
    let args: Vec<String> = command
        .args
        .iter()
        .map(|arg| match template {
            Some(path) => arg.replace(TEMPLATE_PLACEHOLDER, &path.to_string_lossy()),
            None => arg.clone(),
        })
        .collect();

    tracing::debug!("Running {} {:?} in {}", command.program, args, root.display());

    match runner.run(&command.program, &args, root) {
        Ok(output) if output.success => CheckResult::pass(label),
        Ok(output) => {
            let exit = output
                .exit_code
                .map(|code| format!("exit code {code}"))
                .unwrap_or_else(|| "terminated by signal".to_string());
            tracing::warn!("{} failed ({})", command.display(), exit);

            CheckResult::fail(label)
                .with_detail(format!("`{}` failed with {}.", command.display(), exit))
                .with_details(output.output_lines())
        }
        Err(e) => {
            tracing::warn!("{}", e);
            CheckResult::fail(label)
                .with_detail(format!("`{}` could not be started: {}", command.display(), e))
        }
    }
}

/// Provisioning items in order: up, then down when both are requested; otherwise the
/// template linter against the resolved template, when one is configured
pub fn check_functional(
    policy: &ProvisioningPolicy,
    runner: &dyn ToolRunner,
    root: &Path,
    provision_up: bool,
    provision_down: bool,
) -> Vec<CheckResult> {
    let mut items = Vec::new();

    if provision_up {
        items.push(run_tool(runner, &policy.up, &policy.up.display(), root, None));
        if provision_down {
            items.push(run_tool(runner, &policy.down, &policy.down.display(), root, None));
        }
        return items;
    }

    if provision_down {
        tracing::warn!("Tear-down requested without provisioning; ignoring");
    }

    if let Some(lint) = &policy.lint {
        let target = &policy.lint_target;
        let label = format!("{} content validation.", target.display_name());
        let resolved = resolver::resolve(target, root);

        let item = match resolved.path.as_deref().filter(|_| resolved.found) {
            Some(path) => run_tool(runner, lint, &label, root, Some(path)),
            None => CheckResult::fail(label)
                .with_detail(format!("{} is missing.", target.display_name())),
        };
        items.push(item);
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyConfig;
    use crate::domain::checks::CheckStatus;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records invocations and fails programs named in `failing`
    #[derive(Default)]
    struct ScriptedRunner {
        calls: Mutex<Vec<(String, Vec<String>, PathBuf)>>,
        failing: Vec<&'static str>,
        unavailable: bool,
    }

    impl ToolRunner for ScriptedRunner {
        fn run(&self, program: &str, args: &[String], working_dir: &Path) -> GuardianResult<ToolOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec(), working_dir.to_path_buf()));

            if self.unavailable {
                return Err(GuardianError::tool(program, "not found"));
            }
            let verb = args.first().map(String::as_str).unwrap_or("");
            let success = !self.failing.contains(&verb);
            Ok(ToolOutput {
                success,
                exit_code: Some(if success { 0 } else { 1 }),
                stdout: String::new(),
                stderr: if success { String::new() } else { format!("{verb} exploded\n") },
            })
        }
    }

    fn programs(runner: &ScriptedRunner) -> Vec<String> {
        runner
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(program, args, _)| format!("{} {}", program, args.join(" ")))
            .collect()
    }

    #[test]
    fn test_up_then_down() {
        let temp_dir = TempDir::new().unwrap();
        let runner = ScriptedRunner::default();
        let policy = PolicyConfig::default().provisioning;

        let items = check_functional(&policy, &runner, temp_dir.path(), true, true);

        assert_eq!(items.len(), 2);
        assert!(items.iter().all(CheckResult::passed));
        assert_eq!(
            programs(&runner),
            vec!["azd up --no-prompt", "azd down --force --purge"]
        );
        let calls = runner.calls.lock().unwrap();
        assert!(calls.iter().all(|(_, _, dir)| dir == temp_dir.path()));
    }

    #[test]
    fn test_failed_provisioning_surfaces_output() {
        let temp_dir = TempDir::new().unwrap();
        let runner = ScriptedRunner { failing: vec!["up"], ..Default::default() };
        let policy = PolicyConfig::default().provisioning;

        let items = check_functional(&policy, &runner, temp_dir.path(), true, false);

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, CheckStatus::Fail);
        assert_eq!(items[0].details[0], "`azd up --no-prompt` failed with exit code 1.");
        assert_eq!(items[0].details[1], "up exploded");
    }

    #[test]
    fn test_down_alone_is_ignored_and_lint_runs() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("Infra")).unwrap();
        fs::write(temp_dir.path().join("Infra/main.bicep"), "param location string").unwrap();
        let runner = ScriptedRunner::default();
        let policy = PolicyConfig::default().provisioning;

        let items = check_functional(&policy, &runner, temp_dir.path(), false, true);

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "infra/main.bicep content validation.");
        assert!(items[0].passed());

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let template = temp_dir.path().join("Infra").join("main.bicep");
        assert_eq!(calls[0].1[3], template.to_string_lossy());
    }

    #[test]
    fn test_lint_without_template_fails_without_running() {
        let temp_dir = TempDir::new().unwrap();
        let runner = ScriptedRunner::default();
        let policy = PolicyConfig::default().provisioning;

        let items = check_functional(&policy, &runner, temp_dir.path(), false, false);

        assert_eq!(items[0].status, CheckStatus::Fail);
        assert_eq!(items[0].details, vec!["infra/main.bicep is missing."]);
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_nothing_requested_and_no_linter() {
        let temp_dir = TempDir::new().unwrap();
        let runner = ScriptedRunner::default();
        let mut policy = PolicyConfig::default().provisioning;
        policy.lint = None;

        assert!(check_functional(&policy, &runner, temp_dir.path(), false, false).is_empty());
    }

    #[test]
    fn test_spawn_failure_is_a_failed_item() {
        let temp_dir = TempDir::new().unwrap();
        let runner = ScriptedRunner { unavailable: true, ..Default::default() };
        let policy = PolicyConfig::default().provisioning;

        let items = check_functional(&policy, &runner, temp_dir.path(), true, true);

        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| item.status == CheckStatus::Fail));
        assert!(items[0].details[0].contains("could not be started"));
    }
}
