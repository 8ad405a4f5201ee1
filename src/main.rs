//! Template Guardian CLI - Command-line interface for template compliance validation
//!
//! CDD Principle: Application Layer - CLI coordinates user interactions with domain services
//! - Translates user commands to domain operations
//! - Handles external concerns like file I/O, process exit codes, and terminal output
//! - Provides clean separation between user interface and business logic

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use template_guardian::{
    CheckGroup, OutputFormat, PolicyConfig, ReportFormatter, ReportOptions, TemplateValidator,
    ValidationOptions,
};

const DEFAULT_CONFIG_FILES: [&str; 3] =
    ["template_guardian.yaml", "template_guardian.yml", ".template_guardian.yaml"];

/// Template Guardian - Compliance validation for template repositories
#[derive(Parser)]
#[command(name = "template-guardian")]
#[command(version)]
#[command(about = "Validate a template repository against the AI gallery standards")]
#[command(long_about = "Template Guardian checks a template repository for required documentation, \
source layout, CI workflow actions, provisioning and security scan results, and renders a \
PASSED/FAILED compliance report.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a repository
    Check(CheckArgs),

    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        config_file: Option<PathBuf>,
    },

    /// List the rule catalog
    Rules,
}

#[derive(Args, Clone)]
struct CheckArgs {
    /// The path to the repository to validate
    repo_path: PathBuf,

    /// Provision the infrastructure with `azd up`
    #[arg(long)]
    azdup: bool,

    /// Tear the infrastructure down with `azd down` after provisioning
    #[arg(long)]
    azddown: bool,

    /// Comma-separated topics the repository is tagged with
    #[arg(long)]
    topics: Option<String>,

    /// Comma-separated topics to require instead of the catalog's
    #[arg(long)]
    expected_topics: Option<String>,

    /// SARIF results of the security scan
    #[arg(long)]
    security_scan: Option<PathBuf>,

    /// Write the report to this file as well as stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "markdown")]
    format: OutputFormatArg,

    /// Disable parallel processing
    #[arg(long)]
    no_parallel: bool,
}

#[derive(Copy, Clone, ValueEnum, PartialEq)]
enum OutputFormatArg {
    Markdown,
    Human,
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Markdown => OutputFormat::Markdown,
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.debug);

    #[cfg(feature = "colors")]
    if cli.no_color {
        colored::control::set_override(false);
    }

    match run_command(cli) {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}

fn run_command(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Check(args) => run_check(cli.config, &args, !cli.no_color),
        Commands::ValidateConfig { config_file } => {
            Ok(run_validate_config(config_file.or(cli.config)))
        }
        Commands::Rules => run_list_rules(cli.config),
    }
}

/// Explicit path first, then the default file names in the working directory
fn load_config(config_path: Option<PathBuf>) -> Result<PolicyConfig> {
    if let Some(path) = config_path {
        return PolicyConfig::load_from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()));
    }

    for name in DEFAULT_CONFIG_FILES {
        if Path::new(name).exists() {
            tracing::debug!("Using configuration file {}", name);
            return PolicyConfig::load_from_file(name)
                .with_context(|| format!("Failed to load configuration from {name}"));
        }
    }

    Ok(PolicyConfig::default())
}

fn run_check(config_path: Option<PathBuf>, args: &CheckArgs, use_colors: bool) -> Result<i32> {
    let config = load_config(config_path)?;

    let use_colors = use_colors && args.format == OutputFormatArg::Human && args.output.is_none();
    let validator = TemplateValidator::new_with_config(config)?
        .with_report_formatter(ReportFormatter::new(ReportOptions { use_colors, ..Default::default() }));

    tracing::debug!(
        "Repo path: {} azdup: {} azddown: {} output: {:?}",
        args.repo_path.display(),
        args.azdup,
        args.azddown,
        args.output
    );
    if args.azddown && !args.azdup {
        tracing::warn!("--azddown has no effect without --azdup");
    }

    let options = ValidationOptions {
        provision_up: args.azdup,
        provision_down: args.azddown,
        topics: args.topics.clone(),
        expected_topics: args.expected_topics.clone(),
        security_scan: args.security_scan.clone(),
        parallel: !args.no_parallel,
    };

    let report = validator.validate(&args.repo_path, &options)?;
    let formatted = validator.format_report(&report, args.format.into())?;
    println!("{formatted}");

    if let Some(output) = &args.output {
        fs::write(output, &formatted)
            .with_context(|| format!("Failed to write report to {}", output.display()))?;
    }

    Ok(if report.overall_passed() { 0 } else { 1 })
}

fn run_validate_config(config_path: Option<PathBuf>) -> i32 {
    let config_path =
        config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));

    println!("Validating configuration: {}", config_path.display());

    match TemplateValidator::from_config_file(&config_path) {
        Ok(validator) => {
            println!("Configuration is valid");

            let stats = validator.catalog_statistics();
            println!("Configuration summary:");
            println!(
                "  Rules: {} total ({} files, {} with content markers, {} folders, {} workflows)",
                stats.total_rules(),
                stats.file_rules,
                stats.marker_rules,
                stats.folder_rules,
                stats.workflow_rules
            );
            println!("  Required topics: {}", stats.required_topics);
            println!("  Severity exceptions: {}", stats.severity_exceptions);
            println!(
                "  Template linter: {}",
                if stats.linter_configured { "configured" } else { "none" }
            );
            println!("  Fingerprint: {}", validator.config().fingerprint());
            0
        }
        Err(e) => {
            eprintln!("Configuration validation failed: {e}");
            1
        }
    }
}

fn run_list_rules(config_path: Option<PathBuf>) -> Result<i32> {
    let config = load_config(config_path)?;

    println!("Rule catalog\n");

    for group in CheckGroup::ALL {
        println!("{}", group.title());

        match config.group(group) {
            Some(policy) => {
                for rule in &policy.files {
                    let mut line = format!("  {} - {}", rule.id, rule.display_name());
                    if !rule.markers().is_empty() {
                        line.push_str(&format!(" (must contain: {})", rule.markers().join(", ")));
                    }
                    println!("{line}");
                }
                for rule in &policy.folders {
                    println!("  {} - {}/", rule.id, rule.path);
                }
                for rule in &policy.workflows {
                    let scope = rule.workflow.as_deref().unwrap_or("any workflow");
                    println!(
                        "  {} - {} in {} ({:?})",
                        rule.id,
                        rule.required_actions.join(", "),
                        scope,
                        rule.policy
                    );
                }
                if group == CheckGroup::RepositoryManagement && !config.topics.required.is_empty()
                {
                    println!("  topics - {}", config.topics.required.join(", "));
                }
                if group == CheckGroup::Security {
                    println!("  security_scan - SARIF results, no unexcepted errors");
                }
            }
            None => {
                let provisioning = &config.provisioning;
                println!("  provision_up - {}", provisioning.up.display());
                println!("  provision_down - {}", provisioning.down.display());
                if let Some(lint) = &provisioning.lint {
                    println!(
                        "  lint - {} against {}",
                        lint.display(),
                        provisioning.lint_target.display_name()
                    );
                }
            }
        }
        println!();
    }

    Ok(0)
}

fn init_logging(debug: bool) {
    let level = if debug { tracing::Level::DEBUG } else { tracing::Level::WARN };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
