//! Report generation with multiple output formats
//!
//! CDD Principle: Anti-Corruption Layer - Formatters translate domain objects to external formats
//! - ComplianceReport (domain) is converted to Markdown, terminal text or JSON
//! - Each formatter encapsulates the rules for its specific output format
//! - The verdict is always read from the report, formatters never recompute it

use crate::config::ReportPolicy;
use crate::domain::checks::{
    CheckResult, CheckStatus, ComplianceReport, GuardianError, GuardianResult,
};
use serde_json::Value as JsonValue;
use std::io::Write;

/// Supported output formats for compliance reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Markdown with collapsible details, suitable for PR comments
    Markdown,
    /// Terminal text, colored when enabled
    Human,
    /// JSON format for programmatic consumption
    Json,
}

impl OutputFormat {
    /// Parse format from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Some(Self::Markdown),
            "human" => Some(Self::Human),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Get all available format names
    pub fn all_formats() -> &'static [&'static str] {
        &["markdown", "human", "json"]
    }
}

/// Options for customizing report output
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Whether to use colored output (for human format)
    pub use_colors: bool,
    /// Whether to include itemized detail for failing and warning checks
    pub show_details: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self { use_colors: true, show_details: true }
    }
}

/// Main report formatter that dispatches to specific formatters
#[derive(Debug, Clone)]
pub struct ReportFormatter {
    options: ReportOptions,
    presentation: ReportPolicy,
}

impl ReportFormatter {
    /// Create a new report formatter with options
    pub fn new(options: ReportOptions) -> Self {
        Self { options, presentation: ReportPolicy::default() }
    }

    /// Use the title and help link from a policy
    pub fn with_presentation(mut self, presentation: ReportPolicy) -> Self {
        self.presentation = presentation;
        self
    }

    /// Format a compliance report in the specified format
    pub fn format_report(
        &self,
        report: &ComplianceReport,
        format: OutputFormat,
    ) -> GuardianResult<String> {
        match format {
            OutputFormat::Markdown => Ok(self.format_markdown(report)),
            OutputFormat::Human => Ok(self.format_human(report)),
            OutputFormat::Json => self.format_json(report),
        }
    }

    /// Write a formatted report to a writer
    pub fn write_report<W: Write>(
        &self,
        report: &ComplianceReport,
        format: OutputFormat,
        mut writer: W,
    ) -> GuardianResult<()> {
        let formatted = self.format_report(report, format)?;
        writer.write_all(formatted.as_bytes())?;
        Ok(())
    }

    fn verdict(report: &ComplianceReport) -> &'static str {
        if report.overall_passed() {
            "PASSED"
        } else {
            "FAILED"
        }
    }

    /// Format report as Markdown
    fn format_markdown(&self, report: &ComplianceReport) -> String {
        let mut output = format!("# {} {}\n", self.presentation.title, Self::verdict(report));

        for section in &report.sections {
            output.push_str(&format!("\n## {}\n\n", section.title));
            for item in &section.items {
                output.push_str(&self.markdown_item(item));
            }
        }

        output
    }

    fn markdown_item(&self, item: &CheckResult) -> String {
        let glyph = match item.status {
            CheckStatus::Pass => ":heavy_check_mark:",
            CheckStatus::Warn => ":warning:",
            CheckStatus::Fail => ":x:",
        };

        let mut block =
            format!("<details>\n<summary>{} {}</summary>\n\n", glyph, escape_html(&item.label));

        if item.status != CheckStatus::Pass && self.options.show_details {
            let prefix = if item.status == CheckStatus::Fail { "Error" } else { "Warning" };
            for detail in &item.details {
                let detail = escape_html(detail);
                // Scanner detail already carries its own severity prefix
                if detail.starts_with("Error:") || detail.starts_with("Warning") {
                    block.push_str(&format!("- {detail}\n"));
                } else {
                    block.push_str(&format!("- {prefix}: {detail}\n"));
                }
            }
            block.push_str(&format!("\n[How to fix?]({})\n\n", self.presentation.help_link));
        }

        block.push_str("</details>\n");
        block
    }

    /// Format report for a terminal
    fn format_human(&self, report: &ComplianceReport) -> String {
        let mut output = String::new();
        let banner = format!("{} {}", self.presentation.title, Self::verdict(report));
        let color = if report.overall_passed() { Color::Green } else { Color::Red };
        output.push_str(&self.paint(&banner, color, true));
        output.push_str("\n\n");

        for section in &report.sections {
            output.push_str(&self.paint(&section.title, Color::Plain, true));
            output.push('\n');

            for item in &section.items {
                let (marker, color) = match item.status {
                    CheckStatus::Pass => ("[x]", Color::Green),
                    CheckStatus::Warn => ("[!]", Color::Yellow),
                    CheckStatus::Fail => ("[ ]", Color::Red),
                };
                output.push_str(&format!("  {} {}\n", self.paint(marker, color, false), item.label));

                if item.status != CheckStatus::Pass && self.options.show_details {
                    for detail in &item.details {
                        output.push_str(&format!("      {}\n", self.paint(detail, Color::Dim, false)));
                    }
                }
            }
            output.push('\n');
        }

        output.push_str(&self.format_summary(report));
        output
    }

    /// Format report in JSON format
    fn format_json(&self, report: &ComplianceReport) -> GuardianResult<String> {
        let sections: Vec<JsonValue> = report
            .sections
            .iter()
            .map(|section| {
                serde_json::json!({
                    "group": section.group,
                    "title": section.title,
                    "passed": section.passed(),
                    "items": section.items,
                })
            })
            .collect();

        let summary = report.summary();
        let json_report = serde_json::json!({
            "title": self.presentation.title,
            "repository": report.repository.display().to_string(),
            "overall_passed": report.overall_passed(),
            "sections": sections,
            "summary": {
                "pass": summary.pass,
                "warn": summary.warn,
                "fail": summary.fail,
                "total": summary.total(),
                "execution_time_ms": report.execution_time_ms,
            },
            "generated_at": report.generated_at.to_rfc3339(),
            "config_fingerprint": report.config_fingerprint,
            "help_link": self.presentation.help_link,
        });

        serde_json::to_string_pretty(&json_report)
            .map_err(|e| GuardianError::validation(format!("JSON serialization failed: {e}")))
    }

    /// Format the summary line
    fn format_summary(&self, report: &ComplianceReport) -> String {
        let counts = report.summary();
        let execution_time = (report.execution_time_ms as f64) / 1000.0;

        let mut parts = vec![self.paint(&format!("{} passed", counts.pass), Color::Green, false)];
        if counts.warn > 0 {
            let text = format!("{} warning{}", counts.warn, if counts.warn == 1 { "" } else { "s" });
            parts.push(self.paint(&text, Color::Yellow, false));
        }
        if counts.fail > 0 {
            parts.push(self.paint(&format!("{} failed", counts.fail), Color::Red, false));
        }

        format!(
            "{} {} of {} checks ({:.1}s)\n",
            self.paint("Summary:", Color::Plain, true),
            parts.join(", "),
            counts.total(),
            execution_time
        )
    }

    fn paint(&self, text: &str, color: Color, bold: bool) -> String {
        if !self.options.use_colors {
            return text.to_string();
        }
        color.apply(text, bold)
    }
}

impl Default for ReportFormatter {
    fn default() -> Self {
        Self::new(ReportOptions::default())
    }
}

#[derive(Debug, Clone, Copy)]
enum Color {
    Plain,
    Green,
    Yellow,
    Red,
    Dim,
}

impl Color {
    #[cfg(feature = "colors")]
    fn apply(self, text: &str, bold: bool) -> String {
        use colored::Colorize;

        let painted = match self {
            Self::Plain => text.normal(),
            Self::Green => text.green(),
            Self::Yellow => text.yellow(),
            Self::Red => text.red(),
            Self::Dim => text.dimmed(),
        };
        if bold {
            painted.bold().to_string()
        } else {
            painted.to_string()
        }
    }

    #[cfg(not(feature = "colors"))]
    fn apply(self, text: &str, _bold: bool) -> String {
        text.to_string()
    }
}

/// Item text lands inside `<details>` HTML, so tags and entities must stay literal
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::checks::{CheckGroup, ReportSection};

    fn create_test_report() -> ComplianceReport {
        let mut report = ComplianceReport::new("sample-repo");

        let mut management = ReportSection::new(CheckGroup::RepositoryManagement);
        management.push(
            CheckResult::fail("README.md is in place.")
                .with_detail("`## Resources` is missing in README.md."),
        );
        management.push(CheckResult::pass("LICENSE is in place."));
        report.add_section(management);

        let mut security = ReportSection::new(CheckGroup::Security);
        security.push(
            CheckResult::warn("Security scan results have no blocking findings.")
                .with_detail("Warning: [TA-000001] Diagnostic logs disabled"),
        );
        report.add_section(security);

        report.set_execution_time(1200);
        report.set_config_fingerprint("abc123");
        report
    }

    fn plain() -> ReportFormatter {
        ReportFormatter::new(ReportOptions { use_colors: false, ..Default::default() })
    }

    #[test]
    fn test_markdown_format() {
        let output = plain().format_report(&create_test_report(), OutputFormat::Markdown).unwrap();

        assert!(output.starts_with("# AI Gallery Standard Validation FAILED\n"));
        assert!(output.contains("## Repository Management"));
        assert!(output.contains("<summary>:x: README.md is in place.</summary>"));
        assert!(output.contains("- Error: `## Resources` is missing in README.md."));
        assert!(output.contains("<summary>:heavy_check_mark: LICENSE is in place.</summary>"));
        assert!(output.contains("<summary>:warning: Security scan"));
        assert!(output.contains("- Warning: [TA-000001] Diagnostic logs disabled"));
        assert_eq!(output.matches("[How to fix?](https://azure.github.io/ai-apps/)").count(), 2);
    }

    #[test]
    fn test_markdown_escapes_item_text() {
        let mut report = ComplianceReport::new("sample-repo");
        let mut section = ReportSection::new(CheckGroup::Security);
        section.push(
            CheckResult::fail("Workflow <deploy> & scan is in place.")
                .with_detail("</details><b>injected</b> & more")
                .with_detail("Error: [R1] value <script>"),
        );
        report.add_section(section);

        let output = plain().format_report(&report, OutputFormat::Markdown).unwrap();
        assert!(output.contains("<summary>:x: Workflow &lt;deploy&gt; &amp; scan is in place.</summary>"));
        assert!(output.contains("- Error: &lt;/details&gt;&lt;b&gt;injected&lt;/b&gt; &amp; more\n"));
        assert!(output.contains("- Error: [R1] value &lt;script&gt;\n"));
        assert!(!output.contains("<b>"));
        assert_eq!(output.matches("<details>").count(), output.matches("</details>").count());
    }

    #[test]
    fn test_markdown_passing_banner() {
        let mut report = ComplianceReport::new("sample-repo");
        let mut section = ReportSection::new(CheckGroup::SourceStructure);
        section.push(CheckResult::pass("azure.yaml is in place."));
        report.add_section(section);

        let output = plain().format_report(&report, OutputFormat::Markdown).unwrap();
        assert!(output.starts_with("# AI Gallery Standard Validation PASSED\n"));
        assert!(!output.contains("How to fix?"));
    }

    #[test]
    fn test_human_format() {
        let output = plain().format_report(&create_test_report(), OutputFormat::Human).unwrap();

        assert!(output.contains("AI Gallery Standard Validation FAILED"));
        assert!(output.contains("[ ] README.md is in place."));
        assert!(output.contains("[x] LICENSE is in place."));
        assert!(output.contains("      `## Resources` is missing in README.md."));
        assert!(output.contains("Summary: 1 passed, 1 warning, 1 failed of 3 checks (1.2s)"));
    }

    #[test]
    fn test_hidden_details() {
        let formatter =
            ReportFormatter::new(ReportOptions { use_colors: false, show_details: false });
        let output = formatter.format_report(&create_test_report(), OutputFormat::Markdown).unwrap();
        assert!(!output.contains("is missing in README.md"));
    }

    #[test]
    fn test_json_format() {
        let output =
            ReportFormatter::default().format_report(&create_test_report(), OutputFormat::Json).unwrap();

        let json: JsonValue = serde_json::from_str(&output).unwrap();
        assert_eq!(json["overall_passed"], false);
        assert_eq!(json["sections"].as_array().unwrap().len(), 2);
        assert_eq!(json["sections"][0]["group"], "repository_management");
        assert_eq!(json["sections"][0]["items"][0]["status"], "fail");
        assert_eq!(json["summary"]["total"], 3);
        assert_eq!(json["config_fingerprint"], "abc123");
    }

    #[test]
    fn test_custom_presentation() {
        let formatter = plain().with_presentation(ReportPolicy {
            title: "Template Check".to_string(),
            help_link: "https://example.com/fix".to_string(),
        });
        let output = formatter.format_report(&create_test_report(), OutputFormat::Markdown).unwrap();
        assert!(output.starts_with("# Template Check FAILED"));
        assert!(output.contains("[How to fix?](https://example.com/fix)"));
    }

    #[test]
    fn test_write_report() {
        let mut buffer = Vec::new();
        plain()
            .write_report(&create_test_report(), OutputFormat::Markdown, &mut buffer)
            .unwrap();
        assert!(String::from_utf8(buffer).unwrap().contains("## Security Requirements"));
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(OutputFormat::parse("Markdown"), Some(OutputFormat::Markdown));
        assert_eq!(OutputFormat::parse("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("sarif"), None);
    }
}
