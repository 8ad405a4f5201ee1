//! Individual compliance checkers
//!
//! Architecture: each checker turns one kind of evidence into `CheckResult`s
//! - Workflow checks parse CI definitions and look for required actions
//! - Security checks aggregate a scanner's SARIF findings
//! - Topic checks compare repository tags
//! - Provisioning checks delegate to external tools through `ToolRunner`

pub mod provision;
pub mod security;
pub mod topics;
pub mod workflow;

pub use provision::{check_functional, ProcessRunner, ToolOutput, ToolRunner};
pub use security::{aggregate, check_security_scan, FindingSeverity, SarifFinding, ScanVerdict};
pub use topics::check_topics;
pub use workflow::{check_required_actions, check_workflow_rule, normalize_action, ActionCheck};
