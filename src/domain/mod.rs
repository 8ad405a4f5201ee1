//! Domain layer for Template Guardian
//!
//! CDD Principle: Domain Model - Pure business logic for template compliance
//! - Check results, report sections and the aggregate compliance report
//! - Independent of the filesystem, workflow parsers and external tools
//! - Expresses the ubiquitous language of rules, checks and verdicts

pub mod checks;

// Re-export main domain types for convenience
pub use checks::*;
