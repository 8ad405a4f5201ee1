//! File and folder resolution against declarative rules
//!
//! Architectural Principle: Service Layer - One generic resolver serves every rule in the catalog
//! - Candidate directories are matched while walking, with per-rule case sensitivity
//! - Extensions are tried in declared order; the first extension with any match wins
//! - "Not found" is a normal outcome, never an error

pub mod content;

use crate::config::{FolderRule, ValidationRule};
use crate::domain::checks::CheckResult;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub use content::{check_content, missing_markers};

/// Outcome of resolving one rule against a repository
#[derive(Debug, Clone)]
pub struct ResolvedFile<'a> {
    /// The rule that was evaluated
    pub rule: &'a ValidationRule,
    /// Whether a matching file exists
    pub found: bool,
    /// Path of the matching file
    pub path: Option<PathBuf>,
    /// Required markers absent from the file text
    pub missing_markers: BTreeSet<String>,
}

impl<'a> ResolvedFile<'a> {
    fn not_found(rule: &'a ValidationRule) -> Self {
        Self { rule, found: false, path: None, missing_markers: BTreeSet::new() }
    }

    fn found(rule: &'a ValidationRule, path: PathBuf) -> Self {
        Self { rule, found: true, path: Some(path), missing_markers: BTreeSet::new() }
    }

    /// Found and every required marker present
    pub fn is_compliant(&self) -> bool {
        self.found && self.missing_markers.is_empty()
    }

    /// Report item for this rule
    pub fn to_check_result(&self) -> CheckResult {
        let display = self.rule.display_name();
        let label = format!("{display} is in place.");

        if !self.found {
            return CheckResult::fail(label).with_detail(format!("{display} is missing."));
        }

        if self.missing_markers.is_empty() {
            return CheckResult::pass(label);
        }

        // Report markers in the order the rule declares them
        let details = self
            .rule
            .markers()
            .iter()
            .filter(|marker| self.missing_markers.contains(*marker))
            .map(|marker| format!("`{marker}` is missing in {display}."));
        CheckResult::fail(label).with_details(details)
    }
}

/// Locate the file a rule describes under `root`
///
/// Directories are visited root first and entries in lexicographic byte order, so when
/// several files in one directory match the same extension (possible under
/// case-insensitive comparison) the smallest name wins.
pub fn resolve<'a>(rule: &'a ValidationRule, root: &Path) -> ResolvedFile<'a> {
    let candidates: Vec<Vec<String>> =
        rule.directories.iter().map(|dir| split_components(dir)).collect();

    for dir in matching_directories(root, &candidates, rule.case_sensitive) {
        let files = sorted_files(&dir);

        for extension in &rule.extensions {
            let expected = rule.file_name_for(extension);
            let hit = files.iter().find(|(name, _)| names_match(name, &expected, rule.case_sensitive));

            if let Some((_, path)) = hit {
                tracing::debug!("Rule '{}' resolved to {}", rule.id, path.display());
                return ResolvedFile::found(rule, path.clone());
            }
        }
    }

    tracing::debug!("Rule '{}' did not resolve under {}", rule.id, root.display());
    ResolvedFile::not_found(rule)
}

/// Resolve a rule and check its required markers
pub fn evaluate<'a>(rule: &'a ValidationRule, root: &Path) -> ResolvedFile<'a> {
    let mut resolved = resolve(rule, root);
    if resolved.found && !rule.markers().is_empty() {
        resolved.missing_markers = check_content(&resolved, rule.markers());
    }
    resolved
}

/// Locate a directory given its path relative to `root`
pub fn find_directory(root: &Path, relative: &str, case_sensitive: bool) -> Option<PathBuf> {
    let candidates = vec![split_components(relative)];
    let found = matching_directories(root, &candidates, case_sensitive).next();
    found
}

/// Report item for a folder rule
pub fn check_folder(rule: &FolderRule, root: &Path) -> CheckResult {
    let label = format!("{} is in place.", rule.path);
    match find_directory(root, &rule.path, rule.case_sensitive) {
        Some(path) => {
            tracing::debug!("Folder rule '{}' resolved to {}", rule.id, path.display());
            CheckResult::pass(label)
        }
        None => CheckResult::fail(label).with_detail(format!("{} is missing.", rule.path)),
    }
}

/// Walk `root` and yield every directory whose relative path equals one of `candidates`.
/// Subtrees that cannot lead to a candidate are pruned. Symlinked directories are followed
/// (yielded under their link path); link cycles are skipped.
fn matching_directories<'c>(
    root: &Path,
    candidates: &'c [Vec<String>],
    case_sensitive: bool,
) -> impl Iterator<Item = PathBuf> + 'c {
    let root = root.to_path_buf();
    let max_depth = candidates.iter().map(Vec::len).max().unwrap_or(0);
    let prune_root = root.clone();

    WalkDir::new(&root)
        .follow_links(true)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            entry.file_type().is_dir()
                && candidates.iter().any(|candidate| {
                    is_prefix(&relative_components(&prune_root, entry.path()), candidate, case_sensitive)
                })
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir())
        .filter(move |entry| {
            let relative = relative_components(&root, entry.path());
            candidates.iter().any(|candidate| {
                relative.len() == candidate.len() && is_prefix(&relative, candidate, case_sensitive)
            })
        })
        .map(|entry| entry.into_path())
}

/// Direct file entries of `dir` as (name, path), sorted by name
fn sorted_files(dir: &Path) -> Vec<(String, PathBuf)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Failed to list {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut files: Vec<(String, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .map(|entry| (entry.file_name().to_string_lossy().into_owned(), entry.path()))
        .collect();
    files.sort();
    files
}

fn split_components(dir: &str) -> Vec<String> {
    dir.split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .map(str::to_string)
        .collect()
}

fn relative_components(root: &Path, path: &Path) -> Vec<String> {
    path.strip_prefix(root)
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

/// Whether `relative` is a leading part of `candidate`
fn is_prefix(relative: &[String], candidate: &[String], case_sensitive: bool) -> bool {
    relative.len() <= candidate.len()
        && relative
            .iter()
            .zip(candidate)
            .all(|(actual, expected)| names_match(actual, expected, case_sensitive))
}

fn names_match(actual: &str, expected: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        actual == expected
    } else {
        actual.to_lowercase() == expected.to_lowercase()
    }
}
