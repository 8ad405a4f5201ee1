//! Content assertions on resolved files
//!
//! Markers are matched verbatim: case-sensitive substrings with no normalization.

use super::ResolvedFile;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Markers absent from a resolved file
///
/// Files that were not found yield an empty set; resolution failure is reported
/// separately. An unreadable file reports every marker as missing.
pub fn check_content(resolved: &ResolvedFile<'_>, markers: &[String]) -> BTreeSet<String> {
    let Some(path) = resolved.path.as_deref().filter(|_| resolved.found) else {
        return BTreeSet::new();
    };

    if markers.is_empty() {
        return BTreeSet::new();
    }

    match read_text(path) {
        Ok(text) => missing_markers(&text, markers),
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            markers.iter().cloned().collect()
        }
    }
}

/// Markers that do not occur in `text`
pub fn missing_markers(text: &str, markers: &[String]) -> BTreeSet<String> {
    markers.iter().filter(|marker| !text.contains(marker.as_str())).cloned().collect()
}

fn read_text(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
