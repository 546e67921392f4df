//! Canonicalization of browser identifiers as supplied by grid callers.
//!
//! Callers send browser names with arbitrary casing and versions in several
//! shapes ("33", "33.0", "33.0.1", vendor strings). Names are lowercased and
//! trimmed; purely numeric versions are normalized to carry at least a minor
//! component so that "33" and "33.0" land in the same quota group.

/// Canonical browser name: trimmed, lowercase.
pub fn browser_name(browser: &str) -> String {
    browser.trim().to_lowercase()
}

/// Canonical browser version. Numeric versions gain a ".0" minor component
/// when missing; anything non-numeric is passed through trimmed.
pub fn browser_version(version: &str) -> String {
    let trimmed = version.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let numeric = trimmed
        .split('.')
        .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
    if numeric && !trimmed.contains('.') {
        format!("{trimmed}.0")
    } else {
        trimmed.to_string()
    }
}
