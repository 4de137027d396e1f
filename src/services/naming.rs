//! Filename-derived metadata: content hashes, display names and categories.
//!
//! Everything here is a pure function of a file name or file bytes. Display names,
//! versions and authors are best-effort cosmetics; the content hash is the only
//! reliable integrity signal.

use crate::models::ModCategory;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

/// Bracketed author tags such as `[Author]`
static BRACKET_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]").expect("Invalid bracket tag regex"));

/// Version substrings introduced by a separator: `-v1.2.3`, `_2.0`, ` v4`
static VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[-_\s])(v?\d+(?:\.\d+)+|v\d+)").expect("Invalid version regex")
});

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_\s]+").expect("Invalid separator regex"));

/// Keyword heuristics checked in order after the extension mapping
const CATEGORY_KEYWORDS: &[(ModCategory, &[&str])] = &[
    (ModCategory::Script, &["script"]),
    (
        ModCategory::Appearance,
        &["cas", "hair", "clothing", "skin", "makeup"],
    ),
    (ModCategory::Build, &["build", "buy", "furniture"]),
    (ModCategory::Gameplay, &["gameplay", "trait", "career"]),
    (ModCategory::Override, &["override", "default"]),
];

/// Hex SHA-256 of the full contents of `path`, streamed.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Split a disabled suffix off `file_name`, returning the canonical name and
/// whether the suffix was present.
pub fn strip_disabled_suffix<'a>(file_name: &'a str, disabled_suffix: &str) -> (&'a str, bool) {
    match file_name.strip_suffix(disabled_suffix) {
        Some(canonical) if !canonical.is_empty() => (canonical, true),
        _ => (file_name, false),
    }
}

/// Lowercase extension without the dot
pub fn extension_of(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

fn file_stem(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

/// Human-friendly name: bracketed tags and version strings removed, separators
/// collapsed to single spaces. Falls back to the bare stem if nothing remains.
pub fn derive_display_name(file_name: &str) -> String {
    let stem = file_stem(file_name);
    let without_tags = BRACKET_TAG.replace_all(stem, " ");
    let without_versions = VERSION.replace_all(&without_tags, " ");
    let collapsed = SEPARATORS.replace_all(&without_versions, " ");
    let name = collapsed.trim();

    if name.is_empty() {
        stem.to_string()
    } else {
        name.to_string()
    }
}

pub fn extract_version(file_name: &str) -> Option<String> {
    VERSION
        .captures(file_stem(file_name))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_start_matches(['v', 'V']).to_string())
}

pub fn extract_author(file_name: &str) -> Option<String> {
    BRACKET_TAG
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|author| !author.is_empty())
}

/// Category implied by the extension alone, if any
pub fn category_for_extension(extension: &str) -> Option<ModCategory> {
    match extension {
        "ts4script" => Some(ModCategory::Script),
        _ => None,
    }
}

/// Infer a category from a canonical file name.
pub fn categorize(file_name: &str) -> ModCategory {
    if let Some(category) = extension_of(file_name)
        .as_deref()
        .and_then(category_for_extension)
    {
        return category;
    }

    let lowered = file_name.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| lowered.contains(kw)))
        .map(|(category, _)| *category)
        .unwrap_or(ModCategory::Other)
}
