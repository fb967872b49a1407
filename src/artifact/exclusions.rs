//! Exclusion manifests.
//!
//! Plain text, one `group:artifact:version` per line. Blank lines and `#`
//! comments are skipped. A missing manifest is the same as an empty one.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use super::Gav;

pub const EXCLUSION_MANIFEST_NAME: &str = "transform-excludes.txt";

pub fn parse_exclusions(content: &str) -> Result<BTreeSet<Gav>> {
    content
        .lines()
        .map(str::trim)
        .enumerate()
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(idx, line)| {
            line.parse::<Gav>()
                .with_context(|| format!("line {}", idx + 1))
        })
        .collect()
}

pub fn load_exclusion_manifest(path: &Path) -> Result<BTreeSet<Gav>> {
    if !path.is_file() {
        return Ok(BTreeSet::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading exclusion manifest '{}'", path.display()))?;
    parse_exclusions(&content)
        .with_context(|| format!("parsing exclusion manifest '{}'", path.display()))
}
