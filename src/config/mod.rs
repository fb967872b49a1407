//! Build configuration (`build.toml`).
//!
//! ```toml
//! [packaging]
//! mode = "fat"                  # or "thin"
//! templates = "templates"       # module templates tree
//! output = "target/dist"
//!
//! [transform]
//! enabled = true
//! suffix = "-ee9"
//! tool = "jakarta-transformer --quiet"
//! excludes = ["transform-excludes.txt"]
//!
//! [repositories]
//! generated = "target/repo"
//! local = ["repo"]
//!
//! [overrides]
//! "org.acme:patched:2.0" = "patches/patched-2.0.jar"
//!
//! [versions]
//! "org.acme:acme-api" = "org.acme:acme-api:1.0"
//! ```
//!
//! Relative paths resolve against the directory holding the file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::artifact::exclusions::EXCLUSION_MANIFEST_NAME;
use crate::artifact::ArtifactCoords;
use crate::engine::{EngineConfig, PackagingMode};
use crate::mapping::{MappingRule, MappingTable};
use crate::modules::VersionTable;

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub config_path: PathBuf,
    pub engine: EngineConfig,
    pub templates: PathBuf,
    pub output: PathBuf,
    /// External transformer command line.
    pub transformer: Option<String>,
    pub exclusion_manifests: Vec<PathBuf>,
    pub local_repositories: Vec<PathBuf>,
    pub mapping: MappingTable,
    pub overrides: Vec<(ArtifactCoords, PathBuf)>,
    pub versions: VersionTable,
}

impl BuildConfig {
    pub fn modules_dir(&self) -> PathBuf {
        self.output.join("modules")
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BuildToml {
    packaging: PackagingToml,
    #[serde(default)]
    transform: TransformToml,
    #[serde(default)]
    repositories: RepositoriesToml,
    mapping: Option<MappingToml>,
    #[serde(default)]
    overrides: BTreeMap<String, String>,
    #[serde(default)]
    versions: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PackagingToml {
    mode: Option<String>,
    templates: String,
    output: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TransformToml {
    #[serde(default)]
    enabled: bool,
    suffix: Option<String>,
    #[serde(default)]
    verbose: bool,
    tool: Option<String>,
    excludes: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RepositoriesToml {
    provisioning: Option<String>,
    generated: Option<String>,
    #[serde(default)]
    local: Vec<String>,
    scratch: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MappingToml {
    rules: Vec<MappingRule>,
}

pub fn load_build_config(path: &Path) -> Result<BuildConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading build config '{}'", path.display()))?;
    let base_dir = path.parent().unwrap_or(Path::new("."));
    parse_build_config(&text, base_dir, path)
        .with_context(|| format!("invalid build config '{}'", path.display()))
}

pub fn parse_build_config(text: &str, base_dir: &Path, config_path: &Path) -> Result<BuildConfig> {
    let parsed: BuildToml = toml::from_str(text).context("parsing TOML")?;
    let resolve = |raw: &str| resolve_path(base_dir, raw);

    let mode = match parsed
        .packaging
        .mode
        .as_deref()
        .map(|m| m.trim().to_ascii_lowercase())
        .as_deref()
    {
        None | Some("fat") => PackagingMode::Fat,
        Some("thin") => PackagingMode::Thin,
        Some(other) => bail!("unsupported packaging.mode '{other}' (expected 'fat' or 'thin')"),
    };

    let templates = resolve(&parsed.packaging.templates);
    let transform = parsed.transform;
    let repositories = parsed.repositories;
    let engine = EngineConfig {
        mode,
        transform_enabled: transform.enabled,
        suffix: transform.suffix.unwrap_or_else(|| "-ee9".to_string()),
        verbose: transform.verbose,
        provisioning_repository: repositories.provisioning.as_deref().map(resolve),
        generated_repository: repositories.generated.as_deref().map(resolve),
        scratch_root: repositories.scratch.as_deref().map(resolve),
    };
    engine.validate()?;

    let exclusion_manifests = match transform.excludes {
        Some(list) => list.iter().map(|raw| resolve(raw)).collect(),
        None => vec![templates.join(EXCLUSION_MANIFEST_NAME)],
    };

    let mapping = match parsed.mapping {
        Some(table) => MappingTable::new(table.rules).context("invalid [mapping] table")?,
        None => MappingTable::default(),
    };

    let overrides = parsed
        .overrides
        .iter()
        .map(|(coords, file)| {
            let coords = coords
                .parse::<ArtifactCoords>()
                .with_context(|| format!("invalid [overrides] key '{coords}'"))?;
            Ok((coords, resolve(file)))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut versions = VersionTable::new();
    for (key, coords) in &parsed.versions {
        let coords = coords
            .parse::<ArtifactCoords>()
            .with_context(|| format!("invalid [versions] entry for '{key}'"))?;
        versions.insert(key.clone(), coords);
    }

    let transformer = transform.tool.filter(|tool| !tool.trim().is_empty());
    if transformer.is_none() && (engine.transform_enabled || !overrides.is_empty()) {
        bail!("transform.tool is required when transformation is enabled or artifacts are overridden");
    }

    Ok(BuildConfig {
        config_path: config_path.to_path_buf(),
        engine,
        templates,
        output: resolve(&parsed.packaging.output),
        transformer,
        exclusion_manifests,
        local_repositories: repositories.local.iter().map(|raw| resolve(raw)).collect(),
        mapping,
        overrides,
        versions,
    })
}

fn resolve_path(base_dir: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw.trim());
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
