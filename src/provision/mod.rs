//! One provisioning pass: templates in, distribution module tree and install
//! report out.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::artifact::exclusions::EXCLUSION_MANIFEST_NAME;
use crate::artifact::filesystem::{atomic_copy, remove_path, tmp_sibling};
use crate::artifact::ArtifactCoords;
use crate::config::BuildConfig;
use crate::descriptor::{DescriptorKind, DESCRIPTOR_FILE_NAME};
use crate::engine::{DecisionEngine, OverrideStatus};
use crate::error::PackagingError;
use crate::mapping::MappingTable;
use crate::modules::{process_template, renamed_location, transform_modules, WalkSummary};
use crate::preflight;
use crate::report::{write_install_report, InstallReport, REPORT_FILE_NAME};
use crate::repository::{RepositoryLayout, RepositoryResolver};
use crate::transformer::{CommandTransformer, TransformOutcome, Transformer};

#[derive(Debug, Clone)]
pub struct ProvisionSummary {
    pub modules_dir: PathBuf,
    pub report_path: PathBuf,
    pub descriptors: usize,
    pub files_copied: usize,
    pub excluded: usize,
    pub walk: Option<WalkSummary>,
    pub report: InstallReport,
}

/// Run a full pass with the configured external transformer.
pub fn provision(config: &BuildConfig) -> Result<ProvisionSummary> {
    preflight::check_build(config)?;
    provision_with(config, transformer_for(config)?)
}

/// Same as [`provision`] with a caller-supplied transformer and no host checks.
///
/// # Arguments
///
/// * `config` - loaded build configuration
/// * `transformer` - rewrites artifact bytes; only called when transformation
///   is enabled or an override needs it
///
/// # Example
///
/// ```rust,ignore
/// let config = load_build_config(Path::new("build.toml"))?;
/// let transformer = CommandTransformer::new("jakarta-transformer", Vec::new());
/// let summary = provision_with(&config, Box::new(transformer))?;
/// println!("report at {}", summary.report_path.display());
/// ```
pub fn provision_with(config: &BuildConfig, transformer: Box<dyn Transformer>) -> Result<ProvisionSummary> {
    if !config.templates.is_dir() {
        bail!("templates directory not found: {}", config.templates.display());
    }
    let mut engine = build_engine(config, transformer)?;

    let mut excluded = 0;
    for manifest in &config.exclusion_manifests {
        excluded += engine.load_exclusion_manifest(manifest)?;
    }
    for (coords, file) in &config.overrides {
        engine.setup_overridden_artifact(coords, file)?;
    }

    let modules_dir = config.modules_dir();
    let side = tmp_sibling(&modules_dir);
    let processed = process_templates(&mut engine, config, &side)
        .and_then(|counts| replace_dir(&side, &modules_dir).map(|()| counts));
    if processed.is_err() {
        let _ = remove_path(&side);
    }
    let (descriptors, files_copied) = processed?;

    let walk = if config.engine.transform_enabled {
        Some(transform_modules(&modules_dir, &config.mapping)?)
    } else {
        None
    };

    // Installs were written into the side tree, which has since been swapped
    // in and possibly renamed.
    let mut report = InstallReport::from_engine(&engine)?;
    report.relocate(|path| {
        let rel = path.strip_prefix(&side).ok()?;
        Some(match &walk {
            Some(_) => modules_dir.join(renamed_location(rel, &config.mapping)),
            None => modules_dir.join(rel),
        })
    });
    let report_path = config.output.join(REPORT_FILE_NAME);
    write_install_report(&report_path, &report)?;

    info!(
        modules = %modules_dir.display(),
        descriptors,
        artifacts = report.artifacts.len(),
        excluded = engine.state().excluded_count(),
        "provisioning complete"
    );
    Ok(ProvisionSummary {
        modules_dir,
        report_path,
        descriptors,
        files_copied,
        excluded,
        walk,
        report,
    })
}

/// Resolve one overridden artifact and return what was recorded for it.
pub fn probe(config: &BuildConfig, coords: &ArtifactCoords, file: &Path) -> Result<OverrideStatus> {
    let mut engine = build_engine(config, transformer_for(config)?)?;
    engine.setup_overridden_artifact(coords, file)
}

fn build_engine(config: &BuildConfig, transformer: Box<dyn Transformer>) -> Result<DecisionEngine> {
    let mut resolver = RepositoryResolver::new(
        config
            .local_repositories
            .iter()
            .cloned()
            .map(RepositoryLayout::new)
            .collect(),
    );
    if let Some(provisioning) = &config.engine.provisioning_repository {
        resolver.prepend(RepositoryLayout::new(provisioning.clone()));
    }
    DecisionEngine::new(
        config.engine.clone(),
        config.mapping.clone(),
        Box::new(resolver),
        transformer,
    )
}

fn transformer_for(config: &BuildConfig) -> Result<Box<dyn Transformer>> {
    Ok(match &config.transformer {
        Some(line) => Box::new(CommandTransformer::from_command_line(line)?),
        None => Box::new(NoTransformer),
    })
}

/// Stand-in when no transformer is configured; config loading guarantees it
/// is never asked to run.
struct NoTransformer;

impl Transformer for NoTransformer {
    fn transform(
        &self,
        input: &Path,
        _output: &Path,
        _mapping: &MappingTable,
        _verbose: bool,
    ) -> Result<TransformOutcome> {
        Err(PackagingError::Transform {
            input: input.to_path_buf(),
            reason: "no transformer configured".to_string(),
        }
        .into())
    }
}

/// Returns (descriptors processed, other files copied).
fn process_templates(
    engine: &mut DecisionEngine,
    config: &BuildConfig,
    target_root: &Path,
) -> Result<(usize, usize)> {
    fs::create_dir_all(target_root)
        .map_err(|err| PackagingError::io("create directory", target_root, err))?;
    let mut descriptors = 0;
    let mut copied = 0;
    for entry in WalkDir::new(&config.templates).follow_links(true).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking '{}'", config.templates.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(&config.templates)
            .with_context(|| format!("{} is outside the templates tree", entry.path().display()))?;
        if rel == Path::new(EXCLUSION_MANIFEST_NAME) {
            continue;
        }
        let target = target_root.join(rel);
        if rel.file_name().is_some_and(|name| name == DESCRIPTOR_FILE_NAME) {
            let outcome = process_template(engine, &config.versions, entry.path(), &target)?;
            if outcome.kind != DescriptorKind::Other {
                descriptors += 1;
            }
        } else {
            atomic_copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    debug!(descriptors, copied, target = %target_root.display(), "templates processed");
    Ok((descriptors, copied))
}

fn replace_dir(side: &Path, target: &Path) -> Result<()> {
    remove_path(target)?;
    fs::rename(side, target).map_err(|err| PackagingError::io("rename", side, err))?;
    Ok(())
}
