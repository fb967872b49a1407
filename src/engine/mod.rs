//! Transformation decision engine.
//!
//! For every artifact the engine decides, once per run and consistently,
//! whether the installed copy is the original or a namespace-rewritten one,
//! where previously produced bytes can be reused from, and which final
//! identity (version string and file name) module descriptors must point at.
//!
//! All shared bookkeeping (exclusions, caller overrides and what their probe
//! found) lives in a [`TransformationState`] owned by the engine, so every
//! decision made later in the same run sees it.
//!
//! Decision order for [`DecisionEngine::install_artifact`]:
//!
//! 1. override resolution recorded a transformed file: reuse it under the
//!    suffixed version
//! 2. the artifact is excluded: copy it under its original version
//! 3. transformation is enabled: transform it under the suffixed version
//! 4. otherwise copy it under its original version

pub mod installer;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::artifact::exclusions;
use crate::artifact::filesystem::{atomic_copy, atomic_move, remove_path, sha256_file, tmp_sibling};
use crate::artifact::{transformed_file_name, ArtifactCoords, Gav};
use crate::error::PackagingError;
use crate::mapping::MappingTable;
use crate::repository::{ArtifactResolver, RepositoryLayout};
use crate::transformer::Transformer;
use installer::{installer_for, PackagingInstaller};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackagingMode {
    /// Artifact bytes are embedded in the distribution.
    #[default]
    Fat,
    /// The distribution only references artifacts by coordinate.
    Thin,
}

impl fmt::Display for PackagingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fat => f.write_str("fat"),
            Self::Thin => f.write_str("thin"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub mode: PackagingMode,
    pub transform_enabled: bool,
    /// Appended to the version of transformed artifacts. May be empty.
    pub suffix: String,
    pub verbose: bool,
    pub provisioning_repository: Option<PathBuf>,
    pub generated_repository: Option<PathBuf>,
    /// Parent of the per-engine scratch directory. System temp dir if unset.
    pub scratch_root: Option<PathBuf>,
}

impl EngineConfig {
    /// Reject incompatible option combinations before any file is touched.
    pub fn validate(&self) -> Result<()> {
        if self.transform_enabled && self.provisioning_repository.is_some() {
            return Err(PackagingError::ConfigConflict(
                "transformation is enabled, a provisioning repository can't be set".to_string(),
            )
            .into());
        }
        if self.transform_enabled
            && self.mode == PackagingMode::Thin
            && self.generated_repository.is_none()
        {
            return Err(PackagingError::ConfigConflict(
                "transformation is enabled for thin packaging, a generated repository must be set"
                    .to_string(),
            )
            .into());
        }
        Ok(())
    }

    pub fn transformed_version(&self, version: &str) -> String {
        format!("{version}{}", self.suffix)
    }
}

/// Outcome of override resolution for one caller-supplied artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverrideStatus {
    /// Nothing usable was found in the provisioning repository.
    pub needs_transformation: bool,
    /// Transformed bytes to install. `None` means the artifact is excluded.
    pub transformed_file: Option<PathBuf>,
}

/// Exclusion and override bookkeeping for one run.
///
/// Exclusions are keyed by group, artifact and version. Overrides and their
/// transformed files are keyed by the full coordinate, so a classified
/// variant never borrows the bytes supplied for the main artifact. A key is
/// either excluded or has a transformed file, never both.
#[derive(Debug, Default)]
pub struct TransformationState {
    excluded: BTreeSet<Gav>,
    transformed: BTreeMap<ArtifactCoords, PathBuf>,
    overrides: BTreeMap<ArtifactCoords, PathBuf>,
    resolved: BTreeMap<ArtifactCoords, OverrideStatus>,
}

impl TransformationState {
    /// Returns false when the key was already excluded or is known transformed.
    pub fn exclude(&mut self, gav: Gav) -> bool {
        if self.transformed.keys().any(|coords| coords.gav() == gav) {
            warn!(%gav, "ignoring exclusion of an artifact with a transformed override");
            return false;
        }
        self.excluded.insert(gav)
    }

    fn mark_transformed(&mut self, coords: ArtifactCoords, file: PathBuf) {
        self.excluded.remove(&coords.gav());
        self.transformed.insert(coords, file);
    }

    pub fn is_excluded(&self, gav: &Gav) -> bool {
        self.excluded.contains(gav)
    }

    pub fn transformed_file(&self, coords: &ArtifactCoords) -> Option<&Path> {
        self.transformed.get(coords).map(PathBuf::as_path)
    }

    pub fn is_overridden(&self, coords: &ArtifactCoords) -> bool {
        self.overrides.contains_key(coords)
    }

    pub fn excluded_count(&self) -> usize {
        self.excluded.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallAction {
    /// Original bytes placed.
    Copied,
    /// Transformer output placed.
    Transformed,
    /// Previously produced bytes placed (override cache or existing target).
    Reused,
    /// Only the version was recorded; no bytes written.
    Referenced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledArtifact {
    pub original: ArtifactCoords,
    /// Coordinate at the installed version.
    pub coords: ArtifactCoords,
    pub file_name: String,
    pub path: Option<PathBuf>,
    pub action: InstallAction,
    pub sha256: Option<String>,
}

impl InstalledArtifact {
    pub fn version(&self) -> &str {
        self.coords.version()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Decision {
    Reuse(PathBuf),
    Copy,
    Transform,
}

pub struct DecisionEngine {
    config: EngineConfig,
    mapping: MappingTable,
    resolver: Box<dyn ArtifactResolver>,
    transformer: Box<dyn Transformer>,
    installer: Box<dyn PackagingInstaller>,
    provisioning: Option<RepositoryLayout>,
    generated: Option<RepositoryLayout>,
    state: TransformationState,
    scratch: TempDir,
    installs: Vec<InstalledArtifact>,
}

impl DecisionEngine {
    pub fn new(
        config: EngineConfig,
        mapping: MappingTable,
        resolver: Box<dyn ArtifactResolver>,
        transformer: Box<dyn Transformer>,
    ) -> Result<Self> {
        config.validate()?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("module-packager-");
        let scratch = match &config.scratch_root {
            Some(root) => {
                fs::create_dir_all(root)
                    .map_err(|err| PackagingError::io("create directory", root, err))?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .context("creating scratch directory")?;

        let provisioning = config.provisioning_repository.clone().map(RepositoryLayout::new);
        let generated = config.generated_repository.clone().map(RepositoryLayout::new);
        let installer = installer_for(config.mode, generated.clone());
        debug!(
            mode = %config.mode,
            transform = config.transform_enabled,
            scratch = %scratch.path().display(),
            "decision engine ready"
        );

        Ok(Self {
            config,
            mapping,
            resolver,
            transformer,
            installer,
            provisioning,
            generated,
            state: TransformationState::default(),
            scratch,
            installs: Vec::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mapping(&self) -> &MappingTable {
        &self.mapping
    }

    pub fn state(&self) -> &TransformationState {
        &self.state
    }

    pub fn installs(&self) -> &[InstalledArtifact] {
        &self.installs
    }

    /// Merge keys into the exclusion set. Returns how many were new.
    pub fn add_exclusions(&mut self, gavs: impl IntoIterator<Item = Gav>) -> usize {
        gavs.into_iter()
            .filter(|gav| self.state.exclude(gav.clone()))
            .count()
    }

    pub fn load_exclusion_manifest(&mut self, path: &Path) -> Result<usize> {
        let gavs = exclusions::load_exclusion_manifest(path)?;
        let added = self.add_exclusions(gavs);
        debug!(manifest = %path.display(), added, "merged exclusion manifest");
        Ok(added)
    }

    /// Resolve the provenance of a caller-supplied artifact.
    ///
    /// Must run before any [`Self::install_artifact`] that references the
    /// coordinate. A second call for the same coordinate returns the recorded
    /// status.
    ///
    /// # Arguments
    ///
    /// * `coords` - the exact coordinate being overridden; classified variants
    ///   are not covered
    /// * `supplied` - file to install in place of the repository artifact
    ///
    /// # Returns
    ///
    /// * `transformed_file: Some(_)` - installs reuse those bytes at the
    ///   suffixed version
    /// * `transformed_file: None` - the artifact is excluded and keeps its
    ///   original version
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let coords: ArtifactCoords = "org.acme:acme-api:1.0".parse()?;
    /// let status = engine.setup_overridden_artifact(&coords, Path::new("patches/acme-api-1.0.jar"))?;
    /// if status.needs_transformation {
    ///     println!("nothing usable in the provisioning repository");
    /// }
    /// ```
    pub fn setup_overridden_artifact(
        &mut self,
        coords: &ArtifactCoords,
        supplied: &Path,
    ) -> Result<OverrideStatus> {
        if let Some(status) = self.state.resolved.get(coords) {
            debug!(artifact = %coords, "override already resolved");
            return Ok(status.clone());
        }
        if !supplied.is_file() {
            return Err(PackagingError::resolution(
                coords,
                format!("overriding file {} does not exist", supplied.display()),
            )
            .into());
        }
        self.state.overrides.insert(coords.clone(), supplied.to_path_buf());

        let probed = match &self.provisioning {
            Some(repo) => self.probe_provisioning(repo, coords)?,
            // Unknown provenance
            None => OverrideStatus {
                needs_transformation: true,
                transformed_file: None,
            },
        };

        let mut transformed_file = probed.transformed_file.clone();
        if probed.needs_transformation {
            transformed_file = self.try_transformation(coords, supplied)?;
            if let Some(repo) = &self.provisioning {
                transformed_file =
                    self.persist_override(repo, coords, supplied, transformed_file.as_deref())?;
            }
        }

        match &transformed_file {
            Some(file) => self.state.mark_transformed(coords.clone(), file.clone()),
            None => {
                self.state.exclude(coords.gav());
            }
        }
        let status = OverrideStatus {
            needs_transformation: probed.needs_transformation,
            transformed_file,
        };
        self.log_override(coords, &status);
        self.state.resolved.insert(coords.clone(), status.clone());
        Ok(status)
    }

    fn probe_provisioning(
        &self,
        repo: &RepositoryLayout,
        coords: &ArtifactCoords,
    ) -> Result<OverrideStatus> {
        let transformed = coords.with_version(self.config.transformed_version(coords.version()));
        if let Some(path) = repo.find(&transformed)? {
            return Ok(OverrideStatus {
                needs_transformation: false,
                transformed_file: Some(path),
            });
        }
        Ok(OverrideStatus {
            needs_transformation: repo.find(coords)?.is_none(),
            transformed_file: None,
        })
    }

    /// Transform into the scratch tier. `None` when nothing changed.
    fn try_transformation(&self, coords: &ArtifactCoords, supplied: &Path) -> Result<Option<PathBuf>> {
        let supplied_name = supplied
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| coords.file_name());
        let name = transformed_file_name(coords.version(), &supplied_name, &self.config.suffix);
        let output = self.scratch_slot(&name)?;
        let outcome = self
            .transformer
            .transform(supplied, &output, &self.mapping, self.config.verbose)
            .with_context(|| format!("transforming overridden artifact {coords}"))?;
        Ok(outcome.changed.then_some(output))
    }

    /// Store the override outcome so a later run's probe finds it.
    fn persist_override(
        &self,
        repo: &RepositoryLayout,
        coords: &ArtifactCoords,
        supplied: &Path,
        transformed: Option<&Path>,
    ) -> Result<Option<PathBuf>> {
        let _lock = repo.lock()?;
        let metadata = self.resolve_metadata(coords)?;
        let (stored_coords, bytes) = match transformed {
            Some(file) => (
                coords.with_version(self.config.transformed_version(coords.version())),
                file,
            ),
            None => (coords.clone(), supplied),
        };
        let stored = repo.store(bytes, &stored_coords)?;
        if let Some(pom) = metadata {
            repo.store(&pom, &stored_coords.metadata())?;
        }
        Ok(transformed.map(|_| stored))
    }

    /// Install one artifact for the module in `module_dir` and return the
    /// identity descriptors must reference.
    ///
    /// # Arguments
    ///
    /// * `coords` - artifact at its original version
    /// * `module_dir` - directory of the module being assembled (fat mode)
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let installed = engine.install_artifact(&coords, Path::new("dist/modules/javax/ejb/api/main"))?;
    /// assert_eq!(installed.version(), "1.0-ee9");
    /// ```
    pub fn install_artifact(
        &mut self,
        coords: &ArtifactCoords,
        module_dir: &Path,
    ) -> Result<InstalledArtifact> {
        // Only the exact coordinate takes the supplied file; classified or
        // differently packaged variants resolve normally.
        let source = match self.state.overrides.get(coords) {
            Some(_) if !self.state.resolved.contains_key(coords) => {
                bail!("overridden artifact {coords} was not resolved before install")
            }
            Some(path) => path.clone(),
            None => self.resolver.resolve(coords)?,
        };

        let decision = self.decide(coords);
        let (final_coords, file_name) = match decision {
            Decision::Copy => (coords.clone(), coords.file_name()),
            Decision::Reuse(_) | Decision::Transform => (
                coords.with_version(self.config.transformed_version(coords.version())),
                transformed_file_name(coords.version(), &coords.file_name(), &self.config.suffix),
            ),
        };

        let destination = self
            .installer
            .destination(&final_coords, &file_name, module_dir)?;
        let installed = match destination {
            None => InstalledArtifact {
                original: coords.clone(),
                coords: final_coords,
                file_name,
                path: None,
                action: InstallAction::Referenced,
                sha256: None,
            },
            Some(destination) => {
                let _lock = match (&self.generated, destination.touches_repository()) {
                    (Some(repo), true) => Some(repo.lock()?),
                    _ => None,
                };
                let action = match decision {
                    Decision::Reuse(file) => {
                        atomic_copy(&file, &destination.path)?;
                        InstallAction::Reused
                    }
                    Decision::Copy => {
                        atomic_copy(&source, &destination.path)?;
                        InstallAction::Copied
                    }
                    Decision::Transform if destination.keep_existing && destination.path.is_file() => {
                        InstallAction::Reused
                    }
                    Decision::Transform => self.transform_into(coords, &source, &destination.path)?,
                };
                if let Some(mirror) = &destination.mirror {
                    atomic_copy(&destination.path, mirror)?;
                }
                if let (Some(dir), true) = (&destination.metadata_dir, coords.has_metadata()) {
                    if let Some(pom) = self.resolve_metadata(coords)? {
                        atomic_copy(&pom, &dir.join(final_coords.metadata().file_name()))?;
                    }
                }
                let sha256 = sha256_file(&destination.path)?;
                InstalledArtifact {
                    original: coords.clone(),
                    coords: final_coords,
                    file_name,
                    path: Some(destination.path),
                    action,
                    sha256: Some(sha256),
                }
            }
        };

        if self.config.verbose {
            info!(artifact = %coords, version = installed.version(), action = ?installed.action, "installed");
        } else {
            debug!(artifact = %coords, version = installed.version(), action = ?installed.action, "installed");
        }
        self.installs.push(installed.clone());
        Ok(installed)
    }

    fn decide(&self, coords: &ArtifactCoords) -> Decision {
        if let Some(file) = self.state.transformed_file(coords) {
            return Decision::Reuse(file.to_path_buf());
        }
        if self.state.is_excluded(&coords.gav()) || !self.config.transform_enabled {
            return Decision::Copy;
        }
        Decision::Transform
    }

    /// Transform `source` into `target`. Unchanged output places the original
    /// bytes at the target name.
    fn transform_into(
        &self,
        coords: &ArtifactCoords,
        source: &Path,
        target: &Path,
    ) -> Result<InstallAction> {
        let name = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| coords.file_name());
        let output = self.scratch_slot(&name)?;
        let outcome = self
            .transformer
            .transform(source, &output, &self.mapping, self.config.verbose)
            .with_context(|| format!("transforming {coords}"))?;

        let action = if outcome.changed {
            atomic_move(&output, target)?;
            InstallAction::Transformed
        } else {
            debug!(artifact = %coords, "transformer made no change");
            atomic_copy(source, target)?;
            InstallAction::Copied
        };
        if let Some(slot) = output.parent() {
            remove_path(slot)?;
        }
        Ok(action)
    }

    /// Fresh directory in the scratch tier; returns `<slot>/<name>`.
    fn scratch_slot(&self, name: &str) -> Result<PathBuf> {
        let slot = tmp_sibling(&self.scratch.path().join(name));
        fs::create_dir_all(&slot).map_err(|err| PackagingError::io("create directory", &slot, err))?;
        Ok(slot.join(name))
    }

    /// Companion metadata at the original version, if any repository has it.
    fn resolve_metadata(&self, coords: &ArtifactCoords) -> Result<Option<PathBuf>> {
        match self.resolver.resolve(&coords.metadata()) {
            Ok(path) => Ok(Some(path)),
            Err(err) if matches!(err.downcast_ref::<PackagingError>(), Some(PackagingError::Resolution { .. })) => {
                warn!(artifact = %coords, "no companion metadata found");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn log_override(&self, coords: &ArtifactCoords, status: &OverrideStatus) {
        let verdict = if status.transformed_file.is_some() {
            "transformed"
        } else {
            "excluded from transformation"
        };
        if self.config.verbose {
            info!(artifact = %coords, probed = !status.needs_transformation, "overridden artifact is {verdict}");
        } else {
            debug!(artifact = %coords, probed = !status.needs_transformation, "overridden artifact is {verdict}");
        }
    }
}
