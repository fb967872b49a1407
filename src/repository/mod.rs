//! Repository layout, locking and resolution.
//!
//! Every cache tier (provisioning, generated, local resolution repositories)
//! uses the same layout:
//!
//! ```text
//! <root>/<group with dots as slashes>/<artifactId>/<version>/<artifactId>-<version>[-<classifier>].<extension>
//! ```
//!
//! Writers take an exclusive [`RepositoryLock`] before placing files so two
//! builds sharing a provisioning repository never race on the same target.

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::artifact::filesystem::atomic_copy;
use crate::artifact::ArtifactCoords;
use crate::error::PackagingError;

/// Lock file created at the root of a repository while it is written.
pub const LOCK_FILE_NAME: &str = ".module-packager.lock";

/// A repository root and the canonical paths inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLayout {
    root: PathBuf,
}

impl RepositoryLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<group path>/<artifactId>/<version>` (classifier and extension
    /// do not take part).
    pub fn version_dir(&self, coords: &ArtifactCoords) -> Result<PathBuf> {
        let mut dir = self.root.clone();
        for segment in coords.group_id().split('.') {
            validate_segment("group", segment)?;
            dir.push(segment);
        }
        validate_segment("artifact", coords.artifact_id())?;
        validate_segment("version", coords.version())?;
        dir.push(coords.artifact_id());
        dir.push(coords.version());
        Ok(dir)
    }

    pub fn artifact_path(&self, coords: &ArtifactCoords) -> Result<PathBuf> {
        Ok(self.version_dir(coords)?.join(coords.file_name()))
    }

    /// Path of `coords` if the file is present.
    pub fn find(&self, coords: &ArtifactCoords) -> Result<Option<PathBuf>> {
        let path = self.artifact_path(coords)?;
        Ok(path.is_file().then_some(path))
    }

    /// Copy `src` into the canonical location for `coords`.
    ///
    /// Callers that write several files as one unit should hold
    /// [`Self::lock`] across all of them.
    pub fn store(&self, src: &Path, coords: &ArtifactCoords) -> Result<PathBuf> {
        let dst = self.artifact_path(coords)?;
        atomic_copy(src, &dst)
            .with_context(|| format!("storing {} in repository '{}'", coords, self.root.display()))?;
        Ok(dst)
    }

    /// Block until this process holds the repository's exclusive write lock.
    pub fn lock(&self) -> Result<RepositoryLock> {
        fs::create_dir_all(&self.root)
            .map_err(|err| PackagingError::io("create directory", &self.root, err))?;
        let path = self.root.join(LOCK_FILE_NAME);

        // The lock file is never unlinked: removing a file another process
        // still holds would let a third process lock a fresh inode.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to create lock file: {}", path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock repository: {}", self.root.display()))?;
        Ok(RepositoryLock { file, path })
    }
}

/// RAII guard: releases the repository lock on drop.
#[derive(Debug)]
pub struct RepositoryLock {
    file: File,
    path: PathBuf,
}

impl RepositoryLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepositoryLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn validate_segment(what: &str, segment: &str) -> Result<()> {
    if segment.is_empty() {
        bail!("{what} segment must not be empty");
    }
    if segment.contains('/') || segment.contains('\\') || segment == ".." || segment == "." {
        bail!("{what} segment is not a plain path component: {segment}");
    }
    Ok(())
}

/// Maps a coordinate to a local file.
pub trait ArtifactResolver {
    /// Fails with [`PackagingError::Resolution`] when nothing provides `coords`.
    fn resolve(&self, coords: &ArtifactCoords) -> Result<PathBuf>;
}

/// Resolves against local repositories, first hit wins.
#[derive(Debug, Clone, Default)]
pub struct RepositoryResolver {
    repositories: Vec<RepositoryLayout>,
}

impl RepositoryResolver {
    pub fn new(repositories: Vec<RepositoryLayout>) -> Self {
        Self { repositories }
    }

    pub fn repositories(&self) -> &[RepositoryLayout] {
        &self.repositories
    }

    /// Consult `repository` before every repository already registered.
    pub fn prepend(&mut self, repository: RepositoryLayout) {
        self.repositories.insert(0, repository);
    }
}

impl ArtifactResolver for RepositoryResolver {
    fn resolve(&self, coords: &ArtifactCoords) -> Result<PathBuf> {
        for repository in &self.repositories {
            if let Some(path) = repository.find(coords)? {
                tracing::trace!(%coords, path = %path.display(), "resolved");
                return Ok(path);
            }
        }
        let searched = self
            .repositories
            .iter()
            .map(|repo| repo.root().display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Err(PackagingError::resolution(coords, format!("not found in [{searched}]")).into())
    }
}
