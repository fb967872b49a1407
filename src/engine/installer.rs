//! Packaging-mode installers.
//!
//! The decision logic is shared; the two modes only differ in where the final
//! bytes land. Fat embeds them in the module directory (and optionally mirrors
//! them into the generated repository). Thin only places them in the generated
//! repository, or nowhere when none is configured and the caller just needs
//! the version string.

use anyhow::Result;
use std::path::{Path, PathBuf};

use super::PackagingMode;
use crate::artifact::ArtifactCoords;
use crate::repository::RepositoryLayout;

/// Where an installed artifact is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub path: PathBuf,
    /// Second copy of the final bytes.
    pub mirror: Option<PathBuf>,
    /// Repository version directory that receives the companion metadata.
    pub metadata_dir: Option<PathBuf>,
    /// An existing transformed target is kept instead of transforming again
    /// (a module re-declared as an alias references the same artifact).
    pub keep_existing: bool,
}

impl Destination {
    pub fn touches_repository(&self) -> bool {
        self.mirror.is_some() || self.metadata_dir.is_some()
    }
}

pub trait PackagingInstaller {
    fn mode(&self) -> PackagingMode;

    /// `None` means only a reference is recorded and no bytes are written.
    fn destination(
        &self,
        final_coords: &ArtifactCoords,
        file_name: &str,
        module_dir: &Path,
    ) -> Result<Option<Destination>>;
}

#[derive(Debug, Clone, Default)]
pub struct FatInstaller {
    mirror: Option<RepositoryLayout>,
}

impl FatInstaller {
    pub fn new(mirror: Option<RepositoryLayout>) -> Self {
        Self { mirror }
    }
}

impl PackagingInstaller for FatInstaller {
    fn mode(&self) -> PackagingMode {
        PackagingMode::Fat
    }

    fn destination(
        &self,
        final_coords: &ArtifactCoords,
        file_name: &str,
        module_dir: &Path,
    ) -> Result<Option<Destination>> {
        let (mirror, metadata_dir) = match &self.mirror {
            Some(repo) => {
                let dir = repo.version_dir(final_coords)?;
                (Some(dir.join(file_name)), Some(dir))
            }
            None => (None, None),
        };
        Ok(Some(Destination {
            path: module_dir.join(file_name),
            mirror,
            metadata_dir,
            keep_existing: false,
        }))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThinInstaller {
    repository: Option<RepositoryLayout>,
}

impl ThinInstaller {
    pub fn new(repository: Option<RepositoryLayout>) -> Self {
        Self { repository }
    }
}

impl PackagingInstaller for ThinInstaller {
    fn mode(&self) -> PackagingMode {
        PackagingMode::Thin
    }

    fn destination(
        &self,
        final_coords: &ArtifactCoords,
        file_name: &str,
        _module_dir: &Path,
    ) -> Result<Option<Destination>> {
        let Some(repo) = &self.repository else {
            return Ok(None);
        };
        let dir = repo.version_dir(final_coords)?;
        Ok(Some(Destination {
            path: dir.join(file_name),
            mirror: None,
            metadata_dir: Some(dir),
            keep_existing: true,
        }))
    }
}

pub fn installer_for(
    mode: PackagingMode,
    generated: Option<RepositoryLayout>,
) -> Box<dyn PackagingInstaller> {
    match mode {
        PackagingMode::Fat => Box::new(FatInstaller::new(generated)),
        PackagingMode::Thin => Box::new(ThinInstaller::new(generated)),
    }
}
