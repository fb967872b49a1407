#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use module_packager::repository::RepositoryLayout;
use module_packager::transformer::{TransformOutcome, Transformer};
use module_packager::{ArtifactCoords, MappingTable};

/// In-process transformer: appends a marker to the input and counts calls.
#[derive(Clone, Default)]
pub struct CountingTransformer {
    calls: Arc<AtomicUsize>,
    unchanged: bool,
}

impl CountingTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports "nothing to change" for every input.
    pub fn unchanged() -> Self {
        Self {
            unchanged: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transformer for CountingTransformer {
    fn transform(
        &self,
        input: &Path,
        output: &Path,
        _mapping: &MappingTable,
        _verbose: bool,
    ) -> Result<TransformOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unchanged {
            return Ok(TransformOutcome::UNCHANGED);
        }
        let mut bytes = fs::read(input)?;
        bytes.extend_from_slice(b"+jakarta");
        fs::write(output, bytes)?;
        Ok(TransformOutcome::CHANGED)
    }
}

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Jar and pom for `coords` in `repo`; the jar holds the coordinate text.
pub fn publish(repo: &RepositoryLayout, coords: &str) -> ArtifactCoords {
    let coords: ArtifactCoords = coords.parse().unwrap();
    let jar = repo.artifact_path(&coords).unwrap();
    fs::create_dir_all(jar.parent().unwrap()).unwrap();
    fs::write(&jar, coords.to_string()).unwrap();
    fs::write(repo.artifact_path(&coords.metadata()).unwrap(), "<project/>").unwrap();
    coords
}
