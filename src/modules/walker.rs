//! Namespace rewrite of a whole module tree.
//!
//! The tree is split into partitions walked independently:
//! - each directory under `system/layers/`
//! - each directory under `system/add-ons/`
//! - everything else, walked flat
//!
//! Relative paths inside a partition are renamed with the mapping table and
//! every `module.xml` goes through the descriptor rewriter. The result is built
//! in a sibling `transformed-modules` directory and swapped in only once
//! complete; on failure the original tree is untouched.

use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::artifact::filesystem::{atomic_copy, remove_path, tmp_sibling};
use crate::descriptor::{rewrite_at_path, DescriptorKind, ModuleDescriptor, DESCRIPTOR_FILE_NAME};
use crate::error::PackagingError;
use crate::mapping::{MappingTable, PathRename};

pub const SYSTEM_DIR: &str = "system";
pub const LAYERS_DIR: &str = "layers";
pub const ADD_ONS_DIR: &str = "add-ons";
pub const WORK_DIR_NAME: &str = "transformed-modules";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub partitions: usize,
    pub files: usize,
    pub renamed: usize,
    pub descriptors_rewritten: usize,
}

/// A self-contained sub-tree, relative to the modules root.
#[derive(Debug)]
struct Partition {
    root: PathBuf,
    files: Vec<PathBuf>,
}

/// Rename paths and rewrite descriptors of the tree at `modules` in place.
///
/// # Arguments
///
/// * `modules` - root of an assembled module tree; its parent must be
///   writable for the sibling work directory
/// * `mapping` - namespace rules for paths and module names
///
/// # Example
///
/// ```rust,ignore
/// let summary = transform_modules(Path::new("dist/modules"), &MappingTable::default())?;
/// println!("{} descriptors rewritten", summary.descriptors_rewritten);
/// ```
pub fn transform_modules(modules: &Path, mapping: &MappingTable) -> Result<WalkSummary> {
    if !modules.is_dir() {
        bail!("module tree not found: {}", modules.display());
    }
    let Some(parent) = modules.parent() else {
        bail!("module tree has no parent directory: {}", modules.display());
    };
    let work = parent.join(WORK_DIR_NAME);
    remove_path(&work)?;

    let partitions = collect_partitions(modules)?;
    let result = build_transformed(modules, &work, &partitions, mapping)
        .and_then(|summary| swap_in(&work, modules).map(|()| summary));
    if result.is_err() {
        let _ = remove_path(&work);
    }
    let summary = result?;
    info!(
        modules = %modules.display(),
        files = summary.files,
        renamed = summary.renamed,
        rewritten = summary.descriptors_rewritten,
        "transformed module tree"
    );
    Ok(summary)
}

/// Where `relative` (a path under the modules root) ends up once the tree
/// has been transformed.
pub fn renamed_location(relative: &Path, mapping: &MappingTable) -> PathBuf {
    let parts: Vec<Component<'_>> = relative.components().collect();
    let partitioned = parts.len() > 3
        && parts[0].as_os_str() == SYSTEM_DIR
        && (parts[1].as_os_str() == LAYERS_DIR || parts[1].as_os_str() == ADD_ONS_DIR);
    let split = if partitioned { 3 } else { 0 };
    let root: PathBuf = parts[..split].iter().collect();
    let inner: PathBuf = parts[split..].iter().collect();
    match mapping.rename_path(&inner) {
        Some(rename) => root.join(rename.path),
        None => relative.to_path_buf(),
    }
}

fn collect_partitions(modules: &Path) -> Result<Vec<Partition>> {
    let mut partitions = Vec::new();
    let mut grouped = BTreeSet::new();
    for group in [LAYERS_DIR, ADD_ONS_DIR] {
        let group_dir = modules.join(SYSTEM_DIR).join(group);
        if !group_dir.is_dir() {
            continue;
        }
        let mut roots = fs::read_dir(&group_dir)
            .with_context(|| format!("Failed to read directory: {}", group_dir.display()))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        roots.sort();
        for root in roots.into_iter().filter(|p| p.is_dir()) {
            let files = list_files(&root, None)?;
            let rel = relative(modules, &root)?;
            grouped.insert(rel.clone());
            partitions.push(Partition { root: rel, files });
        }
    }
    partitions.push(Partition {
        root: PathBuf::new(),
        files: list_files(modules, Some(&grouped))?,
    });
    Ok(partitions)
}

/// Files under `root` (following symlinks), relative to it, sorted.
fn list_files(root: &Path, skip: Option<&BTreeSet<PathBuf>>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match (skip, entry.path().strip_prefix(root)) {
            (Some(skip), Ok(rel)) => !skip.contains(rel),
            _ => true,
        });
    for entry in walker {
        let entry = entry.with_context(|| format!("walking '{}'", root.display()))?;
        if entry.file_type().is_file() {
            files.push(relative(root, entry.path())?);
        }
    }
    Ok(files)
}

fn relative(base: &Path, path: &Path) -> Result<PathBuf> {
    path.strip_prefix(base)
        .map(Path::to_path_buf)
        .with_context(|| format!("{} is not under {}", path.display(), base.display()))
}

fn build_transformed(
    modules: &Path,
    work: &Path,
    partitions: &[Partition],
    mapping: &MappingTable,
) -> Result<WalkSummary> {
    let mut summary = WalkSummary {
        partitions: partitions.len(),
        ..Default::default()
    };
    for partition in partitions {
        let src_root = modules.join(&partition.root);
        let dst_root = work.join(&partition.root);
        fs::create_dir_all(&dst_root)
            .map_err(|err| PackagingError::io("create directory", &dst_root, err))?;

        for rel in &partition.files {
            let renamed = mapping.rename_path(rel);
            let target_rel = match &renamed {
                Some(rename) => {
                    summary.renamed += 1;
                    rename.path.as_path()
                }
                None => rel.as_path(),
            };
            let src = src_root.join(rel);
            let dst = dst_root.join(target_rel);
            if dst.exists() {
                bail!(
                    "{} and another file both map to {}",
                    src.display(),
                    dst.display()
                );
            }
            if rel.file_name().is_some_and(|name| name == DESCRIPTOR_FILE_NAME) {
                if rewrite_descriptor_file(&src, &dst, mapping, renamed.as_ref())? {
                    summary.descriptors_rewritten += 1;
                }
            } else {
                atomic_copy(&src, &dst)?;
            }
            summary.files += 1;
        }
    }
    debug!(work = %work.display(), files = summary.files, "built transformed module tree");
    Ok(summary)
}

/// Rewrite one descriptor from `src` into `dst`. Returns whether anything
/// changed; unchanged descriptors are copied byte for byte.
///
/// # Arguments
///
/// * `renamed` - the rename applied to the descriptor's path, if any. The
///   module name is only rewritten along with its path.
pub fn rewrite_descriptor_file(
    src: &Path,
    dst: &Path,
    mapping: &MappingTable,
    renamed: Option<&PathRename>,
) -> Result<bool> {
    let mut descriptor = ModuleDescriptor::read(src)?;
    let outcome = rewrite_at_path(&mut descriptor, mapping, renamed);
    let mismatched = outcome.renamed.is_none() && descriptor.kind() != DescriptorKind::Other;
    if let (Some(rename), true) = (renamed, mismatched) {
        warn!(
            descriptor = %src.display(),
            module = %rename.module_name,
            name = descriptor.name().unwrap_or_default(),
            "module name does not match its renamed path"
        );
    }
    if outcome.changed() {
        descriptor.write(dst)?;
    } else {
        atomic_copy(src, dst)?;
    }
    Ok(outcome.changed())
}

/// Replace `modules` with `work`. The original is renamed aside first and put
/// back if the second rename fails.
fn swap_in(work: &Path, modules: &Path) -> Result<()> {
    let backup = tmp_sibling(modules);
    fs::rename(modules, &backup).map_err(|err| PackagingError::io("rename", modules, err))?;
    if let Err(err) = fs::rename(work, modules) {
        return Err(restore_backup(
            &backup,
            modules,
            PackagingError::io("rename", work, err).into(),
        ));
    }
    remove_path(&backup)
}

/// Put `backup` back at `modules` after a failed swap. A failed restore is
/// attached to `err` so the caller learns where the original tree was left.
fn restore_backup(backup: &Path, modules: &Path, err: anyhow::Error) -> anyhow::Error {
    match fs::rename(backup, modules) {
        Ok(()) => err,
        Err(restore) => err.context(format!(
            "original module tree left at {}; restoring it failed: {restore}",
            backup.display()
        )),
    }
}
