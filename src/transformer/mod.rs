//! Binary namespace transformer contract.
//!
//! The byte-level rewrite is opaque to this crate. A [`Transformer`] takes a
//! single file or a directory tree, writes a rewritten copy to `output` and
//! says whether anything actually changed. "Nothing to change" is a normal
//! outcome; only hard failures are errors.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::artifact::filesystem::{remove_path, sha256_path, tmp_sibling};
use crate::error::PackagingError;
use crate::mapping::MappingTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOutcome {
    /// `output` holds rewritten bytes. When false, `output` does not exist.
    pub changed: bool,
}

impl TransformOutcome {
    pub const CHANGED: Self = Self { changed: true };
    pub const UNCHANGED: Self = Self { changed: false };
}

pub trait Transformer {
    fn transform(
        &self,
        input: &Path,
        output: &Path,
        mapping: &MappingTable,
        verbose: bool,
    ) -> Result<TransformOutcome>;
}

/// Runs an external tool:
/// `<program> [args..] --mapping <file> [--verbose] <input> <output>`.
#[derive(Debug, Clone)]
pub struct CommandTransformer {
    program: String,
    args: Vec<String>,
}

impl CommandTransformer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a whitespace-separated command line (no quoting).
    pub fn from_command_line(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let Some(program) = parts.next() else {
            bail!("transformer command must not be empty");
        };
        Ok(Self::new(program, parts.collect()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn write_mapping(&self, mapping: &MappingTable, output: &Path) -> Result<PathBuf> {
        let path = tmp_sibling(&output.with_extension("mapping.toml"));
        let text = toml::to_string(mapping).context("serializing mapping table")?;
        fs::write(&path, text).map_err(|err| PackagingError::io("write", &path, err))?;
        Ok(path)
    }
}

impl Transformer for CommandTransformer {
    fn transform(
        &self,
        input: &Path,
        output: &Path,
        mapping: &MappingTable,
        verbose: bool,
    ) -> Result<TransformOutcome> {
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| PackagingError::io("create directory", parent, err))?;
        }
        let mapping_file = self.write_mapping(mapping, output)?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg("--mapping").arg(&mapping_file);
        if verbose {
            cmd.arg("--verbose");
        }
        cmd.arg(input).arg(output);
        let result = cmd.output();
        let _ = fs::remove_file(&mapping_file);
        let result =
            result.with_context(|| format!("executing transformer '{}'", self.program))?;

        if !result.status.success() {
            remove_path(output)?;
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PackagingError::Transform {
                input: input.to_path_buf(),
                reason: format!("{} exited with {}: {}", self.program, result.status, stderr.trim()),
            }
            .into());
        }
        if verbose {
            let stdout = String::from_utf8_lossy(&result.stdout);
            if !stdout.trim().is_empty() {
                tracing::info!(input = %input.display(), "{}", stdout.trim());
            }
        }

        if !output.exists() {
            return Ok(TransformOutcome::UNCHANGED);
        }
        if sha256_path(input)? == sha256_path(output)? {
            remove_path(output)?;
            return Ok(TransformOutcome::UNCHANGED);
        }
        Ok(TransformOutcome::CHANGED)
    }
}
