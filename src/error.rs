//! Error taxonomy for artifact installation.
//!
//! Operations return `anyhow::Result`; the root cause of every fatal failure is
//! one of these variants so callers can classify it with
//! `err.downcast_ref::<PackagingError>()`.

use std::path::PathBuf;
use thiserror::Error;

use crate::descriptor::DescriptorError;

#[derive(Debug, Error)]
pub enum PackagingError {
    /// Mutually incompatible options, detected before any file is touched.
    #[error("configuration conflict: {0}")]
    ConfigConflict(String),

    /// A coordinate could not be located in any repository.
    #[error("cannot resolve artifact {coords}: {reason}")]
    Resolution { coords: String, reason: String },

    /// Copy, rename or write failure on a concrete path.
    #[error("{action} failed for {}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external transformer failed hard. "Nothing to change" is not this.
    #[error("transformation of {} failed: {reason}", input.display())]
    Transform { input: PathBuf, reason: String },

    /// A module descriptor could not be parsed.
    #[error("failed to parse module descriptor {}", path.display())]
    DescriptorParse {
        path: PathBuf,
        #[source]
        source: DescriptorError,
    },
}

impl PackagingError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn resolution(coords: impl ToString, reason: impl Into<String>) -> Self {
        Self::Resolution {
            coords: coords.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_the_path() {
        let err = PackagingError::io(
            "copy",
            "/tmp/a.jar",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.to_string(), "copy failed for /tmp/a.jar");
    }

    #[test]
    fn classification_survives_anyhow_context() {
        let err = anyhow::Error::new(PackagingError::ConfigConflict("x".into()))
            .context("building engine");
        assert!(matches!(
            err.downcast_ref::<PackagingError>(),
            Some(PackagingError::ConfigConflict(_))
        ));
    }
}
