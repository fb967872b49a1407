//! Artifact coordinates and the helpers that move artifact bytes around.
//!
//! - [`ArtifactCoords`] - the 5-tuple identifying a binary
//! - [`Gav`] - the `group:artifact:version` key used for exclusion and override bookkeeping
//! - [`exclusions`] - exclusion manifest loading
//! - [`filesystem`] - atomic copy/move/write and digests

pub mod exclusions;
pub mod filesystem;

use anyhow::{bail, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Extension assumed when a coordinate string does not carry one.
pub const DEFAULT_EXTENSION: &str = "jar";

/// Extension of the companion metadata file stored next to every artifact.
pub const METADATA_EXTENSION: &str = "pom";

/// Immutable artifact coordinate.
///
/// Text form is `group:artifact:version[:classifier[:extension]]`. An empty
/// classifier segment means no classifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ArtifactCoords {
    group_id: String,
    artifact_id: String,
    version: String,
    classifier: Option<String>,
    extension: String,
}

impl ArtifactCoords {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            classifier: None,
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        let classifier = classifier.into();
        self.classifier = (!classifier.is_empty()).then_some(classifier);
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Same coordinate at another version. This is the only way a coordinate
    /// is re-versioned (e.g. to append the transformation suffix).
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..self.clone()
        }
    }

    /// Coordinate of the companion metadata file at this coordinate's version.
    pub fn metadata(&self) -> Self {
        Self {
            classifier: None,
            extension: METADATA_EXTENSION.to_string(),
            ..self.clone()
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn classifier(&self) -> Option<&str> {
        self.classifier.as_deref()
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Metadata files travel alongside jar-like artifacts, not alongside themselves.
    pub fn has_metadata(&self) -> bool {
        self.extension != METADATA_EXTENSION
    }

    pub fn gav(&self) -> Gav {
        Gav {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
            version: self.version.clone(),
        }
    }

    /// `<artifactId>-<version>[-<classifier>].<extension>`
    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(classifier) => format!(
                "{}-{}-{}.{}",
                self.artifact_id, self.version, classifier, self.extension
            ),
            None => format!("{}-{}.{}", self.artifact_id, self.version, self.extension),
        }
    }
}

impl fmt::Display for ArtifactCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)?;
        match (&self.classifier, self.extension.as_str()) {
            (None, DEFAULT_EXTENSION) => Ok(()),
            (Some(classifier), DEFAULT_EXTENSION) => write!(f, ":{classifier}"),
            (classifier, extension) => {
                write!(f, ":{}:{extension}", classifier.as_deref().unwrap_or(""))
            }
        }
    }
}

impl FromStr for ArtifactCoords {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        let (group, artifact, version, classifier, extension) = match parts.as_slice() {
            [g, a, v] => (*g, *a, *v, "", DEFAULT_EXTENSION),
            [g, a, v, c] => (*g, *a, *v, *c, DEFAULT_EXTENSION),
            [g, a, v, c, e] => (*g, *a, *v, *c, *e),
            _ => bail!(
                "invalid artifact coordinate '{}'; expected group:artifact:version[:classifier[:extension]]",
                s
            ),
        };
        if group.is_empty() || artifact.is_empty() || version.is_empty() || extension.is_empty() {
            bail!("invalid artifact coordinate '{}': empty segment", s);
        }
        Ok(Self::new(group, artifact, version)
            .with_classifier(classifier)
            .with_extension(extension))
    }
}

/// `group:artifact:version` key. Classifier and extension are deliberately not
/// part of it: classified variants of a coordinate share exclusion status.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Gav {
    group_id: String,
    artifact_id: String,
    version: String,
}

impl fmt::Display for Gav {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

impl FromStr for Gav {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().split(':').collect::<Vec<_>>().as_slice() {
            [g, a, v] if !g.is_empty() && !a.is_empty() && !v.is_empty() => Ok(Self {
                group_id: g.to_string(),
                artifact_id: a.to_string(),
                version: v.to_string(),
            }),
            _ => bail!("invalid group:artifact:version key '{}'", s.trim()),
        }
    }
}

/// Insert `suffix` right after the last occurrence of `version` in `file_name`.
///
/// When the version does not appear at all, the suffix goes before the
/// extension instead.
pub fn transformed_file_name(version: &str, file_name: &str, suffix: &str) -> String {
    let split = match file_name.rfind(version) {
        Some(start) if !version.is_empty() => start + version.len(),
        _ => file_name.rfind('.').unwrap_or(file_name.len()),
    };
    format!("{}{}{}", &file_name[..split], suffix, &file_name[split..])
}
