//! Module template processing.
//!
//! A template is a module descriptor whose `resources/artifact` entries name
//! artifacts either literally (`group:artifact:version[:classifier]`) or via a
//! version expression (`${group:artifact[:classifier][?options]}`) looked up in
//! the [`VersionTable`]. Each artifact goes through the decision engine, then
//! the entry is rewritten for the packaging mode:
//!
//! - fat: `<artifact name=".."/>` becomes `<resource-root path="<file name>"/>`
//! - thin: `name` becomes the coordinate at the installed version

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::artifact::filesystem::atomic_copy;
use crate::artifact::ArtifactCoords;
use crate::descriptor::{DescriptorKind, Element, ModuleDescriptor, Node};
use crate::engine::{DecisionEngine, InstalledArtifact, PackagingMode};
use crate::error::PackagingError;

/// `group:artifact[:classifier]` -> coordinate with version.
#[derive(Debug, Clone, Default)]
pub struct VersionTable {
    entries: BTreeMap<String, ArtifactCoords>,
}

impl VersionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, coords: ArtifactCoords) {
        self.entries.insert(key.into(), coords);
    }

    pub fn get(&self, key: &str) -> Option<&ArtifactCoords> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve an artifact `name` from a template.
    pub fn resolve(&self, name: &str) -> Result<ArtifactCoords> {
        match expression_key(name) {
            Some(key) => self.get(key).cloned().ok_or_else(|| {
                PackagingError::resolution(key, "no version configured for this expression").into()
            }),
            None => name
                .parse()
                .with_context(|| format!("artifact name '{name}' is neither an expression nor a coordinate")),
        }
    }
}

/// `${key}` or `${key?options}` -> `key`.
pub fn expression_key(value: &str) -> Option<&str> {
    let inner = value.strip_prefix("${")?.strip_suffix('}')?;
    Some(inner.split('?').next().unwrap_or(inner))
}

#[derive(Debug, Clone)]
pub struct TemplateOutcome {
    pub kind: DescriptorKind,
    pub artifacts: Vec<InstalledArtifact>,
}

/// Process `template` into `target`, installing its artifacts next to it.
///
/// # Arguments
///
/// * `engine` - decides and installs every `${key}` artifact the template names
/// * `versions` - maps template keys to pinned coordinates
/// * `template` - source `module.xml`
/// * `target` - where the processed descriptor is written; artifacts land in
///   its directory (fat) or only their versions are recorded (thin)
///
/// # Example
///
/// ```rust,ignore
/// let mut versions = VersionTable::new();
/// versions.insert("org.acme:acme-api", "org.acme:acme-api:1.0".parse()?);
/// let outcome = process_template(
///     &mut engine,
///     &versions,
///     Path::new("templates/javax/ejb/api/main/module.xml"),
///     Path::new("dist/modules/javax/ejb/api/main/module.xml"),
/// )?;
/// assert_eq!(outcome.artifacts.len(), 1);
/// ```
pub fn process_template(
    engine: &mut DecisionEngine,
    versions: &VersionTable,
    template: &Path,
    target: &Path,
) -> Result<TemplateOutcome> {
    let mut descriptor = ModuleDescriptor::read(template)?;
    let kind = descriptor.kind();
    if kind == DescriptorKind::Other {
        atomic_copy(template, target)?;
        return Ok(TemplateOutcome {
            kind,
            artifacts: Vec::new(),
        });
    }

    if let Some(key) = descriptor.root().attr("version").and_then(expression_key) {
        let version = versions
            .get(key)
            .map(|coords| coords.version().to_string())
            .ok_or_else(|| PackagingError::resolution(key, "no version configured for module version"))?;
        descriptor.root_mut().set_attr("version", version);
    }

    let module_dir = target.parent().unwrap_or(Path::new("."));
    let mode = engine.config().mode;
    let mut artifacts = Vec::new();
    if let Some(resources) = descriptor.resources_mut() {
        for node in resources.children.iter_mut() {
            let Node::Element(element) = node else {
                continue;
            };
            if element.local_name() != "artifact" {
                continue;
            }
            let Some(name) = element.attr("name") else {
                continue;
            };
            let coords = versions
                .resolve(name)
                .with_context(|| format!("resolving artifacts of {}", template.display()))?;
            let installed = engine.install_artifact(&coords, module_dir)?;
            match mode {
                PackagingMode::Fat => *element = resource_root(element, &installed.file_name),
                PackagingMode::Thin => element.set_attr("name", installed.coords.to_string()),
            }
            artifacts.push(installed);
        }
    }

    descriptor.write(target)?;
    debug!(
        template = %template.display(),
        artifacts = artifacts.len(),
        "processed module template"
    );
    Ok(TemplateOutcome { kind, artifacts })
}

/// `<[prefix:]resource-root path=".."/>` replacing an artifact entry.
fn resource_root(artifact: &Element, path: &str) -> Element {
    let prefix = artifact
        .name
        .strip_suffix(artifact.local_name())
        .unwrap_or_default();
    let mut root = Element::new(format!("{prefix}resource-root"));
    root.set_attr("path", path);
    root
}
