//! `install-report.json`: what each artifact was installed as.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::engine::{DecisionEngine, InstallAction, InstalledArtifact, PackagingMode};

pub const REPORT_FILE_NAME: &str = "install-report.json";

#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub generated_at: String,
    pub mode: PackagingMode,
    pub transform_enabled: bool,
    pub suffix: String,
    pub excluded: usize,
    pub artifacts: Vec<ReportEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub coords: String,
    pub original: String,
    pub version: String,
    pub file_name: String,
    pub action: InstallAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl From<&InstalledArtifact> for ReportEntry {
    fn from(installed: &InstalledArtifact) -> Self {
        Self {
            coords: installed.coords.to_string(),
            original: installed.original.to_string(),
            version: installed.version().to_string(),
            file_name: installed.file_name.clone(),
            action: installed.action,
            sha256: installed.sha256.clone(),
            path: installed.path.clone(),
        }
    }
}

impl InstallReport {
    pub fn from_engine(engine: &DecisionEngine) -> Result<Self> {
        let config = engine.config();
        Ok(Self {
            generated_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .context("formatting report timestamp")?,
            mode: config.mode,
            transform_enabled: config.transform_enabled,
            suffix: config.suffix.clone(),
            excluded: engine.state().excluded_count(),
            artifacts: engine.installs().iter().map(ReportEntry::from).collect(),
        })
    }

    /// Re-point installed paths after the tree they were written into moved.
    /// `locate` returns `None` for paths that stayed where they were.
    pub fn relocate(&mut self, locate: impl Fn(&Path) -> Option<PathBuf>) {
        for entry in &mut self.artifacts {
            if let Some(moved) = entry.path.as_deref().and_then(&locate) {
                entry.path = Some(moved);
            }
        }
    }

    pub fn count(&self, action: InstallAction) -> usize {
        self.artifacts.iter().filter(|a| a.action == action).count()
    }
}

pub fn write_install_report(path: &Path, report: &InstallReport) -> Result<()> {
    write_json_atomic(path, report)
        .with_context(|| format!("writing install report '{}'", path.display()))
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("path without parent '{}'", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("creating parent directory '{}'", parent.display()))?;
    let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
    let payload = serde_json::to_vec_pretty(value).context("serializing install report")?;
    fs::write(&tmp, payload).with_context(|| format!("writing temp file '{}'", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        format!(
            "renaming temp file '{}' to '{}'",
            tmp.display(),
            path.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactCoords;
    use tempfile::TempDir;

    fn entry(action: InstallAction) -> ReportEntry {
        let original: ArtifactCoords = "org.acme:acme-api:1.0".parse().unwrap();
        let coords = original.with_version("1.0-ee9");
        ReportEntry::from(&InstalledArtifact {
            file_name: coords.file_name(),
            original,
            coords,
            path: None,
            action,
            sha256: None,
        })
    }

    #[test]
    fn writes_pretty_json_without_leftovers() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out").join(REPORT_FILE_NAME);
        let report = InstallReport {
            generated_at: "2026-01-01T00:00:00Z".into(),
            mode: PackagingMode::Thin,
            transform_enabled: true,
            suffix: "-ee9".into(),
            excluded: 0,
            artifacts: vec![entry(InstallAction::Referenced)],
        };

        write_install_report(&path, &report).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["mode"], "thin");
        assert_eq!(value["artifacts"][0]["action"], "referenced");
        assert_eq!(value["artifacts"][0]["version"], "1.0-ee9");
        assert_eq!(value["artifacts"][0]["file_name"], "acme-api-1.0-ee9.jar");
        assert!(value["artifacts"][0].get("sha256").is_none());
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn counts_by_action() {
        let report = InstallReport {
            generated_at: String::new(),
            mode: PackagingMode::Fat,
            transform_enabled: true,
            suffix: "-ee9".into(),
            excluded: 1,
            artifacts: vec![
                entry(InstallAction::Transformed),
                entry(InstallAction::Transformed),
                entry(InstallAction::Copied),
            ],
        };
        assert_eq!(report.count(InstallAction::Transformed), 2);
        assert_eq!(report.count(InstallAction::Reused), 0);
    }
}
