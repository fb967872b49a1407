//! Host checks run before a provisioning pass touches any file.
//!
//! ```rust,ignore
//! use module_packager::preflight::{check_required_tools, command_exists};
//!
//! if !command_exists("jakarta-transformer") {
//!     eprintln!("transformer not installed");
//! }
//! check_required_tools(&[("jakarta-transformer", "jakarta-transformer-cli")])?;
//! ```

use anyhow::{bail, Result};
use std::path::Path;

use crate::config::BuildConfig;
use crate::transformer::CommandTransformer;

/// A bare name is looked up in PATH; anything with a separator must be an
/// existing file.
pub fn command_exists(cmd: &str) -> bool {
    if cmd.contains(std::path::MAIN_SEPARATOR) {
        return Path::new(cmd).is_file();
    }
    which::which(cmd).is_ok()
}

/// Each tuple is (command, package providing it).
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<_> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .collect();

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }

    Ok(())
}

/// Everything a provisioning pass needs from the host and the filesystem.
pub fn check_build(config: &BuildConfig) -> Result<()> {
    config.engine.validate()?;

    if !config.templates.is_dir() {
        bail!("templates directory not found: {}", config.templates.display());
    }

    if let Some(line) = &config.transformer {
        let transformer = CommandTransformer::from_command_line(line)?;
        check_required_tools(&[(transformer.program(), "the configured transformer")])?;
    }

    Ok(())
}
