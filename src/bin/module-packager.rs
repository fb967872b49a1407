use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use module_packager::config::load_build_config;
use module_packager::modules::transform_modules;
use module_packager::provision::{probe, provision};
use module_packager::{ArtifactCoords, InstallAction, MappingTable};
use tracing::info;

#[derive(Parser)]
#[command(name = "module-packager")]
#[command(about = "Provision module distributions, rewriting javax artifacts to jakarta", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log every decision (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full provisioning pass from a build config
    Provision {
        /// Path to build.toml
        config: PathBuf,
    },

    /// Rename modules and rewrite descriptors of an assembled module tree
    TransformModules {
        modules_dir: PathBuf,

        /// Take the mapping table from this build.toml instead of the defaults
        #[arg(long)]
        mapping: Option<PathBuf>,
    },

    /// Resolve one overridden artifact and print what was found
    Probe {
        config: PathBuf,
        /// group:artifact:version[:classifier[:extension]]
        coords: String,
        /// Caller-supplied artifact file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Provision { config } => {
            let mut config = load_build_config(&config)?;
            config.engine.verbose |= cli.verbose;
            let summary = provision(&config)?;
            info!(report = %summary.report_path.display(), "report written");
            println!(
                "Provisioned {} module(s) into {}",
                summary.descriptors,
                summary.modules_dir.display()
            );
            println!(
                "  transformed: {}  reused: {}  copied: {}  referenced: {}  excluded: {}",
                summary.report.count(InstallAction::Transformed),
                summary.report.count(InstallAction::Reused),
                summary.report.count(InstallAction::Copied),
                summary.report.count(InstallAction::Referenced),
                summary.report.excluded,
            );
            if let Some(walk) = summary.walk {
                println!(
                    "  renamed {} file(s), rewrote {} descriptor(s)",
                    walk.renamed, walk.descriptors_rewritten
                );
            }
            Ok(())
        }
        Commands::TransformModules {
            modules_dir,
            mapping,
        } => {
            let mapping = match mapping {
                Some(path) => load_build_config(&path)?.mapping,
                None => MappingTable::default(),
            };
            let walk = transform_modules(&modules_dir, &mapping)?;
            println!(
                "Transformed {}: {} file(s), {} renamed, {} descriptor(s) rewritten",
                modules_dir.display(),
                walk.files,
                walk.renamed,
                walk.descriptors_rewritten
            );
            Ok(())
        }
        Commands::Probe {
            config,
            coords,
            file,
        } => {
            let mut config = load_build_config(&config)?;
            config.engine.verbose |= cli.verbose;
            let coords: ArtifactCoords = coords
                .parse()
                .with_context(|| format!("invalid artifact coordinate '{coords}'"))?;
            let status = probe(&config, &coords, &file)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&status).context("serializing override status")?
            );
            Ok(())
        }
    }
}
