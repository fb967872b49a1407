//! Artifact transformation and installation for modular runtime
//! distributions.
//!
//! A distribution is provisioned from a tree of module templates. Every
//! artifact a template references goes through the [`engine::DecisionEngine`],
//! which decides whether it is installed as the original or as a
//! namespace-rewritten copy (`javax.*` to `jakarta.*`), where that copy can be
//! reused from, and which version and file name descriptors must point at.
//! Once the tree is assembled, [`modules::transform_modules`] renames module
//! directories and rewrites module descriptors to match.
//!
//! # Architecture
//!
//! ```text
//! provision (one pass)
//!     │
//!     ├── config      build.toml -> BuildConfig
//!     ├── preflight   host tools, templates dir
//!     ├── engine      decisions, override probing, installers (fat/thin)
//!     │     ├── repository    layout, resolver, fs2 write lock
//!     │     └── transformer   external bytecode rewriter
//!     ├── modules     template processing, tree-wide rename
//!     │     └── descriptor    module.xml model and rewriter
//!     └── report      install-report.json
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use module_packager::config::load_build_config;
//! use module_packager::provision::provision;
//!
//! let config = load_build_config("build.toml".as_ref())?;
//! let summary = provision(&config)?;
//! println!("{} artifacts installed", summary.report.artifacts.len());
//! ```

pub mod artifact;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod modules;
pub mod preflight;
pub mod provision;
pub mod report;
pub mod repository;
pub mod transformer;

pub use artifact::{ArtifactCoords, Gav};
pub use engine::{DecisionEngine, EngineConfig, InstallAction, InstalledArtifact, PackagingMode};
pub use error::PackagingError;
pub use mapping::MappingTable;
