//! Module trees: template processing into a distribution and the namespace
//! rewrite of a finished tree.

pub mod template;
pub mod walker;

pub use template::{expression_key, process_template, TemplateOutcome, VersionTable};
pub use walker::{renamed_location, rewrite_descriptor_file, transform_modules, WalkSummary};
