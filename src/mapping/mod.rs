//! Namespace mapping table.
//!
//! An ordered list of `old-prefix -> new-prefix` rules over slash-separated
//! module paths (`javax/ejb/api -> jakarta/ejb/api`). The dotted form used for
//! module identifiers (`javax.ejb.api -> jakarta.ejb.api`) is derived from the
//! same rules.
//!
//! Prefix matching is per path segment: `javax/ejb/api` matches
//! `javax/ejb/api/main/module.xml` but not `javax/ejb/apix`.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// The javax to jakarta module table.
pub const DEFAULT_RULES: &[(&str, &str)] = &[
    ("javax/annotation/api", "jakarta/annotation/api"),
    ("javax/batch/api", "jakarta/batch/api"),
    ("javax/ejb/api", "jakarta/ejb/api"),
    ("javax/el/api", "jakarta/el/api"),
    ("javax/enterprise/concurrent/api", "jakarta/enterprise/concurrent/api"),
    ("javax/enterprise/api", "jakarta/enterprise/api"),
    ("javax/faces/api", "jakarta/faces/api"),
    ("javax/inject/api", "jakarta/inject/api"),
    ("javax/interceptor/api", "jakarta/interceptor/api"),
    ("javax/jms/api", "jakarta/jms/api"),
    ("javax/json/api", "jakarta/json/api"),
    ("javax/json/bind/api", "jakarta/json/bind/api"),
    ("javax/mail/api", "jakarta/mail/api"),
    ("javax/persistence/api", "jakarta/persistence/api"),
    ("javax/resource/api", "jakarta/resource/api"),
    ("javax/security/auth/message/api", "jakarta/security/auth/message/api"),
    ("javax/security/enterprise/api", "jakarta/security/enterprise/api"),
    ("javax/security/jacc/api", "jakarta/security/jacc/api"),
    ("javax/servlet/api", "jakarta/servlet/api"),
    ("javax/servlet/jsp/api", "jakarta/servlet/jsp/api"),
    ("javax/servlet/jstl/api", "jakarta/servlet/jstl/api"),
    ("javax/transaction/api", "jakarta/transaction/api"),
    ("javax/validation/api", "jakarta/validation/api"),
    ("javax/websocket/api", "jakarta/websocket/api"),
    ("javax/ws/rs/api", "jakarta/ws/rs/api"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingRule {
    pub from: String,
    pub to: String,
}

impl MappingRule {
    fn from_segments(&self) -> impl Iterator<Item = &str> {
        segments(&self.from)
    }

    pub fn dotted_from(&self) -> String {
        segments(&self.from).collect::<Vec<_>>().join(".")
    }

    pub fn dotted_to(&self) -> String {
        segments(&self.to).collect::<Vec<_>>().join(".")
    }
}

/// A path rename produced by [`MappingTable::rename_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRename {
    pub path: PathBuf,
    /// Dotted module name of the matched rule's target.
    pub module_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MappingTable {
    rules: Vec<MappingRule>,
    #[serde(skip)]
    dotted: BTreeMap<String, String>,
}

impl MappingTable {
    pub fn new(rules: Vec<MappingRule>) -> Result<Self> {
        let mut dotted = BTreeMap::new();
        for rule in &rules {
            if segments(&rule.from).next().is_none() || segments(&rule.to).next().is_none() {
                bail!("mapping rule '{}' -> '{}' has an empty side", rule.from, rule.to);
            }
            if dotted.insert(rule.dotted_from(), rule.dotted_to()).is_some() {
                bail!("duplicate mapping rule for '{}'", rule.from);
            }
        }
        Ok(Self { rules, dotted })
    }

    pub fn rules(&self) -> &[MappingRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First declared rule whose source segments prefix `name_segments`.
    fn first_match(&self, name_segments: &[&str]) -> Option<&MappingRule> {
        self.rules.iter().find(|rule| {
            let from: Vec<&str> = rule.from_segments().collect();
            name_segments.len() >= from.len() && name_segments[..from.len()] == from[..]
        })
    }

    /// Rename a module identifier by prefix. The result keeps the separator
    /// style of the input (dotted identifiers stay dotted).
    pub fn rename_identifier(&self, name: &str) -> Option<String> {
        let name_segments: Vec<&str> = segments(name).collect();
        let rule = self.first_match(&name_segments)?;
        let consumed = rule.from_segments().count();
        let separator = if name.contains('/') { "/" } else { "." };
        let renamed: Vec<&str> = segments(&rule.to)
            .chain(name_segments[consumed..].iter().copied())
            .collect();
        Some(renamed.join(separator))
    }

    /// Rename a relative path inside a module tree by prefix.
    pub fn rename_path(&self, relative: &Path) -> Option<PathRename> {
        let parts: Vec<&str> = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();
        let rule = self.first_match(&parts)?;
        let consumed = rule.from_segments().count();
        let mut path: PathBuf = segments(&rule.to).collect();
        path.extend(&parts[consumed..]);
        Some(PathRename {
            path,
            module_name: rule.dotted_to(),
        })
    }

    /// Exact lookup of a fully qualified dotted dependency name.
    pub fn dotted_target(&self, name: &str) -> Option<&str> {
        self.dotted.get(name).map(String::as_str)
    }
}

impl Default for MappingTable {
    fn default() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .map(|(from, to)| MappingRule {
                from: from.to_string(),
                to: to.to_string(),
            })
            .collect::<Vec<_>>();
        let dotted = rules
            .iter()
            .map(|rule| (rule.dotted_from(), rule.dotted_to()))
            .collect();
        Self { rules, dotted }
    }
}

fn segments(name: &str) -> impl Iterator<Item = &str> {
    name.split(['/', '.']).filter(|part| !part.is_empty())
}
