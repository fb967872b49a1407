//! Namespace rewrite of a single module descriptor.
//!
//! Only `module` and `module-alias` descriptors are touched. The module's own
//! name is renamed by prefix (first matching rule, remainder kept); dependency
//! names are renamed by exact lookup only, since they are already fully
//! qualified.
//!
//! Inside a module tree the directory decides the module's identity, so
//! [`rewrite_at_path`] only renames the name when the descriptor's path was
//! renamed into the same module.

use super::{DescriptorKind, ModuleDescriptor};
use crate::mapping::{MappingTable, PathRename};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteOutcome {
    /// New module name, when the name matched a rule.
    pub renamed: Option<String>,
    pub dependencies_renamed: usize,
}

impl RewriteOutcome {
    pub fn changed(&self) -> bool {
        self.renamed.is_some() || self.dependencies_renamed > 0
    }
}

pub fn rewrite(descriptor: &mut ModuleDescriptor, mapping: &MappingTable) -> RewriteOutcome {
    let name = descriptor.name().and_then(|name| mapping.rename_identifier(name));
    apply(descriptor, mapping, name)
}

/// Rewrite a descriptor stored in a module tree.
///
/// # Arguments
///
/// * `renamed` - how the descriptor's path was renamed, `None` when it kept
///   its path. A descriptor that stays where it is keeps its name; a renamed
///   one takes the new name only when it lies inside `renamed.module_name`.
///
/// # Example
///
/// ```rust,ignore
/// let rename = mapping.rename_path("javax/ejb/api/main/module.xml".as_ref());
/// let outcome = rewrite_at_path(&mut descriptor, &mapping, rename.as_ref());
/// ```
pub fn rewrite_at_path(
    descriptor: &mut ModuleDescriptor,
    mapping: &MappingTable,
    renamed: Option<&PathRename>,
) -> RewriteOutcome {
    let name = renamed.and_then(|rename| {
        let name = mapping.rename_identifier(descriptor.name()?)?;
        let inside = match name.strip_prefix(rename.module_name.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('.'),
            None => false,
        };
        inside.then_some(name)
    });
    apply(descriptor, mapping, name)
}

fn apply(
    descriptor: &mut ModuleDescriptor,
    mapping: &MappingTable,
    name: Option<String>,
) -> RewriteOutcome {
    let mut outcome = RewriteOutcome::default();
    if descriptor.kind() == DescriptorKind::Other {
        return outcome;
    }

    if let Some(renamed) = name {
        descriptor.set_name(renamed.clone());
        outcome.renamed = Some(renamed);
    }

    for dependency in descriptor.dependency_elements_mut() {
        let target = dependency
            .attr("name")
            .and_then(|name| mapping.dotted_target(name))
            .map(str::to_string);
        if let Some(target) = target {
            dependency.set_attr("name", target);
            outcome.dependencies_renamed += 1;
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Requirement;
    use crate::mapping::MappingRule;
    use std::path::Path;

    #[test]
    fn renames_module_and_mapped_dependencies() {
        let mapping = MappingTable::new(vec![
            MappingRule {
                from: "javax/ejb/api".into(),
                to: "jakarta/ejb/api".into(),
            },
            MappingRule {
                from: "javax/inject/api".into(),
                to: "jakarta/inject/api".into(),
            },
        ])
        .unwrap();
        let mut descriptor = ModuleDescriptor::parse(
            r#"<module xmlns="urn:jboss:module:1.9" name="javax.ejb.api">
    <dependencies>
        <module name="javax.inject.api"/>
        <module name="javax.unknown.thing" optional="true"/>
    </dependencies>
</module>"#,
        )
        .unwrap();

        let outcome = rewrite(&mut descriptor, &mapping);

        assert_eq!(outcome.renamed.as_deref(), Some("jakarta.ejb.api"));
        assert_eq!(outcome.dependencies_renamed, 1);
        assert_eq!(descriptor.name(), Some("jakarta.ejb.api"));
        let deps = descriptor.dependencies();
        assert_eq!(deps[0].name, "jakarta.inject.api");
        assert_eq!(deps[1].name, "javax.unknown.thing");
        assert_eq!(deps[1].requirement, Requirement::Optional);
    }

    #[test]
    fn unmatched_descriptor_is_unchanged() {
        let xml = r#"<module name="org.acme.widget"><dependencies><module name="org.acme.base"/></dependencies></module>"#;
        let mut descriptor = ModuleDescriptor::parse(xml).unwrap();
        let before = descriptor.clone();

        let outcome = rewrite(&mut descriptor, &MappingTable::default());

        assert!(!outcome.changed());
        assert_eq!(descriptor, before);
    }

    #[test]
    fn name_remainder_is_kept() {
        let mut descriptor =
            ModuleDescriptor::parse(r#"<module name="javax.servlet.api.impl"/>"#).unwrap();
        rewrite(&mut descriptor, &MappingTable::default());
        assert_eq!(descriptor.name(), Some("jakarta.servlet.api.impl"));
    }

    #[test]
    fn dependency_lookup_is_exact() {
        let mut descriptor = ModuleDescriptor::parse(
            r#"<module name="org.acme"><dependencies><module name="javax.ejb.api.extra"/></dependencies></module>"#,
        )
        .unwrap();
        let outcome = rewrite(&mut descriptor, &MappingTable::default());
        assert!(!outcome.changed());
    }

    #[test]
    fn alias_is_renamed() {
        let mut descriptor = ModuleDescriptor::parse(
            r#"<module-alias name="javax.security.jacc.api" target-name="org.acme.jacc"/>"#,
        )
        .unwrap();
        let outcome = rewrite(&mut descriptor, &MappingTable::default());
        assert_eq!(outcome.renamed.as_deref(), Some("jakarta.security.jacc.api"));
        assert_eq!(descriptor.root().attr("target-name"), Some("org.acme.jacc"));
    }

    #[test]
    fn unrenamed_path_keeps_module_name() {
        let mut descriptor = ModuleDescriptor::parse(
            r#"<module name="javax.ejb.api"><dependencies><module name="javax.inject.api"/></dependencies></module>"#,
        )
        .unwrap();

        let outcome = rewrite_at_path(&mut descriptor, &MappingTable::default(), None);

        assert_eq!(outcome.renamed, None);
        assert_eq!(outcome.dependencies_renamed, 1);
        assert_eq!(descriptor.name(), Some("javax.ejb.api"));
    }

    #[test]
    fn renamed_path_only_grants_its_own_module_name() {
        let mapping = MappingTable::default();
        let rename = mapping
            .rename_path(Path::new("javax/servlet/api/main/module.xml"))
            .unwrap();
        let mut own = ModuleDescriptor::parse(r#"<module name="javax.servlet.api.impl"/>"#).unwrap();
        let mut foreign = ModuleDescriptor::parse(r#"<module name="javax.mail.api"/>"#).unwrap();

        rewrite_at_path(&mut own, &mapping, Some(&rename));
        let outcome = rewrite_at_path(&mut foreign, &mapping, Some(&rename));

        assert_eq!(own.name(), Some("jakarta.servlet.api.impl"));
        assert!(!outcome.changed());
        assert_eq!(foreign.name(), Some("javax.mail.api"));
    }

    #[test]
    fn other_kinds_pass_through() {
        let mut descriptor =
            ModuleDescriptor::parse(r#"<module-absent name="javax.ejb.api"/>"#).unwrap();
        let outcome = rewrite(&mut descriptor, &MappingTable::default());
        assert!(!outcome.changed());
        assert_eq!(descriptor.name(), Some("javax.ejb.api"));
    }
}
