mod common;

use std::fs;
use std::path::Path;

use common::{publish, write, CountingTransformer};
use module_packager::config::parse_build_config;
use module_packager::descriptor::{rewrite, ModuleDescriptor};
use module_packager::mapping::MappingRule;
use module_packager::provision::provision_with;
use module_packager::repository::{RepositoryLayout, RepositoryResolver};
use module_packager::transformer::CommandTransformer;
use module_packager::{
    ArtifactCoords, DecisionEngine, EngineConfig, InstallAction, MappingTable, PackagingError,
    PackagingMode,
};
use tempfile::TempDir;

fn engine(
    temp: &Path,
    config: EngineConfig,
    transformer: &CountingTransformer,
) -> DecisionEngine {
    DecisionEngine::new(
        EngineConfig {
            scratch_root: Some(temp.join("scratch")),
            ..config
        },
        MappingTable::default(),
        Box::new(RepositoryResolver::new(vec![RepositoryLayout::new(temp.join("local"))])),
        Box::new(transformer.clone()),
    )
    .unwrap()
}

fn with_provisioning(temp: &Path) -> EngineConfig {
    EngineConfig {
        suffix: "-ee9".into(),
        provisioning_repository: Some(temp.join("provisioning")),
        ..Default::default()
    }
}

#[test]
fn disabled_transformation_never_changes_versions() {
    let temp = TempDir::new().unwrap();
    let local = RepositoryLayout::new(temp.path().join("local"));
    let transformer = CountingTransformer::new();
    let mut engine = engine(
        temp.path(),
        EngineConfig {
            suffix: "-ee9".into(),
            ..Default::default()
        },
        &transformer,
    );

    for coords in ["g:a:1.0", "g:b:2.0:tests", "g:c:3.0::war"] {
        let coords = publish(&local, coords);
        let installed = engine.install_artifact(&coords, &temp.path().join("m")).unwrap();
        assert_eq!(installed.version(), coords.version());
        assert_eq!(installed.file_name, coords.file_name());
    }
    assert_eq!(transformer.calls(), 0);
}

#[test]
fn enabled_transformation_suffixes_version_and_file_name() {
    let temp = TempDir::new().unwrap();
    let local = RepositoryLayout::new(temp.path().join("local"));
    let coords = publish(&local, "g:a:1.0");
    let transformer = CountingTransformer::new();
    let mut engine = engine(
        temp.path(),
        EngineConfig {
            transform_enabled: true,
            suffix: "-ee9".into(),
            ..Default::default()
        },
        &transformer,
    );

    let installed = engine.install_artifact(&coords, &temp.path().join("m")).unwrap();

    assert_eq!(installed.version(), "1.0-ee9");
    assert_eq!(installed.file_name, "a-1.0-ee9.jar");
    assert_eq!(installed.action, InstallAction::Transformed);
    assert_eq!(
        fs::read_to_string(temp.path().join("m/a-1.0-ee9.jar")).unwrap(),
        "g:a:1.0+jakarta"
    );
}

#[test]
fn override_found_untransformed_is_excluded() {
    let temp = TempDir::new().unwrap();
    let provisioning = RepositoryLayout::new(temp.path().join("provisioning"));
    let coords = publish(&provisioning, "g:a:2.0");
    write(temp.path(), "supplied/a-2.0.jar", "patched");
    let transformer = CountingTransformer::new();
    let mut engine = engine(temp.path(), with_provisioning(temp.path()), &transformer);

    let status = engine
        .setup_overridden_artifact(&coords, &temp.path().join("supplied/a-2.0.jar"))
        .unwrap();
    let installed = engine.install_artifact(&coords, &temp.path().join("m")).unwrap();

    assert!(!status.needs_transformation);
    assert_eq!(status.transformed_file, None);
    assert!(engine.state().is_excluded(&coords.gav()));
    assert_eq!(installed.version(), "2.0");
    assert_eq!(fs::read_to_string(temp.path().join("m/a-2.0.jar")).unwrap(), "patched");
    assert_eq!(transformer.calls(), 0);
}

#[test]
fn override_found_transformed_is_reused() {
    let temp = TempDir::new().unwrap();
    let provisioning = RepositoryLayout::new(temp.path().join("provisioning"));
    publish(&provisioning, "g:a:2.0-ee9");
    let coords: ArtifactCoords = "g:a:2.0".parse().unwrap();
    write(temp.path(), "supplied/a-2.0.jar", "patched");
    let transformer = CountingTransformer::new();
    let mut engine = engine(temp.path(), with_provisioning(temp.path()), &transformer);

    let status = engine
        .setup_overridden_artifact(&coords, &temp.path().join("supplied/a-2.0.jar"))
        .unwrap();
    let installed = engine.install_artifact(&coords, &temp.path().join("m")).unwrap();

    assert!(!status.needs_transformation);
    assert!(status.transformed_file.is_some());
    assert!(!engine.state().is_excluded(&coords.gav()));
    assert_eq!(installed.version(), "2.0-ee9");
    assert_eq!(installed.action, InstallAction::Reused);
    assert_eq!(transformer.calls(), 0);
}

#[test]
fn override_resolution_is_idempotent_across_runs() {
    let temp = TempDir::new().unwrap();
    let coords: ArtifactCoords = "g:a:2.0".parse().unwrap();
    write(temp.path(), "supplied/a-2.0.jar", "javax");
    publish(&RepositoryLayout::new(temp.path().join("local")), "g:a:2.0");
    let supplied = temp.path().join("supplied/a-2.0.jar");

    let first_transformer = CountingTransformer::new();
    let first = engine(temp.path(), with_provisioning(temp.path()), &first_transformer)
        .setup_overridden_artifact(&coords, &supplied)
        .unwrap();
    assert!(first.needs_transformation);
    assert_eq!(first_transformer.calls(), 1);

    let second_transformer = CountingTransformer::new();
    let second = engine(temp.path(), with_provisioning(temp.path()), &second_transformer)
        .setup_overridden_artifact(&coords, &supplied)
        .unwrap();
    let third = engine(temp.path(), with_provisioning(temp.path()), &second_transformer)
        .setup_overridden_artifact(&coords, &supplied)
        .unwrap();

    assert!(!second.needs_transformation);
    assert_eq!(second, third);
    assert_eq!(second_transformer.calls(), 0);
    let stored = temp.path().join("provisioning/g/a/2.0-ee9");
    assert_eq!(
        fs::read_to_string(stored.join("a-2.0-ee9.jar")).unwrap(),
        "javax+jakarta"
    );
    assert!(stored.join("a-2.0-ee9.pom").is_file());
}

#[test]
fn untransformable_override_stays_excluded_across_runs() {
    let temp = TempDir::new().unwrap();
    let coords: ArtifactCoords = "g:a:2.0".parse().unwrap();
    write(temp.path(), "supplied/a-2.0.jar", "plain");
    let supplied = temp.path().join("supplied/a-2.0.jar");
    let transformer = CountingTransformer::unchanged();

    let mut first = engine(temp.path(), with_provisioning(temp.path()), &transformer);
    let status = first.setup_overridden_artifact(&coords, &supplied).unwrap();
    assert!(status.needs_transformation);
    assert!(first.state().is_excluded(&coords.gav()));
    assert_eq!(first.state().transformed_file(&coords), None);

    let mut second = engine(temp.path(), with_provisioning(temp.path()), &transformer);
    let status = second.setup_overridden_artifact(&coords, &supplied).unwrap();
    assert!(!status.needs_transformation);
    assert!(second.state().is_excluded(&coords.gav()));
    assert_eq!(transformer.calls(), 1);
}

#[test]
fn override_does_not_leak_into_classified_variant() {
    let temp = TempDir::new().unwrap();
    publish(&RepositoryLayout::new(temp.path().join("provisioning")), "g:a:2.0-ee9");
    let tests = publish(&RepositoryLayout::new(temp.path().join("local")), "g:a:2.0:tests");
    let coords: ArtifactCoords = "g:a:2.0".parse().unwrap();
    write(temp.path(), "supplied/a-2.0.jar", "patched");
    let transformer = CountingTransformer::new();
    let mut engine = engine(
        temp.path(),
        EngineConfig {
            transform_enabled: true,
            ..with_provisioning(temp.path())
        },
        &transformer,
    );

    engine
        .setup_overridden_artifact(&coords, &temp.path().join("supplied/a-2.0.jar"))
        .unwrap();
    let installed = engine.install_artifact(&tests, &temp.path().join("m")).unwrap();

    assert_eq!(installed.action, InstallAction::Transformed);
    assert_eq!(installed.file_name, "a-2.0-ee9-tests.jar");
    assert_eq!(
        fs::read_to_string(temp.path().join("m/a-2.0-ee9-tests.jar")).unwrap(),
        "g:a:2.0:tests+jakarta"
    );
    assert_eq!(transformer.calls(), 1);
}

#[test]
fn descriptor_rewrite_scenario() {
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
        r#"<?xml version="1.0" encoding="UTF-8"?>
<module xmlns="urn:jboss:module:1.9" name="javax.ejb.api">
    <dependencies>
        <module name="javax.inject.api"/>
        <module name="javax.unknown.thing"/>
    </dependencies>
</module>
"#,
    )
    .unwrap();

    rewrite(&mut descriptor, &mapping);

    let names: Vec<_> = descriptor.dependencies().into_iter().map(|d| d.name).collect();
    assert_eq!(descriptor.name(), Some("jakarta.ejb.api"));
    assert_eq!(names, vec!["jakarta.inject.api", "javax.unknown.thing"]);
}

const TEMPLATE: &str = r#"<module xmlns="urn:jboss:module:1.9" name="javax.servlet.api">
    <resources>
        <artifact name="${org.acme:servlet-api}"/>
    </resources>
    <dependencies>
        <module name="javax.inject.api"/>
    </dependencies>
</module>
"#;

fn build_toml(extra: &str) -> String {
    format!(
        r#"
[packaging]
mode = "thin"
templates = "templates"
output = "dist"

[repositories]
local = ["local"]

[versions]
"org.acme:servlet-api" = "org.acme:servlet-api:4.0"
{extra}
"#
    )
}

#[test]
fn thin_pass_references_overridden_transformed_version() {
    let temp = TempDir::new().unwrap();
    publish(&RepositoryLayout::new(temp.path().join("local")), "org.acme:servlet-api:4.0");
    publish(
        &RepositoryLayout::new(temp.path().join("provisioning")),
        "org.acme:servlet-api:4.0-ee9",
    );
    write(temp.path(), "templates/javax/servlet/api/main/module.xml", TEMPLATE);
    write(temp.path(), "patches/servlet-api-4.0.jar", "patched");
    let text = build_toml(
        r#"
[transform]
tool = "unused"

[overrides]
"org.acme:servlet-api:4.0" = "patches/servlet-api-4.0.jar"
"#,
    )
    .replace("local = [\"local\"]", "local = [\"local\"]\nprovisioning = \"provisioning\"");
    let config = parse_build_config(&text, temp.path(), &temp.path().join("build.toml")).unwrap();
    assert_eq!(config.engine.mode, PackagingMode::Thin);
    let transformer = CountingTransformer::new();

    let summary = provision_with(&config, Box::new(transformer.clone())).unwrap();

    assert_eq!(transformer.calls(), 0);
    assert_eq!(summary.report.count(InstallAction::Referenced), 1);
    let descriptor = ModuleDescriptor::read(
        &temp.path().join("dist/modules/javax/servlet/api/main/module.xml"),
    )
    .unwrap();
    assert_eq!(descriptor.artifact_names(), vec!["org.acme:servlet-api:4.0-ee9"]);
    let report = fs::read_to_string(&summary.report_path).unwrap();
    assert!(report.contains("\"referenced\""));
}

#[test]
fn malformed_template_aborts_the_pass() {
    let temp = TempDir::new().unwrap();
    publish(&RepositoryLayout::new(temp.path().join("local")), "org.acme:servlet-api:4.0");
    write(temp.path(), "templates/broken/main/module.xml", "<module name=\"x\"><resources>");
    let config = parse_build_config(&build_toml(""), temp.path(), &temp.path().join("build.toml"))
        .unwrap();

    let err = provision_with(&config, Box::new(CountingTransformer::new())).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<PackagingError>(),
        Some(PackagingError::DescriptorParse { .. })
    ));
    assert!(!temp.path().join("dist/modules").exists());
}

#[cfg(unix)]
#[test]
fn fat_pass_with_external_transformer() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    publish(&RepositoryLayout::new(temp.path().join("local")), "org.acme:servlet-api:4.0");
    write(temp.path(), "templates/javax/servlet/api/main/module.xml", TEMPLATE);
    let script = temp.path().join("transform.sh");
    fs::write(&script, "#!/bin/sh\nfor out; do :; done\nprintf 'jakarta' > \"$out\"\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    let text = build_toml("[transform]\nenabled = true\ntool = \"unused\"\n")
        .replace("mode = \"thin\"", "mode = \"fat\"");
    let config = parse_build_config(&text, temp.path(), &temp.path().join("build.toml")).unwrap();
    let transformer = CommandTransformer::new(script.to_string_lossy(), Vec::new());

    let summary = provision_with(&config, Box::new(transformer)).unwrap();

    let module_dir = temp.path().join("dist/modules/jakarta/servlet/api/main");
    assert_eq!(
        fs::read_to_string(module_dir.join("servlet-api-4.0-ee9.jar")).unwrap(),
        "jakarta"
    );
    let descriptor = ModuleDescriptor::read(&module_dir.join("module.xml")).unwrap();
    assert_eq!(descriptor.name(), Some("jakarta.servlet.api"));
    assert_eq!(descriptor.dependencies()[0].name, "jakarta.inject.api");
    assert_eq!(
        summary.report.artifacts[0].path.as_deref(),
        Some(module_dir.join("servlet-api-4.0-ee9.jar").as_path())
    );
    let walk = summary.walk.unwrap();
    assert_eq!(walk.descriptors_rewritten, 1);
    assert!(!temp.path().join("dist/modules/javax").exists());
}
