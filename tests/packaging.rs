//! End-to-end packaging scenarios: real directories and jars in, a jar out.

use shade::archive::{write_jar, ArchiveSource, Entry};
use shade::classfile::fixture::class_bytes;
use shade::classfile::ClassFile;
use shade::config::ShadeConfig;
use shade::inspect;
use shade::packager::{DuplicatePolicy, PackOptions, Packager};
use shade::relocation::{RelocationSpec, Relocator};
use shade::ShadeError;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (path, data) in files {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, data).unwrap();
    }
}

fn write_lib(path: &Path, files: &[(&str, &[u8])]) -> PathBuf {
    let entries: Vec<Entry> = files.iter().map(|(p, d)| Entry::new(*p, d.to_vec())).collect();
    write_jar(path, &entries).unwrap();
    path.to_path_buf()
}

fn entry_names(jar: &Path) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(fs::File::open(jar).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

fn read_entry(jar: &Path, name: &str) -> Vec<u8> {
    let entries = ArchiveSource::open("out", jar).unwrap().read_entries().unwrap();
    entries.into_iter().find(|e| e.path == name).unwrap().data
}

fn relocate(from: &str, to: &str) -> PackOptions {
    PackOptions {
        relocations: vec![RelocationSpec::new(from, to)],
        ..Default::default()
    }
}

#[test]
fn relocated_class_references_relocated_class() {
    let temp = TempDir::new().unwrap();
    let classes = temp.path().join("classes");
    let c = class_bytes(65, "a/b/C", &["a/b/D"], &["a.b.D"]);
    let d = class_bytes(65, "a/b/D", &[], &[]);
    write_tree(&classes, &[("a/b/C.class", &c), ("a/b/D.class", &d)]);

    let output = temp.path().join("out.jar");
    let sources = vec![ArchiveSource::open("classes", &classes).unwrap()];
    Packager::new(&relocate("a.b", "x.y"))
        .unwrap()
        .package(&sources, &output)
        .unwrap();

    assert_eq!(entry_names(&output), vec!["x/y/C.class", "x/y/D.class"]);

    let data = read_entry(&output, "x/y/C.class");
    let class = ClassFile::parse("x/y/C.class", &data).unwrap();
    assert!(class.class_references().contains(&"x/y/D".to_string()));

    let detector = Relocator::detector(&["a.b".to_string()]).unwrap();
    assert!(inspect::find_leftovers(&output, &detector).unwrap().is_empty());
}

#[test]
fn resource_lookups_and_versioned_classes_follow_relocation() {
    let temp = TempDir::new().unwrap();
    let lib = write_lib(
        &temp.path().join("lib.jar"),
        &[
            ("a/b/C.class", &class_bytes(52, "a/b/C", &[], &["/a/b/config.yml"])),
            ("a/b/config.yml", b"enabled: true\n"),
            ("META-INF/versions/11/a/b/C.class", &class_bytes(55, "a/b/C", &[], &[])),
        ],
    );

    let output = temp.path().join("out.jar");
    let sources = vec![ArchiveSource::open("lib.jar", &lib).unwrap()];
    Packager::new(&relocate("a.b", "x.y"))
        .unwrap()
        .package(&sources, &output)
        .unwrap();

    assert_eq!(
        entry_names(&output),
        vec![
            "x/y/C.class",
            "x/y/config.yml",
            "META-INF/versions/11/x/y/C.class"
        ]
    );
    let class_bytes = read_entry(&output, "x/y/C.class");
    let class = ClassFile::parse("x/y/C.class", &class_bytes).unwrap();
    assert!(class
        .utf8_constants()
        .any(|constant| constant == b"/x/y/config.yml"));

    let detector = Relocator::detector(&["a.b".to_string()]).unwrap();
    assert!(inspect::find_leftovers(&output, &detector).unwrap().is_empty());
}

#[test]
fn meta_inf_exclusion_applies_to_every_input() {
    let temp = TempDir::new().unwrap();
    let one = write_lib(
        &temp.path().join("one.jar"),
        &[("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n"), ("one/A.txt", b"a")],
    );
    let two = write_lib(
        &temp.path().join("two.jar"),
        &[("META-INF/MANIFEST.MF", b"Manifest-Version: 2.0\n"), ("two/B.txt", b"b")],
    );

    let options = PackOptions {
        exclusions: vec!["META-INF/**".to_string()],
        ..Default::default()
    };
    let output = temp.path().join("out.jar");
    let sources = vec![
        ArchiveSource::open("one", &one).unwrap(),
        ArchiveSource::open("two", &two).unwrap(),
    ];
    let report = Packager::new(&options).unwrap().package(&sources, &output).unwrap();

    assert_eq!(entry_names(&output), vec!["one/A.txt", "two/B.txt"]);
    assert_eq!(report.exclusions[0].matched, 2);
    assert!(report.warnings.is_empty());
}

#[test]
fn compile_only_dependencies_are_not_packaged() {
    let temp = TempDir::new().unwrap();
    write_tree(
        &temp.path().join("build/classes"),
        &[("com/example/Plugin.class", &class_bytes(65, "com/example/Plugin", &[], &[]))],
    );
    fs::create_dir_all(temp.path().join("repo")).unwrap();

    // Neither compile-only coordinate exists in the repository
    let toml = r#"
[project]
name = "Test"
version = "1.0.0"

[repositories]
local = ["repo"]

[[dependency]]
coordinate = "io.papermc.paper:paper-api:1.21.4-R0.1-SNAPSHOT"
scope = "compile-only"

[[dependency]]
coordinate = "org.jetbrains:annotations:26.0.2"
scope = "compile-only"
"#;
    let config = ShadeConfig::parse(toml).unwrap();
    let report = config.plan(temp.path()).unwrap().execute().unwrap();

    assert_eq!(report.output, temp.path().join("build/libs/Test-1.0.0-all.jar"));
    assert_eq!(report.inputs.len(), 1);
    assert_eq!(entry_names(&report.output), vec!["com/example/Plugin.class"]);
}

#[test]
fn bundled_dependency_is_resolved_and_relocated() {
    let temp = TempDir::new().unwrap();
    write_tree(
        &temp.path().join("build/classes"),
        &[(
            "org/crashvibe/Plugin.class",
            &class_bytes(65, "org/crashvibe/Plugin", &["org/bstats/bukkit/Metrics"], &[]),
        )],
    );
    write_tree(
        &temp.path().join("src/main/resources"),
        &[("paper-plugin.yml", b"name: ${name}\nversion: '${version}'\napi: ${api}\n")],
    );
    let metrics = class_bytes(52, "org/bstats/bukkit/Metrics", &[], &[]);
    write_lib(
        &temp
            .path()
            .join("repo/org/bstats/bstats-bukkit/3.1.0/bstats-bukkit-3.1.0.jar"),
        &[
            ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n"),
            ("org/bstats/bukkit/Metrics.class", &metrics),
        ],
    );

    let toml = r#"
[project]
name = "FGateClient"
group = "org.crashvibe"
version = "0.0.1"

[toolchain]
java = 21

[build]
archive_name = "${name}-Modern-${version}.${ext}"

[resources]
dir = "src/main/resources"
expand = ["paper-plugin.yml"]
[resources.properties]
api = "1.21"

[repositories]
local = ["repo"]

[[dependency]]
coordinate = "org.bstats:bstats-bukkit:3.1.0"

[shadow]
exclude = ["META-INF/**"]
[[shadow.relocate]]
from = "org.bstats"
to = "${group}.libs.bstats"
"#;
    let config = ShadeConfig::parse(toml).unwrap();
    let report = config.plan(temp.path()).unwrap().execute().unwrap();

    assert_eq!(
        report.output,
        temp.path().join("build/libs/FGateClient-Modern-0.0.1.jar")
    );
    assert_eq!(
        entry_names(&report.output),
        vec![
            "org/crashvibe/Plugin.class",
            "paper-plugin.yml",
            "org/crashvibe/libs/bstats/bukkit/Metrics.class",
        ]
    );
    assert_eq!(
        read_entry(&report.output, "paper-plugin.yml"),
        b"name: FGateClient\nversion: '0.0.1'\napi: 1.21\n"
    );

    let plugin = read_entry(&report.output, "org/crashvibe/Plugin.class");
    let class = ClassFile::parse("Plugin.class", &plugin).unwrap();
    assert!(class
        .class_references()
        .contains(&"org/crashvibe/libs/bstats/bukkit/Metrics".to_string()));
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
}

#[test]
fn unchanged_inputs_produce_identical_artifacts() {
    let temp = TempDir::new().unwrap();
    let classes = temp.path().join("classes");
    write_tree(
        &classes,
        &[
            ("a/b/C.class", &class_bytes(65, "a/b/C", &["a/b/D"], &[])),
            ("a/b/D.class", &class_bytes(65, "a/b/D", &[], &[])),
            ("plugin.yml", b"main: a.b.C\n"),
        ],
    );
    let sources = vec![ArchiveSource::open("classes", &classes).unwrap()];
    let packager = Packager::new(&relocate("a.b", "x.y")).unwrap();

    let output = temp.path().join("out.jar");
    let first = packager.package(&sources, &output).unwrap();
    let first_bytes = fs::read(&output).unwrap();
    let second = packager.package(&sources, &output).unwrap();

    assert_eq!(first_bytes, fs::read(&output).unwrap());
    assert_eq!(first.sha256, second.sha256);
}

#[test]
fn stale_rules_warn_but_build_succeeds() {
    let temp = TempDir::new().unwrap();
    let classes = temp.path().join("classes");
    write_tree(&classes, &[("plugin.yml", b"name: Test\n")]);

    let options = PackOptions {
        relocations: vec![RelocationSpec::new("com.tcoded.folialib", "org.crashvibe.libs.bstats")],
        exclusions: vec!["META-INF/**".to_string()],
        ..Default::default()
    };
    let output = temp.path().join("out.jar");
    let sources = vec![ArchiveSource::open("classes", &classes).unwrap()];
    let report = Packager::new(&options).unwrap().package(&sources, &output).unwrap();

    assert!(output.is_file());
    assert_eq!(report.relocations[0].entries, 0);
    assert_eq!(report.exclusions[0].matched, 0);
    assert_eq!(report.warnings.len(), 2);
}

#[test]
fn dangling_reference_aborts_without_output() {
    let temp = TempDir::new().unwrap();
    let classes = temp.path().join("classes");
    write_tree(
        &classes,
        &[("a/b/C.class", &class_bytes(65, "a/b/C", &["a/b/Gone"], &[]))],
    );

    let output = temp.path().join("out.jar");
    let sources = vec![ArchiveSource::open("classes", &classes).unwrap()];
    let err = Packager::new(&relocate("a.b", "x.y"))
        .unwrap()
        .package(&sources, &output)
        .unwrap_err();

    assert!(matches!(err, ShadeError::DanglingReference { .. }));
    let msg = err.to_string();
    assert!(msg.contains("x/y/C.class"));
    assert!(msg.contains("x/y/Gone"));
    assert!(!output.exists());
}

#[test]
fn duplicate_policy_controls_conflicts() {
    let temp = TempDir::new().unwrap();
    let one = write_lib(&temp.path().join("one.jar"), &[("config.yml", b"from: one\n")]);
    let two = write_lib(&temp.path().join("two.jar"), &[("config.yml", b"from: two\n")]);
    let sources = vec![
        ArchiveSource::open("one.jar", &one).unwrap(),
        ArchiveSource::open("two.jar", &two).unwrap(),
    ];
    let output = temp.path().join("out.jar");

    let err = Packager::new(&PackOptions::default())
        .unwrap()
        .package(&sources, &output)
        .unwrap_err();
    assert!(matches!(err, ShadeError::DuplicateEntry { .. }));
    assert!(!output.exists());

    let options = PackOptions {
        duplicates: DuplicatePolicy::LastWins,
        ..Default::default()
    };
    let report = Packager::new(&options).unwrap().package(&sources, &output).unwrap();
    assert_eq!(read_entry(&output, "config.yml"), b"from: two\n");
    assert_eq!(report.duplicates_resolved, 1);
}

#[test]
fn unresolvable_dependency_fails_before_packaging() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("build/classes")).unwrap();
    fs::create_dir_all(temp.path().join("repo")).unwrap();

    let toml = r#"
[project]
name = "Test"
version = "1.0.0"
[repositories]
local = ["repo"]
[[dependency]]
coordinate = "org.java-websocket:Java-WebSocket:1.6.0"
"#;
    let config = ShadeConfig::parse(toml).unwrap();
    let err = config.plan(temp.path()).unwrap_err();
    assert!(matches!(err, ShadeError::UnresolvedDependency { .. }));
    assert!(!temp.path().join("build/libs").exists());
}
