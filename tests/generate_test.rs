use std::fs;
use std::path::Path;

use promconfigmgr::{ConfigGenerator, Document, Fragment, FragmentId, Settings};
use serde_yaml_ng::Value;
use tempfile::TempDir;

const ANNOTATION: &str = "prometheus.io/config";

fn eligible(ns: &str, name: &str) -> Fragment {
    Fragment::new(FragmentId::new(ns, name)).with_annotation(ANNOTATION, "true")
}

fn strings(doc: &Document, key: &str) -> Vec<String> {
    doc.sequence(key)
        .unwrap_or_else(|| panic!("{key} missing"))
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

fn read_output(dir: &Path) -> Document {
    Document::parse(&fs::read_to_string(dir.join("prometheus.yml")).unwrap()).unwrap()
}

/// Every file below `dir`, relative, with its content.
fn tree(dir: &Path) -> Vec<(String, String)> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<(String, String)>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_string_lossy().into_owned();
                out.push((rel, fs::read_to_string(&path).unwrap()));
            }
        }
    }
    let mut out = Vec::new();
    walk(dir, dir, &mut out);
    out.sort();
    out
}

#[test]
fn test_merge_example() {
    let dir = TempDir::new().unwrap();
    let generator = ConfigGenerator::new(dir.path(), &Settings::default());
    let mut base = Document::parse("global:\n  scrape_interval: 15s\n").unwrap();

    let fragment = eligible("ns", "name")
        .with_data("prometheus.yml", "scrape_configs:\n- job_name: a")
        .with_data("extra.rules", "groups: []");

    let report = generator.generate(&mut base, &[fragment]).unwrap();
    assert_eq!(report.fragments, vec![FragmentId::new("ns", "name")]);
    assert_eq!(report.scrape_configs, 1);
    assert_eq!(report.skipped, 0);

    let output = read_output(dir.path());
    assert_eq!(output, base);
    assert_eq!(
        output.keys().collect::<Vec<_>>(),
        vec!["global", "rule_files", "scrape_configs"]
    );
    assert_eq!(
        output.get("global").unwrap()["scrape_interval"],
        Value::String("15s".to_string())
    );
    assert_eq!(strings(&output, "rule_files"), vec!["rule_files/ns/name/extra.rules"]);

    let scrape = output.sequence("scrape_configs").unwrap();
    assert_eq!(scrape.len(), 1);
    assert_eq!(scrape[0]["job_name"], Value::String("a".to_string()));

    assert_eq!(
        fs::read_to_string(dir.path().join("rule_files/ns/name/extra.rules")).unwrap(),
        "groups: []"
    );
}

#[test]
fn test_ineligible_fragments_excluded() {
    let dir = TempDir::new().unwrap();
    let generator = ConfigGenerator::new(dir.path(), &Settings::default());
    let mut base = Document::new();

    let mut fragments = vec![Fragment::new(FragmentId::new("ns", "absent"))];
    for value in ["", "false", "TRUE", "yes"] {
        fragments.push(
            Fragment::new(FragmentId::new("ns", format!("value-{value}")))
                .with_annotation(ANNOTATION, value),
        );
    }
    for fragment in &mut fragments {
        fragment
            .data
            .insert("prometheus.yml".to_string(), "scrape_configs: [{job_name: x}]".to_string());
        fragment
            .data
            .insert("x.rules".to_string(), "groups: []".to_string());
    }

    let report = generator.generate(&mut base, &fragments).unwrap();

    assert!(report.fragments.is_empty());
    assert!(strings(&base, "rule_files").is_empty());
    assert!(base.sequence("scrape_configs").unwrap().is_empty());
    assert!(tree(&dir.path().join("rule_files")).is_empty());
}

#[test]
fn test_generation_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let generator = ConfigGenerator::new(dir.path(), &Settings::default());
    let fragments = vec![
        eligible("b", "two")
            .with_data("prometheus.yml", "scrape_configs:\n- job_name: two\n")
            .with_data("two.rules", "groups: [{name: two}]"),
        eligible("a", "one")
            .with_data("prometheus.yml", "scrape_configs:\n- job_name: one\n")
            .with_data("one.rules", "groups: []")
            .with_data("more.rules", "groups: []"),
    ];

    let mut base = Document::parse("global: {}\nrule_files: [stale.yml]\n").unwrap();
    generator.generate(&mut base, &fragments).unwrap();
    let first_tree = tree(dir.path());

    generator.generate(&mut base, &fragments).unwrap();
    let second_tree = tree(dir.path());

    assert_eq!(first_tree, second_tree);
    assert!(first_tree.iter().any(|(path, _)| path == "prometheus.yml"));
}

#[test]
fn test_stale_files_removed() {
    let dir = TempDir::new().unwrap();
    let generator = ConfigGenerator::new(dir.path(), &Settings::default());
    let mut base = Document::new();

    let kept = eligible("ns", "kept").with_data("kept.rules", "groups: []");
    let dropped = eligible("ns", "F").with_data("rules.yml", "groups: []");

    generator
        .generate(&mut base, &[kept.clone(), dropped.clone()])
        .unwrap();
    assert!(dir.path().join("rule_files/ns/F/rules.yml").exists());

    // Opted out
    let opted_out = dropped.with_annotation(ANNOTATION, "false");
    generator
        .generate(&mut base, &[kept.clone(), opted_out])
        .unwrap();
    assert!(!dir.path().join("rule_files/ns/F/rules.yml").exists());
    assert!(!dir.path().join("rule_files/ns/F").exists());
    assert_eq!(strings(&base, "rule_files"), vec!["rule_files/ns/kept/kept.rules"]);

    // Deleted
    generator.generate(&mut base, &[]).unwrap();
    assert!(!dir.path().join("rule_files/ns/kept/kept.rules").exists());
    assert!(dir.path().join("rule_files").is_dir());
    assert!(strings(&base, "rule_files").is_empty());
}

#[test]
fn test_unparsable_primary_keeps_other_entries() {
    let dir = TempDir::new().unwrap();
    let generator = ConfigGenerator::new(dir.path(), &Settings::default());
    let mut base = Document::new();

    let broken = eligible("ns", "broken")
        .with_data("prometheus.yml", "scrape_configs: [ {job_name: a")
        .with_data("alerts.rules", "groups: []");
    let healthy =
        eligible("ns", "healthy").with_data("prometheus.yml", "scrape_configs:\n- job_name: ok\n");

    let report = generator.generate(&mut base, &[broken, healthy]).unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.fragments.len(), 2);
    assert_eq!(strings(&base, "rule_files"), vec!["rule_files/ns/broken/alerts.rules"]);
    assert!(dir.path().join("rule_files/ns/broken/alerts.rules").exists());

    let scrape = base.sequence("scrape_configs").unwrap();
    assert_eq!(scrape.len(), 1);
    assert_eq!(scrape[0]["job_name"], Value::String("ok".to_string()));
}

#[test]
fn test_lists_concatenate_in_fragment_order() {
    let dir = TempDir::new().unwrap();
    let generator = ConfigGenerator::new(dir.path(), &Settings::default());
    let mut base = Document::parse("scrape_configs:\n- job_name: from-base\n").unwrap();

    let fragments = vec![
        eligible("a", "first")
            .with_data("prometheus.yml", "scrape_configs:\n- job_name: a1\n- job_name: a2\n")
            .with_data("z.rules", "")
            .with_data("b.rules", ""),
        eligible("b", "second").with_data("prometheus.yml", "scrape_configs:\n- job_name: b1\n"),
    ];

    generator.generate(&mut base, &fragments).unwrap();

    let jobs: Vec<_> = base
        .sequence("scrape_configs")
        .unwrap()
        .iter()
        .map(|job| job["job_name"].as_str().unwrap().to_string())
        .collect();
    // The base document's own list is replaced, not extended
    assert_eq!(jobs, vec!["a1", "a2", "b1"]);
    assert_eq!(
        strings(&base, "rule_files"),
        vec!["rule_files/a/first/b.rules", "rule_files/a/first/z.rules"]
    );
}

#[cfg(unix)]
#[test]
fn test_unwritable_target_is_fatal() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let target = dir.path().join("readonly");
    fs::create_dir(&target).unwrap();
    fs::set_permissions(&target, fs::Permissions::from_mode(0o500)).unwrap();

    // Root ignores directory permissions
    if fs::write(target.join("probe"), "").is_ok() {
        return;
    }

    let generator = ConfigGenerator::new(&target, &Settings::default());
    let mut base = Document::new();
    assert!(generator.generate(&mut base, &[]).is_err());

    fs::set_permissions(&target, fs::Permissions::from_mode(0o700)).unwrap();
}
