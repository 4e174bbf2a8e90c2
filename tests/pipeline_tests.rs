//! End-to-end pipeline tests over real fixture trees in the system
//! temp directory. Output is collected through the json formatter and
//! inspected as values.

use anyhow::Result;
use scour::cfg::{Cfg, ClampSpec, OutputSpec};
use scour::types::RootPath;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

fn fixture_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("scour_it_{}_{}", std::process::id(), name));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_file(path: &Path, contents: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn cfg_for(roots: &[&Path]) -> Cfg {
    let mut cfg = Cfg::default();
    cfg.roots = roots
        .iter()
        .enumerate()
        .map(|(index, path)| RootPath {
            path: fs::canonicalize(path).unwrap(),
            preferred: false,
            index,
        })
        .collect();
    cfg
}

/// Run a scan and return the json items written by the json formatter.
fn run_and_collect(mut cfg: Cfg, out_tag: &str) -> Result<Vec<Value>> {
    let out = std::env::temp_dir().join(format!(
        "scour_it_{}_{}.json",
        std::process::id(),
        out_tag
    ));
    let _ = fs::remove_file(&out);
    cfg.outputs = vec![OutputSpec {
        formatter: "json".to_string(),
        path: out.to_string_lossy().into_owned(),
    }];
    scour::run(cfg, "test")?;
    let raw = fs::read_to_string(&out)?;
    let items: Vec<Value> = serde_json::from_str(&raw)?;
    let _ = fs::remove_file(&out);
    Ok(items)
}

fn items_of_type<'a>(items: &'a [Value], kind: &str) -> Vec<&'a Value> {
    items
        .iter()
        .filter(|v| v["type"].as_str() == Some(kind))
        .collect()
}

fn paths_of<'a>(items: &[&'a Value]) -> Vec<String> {
    items
        .iter()
        .map(|v| v["path"].as_str().unwrap_or("").to_string())
        .collect()
}

fn summary_field(items: &[Value], field: &str) -> u64 {
    items_of_type(items, "summary")
        .first()
        .and_then(|s| s[field].as_u64())
        .unwrap_or(u64::MAX)
}

// --- S1: three identical files ---

#[test]
fn s1_three_identical_files() {
    let root = fixture_dir("s1");
    write_file(&root.join("a/x"), b"hello");
    write_file(&root.join("b/x"), b"hello");
    write_file(&root.join("c/x"), b"hello");

    let items = run_and_collect(cfg_for(&[&root]), "s1").unwrap();
    let dups = items_of_type(&items, "duplicate_file");
    assert_eq!(dups.len(), 3);

    let originals: Vec<_> = dups
        .iter()
        .filter(|d| d["is_original"].as_bool() == Some(true))
        .collect();
    assert_eq!(originals.len(), 1);
    // Default criteria fall through to path order: a/x wins.
    assert!(
        originals[0]["path"]
            .as_str()
            .unwrap()
            .ends_with("a/x")
    );
    assert_eq!(summary_field(&items, "dup_files"), 2);
    assert_eq!(summary_field(&items, "dup_groups"), 1);

    let _ = fs::remove_dir_all(root);
}

// --- S2: same size, different content ---

#[test]
fn s2_same_size_different_content() {
    let root = fixture_dir("s2");
    let a: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();
    let b: Vec<u8> = (0..1024u32).map(|i| (i % 241) as u8).collect();
    write_file(&root.join("a.bin"), &a);
    write_file(&root.join("b.bin"), &b);

    let items = run_and_collect(cfg_for(&[&root]), "s2").unwrap();
    assert!(items_of_type(&items, "duplicate_file").is_empty());
    // One round of 1024 bytes per file settles it.
    assert_eq!(summary_field(&items, "bytes_read"), 2048);

    let _ = fs::remove_dir_all(root);
}

// --- S3: duplicate directory ---

#[test]
fn s3_duplicate_directory() {
    let root = fixture_dir("s3");
    for (name, content) in [("a", "alpha"), ("b", "beta"), ("c", "gamma")] {
        write_file(&root.join("left").join(name), content.as_bytes());
        write_file(&root.join("right").join(name), content.as_bytes());
    }

    let mut cfg = cfg_for(&[&root]);
    cfg.lint.duplicate_dirs = true;
    let items = run_and_collect(cfg, "s3").unwrap();

    let dirs = items_of_type(&items, "duplicate_dir");
    assert_eq!(dirs.len(), 2);
    let dir_paths = paths_of(&dirs);
    assert!(dir_paths[0].ends_with("left"));
    assert!(dir_paths[1].ends_with("right"));
    assert_eq!(dirs[0]["is_original"].as_bool(), Some(true));
    assert_eq!(dirs[1]["is_original"].as_bool(), Some(false));

    // The directory finding subsumes every per-file report.
    assert!(items_of_type(&items, "duplicate_file").is_empty());
    assert_eq!(summary_field(&items, "dup_dirs"), 1);

    let _ = fs::remove_dir_all(root);
}

// --- S4: hardlinks ---

#[cfg(unix)]
#[test]
fn s4_hardlinks() {
    let root = fixture_dir("s4");
    write_file(&root.join("a/x"), b"same bytes");
    fs::hard_link(root.join("a/x"), root.join("a/y")).unwrap();
    write_file(&root.join("b/x"), b"same bytes");

    // Default: hardlinks are not reported.
    let items = run_and_collect(cfg_for(&[&root]), "s4a").unwrap();
    let dups = items_of_type(&items, "duplicate_file");
    let mut got = paths_of(&dups);
    got.sort();
    assert_eq!(got.len(), 2);
    assert!(got[0].ends_with("a/x"));
    assert!(got[1].ends_with("b/x"));

    // --hardlinked: the follower shows up too.
    let mut cfg = cfg_for(&[&root]);
    cfg.find_hardlinked_dupes = true;
    let items = run_and_collect(cfg, "s4b").unwrap();
    let dups = items_of_type(&items, "duplicate_file");
    assert_eq!(dups.len(), 3);

    let _ = fs::remove_dir_all(root);
}

// --- S5: clamp ---

#[test]
fn s5_clamp_skips_leading_difference() {
    let root = fixture_dir("s5");
    let mut a = vec![0u8; 1024 * 1024];
    let mut b = vec![0u8; 1024 * 1024];
    for i in 0..(1024 * 1024) {
        let fill = (i % 253) as u8;
        a[i] = fill;
        b[i] = fill;
    }
    for i in 0..4096 {
        a[i] = 0xaa;
        b[i] = 0x55;
    }
    write_file(&root.join("a.bin"), &a);
    write_file(&root.join("b.bin"), &b);

    // Default clamp: the leading 4 KiB differ, so no duplicates.
    let items = run_and_collect(cfg_for(&[&root]), "s5a").unwrap();
    assert!(items_of_type(&items, "duplicate_file").is_empty());

    // Clamp away the first 5%: the remainder is identical.
    let mut cfg = cfg_for(&[&root]);
    cfg.clamp.start = ClampSpec::Factor(0.05);
    let items = run_and_collect(cfg, "s5b").unwrap();
    assert_eq!(items_of_type(&items, "duplicate_file").len(), 2);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn clamp_start_at_size_makes_everything_unique() {
    let root = fixture_dir("clamp_all");
    write_file(&root.join("a"), b"identical");
    write_file(&root.join("b"), b"identical");

    let mut cfg = cfg_for(&[&root]);
    cfg.clamp.start = ClampSpec::Factor(1.0);
    let items = run_and_collect(cfg, "clamp_all").unwrap();
    assert!(items_of_type(&items, "duplicate_file").is_empty());
    assert_eq!(summary_field(&items, "bytes_read"), 0);

    let _ = fs::remove_dir_all(root);
}

// --- S6: cache round trip ---

#[test]
fn s6_cache_second_run_reads_nothing() {
    let root = fixture_dir("s6");
    write_file(&root.join("a/x"), b"cache me if you can");
    write_file(&root.join("b/x"), b"cache me if you can");
    let cache = root.join("cache.json");

    let mut cfg = cfg_for(&[&root]);
    cfg.cache_paths = vec![cache.clone()];
    // The cache file must not look like scannable content.
    cfg.min_size = 1;
    cfg.max_size = 64;

    let items = run_and_collect(cfg.clone(), "s6a").unwrap();
    assert_eq!(items_of_type(&items, "duplicate_file").len(), 2);
    assert!(summary_field(&items, "bytes_read") > 0);
    assert!(cache.is_file());

    let items = run_and_collect(cfg, "s6b").unwrap();
    assert_eq!(items_of_type(&items, "duplicate_file").len(), 2);
    assert_eq!(summary_field(&items, "bytes_read"), 0);

    let _ = fs::remove_dir_all(root);
}

// --- deterministic original selection ---

#[test]
fn original_selection_is_deterministic() {
    let root = fixture_dir("determinism");
    for name in ["q/f", "p/f", "r/f"] {
        write_file(&root.join(name), b"spin me round");
    }
    let mut first_original = None;
    for round in 0..3 {
        let mut cfg = cfg_for(&[&root]);
        cfg.sort_criteria = "a".to_string();
        let items = run_and_collect(cfg, &format!("det{}", round)).unwrap();
        let dups = items_of_type(&items, "duplicate_file");
        let original = dups
            .iter()
            .find(|d| d["is_original"].as_bool() == Some(true))
            .map(|d| d["path"].as_str().unwrap().to_string())
            .unwrap();
        match &first_original {
            None => first_original = Some(original),
            Some(expected) => assert_eq!(&original, expected),
        }
    }
    assert!(first_original.unwrap().ends_with("p/f"));

    let _ = fs::remove_dir_all(root);
}

// --- preferred roots ---

#[test]
fn preferred_root_wins_original_selection() {
    let keep = fixture_dir("pref_keep");
    let scratch = fixture_dir("pref_scratch");
    write_file(&scratch.join("z"), b"twin content");
    write_file(&keep.join("z"), b"twin content");

    let mut cfg = cfg_for(&[&scratch, &keep]);
    cfg.roots[1].preferred = true;
    let items = run_and_collect(cfg, "pref").unwrap();
    let dups = items_of_type(&items, "duplicate_file");
    let original = dups
        .iter()
        .find(|d| d["is_original"].as_bool() == Some(true))
        .unwrap();
    // "pma" puts the preferred root first even though scratch sorts
    // earlier by path.
    assert!(original["path"].as_str().unwrap().starts_with(
        fs::canonicalize(&keep).unwrap().to_str().unwrap()
    ));

    let _ = fs::remove_dir_all(keep);
    let _ = fs::remove_dir_all(scratch);
}

// --- empty files and dirs ---

#[test]
fn empty_files_and_nested_empty_dirs() {
    let root = fixture_dir("empties");
    write_file(&root.join("content.txt"), b"not empty");
    write_file(&root.join("hollow.txt"), b"");
    fs::create_dir_all(root.join("void/inner")).unwrap();

    let items = run_and_collect(cfg_for(&[&root]), "empties").unwrap();

    let empty_files = items_of_type(&items, "empty_file");
    assert_eq!(paths_of(&empty_files).len(), 1);
    assert!(paths_of(&empty_files)[0].ends_with("hollow.txt"));

    // A dir whose only content is an empty dir is itself empty.
    let empty_dirs = items_of_type(&items, "empty_dir");
    let dir_paths = paths_of(&empty_dirs);
    assert_eq!(dir_paths.len(), 2);
    assert!(dir_paths.iter().any(|p| p.ends_with("void")));
    assert!(dir_paths.iter().any(|p| p.ends_with("void/inner")));

    let _ = fs::remove_dir_all(root);
}

// --- broken symlinks ---

#[cfg(unix)]
#[test]
fn broken_symlink_is_lint() {
    let root = fixture_dir("symlinks");
    write_file(&root.join("target.txt"), b"here");
    std::os::unix::fs::symlink(root.join("gone"), root.join("dangling")).unwrap();
    std::os::unix::fs::symlink(root.join("target.txt"), root.join("fine")).unwrap();

    let items = run_and_collect(cfg_for(&[&root]), "symlinks").unwrap();
    let broken = items_of_type(&items, "broken_symlink");
    assert_eq!(broken.len(), 1);
    assert!(paths_of(&broken)[0].ends_with("dangling"));

    let _ = fs::remove_dir_all(root);
}

// --- partition completeness ---

#[test]
fn every_candidate_gets_exactly_one_classification() {
    let root = fixture_dir("partition");
    write_file(&root.join("dup1"), b"pair");
    write_file(&root.join("dup2"), b"pair");
    write_file(&root.join("lonely"), b"one of a kind");
    write_file(&root.join("sized"), b"same len!!!!!");

    let items = run_and_collect(cfg_for(&[&root]), "partition").unwrap();
    let dups = items_of_type(&items, "duplicate_file");
    assert_eq!(dups.len(), 2);
    let summary = items_of_type(&items, "summary");
    let total = summary[0]["total_files"].as_u64().unwrap();
    let dup_files = summary[0]["dup_files"].as_u64().unwrap();
    let rejected = summary[0]["rejected"].as_u64().unwrap();
    // 4 candidates: 1 original + 1 duplicate + 2 uniques, none rejected.
    assert_eq!(total, 4);
    assert_eq!(dup_files, 1);
    assert_eq!(rejected, 0);

    let _ = fs::remove_dir_all(root);
}

// --- match-basename filter ---

#[test]
fn match_basename_splits_twins_with_different_names() {
    let root = fixture_dir("basename");
    write_file(&root.join("a/notes.txt"), b"same text");
    write_file(&root.join("b/notes.txt"), b"same text");
    write_file(&root.join("c/other.txt"), b"same text");

    let mut cfg = cfg_for(&[&root]);
    cfg.match_basename = true;
    let items = run_and_collect(cfg, "basename").unwrap();
    let dups = items_of_type(&items, "duplicate_file");
    let got = paths_of(&dups);
    assert_eq!(got.len(), 2);
    assert!(got.iter().all(|p| p.ends_with("notes.txt")));

    let _ = fs::remove_dir_all(root);
}
