//! Preprocessing: turns the traverser's flat file list into the initial
//! candidate groups the shredder refines.
//!
//! Order of operations: digest-cache and xattr ingestion, hardlink
//! clustering, size (and optional name) bucketing, singleton pruning,
//! and the tagged/untagged match filters.

use log::debug;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::Ordering as AtomicOrdering;

use crate::cfg::Cfg;
use crate::session::Session;
use crate::types::{Classification, FileRecord};
use crate::xattr;

pub struct PreprocessOutput {
    /// Seed groups; every group has at least two members of equal size.
    pub groups: Vec<Vec<FileRecord>>,
    /// Files classified UNIQUE right here (singletons, unreportable
    /// groups). The tree merger needs them as promotion vetoes.
    pub uniques: Vec<FileRecord>,
}

pub fn preprocess(session: &Session, files: Vec<FileRecord>) -> PreprocessOutput {
    let cfg = &session.cfg;

    let mut files = files;
    ingest_cached_digests(session, &mut files);
    let representatives = cluster_hardlinks(files, cfg);
    let buckets = bucket_by_key(representatives, cfg);

    let mut groups = Vec::new();
    let mut uniques = Vec::new();
    for (_, mut members) in buckets {
        if members.len() < 2 || !group_is_reportable(&members, cfg) {
            for mut rec in members.drain(..) {
                rec.state = Classification::Unique;
                uniques.push(rec);
            }
            continue;
        }
        groups.push(members);
    }

    session
        .counters
        .unique_files
        .fetch_add(uniques.len() as u64, AtomicOrdering::Relaxed);
    debug!(
        "preprocess: {} groups, {} early uniques",
        groups.len(),
        uniques.len()
    );
    PreprocessOutput { groups, uniques }
}

/// Attach final digests from the sidecar cache or from xattrs. Only
/// valid when the whole file is hashed; a clamp range changes what the
/// digest covers.
fn ingest_cached_digests(session: &Session, files: &mut [FileRecord]) {
    let cfg = &session.cfg;
    if !cfg.clamp.is_default() {
        return;
    }
    let cache = session.cache.lock().unwrap();
    let mut hits = 0usize;
    for rec in files.iter_mut() {
        rec.cached_digest = cache
            .lookup(&rec.path, cfg.algorithm, rec.size, rec.mtime)
            .or_else(|| {
                if cfg.xattr_read {
                    xattr::read_cached_digest(&rec.path, cfg.algorithm, rec.size, rec.mtime)
                } else {
                    None
                }
            });
        if rec.cached_digest.is_some() {
            hits += 1;
        }
    }
    if hits > 0 {
        debug!("digest cache: {} hit(s)", hits);
    }
}

/// Collapse files sharing (device, inode) into one representative that
/// carries the rest as followers. Only the representative is read.
fn cluster_hardlinks(files: Vec<FileRecord>, cfg: &Cfg) -> Vec<FileRecord> {
    let mut clusters: HashMap<(u64, u64), Vec<FileRecord>> = HashMap::new();
    for rec in files {
        clusters.entry((rec.dev, rec.inode)).or_default().push(rec);
    }

    clusters
        .into_values()
        .map(|mut cluster| {
            cluster.sort_by(|a, b| original_cmp(a, b, cfg));
            let mut rep = cluster.remove(0);
            rep.hardlinks = cluster;
            rep
        })
        .collect()
}

#[derive(Hash, PartialEq, Eq)]
struct GroupKey {
    size: u64,
    basename: Option<String>,
    extension: Option<String>,
    stem: Option<String>,
}

fn bucket_by_key(files: Vec<FileRecord>, cfg: &Cfg) -> HashMap<GroupKey, Vec<FileRecord>> {
    let mut buckets: HashMap<GroupKey, Vec<FileRecord>> = HashMap::new();
    for rec in files {
        let key = GroupKey {
            size: rec.size,
            basename: cfg.match_basename.then(|| rec.basename()),
            extension: cfg.match_extension.then(|| {
                rec.path
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_default()
            }),
            stem: cfg.match_without_extension.then(|| {
                rec.path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            }),
        };
        buckets.entry(key).or_default().push(rec);
    }
    buckets
}

/// Can this group still produce at least one original/duplicate pair
/// under the tag matrix? Checked at seeding and again after every split.
pub fn group_is_reportable(members: &[FileRecord], cfg: &Cfg) -> bool {
    if members.len() < 2 {
        return false;
    }
    let tagged = members.iter().filter(|m| m.preferred).count();
    let untagged = members.len() - tagged;
    if cfg.must_match_tagged && tagged == 0 {
        return false;
    }
    if cfg.must_match_untagged && untagged == 0 {
        return false;
    }
    // If every member is protected, nothing could ever be reported as a
    // removable duplicate.
    if cfg.keep_all_tagged && untagged == 0 {
        return false;
    }
    if cfg.keep_all_untagged && tagged == 0 {
        return false;
    }
    true
}

/// Whether a resolved member is shielded from being reported as a
/// duplicate by the keep-all flags.
pub fn is_kept(rec: &FileRecord, cfg: &Cfg) -> bool {
    (cfg.keep_all_tagged && rec.preferred) || (cfg.keep_all_untagged && !rec.preferred)
}

/// Original-selection order: the configured criteria string applied
/// lexicographically. Lowercase ascending, uppercase descending. The
/// preferred flag dominates whenever the tag matrix is active.
pub fn original_cmp(a: &FileRecord, b: &FileRecord, cfg: &Cfg) -> Ordering {
    let dominated = cfg.must_match_tagged || cfg.keep_all_tagged;
    let prefix = if dominated && !cfg.sort_criteria.starts_with(['p', 'P']) {
        Some('p')
    } else {
        None
    };
    for c in prefix.into_iter().chain(cfg.sort_criteria.chars()) {
        let ord = match c {
            'a' => a.path.cmp(&b.path),
            'A' => b.path.cmp(&a.path),
            'm' => a.mtime.cmp(&b.mtime),
            'M' => b.mtime.cmp(&a.mtime),
            'p' => b.preferred.cmp(&a.preferred),
            'P' => a.preferred.cmp(&b.preferred),
            _ => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    // Stable fallback so the chosen original never depends on traversal
    // order.
    a.root_index
        .cmp(&b.root_index)
        .then_with(|| a.path.cmp(&b.path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Classification;
    use std::path::PathBuf;

    fn rec(path: &str, size: u64, mtime: i64, preferred: bool) -> FileRecord {
        FileRecord {
            path: PathBuf::from(path),
            dev: 1,
            inode: path.len() as u64,
            size,
            mtime,
            depth: 1,
            root_index: 0,
            preferred,
            read_offset: 0,
            state: Classification::Pending,
            cached_digest: None,
            hardlinks: Vec::new(),
        }
    }

    #[test]
    fn alphabetic_criteria() {
        let mut cfg = Cfg::default();
        cfg.sort_criteria = "a".to_string();
        let a = rec("/a/x", 1, 10, false);
        let b = rec("/b/x", 1, 5, false);
        assert_eq!(original_cmp(&a, &b, &cfg), Ordering::Less);
        cfg.sort_criteria = "A".to_string();
        assert_eq!(original_cmp(&a, &b, &cfg), Ordering::Greater);
    }

    #[test]
    fn preferred_dominates_under_tag_matrix() {
        let mut cfg = Cfg::default();
        cfg.sort_criteria = "a".to_string();
        cfg.must_match_tagged = true;
        let a = rec("/a/x", 1, 10, false);
        let b = rec("/z/x", 1, 10, true);
        // Preferred /z/x sorts first despite alphabetic criteria.
        assert_eq!(original_cmp(&a, &b, &cfg), Ordering::Greater);
    }

    #[test]
    fn mtime_criteria_prefers_oldest() {
        let mut cfg = Cfg::default();
        cfg.sort_criteria = "m".to_string();
        let old = rec("/b/x", 1, 5, false);
        let new = rec("/a/x", 1, 10, false);
        assert_eq!(original_cmp(&old, &new, &cfg), Ordering::Less);
    }

    #[test]
    fn unreportable_groups_are_filtered() {
        let mut cfg = Cfg::default();
        cfg.must_match_tagged = true;
        let members = vec![rec("/a/x", 1, 0, false), rec("/b/x", 1, 0, false)];
        assert!(!group_is_reportable(&members, &cfg));

        let members = vec![rec("/a/x", 1, 0, false), rec("/b/x", 1, 0, true)];
        assert!(group_is_reportable(&members, &cfg));

        cfg = Cfg::default();
        cfg.keep_all_tagged = true;
        let members = vec![rec("/a/x", 1, 0, true), rec("/b/x", 1, 0, true)];
        assert!(!group_is_reportable(&members, &cfg));
    }
}
