//! Duplicate-directory detection: a bottom-up fold over the directory
//! forest.
//!
//! Every directory holding at least one file that participates in
//! duplicate detection gets a node. As the shredder resolves files, each
//! confirmation folds `H(name, content-digest)` into the parent with
//! XOR, so the result is independent of resolution order. A node whose
//! descendants are all accounted for is finished; finished nodes that
//! share a fold digest and shelter no unique file are promoted to
//! duplicate directories, and the per-file reports beneath them are
//! suppressed.

use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use crate::session::Session;
use crate::types::{ReportItem, RootPath};

#[derive(Default)]
struct DirNode {
    preferred: bool,
    total_files: usize,
    accounted_files: usize,
    confirmed_files: usize,
    total_dirs: usize,
    finished_dirs: usize,
    /// Confirmed duplicates anywhere below, including subdirs.
    desc_confirmed: usize,
    has_unique: bool,
    fold: [u8; 32],
    finished: bool,
}

/// A resolved duplicate-file group parked until directory merging knows
/// which reports it subsumes.
pub struct HeldGroup {
    pub items: Vec<ReportItem>,
}

pub struct TreeMerger {
    roots: Vec<RootPath>,
    nodes: HashMap<PathBuf, DirNode>,
    held: Vec<HeldGroup>,
}

impl TreeMerger {
    pub fn new(roots: Vec<RootPath>) -> Self {
        TreeMerger {
            roots,
            nodes: HashMap::new(),
            held: Vec::new(),
        }
    }

    /// Record that `path` exists. Non-participating files immediately
    /// count as unique content, vetoing promotion of their ancestors.
    pub fn register_file(&mut self, path: &Path, participating: bool) {
        let Some(parent) = self.ensure_chain(path) else {
            return;
        };
        let Some(node) = self.nodes.get_mut(&parent) else {
            return;
        };
        node.total_files += 1;
        if !participating {
            node.has_unique = true;
            node.accounted_files += 1;
        }
    }

    /// A file resolved with a twin somewhere: fold it into its parent.
    pub fn file_resolved(&mut self, path: &Path, digest: &[u8]) {
        let Some(parent) = parent_of(path) else {
            return;
        };
        let Some(node) = self.nodes.get_mut(&parent) else {
            return;
        };
        node.confirmed_files += 1;
        node.accounted_files += 1;
        node.desc_confirmed += 1;
        xor_into(&mut node.fold, &entry_hash(path, digest, 0x00));
        self.try_finish(&parent);
    }

    /// A file that turned out unique (or unreadable): its directory can
    /// never be promoted.
    pub fn file_unique(&mut self, path: &Path) {
        let Some(parent) = parent_of(path) else {
            return;
        };
        let Some(node) = self.nodes.get_mut(&parent) else {
            return;
        };
        node.has_unique = true;
        node.accounted_files += 1;
        self.try_finish(&parent);
    }

    /// Park a resolved group's reports until finalization.
    pub fn hold_group(&mut self, items: Vec<ReportItem>) {
        self.held.push(HeldGroup { items });
    }

    /// Promote duplicate directories, then re-emit the held per-file
    /// groups that no promotion subsumed.
    pub fn finalize(mut self, session: &Session) {
        let held = std::mem::take(&mut self.held);
        let suppressed = self.promote(session);

        // Per-file reports only exist when file duplicates are a
        // requested lint type; -T minimaldirs wants the dirs alone.
        if !session.cfg.lint.duplicates {
            return;
        }
        for group in held {
            let mut items: Vec<ReportItem> = group
                .items
                .into_iter()
                .filter(|item| {
                    item.path()
                        .map(|p| !under_any(p, &suppressed))
                        .unwrap_or(true)
                })
                .collect();
            if !reportable_after_suppression(&mut items) {
                continue;
            }
            count_file_group(session, &items);
            for item in items {
                session.emit(item);
            }
        }
    }

    /// Group finished, unique-free nodes by fold digest and report every
    /// set of two or more. Returns the promoted paths.
    fn promote(&mut self, session: &Session) -> Vec<PathBuf> {
        let mut by_fold: HashMap<[u8; 32], Vec<PathBuf>> = HashMap::new();
        for (path, node) in &self.nodes {
            if node.finished && !node.has_unique && node.desc_confirmed > 0 {
                by_fold.entry(node.fold).or_default().push(path.clone());
            }
        }

        let mut sets: Vec<(Vec<PathBuf>, [u8; 32])> = by_fold
            .into_iter()
            .filter(|(_, paths)| paths.len() >= 2)
            .map(|(fold, paths)| (paths, fold))
            .collect();
        // Shallow sets first so a nested duplicate dir is subsumed by
        // its promoted ancestor, not the other way around.
        for (paths, _) in sets.iter_mut() {
            paths.sort();
        }
        sets.sort_by_key(|(paths, _)| {
            (
                paths
                    .iter()
                    .map(|p| p.components().count())
                    .min()
                    .unwrap_or(0),
                paths[0].clone(),
            )
        });

        let mut promoted: Vec<PathBuf> = Vec::new();
        let mut group_seq = 0u64;
        for (mut paths, fold) in sets {
            paths.retain(|p| !under_any(p, &promoted));
            if paths.len() < 2 {
                continue;
            }
            // Preferred roots win original selection; path order breaks
            // ties deterministically.
            paths.sort_by_key(|p| {
                (
                    std::cmp::Reverse(self.nodes.get(p).map(|n| n.preferred).unwrap_or(false)),
                    p.clone(),
                )
            });
            group_seq += 1;
            debug!("duplicate dirs ({}): {:?}", group_seq, paths);
            for (i, path) in paths.iter().enumerate() {
                if i > 0 {
                    session.counters.dup_dirs.fetch_add(1, Ordering::Relaxed);
                }
                session.emit(ReportItem::DuplicateDir {
                    group: group_seq,
                    path: path.clone(),
                    digest: crate::digest::hex_string(&fold),
                    is_original: i == 0,
                });
            }
            promoted.extend(paths);
        }
        promoted
    }

    /// Make sure nodes exist for every ancestor of `path` up to its scan
    /// root; returns the direct parent, or `None` when the file is not
    /// under any root (should not happen).
    fn ensure_chain(&mut self, path: &Path) -> Option<PathBuf> {
        let root = self
            .roots
            .iter()
            .filter(|r| path.starts_with(&r.path))
            .max_by_key(|r| r.path.components().count())?
            .clone();

        let parent = parent_of(path)?;
        if !parent.starts_with(&root.path) {
            return None;
        }

        // Collect the missing ancestors, nearest first.
        let mut chain = Vec::new();
        let mut dir = parent.clone();
        loop {
            if self.nodes.contains_key(&dir) {
                break;
            }
            chain.push(dir.clone());
            if dir == root.path {
                break;
            }
            match parent_of(&dir) {
                Some(up) if up.starts_with(&root.path) => dir = up,
                _ => break,
            }
        }

        for dir in &chain {
            self.nodes.insert(dir.clone(), DirNode {
                preferred: root.preferred,
                ..DirNode::default()
            });
        }
        // Every new node is a subdir its parent has to wait for.
        for dir in &chain {
            if *dir != root.path
                && let Some(up) = parent_of(dir)
                && let Some(parent_node) = self.nodes.get_mut(&up)
            {
                parent_node.total_dirs += 1;
            }
        }
        Some(parent)
    }

    /// Finish cascade: when everything directly inside `dir` is
    /// accounted for, seal it and propagate into the parent.
    fn try_finish(&mut self, dir: &Path) {
        let mut current = dir.to_path_buf();
        loop {
            let Some(node) = self.nodes.get_mut(&current) else {
                return;
            };
            if node.finished
                || node.accounted_files < node.total_files
                || node.finished_dirs < node.total_dirs
            {
                return;
            }
            node.finished = true;
            let fold = node.fold;
            let has_unique = node.has_unique;
            let desc_confirmed = node.desc_confirmed;

            let Some(up) = parent_of(&current) else {
                return;
            };
            let Some(parent) = self.nodes.get_mut(&up) else {
                return;
            };
            parent.finished_dirs += 1;
            parent.has_unique |= has_unique;
            parent.desc_confirmed += desc_confirmed;
            xor_into(&mut parent.fold, &entry_hash(&current, &fold, 0x01));
            current = up;
        }
    }
}

fn parent_of(path: &Path) -> Option<PathBuf> {
    path.parent().map(|p| p.to_path_buf())
}

fn under_any(path: &Path, dirs: &[PathBuf]) -> bool {
    dirs.iter()
        .any(|d| path != d.as_path() && path.starts_with(d))
}

/// Order-independent per-entry hash: basename, a kind tag (file vs
/// dir) and the content digest.
fn entry_hash(path: &Path, digest: &[u8], kind_tag: u8) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    if let Some(name) = path.file_name() {
        hasher.update(name.to_string_lossy().as_bytes());
    }
    hasher.update(&[kind_tag]);
    hasher.update(digest);
    *hasher.finalize().as_bytes()
}

fn xor_into(fold: &mut [u8; 32], other: &[u8; 32]) {
    for (a, b) in fold.iter_mut().zip(other.iter()) {
        *a ^= b;
    }
}

/// After suppression a group is still worth reporting when it has at
/// least one original and one duplicate; re-crown the first survivor
/// when the original itself was suppressed.
fn reportable_after_suppression(items: &mut [ReportItem]) -> bool {
    if items.len() < 2 {
        return false;
    }
    let any_original = items
        .iter()
        .any(|i| matches!(i, ReportItem::DuplicateFile { is_original: true, .. }));
    if !any_original
        && let Some(ReportItem::DuplicateFile { is_original, .. }) = items.first_mut()
    {
        *is_original = true;
    }
    items
        .iter()
        .any(|i| matches!(i, ReportItem::DuplicateFile { is_original: false, .. }))
}

pub(crate) fn count_file_group(session: &Session, items: &[ReportItem]) {
    session.counters.dup_groups.fetch_add(1, Ordering::Relaxed);
    for item in items {
        if let ReportItem::DuplicateFile {
            is_original: false,
            size,
            ..
        } = item
        {
            session.counters.dup_files.fetch_add(1, Ordering::Relaxed);
            session.counters.wasted_bytes.fetch_add(*size, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_is_order_independent() {
        let a = entry_hash(Path::new("/x/a"), b"d1", 0x00);
        let b = entry_hash(Path::new("/x/b"), b"d2", 0x00);

        let mut fold1 = [0u8; 32];
        xor_into(&mut fold1, &a);
        xor_into(&mut fold1, &b);

        let mut fold2 = [0u8; 32];
        xor_into(&mut fold2, &b);
        xor_into(&mut fold2, &a);

        assert_eq!(fold1, fold2);
    }

    #[test]
    fn file_and_dir_entries_hash_differently() {
        let as_file = entry_hash(Path::new("/x/n"), b"d", 0x00);
        let as_dir = entry_hash(Path::new("/x/n"), b"d", 0x01);
        assert_ne!(as_file, as_dir);
    }

    #[test]
    fn under_any_excludes_the_dir_itself() {
        let dirs = vec![PathBuf::from("/a/b")];
        assert!(under_any(Path::new("/a/b/c"), &dirs));
        assert!(!under_any(Path::new("/a/b"), &dirs));
        assert!(!under_any(Path::new("/a/other"), &dirs));
    }
}
