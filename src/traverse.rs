//! Root traversal: walks every configured root, applies the path-level
//! filters, flags the simple lint kinds on the way, and emits a
//! [`FileRecord`] for every regular file that can take part in
//! duplicate detection.
//!
//! Each root walks in its own thread; records funnel through one
//! bounded channel into a single accumulator so writes stay serialized.

use crossbeam_channel::{Receiver, Sender, bounded};
use log::warn;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::thread;

use crate::cfg::{Cfg, SymlinkPolicy};
use crate::elf;
use crate::mounts::{DeviceMap, dev_of};
use crate::session::Session;
use crate::types::{Classification, FileRecord, Phase, ReportItem, RootPath};
use crate::utils::config::ChannelCaps;

/// Everything traversal produced for the later phases.
pub struct TraverseOutput {
    /// Duplicate-detection candidates.
    pub files: Vec<FileRecord>,
    /// Regular files that exist but do not participate (lint, filtered,
    /// clamp-excluded). Only collected when directory merging needs
    /// them to veto promotions.
    pub other_files: Vec<PathBuf>,
}

enum TraverseMsg {
    Candidate(FileRecord),
    Lint(ReportItem),
    Other(PathBuf),
}

/// Walk all roots and collect candidates. Lint findings are emitted
/// through the session sink as they are found.
pub fn traverse(session: &Session, devices: &DeviceMap) -> TraverseOutput {
    let (tx, rx) = bounded::<TraverseMsg>(ChannelCaps::TRAVERSE);

    let handles: Vec<_> = session
        .cfg
        .roots
        .iter()
        .cloned()
        .map(|root| {
            let tx = tx.clone();
            let cfg = session.cfg.clone();
            let cancel = std::sync::Arc::clone(&session.cancel);
            let parallel = parallel_walk_possible(&cfg, devices, &root.path);
            thread::spawn(move || walk_root(&root, &cfg, parallel, &tx, &cancel))
        })
        .collect();
    drop(tx);

    let output = accumulate(session, rx);
    for h in handles {
        let _ = h.join();
    }
    output
}

fn accumulate(session: &Session, rx: Receiver<TraverseMsg>) -> TraverseOutput {
    let mut files = Vec::new();
    let mut other_files = Vec::new();
    let counters = &session.counters;

    while let Ok(msg) = rx.recv() {
        match msg {
            TraverseMsg::Candidate(rec) => {
                counters.total_files.fetch_add(1, Ordering::Relaxed);
                if files.len() % 1000 == 0 {
                    session.progress(Phase::Traverse);
                }
                files.push(rec);
            }
            TraverseMsg::Lint(item) => {
                let counter = match &item {
                    ReportItem::EmptyFile { .. } => &counters.empty_files,
                    ReportItem::EmptyDir { .. } => &counters.empty_dirs,
                    ReportItem::BadId { .. } => &counters.bad_ids,
                    ReportItem::BrokenSymlink { .. } => &counters.broken_symlinks,
                    ReportItem::NonStripped { .. } => &counters.nonstripped,
                    _ => &counters.rejected,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                session.emit(item);
            }
            TraverseMsg::Other(path) => {
                if session.cfg.lint.duplicate_dirs {
                    other_files.push(path);
                }
            }
        }
    }
    session.progress(Phase::Traverse);
    TraverseOutput { files, other_files }
}

/// The parallel walker cannot prune per-directory, so it only runs when
/// nothing needs pruning: unrestricted depth, hidden files wanted, and
/// mountpoint crossing allowed. And only on devices where the extra
/// seeks are free.
fn parallel_walk_possible(cfg: &Cfg, devices: &DeviceMap, root: &Path) -> bool {
    if cfg.same_device || cfg.ignore_hidden {
        return false;
    }
    if cfg.max_depth < crate::utils::config::LimitConsts::MAX_DEPTH {
        return false;
    }
    dev_of(root)
        .map(|dev| !devices.class_of(dev).is_rotational())
        .unwrap_or(false)
}

/// Per-directory content accounting for post-order empty detection.
#[derive(Default)]
struct DirStat {
    children: usize,
    empty_dir_children: usize,
}

struct WalkState<'a> {
    root: &'a RootPath,
    cfg: &'a Cfg,
    tx: &'a Sender<TraverseMsg>,
    dirs: HashMap<PathBuf, DirStat>,
    ids: IdChecker,
    root_dev: Option<u64>,
}

fn walk_root(
    root: &RootPath,
    cfg: &Cfg,
    parallel: bool,
    tx: &Sender<TraverseMsg>,
    cancel: &std::sync::atomic::AtomicBool,
) {
    if !root.path.exists() {
        warn!("cannot open directory or file {}", root.path.display());
        return;
    }

    let mut state = WalkState {
        root,
        cfg,
        tx,
        dirs: HashMap::new(),
        ids: IdChecker::default(),
        root_dev: dev_of(&root.path),
    };
    state.dirs.insert(root.path.clone(), DirStat::default());

    if parallel {
        walk_parallel(&mut state, cancel);
    } else {
        walk_serial(&mut state, cancel);
    }

    finish_empty_dirs(&mut state);
}

fn walk_serial(state: &mut WalkState, cancel: &std::sync::atomic::AtomicBool) {
    let follow = state.cfg.symlinks == SymlinkPolicy::Follow;
    let mut it = walkdir::WalkDir::new(&state.root.path)
        .follow_links(follow)
        .max_depth(state.cfg.max_depth)
        .into_iter();

    while let Some(result) = it.next() {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                warn!("error accessing path: {}", err);
                // Whatever is in there, the parent is not empty.
                if let Some(parent) = err.path().and_then(Path::parent) {
                    state.dirs.entry(parent.to_path_buf()).or_default().children += 1;
                }
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }
        let path = entry.path().to_path_buf();
        count_child(state, &path);

        if entry.file_type().is_dir() {
            if let PruneDir::Skip = consider_dir(state, &path, entry.depth()) {
                it.skip_current_dir();
            }
        } else {
            consider_non_dir(state, &path, entry.depth());
        }
    }
}

fn walk_parallel(state: &mut WalkState, cancel: &std::sync::atomic::AtomicBool) {
    use jwalk::Parallelism;
    use std::time::Duration;

    let follow = state.cfg.symlinks == SymlinkPolicy::Follow;
    for result in jwalk::WalkDir::new(&state.root.path)
        .follow_links(follow)
        .parallelism(Parallelism::RayonDefaultPool {
            busy_timeout: Duration::from_secs(60),
        })
        .into_iter()
    {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                warn!("error accessing path: {}", err);
                if let Some(parent) = err.path().and_then(Path::parent) {
                    state.dirs.entry(parent.to_path_buf()).or_default().children += 1;
                }
                continue;
            }
        };
        let path = entry.path().to_path_buf();
        if path == state.root.path {
            continue;
        }
        count_child(state, &path);
        let depth = path
            .strip_prefix(&state.root.path)
            .map(|rel| rel.components().count())
            .unwrap_or(1);

        let Ok(meta) = std::fs::symlink_metadata(&path) else {
            continue;
        };
        if meta.is_dir() {
            // Pruning never applies on this walk path (checked up front).
            state.dirs.insert(path, DirStat::default());
        } else {
            consider_non_dir(state, &path, depth);
        }
    }
}

fn count_child(state: &mut WalkState, path: &Path) {
    if let Some(parent) = path.parent() {
        state.dirs.entry(parent.to_path_buf()).or_default().children += 1;
    }
}

enum PruneDir {
    Descend,
    Skip,
}

fn consider_dir(state: &mut WalkState, path: &Path, _depth: usize) -> PruneDir {
    if state.cfg.ignore_hidden && is_hidden_name(path) {
        return PruneDir::Skip;
    }
    if state.cfg.same_device
        && let (Some(root_dev), Some(dev)) = (state.root_dev, dev_of(path))
        && dev != root_dev
    {
        return PruneDir::Skip;
    }
    state.dirs.insert(path.to_path_buf(), DirStat::default());
    PruneDir::Descend
}

fn consider_non_dir(state: &mut WalkState, path: &Path, depth: usize) {
    let cfg = state.cfg;
    let Ok(link_meta) = std::fs::symlink_metadata(path) else {
        return;
    };

    if link_meta.is_symlink() {
        match std::fs::metadata(path) {
            Err(_) => {
                if cfg.lint.broken_links {
                    send_lint(state, ReportItem::BrokenSymlink {
                        path: path.to_path_buf(),
                    });
                }
            }
            Ok(target_meta) => {
                if cfg.symlinks == SymlinkPolicy::SeeAsFile && target_meta.is_file() {
                    consider_file(state, path, &target_meta, depth);
                }
            }
        }
        return;
    }

    if link_meta.is_file() {
        consider_file(state, path, &link_meta, depth);
    }
    // Sockets, fifos and device nodes are content for their parent but
    // never lint.
}

fn consider_file(state: &mut WalkState, path: &Path, meta: &std::fs::Metadata, depth: usize) {
    let cfg = state.cfg;
    if cfg.ignore_hidden && is_hidden_name(path) {
        return;
    }

    let (dev, inode, uid, gid, mtime) = meta_ids(meta);
    let size = meta.len();

    if let Some(min_mtime) = cfg.min_mtime
        && mtime < min_mtime
    {
        send_other(state, path);
        return;
    }

    if cfg.lint.bad_ids && !state.ids.both_known(uid, gid) {
        send_lint(state, ReportItem::BadId {
            path: path.to_path_buf(),
            uid,
            gid,
        });
        send_other(state, path);
        return;
    }

    if size == 0 {
        if cfg.lint.empty_files {
            send_lint(state, ReportItem::EmptyFile {
                path: path.to_path_buf(),
            });
        }
        return;
    }

    if cfg.lint.nonstripped && elf::is_nonstripped(path) {
        send_lint(state, ReportItem::NonStripped {
            path: path.to_path_buf(),
        });
        send_other(state, path);
        return;
    }

    if !cfg.lint.duplicates && !cfg.lint.duplicate_dirs {
        return;
    }

    if size < cfg.min_size || size > cfg.max_size {
        send_other(state, path);
        return;
    }

    let (clamp_start, clamp_end) = cfg.clamp.window(size);
    if clamp_start >= clamp_end {
        // Nothing of this file participates in hashing.
        send_other(state, path);
        return;
    }

    let record = FileRecord {
        path: path.to_path_buf(),
        dev,
        inode,
        size,
        mtime,
        depth,
        root_index: state.root.index,
        preferred: state.root.preferred,
        read_offset: 0,
        state: Classification::Pending,
        cached_digest: None,
        hardlinks: Vec::new(),
    };
    let _ = state.tx.send(TraverseMsg::Candidate(record));
}

fn send_lint(state: &WalkState, item: ReportItem) {
    let _ = state.tx.send(TraverseMsg::Lint(item));
}

fn send_other(state: &WalkState, path: &Path) {
    let _ = state.tx.send(TraverseMsg::Other(path.to_path_buf()));
}

/// Post-order pass: a directory is empty when every child is itself an
/// empty directory. Runs after the walk so the verdict for a parent can
/// use its children's verdicts.
fn finish_empty_dirs(state: &mut WalkState) {
    if !state.cfg.lint.empty_dirs {
        return;
    }
    let mut paths: Vec<PathBuf> = state.dirs.keys().cloned().collect();
    // Deepest first so children resolve before their parents.
    paths.sort_by_key(|p| std::cmp::Reverse(p.components().count()));

    let mut empty = Vec::new();
    for path in paths {
        let stat = &state.dirs[&path];
        if stat.children == stat.empty_dir_children {
            if let Some(parent) = path.parent()
                && let Some(parent_stat) = state.dirs.get_mut(parent)
            {
                parent_stat.empty_dir_children += 1;
            }
            if path != state.root.path {
                empty.push(path);
            }
        }
    }
    empty.sort();
    for path in empty {
        send_lint(state, ReportItem::EmptyDir { path });
    }
}

/// Hidden means a leading dot on the basename, the Unix convention.
pub fn is_hidden_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(unix)]
fn meta_ids(meta: &std::fs::Metadata) -> (u64, u64, u32, u32, i64) {
    use std::os::unix::fs::MetadataExt;
    (meta.dev(), meta.ino(), meta.uid(), meta.gid(), meta.mtime())
}

#[cfg(not(unix))]
fn meta_ids(meta: &std::fs::Metadata) -> (u64, u64, u32, u32, i64) {
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    (0, 0, 0, 0, mtime)
}

/// Answers "does this uid/gid exist on the system", with caching since
/// trees tend to repeat a handful of owners.
#[derive(Default)]
struct IdChecker {
    uids: HashMap<u32, bool>,
    gids: HashMap<u32, bool>,
}

impl IdChecker {
    fn both_known(&mut self, uid: u32, gid: u32) -> bool {
        let uid_ok = *self.uids.entry(uid).or_insert_with(|| uid_exists(uid));
        let gid_ok = *self.gids.entry(gid).or_insert_with(|| gid_exists(gid));
        uid_ok && gid_ok
    }
}

#[cfg(unix)]
fn uid_exists(uid: u32) -> bool {
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut buf = vec![0i8; 4096];
    let mut result: *mut libc::passwd = std::ptr::null_mut();
    let rc = unsafe {
        libc::getpwuid_r(
            uid,
            &mut pwd,
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
            &mut result,
        )
    };
    rc == 0 && !result.is_null()
}

#[cfg(unix)]
fn gid_exists(gid: u32) -> bool {
    let mut grp: libc::group = unsafe { std::mem::zeroed() };
    let mut buf = vec![0i8; 4096];
    let mut result: *mut libc::group = std::ptr::null_mut();
    let rc = unsafe {
        libc::getgrgid_r(
            gid,
            &mut grp,
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
            &mut result,
        )
    };
    rc == 0 && !result.is_null()
}

#[cfg(not(unix))]
fn uid_exists(_uid: u32) -> bool {
    true
}

#[cfg(not(unix))]
fn gid_exists(_gid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_names() {
        assert!(is_hidden_name(Path::new("/a/.git")));
        assert!(is_hidden_name(Path::new(".profile")));
        assert!(!is_hidden_name(Path::new("/a/visible.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn root_uid_exists() {
        let mut ids = IdChecker::default();
        assert!(ids.both_known(0, 0));
        // An id from the reserved high range should not exist.
        assert!(!uid_exists(u32::MAX - 3));
    }
}
