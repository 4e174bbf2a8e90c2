//! Public and internal types shared across the scour pipeline.

use serde::Serialize;
use std::path::PathBuf;

/// Pipeline phase, announced to every formatter as the orchestrator advances.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Traverse,
    Preprocess,
    Shred,
    Merge,
    PreShutdown,
    Summary,
}

impl Phase {
    /// Short label for progress display.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Init => "starting",
            Phase::Traverse => "traversing",
            Phase::Preprocess => "preprocessing",
            Phase::Shred => "matching",
            Phase::Merge => "merging",
            Phase::PreShutdown => "finishing",
            Phase::Summary => "summary",
        }
    }
}

/// Terminal classification of a file that went through duplicate detection.
/// `Pending` is the only non-terminal state; once any other variant is set
/// the record is frozen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Classification {
    #[default]
    Pending,
    Original,
    Duplicate,
    Unique,
    Rejected,
}

/// One scan root as given on the command line, in order.
#[derive(Clone, Debug)]
pub struct RootPath {
    pub path: PathBuf,
    /// Tagged preferred via the `//` separator.
    pub preferred: bool,
    /// Position among the given roots; used by original selection.
    pub index: usize,
}

/// Metadata for one regular file that survived traversal filters.
///
/// Created by the traverser, linked into hardlink clusters by the
/// preprocessor, and mutated by the shredder (digest, offset,
/// classification) until a terminal state is reached.
#[derive(Debug)]
pub struct FileRecord {
    pub path: PathBuf,
    pub dev: u64,
    pub inode: u64,
    pub size: u64,
    /// Modification time, seconds since epoch.
    pub mtime: i64,
    pub depth: usize,
    /// Index of the root this file was found under.
    pub root_index: usize,
    /// File lives under a root tagged preferred.
    pub preferred: bool,
    /// Bytes hashed so far, relative to the clamp window start.
    pub read_offset: u64,
    pub state: Classification,
    /// Final digest known up front (sidecar cache or xattr); lets the
    /// shredder resolve this member without any reads.
    pub cached_digest: Option<Vec<u8>>,
    /// Hardlink followers sharing (dev, inode); they inherit this
    /// record's classification.
    pub hardlinks: Vec<FileRecord>,
}

impl FileRecord {
    /// Basename as a byte-comparable string, lossy on non-UTF-8 names.
    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A finding, emitted through the formatter sink. This is the wire type
/// between the core and every output plugin.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportItem {
    DuplicateFile {
        group: u64,
        path: PathBuf,
        size: u64,
        digest: String,
        is_original: bool,
    },
    DuplicateDir {
        group: u64,
        path: PathBuf,
        digest: String,
        is_original: bool,
    },
    EmptyFile {
        path: PathBuf,
    },
    EmptyDir {
        path: PathBuf,
    },
    BadId {
        path: PathBuf,
        uid: u32,
        gid: u32,
    },
    BrokenSymlink {
        path: PathBuf,
    },
    NonStripped {
        path: PathBuf,
    },
    /// Partial digest of a file that left shredding early; only emitted
    /// with `--write-unfinished`.
    Unfinished {
        path: PathBuf,
        digest: String,
        read_offset: u64,
        size: u64,
    },
    Progress {
        phase: Phase,
        files: u64,
        bytes_read: u64,
    },
    Summary {
        total_files: u64,
        dup_files: u64,
        dup_groups: u64,
        dup_dirs: u64,
        empty_files: u64,
        empty_dirs: u64,
        bad_ids: u64,
        broken_symlinks: u64,
        nonstripped: u64,
        rejected: u64,
        wasted_bytes: u64,
        bytes_read: u64,
        elapsed_secs: f64,
    },
}

impl ReportItem {
    /// Path of the finding, when it has one (progress/summary do not).
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ReportItem::DuplicateFile { path, .. }
            | ReportItem::DuplicateDir { path, .. }
            | ReportItem::EmptyFile { path }
            | ReportItem::EmptyDir { path }
            | ReportItem::BadId { path, .. }
            | ReportItem::BrokenSymlink { path }
            | ReportItem::NonStripped { path }
            | ReportItem::Unfinished { path, .. } => Some(path),
            ReportItem::Progress { .. } | ReportItem::Summary { .. } => None,
        }
    }
}
