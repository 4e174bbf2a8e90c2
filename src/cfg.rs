//! Immutable session configuration, produced by the CLI parser and
//! never mutated after that.

use std::path::PathBuf;

use crate::digest::DigestKind;
use crate::types::RootPath;
use crate::utils::config::ShredConsts;

/// Which lint detectors are active.
#[derive(Clone, Copy, Debug)]
pub struct LintTypes {
    pub duplicates: bool,
    pub duplicate_dirs: bool,
    pub empty_files: bool,
    pub empty_dirs: bool,
    pub bad_ids: bool,
    pub broken_links: bool,
    pub nonstripped: bool,
}

impl LintTypes {
    /// rmlint-style "defaults": everything except duplicate dirs and
    /// nonstripped binaries.
    pub fn defaults() -> Self {
        LintTypes {
            duplicates: true,
            duplicate_dirs: false,
            empty_files: true,
            empty_dirs: true,
            bad_ids: true,
            broken_links: true,
            nonstripped: false,
        }
    }

    pub fn none() -> Self {
        LintTypes {
            duplicates: false,
            duplicate_dirs: false,
            empty_files: false,
            empty_dirs: false,
            bad_ids: false,
            broken_links: false,
            nonstripped: false,
        }
    }

    pub fn all() -> Self {
        LintTypes {
            duplicates: true,
            duplicate_dirs: true,
            empty_files: true,
            empty_dirs: true,
            bad_ids: true,
            broken_links: true,
            nonstripped: true,
        }
    }
}

/// One end of the clamp range: a fraction of the file size or an
/// absolute byte offset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClampSpec {
    Factor(f64),
    Offset(u64),
}

impl ClampSpec {
    pub fn resolve(self, size: u64) -> u64 {
        match self {
            ClampSpec::Factor(f) => (size as f64 * f).round() as u64,
            ClampSpec::Offset(off) => off.min(size),
        }
    }
}

/// Byte window of each file that participates in hashing.
#[derive(Clone, Copy, Debug)]
pub struct ClampRange {
    pub start: ClampSpec,
    pub end: ClampSpec,
}

impl Default for ClampRange {
    fn default() -> Self {
        ClampRange {
            start: ClampSpec::Offset(0),
            end: ClampSpec::Factor(1.0),
        }
    }
}

impl ClampRange {
    /// Effective `[start, end)` window for a file of `size` bytes.
    pub fn window(&self, size: u64) -> (u64, u64) {
        let start = self.start.resolve(size);
        let end = self.end.resolve(size).min(size);
        (start, end)
    }

    pub fn is_default(&self) -> bool {
        matches!(self.start, ClampSpec::Offset(0)) && matches!(self.end, ClampSpec::Factor(f) if f == 1.0)
    }
}

/// Symlink policy during traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SymlinkPolicy {
    /// Skip symlinks entirely (broken ones are still lint).
    #[default]
    Ignore,
    /// Descend through them.
    Follow,
    /// Stat through the link and treat the target content as a
    /// duplicate candidate at the link's path.
    SeeAsFile,
}

/// One `FMT[:PATH]` output registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputSpec {
    pub formatter: String,
    /// "stdout" or a filesystem path.
    pub path: String,
}

/// A `FMT:KEY[=VALUE]` formatter configuration entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FmtConfig {
    pub formatter: String,
    pub key: String,
    pub value: String,
}

/// Everything the pipeline needs to know, frozen after argument parsing.
#[derive(Clone, Debug)]
pub struct Cfg {
    pub roots: Vec<RootPath>,
    pub threads: usize,
    pub max_depth: usize,
    /// Original-selection criteria, e.g. "pma". Lowercase ascending,
    /// uppercase descending; first character is the primary key.
    pub sort_criteria: String,
    pub lint: LintTypes,
    pub min_size: u64,
    pub max_size: u64,
    pub algorithm: DigestKind,
    pub paranoid_mem: u64,
    /// Only consider files modified at or after this epoch second.
    pub min_mtime: Option<i64>,
    pub clamp: ClampRange,
    pub outputs: Vec<OutputSpec>,
    pub fmt_config: Vec<FmtConfig>,
    pub cache_paths: Vec<PathBuf>,
    pub ignore_hidden: bool,
    pub symlinks: SymlinkPolicy,
    /// Do not descend into a different filesystem.
    pub same_device: bool,
    pub keep_all_tagged: bool,
    pub keep_all_untagged: bool,
    pub must_match_tagged: bool,
    pub must_match_untagged: bool,
    /// Report hardlink followers as duplicates.
    pub find_hardlinked_dupes: bool,
    pub match_basename: bool,
    pub match_extension: bool,
    pub match_without_extension: bool,
    pub xattr_read: bool,
    pub xattr_write: bool,
    pub write_unfinished: bool,
    pub color: bool,
    pub verbosity: i32,
}

impl Default for Cfg {
    fn default() -> Self {
        Cfg {
            roots: Vec::new(),
            threads: 16,
            max_depth: crate::utils::config::LimitConsts::MAX_DEPTH,
            sort_criteria: "pma".to_string(),
            lint: LintTypes::defaults(),
            min_size: 1,
            max_size: u64::MAX,
            algorithm: DigestKind::Blake3,
            paranoid_mem: ShredConsts::DEFAULT_PARANOID_MEM,
            min_mtime: None,
            clamp: ClampRange::default(),
            outputs: Vec::new(),
            fmt_config: Vec::new(),
            cache_paths: Vec::new(),
            ignore_hidden: true,
            symlinks: SymlinkPolicy::Ignore,
            same_device: true,
            keep_all_tagged: false,
            keep_all_untagged: false,
            must_match_tagged: false,
            must_match_untagged: false,
            find_hardlinked_dupes: false,
            match_basename: false,
            match_extension: false,
            match_without_extension: false,
            xattr_read: false,
            xattr_write: false,
            write_unfinished: false,
            color: true,
            verbosity: 2,
        }
    }
}

impl Cfg {
    /// True when at least one root is tagged preferred; the tag matrix
    /// options only mean anything then.
    pub fn has_preferred_roots(&self) -> bool {
        self.roots.iter().any(|r| r.preferred)
    }
}
