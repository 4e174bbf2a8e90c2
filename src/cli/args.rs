use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Filesystem lint finder: duplicate files and directories, empty
/// files, broken symlinks and friends.
#[derive(Clone, Debug, Parser)]
#[command(name = "scour")]
#[command(about = "Find filesystem lint: duplicates, empty files/dirs, broken symlinks.")]
#[command(
    after_help = "PATH arguments may contain `//` to tag the following paths as preferred \
                  and a single `-` to read more paths from stdin, one per line."
)]
pub struct Cli {
    /// Directories or files to scan. Default: current directory.
    #[arg(value_name = "PATH")]
    pub paths: Vec<String>,

    /// Max number of worker threads.
    #[arg(long, short = 't', value_name = "N", default_value_t = 16)]
    pub threads: usize,

    /// Max traversal depth.
    #[arg(long = "max-depth", short = 'd', value_name = "N")]
    pub max_depth: Option<usize>,

    /// Original-selection criteria; `a` path, `m` mtime, `p` preferred.
    /// Uppercase reverses a criterion.
    #[arg(long = "sortcriteria", short = 'S', value_name = "[amp]", default_value = "pma")]
    pub sortcriteria: String,

    /// Lint types to look for, e.g. `defaults`, `all`, `df,dd` or
    /// `defaults,-emptyfiles` (`+`/`-` toggles after the first entry).
    #[arg(long = "types", short = 'T', value_name = "T")]
    pub types: Option<String>,

    /// Size limits as `MIN` or `MIN-MAX`, with suffixes like 4k, 1mb,
    /// 2g. A single value sets the minimum only.
    #[arg(long = "size", short = 's', value_name = "m-M")]
    pub size: Option<String>,

    /// Hash algorithm (fast64, bastard, blake3, sha256, sha512,
    /// paranoid).
    #[arg(long = "algorithm", short = 'a', value_name = "A")]
    pub algorithm: Option<String>,

    /// Add output, replacing the defaults. Format `FMT[:PATH]`, PATH
    /// defaults to stdout.
    #[arg(long = "output", short = 'o', value_name = "FMT[:PATH]")]
    pub output: Vec<String>,

    /// Add output on top of the defaults. Same format as -o.
    #[arg(long = "add-output", short = 'O', value_name = "FMT[:PATH]")]
    pub add_output: Vec<String>,

    /// Memory budget for paranoid byte comparison (size spec).
    #[arg(long = "max-paranoid-mem", short = 'u', value_name = "S")]
    pub max_paranoid_mem: Option<String>,

    /// Only consider files newer than the time stored in this stamp
    /// file; also registers a stamp output to it.
    #[arg(long = "newer-than-stamp", short = 'n', value_name = "PATH")]
    pub newer_than_stamp: Option<PathBuf>,

    /// Only consider files newer than this epoch second or ISO-8601
    /// timestamp.
    #[arg(long = "newer-than", short = 'N', value_name = "STAMP")]
    pub newer_than: Option<String>,

    /// Lower clamp: skip hashing below this point of each file. A
    /// fraction (`10%`, `0.1`) or an absolute size spec.
    #[arg(long = "clamp-low", short = 'q', value_name = "P")]
    pub clamp_low: Option<String>,

    /// Upper clamp: stop hashing past this point of each file.
    #[arg(long = "clamp-top", short = 'Q', value_name = "P")]
    pub clamp_top: Option<String>,

    /// Configure a formatter: `FMT:KEY[=VALUE]`.
    #[arg(long = "config", short = 'c', value_name = "FMT:K[=V]")]
    pub config: Vec<String>,

    /// Digest cache file to read (repeatable); the first one is also
    /// written back at shutdown.
    #[arg(long = "cache", short = 'C', value_name = "PATH")]
    pub cache: Vec<PathBuf>,

    /// Show a progress bar (replaces the default outputs).
    #[arg(long, short = 'g')]
    pub progress: bool,

    /// Be more verbose (-vv for more).
    #[arg(long = "loud", short = 'v', action = ArgAction::Count)]
    pub loud: u8,

    /// Be less verbose (-VV for less).
    #[arg(long = "quiet", short = 'V', action = ArgAction::Count)]
    pub quiet: u8,

    /// Force colored output.
    #[arg(long = "with-color", short = 'w', overrides_with = "no_with_color")]
    pub with_color: bool,

    /// Force plain output.
    #[arg(long = "no-with-color", short = 'W')]
    pub no_with_color: bool,

    /// Also scan hidden files and directories.
    #[arg(long = "hidden", short = 'r', overrides_with = "no_hidden")]
    pub hidden: bool,

    /// Ignore hidden files and directories (default).
    #[arg(long = "no-hidden", short = 'R')]
    pub no_hidden: bool,

    /// Follow symlinks.
    #[arg(long = "followlinks", short = 'f')]
    pub followlinks: bool,

    /// Treat symlinks like regular files pointing at their target's
    /// content.
    #[arg(long = "see-symlinks", short = '@')]
    pub see_symlinks: bool,

    /// Do not cross mountpoints (default).
    #[arg(long = "crossdev", short = 'x', overrides_with = "no_crossdev")]
    pub crossdev: bool,

    /// Cross mountpoints.
    #[arg(long = "no-crossdev", short = 'X')]
    pub no_crossdev: bool,

    /// Use more paranoid hashing (-pp for more, -ppp for byte
    /// comparison).
    #[arg(long = "paranoid", short = 'p', action = ArgAction::Count)]
    pub paranoid: u8,

    /// Use faster, less paranoid hashing.
    #[arg(long = "less-paranoid", short = 'P', action = ArgAction::Count)]
    pub less_paranoid: u8,

    /// Never report files under tagged (preferred) roots as duplicates.
    #[arg(long = "keep-all-tagged", short = 'k')]
    pub keep_all_tagged: bool,

    /// Never report files under untagged roots as duplicates.
    #[arg(long = "keep-all-untagged", short = 'K')]
    pub keep_all_untagged: bool,

    /// Only report groups with a twin in a tagged root.
    #[arg(long = "must-match-tagged", short = 'm')]
    pub must_match_tagged: bool,

    /// Only report groups with a twin in an untagged root.
    #[arg(long = "must-match-untagged", short = 'M')]
    pub must_match_untagged: bool,

    /// Report hardlinks as duplicates.
    #[arg(long = "hardlinked", short = 'l', overrides_with = "no_hardlinked")]
    pub hardlinked: bool,

    /// Ignore hardlinks (default).
    #[arg(long = "no-hardlinked", short = 'L')]
    pub no_hardlinked: bool,

    /// Only match files with the same basename.
    #[arg(long = "match-basename", short = 'b')]
    pub match_basename: bool,

    /// Only match files with the same extension.
    #[arg(long = "match-extension", short = 'e')]
    pub match_extension: bool,

    /// Only match files with the same basename minus extension.
    #[arg(long = "match-without-extension", short = 'i')]
    pub match_without_extension: bool,

    /// Find duplicate directories.
    #[arg(long = "merge-directories", short = 'D')]
    pub merge_directories: bool,

    /// Read cached digests from extended attributes.
    #[arg(long = "xattr-read")]
    pub xattr_read: bool,

    /// Cache digests in extended attributes.
    #[arg(long = "xattr-write")]
    pub xattr_write: bool,

    /// Report partial digests of files that left shredding early.
    #[arg(long = "write-unfinished", short = 'U')]
    pub write_unfinished: bool,
}
