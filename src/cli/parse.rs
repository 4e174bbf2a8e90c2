//! Hand parsers for the option sub-grammars, and the translation from
//! the raw CLI into the frozen [`Cfg`].
//!
//! Everything here fails fast: a malformed value is a configuration
//! error before any filesystem work starts.

use anyhow::{Context, Result, anyhow, bail};
use log::warn;

use super::args::Cli;
use crate::cfg::{Cfg, ClampRange, ClampSpec, FmtConfig, LintTypes, OutputSpec, SymlinkPolicy};
use crate::digest::DigestKind;
use crate::types::RootPath;
use crate::utils::config::{DEFAULT_SCRIPT_PATH, LimitConsts};

/// Size suffix table, sorted by id for binary search. `base^exponent`
/// multiplies the numeric prefix.
const SIZE_FORMAT_TABLE: [(&str, u64, u32); 15] = [
    ("b", 512, 1),
    ("c", 1, 1),
    ("e", 1000, 6),
    ("eb", 1024, 6),
    ("g", 1000, 3),
    ("gb", 1024, 3),
    ("k", 1000, 1),
    ("kb", 1024, 1),
    ("m", 1000, 2),
    ("mb", 1024, 2),
    ("p", 1000, 5),
    ("pb", 1024, 5),
    ("t", 1000, 4),
    ("tb", 1024, 4),
    ("w", 2, 1),
];

/// Parse a size spec like `4k`, `1.5mb` or `512`. The suffix selects a
/// decimal or binary multiplier from the table above.
pub fn size_string_to_bytes(spec: &str) -> Result<u64> {
    let spec = spec.trim();
    if spec.is_empty() {
        bail!("input size is empty");
    }
    let split = spec
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(spec.len());
    let (number, suffix) = spec.split_at(split);
    let decimal: f64 = number
        .parse()
        .map_err(|_| anyhow!("'{}' does not look like a number", spec))?;
    if decimal < 0.0 {
        bail!("negative sizes are no good idea");
    }
    let suffix = suffix.trim().to_ascii_lowercase();
    if suffix.is_empty() {
        return Ok(decimal.round() as u64);
    }
    let idx = SIZE_FORMAT_TABLE
        .binary_search_by_key(&suffix.as_str(), |(id, _, _)| *id)
        .map_err(|_| anyhow!("unknown size format specifier '{}'", suffix))?;
    let (_, base, exponent) = SIZE_FORMAT_TABLE[idx];
    Ok((decimal * (base as f64).powi(exponent as i32)).round() as u64)
}

/// Parse `MIN` or `MIN-MAX`. A single value sets the minimum; the
/// maximum stays unlimited.
pub fn size_range_to_bytes(spec: &str) -> Result<(u64, u64)> {
    let mut parts = spec.splitn(2, '-');
    let min = size_string_to_bytes(parts.next().unwrap_or(""))?;
    let max = match parts.next() {
        Some(raw) => size_string_to_bytes(raw)?,
        None => u64::MAX,
    };
    if max < min {
        bail!("max is smaller than min");
    }
    Ok((min, max))
}

/// Parse a clamp spec: `10%` or `0.1` are fractions, anything else is
/// an absolute size spec.
pub fn parse_clamp(spec: &str) -> Result<ClampSpec> {
    let spec = spec.trim();
    if spec.contains('.') || spec.ends_with('%') {
        let raw = spec.strip_suffix('%').unwrap_or(spec);
        let mut factor: f64 = raw
            .parse()
            .map_err(|_| anyhow!("unable to parse factor '{}'", spec))?;
        if spec.ends_with('%') {
            factor /= 100.0;
        }
        if !(0.0..=1.0).contains(&factor) {
            bail!("factor value is not in range [0-1]: {}", factor);
        }
        Ok(ClampSpec::Factor(factor))
    } else {
        Ok(ClampSpec::Offset(size_string_to_bytes(spec)?))
    }
}

type LintApply = fn(&mut LintTypes, bool);

/// Named single lint types with their aliases.
const LINT_TYPE_TABLE: &[(&[&str], LintApply)] = &[
    (&["badids", "bi"], |l, v| l.bad_ids = v),
    (&["badlinks", "bl"], |l, v| l.broken_links = v),
    (&["emptydirs", "ed"], |l, v| l.empty_dirs = v),
    (&["emptyfiles", "ef"], |l, v| l.empty_files = v),
    (&["nonstripped", "ns"], |l, v| l.nonstripped = v),
    (&["duplicates", "df", "dupes"], |l, v| l.duplicates = v),
    (&["duplicatedirs", "dd", "dupedirs"], |l, v| {
        l.duplicate_dirs = v
    }),
];

fn apply_lint_combo(name: &str, lint: &mut LintTypes, value: bool) -> bool {
    let fields: &[LintApply] = match name {
        "all" => &[
            |l, v| l.bad_ids = v,
            |l, v| l.broken_links = v,
            |l, v| l.empty_dirs = v,
            |l, v| l.empty_files = v,
            |l, v| l.nonstripped = v,
            |l, v| l.duplicates = v,
            |l, v| l.duplicate_dirs = v,
        ],
        "defaults" => &[
            |l, v| l.bad_ids = v,
            |l, v| l.broken_links = v,
            |l, v| l.empty_dirs = v,
            |l, v| l.empty_files = v,
            |l, v| l.duplicates = v,
        ],
        "minimal" => &[
            |l, v| l.bad_ids = v,
            |l, v| l.broken_links = v,
            |l, v| l.duplicates = v,
        ],
        "minimaldirs" => &[
            |l, v| l.bad_ids = v,
            |l, v| l.broken_links = v,
            |l, v| l.duplicate_dirs = v,
        ],
        "none" => &[],
        _ => return false,
    };
    for apply in fields {
        apply(lint, value);
    }
    true
}

/// The separator is whatever non-letter follows the first entry; `,`
/// when the string is one bare word.
fn find_lint_types_sep(spec: &str) -> char {
    let rest = spec.trim_start_matches(['+', '-']);
    rest.chars().find(|c| !c.is_alphabetic()).unwrap_or(',')
}

/// Parse a `-T` lint type list. The first entry may be bare and resets
/// the whole set; later entries need a `+`/`-` prefix.
pub fn parse_lint_types(spec: &str, lint: &mut LintTypes) -> Result<()> {
    let sep = find_lint_types_sep(spec);
    for (index, raw) in spec.split(sep).enumerate() {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let sign = match raw.chars().next() {
            Some('+') => 1,
            Some('-') => -1,
            _ => 0,
        };
        if index > 0 && sign == 0 {
            warn!(
                "lint types after the first should be prefixed with '+' or '-': [{}]",
                raw
            );
            continue;
        }
        let name = raw.trim_start_matches(['+', '-']);
        let value = sign != -1;
        if sign == 0 {
            // A bare leading entry resets everything first.
            *lint = LintTypes::none();
        }
        if apply_lint_combo(name, lint, value) {
            continue;
        }
        let Some((_, apply)) = LINT_TYPE_TABLE
            .iter()
            .find(|(names, _)| names.contains(&name))
        else {
            warn!("lint type '{}' not recognised", name);
            continue;
        };
        apply(lint, value);
    }
    Ok(())
}

/// Parse a timestamp: a plain epoch integer, or ISO-8601 when the
/// string contains a 'T'.
pub fn parse_timestamp(spec: &str) -> Result<i64> {
    let spec = spec.trim();
    let stamp = if spec.contains('T') {
        chrono::DateTime::parse_from_rfc3339(spec)
            .with_context(|| format!("unable to parse time spec '{}'", spec))?
            .timestamp()
    } else {
        spec.parse::<i64>()
            .with_context(|| format!("unable to parse time spec '{}'", spec))?
    };
    if stamp <= 0 {
        bail!("unable to parse time spec '{}'", spec);
    }
    if stamp > chrono::Utc::now().timestamp() {
        warn!("timestamp {} is newer than the current time", spec);
    }
    Ok(stamp)
}

/// Split `FMT[:PATH]`; the path defaults to stdout.
pub fn parse_output_pair(pair: &str) -> OutputSpec {
    match pair.split_once(':') {
        Some((fmt, path)) => OutputSpec {
            formatter: fmt.to_string(),
            path: path.to_string(),
        },
        None => OutputSpec {
            formatter: pair.to_string(),
            path: "stdout".to_string(),
        },
    }
}

/// Split `FMT:KEY[=VALUE]`; a missing value means "1". Malformed
/// entries warn and are dropped, they never fail the run.
pub fn parse_config_entry(pair: &str) -> Option<FmtConfig> {
    let Some((formatter, rest)) = pair.split_once(':') else {
        warn!("no format (format:key[=val]) specified in '{}'", pair);
        return None;
    };
    if rest.is_empty() {
        warn!("missing key (format:key[=val]) in '{}'", pair);
        return None;
    }
    let (key, value) = match rest.split_once('=') {
        Some((k, v)) => (k.to_string(), v.to_string()),
        None => (rest.to_string(), "1".to_string()),
    };
    Some(FmtConfig {
        formatter: formatter.to_string(),
        key,
        value,
    })
}

/// Validate a sort criteria string: a non-empty sequence over
/// `[amp]`/`[AMP]`.
pub fn parse_sort_criteria(spec: &str) -> Result<String> {
    if spec.is_empty() {
        bail!("sort criteria must not be empty");
    }
    for c in spec.chars() {
        if !"ampAMP".contains(c) {
            bail!("unknown sort criterion '{}' (expected [amp])", c);
        }
    }
    Ok(spec.to_string())
}

/// Expand the positional arguments into tagged roots: `//` toggles the
/// preferred flag, `-` pulls more paths from stdin.
pub fn collect_roots(raw_paths: &[String]) -> Result<Vec<RootPath>> {
    let mut roots: Vec<RootPath> = Vec::new();
    let mut preferred = false;
    let mut any_failed = false;

    let mut add = |path: &str, preferred: bool, roots: &mut Vec<RootPath>| match std::fs::canonicalize(path) {
        Ok(abs) => {
            let index = roots.len();
            roots.push(RootPath {
                path: abs,
                preferred,
                index,
            });
            true
        }
        Err(e) => {
            warn!("can't open directory or file \"{}\": {}", path, e);
            false
        }
    };

    for raw in raw_paths {
        if raw == "//" {
            preferred = !preferred;
        } else if raw == "-" {
            for line in std::io::stdin().lines() {
                let line = line.context("read paths from stdin")?;
                let line = line.trim();
                if !line.is_empty() && !add(line, preferred, &mut roots) {
                    any_failed = true;
                }
            }
        } else if !add(raw, preferred, &mut roots) {
            any_failed = true;
        }
    }

    if roots.is_empty() {
        if any_failed {
            bail!("no valid paths given");
        }
        // No paths at all: scan the working directory.
        let cwd = std::env::current_dir().context("get working directory")?;
        roots.push(RootPath {
            path: cwd,
            preferred: false,
            index: 0,
        });
    }
    Ok(roots)
}

/// Default outputs when the user configured none.
fn default_outputs() -> Vec<OutputSpec> {
    vec![
        OutputSpec {
            formatter: "pretty".into(),
            path: "stdout".into(),
        },
        OutputSpec {
            formatter: "summary".into(),
            path: "stdout".into(),
        },
        OutputSpec {
            formatter: "sh".into(),
            path: DEFAULT_SCRIPT_PATH.into(),
        },
    ]
}

/// The `-p`/`-P` ladder over this crate's algorithm set. Zero keeps the
/// `-a` choice.
fn algorithm_for_paranoia(count: i32, base: DigestKind) -> Result<DigestKind> {
    match count {
        -2 | -1 => Ok(DigestKind::Fast64),
        0 => Ok(base),
        1 => Ok(DigestKind::Bastard),
        2 => Ok(DigestKind::Sha512),
        3 => Ok(DigestKind::Paranoid),
        _ => bail!("only up to -ppp or down to -PP flags allowed"),
    }
}

/// Turn the parsed command line into a frozen [`Cfg`]. All validation
/// that can fail before touching the filesystem happens here.
pub fn build_cfg(cli: &Cli) -> Result<Cfg> {
    let mut cfg = Cfg::default();

    cfg.verbosity = 2 + cli.loud as i32 - cli.quiet as i32;
    cfg.threads = cli
        .threads
        .clamp(LimitConsts::MIN_THREADS, LimitConsts::MAX_THREADS);
    cfg.max_depth = cli
        .max_depth
        .unwrap_or(LimitConsts::MAX_DEPTH)
        .clamp(1, LimitConsts::MAX_DEPTH);
    cfg.sort_criteria = parse_sort_criteria(&cli.sortcriteria)?;

    if let Some(types) = &cli.types {
        parse_lint_types(types, &mut cfg.lint)?;
    }
    if let Some(size) = &cli.size {
        let (min, max) = size_range_to_bytes(size).context("cannot parse --size")?;
        cfg.min_size = min.max(1);
        cfg.max_size = max;
    }

    if let Some(name) = &cli.algorithm {
        cfg.algorithm = DigestKind::from_name(name)
            .ok_or_else(|| anyhow!("unknown hash algorithm: '{}'", name))?;
    }
    let paranoia = cli.paranoid as i32 - cli.less_paranoid as i32;
    cfg.algorithm = algorithm_for_paranoia(paranoia, cfg.algorithm)?;
    if let Some(spec) = &cli.max_paranoid_mem {
        cfg.paranoid_mem = size_string_to_bytes(spec).context("invalid --max-paranoid-mem")?;
    }

    let mut clamp = ClampRange::default();
    if let Some(spec) = &cli.clamp_low {
        clamp.start = parse_clamp(spec).context("cannot parse --clamp-low")?;
    }
    if let Some(spec) = &cli.clamp_top {
        clamp.end = parse_clamp(spec).context("cannot parse --clamp-top")?;
    }
    if let (ClampSpec::Factor(lo), ClampSpec::Factor(hi)) = (clamp.start, clamp.end)
        && lo >= hi
    {
        bail!("--clamp-low should be lower than --clamp-top");
    }
    if let (ClampSpec::Offset(lo), ClampSpec::Offset(hi)) = (clamp.start, clamp.end)
        && lo >= hi
    {
        bail!("--clamp-low should be lower than --clamp-top");
    }
    cfg.clamp = clamp;

    let mut fmt_config: Vec<FmtConfig> = cli
        .config
        .iter()
        .filter_map(|pair| parse_config_entry(pair))
        .collect();

    if let Some(stamp) = &cli.newer_than {
        cfg.min_mtime = Some(parse_timestamp(stamp)?);
    }
    let mut stamp_output = None;
    if let Some(stamp_path) = &cli.newer_than_stamp {
        let raw = std::fs::read_to_string(stamp_path)
            .with_context(|| format!("cannot read stamp file {}", stamp_path.display()))?;
        let raw = raw.trim();
        cfg.min_mtime = Some(parse_timestamp(raw)?);
        // The stamp file is refreshed on completion, so the next run
        // picks up where this one ends.
        stamp_output = Some(OutputSpec {
            formatter: "stamp".into(),
            path: stamp_path.to_string_lossy().into_owned(),
        });
        if raw.contains('T') {
            fmt_config.push(FmtConfig {
                formatter: "stamp".into(),
                key: "iso8601".into(),
                value: "true".into(),
            });
        }
    }
    cfg.fmt_config = fmt_config;

    if !cli.output.is_empty() && !cli.add_output.is_empty() {
        bail!("specifying both -o and -O is not allowed");
    }
    let mut outputs = if !cli.output.is_empty() {
        cli.output.iter().map(|p| parse_output_pair(p)).collect()
    } else if cli.progress {
        vec![
            OutputSpec {
                formatter: "progressbar".into(),
                path: "stdout".into(),
            },
            OutputSpec {
                formatter: "summary".into(),
                path: "stdout".into(),
            },
            OutputSpec {
                formatter: "sh".into(),
                path: DEFAULT_SCRIPT_PATH.into(),
            },
        ]
    } else {
        let mut outputs = default_outputs();
        outputs.extend(cli.add_output.iter().map(|p| parse_output_pair(p)));
        outputs
    };
    if let Some(stamp) = stamp_output {
        outputs.push(stamp);
    }
    cfg.outputs = outputs;

    for cache_path in &cli.cache {
        if !cache_path.is_file() {
            bail!("there is no cache at '{}'", cache_path.display());
        }
    }
    cfg.cache_paths = cli.cache.clone();

    cfg.ignore_hidden = !cli.hidden;
    cfg.symlinks = if cli.followlinks {
        SymlinkPolicy::Follow
    } else if cli.see_symlinks {
        SymlinkPolicy::SeeAsFile
    } else {
        SymlinkPolicy::Ignore
    };
    cfg.same_device = !cli.no_crossdev;
    cfg.keep_all_tagged = cli.keep_all_tagged;
    cfg.keep_all_untagged = cli.keep_all_untagged;
    if cfg.keep_all_tagged && cfg.keep_all_untagged {
        bail!("can't specify both --keep-all-tagged and --keep-all-untagged");
    }
    cfg.must_match_tagged = cli.must_match_tagged;
    cfg.must_match_untagged = cli.must_match_untagged;
    cfg.find_hardlinked_dupes = cli.hardlinked;
    cfg.match_basename = cli.match_basename;
    cfg.match_extension = cli.match_extension;
    cfg.match_without_extension = cli.match_without_extension;
    cfg.xattr_read = cli.xattr_read;
    cfg.xattr_write = cli.xattr_write;
    cfg.write_unfinished = cli.write_unfinished;

    if cli.merge_directories {
        // Duplicate-dir detection works on complete trees: pull in
        // hidden files and hardlinks unless explicitly disabled.
        cfg.lint.duplicate_dirs = true;
        cfg.ignore_hidden = cli.no_hidden;
        cfg.find_hardlinked_dupes = !cli.no_hardlinked;
    }

    // An explicit color flag wins; otherwise color only a terminal.
    cfg.color = if cli.with_color {
        true
    } else if cli.no_with_color {
        false
    } else {
        stdout_is_tty()
    };

    cfg.roots = collect_roots(&cli.paths)?;
    Ok(cfg)
}

#[cfg(unix)]
fn stdout_is_tty() -> bool {
    unsafe { libc::isatty(libc::STDOUT_FILENO) == 1 && libc::isatty(libc::STDERR_FILENO) == 1 }
}

#[cfg(not(unix))]
fn stdout_is_tty() -> bool {
    false
}
