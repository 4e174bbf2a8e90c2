//! Option sub-grammar tests: sizes, ranges, clamps, lint types,
//! timestamps, output pairs, sort criteria.

use scour::cfg::{ClampSpec, LintTypes};
use scour::cli::parse::{
    parse_clamp, parse_config_entry, parse_lint_types, parse_output_pair, parse_sort_criteria,
    parse_timestamp, size_range_to_bytes, size_string_to_bytes,
};

// --- size_string_to_bytes ---

#[test]
fn test_size_plain_number() {
    assert_eq!(size_string_to_bytes("512").unwrap(), 512);
    assert_eq!(size_string_to_bytes("0").unwrap(), 0);
}

#[test]
fn test_size_suffixes() {
    assert_eq!(size_string_to_bytes("1k").unwrap(), 1000);
    assert_eq!(size_string_to_bytes("1kb").unwrap(), 1024);
    assert_eq!(size_string_to_bytes("2m").unwrap(), 2_000_000);
    assert_eq!(size_string_to_bytes("2mb").unwrap(), 2 * 1024 * 1024);
    assert_eq!(size_string_to_bytes("1g").unwrap(), 1_000_000_000);
    assert_eq!(size_string_to_bytes("1b").unwrap(), 512);
    assert_eq!(size_string_to_bytes("4c").unwrap(), 4);
    assert_eq!(size_string_to_bytes("3w").unwrap(), 6);
}

#[test]
fn test_size_fractional_and_case() {
    assert_eq!(size_string_to_bytes("1.5kb").unwrap(), 1536);
    assert_eq!(size_string_to_bytes("1KB").unwrap(), 1024);
    assert_eq!(size_string_to_bytes("1 kb").unwrap(), 1024);
}

#[test]
fn test_size_errors() {
    assert!(size_string_to_bytes("").is_err());
    assert!(size_string_to_bytes("abc").is_err());
    assert!(size_string_to_bytes("1xyz").is_err());
}

// --- size_range_to_bytes ---

#[test]
fn test_range_min_and_max() {
    assert_eq!(size_range_to_bytes("1k-1m").unwrap(), (1000, 1_000_000));
}

#[test]
fn test_range_single_value_sets_min_only() {
    assert_eq!(size_range_to_bytes("4kb").unwrap(), (4096, u64::MAX));
}

#[test]
fn test_range_max_below_min_rejected() {
    assert!(size_range_to_bytes("1m-1k").is_err());
    assert!(size_range_to_bytes("1k-").is_err());
}

// --- parse_clamp ---

#[test]
fn test_clamp_percent() {
    assert_eq!(parse_clamp("10%").unwrap(), ClampSpec::Factor(0.1));
    assert_eq!(parse_clamp("100%").unwrap(), ClampSpec::Factor(1.0));
}

#[test]
fn test_clamp_fraction() {
    assert_eq!(parse_clamp("0.25").unwrap(), ClampSpec::Factor(0.25));
}

#[test]
fn test_clamp_absolute() {
    assert_eq!(parse_clamp("4kb").unwrap(), ClampSpec::Offset(4096));
    assert_eq!(parse_clamp("100").unwrap(), ClampSpec::Offset(100));
}

#[test]
fn test_clamp_out_of_range_factor() {
    assert!(parse_clamp("150%").is_err());
    assert!(parse_clamp("1.5").is_err());
}

// --- parse_lint_types ---

#[test]
fn test_lint_types_bare_name_resets() {
    let mut lint = LintTypes::defaults();
    parse_lint_types("duplicates", &mut lint).unwrap();
    assert!(lint.duplicates);
    assert!(!lint.empty_files);
    assert!(!lint.bad_ids);
}

#[test]
fn test_lint_types_defaults_minus_one() {
    let mut lint = LintTypes::none();
    parse_lint_types("defaults,-emptyfiles", &mut lint).unwrap();
    assert!(lint.duplicates);
    assert!(lint.empty_dirs);
    assert!(!lint.empty_files);
    assert!(!lint.duplicate_dirs);
}

#[test]
fn test_lint_types_aliases_and_separator_inference() {
    let mut lint = LintTypes::none();
    parse_lint_types("df:+dd:+ef", &mut lint).unwrap();
    assert!(lint.duplicates);
    assert!(lint.duplicate_dirs);
    assert!(lint.empty_files);
    assert!(!lint.broken_links);
}

#[test]
fn test_lint_types_all_and_none() {
    let mut lint = LintTypes::none();
    parse_lint_types("all", &mut lint).unwrap();
    assert!(lint.nonstripped && lint.duplicate_dirs && lint.duplicates);

    parse_lint_types("none", &mut lint).unwrap();
    assert!(!lint.duplicates && !lint.empty_files && !lint.bad_ids);
}

#[test]
fn test_lint_types_unknown_is_skipped() {
    let mut lint = LintTypes::none();
    parse_lint_types("duplicates,+nosuchtype", &mut lint).unwrap();
    assert!(lint.duplicates);
}

// --- parse_timestamp ---

#[test]
fn test_timestamp_plain_epoch() {
    assert_eq!(parse_timestamp("1700000000").unwrap(), 1_700_000_000);
}

#[test]
fn test_timestamp_iso8601() {
    let stamp = parse_timestamp("2006-02-03T16:45:09.000Z").unwrap();
    assert_eq!(stamp, 1_138_985_109);
}

#[test]
fn test_timestamp_garbage_rejected() {
    assert!(parse_timestamp("not a time").is_err());
    assert!(parse_timestamp("-5").is_err());
    assert!(parse_timestamp("0").is_err());
}

// --- parse_output_pair / parse_config_entry ---

#[test]
fn test_output_pair_with_and_without_path() {
    let spec = parse_output_pair("json:/tmp/out.json");
    assert_eq!(spec.formatter, "json");
    assert_eq!(spec.path, "/tmp/out.json");

    let spec = parse_output_pair("pretty");
    assert_eq!(spec.formatter, "pretty");
    assert_eq!(spec.path, "stdout");
}

#[test]
fn test_config_entry_forms() {
    let entry = parse_config_entry("sh:handler=link").unwrap();
    assert_eq!(
        (entry.formatter.as_str(), entry.key.as_str(), entry.value.as_str()),
        ("sh", "handler", "link")
    );

    let entry = parse_config_entry("json:no_progress").unwrap();
    assert_eq!(entry.value, "1");

    assert!(parse_config_entry("nokey").is_none());
    assert!(parse_config_entry("fmt:").is_none());
}

// --- parse_sort_criteria ---

#[test]
fn test_sort_criteria_validation() {
    assert!(parse_sort_criteria("pma").is_ok());
    assert!(parse_sort_criteria("AMP").is_ok());
    assert!(parse_sort_criteria("").is_err());
    assert!(parse_sort_criteria("xyz").is_err());
}
