//! End-of-run summary line block.

use colored::Colorize;
use std::io::{self, Write};

use super::Formatter;
use crate::types::ReportItem;

pub struct Summary {
    color: bool,
}

impl Summary {
    pub fn new(color: bool) -> Self {
        Summary { color }
    }

    fn bold(&self, s: String) -> String {
        if self.color { s.bold().to_string() } else { s }
    }
}

impl Formatter for Summary {
    fn on_item(&mut self, item: &ReportItem, out: &mut dyn Write) -> io::Result<()> {
        let ReportItem::Summary {
            total_files,
            dup_files,
            dup_groups,
            dup_dirs,
            empty_files,
            empty_dirs,
            bad_ids,
            broken_symlinks,
            nonstripped,
            rejected,
            wasted_bytes,
            bytes_read,
            elapsed_secs,
        } = item
        else {
            return Ok(());
        };

        writeln!(
            out,
            "{}",
            self.bold(format!(
                "==> In total {} files, {} duplicates in {} groups, {} duplicate dirs",
                total_files, dup_files, dup_groups, dup_dirs
            ))
        )?;
        if *empty_files + *empty_dirs + *bad_ids + *broken_symlinks + *nonstripped > 0 {
            writeln!(
                out,
                "==> Other lint: {} empty files, {} empty dirs, {} bad uid/gid, {} broken symlinks, {} non-stripped",
                empty_files, empty_dirs, bad_ids, broken_symlinks, nonstripped
            )?;
        }
        if *rejected > 0 {
            writeln!(out, "==> {} file(s) could not be read", rejected)?;
        }
        writeln!(
            out,
            "==> Wasted {} in duplicates; read {} in {:.3}s",
            human_size(*wasted_bytes),
            human_size(*bytes_read),
            elapsed_secs
        )
    }
}

/// Render a byte count with a binary unit suffix.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::human_size;

    #[test]
    fn sizes_pick_sane_units() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.00 KiB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.00 MiB");
    }
}
