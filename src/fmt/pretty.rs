//! Human-readable output: one action line per finding, grouped under a
//! comment header per lint kind.

use colored::Colorize;
use std::io::{self, Write};

use super::{Formatter, shell_quote};
use crate::types::ReportItem;

pub struct Pretty {
    color: bool,
    last_header: Option<&'static str>,
}

impl Pretty {
    pub fn new(color: bool) -> Self {
        Pretty {
            color,
            last_header: None,
        }
    }

    fn paint(&self, line: String, is_keep: bool) -> String {
        if !self.color {
            return line;
        }
        if is_keep {
            line.green().to_string()
        } else {
            line.red().to_string()
        }
    }

    fn header_for(item: &ReportItem) -> Option<&'static str> {
        match item {
            ReportItem::DuplicateFile { .. } => Some("# Duplicate(s):"),
            ReportItem::DuplicateDir { .. } => Some("# Duplicate directorie(s):"),
            ReportItem::EmptyFile { .. } => Some("# Empty file(s):"),
            ReportItem::EmptyDir { .. } => Some("# Empty dir(s):"),
            ReportItem::BadId { .. } => Some("# Bad UID/GID file(s):"),
            ReportItem::BrokenSymlink { .. } => Some("# Broken symlink(s):"),
            ReportItem::NonStripped { .. } => Some("# Non-stripped binarie(s):"),
            ReportItem::Unfinished { .. } => Some("# Unfinished checksum(s):"),
            _ => None,
        }
    }
}

impl Formatter for Pretty {
    fn on_item(&mut self, item: &ReportItem, out: &mut dyn Write) -> io::Result<()> {
        let Some(header) = Self::header_for(item) else {
            return Ok(());
        };
        if self.last_header != Some(header) {
            writeln!(out, "{}", header)?;
            self.last_header = Some(header);
        }
        let line = match item {
            ReportItem::DuplicateFile {
                path, is_original, ..
            } => {
                if *is_original {
                    self.paint(format!("    ls {}", shell_quote(path)), true)
                } else {
                    self.paint(format!("    rm {}", shell_quote(path)), false)
                }
            }
            ReportItem::DuplicateDir {
                path, is_original, ..
            } => {
                if *is_original {
                    self.paint(format!("    ls -la {}", shell_quote(path)), true)
                } else {
                    self.paint(format!("    rm -rf {}", shell_quote(path)), false)
                }
            }
            ReportItem::EmptyFile { path } | ReportItem::BrokenSymlink { path } => {
                self.paint(format!("    rm {}", shell_quote(path)), false)
            }
            ReportItem::EmptyDir { path } => {
                self.paint(format!("    rmdir {}", shell_quote(path)), false)
            }
            ReportItem::BadId { path, uid, gid } => {
                format!("    chown {}:{} {}", uid, gid, shell_quote(path))
            }
            ReportItem::NonStripped { path } => {
                format!("    strip -s {}", shell_quote(path))
            }
            ReportItem::Unfinished {
                path,
                digest,
                read_offset,
                ..
            } => {
                format!("    # {} @{} {}", digest, read_offset, shell_quote(path))
            }
            _ => return Ok(()),
        };
        writeln!(out, "{}", line)
    }
}
