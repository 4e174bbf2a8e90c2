//! Shell-script output: a runnable cleanup script the user can inspect
//! and execute. The core itself never deletes anything.

use std::io::{self, Write};

use super::{Formatter, shell_quote};
use crate::types::ReportItem;

#[derive(Default)]
pub struct ShScript {
    cmdline: String,
    header_written: bool,
    /// `-c sh:handler=link` swaps rm for hardlinking duplicates to the
    /// original.
    use_links: bool,
    last_original: Option<std::path::PathBuf>,
}

impl ShScript {
    fn write_header(&mut self, out: &mut dyn Write) -> io::Result<()> {
        if self.header_written {
            return Ok(());
        }
        self.header_written = true;
        writeln!(out, "#!/bin/sh")?;
        writeln!(out, "# This file was autowritten by scour")?;
        writeln!(out, "# Your command line was: {}", self.cmdline)?;
        writeln!(out)?;
        writeln!(out, "ask() {{")?;
        writeln!(out, "  cat << EOF")?;
        writeln!(out, "This script will delete certain files scour found.")?;
        writeln!(out, "It is highly advisable to view the script (or log) first!")?;
        writeln!(out)?;
        writeln!(out, "Execute this script with -d to disable this message.")?;
        writeln!(out, "Hit enter to continue; CTRL-C to abort immediately.")?;
        writeln!(out, "EOF")?;
        writeln!(out, "  read -r _dummy")?;
        writeln!(out, "}}")?;
        writeln!(out)?;
        writeln!(out, "remove_cmd() {{")?;
        writeln!(out, "  echo \"Deleting: $1\"")?;
        writeln!(out, "  rm -rf -- \"$1\"")?;
        writeln!(out, "}}")?;
        writeln!(out)?;
        writeln!(out, "link_cmd() {{")?;
        writeln!(out, "  echo \"Linking: $1 -> $2\"")?;
        writeln!(out, "  rm -f -- \"$1\" && ln -- \"$2\" \"$1\"")?;
        writeln!(out, "}}")?;
        writeln!(out)?;
        writeln!(out, "[ \"$1\" != \"-d\" ] && ask")?;
        writeln!(out)
    }
}

impl Formatter for ShScript {
    fn configure(&mut self, key: &str, value: &str) {
        match key {
            "cmdline" => self.cmdline = value.to_string(),
            "handler" => self.use_links = value == "link",
            _ => {}
        }
    }

    fn on_item(&mut self, item: &ReportItem, out: &mut dyn Write) -> io::Result<()> {
        match item {
            ReportItem::DuplicateFile {
                path, is_original, ..
            } => {
                self.write_header(out)?;
                if *is_original {
                    self.last_original = Some(path.clone());
                    writeln!(out, "# original: {}", shell_quote(path))
                } else if self.use_links
                    && let Some(orig) = &self.last_original
                {
                    writeln!(
                        out,
                        "link_cmd {} {}",
                        shell_quote(path),
                        shell_quote(orig)
                    )
                } else {
                    writeln!(out, "remove_cmd {}", shell_quote(path))
                }
            }
            ReportItem::DuplicateDir {
                path, is_original, ..
            } => {
                self.write_header(out)?;
                if *is_original {
                    writeln!(out, "# original dir: {}", shell_quote(path))
                } else {
                    writeln!(out, "remove_cmd {}", shell_quote(path))
                }
            }
            ReportItem::EmptyFile { path } | ReportItem::BrokenSymlink { path } => {
                self.write_header(out)?;
                writeln!(out, "remove_cmd {}", shell_quote(path))
            }
            ReportItem::EmptyDir { path } => {
                self.write_header(out)?;
                writeln!(out, "rmdir -- {}", shell_quote(path))
            }
            _ => Ok(()),
        }
    }

    fn finish(&mut self, out: &mut dyn Write) -> io::Result<()> {
        self.write_header(out)?;
        writeln!(out)?;
        writeln!(out, "echo \"Done.\"")
    }
}
