//! JSON output: a streamed array of finding objects, one per line.

use std::io::{self, Write};

use super::Formatter;
use crate::types::ReportItem;

#[derive(Default)]
pub struct Json {
    opened: bool,
    wrote_any: bool,
    /// `-c json:no_progress=true` drops progress events from the stream.
    no_progress: bool,
}

impl Formatter for Json {
    fn configure(&mut self, key: &str, value: &str) {
        if key == "no_progress" {
            self.no_progress = value != "false";
        }
    }

    fn on_item(&mut self, item: &ReportItem, out: &mut dyn Write) -> io::Result<()> {
        if self.no_progress && matches!(item, ReportItem::Progress { .. }) {
            return Ok(());
        }
        if !self.opened {
            writeln!(out, "[")?;
            self.opened = true;
        }
        let rendered = serde_json::to_string(item).map_err(io::Error::other)?;
        if self.wrote_any {
            writeln!(out, ",")?;
        }
        write!(out, "  {}", rendered)?;
        self.wrote_any = true;
        Ok(())
    }

    fn finish(&mut self, out: &mut dyn Write) -> io::Result<()> {
        if !self.opened {
            writeln!(out, "[")?;
        }
        if self.wrote_any {
            writeln!(out)?;
        }
        writeln!(out, "]")
    }
}
