//! Stamp output: writes the completion time, so a later run can use the
//! file with `--newer-than-stamp`.

use chrono::{SecondsFormat, Utc};
use std::io::{self, Write};

use super::Formatter;

#[derive(Default)]
pub struct Stamp {
    iso8601: bool,
}

impl Formatter for Stamp {
    fn configure(&mut self, key: &str, value: &str) {
        if key == "iso8601" {
            self.iso8601 = value != "false";
        }
    }

    fn finish(&mut self, out: &mut dyn Write) -> io::Result<()> {
        let now = Utc::now();
        if self.iso8601 {
            writeln!(out, "{}", now.to_rfc3339_opts(SecondsFormat::Secs, true))
        } else {
            writeln!(out, "{}", now.timestamp())
        }
    }
}
