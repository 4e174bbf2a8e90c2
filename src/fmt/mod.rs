//! Output plugins and the sink that drives them.
//!
//! Workers publish [`ReportItem`]s into a bounded channel; a single
//! driver thread fans each event out to every registered output. A
//! formatter is a name plus a capability set (configure, state change,
//! item, finish); several outputs may share one destination, including
//! `stdout`.

mod json;
mod pretty;
mod progress;
mod sh;
mod stamp;
mod summary;

use anyhow::{Result, bail};
use crossbeam_channel::{Sender, bounded};
use log::warn;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::thread::{self, JoinHandle};

use crate::cfg::{FmtConfig, OutputSpec};
use crate::types::{Phase, ReportItem};
use crate::utils::config::ChannelCaps;

/// One output plugin. All methods default to no-ops so a formatter only
/// implements what it cares about.
pub trait Formatter: Send {
    fn configure(&mut self, _key: &str, _value: &str) {}
    fn on_state(&mut self, _phase: Phase, _out: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }
    fn on_item(&mut self, _item: &ReportItem, _out: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }
    /// Called once after the last event, before the writer is flushed.
    fn finish(&mut self, _out: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }
}

/// Known formatter names, in help order.
pub const FORMATTER_NAMES: [&str; 6] = ["pretty", "summary", "sh", "json", "progressbar", "stamp"];

fn build(name: &str, color: bool) -> Option<Box<dyn Formatter>> {
    match name {
        "pretty" => Some(Box::new(pretty::Pretty::new(color))),
        "summary" => Some(Box::new(summary::Summary::new(color))),
        "sh" => Some(Box::new(sh::ShScript::default())),
        "json" => Some(Box::new(json::Json::default())),
        "progressbar" => Some(Box::new(progress::ProgressBar::default())),
        "stamp" => Some(Box::new(stamp::Stamp::default())),
        _ => None,
    }
}

enum OutSink {
    Stdout,
    File(BufWriter<File>),
}

impl OutSink {
    fn open(path: &str) -> io::Result<Self> {
        if path == "stdout" {
            Ok(OutSink::Stdout)
        } else {
            Ok(OutSink::File(BufWriter::new(File::create(path)?)))
        }
    }
}

impl Write for OutSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutSink::Stdout => io::stdout().lock().write(buf),
            OutSink::File(f) => f.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutSink::Stdout => io::stdout().lock().flush(),
            OutSink::File(f) => f.flush(),
        }
    }
}

struct OutputSlot {
    name: String,
    formatter: Box<dyn Formatter>,
    sink: OutSink,
    /// Set after the first write error so each broken output warns once.
    broken: bool,
}

enum FmtEvent {
    State(Phase),
    Item(ReportItem),
}

/// Handle to the running output driver. Cloneable senders are cheap; the
/// driver joins on [`Formats::close`].
pub struct Formats {
    tx: Option<Sender<FmtEvent>>,
    handle: Option<JoinHandle<()>>,
}

impl Formats {
    /// Open every configured output, apply `FMT:KEY[=VAL]` entries, and
    /// start the driver thread. Unknown formatter names and unopenable
    /// paths are configuration errors.
    pub fn new(
        outputs: &[OutputSpec],
        fmt_config: &[FmtConfig],
        color: bool,
        cmdline: &str,
    ) -> Result<Self> {
        let mut slots = Vec::with_capacity(outputs.len());
        for spec in outputs {
            let Some(mut formatter) = build(&spec.formatter, color) else {
                bail!("unknown formatter '{}'", spec.formatter);
            };
            formatter.configure("cmdline", cmdline);
            for entry in fmt_config {
                if entry.formatter == spec.formatter {
                    formatter.configure(&entry.key, &entry.value);
                }
            }
            let sink = OutSink::open(&spec.path)
                .map_err(|e| anyhow::anyhow!("cannot open output '{}': {}", spec.path, e))?;
            slots.push(OutputSlot {
                name: spec.formatter.clone(),
                formatter,
                sink,
                broken: false,
            });
        }

        let (tx, rx) = bounded::<FmtEvent>(ChannelCaps::SINK);
        let handle = thread::spawn(move || {
            while let Ok(event) = rx.recv() {
                for slot in &mut slots {
                    dispatch(slot, &event);
                }
            }
            for slot in &mut slots {
                let res = slot
                    .formatter
                    .finish(&mut slot.sink)
                    .and_then(|_| slot.sink.flush());
                if let Err(e) = res
                    && !slot.broken
                {
                    warn!("output '{}' failed: {}", slot.name, e);
                }
            }
        });

        Ok(Formats {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn set_state(&self, phase: Phase) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(FmtEvent::State(phase));
        }
    }

    pub fn emit(&self, item: ReportItem) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(FmtEvent::Item(item));
        }
    }

    /// Drain the queue, run every formatter's `finish`, and join the
    /// driver.
    pub fn close(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Formats {
    fn drop(&mut self) {
        self.close();
    }
}

fn dispatch(slot: &mut OutputSlot, event: &FmtEvent) {
    let res = match event {
        FmtEvent::State(phase) => slot.formatter.on_state(*phase, &mut slot.sink),
        FmtEvent::Item(item) => slot.formatter.on_item(item, &mut slot.sink),
    };
    if let Err(e) = res {
        if !slot.broken {
            warn!("output '{}' failed: {}", slot.name, e);
        }
        slot.broken = true;
    }
}

/// Escape a path for single-quoted POSIX shell interpolation.
pub(crate) fn shell_quote(path: &std::path::Path) -> String {
    let raw = path.to_string_lossy();
    format!("'{}'", raw.replace('\'', r"'\''"))
}
