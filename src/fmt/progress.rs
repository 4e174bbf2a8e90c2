//! Progress bar output built on kdam. One counter bar per phase; the
//! bar tracks cumulative file counts from `Progress` items.

use kdam::{Animation, Bar, BarExt};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use super::Formatter;
use crate::types::{Phase, ReportItem};

#[derive(Default)]
pub struct ProgressBar {
    bar: Option<Arc<Mutex<Bar>>>,
    last_count: u64,
}

impl ProgressBar {
    fn new_bar(desc: &'static str) -> Arc<Mutex<Bar>> {
        Arc::new(Mutex::new(kdam::tqdm!(
            total = 0,
            desc = desc,
            animation = Animation::Classic,
            unit = " files"
        )))
    }

    /// Uses try_lock so a contended bar skips a frame instead of
    /// blocking the output driver.
    fn update(&self, n: usize) {
        if let Some(bar) = &self.bar
            && let Ok(mut bar) = bar.try_lock()
        {
            let _ = bar.update(n);
        }
    }
}

impl Formatter for ProgressBar {
    fn on_state(&mut self, phase: Phase, _out: &mut dyn Write) -> io::Result<()> {
        match phase {
            Phase::PreShutdown | Phase::Summary => {
                // Leave the last bar line in place and stop updating.
                if let Some(bar) = self.bar.take()
                    && let Ok(mut bar) = bar.lock()
                {
                    let _ = bar.refresh();
                    eprintln!();
                }
            }
            _ => {
                self.bar = Some(Self::new_bar(phase.label()));
                self.last_count = 0;
            }
        }
        Ok(())
    }

    fn on_item(&mut self, item: &ReportItem, _out: &mut dyn Write) -> io::Result<()> {
        if let ReportItem::Progress { files, .. } = item {
            let delta = files.saturating_sub(self.last_count);
            self.last_count = *files;
            if delta > 0 {
                self.update(delta as usize);
            }
        }
        Ok(())
    }
}
