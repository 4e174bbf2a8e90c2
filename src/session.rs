//! Session state threaded through the whole pipeline: configuration,
//! counters, cancellation, the digest cache and the output sink. Never
//! a process global; every stage borrows it explicitly.

use anyhow::{Result, bail};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use crate::cache::DigestCache;
use crate::cfg::Cfg;
use crate::digest::HashSeeds;
use crate::fmt::Formats;
use crate::types::{Phase, ReportItem};

/// Concurrent numeric accumulators, shared with worker pools.
#[derive(Default)]
pub struct Counters {
    pub total_files: AtomicU64,
    pub bytes_read: AtomicU64,
    pub dup_files: AtomicU64,
    pub dup_groups: AtomicU64,
    pub dup_dirs: AtomicU64,
    pub empty_files: AtomicU64,
    pub empty_dirs: AtomicU64,
    pub bad_ids: AtomicU64,
    pub broken_symlinks: AtomicU64,
    pub nonstripped: AtomicU64,
    pub rejected: AtomicU64,
    pub unique_files: AtomicU64,
    pub wasted_bytes: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary_item(&self, elapsed_secs: f64) -> ReportItem {
        ReportItem::Summary {
            total_files: self.total_files.load(Ordering::Relaxed),
            dup_files: self.dup_files.load(Ordering::Relaxed),
            dup_groups: self.dup_groups.load(Ordering::Relaxed),
            dup_dirs: self.dup_dirs.load(Ordering::Relaxed),
            empty_files: self.empty_files.load(Ordering::Relaxed),
            empty_dirs: self.empty_dirs.load(Ordering::Relaxed),
            bad_ids: self.bad_ids.load(Ordering::Relaxed),
            broken_symlinks: self.broken_symlinks.load(Ordering::Relaxed),
            nonstripped: self.nonstripped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            wasted_bytes: self.wasted_bytes.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            elapsed_secs,
        }
    }
}

/// The Ctrl+C flag is process-wide because the handler can only be
/// installed once; each new session clears it.
static CANCEL_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

fn cancel_flag() -> Arc<AtomicBool> {
    let flag = CANCEL_FLAG.get_or_init(|| {
        let flag = Arc::new(AtomicBool::new(false));
        let handler_flag = Arc::clone(&flag);
        if let Err(e) = ctrlc::set_handler(move || {
            handler_flag.store(true, Ordering::Relaxed);
        }) {
            log::debug!("no Ctrl+C handler: {}", e);
        }
        flag
    });
    flag.store(false, Ordering::Relaxed);
    Arc::clone(flag)
}

pub struct Session {
    pub cfg: Cfg,
    pub seeds: HashSeeds,
    pub counters: Arc<Counters>,
    pub cancel: Arc<AtomicBool>,
    pub formats: Formats,
    pub cache: Mutex<DigestCache>,
    pub started: Instant,
}

impl Session {
    pub fn new(cfg: Cfg, formats: Formats) -> Result<Self> {
        if cfg.roots.is_empty() {
            bail!("no valid paths given");
        }
        let cache = DigestCache::load(&cfg.cache_paths);
        Ok(Session {
            cfg,
            seeds: HashSeeds::random(),
            counters: Arc::new(Counters::default()),
            cancel: cancel_flag(),
            formats,
            cache: Mutex::new(cache),
            started: Instant::now(),
        })
    }

    pub fn set_state(&self, phase: Phase) {
        self.formats.set_state(phase);
    }

    pub fn emit(&self, item: ReportItem) {
        self.formats.emit(item);
    }

    /// Publish a progress tick for the current phase.
    pub fn progress(&self, phase: Phase) {
        self.emit(ReportItem::Progress {
            phase,
            files: self.counters.total_files.load(Ordering::Relaxed),
            bytes_read: self.counters.bytes_read.load(Ordering::Relaxed),
        });
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Error out of the current phase when the user hit Ctrl+C. Results
    /// already published stay published.
    pub fn check_cancel(&self) -> Result<()> {
        if self.cancelled() {
            bail!("cancelled; partial results were written");
        }
        Ok(())
    }
}
