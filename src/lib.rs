//! scour: filesystem lint finder.
//!
//! Finds duplicate files and directories, empty files and dirs, broken
//! symlinks, bad UID/GID files and non-stripped binaries, and reports
//! them through pluggable formatters. The core pipeline is
//! traversal -> preprocessing -> shredder -> tree merge; see the module
//! docs for each stage.

pub mod cache;
pub mod cfg;
pub mod cli;
pub mod digest;
pub mod elf;
pub mod fmt;
pub mod mounts;
pub mod preprocess;
pub mod sched;
pub mod session;
pub mod shred;
pub mod traverse;
pub mod treemerge;
pub mod types;
pub mod utils;
pub mod xattr;

pub use cfg::Cfg;
pub use types::*;

use anyhow::Result;
use log::{debug, warn};
use std::sync::Arc;

use crate::mounts::DeviceMap;
use crate::sched::Scheduler;
use crate::session::Session;
use crate::treemerge::TreeMerger;

/// Run a full scan with `cfg`. `cmdline` is echoed into outputs that
/// record how they were produced (the shell script header).
pub fn run(cfg: Cfg, cmdline: &str) -> Result<()> {
    let formats = fmt::Formats::new(&cfg.outputs, &cfg.fmt_config, cfg.color, cmdline)?;
    let mut session = Session::new(cfg, formats)?;
    run_session(&mut session)
}

/// The orchestrator: drives the phase machine and notifies the
/// formatters at every transition. Phases are strictly sequential; the
/// parallelism lives inside each phase's worker pools.
fn run_session(session: &mut Session) -> Result<()> {
    session.set_state(Phase::Init);
    let devices = DeviceMap::new();

    session.set_state(Phase::Traverse);
    let traversed = traverse::traverse(session, &devices);
    debug!(
        "traversal: {} duplicate candidates, {} bystanders",
        traversed.files.len(),
        traversed.other_files.len()
    );

    session.set_state(Phase::Preprocess);
    let pre = preprocess::preprocess(session, traversed.files);

    let mut merger = session
        .cfg
        .lint
        .duplicate_dirs
        .then(|| TreeMerger::new(session.cfg.roots.clone()));
    if let Some(m) = merger.as_mut() {
        for group in &pre.groups {
            for rec in group {
                m.register_file(&rec.path, true);
                for link in &rec.hardlinks {
                    m.register_file(&link.path, true);
                }
            }
        }
        for rec in &pre.uniques {
            m.register_file(&rec.path, false);
            for link in &rec.hardlinks {
                m.register_file(&link.path, false);
            }
        }
        for path in &traversed.other_files {
            m.register_file(path, false);
        }
    }

    if session.cfg.lint.duplicates || session.cfg.lint.duplicate_dirs {
        session.set_state(Phase::Shred);
        let scheduler = Scheduler::new(
            devices,
            session.cfg.threads,
            Arc::clone(&session.counters),
            Arc::clone(&session.cancel),
        );
        shred::shred(session, &scheduler, pre.groups, merger.as_mut())?;
        scheduler.shutdown();
    }

    if let Some(m) = merger {
        session.set_state(Phase::Merge);
        m.finalize(session);
    }

    if let Some(cache_path) = session.cfg.cache_paths.first()
        && let Err(e) = session.cache.lock().unwrap().write(cache_path)
    {
        warn!("cannot write digest cache: {:#}", e);
    }

    session.set_state(Phase::PreShutdown);
    session.set_state(Phase::Summary);
    let elapsed = session.started.elapsed().as_secs_f64();
    session.emit(session.counters.summary_item(elapsed));
    session.formats.close();
    Ok(())
}
