//! The shredder: progressive content-based partition refinement.
//!
//! Candidate groups are refined in rounds. Each round reads the next
//! increment from every member (through the device scheduler), updates
//! the members' digests, and splits the group wherever digests diverge.
//! A fully-read subgroup of two or more is resolved: its members are
//! mutual duplicates. Increments start small and grow geometrically, so
//! files that differ early cost almost nothing and long twins stream in
//! large reads.
//!
//! Members with a digest known from the cache or xattrs never touch the
//! disk: they wait in a per-seed pool and join whichever subgroup
//! arrives at the same final digest.

use anyhow::Result;
use crossbeam_channel::bounded;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::Ordering;

use crate::cfg::Cfg;
use crate::digest::{Digest, DigestKind, hex_string};
use crate::preprocess::{group_is_reportable, is_kept, original_cmp};
use crate::sched::{ReadReply, ReadRequest, Scheduler, order_hint};
use crate::session::Session;
use crate::treemerge::{TreeMerger, count_file_group};
use crate::types::{Classification, FileRecord, Phase, ReportItem};
use crate::utils::config::ShredConsts;
use crate::xattr;

struct Member {
    rec: FileRecord,
    digest: Digest,
    /// Bytes read this round; doubles as the paranoid partition key.
    buf: Vec<u8>,
    failed: Option<String>,
}

struct Group {
    members: Vec<Member>,
    /// Index of the seed pool this group descends from.
    seed: usize,
    /// Clamp window `[start, end)`; identical for all members since
    /// they share a size.
    window: (u64, u64),
    /// Bytes hashed so far, relative to the window start.
    progress: u64,
    generation: u32,
}

impl Group {
    fn window_len(&self) -> u64 {
        self.window.1 - self.window.0
    }

    fn remaining(&self) -> u64 {
        self.window_len() - self.progress
    }
}

/// Cached-digest members waiting for an incremental subgroup to reach
/// their digest.
struct SeedPool {
    cached: Vec<FileRecord>,
}

/// Group storage with stable integer ids; ids of dead groups are
/// reused.
#[derive(Default)]
struct Arena {
    slots: Vec<Option<Group>>,
    free: Vec<usize>,
}

impl Arena {
    fn alloc(&mut self, group: Group) -> usize {
        match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(group);
                id
            }
            None => {
                self.slots.push(Some(group));
                self.slots.len() - 1
            }
        }
    }

    fn take(&mut self, id: usize) -> Option<Group> {
        let group = self.slots.get_mut(id)?.take();
        if group.is_some() {
            self.free.push(id);
        }
        group
    }

    fn get(&self, id: usize) -> Option<&Group> {
        self.slots.get(id)?.as_ref()
    }

    fn get_mut(&mut self, id: usize) -> Option<&mut Group> {
        self.slots.get_mut(id)?.as_mut()
    }

    fn active_ids(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i))
            .collect()
    }
}

/// Run the refinement until every group is resolved or dissolved.
pub fn shred(
    session: &Session,
    scheduler: &Scheduler,
    seed_groups: Vec<Vec<FileRecord>>,
    mut merger: Option<&mut TreeMerger>,
) -> Result<()> {
    let cfg = &session.cfg;
    let mut arena = Arena::default();
    let mut pools: Vec<SeedPool> = Vec::new();
    let mut group_seq = 0u64;

    for records in seed_groups {
        seed_group(session, &mut arena, &mut pools, &mut merger, records);
    }
    debug!(
        "shredder: {} live groups, {} seed pools",
        arena.active_ids().len(),
        pools.len()
    );

    let mut round = 0u32;
    loop {
        if session.cancelled() {
            info!("shredder stopped early; emitting what is resolved");
            break;
        }
        let active = arena.active_ids();
        if active.is_empty() {
            break;
        }
        round += 1;

        let incs = plan_increments(&arena, &active, cfg);
        let effective = execute_reads(scheduler, &mut arena, &active, &incs);

        for &id in &active {
            if let Some(group) = arena.get_mut(id) {
                group.members.par_iter_mut().for_each(|m| {
                    if m.failed.is_none() && !m.buf.is_empty() {
                        m.digest.update(&m.buf);
                    }
                });
            }
        }

        for &id in &active {
            let Some(group) = arena.take(id) else {
                continue;
            };
            let inc_eff = effective.get(&id).copied().unwrap_or(0);
            partition_group(
                session,
                &mut arena,
                &mut pools,
                &mut merger,
                &mut group_seq,
                group,
                inc_eff,
            );
        }
        session.progress(Phase::Shred);
    }
    debug!("shredder: finished after {} round(s)", round);

    flush_pools(session, &mut merger, pools, &mut group_seq);
    Ok(())
}

/// Split a seed into cached pool members and live members; lone live
/// members with no cached peers are unique immediately.
fn seed_group(
    session: &Session,
    arena: &mut Arena,
    pools: &mut Vec<SeedPool>,
    merger: &mut Option<&mut TreeMerger>,
    records: Vec<FileRecord>,
) {
    let cfg = &session.cfg;
    let seed = pools.len();
    let mut cached = Vec::new();
    let mut live = Vec::new();
    for rec in records {
        if rec.cached_digest.is_some() {
            cached.push(rec);
        } else {
            live.push(rec);
        }
    }
    let size = live
        .first()
        .or_else(|| cached.first())
        .map(|r| r.size)
        .unwrap_or(0);
    let window = cfg.clamp.window(size);
    let has_cached = !cached.is_empty();
    pools.push(SeedPool { cached });

    if live.len() == 1 && !has_cached {
        if let Some(rec) = live.pop() {
            classify_unique(session, merger, rec, None);
        }
        return;
    }
    if live.is_empty() {
        return;
    }
    let members = live
        .into_iter()
        .map(|rec| Member {
            digest: Digest::new(cfg.algorithm, session.seeds),
            rec,
            buf: Vec::new(),
            failed: None,
        })
        .collect();
    arena.alloc(Group {
        members,
        seed,
        window,
        progress: 0,
        generation: 0,
    });
}

/// Pick this round's increment per group: geometric growth with a
/// ceiling, a paranoid-memory clamp, and a per-device byte budget that
/// halves greedy groups until the round fits.
fn plan_increments(arena: &Arena, active: &[usize], cfg: &Cfg) -> HashMap<usize, u64> {
    let mut incs = HashMap::new();
    for &id in active {
        let Some(group) = arena.get(id) else { continue };
        let growth = ShredConsts::INCREMENT_GROWTH.saturating_pow(group.generation.min(8));
        let mut inc = ShredConsts::FIRST_INCREMENT
            .saturating_mul(growth)
            .min(ShredConsts::MAX_INCREMENT);
        if cfg.algorithm == DigestKind::Paranoid {
            let per_member = cfg.paranoid_mem / group.members.len().max(1) as u64;
            inc = inc.min(per_member.max(ShredConsts::FIRST_INCREMENT));
        }
        incs.insert(id, inc.min(group.remaining()).max(1));
    }

    for _ in 0..16 {
        let mut per_dev: HashMap<u64, u64> = HashMap::new();
        for &id in active {
            let (Some(group), Some(inc)) = (arena.get(id), incs.get(&id)) else {
                continue;
            };
            for m in &group.members {
                *per_dev.entry(m.rec.dev).or_default() += *inc;
            }
        }
        let over: HashSet<u64> = per_dev
            .into_iter()
            .filter(|(_, total)| *total > ShredConsts::DEVICE_ROUND_BUDGET)
            .map(|(dev, _)| dev)
            .collect();
        if over.is_empty() {
            break;
        }
        let mut changed = false;
        for &id in active {
            let Some(group) = arena.get(id) else { continue };
            if !group.members.iter().any(|m| over.contains(&m.rec.dev)) {
                continue;
            }
            if let Some(inc) = incs.get_mut(&id)
                && *inc > ShredConsts::FIRST_INCREMENT
            {
                *inc = (*inc / 2).max(ShredConsts::FIRST_INCREMENT);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    incs
}

/// Submit every member's read for this round and collect the replies
/// into the members' buffers. Returns the effective read length per
/// group.
fn execute_reads(
    scheduler: &Scheduler,
    arena: &mut Arena,
    active: &[usize],
    incs: &HashMap<usize, u64>,
) -> HashMap<usize, u64> {
    let mut tokens: Vec<(usize, usize)> = Vec::new();
    let mut effective: HashMap<usize, u64> = HashMap::new();
    let expected: usize = active
        .iter()
        .filter_map(|id| arena.get(*id).map(|g| g.members.len()))
        .sum();
    let (reply_tx, reply_rx) = bounded::<ReadReply>(expected.max(1));

    for &id in active {
        let Some(group) = arena.get(id) else { continue };
        let Some(&inc) = incs.get(&id) else { continue };
        let inc = inc.min(group.remaining());
        if inc == 0 {
            continue;
        }
        effective.insert(id, inc);
        let offset = group.window.0 + group.progress;
        for (mi, m) in group.members.iter().enumerate() {
            let hint = if scheduler.class_of(m.rec.dev).is_rotational() {
                order_hint(&m.rec.path, offset, m.rec.inode)
            } else {
                m.rec.inode
            };
            let token = tokens.len();
            tokens.push((id, mi));
            scheduler.submit(m.rec.dev, ReadRequest {
                token,
                path: m.rec.path.clone(),
                offset,
                len: inc as usize,
                order_hint: hint,
                reply: reply_tx.clone(),
            });
        }
    }
    drop(reply_tx);

    let mut answered = vec![false; tokens.len()];
    while let Ok(reply) = reply_rx.recv() {
        answered[reply.token] = true;
        let (gid, mi) = tokens[reply.token];
        let Some(group) = arena.get_mut(gid) else {
            continue;
        };
        let want = effective.get(&gid).copied().unwrap_or(0);
        let member = &mut group.members[mi];
        match reply.result {
            Ok(data) => {
                // A short read means the file shrank under us.
                if data.len() as u64 != want {
                    member.failed = Some("file changed while reading".to_string());
                } else {
                    member.buf = data;
                }
            }
            Err(err) => member.failed = Some(err.to_string()),
        }
    }
    // A dropped request (dead device worker) must not leave its member
    // looking identical to peers that did read.
    for (token, (gid, mi)) in tokens.iter().enumerate() {
        if !answered[token]
            && let Some(group) = arena.get_mut(*gid)
            && group.members[*mi].failed.is_none()
        {
            group.members[*mi].failed = Some("no reply from read scheduler".to_string());
        }
    }
    effective
}

/// Split one group on this round's partition key and route every part
/// to its next state.
fn partition_group(
    session: &Session,
    arena: &mut Arena,
    pools: &mut [SeedPool],
    merger: &mut Option<&mut TreeMerger>,
    group_seq: &mut u64,
    mut group: Group,
    inc_eff: u64,
) {
    let cfg = &session.cfg;
    group.progress += inc_eff;

    // Paranoid groups partition on the raw bytes while the round's peer
    // buffers fit in the budget; beyond that the running hash takes
    // over.
    let paranoid_bytes = cfg.algorithm == DigestKind::Paranoid
        && (group.members.len() as u64).saturating_mul(inc_eff) <= cfg.paranoid_mem;

    let mut parts: BTreeMap<Vec<u8>, Vec<Member>> = BTreeMap::new();
    for mut m in group.members.drain(..) {
        if let Some(err) = m.failed.take() {
            reject_member(session, merger, m.rec, &err);
            continue;
        }
        let key = if paranoid_bytes {
            std::mem::take(&mut m.buf)
        } else {
            m.digest.snapshot()
        };
        m.buf = Vec::new();
        parts.entry(key).or_default().push(m);
    }

    let resolved = group.progress >= group.window_len();
    for (_, part) in parts {
        if resolved {
            resolve_part(session, pools, merger, group_seq, part, group.seed, group.progress);
        } else if part.len() >= 2 || !pools[group.seed].cached.is_empty() {
            arena.alloc(Group {
                members: part,
                seed: group.seed,
                window: group.window,
                progress: group.progress,
                generation: group.generation + 1,
            });
        } else {
            for m in part {
                let partial = (m.digest.snapshot(), group.progress);
                classify_unique(session, merger, m.rec, Some(partial));
            }
        }
    }
}

/// A fully-read part: merge in cached members with the same final
/// digest, then either report the group or mark the loner unique.
fn resolve_part(
    session: &Session,
    pools: &mut [SeedPool],
    merger: &mut Option<&mut TreeMerger>,
    group_seq: &mut u64,
    part: Vec<Member>,
    seed: usize,
    progress: u64,
) {
    let Some(first) = part.first() else { return };
    let digest = first.digest.snapshot();

    let mut records: Vec<FileRecord> = part
        .into_iter()
        .map(|mut m| {
            m.rec.read_offset = progress;
            m.rec
        })
        .collect();

    let pool = &mut pools[seed];
    if !pool.cached.is_empty() {
        let (matched, rest): (Vec<_>, Vec<_>) = pool
            .cached
            .drain(..)
            .partition(|r| r.cached_digest.as_deref() == Some(digest.as_slice()));
        pool.cached = rest;
        records.extend(matched);
    }

    finish_resolved(session, merger, group_seq, records, digest, progress);
}

/// Leftover cached members never met an incremental subgroup; they can
/// still pair up among themselves, all without a single read.
fn flush_pools(
    session: &Session,
    merger: &mut Option<&mut TreeMerger>,
    pools: Vec<SeedPool>,
    group_seq: &mut u64,
) {
    for pool in pools {
        if pool.cached.is_empty() {
            continue;
        }
        let mut by_digest: BTreeMap<Vec<u8>, Vec<FileRecord>> = BTreeMap::new();
        for rec in pool.cached {
            let digest = rec.cached_digest.clone().unwrap_or_default();
            by_digest.entry(digest).or_default().push(rec);
        }
        for (digest, records) in by_digest {
            finish_resolved(session, merger, group_seq, records, digest, 0);
        }
    }
}

fn finish_resolved(
    session: &Session,
    merger: &mut Option<&mut TreeMerger>,
    group_seq: &mut u64,
    mut records: Vec<FileRecord>,
    digest: Vec<u8>,
    progress: u64,
) {
    let cfg = &session.cfg;
    if records.len() >= 2 && group_is_reportable(&records, cfg) {
        emit_group(session, merger, group_seq, records, digest);
    } else if records.len() == 1 {
        if let Some(rec) = records.pop() {
            let partial = (progress > 0).then(|| (digest, progress));
            classify_unique(session, merger, rec, partial);
        }
    } else {
        // Content-wise duplicates, but the tag matrix leaves nothing to
        // report. Unique for all bookkeeping purposes.
        for rec in records {
            classify_unique(session, merger, rec, None);
        }
    }
}

/// Report one resolved duplicate group: pick the original, expand
/// hardlink followers, feed cache/xattr/merger.
fn emit_group(
    session: &Session,
    merger: &mut Option<&mut TreeMerger>,
    group_seq: &mut u64,
    mut records: Vec<FileRecord>,
    digest: Vec<u8>,
) {
    let cfg = &session.cfg;
    records.sort_by(|a, b| original_cmp(a, b, cfg));
    *group_seq += 1;
    let gid = *group_seq;
    let hex = hex_string(&digest);

    let mut items = Vec::new();
    for (i, rec) in records.iter_mut().enumerate() {
        let keep = i == 0 || is_kept(rec, cfg);
        rec.state = if keep {
            Classification::Original
        } else {
            Classification::Duplicate
        };
        items.push(ReportItem::DuplicateFile {
            group: gid,
            path: rec.path.clone(),
            size: rec.size,
            digest: hex.clone(),
            is_original: keep,
        });
        if cfg.find_hardlinked_dupes {
            for link in &rec.hardlinks {
                items.push(ReportItem::DuplicateFile {
                    group: gid,
                    path: link.path.clone(),
                    size: link.size,
                    digest: hex.clone(),
                    is_original: is_kept(link, cfg),
                });
            }
        }
    }

    {
        let mut cache = session.cache.lock().unwrap();
        for rec in &records {
            cache.record(&rec.path, cfg.algorithm, &digest, rec.size, rec.mtime);
        }
    }
    if cfg.xattr_write {
        for rec in &records {
            if let Err(e) =
                xattr::write_cached_digest(&rec.path, cfg.algorithm, &digest, rec.size, rec.mtime)
            {
                warn!("cannot write xattr on {}: {}", rec.path.display(), e);
            }
        }
    }

    match merger {
        Some(m) => {
            for rec in &records {
                m.file_resolved(&rec.path, &digest);
                for link in &rec.hardlinks {
                    m.file_resolved(&link.path, &digest);
                }
            }
            m.hold_group(items);
        }
        None => {
            count_file_group(session, &items);
            for item in items {
                session.emit(item);
            }
        }
    }
}

fn classify_unique(
    session: &Session,
    merger: &mut Option<&mut TreeMerger>,
    mut rec: FileRecord,
    partial: Option<(Vec<u8>, u64)>,
) {
    rec.state = Classification::Unique;
    session
        .counters
        .unique_files
        .fetch_add(1, Ordering::Relaxed);
    if session.cfg.write_unfinished
        && let Some((digest, offset)) = partial
    {
        session.emit(ReportItem::Unfinished {
            path: rec.path.clone(),
            digest: hex_string(&digest),
            read_offset: offset,
            size: rec.size,
        });
    }
    if let Some(m) = merger {
        m.file_unique(&rec.path);
        for link in &rec.hardlinks {
            m.file_unique(&link.path);
        }
    }
}

fn reject_member(
    session: &Session,
    merger: &mut Option<&mut TreeMerger>,
    mut rec: FileRecord,
    err: &str,
) {
    warn!("cannot read {}: {}", rec.path.display(), err);
    rec.state = Classification::Rejected;
    session.counters.rejected.fetch_add(1, Ordering::Relaxed);
    if let Some(m) = merger {
        m.file_unique(&rec.path);
        for link in &rec.hardlinks {
            m.file_unique(&link.path);
        }
    }
}
