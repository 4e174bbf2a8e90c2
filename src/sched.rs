//! Per-device read scheduler.
//!
//! Every physical device gets its own worker set: rotational disks a
//! single worker that issues reads in ascending physical-offset order,
//! solid-state devices a pool that takes requests as they come. The
//! reorder window on rotating disks is one drained batch: requests that
//! arrive while a sorted batch is in flight wait for it, so a stream of
//! low-offset arrivals cannot starve anything already queued.

use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::mounts::{DeviceMap, DiskClass};
use crate::session::Counters;
use crate::utils::config::{ChannelCaps, SchedConsts};
use crate::utils::fd_limit::read_worker_cap;

/// One read to perform. `order_hint` is the physical offset of the read
/// window when the filesystem told us, the inode otherwise; it only
/// matters on rotational devices.
pub struct ReadRequest {
    pub token: usize,
    pub path: PathBuf,
    pub offset: u64,
    pub len: usize,
    pub order_hint: u64,
    pub reply: Sender<ReadReply>,
}

pub struct ReadReply {
    pub token: usize,
    pub result: io::Result<Vec<u8>>,
}

struct DeviceHandle {
    tx: Sender<ReadRequest>,
}

/// Lazily spawns per-device workers; owns them until `shutdown`.
pub struct Scheduler {
    devices: Mutex<HashMap<u64, DeviceHandle>>,
    device_map: DeviceMap,
    ssd_workers: usize,
    counters: Arc<Counters>,
    cancel: Arc<AtomicBool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        device_map: DeviceMap,
        max_threads: usize,
        counters: Arc<Counters>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        let mut ssd_workers = SchedConsts::SSD_WORKERS.min(max_threads.max(1));
        if let Some(cap) = read_worker_cap()
            && cap < ssd_workers
        {
            debug!("capping read workers {} -> {} (FD limit)", ssd_workers, cap);
            ssd_workers = cap;
        }
        Scheduler {
            devices: Mutex::new(HashMap::new()),
            device_map,
            ssd_workers,
            counters,
            cancel,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn class_of(&self, dev: u64) -> DiskClass {
        self.device_map.class_of(dev)
    }

    /// Queue a read on the device's worker set, spawning it on first use.
    pub fn submit(&self, dev: u64, req: ReadRequest) {
        let mut devices = self.devices.lock().unwrap();
        let handle = devices.entry(dev).or_insert_with(|| {
            let (tx, rx) = bounded::<ReadRequest>(ChannelCaps::SCHED);
            let class = self.device_map.class_of(dev);
            let workers = match class {
                DiskClass::Rotational => SchedConsts::HDD_WORKERS,
                DiskClass::Solid | DiskClass::Unknown => self.ssd_workers,
            };
            debug!("device {}: {:?}, {} read worker(s)", dev, class, workers);
            let mut handles = self.handles.lock().unwrap();
            for _ in 0..workers {
                let rx = rx.clone();
                let counters = Arc::clone(&self.counters);
                let cancel = Arc::clone(&self.cancel);
                let sort = class.is_rotational();
                handles.push(thread::spawn(move || {
                    device_worker(rx, sort, counters, cancel)
                }));
            }
            DeviceHandle { tx }
        });
        if handle.tx.send(req).is_err() {
            warn!("read scheduler for device {} is gone", dev);
        }
    }

    /// Drop all submission channels and join the workers.
    pub fn shutdown(self) {
        self.devices.lock().unwrap().clear();
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        for h in handles {
            let _ = h.join();
        }
    }
}

/// Worker loop. On sorted (rotational) devices, drain whatever is queued
/// into one batch, order it by physical offset, run it, repeat.
fn device_worker(
    rx: Receiver<ReadRequest>,
    sort: bool,
    counters: Arc<Counters>,
    cancel: Arc<AtomicBool>,
) {
    while let Ok(first) = rx.recv() {
        let mut batch = vec![first];
        if sort {
            while let Ok(req) = rx.try_recv() {
                batch.push(req);
            }
            batch.sort_by_key(|r| (r.order_hint, r.offset));
        }
        for req in batch {
            if cancel.load(Ordering::Relaxed) {
                let _ = req.reply.send(ReadReply {
                    token: req.token,
                    result: Err(io::Error::new(io::ErrorKind::Interrupted, "cancelled")),
                });
                continue;
            }
            let result = read_span(&req.path, req.offset, req.len);
            if let Ok(data) = &result {
                counters
                    .bytes_read
                    .fetch_add(data.len() as u64, Ordering::Relaxed);
            }
            let _ = req.reply.send(ReadReply {
                token: req.token,
                result,
            });
        }
    }
}

/// Spans at least this large go through mmap instead of buffered reads.
const MMAP_SPAN_THRESHOLD: usize = 8 * 1024 * 1024;

/// Read up to `len` bytes at `offset`. A short read near EOF is not an
/// error; the shredder partitions on whatever came back.
fn read_span(path: &std::path::Path, offset: u64, len: usize) -> io::Result<Vec<u8>> {
    let file = File::open(path)?;
    if len >= MMAP_SPAN_THRESHOLD {
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        let start = (offset as usize).min(mmap.len());
        let end = start.saturating_add(len).min(mmap.len());
        return Ok(mmap[start..end].to_vec());
    }
    let mut buf = vec![0u8; len];
    let n = read_at(&file, &mut buf, offset)?;
    buf.truncate(n);
    Ok(buf)
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    let mut done = 0;
    while done < buf.len() {
        let n = file.read_at(&mut buf[done..], offset + done as u64)?;
        if n == 0 {
            break;
        }
        done += n;
    }
    Ok(done)
}

#[cfg(not(unix))]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::io::{Read, Seek, SeekFrom};
    let mut f = file;
    f.seek(SeekFrom::Start(offset))?;
    let mut done = 0;
    while done < buf.len() {
        let n = f.read(&mut buf[done..])?;
        if n == 0 {
            break;
        }
        done += n;
    }
    Ok(done)
}

// FIEMAP extent query, used to order reads by physical disk location.
// Layout mirrors linux/fiemap.h.

#[cfg(target_os = "linux")]
mod fiemap {
    use std::fs::File;
    use std::os::unix::io::AsRawFd;

    #[repr(C)]
    #[derive(Clone, Copy, Default)]
    struct FiemapExtent {
        fe_logical: u64,
        fe_physical: u64,
        fe_length: u64,
        fe_reserved64: [u64; 2],
        fe_flags: u32,
        fe_reserved: [u32; 3],
    }

    #[repr(C)]
    struct FiemapReq {
        fm_start: u64,
        fm_length: u64,
        fm_flags: u32,
        fm_mapped_extents: u32,
        fm_extent_count: u32,
        fm_reserved: u32,
        extents: [FiemapExtent; 1],
    }

    // _IOWR('f', 11, struct fiemap)
    const FS_IOC_FIEMAP: libc::c_ulong = 0xC020660B;

    /// Physical byte address of `logical` within the file, if the
    /// filesystem exposes an extent map.
    pub fn physical_offset(file: &File, logical: u64) -> Option<u64> {
        let mut req = FiemapReq {
            fm_start: logical,
            fm_length: 1,
            fm_flags: 0,
            fm_mapped_extents: 0,
            fm_extent_count: 1,
            fm_reserved: 0,
            extents: [FiemapExtent::default(); 1],
        };
        let rc = unsafe {
            libc::ioctl(
                file.as_raw_fd(),
                FS_IOC_FIEMAP as _,
                &mut req as *mut FiemapReq,
            )
        };
        if rc != 0 || req.fm_mapped_extents == 0 {
            return None;
        }
        let ext = &req.extents[0];
        let within = logical.saturating_sub(ext.fe_logical);
        Some(ext.fe_physical.saturating_add(within))
    }
}

/// Order hint for a read at `offset`: physical offset when the
/// filesystem answers a FIEMAP query, the inode number as a proxy for
/// on-disk layout otherwise.
pub fn order_hint(path: &std::path::Path, offset: u64, inode: u64) -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(file) = File::open(path)
            && let Some(phys) = fiemap::physical_offset(&file, offset)
        {
            return phys;
        }
    }
    let _ = offset;
    let _ = path;
    inode
}
