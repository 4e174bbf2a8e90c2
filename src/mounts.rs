//! Device table: maps `st_dev` ids onto disk kinds so the scheduler can
//! pick an I/O strategy per physical device.

use log::debug;
use std::collections::HashMap;
use std::path::Path;
use sysinfo::Disks;

/// What kind of device a file lives on, as far as I/O ordering cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiskClass {
    /// Spinning disk: reads are issued in physical-offset order by a
    /// single worker.
    Rotational,
    /// SSD/NVMe: order is irrelevant, use a worker pool.
    Solid,
    Unknown,
}

impl DiskClass {
    pub fn is_rotational(self) -> bool {
        matches!(self, DiskClass::Rotational)
    }
}

/// Snapshot of mounted devices, keyed by `st_dev` of the mount point.
pub struct DeviceMap {
    by_dev: HashMap<u64, DiskClass>,
}

impl DeviceMap {
    /// Build the table from the mount list. Mount points that cannot be
    /// stat'ed are skipped with a debug line.
    pub fn new() -> Self {
        let disks = Disks::new_with_refreshed_list();
        let mut by_dev = HashMap::new();

        for disk in disks.iter() {
            let mount = disk.mount_point();
            let Some(dev) = dev_of(mount) else {
                debug!("cannot stat mount point {}", mount.display());
                continue;
            };
            let class = match disk.kind() {
                sysinfo::DiskKind::HDD => DiskClass::Rotational,
                sysinfo::DiskKind::SSD => DiskClass::Solid,
                sysinfo::DiskKind::Unknown(_) => {
                    rotational_from_sys(disk).unwrap_or(DiskClass::Unknown)
                }
            };
            debug!(
                "mount {} dev={} kind={:?} -> {:?}",
                mount.display(),
                dev,
                disk.kind(),
                class
            );
            by_dev.insert(dev, class);
        }

        DeviceMap { by_dev }
    }

    pub fn class_of(&self, dev: u64) -> DiskClass {
        self.by_dev.get(&dev).copied().unwrap_or(DiskClass::Unknown)
    }
}

impl Default for DeviceMap {
    fn default() -> Self {
        Self::new()
    }
}

/// `st_dev` of a path, for matching files against the mount table.
#[cfg(unix)]
pub fn dev_of(path: &Path) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path).ok().map(|m| m.dev())
}

#[cfg(not(unix))]
pub fn dev_of(_path: &Path) -> Option<u64> {
    None
}

/// Read /sys/block/{device}/queue/rotational to distinguish HDD (1) vs SSD (0).
#[cfg(target_os = "linux")]
fn rotational_from_sys(disk: &sysinfo::Disk) -> Option<DiskClass> {
    let name = disk.name().to_str()?;
    let dev_name = name.strip_prefix("/dev/")?;
    // Strip partition: sda1 -> sda, nvme0n1p1 -> nvme0n1
    let base_dev = if dev_name.starts_with("nvme") {
        dev_name.split('p').next().unwrap_or(dev_name)
    } else {
        dev_name.trim_end_matches(char::is_numeric)
    };

    let sys_path = format!("/sys/block/{base_dev}/queue/rotational");
    let rotational = std::fs::read_to_string(&sys_path).ok()?;
    Some(if rotational.trim() == "1" {
        DiskClass::Rotational
    } else {
        DiskClass::Solid
    })
}

#[cfg(not(target_os = "linux"))]
fn rotational_from_sys(_disk: &sysinfo::Disk) -> Option<DiskClass> {
    None
}
