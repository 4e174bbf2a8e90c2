//! Application tuning constants.
//! Thresholds and buffer sizes in one place.

// ---- Shredder increments ----

/// Increment schedule for the shredder's progressive reads.
pub struct ShredConsts;

impl ShredConsts {
    /// First-round read size (bytes). Small on purpose: most non-duplicates
    /// diverge within the first block.
    pub const FIRST_INCREMENT: u64 = 4 * 1024;
    /// Growth factor applied to the increment each round.
    pub const INCREMENT_GROWTH: u64 = 8;
    /// Ceiling for a single increment (bytes). 16 MiB.
    pub const MAX_INCREMENT: u64 = 16 * 1024 * 1024;
    /// Upper bound on bytes queued per device per round. Keeps resident
    /// memory at roughly `groups x increment` and stops one giant group
    /// from starving the rest of the round.
    pub const DEVICE_ROUND_BUDGET: u64 = 256 * 1024 * 1024;
    /// Default memory budget for the paranoid byte comparator (bytes);
    /// overridable with `--max-paranoid-mem`.
    pub const DEFAULT_PARANOID_MEM: u64 = 256 * 1024 * 1024;
}

// ---- Channels ----

/// Capacities for the bounded pipeline channels.
pub struct ChannelCaps;

impl ChannelCaps {
    /// Traversal record channel (walk threads -> accumulator).
    pub const TRAVERSE: usize = 50_000;
    /// Formatter sink (workers -> output driver).
    pub const SINK: usize = 10_000;
    /// Scheduler request channel per device.
    pub const SCHED: usize = 10_000;
}

// ---- Scheduler ----

/// Device scheduler worker tuning.
pub struct SchedConsts;

impl SchedConsts {
    /// Workers per non-rotational device (further capped by `--threads`
    /// and the FD limit).
    pub const SSD_WORKERS: usize = 8;
    /// Rotational devices get a single worker issuing offset-sorted reads.
    pub const HDD_WORKERS: usize = 1;
}

// ---- File descriptors ----

/// Descriptor budget used to cap scheduler read workers.
pub struct FdConsts;

impl FdConsts {
    /// Descriptors one read worker keeps busy: the file being read plus
    /// directory handles the concurrent walk may pin on its behalf.
    pub const FDS_PER_READ_WORKER: usize = 8;
    /// Fixed session overhead set aside before sizing worker pools:
    /// outputs, cache and stamp files, stdio, and the walk's own
    /// directory handles.
    pub const SESSION_RESERVED_FDS: usize = 64;
}

// ---- Limits ----

/// Silent clamps applied to numeric CLI input, matching the documented
/// valid ranges.
pub struct LimitConsts;

impl LimitConsts {
    pub const MIN_THREADS: usize = 1;
    pub const MAX_THREADS: usize = 128;
    pub const MAX_DEPTH: usize = 2048;
}

// ---- Cache / xattr ----

/// Name of the extended attribute carrying a cached digest.
pub const XATTR_NAME: &str = "user.scour.cksum";

/// Default shell script output path.
pub const DEFAULT_SCRIPT_PATH: &str = "scour.sh";
