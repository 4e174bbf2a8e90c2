//! Read-worker cap derived from the process file-descriptor limit.
//!
//! Every in-flight read holds a descriptor, the walk pins directory
//! handles, and outputs, cache and stamp files need their own. The cap
//! keeps all per-device pools together under the soft RLIMIT_NOFILE.

use crate::utils::config::FdConsts;

/// Soft RLIMIT_NOFILE, when the platform reports a usable one.
#[cfg(unix)]
fn soft_fd_limit() -> Option<u64> {
    let mut rlim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut rlim) } != 0 {
        return None;
    }
    let cur = rlim.rlim_cur as u64;
    // An unlimited or absurdly high soft limit is no limit at all.
    if rlim.rlim_cur == libc::RLIM_INFINITY || cur > i64::MAX as u64 {
        return None;
    }
    Some(cur)
}

#[cfg(not(unix))]
fn soft_fd_limit() -> Option<u64> {
    None
}

/// Max read workers across all device pools: what is left of the soft
/// limit after the fixed session overhead, divided by the descriptors
/// one worker keeps busy. `None` means uncapped; never returns 0.
pub fn read_worker_cap() -> Option<usize> {
    let limit = soft_fd_limit()?;
    let usable = limit.saturating_sub(FdConsts::SESSION_RESERVED_FDS as u64);
    Some(((usable / FdConsts::FDS_PER_READ_WORKER as u64) as usize).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn cap_is_at_least_one_worker() {
        if let Some(cap) = read_worker_cap() {
            assert!(cap >= 1);
        }
    }
}
