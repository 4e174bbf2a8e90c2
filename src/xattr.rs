//! Extended-attribute digest protocol.
//!
//! A namespaced attribute stores `algo:hexdigest:size:mtime` so a later
//! run can skip reading files that did not change. Entries whose size or
//! mtime no longer match are stale and ignored.

use crate::digest::{DigestKind, hex_parse, hex_string};
#[cfg(target_os = "linux")]
use crate::utils::config::XATTR_NAME;
use std::path::Path;

/// Parsed attribute payload.
#[derive(Debug, PartialEq)]
pub struct XattrRecord {
    pub algo: String,
    pub digest: Vec<u8>,
    pub size: u64,
    pub mtime: i64,
}

impl XattrRecord {
    fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.trim_end_matches('\0').splitn(4, ':');
        let algo = parts.next()?.to_string();
        let digest = hex_parse(parts.next()?)?;
        let size = parts.next()?.parse().ok()?;
        let mtime = parts.next()?.parse().ok()?;
        Some(XattrRecord {
            algo,
            digest,
            size,
            mtime,
        })
    }

    fn render(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.algo,
            hex_string(&self.digest),
            self.size,
            self.mtime
        )
    }
}

/// Digest stored on `path`, if present, fresh, and computed with `algo`.
pub fn read_cached_digest(path: &Path, algo: DigestKind, size: u64, mtime: i64) -> Option<Vec<u8>> {
    let raw = get(path)?;
    let rec = XattrRecord::parse(&raw)?;
    if rec.algo != algo.name() || rec.size != size || rec.mtime != mtime {
        return None;
    }
    Some(rec.digest)
}

/// Store a digest on `path`. Failures (read-only fs, unsupported fs) are
/// reported as one WARN by the caller; not fatal.
pub fn write_cached_digest(
    path: &Path,
    algo: DigestKind,
    digest: &[u8],
    size: u64,
    mtime: i64,
) -> std::io::Result<()> {
    let rec = XattrRecord {
        algo: algo.name().to_string(),
        digest: digest.to_vec(),
        size,
        mtime,
    };
    set(path, &rec.render())
}

#[cfg(target_os = "linux")]
fn get(path: &Path) -> Option<String> {
    use std::os::unix::ffi::OsStrExt;
    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes()).ok()?;
    let c_name = std::ffi::CString::new(XATTR_NAME).ok()?;
    let mut buf = vec![0u8; 512];
    let n = unsafe {
        libc::lgetxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
        )
    };
    if n < 0 {
        return None;
    }
    buf.truncate(n as usize);
    String::from_utf8(buf).ok()
}

#[cfg(target_os = "linux")]
fn set(path: &Path, value: &str) -> std::io::Result<()> {
    use std::os::unix::ffi::OsStrExt;
    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let c_name = std::ffi::CString::new(XATTR_NAME).unwrap();
    let rc = unsafe {
        libc::lsetxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            value.as_ptr() as *const libc::c_void,
            value.len(),
            0,
        )
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn get(_path: &Path) -> Option<String> {
    None
}

#[cfg(not(target_os = "linux"))]
fn set(_path: &Path, _value: &str) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "extended attributes are only wired up on Linux",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trip() {
        let rec = XattrRecord {
            algo: "blake3".to_string(),
            digest: vec![0xde, 0xad, 0xbe, 0xef],
            size: 4096,
            mtime: 1_700_000_000,
        };
        assert_eq!(XattrRecord::parse(&rec.render()), Some(rec));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(XattrRecord::parse(""), None);
        assert_eq!(XattrRecord::parse("blake3:zz:1:2"), None);
        assert_eq!(XattrRecord::parse("blake3:aabb:notanumber:2"), None);
    }
}
