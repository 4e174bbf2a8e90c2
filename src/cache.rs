//! Sidecar digest cache.
//!
//! A JSON file mapping (absolute path, size, mtime) onto a previously
//! computed digest. Entries whose metadata no longer match are ignored
//! on load; a corrupt file is one warning, never fatal.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::digest::{DigestKind, hex_parse, hex_string};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub size: u64,
    pub mtime: i64,
    pub algo: String,
    pub digest: String,
}

/// All cache entries loaded at startup, plus everything resolved in this
/// run, written back at shutdown when a cache destination is configured.
#[derive(Default)]
pub struct DigestCache {
    loaded: HashMap<PathBuf, CacheEntry>,
    fresh: Vec<CacheEntry>,
}

impl DigestCache {
    /// Read every given cache file. Missing or corrupt files warn and
    /// are skipped.
    pub fn load(paths: &[PathBuf]) -> Self {
        let mut loaded = HashMap::new();
        for path in paths {
            match read_cache_file(path) {
                Ok(entries) => {
                    debug!("cache {}: {} entries", path.display(), entries.len());
                    for entry in entries {
                        loaded.insert(entry.path.clone(), entry);
                    }
                }
                Err(err) => warn!("ignoring cache {}: {:#}", path.display(), err),
            }
        }
        DigestCache {
            loaded,
            fresh: Vec::new(),
        }
    }

    /// Digest for `path` if the cache has a fresh entry computed with
    /// the session's algorithm.
    pub fn lookup(&self, path: &Path, algo: DigestKind, size: u64, mtime: i64) -> Option<Vec<u8>> {
        let entry = self.loaded.get(path)?;
        if entry.algo != algo.name() || entry.size != size || entry.mtime != mtime {
            return None;
        }
        hex_parse(&entry.digest)
    }

    /// Remember a digest resolved during this run.
    pub fn record(&mut self, path: &Path, algo: DigestKind, digest: &[u8], size: u64, mtime: i64) {
        self.fresh.push(CacheEntry {
            path: path.to_path_buf(),
            size,
            mtime,
            algo: algo.name().to_string(),
            digest: hex_string(digest),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty() && self.fresh.is_empty()
    }

    /// Write the merged cache (prior entries overridden by fresh ones)
    /// to `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut merged: HashMap<&PathBuf, &CacheEntry> =
            self.loaded.iter().map(|(k, v)| (k, v)).collect();
        for entry in &self.fresh {
            merged.insert(&entry.path, entry);
        }
        let mut entries: Vec<&CacheEntry> = merged.into_values().collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(path, json)
            .with_context(|| format!("write digest cache {}", path.display()))?;
        Ok(())
    }
}

fn read_cache_file(path: &Path) -> Result<Vec<CacheEntry>> {
    let raw = std::fs::read_to_string(path).with_context(|| "read")?;
    let entries: Vec<CacheEntry> = serde_json::from_str(&raw).with_context(|| "parse")?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("scour_cache_{}_{}", std::process::id(), name))
    }

    #[test]
    fn round_trip_and_staleness() {
        let file = temp_file("rt.json");
        let mut cache = DigestCache::default();
        let p = PathBuf::from("/tmp/some/file");
        cache.record(&p, DigestKind::Blake3, &[1, 2, 3], 100, 42);
        cache.write(&file).unwrap();

        let reloaded = DigestCache::load(std::slice::from_ref(&file));
        assert_eq!(
            reloaded.lookup(&p, DigestKind::Blake3, 100, 42),
            Some(vec![1, 2, 3])
        );
        // size mismatch -> stale
        assert_eq!(reloaded.lookup(&p, DigestKind::Blake3, 101, 42), None);
        // other algorithm -> miss
        assert_eq!(reloaded.lookup(&p, DigestKind::Sha256, 100, 42), None);
        let _ = std::fs::remove_file(file);
    }

    #[test]
    fn corrupt_cache_is_skipped() {
        let file = temp_file("bad.json");
        std::fs::write(&file, "{ not json").unwrap();
        let cache = DigestCache::load(std::slice::from_ref(&file));
        assert!(cache.is_empty());
        let _ = std::fs::remove_file(file);
    }
}
