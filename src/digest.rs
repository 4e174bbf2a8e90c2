//! Streaming content digests for the shredder.
//!
//! The algorithm set is closed: a fast 64-bit hash for the cheap first
//! passes, a seeded "bastard" hash whose per-session keys make collision
//! construction useless across runs, blake3 as the default, SHA-256/512
//! for the cryptographic ladder, and the paranoid mode which is not a
//! hash at all but a byte-for-byte peer comparison driven by the
//! shredder.

use sha2::Digest as _;
use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher as _;

/// Identifier of a supported digest algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DigestKind {
    Fast64,
    Bastard,
    Blake3,
    Sha256,
    Sha512,
    /// Byte-by-byte peer comparison; internally still carries a blake3
    /// state so resolved files have a reportable digest.
    Paranoid,
}

impl DigestKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "fast64" | "fast" => Some(DigestKind::Fast64),
            "bastard" => Some(DigestKind::Bastard),
            "blake3" => Some(DigestKind::Blake3),
            "sha256" => Some(DigestKind::Sha256),
            "sha512" => Some(DigestKind::Sha512),
            "paranoid" => Some(DigestKind::Paranoid),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DigestKind::Fast64 => "fast64",
            DigestKind::Bastard => "bastard",
            DigestKind::Blake3 => "blake3",
            DigestKind::Sha256 => "sha256",
            DigestKind::Sha512 => "sha512",
            DigestKind::Paranoid => "paranoid",
        }
    }
}

/// Per-session seeds for the bastard algorithm. Drawn once from OS
/// entropy at session construction.
#[derive(Clone, Copy, Debug, Default)]
pub struct HashSeeds {
    pub seed1: u64,
    pub seed2: u64,
}

impl HashSeeds {
    pub fn random() -> Self {
        use rand::RngCore;
        let mut rng = rand::thread_rng();
        HashSeeds {
            seed1: rng.next_u64(),
            seed2: rng.next_u64(),
        }
    }

    fn key1(&self) -> [u8; 32] {
        let mut key = [0u8; 32];
        key[..8].copy_from_slice(&self.seed1.to_le_bytes());
        key[8..16].copy_from_slice(&self.seed2.to_le_bytes());
        key
    }

    fn key2(&self) -> [u8; 32] {
        let mut key = [0u8; 32];
        key[..8].copy_from_slice(&self.seed2.to_le_bytes());
        key[8..16].copy_from_slice(&self.seed1.to_le_bytes());
        key[16] = 0x5c;
        key
    }
}

/// Incremental digest state for one file.
#[derive(Clone)]
pub enum Digest {
    Fast64(DefaultHasher),
    /// Two independently keyed states; snapshots combine both halves so
    /// a collision would have to hold under both seeds at once.
    Bastard(Box<(blake3::Hasher, blake3::Hasher)>),
    Blake3(blake3::Hasher),
    Sha256(sha2::Sha256),
    Sha512(sha2::Sha512),
}

impl Digest {
    pub fn new(kind: DigestKind, seeds: HashSeeds) -> Self {
        match kind {
            DigestKind::Fast64 => Digest::Fast64(DefaultHasher::new()),
            DigestKind::Bastard => Digest::Bastard(Box::new((
                blake3::Hasher::new_keyed(&seeds.key1()),
                blake3::Hasher::new_keyed(&seeds.key2()),
            ))),
            // Paranoid groups compare bytes directly; the running blake3
            // only feeds reports, the cache and the tree merger.
            DigestKind::Blake3 | DigestKind::Paranoid => Digest::Blake3(blake3::Hasher::new()),
            DigestKind::Sha256 => Digest::Sha256(sha2::Sha256::new()),
            DigestKind::Sha512 => Digest::Sha512(sha2::Sha512::new()),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        match self {
            Digest::Fast64(h) => h.write(bytes),
            Digest::Bastard(pair) => {
                pair.0.update(bytes);
                pair.1.update(bytes);
            }
            Digest::Blake3(h) => {
                h.update(bytes);
            }
            Digest::Sha256(h) => h.update(bytes),
            Digest::Sha512(h) => h.update(bytes),
        }
    }

    /// Digest of everything fed so far, without consuming the state.
    pub fn snapshot(&self) -> Vec<u8> {
        match self {
            Digest::Fast64(h) => h.finish().to_be_bytes().to_vec(),
            Digest::Bastard(pair) => {
                let mut out = Vec::with_capacity(16);
                out.extend_from_slice(&pair.0.finalize().as_bytes()[..8]);
                out.extend_from_slice(&pair.1.finalize().as_bytes()[..8]);
                out
            }
            Digest::Blake3(h) => h.finalize().as_bytes().to_vec(),
            Digest::Sha256(h) => h.clone().finalize().to_vec(),
            Digest::Sha512(h) => h.clone().finalize().to_vec(),
        }
    }

    pub fn equal_snapshot(&self, other: &Digest) -> bool {
        self.snapshot() == other.snapshot()
    }

    pub fn hexdigest(&self) -> String {
        hex_string(&self.snapshot())
    }
}

/// Lowercase hex rendering used by reports, the cache and xattrs.
pub fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Parse the hex rendering back into bytes; `None` on odd length or bad
/// digits (a corrupt cache entry, not an error).
pub fn hex_parse(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_stable_across_updates() {
        let seeds = HashSeeds::default();
        for kind in [
            DigestKind::Fast64,
            DigestKind::Bastard,
            DigestKind::Blake3,
            DigestKind::Sha256,
            DigestKind::Sha512,
        ] {
            let mut a = Digest::new(kind, seeds);
            let mut b = Digest::new(kind, seeds);
            a.update(b"hello ");
            a.update(b"world");
            b.update(b"hello world");
            assert!(a.equal_snapshot(&b), "{:?}", kind);
        }
    }

    #[test]
    fn different_content_diverges() {
        let seeds = HashSeeds::random();
        let mut a = Digest::new(DigestKind::Blake3, seeds);
        let mut b = Digest::new(DigestKind::Blake3, seeds);
        a.update(b"aaaa");
        b.update(b"aaab");
        assert!(!a.equal_snapshot(&b));
    }

    #[test]
    fn bastard_depends_on_seeds() {
        let mut a = Digest::new(DigestKind::Bastard, HashSeeds { seed1: 1, seed2: 2 });
        let mut b = Digest::new(DigestKind::Bastard, HashSeeds { seed1: 3, seed2: 4 });
        a.update(b"same bytes");
        b.update(b"same bytes");
        assert_ne!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn hex_round_trip() {
        let bytes = vec![0x00, 0x7f, 0xff, 0x10];
        assert_eq!(hex_parse(&hex_string(&bytes)), Some(bytes));
        assert_eq!(hex_parse("abc"), None);
        assert_eq!(hex_parse("zz"), None);
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in [
            DigestKind::Fast64,
            DigestKind::Bastard,
            DigestKind::Blake3,
            DigestKind::Sha256,
            DigestKind::Sha512,
            DigestKind::Paranoid,
        ] {
            assert_eq!(DigestKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(DigestKind::from_name("md5"), None);
    }
}
