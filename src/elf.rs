//! Minimal ELF inspection: decide whether a binary still carries its
//! symbol table. Only the header and section-header table are read.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const ET_EXEC: u16 = 2;
const ET_DYN: u16 = 3;
const SHT_SYMTAB: u32 = 2;

struct ElfReader {
    data: Vec<u8>,
    big_endian: bool,
}

impl ElfReader {
    fn u16_at(&self, off: usize) -> Option<u16> {
        let b: [u8; 2] = self.data.get(off..off + 2)?.try_into().ok()?;
        Some(if self.big_endian {
            u16::from_be_bytes(b)
        } else {
            u16::from_le_bytes(b)
        })
    }

    fn u32_at(&self, off: usize) -> Option<u32> {
        let b: [u8; 4] = self.data.get(off..off + 4)?.try_into().ok()?;
        Some(if self.big_endian {
            u32::from_be_bytes(b)
        } else {
            u32::from_le_bytes(b)
        })
    }

    fn u64_at(&self, off: usize) -> Option<u64> {
        let b: [u8; 8] = self.data.get(off..off + 8)?.try_into().ok()?;
        Some(if self.big_endian {
            u64::from_be_bytes(b)
        } else {
            u64::from_le_bytes(b)
        })
    }
}

/// True when `path` is an ELF executable or shared object whose section
/// table still contains a SHT_SYMTAB entry. Non-ELF files, unreadable
/// files and truncated headers are simply `false`.
pub fn is_nonstripped(path: &Path) -> bool {
    check(path).unwrap_or(false)
}

fn check(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut ident = [0u8; 64];
    let got = file.read(&mut ident)?;
    if got < 52 || ident[0..4] != ELF_MAGIC {
        return Ok(false);
    }
    let is_64 = ident[4] == 2;
    let big_endian = ident[5] == 2;

    let header = ElfReader {
        data: ident[..got].to_vec(),
        big_endian,
    };

    let e_type = header.u16_at(16).unwrap_or(0);
    if e_type != ET_EXEC && e_type != ET_DYN {
        return Ok(false);
    }

    let (shoff, shentsize, shnum) = if is_64 {
        (
            header.u64_at(0x28).unwrap_or(0),
            header.u16_at(0x3a).unwrap_or(0) as u64,
            header.u16_at(0x3c).unwrap_or(0) as u64,
        )
    } else {
        (
            header.u32_at(0x20).unwrap_or(0) as u64,
            header.u16_at(0x2e).unwrap_or(0) as u64,
            header.u16_at(0x30).unwrap_or(0) as u64,
        )
    };
    if shoff == 0 || shentsize < 8 || shnum == 0 || shnum > 65_536 {
        return Ok(false);
    }

    let table_len = (shentsize * shnum) as usize;
    let mut table = vec![0u8; table_len];
    file.seek(SeekFrom::Start(shoff))?;
    let got = file.read(&mut table)?;
    table.truncate(got);
    let table = ElfReader {
        data: table,
        big_endian,
    };

    // sh_type sits 4 bytes into every section header in both classes.
    for i in 0..shnum as usize {
        let off = i * shentsize as usize + 4;
        if table.u32_at(off) == Some(SHT_SYMTAB) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("scour_elf_{}_{}", std::process::id(), name));
        let mut f = File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    /// Tiny synthetic 64-bit little-endian ELF: header + two section
    /// headers, the second of type SHT_SYMTAB.
    fn synthetic_elf(with_symtab: bool) -> Vec<u8> {
        let shoff = 64u64;
        let shentsize = 64u16;
        let shnum = 2u16;
        let mut data = vec![0u8; 64 + 2 * 64];
        data[0..4].copy_from_slice(&ELF_MAGIC);
        data[4] = 2; // 64-bit
        data[5] = 1; // little endian
        data[16..18].copy_from_slice(&ET_EXEC.to_le_bytes());
        data[0x28..0x30].copy_from_slice(&shoff.to_le_bytes());
        data[0x3a..0x3c].copy_from_slice(&shentsize.to_le_bytes());
        data[0x3c..0x3e].copy_from_slice(&shnum.to_le_bytes());
        if with_symtab {
            let sh2 = 64 + 64;
            data[sh2 + 4..sh2 + 8].copy_from_slice(&SHT_SYMTAB.to_le_bytes());
        }
        data
    }

    #[test]
    fn detects_symtab() {
        let p = write_temp("symtab", &synthetic_elf(true));
        assert!(is_nonstripped(&p));
        let _ = std::fs::remove_file(p);
    }

    #[test]
    fn stripped_elf_is_clean() {
        let p = write_temp("stripped", &synthetic_elf(false));
        assert!(!is_nonstripped(&p));
        let _ = std::fs::remove_file(p);
    }

    #[test]
    fn non_elf_is_clean() {
        let p = write_temp("text", b"#!/bin/sh\necho hi\n");
        assert!(!is_nonstripped(&p));
        let _ = std::fs::remove_file(p);
    }
}
