//! The RISCiX `exec_hdr` a.out header and its magic numbers.
//!
//! Field-by-field little-endian (de)serialization is used rather than
//! transmuting a host `#[repr(C)]` struct onto the file bytes, since the
//! on-disk layout must be wire-exact regardless of host endianness or
//! struct-padding rules (see the design note on packed layouts).

use num_enum::TryFromPrimitive;

/// `ZMAGIC`, the base magic number (demand-paged, no shared-library bit).
/// Not itself a loadable object per this emulator — `load_zm_file` requires
/// one of the three magics below — but recognized so a plain-ZMAGIC binary
/// fails with a specific "bad magic" rather than a generic parse error.
pub const ZMAGIC: u32 = 0o413;
const MF_USES_SL: u32 = 0o2000;
const MF_IS_SL: u32 = 0o4000;

/// RISCiX a.out magic numbers this loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum Magic {
    /// Plain demand-paged executable; rejected (non-goal: unshared binaries).
    Zmagic = ZMAGIC,
    /// Executable that consumes a shared library.
    SpZmagic = ZMAGIC | MF_USES_SL,
    /// Primordial shared library (typically libc); terminates a chain.
    SlZmagic = ZMAGIC | MF_IS_SL,
    /// Shared library that itself depends on another shared library.
    SlPZmagic = ZMAGIC | MF_IS_SL | MF_USES_SL,
}

impl Magic {
    /// True for the two magics that mark a shared-library object
    /// (`SlZmagic`/`SlPZmagic`), as opposed to an executable.
    #[must_use]
    pub fn is_library(self) -> bool {
        matches!(self, Magic::SlZmagic | Magic::SlPZmagic)
    }
}

/// Mirrors RISCiX's `struct rix_exec`.
#[derive(Debug, Clone, Copy)]
pub struct RixExec {
    /// Raw magic number; validate with [`Magic::try_from`].
    pub magic: u32,
    /// Text segment size in bytes.
    pub text: u32,
    /// Initialized-data segment size in bytes.
    pub data: u32,
    /// BSS size in bytes; noted but never zeroed (non-goal).
    pub bss: u32,
    /// Symbol table size in bytes; unused by this loader.
    pub syms: u32,
    /// Entry point for an executable, or `a_sldatabase` for a library: the
    /// guest address its data segment must be copied to.
    pub entry: u32,
    /// Text relocation size; unused (no relocation support).
    pub trsize: u32,
    /// Data relocation size; unused.
    pub drsize: u32,
}

/// Mirrors RISCiX's `struct exec_hdr`. Only the fields the loader consults
/// are exposed individually; the squeeze/version/timestamp bookkeeping is
/// parsed (to keep offsets correct) but otherwise ignored, matching the
/// original's treatment of those fields.
#[derive(Debug, Clone)]
pub struct ExecHeader {
    /// The embedded `a_exec` record.
    pub a_exec: RixExec,
    /// Path to the single shared library this object depends on, NUL- or
    /// length-terminated within a 60-byte field.
    pub a_shlibname: String,
}

/// Errors parsing an on-disk `exec_hdr`.
#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    /// Fewer than [`ExecHeader::SIZE`] bytes were available to parse.
    #[error("header is too short: got {got} bytes, need {want}")]
    TooShort {
        /// Bytes actually available.
        got: usize,
        /// Bytes required ([`ExecHeader::SIZE`]).
        want: usize,
    },
}

fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().expect("slice is 4 bytes"))
}

fn read_i32_le(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(buf[offset..offset + 4].try_into().expect("slice is 4 bytes"))
}

impl ExecHeader {
    /// On-disk size of `exec_hdr`: `a_exec` (8 u32 = 32B) + `a_version`
    /// (4B ids + 32B version string = 36B) + 6 squeeze u32 fields (24B) +
    /// 2 timestamp i32 fields (8B) + `a_shlibname[60]` = 160 bytes.
    pub const SIZE: usize = 32 + 36 + 24 + 8 + 60;

    /// Parses a header from its on-disk little-endian byte layout.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError::TooShort`] if `buf` is shorter than
    /// [`Self::SIZE`].
    pub fn parse(buf: &[u8]) -> Result<Self, HeaderError> {
        if buf.len() < Self::SIZE {
            return Err(HeaderError::TooShort { got: buf.len(), want: Self::SIZE });
        }

        let a_exec = RixExec {
            magic: read_u32_le(buf, 0),
            text: read_u32_le(buf, 4),
            data: read_u32_le(buf, 8),
            bss: read_u32_le(buf, 12),
            syms: read_u32_le(buf, 16),
            entry: read_u32_le(buf, 20),
            trsize: read_u32_le(buf, 24),
            drsize: read_u32_le(buf, 28),
        };
        // a_version.ids (u32) + a_version.version[32] at offset 32..68;
        // a_sq4items..a_sq3last (6 u32) at 68..92; a_timestamp/a_shlibtime
        // (2 i32, parsed for offset bookkeeping only) at 92..100.
        let _ = read_i32_le(buf, 92);
        let _ = read_i32_le(buf, 96);
        let name_bytes = &buf[100..160];
        let nul = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        let a_shlibname = String::from_utf8_lossy(&name_bytes[..nul]).into_owned();

        Ok(ExecHeader { a_exec, a_shlibname })
    }

    /// Serializes a header back to its on-disk layout. Exercised only by
    /// this crate's own tests, which build synthetic ZMAGIC files without
    /// checked-in binary fixtures.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.a_exec.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.a_exec.text.to_le_bytes());
        buf[8..12].copy_from_slice(&self.a_exec.data.to_le_bytes());
        buf[12..16].copy_from_slice(&self.a_exec.bss.to_le_bytes());
        buf[16..20].copy_from_slice(&self.a_exec.syms.to_le_bytes());
        buf[20..24].copy_from_slice(&self.a_exec.entry.to_le_bytes());
        buf[24..28].copy_from_slice(&self.a_exec.trsize.to_le_bytes());
        buf[28..32].copy_from_slice(&self.a_exec.drsize.to_le_bytes());
        let name = self.a_shlibname.as_bytes();
        let n = name.len().min(59);
        buf[100..100 + n].copy_from_slice(&name[..n]);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let hdr = ExecHeader {
            a_exec: RixExec {
                magic: Magic::SpZmagic as u32,
                text: 0x1000,
                data: 0x200,
                bss: 0,
                syms: 0,
                entry: 0x8000,
                trsize: 0,
                drsize: 0,
            },
            a_shlibname: "/usr/lib/c".to_owned(),
        };
        let bytes = hdr.to_bytes();
        assert_eq!(bytes.len(), ExecHeader::SIZE);
        let parsed = ExecHeader::parse(&bytes).unwrap();
        assert_eq!(parsed.a_exec.magic, Magic::SpZmagic as u32);
        assert_eq!(parsed.a_exec.text, 0x1000);
        assert_eq!(parsed.a_exec.entry, 0x8000);
        assert_eq!(parsed.a_shlibname, "/usr/lib/c");
    }

    #[test]
    fn too_short_is_rejected() {
        let err = ExecHeader::parse(&[0u8; 10]);
        assert!(matches!(err, Err(HeaderError::TooShort { got: 10, .. })));
    }

    #[test]
    fn magic_numbers_match_the_documented_values() {
        assert_eq!(Magic::SpZmagic as u32, 0o2413);
        assert_eq!(Magic::SlZmagic as u32, 0o4413);
        assert_eq!(Magic::SlPZmagic as u32, 0o6413);
    }

    #[test]
    fn plain_zmagic_is_not_a_library() {
        assert!(!Magic::Zmagic.is_library());
        assert!(Magic::SlZmagic.is_library());
        assert!(Magic::SlPZmagic.is_library());
        assert!(!Magic::SpZmagic.is_library());
    }
}
