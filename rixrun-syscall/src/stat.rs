//! RISCiX's `struct stat` on-the-wire layout.

use rixrun_mem::GuestMemory;

/// RISCiX's `struct rix_stat`, 64 bytes on the wire, little-endian
/// regardless of host endianness (the original's own "massive endianness
/// crimes" comment notes it assumed little-endian; this port makes that
/// assumption explicit and correct on any host).
#[derive(Debug, Clone, Copy, Default)]
pub struct RixStat {
    /// Device number. RISCiX callers never inspect this meaningfully, so a
    /// fixed placeholder (`0x0101`) is used, matching the original.
    pub st_dev: u16,
    /// Inode number, truncated to 32 bits.
    pub st_ino: u32,
    /// File mode bits; `S_IFMT` values line up between host and RISCiX.
    pub st_mode: u16,
    /// Link count, truncated to 16 bits.
    pub st_nlink: u16,
    /// Owner UID, truncated to 16 bits.
    pub st_uid: u16,
    /// Owner GID, truncated to 16 bits.
    pub st_gid: u16,
    /// Device number for special files; same placeholder as `st_dev`.
    pub st_rdev: u16,
    /// File size, truncated to 32 bits.
    pub st_size: i32,
    /// Last access time.
    pub st_atime: i32,
    /// Last modification time.
    pub st_mtime: i32,
    /// Last status-change time.
    pub st_ctime: i32,
    /// Preferred I/O block size.
    pub st_blksize: i32,
    /// Number of blocks allocated.
    pub st_blocks: i32,
}

impl RixStat {
    /// On-wire size, including the `rix_stat` struct's padding and spare
    /// fields.
    pub const SIZE: u32 = 64;

    /// Builds a [`RixStat`] from a host `libc::stat`, truncating any field
    /// whose range doesn't fit.
    #[must_use]
    pub fn from_host(st: &libc::stat) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        RixStat {
            st_dev: 0x0101,
            st_ino: st.st_ino as u32,
            st_mode: st.st_mode as u16,
            st_nlink: st.st_nlink as u16,
            st_uid: st.st_uid as u16,
            st_gid: st.st_gid as u16,
            st_rdev: 0x0101,
            st_size: st.st_size as i32,
            st_atime: st.st_atime as i32,
            st_mtime: st.st_mtime as i32,
            st_ctime: st.st_ctime as i32,
            st_blksize: st.st_blksize as i32,
            st_blocks: st.st_blocks as i32,
        }
    }

    /// Writes this record to guest memory at `addr` in `rix_stat`'s on-disk
    /// layout.
    ///
    /// # Errors
    ///
    /// Returns [`rixrun_mem::MemoryError`] if the 64-byte record doesn't
    /// fit in the guest address space.
    pub fn write_to(&self, mem: &mut GuestMemory, addr: u32) -> Result<(), rixrun_mem::MemoryError> {
        mem.write_bytes_raw(addr, &self.st_dev.to_le_bytes())?;
        // 2 bytes of padding at addr+2.
        mem.write_bytes_raw(addr + 4, &self.st_ino.to_le_bytes())?;
        mem.write_bytes_raw(addr + 8, &self.st_mode.to_le_bytes())?;
        mem.write_bytes_raw(addr + 10, &self.st_nlink.to_le_bytes())?;
        mem.write_bytes_raw(addr + 12, &self.st_uid.to_le_bytes())?;
        mem.write_bytes_raw(addr + 14, &self.st_gid.to_le_bytes())?;
        mem.write_bytes_raw(addr + 16, &self.st_rdev.to_le_bytes())?;
        // 2 bytes of padding at addr+18.
        mem.write_bytes_raw(addr + 20, &self.st_size.to_le_bytes())?;
        mem.write_bytes_raw(addr + 24, &self.st_atime.to_le_bytes())?;
        mem.write_bytes_raw(addr + 28, &0i32.to_le_bytes())?; // st_spare1
        mem.write_bytes_raw(addr + 32, &self.st_mtime.to_le_bytes())?;
        mem.write_bytes_raw(addr + 36, &0i32.to_le_bytes())?; // st_spare2
        mem.write_bytes_raw(addr + 40, &self.st_ctime.to_le_bytes())?;
        mem.write_bytes_raw(addr + 44, &0i32.to_le_bytes())?; // st_spare3
        mem.write_bytes_raw(addr + 48, &self.st_blksize.to_le_bytes())?;
        mem.write_bytes_raw(addr + 52, &self.st_blocks.to_le_bytes())?;
        mem.write_bytes_raw(addr + 56, &[0u8; 8])?; // st_spare4[2]
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_expected_size_and_field_offsets() {
        let mut mem = GuestMemory::new(None);
        let st = RixStat {
            st_dev: 0x0101,
            st_ino: 42,
            st_mode: 0o100_644,
            st_nlink: 1,
            st_uid: 1000,
            st_gid: 1000,
            st_rdev: 0x0101,
            st_size: 4096,
            st_atime: 1_700_000_000,
            st_mtime: 1_700_000_001,
            st_ctime: 1_700_000_002,
            st_blksize: 4096,
            st_blocks: 8,
        };
        st.write_to(&mut mem, 0x1000).unwrap();

        assert_eq!(mem.read_word_raw(0x1000 + 4).unwrap(), 42);
        assert_eq!(
            u16::from_le_bytes(mem.read_bytes_raw(0x1000 + 8, 2).unwrap().try_into().unwrap()),
            0o100_644
        );
        assert_eq!(mem.read_word_raw(0x1000 + 20).unwrap(), 4096);
        assert_eq!(mem.read_word_raw(0x1000 + 48).unwrap(), 4096);
        // st_spare4 is zeroed, not left as whatever the allocator gave us.
        assert_eq!(mem.read_bytes_raw(0x1000 + 56, 8).unwrap(), &[0u8; 8]);
    }
}
