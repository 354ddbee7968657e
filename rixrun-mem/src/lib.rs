//! Flat 32-bit guest address space for the rixrun ARM emulator.
//!
//! The guest is a single demand-paged process with no MMU protection beyond
//! an optional abort window (see [`AbortWindow`]). Rather than modelling
//! pages, [`GuestMemory`] is a single contiguous host allocation addressed by
//! 32-bit guest addresses, matching the original tool's `uint8_t memory[MEM_SIZE]`.
//!
//! All multi-byte guest values are little-endian regardless of host
//! endianness; every accessor here goes through explicit `to_le`/`from_le`
//! conversions rather than a raw cast, so this crate behaves identically on
//! big-endian hosts.

#![warn(missing_docs)]

/// Size of the guest address space: 32 MiB, matching RISCiX's `MEM_SIZE`.
pub const MEM_SIZE: u32 = 32 * 1024 * 1024;

/// Errors raised by out-of-bounds guest accesses.
///
/// This is a host-side programming-error class, distinct from the
/// guest-visible abort signal raised by the optional [`AbortWindow`]: a
/// bounds violation past [`MEM_SIZE`] can never happen for a correctly
/// loaded binary and indicates a bug in the loader or dispatcher, not
/// something the guest program can trigger and recover from.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// The access, or its trailing bytes, fell outside `[0, MEM_SIZE)`.
    #[error("guest access at {address:#x} (len {len}) is out of bounds (MEM_SIZE = {MEM_SIZE:#x})")]
    OutOfBounds {
        /// First byte address of the attempted access.
        address: u32,
        /// Length in bytes of the attempted access.
        len: u32,
    },
}

/// A guest address range that raises aborts on access instead of performing it.
///
/// This is the emulator's only MMU-like check; addresses inside `[low, high)`
/// raise a prefetch abort on instruction fetch and a data abort on load/store.
/// It exists so validation suites can exercise ARM's fault paths without a
/// real page-protection scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortWindow {
    /// Inclusive lower bound of the window.
    pub low: u32,
    /// Exclusive upper bound of the window.
    pub high: u32,
}

impl AbortWindow {
    /// The documented default window, `[8 MiB, 26 MiB)`.
    pub const fn documented_default() -> Self {
        AbortWindow {
            low: 8 * 1024 * 1024,
            high: 26 * 1024 * 1024,
        }
    }

    /// Whether `addr` falls inside this window.
    #[must_use]
    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.low && addr < self.high
    }
}

/// The flat guest address space.
///
/// Owns the backing byte buffer and the guest's current endianness signal.
/// Cycle accounting and abort-flag delivery live one layer up, on the CPU
/// state (see `rixrun-cpu`'s memory bus), since those are properties of the
/// CPU rather than of the memory itself; this type only ever answers "what is
/// at this address" and "is this address in bounds".
pub struct GuestMemory {
    buf: Box<[u8]>,
    /// The abort window configured for this instance, if any.
    pub abort_window: Option<AbortWindow>,
    bigend: bool,
}

impl GuestMemory {
    /// Allocates a fresh, zeroed guest address space with the given abort
    /// window (or `None` to disable abort-window checking entirely).
    #[must_use]
    pub fn new(abort_window: Option<AbortWindow>) -> Self {
        GuestMemory {
            buf: vec![0u8; MEM_SIZE as usize].into_boxed_slice(),
            abort_window,
            bigend: false,
        }
    }

    /// The guest's current big-endian signal (`state->bigendSig` in the
    /// original). Affects only the bit-offset math in halfword/byte
    /// accessors below, not how words are stored.
    #[must_use]
    pub fn bigend(&self) -> bool {
        self.bigend
    }

    /// Sets the guest's big-endian signal.
    pub fn set_bigend(&mut self, bigend: bool) {
        self.bigend = bigend;
    }

    /// Total size of the address space, always [`MEM_SIZE`].
    #[must_use]
    pub fn len(&self) -> u32 {
        self.buf.len() as u32
    }

    /// `len()` is always `MEM_SIZE`, so this is always false; kept for
    /// clippy's `len_without_is_empty`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    fn check_bounds(&self, addr: u32, len: u32) -> Result<(), MemoryError> {
        let end = addr.checked_add(len).ok_or(MemoryError::OutOfBounds { address: addr, len })?;
        if end > self.len() {
            return Err(MemoryError::OutOfBounds { address: addr, len });
        }
        Ok(())
    }

    /// Reads a 32-bit little-endian word with no abort-window or cycle-count
    /// semantics; out-of-bounds accesses are rejected rather than panicking
    /// or corrupting adjacent host memory.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::OutOfBounds`] if any of the four bytes fall
    /// outside `[0, MEM_SIZE)`.
    pub fn read_word_raw(&self, addr: u32) -> Result<u32, MemoryError> {
        self.check_bounds(addr, 4)?;
        let i = addr as usize;
        let bytes: [u8; 4] = self.buf[i..i + 4].try_into().expect("checked above");
        Ok(u32::from_le_bytes(bytes))
    }

    /// Writes a 32-bit little-endian word.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::OutOfBounds`] if any of the four bytes fall
    /// outside `[0, MEM_SIZE)`; on error, no bytes are written.
    pub fn write_word_raw(&mut self, addr: u32, value: u32) -> Result<(), MemoryError> {
        self.check_bounds(addr, 4)?;
        let i = addr as usize;
        self.buf[i..i + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Reads a single byte.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::OutOfBounds`] if `addr >= MEM_SIZE`.
    pub fn read_byte_raw(&self, addr: u32) -> Result<u8, MemoryError> {
        self.check_bounds(addr, 1)?;
        Ok(self.buf[addr as usize])
    }

    /// Writes a single byte.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::OutOfBounds`] if `addr >= MEM_SIZE`.
    pub fn write_byte_raw(&mut self, addr: u32, value: u8) -> Result<(), MemoryError> {
        self.check_bounds(addr, 1)?;
        self.buf[addr as usize] = value;
        Ok(())
    }

    /// Bulk-copies `data` into the guest address space starting at `addr`.
    /// Used by the loader to place text/data segments and by syscalls that
    /// write host buffers (`read`, `fstat`) into guest memory.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::OutOfBounds`] if the full range doesn't fit;
    /// on error, no bytes are written.
    pub fn write_bytes_raw(&mut self, addr: u32, data: &[u8]) -> Result<(), MemoryError> {
        self.check_bounds(addr, data.len() as u32)?;
        let i = addr as usize;
        self.buf[i..i + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Reads `len` bytes starting at `addr`. Used by syscalls that hand a
    /// guest buffer to a host call (`write`, `open`'s pathname).
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::OutOfBounds`] if the range doesn't fit.
    pub fn read_bytes_raw(&self, addr: u32, len: u32) -> Result<&[u8], MemoryError> {
        self.check_bounds(addr, len)?;
        let i = addr as usize;
        Ok(&self.buf[i..i + len as usize])
    }

    /// Reads a NUL-terminated guest C string starting at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::OutOfBounds`] if scanning runs off the end of
    /// the address space before finding a NUL.
    pub fn read_cstr(&self, addr: u32) -> Result<&std::ffi::CStr, MemoryError> {
        let start = addr as usize;
        let rest = self
            .buf
            .get(start..)
            .ok_or(MemoryError::OutOfBounds { address: addr, len: 1 })?;
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(MemoryError::OutOfBounds { address: addr, len: rest.len() as u32 })?;
        Ok(std::ffi::CStr::from_bytes_with_nul(&rest[..=nul]).expect("nul found above"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_round_trips() {
        let mut mem = GuestMemory::new(None);
        mem.write_word_raw(0x1000, 0xdead_beef).unwrap();
        assert_eq!(mem.read_word_raw(0x1000).unwrap(), 0xdead_beef);
    }

    #[test]
    fn word_is_stored_little_endian_on_the_wire() {
        let mut mem = GuestMemory::new(None);
        mem.write_word_raw(0x0, 0x0102_0304).unwrap();
        assert_eq!(mem.read_bytes_raw(0x0, 4).unwrap(), &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn out_of_bounds_store_is_rejected_and_leaves_memory_untouched() {
        let mut mem = GuestMemory::new(None);
        let before = mem.read_bytes_raw(MEM_SIZE - 4, 4).unwrap().to_vec();
        let err = mem.write_word_raw(MEM_SIZE - 2, 0xffff_ffff);
        assert!(matches!(err, Err(MemoryError::OutOfBounds { .. })));
        assert_eq!(mem.read_bytes_raw(MEM_SIZE - 4, 4).unwrap(), before.as_slice());
    }

    #[test]
    fn addr_plus_len_overflow_is_rejected() {
        let mem = GuestMemory::new(None);
        assert!(mem.read_bytes_raw(u32::MAX - 1, 4).is_err());
    }

    #[test]
    fn cstr_reads_up_to_first_nul() {
        let mut mem = GuestMemory::new(None);
        mem.write_bytes_raw(0x100, b"hello\0world").unwrap();
        assert_eq!(mem.read_cstr(0x100).unwrap().to_bytes(), b"hello");
    }

    #[test]
    fn abort_window_contains_is_half_open() {
        let w = AbortWindow { low: 100, high: 200 };
        assert!(!w.contains(99));
        assert!(w.contains(100));
        assert!(w.contains(199));
        assert!(!w.contains(200));
    }

    #[test]
    fn documented_default_matches_spec() {
        let w = AbortWindow::documented_default();
        assert_eq!(w.low, 8 * 1024 * 1024);
        assert_eq!(w.high, 26 * 1024 * 1024);
    }
}
