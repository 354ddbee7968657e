//! The memory-abort surface: the sequenced, cycle-counted, abort-aware
//! operations an external ARM core performs against [`GuestMemory`].

use rixrun_mem::{GuestMemory, MemoryError};

use crate::state::CpuState;

/// Sentinel word returned in place of real data when an access lands in the
/// abort window. Chosen as `0xFFFFFFFF`, matching the all-ones pattern a
/// faulting bus read typically floats to.
pub const ABORTWORD: u32 = 0xFFFF_FFFF;

/// Couples a [`GuestMemory`] with the [`CpuState`] whose cycle counters and
/// abort flags the bus updates on every access.
///
/// This is the interface described in the original's `armvirt.c`: any
/// conformant external ARM core drives execution purely through these
/// methods, never touching `GuestMemory` directly.
pub struct MemoryBus<'a> {
    /// The guest address space this bus operates on.
    pub mem: &'a mut GuestMemory,
    /// The CPU state whose cycle counters and abort flags this bus updates.
    pub cpu: &'a mut CpuState,
}

impl<'a> MemoryBus<'a> {
    /// Borrows a memory and CPU state pair as a bus.
    pub fn new(mem: &'a mut GuestMemory, cpu: &'a mut CpuState) -> Self {
        MemoryBus { mem, cpu }
    }

    fn in_abort_window(&self, addr: u32) -> bool {
        self.mem.abort_window.is_some_and(|w| w.contains(addr))
    }

    /// Fetches an instruction word (`ARMul_ReLoadInstr`). When `isize == 2`
    /// and `addr` is halfword-unaligned, returns the two adjacent halfwords
    /// packed according to the guest's endian signal, since a 2-byte Thumb
    /// fetch at an odd halfword boundary spans two word-aligned reads.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::OutOfBounds`] if the backing read falls
    /// outside `MEM_SIZE`; a hit on the abort window is not an error, it
    /// returns `Ok(ABORTWORD)` with [`CpuState::prefetch_abort`] set.
    pub fn reload_instr(&mut self, addr: u32, isize: u32) -> Result<u32, MemoryError> {
        if self.in_abort_window(addr) {
            self.cpu.prefetch_abort = true;
            return Ok(ABORTWORD);
        }
        self.cpu.prefetch_abort = false;

        if isize == 2 && (addr & 0x2) != 0 {
            let lo = self.mem.read_word_raw(addr)?;
            let hi = self.mem.read_word_raw(addr + 4)?;
            return Ok(if self.mem.bigend() {
                (lo << 16) | (hi >> 16)
            } else {
                ((hi & 0xFFFF) << 16) | (lo >> 16)
            });
        }
        self.mem.read_word_raw(addr)
    }

    /// `ARMul_LoadInstrS`: instruction fetch on a sequential cycle.
    ///
    /// # Errors
    ///
    /// See [`Self::reload_instr`].
    pub fn load_instr_s(&mut self, addr: u32, isize: u32) -> Result<u32, MemoryError> {
        self.cpu.cycles.s += 1;
        self.reload_instr(addr, isize)
    }

    /// `ARMul_LoadInstrN`: instruction fetch on a non-sequential cycle.
    ///
    /// # Errors
    ///
    /// See [`Self::reload_instr`].
    pub fn load_instr_n(&mut self, addr: u32, isize: u32) -> Result<u32, MemoryError> {
        self.cpu.cycles.n += 1;
        self.reload_instr(addr, isize)
    }

    /// `ARMul_ReadWord`: a data-side word read, abort-checked but uncounted.
    ///
    /// # Errors
    ///
    /// See [`Self::reload_instr`]; the abort signalled here is a data abort.
    fn read_word(&mut self, addr: u32) -> Result<u32, MemoryError> {
        if self.in_abort_window(addr) {
            self.cpu.data_abort = true;
            return Ok(ABORTWORD);
        }
        self.cpu.data_abort = false;
        self.mem.read_word_raw(addr)
    }

    /// `ARMul_LoadWordS`.
    ///
    /// # Errors
    ///
    /// See [`Self::read_word`].
    pub fn load_word_s(&mut self, addr: u32) -> Result<u32, MemoryError> {
        self.cpu.cycles.s += 1;
        self.read_word(addr)
    }

    /// `ARMul_LoadWordN`.
    ///
    /// # Errors
    ///
    /// See [`Self::read_word`].
    pub fn load_word_n(&mut self, addr: u32) -> Result<u32, MemoryError> {
        self.cpu.cycles.n += 1;
        self.read_word(addr)
    }

    /// `ARMul_WriteWord`: a data-side word write, abort-checked.
    ///
    /// # Errors
    ///
    /// See [`Self::read_word`]; within the abort window, nothing is written.
    fn write_word(&mut self, addr: u32, data: u32) -> Result<(), MemoryError> {
        if self.in_abort_window(addr) {
            self.cpu.data_abort = true;
            return Ok(());
        }
        self.cpu.data_abort = false;
        self.mem.write_word_raw(addr, data)
    }

    /// `ARMul_StoreWordS`.
    ///
    /// # Errors
    ///
    /// See [`Self::write_word`].
    pub fn store_word_s(&mut self, addr: u32, data: u32) -> Result<(), MemoryError> {
        self.cpu.cycles.s += 1;
        self.write_word(addr, data)
    }

    /// `ARMul_StoreWordN`.
    ///
    /// # Errors
    ///
    /// See [`Self::write_word`].
    pub fn store_word_n(&mut self, addr: u32, data: u32) -> Result<(), MemoryError> {
        self.cpu.cycles.n += 1;
        self.write_word(addr, data)
    }

    /// `field_bytes` is 2 for halfword subfields, 1 for byte subfields; the
    /// mask/multiplier below follows `((bigend ? N : 0) XOR (addr & N)) << 3`
    /// with `N = 2` or `3` respectively.
    fn subfield_offset_bits(&self, addr: u32, field_bytes: u32) -> u32 {
        let mask = if field_bytes == 2 { 2 } else { 3 };
        let bigend_term = if self.mem.bigend() { mask } else { 0 };
        (bigend_term ^ (addr & mask)) << 3
    }

    /// `ARMul_LoadHalfWord`: extracts a 16-bit field from its containing
    /// word. Always performs the abort-checked word read first, exactly
    /// like the original, even though the extracted value is meaningless on
    /// an abort (the CPU core is expected to check the abort flag, not the
    /// returned bits, in that case).
    ///
    /// # Errors
    ///
    /// See [`Self::read_word`].
    pub fn load_halfword(&mut self, addr: u32) -> Result<u32, MemoryError> {
        self.cpu.cycles.n += 1;
        let word = self.read_word(addr)?;
        let offset = self.subfield_offset_bits(addr, 2);
        Ok((word >> offset) & 0xFFFF)
    }

    /// `ARMul_StoreHalfWord`: merges a 16-bit field into its containing word
    /// and writes it back. Notably, the original writes through the raw
    /// `PutWord` path here, not the abort-checked `WriteWord` path, so a
    /// halfword store still lands in memory even when the preceding
    /// abort-checked read set the data-abort flag; that quirk is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::OutOfBounds`] if the containing word's
    /// address is out of `MEM_SIZE`.
    pub fn store_halfword(&mut self, addr: u32, data: u32) -> Result<(), MemoryError> {
        self.cpu.cycles.n += 1;
        let temp = self.read_word(addr)?;
        let offset = self.subfield_offset_bits(addr, 2);
        let merged = (temp & !(0xFFFF << offset)) | ((data & 0xFFFF) << offset);
        self.mem.write_word_raw(addr, merged)
    }

    /// `ARMul_ReadByte`.
    ///
    /// # Errors
    ///
    /// See [`Self::read_word`].
    fn read_byte(&mut self, addr: u32) -> Result<u32, MemoryError> {
        let word = self.read_word(addr)?;
        let offset = self.subfield_offset_bits(addr, 1);
        Ok((word >> offset) & 0xFF)
    }

    /// `ARMul_LoadByte`.
    ///
    /// # Errors
    ///
    /// See [`Self::read_word`].
    pub fn load_byte(&mut self, addr: u32) -> Result<u32, MemoryError> {
        self.cpu.cycles.n += 1;
        self.read_byte(addr)
    }

    /// `ARMul_StoreByte`: like [`Self::store_halfword`], writes through the
    /// raw path regardless of the read-side abort flag.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::OutOfBounds`] if the containing word's
    /// address is out of `MEM_SIZE`.
    pub fn store_byte(&mut self, addr: u32, data: u32) -> Result<(), MemoryError> {
        self.cpu.cycles.n += 1;
        let temp = self.read_word(addr)?;
        let offset = self.subfield_offset_bits(addr, 1);
        let merged = (temp & !(0xFF << offset)) | ((data & 0xFF) << offset);
        self.mem.write_word_raw(addr, merged)
    }

    /// `ARMul_SwapWord`: reads the old value then writes the new one,
    /// counting two non-sequential cycles.
    ///
    /// # Errors
    ///
    /// See [`Self::read_word`]/[`Self::write_word`].
    pub fn swap_word(&mut self, addr: u32, data: u32) -> Result<u32, MemoryError> {
        self.cpu.cycles.n += 1;
        let temp = self.read_word(addr)?;
        self.cpu.cycles.n += 1;
        self.mem.write_word_raw(addr, data)?;
        Ok(temp)
    }

    /// `ARMul_SwapByte`.
    ///
    /// # Errors
    ///
    /// See [`Self::load_byte`]/[`Self::store_byte`].
    pub fn swap_byte(&mut self, addr: u32, data: u32) -> Result<u32, MemoryError> {
        let temp = self.load_byte(addr)?;
        self.store_byte(addr, data)?;
        Ok(temp)
    }

    /// `ARMul_Icycles`: bumps the internal-cycle counter. The original also
    /// clears the pending abort signal here; preserved so a core that
    /// doesn't immediately inspect the abort flag after a faulting access
    /// still sees it cleared by the next instruction's accounting.
    pub fn i_cycles(&mut self, n: u64) {
        self.cpu.cycles.i += n;
        self.cpu.prefetch_abort = false;
        self.cpu.data_abort = false;
    }

    /// `ARMul_Ccycles`: bumps the coprocessor-cycle counter, with the same
    /// abort-clearing side effect as [`Self::i_cycles`].
    pub fn c_cycles(&mut self, n: u64) {
        self.cpu.cycles.c += n;
        self.cpu.prefetch_abort = false;
        self.cpu.data_abort = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rixrun_mem::{AbortWindow, GuestMemory};

    fn bus_parts() -> (GuestMemory, CpuState) {
        (GuestMemory::new(Some(AbortWindow::documented_default())), CpuState::new())
    }

    #[test]
    fn halfword_subfield_write_preserves_surrounding_bytes() {
        let (mut mem, mut cpu) = bus_parts();
        let mut bus = MemoryBus::new(&mut mem, &mut cpu);
        bus.store_word_n(0x1000, 0x1111_1111).unwrap();
        bus.store_halfword(0x1000, 0xBEEF).unwrap();
        let word = bus.load_word_n(0x1000).unwrap();
        assert_eq!(word, 0x1111_BEEF);
    }

    #[test]
    fn byte_subfield_write_preserves_surrounding_bytes() {
        let (mut mem, mut cpu) = bus_parts();
        let mut bus = MemoryBus::new(&mut mem, &mut cpu);
        bus.store_word_n(0x2000, 0xAABB_CCDD).unwrap();
        bus.store_byte(0x2000, 0xFF).unwrap();
        let word = bus.load_word_n(0x2000).unwrap();
        assert_eq!(word, 0xAABB_CCFF);
    }

    #[test]
    fn instruction_fetch_in_window_sets_prefetch_abort_and_returns_sentinel() {
        let (mut mem, mut cpu) = bus_parts();
        let mut bus = MemoryBus::new(&mut mem, &mut cpu);
        let w = bus.load_instr_n(9 * 1024 * 1024, 4).unwrap();
        assert_eq!(w, ABORTWORD);
        assert!(bus.cpu.prefetch_abort);
    }

    #[test]
    fn data_access_in_window_sets_data_abort_and_returns_sentinel() {
        let (mut mem, mut cpu) = bus_parts();
        let mut bus = MemoryBus::new(&mut mem, &mut cpu);
        let w = bus.load_word_n(9 * 1024 * 1024).unwrap();
        assert_eq!(w, ABORTWORD);
        assert!(bus.cpu.data_abort);
    }

    #[test]
    fn abort_flags_clear_on_the_next_access_outside_the_window() {
        let (mut mem, mut cpu) = bus_parts();
        let mut bus = MemoryBus::new(&mut mem, &mut cpu);
        bus.load_word_n(9 * 1024 * 1024).unwrap();
        assert!(bus.cpu.data_abort);
        bus.load_word_n(0x1000).unwrap();
        assert!(!bus.cpu.data_abort);
    }

    #[test]
    fn swap_word_returns_old_value_and_counts_two_n_cycles() {
        let (mut mem, mut cpu) = bus_parts();
        let mut bus = MemoryBus::new(&mut mem, &mut cpu);
        bus.store_word_n(0x3000, 0x42).unwrap();
        let before_n = bus.cpu.cycles.n;
        let old = bus.swap_word(0x3000, 0x99).unwrap();
        assert_eq!(old, 0x42);
        assert_eq!(bus.load_word_n(0x3000).unwrap(), 0x99);
        assert_eq!(bus.cpu.cycles.n, before_n + 3); // swap_word's own 2 N-cycles, plus the verifying load_word_n's 1
    }
}
