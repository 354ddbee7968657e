//! The CPU-state record: banked registers, PC, CPSR, cycle counters.

use arbitrary_int::u2;

/// The four 26-bit ARM processor modes this emulator models.
///
/// RISCiX guests only ever run in [`ProcessorMode::User26`], switched to by
/// the FPE installer after setting up the supervisor stack; the other modes
/// exist because the register file is banked per-mode and an external ARM
/// core may take exceptions through them (e.g. the undefined-instruction
/// vector used by the FPE runs briefly in `Svc26`).
#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorMode {
    /// Unprivileged mode guest code executes in.
    User26 = 0,
    /// Fast interrupt mode; banks R8-R14.
    Fiq26 = 1,
    /// Interrupt mode; banks R13-R14.
    Irq26 = 2,
    /// Supervisor mode; banks R13-R14. Entered for SWI and reset.
    Svc26 = 3,
}

/// The current program status register.
///
/// Mirrors the flag layout of a 26-bit ARM PSR (NZCV at the top, interrupt
/// masks below them, mode in the bottom two bits) closely enough to serve as
/// this emulator's CPSR, without claiming bit-for-bit compatibility with any
/// particular silicon revision — the external ARM core owns the real
/// decode/execute semantics that would make that claim meaningful.
///
/// The carry flag is the syscall ABI's success/failure channel: carry clear
/// means success, carry set means error with R0 holding the errno.
#[bitbybit::bitfield(u32, debug)]
#[derive(PartialEq, Eq)]
pub struct Cpsr {
    #[bit(31, rw)]
    negative: bool,
    #[bit(30, rw)]
    zero: bool,
    #[bit(29, rw)]
    carry: bool,
    #[bit(28, rw)]
    overflow: bool,
    #[bit(27, rw)]
    fiq_disable: bool,
    #[bit(26, rw)]
    irq_disable: bool,
    #[bits(0..=1, rw)]
    mode: ProcessorMode,
}

impl Default for Cpsr {
    fn default() -> Self {
        Cpsr::new_with_raw_value(0).with_mode(ProcessorMode::Svc26)
    }
}

/// Cycle counters an external ARM core bumps on every fetch/load/store.
///
/// Purely informational bookkeeping (matching `NumNcycles`/`NumScycles`/
/// `NumIcycles`/`NumCcycles` in the original); nothing in rixrun gates
/// behaviour on their values.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Cycles {
    /// Non-sequential memory cycles.
    pub n: u64,
    /// Sequential memory cycles.
    pub s: u64,
    /// Internal (non-memory) cycles.
    pub i: u64,
    /// Coprocessor cycles.
    pub c: u64,
}

/// The CPU's banked register file, program counter, CPSR, and abort flags.
///
/// This is the full state an external ARM core reads and writes between
/// instructions; rixrun itself only ever touches it at well-defined seams
/// (loader entry setup, FPE installation, SWI argument/result marshalling,
/// vfork snapshot/restore).
#[derive(Debug, Clone)]
pub struct CpuState {
    /// R0-R7, shared across all modes.
    r0_7: [u32; 8],
    /// R8-R12 for all modes except FIQ.
    r8_12_common: [u32; 5],
    /// R8-R12 banked for FIQ mode.
    r8_12_fiq: [u32; 5],
    /// R13 (SP) and R14 (LR), banked per mode, indexed by [`ProcessorMode`] as `u8`.
    banked_sp_lr: [[u32; 2]; 4],
    pc: u32,
    cpsr: Cpsr,
    /// True if the guest's big-endian signal is set (`state->bigendSig`).
    /// Affects only the bit-offset math the memory bus uses for halfword
    /// and byte subfield access, never how words are stored.
    pub bigend: bool,
    /// Cycle-count bookkeeping.
    pub cycles: Cycles,
    /// `RIX_VERBOSE`-derived tracing flag threaded down to the CPU record,
    /// matching the original's `state->verbose` used to gate
    /// `ARMul_ConsolePrint`.
    pub verbose: bool,
    /// Set when the last instruction fetch landed in the abort window.
    pub prefetch_abort: bool,
    /// Set when the last data access landed in the abort window.
    pub data_abort: bool,
}

impl Default for CpuState {
    fn default() -> Self {
        CpuState {
            r0_7: [0; 8],
            r8_12_common: [0; 5],
            r8_12_fiq: [0; 5],
            banked_sp_lr: [[0; 2]; 4],
            pc: 0,
            cpsr: Cpsr::default(),
            bigend: false,
            cycles: Cycles::default(),
            verbose: false,
            prefetch_abort: false,
            data_abort: false,
        }
    }
}

impl CpuState {
    /// Creates a fresh CPU state with all registers zeroed and mode `Svc26`,
    /// matching where an external core's reset vector would start execution
    /// before the FPE installer switches to `User26`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads register `n` (0-15) as banked for `mode`.
    ///
    /// # Panics
    ///
    /// Panics if `n > 15`; the external core never constructs a register
    /// number outside that range from valid ARM encodings.
    #[must_use]
    pub fn get_reg(&self, mode: ProcessorMode, n: u8) -> u32 {
        match n {
            0..=7 => self.r0_7[n as usize],
            8..=12 => {
                if mode == ProcessorMode::Fiq26 {
                    self.r8_12_fiq[(n - 8) as usize]
                } else {
                    self.r8_12_common[(n - 8) as usize]
                }
            }
            13 | 14 => self.banked_sp_lr[mode as u8 as usize][(n - 13) as usize],
            15 => self.pc,
            _ => panic!("register number {n} out of range"),
        }
    }

    /// Writes register `n` (0-15) as banked for `mode`.
    ///
    /// # Panics
    ///
    /// Panics if `n > 15`.
    pub fn set_reg(&mut self, mode: ProcessorMode, n: u8, value: u32) {
        match n {
            0..=7 => self.r0_7[n as usize] = value,
            8..=12 => {
                if mode == ProcessorMode::Fiq26 {
                    self.r8_12_fiq[(n - 8) as usize] = value;
                } else {
                    self.r8_12_common[(n - 8) as usize] = value;
                }
            }
            13 | 14 => self.banked_sp_lr[mode as u8 as usize][(n - 13) as usize] = value,
            15 => self.pc = value,
            _ => panic!("register number {n} out of range"),
        }
    }

    /// The current processor mode, as stored in the CPSR's mode field.
    #[must_use]
    pub fn mode(&self) -> ProcessorMode {
        self.cpsr.mode()
    }

    /// Switches processor mode.
    pub fn set_mode(&mut self, mode: ProcessorMode) {
        self.cpsr = self.cpsr.with_mode(mode);
    }

    /// Current program counter.
    #[must_use]
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Sets the program counter directly (`ARMul_SetPC`).
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    /// The CPSR's carry flag: the syscall success/failure channel.
    #[must_use]
    pub fn carry(&self) -> bool {
        self.cpsr.carry()
    }

    /// Clears the carry flag (`CLEARC`): marks the preceding syscall as
    /// successful.
    pub fn clear_carry(&mut self) {
        self.cpsr = self.cpsr.with_carry(false);
    }

    /// Sets the carry flag (`SETC`): marks the preceding syscall as failed,
    /// with R0 holding the errno.
    pub fn set_carry(&mut self) {
        self.cpsr = self.cpsr.with_carry(true);
    }

    /// Raw CPSR access, for code that needs flags beyond carry.
    #[must_use]
    pub fn cpsr(&self) -> Cpsr {
        self.cpsr
    }

    /// Replaces the CPSR wholesale (`ARMul_CPSRAltered`'s effect).
    pub fn set_cpsr(&mut self, cpsr: Cpsr) {
        self.cpsr = cpsr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn r0_7_are_shared_across_modes() {
        let mut s = CpuState::new();
        s.set_reg(ProcessorMode::Svc26, 3, 0x1234);
        assert_eq!(s.get_reg(ProcessorMode::User26, 3), 0x1234);
    }

    #[test]
    fn r13_r14_are_banked_per_mode() {
        let mut s = CpuState::new();
        s.set_reg(ProcessorMode::Svc26, 13, 0xAAAA);
        s.set_reg(ProcessorMode::User26, 13, 0xBBBB);
        assert_eq!(s.get_reg(ProcessorMode::Svc26, 13), 0xAAAA);
        assert_eq!(s.get_reg(ProcessorMode::User26, 13), 0xBBBB);
    }

    #[test]
    fn r8_12_are_banked_only_in_fiq() {
        let mut s = CpuState::new();
        s.set_reg(ProcessorMode::Fiq26, 9, 0x1);
        s.set_reg(ProcessorMode::Svc26, 9, 0x2);
        assert_eq!(s.get_reg(ProcessorMode::Fiq26, 9), 0x1);
        assert_eq!(s.get_reg(ProcessorMode::Irq26, 9), 0x2);
    }

    #[test]
    fn carry_flag_is_the_syscall_success_channel() {
        let mut s = CpuState::new();
        s.clear_carry();
        assert!(!s.carry());
        s.set_carry();
        assert!(s.carry());
    }

    #[test]
    fn pc_is_register_15() {
        let mut s = CpuState::new();
        s.set_pc(0x8000);
        assert_eq!(s.get_reg(s.mode(), 15), 0x8000);
    }
}
