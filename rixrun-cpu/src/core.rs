//! The seam a conformant external ARM core plugs into.
//!
//! Per the design brief, the 26-bit ARM instruction decoder/executor is
//! explicitly out of scope: "any conformant 26-bit ARMv2/v3 interpreter with
//! floating-point-emulation support will do, and its implementation is not
//! re-specified here beyond the interfaces it exposes." [`CpuCore`] names
//! that interface. rixrun's binary wires a [`CpuCore`] implementation into
//! the loader/dispatcher it drives; this crate ships no decoder of its own.

use crate::bus::MemoryBus;
use crate::state::CpuState;

/// What happened when the core was asked to execute one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The core executed an ordinary instruction; keep stepping.
    Continue,
    /// The core decoded a SWI instruction with this 24-bit immediate.
    /// rixrun's dispatcher (`rixrun-syscall`) handles it and the run loop
    /// resumes stepping afterwards.
    Swi(u32),
    /// The core raised an exception through `vector` (e.g. `0x4` for
    /// undefined instruction) while executing at `pc`. rixrun only expects
    /// vector 4, used by the FPE; any other vector is fatal.
    Exception {
        /// Exception vector address (`0x4`, `0x8`, ...).
        vector: u32,
        /// PC at the point of the exception.
        pc: u32,
    },
    /// The guest executed the `exit` SWI and rixrun's dispatcher has already
    /// recorded the status; the run loop should stop.
    Exited(i32),
}

/// The narrow interface a 26-bit ARM core must expose to be driven by
/// rixrun.
///
/// Implementors own instruction decode/execute entirely; they call back into
/// the supplied [`MemoryBus`] for every fetch and data access, exactly as
/// the original ARMulator called `ARMul_LoadInstrN`/`ARMul_ReadWord`/etc.
pub trait CpuCore {
    /// Executes a single instruction (or takes a single exception step) and
    /// reports what happened.
    fn step(&mut self, bus: &mut MemoryBus<'_>) -> StepOutcome;

    /// Read-only access to the register file backing this core, for
    /// diagnostics (`RIX_VERBOSE=2`'s startup register dump).
    fn state(&self) -> &CpuState;
}
