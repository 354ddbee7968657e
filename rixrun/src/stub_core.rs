//! A minimal stand-in for the external 26-bit ARM core (C2).
//!
//! Per the design brief, a real ARM instruction decoder/executor is
//! explicitly out of scope for this crate: "any conformant 26-bit ARMv2/v3
//! interpreter with floating-point-emulation support will do". [`StubCore`]
//! is *not* that interpreter — it recognizes exactly one instruction
//! encoding, the unconditional `SWI` (`cond=AL, bits 27..24 = 0b1111`), and
//! treats every other word as an undefined instruction routed to vector 4.
//! It exists only so `rixrun`'s CLI has something to wire into the
//! [`CpuCore`] seam and exercise the loader/FPE/dispatcher pipeline
//! end-to-end; running a real RISCiX binary requires swapping this out for
//! an actual ARM core crate.

use rixrun_cpu::{CpuCore, CpuState, MemoryBus, StepOutcome};

const SWI_MASK: u32 = 0x0F00_0000;
const SWI_BITS: u32 = 0x0F00_0000;
const COND_AL_MASK: u32 = 0xF000_0000;
const COND_AL: u32 = 0xE000_0000;

/// Stand-in [`CpuCore`] that only decodes `SWI`; see the module
/// documentation.
pub struct StubCore {
    last_state: CpuState,
}

impl StubCore {
    /// Creates a stub core with an empty diagnostic snapshot.
    #[must_use]
    pub fn new() -> Self {
        StubCore { last_state: CpuState::new() }
    }
}

impl Default for StubCore {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuCore for StubCore {
    fn step(&mut self, bus: &mut MemoryBus<'_>) -> StepOutcome {
        let pc = bus.cpu.pc();
        let word = match bus.load_instr_n(pc, 4) {
            Ok(w) => w,
            Err(_) => {
                self.last_state = bus.cpu.clone();
                return StepOutcome::Exception { vector: 4, pc };
            }
        };
        if bus.cpu.prefetch_abort {
            self.last_state = bus.cpu.clone();
            return StepOutcome::Exception { vector: 0xC, pc };
        }

        bus.cpu.set_pc(pc + 4);

        let outcome = if word & COND_AL_MASK == COND_AL && word & SWI_MASK == SWI_BITS {
            StepOutcome::Swi(word & 0x00FF_FFFF)
        } else {
            StepOutcome::Exception { vector: 4, pc }
        };
        self.last_state = bus.cpu.clone();
        outcome
    }

    fn state(&self) -> &CpuState {
        &self.last_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rixrun_mem::GuestMemory;

    fn swi(imm: u32) -> u32 {
        0xEF00_0000 | (imm & 0x00FF_FFFF)
    }

    #[test]
    fn decodes_unconditional_swi() {
        let mut mem = GuestMemory::new(None);
        let mut cpu = CpuState::new();
        mem.write_word_raw(0x8000, swi(4)).unwrap();
        cpu.set_pc(0x8000);
        let mut core = StubCore::new();
        let mut bus = MemoryBus::new(&mut mem, &mut cpu);
        let outcome = core.step(&mut bus);
        assert_eq!(outcome, StepOutcome::Swi(4));
        assert_eq!(cpu.pc(), 0x8004);
    }

    #[test]
    fn non_swi_word_routes_to_vector_four() {
        let mut mem = GuestMemory::new(None);
        let mut cpu = CpuState::new();
        mem.write_word_raw(0x8000, 0xE320_F000).unwrap(); // NOP, not a SWI
        cpu.set_pc(0x8000);
        let mut core = StubCore::new();
        let mut bus = MemoryBus::new(&mut mem, &mut cpu);
        let outcome = core.step(&mut bus);
        assert_eq!(outcome, StepOutcome::Exception { vector: 4, pc: 0x8000 });
    }
}
