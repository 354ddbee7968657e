//! The top-level execution loop: step the CPU core, dispatch its SWIs,
//! and stop on `exit` or a fatal condition.

use rixrun_cpu::{CpuCore, CpuState, MemoryBus, StepOutcome};
use rixrun_mem::GuestMemory;
use rixrun_syscall::{Dispatcher, DispatchOutcome};

use crate::error::RixrunError;

/// Drives `core` to completion, dispatching SWIs through `dispatcher`.
///
/// Returns the guest's `exit` status on success.
///
/// # Errors
///
/// Returns [`RixrunError::Syscall`] if the guest issues an unhandled SWI, or
/// [`RixrunError::UnhandledException`] if the core raises an exception
/// through any vector other than 4 (the undefined-instruction vector the
/// FPE handles).
pub fn run_loop<C: CpuCore>(
    core: &mut C,
    mem: &mut GuestMemory,
    cpu: &mut CpuState,
    dispatcher: &mut Dispatcher,
) -> Result<i32, RixrunError> {
    loop {
        let step_outcome = {
            let mut bus = MemoryBus::new(mem, cpu);
            core.step(&mut bus)
        };

        match step_outcome {
            StepOutcome::Continue => {}
            StepOutcome::Swi(number) => match dispatcher.dispatch(number, mem, cpu)? {
                DispatchOutcome::Continue => {}
                DispatchOutcome::Exited(status) => return Ok(status),
            },
            StepOutcome::Exception { vector: 4, pc: _ } => {
                // Undefined instruction: control flows into the FPE blob
                // patched over vector 4; nothing else for the run loop to do.
            }
            StepOutcome::Exception { vector, pc } => {
                return Err(RixrunError::UnhandledException { vector, pc });
            }
            StepOutcome::Exited(status) => return Ok(status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub_core::StubCore;
    use rixrun_cpu::ProcessorMode;

    #[test]
    fn stops_on_exit_swi() {
        let mut mem = GuestMemory::new(None);
        let mut cpu = CpuState::new();
        cpu.set_mode(ProcessorMode::User26);
        cpu.set_pc(0x8000);
        mem.write_word_raw(0x8000, 0xEF00_0001).unwrap(); // SWI 1 (exit)
        let mode = cpu.mode();
        cpu.set_reg(mode, 0, 42);

        let mut core = StubCore::new();
        let mut dispatcher = Dispatcher::new();
        let status = run_loop(&mut core, &mut mem, &mut cpu, &mut dispatcher).unwrap();
        assert_eq!(status, 42);
    }

    #[test]
    fn write_then_exit_runs_both_swis_in_sequence() {
        let mut mem = GuestMemory::new(None);
        let mut cpu = CpuState::new();
        cpu.set_mode(ProcessorMode::User26);
        cpu.set_pc(0x8000);
        mem.write_bytes_raw(0x9000, b"hi").unwrap();
        mem.write_word_raw(0x8000, 0xEF00_0004).unwrap(); // SWI 4 (write)
        mem.write_word_raw(0x8004, 0xEF00_0001).unwrap(); // SWI 1 (exit)

        let mode = cpu.mode();
        cpu.set_reg(mode, 0, 1); // stdout
        cpu.set_reg(mode, 1, 0x9000);
        cpu.set_reg(mode, 2, 2);

        let mut core = StubCore::new();
        let mut dispatcher = Dispatcher::new();
        let status = run_loop(&mut core, &mut mem, &mut cpu, &mut dispatcher).unwrap();
        assert_eq!(status, 0);
    }

    #[test]
    fn unhandled_exception_vector_is_fatal() {
        let mut mem = GuestMemory::new(None);
        let mut cpu = CpuState::new();
        cpu.set_mode(ProcessorMode::User26);

        struct AlwaysResetCore;
        impl CpuCore for AlwaysResetCore {
            fn step(&mut self, bus: &mut MemoryBus<'_>) -> StepOutcome {
                StepOutcome::Exception { vector: 0, pc: bus.cpu.pc() }
            }
            fn state(&self) -> &CpuState {
                unreachable!("not exercised by this test")
            }
        }

        let mut core = AlwaysResetCore;
        let mut dispatcher = Dispatcher::new();
        let err = run_loop(&mut core, &mut mem, &mut cpu, &mut dispatcher);
        assert!(matches!(err, Err(RixrunError::UnhandledException { vector: 0, .. })));
    }
}
