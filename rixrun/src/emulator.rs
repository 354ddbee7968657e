//! The `Emulator` aggregate (§3, §9): the single owned struct that replaces
//! the original tool's process-singleton globals (`mem_base`,
//! `current_sbrk`, `state_vfork_backup`, `path_to_rixrun`, ...).

use std::path::PathBuf;

use rixrun_cpu::CpuState;
use rixrun_mem::{AbortWindow, GuestMemory};
use rixrun_syscall::Dispatcher;

use crate::config::Config;

/// Owns every piece of state a guest run needs: the flat address space, the
/// CPU's register file, the SWI dispatcher's own bookkeeping (`sbreak`
/// high-water-mark, vfork snapshot), and the resolved path to the `rixrun`
/// binary itself. Constructed once by the CLI and passed by reference to the
/// loader, FPE installer, and run loop.
pub struct Emulator {
    /// The guest's flat 32 MiB address space.
    pub mem: GuestMemory,
    /// The CPU's banked register file, PC, and CPSR.
    pub cpu: CpuState,
    /// The SWI dispatcher, holding `sbreak`/vfork state across calls.
    pub dispatcher: Dispatcher,
    /// Canonical host path to the running `rixrun` binary, resolved at
    /// startup (`realpath(argv[0])` in the original). Nothing in the core
    /// currently consumes this beyond logging/identification; kept for
    /// parity with the original tool and for future diagnostics.
    pub path_to_rixrun: Option<PathBuf>,
    /// The parsed `RIX_ROOT`/`RIX_VERBOSE` configuration this run started
    /// with.
    pub config: Config,
}

impl Emulator {
    /// Builds a fresh `Emulator`: a zeroed 32 MiB guest address space with
    /// the documented abort window, a reset CPU state, and an empty
    /// dispatcher, resolving `path_to_rixrun` from the current executable.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let path_to_rixrun = std::env::current_exe().and_then(std::fs::canonicalize).ok();
        Emulator {
            mem: GuestMemory::new(Some(AbortWindow::documented_default())),
            cpu: CpuState::new(),
            dispatcher: Dispatcher::new(),
            path_to_rixrun,
            config,
        }
    }
}
