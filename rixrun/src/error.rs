//! Top-level error type (C10): converges the load-time, FPE-install, and
//! fatal-dispatcher failure domains into one enum the CLI matches on to pick
//! an exit code and a diagnostic message.

/// Everything that can abort a `rixrun` invocation before or during guest
/// execution.
///
/// Guest-visible syscall errors (mapped errno, carry flag) are deliberately
/// *not* a variant here: those are successful dispatcher calls from this
/// type's point of view, signalled to the guest rather than to the host
/// process. Only conditions this emulator's coverage has no answer for reach
/// `main`.
#[derive(Debug, thiserror::Error)]
pub enum RixrunError {
    /// Loading the guest binary or its shared-library chain failed.
    #[error("failed to load guest binary: {0}")]
    Load(#[from] rixrun_loader::LoaderError),
    /// Installing the floating-point emulator blob failed.
    #[error("failed to install FPE: {0}")]
    Fpe(#[from] rixrun_fpe::FpeError),
    /// The guest issued a SWI this dispatcher doesn't handle, or a syscall
    /// argument was an invalid guest pointer.
    #[error("fatal SWI dispatch error: {0}")]
    Syscall(#[from] rixrun_syscall::SyscallError),
    /// The CPU core raised an exception through a vector other than 4
    /// (undefined instruction, handled by the FPE); this emulator has no
    /// handler for any other vector.
    #[error("unhandled CPU exception through vector {vector:#x} at pc {pc:#x}")]
    UnhandledException {
        /// Exception vector address.
        vector: u32,
        /// PC at the point of the exception.
        pc: u32,
    },
}
