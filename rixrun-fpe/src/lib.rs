//! Installs the floating-point emulator blob and redirects the
//! undefined-instruction vector to it.
//!
//! Guest binaries issue FP coprocessor instructions that a bare 26-bit
//! ARMv2/v3 core traps as undefined. RISCiX's fix-up is to drop a small
//! pre-assembled handler ("the FPE") into low guest memory and point vector
//! 4 at it, so the external ARM core's undefined-instruction exception path
//! lands in code that emulates the coprocessor op and returns, rather than
//! rixrun treating every FP instruction as fatal.

#![warn(missing_docs)]

use rixrun_cpu::{CpuState, ProcessorMode};
use rixrun_mem::GuestMemory;

/// Guest address the FPE blob is installed at.
pub const FPESTART: u32 = 0x2000;

/// Sentinel word terminating the FPE blob; the word immediately before it
/// is the FPE's entry offset.
pub const FPE_SENTINEL: u32 = 0xFFFF_FFFF;

/// Errors raised while installing the FPE.
#[derive(Debug, thiserror::Error)]
pub enum FpeError {
    /// The blob didn't end in [`FPE_SENTINEL`], so its entry offset
    /// couldn't be located.
    #[error("FPE blob is malformed: last word is not the {FPE_SENTINEL:#x} sentinel")]
    MissingSentinel,
    /// The blob has fewer than two words, so there's no room for both an
    /// entry offset and the sentinel.
    #[error("FPE blob must contain at least an entry offset and a sentinel word")]
    BlobTooShort,
    /// Writing the blob (or the patched vector) into guest memory failed.
    #[error("failed to install FPE into guest memory: {0}")]
    Memory(#[from] rixrun_mem::MemoryError),
}

/// A placeholder FPE blob used when no real pre-assembled handler is
/// available.
///
/// The real FPE is an opaque, pre-assembled ARM code blob (historically
/// harvested from GDB's `armfpe.h`) that this repository does not have the
/// rights or bytes to embed. This stand-in is two words: `MOVS PC, LR`
/// (`0xE1B0F00E`, return from the exception immediately) followed by the
/// sentinel, so [`install`]'s contract — scan for the sentinel, treat the
/// preceding word as the entry offset — is exercised end-to-end even
/// without genuine coprocessor emulation. A real deployment replaces this
/// with the actual blob.
pub const PLACEHOLDER_BLOB: [u32; 2] = [0xE1B0_F00E, FPE_SENTINEL];

/// Installs `blob` at [`FPESTART`], patches the undefined-instruction
/// vector to branch to its entry point, sets up the SVC-mode stack below
/// it, and switches the CPU to `User26` mode ready for guest execution.
///
/// `blob` is a sequence of 32-bit little-endian guest words ending in
/// [`FPE_SENTINEL`]; the word immediately preceding the sentinel is the
/// FPE's entry offset from [`FPESTART`].
///
/// # Errors
///
/// Returns [`FpeError::BlobTooShort`] or [`FpeError::MissingSentinel`] if
/// `blob` doesn't meet that contract, or [`FpeError::Memory`] if writing it
/// into guest memory overflows [`rixrun_mem::MEM_SIZE`].
pub fn install(mem: &mut GuestMemory, cpu: &mut CpuState, blob: &[u32]) -> Result<(), FpeError> {
    if blob.len() < 2 {
        return Err(FpeError::BlobTooShort);
    }
    if *blob.last().expect("checked above") != FPE_SENTINEL {
        return Err(FpeError::MissingSentinel);
    }
    let entry_offset = blob[blob.len() - 2];

    for (i, word) in blob.iter().enumerate() {
        let addr = FPESTART + (i as u32) * 4;
        mem.write_word_raw(addr, *word)?;
    }
    log::debug!("FPE installed at {FPESTART:#x}, entry offset {entry_offset:#x}");

    // Standard ARM PC-relative branch encoding with the -8 pipeline
    // adjustment: 0xEA000000 is `B` with a zero offset; the operand is the
    // word-count to the target, biased by -2 for the two-stage pipeline
    // (-3 overall to also remove the self-inclusive increment).
    let vector_instr = 0xEA00_0000u32
        .wrapping_add(entry_offset >> 2)
        .wrapping_sub(3);
    mem.write_word_raw(4, vector_instr)?;

    cpu.set_reg(ProcessorMode::Svc26, 13, FPESTART - 4);
    cpu.set_mode(ProcessorMode::User26);
    cpu.prefetch_abort = false;
    cpu.data_abort = false;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rixrun_mem::GuestMemory;

    #[test]
    fn rejects_blob_without_sentinel() {
        let mut mem = GuestMemory::new(None);
        let mut cpu = CpuState::new();
        let err = install(&mut mem, &mut cpu, &[0x1, 0x2, 0x3]);
        assert!(matches!(err, Err(FpeError::MissingSentinel)));
    }

    #[test]
    fn rejects_too_short_blob() {
        let mut mem = GuestMemory::new(None);
        let mut cpu = CpuState::new();
        let err = install(&mut mem, &mut cpu, &[FPE_SENTINEL]);
        assert!(matches!(err, Err(FpeError::BlobTooShort)));
    }

    #[test]
    fn installs_blob_and_patches_vector_four() {
        let mut mem = GuestMemory::new(None);
        let mut cpu = CpuState::new();
        install(&mut mem, &mut cpu, &PLACEHOLDER_BLOB).unwrap();

        assert_eq!(mem.read_word_raw(FPESTART).unwrap(), PLACEHOLDER_BLOB[0]);
        assert_eq!(mem.read_word_raw(FPESTART + 4).unwrap(), FPE_SENTINEL);

        let entry_offset = PLACEHOLDER_BLOB[0];
        let expected = 0xEA00_0000u32.wrapping_add(entry_offset >> 2).wrapping_sub(3);
        assert_eq!(mem.read_word_raw(4).unwrap(), expected);
    }

    #[test]
    fn sets_up_svc_stack_and_switches_to_user_mode() {
        let mut mem = GuestMemory::new(None);
        let mut cpu = CpuState::new();
        install(&mut mem, &mut cpu, &PLACEHOLDER_BLOB).unwrap();

        assert_eq!(cpu.get_reg(ProcessorMode::Svc26, 13), FPESTART - 4);
        assert_eq!(cpu.mode(), ProcessorMode::User26);
    }
}
