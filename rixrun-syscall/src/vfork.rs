//! The `vfork`/`execve` trampoline (C7).
//!
//! RISCiX's `system(3)` expands to `vfork(); execve("sh", ["-c", cmd]);
//! wait(...)`. Real process creation is out of scope (non-goal: real
//! `fork`/multi-process guests), so this module recognizes exactly the one
//! `execve` shape that idiom produces and runs it as a single host command,
//! rather than ever actually forking the emulator.

use rixrun_mem::{GuestMemory, MemoryError};

/// The fake child PID returned from a handled `vfork`/`execve`/`waitpid`
/// sequence. Any real PID collision is irrelevant since there is no real
/// child process to confuse it with.
pub(crate) const FAKE_CHILD_PID: i32 = 1234;

/// `execve`'s argv array is read with this cap even when it isn't
/// NUL-terminated in range, so a malformed guest array can't make the
/// trampoline scan indefinitely.
const MAX_ARGV: u32 = 16;

const SH_C_COMMAND_PREFIX: &str = "/sbin/cp ";

/// What [`execve`] decided after inspecting the guest's argv.
#[derive(Debug)]
pub enum ExecveOutcome {
    /// The `sh -c /sbin/cp ...` pattern matched; the rewritten command has
    /// already run on the host and exited with `exit_status`.
    Handled {
        /// The host command's exit status (low byte of a `waitpid`-style
        /// status word, not yet shifted).
        exit_status: i32,
    },
    /// No recognized pattern; the caller should fail the syscall with `ENOENT`.
    NoMatch,
}

fn read_argv(mem: &GuestMemory, argv_addr: u32) -> Result<Vec<String>, MemoryError> {
    let mut argv = Vec::new();
    for i in 0..MAX_ARGV {
        let ptr = mem.read_word_raw(argv_addr + i * 4)?;
        if ptr == 0 {
            break;
        }
        argv.push(mem.read_cstr(ptr)?.to_string_lossy().into_owned());
    }
    Ok(argv)
}

/// Inspects the guest's `argv` for the `sh -c /sbin/cp ...` shape and, if it
/// matches, runs the rewritten `cp ...` command on the host shell.
///
/// `argv_addr` is the guest address of the `char *argv[]` array (R1 at the
/// `execve` SWI); only argv is consulted, matching the original's behavior
/// of ignoring the `path` and `envp` arguments entirely for this purpose.
///
/// # Errors
///
/// Returns [`MemoryError`] if `argv_addr` or any string it points to falls
/// outside the guest address space.
pub fn execve(mem: &GuestMemory, argv_addr: u32) -> Result<ExecveOutcome, MemoryError> {
    let argv = read_argv(mem, argv_addr)?;

    let Some(command) = argv.get(2) else {
        return Ok(ExecveOutcome::NoMatch);
    };
    let matches = argv.first().map(String::as_str) == Some("sh")
        && argv.get(1).map(String::as_str) == Some("-c")
        && command.starts_with(SH_C_COMMAND_PREFIX);
    if !matches {
        return Ok(ExecveOutcome::NoMatch);
    }

    let rewritten = format!("cp {}", &command[SH_C_COMMAND_PREFIX.len()..]);
    log::debug!("vfork/execve trampoline: running `{rewritten}` on the host shell");

    let status = std::process::Command::new("sh")
        .arg("-c")
        .arg(&rewritten)
        .status();

    let exit_status = match status {
        Ok(s) => {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                s.code().unwrap_or_else(|| 128 + s.signal().unwrap_or(0))
            }
            #[cfg(not(unix))]
            {
                s.code().unwrap_or(1)
            }
        }
        Err(e) => {
            log::warn!("vfork/execve trampoline: failed to spawn host shell: {e}");
            127
        }
    };

    Ok(ExecveOutcome::Handled { exit_status })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_argv(mem: &mut GuestMemory, strings: &[&str]) -> u32 {
        let mut cursor = 0x5000u32;
        let argv_table = 0x4000u32;
        for (i, s) in strings.iter().enumerate() {
            mem.write_bytes_raw(cursor, s.as_bytes()).unwrap();
            mem.write_byte_raw(cursor + s.len() as u32, 0).unwrap();
            mem.write_word_raw(argv_table + (i as u32) * 4, cursor).unwrap();
            cursor += s.len() as u32 + 1;
        }
        mem.write_word_raw(argv_table + (strings.len() as u32) * 4, 0).unwrap();
        argv_table
    }

    #[test]
    fn non_matching_argv0_is_not_handled() {
        let mut mem = GuestMemory::new(None);
        let argv_addr = write_argv(&mut mem, &["bash", "-c", "/sbin/cp a b"]);
        let outcome = execve(&mem, argv_addr).unwrap();
        assert!(matches!(outcome, ExecveOutcome::NoMatch));
    }

    #[test]
    fn non_cp_command_is_not_handled() {
        let mut mem = GuestMemory::new(None);
        let argv_addr = write_argv(&mut mem, &["sh", "-c", "/bin/rm -rf /"]);
        let outcome = execve(&mem, argv_addr).unwrap();
        assert!(matches!(outcome, ExecveOutcome::NoMatch));
    }

    #[test]
    fn sh_c_cp_pattern_runs_the_rewritten_command_on_the_host() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        std::fs::write(&src, b"payload").unwrap();

        let cmd = format!("/sbin/cp {} {}", src.display(), dst.display());
        let mut mem = GuestMemory::new(None);
        let argv_addr = write_argv(&mut mem, &["sh", "-c", &cmd]);

        let outcome = execve(&mem, argv_addr).unwrap();
        match outcome {
            ExecveOutcome::Handled { exit_status } => assert_eq!(exit_status, 0),
            ExecveOutcome::NoMatch => panic!("expected the cp pattern to match"),
        }
        assert_eq!(std::fs::read(&dst).unwrap(), b"payload");
    }

    #[test]
    fn empty_argv_is_not_handled() {
        let mut mem = GuestMemory::new(None);
        let argv_addr = write_argv(&mut mem, &[]);
        let outcome = execve(&mem, argv_addr).unwrap();
        assert!(matches!(outcome, ExecveOutcome::NoMatch));
    }
}
