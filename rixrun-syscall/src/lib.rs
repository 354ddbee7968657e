//! SWI dispatcher: translates RISCiX software interrupts into host syscalls.
//!
//! This is the busiest seam in rixrun. The CPU core decodes a `SWI`
//! instruction down to its 24-bit immediate and calls [`Dispatcher::dispatch`]
//! with the low 20 bits; the dispatcher pulls arguments out of R0..R3 (guest
//! pointers are just `u32` guest addresses), performs the equivalent host
//! call, and writes the result back with the carry flag signalling
//! success/failure exactly like the guest's own libc expects from a trap.

#![warn(missing_docs)]

pub mod convert;
pub mod stat;
mod vfork;

pub use convert::{rix_to_host_openflags, ErrnoMapper};
pub use stat::RixStat;
pub use vfork::{execve, ExecveOutcome};

use std::ffi::CString;

use rixrun_cpu::{CpuState, ProcessorMode};
use rixrun_mem::GuestMemory;

/// What the dispatcher wants the run loop to do after handling one SWI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handled; keep stepping the guest.
    Continue,
    /// The guest issued `exit`; the run loop should stop with this status.
    Exited(i32),
}

/// Fatal dispatcher failures: conditions this emulator's syscall coverage
/// doesn't handle at all, as opposed to a guest-visible errno.
#[derive(Debug, thiserror::Error)]
pub enum SyscallError {
    /// The low 20 bits of the SWI immediate named a syscall this dispatcher
    /// has no handler for.
    #[error("unhandled SWI number {number} ({number:#x})")]
    Unhandled {
        /// The SWI number that had no table entry.
        number: u32,
    },
    /// A guest pointer argument didn't resolve to valid guest memory.
    #[error(transparent)]
    Memory(#[from] rixrun_mem::MemoryError),
}

/// RISCiX's fixed, guest-visible answers to `getpagesize`/`getdtablesize`.
const RIX_PAGESIZE: u32 = 32768;
const RIX_DTABLESIZE: u32 = 512;

/// Carries the dispatcher's own process-singleton state: the `sbreak`
/// high-water-mark, the vfork snapshot and its pending exit status, and the
/// errno-mapping warning dedup. One instance is owned by the `Emulator`
/// aggregate for the lifetime of a guest run.
pub struct Dispatcher {
    sbrk: u32,
    vfork_backup: Option<CpuState>,
    vfork_ret_status: i32,
    errno_mapper: ErrnoMapper,
}

impl Dispatcher {
    /// Creates a dispatcher with no pending vfork and a zeroed break.
    #[must_use]
    pub fn new() -> Self {
        Dispatcher {
            sbrk: 0,
            vfork_backup: None,
            vfork_ret_status: 0,
            errno_mapper: ErrnoMapper::new(),
        }
    }

    /// The most recently recorded `sbreak` target. Never enforced against
    /// `MEM_SIZE` (see the design notes' "open questions" on `sbreak`).
    #[must_use]
    pub fn sbrk(&self) -> u32 {
        self.sbrk
    }

    fn arg(cpu: &CpuState, n: u8) -> u32 {
        cpu.get_reg(cpu.mode(), n)
    }

    fn succeed(cpu: &mut CpuState, result: u32) {
        cpu.clear_carry();
        let mode = cpu.mode();
        cpu.set_reg(mode, 0, result);
    }

    fn fail(&mut self, cpu: &mut CpuState, host_errno: i32) {
        let rix_errno = self.errno_mapper.host_to_rix(host_errno);
        cpu.set_carry();
        let mode = cpu.mode();
        #[allow(clippy::cast_sign_loss)]
        cpu.set_reg(mode, 0, rix_errno as u32);
    }

    /// Calls `f`, a thin host-syscall wrapper returning a raw `-1`-on-error
    /// result, and marshals its outcome into the guest ABI: success clears
    /// carry with R0 holding `f`'s return value reinterpreted as `u32`,
    /// failure sets carry with R0 holding the mapped errno.
    fn host_call(&mut self, cpu: &mut CpuState, f: impl FnOnce() -> libc::c_long) {
        let ret = f();
        if ret < 0 {
            self.fail(cpu, errno());
        } else {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Self::succeed(cpu, ret as u32);
        }
    }

    fn read_path(mem: &GuestMemory, addr: u32) -> Result<CString, SyscallError> {
        Ok(mem.read_cstr(addr)?.to_owned())
    }

    /// Handles one SWI. `number` is the low-20-bits syscall selector the CPU
    /// core already extracted from the 24-bit immediate.
    ///
    /// # Errors
    ///
    /// Returns [`SyscallError::Unhandled`] for any number not in the table,
    /// or [`SyscallError::Memory`] if a guest pointer argument is
    /// out-of-bounds. Neither case is a guest-visible errno: both are fatal
    /// to this emulator's coverage and propagate to the CLI as a diagnostic.
    pub fn dispatch(
        &mut self,
        number: u32,
        mem: &mut GuestMemory,
        cpu: &mut CpuState,
    ) -> Result<DispatchOutcome, SyscallError> {
        log::trace!("SWI {number}");
        match number {
            1 => {
                #[allow(clippy::cast_possible_wrap)]
                let status = Self::arg(cpu, 0) as i32;
                return Ok(DispatchOutcome::Exited(status));
            }
            3 => self.sys_read(mem, cpu)?,
            4 => self.sys_write(mem, cpu)?,
            6 => self.sys_close(cpu),
            8 => self.sys_creat(mem, cpu)?,
            9 => self.sys_link(mem, cpu)?,
            10 => self.sys_unlink(mem, cpu)?,
            11 => self.sys_waitpid(mem, cpu)?,
            15 | 16 | 54 | 60 | 108..=112 => Self::succeed(cpu, 0),
            17 => self.sys_sbreak(cpu),
            19 => self.sys_lseek(cpu),
            20 => Self::succeed(cpu, rix_getpid()),
            28 => self.sys_open(mem, cpu)?,
            34 => self.sys_access(mem, cpu)?,
            59 => self.sys_execve(mem, cpu)?,
            62 => self.sys_fstat(mem, cpu)?,
            64 => Self::succeed(cpu, RIX_PAGESIZE),
            66 => self.sys_vfork(cpu),
            89 => Self::succeed(cpu, RIX_DTABLESIZE),
            116 => self.sys_gettimeofday(mem, cpu)?,
            117 => self.sys_getrusage(mem, cpu)?,
            130 => self.sys_ftruncate(cpu),
            _ => return Err(SyscallError::Unhandled { number }),
        }
        Ok(DispatchOutcome::Continue)
    }

    fn sys_read(&mut self, mem: &mut GuestMemory, cpu: &mut CpuState) -> Result<(), SyscallError> {
        #[allow(clippy::cast_possible_wrap)]
        let fd = Self::arg(cpu, 0) as libc::c_int;
        let buf_addr = Self::arg(cpu, 1);
        let len = Self::arg(cpu, 2);

        let mut scratch = vec![0u8; len as usize];
        let n = unsafe { libc::read(fd, scratch.as_mut_ptr().cast(), len as usize) };
        if n < 0 {
            self.fail(cpu, errno());
            return Ok(());
        }
        #[allow(clippy::cast_sign_loss)]
        mem.write_bytes_raw(buf_addr, &scratch[..n as usize])?;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Self::succeed(cpu, n as u32);
        Ok(())
    }

    fn sys_write(&mut self, mem: &mut GuestMemory, cpu: &mut CpuState) -> Result<(), SyscallError> {
        #[allow(clippy::cast_possible_wrap)]
        let fd = Self::arg(cpu, 0) as libc::c_int;
        let buf_addr = Self::arg(cpu, 1);
        let len = Self::arg(cpu, 2);

        let data = mem.read_bytes_raw(buf_addr, len)?.to_vec();
        self.host_call(cpu, || unsafe { libc::write(fd, data.as_ptr().cast(), data.len()) as libc::c_long });
        Ok(())
    }

    fn sys_close(&mut self, cpu: &mut CpuState) {
        #[allow(clippy::cast_possible_wrap)]
        let fd = Self::arg(cpu, 0) as libc::c_int;
        if (0..=2).contains(&fd) {
            Self::succeed(cpu, 0);
            return;
        }
        self.host_call(cpu, || unsafe { libc::close(fd) as libc::c_long });
    }

    fn sys_creat(&mut self, mem: &GuestMemory, cpu: &mut CpuState) -> Result<(), SyscallError> {
        let path = Self::read_path(mem, Self::arg(cpu, 0))?;
        #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
        let mode = Self::arg(cpu, 1) as libc::mode_t;
        self.host_call(cpu, || unsafe { libc::creat(path.as_ptr(), mode) as libc::c_long });
        Ok(())
    }

    fn sys_link(&mut self, mem: &GuestMemory, cpu: &mut CpuState) -> Result<(), SyscallError> {
        let old = Self::read_path(mem, Self::arg(cpu, 0))?;
        let new = Self::read_path(mem, Self::arg(cpu, 1))?;
        self.host_call(cpu, || unsafe { libc::link(old.as_ptr(), new.as_ptr()) as libc::c_long });
        Ok(())
    }

    fn sys_unlink(&mut self, mem: &GuestMemory, cpu: &mut CpuState) -> Result<(), SyscallError> {
        let path = Self::read_path(mem, Self::arg(cpu, 0))?;
        self.host_call(cpu, || unsafe { libc::unlink(path.as_ptr()) as libc::c_long });
        Ok(())
    }

    fn sys_waitpid(&mut self, mem: &mut GuestMemory, cpu: &mut CpuState) -> Result<(), SyscallError> {
        #[allow(clippy::cast_possible_wrap)]
        let pid = Self::arg(cpu, 0) as i32;
        let status_addr = Self::arg(cpu, 1);

        if pid < 1 || pid == vfork::FAKE_CHILD_PID {
            if status_addr != 0 {
                #[allow(clippy::cast_sign_loss)]
                mem.write_word_raw(status_addr, self.vfork_ret_status as u32)?;
            }
            #[allow(clippy::cast_sign_loss)]
            Self::succeed(cpu, vfork::FAKE_CHILD_PID as u32);
        } else {
            self.fail(cpu, libc::ECHILD);
        }
        Ok(())
    }

    fn sys_sbreak(&mut self, cpu: &mut CpuState) {
        self.sbrk = Self::arg(cpu, 0);
        Self::succeed(cpu, 0);
    }

    fn sys_lseek(&mut self, cpu: &mut CpuState) {
        #[allow(clippy::cast_possible_wrap)]
        let fd = Self::arg(cpu, 0) as libc::c_int;
        #[allow(clippy::cast_possible_wrap)]
        let offset = Self::arg(cpu, 1) as libc::off_t;
        #[allow(clippy::cast_possible_wrap)]
        let whence = Self::arg(cpu, 2) as libc::c_int;
        self.host_call(cpu, || unsafe { libc::lseek(fd, offset, whence) as libc::c_long });
    }

    fn sys_open(&mut self, mem: &GuestMemory, cpu: &mut CpuState) -> Result<(), SyscallError> {
        let path = Self::read_path(mem, Self::arg(cpu, 0))?;
        let flags = rix_to_host_openflags(Self::arg(cpu, 1));
        #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
        let mode = Self::arg(cpu, 2) as libc::mode_t;
        self.host_call(cpu, || unsafe { libc::open(path.as_ptr(), flags, mode) as libc::c_long });
        Ok(())
    }

    fn sys_access(&mut self, mem: &GuestMemory, cpu: &mut CpuState) -> Result<(), SyscallError> {
        let path = Self::read_path(mem, Self::arg(cpu, 0))?;
        #[allow(clippy::cast_possible_wrap)]
        let mode = Self::arg(cpu, 1) as libc::c_int;
        self.host_call(cpu, || unsafe { libc::access(path.as_ptr(), mode) as libc::c_long });
        Ok(())
    }

    fn sys_execve(&mut self, mem: &mut GuestMemory, cpu: &mut CpuState) -> Result<(), SyscallError> {
        let argv_addr = Self::arg(cpu, 1);
        match execve(mem, argv_addr)? {
            ExecveOutcome::Handled { exit_status } => {
                self.vfork_ret_status = (exit_status & 0xff) << 8;
                if let Some(backup) = self.vfork_backup.take() {
                    *cpu = backup;
                }
                #[allow(clippy::cast_sign_loss)]
                Self::succeed(cpu, vfork::FAKE_CHILD_PID as u32);
            }
            ExecveOutcome::NoMatch => self.fail(cpu, libc::ENOENT),
        }
        Ok(())
    }

    fn sys_fstat(&mut self, mem: &mut GuestMemory, cpu: &mut CpuState) -> Result<(), SyscallError> {
        #[allow(clippy::cast_possible_wrap)]
        let fd = Self::arg(cpu, 0) as libc::c_int;
        let buf_addr = Self::arg(cpu, 1);

        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::fstat(fd, &mut st) };
        if ret < 0 {
            self.fail(cpu, errno());
            return Ok(());
        }
        let rix_stat = RixStat::from_host(&st);
        rix_stat.write_to(mem, buf_addr)?;
        Self::succeed(cpu, 0);
        Ok(())
    }

    fn sys_vfork(&mut self, cpu: &mut CpuState) {
        self.vfork_backup = Some(cpu.clone());
        Self::succeed(cpu, 0);
    }

    fn sys_gettimeofday(&mut self, mem: &mut GuestMemory, cpu: &mut CpuState) -> Result<(), SyscallError> {
        let tvp = Self::arg(cpu, 0);
        if tvp != 0 {
            let mut tv: libc::timeval = unsafe { std::mem::zeroed() };
            let ret = unsafe { libc::gettimeofday(&mut tv, std::ptr::null_mut()) };
            if ret < 0 {
                self.fail(cpu, errno());
                return Ok(());
            }
            #[allow(clippy::cast_possible_truncation)]
            mem.write_word_raw(tvp, tv.tv_sec as u32)?;
            #[allow(clippy::cast_possible_truncation)]
            mem.write_word_raw(tvp + 4, tv.tv_usec as u32)?;
        }
        Self::succeed(cpu, 0);
        Ok(())
    }

    fn sys_getrusage(&mut self, mem: &mut GuestMemory, cpu: &mut CpuState) -> Result<(), SyscallError> {
        let buf_addr = Self::arg(cpu, 1);
        mem.write_bytes_raw(buf_addr, &[0u8; 64])?;
        Self::succeed(cpu, 0);
        Ok(())
    }

    fn sys_ftruncate(&mut self, cpu: &mut CpuState) {
        #[allow(clippy::cast_possible_wrap)]
        let fd = Self::arg(cpu, 0) as libc::c_int;
        #[allow(clippy::cast_possible_wrap)]
        let length = Self::arg(cpu, 1) as libc::off_t;
        self.host_call(cpu, || unsafe { libc::ftruncate(fd, length) as libc::c_long });
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)
}

/// `getpid`, truncated to 16 bits before zero-extension back to 32 — a known
/// limitation on hosts whose PIDs exceed 65535, preserved rather than fixed
/// (see the design notes).
fn rix_getpid() -> u32 {
    let pid = unsafe { libc::getpid() };
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    u32::from(pid as u16)
}
