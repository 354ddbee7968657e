//! Loads a RISCiX ZMAGIC executable and its shared-library chain into guest
//! memory, and builds the initial argv/envp stack the guest's `_start`
//! expects.
//!
//! RISCiX executables that use a shared library (`SPZMAGIC`) are never
//! self-contained: the header names one shared library, which may itself
//! name a further one, forming a chain terminated by a library whose header
//! carries no further name (`SLZMAGIC`) or a chained one (`SLPZMAGIC`). This
//! loader walks that chain, loads each member's text/data into a shared text
//! segment in load order, and finally loads the executable itself on top.

#![warn(missing_docs)]

mod header;
mod stack;

pub use header::{ExecHeader, HeaderError, Magic, RixExec};
pub use stack::{build_argptr, copy_strings};

use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use rixrun_cpu::CpuState;
use rixrun_mem::GuestMemory;

/// Guest address the primary executable's text segment is mapped at, and
/// the start of the shared text/data arena libraries are packed into ahead
/// of it.
pub const RX_MAP_START_ADDR: u32 = 0x0000_8000;

/// File offset within a ZMAGIC file where the text segment begins (after
/// the header and padding to the next page).
pub const RX_ZM_TEXT_OFFS: u32 = 0x0000_8000;

/// Size of the region reserved for the initial argv/envp stack area, carved
/// downward from `RX_MAP_DATA_ADDR + RX_MAP_DATA_LEN`.
pub const RX_MAP_DATA_LEN: u32 = 0x0010_0000;

/// Base of the shared-library data region. The initial stack's nominal top
/// is `RX_MAP_DATA_ADDR + RX_MAP_DATA_LEN` (`0x0180_0000`); `copy_strings`
/// carves downward from there unless a loaded library's data segment
/// demands a lower starting point.
pub const RX_MAP_DATA_ADDR: u32 = 0x0180_0000 - RX_MAP_DATA_LEN;

/// Upper bound on shared-library chain length.
///
/// Mirrors the original's four-slot library array, but its bound check
/// (`lnum == MAX_SHARED_LIBS - 1`) fires one slot early, so in practice only
/// three libraries may be chained before [`LoaderError::TooManyLibs`] is
/// raised. Preserved here rather than "fixed", since this loader's job is
/// to reproduce what RISCiX actually did, off-by-one included.
pub const MAX_SHARED_LIBS: u32 = 4;

/// Errors raised while loading an executable and its library chain.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// The object's magic number isn't one this loader can execute
    /// (typically a plain `ZMAGIC` with no shared-library support, which
    /// this emulator doesn't run).
    #[error("unsupported or missing shared-library magic number")]
    BadMagic,
    /// A library's magic number wasn't one of `SLZMAGIC`/`SLPZMAGIC`.
    #[error("shared library has an unrecognized magic number")]
    UnrecognizedLibMagic,
    /// The shared-library chain exceeded [`MAX_SHARED_LIBS`] (effectively
    /// three libraries; see that constant's documentation).
    #[error("shared-library chain is longer than this loader supports")]
    TooManyLibs,
    /// The argv/envp string table or pointer tables didn't fit in the
    /// guest address space below the starting stack pointer.
    #[error("initial stack area overflowed below the guest address space")]
    StackOverflow,
    /// Opening or reading an object file failed.
    #[error("failed to read {path}: {source}")]
    Open {
        /// Host path that could not be opened or read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Parsing the on-disk header failed.
    #[error(transparent)]
    Header(#[from] HeaderError),
    /// A guest memory access fell outside the address space.
    #[error(transparent)]
    Memory(#[from] rixrun_mem::MemoryError),
}

/// A shared library's header and the host path it was read from.
#[derive(Debug)]
pub struct LibRecord {
    /// The library's parsed `exec_hdr`.
    pub header: ExecHeader,
    /// Guest-visible library name from the referring header's
    /// `a_shlibname`.
    pub guest_path: String,
    /// Resolved host filesystem path.
    pub host_path: PathBuf,
}

/// The outcome of a successful [`load`]: where the guest should start
/// executing, and the stack pointer it should start with.
#[derive(Debug, Clone, Copy)]
pub struct LoadResult {
    /// Entry point of the primary executable.
    pub entry: u32,
    /// Initial stack pointer (`R13`).
    pub sp: u32,
}

/// Resolves a RISCiX path against `root` and reads its `exec_hdr`.
///
/// For the primary executable (`relative = false`) `rel_path` is used
/// as-is: it is assumed to already be a host-resolvable path (the path the
/// user asked to run). For a shared library (`relative = true`) the host
/// path is built by literal concatenation, `format!("{root}/{rel_path}")`
/// — matching the original's unconditional `snprintf("%s/%s", ...)` rather
/// than a filesystem-aware join. This preserves a real quirk: an unset
/// `RIX_ROOT` (empty `root`) yields a path that starts with `/` and so
/// resolves against the real host filesystem root, not the current
/// directory.
///
/// # Errors
///
/// Returns [`LoaderError::Open`] if the file can't be opened or fully read,
/// or [`LoaderError::Header`] if the header doesn't parse.
pub fn get_hdr(root: &str, rel_path: &str, relative: bool) -> Result<(ExecHeader, PathBuf), LoaderError> {
    let host_path = if relative {
        PathBuf::from(format!("{root}/{rel_path}"))
    } else {
        PathBuf::from(rel_path)
    };

    let mut buf = [0u8; ExecHeader::SIZE];
    let file = std::fs::File::open(&host_path)
        .map_err(|source| LoaderError::Open { path: host_path.display().to_string(), source })?;
    file.read_exact_at(&mut buf, 0)
        .map_err(|source| LoaderError::Open { path: host_path.display().to_string(), source })?;
    let header = ExecHeader::parse(&buf)?;
    Ok((header, host_path))
}

/// Loads one ZMAGIC object's text and (if present) data segment into guest
/// memory.
///
/// The text segment always lands at `*current_tseg_base`, which is then
/// advanced past it. A library's data segment lands at its header's
/// `a_exec.entry` field (`a_sldatabase`, the fixed guest address the
/// library was linked to expect its data at) without moving
/// `current_tseg_base`; an executable's data segment instead lands
/// immediately after its text, advancing `current_tseg_base` past it too,
/// since an executable has no fixed data address of its own.
///
/// Returns `hdr.a_exec.entry`: the library's data base for a library, or
/// the process entry point for an executable.
///
/// # Errors
///
/// Returns [`LoaderError::BadMagic`]/[`LoaderError::UnrecognizedLibMagic`]
/// if `hdr`'s magic doesn't permit loading, [`LoaderError::Open`] if the
/// file can't be read, or [`LoaderError::Memory`] if a segment doesn't fit
/// in the guest address space.
pub fn load_zm_file(
    mem: &mut GuestMemory,
    current_tseg_base: &mut u32,
    path: &Path,
    hdr: &ExecHeader,
    is_library: bool,
) -> Result<u32, LoaderError> {
    let magic = Magic::try_from(hdr.a_exec.magic).map_err(|_| LoaderError::BadMagic)?;
    if is_library && !magic.is_library() {
        return Err(LoaderError::UnrecognizedLibMagic);
    }
    if !is_library && magic.is_library() {
        return Err(LoaderError::BadMagic);
    }

    let file = std::fs::File::open(path)
        .map_err(|source| LoaderError::Open { path: path.display().to_string(), source })?;

    let text_len = hdr.a_exec.text;
    let mut text_buf = vec![0u8; text_len as usize];
    file.read_exact_at(&mut text_buf, u64::from(RX_ZM_TEXT_OFFS))
        .map_err(|source| LoaderError::Open { path: path.display().to_string(), source })?;
    mem.write_bytes_raw(*current_tseg_base, &text_buf)?;
    *current_tseg_base += text_len;

    let entry_addr = hdr.a_exec.entry;

    if hdr.a_exec.data > 0 {
        let mut data_buf = vec![0u8; hdr.a_exec.data as usize];
        file.read_exact_at(&mut data_buf, u64::from(RX_ZM_TEXT_OFFS + text_len))
            .map_err(|source| LoaderError::Open { path: path.display().to_string(), source })?;
        if is_library {
            mem.write_bytes_raw(entry_addr, &data_buf)?;
        } else {
            mem.write_bytes_raw(*current_tseg_base, &data_buf)?;
            *current_tseg_base += hdr.a_exec.data;
        }
    }

    if hdr.a_exec.bss > 0 {
        log::warn!(
            "{}: {} bytes of bss are not zeroed on load",
            path.display(),
            hdr.a_exec.bss
        );
    }

    Ok(entry_addr)
}

/// Loads `exe_path` and its shared-library chain into `mem`, builds the
/// initial argv/envp stack, and points `cpu` at the entry point with the
/// initial stack pointer.
///
/// `root` is the value of `RIX_ROOT` (may be empty; see [`get_hdr`]).
/// `argv`/`envp` become the guest process's initial arguments and
/// environment.
///
/// # Errors
///
/// Returns [`LoaderError::BadMagic`] if `exe_path` isn't an `SPZMAGIC`
/// executable, [`LoaderError::TooManyLibs`] if its library chain is too
/// long, or any of [`load_zm_file`]'s or [`stack::copy_strings`]'s errors.
pub fn load(
    mem: &mut GuestMemory,
    cpu: &mut CpuState,
    root: &str,
    exe_path: &str,
    argv: &[String],
    envp: &[String],
) -> Result<LoadResult, LoaderError> {
    let (exe_hdr, exe_host_path) = get_hdr(root, exe_path, false)?;
    if Magic::try_from(exe_hdr.a_exec.magic).ok() != Some(Magic::SpZmagic) {
        return Err(LoaderError::BadMagic);
    }

    let mut libs = Vec::new();
    let mut next_lib_name = Some(exe_hdr.a_shlibname.clone());
    let mut lnum = 0u32;
    while let Some(lib_name) = next_lib_name.take() {
        if lib_name.is_empty() {
            break;
        }
        if lnum >= MAX_SHARED_LIBS - 1 {
            return Err(LoaderError::TooManyLibs);
        }
        let (lib_hdr, lib_host_path) = get_hdr(root, &lib_name, true)?;
        let lib_magic = Magic::try_from(lib_hdr.a_exec.magic).map_err(|_| LoaderError::UnrecognizedLibMagic)?;
        if !lib_magic.is_library() {
            return Err(LoaderError::UnrecognizedLibMagic);
        }
        if lib_magic == Magic::SlPZmagic {
            next_lib_name = Some(lib_hdr.a_shlibname.clone());
        }
        libs.push(LibRecord { header: lib_hdr, guest_path: lib_name, host_path: lib_host_path });
        lnum += 1;
    }

    let mut tseg_base = RX_MAP_START_ADDR;
    let mut sp = RX_MAP_DATA_ADDR + RX_MAP_DATA_LEN;

    for lib in libs.iter().rev() {
        let data_addr = load_zm_file(mem, &mut tseg_base, &lib.host_path, &lib.header, true)?;
        if sp >= data_addr {
            sp = data_addr - 4;
        }
    }

    let entry = load_zm_file(mem, &mut tseg_base, &exe_host_path, &exe_hdr, false)?;

    let mut strings: Vec<&str> = Vec::with_capacity(argv.len() + envp.len());
    strings.extend(argv.iter().map(String::as_str));
    strings.extend(envp.iter().map(String::as_str));
    let stringp = copy_strings(mem, sp, &strings)?;
    // The pointer tables must land word-aligned; the string area itself need
    // not be, so `stringp` stays unaligned as the base the tables point into.
    let final_sp = build_argptr(
        mem,
        u32::try_from(envp.len()).expect("envp count fits in u32"),
        u32::try_from(argv.len()).expect("argv count fits in u32"),
        stringp & !3,
        stringp,
    )?;

    cpu.set_pc(entry);
    let mode = cpu.mode();
    cpu.set_reg(mode, 13, final_sp);

    Ok(LoadResult { entry, sp: final_sp })
}
