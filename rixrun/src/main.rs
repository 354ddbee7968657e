//! `rixrun`: runs a legacy RISCiX ARM binary on a modern host by loading its
//! ZMAGIC shared-library chain into a simulated 26-bit address space and
//! translating its SWIs into host syscalls.
//!
//! The ARM instruction decoder/executor itself is an external collaborator
//! (see [`stub_core`]); what this binary owns is the loader, the
//! memory/abort surface, the FPE installer, and the SWI dispatcher — the
//! parts that earn this tool its "systems" label.

#![warn(missing_docs)]

mod config;
mod emulator;
mod error;
mod run;
mod stub_core;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use config::Config;
use emulator::Emulator;
use error::RixrunError;
use stub_core::StubCore;

/// Runs a RISCiX ARM binary.
///
/// All tool behavior beyond the guest path and its arguments is controlled
/// by environment variables (`RIX_ROOT`, `RIX_VERBOSE`), matching the
/// original tool's argv convention of passing `argv[1..]` straight through
/// to the guest.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to the RISCiX guest binary to run.
    guest: PathBuf,

    /// Arguments passed through to the guest program's `argv[1..]`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    guest_args: Vec<String>,
}

/// Minimal synthesized `envp` the original tool hands to every guest,
/// instead of forwarding the host environment; preserved rather than
/// "fixed" since guest binaries were built against it (§4.6).
const GUEST_ENVP: &[&str] = &["PATH=/usr/bin:/usr/sbin"];

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::from_env();
    env_logger::Builder::new().filter_level(config.log_level()).init();

    match run_guest(&cli, config) {
        Ok(status) => {
            #[allow(clippy::cast_sign_loss)]
            ExitCode::from((status & 0xFF) as u8)
        }
        Err(e) => {
            eprintln!("rixrun: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_guest(cli: &Cli, config: Config) -> Result<i32, RixrunError> {
    let verbose = config.verbose;
    let mut emu = Emulator::new(config);

    let mut argv = vec![cli.guest.to_string_lossy().into_owned()];
    argv.extend(cli.guest_args.iter().cloned());
    let envp: Vec<String> = GUEST_ENVP.iter().map(|s| (*s).to_owned()).collect();

    let load_result = rixrun_loader::load(
        &mut emu.mem,
        &mut emu.cpu,
        &emu.config.root,
        &cli.guest.to_string_lossy(),
        &argv,
        &envp,
    )?;
    log::info!("loaded guest: entry={:#x} sp={:#x}", load_result.entry, load_result.sp);

    rixrun_fpe::install(&mut emu.mem, &mut emu.cpu, &rixrun_fpe::PLACEHOLDER_BLOB)?;

    if verbose >= 2 {
        dump_state(&emu.cpu);
    }

    let mut core = StubCore::new();
    run::run_loop(&mut core, &mut emu.mem, &mut emu.cpu, &mut emu.dispatcher)
}

fn dump_state(cpu: &rixrun_cpu::CpuState) {
    let mode = cpu.mode();
    log::info!("pc={:#010x} mode={mode:?} carry={}", cpu.pc(), cpu.carry());
    for n in 0..13 {
        log::info!("r{n}={:#010x}", cpu.get_reg(mode, n));
    }
    log::info!("sp={:#010x}", cpu.get_reg(mode, 13));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zmagic_exit0(path: &std::path::Path) {
        use rixrun_loader::{ExecHeader, Magic, RixExec};

        let text: [u8; 4] = 0xEF00_0001u32.to_le_bytes(); // SWI 1 (exit), status in R0 (0)
        let hdr = ExecHeader {
            a_exec: RixExec {
                magic: Magic::SpZmagic as u32,
                text: text.len() as u32,
                data: 0,
                bss: 0,
                syms: 0,
                entry: 0x0000_8000,
                trsize: 0,
                drsize: 0,
            },
            a_shlibname: String::new(),
        };

        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(&hdr.to_bytes()).unwrap();
        let pad = 0x8000 - ExecHeader::SIZE;
        f.write_all(&vec![0u8; pad]).unwrap();
        f.write_all(&text).unwrap();
    }

    #[test]
    fn run_guest_loads_and_runs_a_minimal_binary_to_exit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog");
        write_zmagic_exit0(&path);

        let cli = Cli { guest: path, guest_args: vec![] };
        let config = Config { root: String::new(), verbose: 0 };
        let status = run_guest(&cli, config).unwrap();
        assert_eq!(status, 0);
    }
}
