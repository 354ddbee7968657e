//! CPU-state record and memory-abort surface for the rixrun ARM emulator.
//!
//! The 26-bit ARM instruction decoder/executor itself is an **external
//! collaborator**: this crate does not decode or execute a single ARM
//! instruction. What it owns is the narrow interface such a core needs to
//! drive the rest of rixrun: a banked register file ([`CpuState`]), and the
//! memory-abort surface ([`bus::MemoryBus`]) that turns [`rixrun_mem::GuestMemory`]
//! accesses into the sequenced, cycle-counted, abort-aware operations the
//! core calls on every fetch/load/store. [`core::CpuCore`] names the seam a
//! conformant external core plugs into.

#![warn(missing_docs)]

pub mod bus;
pub mod core;
pub mod state;

pub use bus::{MemoryBus, ABORTWORD};
pub use core::{CpuCore, StepOutcome};
pub use state::{Cpsr, CpuState, Cycles, ProcessorMode};
