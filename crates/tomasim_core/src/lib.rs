//! A cycle-level simulator of a 32-bit RISC-V integer processor (IMC subset)
//! built around an out-of-order execution engine with in-order commit.
//!
//! The ['Engine'] owns every component and advances in discrete ticks; all
//! cross-component references are small integer tags, never pointers, so
//! each component owns its state outright.

#[macro_use]
extern crate log;

#[cfg(test)]
mod test;

pub mod alu;
pub mod cdb;
pub mod debug;
pub mod decode;
pub mod engine;
pub mod exb;
pub mod exu;
pub mod lsu;
pub mod mem;
pub mod program;
pub mod reg;
pub mod rob;

pub use cdb::CdbPolicy;
pub use debug::Debugger;
pub use decode::Opcode;
pub use engine::{Engine, InitError, Parameters, Status, StopReason};
pub use mem::Memory;
pub use program::{Program, ProgramError};
pub use rob::Tag;

pub use tomasim_asm::Reg;

/// A point in time, counted in engine ticks since startup.
pub type Cycle = u64;
