//! Instruction decode.
//!
//! The low two bits of the fetched word select the encoding length: `11`
//! means a full 32-bit instruction, anything else is a 16-bit compressed
//! form which is expanded to its 32-bit equivalent before the main decode.
//! The main decode dispatches on the 5-bit major opcode into the formats and
//! reconstructs the sign-extended immediate each one carries.
//!
//! A return of `None` is an illegal instruction; the dispatcher treats it as
//! a NOP that advances PC.

pub mod opcode;
pub mod rvc;

pub use opcode::Opcode;

use crate::lsu::MemWidth;

use opcode::*;
use tomasim_asm::Reg;

/// The dispatch class of a decoded instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UopKind {
    /// Register-register ALU op.
    Op,
    /// Register-immediate ALU op, including the shift-immediates.
    OpImm,
    Lui,
    Auipc,
    Load,
    Store,
    Branch,
    Jal,
    Jalr,
    /// Memory ordering is already program order here; executes as a NOP.
    Fence,
    Ecall,
    Ebreak,
}

/// One decoded instruction on its way into the pipeline.
#[derive(Clone, Copy, Debug)]
pub struct Uop {
    pub kind: UopKind,
    pub rd: Reg,
    pub rs1: Reg,
    pub rs2: Reg,
    pub funct3: u8,
    /// The ALU operation tag, `funct7 << 3 | funct3`. For shift-immediates
    /// the SRAI bit survives in here.
    pub op10: u16,
    pub imm: i32,
    /// Encoded length in bytes, 2 or 4.
    pub len: u32,
}

pub fn decode(word: u32) -> Option<Uop> {
    let raw = Opcode::new(word);
    let (op, len) = if raw.len() == 4 {
        (raw, 4)
    } else {
        (Opcode::new(rvc::expand(word as u16)?), 2)
    };

    let funct3 = op.funct3();
    let op10 = (op.funct7() as u16) << 3 | funct3 as u16;

    let uop = |kind, rd, rs1, rs2, op10, imm| {
        Some(Uop { kind, rd, rs1, rs2, funct3, op10, imm, len })
    };
    let zero = Reg::ZERO;

    match op.opcode() {
        OP_OP => match (op.funct7(), funct3) {
            (0x00, _) | (0x01, _) | (0x20, 0b000) | (0x20, 0b101) => {
                uop(UopKind::Op, op.rd(), op.rs1(), op.rs2(), op10, 0)
            }
            _ => None,
        },
        OP_IMM => match funct3 {
            // Shift-immediates keep funct7 in the op tag and the shamt as
            // the operand.
            0b001 if op.funct7() == 0x00 => {
                uop(UopKind::OpImm, op.rd(), op.rs1(), zero, op10, op.shamt())
            }
            0b101 if op.funct7() == 0x00 || op.funct7() == 0x20 => {
                uop(UopKind::OpImm, op.rd(), op.rs1(), zero, op10, op.shamt())
            }
            0b001 | 0b101 => None,
            _ => uop(UopKind::OpImm, op.rd(), op.rs1(), zero, funct3 as u16, op.imm_i()),
        },
        OP_LUI => uop(UopKind::Lui, op.rd(), zero, zero, 0, op.imm_u()),
        OP_AUIPC => uop(UopKind::Auipc, op.rd(), zero, zero, 0, op.imm_u()),
        OP_LOAD => {
            MemWidth::from_load_funct3(funct3)?;
            uop(UopKind::Load, op.rd(), op.rs1(), zero, 0, op.imm_i())
        }
        OP_STORE => {
            MemWidth::from_store_funct3(funct3)?;
            uop(UopKind::Store, zero, op.rs1(), op.rs2(), 0, op.imm_s())
        }
        OP_BRANCH => match funct3 {
            0b010 | 0b011 => None,
            _ => uop(UopKind::Branch, zero, op.rs1(), op.rs2(), 0, op.imm_b()),
        },
        OP_JAL => uop(UopKind::Jal, op.rd(), zero, zero, 0, op.imm_j()),
        OP_JALR => match funct3 {
            0b000 => uop(UopKind::Jalr, op.rd(), op.rs1(), zero, 0, op.imm_i()),
            _ => None,
        },
        OP_MISC_MEM => match funct3 {
            0b000 => uop(UopKind::Fence, zero, zero, zero, 0, 0),
            _ => None,
        },
        OP_SYSTEM => match (funct3, op.imm_i()) {
            (0b000, 0) => uop(UopKind::Ecall, zero, zero, zero, 0, 0),
            (0b000, 1) => uop(UopKind::Ebreak, zero, zero, zero, 0, 0),
            _ => None,
        },
        _ => None,
    }
}
