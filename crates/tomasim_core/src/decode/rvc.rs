//! Expansion of 16-bit compressed encodings.
//!
//! Every compressed instruction is a shorthand for one 32-bit base
//! instruction, so the decoder expands it first and runs the main decode on
//! the result. The integer subset of the compressed extension is supported
//! (quadrants 0 to 2, no floating-point forms); reserved encodings and the
//! all-zero halfword expand to nothing.

use tomasim_util::Bits;

// Builders for the 32-bit equivalents.

fn r_type(funct7: u32, rs2: u32, rs1: u32, funct3: u32, rd: u32) -> u32 {
    (0b01100_11_u32)
        .set_bits(31, 25, funct7)
        .set_bits(24, 20, rs2)
        .set_bits(19, 15, rs1)
        .set_bits(14, 12, funct3)
        .set_bits(11, 7, rd)
}

fn i_type(imm: i32, rs1: u32, funct3: u32, rd: u32, op: u32) -> u32 {
    op.set_bits(31, 20, imm as u32)
        .set_bits(19, 15, rs1)
        .set_bits(14, 12, funct3)
        .set_bits(11, 7, rd)
}

fn s_type(imm: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
    let imm = imm as u32;
    (0b01000_11_u32)
        .set_bits(31, 25, imm.bits(11, 5))
        .set_bits(24, 20, rs2)
        .set_bits(19, 15, rs1)
        .set_bits(14, 12, funct3)
        .set_bits(11, 7, imm.bits(4, 0))
}

fn b_type(imm: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
    let imm = imm as u32;
    (0b11000_11_u32)
        .set_bit(31, imm.bit(12))
        .set_bits(30, 25, imm.bits(10, 5))
        .set_bits(24, 20, rs2)
        .set_bits(19, 15, rs1)
        .set_bits(14, 12, funct3)
        .set_bits(11, 8, imm.bits(4, 1))
        .set_bit(7, imm.bit(11))
}

fn j_type(imm: i32, rd: u32) -> u32 {
    let imm = imm as u32;
    (0b11011_11_u32)
        .set_bit(31, imm.bit(20))
        .set_bits(30, 21, imm.bits(10, 1))
        .set_bit(20, imm.bit(11))
        .set_bits(19, 12, imm.bits(19, 12))
        .set_bits(11, 7, rd)
}

/// The popular-register field: 3 bits naming x8..x15.
fn popular(field: u16) -> u32 {
    field as u32 + 8
}

/// The CI-format immediate, imm[5] and imm[4:0], sign-extended.
fn ci_imm(ins: u16) -> i32 {
    0_u32
        .set_bit(5, ins.bit(12))
        .set_bits(4, 0, ins.bits(6, 2) as u32)
        .sign_extend(5) as i32
}

/// The CJ-format jump target, offset[11|4|9:8|10|6|7|3:1|5].
fn cj_imm(ins: u16) -> i32 {
    0_u32
        .set_bit(11, ins.bit(12))
        .set_bit(4, ins.bit(11))
        .set_bits(9, 8, ins.bits(10, 9) as u32)
        .set_bit(10, ins.bit(8))
        .set_bit(6, ins.bit(7))
        .set_bit(7, ins.bit(6))
        .set_bits(3, 1, ins.bits(5, 3) as u32)
        .set_bit(5, ins.bit(2))
        .sign_extend(11) as i32
}

/// The CB-format branch offset, offset[8|4:3] and offset[7:6|2:1|5].
fn cb_imm(ins: u16) -> i32 {
    0_u32
        .set_bit(8, ins.bit(12))
        .set_bits(4, 3, ins.bits(11, 10) as u32)
        .set_bits(7, 6, ins.bits(6, 5) as u32)
        .set_bits(2, 1, ins.bits(4, 3) as u32)
        .set_bit(5, ins.bit(2))
        .sign_extend(8) as i32
}

/// Expand a compressed encoding to its 32-bit equivalent.
pub fn expand(ins: u16) -> Option<u32> {
    // The all-zero halfword is defined illegal, which catches jumps into
    // zeroed memory.
    if ins == 0 {
        return None;
    }

    let funct3 = ins.bits(15, 13);
    let rd = ins.bits(11, 7) as u32;
    let rs2 = ins.bits(6, 2) as u32;

    match ins.bits(1, 0) {
        // Quadrant 0: stack pointer based allocation and the popular-register
        // loads and stores.
        0b00 => match funct3 {
            // C.ADDI4SPN: addi rd', sp, nzuimm.
            0b000 => {
                let imm = 0_u32
                    .set_bits(5, 4, ins.bits(12, 11) as u32)
                    .set_bits(9, 6, ins.bits(10, 7) as u32)
                    .set_bit(2, ins.bit(6))
                    .set_bit(3, ins.bit(5));
                (imm != 0).then(|| {
                    i_type(imm as i32, 2, 0b000, popular(ins.bits(4, 2)), 0b00100_11)
                })
            }
            // C.LW: lw rd', uimm(rs1').
            0b010 => {
                let imm = 0_u32
                    .set_bits(5, 3, ins.bits(12, 10) as u32)
                    .set_bit(2, ins.bit(6))
                    .set_bit(6, ins.bit(5));
                Some(i_type(
                    imm as i32,
                    popular(ins.bits(9, 7)),
                    0b010,
                    popular(ins.bits(4, 2)),
                    0b00000_11,
                ))
            }
            // C.SW: sw rs2', uimm(rs1').
            0b110 => {
                let imm = 0_u32
                    .set_bits(5, 3, ins.bits(12, 10) as u32)
                    .set_bit(2, ins.bit(6))
                    .set_bit(6, ins.bit(5));
                Some(s_type(
                    imm as i32,
                    popular(ins.bits(4, 2)),
                    popular(ins.bits(9, 7)),
                    0b010,
                ))
            }
            // The remaining forms are floating-point loads and stores.
            _ => None,
        },

        // Quadrant 1: immediate arithmetic, control flow.
        0b01 => match funct3 {
            // C.NOP / C.ADDI: addi rd, rd, imm.
            0b000 => Some(i_type(ci_imm(ins), rd, 0b000, rd, 0b00100_11)),
            // C.JAL: jal ra, offset.
            0b001 => Some(j_type(cj_imm(ins), 1)),
            // C.LI: addi rd, zero, imm.
            0b010 => Some(i_type(ci_imm(ins), 0, 0b000, rd, 0b00100_11)),
            0b011 if rd == 2 => {
                // C.ADDI16SP: addi sp, sp, nzimm.
                let imm = 0_u32
                    .set_bit(9, ins.bit(12))
                    .set_bit(4, ins.bit(6))
                    .set_bit(6, ins.bit(5))
                    .set_bits(8, 7, ins.bits(4, 3) as u32)
                    .set_bit(5, ins.bit(2))
                    .sign_extend(9) as i32;
                (imm != 0).then(|| i_type(imm, 2, 0b000, 2, 0b00100_11))
            }
            0b011 => {
                // C.LUI: lui rd, nzimm.
                let imm = 0_u32
                    .set_bit(17, ins.bit(12))
                    .set_bits(16, 12, ins.bits(6, 2) as u32)
                    .sign_extend(17) as i32;
                (imm != 0).then(|| {
                    (0b01101_11_u32)
                        .set_bits(31, 12, (imm as u32).bits(31, 12))
                        .set_bits(11, 7, rd)
                })
            }
            0b100 => {
                let rd = popular(ins.bits(9, 7));
                match ins.bits(11, 10) {
                    // C.SRLI / C.SRAI: shamt[5] must be zero on RV32.
                    0b00 => (!ins.bit(12))
                        .then(|| i_type(ins.bits(6, 2) as i32, rd, 0b101, rd, 0b00100_11)),
                    0b01 => (!ins.bit(12)).then(|| {
                        i_type(ins.bits(6, 2) as i32 | 0x400, rd, 0b101, rd, 0b00100_11)
                    }),
                    // C.ANDI.
                    0b10 => Some(i_type(ci_imm(ins), rd, 0b111, rd, 0b00100_11)),
                    _ => {
                        if ins.bit(12) {
                            // The word-sized forms of RV64.
                            return None;
                        }
                        let rs2 = popular(ins.bits(4, 2));
                        match ins.bits(6, 5) {
                            0b00 => Some(r_type(0x20, rs2, rd, 0b000, rd)),
                            0b01 => Some(r_type(0x00, rs2, rd, 0b100, rd)),
                            0b10 => Some(r_type(0x00, rs2, rd, 0b110, rd)),
                            _ => Some(r_type(0x00, rs2, rd, 0b111, rd)),
                        }
                    }
                }
            }
            // C.J: jal zero, offset.
            0b101 => Some(j_type(cj_imm(ins), 0)),
            // C.BEQZ / C.BNEZ: branch against zero.
            0b110 => Some(b_type(cb_imm(ins), 0, popular(ins.bits(9, 7)), 0b000)),
            _ => Some(b_type(cb_imm(ins), 0, popular(ins.bits(9, 7)), 0b001)),
        },

        // Quadrant 2: stack pointer relative accesses and register moves.
        0b10 => match funct3 {
            // C.SLLI: shamt[5] must be zero on RV32.
            0b000 => {
                (!ins.bit(12)).then(|| {
                    i_type(ins.bits(6, 2) as i32, rd, 0b001, rd, 0b00100_11)
                })
            }
            // C.LWSP: lw rd, uimm(sp).
            0b010 => {
                let imm = 0_u32
                    .set_bit(5, ins.bit(12))
                    .set_bits(4, 2, ins.bits(6, 4) as u32)
                    .set_bits(7, 6, ins.bits(3, 2) as u32);
                (rd != 0).then(|| i_type(imm as i32, 2, 0b010, rd, 0b00000_11))
            }
            0b100 => match (ins.bit(12), rd, rs2) {
                // C.EBREAK.
                (true, 0, 0) => Some(i_type(1, 0, 0b000, 0, 0b11100_11)),
                // C.JR / C.JALR: jalr with a zero offset.
                (false, 0, 0) => None,
                (false, rs1, 0) => Some(i_type(0, rs1, 0b000, 0, 0b11001_11)),
                (true, rs1, 0) => Some(i_type(0, rs1, 0b000, 1, 0b11001_11)),
                // C.MV / C.ADD.
                (false, rd, rs2) => Some(r_type(0x00, rs2, 0, 0b000, rd)),
                (true, rd, rs2) => Some(r_type(0x00, rs2, rd, 0b000, rd)),
            },
            // C.SWSP: sw rs2, uimm(sp).
            0b110 => {
                let imm = 0_u32
                    .set_bits(5, 2, ins.bits(12, 9) as u32)
                    .set_bits(7, 6, ins.bits(8, 7) as u32);
                Some(s_type(imm as i32, rs2, 2, 0b010))
            }
            _ => None,
        },

        // A 0b11 suffix is not a compressed instruction at all.
        _ => None,
    }
}
