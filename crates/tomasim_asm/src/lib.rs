//! A small RV32IMC instruction encoder. Written mainly to be used for
//! convenient testing and debugging: tests build a program as a list of
//! ['Ins'] values and assemble it into a little-endian byte image.
//!
//! # todo
//!
//! - Check for overflow in immediate values.
//!
//! - A text frontend (labels, pseudo instructions) if hand-written test
//!   programs ever get long enough to need one.

mod ins;

pub use ins::{Encoding, Ins, Reg, REGISTER_NAMES};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("{0} cannot be named by a 3-bit compressed register field")]
    NotPopular(Reg),
}

/// Assemble a list of instructions into a byte image. Compressed and full
/// encodings mix freely; each instruction takes 2 or 4 bytes.
pub fn assemble(program: &[Ins]) -> Result<Vec<u8>, Error> {
    let mut image = Vec::with_capacity(program.len() * 4);
    for ins in program {
        if let Some(reg) = ins.compressed_regs().into_iter().find(|reg| !reg.is_popular()) {
            return Err(Error::NotPopular(reg));
        }
        match ins.encode() {
            Encoding::Word(word) => image.extend_from_slice(&word.to_le_bytes()),
            Encoding::Half(half) => image.extend_from_slice(&half.to_le_bytes()),
        }
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unencodable_compressed_registers() {
        let err = assemble(&[Ins::CSub { rd: Reg::RA, rs2: Reg::A0 }]);
        assert_eq!(err, Err(Error::NotPopular(Reg::RA)));
    }
}
