//! Program image loaders.
//!
//! Two formats are understood: plain hex text, one 32-bit word per line,
//! placed at increasing offsets from address zero; and 32-bit little-endian
//! RISC-V ELF executables, where every `PT_LOAD` segment lands at its
//! virtual address. The format is picked by file extension: `.txt` is hex
//! text, everything else is parsed as ELF.

use crate::mem::Memory;

use bytemuck::{AnyBitPattern, Zeroable};
use thiserror::Error;

use std::fs;
use std::io;
use std::path::Path;

#[derive(Error, Debug)]
pub enum ProgramError {
    #[error("failed to load program: {0}")]
    Io(#[from] io::Error),

    #[error("line {0}: expected a 32-bit hex word")]
    BadHex(usize),

    #[error("invalid elf image: {0}")]
    InvalidElf(String),
}

/// A chunk of the program image with a destination address. `zero_pad`
/// bytes of zeroes follow the data (the bss part of an ELF segment).
pub struct Segment {
    pub addr: u32,
    pub data: Vec<u8>,
    pub zero_pad: u32,
}

/// A loaded program image, ready to be placed in memory.
pub struct Program {
    pub entry: u32,
    pub segments: Vec<Segment>,
}

impl Program {
    pub fn load(path: &Path) -> Result<Self, ProgramError> {
        let ext = path.extension().and_then(|ext| ext.to_str());
        if ext == Some("txt") {
            Self::from_hex(&fs::read_to_string(path)?)
        } else {
            Self::from_elf(&fs::read(path)?)
        }
    }

    /// One 8-digit hex word per line. Trailing blank lines are tolerated.
    pub fn from_hex(text: &str) -> Result<Self, ProgramError> {
        let mut data = Vec::new();
        for (num, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.len() != 8 || !line.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(ProgramError::BadHex(num + 1));
            }
            let word = u32::from_str_radix(line, 16).map_err(|_| ProgramError::BadHex(num + 1))?;
            data.extend_from_slice(&word.to_le_bytes());
        }
        Ok(Self {
            entry: 0,
            segments: vec![Segment { addr: 0, data, zero_pad: 0 }],
        })
    }

    pub fn from_elf(image: &[u8]) -> Result<Self, ProgramError> {
        let header: ElfHeader = read_pod(image, 0)
            .ok_or_else(|| ProgramError::InvalidElf("truncated header".into()))?;

        if header.ident_magic != ELF_MAGIC {
            return Err(ProgramError::InvalidElf("bad magic value".into()));
        }
        if header.ident_class != CLASS_32 || header.ident_data != DATA_LITTLE_ENDIAN {
            return Err(ProgramError::InvalidElf(
                "only 32-bit little-endian images are supported".into(),
            ));
        }
        if header.machine != MACHINE_RISCV {
            return Err(ProgramError::InvalidElf(format!(
                "wrong machine type {}, expected risc-v",
                header.machine,
            )));
        }
        if header.ty != ET_EXEC {
            return Err(ProgramError::InvalidElf(format!(
                "object type {} is not an executable",
                header.ty,
            )));
        }

        let mut segments = Vec::new();
        for i in 0..header.phnum as usize {
            let offset = header.phoff as usize + i * header.phentsize as usize;
            let phdr: ProgramHeader = read_pod(image, offset)
                .ok_or_else(|| ProgramError::InvalidElf("truncated program header".into()))?;

            if phdr.ty != PT_LOAD || phdr.filesz == 0 {
                continue;
            }
            let begin = phdr.offset as usize;
            let end = begin + phdr.filesz as usize;
            let data = image
                .get(begin..end)
                .ok_or_else(|| ProgramError::InvalidElf("segment outside the file".into()))?;
            segments.push(Segment {
                addr: phdr.vaddr,
                data: data.to_vec(),
                zero_pad: phdr.memsz.saturating_sub(phdr.filesz),
            });
        }

        Ok(Self { entry: header.entry, segments })
    }

    /// Place the image in memory.
    pub fn write_to(&self, mem: &mut Memory) {
        for segment in &self.segments {
            mem.write_bytes(segment.addr, &segment.data);
            let zeroes = vec![0; segment.zero_pad as usize];
            mem.write_bytes(segment.addr.wrapping_add(segment.data.len() as u32), &zeroes);
        }
    }
}

// By-value read since nothing guarantees the field alignment of a byte
// buffer offset.
fn read_pod<T: AnyBitPattern>(image: &[u8], offset: usize) -> Option<T> {
    let bytes = image.get(offset..offset + std::mem::size_of::<T>())?;
    Some(bytemuck::pod_read_unaligned(bytes))
}

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const CLASS_32: u8 = 1;
const DATA_LITTLE_ENDIAN: u8 = 1;
const ET_EXEC: u16 = 2;
const MACHINE_RISCV: u16 = 243;
const PT_LOAD: u32 = 1;

/// The ELF32 file header.
#[repr(C)]
#[derive(Clone, Copy)]
struct ElfHeader {
    ident_magic: [u8; 4],
    ident_class: u8,
    ident_data: u8,
    ident_version: u8,
    ident_osabi: u8,
    ident_abiversion: u8,
    _ident_pad: [u8; 7],
    ty: u16,
    machine: u16,
    version: u32,
    /// Program counter at startup.
    entry: u32,
    /// File offset of the program header table.
    phoff: u32,
    shoff: u32,
    flags: u32,
    ehsize: u16,
    phentsize: u16,
    phnum: u16,
    shentsize: u16,
    shnum: u16,
    shstrndx: u16,
}

unsafe impl Zeroable for ElfHeader {}

unsafe impl AnyBitPattern for ElfHeader {}

/// An ELF32 program header.
#[repr(C)]
#[derive(Clone, Copy)]
struct ProgramHeader {
    ty: u32,
    /// File offset of the segment data.
    offset: u32,
    /// Virtual load address.
    vaddr: u32,
    paddr: u32,
    /// Bytes stored in the file.
    filesz: u32,
    /// Bytes occupied in memory; the tail beyond `filesz` is zeroed.
    memsz: u32,
    flags: u32,
    align: u32,
}

unsafe impl Zeroable for ProgramHeader {}

unsafe impl AnyBitPattern for ProgramHeader {}
