//! The architectural register file with rename bookkeeping.
//!
//! Each entry holds the committed value plus the rename state: when `dirty`
//! is set, the newest producer of the register is the in-flight instruction
//! named by `src`, and the stored value is stale from the point of view of a
//! new consumer.

use crate::rob::Tag;

use tomasim_asm::Reg;

#[derive(Default, Clone, Copy)]
struct Entry {
    value: i32,
    src: Tag,
    dirty: bool,
}

pub struct RegFile {
    regs: Vec<Entry>,
}

impl RegFile {
    pub fn new(size: usize) -> Self {
        Self {
            regs: vec![Entry::default(); size],
        }
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    /// The committed value. Register 0 always reads as 0.
    pub fn read_data(&self, reg: Reg) -> i32 {
        self.regs[reg.index()].value
    }

    /// Write a committed value and drop the rename. Writes to register 0 are
    /// silently ignored.
    pub fn write_data(&mut self, reg: Reg, value: i32) {
        if reg == Reg::ZERO {
            return;
        }
        self.regs[reg.index()] = Entry {
            value,
            src: Tag::NONE,
            dirty: false,
        };
    }

    /// Commit-time write: the architectural value always updates, but the
    /// rename is dropped only if `tag` is still the newest producer. A
    /// younger in-flight producer keeps the register dirty.
    pub fn commit_data(&mut self, reg: Reg, value: i32, tag: Tag) {
        if reg == Reg::ZERO {
            return;
        }
        let entry = &mut self.regs[reg.index()];
        entry.value = value;
        if entry.src == tag {
            entry.src = Tag::NONE;
            entry.dirty = false;
        }
    }

    /// The rename state: the producing tag and whether it is live.
    pub fn read_src(&self, reg: Reg) -> (Tag, bool) {
        let entry = &self.regs[reg.index()];
        (entry.src, entry.dirty)
    }

    /// Rename the register to a new producer. Register 0 is never renamed.
    pub fn write_src(&mut self, reg: Reg, src: Tag) {
        if reg == Reg::ZERO {
            return;
        }
        let entry = &mut self.regs[reg.index()];
        entry.src = src;
        entry.dirty = true;
    }

    /// Drop every rename. Used for misprediction recovery, where the full
    /// pipeline flush kills every in-flight producer at once.
    pub fn clear_renames(&mut self) {
        for entry in self.regs.iter_mut() {
            entry.src = Tag::NONE;
            entry.dirty = false;
        }
    }
}
