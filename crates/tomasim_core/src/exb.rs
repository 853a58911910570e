//! The execution buffer.
//!
//! The reservation-station analogue: a decoded µop parks here with its
//! operand values or producer tags until both operands are ready and a
//! capable execution unit is free. Entries reference producers by tag only,
//! and learn values from the broadcast paths (CDB and commit).

use crate::rob::Tag;

/// The operation an entry performs once issued.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ExbOp {
    /// Plain ALU op named by the 10-bit tag.
    Alu(u16),
    /// Conditional branch: compare the operands under `cond` (the branch
    /// funct3) and select between the two next-PC candidates computed at
    /// dispatch.
    Branch { cond: u8, taken: u32, fall: u32 },
    /// Register-indirect jump: the next PC is `(vj + vk) & !1`.
    Jalr,
}

#[derive(Clone, Copy)]
pub struct ExbEntry {
    pub op: ExbOp,
    /// Operand values. Valid once the matching ready flag is set.
    pub vj: i32,
    pub vk: i32,
    /// Producer tags for operands that are still in flight.
    pub qj: Tag,
    pub qk: Tag,
    /// Operand ready flags.
    pub rj: bool,
    pub rk: bool,
    /// Destination reorder buffer slot.
    pub qr: Tag,
    pub busy: bool,
}

impl ExbEntry {
    fn is_ready(&self) -> bool {
        self.busy && self.rj && self.rk
    }
}

pub struct Exb {
    buf: Vec<ExbEntry>,
}

impl Exb {
    pub fn new(size: usize) -> Self {
        Self {
            buf: vec![
                ExbEntry {
                    op: ExbOp::Alu(0),
                    vj: 0,
                    vk: 0,
                    qj: Tag::NONE,
                    qk: Tag::NONE,
                    rj: false,
                    rk: false,
                    qr: Tag::NONE,
                    busy: false,
                };
                size
            ],
        }
    }

    pub fn is_full(&self) -> bool {
        self.buf.iter().all(|entry| entry.busy)
    }

    /// Park a µop in the first free slot. Fails when the buffer is full, in
    /// which case dispatch stalls for the tick.
    pub fn insert(&mut self, entry: ExbEntry) -> bool {
        match self.buf.iter_mut().find(|slot| !slot.busy) {
            Some(slot) => {
                *slot = ExbEntry { busy: true, ..entry };
                true
            }
            None => false,
        }
    }

    /// Slots whose operands are both ready, lowest index first. The order is
    /// the deterministic selection policy of the issue stage.
    pub fn ready(&self) -> Vec<usize> {
        self.buf
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_ready())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn entry(&self, index: usize) -> &ExbEntry {
        &self.buf[index]
    }

    /// Release a slot once its µop is bound to a unit.
    pub fn take(&mut self, index: usize) -> ExbEntry {
        let entry = self.buf[index];
        self.buf[index].busy = false;
        entry
    }

    /// Result broadcast: every waiting operand with a matching producer tag
    /// captures the value. Used for both CDB lanes and committing slots.
    pub fn forward(&mut self, tag: Tag, value: i32) {
        for entry in self.buf.iter_mut().filter(|entry| entry.busy) {
            if !entry.rj && entry.qj == tag {
                entry.vj = value;
                entry.rj = true;
            }
            if !entry.rk && entry.qk == tag {
                entry.vk = value;
                entry.rk = true;
            }
        }
    }

    pub fn flush(&mut self) {
        for entry in self.buf.iter_mut() {
            entry.busy = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(qj: Tag, qk: Tag, qr: Tag) -> ExbEntry {
        ExbEntry {
            op: ExbOp::Alu(0),
            vj: 0,
            vk: 0,
            qj,
            qk,
            rj: qj.is_none(),
            rk: qk.is_none(),
            qr,
            busy: true,
        }
    }

    #[test]
    fn ready_after_both_forwards() {
        let mut exb = Exb::new(2);
        let (a, b) = (Tag::from_index(0), Tag::from_index(1));

        assert!(exb.insert(entry(a, b, Tag::from_index(2))));
        assert!(exb.ready().is_empty());

        exb.forward(a, 11);
        assert!(exb.ready().is_empty());

        exb.forward(b, 22);
        assert_eq!(exb.ready(), vec![0]);

        let taken = exb.take(0);
        assert_eq!((taken.vj, taken.vk), (11, 22));
        assert!(exb.ready().is_empty());
    }

    #[test]
    fn forward_reaches_every_waiter() {
        let mut exb = Exb::new(3);
        let tag = Tag::from_index(0);

        for i in 1..=3 {
            assert!(exb.insert(entry(tag, Tag::NONE, Tag::from_index(i))));
        }
        exb.forward(tag, 7);
        assert_eq!(exb.ready(), vec![0, 1, 2]);
    }

    #[test]
    fn insert_fails_when_full() {
        let mut exb = Exb::new(1);
        assert!(exb.insert(entry(Tag::NONE, Tag::NONE, Tag::from_index(0))));
        assert!(exb.is_full());
        assert!(!exb.insert(entry(Tag::NONE, Tag::NONE, Tag::from_index(1))));
    }
}
