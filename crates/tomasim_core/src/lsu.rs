//! The load/store unit.
//!
//! Owns a load buffer and a store buffer and enforces the memory ordering
//! rules: stores reach memory in program order and only at commit, while a
//! load may complete early by forwarding from an older uncommitted store or
//! by reading memory once every older store is known not to alias it.
//!
//! The store buffer is a ring FIFO over fixed slots so that program order
//! survives without moving entries; a load snapshots the busy store slots at
//! dispatch as a bitmask, which is exactly the set of stores older than it.

use crate::mem::Memory;
use crate::rob::Tag;

use tomasim_util::Bits;

/// Access width, from the load/store funct3.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MemWidth {
    B,
    H,
    W,
    Bu,
    Hu,
}

impl MemWidth {
    pub fn from_load_funct3(funct3: u8) -> Option<Self> {
        match funct3 {
            0b000 => Some(MemWidth::B),
            0b001 => Some(MemWidth::H),
            0b010 => Some(MemWidth::W),
            0b100 => Some(MemWidth::Bu),
            0b101 => Some(MemWidth::Hu),
            _ => None,
        }
    }

    pub fn from_store_funct3(funct3: u8) -> Option<Self> {
        match funct3 {
            0b000 => Some(MemWidth::B),
            0b001 => Some(MemWidth::H),
            0b010 => Some(MemWidth::W),
            _ => None,
        }
    }

    pub fn bytes(self) -> u32 {
        match self {
            MemWidth::B | MemWidth::Bu => 1,
            MemWidth::H | MemWidth::Hu => 2,
            MemWidth::W => 4,
        }
    }

    /// Sign- or zero-extend raw memory bytes to a register value.
    fn extend(self, raw: u32) -> i32 {
        match self {
            MemWidth::B => raw as u8 as i8 as i32,
            MemWidth::Bu => (raw as u8) as i32,
            MemWidth::H => raw as u16 as i16 as i32,
            MemWidth::Hu => (raw as u16) as i32,
            MemWidth::W => raw as i32,
        }
    }
}

/// An operand that is either a value or a promise named by a producer tag.
#[derive(Clone, Copy)]
pub struct Operand {
    pub value: i32,
    pub tag: Tag,
    pub ready: bool,
}

impl Operand {
    pub fn value(value: i32) -> Self {
        Self { value, tag: Tag::NONE, ready: true }
    }

    pub fn pending(tag: Tag) -> Self {
        Self { value: 0, tag, ready: false }
    }

    fn capture(&mut self, tag: Tag, value: i32) {
        if !self.ready && self.tag == tag {
            self.value = value;
            self.ready = true;
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Status {
    /// Address unresolved.
    Wait,
    /// Address known, access not yet performed.
    Ready,
    /// Result available, waiting for a broadcast lane.
    Done,
}

#[derive(Clone, Copy)]
struct LoadEntry {
    base: Operand,
    imm: i32,
    width: MemWidth,
    qr: Tag,
    data: i32,
    status: Status,
    /// Store slots that were busy when this load dispatched: every store
    /// older than the load in program order.
    store_mask: u32,
    /// Set once the load has stalled behind an older store with an
    /// unresolved address.
    spec: bool,
    busy: bool,
}

impl LoadEntry {
    fn addr(&self) -> u32 {
        self.base.value.wrapping_add(self.imm) as u32
    }
}

#[derive(Clone, Copy)]
struct StoreEntry {
    base: Operand,
    data: Operand,
    imm: i32,
    width: MemWidth,
    qr: Tag,
    /// Completion has been reported; the store now waits for its commit.
    issued: bool,
    busy: bool,
}

impl StoreEntry {
    fn addr(&self) -> u32 {
        self.base.value.wrapping_add(self.imm) as u32
    }
}

pub struct Lsu {
    loads: Vec<LoadEntry>,
    stores: Vec<StoreEntry>,
    sb_head: usize,
    sb_count: usize,
}

impl Lsu {
    pub fn new(lb_size: usize, sb_size: usize) -> Self {
        assert!(sb_size <= 32, "store mask is 32 bits wide");
        Self {
            loads: vec![
                LoadEntry {
                    base: Operand::value(0),
                    imm: 0,
                    width: MemWidth::W,
                    qr: Tag::NONE,
                    data: 0,
                    status: Status::Wait,
                    store_mask: 0,
                    spec: false,
                    busy: false,
                };
                lb_size
            ],
            stores: vec![
                StoreEntry {
                    base: Operand::value(0),
                    data: Operand::value(0),
                    imm: 0,
                    width: MemWidth::W,
                    qr: Tag::NONE,
                    issued: false,
                    busy: false,
                };
                sb_size
            ],
            sb_head: 0,
            sb_count: 0,
        }
    }

    pub fn loads_full(&self) -> bool {
        self.loads.iter().all(|load| load.busy)
    }

    pub fn stores_full(&self) -> bool {
        self.sb_count == self.stores.len()
    }

    /// Loads that have stalled behind an unresolved older store address.
    pub fn spec_loads(&self) -> usize {
        self.loads.iter().filter(|load| load.busy && load.spec).count()
    }

    fn busy_store_mask(&self) -> u32 {
        self.stores
            .iter()
            .enumerate()
            .filter(|(_, store)| store.busy)
            .fold(0, |mask, (slot, _)| mask.set_bit(slot, true))
    }

    pub fn push_load(&mut self, base: Operand, imm: i32, width: MemWidth, qr: Tag) -> bool {
        let store_mask = self.busy_store_mask();
        match self.loads.iter_mut().find(|load| !load.busy) {
            Some(load) => {
                *load = LoadEntry {
                    base,
                    imm,
                    width,
                    qr,
                    data: 0,
                    status: if base.ready { Status::Ready } else { Status::Wait },
                    store_mask,
                    spec: false,
                    busy: true,
                };
                true
            }
            None => false,
        }
    }

    pub fn push_store(
        &mut self,
        base: Operand,
        data: Operand,
        imm: i32,
        width: MemWidth,
        qr: Tag,
    ) -> bool {
        if self.stores_full() {
            return false;
        }
        let slot = (self.sb_head + self.sb_count) % self.stores.len();
        self.stores[slot] = StoreEntry {
            base,
            data,
            imm,
            width,
            qr,
            issued: false,
            busy: true,
        };
        self.sb_count += 1;
        true
    }

    /// Result broadcast from the CDB or a committing slot.
    pub fn forward(&mut self, tag: Tag, value: i32) {
        for load in self.loads.iter_mut().filter(|load| load.busy) {
            load.base.capture(tag, value);
        }
        for store in self.stores.iter_mut().filter(|store| store.busy) {
            store.base.capture(tag, value);
            store.data.capture(tag, value);
        }
    }

    /// One cycle of progress: try to complete every load whose address is
    /// resolved, per the ordering rules against its older stores.
    pub fn execute(&mut self, mem: &Memory) {
        for index in 0..self.loads.len() {
            if !self.loads[index].busy || self.loads[index].status == Status::Done {
                continue;
            }
            if self.loads[index].status == Status::Wait {
                if !self.loads[index].base.ready {
                    continue;
                }
                self.loads[index].status = Status::Ready;
            }
            let load = self.loads[index];
            match self.older_store_scan(&load) {
                Scan::Blocked { unresolved } => {
                    if unresolved {
                        self.loads[index].spec = true;
                    }
                }
                Scan::Forward(raw) => {
                    self.loads[index].data = load.width.extend(raw);
                    self.loads[index].status = Status::Done;
                }
                Scan::ReadMemory => {
                    let raw = match load.width.bytes() {
                        1 => mem.load::<u8>(load.addr()) as u32,
                        2 => mem.load::<u16>(load.addr()) as u32,
                        _ => mem.load::<u32>(load.addr()),
                    };
                    self.loads[index].data = load.width.extend(raw);
                    self.loads[index].status = Status::Done;
                }
            }
        }
    }

    /// Walk the load's older stores youngest first and decide how the load
    /// gets its value this cycle.
    fn older_store_scan(&self, load: &LoadEntry) -> Scan {
        for age in (0..self.sb_count).rev() {
            let slot = (self.sb_head + age) % self.stores.len();
            if !load.store_mask.bit(slot) {
                continue;
            }
            let store = &self.stores[slot];
            if !store.base.ready {
                // The store could alias the load; nothing younger than it
                // can answer either, so the load waits.
                return Scan::Blocked { unresolved: true };
            }
            let l_lo = load.addr() as u64;
            let l_hi = l_lo + load.width.bytes() as u64;
            let s_lo = store.addr() as u64;
            let s_hi = s_lo + store.width.bytes() as u64;
            if l_hi <= s_lo || s_hi <= l_lo {
                continue;
            }
            if s_lo <= l_lo && l_hi <= s_hi {
                if !store.data.ready {
                    return Scan::Blocked { unresolved: false };
                }
                let shift = 8 * (l_lo - s_lo) as u32;
                return Scan::Forward(store.data.value as u32 >> shift);
            }
            // Partial overlap: the value straddles the store and memory, so
            // wait for the store to drain.
            return Scan::Blocked { unresolved: false };
        }
        Scan::ReadMemory
    }

    /// Completed loads waiting for a broadcast lane, oldest slot first.
    pub fn done_loads(&self) -> Vec<usize> {
        self.loads
            .iter()
            .enumerate()
            .filter(|(_, load)| load.busy && load.status == Status::Done)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn load_result(&self, index: usize) -> (Tag, i32) {
        let load = &self.loads[index];
        (load.qr, load.data)
    }

    pub fn release_load(&mut self, index: usize) {
        self.loads[index].busy = false;
    }

    /// Stores whose address and data have both resolved report completion
    /// once; they stay buffered until commit drains them.
    pub fn take_ready_stores(&mut self) -> Vec<Tag> {
        let mut ready = Vec::new();
        for age in 0..self.sb_count {
            let slot = (self.sb_head + age) % self.stores.len();
            let store = &mut self.stores[slot];
            if store.busy && !store.issued && store.base.ready && store.data.ready {
                store.issued = true;
                ready.push(store.qr);
            }
        }
        ready
    }

    /// Commit the head store to memory. Stores leave the buffer strictly in
    /// program order, so the head must carry the committing tag. Returns the
    /// performed access.
    pub fn commit_store(&mut self, tag: Tag, mem: &mut Memory) -> (u32, i32) {
        let slot = self.sb_head;
        let store = self.stores[slot];
        debug_assert!(store.busy && store.qr == tag, "store commit out of order");

        match store.width {
            MemWidth::B | MemWidth::Bu => mem.store::<u8>(store.addr(), store.data.value as u8),
            MemWidth::H | MemWidth::Hu => mem.store::<u16>(store.addr(), store.data.value as u16),
            MemWidth::W => mem.store::<u32>(store.addr(), store.data.value as u32),
        }

        self.stores[slot].busy = false;
        self.sb_head = (self.sb_head + 1) % self.stores.len();
        self.sb_count -= 1;

        // The slot no longer holds an older store for any pending load.
        for load in self.loads.iter_mut().filter(|load| load.busy) {
            load.store_mask = load.store_mask.set_bit(slot, false);
        }

        (store.addr(), store.data.value)
    }

    /// Misprediction recovery: every load and uncommitted store dies.
    pub fn flush(&mut self) {
        for load in self.loads.iter_mut() {
            load.busy = false;
        }
        for store in self.stores.iter_mut() {
            store.busy = false;
        }
        self.sb_head = 0;
        self.sb_count = 0;
    }
}

enum Scan {
    /// The load cannot complete this cycle. `unresolved` marks the
    /// speculative case, an older store whose address is still unknown.
    Blocked { unresolved: bool },
    /// Store-to-load forwarding with the raw bytes already shifted into
    /// place.
    Forward(u32),
    ReadMemory,
}
