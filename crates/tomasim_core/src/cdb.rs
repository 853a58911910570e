//! The common data bus.
//!
//! A fixed set of broadcast lanes. The writeback stage clears the lanes,
//! selects completed producers up to the lane count, and every consumer
//! (reorder buffer, execution buffer, load/store unit, dispatch operand
//! search) observes the same lanes within the tick.

use crate::rob::Tag;

/// Producer selection order when more results are ready than there are
/// lanes. Selection is deterministic either way.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CdbPolicy {
    /// Execution units in ascending index, then loads in ascending slot.
    LowestIndex,
    /// Same candidate list, but the priority start rotates every tick so a
    /// saturated bus cannot starve high-indexed producers.
    RoundRobin,
}

impl Default for CdbPolicy {
    fn default() -> Self {
        CdbPolicy::LowestIndex
    }
}

#[derive(Clone, Copy)]
pub struct Lane {
    pub qr: Tag,
    pub result: i32,
    pub valid: bool,
}

pub struct Cdb {
    lanes: Vec<Lane>,
}

impl Cdb {
    pub fn new(nb_lanes: usize) -> Self {
        Self {
            lanes: vec![
                Lane {
                    qr: Tag::NONE,
                    result: 0,
                    valid: false,
                };
                nb_lanes
            ],
        }
    }

    /// Start a new broadcast cycle.
    pub fn begin(&mut self) {
        for lane in self.lanes.iter_mut() {
            lane.valid = false;
        }
    }

    /// Claim the next free lane. Returns false when the bus is saturated;
    /// the producer keeps its result and retries next tick.
    pub fn publish(&mut self, qr: Tag, result: i32) -> bool {
        match self.lanes.iter_mut().find(|lane| !lane.valid) {
            Some(lane) => {
                *lane = Lane { qr, result, valid: true };
                true
            }
            None => false,
        }
    }

    /// The broadcasts of the current cycle.
    pub fn lanes(&self) -> impl Iterator<Item = &Lane> {
        self.lanes.iter().filter(|lane| lane.valid)
    }

    /// Dispatch-side operand search of the current broadcasts.
    pub fn lookup(&self, tag: Tag) -> Option<i32> {
        self.lanes().find(|lane| lane.qr == tag).map(|lane| lane.result)
    }
}
