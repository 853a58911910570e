use crate::decode::Opcode;
use crate::rob::Tag;
use crate::Cycle;

/// Observation hooks into the engine, used by debugger frontends and by
/// tests that need to see pipeline timing. Every method defaults to a no-op
/// so implementations pick the events they care about.
pub trait Debugger {
    /// Called when a fetched word has been decoded, before dispatch.
    fn fetch(&mut self, _cycle: Cycle, _addr: u32, _op: Opcode) {}

    /// Called when an instruction is allocated its reorder buffer slot.
    fn dispatch(&mut self, _cycle: Cycle, _tag: Tag) {}

    /// Called when a µop leaves the execution buffer for a unit.
    fn issue(&mut self, _cycle: Cycle, _tag: Tag) {}

    /// Called when a result goes out on a broadcast lane.
    fn writeback(&mut self, _cycle: Cycle, _tag: Tag, _value: i32) {}

    /// Called when the head of the reorder buffer retires.
    fn commit(&mut self, _cycle: Cycle, _tag: Tag) {}

    /// Called when a committing store reaches memory.
    fn mem_store(&mut self, _addr: u32, _value: i32) {}

    /// Polled after every cycle. The engine pauses when it returns true.
    fn should_break(&mut self) -> bool {
        false
    }
}

// Running without a debugger attached.
impl Debugger for () {}
