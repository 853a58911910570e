//! The execution engine.
//!
//! Owns every component and advances them in discrete ticks. A tick runs the
//! five stages in reverse pipeline order, commit first and dispatch last,
//! which gives the flip-flop semantics of synchronous hardware: a stage
//! always reads what the previous cycle produced, never what an earlier
//! stage wrote this cycle.
//!
//! Instructions flow the other way through the same stages: dispatch decodes
//! the word at PC and allocates a reorder buffer slot; issue binds ready
//! µops to execution units; execute burns latency cycles; writeback
//! broadcasts finished results on the bus; commit retires the reorder buffer
//! head into the architectural state.
//!
//! Fetch predicts fall-through (not-taken) and a branch resolves at commit:
//! if the resolved next PC disagrees with the prediction, everything younger
//! than the branch is in-flight by definition, so recovery is a bulk flush
//! of the buffers plus a fetch redirect, completed within the tick.

use crate::alu;
use crate::cdb::{Cdb, CdbPolicy};
use crate::debug::Debugger;
use crate::decode::{self, Opcode, UopKind};
use crate::exb::{Exb, ExbEntry, ExbOp};
use crate::exu::{caps, ExuPool};
use crate::lsu::{Lsu, MemWidth, Operand};
use crate::mem::Memory;
use crate::program::{Program, ProgramError};
use crate::reg::RegFile;
use crate::rob::{Commit, CommitKind, Rob, SysOp, Tag};
use crate::Cycle;

use tomasim_asm::Reg;
use thiserror::Error;

use std::path::PathBuf;

#[derive(Error, Debug)]
pub enum InitError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Program(#[from] ProgramError),
}

/// Sizing of every engine structure plus the program image to run.
#[derive(Clone, Debug)]
pub struct Parameters {
    pub mem_size: usize,
    pub rob_size: usize,
    pub exb_size: usize,
    pub reg_size: usize,
    pub cdb_size: usize,
    pub nb_units: usize,
    pub lb_size: usize,
    pub sb_size: usize,
    pub cdb_policy: CdbPolicy,
    pub program: PathBuf,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            mem_size: 64 * 1024,
            rob_size: 16,
            exb_size: 8,
            reg_size: 32,
            cdb_size: 2,
            nb_units: 2,
            lb_size: 4,
            sb_size: 4,
            cdb_policy: CdbPolicy::LowestIndex,
            program: PathBuf::new(),
        }
    }
}

impl Parameters {
    fn validate(&self) -> Result<(), InitError> {
        let sizes = [
            ("mem_size", self.mem_size),
            ("rob_size", self.rob_size),
            ("exb_size", self.exb_size),
            ("reg_size", self.reg_size),
            ("cdb_size", self.cdb_size),
            ("nb_units", self.nb_units),
            ("lb_size", self.lb_size),
            ("sb_size", self.sb_size),
        ];
        for (name, size) in sizes {
            if size == 0 {
                return Err(InitError::Config(format!("{name} must be greater than zero")));
            }
        }
        if self.rob_size > 254 {
            return Err(InitError::Config(
                "rob_size is limited to 254 by the tag width".into(),
            ));
        }
        if self.reg_size < 32 {
            return Err(InitError::Config(
                "reg_size must cover the 32 registers the decoder names".into(),
            ));
        }
        if self.sb_size > 32 {
            return Err(InitError::Config(
                "sb_size is limited to 32 by the store mask".into(),
            ));
        }
        Ok(())
    }
}

/// What the engine is doing between ticks.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Status {
    Running,
    /// An EBREAK committed or the debugger asked for a break; ['Engine::resume']
    /// re-arms the engine.
    Paused,
    /// An ECALL committed. Terminal.
    Stopped,
}

/// Why a run session returned.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StopReason {
    /// Clean program exit.
    Exit,
    /// Debugger trap.
    Break,
    /// The cycle budget ran out.
    Timeout,
}

pub struct Engine {
    mem: Memory,
    regs: RegFile,
    rob: Rob,
    exb: Exb,
    exu: ExuPool,
    cdb: Cdb,
    lsu: Lsu,
    pc: u32,
    cycle: Cycle,
    status: Status,
    cdb_policy: CdbPolicy,
    /// Rotating priority start for the round-robin bus policy.
    rr_start: usize,
}

impl Engine {
    /// Build an engine and load the program image named by the parameters.
    pub fn new(params: &Parameters) -> Result<Self, InitError> {
        let program = Program::load(&params.program)?;
        Self::with_program(params, &program)
    }

    /// Build an engine around an already loaded image. This is the entry
    /// point tests use.
    pub fn with_program(params: &Parameters, program: &Program) -> Result<Self, InitError> {
        params.validate()?;

        let mut mem = Memory::new(params.mem_size);
        program.write_to(&mut mem);

        let mut engine = Self {
            mem,
            regs: RegFile::new(params.reg_size),
            rob: Rob::new(params.rob_size),
            exb: Exb::new(params.exb_size),
            exu: ExuPool::new(params.nb_units),
            cdb: Cdb::new(params.cdb_size),
            lsu: Lsu::new(params.lb_size, params.sb_size),
            pc: 0,
            cycle: 0,
            status: Status::Running,
            cdb_policy: params.cdb_policy,
            rr_start: 0,
        };
        engine.set_pc(program.entry);
        Ok(engine)
    }

    /// Replace the uniform unit pool, e.g. with a dedicated divider setup.
    pub fn set_unit_caps(&mut self, unit_caps: &[u8]) {
        self.exu = ExuPool::with_caps(unit_caps);
    }

    /// One tick. Stages run in reverse pipeline order so every stage sees
    /// the state the previous cycle left behind. A paused engine must be
    /// ['Engine::resume']d before it steps again.
    pub fn step(&mut self, dbg: &mut impl Debugger) {
        if self.status != Status::Running {
            return;
        }
        self.commit(dbg);
        if self.status == Status::Running {
            self.writeback(dbg);
            self.execute();
            self.issue(dbg);
            self.dispatch(dbg);
        }
        self.cycle += 1;
    }

    /// Run for at most `budget` cycles.
    pub fn run(&mut self, budget: u64, dbg: &mut impl Debugger) -> StopReason {
        for _ in 0..budget {
            self.step(dbg);
            if self.status == Status::Running && dbg.should_break() {
                self.status = Status::Paused;
            }
            match self.status {
                Status::Stopped => return StopReason::Exit,
                Status::Paused => return StopReason::Break,
                Status::Running => (),
            }
        }
        StopReason::Timeout
    }

    // Debugger surface.

    pub fn status(&self) -> Status {
        self.status
    }

    /// Re-arm a paused engine.
    pub fn resume(&mut self) {
        if self.status == Status::Paused {
            self.status = Status::Running;
        }
    }

    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc % self.mem.size() as u32;
    }

    pub fn read_reg(&self, reg: Reg) -> i32 {
        self.regs.read_data(reg)
    }

    pub fn write_reg(&mut self, reg: Reg, value: i32) {
        self.regs.write_data(reg, value);
    }

    /// Read memory without side effects.
    pub fn peek_mem(&self, addr: u32, out: &mut [u8]) {
        self.mem.read_bytes(addr, out);
    }

    pub fn poke_mem(&mut self, addr: u32, bytes: &[u8]) {
        self.mem.write_bytes(addr, bytes);
    }

    /// Length in bytes of the encoding at an address, for a frontend
    /// stepping through a listing.
    pub fn ins_len_at(&self, addr: u32) -> u32 {
        Opcode::new(self.mem.load::<u32>(addr)).len()
    }

    // Stages.

    /// Retire the reorder buffer head into the architectural state.
    fn commit(&mut self, dbg: &mut impl Debugger) {
        let Some(commit) = self.rob.commit() else {
            return;
        };
        dbg.commit(self.cycle, commit.tag);

        match commit.kind {
            CommitKind::Reg => {
                self.commit_value(&commit, commit.data);
            }
            CommitKind::Branch { predicted } => {
                // The link flows to the register; the resolved next PC
                // decides whether the predicted path was the fetched one.
                self.commit_value(&commit, predicted as i32);
                let actual = commit.data as u32;
                if actual != predicted {
                    self.recover(actual);
                }
            }
            CommitKind::Store => {
                let (addr, value) = self.lsu.commit_store(commit.tag, &mut self.mem);
                dbg.mem_store(addr, value);
            }
            CommitKind::Sys(SysOp::Ecall) => {
                debug!("ecall committed, stopping");
                self.status = Status::Stopped;
            }
            CommitKind::Sys(SysOp::Ebreak) => {
                debug!("ebreak committed, yielding to the debugger");
                self.status = Status::Paused;
            }
        }
    }

    /// Architectural write plus the commit-time forward, which covers
    /// consumers whose operand tag would otherwise die with the slot.
    fn commit_value(&mut self, commit: &Commit, value: i32) {
        self.regs.commit_data(commit.rd, value, commit.tag);
        self.exb.forward(commit.tag, value);
        self.lsu.forward(commit.tag, value);
    }

    /// Misprediction recovery: everything in flight is younger than the
    /// committing branch and dies with it.
    fn recover(&mut self, target: u32) {
        debug!("misprediction, fetch redirected to {target:08x}");
        self.rob.flush();
        self.exb.flush();
        self.exu.flush();
        self.lsu.flush();
        self.regs.clear_renames();
        self.set_pc(target);
    }

    /// Broadcast finished results and write them into the reorder buffer.
    fn writeback(&mut self, dbg: &mut impl Debugger) {
        self.cdb.begin();

        let units = self.exu.done();
        let loads = self.lsu.done_loads();
        let mut producers: Vec<Producer> = units
            .into_iter()
            .map(Producer::Unit)
            .chain(loads.into_iter().map(Producer::Load))
            .collect();

        if self.cdb_policy == CdbPolicy::RoundRobin && !producers.is_empty() {
            let start = self.rr_start % producers.len();
            producers.rotate_left(start);
            self.rr_start = self.rr_start.wrapping_add(1);
        }

        for producer in producers {
            let (tag, result) = match producer {
                Producer::Unit(index) => self.exu.result(index),
                Producer::Load(index) => self.lsu.load_result(index),
            };
            // Branch slots store the resolved next PC, but what a consumer
            // of the destination register wants is the link.
            let broadcast = match self.rob.kind(tag) {
                CommitKind::Branch { .. } => self.rob.link_value(tag),
                _ => result,
            };
            if !self.cdb.publish(tag, broadcast) {
                // Bus saturated; the producer holds its result and retries.
                break;
            }
            self.rob.write(tag, result);
            match producer {
                Producer::Unit(index) => self.exu.release(index),
                Producer::Load(index) => self.lsu.release_load(index),
            }
            dbg.writeback(self.cycle, tag, broadcast);
        }

        // Stores complete without a bus lane: nothing waits on their tag.
        for tag in self.lsu.take_ready_stores() {
            self.rob.write(tag, 0);
        }

        for lane in self.cdb.lanes() {
            self.exb.forward(lane.qr, lane.result);
            self.lsu.forward(lane.qr, lane.result);
        }
    }

    /// Burn latency cycles and advance the memory pipeline.
    fn execute(&mut self) {
        self.exu.tick();
        self.lsu.execute(&self.mem);
    }

    /// Bind ready µops to free capable units, lowest buffer slot first.
    fn issue(&mut self, dbg: &mut impl Debugger) {
        for index in self.exb.ready() {
            let entry = *self.exb.entry(index);
            let required = match entry.op {
                ExbOp::Alu(op) => alu::required_caps(op),
                ExbOp::Branch { .. } | ExbOp::Jalr => caps::BRU,
            };
            let Some(unit) = self.exu.acquire(required) else {
                // No capable unit free; the entry stays in the buffer.
                continue;
            };

            let (result, latency) = match entry.op {
                ExbOp::Alu(op) => (alu::exec(op, entry.vj, entry.vk), alu::latency(op)),
                ExbOp::Branch { cond, taken, fall } => {
                    let next = if branch_taken(cond, entry.vj, entry.vk) { taken } else { fall };
                    (next as i32, 1)
                }
                ExbOp::Jalr => (entry.vj.wrapping_add(entry.vk) & !1, 1),
            };
            self.exu.dispatch(unit, result, latency, entry.qr);
            self.exb.take(index);
            dbg.issue(self.cycle, entry.qr);
        }
    }

    /// Fetch, decode and allocate. Backpressure anywhere leaves PC and every
    /// buffer untouched; the dispatch retries next tick.
    fn dispatch(&mut self, dbg: &mut impl Debugger) {
        let word = self.mem.load::<u32>(self.pc);
        let Some(uop) = decode::decode(word) else {
            warn!("illegal instruction {word:08x} at {:08x}", self.pc);
            self.set_pc(self.pc.wrapping_add(Opcode::new(word).len()));
            return;
        };
        dbg.fetch(self.cycle, self.pc, Opcode::new(word));

        if self.rob.is_full() {
            return;
        }
        let next_pc = self.pc.wrapping_add(uop.len);

        match uop.kind {
            UopKind::Fence => {
                // Memory is already accessed in program order at commit.
                self.set_pc(next_pc);
            }
            UopKind::Jal => {
                // The target depends on nothing, so the jump resolves here:
                // allocate the link as a finished result and redirect fetch.
                let Some(tag) = self.rob.issue(uop.rd, CommitKind::Reg, next_pc as i32, true)
                else {
                    return;
                };
                self.regs.write_src(uop.rd, tag);
                dbg.dispatch(self.cycle, tag);
                self.set_pc(self.pc.wrapping_add(uop.imm as u32));
            }
            UopKind::Ecall | UopKind::Ebreak => {
                let sys = match uop.kind {
                    UopKind::Ecall => SysOp::Ecall,
                    _ => SysOp::Ebreak,
                };
                let Some(tag) = self.rob.issue(Reg::ZERO, CommitKind::Sys(sys), 0, true) else {
                    return;
                };
                dbg.dispatch(self.cycle, tag);
                self.set_pc(next_pc);
            }
            UopKind::Op | UopKind::OpImm | UopKind::Lui | UopKind::Auipc => {
                if self.exb.is_full() {
                    return;
                }
                let (j, k) = match uop.kind {
                    UopKind::Op => (self.read_operand(uop.rs1), self.read_operand(uop.rs2)),
                    UopKind::OpImm => (self.read_operand(uop.rs1), Operand::value(uop.imm)),
                    UopKind::Lui => (Operand::value(0), Operand::value(uop.imm)),
                    _ => (Operand::value(self.pc as i32), Operand::value(uop.imm)),
                };
                let Some(tag) = self.rob.issue(uop.rd, CommitKind::Reg, 0, false) else {
                    return;
                };
                self.exb.insert(exb_entry(ExbOp::Alu(uop.op10), j, k, tag));
                self.regs.write_src(uop.rd, tag);
                dbg.dispatch(self.cycle, tag);
                self.set_pc(next_pc);
            }
            UopKind::Branch | UopKind::Jalr => {
                if self.exb.is_full() {
                    return;
                }
                let (op, j, k) = if uop.kind == UopKind::Branch {
                    let op = ExbOp::Branch {
                        cond: uop.funct3,
                        taken: self.pc.wrapping_add(uop.imm as u32),
                        fall: next_pc,
                    };
                    (op, self.read_operand(uop.rs1), self.read_operand(uop.rs2))
                } else {
                    (ExbOp::Jalr, self.read_operand(uop.rs1), Operand::value(uop.imm))
                };
                let kind = CommitKind::Branch { predicted: next_pc };
                let Some(tag) = self.rob.issue(uop.rd, kind, 0, false) else {
                    return;
                };
                self.exb.insert(exb_entry(op, j, k, tag));
                self.regs.write_src(uop.rd, tag);
                dbg.dispatch(self.cycle, tag);
                self.set_pc(next_pc);
            }
            UopKind::Load => {
                if self.lsu.loads_full() {
                    return;
                }
                let Some(width) = MemWidth::from_load_funct3(uop.funct3) else {
                    return;
                };
                let base = self.read_operand(uop.rs1);
                let Some(tag) = self.rob.issue(uop.rd, CommitKind::Reg, 0, false) else {
                    return;
                };
                self.lsu.push_load(base, uop.imm, width, tag);
                self.regs.write_src(uop.rd, tag);
                dbg.dispatch(self.cycle, tag);
                self.set_pc(next_pc);
            }
            UopKind::Store => {
                if self.lsu.stores_full() {
                    return;
                }
                let Some(width) = MemWidth::from_store_funct3(uop.funct3) else {
                    return;
                };
                let base = self.read_operand(uop.rs1);
                let data = self.read_operand(uop.rs2);
                let Some(tag) = self.rob.issue(Reg::ZERO, CommitKind::Store, 0, false) else {
                    return;
                };
                self.lsu.push_store(base, data, uop.imm, width, tag);
                dbg.dispatch(self.cycle, tag);
                self.set_pc(next_pc);
            }
        }
    }

    /// Resolve an operand through the rename discipline: a clean register
    /// reads the register file; a dirty one searches this tick's broadcasts,
    /// then the finished-but-uncommitted results, and otherwise waits on the
    /// producing tag.
    fn read_operand(&self, reg: Reg) -> Operand {
        let (src, dirty) = self.regs.read_src(reg);
        if !dirty {
            return Operand::value(self.regs.read_data(reg));
        }
        if let Some(value) = self.cdb.lookup(src) {
            return Operand::value(value);
        }
        if let Some(value) = self.rob.read(src) {
            return Operand::value(value);
        }
        Operand::pending(src)
    }
}

#[derive(Clone, Copy)]
enum Producer {
    Unit(usize),
    Load(usize),
}

fn exb_entry(op: ExbOp, j: Operand, k: Operand, qr: Tag) -> ExbEntry {
    ExbEntry {
        op,
        vj: j.value,
        vk: k.value,
        qj: j.tag,
        qk: k.tag,
        rj: j.ready,
        rk: k.ready,
        qr,
        busy: true,
    }
}

/// Branch conditions by funct3.
fn branch_taken(cond: u8, a: i32, b: i32) -> bool {
    match cond {
        0b000 => a == b,
        0b001 => a != b,
        0b100 => a < b,
        0b101 => a >= b,
        0b110 => (a as u32) < (b as u32),
        0b111 => (a as u32) >= (b as u32),
        _ => false,
    }
}
