use super::{build, run_code, run_with, BUDGET};
use crate::alu;
use crate::debug::Debugger;
use crate::engine::{Parameters, Status, StopReason};
use crate::exu::caps;
use crate::program::Program;
use crate::rob::Tag;
use crate::{Cycle, Engine};

use tomasim_asm::{Ins, Reg};

fn x(n: u8) -> Reg {
    Reg(n)
}

#[test]
fn simple_addition() {
    let engine = run_code(&[
        Ins::Addi { rd: x(1), rs1: x(0), imm: 5 },
        Ins::Addi { rd: x(2), rs1: x(0), imm: 7 },
        Ins::Add { rd: x(3), rs1: x(1), rs2: x(2) },
        Ins::Ecall,
    ]);
    assert_eq!(engine.read_reg(x(1)), 5);
    assert_eq!(engine.read_reg(x(2)), 7);
    assert_eq!(engine.read_reg(x(3)), 12);
    assert_eq!(engine.status(), Status::Stopped);
}

#[test]
fn raw_hazard_resolves_through_forwarding() {
    let params = Parameters {
        rob_size: 4,
        exb_size: 2,
        nb_units: 1,
        ..Parameters::default()
    };
    let engine = run_with(&params, &[
        Ins::Addi { rd: x(1), rs1: x(0), imm: 10 },
        Ins::Add { rd: x(2), rs1: x(1), rs2: x(1) },
        Ins::Ecall,
    ]);
    assert_eq!(engine.read_reg(x(2)), 20);
}

#[test]
fn divide_by_zero_yields_minus_one() {
    let engine = run_code(&[
        Ins::Addi { rd: x(1), rs1: x(0), imm: 10 },
        Ins::Addi { rd: x(2), rs1: x(0), imm: 0 },
        Ins::Div { rd: x(3), rs1: x(1), rs2: x(2) },
        Ins::Ecall,
    ]);
    assert_eq!(engine.read_reg(x(3)), -1);
    assert_eq!(engine.status(), Status::Stopped);
}

#[test]
fn compressed_load_immediate() {
    let engine = run_code(&[Ins::CLi { rd: x(5), imm: 8 }, Ins::Ecall]);
    assert_eq!(engine.read_reg(x(5)), 8);
}

#[test]
fn mixed_compressed_and_full_widths() {
    let engine = run_code(&[
        Ins::CLi { rd: x(10), imm: 3 },
        Ins::Addi { rd: x(11), rs1: x(10), imm: 4 },
        Ins::CAdd { rd: x(10), rs2: x(11) },
        Ins::Ecall,
    ]);
    assert_eq!(engine.read_reg(x(10)), 10);
    assert_eq!(engine.read_reg(x(11)), 7);
}

/// Records per-tag pipeline timing through the debugger hooks.
#[derive(Default)]
struct PipelineTrace {
    dispatched: Vec<(Cycle, Tag)>,
    issued: Vec<(Cycle, Tag)>,
}

impl Debugger for PipelineTrace {
    fn dispatch(&mut self, cycle: Cycle, tag: Tag) {
        self.dispatched.push((cycle, tag));
    }

    fn issue(&mut self, cycle: Cycle, tag: Tag) {
        self.issued.push((cycle, tag));
    }
}

impl PipelineTrace {
    fn dispatch_cycle(&self, tag: Tag) -> Cycle {
        self.dispatched.iter().find(|(_, t)| *t == tag).unwrap().0
    }

    fn issue_cycle(&self, tag: Tag) -> Cycle {
        self.issued.iter().find(|(_, t)| *t == tag).unwrap().0
    }
}

#[test]
fn dependent_add_waits_for_the_multiplier() {
    let mut engine = build(&Parameters::default(), &[
        Ins::Addi { rd: x(1), rs1: x(0), imm: 3 },
        Ins::Addi { rd: x(2), rs1: x(0), imm: 5 },
        Ins::Mul { rd: x(3), rs1: x(1), rs2: x(2) },
        Ins::Add { rd: x(4), rs1: x(3), rs2: x(1) },
        Ins::Ecall,
    ]);
    let mut trace = PipelineTrace::default();
    assert_eq!(engine.run(BUDGET, &mut trace), StopReason::Exit);

    assert_eq!(engine.read_reg(x(3)), 15);
    assert_eq!(engine.read_reg(x(4)), 18);

    // The dependent add sat in the execution buffer across the whole
    // multiply latency before it could issue.
    let add = trace.dispatched[3].1;
    assert!(trace.issue_cycle(add) >= trace.dispatch_cycle(add) + alu::MUL_LATENCY as Cycle);

    // The independent adds issued right after dispatch.
    let first = trace.dispatched[0].1;
    assert_eq!(trace.issue_cycle(first), trace.dispatch_cycle(first) + 1);
}

#[test]
fn taken_branch_squashes_the_wrong_path() {
    let engine = run_code(&[
        Ins::Addi { rd: x(1), rs1: x(0), imm: 1 },
        // Skips the poison write below.
        Ins::Beq { rs1: x(1), rs2: x(1), imm: 8 },
        Ins::Addi { rd: x(2), rs1: x(0), imm: 1 },
        Ins::Ecall,
    ]);
    assert_eq!(engine.read_reg(x(2)), 0);
    assert_eq!(engine.status(), Status::Stopped);
}

#[test]
fn untaken_branch_falls_through() {
    let engine = run_code(&[
        Ins::Addi { rd: x(1), rs1: x(0), imm: 1 },
        Ins::Bne { rs1: x(1), rs2: x(1), imm: 8 },
        Ins::Addi { rd: x(2), rs1: x(0), imm: 1 },
        Ins::Ecall,
    ]);
    assert_eq!(engine.read_reg(x(2)), 1);
}

#[test]
fn backward_branch_loop() {
    let engine = run_code(&[
        Ins::Addi { rd: x(1), rs1: x(0), imm: 3 },
        Ins::Addi { rd: x(2), rs1: x(2), imm: 1 },
        Ins::Addi { rd: x(1), rs1: x(1), imm: -1 },
        // Back to the counter increment while x1 is nonzero.
        Ins::Bne { rs1: x(1), rs2: x(0), imm: -8 },
        Ins::Ecall,
    ]);
    assert_eq!(engine.read_reg(x(1)), 0);
    assert_eq!(engine.read_reg(x(2)), 3);
}

#[test]
fn jal_links_and_redirects() {
    let engine = run_code(&[
        Ins::Jal { rd: x(1), imm: 8 },
        Ins::Addi { rd: x(2), rs1: x(0), imm: 1 },
        Ins::Ecall,
    ]);
    assert_eq!(engine.read_reg(x(1)), 4);
    assert_eq!(engine.read_reg(x(2)), 0);
}

#[test]
fn jalr_jumps_through_a_register() {
    let engine = run_code(&[
        Ins::Addi { rd: x(1), rs1: x(0), imm: 16 },
        Ins::Jalr { rd: x(2), rs1: x(1), imm: 0 },
        Ins::Addi { rd: x(3), rs1: x(0), imm: 1 },
        Ins::Addi { rd: x(4), rs1: x(0), imm: 1 },
        Ins::Ecall,
    ]);
    assert_eq!(engine.read_reg(x(2)), 8);
    assert_eq!(engine.read_reg(x(3)), 0);
    assert_eq!(engine.read_reg(x(4)), 0);
}

#[test]
fn writes_to_x0_vanish() {
    let engine = run_code(&[
        Ins::Addi { rd: x(0), rs1: x(0), imm: 5 },
        Ins::Add { rd: x(1), rs1: x(0), rs2: x(0) },
        Ins::Ecall,
    ]);
    assert_eq!(engine.read_reg(x(0)), 0);
    assert_eq!(engine.read_reg(x(1)), 0);
}

#[test]
fn tiny_rob_still_completes() {
    let params = Parameters {
        rob_size: 2,
        exb_size: 1,
        cdb_size: 1,
        nb_units: 1,
        ..Parameters::default()
    };
    let engine = run_with(&params, &[
        Ins::Addi { rd: x(1), rs1: x(0), imm: 1 },
        Ins::Addi { rd: x(2), rs1: x(0), imm: 2 },
        Ins::Addi { rd: x(3), rs1: x(0), imm: 3 },
        Ins::Addi { rd: x(4), rs1: x(0), imm: 4 },
        Ins::Ecall,
    ]);
    for i in 1..=4 {
        assert_eq!(engine.read_reg(x(i)), i as i32);
    }
}

#[test]
fn full_rob_freezes_dispatch() {
    let params = Parameters { rob_size: 2, ..Parameters::default() };
    let mut engine = build(&params, &[
        Ins::Div { rd: x(1), rs1: x(0), rs2: x(0) },
        Ins::Addi { rd: x(2), rs1: x(0), imm: 1 },
        Ins::Addi { rd: x(3), rs1: x(0), imm: 2 },
        Ins::Ecall,
    ]);

    // The divide sits at the head for its whole latency with both slots
    // allocated, so the third instruction cannot dispatch and PC holds.
    for _ in 0..4 {
        engine.step(&mut ());
    }
    assert_eq!(engine.pc(), 8);
    for _ in 0..4 {
        engine.step(&mut ());
    }
    assert_eq!(engine.pc(), 8);

    assert_eq!(engine.run(BUDGET, &mut ()), StopReason::Exit);
    assert_eq!(engine.read_reg(x(1)), -1);
    assert_eq!(engine.read_reg(x(2)), 1);
    assert_eq!(engine.read_reg(x(3)), 2);
}

#[test]
fn dedicated_divider_pool() {
    let mut engine = build(&Parameters::default(), &[
        Ins::Addi { rd: x(1), rs1: x(0), imm: 42 },
        Ins::Addi { rd: x(2), rs1: x(0), imm: 7 },
        Ins::Div { rd: x(3), rs1: x(1), rs2: x(2) },
        Ins::Mul { rd: x(4), rs1: x(2), rs2: x(2) },
        Ins::Ecall,
    ]);
    engine.set_unit_caps(&[caps::ALU | caps::BRU, caps::MUL | caps::DIV]);
    assert_eq!(engine.run(BUDGET, &mut ()), StopReason::Exit);
    assert_eq!(engine.read_reg(x(3)), 6);
    assert_eq!(engine.read_reg(x(4)), 49);
}

#[test]
fn round_robin_bus_policy() {
    let params = Parameters {
        cdb_size: 1,
        cdb_policy: crate::CdbPolicy::RoundRobin,
        ..Parameters::default()
    };
    let engine = run_with(&params, &[
        Ins::Addi { rd: x(1), rs1: x(0), imm: 1 },
        Ins::Addi { rd: x(2), rs1: x(0), imm: 2 },
        Ins::Add { rd: x(3), rs1: x(1), rs2: x(2) },
        Ins::Ecall,
    ]);
    assert_eq!(engine.read_reg(x(3)), 3);
}

#[test]
fn ebreak_pauses_and_resumes() {
    let mut engine = build(&Parameters::default(), &[
        Ins::Addi { rd: x(1), rs1: x(0), imm: 5 },
        Ins::Ebreak,
        Ins::Addi { rd: x(2), rs1: x(0), imm: 7 },
        Ins::Ecall,
    ]);

    assert_eq!(engine.run(BUDGET, &mut ()), StopReason::Break);
    assert_eq!(engine.status(), Status::Paused);
    assert_eq!(engine.read_reg(x(1)), 5);

    engine.resume();
    assert_eq!(engine.run(BUDGET, &mut ()), StopReason::Exit);
    assert_eq!(engine.read_reg(x(2)), 7);
}

#[test]
fn illegal_instructions_are_skipped() {
    let engine = run_code(&[
        Ins::Addi { rd: x(1), rs1: x(0), imm: 1 },
        // An undefined encoding in the middle of the program.
        Ins::Word(0xffff_ffff),
        Ins::Addi { rd: x(2), rs1: x(0), imm: 2 },
        Ins::Ecall,
    ]);
    assert_eq!(engine.read_reg(x(1)), 1);
    assert_eq!(engine.read_reg(x(2)), 2);
}

#[test]
fn pc_wraps_modulo_memory_size() {
    let mut engine = build(&Parameters::default(), &[Ins::Ecall]);
    engine.set_pc(64 * 1024 + 44);
    assert_eq!(engine.pc(), 44);
}

#[test]
fn instruction_length_decode() {
    let engine = build(&Parameters::default(), &[
        Ins::Addi { rd: x(1), rs1: x(0), imm: 1 },
        Ins::CLi { rd: x(5), imm: 1 },
        Ins::Ecall,
    ]);
    assert_eq!(engine.ins_len_at(0), 4);
    assert_eq!(engine.ins_len_at(4), 2);
    assert_eq!(engine.ins_len_at(6), 4);
}

#[test]
fn runs_an_image_loaded_from_hex_text() {
    use std::fmt::Write;

    let words: [u32; 4] = [
        0x0050_0513, // addi a0, zero, 5
        0x0070_0593, // addi a1, zero, 7
        0x00b5_0633, // add a2, a0, a1
        0x0000_0073, // ecall
    ];
    let mut text = String::new();
    for word in words {
        writeln!(text, "{word:08x}").unwrap();
    }

    let program = Program::from_hex(&text).unwrap();
    let mut engine = Engine::with_program(&Parameters::default(), &program).unwrap();
    assert_eq!(engine.run(BUDGET, &mut ()), StopReason::Exit);
    assert_eq!(engine.read_reg(Reg::A2), 12);
}

#[test]
fn rejects_zero_sized_configuration() {
    let params = Parameters { rob_size: 0, ..Parameters::default() };
    let program = Program { entry: 0, segments: Vec::new() };
    assert!(Engine::with_program(&params, &program).is_err());

    let params = Parameters { rob_size: 255, ..Parameters::default() };
    assert!(Engine::with_program(&params, &program).is_err());
}
