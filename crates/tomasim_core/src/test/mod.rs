mod engine;

use crate::engine::{Engine, Parameters, StopReason};
use crate::program::{Program, Segment};

use tomasim_asm::{assemble, Ins};

/// Plenty for every test program; a run that needs more is wedged.
const BUDGET: u64 = 10_000;

pub fn build(params: &Parameters, program: &[Ins]) -> Engine {
    let image = Program {
        entry: 0,
        segments: vec![Segment {
            addr: 0,
            data: assemble(program).expect("bad test program"),
            zero_pad: 0,
        }],
    };
    Engine::with_program(params, &image).expect("engine setup failed")
}

/// Assemble, run to the exit request and hand back the stopped engine.
pub fn run_code(program: &[Ins]) -> Engine {
    run_with(&Parameters::default(), program)
}

pub fn run_with(params: &Parameters, program: &[Ins]) -> Engine {
    let mut engine = build(params, program);
    let reason = engine.run(BUDGET, &mut ());
    assert_eq!(reason, StopReason::Exit, "program did not reach its ecall");
    engine
}
