#[macro_use]
extern crate log;

mod config;

use config::Config;

use tomasim_asm::REGISTER_NAMES;
use tomasim_core::{Engine, Parameters, Reg, StopReason};

use log::LevelFilter;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

/// Cycles per run slice, between which the frontend gets control back.
const RUN_SLICE: u64 = 1 << 20;

fn main() -> ExitCode {
    env_logger::Builder::new()
        .format(|f, record| {
            writeln!(f, "{}: {}", record.level(), record.args())
        })
        .filter(None, LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = match Args::parse() {
        Ok(args) => args,
        Err(usage) => {
            error!("{usage}");
            return exit_code(-1);
        }
    };

    let mut params = Parameters::default();
    if let Some(path) = &args.config {
        match Config::load(path) {
            Ok(config) => config.apply(&mut params),
            Err(err) => {
                error!("{err}");
                return exit_code(-2);
            }
        }
    }
    params.program = args.program;

    let mut engine = match Engine::new(&params) {
        Ok(engine) => engine,
        Err(err) => {
            error!("{err}");
            return exit_code(-3);
        }
    };

    loop {
        match engine.run(RUN_SLICE, &mut ()) {
            StopReason::Exit => {
                info!("clean stop after {} cycles", engine.cycle());
                break;
            }
            StopReason::Break => {
                // No interactive debugger attached: show the state the
                // breakpoint wanted seen, then continue.
                dump_registers(&engine);
                engine.resume();
            }
            StopReason::Timeout => (),
        }
    }

    ExitCode::SUCCESS
}

struct Args {
    config: Option<PathBuf>,
    program: PathBuf,
}

impl Args {
    fn parse() -> Result<Self, String> {
        let mut args = std::env::args_os().skip(1);
        let mut config = None;
        let mut program = None;

        while let Some(arg) = args.next() {
            match arg.to_str() {
                Some("--config") => {
                    let path = args
                        .next()
                        .ok_or("--config expects a file path")?;
                    config = Some(PathBuf::from(path));
                }
                Some("--help" | "-h") => {
                    return Err("usage: tomasim [--config FILE] PROGRAM".into());
                }
                _ if program.is_none() => program = Some(PathBuf::from(arg)),
                _ => return Err("usage: tomasim [--config FILE] PROGRAM".into()),
            }
        }

        let program = program.ok_or("usage: tomasim [--config FILE] PROGRAM")?;
        Ok(Self { config, program })
    }
}

fn dump_registers(engine: &Engine) {
    info!("break at pc {:08x}", engine.pc());
    for (i, name) in REGISTER_NAMES.iter().enumerate() {
        let val = engine.read_reg(Reg(i as u8));
        info!("{name:>4} = {:08x} ({val})", val as u32);
    }
}

fn exit_code(code: i32) -> ExitCode {
    // ['ExitCode'] only carries a u8; negative init errors show up as their
    // two's complement, matching what a shell sees of a negative exit.
    ExitCode::from(code as u8)
}
