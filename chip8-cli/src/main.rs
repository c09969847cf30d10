//! Entrypoint for CLI
mod clock;
mod config;
mod error;

use std::{env, fs, process, time::Instant};

use chip8::{constants::*, dispatch, prelude::*, Instr, IMPL_VERSION};
use log::{error, info};

use self::{clock::Clock, clock::Hz, config::CliConf, error::AppError};

static USAGE: &str = r#"
usage: chip8 CMD FILE [OPTIONS]

commands:
    run     Run the target ROM file without a window
    dump    Print the instructions of the target ROM file

options (run):
    --config FILE   YAML configuration file
    --cycles N      Stop after N cycles, 0 runs until the program faults
    --hz N          Cycles per second, 0 runs unthrottled
    --seed N        Seed for the random number generator
    --key K         Hold down key K (hex digit) for the whole run

examples:
    chip8 run maze.rom --cycles 2000 --hz 0
    chip8 run pong.rom --config pong.yaml --key 1
    chip8 dump maze.rom
"#;

fn run_bytecode(opts: RunOpts) -> Result<(), AppError> {
    let mut conf = match opts.config.as_deref() {
        Some(filepath) => CliConf::from_file(filepath)?,
        None => CliConf::default(),
    };
    opts.apply(&mut conf);

    let bytecode = fs::read(&opts.filepath).map_err(Chip8Error::from)?;

    let mut vm = Chip8Vm::new(conf.vm.clone());
    vm.load_bytecode(bytecode.as_slice())?;
    for key in conf.keys.iter() {
        vm.set_key(*key, true);
    }

    info!("running {} at {}Hz", opts.filepath, conf.clock_frequency.0);
    if !conf.keys.is_empty() {
        info!("{}", vm.dump_keys()?);
    }

    let mut clock = Clock::new(conf.clock_frequency);
    let mut cycle_count = 0;
    let start = Instant::now();
    let result = loop {
        if conf.cycles.map_or(false, |limit| cycle_count >= limit) {
            break Ok(());
        }
        clock.wait();
        match vm.cycle() {
            Ok(_) => cycle_count += 1,
            Err(err) => break Err(err),
        }
    };
    let elapsed = start.elapsed();

    println!("{}", vm.dump_display()?);
    println!(
        "cycles: {cycle_count}, unknown opcodes: {}, time taken: {}ms",
        vm.unknown_opcodes(),
        elapsed.as_nanos() as f64 / 1_000_000.0
    );

    result?;

    Ok(())
}

fn run_dump(filepath: &str) -> Result<(), AppError> {
    let bytecode = fs::read(filepath).map_err(Chip8Error::from)?;
    dump_bytecode(&bytecode);
    Ok(())
}

fn dump_bytecode(bytecode: &[u8]) {
    for (i, chunk) in bytecode.chunks(2).enumerate() {
        let offset = MEM_START + i * 2;
        match chunk {
            [a, b] => {
                let instr = Instr::from_bytes([*a, *b]);
                let mnemonic = dispatch::decode(instr).mnemonic();
                println!("0x{offset:04X} {instr} {mnemonic}");
            }
            // Trailing odd byte
            [a] => println!("0x{offset:04X} {a:02X}"),
            _ => unreachable!("chunks are one or two bytes"),
        }
    }
}

fn main() {
    if let Err(err) = simple_logger::SimpleLogger::new().env().init() {
        eprintln!("failed to install logger: {err}");
    }

    let result = match parse_args(env::args().skip(1)) {
        Some(Cmd::Run(opts)) => run_bytecode(opts),
        Some(Cmd::Dump { filepath }) => run_dump(&filepath),
        None => {
            print_usage();
            // FreeBSD EX_USAGE (64)
            process::exit(64)
        }
    };

    if let Err(err) = result {
        error!("{err}");
        process::exit(1)
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Option<Cmd> {
    match args.next()?.as_str() {
        "run" => Some(Cmd::Run(RunOpts::parse(args)?)),
        "dump" => Some(Cmd::Dump {
            filepath: args.next()?,
        }),
        _ => None,
    }
}

fn print_usage() {
    println!("Chip8 v{IMPL_VERSION}");
    println!("{USAGE}");
}

#[derive(Debug, PartialEq)]
enum Cmd {
    /// Run file
    Run(RunOpts),
    /// Print instructions
    Dump { filepath: String },
}

/// Command-line options of the `run` command.
///
/// Flags take precedence over the configuration file.
#[derive(Debug, Default, PartialEq)]
struct RunOpts {
    filepath: String,
    config: Option<String>,
    cycles: Option<usize>,
    hz: Option<u64>,
    seed: Option<u64>,
    keys: Vec<KeyCode>,
}

impl RunOpts {
    fn parse(mut args: impl Iterator<Item = String>) -> Option<Self> {
        let mut opts = RunOpts {
            filepath: args.next()?,
            ..Default::default()
        };

        while let Some(flag) = args.next() {
            let value = args.next()?;
            match flag.as_str() {
                "--config" => opts.config = Some(value),
                "--cycles" => opts.cycles = Some(value.parse().ok()?),
                "--hz" => opts.hz = Some(value.parse().ok()?),
                "--seed" => opts.seed = Some(value.parse().ok()?),
                "--key" => {
                    let key_id = u8::from_str_radix(&value, 16).ok()?;
                    opts.keys.push(KeyCode::try_from(key_id).ok()?);
                }
                _ => return None,
            }
        }

        Some(opts)
    }

    fn apply(&self, conf: &mut CliConf) {
        if let Some(cycles) = self.cycles {
            conf.cycles = if cycles == 0 { None } else { Some(cycles) };
        }
        if let Some(hz) = self.hz {
            conf.clock_frequency = Hz(hz);
        }
        if let Some(seed) = self.seed {
            conf.vm.seed = Some(seed);
        }
        conf.keys.extend(self.keys.iter().copied());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn args(line: &str) -> impl Iterator<Item = String> + '_ {
        line.split_whitespace().map(String::from)
    }

    #[test]
    fn test_parse_run() {
        let cmd = parse_args(args("run maze.rom --cycles 20 --hz 0 --seed 9 --key a --key 1"));
        let expected = RunOpts {
            filepath: "maze.rom".to_string(),
            cycles: Some(20),
            hz: Some(0),
            seed: Some(9),
            keys: vec![KeyCode::KeyA, KeyCode::Key1],
            ..Default::default()
        };
        assert_eq!(cmd, Some(Cmd::Run(expected)));
    }

    #[test]
    fn test_parse_dump() {
        assert_eq!(
            parse_args(args("dump maze.rom")),
            Some(Cmd::Dump {
                filepath: "maze.rom".to_string()
            })
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(parse_args(args("")), None);
        assert_eq!(parse_args(args("dis maze.rom")), None);
        assert_eq!(parse_args(args("run")), None);
        assert_eq!(parse_args(args("run maze.rom --cycles")), None);
        assert_eq!(parse_args(args("run maze.rom --cycles many")), None);
        assert_eq!(parse_args(args("run maze.rom --key 10")), None);
        assert_eq!(parse_args(args("run maze.rom --verbose 1")), None);
    }

    #[test]
    fn test_flags_override_config() {
        let mut conf = CliConf::from_yaml("cycles: 50\nkeys: [2]\nseed: 1\n").unwrap();
        let opts = RunOpts::parse(args("maze.rom --cycles 0 --hz 60 --seed 3 --key f")).unwrap();
        opts.apply(&mut conf);

        assert_eq!(conf.cycles, None);
        assert_eq!(conf.clock_frequency, Hz(60));
        assert_eq!(conf.vm.seed, Some(3));
        assert_eq!(conf.keys, vec![KeyCode::Key2, KeyCode::KeyF]);
    }

    #[test]
    fn test_missing_rom_is_program_load_error() {
        let err = run_dump("does/not/exist.rom").unwrap_err();
        assert!(matches!(
            err.kind,
            error::ErrorKind::Chip8(Chip8Error::ProgramLoad(_))
        ));
    }
}
