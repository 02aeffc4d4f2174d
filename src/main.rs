//! mr32-emu: an MRISC32 CPU simulator

use anyhow::{bail, Result};
use mr32_emu::config::{parse_u64, Config};
use mr32_emu::cpu::Cpu;
use mr32_emu::loader;
use mr32_emu::mmio;
use mr32_emu::perf::PerfSymbols;
use mr32_emu::ram::Ram;
use std::env;
use std::path::PathBuf;

fn print_help(prg_name: &str) {
    println!("mr32-emu - An MRISC32 CPU simulator");
    println!();
    println!("Usage: {} [options] program [arguments]", prg_name);
    println!();
    println!("The program can either be an ELF32 executable file or a raw binary file (e.g.");
    println!("produced by objcopy -O binary).");
    println!();
    println!("Options:");
    println!("  -h, --help                 Display this information.");
    println!("  -v, --verbose              Print stats.");
    println!("  -t FILE, --trace FILE      Enable debug trace.");
    println!("  -R N, --ram-size N         Set the RAM size (in bytes).");
    println!("  -A ADDR, --addr ADDR       Set the program (ROM) start address.");
    println!("  -c CYCLES, --cycles CYCLES Maximum number of CPU cycles to simulate.");
    println!("  -P FILE, --perf-syms FILE  Do perf counting using symbols in FILE.");
    println!();
    println!("Additional arguments are passed to the simulated program.");
}

struct Options {
    config: Config,
    bin_addr: u32,
    max_cycles: i64,
    perf_syms_file: Option<PathBuf>,
    /// Index of the program file in the argument list; the program plus
    /// everything after it is forwarded to the guest.
    program_idx: usize,
}

fn parse_options(args: &[String]) -> Result<Options> {
    let mut opts = Options {
        config: Config::load(),
        bin_addr: 0x0000_0200,
        max_cycles: -1,
        perf_syms_file: None,
        program_idx: 0,
    };

    let mut k = 1;
    while k < args.len() {
        let arg = args[k].as_str();
        if !arg.starts_with('-') {
            opts.program_idx = k;
            return Ok(opts);
        }

        let value = |k: &mut usize| -> Result<String> {
            *k += 1;
            match args.get(*k) {
                Some(v) => Ok(v.clone()),
                None => bail!("Missing option for {}", arg),
            }
        };

        match arg {
            "-h" | "--help" | "-?" => {
                print_help(&args[0]);
                std::process::exit(0);
            }
            "-v" | "--verbose" => opts.config.verbose = true,
            "-t" | "--trace" => opts.config.trace_file = Some(PathBuf::from(value(&mut k)?)),
            "-R" | "--ram-size" => {
                let v = value(&mut k)?;
                opts.config.ram_size = match parse_u64(&v) {
                    Some(n) => n,
                    None => bail!("Bad RAM size: {}", v),
                };
            }
            "-A" | "--addr" => {
                let v = value(&mut k)?;
                opts.bin_addr = match parse_u64(&v) {
                    Some(n) => n as u32,
                    None => bail!("Bad address: {}", v),
                };
            }
            "-c" | "--cycles" => {
                let v = value(&mut k)?;
                opts.max_cycles = match parse_u64(&v) {
                    Some(n) => n as i64,
                    None => bail!("Bad cycle count: {}", v),
                };
            }
            "-P" | "--perf-syms" => {
                opts.perf_syms_file = Some(PathBuf::from(value(&mut k)?));
                opts.config.verbose = true;
            }
            _ => bail!("Unknown option: {}", arg),
        }
        k += 1;
    }
    bail!("No program file specified.");
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let opts = match parse_options(&args) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help(&args[0]);
            std::process::exit(1);
        }
    };
    let program = PathBuf::from(&args[opts.program_idx]);

    // Initialize the RAM and everything the guest expects to find in it.
    let mut ram = Ram::new(opts.config.ram_size);
    loader::write_sim_args(&mut ram, &args[opts.program_idx..])?;
    mmio::seed(&mut ram);
    let start_addr = loader::load_executable(&program, &mut ram, opts.bin_addr)?;

    let mut perf = PerfSymbols::new();
    if let Some(path) = &opts.perf_syms_file {
        perf.load(path)?;
    }

    let exit_code;
    {
        let mut cpu = Cpu::new(&mut ram, &mut perf, &opts.config)?;
        if opts.config.verbose {
            println!("--------------------------------------------------------------");
        }
        exit_code = cpu.run(start_addr, opts.max_cycles)?;
        if opts.config.verbose {
            cpu.dump_stats();
        }
    }
    if perf.has_symbols() {
        perf.print();
    }

    std::process::exit(exit_code as i32);
}
