use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use mcs51::sfr::{PSW_AC, PSW_C, PSW_OV, PSW_P};
use mcs51::{CodeMemory, Cpu, Exception, ExternalRam, Hooks, load_hex};

use clap::Parser;

#[derive(Parser)]
struct Args {
    /// Intel-HEX image to load
    #[arg(value_name = "HEX_FILE")]
    hex_file: PathBuf,

    /// Maximum number of instructions to execute
    #[arg(short, long, default_value = "1000")]
    max_instructions: u64,

    /// External RAM size in bytes (power of two; 0 for none)
    #[arg(short, long, default_value = "0")]
    xdata: usize,

    /// Fit the upper 128 bytes of internal RAM
    #[arg(short, long)]
    upper_ram: bool,

    /// Enable trace output
    #[arg(short, long)]
    trace: bool,
}

/// Prints every diagnostic the core raises and keeps running.
struct Console {
    raised: u64,
}

impl Hooks for Console {
    fn exception(&mut self, cpu: &Cpu, cause: Exception) {
        self.raised += 1;
        println!("EXCEPTION at 0x{:04X}: {}", cpu.pc, cause);
    }
}

fn dump_registers(cpu: &Cpu) {
    println!(
        "  A={:02X?}  B={:02X?}  DPTR={:04X?}  SP={:02X?}  C={} OV={} AC={} P={}",
        cpu.a(),
        cpu.b(),
        cpu.dptr(),
        cpu.sp(),
        cpu.psw(PSW_C) as u8,
        cpu.psw(PSW_OV) as u8,
        cpu.psw(PSW_AC) as u8,
        cpu.psw(PSW_P) as u8
    );
    print!("  ");
    for i in 0..8 {
        print!("R{}={:02X?} ", i, cpu.r(i));
    }
    println!();
}

pub fn main() -> ExitCode {
    let args = Args::parse();

    let text = match fs::read_to_string(&args.hex_file) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("error: cannot read {}: {}", args.hex_file.display(), err);
            return ExitCode::FAILURE;
        }
    };

    let mut code = match CodeMemory::with_size(0x10000) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {}", err);
            return ExitCode::FAILURE;
        }
    };
    match load_hex(&mut code, &text) {
        Ok(bytes) => println!("loaded {} bytes from {}", bytes, args.hex_file.display()),
        Err(err) => {
            eprintln!("error: {}: {}", args.hex_file.display(), err);
            return ExitCode::FAILURE;
        }
    }

    let xdata = match ExternalRam::with_size(args.xdata) {
        Ok(xdata) => xdata,
        Err(err) => {
            eprintln!("error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let mut cpu = Cpu::new(code).with_xdata(xdata);
    if args.upper_ram {
        cpu = cpu.with_upper_ram();
    }
    cpu.reset(true);

    let mut console = Console { raised: 0 };
    let mut instruction_count = 0;
    let mut cycle_count: u64 = 0;
    while instruction_count < args.max_instructions {
        if args.trace {
            let (len, mnemonic) = cpu.decode(cpu.pc);
            let bytes: Vec<String> = (0..len)
                .map(|i| format!("{:02X}", cpu.read_code(cpu.pc.wrapping_add(i as u16))))
                .collect();
            println!("{pc:04X}: {:10} {mnemonic}", bytes.join(" "), pc = cpu.pc);
            dump_registers(&cpu);
        }
        cycle_count += cpu.do_op(&mut console) as u64;
        instruction_count += 1;
    }

    println!(
        "CPU stopped at 0x{:04X} after {} instructions, {} machine cycles, {} diagnostics",
        cpu.pc, instruction_count, cycle_count, console.raised
    );
    dump_registers(&cpu);
    ExitCode::SUCCESS
}
