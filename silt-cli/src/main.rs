use clap::Parser;
use goblin::elf::program_header::PT_LOAD;
use log::info;
use silt_core::bus::Ram;
use silt_core::core::{Config, Core, StepOutcome};
use std::fs::File;
use std::io::Read;

const MEMORY_BASE: u32 = 0x8000_0000;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(long, short, default_value_t = 128)]
    // Guest memory size in MiB
    memory: usize,
    // Elf file to run
    elf: String,
}

fn main() -> std::io::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut buf = Vec::new();

    let mut file = File::open(args.elf)?;
    file.read_to_end(&mut buf)?;

    let elf_header = goblin::elf::Elf::parse(&buf).expect("failed to parse elf file");

    let mut ram = Ram::new(MEMORY_BASE, args.memory << 20).expect("invalid memory size");
    for h in elf_header
        .program_headers
        .iter()
        .filter(|h| h.p_type == PT_LOAD)
    {
        ram.load(h.p_paddr as u32, &buf[h.file_range()]);
    }

    let reset_vector = match elf_header.entry as u32 {
        0 => MEMORY_BASE,
        entry => entry,
    };
    let mut core = Core::new(Config { reset_vector }, ram);

    info!("starting guest at {reset_vector:#010X}");
    loop {
        match core.step() {
            Ok(StepOutcome::Retired { .. }) => {}
            Ok(StepOutcome::Halted { pc, code }) => {
                info!(
                    "guest halted at {pc:#010X} with status {code} after {} cycles",
                    core.csr().mcycle()
                );
                std::process::exit(code as i32);
            }
            Err(error) => {
                eprintln!("fatal: {error}");
                std::process::exit(1);
            }
        }
    }
}
