//! tcg-fvprobe — locate the SEC entry point of a UEFI PI firmware image.
//!
//! Walks the first firmware volume of the image, prints the TE entry
//! point of the SEC core and optionally places the image into a guest
//! ROM region the way machine construction does.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tcg_firmware::{
    probe, GuestRom, ProbeConfig, ProbeOutcome, RomSink, SkipReason,
    DEFAULT_ROM_NAME, DEFAULT_ROM_SIZE, EFI_INVALID_ENTRY_POINT,
};

/// Sink used when the image is only inspected.
struct Discard;

impl RomSink for Discard {
    fn add_blob(&mut self, _name: &str, _data: &[u8], _addr: u64) {}
}

fn parse_hex(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{s}': {e}"))
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Firmware image (.fd)
    firmware: PathBuf,

    /// Load the image into a guest ROM region
    #[arg(long)]
    load: bool,

    /// Guest ROM region size in bytes
    #[arg(long, default_value_t = DEFAULT_ROM_SIZE)]
    rom_size: usize,

    /// Guest address to load the image at
    #[arg(long, value_parser = parse_hex, default_value = "0")]
    load_addr: u64,

    /// ROM blob name
    #[arg(long, default_value = DEFAULT_ROM_NAME)]
    rom_name: String,

    /// Print the decoded volume and TE headers
    #[arg(long)]
    dump: bool,
}

fn print_outcome(outcome: &ProbeOutcome, dump: bool) {
    match outcome {
        ProbeOutcome::Skipped(SkipReason::BadSignature { found }) => {
            println!("skipped: not a firmware volume (signature {found:#x})");
        }
        ProbeOutcome::Skipped(SkipReason::ResetVectorInUse) => {
            println!("skipped: volume provides its own reset vector");
        }
        ProbeOutcome::Loaded {
            volume,
            file_size,
            sec,
        } => {
            if dump {
                println!("volume length      {:#x}", volume.volume_len);
                println!("volume header len  {:#x}", volume.header_len);
                println!("volume attributes  {:#010x}", volume.attributes);
                println!("file size          {file_size:#x}");
                println!("SEC file offset    {:#x}", sec.file_offset);
                println!("TE section offset  {:#x}", sec.section_offset);
                println!("{}", sec.te);
            }
            println!("entry point: {:#010x}", sec.entry_point());
        }
    }
}

fn run(args: &Args) -> Result<ProbeOutcome, String> {
    let config = ProbeConfig::default()
        .with_rom_name(args.rom_name.as_str())
        .with_load_addr(args.load_addr);

    if !args.load {
        return probe(&args.firmware, &config, &mut Discard)
            .map_err(|e| e.to_string());
    }

    let mut rom = GuestRom::new(args.rom_size)
        .map_err(|e| format!("failed to map guest ROM: {e}"))?;
    let outcome = probe(&args.firmware, &config, &mut rom);
    for blob in rom.blobs() {
        println!(
            "rom '{}': {:#x} bytes at {:#x}",
            blob.name, blob.len, blob.addr
        );
    }
    outcome.map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    env_logger::init_from_env(
        env_logger::Env::default().default_filter_or("info"),
    );
    let args = Args::parse();

    match run(&args) {
        Ok(outcome) => {
            print_outcome(&outcome, args.dump);
            match outcome {
                ProbeOutcome::Loaded { .. } => ExitCode::SUCCESS,
                ProbeOutcome::Skipped(_) => ExitCode::from(2),
            }
        }
        Err(e) => {
            log::error!("{e}");
            println!("entry point: {EFI_INVALID_ENTRY_POINT:#010x}");
            ExitCode::FAILURE
        }
    }
}
