// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use tracing::{error, info};

use regbank_core::{Device, FieldInfo, MemoryTransaction, TransactionStatus};

const EXIT_OK: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_ACCESS_FAILED: u8 = 3;

fn parse_u64_addr(s: &str) -> Result<u64, String> {
    let trimmed = s.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex offset '{}': {}", s, e))
    } else {
        u64::from_str(trimmed).map_err(|e| format!("Invalid offset '{}': {}", s, e))
    }
}

/// Write payload in buffer order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Payload(Vec<u8>);

/// Parses a payload given as hex digits in buffer order, e.g. `0x01ff` or `01 ff`.
fn parse_hex_bytes(s: &str) -> Result<Payload, String> {
    let digits: String = s
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return Err(format!(
            "Invalid payload '{}': expected an even, non-zero number of hex digits",
            s
        ));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|e| format!("Invalid payload '{}': {}", s, e))
        })
        .collect::<Result<Vec<u8>, String>>()
        .map(Payload)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Register bank inspector", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List banks, registers and fields of a device descriptor.
    Inspect(InspectArgs),

    /// Issue a single transaction against one bank.
    Access(AccessArgs),

    /// Print or write the JSON checkpoint of a device.
    Snapshot(SnapshotArgs),
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Path to the device descriptor (YAML)
    device: PathBuf,

    /// Print the layout as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct AccessArgs {
    /// Path to the device descriptor (YAML)
    device: PathBuf,

    /// Bank to access
    #[arg(short, long)]
    bank: String,

    /// Bank-relative offset (decimal or 0x-prefixed hex)
    #[arg(short, long, value_parser = parse_u64_addr)]
    offset: u64,

    /// Access size in bytes. Defaults to the payload length for writes.
    #[arg(short, long)]
    size: Option<usize>,

    /// Write these bytes (hex, buffer order) instead of reading
    #[arg(short, long, value_parser = parse_hex_bytes)]
    write: Option<Payload>,

    /// Side-effect-free access
    #[arg(long)]
    inquiry: bool,
}

#[derive(Parser, Debug)]
struct SnapshotArgs {
    /// Path to the device descriptor (YAML)
    device: PathBuf,

    /// Write the snapshot to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct RegisterReport {
    name: String,
    offset: u64,
    size: u8,
    value: u64,
    description: String,
    fields: Vec<FieldInfo>,
}

#[derive(Serialize)]
struct BankReport {
    name: String,
    byte_order: regbank_core::ByteOrder,
    miss_pattern: Option<u8>,
    registers: Vec<RegisterReport>,
}

#[derive(Serialize)]
struct AccessReport {
    bank: String,
    offset: u64,
    size: usize,
    write: bool,
    inquiry: bool,
    completed: bool,
    data: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine readable
    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Inspect(args) => run_inspect(args),
        Commands::Access(args) => run_access(args),
        Commands::Snapshot(args) => run_snapshot(args),
    }
}

fn load_device(path: &Path) -> Result<Device, ExitCode> {
    info!("Loading device descriptor: {:?}", path);
    Device::from_file(path).map_err(|e| {
        error!("{:#}", e);
        ExitCode::from(EXIT_CONFIG_ERROR)
    })
}

fn bank_reports(device: &Device) -> Vec<BankReport> {
    device
        .banks()
        .iter()
        .map(|bank| BankReport {
            name: bank.name().to_string(),
            byte_order: bank.byte_order(),
            miss_pattern: bank.miss_pattern(),
            registers: bank
                .mapped_registers()
                .values()
                .map(|reg| RegisterReport {
                    name: reg.local_name().to_string(),
                    offset: reg.offset(),
                    size: reg.size(),
                    value: reg.get(bank.memory()),
                    description: reg.description().to_string(),
                    fields: reg.fields_info(),
                })
                .collect(),
        })
        .collect()
}

fn run_inspect(args: InspectArgs) -> ExitCode {
    let device = match load_device(&args.device) {
        Ok(device) => device,
        Err(code) => return code,
    };
    let reports = bank_reports(&device);

    if args.json {
        match serde_json::to_string_pretty(&reports) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize layout: {}", e);
                return ExitCode::from(EXIT_CONFIG_ERROR);
            }
        }
        return ExitCode::from(EXIT_OK);
    }

    println!("device {}", device.name());
    for bank in &reports {
        let miss = bank
            .miss_pattern
            .map(|p| format!(", miss pattern {:#04x}", p))
            .unwrap_or_default();
        println!("  bank {} ({:?} endian{})", bank.name, bank.byte_order, miss);
        for reg in &bank.registers {
            println!(
                "    {:#06x} {:<16} {} bytes = {:#x}",
                reg.offset, reg.name, reg.size, reg.value
            );
            for field in &reg.fields {
                println!(
                    "           .{:<15} bits [{}, {})",
                    field.name,
                    field.offset,
                    field.offset as u32 + field.width
                );
            }
        }
    }
    ExitCode::from(EXIT_OK)
}

fn run_access(args: AccessArgs) -> ExitCode {
    let mut device = match load_device(&args.device) {
        Ok(device) => device,
        Err(code) => return code,
    };
    if device.bank(&args.bank).is_none() {
        error!("Device {} has no bank named {}", device.name(), args.bank);
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }

    let mut txn = match (&args.write, args.size) {
        (Some(Payload(payload)), Some(size)) if size != payload.len() => {
            error!(
                "Payload has {} bytes but --size is {}",
                payload.len(),
                size
            );
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
        (Some(Payload(payload)), _) => MemoryTransaction::write(args.offset, payload.clone()),
        (None, Some(size)) => MemoryTransaction::read(args.offset, size),
        (None, None) => {
            error!("A read needs --size");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    if args.inquiry {
        txn = txn.inquiry();
    }
    txn = txn.with_initiator("regbank-cli");

    let status = device.transaction_access(&args.bank, &mut txn);
    let report = AccessReport {
        bank: args.bank,
        offset: txn.offset,
        size: txn.data.len(),
        write: txn.write,
        inquiry: txn.inquiry,
        completed: status == TransactionStatus::Completed,
        data: to_hex(&txn.data),
    };
    match serde_json::to_string(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Failed to serialize access report: {}", e),
    }

    if report.completed {
        ExitCode::from(EXIT_OK)
    } else {
        ExitCode::from(EXIT_ACCESS_FAILED)
    }
}

fn run_snapshot(args: SnapshotArgs) -> ExitCode {
    let device = match load_device(&args.device) {
        Ok(device) => device,
        Err(code) => return code,
    };
    let snapshot = device.snapshot();

    match &args.output {
        Some(path) => match std::fs::File::create(path) {
            Ok(f) => {
                if let Err(e) = serde_json::to_writer_pretty(f, &snapshot) {
                    error!("Failed to write snapshot {:?}: {}", path, e);
                    return ExitCode::from(EXIT_CONFIG_ERROR);
                }
                info!("Snapshot written to {:?}", path);
            }
            Err(e) => {
                error!("Failed to create snapshot {:?}: {}", path, e);
                return ExitCode::from(EXIT_CONFIG_ERROR);
            }
        },
        None => match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize snapshot: {}", e);
                return ExitCode::from(EXIT_CONFIG_ERROR);
            }
        },
    }
    ExitCode::from(EXIT_OK)
}
