// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use itertools::Itertools;
use slog::Drain;
use slog::Level;
use std::path::PathBuf;
use std::time::Duration;
use tabled::settings::Style;
use tabled::Table;
use tabled::Tabled;
use transceiver_eeprom::config::load_profile;
use transceiver_eeprom::sim::SimulatedModule;
use transceiver_eeprom::ConfigBuilder;
use transceiver_eeprom::Device;
use transceiver_eeprom::Endpoint;
use transceiver_eeprom::Profile;
use transceiver_eeprom::Transport;

fn parse_log_level(s: &str) -> Result<Level, String> {
    s.parse().map_err(|_| String::from("invalid log level"))
}

// Accept decimal, or hex with a `0x` prefix.
fn parse_number(s: &str) -> Result<usize, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number \"{s}\": {e}"))
}

fn parse_byte(s: &str) -> Result<u8, String> {
    parse_number(s).and_then(|n| u8::try_from(n).map_err(|_| format!("{s} does not fit in a byte")))
}

/// A built-in module memory map.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProfileKind {
    /// QSFP-style modules (SFF-8436 / SFF-8636).
    Qsfp,
    /// SFP-style modules (SFF-8472).
    Sfp,
}

impl From<ProfileKind> for Profile {
    fn from(kind: ProfileKind) -> Self {
        match kind {
            ProfileKind::Qsfp => Profile::SFF_8436,
            ProfileKind::Sfp => Profile::SFF_8472,
        }
    }
}

/// Read and write the memory of pluggable transceiver modules.
///
/// This tool presents a module's paged memory as one linear address space,
/// taking care of page selection behind the scenes. Offsets and lengths may be
/// given in decimal or as hex with a `0x` prefix.
#[derive(Parser)]
#[command(version, about, long_about)]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,

    /// The i2c-dev bus the module is attached to, such as `/dev/i2c-1`.
    #[arg(short, long, conflicts_with = "simulate", required_unless_present = "simulate")]
    bus: Option<PathBuf>,

    /// Operate on an in-memory module rather than real hardware.
    #[arg(short, long)]
    simulate: bool,

    /// The memory map of the module.
    #[arg(short, long, value_enum, default_value_t = ProfileKind::Qsfp)]
    profile: ProfileKind,

    /// A JSON file describing the memory map, overriding `--profile`.
    #[arg(long)]
    profile_file: Option<PathBuf>,

    /// The time budget for retrying each bus operation, in milliseconds.
    #[arg(
        short,
        long,
        default_value_t = 25,
        value_parser = clap::value_parser!(u64).range(1..=10000)
    )]
    write_timeout: u64,

    /// The log-level.
    #[arg(
        short,
        long,
        default_value_t = Level::Info,
        value_parser = parse_log_level
    )]
    log_level: Level,
}

#[derive(Subcommand)]
enum Cmd {
    /// Read a range of module memory and print it as hex.
    Read {
        #[arg(value_parser = parse_number)]
        offset: usize,
        #[arg(value_parser = parse_number)]
        len: usize,
    },

    /// Write bytes to module memory.
    Write {
        #[arg(value_parser = parse_number)]
        offset: usize,
        #[arg(required = true, value_parser = parse_byte)]
        bytes: Vec<u8>,
    },

    /// Print the physical location of a logical offset.
    Translate {
        #[arg(value_parser = parse_number)]
        offset: usize,
    },

    /// Print the physical operations an access would be split into, without
    /// touching the bus.
    Plan {
        #[arg(value_parser = parse_number)]
        offset: usize,
        #[arg(value_parser = parse_number)]
        len: usize,
    },

    /// Print the memory map in use, as JSON.
    Profile,
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "Logical")]
    logical: String,
    #[tabled(rename = "Len")]
    len: usize,
    #[tabled(rename = "Endpoint")]
    endpoint: Endpoint,
    #[tabled(rename = "Page")]
    page: String,
    #[tabled(rename = "Register")]
    register: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = slog::LevelFilter::new(drain, args.log_level).fuse();
    let log = slog::Logger::root(drain, slog::o!());

    let profile = match &args.profile_file {
        Some(path) => load_profile(path).with_context(|| format!("loading profile {}", path.display()))?,
        None => Profile::from(args.profile),
    };
    let endpoints = Endpoint::defaults_for(&profile);

    let open_device = |endpoints: Vec<Endpoint>| -> anyhow::Result<Device<Box<dyn Transport>>> {
        let transport: Box<dyn Transport> = match &args.bus {
            Some(path) if !args.simulate => open_bus(path)?,
            _ => {
                let mut module = SimulatedModule::new(profile)?;
                module.set_pageable(true);
                Box::new(module)
            }
        };
        let config = ConfigBuilder::new()
            .write_timeout(Duration::from_millis(args.write_timeout))
            .build()?;
        Ok(Device::new(profile, endpoints, transport, config, log.clone())?)
    };

    match args.cmd {
        Cmd::Read { offset, len } => {
            let device = open_device(endpoints)?;
            let result = device.read(offset, len)?;
            if let Some(e) = &result.page_restore {
                slog::warn!(log, "module left on a non-default page"; "reason" => %e);
            }
            print_read_data(offset, result.data());
        }
        Cmd::Write { offset, ref bytes } => {
            let device = open_device(endpoints)?;
            let result = device.write(offset, bytes)?;
            if let Some(e) = &result.page_restore {
                slog::warn!(log, "module left on a non-default page"; "reason" => %e);
            }
            println!("wrote {} of {} bytes", result.count(), bytes.len());
        }
        Cmd::Translate { offset } => {
            let location = profile.translate(offset)?;
            println!("Endpoint Page Register");
            println!(
                "{:<WIDTH$} {:<4} 0x{:02x}",
                endpoints[location.endpoint].to_string(),
                describe_page(location.page),
                location.offset,
            );
        }
        Cmd::Plan { offset, len } => {
            let rows = profile
                .chunks(offset, len)?
                .map(|chunk| PlanRow {
                    logical: format!("0x{:04x}..0x{:04x}", chunk.start, chunk.end()),
                    len: chunk.len,
                    endpoint: endpoints[chunk.location.endpoint],
                    page: describe_page(chunk.location.page),
                    register: format!("0x{:02x}", chunk.location.offset),
                })
                .collect::<Vec<_>>();
            println!("{}", Table::new(rows).with(Style::sharp()));
        }
        Cmd::Profile => println!("{}", serde_json::to_string_pretty(&profile)?),
    }
    Ok(())
}

// Locations that don't depend on the page-select register print as "-".
fn describe_page(page: Option<u8>) -> String {
    page.map(|page| page.to_string())
        .unwrap_or_else(|| String::from("-"))
}

#[cfg(target_os = "linux")]
fn open_bus(path: &std::path::Path) -> anyhow::Result<Box<dyn Transport>> {
    let dev = transceiver_eeprom::i2c::I2cDev::open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    Ok(Box::new(dev))
}

#[cfg(not(target_os = "linux"))]
fn open_bus(_: &std::path::Path) -> anyhow::Result<Box<dyn Transport>> {
    anyhow::bail!("i2c-dev buses are only supported on Linux")
}

// Column width for printing data below.
const WIDTH: usize = 8;

// Bytes per line of a hex dump.
const LINE: usize = 16;

fn print_read_data(offset: usize, data: &[u8]) {
    for (i, line) in data.chunks(LINE).enumerate() {
        let hex_data = line.iter().map(|byte| format!("{byte:02x}")).join(" ");
        println!("0x{:0>WIDTH$x}: {hex_data}", offset + i * LINE);
    }
}
