// This file is part of fpga-fabric, an application to locate, benchmark and drive FPGA fabric memory exposed through UIO.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// fpga-fabric is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// fpga-fabric is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

mod menu;

use clap::{Args, Parser, Subcommand};
use fpga_fabric::bench::AccessPattern;
use fpga_fabric::config::FabricConfig;
use fpga_fabric::session::{Command, FabricSession};
use fpga_fabric::uio::DeviceLocator;
use log::debug;
use std::num::NonZeroU32;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fabric")]
#[command(bin_name = "fabric")]
#[command(about = "Benchmark and drive FPGA fabric memory exposed through UIO")]
struct Cli {
    #[arg(
        long = "config",
        global = true,
        help = r#"TOML file applied over /etc/fpga-fabric/config.toml and
/usr/lib/fpga-fabric/config.toml. Unlike those, failing to read it is an error.
        "#
    )]
    config: Option<PathBuf>,
    #[arg(
        long = "device-id",
        global = true,
        help = "uio device name to look up, overriding uio.device_id"
    )]
    device_id: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List uio slots with their names and region sizes
    List,
    /// Timed write/read of the whole region
    Bench {
        /// Visit words with this stride instead of linearly
        #[arg(long)]
        stride: Option<usize>,
    },
    /// Write the word index into every word of the region
    Fill,
    /// Run the start/done handshake and read the result words
    Handshake(HandshakeArgs),
    /// Interactive numbered menu
    Menu,
}

#[derive(Args, Debug)]
struct HandshakeArgs {
    /// Poll cycles before giving up, at least 1
    #[arg(
        long,
        conflicts_with = "unbounded",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    max_attempts: Option<u32>,
    /// Poll until done or error
    #[arg(long)]
    unbounded: bool,
    /// Do not pulse the reset line first
    #[arg(long)]
    no_reset: bool,
    /// Do not watch the error line
    #[arg(long)]
    no_error: bool,
    /// Words read from the start of the region afterwards
    #[arg(long)]
    result_words: Option<usize>,
    /// Benchmark the region once the handshake completes
    #[arg(long)]
    bench: bool,
}

impl HandshakeArgs {
    fn apply(&self, config: &mut FabricConfig) {
        let handshake = &mut config.handshake;
        if let Some(n) = self.max_attempts.and_then(NonZeroU32::new) {
            handshake.max_attempts = Some(n);
        }
        if self.unbounded {
            handshake.max_attempts = None;
        }
        if self.no_reset {
            handshake.reset_line = None;
        }
        if self.no_error {
            handshake.error_line = None;
        }
        if let Some(n) = self.result_words {
            handshake.result_words = n;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    debug!("parsed cli command with {cli:?}");

    let mut config = FabricConfig::load(cli.config.as_deref())?;
    if let Some(id) = cli.device_id {
        config.uio.device_id = id;
    }

    let command = match cli.command {
        Commands::List => {
            let slots = DeviceLocator::new(&config.uio).list();
            println!("| slot | name | size |");
            for slot in slots {
                let size = slot
                    .region_size_bytes
                    .map_or_else(|| "unknown".to_string(), |s| format!("0x{s:x}"));
                println!("| uio{} | {} | {size} |", slot.index, slot.name);
            }
            return Ok(());
        }
        Commands::Menu => {
            let session = FabricSession::open(config)?;
            return menu::run(&session, std::io::stdin().lock(), std::io::stdout()).await;
        }
        Commands::Bench { stride } => Command::Benchmark(match stride {
            Some(n) => AccessPattern::Strided(n),
            None => AccessPattern::Linear,
        }),
        Commands::Fill => Command::Fill,
        Commands::Handshake(args) => {
            args.apply(&mut config);
            if args.bench {
                Command::HandshakeThenBenchmark(AccessPattern::Linear)
            } else {
                Command::Handshake
            }
        }
    };

    let session = FabricSession::open(config)?;
    let report = session.execute(command).await?;
    menu::write_report(&mut std::io::stdout(), &report)?;
    Ok(())
}
