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

//! One open uio device and the commands that can be run against it.
//!
//! [`FabricSession::open`] performs the one-time setup (locate, size, open). Each command
//! then maps the region for its own duration; the mapping is released when the command
//! returns, whichever way it returns. The device is closed when the session is dropped.

use crate::bench::{AccessPattern, BenchReport, fill_index_pattern, run_benchmark};
use crate::config::FabricConfig;
use crate::cycles::CycleTimer;
use crate::error::FabricError;
use crate::gpio::SignalPort;
use crate::handshake::{HandshakeOutcome, run_handshake};
use crate::uio::locator::{DeviceHandle, DeviceLocator};
use crate::uio::region::{AccessMode, MappedRegion, UioDevice};
use log::info;

/// Operations offered to an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Benchmark(AccessPattern),
    /// Write the index pattern only.
    Fill,
    Handshake,
    /// Run the handshake, then benchmark the region it wrote.
    ///
    /// The benchmark overwrites the accelerator's output, so the `result_words` read by
    /// the handshake are the only copy of it.
    HandshakeThenBenchmark(AccessPattern),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReport {
    Benchmark(BenchReport),
    Fill { words: usize },
    Handshake(HandshakeOutcome),
    HandshakeThenBenchmark(HandshakeOutcome, BenchReport),
}

#[derive(Debug)]
pub struct FabricSession {
    config: FabricConfig,
    handle: DeviceHandle,
    device: UioDevice,
    timer: CycleTimer,
}

impl FabricSession {
    /// Locate the configured device, read its size and open it read-write.
    ///
    /// # Returns: `Result<FabricSession, FabricError>`
    /// * `Ok(FabricSession)` - Device is open and ready to map
    /// * `Err(FabricError::LookupFailure)` - No device with the configured name
    /// * `Err(FabricError::SizeUnavailable)` - Region size unreadable or zero
    /// * `Err(FabricError::DeviceOpen)` - `/dev/uio<N>` could not be opened
    pub fn open(config: FabricConfig) -> Result<FabricSession, FabricError> {
        let handle = DeviceLocator::new(&config.uio).resolve(&config.uio.device_id)?;
        let device = UioDevice::open(&handle, AccessMode::ReadWrite)?;
        let timer = CycleTimer::new(config.bench.cycle_source);
        Ok(FabricSession {
            config,
            handle,
            device,
            timer,
        })
    }

    pub fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    pub fn config(&self) -> &FabricConfig {
        &self.config
    }

    fn map(&self) -> Result<MappedRegion<'_>, FabricError> {
        let region = self.device.map(self.handle.region_size_bytes)?;
        match self.handle.physical_addr {
            Some(addr) => info!(
                "Size of memory at 0x{addr:x} is 0x{:x}",
                self.handle.region_size_bytes
            ),
            None => info!("Size of memory is 0x{:x}", self.handle.region_size_bytes),
        }
        Ok(region)
    }

    pub fn benchmark(&self, pattern: AccessPattern) -> Result<BenchReport, FabricError> {
        let mut region = self.map()?;
        run_benchmark(&mut region, &self.timer, pattern)
    }

    pub fn fill(&self) -> Result<usize, FabricError> {
        let mut region = self.map()?;
        fill_index_pattern(&mut region)
    }

    /// Run the configured handshake against lines of `port`.
    pub async fn handshake(&self, port: &mut SignalPort) -> Result<HandshakeOutcome, FabricError> {
        let region = self.map()?;
        run_handshake(port, &region, &self.config.handshake).await
    }

    /// The benchmark overwrites what the accelerator wrote; only
    /// [`HandshakeOutcome::results`] keeps it.
    pub async fn handshake_then_benchmark(
        &self,
        port: &mut SignalPort,
        pattern: AccessPattern,
    ) -> Result<(HandshakeOutcome, BenchReport), FabricError> {
        let mut region = self.map()?;
        let outcome = run_handshake(port, &region, &self.config.handshake).await?;
        let report = run_benchmark(&mut region, &self.timer, pattern)?;
        Ok((outcome, report))
    }

    /// Run `command`, opening the configured gpio chip for handshake commands.
    ///
    /// The chip is closed again before this returns.
    pub async fn execute(&self, command: Command) -> Result<CommandReport, FabricError> {
        match command {
            Command::Benchmark(pattern) => self.benchmark(pattern).map(CommandReport::Benchmark),
            Command::Fill => self.fill().map(|words| CommandReport::Fill { words }),
            Command::Handshake => {
                let mut port = SignalPort::open(&self.config.handshake.chip)?;
                self.handshake(&mut port)
                    .await
                    .map(CommandReport::Handshake)
            }
            Command::HandshakeThenBenchmark(pattern) => {
                let mut port = SignalPort::open(&self.config.handshake.chip)?;
                let (outcome, report) = self.handshake_then_benchmark(&mut port, pattern).await?;
                Ok(CommandReport::HandshakeThenBenchmark(outcome, report))
            }
        }
    }
}
