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

//! fpga-fabric - exercise FPGA fabric memory exposed through Linux UIO.
//!
//! The library finds a uio device by name, maps its memory window and offers two kinds of
//! work on it:
//! - cycle-timed bulk write/read benchmarks ([`bench`])
//! - a start/done handshake with a fabric accelerator over GPIO lines, followed by reading
//!   its results from the mapped window ([`handshake`])
//!
//! # Architecture
//!
//! - [`uio::locator`] - `/sys/class/uio` lookup of device slot and region size
//! - [`uio::region`] - bounds-checked, fenced word access to the mapping
//! - [`cycles`] - 32-bit wrapping cycle counter
//! - [`gpio`] - requested signal lines, released on every exit path
//! - [`handshake`] - the reset/start/poll/done/error exchange
//! - [`session`] - one-time setup plus per-command mapping
//! - [`config`] - layered TOML configuration
//!
//! # Logging
//!
//! All diagnostics go through the `log` facade. Binaries choose the logger; the `fabric`
//! CLI uses `env_logger` with `RUST_LOG` defaulting to `info`.

pub mod bench;
pub mod config;
pub mod cycles;
pub mod error;
pub mod gpio;
pub mod handshake;
pub mod session;
pub mod system_io;
pub mod uio;
