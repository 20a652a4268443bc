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

//! Runtime configuration.
//!
//! Configuration is read from up to three TOML layers, most specific first:
//! 1. an explicit path given by the caller (e.g. `fabric --config <path>`)
//! 2. the user config at [`USER_CONFIG_PATH`]
//! 3. the vendor config at [`VENDOR_CONFIG_PATH`]
//!
//! Keys missing from every layer fall back to the compiled defaults below, which describe
//! the PolarFire SoC reference design: an LSRAM block named `fpga_lsram` and an FFT block
//! wired to `gpiochip0` lines 17 (start), 18 (reset), 30 (done) and 31 (error).
//!
//! The loaded [`FabricConfig`] is a plain value. Nothing here is global: callers pass the
//! relevant part to [`DeviceLocator`](crate::uio::locator::DeviceLocator),
//! [`run_handshake`](crate::handshake::run_handshake) and the benchmarks.
//!
//! ```toml
//! [uio]
//! device_id = "fpga_lsram"
//!
//! [gpio]
//! error_line = -1   # no error line on this board
//!
//! [handshake]
//! max_attempts = 0  # poll until done
//! ```

mod config_files;

use crate::cycles::CycleSource;
use crate::error::FabricError;
use crate::gpio::ActiveState;
use crate::handshake::HandshakeConfig;
use config_files::{TomlConfig, config_from_file};
use log::{trace, warn};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub static VENDOR_CONFIG_PATH: &str = "/usr/lib/fpga-fabric/config.toml";
pub static USER_CONFIG_PATH: &str = "/etc/fpga-fabric/config.toml";

/// The driver-decided location of uio device metadata. Typically `/sys/class/uio/`.
pub static UIO_SYSFS_DIR: &str = "/sys/class/uio/";
pub static UIO_DEV_DIR: &str = "/dev/";
pub static DEFAULT_DEVICE_ID: &str = "fpga_lsram";
/// Slots `uio0` to `uio31` are scanned.
pub const DEFAULT_MAX_DEVICES: u32 = 32;

pub static DEFAULT_GPIO_CHIP: &str = "/dev/gpiochip0";
pub const DEFAULT_START_LINE: u32 = 17;
pub const DEFAULT_RESET_LINE: u32 = 18;
pub const DEFAULT_DONE_LINE: u32 = 30;
pub const DEFAULT_ERROR_LINE: u32 = 31;

pub const DEFAULT_SETTLE_MS: u64 = 1000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RESULT_WORDS: usize = 4;
pub const DEFAULT_STRIDE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UioConfig {
    pub sysfs_dir: PathBuf,
    pub dev_dir: PathBuf,
    pub device_id: String,
    pub max_devices: u32,
    pub map_index: u32,
}

impl Default for UioConfig {
    fn default() -> Self {
        UioConfig {
            sysfs_dir: PathBuf::from(UIO_SYSFS_DIR),
            dev_dir: PathBuf::from(UIO_DEV_DIR),
            device_id: DEFAULT_DEVICE_ID.to_string(),
            max_devices: DEFAULT_MAX_DEVICES,
            map_index: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchConfig {
    pub cycle_source: CycleSource,
    /// Stride used by the strided access pattern.
    pub stride: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        BenchConfig {
            cycle_source: CycleSource::Hardware,
            stride: DEFAULT_STRIDE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FabricConfig {
    pub uio: UioConfig,
    pub handshake: HandshakeConfig,
    pub bench: BenchConfig,
}

impl FabricConfig {
    /// Load and merge every available config layer.
    ///
    /// Missing or broken vendor/user files are logged and skipped, matching how a fresh
    /// install without any config behaves. An explicit path, however, was asked for by the
    /// caller, so failing to read or parse it is an error.
    ///
    /// # Returns: `Result<FabricConfig, FabricError>`
    /// * `Ok(FabricConfig)` - Merged configuration
    /// * `Err(FabricError::IORead | FabricError::TomlDe | FabricError::Internal)` - The
    ///   explicit file could not be used
    /// * `Err(FabricError::Argument)` - A value is out of range
    pub fn load(explicit: Option<&Path>) -> Result<FabricConfig, FabricError> {
        let vendor_config = config_from_file(Path::new(VENDOR_CONFIG_PATH)).unwrap_or_else(|e| {
            warn!("Using defaults for vendor config because loading config failed: {e}");
            TomlConfig::default()
        });
        let user_config = config_from_file(Path::new(USER_CONFIG_PATH)).unwrap_or_else(|e| {
            warn!("Using defaults for user config because loading config failed: {e}");
            TomlConfig::default()
        });
        let explicit_config = match explicit {
            Some(path) => config_from_file(path)?,
            None => TomlConfig::default(),
        };
        trace!("Merging {explicit_config:?} over {user_config:?} over {vendor_config:?}");
        Self::from_layers(explicit_config.merge(user_config.merge(vendor_config)))
    }

    /// Parse a single TOML document on top of the compiled defaults.
    pub fn from_toml_str(toml_string: &str) -> Result<FabricConfig, FabricError> {
        Self::from_layers(config_files::toml_str_to_config(toml_string)?)
    }

    fn from_layers(layers: TomlConfig) -> Result<FabricConfig, FabricError> {
        let uio = layers.uio.unwrap_or_default();
        let gpio = layers.gpio.unwrap_or_default();
        let handshake = layers.handshake.unwrap_or_default();
        let bench = layers.bench.unwrap_or_default();

        let uio = UioConfig {
            sysfs_dir: uio
                .sysfs_dir
                .map_or_else(|| PathBuf::from(UIO_SYSFS_DIR), PathBuf::from),
            dev_dir: uio
                .dev_dir
                .map_or_else(|| PathBuf::from(UIO_DEV_DIR), PathBuf::from),
            device_id: uio
                .device_id
                .unwrap_or_else(|| DEFAULT_DEVICE_ID.to_string()),
            max_devices: uio.max_devices.unwrap_or(DEFAULT_MAX_DEVICES),
            map_index: uio.map_index.unwrap_or(0),
        };
        if uio.device_id.is_empty() {
            return Err(FabricError::Argument(
                "uio.device_id must not be empty".to_string(),
            ));
        }

        let result_words = handshake.result_words.unwrap_or(DEFAULT_RESULT_WORDS);
        let handshake = HandshakeConfig {
            chip: gpio
                .chip
                .map_or_else(|| PathBuf::from(DEFAULT_GPIO_CHIP), PathBuf::from),
            start_line: gpio.start_line.unwrap_or(DEFAULT_START_LINE),
            done_line: gpio.done_line.unwrap_or(DEFAULT_DONE_LINE),
            error_line: optional_line("error_line", gpio.error_line, DEFAULT_ERROR_LINE)?,
            reset_line: optional_line("reset_line", gpio.reset_line, DEFAULT_RESET_LINE)?,
            active_state: match gpio.active_low {
                Some(true) => ActiveState::ActiveLow,
                _ => ActiveState::ActiveHigh,
            },
            settle_delay: Duration::from_millis(handshake.settle_ms.unwrap_or(DEFAULT_SETTLE_MS)),
            poll_interval: Duration::from_millis(
                handshake
                    .poll_interval_ms
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
            max_attempts: NonZeroU32::new(handshake.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS)),
            result_words,
        };

        let bench = BenchConfig {
            cycle_source: match bench.cycle_source {
                Some(s) => s.parse()?,
                None => CycleSource::Hardware,
            },
            stride: bench.stride.unwrap_or(DEFAULT_STRIDE),
        };
        if bench.stride == 0 {
            return Err(FabricError::Argument(
                "bench.stride must be at least 1".to_string(),
            ));
        }

        Ok(FabricConfig {
            uio,
            handshake,
            bench,
        })
    }
}

fn optional_line(key: &str, value: Option<i64>, default: u32) -> Result<Option<u32>, FabricError> {
    match value {
        None => Ok(Some(default)),
        Some(v) if v < 0 => {
            trace!("{key} disabled by config");
            Ok(None)
        }
        Some(v) => u32::try_from(v)
            .map(Some)
            .map_err(|_| FabricError::Argument(format!("{key} {v} is not a valid line offset"))),
    }
}
