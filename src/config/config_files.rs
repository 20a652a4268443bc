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

//! TOML representation of a config file layer.
//!
//! Every field is optional so that a layer only overrides what it names. Layers are
//! combined with `merge`, the receiver winning over the fallback, and the merged result is
//! turned into a [`FabricConfig`](crate::config::FabricConfig) by filling the remaining gaps
//! with compiled defaults.

use crate::error::FabricError;
use crate::system_io::fs_read;
use log::trace;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlConfig {
    pub(crate) uio: Option<UioToml>,
    pub(crate) gpio: Option<GpioToml>,
    pub(crate) handshake: Option<HandshakeToml>,
    pub(crate) bench: Option<BenchToml>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct UioToml {
    pub(crate) sysfs_dir: Option<String>,
    pub(crate) dev_dir: Option<String>,
    pub(crate) device_id: Option<String>,
    pub(crate) max_devices: Option<u32>,
    pub(crate) map_index: Option<u32>,
}

/// Negative line numbers switch an optional line off.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct GpioToml {
    pub(crate) chip: Option<String>,
    pub(crate) start_line: Option<u32>,
    pub(crate) done_line: Option<u32>,
    pub(crate) error_line: Option<i64>,
    pub(crate) reset_line: Option<i64>,
    pub(crate) active_low: Option<bool>,
}

/// `max_attempts = 0` polls without bound.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct HandshakeToml {
    pub(crate) settle_ms: Option<u64>,
    pub(crate) poll_interval_ms: Option<u64>,
    pub(crate) max_attempts: Option<u32>,
    pub(crate) result_words: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct BenchToml {
    pub(crate) cycle_source: Option<String>,
    pub(crate) stride: Option<usize>,
}

impl TomlConfig {
    pub(crate) fn merge(self, fallback: TomlConfig) -> TomlConfig {
        TomlConfig {
            uio: merge_section(self.uio, fallback.uio, UioToml::merge),
            gpio: merge_section(self.gpio, fallback.gpio, GpioToml::merge),
            handshake: merge_section(self.handshake, fallback.handshake, HandshakeToml::merge),
            bench: merge_section(self.bench, fallback.bench, BenchToml::merge),
        }
    }
}

fn merge_section<T>(primary: Option<T>, fallback: Option<T>, merge: fn(T, T) -> T) -> Option<T> {
    match (primary, fallback) {
        (Some(p), Some(f)) => Some(merge(p, f)),
        (p, f) => p.or(f),
    }
}

impl UioToml {
    fn merge(self, fallback: UioToml) -> UioToml {
        UioToml {
            sysfs_dir: self.sysfs_dir.or(fallback.sysfs_dir),
            dev_dir: self.dev_dir.or(fallback.dev_dir),
            device_id: self.device_id.or(fallback.device_id),
            max_devices: self.max_devices.or(fallback.max_devices),
            map_index: self.map_index.or(fallback.map_index),
        }
    }
}

impl GpioToml {
    fn merge(self, fallback: GpioToml) -> GpioToml {
        GpioToml {
            chip: self.chip.or(fallback.chip),
            start_line: self.start_line.or(fallback.start_line),
            done_line: self.done_line.or(fallback.done_line),
            error_line: self.error_line.or(fallback.error_line),
            reset_line: self.reset_line.or(fallback.reset_line),
            active_low: self.active_low.or(fallback.active_low),
        }
    }
}

impl HandshakeToml {
    fn merge(self, fallback: HandshakeToml) -> HandshakeToml {
        HandshakeToml {
            settle_ms: self.settle_ms.or(fallback.settle_ms),
            poll_interval_ms: self.poll_interval_ms.or(fallback.poll_interval_ms),
            max_attempts: self.max_attempts.or(fallback.max_attempts),
            result_words: self.result_words.or(fallback.result_words),
        }
    }
}

impl BenchToml {
    fn merge(self, fallback: BenchToml) -> BenchToml {
        BenchToml {
            cycle_source: self.cycle_source.or(fallback.cycle_source),
            stride: self.stride.or(fallback.stride),
        }
    }
}

pub(crate) fn toml_str_to_config(toml_string: &str) -> Result<TomlConfig, FabricError> {
    toml::from_str(toml_string).map_err(|e| FabricError::TomlDe {
        toml_string: toml_string.into(),
        e,
    })
}

pub(crate) fn config_from_file(file_path: &Path) -> Result<TomlConfig, FabricError> {
    if !file_path.is_file() {
        return Err(FabricError::Internal(format!(
            "Config file not found in {file_path:?}"
        )));
    }
    let config = toml_str_to_config(&fs_read(file_path)?)?;
    trace!("Loaded {config:?} from {file_path:?}");
    Ok(config)
}
