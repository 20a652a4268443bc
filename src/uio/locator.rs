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

//! Resolution of a uio device name to a slot and a region size.
//!
//! # A sysfs map of a uio device
//!
//! ```text
//! root@icicle:~# tree /sys/class/uio/uio3
//! /sys/class/uio/uio3
//! ├── dev
//! ├── device -> ../../../61000000.lsram
//! ├── event
//! ├── maps
//! │   └── map0
//! │       ├── addr
//! │       ├── name
//! │       ├── offset
//! │       └── size
//! ├── name
//! ├── power
//! ├── subsystem -> ../../../../class/uio
//! ├── uevent
//! └── version
//! ```
//! Of these files only `name`, `maps/map<M>/size` and `maps/map<M>/addr` are read. `size`
//! and `addr` hold `0x`-prefixed, 16 digit hexadecimal literals, e.g. `0x0000000000001000`.
//!
//! Slots are numbered densely from `uio0`, so the first missing `name` ends the scan.

use crate::config::UioConfig;
use crate::error::FabricError;
use crate::system_io::{fs_read, fs_read_token};
use log::{debug, info, trace};
use std::path::PathBuf;

/// Stored names are compared on at most this many bytes of the requested id.
pub const ID_COMPARE_LEN: usize = 31;
/// Stored names are truncated to this many bytes before comparison.
pub const ID_STORED_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub symbolic_id: String,
    pub index: u32,
    pub region_size_bytes: u32,
    pub map_index: u32,
    /// Physical base address of the map, when the kernel exposes it.
    pub physical_addr: Option<u64>,
    /// Character device to open, e.g. `/dev/uio3`.
    pub dev_path: PathBuf,
}

impl DeviceHandle {
    pub fn region_words(&self) -> usize {
        self.region_size_bytes as usize / 4
    }
}

/// One populated slot, as reported by [`DeviceLocator::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub index: u32,
    pub name: String,
    /// `None` when the slot has no readable size for the configured map.
    pub region_size_bytes: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct DeviceLocator {
    sysfs_dir: PathBuf,
    dev_dir: PathBuf,
    max_devices: u32,
    map_index: u32,
}

impl DeviceLocator {
    pub fn new(config: &UioConfig) -> DeviceLocator {
        DeviceLocator {
            sysfs_dir: config.sysfs_dir.clone(),
            dev_dir: config.dev_dir.clone(),
            max_devices: config.max_devices,
            map_index: config.map_index,
        }
    }

    fn slot_dir(&self, index: u32) -> PathBuf {
        self.sysfs_dir.join(format!("uio{index}"))
    }

    fn map_attr(&self, index: u32, attr: &str) -> PathBuf {
        self.slot_dir(index)
            .join("maps")
            .join(format!("map{}", self.map_index))
            .join(attr)
    }

    fn stored_id(&self, index: u32) -> Result<String, FabricError> {
        let mut name = fs_read_token(&self.slot_dir(index).join("name"))?;
        truncate_bytes(&mut name, ID_STORED_LEN);
        Ok(name)
    }

    /// Find the first slot whose name matches `id`.
    ///
    /// A stored name matches when it begins with the first [`ID_COMPARE_LEN`] bytes of
    /// `id`, so `fpga_lsram` also matches a device named `fpga_lsram_1`.
    ///
    /// # Returns: `Result<u32, FabricError>`
    /// * `Ok(u32)` - The slot index
    /// * `Err(FabricError::LookupFailure)` - No populated slot matched
    /// * `Err(FabricError::Argument)` - `id` is empty
    pub fn find(&self, id: &str) -> Result<u32, FabricError> {
        if id.is_empty() {
            return Err(FabricError::Argument(
                "Cannot look up a uio device by an empty name".to_string(),
            ));
        }
        let wanted = &id.as_bytes()[..id.len().min(ID_COMPARE_LEN)];

        let mut scanned = 0;
        for index in 0..self.max_devices {
            let stored = match self.stored_id(index) {
                Ok(stored) => stored,
                Err(e) => {
                    trace!("Stopping scan at slot {index}: {e}");
                    break;
                }
            };
            scanned += 1;
            if stored.as_bytes().starts_with(wanted) {
                debug!("file id: {stored} sysfs_path: {:?}", self.slot_dir(index));
                return Ok(index);
            }
        }

        Err(FabricError::LookupFailure {
            id: id.to_string(),
            scanned,
        })
    }

    /// Read the size of the configured map of slot `index`.
    ///
    /// # Returns: `Result<u32, FabricError>`
    /// * `Ok(u32)` - Region size in bytes (may be 0, see [`DeviceLocator::resolve`])
    /// * `Err(FabricError::SizeUnavailable)` - The size file is missing, malformed or the
    ///   size does not fit in 32 bits
    pub fn region_size(&self, index: u32) -> Result<u32, FabricError> {
        let size_path = self.map_attr(index, "size");
        let contents = fs_read(&size_path).map_err(|e| FabricError::SizeUnavailable {
            file: size_path.clone(),
            reason: e.to_string(),
        })?;
        let size = parse_hex_literal(&contents).map_err(|reason| FabricError::SizeUnavailable {
            file: size_path.clone(),
            reason,
        })?;
        u32::try_from(size).map_err(|_| FabricError::SizeUnavailable {
            file: size_path,
            reason: format!("0x{size:X} does not fit in 32 bits"),
        })
    }

    fn physical_addr(&self, index: u32) -> Option<u64> {
        let addr_path = self.map_attr(index, "addr");
        fs_read(&addr_path)
            .ok()
            .and_then(|s| parse_hex_literal(&s).ok())
    }

    /// Look up `id` and read everything needed to map it.
    ///
    /// # Returns: `Result<DeviceHandle, FabricError>`
    /// * `Ok(DeviceHandle)` - Device found with a non-zero region size
    /// * `Err(FabricError::LookupFailure)` - No device with that name
    /// * `Err(FabricError::SizeUnavailable)` - Size unreadable or zero
    pub fn resolve(&self, id: &str) -> Result<DeviceHandle, FabricError> {
        info!("locating device for {id}");
        let index = self.find(id)?;
        let region_size_bytes = self.region_size(index)?;
        if region_size_bytes == 0 {
            return Err(FabricError::SizeUnavailable {
                file: self.map_attr(index, "size"),
                reason: "bad memory size 0".to_string(),
            });
        }
        let dev_path = self.dev_dir.join(format!("uio{index}"));
        info!("located {dev_path:?} with a region of 0x{region_size_bytes:x} bytes");

        Ok(DeviceHandle {
            symbolic_id: id.to_string(),
            index,
            region_size_bytes,
            map_index: self.map_index,
            physical_addr: self.physical_addr(index),
            dev_path,
        })
    }

    /// Enumerate populated slots, stopping at the first missing one.
    pub fn list(&self) -> Vec<SlotInfo> {
        (0..self.max_devices)
            .map_while(|index| {
                self.stored_id(index).ok().map(|name| SlotInfo {
                    index,
                    name,
                    region_size_bytes: self
                        .region_size(index)
                        .inspect_err(|e| debug!("no size for uio{index}: {e}"))
                        .ok(),
                })
            })
            .collect()
    }
}

fn truncate_bytes(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

/// Parse a `0x`-prefixed hexadecimal literal of at most 16 digits.
pub(crate) fn parse_hex_literal(contents: &str) -> Result<u64, String> {
    let trimmed = contents.trim().trim_end_matches('\0');
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| format!("{trimmed:?} is not a 0x-prefixed literal"))?;
    if digits.is_empty() || digits.len() > 16 {
        return Err(format!("{trimmed:?} must have between 1 and 16 digits"));
    }
    u64::from_str_radix(digits, 16).map_err(|e| format!("{trimmed:?}: {e}"))
}
