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

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FabricError {
    #[error("FabricError::Argument: {0}")]
    Argument(String),
    #[error("FabricError::LookupFailure: Can't locate uio device for {id:?} in the first {scanned} slots")]
    LookupFailure { id: String, scanned: u32 },
    #[error("FabricError::SizeUnavailable: Unable to determine size from {file:?}: {reason}")]
    SizeUnavailable { file: PathBuf, reason: String },
    #[error("FabricError::DeviceOpen: Cannot open {file:?}: {e}")]
    DeviceOpen { file: PathBuf, e: std::io::Error },
    #[error("FabricError::MapFailure: Cannot mmap {length} bytes of {file:?}: {reason}")]
    MapFailure {
        file: PathBuf,
        length: usize,
        reason: String,
    },
    #[error("FabricError::AlreadyMapped: {0:?} is still mapped; unmap it before mapping again")]
    AlreadyMapped(PathBuf),
    #[error("FabricError::OutOfRange: Word {index} is outside a region of {words} words")]
    OutOfRange { index: usize, words: usize },
    #[error("FabricError::ReadOnly: Cannot write to read-only mapping of {0:?}")]
    ReadOnly(PathBuf),
    #[error("FabricError::ChipOpen: Cannot open gpio chip {chip:?}: {reason}")]
    ChipOpen { chip: PathBuf, reason: String },
    #[error("FabricError::LineUnavailable: Line {line} ({label}) on {chip:?} is unavailable: {reason}")]
    LineUnavailable {
        chip: PathBuf,
        line: u32,
        label: String,
        reason: String,
    },
    #[error("FabricError::LineIo: Failed to access line {line} ({label}): {reason}")]
    LineIo {
        line: u32,
        label: String,
        reason: String,
    },
    #[error("FabricError::LineDirection: Line {line} ({label}) is held as an input and cannot be driven")]
    LineDirection { line: u32, label: String },
    #[error("FabricError::IORead: An IO error occurred when reading from {file:?}: {e}")]
    IORead { file: PathBuf, e: std::io::Error },
    #[error("FabricError::TomlDe: Failed to parse {toml_string:?} as toml: {e}")]
    TomlDe {
        toml_string: String,
        e: toml::de::Error,
    },
    #[error("FabricError::Internal: An Internal error occurred: {0}")]
    Internal(String),
}

impl FabricError {
    /// Whether the error invalidates the whole session rather than a single operation.
    ///
    /// Failing to find the device or its size leaves nothing to operate on, so callers
    /// such as the interactive menu stop instead of reprompting.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            FabricError::LookupFailure { .. }
                | FabricError::SizeUnavailable { .. }
                | FabricError::DeviceOpen { .. }
        )
    }
}
