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

//! Error Wrapping File System I/O Helpers
//!
//! Thin wrappers around the standard library reads used against sysfs and config files,
//! converting failures to [`FabricError::IORead`] with the offending path attached.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use fpga_fabric::system_io::{fs_read, fs_read_token};
//! # use std::path::Path;
//! # fn example() -> Result<(), fpga_fabric::error::FabricError> {
//! let name = fs_read_token(Path::new("/sys/class/uio/uio0/name"))?;
//! let size = fs_read(Path::new("/sys/class/uio/uio0/maps/map0/size"))?;
//! # Ok(())
//! # }
//! ```

use crate::error::FabricError;
use log::trace;
use std::fs::OpenOptions;
use std::io::Read;
use std::path::Path;

/// Read the contents of a file to a String.
///
/// # Arguments
///
/// * `file_path` - Path to the file to read
///
/// # Returns: `Result<String, FabricError>`
/// * `Ok(String)` - The complete contents of the file
/// * `Err(FabricError::IORead)` - If the file cannot be read (doesn't exist, permissions, etc.)
pub fn fs_read(file_path: &Path) -> Result<String, FabricError> {
    trace!("Attempting to read from {file_path:?}");
    let mut buf: String = String::new();
    let result = OpenOptions::new()
        .read(true)
        .open(file_path)
        .and_then(|mut f| f.read_to_string(&mut buf));

    match result {
        Ok(_) => {
            trace!("Reading done");
            Ok(buf)
        }
        Err(e) => Err(FabricError::IORead {
            file: file_path.into(),
            e,
        }),
    }
}

/// Read the first whitespace-delimited token of a file.
///
/// sysfs attributes are newline (and sometimes NUL) terminated, so this is what most
/// single-value attributes need. An empty file yields an empty string.
pub fn fs_read_token(file_path: &Path) -> Result<String, FabricError> {
    let contents = fs_read(file_path)?;
    Ok(contents
        .trim_end_matches('\0')
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use std::fs;

    #[gtest]
    fn test_fs_read_missing_file() {
        let r = fs_read(Path::new("bad_input"));
        expect_that!(r, err(displays_as(contains_substring("No such file or directory"))));
    }

    #[gtest]
    fn test_fs_read_token_trims_newline_and_nul() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("name");
        fs::write(&path, "fpga_lsram\n\0").unwrap();
        expect_eq!(fs_read_token(&path).unwrap(), "fpga_lsram");
    }

    #[gtest]
    fn test_fs_read_token_takes_first_word() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("name");
        fs::write(&path, "  fpga_dma extra words\n").unwrap();
        expect_eq!(fs_read_token(&path).unwrap(), "fpga_dma");
    }
}
