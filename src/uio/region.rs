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

//! Word access to a mapped uio region.
//!
//! A [`UioDevice`] owns the open `/dev/uio<N>` descriptor. [`UioDevice::map`] hands out a
//! [`MappedRegion`] that borrows the device, so the mapping can never outlive the
//! descriptor, and only one region per device may exist at a time. Dropping the region
//! unmaps it.
//!
//! Accesses are volatile 32-bit loads and stores at word granularity. The fabric memory is
//! not cached like ordinary RAM and an external AXI master may write it at any time, so
//! every store is followed by a full fence, and bulk loops call [`MappedRegion::fence`]
//! once more before relying on reads.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use fpga_fabric::uio::region::{AccessMode, UioDevice};
//! # use std::path::Path;
//! # fn example() -> Result<(), fpga_fabric::error::FabricError> {
//! let device = UioDevice::open_path(Path::new("/dev/uio3"), 0, AccessMode::ReadWrite)?;
//! let mut region = device.map(0x1000)?;
//! region.write_word(0, 0xdead_beef)?;
//! region.fence();
//! assert_eq!(region.read_word(0)?, 0xdead_beef);
//! region.unmap();
//! # Ok(())
//! # }
//! ```

use crate::error::FabricError;
use crate::uio::locator::DeviceHandle;
use log::{info, trace};
use memmap2::{Mmap, MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering, fence};

pub const WORD_BYTES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug)]
pub struct UioDevice {
    file: File,
    path: PathBuf,
    map_index: u32,
    mode: AccessMode,
    mapped: AtomicBool,
}

impl UioDevice {
    /// Open the character device of a resolved handle.
    pub fn open(handle: &DeviceHandle, mode: AccessMode) -> Result<UioDevice, FabricError> {
        Self::open_path(&handle.dev_path, handle.map_index, mode)
    }

    /// Open a uio (or any mappable) file directly.
    ///
    /// # Returns: `Result<UioDevice, FabricError>`
    /// * `Ok(UioDevice)` - Descriptor is open
    /// * `Err(FabricError::DeviceOpen)` - Missing device, insufficient permissions or busy
    pub fn open_path(
        path: &Path,
        map_index: u32,
        mode: AccessMode,
    ) -> Result<UioDevice, FabricError> {
        trace!("Attempting to open {path:?} as {mode:?}");
        let file = OpenOptions::new()
            .read(true)
            .write(mode == AccessMode::ReadWrite)
            .open(path)
            .map_err(|e| FabricError::DeviceOpen {
                file: path.into(),
                e,
            })?;
        info!(
            "opened {path:?} ({})",
            match mode {
                AccessMode::ReadOnly => "r",
                AccessMode::ReadWrite => "r,w",
            }
        );
        Ok(UioDevice {
            file,
            path: path.into(),
            map_index,
            mode,
            mapped: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.load(Ordering::Acquire)
    }

    /// Map exactly `length` bytes of the device's configured map.
    ///
    /// uio selects map `M` through an mmap offset of `M` pages, so map0 lives at offset 0.
    ///
    /// # Returns: `Result<MappedRegion, FabricError>`
    /// * `Ok(MappedRegion)` - Mapping established
    /// * `Err(FabricError::AlreadyMapped)` - A region of this device is still alive
    /// * `Err(FabricError::MapFailure)` - `length` is zero or not a whole number of words,
    ///   or the kernel refused the mapping
    pub fn map(&self, length: u32) -> Result<MappedRegion<'_>, FabricError> {
        let map_failure = |reason: String| FabricError::MapFailure {
            file: self.path.clone(),
            length: length as usize,
            reason,
        };
        if length == 0 {
            return Err(map_failure("cannot map an empty region".to_string()));
        }
        if length as usize % WORD_BYTES != 0 {
            return Err(map_failure(format!(
                "length is not a multiple of {WORD_BYTES} bytes"
            )));
        }
        if self
            .mapped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(FabricError::AlreadyMapped(self.path.clone()));
        }

        let offset = u64::from(self.map_index) * page_size();
        let mut options = MmapOptions::new();
        options.offset(offset).len(length as usize);
        // SAFETY: the mapping is only accessed through volatile word operations, which
        // tolerate the device changing the memory underneath us.
        let mapping = match self.mode {
            AccessMode::ReadOnly => unsafe { options.map(&self.file) }.map(Mapping::ReadOnly),
            AccessMode::ReadWrite => {
                unsafe { options.map_mut(&self.file) }.map(Mapping::ReadWrite)
            }
        };
        let mapping = match mapping {
            Ok(mapping) => mapping,
            Err(e) => {
                self.mapped.store(false, Ordering::Release);
                return Err(map_failure(e.to_string()));
            }
        };
        trace!("mapped {length} bytes of {:?} at offset {offset}", self.path);

        Ok(MappedRegion {
            device: self,
            mapping,
            length_bytes: length,
        })
    }
}

impl Drop for UioDevice {
    fn drop(&mut self) {
        info!("closed {:?}", self.path);
    }
}

fn page_size() -> u64 {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as u64 } else { 4096 }
}

#[derive(Debug)]
enum Mapping {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

/// A live mapping of a uio region. Unmapped on drop.
#[derive(Debug)]
pub struct MappedRegion<'dev> {
    device: &'dev UioDevice,
    mapping: Mapping,
    length_bytes: u32,
}

impl MappedRegion<'_> {
    pub fn length_bytes(&self) -> u32 {
        self.length_bytes
    }

    pub fn words(&self) -> usize {
        self.length_bytes as usize / WORD_BYTES
    }

    pub fn access_mode(&self) -> AccessMode {
        match self.mapping {
            Mapping::ReadOnly(_) => AccessMode::ReadOnly,
            Mapping::ReadWrite(_) => AccessMode::ReadWrite,
        }
    }

    fn check_index(&self, index: usize) -> Result<(), FabricError> {
        if index < self.words() {
            Ok(())
        } else {
            Err(FabricError::OutOfRange {
                index,
                words: self.words(),
            })
        }
    }

    /// Volatile load of word `index`.
    #[inline]
    pub fn read_word(&self, index: usize) -> Result<u32, FabricError> {
        self.check_index(index)?;
        let base = match &self.mapping {
            Mapping::ReadOnly(m) => m.as_ptr(),
            Mapping::ReadWrite(m) => m.as_ptr(),
        };
        // SAFETY: index is in bounds and the page-aligned base keeps words aligned.
        Ok(unsafe { std::ptr::read_volatile(base.add(index * WORD_BYTES).cast::<u32>()) })
    }

    /// Volatile store of `value` to word `index`, followed by a full fence.
    #[inline]
    pub fn write_word(&mut self, index: usize, value: u32) -> Result<(), FabricError> {
        self.check_index(index)?;
        let base = match &mut self.mapping {
            Mapping::ReadOnly(_) => return Err(FabricError::ReadOnly(self.device.path.clone())),
            Mapping::ReadWrite(m) => m.as_mut_ptr(),
        };
        // SAFETY: index is in bounds and the page-aligned base keeps words aligned.
        unsafe { std::ptr::write_volatile(base.add(index * WORD_BYTES).cast::<u32>(), value) };
        fence(Ordering::SeqCst);
        Ok(())
    }

    /// Read `count` consecutive words starting at word 0.
    pub fn read_words(&self, count: usize) -> Result<Vec<u32>, FabricError> {
        (0..count).map(|i| self.read_word(i)).collect()
    }

    /// Full memory fence ordering every prior access before any later one.
    #[inline]
    pub fn fence(&self) {
        fence(Ordering::SeqCst);
    }

    /// Release the mapping. Equivalent to dropping the region.
    pub fn unmap(self) {}
}

impl Drop for MappedRegion<'_> {
    fn drop(&mut self) {
        // The Mmap field is unmapped right after this body runs.
        self.device.mapped.store(false, Ordering::Release);
        info!("unmapped {:?}", self.device.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use tempfile::NamedTempFile;

    fn backing_file(len: u64) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        file.as_file().set_len(len).unwrap();
        file
    }

    #[gtest]
    fn test_open_missing_device() {
        let r = UioDevice::open_path(Path::new("/dev/uio-missing"), 0, AccessMode::ReadWrite);
        expect_that!(r, err(displays_as(contains_substring("FabricError::DeviceOpen"))));
    }

    #[gtest]
    fn test_map_zero_length_fails() {
        let file = backing_file(4096);
        let device = UioDevice::open_path(file.path(), 0, AccessMode::ReadWrite).unwrap();
        expect_that!(device.map(0), err(displays_as(contains_substring("MapFailure"))));
        expect_false!(device.is_mapped());
    }

    #[gtest]
    fn test_map_unaligned_length_fails() {
        let file = backing_file(4096);
        let device = UioDevice::open_path(file.path(), 0, AccessMode::ReadWrite).unwrap();
        expect_that!(device.map(6), err(displays_as(contains_substring("MapFailure"))));
    }

    #[gtest]
    fn test_map_then_unmap_allows_remap() {
        let file = backing_file(4096);
        let device = UioDevice::open_path(file.path(), 0, AccessMode::ReadWrite).unwrap();
        let region = device.map(4096).unwrap();
        expect_true!(device.is_mapped());
        region.unmap();
        expect_false!(device.is_mapped());
        let region = device.map(4096).unwrap();
        expect_eq!(region.words(), 1024);
    }

    #[gtest]
    fn test_double_map_fails_without_leaking() {
        let file = backing_file(4096);
        let device = UioDevice::open_path(file.path(), 0, AccessMode::ReadWrite).unwrap();
        let region = device.map(4096).unwrap();
        expect_that!(
            device.map(4096),
            err(displays_as(contains_substring("AlreadyMapped")))
        );
        expect_true!(device.is_mapped());
        drop(region);
        expect_false!(device.is_mapped());
    }

    #[gtest]
    fn test_out_of_range_accesses_fail() {
        let file = backing_file(4096);
        let device = UioDevice::open_path(file.path(), 0, AccessMode::ReadWrite).unwrap();
        let mut region = device.map(16).unwrap();
        expect_that!(
            region.read_word(4),
            err(displays_as(contains_substring("Word 4 is outside a region of 4 words")))
        );
        expect_that!(
            region.write_word(usize::MAX, 1),
            err(displays_as(contains_substring("OutOfRange")))
        );
        expect_eq!(region.read_word(3).unwrap(), 0);
    }

    #[gtest]
    fn test_read_only_mapping_refuses_writes() {
        let file = backing_file(4096);
        std::fs::write(file.path(), 0x1234_5678u32.to_ne_bytes()).unwrap();
        file.as_file().set_len(4096).unwrap();
        let device = UioDevice::open_path(file.path(), 0, AccessMode::ReadOnly).unwrap();
        let mut region = device.map(4096).unwrap();
        expect_eq!(region.access_mode(), AccessMode::ReadOnly);
        expect_eq!(region.read_word(0).unwrap(), 0x1234_5678);
        expect_that!(
            region.write_word(0, 0),
            err(displays_as(contains_substring("FabricError::ReadOnly")))
        );
    }

    #[gtest]
    fn test_write_then_read_identity() {
        let file = backing_file(4096);
        let device = UioDevice::open_path(file.path(), 0, AccessMode::ReadWrite).unwrap();
        let mut region = device.map(4096).unwrap();
        for i in 0..region.words() {
            region.write_word(i, i as u32).unwrap();
        }
        region.fence();
        for i in 0..region.words() {
            expect_eq!(region.read_word(i).unwrap(), i as u32);
        }
        expect_eq!(region.read_words(4).unwrap(), vec![0, 1, 2, 3]);
    }
}
