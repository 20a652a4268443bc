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

//! Linux userspace I/O (uio) devices.
//!
//! - [`locator`] finds a device by name under `/sys/class/uio` and reads its region size.
//! - [`region`] opens `/dev/uio<N>` and provides bounds-checked word access to the mapping.

pub mod locator;
pub mod region;

pub use locator::{DeviceHandle, DeviceLocator, SlotInfo};
pub use region::{AccessMode, MappedRegion, UioDevice};
