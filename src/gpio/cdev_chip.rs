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

//! [`LineChip`] backed by the Linux GPIO character device (`/dev/gpiochip<N>`).
//!
//! Each requested line owns its own kernel line handle, so it stays claimed until the
//! [`CdevLine`] is dropped even if the chip is closed first. Active-low lines are requested
//! with `GPIOHANDLE_REQUEST_ACTIVE_LOW`, letting the kernel invert values.

use crate::error::FabricError;
use crate::gpio::{ActiveState, Direction, LineChip, LineHandle, LineRequest};
use gpio_cdev::{Chip, LineRequestFlags};
use log::{info, trace};
use std::path::{Path, PathBuf};

pub struct CdevChip {
    chip: Chip,
    path: PathBuf,
}

impl CdevChip {
    pub fn open(path: &Path) -> Result<CdevChip, FabricError> {
        trace!("Attempting to open gpio chip {path:?}");
        let chip = Chip::new(path).map_err(|e| FabricError::ChipOpen {
            chip: path.into(),
            reason: e.to_string(),
        })?;
        info!(
            "opened {path:?} ({}, {} lines)",
            chip.label(),
            chip.num_lines()
        );
        Ok(CdevChip {
            chip,
            path: path.into(),
        })
    }
}

impl Drop for CdevChip {
    fn drop(&mut self) {
        trace!("closed gpio chip {:?}", self.path);
    }
}

impl LineChip for CdevChip {
    fn path(&self) -> &Path {
        &self.path
    }

    fn request(&mut self, request: &LineRequest<'_>) -> Result<Box<dyn LineHandle>, FabricError> {
        let unavailable = |e: gpio_cdev::Error| FabricError::LineUnavailable {
            chip: self.path.clone(),
            line: request.offset,
            label: request.label.to_string(),
            reason: e.to_string(),
        };
        let line = self.chip.get_line(request.offset).map_err(unavailable)?;

        let mut flags = match request.direction {
            Direction::Input => LineRequestFlags::INPUT,
            Direction::Output => LineRequestFlags::OUTPUT,
        };
        if request.active_state == ActiveState::ActiveLow {
            flags |= LineRequestFlags::ACTIVE_LOW;
        }
        let handle = line
            .request(flags, 0, request.label)
            .map_err(unavailable)?;

        Ok(Box::new(CdevLine {
            handle,
            offset: request.offset,
            label: request.label.to_string(),
        }))
    }
}

pub struct CdevLine {
    handle: gpio_cdev::LineHandle,
    offset: u32,
    label: String,
}

impl CdevLine {
    fn io_error(&self, e: gpio_cdev::Error) -> FabricError {
        FabricError::LineIo {
            line: self.offset,
            label: self.label.clone(),
            reason: e.to_string(),
        }
    }
}

impl LineHandle for CdevLine {
    fn get_value(&self) -> Result<u8, FabricError> {
        self.handle.get_value().map_err(|e| self.io_error(e))
    }

    fn set_value(&self, value: u8) -> Result<(), FabricError> {
        self.handle.set_value(value).map_err(|e| self.io_error(e))
    }
}
