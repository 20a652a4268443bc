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

//! Discrete signal lines used to talk to fabric logic.
//!
//! # Architecture
//!
//! - [`LineChip`] - a GPIO controller able to hand out exclusive line handles
//! - [`LineHandle`] - a single requested line as seen by the backend
//! - [`SignalPort`] - the chip a handshake works against
//! - [`SignalLine`] - a held line with its direction, active state and label; released
//!   exactly once, either by [`SignalLine::release`] or when dropped
//!
//! Values are logical: `1` means active. For active-low lines the backend inverts the
//! physical level.
//!
//! The shipped backend, [`cdev_chip::CdevChip`], uses the Linux GPIO character device.
//! Tests substitute their own [`LineChip`] implementation.

pub mod cdev_chip;

use crate::error::FabricError;
use log::{debug, trace};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveState {
    #[default]
    ActiveHigh,
    ActiveLow,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// Everything a backend needs to claim one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRequest<'a> {
    pub offset: u32,
    pub label: &'a str,
    pub direction: Direction,
    pub active_state: ActiveState,
}

pub trait LineChip {
    /// Path of the controller, used in diagnostics.
    fn path(&self) -> &Path;

    /// Claim a line exclusively.
    ///
    /// Outputs start inactive.
    ///
    /// # Returns: `Result<Box<dyn LineHandle>, FabricError>`
    /// * `Ok(Box<dyn LineHandle>)` - The line is held until the handle is dropped
    /// * `Err(FabricError::LineUnavailable)` - Offset out of range or line already held
    fn request(&mut self, request: &LineRequest<'_>) -> Result<Box<dyn LineHandle>, FabricError>;
}

/// A claimed line. Dropping the handle gives the line back to the chip.
pub trait LineHandle {
    /// Current logical value, `0` or `1`.
    fn get_value(&self) -> Result<u8, FabricError>;

    /// Drive the logical value of an output line.
    fn set_value(&self, value: u8) -> Result<(), FabricError>;
}

pub struct SignalPort {
    chip: Box<dyn LineChip>,
}

impl fmt::Debug for SignalPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalPort")
            .field("chip", &self.chip.path())
            .finish()
    }
}

impl SignalPort {
    /// Open a GPIO character device, e.g. `/dev/gpiochip0`.
    ///
    /// # Returns: `Result<SignalPort, FabricError>`
    /// * `Ok(SignalPort)` - Chip is open
    /// * `Err(FabricError::ChipOpen)` - The controller could not be opened
    pub fn open(path: &Path) -> Result<SignalPort, FabricError> {
        Ok(Self::with_chip(Box::new(cdev_chip::CdevChip::open(path)?)))
    }

    pub fn with_chip(chip: Box<dyn LineChip>) -> SignalPort {
        SignalPort { chip }
    }

    pub fn chip_path(&self) -> &Path {
        self.chip.path()
    }

    fn request(
        &mut self,
        offset: u32,
        label: &str,
        direction: Direction,
        active_state: ActiveState,
    ) -> Result<SignalLine, FabricError> {
        let request = LineRequest {
            offset,
            label,
            direction,
            active_state,
        };
        let handle = self.chip.request(&request)?;
        debug!(
            "requested line {offset} ({label}) on {:?} as {direction}",
            self.chip.path()
        );
        Ok(SignalLine {
            line_id: offset,
            direction,
            active_state,
            label: label.to_string(),
            handle: Some(handle),
        })
    }

    pub fn request_input(
        &mut self,
        offset: u32,
        label: &str,
        active_state: ActiveState,
    ) -> Result<SignalLine, FabricError> {
        self.request(offset, label, Direction::Input, active_state)
    }

    pub fn request_output(
        &mut self,
        offset: u32,
        label: &str,
        active_state: ActiveState,
    ) -> Result<SignalLine, FabricError> {
        self.request(offset, label, Direction::Output, active_state)
    }
}

/// A held line.
pub struct SignalLine {
    line_id: u32,
    direction: Direction,
    active_state: ActiveState,
    label: String,
    handle: Option<Box<dyn LineHandle>>,
}

impl fmt::Debug for SignalLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalLine")
            .field("line_id", &self.line_id)
            .field("direction", &self.direction)
            .field("active_state", &self.active_state)
            .field("label", &self.label)
            .field("held", &self.handle.is_some())
            .finish()
    }
}

impl SignalLine {
    pub fn line_id(&self) -> u32 {
        self.line_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn active_state(&self) -> ActiveState {
        self.active_state
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn handle(&self) -> Result<&dyn LineHandle, FabricError> {
        self.handle.as_deref().ok_or_else(|| {
            FabricError::Internal(format!(
                "line {} ({}) used after release",
                self.line_id, self.label
            ))
        })
    }

    pub fn get_value(&self) -> Result<u8, FabricError> {
        let value = self.handle()?.get_value()?;
        trace!("line {} ({}) reads {value}", self.line_id, self.label);
        Ok(value)
    }

    pub fn is_active(&self) -> Result<bool, FabricError> {
        Ok(self.get_value()? == 1)
    }

    /// Drive an output line to `0` or `1`.
    ///
    /// # Returns: `Result<(), FabricError>`
    /// * `Ok(())` - Value driven
    /// * `Err(FabricError::LineDirection)` - The line is held as an input
    /// * `Err(FabricError::Argument)` - `value` is neither 0 nor 1
    /// * `Err(FabricError::LineIo)` - The backend failed to drive the line
    pub fn set_value(&self, value: u8) -> Result<(), FabricError> {
        if self.direction != Direction::Output {
            return Err(FabricError::LineDirection {
                line: self.line_id,
                label: self.label.clone(),
            });
        }
        if value > 1 {
            return Err(FabricError::Argument(format!(
                "Cannot drive line {} ({}) to {value}",
                self.line_id, self.label
            )));
        }
        trace!("line {} ({}) set to {value}", self.line_id, self.label);
        self.handle()?.set_value(value)
    }

    /// Give the line back to the chip.
    pub fn release(mut self) {
        self.release_handle();
    }

    fn release_handle(&mut self) {
        if let Some(handle) = self.handle.take() {
            drop(handle);
            debug!("released line {} ({})", self.line_id, self.label);
        }
    }
}

impl Drop for SignalLine {
    fn drop(&mut self) {
        self.release_handle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use std::cell::{Cell, RefCell};
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::rc::Rc;

    #[derive(Default)]
    struct Ledger {
        held: RefCell<HashSet<u32>>,
        releases: Cell<u32>,
    }

    struct FakeChip {
        path: PathBuf,
        lines: u32,
        ledger: Rc<Ledger>,
    }

    struct FakeLine {
        offset: u32,
        value: Cell<u8>,
        ledger: Rc<Ledger>,
    }

    impl LineChip for FakeChip {
        fn path(&self) -> &Path {
            &self.path
        }

        fn request(
            &mut self,
            request: &LineRequest<'_>,
        ) -> Result<Box<dyn LineHandle>, FabricError> {
            if request.offset >= self.lines || !self.ledger.held.borrow_mut().insert(request.offset)
            {
                return Err(FabricError::LineUnavailable {
                    chip: self.path.clone(),
                    line: request.offset,
                    label: request.label.to_string(),
                    reason: "busy".to_string(),
                });
            }
            Ok(Box::new(FakeLine {
                offset: request.offset,
                value: Cell::new(0),
                ledger: self.ledger.clone(),
            }))
        }
    }

    impl LineHandle for FakeLine {
        fn get_value(&self) -> Result<u8, FabricError> {
            Ok(self.value.get())
        }

        fn set_value(&self, value: u8) -> Result<(), FabricError> {
            self.value.set(value);
            Ok(())
        }
    }

    impl Drop for FakeLine {
        fn drop(&mut self) {
            self.ledger.held.borrow_mut().remove(&self.offset);
            self.ledger.releases.set(self.ledger.releases.get() + 1);
        }
    }

    fn port() -> (SignalPort, Rc<Ledger>) {
        let ledger = Rc::new(Ledger::default());
        let chip = FakeChip {
            path: PathBuf::from("/dev/gpiochip0"),
            lines: 32,
            ledger: ledger.clone(),
        };
        (SignalPort::with_chip(Box::new(chip)), ledger)
    }

    #[gtest]
    fn test_output_round_trip() {
        let (mut port, _) = port();
        let start = port
            .request_output(17, "fft_start", ActiveState::ActiveHigh)
            .unwrap();
        expect_false!(start.is_active().unwrap());
        start.set_value(1).unwrap();
        expect_true!(start.is_active().unwrap());
        expect_eq!(start.label(), "fft_start");
        expect_eq!(start.direction(), Direction::Output);
    }

    #[gtest]
    fn test_input_cannot_be_driven() {
        let (mut port, _) = port();
        let done = port
            .request_input(30, "fft_done", ActiveState::ActiveHigh)
            .unwrap();
        expect_that!(
            done.set_value(1),
            err(displays_as(contains_substring("FabricError::LineDirection")))
        );
    }

    #[gtest]
    fn test_values_other_than_zero_or_one_are_rejected() {
        let (mut port, _) = port();
        let start = port
            .request_output(17, "fft_start", ActiveState::ActiveHigh)
            .unwrap();
        expect_that!(
            start.set_value(2),
            err(displays_as(contains_substring("FabricError::Argument")))
        );
    }

    #[gtest]
    fn test_held_line_cannot_be_requested_twice() {
        let (mut port, ledger) = port();
        let first = port
            .request_input(30, "fft_done", ActiveState::ActiveHigh)
            .unwrap();
        expect_that!(
            port.request_input(30, "fft_done", ActiveState::ActiveHigh),
            err(displays_as(contains_substring("LineUnavailable")))
        );
        first.release();
        expect_eq!(ledger.releases.get(), 1);
        expect_true!(
            port.request_input(30, "fft_done", ActiveState::ActiveHigh)
                .is_ok()
        );
    }

    #[gtest]
    fn test_out_of_range_offset_is_unavailable() {
        let (mut port, _) = port();
        expect_that!(
            port.request_output(40, "mss_reset", ActiveState::ActiveHigh),
            err(displays_as(contains_substring("Line 40 (mss_reset)")))
        );
    }

    #[gtest]
    fn test_release_happens_exactly_once() {
        let (mut port, ledger) = port();
        let line = port
            .request_output(18, "mss_reset", ActiveState::ActiveLow)
            .unwrap();
        line.release();
        expect_eq!(ledger.releases.get(), 1);
        {
            let _dropped = port
                .request_output(18, "mss_reset", ActiveState::ActiveLow)
                .unwrap();
        }
        expect_eq!(ledger.releases.get(), 2);
        expect_true!(ledger.held.borrow().is_empty());
    }
}
