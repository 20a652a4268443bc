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

//! Start/done handshake with a fabric accelerator.
//!
//! The accelerator and the processor share only level signals and the mapped region. There
//! is no data-ready signal beyond `done`, so ordering is what keeps software from reading
//! the region before the AXI master has finished writing it:
//!
//! ```text
//! Idle ─▶ ResetAsserted ─▶ ResetCleared ─▶ StartAsserted ─▶ Polling ─┬▶ Done ────┐
//!   │                                           ▲                    ├▶ Error ───┼▶ ResultRead ─▶ Released
//!   └──────────────── (no reset line) ──────────┘                    └▶ Timeout ─┘
//! ```
//!
//! - `done` is sampled once per poll cycle, then `error` if the board has one.
//! - `Timeout` only exists when [`HandshakeConfig::max_attempts`] is set. With `None` the
//!   poll runs until `done` or `error`.
//! - Every terminal state deasserts `start` and reads the first
//!   [`HandshakeConfig::result_words`] words, even after a timeout, since the region may
//!   still hold useful partial output.
//! - Every requested line is released on every path, including early errors. A line
//!   failure after `start` was asserted drives `start` inactive before the lines go.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use fpga_fabric::gpio::SignalPort;
//! # use fpga_fabric::handshake::{HandshakeConfig, run_handshake};
//! # use fpga_fabric::uio::region::{AccessMode, UioDevice};
//! # use std::path::Path;
//! # async fn example() -> Result<(), fpga_fabric::error::FabricError> {
//! let config = HandshakeConfig::default();
//! let device = UioDevice::open_path(Path::new("/dev/uio3"), 0, AccessMode::ReadWrite)?;
//! let region = device.map(0x1000)?;
//! let mut port = SignalPort::open(&config.chip)?;
//! let outcome = run_handshake(&mut port, &region, &config).await?;
//! println!("{:?} after {} polls: {:?}", outcome.terminal, outcome.polls, outcome.results);
//! # Ok(())
//! # }
//! ```

use crate::config::{
    DEFAULT_DONE_LINE, DEFAULT_ERROR_LINE, DEFAULT_GPIO_CHIP, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_RESET_LINE, DEFAULT_RESULT_WORDS, DEFAULT_SETTLE_MS,
    DEFAULT_START_LINE,
};
use crate::error::FabricError;
use crate::gpio::{ActiveState, SignalLine, SignalPort};
use crate::uio::region::MappedRegion;
use log::{debug, info, warn};
use std::fmt;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;

pub static START_LABEL: &str = "fft_start";
pub static DONE_LABEL: &str = "fft_done";
pub static ERROR_LABEL: &str = "axi_error";
pub static RESET_LABEL: &str = "mss_reset";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    pub chip: PathBuf,
    pub start_line: u32,
    pub done_line: u32,
    pub error_line: Option<u32>,
    pub reset_line: Option<u32>,
    /// Applied to every line of the handshake.
    pub active_state: ActiveState,
    /// How long reset is held active before it is cleared.
    pub settle_delay: Duration,
    pub poll_interval: Duration,
    /// Poll cycles before giving up. `None` polls until `done` or `error`.
    pub max_attempts: Option<NonZeroU32>,
    /// Words read from the start of the region once polling ends.
    pub result_words: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        HandshakeConfig {
            chip: PathBuf::from(DEFAULT_GPIO_CHIP),
            start_line: DEFAULT_START_LINE,
            done_line: DEFAULT_DONE_LINE,
            error_line: Some(DEFAULT_ERROR_LINE),
            reset_line: Some(DEFAULT_RESET_LINE),
            active_state: ActiveState::ActiveHigh,
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_attempts: NonZeroU32::new(DEFAULT_MAX_ATTEMPTS),
            result_words: DEFAULT_RESULT_WORDS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    ResetAsserted,
    ResetCleared,
    StartAsserted,
    Polling,
    Done,
    Error,
    Timeout,
    ResultRead,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeTerminal {
    Done,
    Error,
    Timeout,
}

impl From<HandshakeTerminal> for HandshakeState {
    fn from(value: HandshakeTerminal) -> Self {
        match value {
            HandshakeTerminal::Done => HandshakeState::Done,
            HandshakeTerminal::Error => HandshakeState::Error,
            HandshakeTerminal::Timeout => HandshakeState::Timeout,
        }
    }
}

impl fmt::Display for HandshakeTerminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeTerminal::Done => write!(f, "done"),
            HandshakeTerminal::Error => write!(f, "error"),
            HandshakeTerminal::Timeout => write!(f, "timeout"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOutcome {
    pub terminal: HandshakeTerminal,
    /// Poll cycles run, counting the one that ended polling.
    pub polls: u32,
    /// Level of the error line after polling, if the board has one.
    pub error_asserted: Option<bool>,
    pub results: Vec<u32>,
    /// Every state visited, in order.
    pub states: Vec<HandshakeState>,
}

/// Lines held for one handshake attempt. Dropping it releases all of them.
struct HandshakeLines {
    done: SignalLine,
    error: Option<SignalLine>,
    start: SignalLine,
    reset: Option<SignalLine>,
}

impl HandshakeLines {
    fn request(port: &mut SignalPort, config: &HandshakeConfig) -> Result<Self, FabricError> {
        let active = config.active_state;
        let done = port.request_input(config.done_line, DONE_LABEL, active)?;
        let error = config
            .error_line
            .map(|line| port.request_input(line, ERROR_LABEL, active))
            .transpose()?;
        let start = port.request_output(config.start_line, START_LABEL, active)?;
        let reset = config
            .reset_line
            .map(|line| port.request_output(line, RESET_LABEL, active))
            .transpose()?;

        Ok(HandshakeLines {
            done,
            error,
            start,
            reset,
        })
    }

    /// Drive `start` inactive after a failure, logging instead of failing again.
    fn abandon(&self) {
        if let Err(e) = self.start.set_value(0) {
            warn!("could not deassert {START_LABEL} after a failed handshake: {e}");
        }
    }

    fn release(self) {
        let HandshakeLines {
            done,
            error,
            start,
            reset,
        } = self;
        done.release();
        start.release();
        if let Some(error) = error {
            error.release();
        }
        if let Some(reset) = reset {
            reset.release();
        }
    }
}

struct StateLog(Vec<HandshakeState>);

impl StateLog {
    fn enter(&mut self, state: HandshakeState) {
        debug!("handshake state: {state:?}");
        self.0.push(state);
    }
}

async fn poll(
    lines: &HandshakeLines,
    config: &HandshakeConfig,
) -> Result<(HandshakeTerminal, u32), FabricError> {
    let mut polls = 0;
    loop {
        polls += 1;
        if lines.done.is_active()? {
            return Ok((HandshakeTerminal::Done, polls));
        }
        if let Some(error) = &lines.error {
            if error.is_active()? {
                return Ok((HandshakeTerminal::Error, polls));
            }
        }
        if config.max_attempts.is_some_and(|max| polls >= max.get()) {
            return Ok((HandshakeTerminal::Timeout, polls));
        }
        sleep(config.poll_interval).await;
    }
}

/// Run one start/done exchange and read the accelerator's output.
///
/// # Arguments
///
/// * `port` - Chip the handshake lines are requested from
/// * `region` - Mapped region the accelerator writes its results to
/// * `config` - Line offsets, timing and retry policy
///
/// # Returns: `Result<HandshakeOutcome, FabricError>`
/// * `Ok(HandshakeOutcome)` - Polling ended in `Done`, `Error` or `Timeout` and the result
///   words were read
/// * `Err(FabricError::LineUnavailable)` - A line could not be requested; lines requested
///   before it have been released
/// * `Err(FabricError::LineIo)` - Reading or driving a line failed; `start` has been driven
///   inactive where possible
/// * `Err(FabricError::OutOfRange)` - `result_words` exceeds the region
pub async fn run_handshake(
    port: &mut SignalPort,
    region: &MappedRegion<'_>,
    config: &HandshakeConfig,
) -> Result<HandshakeOutcome, FabricError> {
    if config.result_words > region.words() {
        return Err(FabricError::OutOfRange {
            index: config.result_words - 1,
            words: region.words(),
        });
    }

    let mut states = StateLog(Vec::new());
    states.enter(HandshakeState::Idle);
    let lines = HandshakeLines::request(port, config)?;

    info!("Signaling AXI master to write");
    if let Some(reset) = &lines.reset {
        reset.set_value(1)?;
        states.enter(HandshakeState::ResetAsserted);
        sleep(config.settle_delay).await;
        reset.set_value(0)?;
        states.enter(HandshakeState::ResetCleared);
    }
    if let Err(e) = lines.start.set_value(1) {
        lines.abandon();
        return Err(e);
    }
    states.enter(HandshakeState::StartAsserted);

    states.enter(HandshakeState::Polling);
    let (terminal, polls) = match poll(&lines, config).await {
        Ok(ended) => ended,
        Err(e) => {
            lines.abandon();
            return Err(e);
        }
    };
    states.enter(terminal.into());
    lines.start.set_value(0)?;
    match terminal {
        HandshakeTerminal::Done => info!("{DONE_LABEL} read active after {polls} polls"),
        HandshakeTerminal::Error => warn!("{ERROR_LABEL} read active after {polls} polls"),
        HandshakeTerminal::Timeout => {
            warn!("{DONE_LABEL} still inactive after {polls} polls, reading region anyway")
        }
    }

    let error_asserted = match &lines.error {
        Some(error) => {
            let asserted = error.is_active()?;
            info!("{ERROR_LABEL} after loop: {}", u8::from(asserted));
            Some(asserted)
        }
        None => None,
    };

    region.fence();
    let results = region.read_words(config.result_words)?;
    if !results.is_empty() {
        info!("first {} words of region: {results:?}", results.len());
    }
    states.enter(HandshakeState::ResultRead);

    lines.release();
    states.enter(HandshakeState::Released);

    Ok(HandshakeOutcome {
        terminal,
        polls,
        error_asserted,
        results,
        states: states.0,
    })
}
