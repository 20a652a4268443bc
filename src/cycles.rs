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

//! Cycle counter sampling for relative timing of bulk accesses.
//!
//! Samples are 32 bits wide and wrap, so only differences between two samples are
//! meaningful. [`CycleCount::elapsed_since`] does the subtraction modulo 2^32, which stays
//! correct across a single wraparound.
//!
//! The hardware source reads the per-core cycle counter:
//! - riscv64: `rdcycle`
//! - x86_64: the time stamp counter
//! - aarch64: the virtual counter `cntvct_el0`
//!
//! Kernels may refuse user-space access to `rdcycle` (see `perf_user_access`); select
//! [`CycleSource::Monotonic`] on those systems. Other architectures always use the
//! monotonic source.

use crate::error::FabricError;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CycleCount(pub u32);

impl CycleCount {
    /// Cycles elapsed from `earlier` to `self`, modulo 2^32.
    pub fn elapsed_since(self, earlier: CycleCount) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }
}

impl fmt::Display for CycleCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleSource {
    /// The architecture's cycle counter register.
    Hardware,
    /// Nanoseconds since the first sample, truncated to 32 bits.
    Monotonic,
}

impl FromStr for CycleSource {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hardware" => Ok(CycleSource::Hardware),
            "monotonic" => Ok(CycleSource::Monotonic),
            other => Err(FabricError::Argument(format!(
                "Unknown cycle source {other:?}, expected \"hardware\" or \"monotonic\""
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CycleTimer {
    source: CycleSource,
}

impl CycleTimer {
    pub fn new(source: CycleSource) -> CycleTimer {
        CycleTimer { source }
    }

    pub fn source(&self) -> CycleSource {
        self.source
    }

    /// Take one sample. Never fails.
    #[inline]
    pub fn sample(&self) -> CycleCount {
        match self.source {
            CycleSource::Hardware => CycleCount(hardware_cycles()),
            CycleSource::Monotonic => CycleCount(monotonic_cycles()),
        }
    }
}

#[cfg(target_arch = "riscv64")]
#[inline]
fn hardware_cycles() -> u32 {
    let val: u64;
    // SAFETY: rdcycle only reads a CSR.
    unsafe {
        core::arch::asm!("rdcycle {0}", out(reg) val, options(nomem, nostack));
    }
    val as u32
}

#[cfg(target_arch = "x86_64")]
#[inline]
fn hardware_cycles() -> u32 {
    // SAFETY: rdtsc is available on every x86_64 CPU and has no side effects.
    unsafe { core::arch::x86_64::_rdtsc() as u32 }
}

#[cfg(target_arch = "aarch64")]
#[inline]
fn hardware_cycles() -> u32 {
    let val: u64;
    // SAFETY: cntvct_el0 is readable from EL0 on Linux.
    unsafe {
        core::arch::asm!("mrs {0}, cntvct_el0", out(reg) val, options(nomem, nostack));
    }
    val as u32
}

#[cfg(not(any(
    target_arch = "riscv64",
    target_arch = "x86_64",
    target_arch = "aarch64"
)))]
#[inline]
fn hardware_cycles() -> u32 {
    monotonic_cycles()
}

fn monotonic_cycles() -> u32 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::no_wrap(100, 350, 250)]
    #[case::equal(7, 7, 0)]
    #[case::wraps_once(u32::MAX - 9, 20, 30)]
    #[case::end_at_zero(u32::MAX, 0, 1)]
    fn test_elapsed_is_modular(#[case] begin: u32, #[case] end: u32, #[case] expected: u32) {
        assert_eq!(CycleCount(end).elapsed_since(CycleCount(begin)), expected);
    }

    #[rstest]
    #[case::hardware("hardware", CycleSource::Hardware)]
    #[case::monotonic("monotonic", CycleSource::Monotonic)]
    fn test_cycle_source_parses(#[case] input: &str, #[case] expected: CycleSource) {
        assert_eq!(input.parse::<CycleSource>().unwrap(), expected);
    }

    #[test]
    fn test_monotonic_samples_do_not_go_backwards() {
        let timer = CycleTimer::new(CycleSource::Monotonic);
        let begin = timer.sample();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let end = timer.sample();
        // Far below the ~4.29 s wrap period of a nanosecond counter.
        assert!(end.elapsed_since(begin) >= 2_000_000);
    }
}
