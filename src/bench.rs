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

//! Cycle-timed bulk access over a mapped region.
//!
//! A benchmark writes the word index into every word, fencing after each store, then reads
//! every word back and fences once more. The cycle counter is sampled before the writes,
//! between the two passes and after the final fence.

use crate::cycles::{CycleCount, CycleTimer};
use crate::error::FabricError;
use crate::uio::region::MappedRegion;
use log::{info, warn};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPattern {
    /// Words `0, 1, 2, ...`.
    Linear,
    /// Words `0, n, 2n, ...`, then `1, n + 1, ...`, until every word was visited once.
    Strided(usize),
}

impl AccessPattern {
    /// Word indices in visiting order.
    pub fn indices(self, words: usize) -> Result<Vec<usize>, FabricError> {
        match self {
            AccessPattern::Linear => Ok((0..words).collect()),
            AccessPattern::Strided(0) => Err(FabricError::Argument(
                "A stride of 0 never advances".to_string(),
            )),
            AccessPattern::Strided(stride) => Ok((0..stride.min(words))
                .flat_map(|lane| (lane..words).step_by(stride))
                .collect()),
        }
    }
}

impl fmt::Display for AccessPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessPattern::Linear => write!(f, "Linear access"),
            AccessPattern::Strided(stride) => write!(f, "Stride of {stride}"),
        }
    }
}

/// First word whose read-back value differed from what was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub index: usize,
    pub expected: u32,
    pub actual: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchReport {
    pub pattern: AccessPattern,
    pub words: usize,
    pub write_cycles: u32,
    pub read_cycles: u32,
    pub mismatches: usize,
    pub first_mismatch: Option<Mismatch>,
}

impl BenchReport {
    pub fn passed(&self) -> bool {
        self.mismatches == 0
    }
}

impl fmt::Display for BenchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.pattern)?;
        writeln!(f, "Wrote and read {} elements", self.words)?;
        writeln!(f, "{} cycles for writing", self.write_cycles)?;
        write!(f, "{} cycles for reading", self.read_cycles)?;
        if let Some(m) = self.first_mismatch {
            write!(
                f,
                "\n{} mismatches, first at word {}: expected {}, read {}",
                self.mismatches, m.index, m.expected, m.actual
            )?;
        }
        Ok(())
    }
}

/// Write the index pattern, read it back and time both passes.
///
/// # Returns: `Result<BenchReport, FabricError>`
/// * `Ok(BenchReport)` - Timings and read-back comparison
/// * `Err(FabricError::ReadOnly)` - The region is mapped read-only
/// * `Err(FabricError::Argument)` - Invalid stride
pub fn run_benchmark(
    region: &mut MappedRegion<'_>,
    timer: &CycleTimer,
    pattern: AccessPattern,
) -> Result<BenchReport, FabricError> {
    let words = region.words();
    let order = pattern.indices(words)?;
    info!("{pattern} over {words} words");

    let cyc_beg = timer.sample();
    for &i in &order {
        region.write_word(i, i as u32)?;
    }
    let cyc_mid = timer.sample();

    let mut mismatches = 0;
    let mut first_mismatch = None;
    for &i in &order {
        let actual = region.read_word(i)?;
        if actual != i as u32 {
            mismatches += 1;
            first_mismatch.get_or_insert(Mismatch {
                index: i,
                expected: i as u32,
                actual,
            });
        }
    }
    region.fence();
    let cyc_end = timer.sample();

    let report = report(pattern, words, cyc_beg, cyc_mid, cyc_end, mismatches, first_mismatch);
    if !report.passed() {
        warn!("memory test failed with {mismatches} mismatching words");
    }
    Ok(report)
}

fn report(
    pattern: AccessPattern,
    words: usize,
    cyc_beg: CycleCount,
    cyc_mid: CycleCount,
    cyc_end: CycleCount,
    mismatches: usize,
    first_mismatch: Option<Mismatch>,
) -> BenchReport {
    BenchReport {
        pattern,
        words,
        write_cycles: cyc_mid.elapsed_since(cyc_beg),
        read_cycles: cyc_end.elapsed_since(cyc_mid),
        mismatches,
        first_mismatch,
    }
}

/// Write the index pattern linearly without timing or reading back.
pub fn fill_index_pattern(region: &mut MappedRegion<'_>) -> Result<usize, FabricError> {
    let words = region.words();
    for i in 0..words {
        region.write_word(i, i as u32)?;
    }
    region.fence();
    info!("filled {words} words with their index");
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycles::CycleSource;
    use crate::uio::region::{AccessMode, UioDevice};
    use googletest::prelude::*;
    use rstest::rstest;
    use tempfile::NamedTempFile;

    fn backing_file(len: u64) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        file.as_file().set_len(len).unwrap();
        file
    }

    #[rstest]
    #[case::linear(AccessPattern::Linear, 5, vec![0, 1, 2, 3, 4])]
    #[case::stride_two(AccessPattern::Strided(2), 5, vec![0, 2, 4, 1, 3])]
    #[case::stride_wider_than_region(AccessPattern::Strided(64), 3, vec![0, 1, 2])]
    fn test_indices(
        #[case] pattern: AccessPattern,
        #[case] words: usize,
        #[case] expected: Vec<usize>,
    ) {
        assert_eq!(pattern.indices(words).unwrap(), expected);
    }

    #[rstest]
    #[case::stride_64(64)]
    #[case::stride_3(3)]
    fn test_strided_visits_every_word_once(#[case] stride: usize) {
        let mut order = AccessPattern::Strided(stride).indices(1024).unwrap();
        order.sort_unstable();
        assert_eq!(order, (0..1024).collect::<Vec<_>>());
    }

    #[gtest]
    fn test_zero_stride_is_rejected() {
        expect_that!(
            AccessPattern::Strided(0).indices(16),
            err(displays_as(contains_substring("FabricError::Argument")))
        );
    }

    #[rstest]
    #[case::linear(AccessPattern::Linear)]
    #[case::strided(AccessPattern::Strided(64))]
    fn test_benchmark_reads_back_index(#[case] pattern: AccessPattern) {
        let file = backing_file(4096);
        let device = UioDevice::open_path(file.path(), 0, AccessMode::ReadWrite).unwrap();
        let mut region = device.map(4096).unwrap();
        let timer = CycleTimer::new(CycleSource::Monotonic);
        let report = run_benchmark(&mut region, &timer, pattern).unwrap();
        assert_eq!(report.words, 1024);
        assert!(report.passed(), "{report}");
        assert_eq!(region.read_word(1023).unwrap(), 1023);
    }

    #[gtest]
    fn test_benchmark_on_read_only_region_fails() {
        let file = backing_file(4096);
        let device = UioDevice::open_path(file.path(), 0, AccessMode::ReadOnly).unwrap();
        let mut region = device.map(4096).unwrap();
        let timer = CycleTimer::new(CycleSource::Monotonic);
        expect_that!(
            run_benchmark(&mut region, &timer, AccessPattern::Linear),
            err(displays_as(contains_substring("FabricError::ReadOnly")))
        );
    }

    #[gtest]
    fn test_fill_writes_index() {
        let file = backing_file(64);
        let device = UioDevice::open_path(file.path(), 0, AccessMode::ReadWrite).unwrap();
        let mut region = device.map(64).unwrap();
        expect_eq!(fill_index_pattern(&mut region).unwrap(), 16);
        expect_eq!(region.read_words(16).unwrap(), (0..16).collect::<Vec<u32>>());
    }

    #[gtest]
    fn test_report_uses_wrapping_deltas() {
        let r = report(
            AccessPattern::Linear,
            4,
            CycleCount(u32::MAX - 1),
            CycleCount(3),
            CycleCount(10),
            1,
            Some(Mismatch {
                index: 2,
                expected: 2,
                actual: 7,
            }),
        );
        expect_eq!(r.write_cycles, 5);
        expect_eq!(r.read_cycles, 7);
        expect_false!(r.passed());
        expect_that!(r.to_string(), contains_substring("first at word 2"));
    }
}
