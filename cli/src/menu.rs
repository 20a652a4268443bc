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

//! Interactive numbered menu over an open session.

use fpga_fabric::bench::AccessPattern;
use fpga_fabric::handshake::HandshakeOutcome;
use fpga_fabric::session::{Command, CommandReport, FabricSession};
use log::{error, info};
use std::io::{BufRead, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Benchmark,
    HandshakeThenBenchmark,
    HandshakeOnly,
    Exit,
}

impl MenuChoice {
    pub fn parse(input: &str) -> Option<MenuChoice> {
        match input.trim() {
            "1" => Some(MenuChoice::Benchmark),
            "2" => Some(MenuChoice::HandshakeThenBenchmark),
            "3" => Some(MenuChoice::HandshakeOnly),
            "4" => Some(MenuChoice::Exit),
            _ => None,
        }
    }
}

const MENU: &str = "\
Choose an option:
1) Run memory benchmark
2) Signal FFT start, wait for done, then benchmark
3) Signal FFT start and wait for done
4) Exit";

/// Prompt until a valid choice is entered. `None` at end of input.
pub fn read_choice<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
) -> std::io::Result<Option<MenuChoice>> {
    loop {
        writeln!(output, "{MENU}")?;
        write!(output, "> ")?;
        output.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        match MenuChoice::parse(&line) {
            Some(choice) => return Ok(Some(choice)),
            None => writeln!(output, "Invalid option {:?}", line.trim())?,
        }
    }
}

pub fn write_outcome<W: Write>(output: &mut W, outcome: &HandshakeOutcome) -> std::io::Result<()> {
    writeln!(
        output,
        "Handshake ended with {} after {} polls",
        outcome.terminal, outcome.polls
    )?;
    if let Some(asserted) = outcome.error_asserted {
        writeln!(output, "Error line: {}", u8::from(asserted))?;
    }
    for (i, word) in outcome.results.iter().enumerate() {
        writeln!(output, "word {i}: 0x{word:08x}")?;
    }
    Ok(())
}

pub fn write_report<W: Write>(output: &mut W, report: &CommandReport) -> std::io::Result<()> {
    match report {
        CommandReport::Benchmark(bench) => writeln!(output, "{bench}"),
        CommandReport::Fill { words } => writeln!(output, "Wrote {words} elements"),
        CommandReport::Handshake(outcome) => write_outcome(output, outcome),
        CommandReport::HandshakeThenBenchmark(outcome, bench) => {
            write_outcome(output, outcome)?;
            writeln!(output, "{bench}")
        }
    }
}

fn commands(choice: MenuChoice, stride: usize) -> Vec<Command> {
    match choice {
        MenuChoice::Benchmark => vec![
            Command::Benchmark(AccessPattern::Linear),
            Command::Benchmark(AccessPattern::Strided(stride)),
        ],
        MenuChoice::HandshakeThenBenchmark => {
            vec![Command::HandshakeThenBenchmark(AccessPattern::Linear)]
        }
        MenuChoice::HandshakeOnly => vec![Command::Handshake],
        MenuChoice::Exit => Vec::new(),
    }
}

/// Loop over the menu until exit or end of input.
///
/// Failed operations are reported and the menu is shown again. Errors that leave the
/// session unusable end the loop.
pub async fn run<R: BufRead, W: Write>(
    session: &FabricSession,
    mut input: R,
    mut output: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let stride = session.config().bench.stride;
    while let Some(choice) = read_choice(&mut input, &mut output)? {
        if choice == MenuChoice::Exit {
            break;
        }
        for command in commands(choice, stride) {
            match session.execute(command).await {
                Ok(report) => write_report(&mut output, &report)?,
                Err(e) if e.is_fatal_to_session() => return Err(e.into()),
                Err(e) => {
                    error!("{e}");
                    break;
                }
            }
        }
    }
    info!("leaving menu");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpga_fabric::handshake::{HandshakeState, HandshakeTerminal};
    use googletest::prelude::*;
    use std::io::Cursor;

    #[gtest]
    fn test_invalid_input_reprompts() {
        let mut input = Cursor::new("x\n7\n3\n");
        let mut output = Vec::new();
        let choice = read_choice(&mut input, &mut output).unwrap();
        expect_eq!(choice, Some(MenuChoice::HandshakeOnly));
        let text = String::from_utf8(output).unwrap();
        expect_eq!(text.matches("Invalid option").count(), 2);
        expect_eq!(text.matches("4) Exit").count(), 3);
    }

    #[gtest]
    fn test_end_of_input_exits() {
        let mut input = Cursor::new("");
        let mut output = Vec::new();
        expect_eq!(read_choice(&mut input, &mut output).unwrap(), None);
    }

    #[gtest]
    fn test_menu_choices_map_to_commands() {
        expect_eq!(
            commands(MenuChoice::Benchmark, 64),
            vec![
                Command::Benchmark(AccessPattern::Linear),
                Command::Benchmark(AccessPattern::Strided(64))
            ]
        );
        expect_eq!(
            commands(MenuChoice::HandshakeOnly, 64),
            vec![Command::Handshake]
        );
        expect_true!(commands(MenuChoice::Exit, 64).is_empty());
    }

    #[gtest]
    fn test_outcome_lists_result_words() {
        let outcome = HandshakeOutcome {
            terminal: HandshakeTerminal::Timeout,
            polls: 5,
            error_asserted: Some(false),
            results: vec![0xdead, 1],
            states: vec![HandshakeState::Idle],
        };
        let mut output = Vec::new();
        write_outcome(&mut output, &outcome).unwrap();
        let text = String::from_utf8(output).unwrap();
        expect_that!(text, contains_substring("timeout after 5 polls"));
        expect_that!(text, contains_substring("word 0: 0x0000dead"));
    }
}
