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

#![allow(dead_code)]

use fpga_fabric::error::FabricError;
use fpga_fabric::gpio::{Direction, LineChip, LineHandle, LineRequest, SignalPort};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Requested(u32, Direction),
    Read(u32, u8),
    Set(u32, u8),
    Released(u32),
}

/// Shared between a [`ScriptedChip`] and the lines it hands out.
#[derive(Default)]
pub struct Script {
    events: RefCell<Vec<Event>>,
    levels: RefCell<HashMap<u32, VecDeque<u8>>>,
    failing: RefCell<HashSet<u32>>,
    failing_reads: RefCell<HashSet<u32>>,
}

impl Script {
    /// Levels returned by successive reads of input `offset`; `0` once exhausted.
    pub fn levels(&self, offset: u32, levels: &[u8]) {
        self.levels
            .borrow_mut()
            .insert(offset, levels.iter().copied().collect());
    }

    /// Requests for `offset` fail with `LineUnavailable`.
    pub fn fail(&self, offset: u32) {
        self.failing.borrow_mut().insert(offset);
    }

    /// Reads of input `offset` fail with `LineIo` once its scripted levels are used up.
    pub fn fail_reads(&self, offset: u32) {
        self.failing_reads.borrow_mut().insert(offset);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events.borrow().iter().filter(|e| *e == event).count()
    }

    pub fn reads_of(&self, offset: u32) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, Event::Read(o, _) if *o == offset))
            .count()
    }

    fn push(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

pub struct ScriptedChip {
    path: PathBuf,
    script: Rc<Script>,
}

struct ScriptedLine {
    offset: u32,
    direction: Direction,
    value: Cell<u8>,
    script: Rc<Script>,
}

impl LineChip for ScriptedChip {
    fn path(&self) -> &Path {
        &self.path
    }

    fn request(&mut self, request: &LineRequest<'_>) -> Result<Box<dyn LineHandle>, FabricError> {
        if self.script.failing.borrow().contains(&request.offset) {
            return Err(FabricError::LineUnavailable {
                chip: self.path.clone(),
                line: request.offset,
                label: request.label.to_string(),
                reason: "Device or resource busy".to_string(),
            });
        }
        self.script
            .push(Event::Requested(request.offset, request.direction));
        Ok(Box::new(ScriptedLine {
            offset: request.offset,
            direction: request.direction,
            value: Cell::new(0),
            script: self.script.clone(),
        }))
    }
}

impl LineHandle for ScriptedLine {
    fn get_value(&self) -> Result<u8, FabricError> {
        let value = match self.direction {
            Direction::Input => {
                let scripted = self
                    .script
                    .levels
                    .borrow_mut()
                    .get_mut(&self.offset)
                    .and_then(VecDeque::pop_front);
                match scripted {
                    Some(level) => level,
                    None if self.script.failing_reads.borrow().contains(&self.offset) => {
                        return Err(FabricError::LineIo {
                            line: self.offset,
                            label: "scripted".to_string(),
                            reason: "Input/output error".to_string(),
                        });
                    }
                    None => 0,
                }
            }
            Direction::Output => self.value.get(),
        };
        self.script.push(Event::Read(self.offset, value));
        Ok(value)
    }

    fn set_value(&self, value: u8) -> Result<(), FabricError> {
        self.value.set(value);
        self.script.push(Event::Set(self.offset, value));
        Ok(())
    }
}

impl Drop for ScriptedLine {
    fn drop(&mut self) {
        self.script.push(Event::Released(self.offset));
    }
}

pub fn scripted_port() -> (SignalPort, Rc<Script>) {
    let script = Rc::new(Script::default());
    let chip = ScriptedChip {
        path: PathBuf::from("/dev/gpiochip0"),
        script: script.clone(),
    };
    (SignalPort::with_chip(Box::new(chip)), script)
}

/// A fake `/sys/class/uio` plus `/dev` in one temporary directory.
pub struct FakeUio {
    pub root: TempDir,
}

impl FakeUio {
    pub fn new() -> FakeUio {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("sys")).unwrap();
        fs::create_dir_all(root.path().join("dev")).unwrap();
        FakeUio { root }
    }

    pub fn sysfs_dir(&self) -> PathBuf {
        self.root.path().join("sys")
    }

    pub fn dev_dir(&self) -> PathBuf {
        self.root.path().join("dev")
    }

    /// Add slot `uio<index>` with `name` and a map0 `size` literal, backed by a zeroed
    /// device file of `file_len` bytes.
    pub fn slot(&self, index: u32, name: &str, size: &str, file_len: u64) -> &FakeUio {
        let slot = self.sysfs_dir().join(format!("uio{index}"));
        fs::create_dir_all(slot.join("maps/map0")).unwrap();
        fs::write(slot.join("name"), format!("{name}\n")).unwrap();
        fs::write(slot.join("maps/map0/size"), format!("{size}\n")).unwrap();
        fs::write(slot.join("maps/map0/addr"), "0x60000000\n").unwrap();
        let dev = fs::File::create(self.dev_dir().join(format!("uio{index}"))).unwrap();
        dev.set_len(file_len).unwrap();
        self
    }
}
