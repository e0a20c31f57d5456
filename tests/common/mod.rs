//! Scripted device channel for driving the programmer without hardware.
#![allow(dead_code)]

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::blocking::delay::DelayMs;

use rom_uart_loader::{checksum, Channel, Options, Programmer};

#[derive(Clone, PartialEq, Debug)]
pub struct Fault;

/// Response to a single channel read call
#[derive(Clone, PartialEq, Debug)]
pub enum Step {
    /// Bytes available to this read, leftovers roll into the next read
    Data(Vec<u8>),
    /// The read timer expires with no data
    Timeout,
    /// The transport fails
    Fail,
}

#[derive(Default)]
pub struct ScriptedChannel {
    steps: VecDeque<Step>,
    pub writes: Vec<Vec<u8>>,
    pub read_calls: usize,
    closed: Rc<Cell<bool>>,
}

impl ScriptedChannel {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            ..Default::default()
        }
    }

    /// All bytes written by the host, in order
    pub fn sent(&self) -> Vec<u8> {
        self.writes.concat()
    }

    /// Shared flag set once the channel has been closed, outliving the programmer
    pub fn closed_flag(&self) -> Rc<Cell<bool>> {
        self.closed.clone()
    }

    pub fn pending(&self) -> usize {
        self.steps.len()
    }
}

impl Channel for ScriptedChannel {
    type Error = Fault;

    fn write(&mut self, data: &[u8]) -> Result<(), Fault> {
        self.writes.push(data.to_vec());
        Ok(())
    }

    fn read(&mut self, buff: &mut [u8]) -> Result<usize, Fault> {
        self.read_calls += 1;

        match self.steps.pop_front() {
            None | Some(Step::Timeout) => Ok(0),
            Some(Step::Fail) => Err(Fault),
            Some(Step::Data(mut data)) => {
                let n = data.len().min(buff.len());
                buff[..n].copy_from_slice(&data[..n]);

                if n < data.len() {
                    self.steps.push_front(Step::Data(data.split_off(n)));
                }

                Ok(n)
            }
        }
    }

    fn close(&mut self) -> Result<(), Fault> {
        self.closed.set(true);
        Ok(())
    }
}

/// Delay that records requested periods instead of sleeping
#[derive(Default)]
pub struct NoDelay {
    pub calls: Vec<u32>,
}

impl DelayMs<u32> for NoDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.calls.push(ms);
    }
}

pub type TestProgrammer = Programmer<ScriptedChannel, NoDelay>;

pub fn programmer(steps: Vec<Step>) -> TestProgrammer {
    programmer_with(steps, Options::default())
}

pub fn programmer_with(steps: Vec<Step>, options: Options) -> TestProgrammer {
    Programmer::new(ScriptedChannel::new(steps), NoDelay::default(), options)
}

pub fn ok() -> Step {
    Step::Data(vec![0x01])
}

/// Both confirmation rounds for a correctly received and programmed chunk
pub fn chunk_acks(chunk: &[u8]) -> Vec<Step> {
    let crc = checksum::compute(chunk);
    vec![Step::Data(vec![0x01, crc]), Step::Data(vec![0x01, crc])]
}

pub fn image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 13 + (i >> 8)) as u8).collect()
}
