//! Scripted in-memory link for tests and dry runs.

use super::{Link, LinkError, ReadMode};
use std::collections::VecDeque;

#[derive(Debug)]
struct Delivery {
    after_polls: usize,
    bytes: Vec<u8>,
}

/// In-memory link.
///
/// Bytes pushed with [`MockLink::inject`] are readable immediately. Bytes
/// pushed with [`MockLink::inject_after_polls`] only become readable once
/// [`Link::bytes_available`] has been called the given number of times,
/// which lets a test deliver a command in the middle of a reactive run.
#[derive(Debug)]
pub struct MockLink {
    input: VecDeque<u8>,
    scheduled: VecDeque<Delivery>,
    output: Vec<u8>,
    polls: usize,
    mode: ReadMode,
    mode_changes: Vec<ReadMode>,
    discards: usize,
    closed: bool,
}

impl MockLink {
    pub fn new() -> Self {
        Self {
            input: VecDeque::new(),
            scheduled: VecDeque::new(),
            output: Vec::new(),
            polls: 0,
            mode: ReadMode::Blocking,
            mode_changes: Vec::new(),
            discards: 0,
            closed: false,
        }
    }

    pub fn inject(&mut self, data: &[u8]) {
        self.input.extend(data);
    }

    /// Queue `data` for delivery once `polls` more availability checks have
    /// happened. Deliveries are kept in the order they were queued.
    pub fn inject_after_polls(&mut self, polls: usize, data: &[u8]) {
        self.scheduled.push_back(Delivery {
            after_polls: self.polls + polls,
            bytes: data.to_vec(),
        });
    }

    /// Make every further read fail as if the peer hung up.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn written(&self) -> &[u8] {
        &self.output
    }

    pub fn take_written(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.output)
    }

    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    pub fn polls(&self) -> usize {
        self.polls
    }

    pub fn mode_changes(&self) -> &[ReadMode] {
        &self.mode_changes
    }

    pub fn discards(&self) -> usize {
        self.discards
    }

    fn release_due(&mut self) {
        while let Some(delivery) = self.scheduled.front() {
            if delivery.after_polls > self.polls {
                break;
            }
            if let Some(delivery) = self.scheduled.pop_front() {
                self.input.extend(delivery.bytes);
            }
        }
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl Link for MockLink {
    fn read_byte(&mut self) -> nb::Result<u8, LinkError> {
        if self.closed {
            return Err(nb::Error::Other(LinkError::Closed));
        }
        self.input.pop_front().ok_or(nb::Error::WouldBlock)
    }

    fn bytes_available(&mut self) -> Result<usize, LinkError> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        self.polls += 1;
        self.release_due();
        Ok(self.input.len())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        self.output.extend_from_slice(data);
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), LinkError> {
        self.input.clear();
        self.discards += 1;
        Ok(())
    }

    fn set_read_mode(&mut self, mode: ReadMode) -> Result<(), LinkError> {
        self.mode = mode;
        self.mode_changes.push(mode);
        Ok(())
    }

    fn read_mode(&self) -> ReadMode {
        self.mode
    }
}
