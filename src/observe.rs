//! Trace and message-dump hooks.
//!
//! The adapter only ever writes to these: per-event job-tag trace signals and
//! a copy of every envelope crossing its boundary.

use std::fmt;

use crate::ptree::AttrTree;

/// Which way an envelope crossed the adapter boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "in"),
            Direction::Outbound => write!(f, "out"),
        }
    }
}

/// Sink for trace signals and message dumps.
pub trait Observer {
    /// A trace signal changed value.
    fn trace(&mut self, signal: &str, value: u64);

    /// An envelope crossed the adapter on `port`.
    fn dump(&mut self, direction: Direction, port: &str, envelope: &AttrTree);
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn trace(&mut self, _signal: &str, _value: u64) {}

    fn dump(&mut self, _direction: Direction, _port: &str, _envelope: &AttrTree) {}
}

/// Forwards to the `log` facade at trace level.
#[derive(Debug, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn trace(&mut self, signal: &str, value: u64) {
        log::trace!("{} = 0x{:016x}", signal, value);
    }

    fn dump(&mut self, direction: Direction, port: &str, envelope: &AttrTree) {
        log::trace!("[{} {}]\n{}", direction, port, envelope);
    }
}

/// One recorded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpRecord {
    pub direction: Direction,
    pub port: String,
    pub envelope: AttrTree,
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct Recorder {
    pub traces: Vec<(String, u64)>,
    pub dumps: Vec<DumpRecord>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded envelopes that went in `direction`.
    pub fn dumps_in(&self, direction: Direction) -> impl Iterator<Item = &DumpRecord> {
        self.dumps.iter().filter(move |d| d.direction == direction)
    }

    /// Last recorded value of `signal`.
    pub fn last_trace(&self, signal: &str) -> Option<u64> {
        self.traces
            .iter()
            .rev()
            .find(|(name, _)| name == signal)
            .map(|(_, value)| *value)
    }
}

impl Observer for Recorder {
    fn trace(&mut self, signal: &str, value: u64) {
        self.traces.push((signal.to_string(), value));
    }

    fn dump(&mut self, direction: Direction, port: &str, envelope: &AttrTree) {
        self.dumps.push(DumpRecord {
            direction,
            port: port.to_string(),
            envelope: envelope.clone(),
        });
    }
}
