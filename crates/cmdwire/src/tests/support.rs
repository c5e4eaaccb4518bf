//! Test double for [`DispatchReporter`] that records lifecycle events.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use crate::command::CommandName;
use crate::dispatch::{ConnectionOutcome, DispatchReporter, HandlerError};
use crate::framing::FrameError;

/// Lifecycle events observed during a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DispatchEvent {
    Accepted,
    Received(String),
    ReadFailed(String),
    Unknown(String),
    Failed { command: String, message: String },
    Panicked { command: String, message: String },
    Closed { outcome: ConnectionOutcome, commands: usize },
}

/// Records dispatch events for assertions.
#[derive(Debug, Default)]
pub(crate) struct RecordingDispatchReporter {
    events: Mutex<Vec<DispatchEvent>>,
}

impl RecordingDispatchReporter {
    pub(crate) fn events(&self) -> Vec<DispatchEvent> {
        self.events
            .lock()
            .expect("dispatch reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: DispatchEvent) {
        self.events
            .lock()
            .expect("dispatch reporter mutex poisoned")
            .push(event);
    }

    /// Closed connections seen so far.
    pub(crate) fn closed(&self) -> Vec<(ConnectionOutcome, usize)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DispatchEvent::Closed { outcome, commands } => Some((outcome, commands)),
                _ => None,
            })
            .collect()
    }

    /// Waits until `expected` connections have been closed.
    pub(crate) fn wait_for_closed(&self, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if self.closed().len() >= expected {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }
}

impl DispatchReporter for RecordingDispatchReporter {
    fn connection_accepted(&self, _peer: &str) {
        self.record(DispatchEvent::Accepted);
    }

    fn command_received(&self, _peer: &str, command: &CommandName) {
        self.record(DispatchEvent::Received(command.to_string()));
    }

    fn command_read_failed(&self, _peer: &str, error: &FrameError) {
        self.record(DispatchEvent::ReadFailed(error.to_string()));
    }

    fn unknown_command(&self, _peer: &str, command: &CommandName) {
        self.record(DispatchEvent::Unknown(command.to_string()));
    }

    fn handler_failed(&self, _peer: &str, command: &CommandName, error: &HandlerError) {
        self.record(DispatchEvent::Failed {
            command: command.to_string(),
            message: error.to_string(),
        });
    }

    fn handler_panicked(&self, _peer: &str, command: &CommandName, message: &str) {
        self.record(DispatchEvent::Panicked {
            command: command.to_string(),
            message: message.to_owned(),
        });
    }

    fn connection_closed(&self, _peer: &str, outcome: ConnectionOutcome, commands: usize) {
        self.record(DispatchEvent::Closed { outcome, commands });
    }
}
