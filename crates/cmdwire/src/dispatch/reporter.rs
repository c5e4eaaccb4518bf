//! Structured reporting for connection lifecycle events.

use std::sync::Arc;

use crate::command::CommandName;
use crate::framing::FrameError;

use super::DISPATCH_TARGET;
use super::connection::ConnectionOutcome;
use super::errors::HandlerError;

/// Observer notified as connections move through the dispatcher.
pub trait DispatchReporter: Send + Sync {
    /// A connection was accepted and is about to be served.
    fn connection_accepted(&self, peer: &str);

    /// A command line was read.
    fn command_received(&self, peer: &str, command: &CommandName);

    /// Reading the next command line failed.
    fn command_read_failed(&self, peer: &str, error: &FrameError);

    /// No handler is registered for the command.
    fn unknown_command(&self, peer: &str, command: &CommandName);

    /// A handler returned an error.
    fn handler_failed(&self, peer: &str, command: &CommandName, error: &HandlerError);

    /// A handler panicked.
    fn handler_panicked(&self, peer: &str, command: &CommandName, message: &str);

    /// The connection was closed.
    fn connection_closed(&self, peer: &str, outcome: ConnectionOutcome, commands: usize);
}

impl<T> DispatchReporter for Arc<T>
where
    T: DispatchReporter + ?Sized,
{
    fn connection_accepted(&self, peer: &str) {
        (**self).connection_accepted(peer);
    }

    fn command_received(&self, peer: &str, command: &CommandName) {
        (**self).command_received(peer, command);
    }

    fn command_read_failed(&self, peer: &str, error: &FrameError) {
        (**self).command_read_failed(peer, error);
    }

    fn unknown_command(&self, peer: &str, command: &CommandName) {
        (**self).unknown_command(peer, command);
    }

    fn handler_failed(&self, peer: &str, command: &CommandName, error: &HandlerError) {
        (**self).handler_failed(peer, command, error);
    }

    fn handler_panicked(&self, peer: &str, command: &CommandName, message: &str) {
        (**self).handler_panicked(peer, command, message);
    }

    fn connection_closed(&self, peer: &str, outcome: ConnectionOutcome, commands: usize) {
        (**self).connection_closed(peer, outcome, commands);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredDispatchReporter;

impl StructuredDispatchReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DispatchReporter for StructuredDispatchReporter {
    fn connection_accepted(&self, peer: &str) {
        tracing::debug!(
            target: DISPATCH_TARGET,
            event = "connection_accepted",
            peer,
            "accepted connection"
        );
    }

    fn command_received(&self, peer: &str, command: &CommandName) {
        tracing::debug!(
            target: DISPATCH_TARGET,
            event = "command_received",
            peer,
            command = %command,
            "dispatching command"
        );
    }

    fn command_read_failed(&self, peer: &str, error: &FrameError) {
        tracing::warn!(
            target: DISPATCH_TARGET,
            event = "command_read_failed",
            peer,
            error = %error,
            "failed to read command"
        );
    }

    fn unknown_command(&self, peer: &str, command: &CommandName) {
        tracing::warn!(
            target: DISPATCH_TARGET,
            event = "unknown_command",
            peer,
            command = %command,
            "no handler registered; closing connection"
        );
    }

    fn handler_failed(&self, peer: &str, command: &CommandName, error: &HandlerError) {
        tracing::warn!(
            target: DISPATCH_TARGET,
            event = "handler_failed",
            peer,
            command = %command,
            error = %error,
            "command handler failed"
        );
    }

    fn handler_panicked(&self, peer: &str, command: &CommandName, message: &str) {
        tracing::error!(
            target: DISPATCH_TARGET,
            event = "handler_panicked",
            peer,
            command = %command,
            panic = message,
            "command handler panicked"
        );
    }

    fn connection_closed(&self, peer: &str, outcome: ConnectionOutcome, commands: usize) {
        tracing::debug!(
            target: DISPATCH_TARGET,
            event = "connection_closed",
            peer,
            outcome = %outcome,
            commands,
            "connection closed"
        );
    }
}
