//! Per-connection state machine.
//!
//! ```text
//! Accepted -> ReadingCommandName -> Dispatched -> ReadingCommandName ...
//!                                             \-> Closed
//! ```
//!
//! Every failure moves straight to `Closed`. A connection guard shuts the
//! socket down exactly once whichever way the connection ends, including a
//! panicking handler.

use std::any::Any;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use cmdwire_codec::CodecLimits;
use cmdwire_config::Config;

use crate::framing::{FrameLimits, FramedStream};
use crate::registry::{CommandRegistry, Handler};
use crate::transport::{ConnectionHandler, ConnectionStream};

use super::DISPATCH_TARGET;
use super::errors::HandlerError;
use super::exchange::{CodecState, Exchange};
use super::reporter::DispatchReporter;

/// Stage a connection is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted and not yet read from.
    Accepted,
    /// Waiting for the next command line.
    ReadingCommandName,
    /// A handler owns the stream.
    Dispatched,
    /// The socket has been shut down.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Accepted => "accepted",
            Self::ReadingCommandName => "reading-command-name",
            Self::Dispatched => "dispatched",
            Self::Closed => "closed",
        })
    }
}

/// Why a connection was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// The peer closed the stream between commands.
    PeerClosed,
    /// The per-connection command limit was reached.
    LimitReached,
    /// The command line could not be read.
    ReadFailed,
    /// No handler was registered for the command.
    UnknownCommand,
    /// The handler returned an error.
    HandlerFailed,
    /// The handler panicked.
    HandlerPanicked,
}

impl ConnectionOutcome {
    /// Returns `true` for outcomes that end a connection without a fault.
    #[must_use]
    pub const fn is_orderly(self) -> bool {
        matches!(self, Self::PeerClosed | Self::LimitReached)
    }
}

impl fmt::Display for ConnectionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PeerClosed => "peer-closed",
            Self::LimitReached => "limit-reached",
            Self::ReadFailed => "read-failed",
            Self::UnknownCommand => "unknown-command",
            Self::HandlerFailed => "handler-failed",
            Self::HandlerPanicked => "handler-panicked",
        })
    }
}

/// Settings applied to every accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Bounds for command and payload lines.
    pub frame_limits: FrameLimits,
    /// Bounds for structured payloads.
    pub codec_limits: CodecLimits,
    /// Read and write deadline; `None` blocks indefinitely.
    pub io_timeout: Option<Duration>,
    /// Commands served before the connection is closed; `None` is unlimited.
    pub max_commands: Option<usize>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl DispatchSettings {
    /// Settings taken from the shared configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            frame_limits: FrameLimits::from_config(config),
            codec_limits: CodecLimits::new(config.max_record_depth, config.max_field_bytes),
            io_timeout: config.io_timeout(),
            max_commands: config.commands_per_connection(),
        }
    }
}

/// Owns a connection's stream and shuts it down when dropped.
struct ConnectionGuard {
    stream: FramedStream<ConnectionStream>,
    peer: String,
}

impl ConnectionGuard {
    const fn new(stream: FramedStream<ConnectionStream>, peer: String) -> Self {
        Self { stream, peer }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        match self.stream.get_ref().shutdown() {
            Ok(()) => trace!(
                target: DISPATCH_TARGET,
                peer = %self.peer,
                state = %ConnectionState::Closed,
                "connection state"
            ),
            Err(error) if error.kind() == io::ErrorKind::NotConnected => {}
            Err(error) => debug!(
                target: DISPATCH_TARGET,
                peer = %self.peer,
                error = %error,
                "socket shutdown failed"
            ),
        }
    }
}

/// Serves accepted connections against a command registry.
pub(crate) struct Dispatcher {
    registry: Arc<CommandRegistry>,
    settings: DispatchSettings,
    reporter: Arc<dyn DispatchReporter>,
}

impl Dispatcher {
    pub(crate) const fn new(
        registry: Arc<CommandRegistry>,
        settings: DispatchSettings,
        reporter: Arc<dyn DispatchReporter>,
    ) -> Self {
        Self {
            registry,
            settings,
            reporter,
        }
    }

    fn serve(&self, stream: ConnectionStream) {
        let peer = stream.peer_label();
        self.reporter.connection_accepted(&peer);
        if let Err(error) = stream.set_timeouts(self.settings.io_timeout) {
            warn!(
                target: DISPATCH_TARGET,
                peer = %peer,
                error = %error,
                "failed to apply connection deadlines"
            );
        }

        let (outcome, commands) = {
            let mut guard = ConnectionGuard::new(
                FramedStream::new(stream, self.settings.frame_limits),
                peer.clone(),
            );
            self.run_commands(&mut guard.stream, &peer)
        };
        self.reporter.connection_closed(&peer, outcome, commands);
    }

    fn run_commands(
        &self,
        stream: &mut FramedStream<ConnectionStream>,
        peer: &str,
    ) -> (ConnectionOutcome, usize) {
        let mut codec = CodecState::new(self.settings.codec_limits);
        let mut served = 0_usize;
        trace!(target: DISPATCH_TARGET, peer, state = %ConnectionState::Accepted, "connection state");
        loop {
            if self.settings.max_commands.is_some_and(|limit| served >= limit) {
                return (ConnectionOutcome::LimitReached, served);
            }

            trace!(
                target: DISPATCH_TARGET,
                peer,
                state = %ConnectionState::ReadingCommandName,
                "connection state"
            );
            let command = match stream.read_command() {
                Ok(command) => command,
                Err(error) if error.is_clean_close() => {
                    return (ConnectionOutcome::PeerClosed, served);
                }
                Err(error) => {
                    self.reporter.command_read_failed(peer, &error);
                    return (ConnectionOutcome::ReadFailed, served);
                }
            };
            self.reporter.command_received(peer, &command);

            let Ok(handler) = self.registry.lookup(command.as_str()) else {
                self.reporter.unknown_command(peer, &command);
                return (ConnectionOutcome::UnknownCommand, served);
            };

            trace!(
                target: DISPATCH_TARGET,
                peer,
                command = %command,
                state = %ConnectionState::Dispatched,
                "connection state"
            );
            let mut exchange = Exchange::new(stream, &mut codec, peer, &command);
            let call = AssertUnwindSafe(|| Handler::handle(handler.as_ref(), &mut exchange));
            match panic::catch_unwind(call) {
                Ok(Ok(())) => {
                    let bytes = stream.staged_len();
                    if bytes > 0 {
                        let error = HandlerError::UnflushedReply { bytes };
                        self.reporter.handler_failed(peer, &command, &error);
                        return (ConnectionOutcome::HandlerFailed, served);
                    }
                    served += 1;
                }
                Ok(Err(error)) => {
                    self.reporter.handler_failed(peer, &command, &error);
                    return (ConnectionOutcome::HandlerFailed, served);
                }
                Err(payload) => {
                    self.reporter
                        .handler_panicked(peer, &command, panic_message(payload.as_ref()));
                    return (ConnectionOutcome::HandlerPanicked, served);
                }
            }
        }
    }
}

impl ConnectionHandler for Dispatcher {
    fn handle(&self, stream: ConnectionStream) {
        self.serve(stream);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
