//! Line-framed command dispatch over stream sockets.
//!
//! A client opens a connection and writes a command name terminated by `\n`,
//! followed by a payload whose format the command defines. The server reads
//! the name, looks it up in a [`CommandRegistry`] and lets the registered
//! [`Handler`] consume the rest of the exchange on the same buffered stream.
//!
//! Two payload styles ship with the crate:
//!
//! - `STRING` carries one text line and is answered with one line.
//! - `GOB` carries one self-describing record encoded by [`cmdwire_codec`] and
//!   gets no reply.
//!
//! Each accepted connection is served on a thread of its own. Unknown
//! commands, framing faults and handler failures close that connection and
//! never take the server down; only a listener that can no longer accept ends
//! [`Endpoint::listen`].
//!
//! ```no_run
//! use cmdwire::{CommandRegistry, Endpoint, register_builtin};
//! use cmdwire_config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = CommandRegistry::new();
//! register_builtin(&mut registry)?;
//! Endpoint::bind(&Config::default(), registry)?.listen()?;
//! # Ok(())
//! # }
//! ```

mod client;
mod command;
mod commands;
mod dispatch;
mod framing;
mod registry;
mod run;
mod telemetry;
mod transport;

pub use client::{Client, ClientError, ClientOptions};
pub use command::{CommandName, CommandNameError};
pub use commands::{
    GOB_COMMAND, STRING_COMMAND, STRING_REPLY, handle_gob, handle_string, register_builtin,
    sample_record, send_gob, send_string,
};
pub use dispatch::{
    ConnectionOutcome, ConnectionState, DispatchReporter, DispatchSettings, Endpoint,
    EndpointHandle, Exchange, HandlerError, StructuredDispatchReporter,
};
pub use framing::{FrameError, FrameLimits, FramedStream};
pub use registry::{CommandRegistry, Handler, RegistryError};
pub use run::{CLIENT_GREETING, RunError, run, run_client};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};
pub use transport::{
    ConnectError, ConnectionHandler, ConnectionStream, ListenerError, ListenerHandle,
    SocketListener, connect,
};

#[cfg(test)]
mod tests;
