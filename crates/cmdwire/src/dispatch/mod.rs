//! Command dispatch over accepted connections.
//!
//! Each accepted connection is served on its own thread. The dispatcher reads
//! a command line, looks the name up in the [`crate::registry::CommandRegistry`]
//! and hands the framed stream to the handler through an [`Exchange`]. Unknown
//! commands are closed without a reply.
//!
//! ```text
//! <command-name> '\n'
//! <payload>
//! ```

mod connection;
mod endpoint;
mod errors;
mod exchange;
mod reporter;

pub use self::connection::{ConnectionOutcome, ConnectionState, DispatchSettings};
pub use self::endpoint::{Endpoint, EndpointHandle};
pub use self::errors::HandlerError;
pub use self::exchange::Exchange;
pub use self::reporter::{DispatchReporter, StructuredDispatchReporter};

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
