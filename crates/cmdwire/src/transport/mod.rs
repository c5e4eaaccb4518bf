//! Socket transport for the dispatcher and the client driver.
//!
//! The listener binds a configured [`cmdwire_config::SocketEndpoint`] and
//! hands every accepted stream to a [`ConnectionHandler`] on its own thread.
//! The client side dials the same endpoint kinds through [`connect`].

mod connect;
mod errors;
mod listener;
#[cfg(test)]
mod listener_tests;
mod stream;
#[cfg(test)]
mod test_utils;

pub use self::connect::{ConnectError, connect};
pub use self::errors::ListenerError;
pub use self::listener::{ListenerHandle, SocketListener};
pub use self::stream::{ConnectionHandler, ConnectionStream};
#[cfg(test)]
pub(crate) use self::test_utils::CountingHandler;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
