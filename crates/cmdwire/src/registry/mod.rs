//! Command-name to handler table.
//!
//! The registry is filled in before the endpoint starts listening and is
//! read-only afterwards, so connection threads share it behind an `Arc`
//! without locking.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::command::{CommandName, CommandNameError};
use crate::dispatch::{Exchange, HandlerError};


/// Serves one command on a connection.
///
/// A handler runs synchronously on the connection's thread with exclusive use
/// of the framed stream. It reads whatever payload its command carries,
/// stages any reply and flushes before returning.
pub trait Handler: Send + Sync {
    /// Consumes the payload of one command and writes any reply.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the payload cannot be read or the reply
    /// cannot be written. The connection is closed afterwards.
    fn handle(&self, exchange: &mut Exchange<'_>) -> Result<(), HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&mut Exchange<'_>) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, exchange: &mut Exchange<'_>) -> Result<(), HandlerError> {
        self(exchange)
    }
}

/// Errors raised by [`CommandRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The name cannot appear on the wire as a command line.
    #[error("invalid command name {name:?}: {source}")]
    InvalidName {
        /// Rejected name.
        name: String,
        /// Validation failure.
        #[source]
        source: CommandNameError,
    },
    /// A handler is already registered under the name.
    #[error("command {name} is already registered")]
    DuplicateCommand {
        /// Conflicting name.
        name: CommandName,
    },
    /// No handler is registered under the name.
    #[error("unknown command {name:?}")]
    NotFound {
        /// Requested name.
        name: String,
    },
}

/// Table of command handlers keyed by name.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: HashMap<CommandName, Arc<dyn Handler>>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `handler` with `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] when `name` is not a valid
    /// command name and [`RegistryError::DuplicateCommand`] when the name is
    /// already taken. The existing handler is kept in that case.
    pub fn register<H>(&mut self, name: &str, handler: H) -> Result<(), RegistryError>
    where
        H: Handler + 'static,
    {
        let command = CommandName::new(name).map_err(|source| RegistryError::InvalidName {
            name: name.to_owned(),
            source,
        })?;
        if self.handlers.contains_key(&command) {
            return Err(RegistryError::DuplicateCommand { name: command });
        }
        self.handlers.insert(command, Arc::new(handler));
        Ok(())
    }

    /// Finds the handler registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unregistered names.
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Handler>, RegistryError> {
        self.handlers
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_owned(),
            })
    }

    /// Returns `true` when a handler is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Number of registered commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered names in ascending order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(CommandName::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}
