//! Validated command names.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Token selecting a handler, written on the wire as its own line.
///
/// Names are case-sensitive, non-empty, and made only of printable ASCII
/// characters other than space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandName(String);

impl CommandName {
    /// Validates and wraps a command name.
    ///
    /// # Errors
    ///
    /// Returns [`CommandNameError`] for empty names and names containing
    /// whitespace, control characters or non-ASCII bytes.
    pub fn new(raw: impl Into<String>) -> Result<Self, CommandNameError> {
        let name = raw.into();
        if name.is_empty() {
            return Err(CommandNameError::Empty);
        }
        if let Some(byte) = name.bytes().find(|byte| !byte.is_ascii_graphic()) {
            return Err(CommandNameError::ForbiddenByte { name, byte });
        }
        Ok(Self(name))
    }

    /// Name as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the name in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for an empty name, which validation never produces.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CommandName {
    type Err = CommandNameError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::new(input)
    }
}

impl TryFrom<&str> for CommandName {
    type Error = CommandNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl AsRef<str> for CommandName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CommandName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Reasons a command name is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandNameError {
    /// The name was empty after trimming.
    #[error("command name is empty")]
    Empty,
    /// The name contained whitespace, a control character or non-ASCII text.
    #[error("command name {name:?} contains forbidden byte 0x{byte:02x}")]
    ForbiddenByte {
        /// Rejected name.
        name: String,
        /// First offending byte.
        byte: u8,
    },
}
