//! Built-in commands served by the `cmdwire` binary.
//!
//! `STRING` is a request/response command carrying one text line. `GOB`
//! carries one structured record and gets no reply.

mod record;
mod string;

use cmdwire_codec::Record;

use crate::registry::{CommandRegistry, RegistryError};

pub use self::record::{GOB_COMMAND, handle_gob, send_gob};
pub use self::string::{STRING_COMMAND, STRING_REPLY, handle_string, send_string};

const COMMANDS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::commands");

/// Installs `STRING` and `GOB` into `registry`.
///
/// # Errors
///
/// Returns [`RegistryError::DuplicateCommand`] if either name is taken.
pub fn register_builtin(registry: &mut CommandRegistry) -> Result<(), RegistryError> {
    registry.register(STRING_COMMAND, handle_string)?;
    registry.register(GOB_COMMAND, handle_gob)
}

/// The record the demo client sends with `GOB`.
#[must_use]
pub fn sample_record() -> Record {
    let child = Record::new(256, "Recursive structs? Piece of cake!")
        .with_entries([("01", 1), ("10", 2), ("11", 3)]);
    Record::new(23, "string data")
        .with_entries([("one", 1), ("two", 2), ("three", 3)])
        .with_bytes(*b"abc")
        .with_child(child)
}
