//! `GOB`: one structured record in, no reply.

use cmdwire_codec::Record;
use tracing::info;

use crate::client::{Client, ClientError};
use crate::dispatch::{Exchange, HandlerError};

use super::COMMANDS_TARGET;

/// Command name for structured records.
pub const GOB_COMMAND: &str = "GOB";

/// Decodes one record and logs it.
///
/// # Errors
///
/// Returns [`HandlerError::Decode`] for malformed payloads.
pub fn handle_gob(exchange: &mut Exchange<'_>) -> Result<(), HandlerError> {
    let record = exchange.read_record()?;
    info!(
        target: COMMANDS_TARGET,
        peer = exchange.peer(),
        command = %exchange.command(),
        depth = record.depth(),
        record = ?record,
        "received record"
    );
    Ok(())
}

/// Sends `record` as a `GOB` command.
///
/// # Errors
///
/// Returns [`ClientError`] when the record cannot be encoded or sent.
pub fn send_gob(client: &mut Client, record: &Record) -> Result<(), ClientError> {
    client.send_record(GOB_COMMAND, record)
}
