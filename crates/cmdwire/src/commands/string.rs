//! `STRING`: one text line in, one acknowledgement line out.

use tracing::info;

use crate::client::{Client, ClientError};
use crate::dispatch::{Exchange, HandlerError};

use super::COMMANDS_TARGET;

/// Command name for text lines.
pub const STRING_COMMAND: &str = "STRING";

/// Line the server sends back for every `STRING` command.
pub const STRING_REPLY: &str = "Thank you.";

/// Reads one line, logs it and acknowledges it.
///
/// # Errors
///
/// Returns [`HandlerError`] when the line cannot be read or the reply cannot
/// be flushed.
pub fn handle_string(exchange: &mut Exchange<'_>) -> Result<(), HandlerError> {
    let text = exchange.read_line()?;
    info!(
        target: COMMANDS_TARGET,
        peer = exchange.peer(),
        command = %exchange.command(),
        text = %text,
        "received string"
    );
    exchange.write_line(STRING_REPLY);
    exchange.flush()
}

/// Sends `text` as a `STRING` command and returns the server's reply.
///
/// # Errors
///
/// Returns [`ClientError`] when sending fails or no reply arrives.
pub fn send_string(client: &mut Client, text: &str) -> Result<String, ClientError> {
    client.request_line(STRING_COMMAND, text)
}
