//! Shared configuration for the cmdwire server and client.
//!
//! [`Config`] is loaded through `ortho_config`, which layers command-line
//! flags over `CMDWIRE_*` environment variables over an optional TOML file
//! over the built-in defaults in [`defaults`]. Both the dispatcher and the
//! client driver read their limits from the same structure so the two ends of
//! a connection agree on framing bounds.

mod defaults;
mod logging;
mod socket;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_IO_TIMEOUT_MS, DEFAULT_LOG_FILTER,
    DEFAULT_MAX_COMMAND_BYTES, DEFAULT_MAX_COMMANDS_PER_CONNECTION, DEFAULT_MAX_FIELD_BYTES,
    DEFAULT_MAX_LINE_BYTES, DEFAULT_MAX_RECORD_DEPTH, DEFAULT_TCP_PORT, default_listen_endpoint,
    default_log_filter, default_log_filter_string, default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Runtime configuration shared by the server and the client driver.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "CMDWIRE")]
#[serde(default)]
pub struct Config {
    /// Endpoint the server binds when running in listen mode.
    #[ortho_config(default = default_listen_endpoint())]
    pub listen: SocketEndpoint,
    /// Peer to contact. When present the binary runs as a client.
    pub connect: Option<SocketEndpoint>,
    /// `tracing` filter expression, for example `info` or `cmdwire=debug`.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for log records.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Read and write deadline applied to every connection, in milliseconds.
    /// Zero disables the deadline.
    #[ortho_config(default = DEFAULT_IO_TIMEOUT_MS)]
    pub io_timeout_ms: u64,
    /// Upper bound for establishing an outbound connection, in milliseconds.
    #[ortho_config(default = DEFAULT_CONNECT_TIMEOUT_MS)]
    pub connect_timeout_ms: u64,
    /// Longest accepted command name, excluding the newline.
    #[ortho_config(default = DEFAULT_MAX_COMMAND_BYTES)]
    pub max_command_bytes: usize,
    /// Longest accepted text line for line-oriented payloads.
    #[ortho_config(default = DEFAULT_MAX_LINE_BYTES)]
    pub max_line_bytes: usize,
    /// Largest string, byte or map field the record decoder accepts.
    #[ortho_config(default = DEFAULT_MAX_FIELD_BYTES)]
    pub max_field_bytes: usize,
    /// Deepest record nesting the codec encodes or decodes.
    #[ortho_config(default = DEFAULT_MAX_RECORD_DEPTH)]
    pub max_record_depth: usize,
    /// Commands served on one connection before it is closed. Zero means the
    /// connection stays open until the peer closes it.
    #[ortho_config(default = DEFAULT_MAX_COMMANDS_PER_CONNECTION)]
    pub max_commands_per_connection: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen_endpoint(),
            connect: None,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            io_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            max_command_bytes: DEFAULT_MAX_COMMAND_BYTES,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            max_field_bytes: DEFAULT_MAX_FIELD_BYTES,
            max_record_depth: DEFAULT_MAX_RECORD_DEPTH,
            max_commands_per_connection: DEFAULT_MAX_COMMANDS_PER_CONNECTION,
        }
    }
}

impl Config {
    /// Endpoint used in listen mode.
    #[must_use]
    pub const fn listen(&self) -> &SocketEndpoint {
        &self.listen
    }

    /// Peer endpoint selecting client mode, if any.
    #[must_use]
    pub const fn connect(&self) -> Option<&SocketEndpoint> {
        self.connect.as_ref()
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Per-operation I/O deadline, or `None` when disabled.
    #[must_use]
    pub fn io_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.io_timeout_ms)
    }

    /// Deadline for dialling a peer. A zero setting falls back to the default.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        non_zero_millis(self.connect_timeout_ms)
            .unwrap_or(Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS))
    }

    /// Command limit per connection, or `None` for unlimited.
    #[must_use]
    pub const fn commands_per_connection(&self) -> Option<usize> {
        match self.max_commands_per_connection {
            0 => None,
            limit => Some(limit),
        }
    }
}

fn non_zero_millis(millis: u64) -> Option<Duration> {
    (millis > 0).then(|| Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_listen_on_all_interfaces() {
        let config = Config::default();
        assert_eq!(
            config.listen(),
            &SocketEndpoint::tcp("0.0.0.0", DEFAULT_TCP_PORT)
        );
        assert!(config.connect().is_none());
        assert_eq!(config.commands_per_connection(), Some(1));
    }

    #[rstest]
    #[case(0, None)]
    #[case(250, Some(Duration::from_millis(250)))]
    fn io_timeout_treats_zero_as_disabled(#[case] millis: u64, #[case] expected: Option<Duration>) {
        let config = Config {
            io_timeout_ms: millis,
            ..Config::default()
        };
        assert_eq!(config.io_timeout(), expected);
    }

    #[test]
    fn zero_connect_timeout_falls_back_to_default() {
        let config = Config {
            connect_timeout_ms: 0,
            ..Config::default()
        };
        assert_eq!(
            config.connect_timeout(),
            Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS)
        );
    }

    #[test]
    fn zero_command_limit_means_unlimited() {
        let config = Config {
            max_commands_per_connection: 0,
            ..Config::default()
        };
        assert_eq!(config.commands_per_connection(), None);
    }
}
