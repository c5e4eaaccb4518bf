use crate::socket::SocketEndpoint;

/// Port the server listens on unless configured otherwise.
pub const DEFAULT_TCP_PORT: u16 = 61000;

/// Default log filter expression used by the binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Per-connection I/O deadline. Disabled by default.
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 0;

/// Deadline for dialling a peer.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Command names are short tokens; anything longer is a framing fault.
pub const DEFAULT_MAX_COMMAND_BYTES: usize = 64;

/// Largest text line accepted for line-oriented payloads.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Largest single field accepted by the record decoder.
pub const DEFAULT_MAX_FIELD_BYTES: usize = 16 * 1024 * 1024;

/// Deepest record nesting accepted by the codec.
pub const DEFAULT_MAX_RECORD_DEPTH: usize = 64;

/// One command per connection, then close.
pub const DEFAULT_MAX_COMMANDS_PER_CONNECTION: usize = 1;

/// Default log filter expression used by the binary.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value for the configuration defaults layer.
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binary.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Compact
}

/// Listens on every local interface on [`DEFAULT_TCP_PORT`].
#[must_use]
pub fn default_listen_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp("0.0.0.0", DEFAULT_TCP_PORT)
}
