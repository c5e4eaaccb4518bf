//! Process entry point shared by the binary and its tests.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use ortho_config::OrthoConfig;
use thiserror::Error;
use tracing::{error, info};

use cmdwire_config::{Config, SocketEndpoint};

use crate::client::{Client, ClientError, ClientOptions};
use crate::commands::{register_builtin, sample_record, send_gob, send_string};
use crate::dispatch::Endpoint;
use crate::registry::{CommandRegistry, RegistryError};
use crate::telemetry::{self, TelemetryError};
use crate::transport::ListenerError;

const RUN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::run");

/// Text the client sends with `STRING`.
pub const CLIENT_GREETING: &str = "Hello from cmdwire";

/// Failures that end the process with a non-zero status.
#[derive(Debug, Error)]
pub enum RunError {
    /// Configuration could not be loaded.
    #[error("failed to load configuration: {0}")]
    Config(Arc<ortho_config::OrthoError>),
    /// Logging could not be set up.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// The built-in commands could not be registered.
    #[error("failed to register commands: {0}")]
    Register(#[from] RegistryError),
    /// The server could not bind or its listener died.
    #[error("listener failed: {0}")]
    Listen(#[from] ListenerError),
    /// A client exchange failed.
    #[error("client failed: {0}")]
    Client(#[from] ClientError),
}

impl RunError {
    /// Returns `true` once the tracing subscriber can report this error.
    #[must_use]
    pub const fn is_logged(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::Telemetry(_))
    }
}

/// Loads configuration from `args` and the environment, then runs as client
/// when a peer is configured and as server otherwise.
///
/// Errors raised before logging is available are written to `stderr`; later
/// ones go through `tracing`.
pub fn run<I, T, E>(args: I, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
    E: Write,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    match execute(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) if failure.is_logged() => {
            error!(target: RUN_TARGET, error = %failure, "cmdwire failed");
            ExitCode::FAILURE
        }
        Err(failure) => {
            writeln!(stderr, "cmdwire: {failure}").ok();
            ExitCode::FAILURE
        }
    }
}

fn execute(args: Vec<OsString>) -> Result<(), RunError> {
    let config = Config::load_from_iter(args).map_err(RunError::Config)?;
    telemetry::initialise(&config)?;
    match config.connect() {
        Some(peer) => run_client(&config, peer),
        None => run_server(&config),
    }
}

fn run_server(config: &Config) -> Result<(), RunError> {
    let mut registry = CommandRegistry::new();
    register_builtin(&mut registry)?;
    let endpoint = Endpoint::bind(config, registry)?;
    info!(
        target: RUN_TARGET,
        listen = %config.listen(),
        "listening for commands"
    );
    endpoint.listen()?;
    Ok(())
}

/// Sends `STRING` and then `GOB` to `peer`, one connection each.
///
/// # Errors
///
/// Returns [`ClientError`] for the first exchange that fails.
pub fn run_client(config: &Config, peer: &SocketEndpoint) -> Result<(), RunError> {
    let options = ClientOptions::from_config(config);

    let mut client = Client::connect(peer, options)?;
    let reply = send_string(&mut client, CLIENT_GREETING)?;
    info!(target: RUN_TARGET, peer = %peer, reply = %reply, "STRING acknowledged");
    client.close()?;

    let mut client = Client::connect(peer, options)?;
    send_gob(&mut client, &sample_record())?;
    info!(target: RUN_TARGET, peer = %peer, "GOB sent");
    client.close()?;
    Ok(())
}
