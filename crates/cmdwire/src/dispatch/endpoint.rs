//! Listening endpoint that serves the command registry.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tracing::info;

use cmdwire_config::{Config, SocketEndpoint};

use crate::registry::CommandRegistry;
use crate::transport::{ConnectionHandler, ListenerError, ListenerHandle, SocketListener};

use super::DISPATCH_TARGET;
use super::connection::{DispatchSettings, Dispatcher};
use super::reporter::{DispatchReporter, StructuredDispatchReporter};

/// A bound listening socket together with the commands it serves.
///
/// The registry is moved in at bind time and shared read-only by every
/// connection thread once the endpoint starts.
pub struct Endpoint {
    listener: SocketListener,
    registry: Arc<CommandRegistry>,
    settings: DispatchSettings,
    reporter: Arc<dyn DispatchReporter>,
}

impl Endpoint {
    /// Binds the configured listen endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] when the socket cannot be bound.
    pub fn bind(config: &Config, registry: CommandRegistry) -> Result<Self, ListenerError> {
        Self::bind_with(config.listen(), registry, DispatchSettings::from_config(config))
    }

    /// Binds `endpoint` with explicit dispatch settings.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] when the socket cannot be bound.
    pub fn bind_with(
        endpoint: &SocketEndpoint,
        registry: CommandRegistry,
        settings: DispatchSettings,
    ) -> Result<Self, ListenerError> {
        let listener = SocketListener::bind(endpoint)?;
        Ok(Self {
            listener,
            registry: Arc::new(registry),
            settings,
            reporter: Arc::new(StructuredDispatchReporter::new()),
        })
    }

    /// Replaces the lifecycle reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn DispatchReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Bound TCP address; `None` for Unix sockets.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    /// Commands served by this endpoint.
    #[must_use]
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Settings applied to every connection.
    #[must_use]
    pub const fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Serves connections on a background thread.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] if the accept loop cannot be started.
    pub fn start(self) -> Result<EndpointHandle, ListenerError> {
        let local_addr = self.local_addr();
        let endpoint = self.listener.endpoint().clone();
        let (listener, handler) = self.into_parts();
        let handle = listener.start(handler)?;
        Ok(EndpointHandle {
            listener: handle,
            endpoint,
            local_addr,
        })
    }

    /// Serves connections on the calling thread until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Fatal`] when accepting becomes impossible.
    pub fn listen(self) -> Result<(), ListenerError> {
        let (listener, handler) = self.into_parts();
        let never = AtomicBool::new(false);
        listener.run(&handler, &never)
    }

    fn into_parts(self) -> (SocketListener, Arc<dyn ConnectionHandler>) {
        info!(
            target: DISPATCH_TARGET,
            endpoint = %self.listener.endpoint(),
            commands = ?self.registry.names(),
            "endpoint ready"
        );
        let dispatcher = Dispatcher::new(self.registry, self.settings, self.reporter);
        (self.listener, Arc::new(dispatcher))
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("listener", &self.listener)
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Handle to an endpoint serving on a background thread.
#[derive(Debug)]
pub struct EndpointHandle {
    listener: ListenerHandle,
    endpoint: SocketEndpoint,
    local_addr: Option<SocketAddr>,
}

impl EndpointHandle {
    /// Bound TCP address; `None` for Unix sockets.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Endpoint to dial to reach this server.
    ///
    /// For TCP listeners bound to port zero this carries the port the
    /// operating system picked.
    #[must_use]
    pub fn endpoint(&self) -> SocketEndpoint {
        match (&self.endpoint, self.local_addr) {
            (SocketEndpoint::Tcp { .. }, Some(addr)) => {
                SocketEndpoint::tcp(addr.ip().to_string(), addr.port())
            }
            (endpoint, _) => endpoint.clone(),
        }
    }

    /// Stops accepting new connections.
    pub fn shutdown(&self) {
        self.listener.shutdown();
    }

    /// Waits for the accept loop to finish.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] if the loop died or its thread panicked.
    pub fn join(self) -> Result<(), ListenerError> {
        self.listener.join()
    }
}
