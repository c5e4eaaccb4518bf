//! Outbound connections to configured endpoints.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use cmdwire_config::SocketEndpoint;
use thiserror::Error;

#[cfg(unix)]
use socket2::{Domain, SockAddr, Socket, Type};
#[cfg(unix)]
use std::os::fd::OwnedFd;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use super::ConnectionStream;

/// Errors raised while dialling an endpoint.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The host name could not be resolved.
    #[error("failed to resolve {endpoint}: {source}")]
    Resolve {
        /// Endpoint being dialled.
        endpoint: String,
        /// Resolver error.
        #[source]
        source: io::Error,
    },
    /// The connection attempt failed or timed out.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        /// Endpoint being dialled.
        endpoint: String,
        /// Operating system error.
        #[source]
        source: io::Error,
    },
    /// Unix sockets are not available on this platform.
    #[cfg(not(unix))]
    #[error("unix sockets are unsupported for endpoint {0}")]
    UnsupportedUnix(String),
}

/// Opens a stream to `endpoint`, giving up after `timeout`.
///
/// # Errors
///
/// Returns [`ConnectError`] when resolution or the connection attempt fails.
pub fn connect(
    endpoint: &SocketEndpoint,
    timeout: Duration,
) -> Result<ConnectionStream, ConnectError> {
    match endpoint {
        SocketEndpoint::Tcp { host, port } => {
            let address =
                resolve_tcp_address(host, *port).map_err(|source| ConnectError::Resolve {
                    endpoint: endpoint.to_string(),
                    source,
                })?;
            TcpStream::connect_timeout(&address, timeout)
                .map(ConnectionStream::Tcp)
                .map_err(|source| ConnectError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                })
        }
        SocketEndpoint::Unix { path } => {
            #[cfg(unix)]
            {
                connect_unix(path.as_str(), timeout).map_err(|source| ConnectError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                })
            }

            #[cfg(not(unix))]
            {
                let _ = path;
                Err(ConnectError::UnsupportedUnix(endpoint.to_string()))
            }
        }
    }
}

fn resolve_tcp_address(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = (host, port).to_socket_addrs()?;
    addrs
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses"))
}

#[cfg(unix)]
fn connect_unix(path: &str, timeout: Duration) -> io::Result<ConnectionStream> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    socket.connect_timeout(&address, timeout)?;
    Ok(ConnectionStream::Unix(UnixStream::from(OwnedFd::from(socket))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn connects_to_a_tcp_listener() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let endpoint = SocketEndpoint::tcp("127.0.0.1", port);
        let stream = connect(&endpoint, Duration::from_secs(1)).expect("connect");
        assert!(matches!(stream, ConnectionStream::Tcp(_)));
    }

    #[test]
    fn refused_tcp_connection_reports_the_endpoint() {
        let port = {
            let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let endpoint = SocketEndpoint::tcp("127.0.0.1", port);
        let error = connect(&endpoint, Duration::from_secs(1)).expect_err("refused");
        assert!(matches!(error, ConnectError::Connect { .. }));
        assert!(error.to_string().contains(&endpoint.to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn connects_to_a_unix_listener() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("cmdwire.sock");
        let _listener = std::os::unix::net::UnixListener::bind(&path).expect("bind");
        let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path"));
        let stream = connect(&endpoint, Duration::from_secs(1)).expect("connect");
        assert!(matches!(stream, ConnectionStream::Unix(_)));
    }
}
