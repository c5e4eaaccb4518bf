//! Client driver for cmdwire peers.
//!
//! A [`Client`] owns one connection. Every send writes the command line and
//! its payload and flushes; only request/response commands read a reply.

use std::io::{self, Write};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use cmdwire_codec::{CodecLimits, EncodeError, Encoder, NodeId, Record, RecordGraph};
use cmdwire_config::{Config, SocketEndpoint};

use crate::command::{CommandName, CommandNameError};
use crate::framing::{FrameError, FrameLimits, FramedStream};
use crate::transport::{ConnectError, ConnectionStream, connect};

const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");

/// Connection settings for [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Deadline for establishing the connection.
    pub connect_timeout: Duration,
    /// Read and write deadline; `None` blocks indefinitely.
    pub io_timeout: Option<Duration>,
    /// Bounds for reply lines.
    pub frame_limits: FrameLimits,
    /// Bounds for encoded records.
    pub codec_limits: CodecLimits,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ClientOptions {
    /// Options taken from the shared configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            io_timeout: config.io_timeout(),
            frame_limits: FrameLimits::from_config(config),
            codec_limits: CodecLimits::new(config.max_record_depth, config.max_field_bytes),
        }
    }
}

/// Errors raised by the client driver.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The peer could not be reached.
    #[error(transparent)]
    Connect(#[from] ConnectError),
    /// Connection deadlines could not be applied.
    #[error("failed to configure connection deadlines: {0}")]
    Configure(#[source] io::Error),
    /// The command name cannot be framed.
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] CommandNameError),
    /// A text payload contained a line break.
    #[error("payload for {command} spans several lines")]
    MultilinePayload {
        /// Command the payload was meant for.
        command: CommandName,
    },
    /// The record payload could not be encoded.
    #[error("failed to encode payload for {command}: {source}")]
    Encode {
        /// Command the payload was meant for.
        command: CommandName,
        /// Codec failure.
        #[source]
        source: EncodeError,
    },
    /// Writing to the peer failed.
    #[error("failed to send {command}: {source}")]
    Send {
        /// Command being sent.
        command: CommandName,
        /// Transport failure.
        #[source]
        source: io::Error,
    },
    /// Reading the reply failed.
    #[error("failed to read reply to {command}: {source}")]
    Receive {
        /// Command awaiting the reply.
        command: CommandName,
        /// Framing failure.
        #[source]
        source: FrameError,
    },
    /// Shutting the connection down failed.
    #[error("failed to close connection: {0}")]
    Close(#[source] io::Error),
}

/// One client connection to a cmdwire server.
#[derive(Debug)]
pub struct Client {
    stream: FramedStream<ConnectionStream>,
    encoder: Encoder,
    endpoint: SocketEndpoint,
}

impl Client {
    /// Opens a connection to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connect`] when the peer cannot be reached and
    /// [`ClientError::Configure`] when deadlines cannot be applied.
    pub fn connect(endpoint: &SocketEndpoint, options: ClientOptions) -> Result<Self, ClientError> {
        let stream = connect(endpoint, options.connect_timeout)?;
        stream
            .set_timeouts(options.io_timeout)
            .map_err(ClientError::Configure)?;
        debug!(target: CLIENT_TARGET, %endpoint, "connected");
        Ok(Self {
            stream: FramedStream::new(stream, options.frame_limits),
            encoder: Encoder::new(options.codec_limits),
            endpoint: endpoint.clone(),
        })
    }

    /// Endpoint this client is connected to.
    #[must_use]
    pub const fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Sends `command` followed by one text line. No reply is read.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] for invalid commands, multi-line payloads and
    /// transport failures.
    pub fn send_line(&mut self, command: &str, text: &str) -> Result<(), ClientError> {
        let name = CommandName::new(command)?;
        if text.contains('\n') {
            return Err(ClientError::MultilinePayload { command: name });
        }
        self.stream.write_line(name.as_str());
        self.stream.write_line(text);
        self.flush(&name)
    }

    /// Sends `command` with one text line and reads exactly one reply line.
    ///
    /// # Errors
    ///
    /// As [`Client::send_line`], plus [`ClientError::Receive`] when no reply
    /// line arrives.
    pub fn request_line(&mut self, command: &str, text: &str) -> Result<String, ClientError> {
        let name = CommandName::new(command)?;
        self.send_line(command, text)?;
        self.stream
            .read_line()
            .map_err(|source| ClientError::Receive {
                command: name,
                source,
            })
    }

    /// Sends `command` followed by one encoded record. No reply is read.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Encode`] before anything is sent when the record
    /// breaks the codec limits, and [`ClientError::Send`] on transport
    /// failure.
    pub fn send_record(&mut self, command: &str, record: &Record) -> Result<(), ClientError> {
        let name = CommandName::new(command)?;
        let mut payload = Vec::new();
        self.encoder
            .encode(&mut payload, record)
            .map_err(|source| ClientError::Encode {
                command: name.clone(),
                source,
            })?;
        self.send_payload(&name, &payload)
    }

    /// Sends `command` followed by the record chain rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Encode`] before anything is sent when the chain
    /// loops back on itself or breaks the codec limits, and
    /// [`ClientError::Send`] on transport failure.
    pub fn send_graph(
        &mut self,
        command: &str,
        graph: &RecordGraph,
        root: NodeId,
    ) -> Result<(), ClientError> {
        let name = CommandName::new(command)?;
        let mut payload = Vec::new();
        self.encoder
            .encode_graph(&mut payload, graph, root)
            .map_err(|source| ClientError::Encode {
                command: name.clone(),
                source,
            })?;
        self.send_payload(&name, &payload)
    }

    /// Shuts the connection down in both directions.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Close`] when the shutdown fails for a reason
    /// other than the peer having gone already.
    pub fn close(self) -> Result<(), ClientError> {
        match self.stream.get_ref().shutdown() {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(error) => Err(ClientError::Close(error)),
        }
    }

    fn send_payload(&mut self, name: &CommandName, payload: &[u8]) -> Result<(), ClientError> {
        self.stream.write_line(name.as_str());
        self.stream
            .write_all(payload)
            .map_err(|source| ClientError::Send {
                command: name.clone(),
                source,
            })?;
        self.flush(name)
    }

    fn flush(&mut self, name: &CommandName) -> Result<(), ClientError> {
        debug!(
            target: CLIENT_TARGET,
            command = %name,
            bytes = self.stream.staged_len(),
            "sending command"
        );
        self.stream.flush().map_err(|source| ClientError::Send {
            command: name.clone(),
            source,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read};
    use std::os::unix::net::UnixListener;
    use std::thread;

    use cmdwire_codec::{Decoder, RecordNode};
    use rstest::{fixture, rstest};

    struct Peer {
        _dir: tempfile::TempDir,
        endpoint: SocketEndpoint,
        listener: UnixListener,
    }

    #[fixture]
    fn peer() -> Peer {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("peer.sock");
        let listener = UnixListener::bind(&path).expect("bind peer");
        let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path"));
        Peer {
            _dir: dir,
            endpoint,
            listener,
        }
    }

    #[rstest]
    fn request_line_reads_one_reply(peer: Peer) {
        let Peer {
            _dir,
            endpoint,
            listener,
        } = peer;
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream);
            let mut command = String::new();
            let mut text = String::new();
            reader.read_line(&mut command).expect("command");
            reader.read_line(&mut text).expect("text");
            reader
                .get_mut()
                .write_all(b"Thank you.\n")
                .expect("reply");
            (command, text)
        });

        let mut client = Client::connect(&endpoint, ClientOptions::default()).expect("connect");
        let reply = client.request_line("STRING", "hello").expect("request");
        client.close().expect("close");

        assert_eq!(reply, "Thank you.");
        let (command, text) = server.join().expect("server");
        assert_eq!(command, "STRING\n");
        assert_eq!(text, "hello\n");
    }

    #[rstest]
    fn send_record_writes_command_then_value(peer: Peer) {
        let Peer {
            _dir,
            endpoint,
            listener,
        } = peer;
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream);
            let mut command = String::new();
            reader.read_line(&mut command).expect("command");
            let record = Decoder::default().decode(&mut reader).expect("decode");
            (command, record)
        });

        let sent = Record::new(5, "five").with_child(Record::new(6, "six"));
        let mut client = Client::connect(&endpoint, ClientOptions::default()).expect("connect");
        client.send_record("GOB", &sent).expect("send");
        client.close().expect("close");

        let (command, received) = server.join().expect("server");
        assert_eq!(command, "GOB\n");
        assert_eq!(received, sent);
    }

    #[rstest]
    fn cyclic_graph_is_refused_before_sending(peer: Peer) {
        let Peer {
            _dir,
            endpoint,
            listener,
        } = peer;
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut received = Vec::new();
            stream.read_to_end(&mut received).expect("read");
            received
        });

        let mut graph = RecordGraph::new();
        let first = graph.insert(RecordNode::new(1, "first"));
        let second = graph.insert(RecordNode::new(2, "second"));
        graph.set_child(first, Some(second)).expect("link");
        graph.set_child(second, Some(first)).expect("loop");

        let mut client = Client::connect(&endpoint, ClientOptions::default()).expect("connect");
        let error = client.send_graph("GOB", &graph, first).expect_err("cycle");
        assert!(matches!(
            error,
            ClientError::Encode {
                source: EncodeError::Cycle { .. },
                ..
            }
        ));
        client.close().expect("close");

        assert!(server.join().expect("server").is_empty());
    }

    #[rstest]
    #[case("", "text")]
    #[case("BAD NAME", "text")]
    #[case("STRING", "two\nlines")]
    fn malformed_requests_are_refused(peer: Peer, #[case] command: &str, #[case] text: &str) {
        let mut client =
            Client::connect(&peer.endpoint, ClientOptions::default()).expect("connect");
        let error = client.send_line(command, text).expect_err("refused");
        assert!(matches!(
            error,
            ClientError::InvalidCommand(_) | ClientError::MultilinePayload { .. }
        ));
    }

    #[test]
    fn options_follow_the_configuration() {
        let config = Config {
            io_timeout_ms: 250,
            connect_timeout_ms: 0,
            ..Config::default()
        };
        let options = ClientOptions::from_config(&config);
        assert_eq!(options.io_timeout, Some(Duration::from_millis(250)));
        assert_eq!(
            options.connect_timeout,
            Duration::from_millis(cmdwire_config::DEFAULT_CONNECT_TIMEOUT_MS)
        );
    }
}
