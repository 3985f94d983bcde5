//! TCP client binding the frame transport to one socket.
//!
//! A `Client` is used both for the outbound connection every instance opens
//! and for each inbound connection the primary accepts. The socket is driven
//! by a background tokio task; decoded commands and connection changes are
//! reported on a `ClientEvent` channel owned by the coordination engine.
//!
//! Writes are queued on an unbounded channel. A command sent before the
//! outbound connection completes is held in the queue and flushed as soon as
//! the socket is connected.

use crate::command::Command;
use crate::config::ServerConfig;
use crate::transport::FrameDecoder;
use crate::{PrimusError, Result};
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

static NEXT_CLIENT_ID: AtomicU32 = AtomicU32::new(1);

/// Process-local connection id, assigned from a monotonic counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u32);

impl ClientId {
    /// Allocate the next id.
    pub fn next() -> Self {
        ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for ClientId {
    fn from(value: u32) -> Self {
        ClientId(value)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Events raised by a client's background task.
#[derive(Debug)]
pub enum ClientEvent {
    /// Outbound connection established.
    Connected { client: ClientId },
    /// A command was decoded. `sender_id` is stamped with the client's id.
    Command(Command),
    /// The socket closed. `error` is `None` for a clean close by the peer.
    Disconnected {
        client: ClientId,
        error: Option<io::ErrorKind>,
    },
}

/// Anything the engine can address a command to.
///
/// Implemented by `Client`; tests substitute a recording sink.
pub trait CommandSink: Send + 'static {
    fn id(&self) -> ClientId;

    fn send_command(&self, command: &Command) -> Result<()>;
}

/// One socket plus its receive state.
pub struct Client {
    id: ClientId,
    frames_tx: mpsc::UnboundedSender<Bytes>,
    task: tokio::task::JoinHandle<()>,
}

impl Client {
    /// Create a client and start connecting to `host:port`.
    ///
    /// Connection failures are reported as `ClientEvent::Disconnected` with
    /// the socket error kind, never returned from here.
    pub fn connect(
        host: impl Into<String>,
        port: u16,
        events: mpsc::UnboundedSender<ClientEvent>,
    ) -> Self {
        let id = ClientId::next();
        let host = host.into();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            match TcpStream::connect((host.as_str(), port)).await {
                Ok(stream) => {
                    debug!("Client {} connected to {}:{}", id, host, port);
                    let _ = events.send(ClientEvent::Connected { client: id });
                    Self::run(id, stream, frames_rx, events).await;
                }
                Err(e) => {
                    debug!("Client {} failed to connect to {}:{}: {}", id, host, port, e);
                    let _ = events.send(ClientEvent::Disconnected {
                        client: id,
                        error: Some(e.kind()),
                    });
                }
            }
        });

        Self {
            id,
            frames_tx,
            task,
        }
    }

    /// Wrap an accepted inbound socket.
    pub fn from_stream(stream: TcpStream, events: mpsc::UnboundedSender<ClientEvent>) -> Self {
        let id = ClientId::next();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(Self::run(id, stream, frames_rx, events));

        Self {
            id,
            frames_tx,
            task,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Serialize `command` and queue it for writing.
    pub fn send_command(&self, command: &Command) -> Result<()> {
        let frame = command.to_frame()?;
        self.send_frame(frame)
    }

    /// Queue an already-encoded frame. Host applications use this for their
    /// own frame tags.
    pub fn send_frame(&self, frame: Bytes) -> Result<()> {
        self.frames_tx.send(frame).map_err(|_| PrimusError::Io {
            message: format!("client {} is disconnected", self.id),
            source: None,
        })
    }

    async fn run(
        id: ClientId,
        stream: TcpStream,
        mut frames_rx: mpsc::UnboundedReceiver<Bytes>,
        events: mpsc::UnboundedSender<ClientEvent>,
    ) {
        let (mut reader, mut writer) = stream.into_split();

        let write_loop = async {
            while let Some(frame) = frames_rx.recv().await {
                writer.write_all(&frame).await?;
            }
            writer.shutdown().await?;
            Ok::<(), PrimusError>(())
        };

        let read_loop = async {
            let mut decoder = FrameDecoder::with_max_payload(ServerConfig::MAX_FRAME_BYTES);
            let mut buf = BytesMut::with_capacity(ServerConfig::READ_BUFFER_CAPACITY);
            loop {
                if reader.read_buf(&mut buf).await? == 0 {
                    return Ok::<(), PrimusError>(());
                }
                for frame in decoder.decode(&mut buf)? {
                    match Command::from_frame(&frame) {
                        Ok(Some(mut command)) => {
                            command.sender_id = id.as_u32();
                            let _ = events.send(ClientEvent::Command(command));
                        }
                        Ok(None) => debug!("Client {} ignoring frame tag {}", id, frame.tag),
                        Err(e) if e.is_malformed_message() => {
                            if matches!(e, PrimusError::UnsupportedVersion { .. }) {
                                warn!("Client {} dropped command frame: {}", id, e);
                            } else {
                                debug!("Client {} dropped malformed frame: {}", id, e);
                            }
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        };

        let result = tokio::select! {
            result = read_loop => result,
            result = write_loop => result,
        };

        let error = match result {
            Ok(()) => None,
            Err(e) => {
                debug!("Client {} connection ended: {}", id, e);
                e.io_kind()
            }
        };
        let _ = events.send(ClientEvent::Disconnected { client: id, error });
    }
}

impl CommandSink for Client {
    fn id(&self) -> ClientId {
        self.id
    }

    fn send_command(&self, command: &Command) -> Result<()> {
        Client::send_command(self, command)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").field("id", &self.id).finish()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.task.abort();
    }
}
