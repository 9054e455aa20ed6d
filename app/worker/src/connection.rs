//! Message-framed duplex connections to a coordinator.
//!
//! The worker loop only needs [`Connection::receive`] and
//! [`Connection::send`]. Two transports implement it: a WebSocket client
//! and length-prefixed frames over any byte stream (Unix socket, TCP).

use futures_util::{SinkExt, StreamExt};
use protocol::WireFormat;
use protocol::frame::{self, FrameError};
use std::future::Future;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message, protocol::WebSocketConfig};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// One encoded envelope together with the format it is encoded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub format: WireFormat,
    pub payload: Vec<u8>,
}

/// Errors raised by a transport. Every one of them ends the connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported coordinator address `{0}`")]
    Address(String),
}

/// A persistent, ordered, message-framed channel to the coordinator.
///
/// Methods use RPITIT for async without boxing.
pub trait Connection: Send {
    /// Wait for the next full message. `None` means the coordinator closed
    /// the connection cleanly.
    fn receive(
        &mut self,
    ) -> impl Future<Output = Result<Option<WireMessage>, TransportError>> + Send;

    /// Transmit one message.
    fn send(&mut self, message: WireMessage)
    -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Largest payload the peer accepts in one message.
    fn max_message_size(&self) -> usize;
}

/// A parsed coordinator address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `ws://host:port/path`
    WebSocket(String),
    /// `unix:///path/to/socket`
    Unix(PathBuf),
    /// `tcp://host:port`
    Tcp(String),
}

impl Endpoint {
    /// Classify a coordinator URL by scheme.
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        if url.starts_with("ws://") {
            return Ok(Self::WebSocket(url.to_owned()));
        }
        if let Some(path) = url.strip_prefix("unix://").filter(|p| !p.is_empty()) {
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if let Some(addr) = url.strip_prefix("tcp://").filter(|a| !a.is_empty()) {
            return Ok(Self::Tcp(addr.to_owned()));
        }
        Err(TransportError::Address(url.to_owned()))
    }
}

/// WebSocket connection to the coordinator.
///
/// Binary frames carry MessagePack envelopes, text frames carry JSON.
/// Ping/pong is answered by the library whenever the socket is polled.
pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    max_message_size: usize,
}

impl WsConnection {
    /// Connect to a `ws://` URL.
    pub async fn connect(url: &str, max_message_size: u32) -> Result<Self, TransportError> {
        let max_message_size = max_message_size as usize;
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(max_message_size);
        config.max_frame_size = Some(max_message_size);
        let (stream, response) =
            tokio_tungstenite::connect_async_with_config(url, Some(config), false).await?;
        tracing::debug!("connected to {url} ({})", response.status());
        Ok(Self {
            stream,
            max_message_size,
        })
    }
}

impl Connection for WsConnection {
    async fn receive(&mut self) -> Result<Option<WireMessage>, TransportError> {
        while let Some(message) = self.stream.next().await {
            match message? {
                Message::Binary(data) => {
                    return Ok(Some(WireMessage {
                        format: WireFormat::MessagePack,
                        payload: data.to_vec(),
                    }));
                }
                Message::Text(text) => {
                    return Ok(Some(WireMessage {
                        format: WireFormat::Json,
                        payload: text.as_bytes().to_vec(),
                    }));
                }
                Message::Close(frame) => {
                    tracing::debug!(?frame, "coordinator sent close frame");
                    return Ok(None);
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }

    async fn send(&mut self, message: WireMessage) -> Result<(), TransportError> {
        let message = match message.format {
            WireFormat::MessagePack => Message::binary(message.payload),
            // serde_json only ever emits UTF-8.
            WireFormat::Json => {
                Message::text(String::from_utf8_lossy(&message.payload).into_owned())
            }
        };
        self.stream.send(message).await?;
        Ok(())
    }

    fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

/// Length-prefixed frames over a byte stream. Always MessagePack.
pub struct FramedConnection<R, W> {
    reader: R,
    writer: W,
    max_frame_size: u32,
}

impl<R, W> FramedConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap an already established stream pair.
    pub fn new(reader: R, writer: W, max_frame_size: u32) -> Self {
        Self {
            reader,
            writer,
            max_frame_size,
        }
    }
}

#[cfg(unix)]
impl FramedConnection<tokio::net::unix::OwnedReadHalf, tokio::net::unix::OwnedWriteHalf> {
    /// Connect to a coordinator listening on a Unix domain socket.
    pub async fn unix(path: &std::path::Path, max_frame_size: u32) -> Result<Self, TransportError> {
        let stream = tokio::net::UnixStream::connect(path).await?;
        tracing::debug!("connected to {}", path.display());
        let (reader, writer) = stream.into_split();
        Ok(Self::new(reader, writer, max_frame_size))
    }
}

impl FramedConnection<tokio::net::tcp::OwnedReadHalf, tokio::net::tcp::OwnedWriteHalf> {
    /// Connect to a coordinator listening on TCP.
    pub async fn tcp(addr: &str, max_frame_size: u32) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        tracing::debug!("connected to {addr}");
        let (reader, writer) = stream.into_split();
        Ok(Self::new(reader, writer, max_frame_size))
    }
}

impl<R, W> Connection for FramedConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn receive(&mut self) -> Result<Option<WireMessage>, TransportError> {
        match frame::read_frame(&mut self.reader, self.max_frame_size).await {
            Ok(payload) => Ok(Some(WireMessage {
                format: WireFormat::MessagePack,
                payload,
            })),
            Err(FrameError::ConnectionClosed) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn send(&mut self, message: WireMessage) -> Result<(), TransportError> {
        frame::write_frame(&mut self.writer, &message.payload, self.max_frame_size).await?;
        Ok(())
    }

    fn max_message_size(&self) -> usize {
        self.max_frame_size as usize
    }
}
