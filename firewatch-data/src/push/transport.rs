//! Connection seam for the push channel and its WebSocket implementation.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::debug;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use super::message::{ClientMessage, ServerMessage};

/// Failure on the push transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("failed to connect to {url}: {message}")]
    Connect {
        /// Endpoint URL.
        url: String,
        /// Underlying failure.
        message: String,
    },
    /// A frame could not be written.
    #[error("failed to send frame: {message}")]
    Send {
        /// Underlying failure.
        message: String,
    },
    /// A frame could not be read.
    #[error("failed to receive frame: {message}")]
    Receive {
        /// Underlying failure.
        message: String,
    },
    /// A frame was not a valid server message.
    #[error("failed to decode frame: {message}")]
    Decode {
        /// Decoder message.
        message: String,
    },
    /// The connection has been closed.
    #[error("connection closed")]
    Closed,
}

/// An established push connection.
#[async_trait]
pub trait PushConnection: Send {
    /// Write one frame.
    async fn send(&mut self, message: &ClientMessage) -> Result<(), TransportError>;

    /// Read the next frame; `None` once the peer closed the connection.
    async fn next(&mut self) -> Option<Result<ServerMessage, TransportError>>;
}

/// Opens push connections.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Connect to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn PushConnection>, TransportError>;
}

/// [`PushTransport`] speaking JSON text frames over WebSocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl PushTransport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn PushConnection>, TransportError> {
        let (stream, response) =
            connect_async(url)
                .await
                .map_err(|err| TransportError::Connect {
                    url: url.to_owned(),
                    message: err.to_string(),
                })?;
        debug!("push channel connected to {url} ({})", response.status());
        Ok(Box::new(WebSocketConnection { stream }))
    }
}

struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushConnection for WebSocketConnection {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), TransportError> {
        let text = serde_json::to_string(message).map_err(|err| TransportError::Send {
            message: err.to_string(),
        })?;
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|err| TransportError::Send {
                message: err.to_string(),
            })
    }

    async fn next(&mut self) -> Option<Result<ServerMessage, TransportError>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(frame) => frame,
                Err(err) => {
                    return Some(Err(TransportError::Receive {
                        message: err.to_string(),
                    }));
                }
            };
            let decoded = match frame {
                Message::Text(text) => serde_json::from_str(text.as_str()),
                Message::Binary(bytes) => serde_json::from_slice(&bytes),
                Message::Close(_) => return None,
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };
            return Some(decoded.map_err(|err| TransportError::Decode {
                message: err.to_string(),
            }));
        }
    }
}
