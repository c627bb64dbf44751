//! Realtime transports
//!
//! - `WsConnector`: WebSocket via tokio-tungstenite
//! - `MemoryConnector`: in-process, driven from the "server" side

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::ChannelError;

/// Opens realtime connections
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    async fn connect(&self) -> Result<Box<dyn Connection>, ChannelError>;
}

/// One open realtime connection
#[async_trait]
pub trait Connection: Send {
    /// Next text payload; `Err(Closed)` once the peer is gone
    async fn recv(&mut self) -> Result<String, ChannelError>;

    /// Close from our side
    async fn close(&mut self);
}

// ========== WebSocket ==========

/// WebSocket connector
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, ChannelError> {
        let (stream, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
    async fn recv(&mut self) -> Result<String, ChannelError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        return Err(ChannelError::Protocol(e.to_string()));
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Err(ChannelError::Closed),
                Some(Err(e)) => return Err(ChannelError::Protocol(e.to_string())),
                _ => {} // Binary, Pong, Frame
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

// ========== In-process ==========

#[derive(Debug)]
enum Frame {
    Text(String),
    Close,
    Error(String),
}

#[derive(Debug)]
struct MemoryShared {
    accepting: bool,
    attempts: Vec<Instant>,
    live: Option<mpsc::UnboundedSender<Frame>>,
}

/// In-process connector
///
/// Clones share one "server": tests keep a clone to refuse connections,
/// push payloads and drop the live connection.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    shared: Arc<Mutex<MemoryShared>>,
}

impl MemoryConnector {
    /// Connector that accepts connections
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(MemoryShared {
                accepting: true,
                attempts: Vec::new(),
                live: None,
            })),
        }
    }

    /// Refuse (`false`) or accept (`true`) further connects
    pub fn set_accepting(&self, accepting: bool) {
        self.shared.lock().accepting = accepting;
    }

    /// When each connect attempt happened
    pub fn attempts(&self) -> Vec<Instant> {
        self.shared.lock().attempts.clone()
    }

    /// Whether a client currently holds the live connection
    pub fn is_connected(&self) -> bool {
        self.shared
            .lock()
            .live
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Deliver a payload; `false` without a live connection
    pub fn push(&self, text: impl Into<String>) -> bool {
        self.send(Frame::Text(text.into()))
    }

    /// Close the live connection from the server side
    pub fn close_connection(&self) -> bool {
        let sent = self.send(Frame::Close);
        self.shared.lock().live = None;
        sent
    }

    /// Break the live connection with a transport error
    pub fn fail_connection(&self, message: &str) -> bool {
        let sent = self.send(Frame::Error(message.to_string()));
        self.shared.lock().live = None;
        sent
    }

    fn send(&self, frame: Frame) -> bool {
        self.shared
            .lock()
            .live
            .as_ref()
            .is_some_and(|tx| tx.send(frame).is_ok())
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, ChannelError> {
        let mut shared = self.shared.lock();
        shared.attempts.push(Instant::now());
        if !shared.accepting {
            return Err(ChannelError::Connect("connection refused".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        shared.live = Some(tx);
        Ok(Box::new(MemoryConnection { rx }))
    }
}

struct MemoryConnection {
    rx: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn recv(&mut self) -> Result<String, ChannelError> {
        match self.rx.recv().await {
            Some(Frame::Text(text)) => Ok(text),
            Some(Frame::Error(message)) => Err(ChannelError::Protocol(message)),
            Some(Frame::Close) | None => Err(ChannelError::Closed),
        }
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_connection_delivers_frames() {
        let connector = MemoryConnector::new();
        assert!(!connector.push("early"));

        let mut conn = connector.connect().await.unwrap();
        assert!(connector.is_connected());
        assert!(connector.push("hello"));
        assert_eq!(conn.recv().await.unwrap(), "hello");

        connector.close_connection();
        assert_eq!(conn.recv().await, Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn test_refused_connect_is_recorded() {
        let connector = MemoryConnector::new();
        connector.set_accepting(false);
        assert!(matches!(
            connector.connect().await,
            Err(ChannelError::Connect(_))
        ));
        assert_eq!(connector.attempts().len(), 1);
        assert!(!connector.is_connected());
    }

    #[tokio::test]
    async fn test_dropped_client_is_not_connected() {
        let connector = MemoryConnector::new();
        let conn = connector.connect().await.unwrap();
        drop(conn);
        assert!(!connector.is_connected());
    }
}
