//! In-process push transport.
//!
//! Every `connect` hands a [`MemorySession`] to the paired [`MemoryBroker`],
//! which plays the broker side of the STOMP conversation. Used by tests and
//! by embedders that bridge push messages from another source.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tidewatch_core::stomp::{Command, Frame};
use tokio::sync::mpsc;

use super::transport::{PushConnection, PushTransport};

/// Creates a connected transport/broker pair.
#[must_use]
pub fn memory_transport() -> (MemoryTransport, MemoryBroker) {
    let (sessions, incoming) = mpsc::unbounded_channel();
    let transport = MemoryTransport {
        sessions,
        refusals: Arc::new(AtomicUsize::new(0)),
        attempts: Arc::new(AtomicUsize::new(0)),
    };
    (transport, MemoryBroker { incoming })
}

/// Client side. Clones share the same broker.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    sessions: mpsc::UnboundedSender<MemorySession>,
    refusals: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl MemoryTransport {
    /// Makes the next `count` connection attempts fail.
    pub fn refuse_next(&self, count: usize) {
        self.refusals.store(count, Ordering::SeqCst);
    }

    /// Total connection attempts, including refused ones.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for MemoryTransport {
    async fn connect(
        &self,
        url: &str,
        authorization: Option<&str>,
    ) -> anyhow::Result<Box<dyn PushConnection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            anyhow::bail!("connection refused: {url}");
        }

        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        let session = MemorySession {
            url: url.to_string(),
            authorization: authorization.map(str::to_string),
            to_client: Some(to_client),
            from_client,
        };
        self.sessions
            .send(session)
            .map_err(|_| anyhow::anyhow!("broker is gone: {url}"))?;
        Ok(Box::new(MemoryConnection {
            to_server: Some(to_server),
            from_server,
        }))
    }
}

struct MemoryConnection {
    to_server: Option<mpsc::UnboundedSender<String>>,
    from_server: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl PushConnection for MemoryConnection {
    async fn send(&mut self, text: String) -> anyhow::Result<()> {
        let sender = self
            .to_server
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("connection closed"))?;
        sender
            .send(text)
            .map_err(|_| anyhow::anyhow!("broker closed the session"))
    }

    async fn recv(&mut self) -> Option<anyhow::Result<String>> {
        self.from_server.recv().await.map(Ok)
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.to_server.take();
        self.from_server.close();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Broker side
// ---------------------------------------------------------------------------

/// Receives sessions opened through the paired [`MemoryTransport`].
#[derive(Debug)]
pub struct MemoryBroker {
    incoming: mpsc::UnboundedReceiver<MemorySession>,
}

impl MemoryBroker {
    /// Waits for the next client connection.
    pub async fn accept(&mut self) -> Option<MemorySession> {
        self.incoming.recv().await
    }
}

/// Broker end of one connection.
#[derive(Debug)]
pub struct MemorySession {
    pub url: String,
    /// `Authorization` value presented on the transport handshake.
    pub authorization: Option<String>,
    to_client: Option<mpsc::UnboundedSender<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemorySession {
    /// Next raw text sent by the client; `None` once the client closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next decoded frame, skipping heart-beats and undecodable text.
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        loop {
            let text = self.recv().await?;
            if let Ok(Some(frame)) = Frame::decode(&text) {
                return Some(frame);
            }
        }
    }

    /// Sends raw text. Returns `false` if the client is gone.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.to_client
            .as_ref()
            .is_some_and(|tx| tx.send(text.into()).is_ok())
    }

    pub fn send_frame(&self, frame: &Frame) -> bool {
        self.send(frame.encode())
    }

    /// Answers `CONNECT` with `CONNECTED` and returns the client's
    /// `SUBSCRIBE` frame, if the client gets that far.
    pub async fn handshake(&mut self) -> Option<(Frame, Frame)> {
        let connect = self.recv_frame().await?;
        if connect.command != Command::Connect && connect.command != Command::Stomp {
            return None;
        }
        self.send_frame(&Frame::new(Command::Connected).header("version", "1.2"));
        let subscribe = self.recv_frame().await?;
        Some((connect, subscribe))
    }

    /// Sends a `MESSAGE` frame carrying `body` to `destination`.
    pub fn publish(&self, destination: &str, subscription: &str, body: &str) -> bool {
        let frame = Frame::new(Command::Message)
            .header("destination", destination)
            .header("subscription", subscription)
            .header("message-id", uuid::Uuid::new_v4().to_string())
            .header("content-type", "application/json")
            .with_body(body);
        self.send_frame(&frame)
    }

    /// Drops the server-to-client half, which the client observes as a
    /// closed connection.
    pub fn disconnect(&mut self) {
        self.to_client.take();
    }
}
