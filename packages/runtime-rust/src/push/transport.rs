//! Transport seam for the push channel.

use std::time::Duration;

use async_trait::async_trait;
use tidewatch_core::stomp::{Command, StompError};

/// Opens text-frame connections to the push broker.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Connects to `url`, presenting `authorization` on the handshake if set.
    async fn connect(
        &self,
        url: &str,
        authorization: Option<&str>,
    ) -> anyhow::Result<Box<dyn PushConnection>>;
}

/// One open connection carrying STOMP frames as text messages.
#[async_trait]
pub trait PushConnection: Send {
    async fn send(&mut self, text: String) -> anyhow::Result<()>;

    /// Next text message. `None` means the peer closed the connection.
    async fn recv(&mut self) -> Option<anyhow::Result<String>>;

    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Reasons a push session ended or could not be established.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("credential provider failed: {0:#}")]
    Credentials(anyhow::Error),
    #[error("transport error: {0:#}")]
    Transport(anyhow::Error),
    #[error("no CONNECTED frame within {0:?}")]
    Timeout(Duration),
    #[error("broker sent ERROR: {0}")]
    Rejected(String),
    #[error("unexpected {0} frame before CONNECTED")]
    UnexpectedFrame(Command),
    #[error("connection closed by peer")]
    Closed,
    #[error(transparent)]
    Frame(#[from] StompError),
}
