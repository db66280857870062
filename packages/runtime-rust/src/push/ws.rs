//! WebSocket transport built on `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use http::header::{HeaderValue, AUTHORIZATION};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::transport::{PushConnection, PushTransport};

/// Connects with a plain WebSocket handshake. The credential is sent both
/// as the handshake `Authorization` header and in the STOMP `CONNECT` frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl PushTransport for WsTransport {
    async fn connect(
        &self,
        url: &str,
        authorization: Option<&str>,
    ) -> anyhow::Result<Box<dyn PushConnection>> {
        let mut request = url.into_client_request()?;
        if let Some(value) = authorization {
            request
                .headers_mut()
                .insert(AUTHORIZATION, HeaderValue::from_str(value)?);
        }
        let (stream, response) = tokio_tungstenite::connect_async(request).await?;
        tracing::debug!(url, status = %response.status(), "websocket handshake complete");
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushConnection for WsConnection {
    async fn send(&mut self, text: String) -> anyhow::Result<()> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<anyhow::Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(err) => {
                        tracing::debug!(len = data.len(), error = %err, "non-UTF-8 binary frame dropped");
                    }
                },
                Ok(Message::Ping(data)) => {
                    if let Err(err) = self.stream.send(Message::Pong(data)).await {
                        return Some(Err(err.into()));
                    }
                }
                Ok(Message::Close(_)) => return None,
                Ok(Message::Pong(_) | Message::Frame(_)) => {}
                Err(err) => return Some(Err(err.into())),
            }
        }
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}
