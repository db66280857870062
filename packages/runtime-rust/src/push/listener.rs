//! Push channel listener.
//!
//! State machine: Disconnected -> Connecting -> Connected -> Disconnected,
//! repeated until `stop()`. Each (re)connect fetches a fresh credential,
//! performs the STOMP handshake and subscribes to the user's topic. Every
//! well-formed `MESSAGE` is handed to the [`PushDispatcher`].

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tidewatch_core::stomp::{connect_frame, disconnect_frame, subscribe_frame, Command, Frame};
use tidewatch_core::{NotificationRequest, PushMessage};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::transport::{PushConnection, PushError, PushTransport};
use crate::config::PushConfig;
use crate::invalidation::InvalidationRouter;
use crate::notifications::NotificationStore;
use crate::traits::CredentialProvider;

const SUBSCRIPTION_ID: &str = "sub-0";

/// Connection state of the push listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

// ---------------------------------------------------------------------------
// PushDispatcher
// ---------------------------------------------------------------------------

/// What happened to one message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    Discarded,
}

/// Applies the effects of push messages.
pub struct PushDispatcher {
    notifications: NotificationStore,
    router: Arc<InvalidationRouter>,
    latest: watch::Sender<Option<PushMessage>>,
}

impl PushDispatcher {
    #[must_use]
    pub fn new(notifications: NotificationStore, router: Arc<InvalidationRouter>) -> Self {
        let (latest, _rx) = watch::channel(None);
        Self {
            notifications,
            router,
            latest,
        }
    }

    /// Parses `body` and, if it is a valid [`PushMessage`], publishes it as
    /// the latest message, enqueues an info notification and invalidates
    /// every read. Unparseable bodies are dropped without side effects.
    pub fn deliver(&self, body: &str) -> PushOutcome {
        let message = match PushMessage::parse(body) {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(error = %err, "push payload discarded");
                return PushOutcome::Discarded;
            }
        };

        tracing::info!(
            operation_id = %message.operation_id,
            kind = message.kind.as_deref().unwrap_or("unknown"),
            "push message received"
        );
        let summary = message.summary();
        self.latest.send_replace(Some(message));
        self.notifications.enqueue(NotificationRequest::info(summary));
        self.router.invalidate_all();
        PushOutcome::Delivered
    }

    /// Most recent well-formed message.
    #[must_use]
    pub fn latest(&self) -> Option<PushMessage> {
        self.latest.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_latest(&self) -> watch::Receiver<Option<PushMessage>> {
        self.latest.subscribe()
    }
}

impl fmt::Debug for PushDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushDispatcher")
            .field("has_latest", &self.latest.borrow().is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// PushListener
// ---------------------------------------------------------------------------

/// Handle to the background push task.
pub struct PushListener {
    state: Arc<ArcSwap<ConnectionState>>,
    dispatcher: Arc<PushDispatcher>,
    shutdown_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl PushListener {
    /// Spawns the listener task on the current tokio runtime.
    #[must_use]
    pub fn start(
        config: PushConfig,
        user_id: impl Into<String>,
        transport: Arc<dyn PushTransport>,
        credentials: Arc<dyn CredentialProvider>,
        dispatcher: Arc<PushDispatcher>,
    ) -> Self {
        let state = Arc::new(ArcSwap::from_pointee(ConnectionState::Disconnected));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let user_id: String = user_id.into();

        let session = Session {
            destination: config.destination(&user_id),
            config,
            transport,
            credentials,
            dispatcher: Arc::clone(&dispatcher),
            state: Arc::clone(&state),
        };
        let handle = tokio::spawn(session.run(shutdown_rx));

        Self {
            state,
            dispatcher,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        **self.state.load()
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<PushDispatcher> {
        &self.dispatcher
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Deactivates the listener: sends `DISCONNECT` on an open connection
    /// and waits for the task to finish. Returns `false` if already stopped.
    pub async fn stop(&mut self) -> bool {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return false;
        };
        let _ = shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "push listener task failed");
            }
        }
        self.state.store(Arc::new(ConnectionState::Disconnected));
        true
    }
}

impl Drop for PushListener {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
    }
}

impl fmt::Debug for PushListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushListener")
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Session loop
// ---------------------------------------------------------------------------

enum Exit {
    Shutdown,
    Lost(PushError),
}

struct Session {
    config: PushConfig,
    destination: String,
    transport: Arc<dyn PushTransport>,
    credentials: Arc<dyn CredentialProvider>,
    dispatcher: Arc<PushDispatcher>,
    state: Arc<ArcSwap<ConnectionState>>,
}

impl Session {
    fn set_state(&self, state: ConnectionState) {
        self.state.store(Arc::new(state));
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        while !*shutdown.borrow() {
            self.set_state(ConnectionState::Connecting);
            let err = match self.connect_and_listen(&mut shutdown).await {
                Exit::Shutdown => break,
                Exit::Lost(err) => err,
            };
            self.set_state(ConnectionState::Disconnected);
            tracing::warn!(
                error = %err,
                retry_in = ?self.config.reconnect_delay,
                "push connection lost"
            );

            tokio::select! {
                () = tokio::time::sleep(self.config.reconnect_delay) => {}
                _ = shutdown.changed() => break,
            }
        }
        self.set_state(ConnectionState::Disconnected);
        tracing::info!(destination = %self.destination, "push listener stopped");
    }

    async fn connect_and_listen(&self, shutdown: &mut watch::Receiver<bool>) -> Exit {
        let timeout = self.config.connect_timeout;
        let established = tokio::select! {
            result = tokio::time::timeout(timeout, self.establish()) => result,
            _ = shutdown.changed() => return Exit::Shutdown,
        };
        let mut connection = match established {
            Ok(Ok(connection)) => connection,
            Ok(Err(err)) => return Exit::Lost(err),
            Err(_) => return Exit::Lost(PushError::Timeout(timeout)),
        };

        self.set_state(ConnectionState::Connected);
        tracing::info!(url = %self.config.url, destination = %self.destination, "push channel connected");

        let exit = loop {
            tokio::select! {
                incoming = connection.recv() => match incoming {
                    None => break Exit::Lost(PushError::Closed),
                    Some(Err(err)) => break Exit::Lost(PushError::Transport(err)),
                    Some(Ok(text)) => {
                        if let Err(err) = self.on_text(&text) {
                            break Exit::Lost(err);
                        }
                    }
                },
                _ = shutdown.changed() => break Exit::Shutdown,
            }
        };

        if matches!(exit, Exit::Shutdown) {
            if let Err(err) = connection.send(disconnect_frame().encode()).await {
                tracing::debug!(error = %err, "DISCONNECT not sent");
            }
        }
        if let Err(err) = connection.close().await {
            tracing::debug!(error = %err, "push connection close failed");
        }
        exit
    }

    async fn establish(&self) -> Result<Box<dyn PushConnection>, PushError> {
        let authorization = self
            .credentials
            .authorization()
            .await
            .map_err(PushError::Credentials)?;
        let mut connection = self
            .transport
            .connect(&self.config.url, authorization.as_deref())
            .await
            .map_err(PushError::Transport)?;

        connection
            .send(connect_frame(authorization.as_deref()).encode())
            .await
            .map_err(PushError::Transport)?;

        loop {
            let text = match connection.recv().await {
                Some(result) => result.map_err(PushError::Transport)?,
                None => return Err(PushError::Closed),
            };
            let Some(frame) = Frame::decode(&text)? else {
                continue;
            };
            match frame.command {
                Command::Connected => break,
                Command::Error => return Err(PushError::Rejected(error_text(&frame))),
                other => return Err(PushError::UnexpectedFrame(other)),
            }
        }

        connection
            .send(subscribe_frame(SUBSCRIPTION_ID, &self.destination).encode())
            .await
            .map_err(PushError::Transport)?;
        Ok(connection)
    }

    fn on_text(&self, text: &str) -> Result<(), PushError> {
        let frame = match Frame::decode(text) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(err) => {
                tracing::debug!(error = %err, "undecodable push frame discarded");
                return Ok(());
            }
        };
        match frame.command {
            Command::Message => {
                self.dispatcher.deliver(&frame.body);
                Ok(())
            }
            Command::Error => Err(PushError::Rejected(error_text(&frame))),
            other => {
                tracing::trace!(command = %other, "push frame ignored");
                Ok(())
            }
        }
    }
}

fn error_text(frame: &Frame) -> String {
    frame
        .get("message")
        .map_or_else(|| frame.body.clone(), str::to_string)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
