//! Real-time push channel: STOMP over WebSocket.

pub mod credentials;
pub mod listener;
pub mod memory;
pub mod transport;
pub mod ws;

pub use credentials::{EnvCredentials, StaticCredentials};
pub use listener::{ConnectionState, PushDispatcher, PushListener, PushOutcome};
pub use memory::{memory_transport, MemoryBroker, MemorySession, MemoryTransport};
pub use transport::{PushConnection, PushError, PushTransport};
pub use ws::WsTransport;
