//! Room-addressed WebSocket relay for plugin development sessions.
//!
//! During development a plugin runs in three places at once: the design tool's
//! plugin sandbox, a browser preview tab, and host tooling such as test
//! runners. None of them can address each other directly, so this crate
//! relays JSON events between them, partitioned by *room*:
//!
//! - Every connection must present a room at handshake (query parameter or a
//!   first `join` frame) and may join further rooms later.
//! - Events addressed to a room with members are emitted immediately; events
//!   addressed to an empty room are queued and flushed FIFO to the first
//!   joiner within a configurable TTL.
//! - Events without a room broadcast to every connected socket.
//! - A heartbeat terminates connections that stop answering pings.
//!
//! # Example
//!
//! ```rust,no_run
//! use plinth_relay::{RelayConfig, RelayServer};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), plinth_relay::RelayError> {
//! let handle = RelayServer::new(RelayConfig::default()).start().await?;
//! println!("relay listening on {}", handle.addr());
//! // ... dev session runs ...
//! handle.close().await;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod protocol;
mod rooms;
mod server;

pub use error::RelayError;
pub use protocol::{BridgeEnvelope, BridgeEvent, ClientInfo, Envelope, PluginMessage};
pub use rooms::Registry;
pub use server::{RelayConfig, RelayHandle, RelayServer};
