//! # echo-core
//!
//! Channels, per-channel event buses and the connector of Echo Cluster.
//!
//! - **EventBus** - last-registration-wins map from event name to callback
//! - **SocketChannel** - public channel: subscribe, relay, listen
//! - **PrivateChannel** - authenticated channel with client whispers
//! - **PresenceChannel** - private channel with membership callbacks
//! - **Connector** - owns the socket and the channel registry
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌───────────────┐     ┌─────────────┐
//! │  Connector  │────▶│ SocketChannel │────▶│  EventBus   │
//! └─────────────┘     └───────────────┘     └─────────────┘
//!        │                    ▲
//!        ▼                    │ watch
//! ┌─────────────┐             │
//! │   Socket    │─────────────┘
//! └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use echo_core::{Backend, Channel, Connector};
//! use echo_protocol::{Envelope, Options};
//! use echo_transport::MemoryClient;
//! use std::sync::Arc;
//!
//! let client = Arc::new(MemoryClient::new());
//! let connector = Connector::new(Options::new(), Backend::new(client.clone())).unwrap();
//!
//! connector
//!     .channel("orders")
//!     .unwrap()
//!     .listen("OrderShipped", |data| println!("shipped: {data}"))
//!     .unwrap();
//!
//! let socket = client.socket().unwrap();
//! socket.deliver(
//!     "orders",
//!     &Envelope::new("App\\Events\\OrderShipped", serde_json::json!({"id": 7})),
//! );
//! ```

pub mod channel;
pub mod connector;
pub mod event_bus;
pub mod handlers;
pub mod metrics;
pub mod presence_channel;
pub mod private_channel;
pub mod socket_channel;

pub use channel::{Channel, ChannelError, ChannelKind, ChannelState};
pub use connector::{Backend, Connector, ConnectorError, RegisteredChannel};
pub use event_bus::{EventBus, EventBusError, EventCallback, UnsubscribeToken};
pub use handlers::{ConnectionEvent, HandlerRegistry};
pub use presence_channel::PresenceChannel;
pub use private_channel::PrivateChannel;
pub use socket_channel::SocketChannel;
