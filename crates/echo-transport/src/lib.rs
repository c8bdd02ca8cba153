//! # echo-transport
//!
//! Transport abstraction layer for Echo Cluster.
//!
//! The channel layer never talks to a concrete socket library. It drives the
//! `Socket` trait (subscribe, watch, publish, emit) and the `PresenceTracker`
//! trait, and receives connections from a `SocketFactory` supplied at
//! connector construction.
//!
//! ## Implementations
//!
//! - **memory** - in-process loopback socket and presence tracker, used by
//!   tests and by the replay tool
//!
//! ```rust
//! use echo_transport::{MemoryClient, Socket, SocketFactory};
//! use echo_protocol::Options;
//!
//! let client = MemoryClient::new();
//! let socket = client.create(&Options::new()).unwrap();
//! socket.subscribe("orders", &Options::new()).unwrap();
//! ```

pub mod traits;

#[cfg(feature = "memory")]
pub mod memory;

pub use traits::{
    AckHandler, AuthState, EventHandler, ListenerId, PresenceFactory, PresenceHandler,
    PresenceTracker, Socket, SocketFactory, SocketId, TransportError, WatchHandler, WatcherId,
};

#[cfg(feature = "memory")]
pub use memory::{MemoryClient, MemoryPresence, MemoryPresenceFactory, MemorySocket};
