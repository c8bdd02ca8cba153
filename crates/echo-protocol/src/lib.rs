//! # echo-protocol
//!
//! Payload definitions shared by the Echo Cluster client crates.
//!
//! This crate defines what travels over a SocketCluster-style connection on
//! behalf of a broadcasting client: channel envelopes, presence actions and
//! authentication requests, plus the naming conventions layered on top of
//! them.
//!
//! ## Payloads
//!
//! - `Envelope` - `{event, data}` message delivered on a watched channel
//! - `PresenceAction` - join/leave notification from a presence tracker
//! - `AuthRequest` - `login` payload sent for private and presence channels
//! - `Options` - the dynamic option bag handed to channels and the transport
//!
//! ## Example
//!
//! ```rust
//! use echo_protocol::{codec, Envelope, EventFormatter};
//!
//! let formatter = EventFormatter::new(Some("App.Events"));
//! assert_eq!(formatter.format("OrderShipped"), "App\\Events\\OrderShipped");
//!
//! let envelope = Envelope::new("App\\Events\\OrderShipped", serde_json::json!({"id": 7}));
//! let encoded = codec::encode(&envelope).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(envelope, decoded);
//! ```

pub mod codec;
pub mod envelope;
pub mod events;
pub mod options;

pub use codec::{decode, encode, ProtocolError};
pub use envelope::{AuthForm, AuthRequest, Envelope, PresenceAction, PresenceActionKind, Publication};
pub use events::EventFormatter;
pub use options::{Options, OptionsError};
