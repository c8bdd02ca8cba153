//! # echo-client
//!
//! Broadcasting client facade for Echo Cluster.
//!
//! `Echo` validates the broadcaster, builds a [`echo_core::Connector`] from
//! the supplied transport backend and exposes the channel factories
//! (`channel`, `private`, `join`), `leave`, `listen`, `socket_id` and
//! `disconnect`. Configuration is loaded from TOML and `ECHO_*` environment
//! variables.
//!
//! ## Usage
//!
//! ```rust
//! use echo_client::{Echo, EchoConfig};
//! use echo_core::{Backend, Channel};
//! use echo_transport::MemoryClient;
//! use std::sync::Arc;
//!
//! let options = EchoConfig::default().into_options().with("broadcaster", "socketcluster");
//! let echo = Echo::new(options, Backend::new(Arc::new(MemoryClient::new()))).unwrap();
//!
//! echo.channel("orders")
//!     .unwrap()
//!     .listen("OrderShipped", |data| println!("{data}"))
//!     .unwrap();
//! ```

pub mod config;
pub mod echo;
pub mod interceptor;
pub mod telemetry;

pub use config::{AuthConfig, EchoConfig};
pub use echo::{listen_qualified, Echo, EchoError, BROADCASTER};
pub use interceptor::{
    InterceptorRegistry, Interceptors, OutboundRequest, RequestInterceptor, SocketIdInterceptor,
    SOCKET_ID_HEADER,
};
pub use telemetry::init_tracing;
