//! Outbound request interception.
//!
//! HTTP clients are not part of this workspace. An application that sends
//! its own requests exposes an [`InterceptorRegistry`]; the facade registers
//! a [`SocketIdInterceptor`] there so the server can exclude the current
//! connection from broadcasts it triggers.

use echo_transport::Socket;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Header carrying the connection identifier.
pub const SOCKET_ID_HEADER: &str = "X-Socket-Id";

/// An outbound HTTP request, reduced to what interceptors touch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundRequest {
    /// HTTP method.
    pub method: String,
    /// Target URL.
    pub url: String,
    /// Request headers.
    pub headers: BTreeMap<String, String>,
}

impl OutboundRequest {
    /// Create a request without headers.
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }
}

/// Mutates outbound requests before they are sent.
pub trait RequestInterceptor: Send + Sync {
    /// Adjust `request` in place.
    fn intercept(&self, request: &mut OutboundRequest);
}

/// Hook an HTTP client exposes for request interceptors.
pub trait InterceptorRegistry {
    /// Add an interceptor.
    fn register(&self, interceptor: Arc<dyn RequestInterceptor>);
}

/// Ordered list of interceptors.
#[derive(Default)]
pub struct Interceptors {
    interceptors: RwLock<Vec<Arc<dyn RequestInterceptor>>>,
}

impl Interceptors {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every interceptor over `request`, in registration order.
    pub fn apply(&self, request: &mut OutboundRequest) {
        let interceptors = self.interceptors.read().clone();
        for interceptor in interceptors {
            interceptor.intercept(request);
        }
    }

    /// Number of registered interceptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.read().len()
    }

    /// Check whether no interceptor is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InterceptorRegistry for Interceptors {
    fn register(&self, interceptor: Arc<dyn RequestInterceptor>) {
        self.interceptors.write().push(interceptor);
    }
}

impl fmt::Debug for Interceptors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptors")
            .field("len", &self.len())
            .finish()
    }
}

/// Adds `X-Socket-Id` while the socket has an identifier.
pub struct SocketIdInterceptor {
    socket: Arc<dyn Socket>,
}

impl SocketIdInterceptor {
    /// Read the identifier from `socket` at request time.
    #[must_use]
    pub fn new(socket: Arc<dyn Socket>) -> Self {
        Self { socket }
    }
}

impl RequestInterceptor for SocketIdInterceptor {
    fn intercept(&self, request: &mut OutboundRequest) {
        if let Some(id) = self.socket.id() {
            request.headers.insert(SOCKET_ID_HEADER.to_owned(), id.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echo_transport::MemorySocket;

    #[test]
    fn test_socket_id_header() {
        let socket = Arc::new(MemorySocket::with_id("sock-1"));
        let interceptors = Interceptors::new();
        interceptors.register(Arc::new(SocketIdInterceptor::new(socket.clone())));

        let mut request = OutboundRequest::new("POST", "/orders");
        interceptors.apply(&mut request);
        assert_eq!(request.headers.get(SOCKET_ID_HEADER).map(String::as_str), Some("sock-1"));

        socket.destroy().unwrap();
        let mut request = OutboundRequest::new("POST", "/orders");
        interceptors.apply(&mut request);
        assert!(request.headers.is_empty());
    }

    #[test]
    fn test_interceptors_run_in_order() {
        struct Tag(&'static str);
        impl RequestInterceptor for Tag {
            fn intercept(&self, request: &mut OutboundRequest) {
                request.headers.insert("X-Tag".into(), self.0.into());
            }
        }

        let interceptors = Interceptors::new();
        interceptors.register(Arc::new(Tag("first")));
        interceptors.register(Arc::new(Tag("second")));

        let mut request = OutboundRequest::new("GET", "/");
        interceptors.apply(&mut request);
        assert_eq!(request.headers["X-Tag"], "second");
        assert_eq!(interceptors.len(), 2);
    }
}
