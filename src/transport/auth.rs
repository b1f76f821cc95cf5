//! Request authentication.

use std::fmt;

use reqwest::header::AUTHORIZATION;
use reqwest::RequestBuilder;

/// Decorates every outbound request before it is sent.
pub trait AuthInterceptor: Send + Sync + fmt::Debug {
    /// Attach credentials to the request.
    fn apply(&self, request: RequestBuilder) -> RequestBuilder;
}

/// Sends requests unauthenticated.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl AuthInterceptor for NoAuth {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request
    }
}

/// Sets a fixed `Authorization` header.
#[derive(Clone)]
pub struct AuthorizationHeader {
    value: String,
}

impl AuthorizationHeader {
    /// Use `value` verbatim (e.g. `Bearer <token>`).
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// `Bearer <token>`
    pub fn bearer(token: &str) -> Self {
        Self::new(format!("Bearer {token}"))
    }
}

impl fmt::Debug for AuthorizationHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationHeader")
            .field("value", &"<redacted>")
            .finish()
    }
}

impl AuthInterceptor for AuthorizationHeader {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTHORIZATION, &self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_header_applied() {
        let client = reqwest::Client::new();
        let request = AuthorizationHeader::bearer("abc")
            .apply(client.post("http://localhost/negotiations/request"))
            .build()
            .unwrap();
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer abc");

        let request = NoAuth
            .apply(client.post("http://localhost/negotiations/request"))
            .build()
            .unwrap();
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_debug_redacts_value() {
        let debug = format!("{:?}", AuthorizationHeader::new("Basic secret"));
        assert!(!debug.contains("secret"));
    }
}
