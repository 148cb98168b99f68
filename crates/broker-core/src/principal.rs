//! Caller identity (spec §4.8): the facade records who asked for a given operation so it can be
//! attached to instance labels and surfaced on LastOperation output.

use std::fmt;

/// An opaque caller identifier extracted from the request by whatever auth scheme is mounted in
/// front of the facade (HTTP Basic username, JWT subject claim, mTLS common name, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal(String);

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Implemented by the HTTP layer's auth middleware; kept here so `broker-core` can accept a
/// `Principal` without depending on `axum` or any particular auth transport.
pub trait PrincipalSource: Send + Sync {
    fn principal(&self) -> Option<Principal>;
}
