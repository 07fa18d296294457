//! Authentication: a single configured credential stamped onto every
//! outgoing request, except the handful of paths that are exempt.

use base64::Engine;

/// The credential a [`crate::client::Client`] attaches to requests.
#[derive(Debug, Clone)]
pub enum AuthConfig {
    /// No `Authorization` header is sent.
    None,
    /// HTTP Basic auth; the header value is pre-encoded at construction.
    Basic {
        /// The username.
        username: String,
        /// The password.
        password: String,
    },
    /// A bearer token, sent as `Authorization: Token <token>` (InfluxDB's
    /// own scheme, not OAuth's `Bearer`).
    Token {
        /// The token value.
        token: String,
    },
}

impl AuthConfig {
    /// Build the `Authorization` header value for this credential, or
    /// `None` if no credential is configured.
    pub fn header_value(&self) -> Option<String> {
        match self {
            AuthConfig::None => None,
            AuthConfig::Basic { username, password } => {
                let raw = format!("{username}:{password}");
                let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
                Some(format!("Basic {encoded}"))
            }
            AuthConfig::Token { token } => Some(format!("Token {token}")),
        }
    }
}

/// Paths that never receive an `Authorization` header, regardless of the
/// configured [`AuthConfig`]: the liveness probe and preflight `OPTIONS`
/// requests.
pub fn is_auth_exempt(path: &str, method: &str) -> bool {
    if path == "/ping" {
        return true;
    }
    if method.eq_ignore_ascii_case("OPTIONS") {
        return true;
    }
    false
}
