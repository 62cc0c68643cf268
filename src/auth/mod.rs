pub mod middleware;

/// Caller credential attached to request extensions by the auth middleware.
///
/// Only presence has been checked at this point; whether the token belongs to
/// a known client is decided by the meter.
#[derive(Clone)]
pub struct AuthToken(pub String);

impl AuthToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens are credentials; keep them out of logs.
impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken(***)")
    }
}
