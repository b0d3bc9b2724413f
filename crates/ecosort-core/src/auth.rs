//! Optional API key authentication.
//!
//! Authentication is opt-in: with no key configured every request is
//! authorized. With a key configured, the presented credential must match.
//!
//! ## Comparison
//!
//! Both the configured and the presented key are hashed with SHA-256 and the
//! digests compared in constant time, so neither the key length nor a shared
//! prefix is observable through response timing.
//!
//! ## Usage
//!
//! ```
//! use ecosort_core::auth::{AuthError, AuthGuard};
//!
//! let open = AuthGuard::new(None);
//! assert!(open.authorize(None).is_ok());
//!
//! let guard = AuthGuard::with_key("0123456789abcdef");
//! assert!(guard.authorize(Some("0123456789abcdef")).is_ok());
//! assert_eq!(guard.authorize(None).unwrap_err(), AuthError::Missing);
//! assert_eq!(guard.authorize(Some("nope")).unwrap_err(), AuthError::Invalid);
//! ```

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Authentication errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No credential was presented.
    #[error("API key required")]
    Missing,

    /// The presented credential does not match.
    #[error("invalid API key")]
    Invalid,
}

/// Result type for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// A configured API key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps a key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key material.
    pub fn expose(&self) -> &str {
        &self.0
    }

    fn digest(&self) -> [u8; 32] {
        digest(&self.0)
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

fn digest(value: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(value.as_bytes()));
    out
}

/// Proof that a request passed the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorized {
    /// Authentication is disabled.
    Open,
    /// A valid key was presented. Holds a short fingerprint of the key.
    Key(String),
}

impl Authorized {
    /// Fingerprint of the accepted key, used to partition rate limits.
    pub fn key_fingerprint(&self) -> Option<&str> {
        match self {
            Authorized::Open => None,
            Authorized::Key(fp) => Some(fp),
        }
    }
}

/// Checks presented API keys against the configured key.
#[derive(Debug, Clone, Default)]
pub struct AuthGuard {
    key: Option<ApiKey>,
}

impl AuthGuard {
    /// Creates a guard. `None` disables authentication.
    pub fn new(key: Option<ApiKey>) -> Self {
        Self { key }
    }

    /// Creates a guard requiring `key`.
    pub fn with_key(key: impl Into<String>) -> Self {
        Self::new(Some(ApiKey::new(key)))
    }

    /// Whether a key is required.
    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Authorizes a presented credential.
    pub fn authorize(&self, presented: Option<&str>) -> Result<Authorized> {
        let Some(expected) = &self.key else {
            return Ok(Authorized::Open);
        };

        let presented = presented.map(str::trim).filter(|p| !p.is_empty());
        let Some(presented) = presented else {
            return Err(AuthError::Missing);
        };

        let presented_digest = digest(presented);
        if bool::from(presented_digest[..].ct_eq(&expected.digest()[..])) {
            Ok(Authorized::Key(fingerprint(&presented_digest)))
        } else {
            Err(AuthError::Invalid)
        }
    }
}

fn fingerprint(digest: &[u8; 32]) -> String {
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Extracts the credential from `X-API-Key` or `Authorization: Bearer` values.
///
/// `X-API-Key` wins when both are present.
pub fn credential_from_headers<'a>(
    x_api_key: Option<&'a str>,
    authorization: Option<&'a str>,
) -> Option<&'a str> {
    if let Some(key) = x_api_key.map(str::trim).filter(|k| !k.is_empty()) {
        return Some(key);
    }

    let auth = authorization?.trim();
    let (scheme, token) = auth.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim()).filter(|t| !t.is_empty())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0123456789abcdef-secret";

    #[test]
    fn no_key_configured_allows_everything() {
        let guard = AuthGuard::new(None);
        assert!(!guard.is_enabled());
        assert_eq!(guard.authorize(None), Ok(Authorized::Open));
        assert_eq!(guard.authorize(Some("anything")), Ok(Authorized::Open));
    }

    #[test]
    fn correct_key_accepted() {
        let guard = AuthGuard::with_key(KEY);
        let auth = guard.authorize(Some(KEY)).unwrap();
        assert!(auth.key_fingerprint().is_some());
        assert_eq!(auth.key_fingerprint().unwrap().len(), 16);
    }

    #[test]
    fn missing_key_rejected() {
        let guard = AuthGuard::with_key(KEY);
        assert_eq!(guard.authorize(None), Err(AuthError::Missing));
        assert_eq!(guard.authorize(Some("   ")), Err(AuthError::Missing));
    }

    #[test]
    fn wrong_key_rejected() {
        let guard = AuthGuard::with_key(KEY);
        assert_eq!(guard.authorize(Some("wrong")), Err(AuthError::Invalid));
    }

    #[test]
    fn prefix_and_extension_rejected() {
        let guard = AuthGuard::with_key(KEY);
        assert_eq!(guard.authorize(Some(&KEY[..10])), Err(AuthError::Invalid));
        let longer = format!("{}x", KEY);
        assert_eq!(guard.authorize(Some(&longer)), Err(AuthError::Invalid));
    }

    #[test]
    fn fingerprint_is_stable() {
        let guard = AuthGuard::with_key(KEY);
        let a = guard.authorize(Some(KEY)).unwrap();
        let b = guard.authorize(Some(KEY)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new(KEY);
        let printed = format!("{:?}", key);
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn credential_prefers_x_api_key() {
        assert_eq!(
            credential_from_headers(Some("abc"), Some("Bearer xyz")),
            Some("abc")
        );
    }

    #[test]
    fn credential_from_bearer() {
        assert_eq!(credential_from_headers(None, Some("Bearer xyz")), Some("xyz"));
        assert_eq!(credential_from_headers(None, Some("bearer  xyz ")), Some("xyz"));
        assert_eq!(credential_from_headers(Some(""), Some("Bearer xyz")), Some("xyz"));
    }

    #[test]
    fn credential_ignores_other_schemes() {
        assert_eq!(credential_from_headers(None, Some("Basic dXNlcg==")), None);
        assert_eq!(credential_from_headers(None, Some("Bearer")), None);
        assert_eq!(credential_from_headers(None, None), None);
    }
}
