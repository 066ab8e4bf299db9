//! Session cookie signature
//!
//! The cookie value is `session_id + "." + base64url(hmac_sha256(session_id, secret))`
//! without padding. Several secrets may be configured: the first signs, every
//! one of them verifies, so secrets can be rotated without logging everyone
//! out.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies session cookie values
#[derive(Clone)]
pub struct CookieSigner {
    secrets: Vec<String>,
}

impl CookieSigner {
    /// Create a signer; `None` when no secret is given
    pub fn new<I, S>(secrets: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let secrets: Vec<String> = secrets
            .into_iter()
            .map(Into::into)
            .filter(|s: &String| !s.is_empty())
            .collect();
        if secrets.is_empty() {
            None
        } else {
            Some(Self { secrets })
        }
    }

    /// Sign a session id with the current secret
    pub fn sign(&self, session_id: &str) -> String {
        let tag = mac(session_id, &self.secrets[0]).finalize().into_bytes();
        format!("{}.{}", session_id, URL_SAFE_NO_PAD.encode(tag))
    }

    /// Return the session id if any secret produced the signature
    pub fn verify(&self, cookie_value: &str) -> Option<String> {
        let (session_id, signature) = cookie_value.rsplit_once('.')?;
        if session_id.is_empty() {
            return None;
        }
        let tag = URL_SAFE_NO_PAD.decode(signature).ok()?;
        self.secrets
            .iter()
            // verify_slice compares in constant time
            .any(|secret| mac(session_id, secret).verify_slice(&tag).is_ok())
            .then(|| session_id.to_string())
    }
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner")
            .field("secrets", &self.secrets.len())
            .finish()
    }
}

fn mac(value: &str, secret: &str) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(value.as_bytes());
    mac
}
