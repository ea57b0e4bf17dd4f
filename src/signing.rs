//! URL signing for lazily computed derivatives
//!
//! An on-demand store hands out URLs for derivatives that do not exist yet.
//! Whatever serves those URLs computes the derivative on first fetch, so it
//! must be able to tell a URL we issued from one a client made up. The
//! signer binds the derivative path (and any runtime filter options) to a
//! secret:
//!
//! ```text
//! hash = base64url(HMAC-SHA256(secret, path + json(runtime_options)))
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::options::NamedOptions;

type HmacSha256 = Hmac<Sha256>;

/// Opaque sign/verify service
pub trait UrlSigner: Send + Sync {
    /// Signature for `path`, optionally bound to runtime filter options
    fn sign(&self, path: &str, runtime_options: Option<&NamedOptions>) -> String;

    /// Check a signature produced by [`UrlSigner::sign`]
    fn verify(&self, hash: &str, path: &str, runtime_options: Option<&NamedOptions>) -> bool {
        constant_time_compare(hash, &self.sign(path, runtime_options))
    }
}

/// HMAC-SHA256 signer with a shared secret
pub struct HmacUrlSigner {
    secret: Vec<u8>,
}

impl HmacUrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for HmacUrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacUrlSigner")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl UrlSigner for HmacUrlSigner {
    fn sign(&self, path: &str, runtime_options: Option<&NamedOptions>) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");

        mac.update(path.trim_start_matches('/').as_bytes());
        if let Some(options) = runtime_options.filter(|o| !o.is_empty()) {
            // NamedOptions serializes in declaration order, so equal option
            // lists always produce equal bytes
            if let Ok(encoded) = serde_json::to_vec(options) {
                mac.update(&encoded);
            }
        }

        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
