use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

const TOKEN_BYTES: usize = 32;

/// Create an opaque bearer value (refresh token or CSRF companion).
/// The raw value only ever travels to the client.
pub fn generate_opaque_token() -> Result<String, rand::Error> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Hashes refresh-token values as `SHA256(pepper || value)`, hex encoded.
#[derive(Clone)]
pub struct TokenHasher {
    pepper: Vec<u8>,
}

impl TokenHasher {
    pub fn new(pepper: impl AsRef<[u8]>) -> Self {
        Self {
            pepper: pepper.as_ref().to_vec(),
        }
    }

    pub fn hash(&self, token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.pepper);
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Debug for TokenHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenHasher")
            .field("pepper", &"<redacted>")
            .finish()
    }
}

/// Equality that does not stop at the first differing byte.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
