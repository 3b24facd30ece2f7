use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use super::Claims;

#[derive(Clone)]
pub struct JwtKeys {
    pub enc: EncodingKey,
    pub dec: DecodingKey,
}

impl JwtKeys {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            enc: EncodingKey::from_secret(secret),
            dec: DecodingKey::from_secret(secret),
        }
    }
}

pub fn make_access_claims(user_id: &Uuid, issued_at: DateTime<Utc>, ttl_secs: u64) -> Claims {
    let iat = issued_at.timestamp();
    Claims {
        sub: user_id.to_string(),
        iat,
        exp: iat.saturating_add(i64::try_from(ttl_secs).unwrap_or(i64::MAX)),
    }
}

pub fn encode_token(keys: &JwtKeys, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
    let mut header = Header::new(Algorithm::HS256);
    header.typ = Some("JWT".into());
    encode(&header, claims, &keys.enc)
}

/// Checks the HS256 signature only. Expiry is judged by the caller against its own clock.
pub fn decode_token(keys: &JwtKeys, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    decode::<Claims>(token, &keys.dec, &validation).map(|data| data.claims)
}
