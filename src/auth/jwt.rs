use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::{America::Sao_Paulo, Tz};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

pub const ACCESS_TOKEN_TYPE: &str = "access_token";

/// Access tokens live for seven days.
pub const ACCESS_TOKEN_TTL_DAYS: i64 = 7;

/// Issue and expiry instants are taken on this clock regardless of server locale.
pub const TOKEN_TIMEZONE: Tz = Sao_Paulo;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "type")]
    pub token_type: String,
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// Signing material shared by issue and verify.
#[derive(Clone)]
pub struct TokenKeys {
    secret: String,
    algorithm: Algorithm,
}

impl TokenKeys {
    pub fn new(secret: impl Into<String>, algorithm: Algorithm) -> Self {
        Self { secret: secret.into(), algorithm }
    }
}

/// Current instant on the token clock.
pub fn now() -> DateTime<Tz> {
    Utc::now().with_timezone(&TOKEN_TIMEZONE)
}

pub fn generate(token_type: &str, ttl: Duration, sub: &str, keys: &TokenKeys) -> Result<String> {
    generate_at(token_type, now(), ttl, sub, keys)
}

pub fn generate_at(
    token_type: &str,
    issued_at: DateTime<Tz>,
    ttl: Duration,
    sub: &str,
    keys: &TokenKeys,
) -> Result<String> {
    let expires_at = issued_at + ttl;
    let claims = Claims {
        token_type: token_type.to_string(),
        sub: sub.to_string(),
        exp: expires_at.timestamp(),
        iat: issued_at.timestamp(),
    };
    let token = encode(
        &Header::new(keys.algorithm),
        &claims,
        &EncodingKey::from_secret(keys.secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn verify(token: &str, keys: &TokenKeys) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(keys.secret.as_bytes()),
        &Validation::new(keys.algorithm),
    )?;
    Ok(data.claims)
}
