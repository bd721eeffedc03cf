use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by backend access tokens. Only the fields the client
/// needs are modelled; the backend may add more.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl AccessClaims {
    pub fn new(subject_id: &str, email: Option<&str>, ttl_secs: u64) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::seconds(ttl_secs as i64)).timestamp();

        Self {
            sub: subject_id.to_string(),
            email: email.map(str::to_string),
            exp,
            iat: now.timestamp(),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

#[derive(Debug)]
pub enum TokenError {
    TokenGeneration(String),
    InvalidToken(String),
    InvalidSecret,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::TokenGeneration(msg) => write!(f, "Token generation error: {}", msg),
            TokenError::InvalidToken(msg) => write!(f, "Invalid access token: {}", msg),
            TokenError::InvalidSecret => write!(f, "Invalid token secret"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Mint an HS256 access token. Used by the in-memory backend.
pub fn issue_access_token(claims: &AccessClaims, secret: &str) -> Result<String, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key)
        .map_err(|e| TokenError::TokenGeneration(e.to_string()))
}

/// Read the claims of a token issued by the hosted backend.
///
/// The client cannot verify the signature (the backend holds the key), so
/// this only extracts subject and expiry; the backend stays the authority on
/// whether the token is accepted.
pub fn read_access_claims(token: &str) -> Result<AccessClaims, TokenError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| TokenError::InvalidToken(e.to_string()))
}
