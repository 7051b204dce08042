//! Structural inspection of session tokens.
//!
//! The route guard only needs to know whether a cookie *looks* like a JWT
//! and whether its `exp` claim has passed. No signature is checked here;
//! that happens in [`crate::auth::issuer`] when a page actually needs the user.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use serde_json::Value;
use thiserror::Error;

/// base64url that accepts both padded and unpadded input.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Errors raised while reading or verifying a token.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenError {
    #[error("Token must have three dot-separated segments")]
    Malformed,

    #[error("Token payload is not valid base64url: {message}")]
    Encoding { message: String },

    #[error("Token payload is not a JSON object: {message}")]
    Payload { message: String },

    #[error("Token expired")]
    Expired,

    #[error("Token rejected: {message}")]
    Rejected { message: String },
}

/// What the guard knows about the cookie on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Missing,
    Malformed,
    Expired,
    Live,
}

pub fn is_valid_structure(token: &str) -> bool {
    token.split('.').count() == 3
}

/// Decode the claims segment without verifying anything.
pub fn decode_claims(token: &str) -> Result<Value, TokenError> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(TokenError::Malformed),
    };

    let bytes = URL_SAFE_LENIENT
        .decode(payload)
        .map_err(|err| TokenError::Encoding { message: err.to_string() })?;

    let claims: Value = serde_json::from_slice(&bytes)
        .map_err(|err| TokenError::Payload { message: err.to_string() })?;

    if !claims.is_object() {
        return Err(TokenError::Payload { message: "expected an object".into() });
    }
    Ok(claims)
}

/// `true` when the token cannot be read or its `exp` lies before `now`.
///
/// A payload without a numeric, non-zero `exp` never expires.
pub fn is_expired(token: &str, now: i64) -> bool {
    match decode_claims(token) {
        Ok(claims) => match claims.get("exp").and_then(Value::as_f64) {
            Some(exp) if exp != 0.0 => exp < now as f64,
            _ => false,
        },
        Err(_) => true,
    }
}

pub fn inspect(token: Option<&str>, now: i64) -> TokenState {
    match token {
        None => TokenState::Missing,
        Some(t) if t.is_empty() => TokenState::Missing,
        Some(t) if !is_valid_structure(t) => TokenState::Malformed,
        Some(t) if is_expired(t, now) => TokenState::Expired,
        Some(_) => TokenState::Live,
    }
}
