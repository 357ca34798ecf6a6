/// JWT Token Generation and Validation
///
/// Access tokens are HS256 JWTs carrying [`Claims`]. Refresh tokens are opaque
/// UUID v7 strings with no embedded claims.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::{Claims, ISSUER};
use crate::error::AuthError;

const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;
const BEARER_SCHEME: &str = "Bearer";

/// Generate a new access token for an identity
///
/// # Errors
/// Returns `AuthError::TokenGeneration` if signing fails
pub fn generate_access_token(
    identity_id: &Uuid,
    email: &str,
    role: &str,
    secret: &[u8],
    ttl: Duration,
) -> Result<String, AuthError> {
    let claims = Claims::new(*identity_id, email, role, Utc::now(), ttl);
    sign_claims(&claims, secret)
}

/// Sign prepared claims. Identical claims and secret give an identical token.
pub fn sign_claims(claims: &Claims, secret: &[u8]) -> Result<String, AuthError> {
    encode(
        &Header::new(SIGNING_ALGORITHM),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::TokenGeneration(e.to_string()))
}

/// Generate an opaque, unguessable, time-ordered refresh token
pub fn generate_refresh_token() -> String {
    Uuid::now_v7().to_string()
}

/// Validate an access token and return its claims
///
/// # Errors
/// - `AuthError::TokenExpired` for a correctly signed token past its `exp`
/// - `AuthError::TokenInvalid` for everything else: bad signature, a different
///   or `none` algorithm, wrong issuer, malformed structure
pub fn validate_access_token(token: &str, secret: &[u8]) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(SIGNING_ALGORITHM);
    validation.leeway = 0;
    validation.validate_nbf = true;
    validation.set_issuer(&[ISSUER]);
    validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);

    decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => {
                tracing::debug!(error = %e, "Access token rejected");
                AuthError::TokenInvalid
            }
        })
}

/// Extract the token from an `Authorization: Bearer <token>` header value
///
/// # Errors
/// Returns `AuthError::MissingToken` for any other shape
pub fn extract_token_from_header(header_value: &str) -> Result<&str, AuthError> {
    let mut parts = header_value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(BEARER_SCHEME), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MissingToken),
    }
}
