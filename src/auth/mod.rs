/// Authentication module
///
/// Password hashing, access/refresh token codec and the authentication core
/// that ties them to the repositories.

mod claims;
mod jwt;
mod password;
mod service;

pub use claims::{Claims, ISSUER};
pub use jwt::{
    extract_token_from_header, generate_access_token, generate_refresh_token, sign_claims,
    validate_access_token,
};
pub use password::{
    PasswordHasher, DEFAULT_HASH_COST, MAX_HASH_COST, MAX_PASSWORD_BYTES, MIN_HASH_COST,
};
pub use service::{
    AuthResponse, AuthService, LoginRequest, RefreshResponse, RegisterRequest, SessionSummary,
    TOKEN_TYPE,
};
