/// Authentication Routes
///
/// Maps HTTP requests onto `AuthService`: registration, login, token refresh,
/// logout, revocation and the current identity.

use actix_web::{http::header, web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{self, AuthService, Claims, SessionSummary};
use crate::domain::{ClientInfo, Identity};
use crate::error::{AppError, AuthError, ErrorContext};
use crate::security::RateLimiter;
use crate::validators::{
    is_strong_password, is_valid_email, is_valid_full_name, is_valid_identifier,
    is_valid_username,
};

/// User registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub full_name: String,
}

/// User login request. `identifier` is an email or a username.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

/// Body of refresh and logout requests
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Public view of an identity
#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub role: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<&Identity> for UserResponse {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id(),
            email: identity.email.clone(),
            username: identity.username.clone(),
            full_name: identity.full_name.clone(),
            role: identity.role.as_str().to_string(),
            status: identity.status().as_str().to_string(),
            created_at: identity.audit.created_at,
            last_login_at: identity.last_login_at,
        }
    }
}

/// Authentication response with access and refresh tokens
#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

impl From<auth::AuthResponse> for AuthResponse {
    fn from(response: auth::AuthResponse) -> Self {
        Self {
            user: UserResponse::from(&response.identity),
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_type: response.token_type.to_string(),
            expires_in: response.expires_in,
        }
    }
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Serialize)]
pub struct RevokeAllResponse {
    pub success: bool,
    pub revoked: u64,
}

/// Caller metadata for the session record and the rate limiter key.
/// The address is the socket peer; forwarding headers are client-controlled
/// and ignored.
fn client_info(req: &HttpRequest) -> ClientInfo {
    let origin = req
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_default();
    let agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    ClientInfo::new(origin, agent)
}

fn bearer_token(req: &HttpRequest) -> Result<&str, AuthError> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingToken)?;
    auth::extract_token_from_header(header)
}

/// POST /auth/register
///
/// Register a new identity and open its first session.
///
/// # Errors
/// - 400: Validation errors (email, username, full name, weak password)
/// - 409: Email or username already registered
/// - 429: Too many attempts from this address
pub async fn register(
    req: HttpRequest,
    form: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
    limiter: web::Data<RateLimiter>,
) -> Result<HttpResponse, AppError> {
    let client = client_info(&req);
    limiter.check(&client.origin_address)?;

    let form = form.into_inner();
    let email = is_valid_email(&form.email)?;
    let username = is_valid_username(&form.username)?;
    let full_name = is_valid_full_name(&form.full_name)?;
    is_strong_password(&form.password)?;

    let response = auth
        .register(auth::RegisterRequest {
            email,
            username,
            password: form.password,
            full_name,
            client,
        })
        .await?;

    Ok(HttpResponse::Created().json(AuthResponse::from(response)))
}

/// POST /auth/login
///
/// # Errors
/// - 401: Unknown identifier or wrong password (same response for both)
/// - 403: Account is inactive
/// - 429: Too many attempts from this address
pub async fn login(
    req: HttpRequest,
    form: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
    limiter: web::Data<RateLimiter>,
) -> Result<HttpResponse, AppError> {
    let client = client_info(&req);
    limiter.check(&client.origin_address)?;

    let form = form.into_inner();
    let identifier = is_valid_identifier(&form.identifier)?;

    let response = auth
        .login(auth::LoginRequest {
            identifier,
            password: form.password,
            client,
        })
        .await?;

    Ok(HttpResponse::Ok().json(AuthResponse::from(response)))
}

/// POST /auth/refresh
///
/// Mint a new access token. The refresh token is returned unchanged.
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let response = auth.refresh_token(&form.refresh_token).await?;

    Ok(HttpResponse::Ok().json(TokenResponse {
        access_token: response.access_token,
        refresh_token: response.refresh_token,
        token_type: response.token_type.to_string(),
        expires_in: response.expires_in,
    }))
}

/// POST /auth/logout
///
/// Always succeeds for unknown or already revoked tokens.
pub async fn logout(
    form: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.logout(&form.refresh_token).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// GET /auth/me
///
/// Requires `Authorization: Bearer <access_token>`. The identity is re-read
/// on every call, so a deactivated account is rejected with 403 even while
/// its access token is still valid.
pub async fn get_current_user(
    req: HttpRequest,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let token = bearer_token(&req)?;
    let identity = auth.get_identity_from_token(token).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(&identity)))
}

/// POST /auth/revoke-all
///
/// Logs the caller out everywhere.
pub async fn revoke_all(
    req: HttpRequest,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("revoke_all_tokens");
    let token = bearer_token(&req)?;
    let identity = auth.get_identity_from_token(token).await?;

    let revoked = auth
        .revoke_all_tokens(identity.id())
        .await
        .map_err(|e| {
            context
                .clone()
                .with_user_id(identity.id().to_string())
                .log_error(&e);
            e
        })?;

    Ok(HttpResponse::Ok().json(RevokeAllResponse {
        success: true,
        revoked,
    }))
}

/// GET /api/sessions
///
/// Open sessions of the caller, newest first. Claims are injected by
/// `JwtMiddleware`.
pub async fn list_sessions(
    claims: web::ReqData<Claims>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let sessions: Vec<SessionSummary> = auth
        .list_active_sessions(claims.user_id)
        .await?
        .iter()
        .map(SessionSummary::from)
        .collect();

    Ok(HttpResponse::Ok().json(sessions))
}
