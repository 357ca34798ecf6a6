use std::net::TcpListener;
use std::sync::Arc;

use authkeeper::auth::{AuthService, MIN_HASH_COST};
use authkeeper::configuration::{AuthSettings, RateLimitSettings};
use authkeeper::domain::EntityStatus;
use authkeeper::repository::{
    IdentityRepository, InMemoryIdentityRepository, InMemoryTokenRepository, TokenRepository,
};
use authkeeper::security::RateLimiter;
use authkeeper::startup::run;
use serde_json::{json, Value};

pub struct TestApp {
    pub address: String,
    pub identities: Arc<InMemoryIdentityRepository>,
    pub tokens: Arc<InMemoryTokenRepository>,
}

fn spawn_app() -> TestApp {
    spawn_app_with_rate_limit(0)
}

fn spawn_app_with_rate_limit(requests_per_minute: u32) -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let settings = AuthSettings {
        secret: "integration-test-secret-key-32-chars".to_string(),
        access_token_expiry: 3600,
        refresh_token_expiry: 604800,
        password_hash_cost: MIN_HASH_COST,
    };
    let identities = Arc::new(InMemoryIdentityRepository::new());
    let tokens = Arc::new(InMemoryTokenRepository::new());
    let auth = Arc::new(AuthService::new(identities.clone(), tokens.clone(), &settings));
    let limiter = Arc::new(RateLimiter::new(&RateLimitSettings {
        requests_per_minute,
    }));

    let server = run(listener, auth, limiter).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        identities,
        tokens,
    }
}

impl TestApp {
    async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        reqwest::Client::new()
            .post(&format!("{}{}", &self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    async fn get_with_token(&self, path: &str, token: &str) -> reqwest::Response {
        reqwest::Client::new()
            .get(&format!("{}{}", &self.address, path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    async fn register_alice(&self) -> Value {
        let response = self
            .post_json(
                "/auth/register",
                &json!({
                    "email": "alice@example.com",
                    "username": "alice",
                    "password": "CorrectPass1!",
                    "full_name": "Alice Liddell"
                }),
            )
            .await;
        assert_eq!(201, response.status().as_u16());
        response.json().await.expect("Failed to parse response")
    }
}

async fn error_code(response: reqwest::Response) -> String {
    let body: Value = response.json().await.expect("Failed to parse error body");
    body["code"].as_str().unwrap_or_default().to_string()
}

// --- Registration Tests ---

#[tokio::test]
async fn register_returns_201_with_tokens_and_user() {
    let app = spawn_app();

    let body = app.register_alice().await;

    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
    assert_eq!(body["refresh_token"].as_str().unwrap().len(), 36);
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["role"], "user");
    assert_eq!(body["user"]["status"], "active");
    assert!(body["user"].get("password_hash").is_none());

    let stored = app
        .identities
        .find_by_email("alice@example.com")
        .await
        .unwrap()
        .expect("identity was not stored");
    assert_eq!(stored.full_name, "Alice Liddell");
    assert_eq!(stored.audit.created_by, Some(stored.id()));
}

#[tokio::test]
async fn register_returns_400_for_invalid_input() {
    let app = spawn_app();

    let long_password = format!("{}Aa1!", "x".repeat(69));
    let test_cases = vec![
        (json!({"email": "notanemail", "username": "bob", "password": "CorrectPass1!"}), "invalid email"),
        (json!({"email": "bob@example.com", "username": "bob", "password": long_password}), "password over 72 bytes"),
        (json!({"email": "bob@example.com", "username": "b", "password": "CorrectPass1!"}), "short username"),
        (json!({"email": "bob@example.com", "username": "bob", "password": "weakpass"}), "weak password"),
        (json!({"email": "bob@example.com", "username": "bob", "password": "Password1!"}), "common password"),
    ];

    for (body, reason) in test_cases {
        let response = app.post_json("/auth/register", &body).await;
        assert_eq!(400, response.status().as_u16(), "Should reject: {}", reason);
        assert_eq!(error_code(response).await, "VALIDATION_ERROR");
    }
}

#[tokio::test]
async fn register_returns_409_for_duplicate_email_or_username() {
    let app = spawn_app();
    app.register_alice().await;

    let same_email = app
        .post_json(
            "/auth/register",
            &json!({"email": "ALICE@example.com", "username": "alice2", "password": "CorrectPass1!"}),
        )
        .await;
    assert_eq!(409, same_email.status().as_u16());

    let same_username = app
        .post_json(
            "/auth/register",
            &json!({"email": "other@example.com", "username": "alice", "password": "CorrectPass1!"}),
        )
        .await;
    assert_eq!(409, same_username.status().as_u16());
    assert_eq!(error_code(same_username).await, "DUPLICATE_ENTRY");
}

// --- Login Tests ---

#[tokio::test]
async fn login_accepts_email_or_username() {
    let app = spawn_app();
    app.register_alice().await;

    for identifier in ["alice@example.com", "alice"] {
        let response = app
            .post_json(
                "/auth/login",
                &json!({"identifier": identifier, "password": "CorrectPass1!"}),
            )
            .await;
        assert_eq!(200, response.status().as_u16(), "login with {}", identifier);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["user"]["username"], "alice");
    }

    // registration plus two logins
    assert_eq!(app.tokens.all().await.len(), 3);
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let app = spawn_app();
    app.register_alice().await;

    let wrong_password = app
        .post_json(
            "/auth/login",
            &json!({"identifier": "alice@example.com", "password": "WrongPass1!"}),
        )
        .await;
    let unknown_user = app
        .post_json(
            "/auth/login",
            &json!({"identifier": "nobody@example.com", "password": "WrongPass1!"}),
        )
        .await;

    assert_eq!(401, wrong_password.status().as_u16());
    assert_eq!(401, unknown_user.status().as_u16());

    let a: Value = wrong_password.json().await.unwrap();
    let b: Value = unknown_user.json().await.unwrap();
    assert_eq!(a["code"], "INVALID_CREDENTIALS");
    assert_eq!(a["code"], b["code"]);
    assert_eq!(a["message"], b["message"]);
}

#[tokio::test]
async fn login_returns_403_for_inactive_account() {
    let app = spawn_app();
    app.register_alice().await;

    let mut alice = app
        .identities
        .find_by_username("alice")
        .await
        .unwrap()
        .unwrap();
    alice.audit.status = EntityStatus::Inactive;
    app.identities.put(alice).await;

    let response = app
        .post_json(
            "/auth/login",
            &json!({"identifier": "alice", "password": "CorrectPass1!"}),
        )
        .await;

    assert_eq!(403, response.status().as_u16());
    assert_eq!(error_code(response).await, "USER_INACTIVE");
}

#[tokio::test]
async fn login_is_rate_limited_per_address() {
    let app = spawn_app_with_rate_limit(2);

    let body = json!({"identifier": "nobody", "password": "WrongPass1!"});
    assert_eq!(401, app.post_json("/auth/login", &body).await.status().as_u16());
    assert_eq!(401, app.post_json("/auth/login", &body).await.status().as_u16());

    let limited = app.post_json("/auth/login", &body).await;
    assert_eq!(429, limited.status().as_u16());
    assert_eq!(error_code(limited).await, "RATE_LIMITED");
}

#[tokio::test]
async fn forwarded_for_header_does_not_reset_the_rate_limit() {
    let app = spawn_app_with_rate_limit(1);
    let client = reqwest::Client::new();
    let body = json!({"identifier": "nobody", "password": "WrongPass1!"});

    let mut statuses = Vec::new();
    for i in 1..=3 {
        let response = client
            .post(&format!("{}/auth/login", &app.address))
            .header("X-Forwarded-For", format!("198.51.100.{}", i))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.");
        statuses.push(response.status().as_u16());
    }

    assert_eq!(statuses, vec![401, 429, 429]);
}

#[tokio::test]
async fn session_address_ignores_forwarded_for_header() {
    let app = spawn_app();
    app.register_alice().await;

    let login = reqwest::Client::new()
        .post(&format!("{}/auth/login", &app.address))
        .header("X-Forwarded-For", "203.0.113.7")
        .json(&json!({"identifier": "alice", "password": "CorrectPass1!"}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, login.status().as_u16());

    let identity = app
        .identities
        .find_by_username("alice")
        .await
        .unwrap()
        .expect("identity was not stored");
    assert_eq!(identity.last_login_ip.as_deref(), Some("127.0.0.1"));

    let sessions = app
        .tokens
        .list_active_by_identity(identity.id())
        .await
        .unwrap();
    assert_eq!(sessions.len(), 2);
    for session in sessions {
        assert_eq!(session.ip_address, "127.0.0.1");
    }
}

// --- Refresh / Logout Tests ---

#[tokio::test]
async fn refresh_returns_new_access_token_and_same_refresh_token() {
    let app = spawn_app();
    let registered = app.register_alice().await;
    let refresh_token = registered["refresh_token"].as_str().unwrap();

    // iat has second resolution; make sure the new token differs
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let response = app
        .post_json("/auth/refresh", &json!({ "refresh_token": refresh_token }))
        .await;
    assert_eq!(200, response.status().as_u16());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["refresh_token"], refresh_token);
    assert_ne!(body["access_token"], registered["access_token"]);
    assert_eq!(body["expires_in"], 3600);

    let me = app
        .get_with_token("/auth/me", body["access_token"].as_str().unwrap())
        .await;
    assert_eq!(200, me.status().as_u16());
}

#[tokio::test]
async fn refresh_with_unknown_token_returns_401() {
    let app = spawn_app();

    let response = app
        .post_json("/auth/refresh", &json!({ "refresh_token": "not-a-token" }))
        .await;

    assert_eq!(401, response.status().as_u16());
    assert_eq!(error_code(response).await, "TOKEN_INVALID");
}

#[tokio::test]
async fn logout_revokes_the_session_and_is_idempotent() {
    let app = spawn_app();
    let registered = app.register_alice().await;
    let body = json!({ "refresh_token": registered["refresh_token"] });

    for _ in 0..2 {
        let response = app.post_json("/auth/logout", &body).await;
        assert_eq!(200, response.status().as_u16());
        let payload: Value = response.json().await.unwrap();
        assert_eq!(payload["success"], true);
    }

    let refresh = app.post_json("/auth/refresh", &body).await;
    assert_eq!(401, refresh.status().as_u16());
    assert_eq!(error_code(refresh).await, "TOKEN_REVOKED");

    let unknown = app
        .post_json("/auth/logout", &json!({ "refresh_token": "never-issued" }))
        .await;
    assert_eq!(200, unknown.status().as_u16());
}

// --- Current user / revocation Tests ---

#[tokio::test]
async fn me_requires_a_valid_bearer_token() {
    let app = spawn_app();
    let registered = app.register_alice().await;

    let ok = app
        .get_with_token("/auth/me", registered["access_token"].as_str().unwrap())
        .await;
    assert_eq!(200, ok.status().as_u16());
    let user: Value = ok.json().await.unwrap();
    assert_eq!(user["email"], "alice@example.com");

    let missing = reqwest::Client::new()
        .get(&format!("{}/auth/me", &app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(401, missing.status().as_u16());
    assert_eq!(error_code(missing).await, "MISSING_TOKEN");

    let garbage = app.get_with_token("/auth/me", "garbage.token.value").await;
    assert_eq!(401, garbage.status().as_u16());
    assert_eq!(error_code(garbage).await, "TOKEN_INVALID");
}

#[tokio::test]
async fn me_returns_404_when_identity_is_gone() {
    let app = spawn_app();
    let registered = app.register_alice().await;
    let id = registered["user"]["id"].as_str().unwrap().parse().unwrap();
    app.identities.remove(id).await;

    let response = app
        .get_with_token("/auth/me", registered["access_token"].as_str().unwrap())
        .await;

    assert_eq!(404, response.status().as_u16());
    assert_eq!(error_code(response).await, "USER_NOT_FOUND");
}

#[tokio::test]
async fn revoke_all_ends_every_session() {
    let app = spawn_app();
    let registered = app.register_alice().await;
    let access_token = registered["access_token"].as_str().unwrap();

    let second = app
        .post_json(
            "/auth/login",
            &json!({"identifier": "alice", "password": "CorrectPass1!"}),
        )
        .await;
    let second: Value = second.json().await.unwrap();

    let response = reqwest::Client::new()
        .post(&format!("{}/auth/revoke-all", &app.address))
        .bearer_auth(access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["revoked"], 2);

    for refresh_token in [&registered["refresh_token"], &second["refresh_token"]] {
        let refresh = app
            .post_json("/auth/refresh", &json!({ "refresh_token": refresh_token }))
            .await;
        assert_eq!(401, refresh.status().as_u16());
    }
}

#[tokio::test]
async fn sessions_lists_open_sessions_newest_first() {
    let app = spawn_app();
    let registered = app.register_alice().await;
    let access_token = registered["access_token"].as_str().unwrap().to_string();

    let login = reqwest::Client::new()
        .post(&format!("{}/auth/login", &app.address))
        .header("User-Agent", "integration-test/2.0")
        .json(&json!({"identifier": "alice", "password": "CorrectPass1!"}))
        .send()
        .await
        .unwrap();
    assert_eq!(200, login.status().as_u16());

    let response = app.get_with_token("/api/sessions", &access_token).await;
    assert_eq!(200, response.status().as_u16());

    let sessions: Vec<Value> = response.json().await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0]["user_agent"], "integration-test/2.0");
    assert!(sessions[0]["ip_address"]
        .as_str()
        .unwrap()
        .starts_with("127.0.0.1"));
    assert!(sessions[0].get("refresh_token").is_none());
}

#[tokio::test]
async fn sessions_rejects_missing_token() {
    let app = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/api/sessions", &app.address))
        .send()
        .await
        .unwrap();

    assert_eq!(401, response.status().as_u16());
    assert_eq!(error_code(response).await, "MISSING_TOKEN");
}
