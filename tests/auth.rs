//! Authentication integration tests.
//!
//! These tests verify registration, the mirrored author row, login, and
//! session resolution.

mod common;

use common::{create_test_user, TestApp};
use serde_json::json;
use serial_test::serial;

// ============================================================================
// Registration Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn register_returns_token_and_default_role() {
    // Arrange
    let app = TestApp::spawn().await;
    let email = TestApp::unique_email();

    // Act
    let response = app
        .post_public(
            "/auth/register",
            json!({
                "name": "Amina Diop",
                "email": email,
                "password": "motdepasse123"
            }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["user"]["name"].as_str().unwrap(), "Amina Diop");
    assert_eq!(body["user"]["email"].as_str().unwrap(), email);
    assert_eq!(body["user"]["role"].as_str().unwrap(), "MANAGER");
    assert!(!body["access_token"].as_str().unwrap().is_empty());
    assert!(body["user"].get("password_hash").is_none());
}

#[tokio::test]
#[serial]
async fn register_creates_matching_author_row() {
    // Arrange
    let app = TestApp::spawn().await;
    let email = TestApp::unique_email();

    // Act
    let response = app
        .post_public(
            "/auth/register",
            json!({
                "name": "Jean Paul",
                "email": email,
                "password": "motdepasse123"
            }),
        )
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(app.count_authors_with_email(&email), 1);
}

#[tokio::test]
#[serial]
async fn register_rejects_duplicate_email() {
    // Arrange
    let app = TestApp::spawn().await;
    let email = TestApp::unique_email();

    let first = app
        .post_public(
            "/auth/register",
            json!({"name": "First", "email": email, "password": "password123"}),
        )
        .await;
    assert_eq!(first.status().as_u16(), 200);

    // Act
    let second = app
        .post_public(
            "/auth/register",
            json!({"name": "Second", "email": email, "password": "password123"}),
        )
        .await;

    // Assert
    assert_eq!(second.status().as_u16(), 409);
}

#[tokio::test]
#[serial]
async fn register_rejects_invalid_email() {
    let app = TestApp::spawn().await;

    let response = app
        .post_public(
            "/auth/register",
            json!({"name": "X", "email": "not-an-email", "password": "password123"}),
        )
        .await;

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
#[serial]
async fn register_rejects_short_password() {
    let app = TestApp::spawn().await;

    let response = app
        .post_public(
            "/auth/register",
            json!({
                "name": "X",
                "email": TestApp::unique_email(),
                "password": "abc"
            }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 400);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert!(body["error"].as_str().unwrap().contains("6 characters"));
}

// ============================================================================
// Login Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn login_succeeds_with_valid_credentials() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = create_test_user(&app).await;

    // Act
    let logged_in = app
        .login_user(&user.email, &user.password)
        .await
        .expect("Login should succeed");

    // Assert
    assert_eq!(logged_in.id, user.id);
    assert!(!logged_in.access_token.is_empty());
}

#[tokio::test]
#[serial]
async fn login_rejects_wrong_password() {
    let app = TestApp::spawn().await;
    let user = create_test_user(&app).await;

    let response = app
        .post_public(
            "/auth/login",
            json!({"email": user.email, "password": "wrong_password"}),
        )
        .await;

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
#[serial]
async fn login_rejects_unknown_email_with_same_denial() {
    let app = TestApp::spawn().await;

    let response = app
        .post_public(
            "/auth/login",
            json!({"email": TestApp::unique_email(), "password": "password123"}),
        )
        .await;

    // Unknown email and wrong password are indistinguishable.
    assert_eq!(response.status().as_u16(), 401);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"].as_str().unwrap(), "INVALID_CREDENTIALS");
}

// ============================================================================
// Session Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn me_returns_current_user() {
    let app = TestApp::spawn().await;
    let user = create_test_user(&app).await;

    let response = app.get("/auth/me", &user.access_token).await;
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["email"].as_str().unwrap(), user.email);
}

#[tokio::test]
#[serial]
async fn me_requires_authentication() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/auth/me").await;
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
#[serial]
async fn garbage_token_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app.get("/auth/me", "not-a-real-token").await;
    assert_eq!(response.status().as_u16(), 401);
}
