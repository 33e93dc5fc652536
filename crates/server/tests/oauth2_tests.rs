//! OpenID Connect endpoint tests.
//!
//! Every test runs against the full application router on an in-memory database.

mod common;

use axum::http::StatusCode;
use common::*;
use oidc_email_provider::entity::{access_token, authorization_request, pending_code};
use oidc_email_provider::error::ErrorResponse;
use oidc_email_provider::secrets::hash_secret;
use oidc_email_provider::store::Store;
use serde_json::Value;
use time::{Duration, OffsetDateTime};

fn error_of(response: &axum_test::TestResponse) -> ErrorResponse {
    response.json::<ErrorResponse>()
}

// =============================================================================
// Discovery
// =============================================================================

#[tokio::test]
async fn test_discovery_document_points_at_own_endpoints() {
    let app = test_app().await;

    let response = app.server.get("/.well-known/openid-configuration").await;

    response.assert_status_ok();
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*",
        "discovery must be readable cross-origin"
    );
    let doc: Value = response.json();
    assert_eq!(doc["issuer"], ROOT_URI);
    assert_eq!(doc["authorization_endpoint"], format!("{ROOT_URI}/auth"));
    assert_eq!(doc["token_endpoint"], format!("{ROOT_URI}/token"));
    assert_eq!(doc["userinfo_endpoint"], format!("{ROOT_URI}/userinfo"));
    assert_eq!(doc["jwks_uri"], format!("{ROOT_URI}/jwks"));
    assert_eq!(doc["response_types_supported"], serde_json::json!(["code"]));
    assert_eq!(
        doc["id_token_signing_alg_values_supported"],
        serde_json::json!(["RS256"])
    );
}

#[tokio::test]
async fn test_jwks_lists_active_key() {
    let app = test_app().await;

    let response = app.server.get("/jwks").await;

    response.assert_status_ok();
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let jwks: Value = response.json();
    let keys = jwks["keys"].as_array().expect("keys array");
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["kty"], "RSA");
    assert_eq!(keys[0]["alg"], "RS256");
    assert_eq!(keys[0]["use"], "sig");
    assert_eq!(
        keys[0]["kid"],
        app.resources.keys.active().unwrap().kid(),
        "published kid matches the signing key"
    );
    assert_eq!(keys[0]["e"], "AQAB");
}

// =============================================================================
// Authorization endpoint
// =============================================================================

#[tokio::test]
async fn test_authorize_requires_client_id() {
    let app = test_app().await;

    let response = app
        .server
        .get("/auth")
        .add_query_param("redirect_uri", REDIRECT_URI)
        .add_query_param("response_type", "code")
        .await;

    response.assert_status_bad_request();
    assert_eq!(error_of(&response).error, "invalid_request");
}

#[tokio::test]
async fn test_authorize_rejects_relative_client_id() {
    let app = test_app().await;

    let response = app
        .server
        .get("/auth")
        .add_query_param("client_id", "client")
        .add_query_param("redirect_uri", "client/callback")
        .add_query_param("response_type", "code")
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_authorize_rejects_foreign_redirect_uri() {
    let app = test_app().await;

    let response = app
        .server
        .get("/auth")
        .add_query_param("client_id", CLIENT_ID)
        .add_query_param("redirect_uri", "https://evil.example.net/callback")
        .add_query_param("response_type", "code")
        .await;

    response.assert_status_bad_request();
    let error = error_of(&response);
    assert!(
        error
            .error_description
            .unwrap_or_default()
            .contains("redirect_uri")
    );
}

#[tokio::test]
async fn test_authorize_prompt_none_redirects_with_interaction_required() {
    let app = test_app().await;

    let response = app
        .server
        .get("/auth")
        .add_query_params(authorize_query("af0ifjsldkj"))
        .add_query_param("prompt", "none")
        .await;

    response.assert_status(StatusCode::SEE_OTHER);
    let target = location(&response);
    assert!(target.starts_with(REDIRECT_URI));
    assert_eq!(
        query_param(&target, "error").as_deref(),
        Some("interaction_required")
    );
    assert_eq!(query_param(&target, "state").as_deref(), Some("af0ifjsldkj"));
}

#[tokio::test]
async fn test_authorize_without_response_type_redirects_with_error() {
    let app = test_app().await;

    let response = app
        .server
        .get("/auth")
        .add_query_param("client_id", CLIENT_ID)
        .add_query_param("redirect_uri", REDIRECT_URI)
        .add_query_param("state", "s1")
        .await;

    response.assert_status(StatusCode::SEE_OTHER);
    let target = location(&response);
    assert_eq!(
        query_param(&target, "error").as_deref(),
        Some("unsupported_response_type")
    );
    assert_eq!(query_param(&target, "state").as_deref(), Some("s1"));
}

#[tokio::test]
async fn test_authorize_implicit_flow_is_unsupported() {
    let app = test_app().await;

    let response = app
        .server
        .get("/auth")
        .add_query_param("client_id", CLIENT_ID)
        .add_query_param("redirect_uri", REDIRECT_URI)
        .add_query_param("response_type", "id_token")
        .await;

    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(
        query_param(&location(&response), "error").as_deref(),
        Some("unsupported_response_type")
    );
}

#[tokio::test]
async fn test_authorize_stores_request_and_renders_chooser() {
    let app = test_app().await;

    let response = app
        .server
        .get("/auth")
        .add_query_params(authorize_query("abc"))
        .await;

    response.assert_status_ok();
    let html = response.text();
    assert!(html.contains("client.example.com"), "shows the client host");
    assert!(html.contains("action=\"/login-email\""));
    assert!(
        !html.contains("action=\"/logout\""),
        "no logout without a session"
    );

    let request_id = hidden_input(&html, "request_id");
    let stored: authorization_request::Model = app
        .store
        .get_authorization_request(&request_id)
        .await
        .unwrap()
        .expect("request stored");
    assert_eq!(stored.client_id, CLIENT_ID);
    assert_eq!(stored.redirect_uri, REDIRECT_URI);
    assert_eq!(stored.state.as_deref(), Some("abc"));
    assert_eq!(stored.nonce.as_deref(), Some("n-0S6_WzA2Mj"));
    assert_eq!(stored.login_key_hash, None);
    assert!(stored.raw_query.contains("client_id="));
}

// =============================================================================
// Approval
// =============================================================================

#[tokio::test]
async fn test_approve_requires_session_cookie() {
    let app = test_app().await;
    let request_id = app.start_authorization(None, "s").await;

    let response = app
        .server
        .post("/approve")
        .form(&[("request_id", request_id.as_str()), ("identity_id", "x")])
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_approve_unknown_request_is_not_found() {
    let app = test_app().await;
    let signed_in = app.sign_in("alice@example.com", None).await;
    let (name, value) = cookie_header(&signed_in.login_key);

    let response = app
        .server
        .post("/approve")
        .add_header(name, value)
        .form(&[
            ("request_id", "does-not-exist"),
            ("identity_id", signed_in.identity_id.as_str()),
        ])
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn test_approve_request_of_other_session_is_forbidden() {
    let app = test_app().await;
    let alice = app.sign_in("alice@example.com", None).await;
    let mallory = app.sign_in("mallory@example.com", None).await;
    assert_ne!(alice.login_key, mallory.login_key);

    let (name, value) = cookie_header(&mallory.login_key);
    let response = app
        .server
        .post("/approve")
        .add_header(name, value)
        .form(&[
            ("request_id", alice.request_id.as_str()),
            ("identity_id", mallory.identity_id.as_str()),
        ])
        .await;

    response.assert_status_forbidden();
    assert_eq!(
        error_of(&response).error_description.as_deref(),
        Some("Not your request")
    );
}

#[tokio::test]
async fn test_approve_identity_not_linked_to_session_is_forbidden() {
    let app = test_app().await;
    let alice = app.sign_in("alice@example.com", None).await;
    let mallory = app.sign_in("mallory@example.com", None).await;

    let (name, value) = cookie_header(&mallory.login_key);
    let response = app
        .server
        .post("/approve")
        .add_header(name, value)
        .form(&[
            ("request_id", mallory.request_id.as_str()),
            ("identity_id", alice.identity_id.as_str()),
        ])
        .await;

    response.assert_status_forbidden();
    assert!(
        app.store
            .get_identity(&alice.identity_id)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_approve_unknown_identity_is_not_found() {
    let app = test_app().await;
    let alice = app.sign_in("alice@example.com", None).await;

    let (name, value) = cookie_header(&alice.login_key);
    let response = app
        .server
        .post("/approve")
        .add_header(name, value)
        .form(&[
            ("request_id", alice.request_id.as_str()),
            ("identity_id", "00000000-0000-0000-0000-000000000000"),
        ])
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn test_approve_redirects_with_code_state_and_scope() {
    let app = test_app().await;
    let alice = app.sign_in("alice@example.com", None).await;

    let (name, value) = cookie_header(&alice.login_key);
    let response = app
        .server
        .post("/approve")
        .add_header(name, value)
        .form(&[
            ("request_id", alice.request_id.as_str()),
            ("identity_id", alice.identity_id.as_str()),
        ])
        .await;

    response.assert_status(StatusCode::SEE_OTHER);
    let target = location(&response);
    assert!(target.starts_with(REDIRECT_URI));
    assert!(query_param(&target, "code").is_some());
    assert_eq!(query_param(&target, "state").as_deref(), Some("xyz"));
    assert_eq!(query_param(&target, "scope").as_deref(), Some("openid email"));

    // Requests stay approvable unless configured otherwise.
    assert!(
        app.store
            .get_authorization_request(&alice.request_id)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_single_use_authorization_requests_are_deleted_on_approval() {
    let mut config = test_config();
    config.tokens.single_use_authorization_requests = true;
    let app = test_app_with_config(config).await;
    let alice = app.sign_in("alice@example.com", None).await;

    app.approve(&alice).await;

    assert!(
        app.store
            .get_authorization_request(&alice.request_id)
            .await
            .unwrap()
            .is_none()
    );
}

// =============================================================================
// Token endpoint
// =============================================================================

#[tokio::test]
async fn test_token_requires_code() {
    let app = test_app().await;

    let response = app
        .server
        .post("/token")
        .form(&[("grant_type", "authorization_code")])
        .await;

    response.assert_status_bad_request();
    assert_eq!(error_of(&response).error, "invalid_request");
}

#[tokio::test]
async fn test_token_unknown_code_is_invalid_grant() {
    let app = test_app().await;

    let response = app
        .server
        .post("/token")
        .form(&[("grant_type", "authorization_code"), ("code", "made-up")])
        .await;

    response.assert_status_bad_request();
    assert_eq!(error_of(&response).error, "invalid_grant");
}

#[tokio::test]
async fn test_token_refuses_code_older_than_id_token_lifetime() {
    let app = test_app().await;
    app.store
        .insert_pending_code(pending_code::Model {
            code: "stale-code".into(),
            claims: "{}".into(),
            created_at: OffsetDateTime::now_utc() - Duration::minutes(11),
        })
        .await
        .unwrap();

    let response = app
        .server
        .post("/token")
        .form(&[("grant_type", "authorization_code"), ("code", "stale-code")])
        .await;

    response.assert_status_bad_request();
    assert_eq!(error_of(&response).error, "invalid_grant");
    assert!(
        app.store
            .find_access_token_by_code("stale-code")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_token_rejects_other_grant_types() {
    let app = test_app().await;

    let response = app
        .server
        .post("/token")
        .form(&[("grant_type", "client_credentials"), ("code", "x")])
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_token_response_shape_and_cache_headers() {
    let app = test_app().await;
    let alice = app.sign_in("alice@example.com", None).await;
    let code = app.approve(&alice).await;

    // grant_type may be omitted
    let response = app.server.post("/token").form(&[("code", code.as_str())]).await;

    response.assert_status_ok();
    assert_eq!(response.headers()["cache-control"], "no-store");
    assert_eq!(response.headers()["pragma"], "no-cache");
    let body: Value = response.json();
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["expires_in"], 3600);
    assert!(body["access_token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(
        body["id_token"].as_str().unwrap().split('.').count(),
        3,
        "compact JWS"
    );

    let stored = app
        .store
        .get_access_token(&hash_secret(body["access_token"].as_str().unwrap()))
        .await
        .unwrap()
        .expect("token stored by hash");
    assert_eq!(stored.identity_id, alice.identity_id);
    assert_eq!(stored.lifetime_secs, 600);
    assert_eq!(stored.authorization_code, code);
}

// =============================================================================
// UserInfo endpoint
// =============================================================================

#[tokio::test]
async fn test_userinfo_requires_bearer_token() {
    let app = test_app().await;

    let response = app.server.get("/userinfo").await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_userinfo_rejects_malformed_authorization() {
    let app = test_app().await;

    let response = app
        .server
        .get("/userinfo")
        .add_header(
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        )
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_userinfo_unknown_token_is_unauthorized() {
    let app = test_app().await;

    let response = app
        .server
        .get("/userinfo")
        .authorization_bearer("never-issued")
        .await;

    response.assert_status_unauthorized();
    assert_eq!(
        error_of(&response).error_description.as_deref(),
        Some("Invalid access token")
    );
}

#[tokio::test]
async fn test_userinfo_expired_token_is_deleted() {
    let app = test_app().await;
    let alice = app.sign_in("alice@example.com", None).await;
    let token = "expired-token";
    app.store
        .insert_access_token(access_token::Model {
            token_hash: hash_secret(token),
            identity_id: alice.identity_id.clone(),
            issued_at: OffsetDateTime::now_utc() - Duration::hours(2),
            lifetime_secs: 600,
            authorization_code: "old-code".into(),
        })
        .await
        .unwrap();

    let response = app.server.get("/userinfo").authorization_bearer(token).await;

    response.assert_status_unauthorized();
    assert_eq!(
        error_of(&response).error_description.as_deref(),
        Some("Token expired")
    );
    assert!(
        app.store
            .get_access_token(&hash_secret(token))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_userinfo_returns_identity() {
    let app = test_app().await;
    let alice = app.sign_in("alice@example.com", None).await;
    let code = app.approve(&alice).await;
    let tokens: Value = app
        .server
        .post("/token")
        .form(&[("grant_type", "authorization_code"), ("code", code.as_str())])
        .await
        .json();

    let response = app
        .server
        .get("/userinfo")
        .authorization_bearer(tokens["access_token"].as_str().unwrap())
        .await;

    response.assert_status_ok();
    let info: Value = response.json();
    assert_eq!(info["sub"], alice.identity_id);
    assert_eq!(info["email"], "alice@example.com");
}

// =============================================================================
// Sign-in pages
// =============================================================================

#[tokio::test]
async fn test_login_email_unknown_request_is_not_found() {
    let app = test_app().await;

    let response = app
        .server
        .post("/login-email")
        .form(&[("request_id", "nope")])
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn test_email_code_rejects_invalid_address() {
    let app = test_app().await;
    let request_id = app.start_authorization(None, "s").await;

    let response = app.request_code(&request_id, "not-an-email", "192.0.2.7").await;

    response.assert_status_bad_request();
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_email_code_is_rate_limited_per_requester() {
    let app = test_app().await;
    let request_id = app.start_authorization(None, "s").await;

    for i in 0..5 {
        app.request_code(&request_id, &format!("user{i}@example.com"), "198.51.100.4")
            .await
            .assert_status_ok();
    }
    let limited = app
        .request_code(&request_id, "user5@example.com", "198.51.100.4")
        .await;
    limited.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(error_of(&limited).error, "slow_down");

    // Another requester is unaffected.
    app.request_code(&request_id, "user5@example.com", "198.51.100.5")
        .await
        .assert_status_ok();
    assert_eq!(app.mailer.sent().len(), 6);
}

#[tokio::test]
async fn test_complete_email_login_wrong_code_is_rejected() {
    let app = test_app().await;
    let request_id = app.start_authorization(None, "s").await;
    let page = app
        .request_code(&request_id, "alice@example.com", "192.0.2.9")
        .await;
    let email_request_id = hidden_input(&page.text(), "email_request_id");
    let wrong = if app.mailer.last_code() == "000000" {
        "111111"
    } else {
        "000000"
    };

    let response = app
        .server
        .post("/complete-email-login")
        .form(&[
            ("request_id", request_id.as_str()),
            ("email_request_id", email_request_id.as_str()),
            ("code", wrong),
        ])
        .await;

    response.assert_status_bad_request();
    assert!(set_login_key(&response).is_none());
}

#[tokio::test]
async fn test_complete_email_login_missing_fields() {
    let app = test_app().await;
    let request_id = app.start_authorization(None, "s").await;

    let response = app
        .server
        .post("/complete-email-login")
        .form(&[("request_id", request_id.as_str())])
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_complete_email_login_sets_cookie_and_returns_to_auth() {
    let app = test_app().await;
    let request_id = app.start_authorization(None, "s").await;
    let page = app
        .request_code(&request_id, "Alice@Example.com", "192.0.2.10")
        .await;
    page.assert_status_ok();
    assert_eq!(app.mailer.sent()[0].0, "alice@example.com");
    let email_request_id = hidden_input(&page.text(), "email_request_id");

    let response = app
        .server
        .post("/complete-email-login")
        .form(&[
            ("request_id", request_id.as_str()),
            ("email_request_id", email_request_id.as_str()),
            ("code", app.mailer.last_code().as_str()),
        ])
        .await;

    response.assert_status(StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with(&format!("{ROOT_URI}/auth?")));
    let cookie = response.headers()["set-cookie"].to_str().unwrap().to_string();
    for attr in ["Path=/", "Max-Age=31536000", "Secure", "HttpOnly", "SameSite=Lax"] {
        assert!(cookie.contains(attr), "cookie lacks {attr}: {cookie}");
    }
    let key = set_login_key(&response).unwrap();
    assert!(
        app.store
            .login_session_exists(&hash_secret(&key))
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_second_sign_in_reuses_session() {
    let app = test_app().await;
    let alice = app.sign_in("alice@example.com", None).await;
    let work = app
        .sign_in("alice@work.example.com", Some(&alice.login_key))
        .await;

    assert_eq!(work.login_key, alice.login_key);
    let identities = app
        .store
        .identities_for_login_key(&hash_secret(&alice.login_key))
        .await
        .unwrap();
    assert_eq!(identities.len(), 2);
}

#[tokio::test]
async fn test_logout_clears_session_and_mappings() {
    let app = test_app().await;
    let alice = app.sign_in("alice@example.com", None).await;
    let (name, value) = cookie_header(&alice.login_key);

    let response = app
        .server
        .post("/logout")
        .add_header(name, value)
        .form(&[("prev_page", "/auth?client_id=x")])
        .await;

    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth?client_id=x");
    assert!(
        response.headers()["set-cookie"]
            .to_str()
            .unwrap()
            .contains("Max-Age=0")
    );
    let hash = hash_secret(&alice.login_key);
    assert!(!app.store.login_session_exists(&hash).await.unwrap());
    assert!(
        app.store
            .identities_for_login_key(&hash)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_logout_refuses_foreign_targets() {
    let app = test_app().await;

    for target in ["https://evil.example/", "//evil.example/"] {
        let response = app
            .server
            .post("/logout")
            .form(&[("prev_page", target)])
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
    }
}

// =============================================================================
// Ambient routes
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let app = test_app().await;

    let response = app.server.get("/healthz").await;

    response.assert_status_ok();
    response.assert_text("ok");
}

#[tokio::test]
async fn test_every_response_carries_security_headers() {
    let app = test_app().await;

    for response in [
        app.server.get("/").await,
        app.server.get("/healthz").await,
        app.server.get("/userinfo").await,
    ] {
        assert_eq!(
            response.headers()["content-security-policy"],
            "frame-ancestors 'none'; script-src 'none'"
        );
        assert_eq!(response.headers()["referrer-policy"], "no-referrer");
    }
}

#[tokio::test]
async fn test_index_links_discovery_document() {
    let app = test_app().await;

    let response = app.server.get("/").await;

    response.assert_status_ok();
    assert!(
        response
            .text()
            .contains("https://id.example.org/.well-known/openid-configuration")
    );
}
