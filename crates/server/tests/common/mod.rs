//! Shared fixtures for the integration tests: an in-memory database with the real
//! migrations applied, a mailer that records instead of sending, and one RSA key
//! shared by every test in a binary.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue, header::COOKIE};
use axum_test::{TestResponse, TestServer};
use migration::{Migrator, MigratorTrait};
use oidc_email_provider::{
    AppResources,
    admission::AdmissionLog,
    api::app,
    config::{AppConfig, EmailVerificationConfig, SmtpConfig, TokenConfig},
    keys::{KeyManager, SigningKey, generate_pkcs8_pem},
    mailer::{MailError, Mailer},
    signer::Rs256Signer,
    store::{DbStore, Store},
};
use sea_orm::Database;
use std::sync::{Arc, Mutex, OnceLock};

pub const ROOT_URI: &str = "https://id.example.org";
pub const CLIENT_ID: &str = "https://client.example.com/";
pub const REDIRECT_URI: &str = "https://client.example.com/callback";

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        listen_addr: "127.0.0.1:0".into(),
        root_uri: ROOT_URI.into(),
        smtp: SmtpConfig {
            server: "localhost".into(),
            port: 2525,
            username: "user".into(),
            password: "pass".into(),
            from: "Sign-in <login@example.org>".into(),
        },
        tokens: TokenConfig::default(),
        email_verification: EmailVerificationConfig::default(),
        run_migrations: true,
        behind_proxy: true,
    }
}

pub async fn test_store() -> Arc<DbStore> {
    let db = Database::connect("sqlite::memory:").await.expect("connect");
    Migrator::up(&db, None).await.expect("migrate");
    Arc::new(DbStore::new(Arc::new(db)))
}

/// One generated key per test binary; RSA generation is slow.
pub fn test_pem() -> &'static str {
    static PEM: OnceLock<String> = OnceLock::new();
    PEM.get_or_init(|| generate_pkcs8_pem().expect("generate key"))
}

pub fn test_keys() -> Arc<KeyManager> {
    let key = SigningKey::from_pkcs8_pem(test_pem()).expect("load key");
    Arc::new(KeyManager::new(vec![key]))
}

/// Keeps every code it was asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_code(&self) -> String {
        self.sent().last().expect("no email sent").1.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_code(
        &self,
        address: &str,
        code: &str,
        _validity_minutes: i64,
    ) -> Result<(), MailError> {
        self.sent
            .lock()
            .unwrap()
            .push((address.to_string(), code.to_string()));
        Ok(())
    }
}

/// Rejects every recipient as if the address were malformed.
pub struct RejectingMailer;

#[async_trait]
impl Mailer for RejectingMailer {
    async fn send_code(&self, _: &str, _: &str, _: i64) -> Result<(), MailError> {
        Err(MailError::InvalidAddress(
            "not-an-address".parse::<lettre::Address>().unwrap_err(),
        ))
    }
}

/// Fails every delivery for reasons unrelated to the recipient.
pub struct BrokenMailer;

#[async_trait]
impl Mailer for BrokenMailer {
    async fn send_code(&self, _: &str, _: &str, _: i64) -> Result<(), MailError> {
        Err(MailError::Template(askama::Error::Custom("smtp relay down".into())))
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<DbStore>,
    pub mailer: Arc<RecordingMailer>,
    pub resources: AppResources,
}

pub fn resources_with(
    store: Arc<DbStore>,
    mailer: Arc<dyn Mailer>,
    config: AppConfig,
) -> AppResources {
    AppResources::new(
        store.clone() as Arc<dyn Store>,
        store as Arc<dyn AdmissionLog>,
        mailer,
        test_keys(),
        Arc::new(Rs256Signer),
        Arc::new(config),
    )
}

pub async fn test_app_with_config(config: AppConfig) -> TestApp {
    let store = test_store().await;
    let mailer = Arc::new(RecordingMailer::default());
    let resources = resources_with(store.clone(), mailer.clone(), config);
    let server = TestServer::new(app(resources.clone())).expect("create test server");
    TestApp {
        server,
        store,
        mailer,
        resources,
    }
}

pub async fn test_app() -> TestApp {
    test_app_with_config(test_config()).await
}

pub fn cookie_header(login_key: &str) -> (HeaderName, HeaderValue) {
    (
        COOKIE,
        HeaderValue::from_str(&format!("login_key={login_key}")).unwrap(),
    )
}

pub fn authorize_query(state: &str) -> Vec<(&'static str, String)> {
    vec![
        ("client_id", CLIENT_ID.to_string()),
        ("redirect_uri", REDIRECT_URI.to_string()),
        ("response_type", "code".to_string()),
        ("scope", "openid email".to_string()),
        ("state", state.to_string()),
        ("nonce", "n-0S6_WzA2Mj".to_string()),
    ]
}

/// Value of the first hidden input called `name` in an HTML page.
pub fn hidden_input(html: &str, name: &str) -> String {
    hidden_inputs(html, name)
        .into_iter()
        .next()
        .unwrap_or_else(|| panic!("no hidden input {name} in page:\n{html}"))
}

pub fn hidden_inputs(html: &str, name: &str) -> Vec<String> {
    let marker = format!("name=\"{name}\" value=\"");
    html.match_indices(&marker)
        .map(|(start, _)| {
            let rest = &html[start + marker.len()..];
            rest[..rest.find('"').expect("unterminated value")].to_string()
        })
        .collect()
}

pub fn location(response: &TestResponse) -> String {
    response
        .headers()
        .get("location")
        .expect("location header")
        .to_str()
        .unwrap()
        .to_string()
}

/// `login_key` value from a `Set-Cookie` header, if one was set.
pub fn set_login_key(response: &TestResponse) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| v.strip_prefix("login_key="))
        .and_then(|v| v.split(';').next())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Query parameter of an absolute URL.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Browser state after walking through the email sign-in pages.
pub struct SignedIn {
    pub login_key: String,
    /// A fresh authorization request, started with the session cookie.
    pub request_id: String,
    pub identity_id: String,
}

impl TestApp {
    /// `GET /auth` for the test client, returning the request id from the chooser.
    pub async fn start_authorization(&self, login_key: Option<&str>, state: &str) -> String {
        let mut request = self.server.get("/auth").add_query_params(authorize_query(state));
        if let Some(key) = login_key {
            let (name, value) = cookie_header(key);
            request = request.add_header(name, value);
        }
        let response = request.await;
        response.assert_status_ok();
        hidden_input(&response.text(), "request_id")
    }

    /// Request a code for `email` and return the email request id.
    pub async fn request_code(&self, request_id: &str, email: &str, requester: &str) -> TestResponse {
        self.server
            .post("/email-code")
            .add_header(
                HeaderName::from_static("x-forwarded-for"),
                HeaderValue::from_str(requester).unwrap(),
            )
            .form(&[("request_id", request_id), ("email", email)])
            .await
    }

    /// Walk the full email sign-in for `email`, reusing `login_key` when given.
    pub async fn sign_in(&self, email: &str, login_key: Option<&str>) -> SignedIn {
        let request_id = self.start_authorization(login_key, "xyz").await;

        self.server
            .post("/login-email")
            .form(&[("request_id", request_id.as_str())])
            .await
            .assert_status_ok();

        let page = self.request_code(&request_id, email, "192.0.2.1").await;
        page.assert_status_ok();
        let email_request_id = hidden_input(&page.text(), "email_request_id");
        let code = self.mailer.last_code();

        let mut complete = self.server.post("/complete-email-login").form(&[
            ("request_id", request_id.as_str()),
            ("email_request_id", email_request_id.as_str()),
            ("code", code.as_str()),
        ]);
        if let Some(key) = login_key {
            let (name, value) = cookie_header(key);
            complete = complete.add_header(name, value);
        }
        let completed = complete.await;
        completed.assert_status(axum::http::StatusCode::SEE_OTHER);
        let login_key = set_login_key(&completed)
            .or_else(|| login_key.map(str::to_string))
            .expect("session cookie");

        let (name, value) = cookie_header(&login_key);
        let chooser = self
            .server
            .get("/auth")
            .add_query_params(authorize_query("xyz"))
            .add_header(name, value)
            .await;
        chooser.assert_status_ok();
        let html = chooser.text();
        let request_id = hidden_input(&html, "request_id");
        let identity = self
            .store
            .ensure_identity(email, "Email", email)
            .await
            .expect("identity");
        assert!(
            hidden_inputs(&html, "identity_id").contains(&identity.id),
            "chooser lists the signed in identity"
        );

        SignedIn {
            login_key,
            request_id,
            identity_id: identity.id,
        }
    }

    /// Approve `signed_in.request_id` and return the issued authorization code.
    pub async fn approve(&self, signed_in: &SignedIn) -> String {
        let (name, value) = cookie_header(&signed_in.login_key);
        let response = self
            .server
            .post("/approve")
            .add_header(name, value)
            .form(&[
                ("request_id", signed_in.request_id.as_str()),
                ("identity_id", signed_in.identity_id.as_str()),
            ])
            .await;
        response.assert_status(axum::http::StatusCode::SEE_OTHER);
        query_param(&location(&response), "code").expect("code in redirect")
    }
}
