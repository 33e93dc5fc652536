use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Upper bound for every configured duration: one year.
pub const MAX_DURATION_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Clone, Debug, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Sender mailbox, e.g. `Sign-in <login@example.org>`
    pub from: String,
}

/// Lifetimes of the artefacts handed out by the token endpoint.
///
/// `access_token_lifetime_secs` is what gets stored with a token and enforced by
/// `/userinfo` and the reaper. `token_response_expires_in` is only what the token
/// response advertises. The two have historically disagreed and are kept apart.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub access_token_lifetime_secs: i64,
    pub token_response_expires_in: i64,
    pub id_token_lifetime_secs: i64,
    pub reaper_interval_secs: u64,
    /// Delete an authorization request once it has been approved.
    pub single_use_authorization_requests: bool,
    /// How long an unfinished `/auth` flow is kept before the reaper drops it.
    pub authorization_request_lifetime_secs: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime_secs: 600,
            token_response_expires_in: 3600,
            id_token_lifetime_secs: 600,
            reaper_interval_secs: 3600,
            single_use_authorization_requests: false,
            authorization_request_lifetime_secs: 3600,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EmailVerificationConfig {
    /// How long a mailed code stays valid.
    pub code_validity_secs: i64,
    pub rate_limit_window_secs: i64,
    /// Verification mails a single requester may trigger per window.
    pub rate_limit_max_requests: u64,
    /// Code checks allowed per request before it is discarded.
    pub max_code_attempts: i32,
}

impl Default for EmailVerificationConfig {
    fn default() -> Self {
        Self {
            code_validity_secs: 900,
            rate_limit_window_secs: 3600,
            rate_limit_max_requests: 5,
            max_code_attempts: 5,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Public base URL of the provider. Used as the `iss` claim.
    pub root_uri: String,
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
    #[serde(default)]
    pub email_verification: EmailVerificationConfig,
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
    /// Identify requesters by the first `X-Forwarded-For` entry instead of the peer
    /// address. Only enable behind a reverse proxy that sets the header.
    #[serde(default)]
    pub behind_proxy: bool,
}

fn default_listen_addr() -> String {
    "0.0.0.0:9002".to_string()
}

fn default_run_migrations() -> bool {
    true
}

impl AppConfig {
    /// Absolute URL of an endpoint below `root_uri`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.root_uri, path)
    }

    /// Checks the invariants `load_config` enforces and normalises `root_uri`.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.root_uri = self.root_uri.trim_end_matches('/').to_string();
        match url::Url::parse(&self.root_uri) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            _ => {
                return Err(ConfigError::Validation(
                    "root_uri must be an absolute http(s) URL".into(),
                ));
            }
        }
        if self.smtp.port == 0 {
            return Err(ConfigError::Validation("smtp.port must be > 0".into()));
        }
        if self.email_verification.rate_limit_max_requests == 0 {
            return Err(ConfigError::Validation(
                "email_verification.rate_limit_max_requests must be > 0".into(),
            ));
        }
        if self.email_verification.max_code_attempts <= 0 {
            return Err(ConfigError::Validation(
                "email_verification.max_code_attempts must be > 0".into(),
            ));
        }
        let durations = [
            ("tokens.access_token_lifetime_secs", self.tokens.access_token_lifetime_secs),
            ("tokens.token_response_expires_in", self.tokens.token_response_expires_in),
            ("tokens.id_token_lifetime_secs", self.tokens.id_token_lifetime_secs),
            (
                "tokens.authorization_request_lifetime_secs",
                self.tokens.authorization_request_lifetime_secs,
            ),
            (
                "email_verification.code_validity_secs",
                self.email_verification.code_validity_secs,
            ),
            (
                "email_verification.rate_limit_window_secs",
                self.email_verification.rate_limit_window_secs,
            ),
        ];
        for (name, secs) in durations {
            if !(1..=MAX_DURATION_SECS).contains(&secs) {
                return Err(ConfigError::Validation(format!(
                    "{name} must be between 1 and {MAX_DURATION_SECS} seconds"
                )));
            }
        }
        if self.tokens.reaper_interval_secs == 0
            || self.tokens.reaper_interval_secs > MAX_DURATION_SECS as u64
        {
            return Err(ConfigError::Validation(format!(
                "tokens.reaper_interval_secs must be between 1 and {MAX_DURATION_SECS} seconds"
            )));
        }
        Ok(self)
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching a key path separated by double underscores
/// (e.g. `SMTP__PORT`, `TOKENS__ACCESS_TOKEN_LIFETIME_SECS`) overrides the file value.
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()
}

/// Convenience helper for binaries wanting the old panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}
