//! The ID token claim set, built at approval and signed at token exchange.

use crate::entity::identity;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    /// Identity id
    pub sub: String,
    pub aud: Vec<String>,
    pub email: String,
    pub email_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl IdTokenClaims {
    pub fn for_identity(
        identity: &identity::Model,
        issuer: &str,
        client_id: &str,
        nonce: Option<&str>,
        issued_at: OffsetDateTime,
        lifetime: Duration,
    ) -> Self {
        Self {
            iss: issuer.to_string(),
            sub: identity.id.clone(),
            aud: vec![client_id.to_string()],
            email: identity.email.clone(),
            email_verified: true,
            nonce: nonce.filter(|n| !n.is_empty()).map(str::to_string),
            iat: issued_at.unix_timestamp(),
            exp: (issued_at + lifetime).unix_timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> identity::Model {
        identity::Model {
            id: "3f1c".into(),
            email: "alice@example.com".into(),
            provider: identity::EMAIL_PROVIDER.into(),
            provider_id: "alice@example.com".into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn claims_expire_after_lifetime() {
        let now = OffsetDateTime::now_utc();
        let claims = IdTokenClaims::for_identity(
            &alice(),
            "https://id.example.org",
            "https://app.example",
            Some("n-0S6"),
            now,
            Duration::minutes(10),
        );
        assert_eq!(claims.exp - claims.iat, 600);
        assert_eq!(claims.sub, "3f1c");
        assert_eq!(claims.aud, vec!["https://app.example".to_string()]);
        assert!(claims.email_verified);
        assert_eq!(claims.nonce.as_deref(), Some("n-0S6"));
    }

    #[test]
    fn empty_nonce_is_omitted() {
        let claims = IdTokenClaims::for_identity(
            &alice(),
            "https://id.example.org",
            "https://app.example",
            Some(""),
            OffsetDateTime::now_utc(),
            Duration::minutes(10),
        );
        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("nonce").is_none());
    }
}
