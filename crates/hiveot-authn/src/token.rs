//! ES256 access and refresh tokens.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use hiveot_kernel::{HubError, HubResult};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rcgen::KeyPair;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::store::CredentialStore;

pub const DEFAULT_ISSUER: &str = "hiveot";
pub const DEFAULT_ACCESS_TOKEN_VALIDITY: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_REFRESH_TOKEN_VALIDITY: Duration = Duration::from_secs(7 * 24 * 3600);

/// What a token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSubject {
    Access,
    Refresh,
}

impl TokenSubject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub iss: String,
    /// `access` or `refresh`.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Verifies tokens with the public half of the signing key.
#[derive(Clone)]
pub struct TokenVerifier {
    issuer: String,
    decoding: DecodingKey,
}

impl TokenVerifier {
    pub fn from_public_key_pem(issuer: impl Into<String>, pem: &str) -> HubResult<Self> {
        let decoding = DecodingKey::from_ec_pem(pem.as_bytes())
            .map_err(|e| HubError::invalid_input(format!("token public key: {e}")))?;
        Ok(Self {
            issuer: issuer.into(),
            decoding,
        })
    }

    /// Check signature, issuer, expiry and subject.
    pub fn verify(&self, token: &str, subject: TokenSubject) -> HubResult<Claims> {
        let mut validation = Validation::new(Algorithm::ES256);
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.sub = Some(subject.as_str().to_string());
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!("{subject} token rejected: {e}");
            HubError::unauthorized(format!("invalid {subject} token: {e}"))
        })?;
        Ok(data.claims)
    }
}

/// Issues and verifies session tokens. The signing key lives only in memory;
/// a restart with a new key invalidates every outstanding token.
pub struct SessionAuth {
    encoding: EncodingKey,
    verifier: TokenVerifier,
    public_key_pem: String,
    access_validity: Duration,
    refresh_validity: Duration,
}

impl SessionAuth {
    /// New issuer with a freshly generated P-256 key.
    pub fn generate(issuer: impl Into<String>) -> HubResult<Self> {
        let key = KeyPair::generate().map_err(|e| HubError::fatal(format!("token signing key: {e}")))?;
        Self::from_key_pem(issuer, &key.serialize_pem())
    }

    /// Issuer from a PKCS#8 PEM private key.
    pub fn from_key_pem(issuer: impl Into<String>, key_pem: &str) -> HubResult<Self> {
        let key = KeyPair::from_pem(key_pem).map_err(|e| HubError::fatal(format!("token signing key: {e}")))?;
        let encoding = EncodingKey::from_ec_pem(key_pem.as_bytes())
            .map_err(|e| HubError::fatal(format!("token signing key: {e}")))?;
        let public_key_pem = key.public_key_pem();
        Ok(Self {
            encoding,
            verifier: TokenVerifier::from_public_key_pem(issuer, &public_key_pem)?,
            public_key_pem,
            access_validity: DEFAULT_ACCESS_TOKEN_VALIDITY,
            refresh_validity: DEFAULT_REFRESH_TOKEN_VALIDITY,
        })
    }

    pub fn with_validity(mut self, access: Duration, refresh: Duration) -> Self {
        self.access_validity = access;
        self.refresh_validity = refresh;
        self
    }

    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Mint an access and a refresh token for `client_id`. Callers must have
    /// authenticated the client first.
    pub fn issue(&self, client_id: &str) -> HubResult<TokenPair> {
        self.issue_at(client_id, Utc::now().timestamp())
    }

    fn issue_at(&self, client_id: &str, now: i64) -> HubResult<TokenPair> {
        if client_id.is_empty() {
            return Err(HubError::invalid_input("cannot issue tokens without a client ID"));
        }
        Ok(TokenPair {
            access_token: self.sign(client_id, TokenSubject::Access, now, self.access_validity)?,
            refresh_token: self.sign(client_id, TokenSubject::Refresh, now, self.refresh_validity)?,
        })
    }

    fn sign(&self, client_id: &str, subject: TokenSubject, now: i64, validity: Duration) -> HubResult<String> {
        let claims = Claims {
            client_id: client_id.to_string(),
            iss: self.verifier.issuer.clone(),
            sub: subject.as_str().to_string(),
            iat: now,
            exp: now + validity.as_secs() as i64,
            jti: Uuid::new_v4().to_string(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::ES256), &claims, &self.encoding)
            .map_err(|e| HubError::internal(format!("signing {subject} token: {e}")))
    }

    pub fn verify(&self, token: &str, subject: TokenSubject) -> HubResult<Claims> {
        self.verifier.verify(token, subject)
    }

    /// Verify an access token issued to `client_id`.
    pub fn authenticate(&self, client_id: &str, access_token: &str) -> HubResult<Claims> {
        let claims = self.verify(access_token, TokenSubject::Access)?;
        if claims.client_id != client_id {
            return Err(HubError::unauthorized(format!("token was not issued to '{client_id}'")));
        }
        Ok(claims)
    }

    /// Exchange a valid refresh token of `client_id` for a new pair.
    pub fn refresh(&self, client_id: &str, refresh_token: &str) -> HubResult<TokenPair> {
        let claims = self.verify(refresh_token, TokenSubject::Refresh)?;
        if claims.client_id != client_id {
            return Err(HubError::unauthorized(format!("refresh token was not issued to '{client_id}'")));
        }
        self.issue(client_id)
    }

    /// Check the password with `store` and mint tokens on success.
    pub async fn login(&self, store: &dyn CredentialStore, client_id: &str, password: &str) -> HubResult<TokenPair> {
        store.verify_password(client_id, password).await.map_err(|e| {
            debug!("login of '{client_id}' failed: {e}");
            HubError::unauthorized(format!("invalid login as '{client_id}'"))
        })?;
        self.issue(client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCredentialStore;

    fn auth() -> SessionAuth {
        SessionAuth::generate(DEFAULT_ISSUER).unwrap()
    }

    #[test]
    fn tokens_verify_under_their_key_only() {
        let auth = auth();
        let other = SessionAuth::generate(DEFAULT_ISSUER).unwrap();
        let pair = auth.issue("alice").unwrap();

        let claims = auth.verify(&pair.access_token, TokenSubject::Access).unwrap();
        assert_eq!(claims.client_id, "alice");
        assert_eq!(claims.exp - claims.iat, 15 * 60);
        assert!(auth.verify(&pair.refresh_token, TokenSubject::Refresh).is_ok());

        assert!(other.verify(&pair.access_token, TokenSubject::Access).is_err());
        assert!(other.verify(&pair.refresh_token, TokenSubject::Refresh).is_err());

        let verifier = TokenVerifier::from_public_key_pem(DEFAULT_ISSUER, auth.public_key_pem()).unwrap();
        assert!(verifier.verify(&pair.access_token, TokenSubject::Access).is_ok());
    }

    #[test]
    fn subject_must_match() {
        let auth = auth();
        let pair = auth.issue("alice").unwrap();
        assert!(auth.verify(&pair.access_token, TokenSubject::Refresh).is_err());
        assert!(auth.verify(&pair.refresh_token, TokenSubject::Access).is_err());
    }

    #[test]
    fn tampered_claims_fail() {
        let auth = auth();
        let pair = auth.issue("alice").unwrap();
        let parts: Vec<&str> = pair.refresh_token.split('.').collect();
        assert_eq!(parts.len(), 3);
        let forged_claims = Claims {
            client_id: "mallory".into(),
            iss: DEFAULT_ISSUER.into(),
            sub: "refresh".into(),
            iat: 0,
            exp: i64::MAX / 2,
            jti: "x".into(),
        };
        let payload = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &forged_claims,
            &EncodingKey::from_secret(b"k"),
        )
        .unwrap();
        let forged_body = payload.split('.').nth(1).unwrap();
        let forged = format!("{}.{}.{}", parts[0], forged_body, parts[2]);
        assert!(matches!(
            auth.verify(&forged, TokenSubject::Refresh),
            Err(HubError::Unauthorized(_))
        ));
    }

    #[test]
    fn expired_token_fails() {
        let auth = auth();
        let pair = auth.issue_at("alice", Utc::now().timestamp() - 3600).unwrap();
        assert!(auth.verify(&pair.access_token, TokenSubject::Access).is_err());
        // refresh validity is a week, so the refresh token is still good
        assert!(auth.verify(&pair.refresh_token, TokenSubject::Refresh).is_ok());
    }

    #[test]
    fn refresh_issues_new_pair_for_same_client() {
        let auth = auth();
        let pair = auth.issue("alice").unwrap();
        let renewed = auth.refresh("alice", &pair.refresh_token).unwrap();
        assert_ne!(renewed.refresh_token, pair.refresh_token);
        assert!(matches!(auth.refresh("bob", &pair.refresh_token), Err(HubError::Unauthorized(_))));
        assert!(matches!(auth.refresh("alice", "garbage"), Err(HubError::Unauthorized(_))));
        assert!(auth.authenticate("alice", &renewed.access_token).is_ok());
        assert!(auth.authenticate("bob", &renewed.access_token).is_err());
    }

    #[tokio::test]
    async fn login_checks_credentials() {
        let auth = auth();
        let store = MemoryCredentialStore::new();
        store.add_user("alice", "pw1").unwrap();
        let pair = auth.login(&store, "alice", "pw1").await.unwrap();
        assert!(auth.verify(&pair.access_token, TokenSubject::Access).is_ok());
        assert!(matches!(
            auth.login(&store, "alice", "wrong").await,
            Err(HubError::Unauthorized(_))
        ));
        assert!(auth.issue("").is_err());
    }
}
