//! OAuth 2.0 authorization-code flow with PKCE against the TikTok provider.

use crate::config::Credentials;
use crate::errors::DashboardError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use url::Url;

const STATE_BYTES: usize = 32;
const VERIFIER_BYTES: usize = 96;
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Provider endpoints, overridable so tests can point at a mock server.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub revoke_url: String,
}

impl ProviderEndpoints {
    pub fn new(authorize_url: &str, api_base_url: &str) -> Self {
        let base = api_base_url.trim_end_matches('/');
        Self {
            authorize_url: authorize_url.to_string(),
            token_url: format!("{base}/v2/oauth/token/"),
            revoke_url: format!("{base}/v2/oauth/revoke/"),
        }
    }
}

/// CSRF token and PKCE verifier of an authorization request that has not been
/// completed yet. Consumed by exactly one callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAuthorization {
    pub csrf_token: String,
    pub pkce_verifier: String,
}

impl PendingAuthorization {
    pub fn generate() -> Self {
        Self {
            csrf_token: random_token(STATE_BYTES),
            pkce_verifier: random_token(VERIFIER_BYTES),
        }
    }

    /// `base64url(sha256(verifier))` without padding.
    pub fn code_challenge(&self) -> String {
        pkce_challenge(&self.pkce_verifier)
    }

    pub fn state_matches(&self, state: &str) -> bool {
        self.csrf_token.as_bytes().ct_eq(state.as_bytes()).into()
    }
}

pub fn pkce_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in_seconds: i64,
    pub expires_at: DateTime<Utc>,
    pub open_id: Option<String>,
    pub scope: Option<String>,
}

impl TokenSet {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    open_id: Option<String>,
    scope: Option<String>,
}

pub struct OAuthClient {
    http: reqwest::Client,
    endpoints: ProviderEndpoints,
    scopes: Vec<String>,
}

impl OAuthClient {
    pub fn new(http: reqwest::Client, endpoints: ProviderEndpoints, scopes: Vec<String>) -> Self {
        Self {
            http,
            endpoints,
            scopes,
        }
    }

    /// Start an authorization: returns the provider URL to redirect to and
    /// the pending state the callback must present.
    pub fn initiate(
        &self,
        credentials: &Credentials,
    ) -> Result<(Url, PendingAuthorization), DashboardError> {
        if credentials.client_key.is_empty() {
            return Err(DashboardError::Configuration(
                "TikTok client key is not configured".into(),
            ));
        }

        let pending = PendingAuthorization::generate();
        let url = self.authorization_url(credentials, &pending)?;
        Ok((url, pending))
    }

    pub fn authorization_url(
        &self,
        credentials: &Credentials,
        pending: &PendingAuthorization,
    ) -> Result<Url, DashboardError> {
        let mut url = Url::parse(&self.endpoints.authorize_url).map_err(|e| {
            DashboardError::Configuration(format!("invalid authorize URL: {e}"))
        })?;

        url.query_pairs_mut()
            .append_pair("client_key", &credentials.client_key)
            .append_pair("scope", &self.scopes.join(","))
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &credentials.redirect_uri)
            .append_pair("state", &pending.csrf_token)
            .append_pair("code_challenge", &pending.code_challenge())
            .append_pair("code_challenge_method", "S256");

        Ok(url)
    }

    pub async fn exchange_code(
        &self,
        credentials: &Credentials,
        code: &str,
        verifier: &str,
    ) -> Result<TokenSet, DashboardError> {
        require_secret(credentials)?;
        let params = [
            ("client_key", credentials.client_key.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", credentials.redirect_uri.as_str()),
            ("code_verifier", verifier),
        ];
        self.token_request(&params).await
    }

    pub async fn refresh(
        &self,
        credentials: &Credentials,
        refresh_token: &str,
    ) -> Result<TokenSet, DashboardError> {
        require_secret(credentials)?;
        let params = [
            ("client_key", credentials.client_key.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        self.token_request(&params).await
    }

    /// Best effort: local state is dropped whatever the provider answers.
    pub async fn revoke(&self, credentials: &Credentials, access_token: &str) -> bool {
        let params = [
            ("client_key", credentials.client_key.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("token", access_token),
        ];

        match self.http.post(&self.endpoints.revoke_url).form(&params).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(status = resp.status().as_u16(), "token revoke rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "token revoke failed");
                false
            }
        }
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenSet, DashboardError> {
        let resp = self
            .http
            .post(&self.endpoints.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| DashboardError::token_exchange(None, e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| DashboardError::token_exchange(Some(status.as_u16()), e.to_string()))?;

        if !status.is_success() {
            return Err(DashboardError::token_exchange(Some(status.as_u16()), body));
        }

        // The provider reports some failures as 200 with an `error` object.
        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|_| DashboardError::token_exchange(Some(status.as_u16()), body.clone()))?;
        let Some(access_token) = parsed.access_token.filter(|token| !token.is_empty()) else {
            return Err(DashboardError::token_exchange(Some(status.as_u16()), body));
        };

        let expires_in = parsed.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        debug!(expires_in, has_refresh = parsed.refresh_token.is_some(), "token issued");

        Ok(TokenSet {
            access_token,
            refresh_token: parsed.refresh_token,
            expires_in_seconds: expires_in,
            expires_at: Utc::now() + Duration::seconds(expires_in),
            open_id: parsed.open_id,
            scope: parsed.scope,
        })
    }
}

fn require_secret(credentials: &Credentials) -> Result<(), DashboardError> {
    if credentials.is_complete() {
        Ok(())
    } else {
        Err(DashboardError::Configuration(
            "TikTok client key or client secret is not configured".into(),
        ))
    }
}
