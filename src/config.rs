use serde::{Deserialize, Serialize};
use std::{env, time::Duration};
use tokio::sync::RwLock;

pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:5000/callback";
pub const DEFAULT_AUTH_URL: &str = "https://www.tiktok.com/v2/auth/authorize/";
pub const DEFAULT_API_BASE_URL: &str = "https://open.tiktokapis.com";
pub const DEFAULT_SCOPES: &str = "user.info.basic,video.list";
const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 30;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PORT: u16 = 5000;

/// Values read from the process environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub client_key: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub third_party_key: String,
    pub update_interval: Duration,
    pub port: u16,
    pub auth_url: String,
    pub api_base_url: String,
    pub scopes: Vec<String>,
    pub http_timeout: Duration,
    pub demo_fallback: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let redirect_uri = get("TIKTOK_REDIRECT_URI")
            .or_else(|| get("RAILWAY_PUBLIC_DOMAIN").map(|domain| format!("https://{domain}/callback")))
            .or_else(|| {
                get("RENDER_EXTERNAL_URL")
                    .map(|url| format!("{}/callback", url.trim_end_matches('/')))
            })
            .or_else(|| get("HEROKU_APP_NAME").map(|app| format!("https://{app}.herokuapp.com/callback")))
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());

        let scopes = get("TIKTOK_SCOPES")
            .unwrap_or_else(|| DEFAULT_SCOPES.to_string())
            .split(',')
            .map(str::trim)
            .filter(|scope| !scope.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            client_key: get("TIKTOK_CLIENT_KEY").unwrap_or_default(),
            client_secret: get("TIKTOK_CLIENT_SECRET").unwrap_or_default(),
            redirect_uri,
            third_party_key: get("TIKAPI_KEY").unwrap_or_default(),
            update_interval: Duration::from_secs(
                get("UPDATE_INTERVAL")
                    .and_then(|value| value.parse::<u64>().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(DEFAULT_UPDATE_INTERVAL_SECS),
            ),
            port: get("PORT")
                .and_then(|value| value.parse::<u16>().ok())
                .unwrap_or(DEFAULT_PORT),
            auth_url: get("TIKTOK_AUTH_URL").unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
            api_base_url: get("TIKTOK_API_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            scopes,
            http_timeout: Duration::from_secs(
                get("HTTP_TIMEOUT_SECS")
                    .and_then(|value| value.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            ),
            demo_fallback: get("DEMO_FALLBACK")
                .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
    Official,
    ThirdParty,
    None,
}

/// Client credentials resolved at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_key: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        !self.client_key.is_empty() && !self.client_secret.is_empty()
    }
}

#[derive(Debug, Default)]
struct RuntimeOverrides {
    client_key: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
}

/// Runtime-mutable configuration layered over [`Settings`].
///
/// A non-empty runtime value wins over the environment, which wins over the
/// built-in default. Overrides live in memory only.
#[derive(Debug)]
pub struct ConfigStore {
    settings: Settings,
    overrides: RwLock<RuntimeOverrides>,
}

impl ConfigStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            overrides: RwLock::new(RuntimeOverrides::default()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn credentials(&self) -> Credentials {
        let overrides = self.overrides.read().await;
        Credentials {
            client_key: pick(&overrides.client_key, &self.settings.client_key),
            client_secret: pick(&overrides.client_secret, &self.settings.client_secret),
            redirect_uri: pick(&overrides.redirect_uri, &self.settings.redirect_uri),
        }
    }

    pub async fn set_api_credentials(&self, client_key: String, client_secret: String) {
        let mut overrides = self.overrides.write().await;
        overrides.client_key = Some(client_key);
        overrides.client_secret = Some(client_secret);
    }

    pub async fn set_redirect_uri(&self, redirect_uri: String) {
        self.overrides.write().await.redirect_uri = Some(redirect_uri);
    }

    pub async fn redirect_uri_is_runtime(&self) -> bool {
        self.overrides
            .read()
            .await
            .redirect_uri
            .as_deref()
            .is_some_and(|uri| !uri.is_empty())
    }

    pub async fn clear(&self) {
        *self.overrides.write().await = RuntimeOverrides::default();
    }

    pub async fn api_type(&self) -> ApiType {
        if self.credentials().await.is_complete() {
            ApiType::Official
        } else if !self.settings.third_party_key.is_empty() {
            ApiType::ThirdParty
        } else {
            ApiType::None
        }
    }
}

fn pick(runtime: &Option<String>, fallback: &str) -> String {
    runtime
        .as_deref()
        .filter(|value| !value.is_empty())
        .unwrap_or(fallback)
        .to_string()
}
