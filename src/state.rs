use crate::config::{ConfigStore, Settings};
use crate::dashboard::{AnalyticsSource, Dashboard, TikTokSource};
use crate::oauth::{OAuthClient, ProviderEndpoints};
use crate::session::SessionStore;
use std::{sync::Arc, time::Duration};
use tracing::warn;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub sessions: Arc<SessionStore>,
    pub dashboard: Arc<Dashboard>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let http = http_client(&settings);
        let source = Arc::new(TikTokSource::new(http.clone(), &settings.api_base_url));
        Self::with_source(settings, http, source)
    }

    pub fn with_source(
        settings: Settings,
        http: reqwest::Client,
        source: Arc<dyn AnalyticsSource>,
    ) -> Self {
        let endpoints = ProviderEndpoints::new(&settings.auth_url, &settings.api_base_url);
        let oauth = OAuthClient::new(http, endpoints, settings.scopes.clone());
        let config = Arc::new(ConfigStore::new(settings));
        let sessions = Arc::new(SessionStore::default());
        let dashboard = Arc::new(Dashboard::new(
            Arc::clone(&config),
            Arc::clone(&sessions),
            oauth,
            source,
        ));

        Self {
            config,
            sessions,
            dashboard,
        }
    }
}

fn http_client(settings: &Settings) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(settings.http_timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "falling back to default HTTP client");
            reqwest::Client::new()
        })
}
