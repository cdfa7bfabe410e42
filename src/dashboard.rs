//! Authorization state machine and snapshot computation.
//!
//! Each session moves `unauthorized -> pending -> authorized`: starting an
//! authorization stores a [`PendingAuthorization`], the callback consumes it
//! exactly once and, if the code exchange succeeds, stores a [`TokenSet`].
//! Snapshots are recomputed per session and pushed to that session's
//! connections.

use crate::config::{ApiType, ConfigStore};
use crate::demo::demo_records;
use crate::errors::DashboardError;
use crate::models::{AnalyticsRecord, AuthStatus, CallbackParams, Snapshot, SnapshotStatus};
use crate::oauth::{OAuthClient, PendingAuthorization, TokenSet};
use crate::push::PushHub;
use crate::session::{SessionId, SessionStore};
use crate::tiktok::{EndpointProbe, MetricsClient};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Where analytics records come from.
#[async_trait]
pub trait AnalyticsSource: Send + Sync {
    async fn fetch_analytics(&self, access_token: &str) -> Result<Vec<AnalyticsRecord>, DashboardError>;

    async fn probe_endpoints(&self, access_token: &str) -> BTreeMap<String, EndpointProbe>;
}

pub struct TikTokSource {
    http: reqwest::Client,
    base_url: String,
}

impl TikTokSource {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
        }
    }

    fn client(&self, access_token: &str) -> MetricsClient {
        MetricsClient::new(self.http.clone(), &self.base_url, access_token)
    }
}

#[async_trait]
impl AnalyticsSource for TikTokSource {
    async fn fetch_analytics(&self, access_token: &str) -> Result<Vec<AnalyticsRecord>, DashboardError> {
        self.client(access_token).fetch_analytics().await
    }

    async fn probe_endpoints(&self, access_token: &str) -> BTreeMap<String, EndpointProbe> {
        self.client(access_token).probe_endpoints().await
    }
}

pub struct Dashboard {
    config: Arc<ConfigStore>,
    sessions: Arc<SessionStore>,
    oauth: OAuthClient,
    source: Arc<dyn AnalyticsSource>,
    hub: PushHub,
}

impl Dashboard {
    pub fn new(
        config: Arc<ConfigStore>,
        sessions: Arc<SessionStore>,
        oauth: OAuthClient,
        source: Arc<dyn AnalyticsSource>,
    ) -> Self {
        Self {
            config,
            sessions,
            oauth,
            source,
            hub: PushHub::new(),
        }
    }

    pub fn hub(&self) -> &PushHub {
        &self.hub
    }

    pub async fn auth_status(&self, session: SessionId) -> AuthStatus {
        let api_type = self.config.api_type().await;
        let (configured, authenticated, message) = match api_type {
            ApiType::Official => {
                if self.sessions.tokens(session).await.is_some() {
                    (true, true, "Connected to the TikTok official API")
                } else {
                    (true, false, "API credentials configured, authorization required")
                }
            }
            ApiType::ThirdParty => (true, true, "Using the third-party API"),
            ApiType::None => (false, false, "Configure the TikTok API credentials first"),
        };

        AuthStatus {
            api_type,
            configured,
            authenticated,
            message: message.to_string(),
        }
    }

    /// Starts an authorization for `session`, replacing any earlier pending one.
    pub async fn begin_authorization(&self, session: SessionId) -> Result<Url, DashboardError> {
        let credentials = self.config.credentials().await;
        if !credentials.is_complete() {
            return Err(DashboardError::Configuration(
                "TikTok official API credentials are not configured".into(),
            ));
        }

        let (url, pending) = self.oauth.initiate(&credentials)?;
        self.sessions.set_pending(session, pending).await;
        info!(session = %session, "authorization started");
        Ok(url)
    }

    /// Handles the provider redirect. The pending state is consumed whatever
    /// the outcome, except when the code exchange itself fails.
    pub async fn complete_authorization(
        &self,
        session: SessionId,
        params: CallbackParams,
    ) -> Result<(), DashboardError> {
        let pending = self.sessions.take_pending(session).await;

        if let Some(error) = params.error.filter(|e| !e.is_empty()) {
            let detail = match params.error_description.filter(|d| !d.is_empty()) {
                Some(description) => format!("{error}: {description}"),
                None => error,
            };
            warn!(session = %session, error = %detail, "authorization denied by provider");
            return Err(DashboardError::AuthorizationDenied(detail));
        }

        let code = params
            .code
            .filter(|code| !code.is_empty())
            .ok_or(DashboardError::MissingCode)?;

        let state = params.state.unwrap_or_default();
        let Some(pending) = pending.filter(|pending| pending.state_matches(&state)) else {
            warn!(session = %session, "authorization state mismatch");
            return Err(DashboardError::StateMismatch);
        };

        self.redeem(session, &code, pending).await
    }

    /// Out-of-band variant of the callback for when the redirect cannot reach
    /// this server. A blank `state` is trusted; a non-blank one must match.
    pub async fn complete_manual_authorization(
        &self,
        session: SessionId,
        code: &str,
        state: &str,
    ) -> Result<(), DashboardError> {
        if code.is_empty() {
            return Err(DashboardError::MissingCode);
        }

        let pending = self.sessions.take_pending(session).await;
        let Some(pending) = pending.filter(|pending| state.is_empty() || pending.state_matches(state)) else {
            warn!(session = %session, "manual authorization without matching pending state");
            return Err(DashboardError::StateMismatch);
        };

        self.redeem(session, code, pending).await
    }

    async fn redeem(
        &self,
        session: SessionId,
        code: &str,
        pending: PendingAuthorization,
    ) -> Result<(), DashboardError> {
        let credentials = self.config.credentials().await;
        match self
            .oauth
            .exchange_code(&credentials, code, &pending.pkce_verifier)
            .await
        {
            Ok(tokens) => {
                info!(session = %session, expires_in = tokens.expires_in_seconds, "authorization completed");
                self.sessions.set_tokens(session, tokens).await;
                Ok(())
            }
            Err(e) => {
                warn!(session = %session, error = %e, "code exchange failed");
                self.sessions.restore_pending(session, pending).await;
                Err(e)
            }
        }
    }

    /// Wipes runtime configuration and every session's tokens, revoking the
    /// tokens with the provider on a best-effort basis.
    pub async fn clear_configuration(&self) {
        let credentials = self.config.credentials().await;
        let tokens = self.sessions.clear_credentials().await;
        if credentials.is_complete() {
            for token in &tokens {
                self.oauth.revoke(&credentials, token).await;
            }
        }
        self.config.clear().await;
        info!(revoked = tokens.len(), "configuration cleared");
    }

    pub async fn probe_endpoints(
        &self,
        session: SessionId,
    ) -> Result<BTreeMap<String, EndpointProbe>, DashboardError> {
        let tokens = self
            .sessions
            .tokens(session)
            .await
            .ok_or_else(|| DashboardError::Validation("Authorize a TikTok account first".into()))?;
        Ok(self.source.probe_endpoints(&tokens.access_token).await)
    }

    /// The last snapshot of `session`, computing one if there is none yet.
    pub async fn current_snapshot(&self, session: SessionId) -> Snapshot {
        match self.sessions.snapshot(session).await {
            Some(snapshot) => snapshot,
            None => self.refresh(session).await,
        }
    }

    /// Recomputes and broadcasts the snapshot of `session`. A caller that
    /// arrives while a refresh is running waits for it and shares its result.
    pub async fn refresh(&self, session: SessionId) -> Snapshot {
        let slot = self.sessions.refresh_slot(session).await;
        let seen = slot.generation.load(Ordering::Acquire);
        let _guard = slot.lock.lock().await;

        if slot.generation.load(Ordering::Acquire) != seen {
            if let Some(snapshot) = self.sessions.snapshot(session).await {
                return snapshot;
            }
        }

        let snapshot = self.compute(session).await;
        self.sessions.set_snapshot(session, snapshot.clone()).await;
        slot.generation.fetch_add(1, Ordering::Release);

        let delivered = self.hub.broadcast(session, &snapshot).await;
        info!(
            session = %session,
            status = ?snapshot.status,
            videos = snapshot.videos.len(),
            delivered,
            "snapshot refreshed"
        );
        snapshot
    }

    async fn compute(&self, session: SessionId) -> Snapshot {
        match self.config.api_type().await {
            ApiType::None => Snapshot::empty(
                SnapshotStatus::NoConfig,
                "Configure the TikTok API credentials first",
            ),
            ApiType::ThirdParty => {
                let err = DashboardError::NotImplemented("third-party API data source".into());
                Snapshot::empty(SnapshotStatus::NotImplemented, err.to_string())
            }
            ApiType::Official => {
                let tokens = match self.usable_tokens(session).await {
                    Ok(Some(tokens)) => tokens,
                    Ok(None) => {
                        return Snapshot::empty(
                            SnapshotStatus::NeedAuth,
                            "Authorize a TikTok account to load data",
                        );
                    }
                    Err(e) => return self.failed(e),
                };

                match self.source.fetch_analytics(&tokens.access_token).await {
                    Ok(videos) if videos.is_empty() => {
                        Snapshot::empty(SnapshotStatus::NoData, "No videos returned by the API")
                    }
                    Ok(videos) => {
                        let message = format!("Fetched {} videos", videos.len());
                        Snapshot::new(SnapshotStatus::Success, message, videos)
                    }
                    Err(e) => self.failed(e),
                }
            }
        }
    }

    /// Session tokens, refreshed first when they have expired.
    async fn usable_tokens(&self, session: SessionId) -> Result<Option<TokenSet>, DashboardError> {
        let Some(tokens) = self.sessions.tokens(session).await else {
            return Ok(None);
        };

        let refresh_token = match &tokens.refresh_token {
            Some(refresh_token) if tokens.is_expired() => refresh_token.clone(),
            _ => return Ok(Some(tokens)),
        };

        let credentials = self.config.credentials().await;
        let refreshed = self.oauth.refresh(&credentials, &refresh_token).await?;
        info!(session = %session, "access token refreshed");
        self.sessions.set_tokens(session, refreshed.clone()).await;
        Ok(Some(refreshed))
    }

    fn failed(&self, err: DashboardError) -> Snapshot {
        warn!(error = %err, "data fetch failed");
        if self.config.settings().demo_fallback {
            let mut snapshot = Snapshot::new(
                SnapshotStatus::Demo,
                format!("Live data unavailable ({err}); showing synthetic demo data"),
                demo_records(),
            );
            snapshot.synthetic = true;
            snapshot
        } else {
            Snapshot::empty(SnapshotStatus::Error, format!("Failed to fetch data: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::oauth::ProviderEndpoints;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FakeSource {
        calls: AtomicUsize,
        delay: Duration,
        result: Result<Vec<AnalyticsRecord>, String>,
    }

    impl FakeSource {
        fn ok(records: Vec<AnalyticsRecord>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                result: Ok(records),
            }
        }

        fn failing(body: &str) -> Self {
            Self {
                result: Err(body.to_string()),
                ..Self::ok(Vec::new())
            }
        }
    }

    #[async_trait]
    impl AnalyticsSource for FakeSource {
        async fn fetch_analytics(&self, _access_token: &str) -> Result<Vec<AnalyticsRecord>, DashboardError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.result
                .clone()
                .map_err(|body| DashboardError::upstream(Some(500), body))
        }

        async fn probe_endpoints(&self, _access_token: &str) -> BTreeMap<String, EndpointProbe> {
            BTreeMap::new()
        }
    }

    fn record(id: &str) -> AnalyticsRecord {
        let video = crate::tiktok::VideoDetails {
            id: id.to_string(),
            view_count: 100,
            like_count: 10,
            duration: 20,
            ..Default::default()
        };
        crate::analytics::normalize(&video)
    }

    fn tokens(access: &str, expires_in: i64, refresh: Option<&str>) -> TokenSet {
        TokenSet {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in_seconds: expires_in,
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(expires_in),
            open_id: None,
            scope: None,
        }
    }

    async fn dashboard(settings: Settings, api_base: &str, source: Arc<dyn AnalyticsSource>) -> Dashboard {
        dashboard_with_sessions(settings, api_base, source, Arc::new(SessionStore::default())).await
    }

    async fn dashboard_with_sessions(
        settings: Settings,
        api_base: &str,
        source: Arc<dyn AnalyticsSource>,
        sessions: Arc<SessionStore>,
    ) -> Dashboard {
        let config = Arc::new(ConfigStore::new(settings));
        config
            .set_api_credentials("client-key-123".into(), "client-secret-456".into())
            .await;
        let oauth = OAuthClient::new(
            reqwest::Client::new(),
            ProviderEndpoints::new("https://www.tiktok.com/v2/auth/authorize/", api_base),
            vec!["user.info.basic".into()],
        );
        Dashboard::new(config, sessions, oauth, source)
    }

    fn callback(code: Option<&str>, state: Option<&str>) -> CallbackParams {
        CallbackParams {
            code: code.map(str::to_string),
            state: state.map(str::to_string),
            ..CallbackParams::default()
        }
    }

    async fn mock_token_endpoint(server: &MockServer, status: u16) {
        Mock::given(method("POST"))
            .and(path("/v2/oauth/token/"))
            .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({
                "access_token": "act.granted",
                "refresh_token": "rft.granted",
                "expires_in": 86400
            })))
            .mount(server)
            .await;
    }

    fn csrf_from(url: &Url) -> String {
        url.query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[tokio::test]
    async fn successful_callback_authorizes_session() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 200).await;
        let dash = dashboard(Settings::default(), &server.uri(), Arc::new(FakeSource::ok(vec![]))).await;
        let session = dash.sessions.create().await;

        let url = dash.begin_authorization(session).await.unwrap();
        let state = csrf_from(&url);
        dash.complete_authorization(session, callback(Some("code-1"), Some(&state)))
            .await
            .unwrap();

        assert!(dash.auth_status(session).await.authenticated);
        assert_eq!(
            dash.sessions.tokens(session).await.unwrap().access_token,
            "act.granted"
        );
    }

    #[tokio::test]
    async fn replayed_callback_fails() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 200).await;
        let dash = dashboard(Settings::default(), &server.uri(), Arc::new(FakeSource::ok(vec![]))).await;
        let session = dash.sessions.create().await;

        let state = csrf_from(&dash.begin_authorization(session).await.unwrap());
        dash.complete_authorization(session, callback(Some("code-1"), Some(&state)))
            .await
            .unwrap();

        let replay = dash
            .complete_authorization(session, callback(Some("code-1"), Some(&state)))
            .await;
        assert!(matches!(replay, Err(DashboardError::StateMismatch)));
    }

    #[tokio::test]
    async fn mismatched_state_discards_pending() {
        let dash = dashboard(Settings::default(), "http://127.0.0.1:9", Arc::new(FakeSource::ok(vec![]))).await;
        let session = dash.sessions.create().await;
        let state = csrf_from(&dash.begin_authorization(session).await.unwrap());

        let forged = dash
            .complete_authorization(session, callback(Some("code"), Some("forged")))
            .await;
        assert!(matches!(forged, Err(DashboardError::StateMismatch)));

        let genuine = dash
            .complete_authorization(session, callback(Some("code"), Some(&state)))
            .await;
        assert!(matches!(genuine, Err(DashboardError::StateMismatch)));
    }

    #[tokio::test]
    async fn provider_error_and_missing_code() {
        let dash = dashboard(Settings::default(), "http://127.0.0.1:9", Arc::new(FakeSource::ok(vec![]))).await;
        let session = dash.sessions.create().await;
        dash.begin_authorization(session).await.unwrap();

        let denied = dash
            .complete_authorization(
                session,
                CallbackParams {
                    error: Some("access_denied".into()),
                    ..CallbackParams::default()
                },
            )
            .await;
        assert!(matches!(denied, Err(DashboardError::AuthorizationDenied(ref e)) if e == "access_denied"));

        dash.begin_authorization(session).await.unwrap();
        let missing = dash.complete_authorization(session, callback(None, Some("x"))).await;
        assert!(matches!(missing, Err(DashboardError::MissingCode)));
    }

    #[tokio::test]
    async fn failed_exchange_keeps_flow_pending() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 400).await;
        let dash = dashboard(Settings::default(), &server.uri(), Arc::new(FakeSource::ok(vec![]))).await;
        let session = dash.sessions.create().await;
        let state = csrf_from(&dash.begin_authorization(session).await.unwrap());

        let first = dash
            .complete_authorization(session, callback(Some("bad"), Some(&state)))
            .await;
        assert!(matches!(first, Err(DashboardError::TokenExchangeFailed { status: Some(400), .. })));
        assert!(!dash.auth_status(session).await.authenticated);

        let pending = dash.sessions.get(session).await.unwrap().pending.unwrap();
        assert_eq!(pending.csrf_token, state);
    }

    #[tokio::test]
    async fn manual_authorization_trusts_blank_state() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 200).await;
        let dash = dashboard(Settings::default(), &server.uri(), Arc::new(FakeSource::ok(vec![]))).await;
        let session = dash.sessions.create().await;
        dash.begin_authorization(session).await.unwrap();

        dash.complete_manual_authorization(session, "pasted-code", "")
            .await
            .unwrap();
        assert!(dash.auth_status(session).await.authenticated);
    }

    #[tokio::test]
    async fn begin_requires_configuration() {
        let dash = dashboard(Settings::default(), "http://127.0.0.1:9", Arc::new(FakeSource::ok(vec![]))).await;
        dash.config.clear().await;
        let session = dash.sessions.create().await;
        assert!(matches!(
            dash.begin_authorization(session).await,
            Err(DashboardError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn snapshot_reflects_configuration_and_authorization() {
        let source = Arc::new(FakeSource::ok(vec![record("v1")]));
        let dash = dashboard(Settings::default(), "http://127.0.0.1:9", source).await;
        let session = dash.sessions.create().await;

        assert_eq!(dash.refresh(session).await.status, SnapshotStatus::NeedAuth);

        dash.sessions.set_tokens(session, tokens("act", 3600, None)).await;
        let snapshot = dash.refresh(session).await;
        assert_eq!(snapshot.status, SnapshotStatus::Success);
        assert_eq!(snapshot.videos.len(), 1);
        assert!(!snapshot.synthetic);

        dash.config.clear().await;
        assert_eq!(dash.refresh(session).await.status, SnapshotStatus::NoConfig);
    }

    #[tokio::test]
    async fn upstream_failure_is_error_without_demo_policy() {
        let dash = dashboard(Settings::default(), "http://127.0.0.1:9", Arc::new(FakeSource::failing("boom"))).await;
        let session = dash.sessions.create().await;
        dash.sessions.set_tokens(session, tokens("act", 3600, None)).await;

        let snapshot = dash.refresh(session).await;
        assert_eq!(snapshot.status, SnapshotStatus::Error);
        assert!(snapshot.videos.is_empty());
        assert!(snapshot.is_failure());
    }

    #[tokio::test]
    async fn demo_policy_flags_synthetic_data() {
        let settings = Settings {
            demo_fallback: true,
            ..Settings::default()
        };
        let dash = dashboard(settings, "http://127.0.0.1:9", Arc::new(FakeSource::failing("boom"))).await;
        let session = dash.sessions.create().await;
        dash.sessions.set_tokens(session, tokens("act", 3600, None)).await;

        let snapshot = dash.refresh(session).await;
        assert_eq!(snapshot.status, SnapshotStatus::Demo);
        assert!(snapshot.synthetic);
        assert!(snapshot.videos.iter().all(|v| v.author == crate::demo::DEMO_AUTHOR));
    }

    #[tokio::test]
    async fn concurrent_refreshes_are_coalesced() {
        let source = Arc::new(FakeSource {
            delay: Duration::from_millis(200),
            ..FakeSource::ok(vec![record("v1")])
        });
        let dash = Arc::new(dashboard(Settings::default(), "http://127.0.0.1:9", source.clone()).await);
        let session = dash.sessions.create().await;
        dash.sessions.set_tokens(session, tokens("act", 3600, None)).await;

        let first = tokio::spawn({
            let dash = Arc::clone(&dash);
            async move { dash.refresh(session).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = dash.refresh(session).await;
        let first = first.await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.timestamp, second.timestamp);
    }

    #[tokio::test]
    async fn refresh_broadcasts_to_session_connections() {
        let dash = dashboard(Settings::default(), "http://127.0.0.1:9", Arc::new(FakeSource::ok(vec![]))).await;
        let session = dash.sessions.create().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        dash.hub().register(session, tx).await;

        dash.refresh(session).await;
        let text = rx.try_recv().unwrap();
        assert!(text.contains("\"need_auth\""));
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_before_fetch() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 200).await;
        let dash = dashboard(Settings::default(), &server.uri(), Arc::new(FakeSource::ok(vec![record("v1")]))).await;
        let session = dash.sessions.create().await;
        dash.sessions
            .set_tokens(session, tokens("act.old", -10, Some("rft.old")))
            .await;

        assert_eq!(dash.refresh(session).await.status, SnapshotStatus::Success);
        assert_eq!(
            dash.sessions.tokens(session).await.unwrap().access_token,
            "act.granted"
        );
    }

    #[tokio::test]
    async fn anonymous_refreshes_stay_bounded_by_session_table() {
        let sessions = Arc::new(SessionStore::with_capacity(4));
        let dash = dashboard_with_sessions(
            Settings::default(),
            "http://127.0.0.1:9",
            Arc::new(FakeSource::ok(vec![])),
            Arc::clone(&sessions),
        )
        .await;

        let first = sessions.create().await;
        dash.current_snapshot(first).await;
        let first_slot = Arc::downgrade(&sessions.refresh_slot(first).await);

        for _ in 0..500 {
            let session = sessions.create().await;
            dash.current_snapshot(session).await;
        }

        assert_eq!(sessions.len().await, 4);
        assert!(first_slot.upgrade().is_none());
    }

    #[tokio::test]
    async fn clearing_configuration_drops_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/oauth/revoke/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let dash = dashboard(Settings::default(), &server.uri(), Arc::new(FakeSource::ok(vec![]))).await;
        let session = dash.sessions.create().await;
        dash.sessions.set_tokens(session, tokens("act", 3600, None)).await;

        dash.clear_configuration().await;
        let status = dash.auth_status(session).await;
        assert!(!status.configured);
        assert!(!status.authenticated);
    }
}
