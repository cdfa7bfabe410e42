//! Typed reqwest wrapper for the TikTok display API.
//!
//! Video metrics come from two calls: `/v2/video/list/` gives the basic
//! metadata of the user's latest videos, `/v2/video/query/` gives engagement
//! counters for a batch of ids. The two are left-joined on the video id.

use crate::analytics::normalize;
use crate::errors::DashboardError;
use crate::models::AnalyticsRecord;
use reqwest::RequestBuilder;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

pub const MAX_PAGE_SIZE: u32 = 20;
pub const DEFAULT_USER_FIELDS: &[&str] = &[
    "open_id",
    "avatar_url",
    "display_name",
    "bio_description",
    "profile_deep_link",
];
const LIST_FIELDS: &[&str] = &[
    "id",
    "title",
    "create_time",
    "cover_image_url",
    "share_url",
    "duration",
];
const QUERY_FIELDS: &[&str] = &[
    "id",
    "title",
    "video_description",
    "create_time",
    "cover_image_url",
    "share_url",
    "duration",
    "height",
    "width",
    "like_count",
    "comment_count",
    "share_count",
    "view_count",
    "embed_html",
    "embed_link",
];
const PROBE_BODY_LIMIT: usize = 400;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiErrorBody {
    code: String,
    message: String,
    log_id: String,
}

impl ApiErrorBody {
    fn is_error(&self) -> bool {
        !self.code.is_empty() && self.code != "ok"
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInfo {
    pub open_id: Option<String>,
    pub union_id: Option<String>,
    pub avatar_url: Option<String>,
    pub display_name: Option<String>,
    pub bio_description: Option<String>,
    pub profile_deep_link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserInfoData {
    user: UserInfo,
}

/// Raw video object as returned by the list and query endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoDetails {
    #[serde(deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(deserialize_with = "lenient::text")]
    pub title: String,
    #[serde(deserialize_with = "lenient::text")]
    pub video_description: String,
    pub create_time: Option<serde_json::Value>,
    #[serde(deserialize_with = "lenient::text")]
    pub cover_image_url: String,
    #[serde(deserialize_with = "lenient::text")]
    pub share_url: String,
    #[serde(deserialize_with = "lenient::number")]
    pub duration: u64,
    #[serde(deserialize_with = "lenient::number")]
    pub height: u64,
    #[serde(deserialize_with = "lenient::number")]
    pub width: u64,
    #[serde(deserialize_with = "lenient::number")]
    pub view_count: u64,
    #[serde(deserialize_with = "lenient::number")]
    pub like_count: u64,
    #[serde(deserialize_with = "lenient::number")]
    pub comment_count: u64,
    #[serde(deserialize_with = "lenient::number")]
    pub share_count: u64,
    #[serde(deserialize_with = "lenient::text")]
    pub embed_html: String,
    #[serde(deserialize_with = "lenient::text")]
    pub embed_link: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VideoPage {
    pub videos: Vec<VideoDetails>,
    pub cursor: Option<i64>,
    pub has_more: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VideoQueryData {
    videos: Vec<VideoDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointProbe {
    pub method: String,
    pub endpoint: String,
    pub status_code: Option<u16>,
    pub success: bool,
    pub response: String,
}

/// HTTP client for the authenticated display API endpoints.
pub struct MetricsClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl MetricsClient {
    pub fn new(http: reqwest::Client, base_url: &str, access_token: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn fetch_user_info(&self, fields: &[&str]) -> Result<UserInfo, DashboardError> {
        let request = self
            .http
            .get(self.url("/v2/user/info/"))
            .query(&[("fields", fields.join(","))]);
        let data: UserInfoData = self.send(request, "user info").await?;
        Ok(data.user)
    }

    /// One page of the user's videos, newest first. `limit` is clamped to 1..=20.
    pub async fn fetch_video_list(
        &self,
        cursor: Option<i64>,
        limit: u32,
    ) -> Result<VideoPage, DashboardError> {
        let mut body = json!({ "max_count": limit.clamp(1, MAX_PAGE_SIZE) });
        if let Some(cursor) = cursor {
            body["cursor"] = json!(cursor);
        }

        let request = self
            .http
            .post(self.url("/v2/video/list/"))
            .query(&[("fields", LIST_FIELDS.join(","))])
            .json(&body);
        self.send(request, "video list").await
    }

    pub async fn fetch_video_stats(
        &self,
        video_ids: &[String],
    ) -> Result<Vec<VideoDetails>, DashboardError> {
        if video_ids.is_empty() {
            return Ok(Vec::new());
        }

        let request = self
            .http
            .post(self.url("/v2/video/query/"))
            .query(&[("fields", QUERY_FIELDS.join(","))])
            .json(&json!({ "filters": { "video_ids": video_ids } }));
        let data: VideoQueryData = self.send(request, "video query").await?;
        Ok(data.videos)
    }

    /// Latest page of videos with their counters, normalized for display.
    pub async fn fetch_analytics(&self) -> Result<Vec<AnalyticsRecord>, DashboardError> {
        let page = self.fetch_video_list(None, MAX_PAGE_SIZE).await?;
        if page.videos.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = page.videos.iter().map(|video| video.id.clone()).collect();
        let stats = self.fetch_video_stats(&ids).await?;
        debug!(listed = ids.len(), with_stats = stats.len(), "joining video stats");

        Ok(join_stats(page.videos, stats)
            .iter()
            .map(normalize)
            .collect())
    }

    /// Hits each endpoint once and reports the raw outcome, for diagnosing
    /// scope and permission problems.
    pub async fn probe_endpoints(&self) -> BTreeMap<String, EndpointProbe> {
        let mut results = BTreeMap::new();
        let fields = [("fields", LIST_FIELDS.join(","))];

        let user = self
            .http
            .get(self.url("/v2/user/info/"))
            .query(&[("fields", "open_id,display_name")]);
        results.insert("user_info".to_string(), self.probe("GET", "/v2/user/info/", user).await);

        let list = self
            .http
            .post(self.url("/v2/video/list/"))
            .query(&fields)
            .json(&json!({ "max_count": 10 }));
        results.insert("video_list".to_string(), self.probe("POST", "/v2/video/list/", list).await);

        let query = self
            .http
            .post(self.url("/v2/video/query/"))
            .query(&fields)
            .json(&json!({}));
        results.insert("video_query".to_string(), self.probe("POST", "/v2/video/query/", query).await);

        results
    }

    async fn probe(&self, method: &str, endpoint: &str, request: RequestBuilder) -> EndpointProbe {
        let (status_code, success, response) =
            match request.bearer_auth(&self.access_token).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    (Some(status.as_u16()), status.is_success(), truncate(&text, PROBE_BODY_LIMIT))
                }
                Err(e) => (None, false, e.to_string()),
            };

        EndpointProbe {
            method: method.to_string(),
            endpoint: endpoint.to_string(),
            status_code,
            success,
            response,
        }
    }

    async fn send<T>(&self, request: RequestBuilder, what: &str) -> Result<T, DashboardError>
    where
        T: DeserializeOwned + Default,
    {
        let resp = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| DashboardError::upstream(None, format!("{what} request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| DashboardError::upstream(Some(status.as_u16()), format!("{what} read failed: {e}")))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), endpoint = what, "upstream call failed");
            return Err(DashboardError::upstream(Some(status.as_u16()), body));
        }

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            DashboardError::upstream(Some(status.as_u16()), format!("{what} parse failed: {e}"))
        })?;

        if let Some(error) = envelope.error.filter(ApiErrorBody::is_error) {
            warn!(code = %error.code, log_id = %error.log_id, endpoint = what, "upstream returned error envelope");
            return Err(DashboardError::upstream(
                Some(status.as_u16()),
                format!("{}: {}", error.code, error.message),
            ));
        }

        Ok(envelope.data.unwrap_or_default())
    }
}

/// Left outer join of query results onto list results by video id. Listed
/// videos without a stats entry keep their metadata with zeroed counters.
pub fn join_stats(listed: Vec<VideoDetails>, detailed: Vec<VideoDetails>) -> Vec<VideoDetails> {
    let mut by_id: HashMap<String, VideoDetails> = detailed
        .into_iter()
        .map(|video| (video.id.clone(), video))
        .collect();

    listed
        .into_iter()
        .map(|mut video| {
            match by_id.remove(&video.id) {
                Some(stats) => {
                    video.view_count = stats.view_count;
                    video.like_count = stats.like_count;
                    video.comment_count = stats.comment_count;
                    video.share_count = stats.share_count;
                    video.video_description = stats.video_description;
                    video.height = stats.height;
                    video.width = stats.width;
                    video.embed_html = stats.embed_html;
                    video.embed_link = stats.embed_link;
                }
                None => {
                    debug!(video_id = %video.id, "no stats returned for video");
                    video.view_count = 0;
                    video.like_count = 0;
                    video.comment_count = 0;
                    video.share_count = 0;
                }
            }
            video
        })
        .collect()
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Field decoders that accept numbers, numeric strings and nulls.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn number<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
                .unwrap_or(0),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<u64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| *f > 0.0).map(|f| f as u64))
                    .unwrap_or(0)
            }
            _ => 0,
        })
    }

    pub fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn video(id: &str) -> VideoDetails {
        VideoDetails {
            id: id.to_string(),
            title: format!("title {id}"),
            duration: 30,
            ..VideoDetails::default()
        }
    }

    async fn setup() -> (MockServer, MetricsClient) {
        let server = MockServer::start().await;
        let client = MetricsClient::new(reqwest::Client::new(), &server.uri(), "test-token");
        (server, client)
    }

    fn ok_error() -> serde_json::Value {
        json!({ "code": "ok", "message": "", "log_id": "log-1" })
    }

    #[test]
    fn join_keeps_videos_missing_from_stats() {
        let listed = vec![video("a"), video("b")];
        let mut stats_a = video("a");
        stats_a.view_count = 100;
        stats_a.like_count = 10;
        stats_a.video_description = "described".into();

        let joined = join_stats(listed, vec![stats_a]);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].view_count, 100);
        assert_eq!(joined[0].video_description, "described");
        assert_eq!(joined[1].id, "b");
        assert_eq!(joined[1].view_count, 0);
        assert_eq!(joined[1].like_count, 0);
        assert_eq!(joined[1].title, "title b");
    }

    #[test]
    fn join_ignores_stats_for_unlisted_ids() {
        let joined = join_stats(vec![video("a")], vec![video("zzz")]);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].id, "a");
    }

    #[test]
    fn lenient_fields_accept_strings_and_nulls() {
        let parsed: VideoDetails = serde_json::from_value(json!({
            "id": 7212345678901234567u64,
            "duration": "42",
            "view_count": null,
            "like_count": 12.0,
            "title": null
        }))
        .unwrap();
        assert_eq!(parsed.id, "7212345678901234567");
        assert_eq!(parsed.duration, 42);
        assert_eq!(parsed.view_count, 0);
        assert_eq!(parsed.like_count, 12);
        assert_eq!(parsed.title, "");
    }

    #[tokio::test]
    async fn fetch_video_list_clamps_page_size() {
        let (server, client) = setup().await;

        Mock::given(method("POST"))
            .and(path("/v2/video/list/"))
            .and(bearer_token("test-token"))
            .and(query_param("fields", LIST_FIELDS.join(",")))
            .and(body_json(json!({ "max_count": 20, "cursor": 1700000000000i64 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "videos": [{ "id": "v1", "duration": 12 }], "cursor": 1690000000000i64, "has_more": true },
                "error": ok_error()
            })))
            .mount(&server)
            .await;

        let page = client.fetch_video_list(Some(1_700_000_000_000), 50).await.unwrap();
        assert_eq!(page.videos.len(), 1);
        assert_eq!(page.cursor, Some(1_690_000_000_000));
        assert!(page.has_more);
    }

    #[tokio::test]
    async fn fetch_analytics_left_joins_stats() {
        let (server, client) = setup().await;

        Mock::given(method("POST"))
            .and(path("/v2/video/list/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "videos": [
                        { "id": "v1", "title": "first", "duration": 30, "create_time": 1700000000 },
                        { "id": "v2", "title": "second", "duration": 10 }
                    ],
                    "cursor": 0,
                    "has_more": false
                },
                "error": ok_error()
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v2/video/query/"))
            .and(body_json(json!({ "filters": { "video_ids": ["v1", "v2"] } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "videos": [
                    { "id": "v1", "view_count": 100, "like_count": 5, "comment_count": 3, "share_count": 2 }
                ] },
                "error": ok_error()
            })))
            .mount(&server)
            .await;

        let records = client.fetch_analytics().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].video_id, "v1");
        assert_eq!(records[0].views, 100);
        assert_eq!(records[0].engagement_rate, 10.0);
        assert_eq!(records[1].video_id, "v2");
        assert_eq!(records[1].views, 0);
        assert_eq!(records[1].likes, 0);
        assert_eq!(records[1].engagement_rate, 0.0);
    }

    #[tokio::test]
    async fn empty_list_skips_stats_call() {
        let (server, client) = setup().await;

        Mock::given(method("POST"))
            .and(path("/v2/video/list/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "videos": [], "has_more": false },
                "error": ok_error()
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v2/video/query/"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        assert!(client.fetch_analytics().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_success_status_is_upstream_error() {
        let (server, client) = setup().await;

        Mock::given(method("POST"))
            .and(path("/v2/video/list/"))
            .respond_with(ResponseTemplate::new(401).set_body_string("access_token_invalid"))
            .mount(&server)
            .await;

        let err = client.fetch_video_list(None, 20).await.unwrap_err();
        match err {
            DashboardError::UpstreamApi { status, body } => {
                assert_eq!(status, Some(401));
                assert_eq!(body, "access_token_invalid");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_envelope_on_success_status_is_upstream_error() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path("/v2/user/info/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {},
                "error": { "code": "scope_not_authorized", "message": "missing scope", "log_id": "x" }
            })))
            .mount(&server)
            .await;

        let err = client.fetch_user_info(DEFAULT_USER_FIELDS).await.unwrap_err();
        assert!(err.to_string().contains("scope_not_authorized"));
    }

    #[tokio::test]
    async fn fetch_user_info_reads_nested_user() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path("/v2/user/info/"))
            .and(query_param("fields", "open_id,display_name"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "user": { "open_id": "oid", "display_name": "Creator" } },
                "error": ok_error()
            })))
            .mount(&server)
            .await;

        let user = client.fetch_user_info(&["open_id", "display_name"]).await.unwrap();
        assert_eq!(user.open_id.as_deref(), Some("oid"));
        assert_eq!(user.display_name.as_deref(), Some("Creator"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
