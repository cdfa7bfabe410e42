use crate::config::ApiType;
use chrono::Local;
use serde::{Deserialize, Serialize};

pub fn timestamp_now() -> String {
    Local::now().to_rfc3339()
}

#[derive(Debug, Deserialize)]
pub struct ConfigRequest {
    #[serde(rename = "clientKey", default)]
    pub client_key: String,
    #[serde(rename = "clientSecret", default)]
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
pub struct RedirectUriRequest {
    #[serde(default)]
    pub redirect_uri: String,
}

#[derive(Debug, Deserialize)]
pub struct ManualAuthRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub state: String,
}

/// Query string of the provider redirect.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Uniform JSON envelope of the action routes.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T = serde_json::Value> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub message: String,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: message.into(),
            timestamp: timestamp_now(),
        }
    }

    pub fn with_data(mut self, data: T) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthStatus {
    pub api_type: ApiType,
    pub configured: bool,
    pub authenticated: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedirectUriInfo {
    pub redirect_uri: String,
    pub is_runtime: bool,
}

/// Normalized per-video metrics shown in the dashboard table.
///
/// `avg_watch_time`, `completion_rate`, `bounce_rate` and `new_followers` are
/// estimates derived from engagement, not platform telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub author: String,
    pub publish_time: Option<String>,
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub duration: u64,
    pub engagement_rate: f64,
    pub avg_watch_time: f64,
    pub completion_rate: f64,
    pub bounce_rate: f64,
    pub share_url: String,
    pub cover_image: String,
    pub embed_link: String,
    pub video_height: u64,
    pub video_width: u64,
    pub new_followers: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Success,
    NoData,
    NoConfig,
    NeedAuth,
    NotImplemented,
    Error,
    Demo,
}

/// The last computed set of records for one session, replaced wholesale on
/// every refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub videos: Vec<AnalyticsRecord>,
    pub status: SnapshotStatus,
    pub message: String,
    pub timestamp: String,
    #[serde(default)]
    pub synthetic: bool,
}

impl Snapshot {
    pub fn new(status: SnapshotStatus, message: impl Into<String>, videos: Vec<AnalyticsRecord>) -> Self {
        Self {
            videos,
            status,
            message: message.into(),
            timestamp: timestamp_now(),
            synthetic: false,
        }
    }

    pub fn empty(status: SnapshotStatus, message: impl Into<String>) -> Self {
        Self::new(status, message, Vec::new())
    }

    /// Whether the refresh that produced this snapshot hit an upstream failure.
    pub fn is_failure(&self) -> bool {
        matches!(self.status, SnapshotStatus::Error | SnapshotStatus::Demo)
    }
}

/// Body of `/api/data` and `/api/refresh`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub success: bool,
    #[serde(flatten)]
    pub snapshot: Snapshot,
}
