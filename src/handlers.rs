use crate::config::ApiType;
use crate::errors::AppError;
use crate::models::{
    ApiResponse, AuthStatus, CallbackParams, ConfigRequest, ManualAuthRequest, RedirectUriInfo,
    RedirectUriRequest, Snapshot, SnapshotResponse, SnapshotStatus,
};
use crate::push::serve_socket;
use crate::session::SessionId;
use crate::state::AppState;
use crate::tiktok::EndpointProbe;
use crate::ui::{render_config, render_index, render_privacy, render_terms};
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Json,
};
use chrono::Local;
use std::collections::BTreeMap;
use tracing::info;

const MIN_CREDENTIAL_LEN: usize = 10;

pub async fn index(State(state): State<AppState>, Extension(session): Extension<SessionId>) -> Response {
    let status = state.dashboard.auth_status(session).await;
    if status.api_type == ApiType::None {
        return Redirect::to("/config").into_response();
    }
    let interval = state.config.settings().update_interval.as_secs();
    Html(render_index(&status, interval)).into_response()
}

pub async fn config_page(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Html<String> {
    let status = state.dashboard.auth_status(session).await;
    let info = redirect_info(&state).await;
    Html(render_config(&status, &info))
}

pub async fn terms() -> Html<String> {
    Html(render_terms(&today_string()))
}

pub async fn privacy() -> Html<String> {
    Html(render_privacy(&today_string()))
}

fn today_string() -> String {
    Local::now().format("%B %-d, %Y").to_string()
}

pub async fn get_data(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Json<SnapshotResponse> {
    Json(snapshot_response(state.dashboard.current_snapshot(session).await))
}

pub async fn refresh_data(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Json<SnapshotResponse> {
    Json(snapshot_response(state.dashboard.refresh(session).await))
}

fn snapshot_response(snapshot: Snapshot) -> SnapshotResponse {
    SnapshotResponse {
        success: snapshot.status != SnapshotStatus::Error,
        snapshot,
    }
}

/// Browser route: redirects to the provider's consent page.
pub async fn auth(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Result<Redirect, AppError> {
    let url = state
        .dashboard
        .begin_authorization(session)
        .await
        .map_err(|e| AppError::bad_request(e.to_string()))?;
    Ok(Redirect::to(url.as_str()))
}

/// Browser route: the provider redirects here after consent.
pub async fn callback(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect, AppError> {
    state
        .dashboard
        .complete_authorization(session, params)
        .await
        .map_err(|e| AppError::bad_request(e.to_string()))?;

    let dashboard = state.dashboard.clone();
    tokio::spawn(async move {
        dashboard.refresh(session).await;
    });
    Ok(Redirect::to("/"))
}

pub async fn manual_auth(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    Json(payload): Json<ManualAuthRequest>,
) -> Result<Json<ApiResponse>, AppError> {
    let code = payload.code.trim();
    if code.is_empty() {
        return Err(AppError::soft("Provide the authorization code"));
    }

    state
        .dashboard
        .complete_manual_authorization(session, code, payload.state.trim())
        .await?;
    state.dashboard.refresh(session).await;
    Ok(Json(ApiResponse::ok("Authorization succeeded, redirecting")))
}

pub async fn save_config(
    State(state): State<AppState>,
    Json(payload): Json<ConfigRequest>,
) -> Result<Json<ApiResponse>, AppError> {
    let client_key = payload.client_key.trim();
    let client_secret = payload.client_secret.trim();
    if client_key.is_empty() || client_secret.is_empty() {
        return Err(AppError::soft("Provide a valid client key and client secret"));
    }

    state
        .config
        .set_api_credentials(client_key.to_string(), client_secret.to_string())
        .await;
    info!("API credentials updated");
    Ok(Json(ApiResponse::ok("API configuration saved")))
}

pub async fn clear_config(State(state): State<AppState>) -> Json<ApiResponse> {
    state.dashboard.clear_configuration().await;
    Json(ApiResponse::ok("API configuration cleared"))
}

/// Format check only; no call is made to the provider.
pub async fn test_connection(Json(payload): Json<ConfigRequest>) -> Result<Json<ApiResponse>, AppError> {
    let client_key = payload.client_key.trim();
    let client_secret = payload.client_secret.trim();
    if client_key.is_empty() || client_secret.is_empty() {
        return Err(AppError::soft("Provide a valid client key and client secret"));
    }
    if client_key.len() < MIN_CREDENTIAL_LEN || client_secret.len() < MIN_CREDENTIAL_LEN {
        return Err(AppError::soft("The API credentials look malformed"));
    }
    Ok(Json(ApiResponse::ok("API credential format looks valid")))
}

pub async fn redirect_uri_info(State(state): State<AppState>) -> Json<RedirectUriInfo> {
    Json(redirect_info(&state).await)
}

async fn redirect_info(state: &AppState) -> RedirectUriInfo {
    RedirectUriInfo {
        redirect_uri: state.config.credentials().await.redirect_uri,
        is_runtime: state.config.redirect_uri_is_runtime().await,
    }
}

pub async fn set_redirect_uri(
    State(state): State<AppState>,
    Json(payload): Json<RedirectUriRequest>,
) -> Result<Json<ApiResponse>, AppError> {
    let redirect_uri = payload.redirect_uri.trim();
    if redirect_uri.is_empty() {
        return Err(AppError::soft("Provide a valid redirect URI"));
    }
    if !redirect_uri.starts_with("http://") && !redirect_uri.starts_with("https://") {
        return Err(AppError::soft("The redirect URI must start with http:// or https://"));
    }

    state.config.set_redirect_uri(redirect_uri.to_string()).await;
    info!(redirect_uri, "redirect URI updated");
    Ok(Json(ApiResponse::ok(format!("Redirect URI set to {redirect_uri}"))))
}

pub async fn auth_status(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Json<AuthStatus> {
    Json(state.dashboard.auth_status(session).await)
}

pub async fn test_api_endpoints(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Result<Json<ApiResponse<BTreeMap<String, EndpointProbe>>>, AppError> {
    let results = state
        .dashboard
        .probe_endpoints(session)
        .await
        .map_err(|e| AppError::unauthorized(e.to_string()))?;
    Ok(Json(ApiResponse::ok("Endpoint probe finished").with_data(results)))
}

pub async fn ws(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    upgrade: WebSocketUpgrade,
) -> Response {
    let dashboard = state.dashboard.clone();
    upgrade.on_upgrade(move |socket| serve_socket(dashboard, session, socket))
}
