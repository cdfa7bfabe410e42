use crate::handlers;
use crate::session::session_middleware;
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/config", get(handlers::config_page))
        .route("/terms", get(handlers::terms))
        .route("/privacy", get(handlers::privacy))
        .route("/auth", get(handlers::auth))
        .route("/callback", get(handlers::callback))
        .route("/ws", get(handlers::ws))
        .route("/api/data", get(handlers::get_data))
        .route("/api/refresh", get(handlers::refresh_data).post(handlers::refresh_data))
        .route("/api/config", post(handlers::save_config))
        .route("/api/clear_config", post(handlers::clear_config))
        .route("/api/test_connection", post(handlers::test_connection))
        .route("/api/redirect_uri_info", get(handlers::redirect_uri_info))
        .route("/api/set_redirect_uri", post(handlers::set_redirect_uri))
        .route("/api/manual_auth", post(handlers::manual_auth))
        .route("/api/auth_status", get(handlers::auth_status))
        .route("/api/test_api_endpoints", get(handlers::test_api_endpoints))
        .layer(middleware::from_fn_with_state(state.clone(), session_middleware))
        .with_state(state)
}
