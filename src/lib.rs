pub mod analytics;
pub mod app;
pub mod config;
pub mod dashboard;
pub mod demo;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod oauth;
pub mod push;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod tiktok;
pub mod ui;

pub use app::router;
pub use config::Settings;
pub use state::AppState;
