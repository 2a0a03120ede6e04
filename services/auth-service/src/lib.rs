pub mod app;
pub mod authority;
pub mod config;
pub mod credentials;
pub mod handlers;
pub mod metrics;
pub mod password;
pub mod store;
pub mod tokens;

pub use app::{build_router, AppState};
