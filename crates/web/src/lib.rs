pub mod config;
pub mod error;
pub mod routes;
pub mod session;
pub mod views;

pub use config::{AppConfig, ServerSettings};
pub use routes::{router, AppState};
