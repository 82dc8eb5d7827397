pub mod api;
pub mod auth;
pub mod error;
pub mod types;

pub use api::MastodonApi;
pub use auth::{fetch_token_password_grant, register_app, OAuth2Handler};
pub use error::{MastodonError, MastodonResult};
pub use types::*;
