use anyhow::{Context, Result};
use pawoo_home::config::{self, AppConfig, ServerSettings};
use pawoo_home::{router, AppState};
use pawoo_home_mastodon::OAuth2Handler;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_telemetry(json_logs: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let settings = ServerSettings::from_env()?;
    init_telemetry(settings.json_logs);

    let config_path = config::config_path();
    let app_config = AppConfig::load(&config_path)?;
    let credentials = app_config.credentials(&settings.instance);
    credentials
        .validate()
        .with_context(|| format!("invalid configuration in {}", config_path.display()))?;

    let http = reqwest::Client::builder()
        .user_agent(concat!("pawoo-home/", env!("CARGO_PKG_VERSION")))
        .timeout(settings.request_timeout)
        .build()
        .context("building HTTP client")?;

    let oauth = OAuth2Handler::new(credentials).with_http_client(http.clone());
    let state = AppState::new(oauth, http, settings.instance.clone(), settings.token_path.clone());

    let listener = tokio::net::TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("binding {}", settings.bind))?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %settings.bind,
        instance = %settings.instance,
        "pawoo-home listening"
    );

    axum::serve(listener, router(state)).await?;
    Ok(())
}
