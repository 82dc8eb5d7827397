use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use pawoo_home_mastodon::{Credentials, DEFAULT_INSTANCE};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "app.json";

/// Contents of `app.json`: the registered application's keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    pub fn credentials(&self, instance: &str) -> Credentials {
        Credentials::new(&self.client_id, &self.client_secret, &self.redirect_uri)
            .with_base_url(instance)
    }
}

/// `PAWOO_HOME_CONFIG`, then `./app.json`, then the per-user config directory.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("PAWOO_HOME_CONFIG") {
        return PathBuf::from(path);
    }
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return local;
    }
    if let Some(proj_dirs) = ProjectDirs::from("net", "pawoo-home", "pawoo-home") {
        proj_dirs.config_dir().join(CONFIG_FILE)
    } else {
        local
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    pub instance: String,
    pub token_path: Option<PathBuf>,
    pub request_timeout: Duration,
    pub json_logs: bool,
}

impl ServerSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind = lookup("PAWOO_HOME_BIND")
            .unwrap_or_else(|| "127.0.0.1:5000".to_string())
            .parse()
            .context("PAWOO_HOME_BIND must be host:port")?;
        let instance = lookup("PAWOO_HOME_INSTANCE").unwrap_or_else(|| DEFAULT_INSTANCE.to_string());
        let token_path = match lookup("PAWOO_HOME_TOKEN_PATH") {
            Some(p) if p.is_empty() => None,
            Some(p) => Some(PathBuf::from(p)),
            None => Some(PathBuf::from("token.json")),
        };
        let timeout_secs: u64 = match lookup("PAWOO_HOME_TIMEOUT_SECS") {
            Some(s) => s
                .parse()
                .map_err(|_| anyhow!("PAWOO_HOME_TIMEOUT_SECS must be a number, got {s:?}"))?,
            None => 20,
        };
        let json_logs = lookup("PAWOO_HOME_LOG_JSON")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            bind,
            instance,
            token_path,
            request_timeout: Duration::from_secs(timeout_secs),
            json_logs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_load_app_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.json");
        std::fs::write(
            &path,
            r#"{"client_id": "abc", "client_secret": "xyz", "redirect_uri": "urn:ietf:wg:oauth:2.0:oob"}"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        let creds = config.credentials(DEFAULT_INSTANCE);
        assert_eq!(creds.client_id, "abc");
        assert_eq!(creds.client_secret, "xyz");
        assert_eq!(creds.base_url, "https://pawoo.net");
    }

    #[test]
    fn test_missing_or_malformed_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load(&dir.path().join("absent.json")).is_err());

        let path = dir.path().join("app.json");
        std::fs::write(&path, r#"{"client_id": "abc"}"#).unwrap();
        assert!(AppConfig::load(&path).is_err());
    }

    #[test]
    fn test_settings_defaults() {
        let settings = ServerSettings::from_lookup(|_| None).unwrap();
        assert_eq!(settings.bind.to_string(), "127.0.0.1:5000");
        assert_eq!(settings.instance, DEFAULT_INSTANCE);
        assert_eq!(settings.token_path, Some(PathBuf::from("token.json")));
        assert_eq!(settings.request_timeout, Duration::from_secs(20));
        assert!(!settings.json_logs);
    }

    #[test]
    fn test_settings_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PAWOO_HOME_BIND", "0.0.0.0:8080"),
            ("PAWOO_HOME_INSTANCE", "mastodon.social"),
            ("PAWOO_HOME_TOKEN_PATH", ""),
            ("PAWOO_HOME_TIMEOUT_SECS", "5"),
            ("PAWOO_HOME_LOG_JSON", "true"),
        ]);
        let settings = ServerSettings::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(settings.bind.port(), 8080);
        assert_eq!(settings.instance, "mastodon.social");
        assert!(settings.token_path.is_none());
        assert_eq!(settings.request_timeout, Duration::from_secs(5));
        assert!(settings.json_logs);
    }

    #[test]
    fn test_settings_rejects_bad_timeout() {
        let result = ServerSettings::from_lookup(|k| {
            (k == "PAWOO_HOME_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }
}
