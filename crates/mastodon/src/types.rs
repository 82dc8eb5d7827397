use crate::error::{MastodonError, MastodonResult};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;
use url::Url;

pub const DEFAULT_INSTANCE: &str = "https://pawoo.net";
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
pub const DEFAULT_SCOPES: [&str; 3] = ["read", "write", "follow"];

/// Application credentials issued by an instance, plus where and how to use them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl Credentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            base_url: DEFAULT_INSTANCE.to_string(),
            redirect_uri: redirect_uri.into(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Scopes joined the way the token and apps endpoints expect them.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    pub fn validate(&self) -> MastodonResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(MastodonError::Configuration("client_id is empty".into()));
        }
        if self.client_secret.trim().is_empty() {
            return Err(MastodonError::Configuration("client_secret is empty".into()));
        }
        Url::parse(&self.redirect_uri)?;
        instance_url(&self.base_url)?;
        Ok(())
    }
}

/// Resolve a bare host (`pawoo.net`) or a full base URL into an instance root URL.
pub fn instance_url(host: &str) -> MastodonResult<Url> {
    let host = host.trim();
    if host.is_empty() {
        return Err(MastodonError::Configuration("instance host is empty".into()));
    }
    let raw = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    let url = Url::parse(&raw)?;
    if url.host_str().is_none() || !matches!(url.scheme(), "http" | "https") {
        return Err(MastodonError::Configuration(format!(
            "instance URL must be http(s) with a host: {raw}"
        )));
    }
    Ok(url)
}

/// Token response from `/oauth/token`. Everything beyond `access_token` and
/// `token_type` is kept verbatim in `extra`, nulls included, so the token can
/// be written back out exactly as the provider sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Token {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            extra: serde_json::Map::new(),
        }
    }

    /// Granted scopes, when the provider sent them as a string.
    pub fn scope(&self) -> Option<&str> {
        self.extra.get("scope").and_then(Value::as_str)
    }

    /// Provider-defined creation time; Mastodon sends unix seconds.
    pub fn created_at(&self) -> Option<&Value> {
        self.extra.get("created_at").filter(|v| !v.is_null())
    }

    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// Two-space indented JSON with keys in sorted order.
    pub fn to_pretty_json(&self) -> MastodonResult<String> {
        let sorted: BTreeMap<String, Value> = serde_json::from_value(serde_json::to_value(self)?)?;
        Ok(serde_json::to_string_pretty(&sorted)?)
    }

    /// Overwrite `path` with this token. The file is closed before returning.
    pub fn save(&self, path: &Path) -> MastodonResult<()> {
        let json = self.to_pretty_json()?;
        write_secure_file(path, json.as_bytes())?;
        tracing::debug!(path = %path.display(), "Token written");
        Ok(())
    }

    pub fn load(path: &Path) -> MastodonResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn write_secure_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    // mode() only applies on creation; tighten a pre-existing file before writing.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(bytes)?;
    Ok(())
}

/// An authorization URL and the anti-forgery state embedded in it. The caller
/// keeps `state` until the provider redirects back.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
}

/// Query parameters of the provider's redirect to our callback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppRegistration {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

// Older instances send numeric ids, newer ones strings.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("unexpected id: {other}"))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub acct: String,
    pub display_name: String,
}

impl Account {
    pub fn display_name(&self) -> String {
        if self.display_name.is_empty() {
            format!("@{}", self.acct)
        } else {
            self.display_name.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub account: Option<Account>,
    pub reblog: Option<Box<Status>>,
}

impl Status {
    pub fn from_api(value: &Value) -> Option<Self> {
        let id = match value.get("id")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let content = value
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let created_at = value
            .get("created_at")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let url = value.get("url").and_then(|v| v.as_str()).map(String::from);
        let account = value.get("account").and_then(|a| {
            let acct = a.get("acct")?.as_str()?.to_string();
            Some(Account {
                username: a
                    .get("username")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&acct)
                    .to_string(),
                display_name: a
                    .get("display_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                acct,
            })
        });
        let reblog = value
            .get("reblog")
            .filter(|v| !v.is_null())
            .and_then(Status::from_api)
            .map(Box::new);

        Some(Status {
            id,
            content,
            created_at,
            url,
            account,
            reblog,
        })
    }

    /// Status content with markup removed, paragraphs and line breaks kept.
    pub fn plain_text(&self) -> String {
        html_to_text(&self.content)
    }
}

fn html_to_text(html: &str) -> String {
    static BREAK: OnceLock<Regex> = OnceLock::new();
    static PARAGRAPH: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();

    let brk = BREAK.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));
    let para = PARAGRAPH.get_or_init(|| Regex::new(r"(?i)</p>\s*<p[^>]*>").expect("valid regex"));
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"));

    let text = brk.replace_all(html, "\n");
    let text = para.replace_all(&text, "\n\n");
    let text = tag.replace_all(&text, "");
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_credentials_defaults() {
        let creds = Credentials::new("abc", "xyz", OOB_REDIRECT_URI);
        assert_eq!(creds.base_url, "https://pawoo.net");
        assert_eq!(creds.scope_string(), "read write follow");
        assert!(creds.validate().is_ok());
    }

    #[test]
    fn test_credentials_validate_rejects_empty_secret() {
        let creds = Credentials::new("abc", "  ", OOB_REDIRECT_URI);
        assert!(matches!(
            creds.validate(),
            Err(MastodonError::Configuration(_))
        ));
    }

    #[test]
    fn test_instance_url_accepts_host_or_url() {
        assert_eq!(
            instance_url("pawoo.net").unwrap().as_str(),
            "https://pawoo.net/"
        );
        assert_eq!(
            instance_url("http://127.0.0.1:8080").unwrap().as_str(),
            "http://127.0.0.1:8080/"
        );
        assert!(instance_url("").is_err());
        assert!(instance_url("ftp://example.com").is_err());
    }

    #[test]
    fn test_token_keeps_provider_fields() {
        let raw = json!({
            "access_token": "tok",
            "token_type": "Bearer",
            "scope": "read write",
            "created_at": 1_500_000_000,
            "refresh_token": null,
            "me": "https://pawoo.net/@me"
        });
        let token: Token = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(token.extra.get("me"), raw.get("me"));
        assert_eq!(serde_json::to_value(&token).unwrap(), raw);
    }

    #[test]
    fn test_token_keeps_nulls_and_non_integer_created_at() {
        let raw = json!({
            "access_token": "t",
            "token_type": "bearer",
            "scope": null,
            "created_at": 1_700_000_000.5
        });
        let token: Token = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(token.scope(), None);
        assert_eq!(token.created_at(), Some(&json!(1_700_000_000.5)));

        let written: Value = serde_json::from_str(&token.to_pretty_json().unwrap()).unwrap();
        assert_eq!(written, raw);
    }

    #[test]
    fn test_pretty_json_sorts_keys() {
        let mut token = Token::bearer("tok");
        token.extra.insert("zeta".into(), json!(1));
        token.extra.insert("alpha".into(), json!(2));
        let text = token.to_pretty_json().unwrap();
        let positions: Vec<usize> = ["\"access_token\"", "\"alpha\"", "\"token_type\"", "\"zeta\""]
            .iter()
            .map(|k| text.find(k).unwrap())
            .collect();
        let mut sorted = positions.clone();
        sorted.sort();
        assert_eq!(positions, sorted);
        assert!(text.contains("\n  \"access_token\""));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let token = Token::bearer("tok123");
        token.save(&path).unwrap();
        assert_eq!(Token::load(&path).unwrap(), token);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_save_tightens_existing_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "old contents that are longer than the token").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let token = Token::bearer("tok123");
        token.save(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(Token::load(&path).unwrap(), token);
    }

    #[test]
    fn test_app_registration_accepts_numeric_id() {
        let reg: AppRegistration = serde_json::from_value(json!({
            "id": 1234,
            "redirect_uri": OOB_REDIRECT_URI,
            "client_id": "cid",
            "client_secret": "secret"
        }))
        .unwrap();
        assert_eq!(reg.id, "1234");
        assert!(reg.name.is_none());
    }

    #[test]
    fn test_status_from_api() {
        let value = json!({
            "id": "109",
            "content": "<p>hello &amp; welcome</p><p>line<br/>two</p>",
            "created_at": "2024-05-01T12:00:00.000Z",
            "url": "https://pawoo.net/@alice/109",
            "account": {"username": "alice", "acct": "alice", "display_name": ""},
            "reblog": null
        });
        let status = Status::from_api(&value).unwrap();
        assert_eq!(status.id, "109");
        assert_eq!(status.plain_text(), "hello & welcome\n\nline\ntwo");
        assert_eq!(status.account.unwrap().display_name(), "@alice");
        assert!(status.created_at.is_some());
        assert!(status.reblog.is_none());
    }

    #[test]
    fn test_status_from_api_minimal() {
        let status = Status::from_api(&json!({"id": 1, "content": "hi"})).unwrap();
        assert_eq!(status.id, "1");
        assert_eq!(status.plain_text(), "hi");
        assert!(Status::from_api(&json!({"content": "no id"})).is_none());
    }
}
