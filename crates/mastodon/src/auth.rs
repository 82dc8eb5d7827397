use crate::api::default_client;
use crate::error::{MastodonError, MastodonResult};
use crate::types::{
    instance_url, AppRegistration, AuthorizationRequest, CallbackParams, Credentials, Token,
};
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope, TokenUrl};
use reqwest::Client;
use serde_json::Value;
use std::path::Path;
use url::Url;

const AUTHORIZE_PATH: &str = "/oauth/authorize";
const TOKEN_PATH: &str = "/oauth/token";
const APPS_PATH: &str = "/api/v1/apps";

/// Drives the authorization-code grant against one instance.
#[derive(Debug, Clone)]
pub struct OAuth2Handler {
    credentials: Credentials,
    http: Client,
}

impl OAuth2Handler {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            http: default_client(),
        }
    }

    /// Use a caller-configured client, e.g. one with timeouts.
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn endpoint(&self, path: &str) -> MastodonResult<Url> {
        Ok(instance_url(&self.credentials.base_url)?.join(path)?)
    }

    /// Build the browser-facing `/oauth/authorize` URL with a fresh state value.
    pub fn get_authorization_url(&self) -> MastodonResult<AuthorizationRequest> {
        let client = BasicClient::new(
            ClientId::new(self.credentials.client_id.clone()),
            Some(ClientSecret::new(self.credentials.client_secret.clone())),
            AuthUrl::from_url(self.endpoint(AUTHORIZE_PATH)?),
            Some(TokenUrl::from_url(self.endpoint(TOKEN_PATH)?)),
        )
        .set_redirect_uri(RedirectUrl::new(self.credentials.redirect_uri.clone())?);

        let (url, state) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.credentials.scopes.iter().cloned().map(Scope::new))
            .url();

        Ok(AuthorizationRequest {
            url,
            state: state.secret().clone(),
        })
    }

    /// Exchange an authorization code for a token, optionally writing it to
    /// `persist_path`.
    pub async fn fetch_token(&self, code: &str, persist_path: Option<&Path>) -> MastodonResult<Token> {
        let token_url = self.endpoint(TOKEN_PATH)?;
        let token = request_token(
            &self.http,
            token_url,
            &[
                ("grant_type", "authorization_code"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.credentials.redirect_uri.as_str()),
            ],
        )
        .await?;

        if let Some(path) = persist_path {
            token.save(path)?;
        }

        tracing::info!(scope = ?token.scope(), "Authorization code exchanged");
        Ok(token)
    }

    /// Reject a callback whose state is missing or differs from the one issued.
    pub fn verify_state(issued: Option<&str>, returned: Option<&str>) -> MastodonResult<()> {
        match (issued, returned) {
            (Some(issued), Some(returned)) if !issued.is_empty() && issued == returned => Ok(()),
            _ => Err(MastodonError::StateMismatch),
        }
    }

    /// Validate the provider's redirect and exchange its code.
    pub async fn exchange_callback(
        &self,
        issued_state: Option<&str>,
        callback: &CallbackParams,
        persist_path: Option<&Path>,
    ) -> MastodonResult<Token> {
        if let Err(e) = Self::verify_state(issued_state, callback.state.as_deref()) {
            tracing::warn!(
                has_issued = issued_state.is_some(),
                has_returned = callback.state.is_some(),
                "Rejected OAuth callback"
            );
            return Err(e);
        }

        if let Some(error) = &callback.error {
            let detail = callback.error_description.as_deref().unwrap_or(error);
            return Err(MastodonError::AuthExchange(format!(
                "authorization denied: {detail}"
            )));
        }

        let code = callback
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| MastodonError::AuthExchange("callback is missing code".into()))?;

        self.fetch_token(code, persist_path).await
    }
}

async fn request_token(http: &Client, url: Url, form: &[(&str, &str)]) -> MastodonResult<Token> {
    tracing::debug!(%url, "Requesting token");
    let response = http.post(url).form(form).send().await?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(MastodonError::AuthExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    parse_token(&body)
}

fn parse_token(body: &str) -> MastodonResult<Token> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| MastodonError::AuthExchange(format!("token response is not JSON: {e}")))?;

    for field in ["access_token", "token_type"] {
        if !value.get(field).is_some_and(Value::is_string) {
            return Err(MastodonError::AuthExchange(format!(
                "token response missing {field}"
            )));
        }
    }

    serde_json::from_value(value)
        .map_err(|e| MastodonError::AuthExchange(format!("malformed token response: {e}")))
}

/// Register a client application on `host` (bare host or base URL).
pub async fn register_app(
    client_name: &str,
    host: &str,
    redirect_uris: &str,
    scopes: &[&str],
) -> MastodonResult<AppRegistration> {
    let url = instance_url(host)?.join(APPS_PATH)?;
    let scopes = scopes.join(" ");

    tracing::debug!(%url, client_name, "Registering app");
    let response = default_client()
        .post(url)
        .form(&[
            ("client_name", client_name),
            ("redirect_uris", redirect_uris),
            ("scopes", scopes.as_str()),
        ])
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(MastodonError::Registration {
            status_code: status.as_u16(),
            body,
        });
    }

    Ok(serde_json::from_str(&body)?)
}

/// Resource-owner password grant. An alternative to the redirect flow, not a
/// step of it.
pub async fn fetch_token_password_grant(
    client_id: &str,
    client_secret: &str,
    email: &str,
    password: &str,
    host: &str,
    scope: &[&str],
) -> MastodonResult<Token> {
    let url = instance_url(host)?.join(TOKEN_PATH)?;
    let scope = scope.join(" ");

    request_token(
        &default_client(),
        url,
        &[
            ("grant_type", "password"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("username", email),
            ("password", password),
            ("scope", scope.as_str()),
        ],
    )
    .await
}
