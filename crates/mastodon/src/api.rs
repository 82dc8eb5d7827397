use crate::error::{MastodonError, MastodonResult};
use crate::types::{instance_url, Token, DEFAULT_INSTANCE};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use url::Url;

const HOME_TIMELINE_PATH: &str = "/api/v1/timelines/home";
const STATUSES_PATH: &str = "/api/v1/statuses";

/// Client used when the caller does not supply one. No timeouts are set;
/// callers that need them pass their own client.
pub fn default_client() -> Client {
    Client::builder()
        .user_agent(concat!("pawoo-home/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Bearer-authenticated client for one account on one instance.
#[derive(Clone)]
pub struct MastodonApi {
    client: Client,
    base_url: Url,
    authorization: HeaderValue,
}

impl MastodonApi {
    pub fn new(token: &Token) -> MastodonResult<Self> {
        Self::with_instance(token, DEFAULT_INSTANCE)
    }

    /// `instance` is a bare host or a base URL such as `http://127.0.0.1:3000`.
    pub fn with_instance(token: &Token, instance: &str) -> MastodonResult<Self> {
        let mut authorization = HeaderValue::from_str(&token.authorization_header())
            .map_err(|_| MastodonError::Configuration("access token is not a valid header value".into()))?;
        authorization.set_sensitive(true);

        Ok(Self {
            client: default_client(),
            base_url: instance_url(instance)?,
            authorization,
        })
    }

    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> MastodonResult<RequestBuilder> {
        let url = self.base_url.join(path)?;
        Ok(self
            .client
            .request(method, url)
            .header(AUTHORIZATION, self.authorization.clone()))
    }

    async fn send(&self, request: RequestBuilder) -> MastodonResult<Value> {
        let response = request.send().await?;
        let status = response.status();
        tracing::debug!(url = %response.url(), %status, "Mastodon API response");

        if !status.is_success() {
            let body = response.text().await?;
            return Err(MastodonError::Api {
                status_code: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    /// Statuses on the authenticated user's home timeline, as returned.
    pub async fn home_timeline(&self) -> MastodonResult<Vec<Value>> {
        let request = self.request(Method::GET, HOME_TIMELINE_PATH)?;
        Ok(serde_json::from_value(self.send(request).await?)?)
    }

    pub async fn post_status(&self, text: &str) -> MastodonResult<Value> {
        let request = self
            .request(Method::POST, STATUSES_PATH)?
            .form(&[("status", text)]);
        self.send(request).await
    }
}

impl std::fmt::Debug for MastodonApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MastodonApi")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}
