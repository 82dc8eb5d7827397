use crate::error::{WebError, WebResult};
use crate::session::SessionStore;
use crate::views::{HomeTemplate, IndexTemplate, StatusView};
use askama::Template;
use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use axum_extra::extract::cookie::CookieJar;
use pawoo_home_mastodon::{CallbackParams, MastodonApi, MastodonError, OAuth2Handler, Status, Token};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub oauth: Arc<OAuth2Handler>,
    pub http: reqwest::Client,
    pub instance: String,
    pub token_path: Option<PathBuf>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(
        oauth: OAuth2Handler,
        http: reqwest::Client,
        instance: impl Into<String>,
        token_path: Option<PathBuf>,
    ) -> Self {
        Self {
            oauth: Arc::new(oauth),
            http,
            instance: instance.into(),
            token_path,
            sessions: SessionStore::new(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/auth", get(auth))
        .route("/callback", get(callback))
        .route("/home", get(home))
        .with_state(state)
}

async fn index(State(state): State<AppState>, jar: CookieJar) -> WebResult<Html<String>> {
    let signed_in = match SessionStore::id_from(&jar) {
        Some(id) => state.sessions.token(&id).await.is_some(),
        None => false,
    };
    let page = IndexTemplate {
        instance: &state.instance,
        signed_in,
    };
    Ok(Html(page.render()?))
}

async fn auth(State(state): State<AppState>, jar: CookieJar) -> WebResult<(CookieJar, Redirect)> {
    let request = state.oauth.get_authorization_url()?;
    let jar = state.sessions.begin_sign_in(jar, request.state).await;

    tracing::debug!(authorize_url = %request.url, "Redirecting to instance");
    Ok((jar, Redirect::to(request.url.as_str())))
}

async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> WebResult<(CookieJar, Redirect)> {
    let Some(session_id) = SessionStore::id_from(&jar) else {
        tracing::warn!("OAuth callback without a session cookie");
        return Err(MastodonError::StateMismatch.into());
    };

    let issued = state.sessions.take_pending_state(&session_id).await;
    let token = state
        .oauth
        .exchange_callback(issued.as_deref(), &params, state.token_path.as_deref())
        .await?;
    let jar = state.sessions.sign_in(jar, &session_id, token).await;

    Ok((jar, Redirect::to("/home")))
}

async fn home(State(state): State<AppState>, jar: CookieJar) -> WebResult<Response> {
    let Some(session_id) = SessionStore::id_from(&jar) else {
        return Ok(Redirect::to("/").into_response());
    };
    let Some(token) = state.sessions.token(&session_id).await else {
        return Ok(Redirect::to("/").into_response());
    };

    let statuses = match load_timeline(&state, &token).await {
        Ok(statuses) => statuses,
        Err(WebError::Mastodon(e @ MastodonError::Api { status_code: 401, .. })) => {
            state.sessions.clear_token(&session_id).await;
            return Err(e.into());
        }
        Err(e) => return Err(e),
    };

    let page = HomeTemplate {
        statuses: &statuses,
    };
    Ok(Html(page.render()?).into_response())
}

async fn load_timeline(state: &AppState, token: &Token) -> WebResult<Vec<StatusView>> {
    let api = MastodonApi::with_instance(token, &state.instance)?.with_http_client(state.http.clone());
    let timeline = api.home_timeline().await?;
    Ok(timeline
        .iter()
        .filter_map(Status::from_api)
        .map(StatusView::from)
        .collect())
}
