use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use pawoo_home_mastodon::Token;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub const SESSION_COOKIE: &str = "pawoo_home_session";
const SESSION_ID_LEN: usize = 32;
const SESSION_IDLE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
struct SessionData {
    pending_state: Option<String>,
    token: Option<Token>,
    touched: Instant,
}

impl SessionData {
    fn new() -> Self {
        Self {
            pending_state: None,
            token: None,
            touched: Instant::now(),
        }
    }
}

/// Per-browser state, keyed by the session cookie. Handed to handlers as
/// router state; tokens are read out and passed on explicitly.
///
/// Ids are only ever minted here. A cookie naming an unknown id is ignored,
/// and the id is replaced once the browser signs in. Sessions idle longer
/// than the TTL are dropped on the next write.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionData>>>,
    idle_ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_idle_ttl(SESSION_IDLE_TTL)
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_ttl,
        }
    }

    fn new_id() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_ID_LEN)
            .map(char::from)
            .collect()
    }

    fn cookie(id: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, id))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build()
    }

    fn prune(&self, sessions: &mut HashMap<String, SessionData>) {
        let before = sessions.len();
        sessions.retain(|_, s| s.touched.elapsed() < self.idle_ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
    }

    /// The session id carried by `jar`, if any. Not necessarily one we issued.
    pub fn id_from(jar: &CookieJar) -> Option<String> {
        jar.get(SESSION_COOKIE).map(|c| c.value().to_string())
    }

    /// Record the state issued for a new sign-in. Reuses the browser's
    /// session only if it is live in the store, otherwise mints a new id and
    /// sets its cookie on the returned jar.
    pub async fn begin_sign_in(&self, jar: CookieJar, state: String) -> CookieJar {
        let mut sessions = self.sessions.write().await;
        self.prune(&mut sessions);

        if let Some(session) = Self::id_from(&jar).and_then(|id| sessions.get_mut(&id)) {
            session.pending_state = Some(state);
            session.touched = Instant::now();
            return jar;
        }

        let id = Self::new_id();
        let mut session = SessionData::new();
        session.pending_state = Some(state);
        sessions.insert(id.clone(), session);
        jar.add(Self::cookie(id))
    }

    /// Remove and return the pending state so a callback can only use it once.
    /// A session left with neither state nor token is dropped.
    pub async fn take_pending_state(&self, id: &str) -> Option<String> {
        let mut sessions = self.sessions.write().await;
        self.prune(&mut sessions);

        let session = sessions.get_mut(id)?;
        let state = session.pending_state.take();
        if session.token.is_none() {
            sessions.remove(id);
        }
        state
    }

    /// Store `token` under a freshly minted id, retiring `old_id`.
    pub async fn sign_in(&self, jar: CookieJar, old_id: &str, token: Token) -> CookieJar {
        let mut sessions = self.sessions.write().await;
        self.prune(&mut sessions);
        sessions.remove(old_id);

        let id = Self::new_id();
        let mut session = SessionData::new();
        session.token = Some(token);
        sessions.insert(id.clone(), session);
        jar.add(Self::cookie(id))
    }

    pub async fn token(&self, id: &str) -> Option<Token> {
        let mut sessions = self.sessions.write().await;
        self.prune(&mut sessions);

        let session = sessions.get_mut(id)?;
        session.touched = Instant::now();
        session.token.clone()
    }

    pub async fn clear_token(&self, id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id);
    }
}
