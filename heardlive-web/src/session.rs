//! Browser sessions
//!
//! Every browser gets a `heardlive_session` cookie naming a
//! [`BrowserSession`]: its own session client, auth context, searches and
//! composer. Sessions idle longer than the configured TTL are swept.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use heardlive_common::config::SearchSettings;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use crate::components::{ArtistSearch, AuthContext, CompanionSearch, Composer, SessionClient};
use crate::services::Backends;
use crate::AppState;

pub const SESSION_COOKIE: &str = "heardlive_session";

/// Per-browser state
pub struct BrowserSession {
    pub id: Uuid,
    pub auth: AuthContext,
    pub search: ArtistSearch,
    pub companions: CompanionSearch,
    pub composer: Composer,
    last_seen: Mutex<Instant>,
}

impl BrowserSession {
    pub fn new(id: Uuid, backends: &Backends, search: &SearchSettings) -> Self {
        let client = Arc::new(SessionClient::new(backends.identity.clone()));
        Self {
            id,
            auth: AuthContext::start(client, backends.store.clone()),
            search: ArtistSearch::new(
                backends.catalog.clone(),
                Duration::from_millis(search.debounce_ms),
                search.result_limit,
            ),
            companions: CompanionSearch::new(
                backends.store.clone(),
                Duration::from_millis(search.companion_debounce_ms),
                search.companion_limit,
            ),
            composer: Composer::new(backends.store.clone()),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    async fn touch(&self) {
        *self.last_seen.lock().await = Instant::now();
    }

    async fn idle_for(&self) -> Duration {
        self.last_seen.lock().await.elapsed()
    }
}

/// All live browser sessions
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<BrowserSession>>>,
    backends: Backends,
    search: SearchSettings,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(backends: Backends, search: SearchSettings, idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            backends,
            search,
            idle_timeout,
        }
    }

    /// Existing session for `id`, or a new one; the flag is true when created
    pub async fn get_or_create(&self, id: Option<Uuid>) -> (Arc<BrowserSession>, bool) {
        if let Some(id) = id {
            if let Some(session) = self.sessions.read().await.get(&id) {
                session.touch().await;
                return (session.clone(), false);
            }
        }

        let id = Uuid::new_v4();
        let session = Arc::new(BrowserSession::new(id, &self.backends, &self.search));
        self.sessions.write().await.insert(id, session.clone());
        tracing::debug!(session_id = %id, "Browser session created");
        (session, true)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop sessions idle longer than the TTL; returns how many went
    pub async fn sweep_idle(&self) -> usize {
        let mut expired = Vec::new();
        for (id, session) in self.sessions.read().await.iter() {
            if session.idle_for().await >= self.idle_timeout {
                expired.push(*id);
            }
        }

        if expired.is_empty() {
            return 0;
        }

        let mut sessions = self.sessions.write().await;
        for id in &expired {
            sessions.remove(id);
        }
        tracing::info!(evicted = expired.len(), remaining = sessions.len(), "Swept idle browser sessions");
        expired.len()
    }

    /// Sweep on an interval until the process exits
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = (registry.idle_timeout / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                registry.sweep_idle().await;
            }
        })
    }
}

fn session_id_from_cookie(request: &Request) -> Option<Uuid> {
    request
        .headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

/// Attach the caller's [`BrowserSession`] to the request
///
/// Handlers read it with `Extension<Arc<BrowserSession>>`. A new session
/// is announced to the browser with `Set-Cookie`.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let (session, created) = state
        .sessions
        .get_or_create(session_id_from_cookie(&request))
        .await;
    let id = session.id;
    request.extensions_mut().insert(session);

    let mut response = next.run(request).await;

    if created {
        let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id);
        if let Ok(value) = cookie.parse() {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::{MemoryBackend, StaticCatalog};

    fn registry(idle: Duration) -> SessionRegistry {
        let backends = Backends::in_memory(Arc::new(MemoryBackend::new()), StaticCatalog::demo());
        SessionRegistry::new(backends, SearchSettings::default(), idle)
    }

    #[tokio::test]
    async fn test_known_id_reuses_session() {
        let registry = registry(Duration::from_secs(60));
        let (first, created) = registry.get_or_create(None).await;
        assert!(created);

        let (again, created) = registry.get_or_create(Some(first.id)).await;
        assert!(!created);
        assert_eq!(again.id, first.id);

        let (_, created) = registry.get_or_create(Some(Uuid::new_v4())).await;
        assert!(created);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_idle_sessions() {
        let registry = registry(Duration::from_secs(60));
        registry.get_or_create(None).await;

        assert_eq!(registry.sweep_idle().await, 0);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(registry.sweep_idle().await, 1);
        assert!(registry.is_empty().await);
    }

    #[test]
    fn test_cookie_parsing() {
        let id = Uuid::new_v4();
        let request = Request::builder()
            .header(header::COOKIE, format!("theme=dark; {}={}", SESSION_COOKIE, id))
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(session_id_from_cookie(&request), Some(id));
    }
}
