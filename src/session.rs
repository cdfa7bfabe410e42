//! Per-browser session table keyed by an opaque cookie.
//!
//! Pending authorizations, tokens and the last snapshot are scoped to a
//! session so two operators never see or overwrite each other's tokens.

use crate::models::Snapshot;
use crate::oauth::{PendingAuthorization, TokenSet};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use lru::LruCache;
use std::{
    fmt,
    num::NonZeroUsize,
    sync::{atomic::AtomicU64, Arc},
};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

pub const SESSION_COOKIE_NAME: &str = "dashboard_session";
const MAX_SESSIONS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Serializes refreshes of one session. `generation` counts completed ones.
#[derive(Debug, Default)]
pub struct RefreshSlot {
    pub lock: Mutex<()>,
    pub generation: AtomicU64,
}

#[derive(Debug, Default, Clone)]
pub struct Session {
    pub pending: Option<PendingAuthorization>,
    pub tokens: Option<TokenSet>,
    pub snapshot: Option<Snapshot>,
    pub refresh: Arc<RefreshSlot>,
}

/// Bounded table of sessions; the least recently used one is evicted first.
pub struct SessionStore {
    sessions: Mutex<LruCache<SessionId, Session>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_capacity(MAX_SESSIONS)
    }
}

impl SessionStore {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn create(&self) -> SessionId {
        let id = SessionId::new();
        self.sessions.lock().await.put(id, Session::default());
        id
    }

    pub async fn contains(&self, id: SessionId) -> bool {
        self.sessions.lock().await.get(&id).is_some()
    }

    pub async fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions.lock().await.get(&id).cloned()
    }

    /// Runs `f` on the session, creating an empty one if it was evicted.
    pub async fn update<R>(&self, id: SessionId, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut sessions = self.sessions.lock().await;
        if sessions.get(&id).is_none() {
            sessions.put(id, Session::default());
        }
        match sessions.get_mut(&id) {
            Some(session) => f(session),
            None => f(&mut Session::default()),
        }
    }

    pub async fn tokens(&self, id: SessionId) -> Option<TokenSet> {
        self.sessions
            .lock()
            .await
            .get(&id)
            .and_then(|session| session.tokens.clone())
    }

    pub async fn set_tokens(&self, id: SessionId, tokens: TokenSet) {
        self.update(id, |session| session.tokens = Some(tokens)).await;
    }

    /// Removes the pending authorization; it can be taken at most once.
    pub async fn take_pending(&self, id: SessionId) -> Option<PendingAuthorization> {
        self.sessions
            .lock()
            .await
            .get_mut(&id)
            .and_then(|session| session.pending.take())
    }

    pub async fn set_pending(&self, id: SessionId, pending: PendingAuthorization) {
        self.update(id, |session| session.pending = Some(pending)).await;
    }

    /// Puts a pending authorization back unless a newer one was started.
    pub async fn restore_pending(&self, id: SessionId, pending: PendingAuthorization) {
        self.update(id, |session| {
            if session.pending.is_none() {
                session.pending = Some(pending);
            }
        })
        .await;
    }

    pub async fn snapshot(&self, id: SessionId) -> Option<Snapshot> {
        self.sessions
            .lock()
            .await
            .get(&id)
            .and_then(|session| session.snapshot.clone())
    }

    pub async fn set_snapshot(&self, id: SessionId, snapshot: Snapshot) {
        self.update(id, |session| session.snapshot = Some(snapshot)).await;
    }

    /// Lives as long as the session, so eviction releases it too.
    pub async fn refresh_slot(&self, id: SessionId) -> Arc<RefreshSlot> {
        self.update(id, |session| Arc::clone(&session.refresh)).await
    }

    /// Drops tokens, pending state and snapshots of every session, returning
    /// the access tokens that were held.
    pub async fn clear_credentials(&self) -> Vec<String> {
        let mut sessions = self.sessions.lock().await;
        let mut revoked = Vec::new();
        for (_, session) in sessions.iter_mut() {
            if let Some(tokens) = session.tokens.take() {
                revoked.push(tokens.access_token);
            }
            session.pending = None;
            session.snapshot = None;
        }
        revoked
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

pub fn session_from_cookie(req: &Request<Body>) -> Option<SessionId> {
    let cookie_header = req.headers().get(header::COOKIE)?;
    let cookie_str = cookie_header.to_str().ok()?;
    cookie_str
        .split(';')
        .filter_map(|cookie| cookie.trim().strip_prefix(&format!("{SESSION_COOKIE_NAME}=")))
        .find_map(SessionId::parse)
}

/// Attaches a [`SessionId`] to every request, issuing a cookie when the
/// browser has none or presents one the table does not know.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let known = match session_from_cookie(&req) {
        Some(id) if state.sessions.contains(id).await => Some(id),
        _ => None,
    };

    let (session_id, issued) = match known {
        Some(id) => (id, false),
        None => {
            let id = state.sessions.create().await;
            debug!(session = %id, "issued session");
            (id, true)
        }
    };

    req.extensions_mut().insert(session_id);
    let mut response = next.run(req).await;

    if issued {
        // Lax so the cookie survives the top-level redirect back from the provider.
        let cookie = format!("{SESSION_COOKIE_NAME}={session_id}; Path=/; HttpOnly; SameSite=Lax");
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SnapshotStatus;

    fn pending(tag: &str) -> PendingAuthorization {
        PendingAuthorization {
            csrf_token: format!("csrf-{tag}"),
            pkce_verifier: format!("verifier-{tag}"),
        }
    }

    #[tokio::test]
    async fn pending_is_single_use() {
        let store = SessionStore::default();
        let id = store.create().await;
        store.set_pending(id, pending("a")).await;

        assert_eq!(store.take_pending(id).await, Some(pending("a")));
        assert_eq!(store.take_pending(id).await, None);
    }

    #[tokio::test]
    async fn restore_does_not_clobber_newer_pending() {
        let store = SessionStore::default();
        let id = store.create().await;
        store.set_pending(id, pending("new")).await;
        store.restore_pending(id, pending("old")).await;
        assert_eq!(store.take_pending(id).await, Some(pending("new")));
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = SessionStore::default();
        let a = store.create().await;
        let b = store.create().await;
        store
            .set_snapshot(a, Snapshot::empty(SnapshotStatus::NoData, "a"))
            .await;
        assert!(store.snapshot(a).await.is_some());
        assert!(store.snapshot(b).await.is_none());
    }

    #[tokio::test]
    async fn least_recently_used_session_is_evicted() {
        let store = SessionStore::with_capacity(2);
        let first = store.create().await;
        let _second = store.create().await;
        let _third = store.create().await;
        assert!(!store.contains(first).await);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn refresh_slot_follows_session_lifetime() {
        let store = SessionStore::with_capacity(2);
        let a = store.create().await;
        let b = store.create().await;

        let slot = store.refresh_slot(a).await;
        assert!(Arc::ptr_eq(&slot, &store.refresh_slot(a).await));
        assert!(!Arc::ptr_eq(&slot, &store.refresh_slot(b).await));

        let weak = Arc::downgrade(&slot);
        drop(slot);
        store.create().await;
        store.create().await;
        assert!(!store.contains(a).await);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn cookie_parsing() {
        let id = SessionId::new();
        let req = Request::builder()
            .header(header::COOKIE, format!("other=1; {SESSION_COOKIE_NAME}={id}"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(session_from_cookie(&req), Some(id));

        let garbage = Request::builder()
            .header(header::COOKIE, format!("{SESSION_COOKIE_NAME}=not-a-uuid"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(session_from_cookie(&garbage), None);
    }
}
