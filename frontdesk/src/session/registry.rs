//! Maps browsers to their session stores.
//!
//! A browser is identified by a client id kept in its cookie session. The
//! id is only written at sign-in, so a cookie without one is anonymous and
//! never allocates a store. Stores that no request has touched for the idle
//! period are evicted by a background sweeper.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tower_sessions::Session as CookieSession;
use uuid::Uuid;

use super::store::SessionStore;
use crate::services::auth::{AuthProvider, AuthSession, AuthTokens};
use crate::services::backend::{Directory, LogbookRepository};

pub const CLIENT_ID_KEY: &str = "client_id";
pub const TOKENS_KEY: &str = "auth_tokens";

/// Collaborators serving one browser.
pub struct Backend {
    pub auth: Arc<dyn AuthProvider>,
    pub directory: Arc<dyn Directory>,
    pub logbook: Arc<dyn LogbookRepository>,
}

pub trait BackendFactory: Send + Sync {
    /// Build collaborators seeded with tokens persisted in the cookie
    /// session, if any.
    fn create(&self, tokens: Option<AuthTokens>) -> Backend;
}

pub struct ClientHandle {
    pub client_id: String,
    pub store: Arc<SessionStore>,
    pub directory: Arc<dyn Directory>,
    pub logbook: Arc<dyn LogbookRepository>,
    /// Milliseconds since the registry epoch at the last lookup.
    last_seen_ms: AtomicU64,
}

pub struct SessionRegistry {
    clients: DashMap<String, Arc<ClientHandle>>,
    factory: Arc<dyn BackendFactory>,
    fetch_timeout: Duration,
    epoch: Instant,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn BackendFactory>, fetch_timeout: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            factory,
            fetch_timeout,
            epoch: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn touch(&self, handle: &ClientHandle) {
        handle.last_seen_ms.store(self.now_ms(), Ordering::Relaxed);
    }

    /// The handle for `client_id`, starting a store when there is none.
    pub fn get_or_start(&self, client_id: &str, tokens: Option<AuthTokens>) -> Arc<ClientHandle> {
        let handle = self
            .clients
            .entry(client_id.to_string())
            .or_insert_with(|| {
                let backend = self.factory.create(tokens);
                tracing::debug!(client_id, "Starting session store");
                Arc::new(ClientHandle {
                    client_id: client_id.to_string(),
                    store: SessionStore::start(
                        backend.auth,
                        backend.directory.clone(),
                        self.fetch_timeout,
                    ),
                    directory: backend.directory,
                    logbook: backend.logbook,
                    last_seen_ms: AtomicU64::new(self.now_ms()),
                })
            })
            .clone();
        self.touch(&handle);
        handle
    }

    /// A fresh client with no signed-in identity, not yet bound to a cookie.
    pub fn start_client(&self) -> Arc<ClientHandle> {
        self.get_or_start(&Uuid::new_v4().to_string(), None)
    }

    pub fn get(&self, client_id: &str) -> Option<Arc<ClientHandle>> {
        let handle = self.clients.get(client_id).map(|handle| handle.clone())?;
        self.touch(&handle);
        Some(handle)
    }

    pub fn remove(&self, client_id: &str) -> Option<Arc<ClientHandle>> {
        self.clients.remove(client_id).map(|(_, handle)| handle)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Drop every client not looked up for longer than `max_idle`; returns
    /// how many were evicted. A browser coming back later restarts from the
    /// tokens in its cookie.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = self.now_ms();
        let limit = u64::try_from(max_idle.as_millis()).unwrap_or(u64::MAX);
        let mut evicted = 0;
        self.clients.retain(|client_id, handle| {
            let idle = now.saturating_sub(handle.last_seen_ms.load(Ordering::Relaxed));
            let keep = idle <= limit;
            if !keep {
                tracing::debug!(client_id = %client_id, idle_ms = idle, "Evicting idle session store");
                evicted += 1;
            }
            keep
        });
        evicted
    }

    /// Run [`Self::evict_idle`] every `every` until the registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, max_idle: Duration, every: Duration) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(every);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticks.tick().await;
            loop {
                ticks.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let evicted = registry.evict_idle(max_idle);
                if evicted > 0 {
                    tracing::info!(evicted, remaining = registry.len(), "Evicted idle session stores");
                }
            }
        })
    }

    /// The handle bound to this cookie session. Restarts the store from the
    /// persisted tokens when the process no longer knows the client.
    pub async fn for_cookie(&self, cookie: &CookieSession) -> anyhow::Result<Option<Arc<ClientHandle>>> {
        let Some(client_id) = cookie.get::<String>(CLIENT_ID_KEY).await? else {
            return Ok(None);
        };
        if let Some(handle) = self.get(&client_id) {
            return Ok(Some(handle));
        }
        let tokens = cookie.get::<AuthTokens>(TOKENS_KEY).await?;
        Ok(Some(self.get_or_start(&client_id, tokens)))
    }

    /// Bind a signed-in client to the cookie session under a new session id.
    /// A client that cannot be bound is forgotten.
    pub async fn attach(
        &self,
        cookie: &CookieSession,
        handle: &ClientHandle,
        auth_session: &AuthSession,
    ) -> anyhow::Result<()> {
        let bound = self.bind(cookie, handle, auth_session).await;
        if bound.is_err() {
            self.remove(&handle.client_id);
        }
        bound
    }

    async fn bind(
        &self,
        cookie: &CookieSession,
        handle: &ClientHandle,
        auth_session: &AuthSession,
    ) -> anyhow::Result<()> {
        if let Some(previous) = cookie.get::<String>(CLIENT_ID_KEY).await?
            && previous != handle.client_id
        {
            self.remove(&previous);
        }
        cookie.cycle_id().await?;
        cookie.insert(CLIENT_ID_KEY, &handle.client_id).await?;
        cookie.insert(TOKENS_KEY, &auth_session.tokens).await?;
        Ok(())
    }

    /// Store rotated tokens so a restarted store recovers the latest ones.
    pub async fn persist_tokens(&self, cookie: &CookieSession, handle: &ClientHandle) -> anyhow::Result<()> {
        let Some(current) = handle.store.auth_session().await else {
            return Ok(());
        };
        let persisted = cookie.get::<AuthTokens>(TOKENS_KEY).await?;
        if persisted.as_ref() != Some(&current.tokens) {
            cookie.insert(TOKENS_KEY, &current.tokens).await?;
        }
        Ok(())
    }

    /// Forget the client and clear the cookie session.
    pub async fn detach(&self, cookie: &CookieSession) -> anyhow::Result<Option<Arc<ClientHandle>>> {
        let handle = match cookie.get::<String>(CLIENT_ID_KEY).await? {
            Some(client_id) => self.remove(&client_id),
            None => None,
        };
        cookie.flush().await?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::{MemoryAccounts, MemoryAuth, MemoryDirectory};
    use std::sync::atomic::AtomicUsize;
    use tower_sessions::MemoryStore;
    use tower_sessions::session::{Id, Record};
    use tower_sessions::session_store::{self, SessionStore as CookieStore};

    #[derive(Debug, Clone)]
    struct UnavailableStore;

    #[async_trait::async_trait]
    impl CookieStore for UnavailableStore {
        async fn save(&self, _record: &Record) -> session_store::Result<()> {
            Err(session_store::Error::Backend("store unavailable".to_string()))
        }

        async fn load(&self, _id: &Id) -> session_store::Result<Option<Record>> {
            Err(session_store::Error::Backend("store unavailable".to_string()))
        }

        async fn delete(&self, _id: &Id) -> session_store::Result<()> {
            Err(session_store::Error::Backend("store unavailable".to_string()))
        }
    }

    struct CountingFactory {
        accounts: Arc<MemoryAccounts>,
        directory: Arc<MemoryDirectory>,
        created: AtomicUsize,
    }

    impl BackendFactory for CountingFactory {
        fn create(&self, tokens: Option<AuthTokens>) -> Backend {
            self.created.fetch_add(1, Ordering::SeqCst);
            Backend {
                auth: Arc::new(MemoryAuth::restore(self.accounts.clone(), tokens)),
                directory: self.directory.clone(),
                logbook: self.directory.clone(),
            }
        }
    }

    fn registry() -> (SessionRegistry, Arc<CountingFactory>) {
        let factory = Arc::new(CountingFactory {
            accounts: MemoryAccounts::new(),
            directory: MemoryDirectory::new(),
            created: AtomicUsize::new(0),
        });
        (
            SessionRegistry::new(factory.clone(), Duration::from_secs(5)),
            factory,
        )
    }

    fn cookie() -> CookieSession {
        CookieSession::new(None, Arc::new(MemoryStore::default()), None)
    }

    #[tokio::test]
    async fn test_same_client_reuses_store() {
        let (registry, factory) = registry();
        let first = registry.get_or_start("client-a", None);
        let again = registry.get_or_start("client-a", None);

        assert!(Arc::ptr_eq(&first.store, &again.store));
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_cookie_without_client_is_anonymous() {
        let (registry, _) = registry();
        assert!(registry.for_cookie(&cookie()).await.unwrap().is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_attach_then_detach() {
        let (registry, factory) = registry();
        factory.accounts.register("a@clinic.test", "pw123456").unwrap();
        let cookie = cookie();

        let handle = registry.start_client();
        let auth_session = handle.store.sign_in("a@clinic.test", "pw123456").await.unwrap();
        registry.attach(&cookie, &handle, &auth_session).await.unwrap();

        let bound = registry.for_cookie(&cookie).await.unwrap().unwrap();
        assert_eq!(bound.client_id, handle.client_id);

        registry.detach(&cookie).await.unwrap();
        assert!(registry.is_empty());
        assert!(registry.for_cookie(&cookie).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_client_restarts_from_persisted_tokens() {
        let (registry, factory) = registry();
        factory.accounts.register("a@clinic.test", "pw123456").unwrap();
        let cookie = cookie();
        let handle = registry.start_client();
        let auth_session = handle.store.sign_in("a@clinic.test", "pw123456").await.unwrap();
        registry.attach(&cookie, &handle, &auth_session).await.unwrap();

        registry.remove(&handle.client_id);
        let restarted = registry.for_cookie(&cookie).await.unwrap().unwrap();

        assert!(!Arc::ptr_eq(&restarted.store, &handle.store));
        let recovered = restarted.store.auth_session().await.unwrap();
        assert_eq!(recovered.identity, auth_session.identity);
    }

    #[tokio::test]
    async fn test_client_is_forgotten_when_cookie_cannot_be_bound() {
        let (registry, factory) = registry();
        factory.accounts.register("a@clinic.test", "pw123456").unwrap();
        let broken = CookieSession::new(Some(Id::default()), Arc::new(UnavailableStore), None);

        let handle = registry.start_client();
        let auth_session = handle.store.sign_in("a@clinic.test", "pw123456").await.unwrap();

        assert!(registry.attach(&broken, &handle, &auth_session).await.is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_clients_are_evicted() {
        let (registry, _) = registry();
        let idle = registry.get_or_start("client-idle", None);
        let busy = registry.get_or_start("client-busy", None);

        tokio::time::advance(Duration::from_secs(50 * 60)).await;
        registry.get(&busy.client_id);
        tokio::time::advance(Duration::from_secs(20 * 60)).await;

        assert_eq!(registry.evict_idle(Duration::from_secs(60 * 60)), 1);
        assert!(registry.get(&idle.client_id).is_none());
        assert!(registry.get(&busy.client_id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_in_the_background() {
        let (registry, _) = registry();
        let registry = Arc::new(registry);
        registry.get_or_start("client-a", None);
        let sweeper = registry.spawn_sweeper(Duration::from_secs(60), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(registry.len(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(registry.is_empty());

        drop(registry);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(sweeper.is_finished());
    }
}
