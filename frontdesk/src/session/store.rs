//! Per-browser session store.
//!
//! Owns the only writer of the derived [`Session`]. Auth events are consumed
//! in emission order by a single listener task; profile resolutions run as
//! spawned tasks tagged with `(identity id, generation)` and are discarded
//! on completion when the tag no longer matches the published state.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::model::Session;
use crate::authz::permissions::PermissionSet;
use crate::models::{Identity, Profile, UserId};
use crate::services::auth::{AuthError, AuthEvent, AuthProvider, AuthSession, SignUpAttributes};
use crate::services::backend::{BackendError, Directory, collapse_grants};
use crate::services::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResolutionTag {
    identity_id: UserId,
    generation: u64,
}

/// What happened to one profile resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Resolved,
    /// Superseded by a newer auth event; the result was dropped.
    Stale,
    /// Failed, but an earlier profile for the same identity was kept.
    KeptPrevious(BackendError),
    Failed(BackendError),
}

impl ResolutionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ResolutionOutcome::Resolved => "resolved",
            ResolutionOutcome::Stale => "stale",
            ResolutionOutcome::KeptPrevious(_) => "kept_previous",
            ResolutionOutcome::Failed(_) => "failed",
        }
    }
}

pub struct SessionStore {
    auth: Arc<dyn AuthProvider>,
    directory: Arc<dyn Directory>,
    state: watch::Sender<Session>,
    generation: AtomicU64,
    fetch_timeout: Duration,
}

impl SessionStore {
    /// A store in `Loading` that does not listen to auth events yet.
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        directory: Arc<dyn Directory>,
        fetch_timeout: Duration,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(Session::initial());
        Arc::new(Self {
            auth,
            directory,
            state,
            generation: AtomicU64::new(0),
            fetch_timeout,
        })
    }

    /// Create a store, subscribe to the provider's events and recover the
    /// session the provider already holds.
    pub fn start(
        auth: Arc<dyn AuthProvider>,
        directory: Arc<dyn Directory>,
        fetch_timeout: Duration,
    ) -> Arc<Self> {
        let store = Self::new(auth, directory, fetch_timeout);
        let events = store.auth.subscribe();
        tokio::spawn(listen(Arc::downgrade(&store), events));
        store
    }

    pub fn get_session(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Wait until the session stops loading, at most `limit`, and return the
    /// latest snapshot either way.
    pub async fn settled(&self, limit: Duration) -> Session {
        self.wait_until(limit, |session| !session.is_loading()).await
    }

    /// Wait until the session carries `identity_id` and is no longer loading,
    /// at most `limit`, and return the latest snapshot either way.
    pub async fn settled_for(&self, identity_id: UserId, limit: Duration) -> Session {
        self.wait_until(limit, |session| {
            session.identity_id() == Some(identity_id) && !session.is_loading()
        })
        .await
    }

    async fn wait_until(&self, limit: Duration, done: impl FnMut(&Session) -> bool) -> Session {
        let mut receiver = self.state.subscribe();
        let waited = tokio::time::timeout(limit, async {
            receiver.wait_for(done).await.map(|session| session.clone())
        })
        .await;

        match waited {
            Ok(Ok(session)) => session,
            _ => self.get_session(),
        }
    }

    /// Apply one auth event. Returns the spawned resolution, if any.
    pub fn on_auth_event(self: &Arc<Self>, event: AuthEvent) -> Option<JoinHandle<ResolutionOutcome>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(event = event.name(), generation, "Applying auth event");

        let Some(identity) = event.identity().cloned() else {
            self.state.send_replace(Session::anonymous());
            return None;
        };

        let tag = ResolutionTag {
            identity_id: identity.id,
            generation,
        };
        self.state.send_if_modified(|session| {
            let same_resolved_identity =
                session.identity_id() == Some(identity.id) && session.profile().is_some();
            if same_resolved_identity {
                false
            } else {
                *session = Session::pending(identity);
                true
            }
        });

        let store = Arc::clone(self);
        Some(tokio::spawn(async move { store.resolve(tag).await }))
    }

    /// Fetch profile and grants for `identity_id` and publish them if the
    /// identity is still current and no newer event arrived meanwhile.
    pub async fn resolve_profile(&self, identity_id: UserId) -> ResolutionOutcome {
        let tag = ResolutionTag {
            identity_id,
            generation: self.generation.load(Ordering::SeqCst),
        };
        self.resolve(tag).await
    }

    /// Sign in through the provider. The session itself only changes once the
    /// provider's `SignedIn` event is applied.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        self.auth.sign_in_with_password(email, password).await
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: SignUpAttributes,
    ) -> Result<Identity, AuthError> {
        self.auth.sign_up(email, password, attributes).await
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.auth.sign_out().await
    }

    pub async fn refresh(&self) -> Result<(), AuthError> {
        self.auth.refresh_session().await.map(|_| ())
    }

    /// Tokens the provider currently holds.
    pub async fn auth_session(&self) -> Option<AuthSession> {
        self.auth.current_session().await
    }

    async fn resolve(&self, tag: ResolutionTag) -> ResolutionOutcome {
        let started = Instant::now();
        let fetched = self.fetch(tag.identity_id).await;
        let outcome = self.publish(tag, fetched);
        metrics::record_session_resolution(outcome.label(), started.elapsed());

        match &outcome {
            ResolutionOutcome::Resolved => {
                info!(user_id = %tag.identity_id, "Session resolved")
            }
            ResolutionOutcome::Stale => debug!(
                user_id = %tag.identity_id,
                generation = tag.generation,
                "Discarding superseded resolution"
            ),
            ResolutionOutcome::KeptPrevious(error) => warn!(
                user_id = %tag.identity_id,
                error = %error,
                "Profile refresh failed, keeping previous session"
            ),
            ResolutionOutcome::Failed(error) => warn!(
                user_id = %tag.identity_id,
                error = %error,
                "Session resolution failed"
            ),
        }
        outcome
    }

    async fn fetch(&self, user_id: UserId) -> Result<(Profile, PermissionSet), BackendError> {
        let (profile, grants) = tokio::try_join!(
            bounded(self.fetch_timeout, self.directory.fetch_profile(user_id)),
            bounded(
                self.fetch_timeout,
                self.directory.fetch_permission_grants(user_id)
            ),
        )?;

        if profile.id != user_id {
            return Err(BackendError::Shape(format!(
                "profile {} returned while resolving {}",
                profile.id, user_id
            )));
        }
        let permissions = collapse_grants(user_id, grants)?;
        Ok((profile, permissions))
    }

    /// Publish a finished resolution in one state replacement.
    fn publish(
        &self,
        tag: ResolutionTag,
        fetched: Result<(Profile, PermissionSet), BackendError>,
    ) -> ResolutionOutcome {
        let mut outcome = ResolutionOutcome::Stale;
        self.state.send_if_modified(|session| {
            let current = self.generation.load(Ordering::SeqCst) == tag.generation
                && session.identity_id() == Some(tag.identity_id);
            let Some(identity) = session.identity().cloned().filter(|_| current) else {
                return false;
            };

            match fetched {
                Ok((profile, permissions)) => {
                    *session = Session::resolved(identity, profile, permissions);
                    outcome = ResolutionOutcome::Resolved;
                    true
                }
                Err(error) if session.profile().is_some() => {
                    outcome = ResolutionOutcome::KeptPrevious(error);
                    false
                }
                Err(error) => {
                    *session = Session::failed(Some(identity), error.to_string());
                    outcome = ResolutionOutcome::Failed(error);
                    true
                }
            }
        });
        outcome
    }
}

async fn bounded<T>(
    limit: Duration,
    fetch: impl Future<Output = Result<T, BackendError>>,
) -> Result<T, BackendError> {
    tokio::time::timeout(limit, fetch)
        .await
        .map_err(|_| BackendError::Timeout)?
}

async fn listen(store: Weak<SessionStore>, mut events: broadcast::Receiver<AuthEvent>) {
    if !recover(&store).await {
        return;
    }
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Auth events dropped, recovering current session");
                if !recover(&store).await {
                    return;
                }
                continue;
            }
            Err(RecvError::Closed) => return,
        };
        let Some(store) = store.upgrade() else {
            return;
        };
        store.on_auth_event(event);
    }
}

/// Re-read the provider's session and apply it as an initial-session event.
async fn recover(store: &Weak<SessionStore>) -> bool {
    let Some(store) = store.upgrade() else {
        return false;
    };
    let current = store.auth.current_session().await;
    store.on_auth_event(AuthEvent::InitialSession(
        current.map(|session| session.identity),
    ));
    true
}
