//! In-memory collaborators for local development and tests.

use async_trait::async_trait;
use chrono::{Duration as TokenLifetime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use super::auth::{
    AuthError, AuthEvent, AuthProvider, AuthSession, AuthTokens, EVENT_CAPACITY, SignUpAttributes,
};
use super::backend::{BackendError, Directory, LogbookRepository};
use crate::authz::permissions::PermissionSet;
use crate::config::DemoAccount;
use crate::models::{
    EntryStatus, Identity, LogbookEntry, NewLogbookEntry, PermissionGrant, Profile, UserId,
};
use crate::session::registry::{Backend, BackendFactory};

const ACCESS_TOKEN_LIFETIME_MINUTES: i64 = 60;
const DEMO_ORGANIZATION: &str = "Demo Clinic";

#[derive(Debug, Clone)]
struct Account {
    password: String,
    identity: Identity,
}

/// Accounts and issued tokens shared by every [`MemoryAuth`] of a process.
#[derive(Debug, Default)]
pub struct MemoryAccounts {
    accounts: DashMap<String, Account>,
    issued: DashMap<String, Identity>,
}

impl MemoryAccounts {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an account; returns the new identity.
    pub fn register(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let key = email.trim().to_lowercase();
        if self.accounts.contains_key(&key) {
            return Err(AuthError::EmailTaken);
        }
        let identity = Identity {
            id: UserId::new(),
            email: key.clone(),
        };
        self.accounts.insert(
            key,
            Account {
                password: password.to_string(),
                identity: identity.clone(),
            },
        );
        Ok(identity)
    }

    fn verify(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.accounts
            .get(&email.trim().to_lowercase())
            .filter(|account| account.password == password)
            .map(|account| account.identity.clone())
            .ok_or(AuthError::InvalidCredentials)
    }

    fn issue(&self, identity: &Identity) -> AuthTokens {
        let tokens = AuthTokens {
            access_token: Uuid::new_v4().to_string(),
            refresh_token: Uuid::new_v4().to_string(),
            expires_at: Utc::now() + TokenLifetime::minutes(ACCESS_TOKEN_LIFETIME_MINUTES),
        };
        self.issued
            .insert(tokens.refresh_token.clone(), identity.clone());
        tokens
    }

    fn redeem(&self, refresh_token: &str) -> Option<Identity> {
        self.issued
            .remove(refresh_token)
            .map(|(_, identity)| identity)
    }

    fn holder(&self, refresh_token: &str) -> Option<Identity> {
        self.issued
            .get(refresh_token)
            .map(|identity| identity.clone())
    }
}

/// Per-browser auth provider over [`MemoryAccounts`].
pub struct MemoryAuth {
    accounts: Arc<MemoryAccounts>,
    current: RwLock<Option<AuthSession>>,
    events: broadcast::Sender<AuthEvent>,
    unreachable: AtomicBool,
}

impl MemoryAuth {
    pub fn new(accounts: Arc<MemoryAccounts>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            accounts,
            current: RwLock::new(None),
            events,
            unreachable: AtomicBool::new(false),
        }
    }

    /// Provider seeded with previously issued tokens. Unknown tokens start
    /// signed out.
    pub fn restore(accounts: Arc<MemoryAccounts>, tokens: Option<AuthTokens>) -> Self {
        let current = tokens.and_then(|tokens| {
            accounts
                .holder(&tokens.refresh_token)
                .map(|identity| AuthSession { identity, tokens })
        });
        let provider = Self::new(accounts);
        Self {
            current: RwLock::new(current),
            ..provider
        }
    }

    /// Make every call fail with [`AuthError::Network`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn ensure_reachable(&self) -> Result<(), AuthError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(AuthError::Network("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine; the next subscriber recovers from `current`.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        self.ensure_reachable()?;
        let identity = self.accounts.verify(email, password)?;
        let session = AuthSession {
            tokens: self.accounts.issue(&identity),
            identity: identity.clone(),
        };
        *self.current.write().await = Some(session.clone());
        self.emit(AuthEvent::SignedIn(identity));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        _attributes: SignUpAttributes,
    ) -> Result<Identity, AuthError> {
        self.ensure_reachable()?;
        self.accounts.register(email, password)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(previous) = self.current.write().await.take() {
            self.accounts.redeem(&previous.tokens.refresh_token);
        }
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    async fn refresh_session(&self) -> Result<AuthSession, AuthError> {
        self.ensure_reachable()?;
        let mut current = self.current.write().await;
        let previous = current.as_ref().ok_or(AuthError::Rejected {
            status: 401,
            message: "no active session".to_string(),
        })?;
        let identity = self
            .accounts
            .redeem(&previous.tokens.refresh_token)
            .ok_or(AuthError::Rejected {
                status: 401,
                message: "refresh token already used".to_string(),
            })?;
        let session = AuthSession {
            tokens: self.accounts.issue(&identity),
            identity: identity.clone(),
        };
        *current = Some(session.clone());
        drop(current);
        self.emit(AuthEvent::TokenRefreshed(identity));
        Ok(session)
    }

    async fn current_session(&self) -> Option<AuthSession> {
        self.current.read().await.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

/// Profiles, grants and logbook rows held in process memory, with
/// per-user latency and failure injection.
#[derive(Default)]
pub struct MemoryDirectory {
    profiles: DashMap<UserId, Profile>,
    grants: DashMap<UserId, Vec<PermissionGrant>>,
    latency: DashMap<UserId, Duration>,
    failures: DashMap<UserId, BackendError>,
    entries: RwLock<Vec<LogbookEntry>>,
    completion_failures: DashMap<Uuid, BackendError>,
}

impl MemoryDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store a profile together with its grants, replacing earlier ones.
    pub fn insert_staff(&self, profile: Profile, permissions: PermissionSet) {
        let grants = permissions
            .iter()
            .map(|permission| PermissionGrant {
                user_id: profile.id,
                organization_id: profile.organization_id,
                permission,
            })
            .collect();
        self.grants.insert(profile.id, grants);
        self.profiles.insert(profile.id, profile);
    }

    /// Append raw grant rows, duplicates included.
    pub fn push_grants(&self, user_id: UserId, grants: impl IntoIterator<Item = PermissionGrant>) {
        self.grants.entry(user_id).or_default().extend(grants);
    }

    pub fn set_latency(&self, user_id: UserId, latency: Duration) {
        self.latency.insert(user_id, latency);
    }

    pub fn fail_with(&self, user_id: UserId, error: BackendError) {
        self.failures.insert(user_id, error);
    }

    pub fn clear_failure(&self, user_id: UserId) {
        self.failures.remove(&user_id);
    }

    /// Make completing `entry_id` fail until cleared.
    pub fn fail_completion(&self, entry_id: Uuid, error: BackendError) {
        self.completion_failures.insert(entry_id, error);
    }

    pub fn clear_completion_failure(&self, entry_id: Uuid) {
        self.completion_failures.remove(&entry_id);
    }

    async fn simulate(&self, user_id: UserId) -> Result<(), BackendError> {
        let latency = self.latency.get(&user_id).map(|latency| *latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match self.failures.get(&user_id) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn fetch_profile(&self, user_id: UserId) -> Result<Profile, BackendError> {
        self.simulate(user_id).await?;
        self.profiles
            .get(&user_id)
            .map(|profile| profile.clone())
            .ok_or(BackendError::NotFound)
    }

    async fn fetch_permission_grants(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PermissionGrant>, BackendError> {
        self.simulate(user_id).await?;
        Ok(self
            .grants
            .get(&user_id)
            .map(|grants| grants.clone())
            .unwrap_or_default())
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<(), BackendError> {
        self.simulate(profile.id).await?;
        self.profiles.insert(profile.id, profile.clone());
        Ok(())
    }

    async fn grant_permissions(&self, grants: Vec<PermissionGrant>) -> Result<(), BackendError> {
        for grant in grants {
            self.simulate(grant.user_id).await?;
            self.grants.entry(grant.user_id).or_default().push(grant);
        }
        Ok(())
    }
}

#[async_trait]
impl LogbookRepository for MemoryDirectory {
    async fn list_entries(&self, organization_id: Uuid) -> Result<Vec<LogbookEntry>, BackendError> {
        let mut entries: Vec<LogbookEntry> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|entry| entry.organization_id == Some(organization_id))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    async fn get_entry(&self, entry_id: Uuid) -> Result<LogbookEntry, BackendError> {
        self.entries
            .read()
            .await
            .iter()
            .find(|entry| entry.id == entry_id)
            .cloned()
            .ok_or(BackendError::NotFound)
    }

    async fn record_entry(&self, entry: NewLogbookEntry) -> Result<LogbookEntry, BackendError> {
        let stored = LogbookEntry {
            id: Uuid::new_v4(),
            kind: entry.kind,
            person_type: entry.person_type,
            person_id: entry.person_id,
            person_name: entry.person_name,
            purpose: entry.purpose,
            notes: entry.notes,
            staff_id: Some(entry.staff_id),
            organization_id: entry.organization_id,
            timestamp: entry.timestamp,
            status: Some(entry.status),
        };
        self.entries.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn complete_entry(&self, entry_id: Uuid) -> Result<LogbookEntry, BackendError> {
        if let Some(error) = self.completion_failures.get(&entry_id) {
            return Err(error.clone());
        }
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|entry| entry.id == entry_id)
            .ok_or(BackendError::NotFound)?;
        if !entry.is_active() {
            return Err(BackendError::Conflict("active"));
        }
        entry.status = Some(EntryStatus::Completed);
        Ok(entry.clone())
    }
}

/// Backend factory over shared in-memory accounts and tables.
pub struct MemoryFactory {
    accounts: Arc<MemoryAccounts>,
    directory: Arc<MemoryDirectory>,
}

impl MemoryFactory {
    pub fn new(accounts: Arc<MemoryAccounts>, directory: Arc<MemoryDirectory>) -> Self {
        Self {
            accounts,
            directory,
        }
    }

    /// A factory whose accounts are created from `demo`, all members of one
    /// organization.
    pub fn seeded(demo: &[DemoAccount]) -> Result<Self, AuthError> {
        let accounts = MemoryAccounts::new();
        let directory = MemoryDirectory::new();
        let organization_id = Uuid::new_v4();

        for account in demo {
            let identity = accounts.register(&account.email, &account.password)?;
            let permissions: PermissionSet = account
                .roles
                .iter()
                .flat_map(|role| role.permissions().iter().copied())
                .collect();
            directory.insert_staff(
                Profile {
                    id: identity.id,
                    name: account.name.clone(),
                    email: identity.email,
                    organization_id: Some(organization_id),
                    organization_name: Some(DEMO_ORGANIZATION.to_string()),
                    is_owner: account.is_owner,
                },
                permissions,
            );
        }
        tracing::info!(accounts = demo.len(), "Seeded in-memory backend");
        Ok(Self::new(accounts, directory))
    }
}

impl BackendFactory for MemoryFactory {
    fn create(&self, tokens: Option<AuthTokens>) -> Backend {
        Backend {
            auth: Arc::new(MemoryAuth::restore(self.accounts.clone(), tokens)),
            directory: self.directory.clone(),
            logbook: self.directory.clone(),
        }
    }
}
