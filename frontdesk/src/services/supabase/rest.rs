use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use service_core::observability::TracedClientExt;
use std::sync::Arc;
use uuid::Uuid;

use super::{APIKEY_HEADER, SupabaseAuth, anon_key};
use crate::config::BackendSettings;
use crate::models::profile::{PermissionGrantRow, ProfileRow, RecordError};
use crate::models::{LogbookEntry, NewLogbookEntry, PermissionGrant, Profile, UserId};
use crate::services::auth::AuthProvider;
use crate::services::backend::{BackendError, Directory, LogbookRepository};

const PROFILE_COLUMNS: &str = "id,name,email,organization_id,is_owner,organizations(name)";
const GRANT_COLUMNS: &str = "user_id,organization_id,permission";

/// PostgREST client acting with the signed-in user's access token.
pub struct SupabaseBackend {
    client: Client,
    settings: BackendSettings,
    auth: Arc<SupabaseAuth>,
}

impl SupabaseBackend {
    pub fn new(client: Client, settings: BackendSettings, auth: Arc<SupabaseAuth>) -> Self {
        Self {
            client,
            settings,
            auth,
        }
    }

    /// Attach the anon key and the caller's bearer token. Without a signed-in
    /// user the anon key doubles as the bearer, as PostgREST expects.
    async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = match self.auth.access_token().await {
            Some(token) => token,
            None => anon_key(&self.settings).to_string(),
        };
        request
            .header(APIKEY_HEADER, anon_key(&self.settings))
            .bearer_auth(bearer)
    }

    fn table(&self, table: &str, query: &str) -> String {
        self.settings
            .endpoint(&format!("/rest/v1/{}?{}", table, query))
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &str) -> Result<Vec<T>, BackendError> {
        let url = self.table(table, query);
        let request = self.authorize(self.client.traced_get(&url)).await;
        let response = request.send().await.map_err(|e| {
            tracing::error!("Failed to send GET request to {}: {}", url, e);
            BackendError::from(e)
        })?;
        Ok(check(response).await?.json().await?)
    }
}

async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

fn single<T>(rows: Vec<T>) -> Result<T, BackendError> {
    rows.into_iter().next().ok_or(BackendError::NotFound)
}

/// The conditional update matched no row: the entry was completed already.
fn completed(rows: Vec<LogbookEntry>) -> Result<LogbookEntry, BackendError> {
    rows.into_iter()
        .next()
        .ok_or(BackendError::Conflict("active"))
}

/// Parse grant rows; grants naming permissions this build does not know
/// are skipped, any other malformed row fails the whole fetch.
pub(crate) fn parse_grants(rows: Vec<PermissionGrantRow>) -> Result<Vec<PermissionGrant>, BackendError> {
    let mut grants = Vec::with_capacity(rows.len());
    for row in rows {
        match PermissionGrant::try_from(row) {
            Ok(grant) => grants.push(grant),
            Err(RecordError::UnknownPermission(unknown)) => {
                tracing::warn!(permission = %unknown.0, "Skipping unknown permission grant");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(grants)
}

#[async_trait]
impl Directory for SupabaseBackend {
    async fn fetch_profile(&self, user_id: UserId) -> Result<Profile, BackendError> {
        let rows: Vec<ProfileRow> = self
            .select(
                "profiles",
                &format!("select={}&id=eq.{}", PROFILE_COLUMNS, user_id),
            )
            .await?;
        Ok(Profile::try_from(single(rows)?)?)
    }

    async fn fetch_permission_grants(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PermissionGrant>, BackendError> {
        let rows: Vec<PermissionGrantRow> = self
            .select(
                "staff_permissions",
                &format!("select={}&user_id=eq.{}", GRANT_COLUMNS, user_id),
            )
            .await?;
        parse_grants(rows)
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<(), BackendError> {
        // the sign-up trigger may already have created the row
        let url = self.table("profiles", "on_conflict=id");
        let request = self
            .authorize(self.client.traced_post(&url))
            .await
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&json!({
                "id": profile.id,
                "name": profile.name,
                "email": profile.email,
                "organization_id": profile.organization_id,
            }));
        check(request.send().await?).await?;
        Ok(())
    }

    async fn grant_permissions(&self, grants: Vec<PermissionGrant>) -> Result<(), BackendError> {
        if grants.is_empty() {
            return Ok(());
        }
        let url = self.table("staff_permissions", "columns=user_id,organization_id,permission");
        let request = self
            .authorize(self.client.traced_post(&url))
            .await
            .header("Prefer", "return=minimal")
            .json(&grants);
        check(request.send().await?).await?;
        Ok(())
    }
}

#[async_trait]
impl LogbookRepository for SupabaseBackend {
    async fn list_entries(&self, organization_id: Uuid) -> Result<Vec<LogbookEntry>, BackendError> {
        self.select(
            "logbook_entries",
            &format!(
                "select=*&organization_id=eq.{}&order=timestamp.desc",
                organization_id
            ),
        )
        .await
    }

    async fn get_entry(&self, entry_id: Uuid) -> Result<LogbookEntry, BackendError> {
        let rows = self
            .select("logbook_entries", &format!("select=*&id=eq.{}", entry_id))
            .await?;
        single(rows)
    }

    async fn record_entry(&self, entry: NewLogbookEntry) -> Result<LogbookEntry, BackendError> {
        let url = self.table("logbook_entries", "select=*");
        let request = self
            .authorize(self.client.traced_post(&url))
            .await
            .header("Prefer", "return=representation")
            .json(&entry);
        let response = check(request.send().await?).await?;
        single(response.json().await?)
    }

    async fn complete_entry(&self, entry_id: Uuid) -> Result<LogbookEntry, BackendError> {
        let url = self.table(
            "logbook_entries",
            &format!("id=eq.{}&status=eq.active&select=*", entry_id),
        );
        let request = self
            .authorize(self.client.traced_patch(&url))
            .await
            .header("Prefer", "return=representation")
            .json(&json!({ "status": "completed" }));
        let rows: Vec<LogbookEntry> = check(request.send().await?).await?.json().await?;
        completed(rows)
    }
}
