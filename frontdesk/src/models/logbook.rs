use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::profile::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    CheckIn,
    CheckOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonType {
    Patient,
    Guest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Active,
    Completed,
}

/// A visit logbook entry (`logbook_entries` row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogbookEntry {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub person_type: PersonType,
    pub person_id: Uuid,
    pub person_name: String,
    pub purpose: Option<String>,
    pub notes: Option<String>,
    pub staff_id: Option<UserId>,
    pub organization_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub status: Option<EntryStatus>,
}

impl LogbookEntry {
    pub fn is_active(&self) -> bool {
        self.status == Some(EntryStatus::Active)
    }
}

/// Check-in form payload.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CheckInForm {
    pub person_type: PersonType,
    pub person_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200, message = "name is required"))]
    pub person_name: String,
    #[validate(length(max = 200))]
    pub purpose: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Insert payload for a new logbook entry.
#[derive(Debug, Clone, Serialize)]
pub struct NewLogbookEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub person_type: PersonType,
    pub person_id: Uuid,
    pub person_name: String,
    pub purpose: Option<String>,
    pub notes: Option<String>,
    pub staff_id: UserId,
    pub organization_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub status: EntryStatus,
}

impl NewLogbookEntry {
    /// Build an active check-in recorded by `staff_id` for their organization.
    ///
    /// Walk-in visitors without a registration get a fresh person id.
    pub fn check_in(form: CheckInForm, staff_id: UserId, organization_id: Uuid) -> Self {
        Self {
            kind: EntryKind::CheckIn,
            person_type: form.person_type,
            person_id: form.person_id.unwrap_or_else(Uuid::new_v4),
            person_name: form.person_name.trim().to_string(),
            purpose: non_blank(form.purpose),
            notes: non_blank(form.notes),
            staff_id,
            organization_id: Some(organization_id),
            timestamp: Utc::now(),
            status: EntryStatus::Active,
        }
    }

    /// Build the completed check-out that closes `entry`.
    pub fn check_out(entry: &LogbookEntry, staff_id: UserId) -> Self {
        Self {
            kind: EntryKind::CheckOut,
            person_type: entry.person_type,
            person_id: entry.person_id,
            person_name: entry.person_name.clone(),
            purpose: entry.purpose.clone(),
            notes: None,
            staff_id,
            organization_id: entry.organization_id,
            timestamp: Utc::now(),
            status: EntryStatus::Completed,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_row_deserializes() {
        let entry: LogbookEntry = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "type": "check-in",
            "person_type": "guest",
            "person_id": Uuid::new_v4(),
            "person_name": "Carlos Lima",
            "purpose": "Delivery",
            "notes": null,
            "staff_id": null,
            "organization_id": null,
            "timestamp": "2026-03-02T12:30:00Z",
            "status": "active"
        }))
        .unwrap();

        assert_eq!(entry.kind, EntryKind::CheckIn);
        assert_eq!(entry.person_type, PersonType::Guest);
        assert!(entry.is_active());
    }

    #[test]
    fn test_check_in_trims_and_drops_blank_fields() {
        let form = CheckInForm {
            person_type: PersonType::Patient,
            person_id: None,
            person_name: "  Ana Costa ".to_string(),
            purpose: Some("   ".to_string()),
            notes: Some(" first visit ".to_string()),
        };
        let staff = UserId::new();
        let entry = NewLogbookEntry::check_in(form, staff, Uuid::new_v4());

        assert_eq!(entry.person_name, "Ana Costa");
        assert_eq!(entry.purpose, None);
        assert_eq!(entry.notes.as_deref(), Some("first visit"));
        assert_eq!(entry.status, EntryStatus::Active);
        assert_eq!(entry.staff_id, staff);
    }

    #[test]
    fn test_check_in_form_requires_name() {
        let form = CheckInForm {
            person_type: PersonType::Guest,
            person_id: None,
            person_name: String::new(),
            purpose: None,
            notes: None,
        };
        assert!(form.validate().is_err());
    }
}
