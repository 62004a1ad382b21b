use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Draft,
    Final,
    Archived,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Final => "final",
            DocumentStatus::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(DocumentStatus::Draft),
            "final" => Some(DocumentStatus::Final),
            "archived" => Some(DocumentStatus::Archived),
            _ => None,
        }
    }

    /// draft -> final -> archived, with final -> draft for reopening
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!((self, next), (Draft, Final) | (Final, Archived) | (Final, Draft) | (Draft, Archived))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub workspace_id: Option<Uuid>,
    pub title: String,
    pub body: String,
    pub status: String,
    pub attachment_ids: Vec<Uuid>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentInput {
    pub workspace_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub attachment_ids: Vec<Uuid>,
    pub version: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusInput {
    pub status: DocumentStatus,
    pub version: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions() {
        assert!(DocumentStatus::Draft.can_transition_to(DocumentStatus::Final));
        assert!(DocumentStatus::Final.can_transition_to(DocumentStatus::Draft));
        assert!(DocumentStatus::Final.can_transition_to(DocumentStatus::Archived));
        assert!(!DocumentStatus::Archived.can_transition_to(DocumentStatus::Draft));
        assert!(!DocumentStatus::Archived.can_transition_to(DocumentStatus::Final));
        assert!(!DocumentStatus::Draft.can_transition_to(DocumentStatus::Draft));
    }
}
