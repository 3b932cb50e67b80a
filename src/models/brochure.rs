use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::FormFields;
use crate::error::AppError;
use crate::store::{Filter, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrochureStatus {
    Pending,
    Sent,
    Failed,
}

impl BrochureStatus {
    /// Only a pending request may move, and only to `sent` or `failed`.
    pub fn can_transition_to(self, next: BrochureStatus) -> bool {
        matches!(
            (self, next),
            (BrochureStatus::Pending, BrochureStatus::Sent)
                | (BrochureStatus::Pending, BrochureStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BrochureStatus::Pending => "pending",
            BrochureStatus::Sent => "sent",
            BrochureStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for BrochureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrochureRequest {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub status: BrochureStatus,
    #[serde(with = "crate::store::timestamp")]
    pub request_date: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(with = "crate::store::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::store::timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl BrochureRequest {
    /// Patch moving this request to `next`, if the transition is allowed.
    pub fn transition(&self, next: BrochureStatus) -> Result<StatusPatch, AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        Ok(StatusPatch { status: next })
    }

    /// Store condition that holds only while a request is still pending.
    pub fn while_pending() -> Filter {
        Filter::new().with("status", BrochureStatus::Pending.as_str())
    }
}

impl Record for BrochureRequest {
    const COLLECTION: &'static str = "brochure_requests";
    const NAME: &'static str = "Brochure request";

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBrochureRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub status: BrochureStatus,
    #[serde(with = "crate::store::timestamp")]
    pub request_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NewBrochureRequest {
    pub fn from_fields(fields: &FormFields) -> Result<Self, AppError> {
        let name = fields.required_text("name")?;
        let email = fields.required_text("email")?;
        let phone = fields.required_text("phone")?;

        let valid_email = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
        if !valid_email {
            return Err(AppError::validation("email must be a valid email address"));
        }

        Ok(Self {
            name,
            email,
            phone,
            status: BrochureStatus::Pending,
            request_date: Utc::now(),
            notes: fields.text("notes").filter(|n| !n.is_empty()),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StatusPatch {
    pub status: BrochureStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_pending_requests_move() {
        use BrochureStatus::*;
        assert!(Pending.can_transition_to(Sent));
        assert!(Pending.can_transition_to(Failed));
        for from in [Sent, Failed] {
            for to in [Pending, Sent, Failed] {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn new_requests_start_pending() {
        let request = NewBrochureRequest::from_fields(&FormFields::from([
            ("name", json!("Ada")),
            ("email", json!("ada@example.com")),
            ("phone", json!("07700 900123")),
        ]))
        .unwrap();
        assert_eq!(request.status, BrochureStatus::Pending);
        assert_eq!(serde_json::to_value(&request).unwrap()["status"], json!("pending"));
    }

    #[test]
    fn email_needs_an_at_sign() {
        let err = NewBrochureRequest::from_fields(&FormFields::from([
            ("name", json!("Ada")),
            ("email", json!("ada.example.com")),
            ("phone", json!("07700 900123")),
        ]))
        .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn sent_request_cannot_be_resent() {
        let request: BrochureRequest = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "name": "Ada",
            "email": "ada@example.com",
            "phone": "1",
            "status": "sent",
            "requestDate": "2024-01-01T00:00:00.000000Z",
            "createdAt": "2024-01-01T00:00:00.000000Z",
            "updatedAt": "2024-01-01T00:00:00.000000Z",
        }))
        .unwrap();
        let err = request.transition(BrochureStatus::Sent).unwrap_err();
        assert_eq!(err.to_string(), "Cannot change status from sent to sent");
    }
}
