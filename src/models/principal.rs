use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::Record;

/// An admin identity. Never serialized into a response; use [`PrincipalSummary`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(with = "crate::store::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::store::timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .field("is_admin", &self.is_admin)
            .finish()
    }
}

impl Principal {
    pub fn summary(&self) -> PrincipalSummary {
        PrincipalSummary {
            id: self.id,
            username: self.username.clone(),
        }
    }
}

impl Record for Principal {
    const COLLECTION: &'static str = "principals";
    const NAME: &'static str = "User";

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPrincipal {
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrincipalSummary {
    pub id: Uuid,
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_the_hash() {
        let principal = Principal {
            id: Uuid::new_v4(),
            username: "admin".to_string(),
            password_hash: "$2b$10$abcdefghijklmnopqrstuv".to_string(),
            is_admin: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let debug = format!("{:?}", principal);
        assert!(debug.contains("admin"));
        assert!(!debug.contains("$2b$"));
    }
}
