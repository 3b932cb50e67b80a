//! Operator tasks behind the `manage-admin` binary.
use rand::distr::{Alphanumeric, SampleString};
use serde_json::{Map, Value};

use crate::auth::AuthGate;
use crate::error::AppError;
use crate::models::Principal;
use crate::store::{DocumentStore, Filter, Sort, StoreError};

/// Prefix that the old disk-backed deployment stored in `imageUrl`.
pub const LEGACY_UPLOAD_PREFIX: &str = "/uploads/";

const IMAGE_URL_FIELD: &str = "imageUrl";

pub fn generate_password() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 20)
}

/// Delete every principal, then create `username` as the only admin.
pub async fn reset_principals(
    auth: &AuthGate,
    username: &str,
    password: &str,
) -> Result<Principal, AppError> {
    let principals = auth.principals();
    let existing = principals.list(&Filter::new(), &Sort::default()).await?;
    for principal in &existing {
        principals.delete(principal.id).await?;
    }
    tracing::info!(removed = existing.len(), "Removed existing principals");
    auth.create_principal(username, password).await
}

/// One `imageUrl` to rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlRewrite {
    pub id: String,
    pub from: String,
    pub to: String,
}

/// Point legacy `/uploads/...` image URLs in `collection` at `public_prefix`.
/// With `dry_run` nothing is written.
pub async fn rewrite_local_urls(
    documents: &dyn DocumentStore,
    collection: &str,
    public_prefix: &str,
    dry_run: bool,
) -> Result<Vec<UrlRewrite>, StoreError> {
    let prefix = public_prefix.trim_end_matches('/');
    let mut rewrites = Vec::new();

    for document in documents.find(collection, &Filter::new(), &Sort::default()).await? {
        let Some(url) = document.get(IMAGE_URL_FIELD).and_then(Value::as_str) else {
            continue;
        };
        let Some(key) = url.strip_prefix(LEGACY_UPLOAD_PREFIX) else {
            continue;
        };
        let id = document
            .get("id")
            .and_then(Value::as_str)
            .and_then(|id| uuid::Uuid::parse_str(id).ok())
            .ok_or_else(|| StoreError::Corrupt(format!("{} document without an id", collection)))?;

        let rewrite = UrlRewrite {
            id: id.to_string(),
            from: url.to_string(),
            to: format!("{}/{}", prefix, key),
        };

        if !dry_run {
            let mut patch = Map::new();
            patch.insert(IMAGE_URL_FIELD.to_string(), Value::String(rewrite.to.clone()));
            documents.merge(collection, id, patch).await?;
        }
        tracing::info!(collection, id = %rewrite.id, from = %rewrite.from, to = %rewrite.to, dry_run, "Image URL rewritten");
        rewrites.push(rewrite);
    }
    Ok(rewrites)
}
