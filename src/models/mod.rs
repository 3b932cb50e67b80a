//! Statically declared record schemas.
//!
//! Each content type implements [`Resource`], which is everything the generic
//! controller in `routes::resource` needs: how to build a record from
//! submitted fields, how to patch one, and how list queries become filters.
pub mod blog;
pub mod brochure;
pub mod form;
pub mod gallery;
pub mod principal;
pub mod product;

pub use blog::BlogPost;
pub use brochure::{BrochureRequest, BrochureStatus};
pub use form::FormFields;
pub use gallery::GalleryItem;
pub use principal::{Principal, PrincipalSummary};
pub use product::{Product, ProductCategory};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::AppError;
use crate::store::{Filter, Record};

/// Drafts and patches that can carry a freshly uploaded image.
pub trait WithImage {
    fn set_image_url(&mut self, url: String);
}

pub trait Resource: Record + Clone {
    /// Object-store folder for this type's images.
    const FOLDER: &'static str;
    /// Create fails without an attached image.
    const IMAGE_REQUIRED: bool;

    type Query: DeserializeOwned + Send + 'static;
    type Draft: Serialize + WithImage + Send + Sync;
    type Patch: Serialize + WithImage + Send + Sync;

    /// `admin` is true when the caller presented a valid token.
    fn filter(query: &Self::Query, admin: bool) -> Result<Filter, AppError>;

    fn draft(fields: &FormFields) -> Result<Self::Draft, AppError>;

    /// Fields to merge over `self`. Absent fields are left alone.
    fn patch(&self, fields: &FormFields) -> Result<Self::Patch, AppError>;

    fn image_url(&self) -> Option<&str>;

    /// Whether anonymous callers may read this record.
    fn is_public(&self) -> bool {
        true
    }
}

/// Parse an optional boolean query parameter.
pub(crate) fn query_flag(value: Option<&str>, name: &str) -> Result<Option<bool>, AppError> {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => match v.as_str() {
            "true" | "1" | "published" => Ok(Some(true)),
            "false" | "0" | "draft" => Ok(Some(false)),
            _ => Err(AppError::validation(format!("{} must be true or false", name))),
        },
    }
}

/// Non-empty optional text from a query string.
pub(crate) fn query_text(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Text that, when submitted, must not be blank.
pub(crate) fn patch_required(fields: &FormFields, field: &str) -> Result<Option<String>, AppError> {
    if fields.contains(field) {
        fields.required_text(field).map(Some)
    } else {
        Ok(None)
    }
}
