use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{patch_required, query_flag, query_text, FormFields, Resource, WithImage};
use crate::error::AppError;
use crate::store::{Direction, Filter, Record, Sort, CREATED_AT_FIELD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductCategory {
    Windows,
    Doors,
    Signature,
    Architectural,
}

impl ProductCategory {
    pub const ALL: [ProductCategory; 4] = [
        ProductCategory::Windows,
        ProductCategory::Doors,
        ProductCategory::Signature,
        ProductCategory::Architectural,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProductCategory::Windows => "windows",
            ProductCategory::Doors => "doors",
            ProductCategory::Signature => "signature",
            ProductCategory::Architectural => "architectural",
        }
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| {
                AppError::validation(
                    "category must be one of windows, doors, signature, architectural",
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub category: ProductCategory,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub order: i64,
    #[serde(with = "crate::store::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::store::timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: ProductCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub featured: bool,
    pub order: i64,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ProductCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
    pub featured: Option<String>,
}

impl WithImage for NewProduct {
    fn set_image_url(&mut self, url: String) {
        self.image_url = Some(url);
    }
}

impl WithImage for ProductPatch {
    fn set_image_url(&mut self, url: String) {
        self.image_url = Some(url);
    }
}

impl Record for Product {
    const COLLECTION: &'static str = "products";
    const NAME: &'static str = "Product";

    fn id(&self) -> Uuid {
        self.id
    }

    /// Catalogue order first, newest first within the same position.
    fn default_sort() -> Sort {
        Sort::by("order", Direction::Asc).then(CREATED_AT_FIELD, Direction::Desc)
    }
}

impl Resource for Product {
    const FOLDER: &'static str = "products";
    const IMAGE_REQUIRED: bool = true;

    type Query = ProductQuery;
    type Draft = NewProduct;
    type Patch = ProductPatch;

    fn filter(query: &ProductQuery, _admin: bool) -> Result<Filter, AppError> {
        let mut filter = Filter::new();
        if let Some(category) = query_text(query.category.as_ref()) {
            filter = filter.with("category", category.to_ascii_lowercase());
        }
        if let Some(featured) = query_flag(query.featured.as_deref(), "featured")? {
            filter = filter.with("featured", featured);
        }
        Ok(filter)
    }

    fn draft(fields: &FormFields) -> Result<NewProduct, AppError> {
        Ok(NewProduct {
            title: fields.required_text("title")?,
            subtitle: fields.text("subtitle"),
            description: fields.text("description"),
            category: fields.required_text("category")?.parse()?,
            image_url: None,
            featured: fields.bool("featured")?.unwrap_or(false),
            order: fields.integer("order")?.unwrap_or(0),
        })
    }

    fn patch(&self, fields: &FormFields) -> Result<ProductPatch, AppError> {
        Ok(ProductPatch {
            title: patch_required(fields, "title")?,
            subtitle: fields.text("subtitle"),
            description: fields.text("description"),
            category: patch_required(fields, "category")?
                .map(|c| c.parse())
                .transpose()?,
            image_url: None,
            featured: fields.bool("featured")?,
            order: fields.integer("order")?,
        })
    }

    fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }
}
