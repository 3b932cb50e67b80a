use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{patch_required, query_flag, query_text, FormFields, Resource, WithImage};
use crate::error::AppError;
use crate::store::{Filter, Record};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryItem {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub image_url: String,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(with = "crate::store::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::store::timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGalleryItem {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub is_featured: bool,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_featured: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GalleryQuery {
    pub category: Option<String>,
    pub featured: Option<String>,
}

impl WithImage for NewGalleryItem {
    fn set_image_url(&mut self, url: String) {
        self.image_url = Some(url);
    }
}

impl WithImage for GalleryPatch {
    fn set_image_url(&mut self, url: String) {
        self.image_url = Some(url);
    }
}

impl Record for GalleryItem {
    const COLLECTION: &'static str = "gallery";
    const NAME: &'static str = "Gallery item";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Resource for GalleryItem {
    const FOLDER: &'static str = "gallery";
    const IMAGE_REQUIRED: bool = true;

    type Query = GalleryQuery;
    type Draft = NewGalleryItem;
    type Patch = GalleryPatch;

    fn filter(query: &GalleryQuery, _admin: bool) -> Result<Filter, AppError> {
        let mut filter = Filter::new();
        if let Some(category) = query_text(query.category.as_ref()) {
            filter = filter.with("category", category);
        }
        if let Some(featured) = query_flag(query.featured.as_deref(), "featured")? {
            filter = filter.with("isFeatured", featured);
        }
        Ok(filter)
    }

    fn draft(fields: &FormFields) -> Result<NewGalleryItem, AppError> {
        Ok(NewGalleryItem {
            title: fields.required_text("title")?,
            description: fields.text("description"),
            category: fields.text("category").filter(|c| !c.is_empty()),
            image_url: None,
            is_featured: fields.bool("isFeatured")?.unwrap_or(false),
        })
    }

    fn patch(&self, fields: &FormFields) -> Result<GalleryPatch, AppError> {
        Ok(GalleryPatch {
            title: patch_required(fields, "title")?,
            description: fields.text("description"),
            category: fields.text("category"),
            image_url: None,
            is_featured: fields.bool("isFeatured")?,
        })
    }

    fn image_url(&self) -> Option<&str> {
        Some(&self.image_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn featured_query_maps_to_is_featured() {
        let query = GalleryQuery {
            category: None,
            featured: Some("1".into()),
        };
        let filter = GalleryItem::filter(&query, false).unwrap();
        assert_eq!(filter.to_value(), json!({"isFeatured": true}));
    }

    #[test]
    fn bad_featured_query_is_rejected() {
        let query = GalleryQuery {
            category: None,
            featured: Some("sometimes".into()),
        };
        assert!(GalleryItem::filter(&query, false).is_err());
    }

    #[test]
    fn draft_reads_checkbox() {
        let fields = FormFields::from([
            ("title", json!("Kitchen extension")),
            ("category", json!("residential")),
            ("isFeatured", json!("on")),
        ]);
        let draft = GalleryItem::draft(&fields).unwrap();
        assert!(draft.is_featured);
        assert_eq!(draft.category.as_deref(), Some("residential"));
    }
}
