/*!
 * Blog posts
 * Rich-text posts with a draft/published state. `publishedAt` is set when a
 * post becomes published and cleared when it goes back to draft.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use super::{patch_required, query_flag, query_text, FormFields, Resource, WithImage};
use crate::error::AppError;
use crate::store::{timestamp, Filter, Record};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default, with = "crate::store::timestamp::option")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(with = "crate::store::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::store::timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlogPost {
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    pub is_published: bool,
    #[serde(with = "crate::store::timestamp::option")]
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_published: Option<bool>,
    /// Outer `None` leaves the stored value alone; `Some(None)` clears it.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_published_at"
    )]
    pub published_at: Option<Option<DateTime<Utc>>>,
}

fn serialize_published_at<S: Serializer>(
    value: &Option<Option<DateTime<Utc>>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(Some(at)) => serializer.serialize_str(&timestamp::format(at)),
        _ => serializer.serialize_none(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct BlogQuery {
    pub published: Option<String>,
    pub category: Option<String>,
}

impl WithImage for NewBlogPost {
    fn set_image_url(&mut self, url: String) {
        self.image_url = Some(url);
    }
}

impl WithImage for BlogPatch {
    fn set_image_url(&mut self, url: String) {
        self.image_url = Some(url);
    }
}

/// Strip scripts, handlers and other unsafe markup from editor output.
fn sanitize_html(html: &str) -> String {
    ammonia::clean(html)
}

/// `publishedAt` change implied by a requested publish state.
fn published_at_transition(
    was_published: bool,
    published_at: Option<DateTime<Utc>>,
    requested: Option<bool>,
    now: DateTime<Utc>,
) -> Option<Option<DateTime<Utc>>> {
    match requested? {
        true if !was_published || published_at.is_none() => Some(Some(now)),
        true => None,
        false => Some(None),
    }
}

impl Record for BlogPost {
    const COLLECTION: &'static str = "blogs";
    const NAME: &'static str = "Blog post";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Resource for BlogPost {
    const FOLDER: &'static str = "blog";
    const IMAGE_REQUIRED: bool = false;

    type Query = BlogQuery;
    type Draft = NewBlogPost;
    type Patch = BlogPatch;

    /// Anonymous readers only ever see published posts.
    fn filter(query: &BlogQuery, admin: bool) -> Result<Filter, AppError> {
        let mut filter = Filter::new();
        let published = query_flag(query.published.as_deref(), "published")?;
        if !admin {
            filter = filter.with("isPublished", true);
        } else if let Some(published) = published {
            filter = filter.with("isPublished", published);
        }
        if let Some(category) = query_text(query.category.as_ref()) {
            filter = filter.with("category", category);
        }
        Ok(filter)
    }

    fn draft(fields: &FormFields) -> Result<NewBlogPost, AppError> {
        let is_published = fields.bool("isPublished")?.unwrap_or(false);
        Ok(NewBlogPost {
            title: fields.required_text("title")?,
            content: sanitize_html(&fields.text("content").unwrap_or_default()),
            author: fields.text("author").filter(|a| !a.is_empty()),
            category: fields.text("category").filter(|c| !c.is_empty()),
            image_url: None,
            tags: fields.tags("tags")?.unwrap_or_default(),
            is_published,
            published_at: is_published.then(Utc::now),
        })
    }

    fn patch(&self, fields: &FormFields) -> Result<BlogPatch, AppError> {
        let is_published = fields.bool("isPublished")?;
        Ok(BlogPatch {
            title: patch_required(fields, "title")?,
            content: fields.text("content").map(|c| sanitize_html(&c)),
            author: fields.text("author"),
            category: fields.text("category"),
            image_url: None,
            tags: fields.tags("tags")?,
            is_published,
            published_at: published_at_transition(
                self.is_published,
                self.published_at,
                is_published,
                Utc::now(),
            ),
        })
    }

    fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    fn is_public(&self) -> bool {
        self.is_published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post(is_published: bool, published_at: Option<&str>) -> BlogPost {
        serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "title": "Choosing sash windows",
            "content": "<p>Hello</p>",
            "isPublished": is_published,
            "publishedAt": published_at,
            "createdAt": "2024-01-01T00:00:00.000000Z",
            "updatedAt": "2024-01-01T00:00:00.000000Z",
        }))
        .unwrap()
    }

    #[test]
    fn draft_sets_published_at_only_when_published() {
        let published = BlogPost::draft(&FormFields::from([
            ("title", json!("A")),
            ("isPublished", json!("published")),
        ]))
        .unwrap();
        assert!(published.is_published);
        assert!(published.published_at.is_some());

        let draft = BlogPost::draft(&FormFields::from([("title", json!("A"))])).unwrap();
        assert!(!draft.is_published);
        assert!(draft.published_at.is_none());
        assert_eq!(serde_json::to_value(&draft).unwrap()["publishedAt"], json!(null));
    }

    #[test]
    fn content_is_sanitized() {
        let draft = BlogPost::draft(&FormFields::from([
            ("title", json!("A")),
            ("content", json!("<p onclick=\"x()\">Hi</p><script>alert(1)</script>")),
        ]))
        .unwrap();
        assert_eq!(draft.content, "<p>Hi</p>");
    }

    #[test]
    fn transitions_follow_the_publish_state() {
        let now = Utc::now();
        let earlier = now - chrono::Duration::days(3);

        // draft -> published
        assert_eq!(published_at_transition(false, None, Some(true), now), Some(Some(now)));
        // published -> published keeps the original date
        assert_eq!(published_at_transition(true, Some(earlier), Some(true), now), None);
        // published without a date is repaired
        assert_eq!(published_at_transition(true, None, Some(true), now), Some(Some(now)));
        // -> draft clears
        assert_eq!(published_at_transition(true, Some(earlier), Some(false), now), Some(None));
        assert_eq!(published_at_transition(false, None, Some(false), now), Some(None));
        // untouched
        assert_eq!(published_at_transition(true, Some(earlier), None, now), None);
    }

    #[test]
    fn unpublishing_patch_serializes_null() {
        let patch = post(true, Some("2024-02-01T00:00:00.000000Z"))
            .patch(&FormFields::from([("isPublished", json!(false))]))
            .unwrap();
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({"isPublished": false, "publishedAt": null})
        );
    }

    #[test]
    fn patch_without_publish_field_leaves_dates_alone() {
        let patch = post(true, Some("2024-02-01T00:00:00.000000Z"))
            .patch(&FormFields::from([("title", json!("Renamed"))]))
            .unwrap();
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"title": "Renamed"}));
    }

    #[test]
    fn anonymous_filter_forces_published() {
        let query = BlogQuery {
            published: Some("false".into()),
            category: None,
        };
        assert_eq!(
            BlogPost::filter(&query, false).unwrap().to_value(),
            json!({"isPublished": true})
        );
        assert_eq!(
            BlogPost::filter(&query, true).unwrap().to_value(),
            json!({"isPublished": false})
        );
        assert!(BlogPost::filter(&BlogQuery::default(), true).unwrap().is_empty());
    }

    #[test]
    fn only_published_posts_are_public() {
        assert!(post(true, Some("2024-02-01T00:00:00.000000Z")).is_public());
        assert!(!post(false, None).is_public());
    }
}
