/*!
 * Resource Controller
 * One set of CRUD handlers shared by every [`Resource`] type. Reads are
 * public, writes sit behind `require_auth` (see `routes::resource_router`).
 */
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Serialize;
use uuid::Uuid;

use super::form::SubmittedForm;
use crate::auth::middleware::Viewer;
use crate::error::AppError;
use crate::models::{Principal, Resource, WithImage};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// An id that is not a UUID cannot name a record.
fn parse_id<T: Resource>(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(T::NAME))
}

/// GET /api/{resource}
pub async fn list<T: Resource>(
    State(state): State<AppState>,
    viewer: Viewer,
    query: Result<Query<T::Query>, QueryRejection>,
) -> Result<Json<Vec<T>>, AppError> {
    let Query(query) = query?;
    let filter = T::filter(&query, viewer.is_admin())?;
    let records = state.store::<T>().list(&filter, &T::default_sort()).await?;
    tracing::debug!(collection = T::COLLECTION, count = records.len(), "Listed records");
    Ok(Json(records))
}

/// GET /api/{resource}/{id}
pub async fn get_one<T: Resource>(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<String>,
) -> Result<Json<T>, AppError> {
    let id = parse_id::<T>(&id)?;
    let record = state.store::<T>().get(id).await?;
    if !record.is_public() && !viewer.is_admin() {
        return Err(AppError::NotFound(T::NAME));
    }
    Ok(Json(record))
}

/// POST /api/{resource}
pub async fn create<T: Resource>(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    form: SubmittedForm,
) -> Result<impl IntoResponse, AppError> {
    let mut draft = T::draft(&form.fields)?;

    match form.image {
        Some(image) => {
            let url = state
                .uploads
                .store(
                    T::FOLDER,
                    image.bytes,
                    image.filename.as_deref(),
                    image.content_type.as_deref(),
                )
                .await?;
            draft.set_image_url(url);
        }
        None if T::IMAGE_REQUIRED => return Err(AppError::validation("Image is required")),
        None => {}
    }

    let record = state.store::<T>().create(&draft).await.map_err(|e| {
        if let Ok(value) = serde_json::to_value(&draft) {
            if let Some(url) = value.get("imageUrl").and_then(|u| u.as_str()) {
                tracing::warn!(image_url = url, "Uploaded image orphaned by failed create");
            }
        }
        AppError::from(e)
    })?;

    tracing::info!(
        collection = T::COLLECTION,
        id = %record.id(),
        by = %principal.username,
        "Record created"
    );
    Ok((StatusCode::CREATED, Json(record)))
}

/// PUT /api/{resource}/{id}
pub async fn update<T: Resource>(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    form: SubmittedForm,
) -> Result<Json<T>, AppError> {
    let id = parse_id::<T>(&id)?;
    let store = state.store::<T>();
    let existing = store.get(id).await?;
    let mut patch = existing.patch(&form.fields)?;

    let mut replaced = None;
    if let Some(image) = form.image {
        let url = state
            .uploads
            .store(
                T::FOLDER,
                image.bytes,
                image.filename.as_deref(),
                image.content_type.as_deref(),
            )
            .await?;
        replaced = existing.image_url().map(str::to_string);
        patch.set_image_url(url);
    }

    let record = store.update(id, &patch).await?;
    if let Some(old) = replaced {
        tracing::info!(collection = T::COLLECTION, id = %id, old_image_url = %old, "Image replaced; previous object left in place");
    }
    tracing::info!(
        collection = T::COLLECTION,
        id = %id,
        by = %principal.username,
        "Record updated"
    );
    Ok(Json(record))
}

/// DELETE /api/{resource}/{id}
pub async fn remove<T: Resource>(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = parse_id::<T>(&id)?;
    let store = state.store::<T>();
    let existing = store.get(id).await?;
    store.delete(id).await?;

    if let Some(url) = existing.image_url() {
        tracing::info!(collection = T::COLLECTION, id = %id, image_url = url, "Record deleted; image object left in place");
    }
    tracing::info!(
        collection = T::COLLECTION,
        id = %id,
        by = %principal.username,
        "Record deleted"
    );
    Ok(Json(MessageResponse {
        message: format!("{} deleted successfully", T::NAME),
    }))
}
