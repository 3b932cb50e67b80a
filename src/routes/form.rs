//! Body extractor shared by every write route.
use std::collections::HashMap;

use axum::{
    extract::{
        multipart::MultipartError, FromRequest, Multipart, Request,
    },
    http::{header, StatusCode},
    Form, Json,
};
use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::models::FormFields;
use crate::state::AppState;

/// Multipart part carrying the attachment.
pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Submitted fields plus the optional `image` attachment, from a multipart,
/// JSON or urlencoded body.
#[derive(Debug, Default)]
pub struct SubmittedForm {
    pub fields: FormFields,
    pub image: Option<UploadedFile>,
}

impl SubmittedForm {
    async fn from_multipart(mut multipart: Multipart, max_bytes: usize) -> Result<Self, AppError> {
        let mut form = SubmittedForm::default();
        let map_err = |e: MultipartError| multipart_error(e, max_bytes);

        while let Some(field) = multipart.next_field().await.map_err(map_err)? {
            let name = field.name().unwrap_or_default().to_string();

            if name == IMAGE_FIELD || field.file_name().is_some() {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(map_err)?;
                // An untouched file input still sends an empty part.
                if name == IMAGE_FIELD && !bytes.is_empty() {
                    form.image = Some(UploadedFile {
                        filename,
                        content_type,
                        bytes,
                    });
                } else if !bytes.is_empty() {
                    tracing::debug!(field = %name, "Ignoring unexpected file part");
                }
                continue;
            }

            let text = field.text().await.map_err(map_err)?;
            form.fields.insert(name, text);
        }
        Ok(form)
    }
}

fn multipart_error(err: MultipartError, max_bytes: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge { max_bytes }
    } else {
        AppError::validation(err.body_text())
    }
}

impl FromRequest<AppState> for SubmittedForm {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let max_bytes = state.uploads.max_bytes();
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| AppError::validation(e.body_text()))?;
            return Self::from_multipart(multipart, max_bytes).await;
        }

        if content_type.starts_with("application/json") {
            let Json(map) = Json::<Map<String, Value>>::from_request(req, state)
                .await
                .map_err(|e| {
                    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                        AppError::PayloadTooLarge { max_bytes }
                    } else {
                        AppError::from(e)
                    }
                })?;
            return Ok(SubmittedForm {
                fields: map.into(),
                image: None,
            });
        }

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(pairs) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| AppError::validation(e.body_text()))?;
            let mut fields = FormFields::new();
            for (name, value) in pairs {
                fields.insert(name, value);
            }
            return Ok(SubmittedForm {
                fields,
                image: None,
            });
        }

        Err(AppError::validation(
            "Expected a multipart/form-data, JSON or urlencoded body",
        ))
    }
}
