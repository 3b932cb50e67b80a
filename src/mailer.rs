//! Brochure delivery through an HTTP mail API.
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::MailConfig;
use crate::models::BrochureRequest;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail API unreachable: {0}")]
    Transport(String),

    #[error("mail API rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait BrochureMailer: Send + Sync {
    async fn send_brochure(&self, request: &BrochureRequest) -> Result<(), MailError>;
}

#[derive(Debug, Serialize)]
struct OutgoingMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'static str,
    text: String,
}

pub struct HttpMailer {
    client: reqwest::Client,
    config: MailConfig,
}

impl HttpMailer {
    pub fn new(config: MailConfig) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| MailError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn message_text(&self, request: &BrochureRequest) -> String {
        let link = self
            .config
            .brochure_url
            .as_deref()
            .map(|url| format!("You can download it here: {}\n\n", url))
            .unwrap_or_default();
        format!(
            "Hi {},\n\nThank you for your interest in Odaville! {}Best regards,\nOdaville Team",
            request.name, link
        )
    }
}

#[async_trait]
impl BrochureMailer for HttpMailer {
    async fn send_brochure(&self, request: &BrochureRequest) -> Result<(), MailError> {
        let message = OutgoingMessage {
            from: &self.config.from,
            to: &request.email,
            subject: "Your Requested Brochure from Odaville",
            text: self.message_text(request),
        };

        let mut outgoing = self.client.post(&self.config.api_url).json(&message);
        if let Some(key) = &self.config.api_key {
            outgoing = outgoing.bearer_auth(key);
        }

        let response = outgoing
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BrochureStatus;
    use axum::{
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use chrono::Utc;
    use serde_json::Value;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    type Inbox = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    async fn mail_api(status: StatusCode) -> (String, Inbox) {
        let inbox: Inbox = Arc::default();
        let app = Router::new()
            .route(
                "/send",
                post(
                    move |State(inbox): State<Inbox>, headers: HeaderMap, Json(body): Json<Value>| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        inbox.lock().unwrap().push((auth, body));
                        status
                    },
                ),
            )
            .with_state(inbox.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{}/send", addr), inbox)
    }

    fn config(api_url: String) -> MailConfig {
        MailConfig {
            api_url,
            api_key: Some("mail-key".to_string()),
            from: "brochures@odaville.com".to_string(),
            brochure_url: Some("https://odaville.com/brochure.pdf".to_string()),
        }
    }

    fn request() -> BrochureRequest {
        BrochureRequest {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            phone: "+123456".to_string(),
            status: BrochureStatus::Pending,
            request_date: Utc::now(),
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn posts_message_with_bearer_key() {
        let (url, inbox) = mail_api(StatusCode::OK).await;
        let mailer = HttpMailer::new(config(url)).unwrap();
        mailer.send_brochure(&request()).await.unwrap();

        let inbox = inbox.lock().unwrap();
        assert_eq!(inbox.len(), 1);
        let (auth, body) = &inbox[0];
        assert_eq!(auth.as_deref(), Some("Bearer mail-key"));
        assert_eq!(body["to"], "ada@example.com");
        assert_eq!(body["from"], "brochures@odaville.com");
        let text = body["text"].as_str().unwrap();
        assert!(text.starts_with("Hi Ada,"));
        assert!(text.contains("https://odaville.com/brochure.pdf"));
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let (url, _inbox) = mail_api(StatusCode::UNPROCESSABLE_ENTITY).await;
        let mailer = HttpMailer::new(config(url)).unwrap();
        let err = mailer.send_brochure(&request()).await.unwrap_err();
        assert!(matches!(err, MailError::Rejected { status: 422, .. }));
    }

    #[tokio::test]
    async fn unreachable_api_is_a_transport_error() {
        let mailer = HttpMailer::new(config("http://127.0.0.1:1/send".to_string())).unwrap();
        let err = mailer.send_brochure(&request()).await.unwrap_err();
        assert!(matches!(err, MailError::Transport(_)));
    }
}
