use std::{sync::Arc, time::Instant};

use crate::auth::AuthGate;
use crate::config::AppConfig;
use crate::mailer::{BrochureMailer, HttpMailer};
use crate::store::{
    memory::MemoryDocumentStore, postgres::PostgresDocumentStore, DocumentStore, Record,
    ResourceStore,
};
use crate::upload::UploadPipeline;

/// Everything a handler needs, built once by the composition root.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub documents: Arc<dyn DocumentStore>,
    pub auth: Arc<AuthGate>,
    pub uploads: Arc<UploadPipeline>,
    pub mailer: Option<Arc<dyn BrochureMailer>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        documents: Arc<dyn DocumentStore>,
        uploads: UploadPipeline,
        mailer: Option<Arc<dyn BrochureMailer>>,
    ) -> Self {
        let auth = AuthGate::new(&config.auth, ResourceStore::new(documents.clone()));
        Self {
            config: Arc::new(config),
            documents,
            auth: Arc::new(auth),
            uploads: Arc::new(uploads),
            mailer,
            started_at: Instant::now(),
        }
    }

    /// Select and construct every backend from configuration.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let documents = document_store(&config);
        let uploads = UploadPipeline::from_config(&config.upload).await;

        let mailer: Option<Arc<dyn BrochureMailer>> = match config.mail.clone() {
            Some(mail) => Some(Arc::new(HttpMailer::new(mail)?)),
            None => {
                tracing::warn!("MAIL_API_URL not set. Brochure requests will stay pending.");
                None
            }
        };

        Ok(Self::new(config, documents, uploads, mailer))
    }

    pub fn store<T: Record>(&self) -> ResourceStore<T> {
        ResourceStore::new(self.documents.clone())
    }
}

/// Postgres when configured, otherwise the in-memory store.
pub fn document_store(config: &AppConfig) -> Arc<dyn DocumentStore> {
    match &config.database {
        Some(db) => Arc::new(PostgresDocumentStore::new(db.clone())),
        None => {
            tracing::warn!("DATABASE_URL not set. Using the in-memory document store; data is lost on restart.");
            Arc::new(MemoryDocumentStore::new())
        }
    }
}
