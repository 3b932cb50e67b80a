/*!
 * Configuration
 * Everything the service reads from the environment, loaded once at startup.
 */
use std::{path::PathBuf, str::FromStr};

use anyhow::{bail, Result};

use crate::auth::MIN_BCRYPT_COST;
use crate::store::postgres::DbConfig;

/// Secret used when JWT_SECRET is unset. Refused in production.
pub const DEFAULT_JWT_SECRET: &str = "odaville-dev-secret-change-in-production";

/// 10 MiB, the cap the admin panel has always been built against.
pub const DEFAULT_UPLOAD_MAX_BYTES: usize = 10 * 1024 * 1024;

const PRODUCTION_ORIGINS: &[&str] = &[
    "https://odaville.com",
    "https://www.odaville.com",
    "https://admin.odaville.com",
    "https://odaville.vercel.app",
];

const DEVELOPMENT_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:5000",
    "http://localhost:5173",
    "http://127.0.0.1:5000",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        match std::env::var("ENVIRONMENT").as_deref() {
            Ok("production") => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            token_ttl_hours: 24,
            bcrypt_cost: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    /// Unlisted origins get no Access-Control-Allow-Origin instead of `*`.
    pub strict: bool,
}

impl CorsConfig {
    fn defaults_for(environment: Environment) -> Vec<String> {
        let origins = if environment.is_production() {
            PRODUCTION_ORIGINS
        } else {
            DEVELOPMENT_ORIGINS
        };
        origins.iter().map(|o| o.to_string()).collect()
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Self::defaults_for(Environment::Development),
            strict: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Public URL prefix objects are reachable under, without trailing slash.
    pub public_url: String,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub enum UploadTarget {
    LocalDisk {
        root: PathBuf,
        public_base_url: String,
    },
    S3(S3Config),
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub target: UploadTarget,
    pub max_bytes: usize,
}

impl UploadConfig {
    /// Root directory to serve under `/uploads` when files live on local disk.
    pub fn local_root(&self) -> Option<&PathBuf> {
        match &self.target {
            UploadTarget::LocalDisk { root, .. } => Some(root),
            UploadTarget::S3(_) => None,
        }
    }

    /// URL prefix that uploaded keys are appended to.
    pub fn public_url_prefix(&self) -> String {
        match &self.target {
            UploadTarget::LocalDisk {
                public_base_url, ..
            } => format!("{}/uploads", public_base_url.trim_end_matches('/')),
            UploadTarget::S3(s3) => s3.public_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            target: UploadTarget::LocalDisk {
                root: PathBuf::from("uploads"),
                public_base_url: "http://localhost:5000".to_string(),
            },
            max_bytes: DEFAULT_UPLOAD_MAX_BYTES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub from: String,
    pub brochure_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    /// `None` runs on the in-memory document store (development only).
    pub database: Option<DbConfig>,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
    pub upload: UploadConfig,
    pub mail: Option<MailConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            host: "127.0.0.1".to_string(),
            port: 5000,
            database: None,
            auth: AuthConfig::default(),
            cors: CorsConfig::default(),
            upload: UploadConfig::default(),
            mail: None,
        }
    }
}

impl AppConfig {
    /// Read and validate the full configuration.
    pub fn from_env() -> Result<Self> {
        let environment = Environment::from_env();
        let host = env_or("HOST", "127.0.0.1".to_string());
        let port = env_or("PORT", 5000u16);

        let auth = AuthConfig {
            jwt_secret: env_string("JWT_SECRET").unwrap_or_else(|| DEFAULT_JWT_SECRET.to_string()),
            token_ttl_hours: 24,
            bcrypt_cost: env_or("BCRYPT_COST", MIN_BCRYPT_COST).max(MIN_BCRYPT_COST),
        };

        let cors = CorsConfig {
            allowed_origins: env_string("ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().trim_end_matches('/').to_string())
                        .filter(|o| !o.is_empty())
                        .collect::<Vec<_>>()
                })
                .filter(|origins| !origins.is_empty())
                .unwrap_or_else(|| CorsConfig::defaults_for(environment)),
            strict: env_or("CORS_STRICT", false),
        };

        let config = Self {
            environment,
            database: DbConfig::from_env(),
            upload: upload_from_env(environment, port)?,
            mail: mail_from_env(),
            host,
            port,
            auth,
            cors,
        };
        config.validate()?;
        Ok(config)
    }

    /// Production refuses to start with settings that only make sense on a laptop.
    pub fn validate(&self) -> Result<()> {
        if !self.environment.is_production() {
            return Ok(());
        }
        if self.auth.jwt_secret.is_empty() || self.auth.jwt_secret == DEFAULT_JWT_SECRET {
            bail!("JWT_SECRET must be set to a secure, unique value in production");
        }
        if self.database.is_none() {
            bail!("DATABASE_URL must be set in production");
        }
        if matches!(self.upload.target, UploadTarget::LocalDisk { .. }) {
            bail!("UPLOAD_BACKEND=local is not allowed in production; configure the S3 bucket");
        }
        Ok(())
    }
}

fn upload_from_env(environment: Environment, port: u16) -> Result<UploadConfig> {
    let max_bytes = env_or("UPLOAD_MAX_BYTES", DEFAULT_UPLOAD_MAX_BYTES);
    let default_backend = if environment.is_production() {
        "s3"
    } else {
        "local"
    };
    let backend = env_or("UPLOAD_BACKEND", default_backend.to_string());

    let target = match backend.to_lowercase().as_str() {
        "s3" => {
            let (Some(bucket), Some(region)) =
                (env_string("AWS_BUCKET_NAME"), env_string("AWS_REGION"))
            else {
                bail!("UPLOAD_BACKEND=s3 requires AWS_BUCKET_NAME and AWS_REGION");
            };
            let public_url = env_string("S3_PUBLIC_URL")
                .unwrap_or_else(|| format!("https://{}.s3.{}.amazonaws.com", bucket, region));
            UploadTarget::S3(S3Config {
                bucket,
                region,
                public_url,
                connect_timeout_secs: env_or("STORE_CONNECT_TIMEOUT", 10u64),
            })
        }
        "local" => UploadTarget::LocalDisk {
            root: PathBuf::from(env_or("UPLOAD_DIR", "uploads".to_string())),
            public_base_url: env_string("PUBLIC_BASE_URL")
                .unwrap_or_else(|| format!("http://localhost:{}", port)),
        },
        other => bail!("unknown UPLOAD_BACKEND '{}': expected 's3' or 'local'", other),
    };

    Ok(UploadConfig { target, max_bytes })
}

fn mail_from_env() -> Option<MailConfig> {
    let api_url = env_string("MAIL_API_URL")?;
    Some(MailConfig {
        api_url,
        api_key: env_string("MAIL_API_KEY"),
        from: env_string("MAIL_FROM").unwrap_or_else(|| "Odaville <no-reply@odaville.com>".to_string()),
        brochure_url: env_string("BROCHURE_URL"),
    })
}

/// Non-empty environment variable.
pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parsed environment variable, falling back to `default` when unset or unparsable.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env_string(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid {} value '{}', using default", key, raw);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn production() -> AppConfig {
        AppConfig {
            environment: Environment::Production,
            database: Some(DbConfig {
                url: "postgres://localhost/odaville".to_string(),
                ..DbConfig::default()
            }),
            auth: AuthConfig {
                jwt_secret: "a-real-secret".to_string(),
                ..AuthConfig::default()
            },
            upload: UploadConfig {
                target: UploadTarget::S3(S3Config {
                    bucket: "odaville-media".to_string(),
                    region: "eu-west-2".to_string(),
                    public_url: "https://odaville-media.s3.eu-west-2.amazonaws.com".to_string(),
                    connect_timeout_secs: 10,
                }),
                max_bytes: DEFAULT_UPLOAD_MAX_BYTES,
            },
            ..AppConfig::default()
        }
    }

    #[test]
    fn development_defaults_validate() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn production_with_real_settings_validates() {
        assert!(production().validate().is_ok());
    }

    #[test]
    fn production_rejects_default_secret() {
        let mut config = production();
        config.auth.jwt_secret = DEFAULT_JWT_SECRET.to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn production_rejects_local_uploads() {
        let mut config = production();
        config.upload = UploadConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn production_requires_database() {
        let mut config = production();
        config.database = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn public_url_prefix_per_target() {
        assert_eq!(
            UploadConfig::default().public_url_prefix(),
            "http://localhost:5000/uploads"
        );
        assert_eq!(
            production().upload.public_url_prefix(),
            "https://odaville-media.s3.eu-west-2.amazonaws.com"
        );
    }
}
