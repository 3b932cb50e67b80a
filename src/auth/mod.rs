/*!
 * Authentication
 * Signed bearer tokens, bcrypt password hashing, login and the one-time
 * admin bootstrap.
 */
pub mod middleware;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AppError;
use crate::models::principal::NewPrincipal;
use crate::models::{Principal, PrincipalSummary};
use crate::store::{Filter, ResourceStore, Sort, StoreError};

pub const MIN_PASSWORD_LENGTH: usize = 8;
/// Lowest bcrypt work factor the service will hash with.
pub const MIN_BCRYPT_COST: u32 = 10;

// ============================================================================
// Tokens
// ============================================================================

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is exact: a token is dead the second its 24 hours are up.
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, principal: &Principal) -> Result<String, AppError> {
        self.issue_at(principal, Utc::now())
    }

    pub fn issue_at(&self, principal: &Principal, issued_at: DateTime<Utc>) -> Result<String, AppError> {
        let claims = Claims {
            sub: principal.id.to_string(),
            username: principal.username.clone(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("failed to sign token: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Token verification failed: {}", e);
                AppError::InvalidToken
            })
    }
}

// ============================================================================
// Passwords
// ============================================================================

/// bcrypt is CPU-bound; keep it off the async executor.
pub async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("password hashing task failed: {}", e)))?
        .map_err(|e| AppError::Internal(format!("failed to hash password: {}", e)))
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("password verification task failed: {}", e)))?;
    match verified {
        Ok(matches) => Ok(matches),
        Err(e) => {
            tracing::warn!("Stored password hash is unusable: {}", e);
            Ok(false)
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

// ============================================================================
// Gate
// ============================================================================

fn admin_exists() -> AppError {
    AppError::Forbidden("Admin user already exists".to_string())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: PrincipalSummary,
}

pub struct AuthGate {
    tokens: TokenIssuer,
    principals: ResourceStore<Principal>,
    bcrypt_cost: u32,
    // Compared against when the username is unknown so both failure paths cost the same.
    dummy_hash: Arc<OnceCell<String>>,
}

impl AuthGate {
    pub fn new(config: &AuthConfig, principals: ResourceStore<Principal>) -> Self {
        Self {
            tokens: TokenIssuer::new(&config.jwt_secret, config.token_ttl_hours),
            principals,
            bcrypt_cost: config.bcrypt_cost,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn principals(&self) -> &ResourceStore<Principal> {
        &self.principals
    }

    /// Resolve the principal behind an `Authorization` header value.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<Principal, AppError> {
        let token = header.and_then(bearer_token).ok_or(AppError::Unauthenticated)?;
        let claims = self.tokens.verify(token)?;
        let id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)?;

        match self.principals.get(id).await {
            Ok(principal) => Ok(principal),
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(principal_id = %id, "Valid token for a principal that no longer exists");
                Err(AppError::Unauthenticated)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<Principal>, AppError> {
        let matches = self
            .principals
            .list(&Filter::new().with("username", username), &Sort::default())
            .await?;
        Ok(matches.into_iter().next())
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, AppError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AppError::validation("Username and password are required"));
        }

        let principal = self.find_by_username(username).await?;
        let hash = match &principal {
            Some(p) => p.password_hash.clone(),
            None => self.dummy_hash().await?,
        };
        let matches = verify_password(password.to_string(), hash).await?;

        let principal = match principal {
            Some(p) if matches => p,
            _ => {
                tracing::warn!("Failed login attempt");
                return Err(AppError::InvalidCredentials);
            }
        };

        let token = self.tokens.issue(&principal)?;
        tracing::info!(username = %principal.username, "Login successful");
        Ok(LoginResponse {
            token,
            user: principal.summary(),
        })
    }

    /// Bootstrap the single admin. Refused once any principal exists.
    pub async fn create_admin(&self, username: &str, password: &str) -> Result<PrincipalSummary, AppError> {
        // Skip the bcrypt work when the answer is already known.
        if self.principals.count().await? > 0 {
            return Err(admin_exists());
        }
        let draft = self.new_principal(username, password).await?;
        let principal = self
            .principals
            .create_first(&draft)
            .await?
            .ok_or_else(admin_exists)?;
        tracing::info!(username = %principal.username, "Admin user created");
        Ok(principal.summary())
    }

    /// Create a principal without the bootstrap guard. Used by the operator CLI.
    pub async fn create_principal(&self, username: &str, password: &str) -> Result<Principal, AppError> {
        let draft = self.new_principal(username, password).await?;
        let principal = self.principals.create(&draft).await?;
        tracing::info!(username = %principal.username, "Admin user created");
        Ok(principal)
    }

    async fn new_principal(&self, username: &str, password: &str) -> Result<NewPrincipal, AppError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AppError::validation("username is required"));
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AppError::validation(format!(
                "Password must be at least {} characters long",
                MIN_PASSWORD_LENGTH
            )));
        }

        let password_hash = hash_password(password.to_string(), self.bcrypt_cost).await?;
        Ok(NewPrincipal {
            username: username.to_string(),
            password_hash,
            is_admin: true,
        })
    }

    /// Replace a principal's password.
    pub async fn set_password(&self, principal: &Principal, password: &str) -> Result<(), AppError> {
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AppError::validation(format!(
                "Password must be at least {} characters long",
                MIN_PASSWORD_LENGTH
            )));
        }
        let password_hash = hash_password(password.to_string(), self.bcrypt_cost).await?;
        self.principals
            .update(principal.id, &serde_json::json!({ "passwordHash": password_hash }))
            .await?;
        Ok(())
    }

    async fn dummy_hash(&self) -> Result<String, AppError> {
        let cost = self.bcrypt_cost;
        self.dummy_hash
            .get_or_try_init(|| async move {
                let throwaway = Alphanumeric.sample_string(&mut rand::rng(), 32);
                hash_password(throwaway, cost).await
            })
            .await
            .cloned()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::memory::MemoryDocumentStore;

    /// Low bcrypt cost keeps the suite fast.
    pub(crate) fn test_auth_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".to_string(),
            token_ttl_hours: 24,
            bcrypt_cost: 4,
        }
    }

    fn gate() -> AuthGate {
        let documents = Arc::new(MemoryDocumentStore::new());
        AuthGate::new(&test_auth_config(), ResourceStore::new(documents))
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("bearer  abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }

    #[tokio::test]
    async fn create_admin_then_login() {
        let gate = gate();
        let user = gate.create_admin("admin", "admin123").await.unwrap();
        assert_eq!(user.username, "admin");

        let login = gate.login("admin", "admin123").await.unwrap();
        assert_eq!(login.user, user);

        let principal = gate
            .authenticate(Some(&format!("Bearer {}", login.token)))
            .await
            .unwrap();
        assert_eq!(principal.id, user.id);
    }

    #[tokio::test]
    async fn second_admin_is_forbidden() {
        let gate = gate();
        gate.create_admin("admin", "admin123").await.unwrap();
        let err = gate.create_admin("other", "password99").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(ref m) if m == "Admin user already exists"));
    }

    #[tokio::test]
    async fn concurrent_bootstraps_create_one_admin() {
        let gate = gate();
        let (first, second) = tokio::join!(
            gate.create_admin("admin", "admin123"),
            gate.create_admin("other", "password99"),
        );

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(AppError::Forbidden(m)) if m == "Admin user already exists")));
        assert_eq!(gate.principals().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let gate = gate();
        gate.create_principal("admin", "admin123").await.unwrap();
        let err = gate.create_principal("admin", "password99").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(gate.principals().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn short_passwords_are_rejected() {
        let err = gate().create_admin("admin", "short").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_the_same() {
        let gate = gate();
        gate.create_admin("admin", "admin123").await.unwrap();

        let wrong_password = gate.login("admin", "nope-nope").await.unwrap_err();
        let unknown_user = gate.login("ghost", "admin123").await.unwrap_err();
        assert!(matches!(wrong_password, AppError::InvalidCredentials));
        assert!(matches!(unknown_user, AppError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[tokio::test]
    async fn missing_or_garbled_credentials() {
        let gate = gate();
        assert!(matches!(
            gate.authenticate(None).await,
            Err(AppError::Unauthenticated)
        ));
        assert!(matches!(
            gate.authenticate(Some("Token abc")).await,
            Err(AppError::Unauthenticated)
        ));
        assert!(matches!(
            gate.authenticate(Some("Bearer not.a.jwt")).await,
            Err(AppError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn token_expires_after_exactly_a_day() {
        let gate = gate();
        gate.create_admin("admin", "admin123").await.unwrap();
        let principal = gate.find_by_username("admin").await.unwrap().unwrap();

        let stale = gate
            .tokens()
            .issue_at(&principal, Utc::now() - Duration::hours(24) - Duration::seconds(1))
            .unwrap();
        assert!(matches!(
            gate.authenticate(Some(&format!("Bearer {}", stale))).await,
            Err(AppError::InvalidToken)
        ));

        let fresh = gate
            .tokens()
            .issue_at(&principal, Utc::now() - Duration::hours(23))
            .unwrap();
        assert!(gate
            .authenticate(Some(&format!("Bearer {}", fresh)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn token_signed_with_another_secret_is_invalid() {
        let gate = gate();
        let principal = gate.create_principal("admin", "admin123").await.unwrap();
        let foreign = TokenIssuer::new("some-other-secret", 24).issue(&principal).unwrap();
        assert!(matches!(
            gate.authenticate(Some(&format!("Bearer {}", foreign))).await,
            Err(AppError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn token_for_deleted_principal_is_unauthenticated() {
        let gate = gate();
        let principal = gate.create_principal("admin", "admin123").await.unwrap();
        let token = gate.tokens().issue(&principal).unwrap();
        gate.principals().delete(principal.id).await.unwrap();
        assert!(matches!(
            gate.authenticate(Some(&format!("Bearer {}", token))).await,
            Err(AppError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn set_password_changes_login() {
        let gate = gate();
        let principal = gate.create_principal("admin", "admin123").await.unwrap();
        gate.set_password(&principal, "brand-new-pass").await.unwrap();
        assert!(gate.login("admin", "admin123").await.is_err());
        assert!(gate.login("admin", "brand-new-pass").await.is_ok());
    }
}
