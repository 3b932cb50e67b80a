//! Operator CLI for the admin account and one-off data fixes.
//! Reads the same environment (and `.env`) as the server.
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use odaville_backend::{
    admin,
    auth::{self, AuthGate},
    config::{AppConfig, UploadTarget},
    models::{BlogPost, GalleryItem, Product},
    store::{
        postgres::PostgresDocumentStore, DocumentStore, Filter, Record, ResourceStore, Sort,
    },
};

#[derive(Parser)]
#[command(name = "manage-admin")]
#[command(about = "Manage the Odaville admin account and stored data")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Create the admin user (only when none exists)")]
    Create {
        #[arg(long, default_value = "admin")]
        username: String,
        #[arg(long, help = "Password (a random one is generated and printed if omitted)")]
        password: Option<String>,
    },

    #[command(about = "List existing admin users")]
    Check,

    #[command(about = "Delete every admin user, then create a fresh one")]
    Reset {
        #[arg(long, default_value = "admin")]
        username: String,
        #[arg(long, help = "Password (a random one is generated and printed if omitted)")]
        password: Option<String>,
    },

    #[command(about = "Change an admin user's password")]
    SetPassword {
        #[arg(help = "Username")]
        username: String,
        #[arg(long, help = "Password (a random one is generated and printed if omitted)")]
        password: Option<String>,
    },

    #[command(about = "Delete one admin user")]
    Delete {
        #[arg(help = "Username")]
        username: String,
    },

    #[command(about = "Print a bcrypt hash for a password")]
    HashPassword {
        password: String,
        #[arg(long, default_value_t = auth::MIN_BCRYPT_COST, help = "bcrypt cost (at least 10)")]
        cost: u32,
    },

    #[command(about = "Point legacy /uploads/ image URLs at the configured object store")]
    RewriteLocalUrls {
        collection: Collection,
        #[arg(long, help = "Only report what would change")]
        dry_run: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Collection {
    Products,
    Gallery,
    Blog,
}

impl Collection {
    fn name(self) -> &'static str {
        match self {
            Collection::Products => Product::COLLECTION,
            Collection::Gallery => GalleryItem::COLLECTION,
            Collection::Blog => BlogPost::COLLECTION,
        }
    }
}

/// Configuration, store and auth for the commands that touch data.
struct Operator {
    config: AppConfig,
    documents: Arc<dyn DocumentStore>,
    auth: AuthGate,
}

impl Operator {
    fn load() -> anyhow::Result<Self> {
        let config = AppConfig::from_env().context("invalid configuration")?;
        let Some(db) = config.database.clone() else {
            bail!("DATABASE_URL must be set; manage-admin works on the real document store");
        };
        tracing::debug!(database = %db.redacted_url(), "Using Postgres document store");
        let documents: Arc<dyn DocumentStore> = Arc::new(PostgresDocumentStore::new(db));
        let auth = AuthGate::new(&config.auth, ResourceStore::new(documents.clone()));
        Ok(Self {
            config,
            documents,
            auth,
        })
    }
}

/// Work factor for `hash-password`, never below the service minimum.
fn hash_cost(requested: u32) -> u32 {
    if requested < auth::MIN_BCRYPT_COST {
        tracing::warn!(
            requested,
            minimum = auth::MIN_BCRYPT_COST,
            "bcrypt cost below the minimum; using the minimum"
        );
    }
    requested.max(auth::MIN_BCRYPT_COST)
}

fn password_or_generated(password: Option<String>) -> (String, bool) {
    match password {
        Some(password) => (password, false),
        None => (admin::generate_password(), true),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "manage_admin=info,odaville_backend=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::HashPassword { password, cost } => {
            let hash = auth::hash_password(password, hash_cost(cost)).await?;
            println!("{}", hash);
        }
        Command::Create { username, password } => {
            let operator = Operator::load()?;
            let (password, generated) = password_or_generated(password);
            let user = operator.auth.create_admin(&username, &password).await?;
            println!("Admin user created: {} ({})", user.username, user.id);
            if generated {
                println!("Generated password: {}", password);
            }
        }
        Command::Check => {
            let operator = Operator::load()?;
            let principals = operator.auth.principals().list(&Filter::new(), &Sort::default()).await?;
            if principals.is_empty() {
                println!("No admin users exist. Run `manage-admin create`.");
            }
            for principal in principals {
                println!(
                    "{}\t{}\tcreated {}",
                    principal.username,
                    principal.id,
                    principal.created_at.to_rfc3339()
                );
            }
        }
        Command::Reset { username, password } => {
            let operator = Operator::load()?;
            let (password, generated) = password_or_generated(password);
            let principal = admin::reset_principals(&operator.auth, &username, &password).await?;
            println!("Admin users reset; {} is now the only admin", principal.username);
            if generated {
                println!("Generated password: {}", password);
            }
        }
        Command::SetPassword { username, password } => {
            let operator = Operator::load()?;
            let Some(principal) = operator.auth.find_by_username(&username).await? else {
                bail!("No admin user named {}", username);
            };
            let (password, generated) = password_or_generated(password);
            operator.auth.set_password(&principal, &password).await?;
            println!("Password changed for {}", principal.username);
            if generated {
                println!("Generated password: {}", password);
            }
        }
        Command::Delete { username } => {
            let operator = Operator::load()?;
            let Some(principal) = operator.auth.find_by_username(&username).await? else {
                bail!("No admin user named {}", username);
            };
            operator.auth.principals().delete(principal.id).await?;
            println!("Deleted admin user {}", principal.username);
        }
        Command::RewriteLocalUrls {
            collection,
            dry_run,
        } => {
            let operator = Operator::load()?;
            if !matches!(operator.config.upload.target, UploadTarget::S3(_)) {
                bail!("rewrite-local-urls needs UPLOAD_BACKEND=s3 and the bucket settings");
            }
            let prefix = operator.config.upload.public_url_prefix();
            let rewrites =
                admin::rewrite_local_urls(operator.documents.as_ref(), collection.name(), &prefix, dry_run)
                    .await?;
            for rewrite in &rewrites {
                println!("{}\t{} -> {}", rewrite.id, rewrite.from, rewrite.to);
            }
            let verb = if dry_run { "would be rewritten" } else { "rewritten" };
            println!("{} image URL(s) {} in {}", rewrites.len(), verb, collection.name());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_cost_is_clamped_to_the_minimum() {
        assert_eq!(hash_cost(4), 10);
        assert_eq!(hash_cost(10), 10);
        assert_eq!(hash_cost(12), 12);
    }

    #[test]
    fn hash_password_defaults_to_the_minimum_cost() {
        let cli = Cli::try_parse_from(["manage-admin", "hash-password", "secret"]).unwrap();
        let Command::HashPassword { cost, .. } = cli.command else {
            panic!("parsed the wrong command");
        };
        assert_eq!(cost, auth::MIN_BCRYPT_COST);
    }
}
