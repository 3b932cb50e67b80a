/*!
 * Logging Module
 * Console plus daily-rolling files under `logs/`. JSON in production,
 * human-readable everywhere else.
 */
pub mod middleware;

use std::io;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::Environment;

const LOG_DIR: &str = "logs";

/// Background writer guards. Dropping them flushes and stops the writers,
/// so the caller holds them until shutdown.
#[must_use = "dropping the guards stops log output"]
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

/// `LOG_LEVEL`, or `info` in production and `debug` otherwise.
fn default_level(environment: Environment) -> String {
    std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
        if environment.is_production() {
            "info".to_string()
        } else {
            "debug".to_string()
        }
    })
}

/// Initialize the logging system
pub fn init(environment: Environment) -> LogGuards {
    let is_production = environment.is_production();

    if let Err(e) = std::fs::create_dir_all(LOG_DIR) {
        eprintln!("Could not create {} directory: {}", LOG_DIR, e);
    }

    // File appender for all logs
    let (file_writer, file_guard) = non_blocking(rolling::daily(LOG_DIR, "app.log"));
    // File appender for errors only
    let (error_writer, error_guard) = non_blocking(rolling::daily(LOG_DIR, "error.log"));
    let (console_writer, console_guard) = non_blocking(io::stdout());

    let level = default_level(environment);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "odaville_backend={level},manage_admin={level},tower_http=debug,axum=info,sqlx=warn"
        ))
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if is_production {
        let file_layer = fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        let console_layer = fmt::layer()
            .json()
            .with_writer(console_writer)
            .with_target(false);

        let error_layer = fmt::layer()
            .json()
            .with_writer(error_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(tracing_subscriber::filter::LevelFilter::ERROR);

        subscriber
            .with(file_layer)
            .with(error_layer)
            .with(console_layer)
            .init();
    } else {
        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false);

        let console_layer = fmt::layer()
            .with_writer(console_writer)
            .with_target(true)
            .pretty()
            .with_thread_ids(false)
            .with_thread_names(false);

        let error_layer = fmt::layer()
            .with_writer(error_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_filter(tracing_subscriber::filter::LevelFilter::ERROR);

        subscriber
            .with(file_layer)
            .with(error_layer)
            .with(console_layer)
            .init();
    }

    tracing::info!("Logging initialized for {} environment", environment.as_str());

    LogGuards {
        _guards: vec![file_guard, error_guard, console_guard],
    }
}
