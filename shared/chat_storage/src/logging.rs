//! Tracing subscriber setup for binaries embedding the storage layer

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Environment;

/// Builds the filter from `RUST_LOG`, falling back to the environment's tracing level
fn env_filter(environment: Environment) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(environment.tracing_level().to_string()))
}

/// Installs the global tracing subscriber
///
/// Uses JSON format for staging/production (Datadog), regular format for development.
/// Does nothing if a global subscriber is already installed.
pub fn init(environment: Environment) {
    let filter = env_filter(environment);

    // Configure logging format based on environment
    let _ = match environment {
        Environment::Production | Environment::Staging => {
            fmt().json().with_env_filter(filter).try_init()
        }
        Environment::Development => fmt().with_env_filter(filter).try_init(),
    };
}
