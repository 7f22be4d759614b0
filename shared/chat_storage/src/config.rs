//! Environment configuration for different deployment stages

use std::env;
use std::time::Duration;

use aws_config::{retry::RetryConfig, timeout::TimeoutConfig, BehaviorVersion};
use tracing::Level;

use crate::batch::BatchConfig;
use crate::table::TableConfig;

/// Application environment configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Production environment
    Production,
    /// Staging environment
    Staging,
    /// Development environment (uses `LocalStack`)
    Development,
}

fn duration_ms_from_env(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|val| val.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}

impl Environment {
    /// Creates an Environment from the `APP_ENV` environment variable
    ///
    /// Defaults to development when `APP_ENV` is not set.
    ///
    /// # Panics
    ///
    /// Panics if `APP_ENV` contains an invalid value
    #[must_use]
    pub fn from_env() -> Self {
        let env = env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .trim()
            .to_lowercase();

        match env.as_str() {
            "production" => Self::Production,
            "staging" => Self::Staging,
            "development" => Self::Development,
            _ => panic!("Invalid environment: {env}"),
        }
    }

    /// Returns the endpoint URL to use for AWS services
    #[must_use]
    pub const fn override_aws_endpoint_url(&self) -> Option<&str> {
        match self {
            // Regular AWS endpoints for production and staging
            Self::Production | Self::Staging => None,
            // LocalStack endpoint for development
            Self::Development => Some("http://localhost:4566"),
        }
    }

    /// AWS configuration with retry and timeout settings
    pub async fn aws_config(&self) -> aws_config::SdkConfig {
        let retry_config = RetryConfig::standard()
            .with_max_attempts(3)
            .with_initial_backoff(Duration::from_millis(50));

        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(30))
            .build();

        let mut config_builder = aws_config::load_defaults(BehaviorVersion::latest())
            .await
            .to_builder()
            .retry_config(retry_config)
            .timeout_config(timeout_config);

        if let Some(endpoint_url) = self.override_aws_endpoint_url() {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }

        config_builder.build()
    }

    /// AWS `DynamoDB` service configuration
    pub async fn dynamodb_client_config(&self) -> aws_sdk_dynamodb::Config {
        let aws_config = self.aws_config().await;
        (&aws_config).into()
    }

    /// Names of the chat table and its secondary indexes
    ///
    /// # Panics
    ///
    /// Panics if the `DYNAMODB_TABLE_NAME` environment variable is not set outside development
    #[must_use]
    pub fn table_config(&self) -> TableConfig {
        let table_name = match self {
            Self::Production | Self::Staging => env::var("DYNAMODB_TABLE_NAME")
                .expect("DYNAMODB_TABLE_NAME environment variable is not set"),
            Self::Development => {
                env::var("DYNAMODB_TABLE_NAME").unwrap_or_else(|_| "chat-table".to_string())
            }
        };

        let mut config = TableConfig::new(table_name);
        if let Ok(index_one_name) = env::var("DYNAMODB_INDEX_ONE_NAME") {
            config.index_one_name = index_one_name;
        }
        if let Ok(index_two_name) = env::var("DYNAMODB_INDEX_TWO_NAME") {
            config.index_two_name = index_two_name;
        }

        config
    }

    /// Chunking and backoff settings for batch operations
    ///
    /// Backoffs can be overridden in milliseconds with `BATCH_INITIAL_BACKOFF_MS` and
    /// `BATCH_MAX_BACKOFF_MS`; unparsable values fall back to the defaults.
    #[must_use]
    pub fn batch_config(&self) -> BatchConfig {
        let defaults = BatchConfig::default();

        BatchConfig {
            initial_backoff: duration_ms_from_env("BATCH_INITIAL_BACKOFF_MS")
                .unwrap_or(defaults.initial_backoff),
            max_backoff: duration_ms_from_env("BATCH_MAX_BACKOFF_MS")
                .unwrap_or(defaults.max_backoff),
            ..defaults
        }
    }

    /// Returns the default log level for the environment
    ///
    /// `TRACING_LEVEL` overrides the default when it names a valid level.
    #[must_use]
    pub fn tracing_level(&self) -> Level {
        env::var("TRACING_LEVEL")
            .ok()
            .and_then(|val| val.parse::<Level>().ok())
            .unwrap_or(match self {
                Self::Production | Self::Staging => Level::INFO,
                Self::Development => Level::DEBUG,
            })
    }
}
