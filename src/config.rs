//! Layered configuration: optional settings file, then `GROUP_INGEST_*`
//! environment variables.
//!
//! Nested keys use `__` in variable names, e.g.
//! `GROUP_INGEST_APP_SETTINGS__DEPENDENCIES__SERVICE_BUS` or
//! `GROUP_INGEST_CONSUMER__MAX_CONCURRENT`.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::bus::TopicSettings;
use crate::consumer::ConsumerOptions;

pub const ENV_PREFIX: &str = "GROUP_INGEST";
pub const DEFAULT_SETTINGS_FILE: &str = "appsettings";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Options {
    #[serde(default)]
    pub app_settings: AppSettings,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub consumer: Consumer,
    #[serde(default)]
    pub http: Http,
    /// Hosting environment name (Development, Production, ...)
    #[serde(default = "default_environment")]
    pub environment: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppSettings {
    #[serde(default)]
    pub connection_strings: ConnectionStrings,
    #[serde(default)]
    pub dependencies: Dependencies,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConnectionStrings {
    /// Record store connection string. Empty or `memory:` selects the
    /// built-in in-memory store.
    #[serde(default)]
    pub database: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Dependencies {
    /// Broker connection string
    #[serde(default = "default_service_bus")]
    pub service_bus: String,
    /// Topic (entity path) to publish to and consume from
    #[serde(default = "default_topic")]
    pub topic: String,
}

impl Default for Dependencies {
    fn default() -> Self {
        Self {
            service_bus: default_service_bus(),
            topic: default_topic(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logging {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Consumer {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_receive_wait_ms")]
    pub receive_wait_ms: u64,
    #[serde(default = "default_lock_duration_ms")]
    pub lock_duration_ms: u64,
    #[serde(default = "default_max_delivery_count")]
    pub max_delivery_count: u32,
    #[serde(default)]
    pub auto_complete: bool,
}

impl Default for Consumer {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            receive_wait_ms: default_receive_wait_ms(),
            lock_duration_ms: default_lock_duration_ms(),
            max_delivery_count: default_max_delivery_count(),
            auto_complete: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Http {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Directory of the built front-end
    #[serde(default = "default_spa_root")]
    pub spa_root: String,
}

impl Default for Http {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            spa_root: default_spa_root(),
        }
    }
}

impl Options {
    /// Load from `appsettings.*` in the working directory and the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(DEFAULT_SETTINGS_FILE)
    }

    /// Load from an optional settings file, overridden by the environment.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(environment_source())
            .build()?
            .try_deserialize()
    }

    /// Parse JSON settings without consulting the environment.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(json, FileFormat::Json))
            .build()?
            .try_deserialize()
    }

    pub fn topic_settings(&self) -> TopicSettings {
        let dependencies = &self.app_settings.dependencies;
        TopicSettings::new(dependencies.service_bus.clone(), dependencies.topic.clone())
    }

    pub fn consumer_options(&self) -> ConsumerOptions {
        ConsumerOptions::default()
            .with_max_concurrent(self.consumer.max_concurrent)
            .with_auto_complete(self.consumer.auto_complete)
            .with_receive_wait(Duration::from_millis(self.consumer.receive_wait_ms))
    }

    pub fn lock_duration(&self) -> Duration {
        Duration::from_millis(self.consumer.lock_duration_ms)
    }

    #[cfg(feature = "http")]
    pub fn host_environment(&self) -> crate::web::HostEnvironment {
        crate::web::HostEnvironment::parse(&self.environment)
    }
}

fn environment_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn default_environment() -> String {
    "Production".to_string()
}

fn default_service_bus() -> String {
    "Endpoint=memory://localhost/".to_string()
}

fn default_topic() -> String {
    "groups".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_concurrent() -> usize {
    1
}

fn default_receive_wait_ms() -> u64 {
    1000
}

fn default_lock_duration_ms() -> u64 {
    30_000
}

fn default_max_delivery_count() -> u32 {
    10
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_spa_root() -> String {
    "client/build".to_string()
}
