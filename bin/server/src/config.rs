//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables.
//!
//! See [`SchedulerConfig`] for the `SCHEDULER__*` engine settings.

use event_triggers_scheduler::SchedulerConfig;
use serde::Deserialize;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    /// Without one, triggers and history are kept in memory only.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Address the HTTP listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Size of the database connection pool.
    #[serde(default = "default_max_db_connections")]
    pub max_db_connections: u32,

    /// Timer engine configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_max_db_connections() -> u32 {
    5
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration values are present but invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(
            config::Environment::default()
                .separator("__")
                .try_parsing(true),
        )
    }

    fn from_source(
        source: impl config::Source + Send + Sync + 'static,
    ) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_triggers_scheduler::{LogRetention, OverduePolicy};
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        config::Environment::default()
            .separator("__")
            .try_parsing(true)
            .source(Some(source))
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = ServerConfig::from_source(env(&[])).expect("defaults load");

        assert!(config.database_url.is_none());
        assert_eq!(config.listen_addr, "127.0.0.1:8000");
        assert_eq!(config.max_db_connections, 5);
        assert_eq!(config.scheduler.max_concurrent_dispatches, 16);
        assert_eq!(config.scheduler.log_retention, LogRetention::KeepHistory);
    }

    #[test]
    fn nested_scheduler_settings_are_read() {
        let config = ServerConfig::from_source(env(&[
            ("DATABASE_URL", "postgres://localhost/triggers"),
            ("MAX_DB_CONNECTIONS", "12"),
            ("SCHEDULER__MAX_CONCURRENT_DISPATCHES", "4"),
            ("SCHEDULER__OVERDUE_ONE_SHOT", "drop"),
            ("SCHEDULER__LOG_RETENTION", "cascade"),
        ]))
        .expect("config loads");

        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/triggers")
        );
        assert_eq!(config.max_db_connections, 12);
        assert_eq!(config.scheduler.max_concurrent_dispatches, 4);
        assert_eq!(config.scheduler.overdue_one_shot, OverduePolicy::Drop);
        assert_eq!(config.scheduler.log_retention, LogRetention::Cascade);
    }
}
