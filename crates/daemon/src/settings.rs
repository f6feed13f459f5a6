//! Daemon settings
//!
//! Defaults overlaid by `VISITQ_*` environment variables, e.g.
//! `VISITQ_DB_PATH=~/clinic/visitq.db VISITQ_RPC_PORT=9700 visitq`.

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use visitq_api_rpc::server::{DEFAULT_RPC_HOST, DEFAULT_RPC_PORT};
use visitq_core::application::ConflictRetryPolicy;
use visitq_core::domain::EtaConfig;
use visitq_core::port::MaintenanceConfig;

const DEFAULT_DB_PATH: &str = "~/.visitq/visitq.db";
const ENV_PREFIX: &str = "VISITQ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// SQLite file; `~` is expanded, `:memory:` keeps everything in RAM
    pub db_path: String,
    pub rpc_host: String,
    pub rpc_port: u16,

    /// ETA per patient while a queue has no service history
    pub eta_fallback_secs: i64,
    pub eta_window: usize,
    pub eta_decay: f64,

    /// Attempts per operation that lost an optimistic race
    pub conflict_retries: u32,

    /// Days terminal tickets of closed queues are kept
    pub retention_days: i64,
    pub maintenance_interval_hours: u64,

    pub log_format: LogFormat,
}

impl Settings {
    /// Defaults + process environment
    pub fn load() -> Result<Self> {
        Self::build(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    /// Defaults + the given variables only (tests)
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::build(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(Some(vars)),
        )
    }

    fn build(env: Environment) -> Result<Self> {
        let eta = EtaConfig::default();
        let maintenance = MaintenanceConfig::default();

        let settings: Settings = Config::builder()
            .set_default("db_path", DEFAULT_DB_PATH)?
            .set_default("rpc_host", DEFAULT_RPC_HOST)?
            .set_default("rpc_port", i64::from(DEFAULT_RPC_PORT))?
            .set_default("eta_fallback_secs", eta.fallback_service_ms / 1000)?
            .set_default("eta_window", eta.history_window as i64)?
            .set_default("eta_decay", eta.decay)?
            .set_default("conflict_retries", 3)?
            .set_default("retention_days", maintenance.finished_ticket_retention_days)?
            .set_default("maintenance_interval_hours", 24)?
            .set_default("log_format", "pretty")?
            .add_source(env)
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if !(self.eta_decay > 0.0 && self.eta_decay <= 1.0) {
            anyhow::bail!("VISITQ_ETA_DECAY must be in (0, 1], got {}", self.eta_decay);
        }
        if self.eta_window == 0 {
            anyhow::bail!("VISITQ_ETA_WINDOW must be at least 1");
        }
        if self.eta_fallback_secs < 0 || self.retention_days < 0 {
            anyhow::bail!("Durations cannot be negative");
        }
        Ok(())
    }

    /// Database file with `~` expanded; `None` for an in-memory database
    pub fn db_file(&self) -> Option<PathBuf> {
        if self.db_path.contains(":memory:") {
            return None;
        }
        Some(PathBuf::from(shellexpand::tilde(&self.db_path).into_owned()))
    }

    /// `sqlx` URL for `db_path`
    pub fn database_url(&self) -> String {
        match self.db_file() {
            Some(path) => visitq_infra_sqlite::database_url(&path),
            None => "sqlite::memory:".to_string(),
        }
    }

    pub fn eta_config(&self) -> EtaConfig {
        EtaConfig {
            fallback_service_ms: self.eta_fallback_secs.saturating_mul(1000),
            history_window: self.eta_window,
            decay: self.eta_decay,
        }
    }

    pub fn retry_policy(&self) -> ConflictRetryPolicy {
        ConflictRetryPolicy::new(self.conflict_retries, 10)
    }

    pub fn maintenance_config(&self) -> MaintenanceConfig {
        MaintenanceConfig {
            finished_ticket_retention_days: self.retention_days,
            ..MaintenanceConfig::default()
        }
    }
}
