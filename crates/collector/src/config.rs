//! Engine configuration
//!
//! Layered as defaults, then an optional `rightsizer.toml`, then
//! `RIGHTSIZER_*` environment variables (`__` separates sections), then
//! command-line flags.

use anyhow::{Context, Result};
use clap::Parser;
use collector_lib::config::EngineConfig;
use collector_lib::source::KubeOptions;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Collect workload usage and produce rightsizing recommendations
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "rightsizer", version, about)]
pub struct Cli {
    /// Configuration file
    #[arg(long, env = "RIGHTSIZER_CONFIG", default_value = "rightsizer.toml")]
    pub config: PathBuf,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Seconds between cycles in continuous mode
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Only collect from this namespace
    #[arg(long, short = 'n')]
    pub namespace: Option<String>,

    /// Kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,

    /// Path to a kubeconfig file
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// SQLite database path, or `:memory:`
    #[arg(long)]
    pub database: Option<String>,

    /// Port of the reporting API
    #[arg(long)]
    pub port: Option<u16>,

    /// Do not start the reporting API
    #[arg(long)]
    pub no_api: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KubernetesSettings {
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisSettings {
    pub window_days: u32,
    pub collection_interval_secs: u64,
    pub cpu_cost_per_core: f64,
    pub memory_cost_per_gib: f64,
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    pub port: u16,
}

/// Resolved configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    #[serde(default)]
    pub kubernetes: KubernetesSettings,
    pub analysis: AnalysisSettings,
    pub api: ApiSettings,
}

impl Settings {
    /// Load configuration; any invalid value is fatal
    pub fn load(cli: &Cli) -> Result<Self> {
        let defaults = EngineConfig::default();

        let builder = config::Config::builder()
            .set_default("database.path", "rightsizer.db")?
            .set_default("analysis.window_days", defaults.window_days as i64)?
            .set_default(
                "analysis.collection_interval_secs",
                defaults.collection_interval.as_secs() as i64,
            )?
            .set_default("analysis.cpu_cost_per_core", defaults.cpu_cost_per_core)?
            .set_default("analysis.memory_cost_per_gib", defaults.memory_cost_per_gib)?
            .set_default("analysis.concurrency", defaults.concurrency as i64)?
            .set_default("api.port", 8080)?
            .add_source(config::File::from(cli.config.clone()).required(false))
            .add_source(
                config::Environment::with_prefix("RIGHTSIZER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.path", cli.database.clone())?
            .set_override_option("kubernetes.namespace", cli.namespace.clone())?
            .set_override_option("kubernetes.context", cli.context.clone())?
            .set_override_option(
                "kubernetes.kubeconfig",
                cli.kubeconfig
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
            )?
            .set_override_option(
                "analysis.collection_interval_secs",
                cli.interval.map(|s| s as i64),
            )?
            .set_override_option("api.port", cli.port.map(i64::from))?;

        let settings: Settings = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        settings
            .engine()
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

        Ok(settings)
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            window_days: self.analysis.window_days,
            cpu_cost_per_core: self.analysis.cpu_cost_per_core,
            memory_cost_per_gib: self.analysis.memory_cost_per_gib,
            concurrency: self.analysis.concurrency,
            collection_interval: Duration::from_secs(self.analysis.collection_interval_secs),
        }
    }

    pub fn kube_options(&self) -> KubeOptions {
        KubeOptions {
            kubeconfig: self.kubernetes.kubeconfig.clone(),
            context: self.kubernetes.context.clone(),
        }
    }
}
