use crate::config::EngineConfig;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Everything one cycle needs, passed explicitly through every phase
#[derive(Debug, Clone)]
pub struct CycleContext {
    /// Run timestamp; snapshots are stamped with it and analysis windows end at it
    pub started_at: DateTime<Utc>,
    pub config: Arc<EngineConfig>,
    /// Restrict enumeration to one namespace
    pub namespace: Option<String>,
}

impl CycleContext {
    /// Context for a cycle starting now
    pub fn new(config: Arc<EngineConfig>, namespace: Option<String>) -> Self {
        Self::at(Utc::now(), config, namespace)
    }

    pub fn at(
        started_at: DateTime<Utc>,
        config: Arc<EngineConfig>,
        namespace: Option<String>,
    ) -> Self {
        Self {
            started_at,
            config,
            namespace,
        }
    }
}
