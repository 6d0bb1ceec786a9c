//! Workload inventory and usage readings
//!
//! The engine consumes the cluster through [`SampleSource`]; the Kubernetes
//! implementation lives in [`k8s`].

pub mod k8s;
pub mod quantity;

pub use k8s::{KubeOptions, KubeSampleSource};

use crate::error::SourceError;
use crate::models::{ObservedUnit, UnitPhase, UsageReading};
use crate::outcome::SkipReason;
use async_trait::async_trait;

/// Reserved namespace whose units are skipped unless allow-listed
pub const SYSTEM_NAMESPACE: &str = "kube-system";

/// Name prefixes of system units that are still analyzed (case-sensitive)
pub const ALLOWED_SYSTEM_PREFIXES: &[&str] = &["coredns", "metrics-server", "aws-node", "kube-proxy"];

#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Units in every phase with their declared requests, optionally in one
    /// namespace. Callers filter with [`ineligibility`]
    async fn list_running_units(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<ObservedUnit>, SourceError>;

    /// Point-in-time usage of each sub-unit of one unit
    ///
    /// Fails with [`SourceError::Unavailable`] when no usage backend exists.
    async fn get_usage(
        &self,
        namespace: &str,
        unit_name: &str,
    ) -> Result<Vec<UsageReading>, SourceError>;
}

/// Why a unit is excluded from ingestion, or `None` if it is eligible
pub fn ineligibility(unit: &ObservedUnit) -> Option<SkipReason> {
    if unit.phase != UnitPhase::Running {
        return Some(SkipReason::NotRunning);
    }
    if unit.namespace == SYSTEM_NAMESPACE
        && !ALLOWED_SYSTEM_PREFIXES
            .iter()
            .any(|prefix| unit.name.starts_with(prefix))
    {
        return Some(SkipReason::SystemNamespace);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(namespace: &str, name: &str, phase: UnitPhase) -> ObservedUnit {
        ObservedUnit {
            namespace: namespace.to_string(),
            name: name.to_string(),
            phase,
            sub_units: vec![],
        }
    }

    #[test]
    fn test_running_workload_is_eligible() {
        assert_eq!(ineligibility(&unit("shop", "api-0", UnitPhase::Running)), None);
    }

    #[test]
    fn test_non_running_is_skipped() {
        for phase in [UnitPhase::Pending, UnitPhase::Succeeded, UnitPhase::Failed, UnitPhase::Unknown] {
            assert_eq!(
                ineligibility(&unit("shop", "api-0", phase)),
                Some(SkipReason::NotRunning)
            );
        }
    }

    #[test]
    fn test_system_namespace_allow_list() {
        for name in ["coredns-5d78c9869d-abcde", "metrics-server-0", "aws-node-x", "kube-proxy-z"] {
            assert_eq!(ineligibility(&unit(SYSTEM_NAMESPACE, name, UnitPhase::Running)), None);
        }

        for name in ["etcd-master", "CoreDNS-1", "my-coredns"] {
            assert_eq!(
                ineligibility(&unit(SYSTEM_NAMESPACE, name, UnitPhase::Running)),
                Some(SkipReason::SystemNamespace)
            );
        }

        // Prefixes only matter in the reserved namespace
        assert_eq!(ineligibility(&unit("shop", "etcd-master", UnitPhase::Running)), None);
    }
}
