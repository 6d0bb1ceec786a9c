//! Kubernetes sample source
//!
//! Pods and their container requests come from the core API; usage comes
//! from the `metrics.k8s.io/v1beta1` PodMetrics resource served by
//! metrics-server.

use super::quantity;
use super::SampleSource;
use crate::error::SourceError;
use crate::models::{DeclaredResources, ObservedSubUnit, ObservedUnit, UnitPhase, UsageReading};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// How to reach the cluster
#[derive(Debug, Clone, Default)]
pub struct KubeOptions {
    /// Explicit kubeconfig file; falls back to in-cluster or default discovery
    pub kubeconfig: Option<PathBuf>,
    /// Context within the kubeconfig
    pub context: Option<String>,
}

pub struct KubeSampleSource {
    client: Client,
    metrics_resource: ApiResource,
}

impl KubeSampleSource {
    pub fn new(client: Client) -> Self {
        let gvk = GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", "PodMetrics");
        Self {
            client,
            metrics_resource: ApiResource::from_gvk_with_plural(&gvk, "pods"),
        }
    }

    /// Build a client from the given options
    pub async fn connect(options: &KubeOptions) -> Result<Self, SourceError> {
        let config = if options.kubeconfig.is_none() && options.context.is_none() {
            Config::infer()
                .await
                .map_err(|e| SourceError::Unavailable(format!("Failed to infer config: {}", e)))?
        } else {
            let kubeconfig = match &options.kubeconfig {
                Some(path) => Kubeconfig::read_from(path),
                None => Kubeconfig::read(),
            }
            .map_err(|e| SourceError::Unavailable(format!("Failed to read kubeconfig: {}", e)))?;

            Config::from_custom_kubeconfig(
                kubeconfig,
                &KubeConfigOptions {
                    context: options.context.clone(),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| SourceError::Unavailable(format!("Invalid kubeconfig: {}", e)))?
        };

        info!(cluster_url = %config.cluster_url, "Connecting to Kubernetes API");
        let client = Client::try_from(config)?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl SampleSource for KubeSampleSource {
    async fn list_running_units(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<ObservedUnit>, SourceError> {
        let pods: Api<Pod> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        let list = pods.list(&pod_list_params()).await?;
        debug!(count = list.items.len(), "Listed pods");

        Ok(units_from_pods(&list.items))
    }

    async fn get_usage(
        &self,
        namespace: &str,
        unit_name: &str,
    ) -> Result<Vec<UsageReading>, SourceError> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &self.metrics_resource);

        let metrics = api.get(unit_name).await.map_err(|e| match e {
            kube::Error::Api(ref response) if response.code == 404 || response.code == 503 => {
                SourceError::Unavailable(format!(
                    "No pod metrics for {}/{}: {}",
                    namespace, unit_name, response.message
                ))
            }
            other => SourceError::Kube(other),
        })?;

        readings_from_metrics(&metrics.data)
    }
}

/// Every phase is listed; phase filtering happens in the reconciler so
/// skipped pods are counted
fn pod_list_params() -> ListParams {
    ListParams::default()
}

/// Map listed pods to units, dropping pods that cannot be interpreted
pub(crate) fn units_from_pods(pods: &[Pod]) -> Vec<ObservedUnit> {
    let mut units = Vec::with_capacity(pods.len());
    for pod in pods {
        match unit_from_pod(pod) {
            Ok(unit) => units.push(unit),
            Err(e) => warn!(error = %e, "Skipping malformed pod"),
        }
    }
    units
}

/// Map a pod to an observed unit
pub(crate) fn unit_from_pod(pod: &Pod) -> Result<ObservedUnit, SourceError> {
    let name = pod
        .metadata
        .name
        .clone()
        .ok_or_else(|| SourceError::Malformed("pod without a name".to_string()))?;
    let namespace = pod
        .metadata
        .namespace
        .clone()
        .unwrap_or_else(|| "default".to_string());
    let phase = UnitPhase::from_phase(pod.status.as_ref().and_then(|s| s.phase.as_deref()));

    let sub_units = pod
        .spec
        .as_ref()
        .map(|spec| spec.containers.iter().map(sub_unit_from_container).collect())
        .unwrap_or_default();

    Ok(ObservedUnit {
        namespace,
        name,
        phase,
        sub_units,
    })
}

fn sub_unit_from_container(container: &Container) -> ObservedSubUnit {
    let resources = container.resources.as_ref();
    let requests = resources.and_then(|r| r.requests.as_ref());
    let limits = resources.and_then(|r| r.limits.as_ref());

    ObservedSubUnit {
        name: container.name.clone(),
        image: container.image.clone().unwrap_or_default(),
        resources: DeclaredResources {
            cpu_request_cores: declared(requests, "cpu", quantity::cpu_cores, &container.name),
            cpu_limit_cores: declared(limits, "cpu", quantity::cpu_cores, &container.name),
            memory_request_bytes: declared(
                requests,
                "memory",
                quantity::memory_bytes,
                &container.name,
            ),
            memory_limit_bytes: declared(limits, "memory", quantity::memory_bytes, &container.name),
        },
    }
}

/// Absent or unparseable declarations count as zero
fn declared<T: Default>(
    values: Option<&BTreeMap<String, Quantity>>,
    key: &str,
    parse: fn(&str) -> Result<T, SourceError>,
    container: &str,
) -> T {
    let Some(quantity) = values.and_then(|v| v.get(key)) else {
        return T::default();
    };
    parse(&quantity.0).unwrap_or_else(|e| {
        warn!(container, resource = key, error = %e, "Ignoring unparseable quantity");
        T::default()
    })
}

#[derive(Debug, Deserialize)]
struct ContainerUsage {
    name: String,
    #[serde(default)]
    usage: BTreeMap<String, String>,
}

/// Per-container readings from a PodMetrics payload
///
/// A container whose usage cannot be parsed is dropped with a warning; its
/// siblings keep their readings.
pub(crate) fn readings_from_metrics(
    data: &serde_json::Value,
) -> Result<Vec<UsageReading>, SourceError> {
    let containers: Vec<ContainerUsage> = match data.get("containers") {
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| SourceError::Malformed(format!("pod metrics: {}", e)))?,
        None => Vec::new(),
    };

    let mut readings = Vec::with_capacity(containers.len());
    for container in containers {
        match reading_from_usage(&container) {
            Ok(reading) => readings.push(reading),
            Err(e) => warn!(
                container = %container.name,
                error = %e,
                "Ignoring unparseable usage"
            ),
        }
    }
    Ok(readings)
}

fn reading_from_usage(container: &ContainerUsage) -> Result<UsageReading, SourceError> {
    let cpu_cores = match container.usage.get("cpu") {
        Some(q) => quantity::cpu_cores(q)?,
        None => 0.0,
    };
    let memory_bytes = match container.usage.get("memory") {
        Some(q) => quantity::memory_bytes(q)?,
        None => 0,
    };
    Ok(UsageReading {
        sub_unit: container.name.clone(),
        cpu_cores,
        memory_bytes,
    })
}
