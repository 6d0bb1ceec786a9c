//! Typed resource patch for applying a recommendation
//!
//! Requests come straight from the recommendation; limits add 20% headroom.
//! The payload stays typed until [`ResourcePatch::to_yaml`].

use crate::models::{Recommendation, MIB};
use serde::{Serialize, Serializer};
use std::fmt;

/// Limit = request * LIMIT_HEADROOM_PERCENT / 100
const LIMIT_HEADROOM_PERCENT: i64 = 120;

/// CPU quantity in millicores, rendered as `250m`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Millicores(pub i64);

impl Millicores {
    pub fn from_cores(cores: f64) -> Self {
        Millicores((cores * 1000.0).round() as i64)
    }
}

impl fmt::Display for Millicores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.0)
    }
}

impl Serialize for Millicores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Memory quantity in whole mebibytes, rendered as `256Mi`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mebibytes(pub i64);

impl Mebibytes {
    pub fn from_bytes(bytes: i64) -> Self {
        Mebibytes(bytes / MIB)
    }
}

impl fmt::Display for Mebibytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Mi", self.0)
    }
}

impl Serialize for Mebibytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceValues {
    pub cpu: Millicores,
    pub memory: Mebibytes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceRequirements {
    pub requests: ResourceValues,
    pub limits: ResourceValues,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerPatch {
    pub name: String,
    pub resources: ResourceRequirements,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchMetadata {
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchSpec {
    pub containers: Vec<ContainerPatch>,
}

/// Pod-shaped patch carrying one container's new requests and limits
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePatch {
    pub api_version: String,
    pub kind: String,
    pub metadata: PatchMetadata,
    pub spec: PatchSpec,
}

impl ResourcePatch {
    pub fn from_recommendation(rec: &Recommendation) -> Self {
        let fields = &rec.fields;
        let memory = Mebibytes::from_bytes(fields.recommended_memory);

        let resources = ResourceRequirements {
            requests: ResourceValues {
                cpu: Millicores::from_cores(fields.recommended_cpu),
                memory,
            },
            limits: ResourceValues {
                cpu: Millicores::from_cores(
                    fields.recommended_cpu * LIMIT_HEADROOM_PERCENT as f64 / 100.0,
                ),
                memory: Mebibytes(memory.0 * LIMIT_HEADROOM_PERCENT / 100),
            },
        };

        Self {
            api_version: "v1".to_string(),
            kind: "Pod".to_string(),
            metadata: PatchMetadata {
                name: fields.unit_name.clone(),
                namespace: fields.namespace.clone(),
            },
            spec: PatchSpec {
                containers: vec![ContainerPatch {
                    name: fields.sub_unit_name.clone(),
                    resources,
                }],
            },
        }
    }

    /// Download filename: `patch-{namespace}-{unit}-{sub-unit}.yaml`
    pub fn filename(&self) -> String {
        let container = self
            .spec
            .containers
            .first()
            .map(|c| c.name.as_str())
            .unwrap_or_default();
        format!(
            "patch-{}-{}-{}.yaml",
            self.metadata.namespace, self.metadata.name, container
        )
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
