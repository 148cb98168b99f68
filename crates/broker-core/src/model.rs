//! Core data model: service definitions, plans, instances, bindings, connection secrets.
//!
//! These are the broker's in-memory view of composite resources; they are intentionally thin —
//! the orchestrator crate owns the wire representation (`DynamicObject`) and these types are
//! projected from it by the label/annotation codec and the plan registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The three service kinds the broker fronts. Wire tokens match the orchestrator's
/// `service-kind` label values exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    CacheCluster,
    DbCluster,
    DbInCluster,
}

impl ServiceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceKind::CacheCluster => "cache-cluster",
            ServiceKind::DbCluster => "db-cluster",
            ServiceKind::DbInCluster => "db-in-cluster",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cache-cluster" => Some(ServiceKind::CacheCluster),
            "db-cluster" => Some(ServiceKind::DbCluster),
            "db-in-cluster" => Some(ServiceKind::DbInCluster),
            _ => None,
        }
    }
}

/// Group/version/kind reference for a composite type, derived from a plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Gvk {
    pub group: String,
    pub version: String,
    pub kind: String,
}

/// One offered service (an XRD projected onto the OSB catalog shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub service_id: String,
    pub service_kind: ServiceKind,
    pub description: String,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
    pub bindable: bool,
    pub updatable: bool,
}

/// One offered plan (a composition projected onto the OSB catalog shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,
    pub plan_name: String,
    pub plan_size: String,
    pub sla: String,
    pub service_id: String,
    pub service_kind: ServiceKind,
    pub gvk: Gvk,
    pub description: String,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
    pub bindable: bool,
}

/// A provisioned service instance (a composite resource).
#[derive(Debug, Clone)]
pub struct Instance {
    pub instance_id: String,
    pub labels: InstanceLabels,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub composition_ref: String,
    pub connection_secret_ref: Option<String>,
    pub ready: ReadyCondition,
}

/// Projection of the composite's `Ready` condition used for LastOperation and readiness gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyCondition {
    Available,
    Creating,
    Unavailable,
    Deleting,
    Unknown,
}

impl Instance {
    pub fn is_ready(&self) -> bool {
        self.ready == ReadyCondition::Available
    }
}

/// Typed labels carried on every composite, parsed/emitted by the label codec (§4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceLabels {
    pub service_kind: ServiceKind,
    pub service_id: String,
    pub plan_name: String,
    pub plan_size: String,
    pub sla: String,
    pub instance_id: String,
    pub parent_id: Option<String>,
    pub bindable: bool,
    pub updatable: bool,
    pub deleted: bool,
    pub principal: Option<String>,
}

/// A connection-detail secret written by controllers, read (never written, except for the
/// password secrets the broker itself creates for db-in-cluster bindings) by the broker.
#[derive(Debug, Clone, Default)]
pub struct ConnectionSecret {
    pub data: BTreeMap<String, Vec<u8>>,
}

impl ConnectionSecret {
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.data.get(key).map(|v| String::from_utf8_lossy(v).into_owned())
    }

    pub fn require_str(&self, key: &str) -> Result<String, crate::error::BrokerError> {
        self.get_str(key)
            .ok_or_else(|| crate::error::BrokerError::Upstream(format!("connection secret missing key {key:?}")))
    }
}
