//! Orchestrator client seam (spec §6 "abstracted interface" + §4.9 of SPEC_FULL.md).
//!
//! `broker-core` only depends on this trait; `broker-k8s` provides the real `kube`-backed
//! implementation and the in-memory fake in [`crate::fake`] backs unit/integration tests.

use crate::error::OrchestratorError;
use crate::model::Gvk;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// A label-equality selector (the orchestrator interface never needs anything richer).
#[derive(Debug, Clone, Default)]
pub struct LabelSelector(pub BTreeMap<String, String>);

impl LabelSelector {
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut m = BTreeMap::new();
        m.insert(key.into(), value.into());
        Self(m)
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.0.iter().all(|(k, v)| labels.get(k) == Some(v))
    }
}

/// Foreground vs background deletion, needed by the db-in-cluster Unbind path (spec §4.5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Foreground,
    Background,
}

/// A minimal, orchestrator-agnostic object: labels/annotations plus an opaque spec/status body.
#[derive(Debug, Clone, Default)]
pub struct CompositeObject {
    pub name: String,
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub spec: serde_json::Value,
    pub status: serde_json::Value,
}

impl CompositeObject {
    /// The name of the connection-detail secret this composite writes to, derived from
    /// `spec.writeConnectionSecretToRef.name` with a conventional fallback.
    pub fn connection_secret_name(&self) -> String {
        self.spec
            .get("writeConnectionSecretToRef")
            .and_then(|v| v.get("name"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-connection", self.name))
    }

    pub fn ready_condition(&self) -> crate::model::ReadyCondition {
        use crate::model::ReadyCondition;
        let reason = self
            .status
            .get("conditions")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.iter().find(|c| c.get("type").and_then(|t| t.as_str()) == Some("Ready")))
            .and_then(|c| c.get("reason"))
            .and_then(|r| r.as_str());
        match reason {
            Some("Available") => ReadyCondition::Available,
            Some("Creating") => ReadyCondition::Creating,
            Some("Unavailable") => ReadyCondition::Unavailable,
            Some("Deleting") => ReadyCondition::Deleting,
            _ => ReadyCondition::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Secret {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub data: BTreeMap<String, Vec<u8>>,
    pub owner: Option<OwnerRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
}

/// Typed and untyped CRUD against the orchestrator, abstracted so `broker-core` never depends on
/// a wire protocol (spec §1: "the core does not specify the wire protocol between itself and the
/// orchestrator").
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn get(&self, gvk: &Gvk, namespace: Option<&str>, name: &str) -> Result<Option<CompositeObject>, OrchestratorError>;
    async fn list(&self, gvk: &Gvk, namespace: Option<&str>, selector: &LabelSelector) -> Result<Vec<CompositeObject>, OrchestratorError>;
    async fn create(&self, gvk: &Gvk, namespace: Option<&str>, object: CompositeObject) -> Result<CompositeObject, OrchestratorError>;
    async fn update(&self, gvk: &Gvk, namespace: Option<&str>, object: CompositeObject) -> Result<CompositeObject, OrchestratorError>;
    async fn delete(&self, gvk: &Gvk, namespace: Option<&str>, name: &str, propagation: Propagation) -> Result<(), OrchestratorError>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, OrchestratorError>;
    async fn create_secret(&self, secret: Secret) -> Result<(), OrchestratorError>;
    async fn set_secret_owner(&self, namespace: &str, secret_name: &str, owner: OwnerRef) -> Result<(), OrchestratorError>;
}
