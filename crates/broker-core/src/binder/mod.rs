//! Service binder dispatcher (spec §4.5): a polymorphic layer that, given an instance's service
//! kind, produces a binder implementing bind/unbind/get-binding/deprovisionable and (for
//! db-in-cluster only) validate-provision-params.
//!
//! Modeled the way spec §9 describes: a tagged variant with a shared capability set plus one
//! optional capability, dispatched from a label rather than a trait object hierarchy rooted in
//! inheritance. `validate_provision_params` gets a default no-op body so only db-in-cluster
//! needs to override it.

pub mod cache;
pub mod db_cluster;
pub mod db_in_cluster;

use crate::error::BrokerError;
use crate::model::{Instance, ServiceKind};
use crate::orchestrator::Orchestrator;
use async_trait::async_trait;
use std::sync::Arc;

/// Broker-wide settings a binder needs: where to write password secrets, and whether/where to
/// expose monitoring endpoints (spec §4.5.1, §4.5.3).
#[derive(Debug, Clone)]
pub struct BinderSettings {
    pub namespace: String,
    pub monitoring_enabled: bool,
    pub monitoring_domain: Option<String>,
}

#[async_trait]
pub trait ServiceBinder: Send + Sync {
    async fn bind(&self, instance: &Instance, binding_id: &str) -> Result<serde_json::Value, BrokerError>;
    async fn unbind(&self, instance: &Instance, binding_id: &str) -> Result<(), BrokerError>;
    async fn get_binding(&self, instance: &Instance, binding_id: &str) -> Result<serde_json::Value, BrokerError>;
    async fn deprovisionable(&self, instance: &Instance) -> Result<(), BrokerError>;

    /// Only db-in-cluster overrides this; every other kind accepts parameters unchanged.
    async fn validate_provision_params(
        &self,
        params: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Map<String, serde_json::Value>, BrokerError> {
        Ok(params)
    }
}

/// Looks up the binder for a service kind (spec §4.5).
pub fn binder_for(kind: ServiceKind, orchestrator: Arc<dyn Orchestrator>, settings: BinderSettings) -> Arc<dyn ServiceBinder> {
    match kind {
        ServiceKind::CacheCluster => Arc::new(cache::CacheClusterBinder::new(orchestrator, settings)),
        ServiceKind::DbCluster => Arc::new(db_cluster::DbClusterBinder::new(orchestrator)),
        ServiceKind::DbInCluster => Arc::new(db_in_cluster::DbInClusterBinder::new(orchestrator, settings)),
    }
}
