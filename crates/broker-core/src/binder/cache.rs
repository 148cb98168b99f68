//! Cache-cluster binder (spec §4.5.1).

use super::{BinderSettings, ServiceBinder};
use crate::error::BrokerError;
use crate::model::{ConnectionSecret, Instance};
use crate::orchestrator::Orchestrator;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub struct CacheClusterBinder {
    orchestrator: Arc<dyn Orchestrator>,
    settings: BinderSettings,
}

impl CacheClusterBinder {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, settings: BinderSettings) -> Self {
        Self { orchestrator, settings }
    }

    /// Bind and GetBinding are equivalent for this kind (spec §4.5.1): both read the connection
    /// secret and reconstruct the same credentials object.
    async fn credentials(&self, instance: &Instance) -> Result<serde_json::Value, BrokerError> {
        let secret_name = instance
            .connection_secret_ref
            .clone()
            .ok_or_else(|| BrokerError::Upstream("instance has no connection secret reference".to_string()))?;
        let secret = self
            .orchestrator
            .get_secret(&self.settings.namespace, &secret_name)
            .await?
            .ok_or_else(|| BrokerError::Upstream(format!("connection secret {secret_name:?} not found")))?;
        let conn = ConnectionSecret { data: secret.data };

        let endpoint = conn.require_str("endpoint")?;
        let password = conn.require_str("password")?;
        let port: i64 = conn
            .require_str("port")?
            .parse()
            .map_err(|_| BrokerError::Upstream("connection secret port is not an integer".to_string()))?;
        let sentinel_port: i64 = conn
            .require_str("sentinelPort")?
            .parse()
            .map_err(|_| BrokerError::Upstream("connection secret sentinelPort is not an integer".to_string()))?;

        let mut creds = json!({
            "password": password,
            "host": endpoint,
            "port": port,
            "master": format!("redis://{}", instance.instance_id),
            "sentinels": [ { "host": endpoint, "port": sentinel_port } ],
            "servers": [ { "host": endpoint, "port": port } ],
        });

        if self.settings.monitoring_enabled {
            if let Some(mport) = conn.get_str("monitoringPort").and_then(|v| v.parse::<i64>().ok()) {
                let mut metrics = Vec::with_capacity(5);
                for i in 0..2 {
                    metrics.push(format!("http://{endpoint}:{mport}/metrics/haproxy-{i}"));
                }
                for i in 0..3 {
                    metrics.push(format!("http://{endpoint}:{mport}/metrics/cache-{i}"));
                }
                creds["metrics"] = json!(metrics);
            }
        }

        Ok(creds)
    }
}

#[async_trait]
impl ServiceBinder for CacheClusterBinder {
    async fn bind(&self, instance: &Instance, _binding_id: &str) -> Result<serde_json::Value, BrokerError> {
        self.credentials(instance).await
    }

    async fn unbind(&self, _instance: &Instance, _binding_id: &str) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn get_binding(&self, instance: &Instance, binding_id: &str) -> Result<serde_json::Value, BrokerError> {
        self.bind(instance, binding_id).await
    }

    async fn deprovisionable(&self, _instance: &Instance) -> Result<(), BrokerError> {
        Ok(())
    }
}
