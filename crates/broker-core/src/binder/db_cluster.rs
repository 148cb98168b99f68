//! Database-cluster binder (spec §4.5.2).

use super::ServiceBinder;
use crate::error::BrokerError;
use crate::labels;
use crate::model::{Instance, ServiceKind};
use crate::orchestrator::{LabelSelector, Orchestrator};
use crate::plan_registry::default_gvk_for;
use async_trait::async_trait;
use std::sync::Arc;

pub struct DbClusterBinder {
    orchestrator: Arc<dyn Orchestrator>,
}

impl DbClusterBinder {
    pub fn new(orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl ServiceBinder for DbClusterBinder {
    async fn bind(&self, _instance: &Instance, _binding_id: &str) -> Result<serde_json::Value, BrokerError> {
        Err(BrokerError::BindingNotSupported(
            "this instance cannot be bound directly; provision a db-in-cluster instance whose \
             parent_reference points at this cluster instead"
                .to_string(),
        ))
    }

    async fn unbind(&self, _instance: &Instance, _binding_id: &str) -> Result<(), BrokerError> {
        Err(BrokerError::NotImplemented)
    }

    async fn get_binding(&self, _instance: &Instance, _binding_id: &str) -> Result<serde_json::Value, BrokerError> {
        Err(BrokerError::NotImplemented)
    }

    /// Lists all db-in-cluster composites whose parent-id label equals this instance's id; if
    /// any exist, fails listing the dependents (spec §4.5.2).
    async fn deprovisionable(&self, instance: &Instance) -> Result<(), BrokerError> {
        let gvk = default_gvk_for(ServiceKind::DbInCluster);
        let selector = LabelSelector::eq(labels::key_parent(), instance.instance_id.clone());
        let dependents = self.orchestrator.list(&gvk, None, &selector).await?;
        if dependents.is_empty() {
            Ok(())
        } else {
            let names: Vec<String> = dependents.iter().map(|d| d.name.clone()).collect();
            Err(BrokerError::Policy(format!(
                "cluster {} is still in use by: {}",
                instance.instance_id,
                names.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeOrchestrator;
    use crate::model::{InstanceLabels, ReadyCondition};
    use crate::orchestrator::CompositeObject;

    fn instance(id: &str) -> Instance {
        Instance {
            instance_id: id.to_string(),
            labels: InstanceLabels {
                service_kind: ServiceKind::DbCluster,
                service_id: "2".into(),
                plan_name: "galera".into(),
                plan_size: "galera".into(),
                sla: String::new(),
                instance_id: id.to_string(),
                parent_id: None,
                bindable: false,
                updatable: false,
                deleted: false,
                principal: None,
            },
            parameters: Default::default(),
            composition_ref: "galera".into(),
            connection_secret_ref: None,
            ready: ReadyCondition::Available,
        }
    }

    #[tokio::test]
    async fn bind_is_forbidden() {
        let fake = Arc::new(FakeOrchestrator::new());
        let binder = DbClusterBinder::new(fake);
        let inst = instance("cluster-1");
        let err = binder.bind(&inst, "b1").await.unwrap_err();
        assert!(matches!(err, BrokerError::BindingNotSupported(_)));
    }

    #[tokio::test]
    async fn deprovision_fails_when_dependents_exist() {
        let fake = Arc::new(FakeOrchestrator::new());
        let gvk = default_gvk_for(ServiceKind::DbInCluster);
        let mut labels_map = std::collections::BTreeMap::new();
        labels_map.insert(labels::key_parent(), "cluster-1".to_string());
        fake.seed_instance(&gvk, CompositeObject { name: "child-1".to_string(), labels: labels_map, ..Default::default() });

        let binder = DbClusterBinder::new(fake);
        let inst = instance("cluster-1");
        let err = binder.deprovisionable(&inst).await.unwrap_err();
        assert!(matches!(err, BrokerError::Policy(_)));
    }

    #[tokio::test]
    async fn deprovision_succeeds_without_dependents() {
        let fake = Arc::new(FakeOrchestrator::new());
        let binder = DbClusterBinder::new(fake);
        let inst = instance("cluster-1");
        assert!(binder.deprovisionable(&inst).await.is_ok());
    }
}
