//! Instance repository (spec §4.4): create/update/delete/read composite instances, and find an
//! instance when the plan is unknown by iterating candidate plans.

use crate::binder::ServiceBinder;
use crate::error::BrokerError;
use crate::labels;
use crate::model::{Instance, Plan};
use crate::orchestrator::{CompositeObject, Orchestrator, Propagation};
use crate::plan_registry::PlanRegistry;
use std::sync::Arc;

pub struct InstanceRepository {
    orchestrator: Arc<dyn Orchestrator>,
    registry: Arc<PlanRegistry>,
    configured_service_ids: Vec<String>,
}

impl InstanceRepository {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, registry: Arc<PlanRegistry>, configured_service_ids: Vec<String>) -> Self {
        Self { orchestrator, registry, configured_service_ids }
    }

    /// Builds a typed composite handle from the plan's GVK and tries to fetch by name. Returns
    /// `Ok(None)` if not found; returns `Err(PlanMismatch)` if found under a different plan-name
    /// label (spec §4.4, §9).
    pub async fn get(&self, plan: &Plan, instance_id: &str) -> Result<Option<Instance>, BrokerError> {
        let obj = self.orchestrator.get(&plan.gvk, None, instance_id).await?;
        let Some(obj) = obj else { return Ok(None) };
        let parsed = labels::parse_labels(&obj.labels)?;
        if parsed.plan_name != plan.plan_name {
            return Err(BrokerError::PlanMismatch { instance_id: instance_id.to_string() });
        }
        Ok(Some(instance_from_object(obj, parsed)))
    }

    /// Like [`Self::get`] but reports existence as a plain boolean instead of surfacing the
    /// plan-mismatch distinction, for call sites that only need "does it exist under this plan".
    pub async fn exists(&self, plan: &Plan, instance_id: &str) -> Result<bool, BrokerError> {
        match self.get(plan, instance_id).await {
            Ok(Some(_)) => Ok(true),
            Ok(None) => Ok(false),
            Err(BrokerError::PlanMismatch { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Iterates every plan the broker is configured for and attempts Get; returns the first
    /// match. Used by GetInstance, GetBinding, LastOperation when the caller did not supply a
    /// plan id (spec §4.4).
    pub async fn find_without_plan(&self, instance_id: &str) -> Result<Option<(Plan, Instance)>, BrokerError> {
        let plans = self.registry.list_plans_by_service_ids(&self.configured_service_ids).await?;
        for plan in plans {
            match self.get(&plan, instance_id).await {
                Ok(Some(instance)) => return Ok(Some((plan, instance))),
                Ok(None) => continue,
                Err(BrokerError::PlanMismatch { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Assembles labels, runs the service kind's parameter validator (if any), writes parameters
    /// into `spec.parameters`, and creates the composite (spec §4.4).
    pub async fn create(
        &self,
        plan: &Plan,
        instance_id: &str,
        parameters: serde_json::Map<String, serde_json::Value>,
        principal: Option<&str>,
        validator: Option<Arc<dyn ServiceBinder>>,
    ) -> Result<Instance, BrokerError> {
        let parameters = match validator {
            Some(v) => v.validate_provision_params(parameters).await?,
            None => parameters,
        };

        let parent_id = parameters.get("parent_reference").and_then(|v| v.as_str()).map(str::to_string);
        let labels_map = labels::emit_labels(plan, instance_id, parent_id.as_deref(), principal);

        let object = CompositeObject {
            name: instance_id.to_string(),
            namespace: None,
            labels: labels_map,
            annotations: Default::default(),
            spec: serde_json::json!({
                "compositionRef": { "name": plan.plan_id },
                "parameters": parameters,
            }),
            status: serde_json::json!({}),
        };

        let created = self.orchestrator.create(&plan.gvk, None, object).await?;
        let parsed = labels::parse_labels(&created.labels)?;
        Ok(instance_from_object(created, parsed))
    }

    /// Rewrites the composition reference to the new plan and overwrites the plan-name and SLA
    /// labels, then submits an update (spec §4.4, used by both plan updates and Update facade).
    pub async fn update_plan(&self, old_plan: &Plan, new_plan: &Plan, instance_id: &str) -> Result<Instance, BrokerError> {
        let existing = self
            .orchestrator
            .get(&old_plan.gvk, None, instance_id)
            .await?
            .ok_or(BrokerError::InstanceNotFound)?;

        let mut object = existing;
        object.labels.insert(labels::key_name(), new_plan.plan_name.clone());
        object.labels.insert(labels::key_sla(), new_plan.sla.clone());
        object.labels.insert(labels::key_plan(), new_plan.plan_id.clone());
        object.spec["compositionRef"] = serde_json::json!({ "name": new_plan.plan_id });

        let updated = self.orchestrator.update(&new_plan.gvk, None, object).await?;
        let parsed = labels::parse_labels(&updated.labels)?;
        Ok(instance_from_object(updated, parsed))
    }

    /// A typed delete by name using the plan's GVK (spec §4.4).
    pub async fn delete(&self, plan: &Plan, instance_id: &str) -> Result<(), BrokerError> {
        self.orchestrator.delete(&plan.gvk, None, instance_id, Propagation::Foreground).await?;
        Ok(())
    }
}

fn instance_from_object(obj: CompositeObject, parsed_labels: crate::model::InstanceLabels) -> Instance {
    let parameters = obj
        .spec
        .get("parameters")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();
    let composition_ref = obj
        .spec
        .get("compositionRef")
        .and_then(|v| v.get("name"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let connection_secret_ref = Some(obj.connection_secret_name());
    let ready = obj.ready_condition();

    Instance {
        instance_id: parsed_labels.instance_id.clone(),
        labels: parsed_labels,
        parameters,
        composition_ref,
        connection_secret_ref,
        ready,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeOrchestrator;
    use crate::model::ServiceKind;

    fn plan(plan_id: &str, plan_name: &str, service_id: &str) -> Plan {
        Plan {
            plan_id: plan_id.to_string(),
            plan_name: plan_name.to_string(),
            plan_size: plan_name.to_string(),
            sla: String::new(),
            service_id: service_id.to_string(),
            service_kind: ServiceKind::CacheCluster,
            gvk: crate::model::Gvk { group: "g".into(), version: "v1".into(), kind: "RedisCluster".into() },
            description: String::new(),
            tags: vec![],
            metadata: serde_json::json!({}),
            bindable: true,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let fake = Arc::new(FakeOrchestrator::new());
        let plan = plan("1-1", "1-1", "1");
        fake.seed_plan(&plan.plan_id, &plan.plan_name, &plan.service_id, plan.service_kind, true);
        let registry = Arc::new(PlanRegistry::new(fake.clone(), vec!["1".to_string()]));
        let repo = InstanceRepository::new(fake, registry, vec!["1".to_string()]);

        let params = serde_json::json!({"foo": "bar"}).as_object().unwrap().clone();
        let created = repo.create(&plan, "inst-1", params, Some("alice"), None).await.unwrap();
        assert_eq!(created.instance_id, "inst-1");
        assert_eq!(created.labels.principal.as_deref(), Some("alice"));

        let fetched = repo.get(&plan, "inst-1").await.unwrap().unwrap();
        assert_eq!(fetched.parameters.get("foo").unwrap(), "bar");
    }

    #[tokio::test]
    async fn get_with_mismatched_plan_label_reports_plan_mismatch() {
        let fake = Arc::new(FakeOrchestrator::new());
        let plan_a = plan("1-1", "1-1", "1");
        let plan_b = plan("1-2", "1-2", "1");
        fake.seed_plan(&plan_a.plan_id, &plan_a.plan_name, &plan_a.service_id, plan_a.service_kind, true);
        let registry = Arc::new(PlanRegistry::new(fake.clone(), vec!["1".to_string()]));
        let repo = InstanceRepository::new(fake, registry, vec!["1".to_string()]);

        let params = serde_json::Map::new();
        repo.create(&plan_a, "inst-1", params, None, None).await.unwrap();

        let err = repo.get(&plan_b, "inst-1").await.unwrap_err();
        assert!(matches!(err, BrokerError::PlanMismatch { .. }));
    }
}
