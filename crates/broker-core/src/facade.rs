//! Broker operations facade (spec §4.7): the OSB-level operations (Services, Provision,
//! Deprovision, Bind, Unbind, LastOperation, GetInstance, GetBinding, Update), plus the
//! plan/instance resolution helper and correlation-id error wrapping (spec §7).

use crate::binder::{binder_for, BinderSettings};
use crate::error::{BrokerError, CorrelatedError};
use crate::instance_repo::InstanceRepository;
use crate::model::{Instance, Plan, ReadyCondition};
use crate::orchestrator::Orchestrator;
use crate::plan_registry::{OsbService, PlanRegistry};
use crate::principal::Principal;
use crate::rule_engine::PlanUpdateRules;
use std::future::Future;
use std::sync::Arc;

/// Outcome of Provision: either a freshly created instance, or confirmation that one already
/// existed under empty parameters (spec §4.7, testable property 5).
#[derive(Debug)]
pub enum ProvisionResult {
    Created(Instance),
    AlreadyExists,
}

/// OSB `last_operation` state, projected from the composite's Ready condition (spec §4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsbState {
    Succeeded,
    InProgress,
    Failed,
}

#[derive(Debug, Clone)]
pub struct LastOperationResponse {
    pub state: OsbState,
    pub description: String,
}

fn project_ready_condition(ready: ReadyCondition) -> LastOperationResponse {
    match ready {
        ReadyCondition::Available => LastOperationResponse { state: OsbState::Succeeded, description: "Available".to_string() },
        ReadyCondition::Creating => LastOperationResponse { state: OsbState::InProgress, description: "Creating".to_string() },
        ReadyCondition::Unavailable => LastOperationResponse { state: OsbState::Failed, description: "Unavailable".to_string() },
        ReadyCondition::Deleting => LastOperationResponse { state: OsbState::Failed, description: "Deleting".to_string() },
        ReadyCondition::Unknown => LastOperationResponse { state: OsbState::InProgress, description: "Unknown".to_string() },
    }
}

#[derive(Debug, Clone)]
pub struct GetInstanceResponse {
    pub plan_id: String,
    pub service_id: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

/// Logs the failure at `error!` and stamps it with the correlation id before returning it, so no
/// facade call site can forget to do either (spec §7).
async fn correlate<T, F>(correlation_id: &str, operation: &str, fut: F) -> Result<T, CorrelatedError>
where
    F: Future<Output = Result<T, BrokerError>>,
{
    match fut.await {
        Ok(value) => Ok(value),
        Err(err) => {
            tracing::error!(correlation_id, operation, error = %err, "broker operation failed");
            Err(err.with_correlation(correlation_id))
        }
    }
}

pub struct BrokerFacade {
    orchestrator: Arc<dyn Orchestrator>,
    registry: Arc<PlanRegistry>,
    instances: Arc<InstanceRepository>,
    binder_settings: BinderSettings,
    update_rules: PlanUpdateRules,
}

impl BrokerFacade {
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        registry: Arc<PlanRegistry>,
        instances: Arc<InstanceRepository>,
        binder_settings: BinderSettings,
        update_rules: PlanUpdateRules,
    ) -> Self {
        Self { orchestrator, registry, instances, binder_settings, update_rules }
    }

    /// Resolves a plan and instance together: if `plan_id` is empty, iterates every configured
    /// plan looking for the instance; otherwise fetches the named plan then the instance under it
    /// (spec §4.7 "plan/instance resolution helper").
    async fn resolve(&self, plan_id: &str, instance_id: &str) -> Result<(Plan, Instance), BrokerError> {
        if plan_id.is_empty() {
            return self.instances.find_without_plan(instance_id).await?.ok_or(BrokerError::InstanceNotFound);
        }
        let plan = self.registry.get_plan(plan_id).await?.ok_or_else(|| BrokerError::PlanNotFound(plan_id.to_string()))?;
        let instance = self.instances.get(&plan, instance_id).await?.ok_or(BrokerError::InstanceNotFound)?;
        Ok((plan, instance))
    }

    pub async fn services(&self, correlation_id: &str) -> Result<Vec<OsbService>, CorrelatedError> {
        correlate(correlation_id, "Services", self.registry.list_services()).await
    }

    pub async fn provision(
        &self,
        correlation_id: &str,
        instance_id: &str,
        plan_id: &str,
        parameters: serde_json::Map<String, serde_json::Value>,
        async_allowed: bool,
        principal: Option<Principal>,
    ) -> Result<ProvisionResult, CorrelatedError> {
        correlate(
            correlation_id,
            "Provision",
            self.provision_inner(instance_id, plan_id, parameters, async_allowed, principal),
        )
        .await
    }

    async fn provision_inner(
        &self,
        instance_id: &str,
        plan_id: &str,
        parameters: serde_json::Map<String, serde_json::Value>,
        async_allowed: bool,
        principal: Option<Principal>,
    ) -> Result<ProvisionResult, BrokerError> {
        if !async_allowed {
            return Err(BrokerError::AsyncRequired);
        }

        let plan = self.registry.get_plan(plan_id).await?.ok_or_else(|| BrokerError::PlanNotFound(plan_id.to_string()))?;

        match self.instances.get(&plan, instance_id).await {
            Ok(Some(_)) if parameters.is_empty() => return Ok(ProvisionResult::AlreadyExists),
            Ok(Some(_)) => return Err(BrokerError::AlreadyExists),
            Ok(None) | Err(BrokerError::PlanMismatch { .. }) => {}
            Err(e) => return Err(e),
        }

        let validator = binder_for(plan.service_kind, self.orchestrator.clone(), self.binder_settings.clone());
        let created = self
            .instances
            .create(&plan, instance_id, parameters, principal.as_ref().map(Principal::as_str), Some(validator))
            .await?;
        Ok(ProvisionResult::Created(created))
    }

    pub async fn deprovision(&self, correlation_id: &str, instance_id: &str, plan_id: &str) -> Result<(), CorrelatedError> {
        correlate(correlation_id, "Deprovision", self.deprovision_inner(instance_id, plan_id)).await
    }

    async fn deprovision_inner(&self, instance_id: &str, plan_id: &str) -> Result<(), BrokerError> {
        let (plan, instance) = self.resolve(plan_id, instance_id).await?;
        let binder = binder_for(plan.service_kind, self.orchestrator.clone(), self.binder_settings.clone());
        binder.deprovisionable(&instance).await?;
        self.instances.delete(&plan, instance_id).await
    }

    pub async fn bind(
        &self,
        correlation_id: &str,
        instance_id: &str,
        binding_id: &str,
        plan_id: &str,
    ) -> Result<serde_json::Value, CorrelatedError> {
        correlate(correlation_id, "Bind", self.bind_inner(instance_id, binding_id, plan_id)).await
    }

    async fn bind_inner(&self, instance_id: &str, binding_id: &str, plan_id: &str) -> Result<serde_json::Value, BrokerError> {
        let (plan, instance) = self.resolve(plan_id, instance_id).await?;
        if !instance.is_ready() {
            return Err(BrokerError::NotReady);
        }
        let binder = binder_for(plan.service_kind, self.orchestrator.clone(), self.binder_settings.clone());
        binder.bind(&instance, binding_id).await
    }

    pub async fn unbind(&self, correlation_id: &str, instance_id: &str, binding_id: &str, plan_id: &str) -> Result<(), CorrelatedError> {
        correlate(correlation_id, "Unbind", self.unbind_inner(instance_id, binding_id, plan_id)).await
    }

    async fn unbind_inner(&self, instance_id: &str, binding_id: &str, plan_id: &str) -> Result<(), BrokerError> {
        let (plan, instance) = self.resolve(plan_id, instance_id).await?;
        if !instance.is_ready() {
            return Err(BrokerError::NotReady);
        }
        let binder = binder_for(plan.service_kind, self.orchestrator.clone(), self.binder_settings.clone());
        binder.unbind(&instance, binding_id).await
    }

    pub async fn last_operation(
        &self,
        correlation_id: &str,
        instance_id: &str,
        plan_id: &str,
    ) -> Result<LastOperationResponse, CorrelatedError> {
        correlate(correlation_id, "LastOperation", self.last_operation_inner(instance_id, plan_id)).await
    }

    async fn last_operation_inner(&self, instance_id: &str, plan_id: &str) -> Result<LastOperationResponse, BrokerError> {
        let (_, instance) = self.resolve(plan_id, instance_id).await?;
        Ok(project_ready_condition(instance.ready))
    }

    pub async fn get_instance(&self, correlation_id: &str, instance_id: &str) -> Result<GetInstanceResponse, CorrelatedError> {
        correlate(correlation_id, "GetInstance", self.get_instance_inner(instance_id)).await
    }

    async fn get_instance_inner(&self, instance_id: &str) -> Result<GetInstanceResponse, BrokerError> {
        let (plan, instance) = self.instances.find_without_plan(instance_id).await?.ok_or(BrokerError::InstanceNotFound)?;
        Ok(GetInstanceResponse {
            plan_id: plan.plan_id,
            service_id: instance.labels.service_id.clone(),
            parameters: instance.parameters,
        })
    }

    pub async fn get_binding(&self, correlation_id: &str, instance_id: &str, binding_id: &str) -> Result<serde_json::Value, CorrelatedError> {
        correlate(correlation_id, "GetBinding", self.get_binding_inner(instance_id, binding_id)).await
    }

    async fn get_binding_inner(&self, instance_id: &str, binding_id: &str) -> Result<serde_json::Value, BrokerError> {
        let (plan, instance) = self.instances.find_without_plan(instance_id).await?.ok_or(BrokerError::InstanceNotFound)?;
        if !instance.is_ready() {
            return Err(BrokerError::NotReady);
        }
        let binder = binder_for(plan.service_kind, self.orchestrator.clone(), self.binder_settings.clone());
        binder.get_binding(&instance, binding_id).await
    }

    pub async fn update(
        &self,
        correlation_id: &str,
        instance_id: &str,
        service_id: &str,
        old_plan_id: &str,
        new_plan_id: &str,
    ) -> Result<Instance, CorrelatedError> {
        correlate(correlation_id, "Update", self.update_inner(instance_id, service_id, old_plan_id, new_plan_id)).await
    }

    async fn update_inner(&self, instance_id: &str, service_id: &str, old_plan_id: &str, new_plan_id: &str) -> Result<Instance, BrokerError> {
        let old_plan = self.registry.get_plan(old_plan_id).await?.ok_or_else(|| BrokerError::PlanNotFound(old_plan_id.to_string()))?;
        let instance = self.instances.get(&old_plan, instance_id).await?.ok_or(BrokerError::InstanceNotFound)?;

        if instance.labels.service_id != service_id {
            return Err(BrokerError::ServiceUpdateNotPermitted);
        }

        let new_plan = self.registry.get_plan(new_plan_id).await?.ok_or_else(|| BrokerError::PlanNotFound(new_plan_id.to_string()))?;

        if !self.update_rules.allow_update(&old_plan, &new_plan) {
            return Err(BrokerError::PlanChangeNotPermitted(format!(
                "update from plan {:?} to plan {:?} is not permitted",
                old_plan.plan_name, new_plan.plan_name
            )));
        }

        self.instances.update_plan(&old_plan, &new_plan, instance_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeOrchestrator;
    use crate::model::ServiceKind;

    fn settings() -> BinderSettings {
        BinderSettings { namespace: "broker".to_string(), monitoring_enabled: false, monitoring_domain: None }
    }

    fn facade(fake: Arc<FakeOrchestrator>, allowed: Vec<String>) -> BrokerFacade {
        let registry = Arc::new(PlanRegistry::new(fake.clone(), allowed.clone()));
        let instances = Arc::new(InstanceRepository::new(fake.clone(), registry.clone(), allowed));
        BrokerFacade::new(fake, registry, instances, settings(), PlanUpdateRules::new("", ""))
    }

    #[tokio::test]
    async fn provision_requires_async() {
        let fake = Arc::new(FakeOrchestrator::new());
        fake.seed_plan("1-1", "1-1", "1", ServiceKind::CacheCluster, true);
        let f = facade(fake, vec!["1".to_string()]);
        let err = f
            .provision("corr-1", "inst-1", "1-1", serde_json::Map::new(), false, None)
            .await
            .unwrap_err();
        assert!(err.message.contains("corr-1"));
    }

    #[tokio::test]
    async fn provision_then_reprovision_with_empty_params_reports_already_exists() {
        let fake = Arc::new(FakeOrchestrator::new());
        fake.seed_plan("1-1", "1-1", "1", ServiceKind::CacheCluster, true);
        let f = facade(fake, vec!["1".to_string()]);
        let first = f.provision("corr-1", "inst-1", "1-1", serde_json::Map::new(), true, None).await.unwrap();
        assert!(matches!(first, ProvisionResult::Created(_)));

        let second = f.provision("corr-1", "inst-1", "1-1", serde_json::Map::new(), true, None).await.unwrap();
        assert!(matches!(second, ProvisionResult::AlreadyExists));
    }

    #[tokio::test]
    async fn reprovision_with_nonempty_params_fails() {
        let fake = Arc::new(FakeOrchestrator::new());
        fake.seed_plan("1-1", "1-1", "1", ServiceKind::CacheCluster, true);
        let f = facade(fake, vec!["1".to_string()]);
        f.provision("corr-1", "inst-1", "1-1", serde_json::Map::new(), true, None).await.unwrap();

        let mut params = serde_json::Map::new();
        params.insert("foo".to_string(), serde_json::json!("bar"));
        let err = f.provision("corr-1", "inst-1", "1-1", params, true, None).await.unwrap_err();
        assert_eq!(err.key, "already-exists");
    }

    #[tokio::test]
    async fn bind_on_non_ready_instance_fails_without_touching_orchestrator() {
        let fake = Arc::new(FakeOrchestrator::new());
        fake.seed_plan("1-1", "1-1", "1", ServiceKind::CacheCluster, true);
        let f = facade(fake.clone(), vec!["1".to_string()]);
        f.provision("corr-1", "inst-1", "1-1", serde_json::Map::new(), true, None).await.unwrap();
        let before = fake.object_count();

        let err = f.bind("corr-1", "inst-1", "b-1", "1-1").await.unwrap_err();
        assert_eq!(err.key, "concurrent-instance-access");
        assert_eq!(fake.object_count(), before);
    }

    #[tokio::test]
    async fn last_operation_projects_creating_as_in_progress() {
        let fake = Arc::new(FakeOrchestrator::new());
        fake.seed_plan("1-1", "1-1", "1", ServiceKind::CacheCluster, true);
        let f = facade(fake, vec!["1".to_string()]);
        f.provision("corr-1", "inst-1", "1-1", serde_json::Map::new(), true, None).await.unwrap();
        let last = f.last_operation("corr-1", "inst-1", "1-1").await.unwrap();
        assert_eq!(last.state, OsbState::InProgress);
    }
}
