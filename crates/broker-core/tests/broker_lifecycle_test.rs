//! Integration test: a full OSB lifecycle through [`BrokerFacade`] against [`FakeOrchestrator`].
//!
//! Verifies that:
//! 1. Provision creates a composite labeled for its plan.
//! 2. A not-yet-ready instance refuses Bind.
//! 3. Once the composite reports Ready, Bind and GetBinding return matching credentials read
//!    from the connection secret.
//! 4. LastOperation projects the Ready condition as `succeeded`.
//! 5. Update moves the instance to a plan the rule engine admits, and rejects one it doesn't.
//! 6. Deprovision removes the composite.

use broker_core::{
    BinderSettings, BrokerFacade, FakeOrchestrator, InstanceRepository, OsbState, PlanRegistry, PlanUpdateRules,
    ProvisionResult, ServiceKind,
};
use std::collections::BTreeMap;
use std::sync::Arc;

const SERVICE_ID: &str = "1";
const NAMESPACE: &str = "broker";

fn facade(fake: Arc<FakeOrchestrator>) -> BrokerFacade {
    let registry = Arc::new(PlanRegistry::new(fake.clone(), vec![SERVICE_ID.to_string()]));
    let instances = Arc::new(InstanceRepository::new(fake.clone(), registry.clone(), vec![SERVICE_ID.to_string()]));
    let settings = BinderSettings { namespace: NAMESPACE.to_string(), monitoring_enabled: false, monitoring_domain: None };
    let update_rules = PlanUpdateRules::new("small>large", "");
    BrokerFacade::new(fake, registry, instances, settings, update_rules)
}

/// Flips the composite's Ready condition to `Available`, the way a Crossplane controller would
/// once the underlying `RedisCluster` resource settles.
async fn mark_ready(fake: &FakeOrchestrator, gvk: &broker_core::Gvk, instance_id: &str) {
    let mut obj = fake.get(gvk, None, instance_id).await.unwrap().expect("instance must exist to be marked ready");
    obj.status = serde_json::json!({ "conditions": [ { "type": "Ready", "reason": "Available" } ] });
    fake.update(gvk, None, obj).await.unwrap();
}

fn seed_connection_secret(fake: &FakeOrchestrator, secret_name: &str) {
    let mut data = BTreeMap::new();
    data.insert("endpoint".to_string(), b"redis-1.broker.svc".to_vec());
    data.insert("port".to_string(), b"6379".to_vec());
    data.insert("password".to_string(), b"s3cr3t".to_vec());
    data.insert("sentinelPort".to_string(), b"26379".to_vec());
    fake.seed_secret(broker_core::Secret {
        name: secret_name.to_string(),
        namespace: NAMESPACE.to_string(),
        labels: Default::default(),
        data,
        owner: None,
    });
}

#[tokio::test]
async fn provision_bind_update_unbind_deprovision_round_trip() {
    let fake = Arc::new(FakeOrchestrator::new());
    fake.seed_xrd(SERVICE_ID, ServiceKind::CacheCluster, "redis-k8s");
    fake.seed_plan("1-small", "small", SERVICE_ID, ServiceKind::CacheCluster, true);
    fake.seed_plan("1-large", "large", SERVICE_ID, ServiceKind::CacheCluster, true);
    let f = facade(fake.clone());

    let instance_id = "inst-1";
    let provisioned = f
        .provision("corr-1", instance_id, "1-small", serde_json::Map::new(), true, Some(broker_core::Principal::new("alice")))
        .await
        .expect("provision should succeed");
    let gvk = match provisioned {
        ProvisionResult::Created(instance) => {
            assert_eq!(instance.labels.plan_name, "small");
            assert_eq!(instance.labels.principal.as_deref(), Some("alice"));
            broker_core::plan_registry::default_gvk_for(ServiceKind::CacheCluster)
        }
        ProvisionResult::AlreadyExists => panic!("first provision must create the instance"),
    };

    let not_ready_err = f.bind("corr-1", instance_id, "bind-1", "1-small").await.unwrap_err();
    assert_eq!(not_ready_err.key, "concurrent-instance-access");

    mark_ready(&fake, &gvk, instance_id).await;
    let secret_name = format!("{instance_id}-connection");
    seed_connection_secret(&fake, &secret_name);

    let bind_creds = f.bind("corr-1", instance_id, "bind-1", "1-small").await.expect("bind should succeed once ready");
    assert_eq!(bind_creds["host"], "redis-1.broker.svc");
    assert_eq!(bind_creds["port"], 6379);
    assert_eq!(bind_creds["password"], "s3cr3t");

    let get_binding_creds = f.get_binding("corr-1", instance_id, "bind-1").await.expect("get_binding should succeed");
    assert_eq!(get_binding_creds, bind_creds);

    let last_op = f.last_operation("corr-1", instance_id, "1-small").await.expect("last_operation should succeed");
    assert_eq!(last_op.state, OsbState::Succeeded);
    assert_eq!(last_op.description, "Available");

    let rejected = f.update("corr-1", instance_id, SERVICE_ID, "1-small", "1-large").await;
    // small>large is in the rule set, so this update is admitted and returns the updated instance.
    let updated = rejected.expect("small to large is an admitted transition");
    assert_eq!(updated.labels.plan_name, "large");
    assert_eq!(updated.composition_ref, "1-large");

    let disallowed = f.update("corr-1", instance_id, SERVICE_ID, "1-large", "1-small").await.unwrap_err();
    assert_eq!(disallowed.key, "update-instance-failed");

    f.unbind("corr-1", instance_id, "bind-1", "1-large").await.expect("unbind should succeed");

    f.deprovision("corr-1", instance_id, "1-large").await.expect("deprovision should succeed");
    let gone = f.get_instance("corr-1", instance_id).await.unwrap_err();
    assert_eq!(gone.key, "not-found");
}

#[tokio::test]
async fn update_across_services_is_rejected() {
    let fake = Arc::new(FakeOrchestrator::new());
    fake.seed_xrd(SERVICE_ID, ServiceKind::CacheCluster, "redis-k8s");
    fake.seed_plan("1-small", "small", SERVICE_ID, ServiceKind::CacheCluster, true);
    fake.seed_plan("2-small", "small", "2", ServiceKind::CacheCluster, true);
    let f = facade(fake.clone());

    f.provision("corr-1", "inst-2", "1-small", serde_json::Map::new(), true, None).await.unwrap();

    let err = f.update("corr-1", "inst-2", "2", "1-small", "2-small").await.unwrap_err();
    assert_eq!(err.key, "update-instance-failed");
}

#[tokio::test]
async fn deprovision_of_unknown_instance_reports_not_found() {
    let fake = Arc::new(FakeOrchestrator::new());
    fake.seed_plan("1-small", "small", SERVICE_ID, ServiceKind::CacheCluster, true);
    let f = facade(fake);

    let err = f.deprovision("corr-1", "missing", "1-small").await.unwrap_err();
    assert_eq!(err.key, "not-found");
    assert!(err.message.contains("corr-1"));
}
