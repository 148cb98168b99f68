//! Plan registry (spec §4.2): lists XRDs and compositions, projects them onto the OSB catalog,
//! and exposes single-plan lookup.

use crate::error::BrokerError;
use crate::labels;
use crate::model::{Gvk, Plan, ServiceKind};
use crate::orchestrator::{LabelSelector, Orchestrator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// OSB catalog entry for one service, with its plans attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsbService {
    #[serde(rename = "id")]
    pub service_id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
    pub bindable: bool,
    #[serde(rename = "plan_updateable")]
    pub plan_updatable: bool,
    pub instances_retrievable: bool,
    pub bindings_retrievable: bool,
    pub plans: Vec<OsbPlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsbPlan {
    #[serde(rename = "id")]
    pub plan_id: String,
    pub name: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub free: bool,
    pub bindable: bool,
}

/// The composition group/version/kind the broker expects each XRD to declare, so it can build a
/// typed [`Gvk`] handle without a separate schema fetch.
const COMPOSITE_GVKS: &[(&str, &str)] = &[
    ("cache-cluster", "RedisCluster"),
    ("db-cluster", "MariaDbCluster"),
    ("db-in-cluster", "MariaDbDatabase"),
];

pub fn default_gvk_for(kind: ServiceKind) -> Gvk {
    let kind_name = COMPOSITE_GVKS
        .iter()
        .find(|(k, _)| *k == kind.as_str())
        .map(|(_, n)| *n)
        .unwrap_or("Unknown");
    Gvk {
        group: "composites.broker.example.org".to_string(),
        version: "v1alpha1".to_string(),
        kind: kind_name.to_string(),
    }
}

/// XRD group/version/kind: a fixed, well-known type the broker lists to discover services.
fn xrd_gvk() -> Gvk {
    Gvk {
        group: "apiextensions.crossplane.io".to_string(),
        version: "v1".to_string(),
        kind: "CompositeResourceDefinition".to_string(),
    }
}

/// Composition group/version/kind: a fixed, well-known type the broker lists to discover plans.
fn composition_gvk() -> Gvk {
    Gvk {
        group: "apiextensions.crossplane.io".to_string(),
        version: "v1".to_string(),
        kind: "Composition".to_string(),
    }
}

pub struct PlanRegistry {
    orchestrator: Arc<dyn Orchestrator>,
    allowed_service_ids: Vec<String>,
}

impl PlanRegistry {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, allowed_service_ids: Vec<String>) -> Self {
        Self { orchestrator, allowed_service_ids }
    }

    /// Lists services whose service-id label is in the broker-configured allow-list, each
    /// carrying its plans (spec §4.2 "List services").
    pub async fn list_services(&self) -> Result<Vec<OsbService>, BrokerError> {
        let xrd_gvk = xrd_gvk();
        let all_xrds = self.orchestrator.list(&xrd_gvk, None, &LabelSelector::default()).await?;

        let mut services = Vec::new();
        for xrd in all_xrds {
            let service_id = match xrd.labels.get(&labels::key_id()) {
                Some(id) if self.allowed_service_ids.iter().any(|a| a == id) => id.clone(),
                _ => continue,
            };

            let service_kind_str = xrd.labels.get(&labels::key_cluster()).cloned().unwrap_or_default();
            let service_kind = ServiceKind::parse(&service_kind_str);

            let (tags, metadata, description) = parse_catalog_annotations(&xrd.annotations, &service_kind_str);

            let plans = self.list_plans_by_service_ids(&[service_id.clone()]).await?;

            services.push(OsbService {
                service_id,
                name: description_or_kind(&description, &service_kind_str),
                description: xrd.annotations.get(labels::ANNOTATION_DESCRIPTION).cloned().unwrap_or_default(),
                tags,
                metadata,
                bindable: true,
                plan_updatable: true,
                instances_retrievable: true,
                bindings_retrievable: true,
                plans: plans
                    .into_iter()
                    .map(|p| OsbPlan {
                        plan_id: p.plan_id,
                        name: p.plan_name,
                        description: p.description,
                        metadata: p.metadata,
                        free: false,
                        bindable: p.bindable,
                    })
                    .collect(),
            });
            let _ = service_kind;
        }
        Ok(services)
    }

    /// Fetches a single composition by name (spec §4.2 "Get plan by id").
    pub async fn get_plan(&self, plan_id: &str) -> Result<Option<Plan>, BrokerError> {
        let gvk = composition_gvk();
        let Some(obj) = self.orchestrator.get(&gvk, None, plan_id).await? else {
            return Ok(None);
        };
        Ok(Some(plan_from_composition(&obj)?))
    }

    /// Lists plans sharing any of the given service ids, sorted lexicographically by plan-name
    /// label to produce a stable catalog (spec §4.2 "List plans by service ids").
    pub async fn list_plans_by_service_ids(&self, service_ids: &[String]) -> Result<Vec<Plan>, BrokerError> {
        let gvk = composition_gvk();
        let mut out = Vec::new();
        for service_id in service_ids {
            let selector = LabelSelector::eq(labels::key_id(), service_id.clone());
            let objs = self.orchestrator.list(&gvk, None, &selector).await?;
            for obj in objs {
                out.push(plan_from_composition(&obj)?);
            }
        }
        out.sort_by(|a, b| a.plan_name.cmp(&b.plan_name));
        Ok(out)
    }
}

fn plan_from_composition(obj: &crate::orchestrator::CompositeObject) -> Result<Plan, BrokerError> {
    let parsed = labels::parse_labels(&obj.labels)?;
    let gvk = default_gvk_for(parsed.service_kind);
    let (tags, metadata, _) = parse_catalog_annotations(&obj.annotations, parsed.service_kind.as_str());
    Ok(Plan {
        plan_id: obj.labels.get(&labels::key_plan()).cloned().unwrap_or_else(|| obj.name.clone()),
        plan_name: parsed.plan_name,
        plan_size: parsed.plan_size,
        sla: parsed.sla,
        service_id: parsed.service_id,
        service_kind: parsed.service_kind,
        gvk,
        description: obj.annotations.get(labels::ANNOTATION_DESCRIPTION).cloned().unwrap_or_default(),
        tags,
        metadata,
        bindable: parsed.bindable,
    })
}

/// Parses the `metadata`/`tags` annotations as JSON. Parse failures are logged and fall back to
/// `displayName = service-kind` (spec §4.2).
fn parse_catalog_annotations(
    annotations: &BTreeMap<String, String>,
    service_kind: &str,
) -> (Vec<String>, serde_json::Value, Option<String>) {
    let tags = annotations
        .get(labels::ANNOTATION_TAGS)
        .and_then(|raw| match serde_json::from_str::<Vec<String>>(raw) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse tags annotation, ignoring");
                None
            }
        })
        .unwrap_or_default();

    let metadata = annotations
        .get(labels::ANNOTATION_METADATA)
        .and_then(|raw| match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse metadata annotation, ignoring");
                None
            }
        })
        .unwrap_or_else(|| serde_json::json!({}));

    let display_name = metadata
        .get("displayName")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .or_else(|| Some(service_kind.to_string()));

    (tags, metadata, display_name)
}

fn description_or_kind(display_name: &Option<String>, service_kind: &str) -> String {
    display_name.clone().unwrap_or_else(|| service_kind.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeOrchestrator;

    #[tokio::test]
    async fn catalog_scenario_from_spec() {
        let fake = Arc::new(FakeOrchestrator::new());
        fake.seed_xrd("1", ServiceKind::CacheCluster, "redis-k8s");
        fake.seed_plan("1-1", "1-1", "1", ServiceKind::CacheCluster, true);
        fake.seed_plan("1-2", "1-2", "1", ServiceKind::CacheCluster, true);

        let registry = PlanRegistry::new(fake, vec!["1".to_string()]);
        let services = registry.list_services().await.unwrap();

        assert_eq!(services.len(), 1);
        let svc = &services[0];
        assert_eq!(svc.service_id, "1");
        assert_eq!(svc.name, "redis-k8s");
        assert!(svc.instances_retrievable);
        assert!(svc.bindings_retrievable);
        assert!(svc.plan_updatable);
        let mut plan_ids: Vec<_> = svc.plans.iter().map(|p| p.plan_id.clone()).collect();
        plan_ids.sort();
        assert_eq!(plan_ids, vec!["1-1".to_string(), "1-2".to_string()]);
    }
}
