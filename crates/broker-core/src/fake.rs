//! In-memory fake orchestrator for facade-level tests, standing in for a real cluster the way
//! the teacher's test suites pass a constructed `KnowledgeStore` instead of a live database.

use crate::error::OrchestratorError;
use crate::labels;
use crate::model::{Gvk, ServiceKind};
use crate::orchestrator::{CompositeObject, LabelSelector, Orchestrator, OwnerRef, Propagation, Secret};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

type ObjectKey = (String, Option<String>, String); // (kind, namespace, name)

#[derive(Default)]
pub struct FakeOrchestrator {
    objects: Mutex<BTreeMap<ObjectKey, CompositeObject>>,
    secrets: Mutex<BTreeMap<(String, String), Secret>>,
}

impl FakeOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(gvk: &Gvk, namespace: Option<&str>, name: &str) -> ObjectKey {
        (gvk.kind.clone(), namespace.map(str::to_string), name.to_string())
    }

    /// Seeds an XRD (service definition) with `displayName` set in its metadata annotation.
    pub fn seed_xrd(&self, service_id: &str, kind: ServiceKind, display_name: &str) {
        let gvk = xrd_gvk();
        let mut labels_map = BTreeMap::new();
        labels_map.insert(labels::key_id(), service_id.to_string());
        labels_map.insert(labels::key_cluster(), kind.as_str().to_string());
        let mut annotations = BTreeMap::new();
        annotations.insert(
            labels::ANNOTATION_METADATA.to_string(),
            serde_json::json!({ "displayName": display_name }).to_string(),
        );
        let obj = CompositeObject {
            name: service_id.to_string(),
            namespace: None,
            labels: labels_map,
            annotations,
            spec: serde_json::json!({}),
            status: serde_json::json!({}),
        };
        self.objects.lock().unwrap().insert(Self::key(&gvk, None, service_id), obj);
    }

    /// Seeds a plan (composition).
    pub fn seed_plan(&self, plan_id: &str, plan_name: &str, service_id: &str, kind: ServiceKind, bindable: bool) {
        let gvk = composition_gvk();
        let mut labels_map = BTreeMap::new();
        labels_map.insert(labels::key_id(), service_id.to_string());
        labels_map.insert(labels::key_name(), plan_name.to_string());
        labels_map.insert(labels::key_plan(), plan_id.to_string());
        labels_map.insert(labels::key_cluster(), kind.as_str().to_string());
        labels_map.insert(labels::key_sla(), String::new());
        labels_map.insert(labels::key_bindable(), bindable.to_string());
        let obj = CompositeObject {
            name: plan_id.to_string(),
            namespace: None,
            labels: labels_map,
            annotations: BTreeMap::new(),
            spec: serde_json::json!({}),
            status: serde_json::json!({}),
        };
        self.objects.lock().unwrap().insert(Self::key(&gvk, None, plan_id), obj);
    }

    /// Seeds an instance (composite) directly, bypassing Create, for test setup.
    pub fn seed_instance(&self, gvk: &Gvk, object: CompositeObject) {
        self.objects.lock().unwrap().insert(Self::key(gvk, object.namespace.as_deref(), &object.name), object);
    }

    pub fn seed_secret(&self, secret: Secret) {
        self.secrets.lock().unwrap().insert((secret.namespace.clone(), secret.name.clone()), secret);
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

pub fn xrd_gvk() -> Gvk {
    Gvk {
        group: "apiextensions.crossplane.io".to_string(),
        version: "v1".to_string(),
        kind: "CompositeResourceDefinition".to_string(),
    }
}

pub fn composition_gvk() -> Gvk {
    Gvk {
        group: "apiextensions.crossplane.io".to_string(),
        version: "v1".to_string(),
        kind: "Composition".to_string(),
    }
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn get(&self, gvk: &Gvk, namespace: Option<&str>, name: &str) -> Result<Option<CompositeObject>, OrchestratorError> {
        Ok(self.objects.lock().unwrap().get(&Self::key(gvk, namespace, name)).cloned())
    }

    async fn list(&self, gvk: &Gvk, namespace: Option<&str>, selector: &LabelSelector) -> Result<Vec<CompositeObject>, OrchestratorError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((kind, ns, _), _)| kind == &gvk.kind && (namespace.is_none() || ns.as_deref() == namespace))
            .map(|(_, v)| v.clone())
            .filter(|obj| selector.matches(&obj.labels))
            .collect())
    }

    async fn create(&self, gvk: &Gvk, namespace: Option<&str>, object: CompositeObject) -> Result<CompositeObject, OrchestratorError> {
        let key = Self::key(gvk, namespace, &object.name);
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(OrchestratorError::Status { status: Some(409), message: "already exists".into() });
        }
        objects.insert(key, object.clone());
        Ok(object)
    }

    async fn update(&self, gvk: &Gvk, namespace: Option<&str>, object: CompositeObject) -> Result<CompositeObject, OrchestratorError> {
        let key = Self::key(gvk, namespace, &object.name);
        self.objects.lock().unwrap().insert(key, object.clone());
        Ok(object)
    }

    async fn delete(&self, gvk: &Gvk, namespace: Option<&str>, name: &str, _propagation: Propagation) -> Result<(), OrchestratorError> {
        let key = Self::key(gvk, namespace, name);
        self.objects.lock().unwrap().remove(&key);
        Ok(())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, OrchestratorError> {
        Ok(self.secrets.lock().unwrap().get(&(namespace.to_string(), name.to_string())).cloned())
    }

    async fn create_secret(&self, secret: Secret) -> Result<(), OrchestratorError> {
        self.secrets.lock().unwrap().insert((secret.namespace.clone(), secret.name.clone()), secret);
        Ok(())
    }

    async fn set_secret_owner(&self, namespace: &str, secret_name: &str, owner: OwnerRef) -> Result<(), OrchestratorError> {
        let mut secrets = self.secrets.lock().unwrap();
        let secret = secrets
            .get_mut(&(namespace.to_string(), secret_name.to_string()))
            .ok_or(OrchestratorError::NotFound)?;
        secret.owner = Some(owner);
        Ok(())
    }
}
