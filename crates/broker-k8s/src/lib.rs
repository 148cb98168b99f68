//! kube-backed [`Orchestrator`] implementation.
//!
//! Composite resources are addressed as [`kube::api::DynamicObject`] and resolved via runtime
//! discovery (`kube::discovery::pinned_kind`) rather than compiled-in CRD types, since the broker
//! has no build-time knowledge of the XRDs/Compositions a given cluster installs. Connection and
//! password secrets go through the typed `k8s_openapi` `Secret` since their shape is fixed.

use async_trait::async_trait;
use broker_core::{CompositeObject, Gvk, LabelSelector, Orchestrator, OrchestratorError, OwnerRef, Propagation, Secret};
use k8s_openapi::api::core::v1::Secret as K8sSecret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference as K8sOwnerReference;
use k8s_openapi::ByteString;
use kube::api::{Api, DeleteParams, DynamicObject, GroupVersionKind, ListParams, ObjectMeta, Patch, PatchParams, PostParams, PropagationPolicy, TypeMeta};
use kube::core::discovery;
use kube::discovery::pinned_kind;
use kube::Client;

pub struct KubeOrchestrator {
    client: Client,
    default_namespace: String,
}

impl KubeOrchestrator {
    /// Connects using the ambient kubeconfig / in-cluster service account, the way
    /// `kube::Client::try_default` is used throughout the operator examples in the pack.
    pub async fn connect(default_namespace: impl Into<String>) -> Result<Self, kube::Error> {
        let client = Client::try_default().await?;
        Ok(Self { client, default_namespace: default_namespace.into() })
    }

    pub fn new(client: Client, default_namespace: impl Into<String>) -> Self {
        Self { client, default_namespace: default_namespace.into() }
    }

    async fn api_for(&self, gvk: &Gvk, namespace: Option<&str>) -> Result<Api<DynamicObject>, OrchestratorError> {
        let kube_gvk = GroupVersionKind { group: gvk.group.clone(), version: gvk.version.clone(), kind: gvk.kind.clone() };
        let (resource, caps) = pinned_kind(&self.client, &kube_gvk)
            .await
            .map_err(|e| OrchestratorError::Status { status: None, message: format!("discovery failed for {kube_gvk:?}: {e}") })?;

        Ok(match caps.scope {
            discovery::Scope::Namespaced => Api::namespaced_with(self.client.clone(), namespace.unwrap_or(&self.default_namespace), &resource),
            discovery::Scope::Cluster => Api::all_with(self.client.clone(), &resource),
        })
    }
}

fn classify_kube_error(e: kube::Error) -> OrchestratorError {
    match e {
        kube::Error::Api(resp) if resp.code == 404 => OrchestratorError::NotFound,
        kube::Error::Api(resp) => OrchestratorError::Status { status: Some(resp.code), message: resp.message },
        other => OrchestratorError::Status { status: None, message: other.to_string() },
    }
}

fn label_selector_string(selector: &LabelSelector) -> String {
    selector.0.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",")
}

fn to_dynamic(gvk: &Gvk, namespace: Option<&str>, object: CompositeObject) -> DynamicObject {
    let mut metadata = ObjectMeta { name: Some(object.name), ..Default::default() };
    metadata.namespace = namespace.map(str::to_string).or(object.namespace);
    metadata.labels = Some(object.labels);
    metadata.annotations = Some(object.annotations);

    let mut data = serde_json::Map::new();
    data.insert("spec".to_string(), object.spec);
    data.insert("status".to_string(), object.status);

    DynamicObject {
        types: Some(TypeMeta { api_version: format!("{}/{}", gvk.group, gvk.version), kind: gvk.kind.clone() }),
        metadata,
        data: serde_json::Value::Object(data),
    }
}

fn from_dynamic(object: DynamicObject) -> CompositeObject {
    CompositeObject {
        name: object.metadata.name.unwrap_or_default(),
        namespace: object.metadata.namespace,
        labels: object.metadata.labels.unwrap_or_default(),
        annotations: object.metadata.annotations.unwrap_or_default(),
        spec: object.data.get("spec").cloned().unwrap_or(serde_json::json!({})),
        status: object.data.get("status").cloned().unwrap_or(serde_json::json!({})),
    }
}

fn to_k8s_secret(secret: Secret) -> K8sSecret {
    let owner_references = secret.owner.map(|o| vec![to_owner_reference(o)]);
    K8sSecret {
        metadata: ObjectMeta {
            name: Some(secret.name),
            namespace: Some(secret.namespace),
            labels: Some(secret.labels),
            owner_references,
            ..Default::default()
        },
        data: Some(secret.data.into_iter().map(|(k, v)| (k, ByteString(v))).collect()),
        ..Default::default()
    }
}

fn from_k8s_secret(namespace: &str, secret: K8sSecret) -> Secret {
    Secret {
        name: secret.metadata.name.unwrap_or_default(),
        namespace: namespace.to_string(),
        labels: secret.metadata.labels.unwrap_or_default(),
        data: secret.data.unwrap_or_default().into_iter().map(|(k, v)| (k, v.0)).collect(),
        owner: None,
    }
}

fn to_owner_reference(owner: OwnerRef) -> K8sOwnerReference {
    K8sOwnerReference {
        api_version: owner.api_version,
        kind: owner.kind,
        name: owner.name,
        uid: owner.uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

#[async_trait]
impl Orchestrator for KubeOrchestrator {
    async fn get(&self, gvk: &Gvk, namespace: Option<&str>, name: &str) -> Result<Option<CompositeObject>, OrchestratorError> {
        let api = self.api_for(gvk, namespace).await?;
        match api.get(name).await {
            Ok(obj) => Ok(Some(from_dynamic(obj))),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(None),
            Err(e) => Err(classify_kube_error(e)),
        }
    }

    async fn list(&self, gvk: &Gvk, namespace: Option<&str>, selector: &LabelSelector) -> Result<Vec<CompositeObject>, OrchestratorError> {
        let api = self.api_for(gvk, namespace).await?;
        let selector_str = label_selector_string(selector);
        let params = if selector_str.is_empty() { ListParams::default() } else { ListParams::default().labels(&selector_str) };
        let list = api.list(&params).await.map_err(classify_kube_error)?;
        Ok(list.items.into_iter().map(from_dynamic).collect())
    }

    async fn create(&self, gvk: &Gvk, namespace: Option<&str>, object: CompositeObject) -> Result<CompositeObject, OrchestratorError> {
        let api = self.api_for(gvk, namespace).await?;
        let dynamic = to_dynamic(gvk, namespace, object);
        let created = api.create(&PostParams::default(), &dynamic).await.map_err(classify_kube_error)?;
        Ok(from_dynamic(created))
    }

    async fn update(&self, gvk: &Gvk, namespace: Option<&str>, object: CompositeObject) -> Result<CompositeObject, OrchestratorError> {
        let api = self.api_for(gvk, namespace).await?;
        let name = object.name.clone();
        let dynamic = to_dynamic(gvk, namespace, object);
        let updated = api.replace(&name, &PostParams::default(), &dynamic).await.map_err(classify_kube_error)?;
        Ok(from_dynamic(updated))
    }

    async fn delete(&self, gvk: &Gvk, namespace: Option<&str>, name: &str, propagation: Propagation) -> Result<(), OrchestratorError> {
        let api = self.api_for(gvk, namespace).await?;
        let policy = match propagation {
            Propagation::Foreground => PropagationPolicy::Foreground,
            Propagation::Background => PropagationPolicy::Background,
        };
        let params = DeleteParams { propagation_policy: Some(policy), ..Default::default() };
        match api.delete(name, &params).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(classify_kube_error(e)),
        }
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, OrchestratorError> {
        let api: Api<K8sSecret> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(secret) => Ok(Some(from_k8s_secret(namespace, secret))),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(None),
            Err(e) => Err(classify_kube_error(e)),
        }
    }

    async fn create_secret(&self, secret: Secret) -> Result<(), OrchestratorError> {
        let namespace = secret.namespace.clone();
        let api: Api<K8sSecret> = Api::namespaced(self.client.clone(), &namespace);
        let k8s_secret = to_k8s_secret(secret);
        api.create(&PostParams::default(), &k8s_secret).await.map_err(classify_kube_error)?;
        Ok(())
    }

    async fn set_secret_owner(&self, namespace: &str, secret_name: &str, owner: OwnerRef) -> Result<(), OrchestratorError> {
        let api: Api<K8sSecret> = Api::namespaced(self.client.clone(), namespace);
        let patch = K8sSecret {
            metadata: ObjectMeta { owner_references: Some(vec![to_owner_reference(owner)]), ..Default::default() },
            ..Default::default()
        };
        api.patch(secret_name, &PatchParams::default(), &Patch::Merge(&patch)).await.map_err(classify_kube_error)?;
        Ok(())
    }
}
