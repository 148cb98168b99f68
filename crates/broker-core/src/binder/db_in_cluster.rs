//! Database-in-cluster binder (spec §4.5.3).

use super::{BinderSettings, ServiceBinder};
use crate::credentials::{assemble_db_credentials, DbCredentialInputs};
use crate::error::{BrokerError, OrchestratorError};
use crate::labels;
use crate::model::{ConnectionSecret, Gvk, Instance, ReadyCondition, ServiceKind};
use crate::orchestrator::{CompositeObject, Orchestrator, OwnerRef, Propagation, Secret};
use crate::plan_registry::default_gvk_for;
use async_trait::async_trait;
use rand::Rng;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const PASSWORD_LEN: usize = 24;
const PASSWORD_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const UNBIND_WAIT_CEILING: Duration = Duration::from_secs(5);
const UNBIND_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct DbInClusterBinder {
    orchestrator: Arc<dyn Orchestrator>,
    settings: BinderSettings,
}

impl DbInClusterBinder {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, settings: BinderSettings) -> Self {
        Self { orchestrator, settings }
    }

    fn user_gvk() -> Gvk {
        Gvk {
            group: "composites.broker.example.org".to_string(),
            version: "v1alpha1".to_string(),
            kind: "MariaDbUser".to_string(),
        }
    }

    fn parent_gvk() -> Gvk {
        default_gvk_for(ServiceKind::DbCluster)
    }

    fn generate_password() -> String {
        let mut rng = rand::thread_rng();
        (0..PASSWORD_LEN)
            .map(|_| PASSWORD_CHARSET[rng.gen_range(0..PASSWORD_CHARSET.len())] as char)
            .collect()
    }

    /// Polls for the user composite to disappear, bounded by `UNBIND_WAIT_CEILING`. Used as the
    /// watch/poll-loop alternative to an unconditional sleep (spec §9) when the password secret
    /// could not be re-parented onto the User resource's owner reference.
    async fn wait_for_user_gone(&self, binding_id: &str) {
        let gvk = Self::user_gvk();
        let deadline = tokio::time::Instant::now() + UNBIND_WAIT_CEILING;
        while tokio::time::Instant::now() < deadline {
            match self.orchestrator.get(&gvk, None, binding_id).await {
                Ok(None) => return,
                _ => tokio::time::sleep(UNBIND_POLL_INTERVAL).await,
            }
        }
    }

    async fn credentials_from_secret(&self, instance: &Instance, binding_id: &str, secret: &ConnectionSecret, password: &str) -> Result<serde_json::Value, BrokerError> {
        let endpoint = secret.require_str("endpoint")?;
        let port: i32 = secret
            .require_str("port")?
            .parse()
            .map_err(|_| BrokerError::Upstream("parent connection secret port is not an integer".to_string()))?;
        let parent_id = instance
            .labels
            .parent_id
            .clone()
            .ok_or_else(|| BrokerError::Upstream("instance missing parent id label".to_string()))?;

        Ok(assemble_db_credentials(DbCredentialInputs {
            endpoint: &endpoint,
            port,
            username: binding_id,
            password,
            database: &instance.instance_id,
            parent_id: &parent_id,
            cluster_name: &parent_id,
            monitoring_enabled: self.settings.monitoring_enabled,
            monitoring_domain: self.settings.monitoring_domain.as_deref(),
        }))
    }
}

#[async_trait]
impl ServiceBinder for DbInClusterBinder {
    /// Decodes the supplied JSON parameters; requires a `parent_reference` string; verifies the
    /// referenced db-cluster composite exists; returns the full map for storage (spec §4.5.3).
    async fn validate_provision_params(
        &self,
        params: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Map<String, serde_json::Value>, BrokerError> {
        let parent_ref = params
            .get("parent_reference")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BrokerError::Validation("valid \"parent_reference\" required: missing".to_string()))?
            .to_string();

        let found = self.orchestrator.get(&Self::parent_gvk(), None, &parent_ref).await?;
        if found.is_none() {
            return Err(BrokerError::Validation(format!(
                "valid \"parent_reference\" required: {parent_ref:?} not found"
            )));
        }
        Ok(params)
    }

    async fn bind(&self, instance: &Instance, binding_id: &str) -> Result<serde_json::Value, BrokerError> {
        let parent_id = instance
            .labels
            .parent_id
            .clone()
            .ok_or_else(|| BrokerError::Validation("instance has no parent reference".to_string()))?;

        let parent = self
            .orchestrator
            .get(&Self::parent_gvk(), None, &parent_id)
            .await?
            .ok_or_else(|| BrokerError::Validation(format!("parent cluster {parent_id:?} not found")))?;

        let password = Self::generate_password();
        let secret_name = format!("{binding_id}-password");
        let mut secret_labels = BTreeMap::new();
        secret_labels.insert(labels::key_instance(), instance.instance_id.clone());
        secret_labels.insert(labels::key_parent(), parent_id.clone());
        let mut secret_data = BTreeMap::new();
        secret_data.insert("password".to_string(), password.clone().into_bytes());
        self.orchestrator
            .create_secret(Secret {
                name: secret_name,
                namespace: self.settings.namespace.clone(),
                labels: secret_labels,
                data: secret_data,
                owner: None,
            })
            .await?;

        let user_object = CompositeObject {
            name: binding_id.to_string(),
            namespace: None,
            labels: Default::default(),
            annotations: Default::default(),
            spec: json!({
                "compositionRef": { "name": "mariadb-user" },
                "parameters": { "parent_reference": parent_id },
            }),
            status: json!({}),
        };
        match self.orchestrator.create(&Self::user_gvk(), None, user_object).await {
            Ok(_) => {}
            Err(OrchestratorError::Status { status: Some(409), .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let parent_secret_name = parent.connection_secret_name();
        let parent_secret = self
            .orchestrator
            .get_secret(&self.settings.namespace, &parent_secret_name)
            .await?
            .ok_or_else(|| BrokerError::Upstream(format!("parent connection secret {parent_secret_name:?} not found")))?;
        let conn = ConnectionSecret { data: parent_secret.data };

        self.credentials_from_secret(instance, binding_id, &conn, &password).await
    }

    /// Re-parents the password secret onto the user-composite's underlying User resource, then
    /// deletes the user-composite with foreground propagation (spec §4.5.3, §9).
    async fn unbind(&self, _instance: &Instance, binding_id: &str) -> Result<(), BrokerError> {
        let user_gvk = Self::user_gvk();
        let secret_name = format!("{binding_id}-password");

        if let Some(user_obj) = self.orchestrator.get(&user_gvk, None, binding_id).await? {
            let owner = OwnerRef {
                api_version: format!("{}/{}", user_gvk.group, user_gvk.version),
                kind: "User".to_string(),
                name: binding_id.to_string(),
                uid: user_obj.annotations.get("broker.example.org/user-uid").cloned().unwrap_or_default(),
            };
            if self
                .orchestrator
                .set_secret_owner(&self.settings.namespace, &secret_name, owner)
                .await
                .is_err()
            {
                self.wait_for_user_gone(binding_id).await;
            }
        }

        match self.orchestrator.delete(&user_gvk, None, binding_id, Propagation::Foreground).await {
            Ok(()) => Ok(()),
            Err(OrchestratorError::NotFound) => Ok(()),
            Err(e) => Err(BrokerError::Upstream(e.to_string())),
        }
    }

    /// Always admissible — deprovisioning is handled by the parent cluster's binder (spec §4.5.3).
    async fn deprovisionable(&self, _instance: &Instance) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn get_binding(&self, instance: &Instance, binding_id: &str) -> Result<serde_json::Value, BrokerError> {
        let user_gvk = Self::user_gvk();
        let user = self
            .orchestrator
            .get(&user_gvk, None, binding_id)
            .await?
            .ok_or(BrokerError::BindingNotFound)?;

        if user.ready_condition() != ReadyCondition::Available {
            return Err(BrokerError::BindingNotReady);
        }

        let parent_id = instance
            .labels
            .parent_id
            .clone()
            .ok_or_else(|| BrokerError::Upstream("instance missing parent id label".to_string()))?;
        let parent = self
            .orchestrator
            .get(&Self::parent_gvk(), None, &parent_id)
            .await?
            .ok_or_else(|| BrokerError::Upstream(format!("parent cluster {parent_id:?} not found")))?;
        let parent_secret_name = parent.connection_secret_name();
        let parent_secret = self
            .orchestrator
            .get_secret(&self.settings.namespace, &parent_secret_name)
            .await?
            .ok_or(BrokerError::NotReady)?;
        let conn = ConnectionSecret { data: parent_secret.data };

        let password_secret_name = format!("{binding_id}-password");
        let password_secret = self
            .orchestrator
            .get_secret(&self.settings.namespace, &password_secret_name)
            .await?
            .ok_or_else(|| BrokerError::Upstream(format!("password secret {password_secret_name:?} not found")))?;
        let password = password_secret
            .data
            .get("password")
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .ok_or_else(|| BrokerError::Upstream(format!("password secret {password_secret_name:?} missing password key")))?;

        self.credentials_from_secret(instance, binding_id, &conn, &password).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeOrchestrator;
    use crate::model::InstanceLabels;

    fn instance(id: &str, parent: &str) -> Instance {
        Instance {
            instance_id: id.to_string(),
            labels: InstanceLabels {
                service_kind: ServiceKind::DbInCluster,
                service_id: "3".into(),
                plan_name: "db".into(),
                plan_size: "db".into(),
                sla: String::new(),
                instance_id: id.to_string(),
                parent_id: Some(parent.to_string()),
                bindable: true,
                updatable: false,
                deleted: false,
                principal: None,
            },
            parameters: Default::default(),
            composition_ref: "db".into(),
            connection_secret_ref: None,
            ready: ReadyCondition::Available,
        }
    }

    fn settings() -> BinderSettings {
        BinderSettings { namespace: "broker".to_string(), monitoring_enabled: false, monitoring_domain: None }
    }

    #[tokio::test]
    async fn validate_provision_params_requires_existing_parent() {
        let fake = Arc::new(FakeOrchestrator::new());
        let binder = DbInClusterBinder::new(fake, settings());
        let mut params = serde_json::Map::new();
        params.insert("parent_reference".to_string(), json!("non-existent"));
        let err = binder.validate_provision_params(params).await.unwrap_err();
        match err {
            BrokerError::Validation(msg) => {
                assert!(msg.contains("parent_reference"));
                assert!(msg.contains("not found"));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn validate_provision_params_accepts_existing_parent() {
        let fake = Arc::new(FakeOrchestrator::new());
        let parent_gvk = DbInClusterBinder::parent_gvk();
        fake.seed_instance(&parent_gvk, CompositeObject { name: "cluster-1".to_string(), ..Default::default() });
        let binder = DbInClusterBinder::new(fake, settings());
        let mut params = serde_json::Map::new();
        params.insert("parent_reference".to_string(), json!("cluster-1"));
        let result = binder.validate_provision_params(params.clone()).await.unwrap();
        assert_eq!(result, params);
    }

    #[tokio::test]
    async fn bind_then_get_binding_returns_equivalent_credentials() {
        let fake = Arc::new(FakeOrchestrator::new());
        let parent_gvk = DbInClusterBinder::parent_gvk();
        let mut parent_spec = serde_json::Map::new();
        parent_spec.insert(
            "writeConnectionSecretToRef".to_string(),
            json!({"name": "cluster-1-connection"}),
        );
        fake.seed_instance(
            &parent_gvk,
            CompositeObject {
                name: "cluster-1".to_string(),
                spec: serde_json::Value::Object(parent_spec),
                ..Default::default()
            },
        );
        let mut parent_secret_data = BTreeMap::new();
        parent_secret_data.insert("endpoint".to_string(), b"mariadb.svc".to_vec());
        parent_secret_data.insert("port".to_string(), b"3306".to_vec());
        fake.seed_secret(Secret {
            name: "cluster-1-connection".to_string(),
            namespace: "broker".to_string(),
            labels: Default::default(),
            data: parent_secret_data,
            owner: None,
        });

        let binder = DbInClusterBinder::new(fake.clone(), settings());
        let inst = instance("inst-1", "cluster-1");
        let bind_creds = binder.bind(&inst, "binding-1").await.unwrap();
        assert_eq!(bind_creds["host"], "mariadb.svc");
        assert_eq!(bind_creds["user"], "binding-1");
        assert_eq!(bind_creds["uri"], bind_creds["database_uri"]);

        // Mark the user-composite Ready so GetBinding considers the binding usable.
        let user_gvk = DbInClusterBinder::user_gvk();
        fake.seed_instance(
            &user_gvk,
            CompositeObject {
                name: "binding-1".to_string(),
                status: json!({"conditions": [{"type": "Ready", "reason": "Available"}]}),
                ..Default::default()
            },
        );
        let get_creds = binder.get_binding(&inst, "binding-1").await.unwrap();
        assert_eq!(get_creds["host"], bind_creds["host"]);
        assert_eq!(get_creds["user"], bind_creds["user"]);
        assert_eq!(get_creds["password"], bind_creds["password"]);
    }

    #[tokio::test]
    async fn get_binding_not_ready_when_user_composite_absent() {
        let fake = Arc::new(FakeOrchestrator::new());
        let binder = DbInClusterBinder::new(fake, settings());
        let inst = instance("inst-1", "cluster-1");
        let err = binder.get_binding(&inst, "binding-1").await.unwrap_err();
        assert!(matches!(err, BrokerError::BindingNotFound));
    }

    #[tokio::test]
    async fn deprovisionable_is_always_admissible() {
        let fake = Arc::new(FakeOrchestrator::new());
        let binder = DbInClusterBinder::new(fake, settings());
        let inst = instance("inst-1", "cluster-1");
        assert!(binder.deprovisionable(&inst).await.is_ok());
    }
}
