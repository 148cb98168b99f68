//! broker-core: OSB-to-composite translation layer.
//!
//! Label/annotation codec, plan registry, plan-update rule engine, instance repository, service
//! binder dispatcher, credential assembler, and the broker operations facade. Depends on nothing
//! beyond the [`Orchestrator`] trait — transport, auth, and process wiring live in the gateway
//! binary and the `broker-k8s` crate.

pub mod binder;
pub mod credentials;
pub mod error;
pub mod facade;
pub mod fake;
pub mod instance_repo;
pub mod labels;
pub mod model;
pub mod orchestrator;
pub mod plan_registry;
pub mod principal;
pub mod rule_engine;

pub use binder::{binder_for, BinderSettings, ServiceBinder};
pub use credentials::{assemble_db_credentials, DbCredentialInputs};
pub use error::{BrokerError, CorrelatedError, OrchestratorError};
pub use facade::{BrokerFacade, GetInstanceResponse, LastOperationResponse, OsbState, ProvisionResult};
pub use fake::FakeOrchestrator;
pub use instance_repo::InstanceRepository;
pub use model::{ConnectionSecret, Gvk, Instance, InstanceLabels, Plan, ReadyCondition, ServiceDefinition, ServiceKind};
pub use orchestrator::{CompositeObject, LabelSelector, Orchestrator, OwnerRef, Propagation, Secret};
pub use plan_registry::{OsbPlan, OsbService, PlanRegistry};
pub use principal::{Principal, PrincipalSource};
pub use rule_engine::{PlanUpdateRules, TransitionRules};
