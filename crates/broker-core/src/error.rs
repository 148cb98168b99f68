//! OSB-compliant error taxonomy (spec §7), built on `thiserror` the way
//! `pagi-federation`'s `FederationError` is — one flat enum, one `#[error(...)]` per kind.

use thiserror::Error;

/// A broker-level failure, already classified by kind so the HTTP layer can pick a status
/// code and an OSB JSON error body without re-inspecting the message.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("{0}")]
    Validation(String),

    #[error("instance does not exist")]
    InstanceNotFound,

    #[error("binding does not exist")]
    BindingNotFound,

    #[error("plan does not exist: {0}")]
    PlanNotFound(String),

    /// An instance exists under the requested id but its stored plan-name label does not match
    /// the plan the caller supplied. Distinguished from `InstanceNotFound` per spec §9's open
    /// question; callers decide how to surface it (the facade maps it to "not found" to match
    /// the documented source behavior — see DESIGN.md).
    #[error("instance {instance_id} exists under a different plan")]
    PlanMismatch { instance_id: String },

    #[error("instance already exists")]
    AlreadyExists,

    #[error("concurrent instance access")]
    NotReady,

    /// The binding's own composite (e.g. a db-in-cluster user-composite) isn't Ready yet,
    /// distinct from the instance-level `NotReady` precondition (spec §4.5.3 GetBinding).
    #[error("binding not ready")]
    BindingNotReady,

    #[error("update-instance-failed: {0}")]
    PlanChangeNotPermitted(String),

    #[error("update-instance-failed: service id may not change")]
    ServiceUpdateNotPermitted,

    #[error("async required")]
    AsyncRequired,

    #[error("{0}")]
    BindingNotSupported(String),

    #[error("not implemented")]
    NotImplemented,

    #[error("{0}")]
    Policy(String),

    #[error("{0}")]
    Upstream(String),
}

impl BrokerError {
    /// The stable OSB error key the HTTP layer writes into the response body's `error` field.
    pub fn osb_key(&self) -> &'static str {
        match self {
            BrokerError::Validation(_) => "ValidationError",
            BrokerError::InstanceNotFound | BrokerError::PlanMismatch { .. } => "not-found",
            BrokerError::BindingNotFound => "not-found",
            BrokerError::PlanNotFound(_) => "not-found",
            BrokerError::AlreadyExists => "already-exists",
            BrokerError::NotReady | BrokerError::BindingNotReady => "concurrent-instance-access",
            BrokerError::PlanChangeNotPermitted(_) => "update-instance-failed",
            BrokerError::ServiceUpdateNotPermitted => "update-instance-failed",
            BrokerError::AsyncRequired => "async-required",
            BrokerError::BindingNotSupported(_) => "BindingNotSupported",
            BrokerError::NotImplemented => "not-implemented",
            BrokerError::Policy(_) => "policy-violation",
            BrokerError::Upstream(_) => "internal-server-error",
        }
    }

    /// The HTTP status spec §7 prescribes for this kind. `Upstream` defers to whatever status
    /// the orchestrator error itself carried, if any (see `OrchestratorError::http_status`).
    pub fn http_status(&self) -> u16 {
        match self {
            BrokerError::Validation(_) | BrokerError::BindingNotSupported(_) => 422,
            BrokerError::InstanceNotFound
            | BrokerError::PlanMismatch { .. }
            | BrokerError::BindingNotFound
            | BrokerError::PlanNotFound(_) => 410,
            BrokerError::AlreadyExists => 409,
            BrokerError::NotReady | BrokerError::BindingNotReady => 422,
            BrokerError::PlanChangeNotPermitted(_) | BrokerError::ServiceUpdateNotPermitted => 422,
            BrokerError::AsyncRequired => 422,
            BrokerError::NotImplemented => 501,
            BrokerError::Policy(_) => 422,
            BrokerError::Upstream(_) => 500,
        }
    }

    /// Appends the request correlation id to the user-visible message, per spec §7.
    pub fn with_correlation(self, correlation_id: &str) -> CorrelatedError {
        CorrelatedError {
            message: format!("{self} (correlation-id: \"{correlation_id}\")"),
            key: self.osb_key(),
            status: self.http_status(),
            source: self,
        }
    }
}

/// A `BrokerError` stamped with a correlation id, ready to serialize as an OSB error body.
/// Logged at `error!` by the facade before being returned, per spec §7.
#[derive(Debug)]
pub struct CorrelatedError {
    pub message: String,
    pub key: &'static str,
    pub status: u16,
    pub source: BrokerError,
}

impl std::fmt::Display for CorrelatedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CorrelatedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Errors from the orchestrator client (spec §6's "abstracted" interface).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("orchestrator error: {message}")]
    Status { status: Option<u16>, message: String },

    #[error("not found")]
    NotFound,
}

impl OrchestratorError {
    /// If the underlying orchestrator error carried an HTTP status, it is preserved verbatim
    /// per spec §7; otherwise the caller falls back to 500.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            OrchestratorError::Status { status, .. } => *status,
            OrchestratorError::NotFound => Some(404),
        }
    }
}

impl From<OrchestratorError> for BrokerError {
    fn from(e: OrchestratorError) -> Self {
        match e.http_status() {
            Some(status) => BrokerError::Upstream(format!("{e} (status {status})")),
            None => BrokerError::Upstream(e.to_string()),
        }
    }
}
