//! OSB v2 gateway binary: wires the `broker-k8s` orchestrator, `broker-core`'s facade, HTTP
//! auth/metrics middleware, and an axum router into a runnable service.

mod auth;
mod config;
mod error;
mod handlers;
mod state;

use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{BoxError, Router};
use broker_core::{BrokerFacade, InstanceRepository, PlanRegistry, PlanUpdateRules};
use broker_k8s::KubeOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::auth::{require_auth, JwtVerifier};
use crate::config::GatewayConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::from_env().unwrap_or_else(|err| {
        tracing::error!(error = %err, "invalid gateway configuration");
        std::process::exit(1);
    });

    let metrics_handle = if config.enable_metrics {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .install_recorder()
            .map_err(|err| tracing::warn!(error = %err, "failed to install the Prometheus recorder, continuing without /metrics"))
            .ok()
    } else {
        None
    };

    let jwt = load_jwt_verifier(&config);

    let orchestrator: Arc<dyn broker_core::Orchestrator> = Arc::new(
        KubeOrchestrator::connect(config.namespace.clone())
            .await
            .unwrap_or_else(|err| {
                tracing::error!(error = %err, "failed to connect to the Kubernetes API");
                std::process::exit(1);
            }),
    );

    let registry = Arc::new(PlanRegistry::new(orchestrator.clone(), config.service_ids.clone()));
    let instances = Arc::new(InstanceRepository::new(orchestrator.clone(), registry.clone(), config.service_ids.clone()));
    let binder_settings = broker_core::BinderSettings {
        namespace: config.namespace.clone(),
        monitoring_enabled: config.monitoring_enabled,
        monitoring_domain: config.monitoring_domain.clone(),
    };
    let update_rules = PlanUpdateRules::new(&config.plan_update_size_rules, &config.plan_update_sla_rules);
    let facade = BrokerFacade::new(orchestrator, registry, instances, binder_settings, update_rules);

    let listen_addr = config.listen_addr.clone();
    let state = Arc::new(AppState { facade, config, jwt, metrics: metrics_handle });

    let app = build_router(state);

    tracing::info!(addr = %listen_addr, "starting OSB gateway");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await.unwrap_or_else(|err| {
        tracing::error!(error = %err, addr = %listen_addr, "failed to bind listen address");
        std::process::exit(1);
    });
    axum::serve(listener, app).await.unwrap_or_else(|err| {
        tracing::error!(error = %err, "gateway server exited");
    });
}

fn load_jwt_verifier(config: &GatewayConfig) -> Option<JwtVerifier> {
    if let Some(path) = &config.jwt_jwk_path {
        return JwtVerifier::from_jwk(path, &config.username_claim)
            .map_err(|err| tracing::error!(error = %err, "failed to load JWT JWK keys, bearer auth disabled"))
            .ok();
    }
    if let Some(path) = &config.jwt_pem_path {
        return JwtVerifier::from_pem(path, &config.username_claim)
            .map_err(|err| tracing::error!(error = %err, "failed to load JWT PEM key, bearer auth disabled"))
            .ok();
    }
    None
}

async fn handle_timeout(err: BoxError) -> (StatusCode, String) {
    (StatusCode::REQUEST_TIMEOUT, format!("request did not complete in time: {err}"))
}

fn build_router(state: Arc<AppState>) -> Router {
    let request_timeout = Duration::from_secs(state.config.read_timeout_secs.max(state.config.write_timeout_secs));
    let max_body_bytes = state.config.max_body_bytes;

    let osb = Router::new()
        .route("/v2/catalog", get(handlers::catalog))
        .route("/v2/service_instances/:instance_id", put(handlers::provision).delete(handlers::deprovision).get(handlers::get_instance).patch(handlers::update))
        .route("/v2/service_instances/:instance_id/last_operation", get(handlers::last_operation))
        .route(
            "/v2/service_instances/:instance_id/service_bindings/:binding_id",
            put(handlers::bind).delete(handlers::unbind).get(handlers::get_binding),
        )
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth));

    let timeout = ServiceBuilder::new().layer(HandleErrorLayer::new(handle_timeout)).layer(TimeoutLayer::new(request_timeout));

    Router::new()
        .route("/healthz", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .merge(osb)
        .layer(TraceLayer::new_for_http())
        .layer(timeout)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}
