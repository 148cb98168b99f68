use crate::auth::JwtVerifier;
use crate::config::GatewayConfig;
use broker_core::BrokerFacade;
use metrics_exporter_prometheus::PrometheusHandle;

pub struct AppState {
    pub facade: BrokerFacade,
    pub config: GatewayConfig,
    pub jwt: Option<JwtVerifier>,
    pub metrics: Option<PrometheusHandle>,
}
