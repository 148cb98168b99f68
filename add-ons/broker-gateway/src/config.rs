//! Gateway configuration loaded from the environment (`.env` supported via `dotenvy`).

/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | OSB_SERVICE_IDS | (required) | comma-separated allow-list of OSB service ids the broker serves |
/// | OSB_USERNAME / OSB_PASSWORD | (required) | HTTP Basic credentials accepted by the auth middleware |
/// | OSB_NAMESPACE | (required) | namespace the orchestrator creates/reads composites and password secrets in |
/// | OSB_HTTP_LISTEN_ADDR | 0.0.0.0:8080 | address the gateway binds |
/// | OSB_HTTP_READ_TIMEOUT / OSB_HTTP_WRITE_TIMEOUT | 180 | seconds |
/// | OSB_HTTP_MAX_HEADER_BYTES | 1048576 | request body size cap enforced by the router (see DESIGN.md) |
/// | OSB_USERNAME_CLAIM | sub | JWT claim used as the principal when bearer auth is used |
/// | OSB_JWT_KEYS_JWK_PATH / OSB_JWT_KEYS_PEM_PATH | unset | bearer auth key material; unset disables bearer auth |
/// | ENABLE_METRICS | false | expose `GET /metrics` (Prometheus); requires `METRICS_DOMAIN` |
/// | OSB_MONITORING_ENABLED | false | whether binders assemble per-binding monitoring URLs |
/// | METRICS_DOMAIN | unset | domain suffix used when assembling those monitoring URLs |
/// | OSB_PLAN_UPDATE_SIZE_RULES / OSB_PLAN_UPDATE_SLA_RULES | empty | `old>new\|old>new` transition rule strings |
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub service_ids: Vec<String>,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub listen_addr: String,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub max_body_bytes: usize,
    pub username_claim: String,
    pub jwt_jwk_path: Option<String>,
    pub jwt_pem_path: Option<String>,
    pub enable_metrics: bool,
    pub monitoring_enabled: bool,
    pub monitoring_domain: Option<String>,
    pub plan_update_size_rules: String,
    pub plan_update_sla_rules: String,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, String> {
        let service_ids = env_csv("OSB_SERVICE_IDS");
        if service_ids.is_empty() {
            return Err("OSB_SERVICE_IDS must name at least one service id".to_string());
        }
        let username = env_required("OSB_USERNAME")?;
        let password = env_required("OSB_PASSWORD")?;
        let namespace = env_required("OSB_NAMESPACE")?;

        let enable_metrics = env_bool("ENABLE_METRICS", false);
        let monitoring_domain = env_opt_string("METRICS_DOMAIN");
        if enable_metrics && monitoring_domain.is_none() {
            return Err("METRICS_DOMAIN must be set when ENABLE_METRICS is true".to_string());
        }

        Ok(Self {
            service_ids,
            username,
            password,
            namespace,
            listen_addr: env_string("OSB_HTTP_LISTEN_ADDR", "0.0.0.0:8080"),
            read_timeout_secs: env_u64("OSB_HTTP_READ_TIMEOUT", 180),
            write_timeout_secs: env_u64("OSB_HTTP_WRITE_TIMEOUT", 180),
            max_body_bytes: env_u64("OSB_HTTP_MAX_HEADER_BYTES", 1_048_576) as usize,
            username_claim: env_string("OSB_USERNAME_CLAIM", "sub"),
            jwt_jwk_path: env_opt_string("OSB_JWT_KEYS_JWK_PATH"),
            jwt_pem_path: env_opt_string("OSB_JWT_KEYS_PEM_PATH"),
            enable_metrics,
            monitoring_enabled: env_bool("OSB_MONITORING_ENABLED", false),
            monitoring_domain,
            plan_update_size_rules: std::env::var("OSB_PLAN_UPDATE_SIZE_RULES").unwrap_or_default(),
            plan_update_sla_rules: std::env::var("OSB_PLAN_UPDATE_SLA_RULES").unwrap_or_default(),
        })
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => v.trim().eq_ignore_ascii_case("true") || (v.trim().is_empty() && default),
        Err(_) => default,
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn env_required(name: &str) -> Result<String, String> {
    env_opt_string(name).ok_or_else(|| format!("{name} must be set"))
}

fn env_csv(name: &str) -> Vec<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}
