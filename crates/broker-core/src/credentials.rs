//! Credential assembler (spec §4.6): a pure function from connection details to an OSB
//! credentials object. Deterministic; always emits both `uri` and `database_uri` (identical
//! strings) for compatibility with OSB clients that read either key.

use serde_json::{json, Value};

/// Inputs to the database credential assembler, grounded on spec §4.5.3's Bind/GetBinding shape.
pub struct DbCredentialInputs<'a> {
    pub endpoint: &'a str,
    pub port: i32,
    pub username: &'a str,
    pub password: &'a str,
    pub database: &'a str,
    pub parent_id: &'a str,
    pub cluster_name: &'a str,
    pub monitoring_enabled: bool,
    pub monitoring_domain: Option<&'a str>,
}

pub fn assemble_db_credentials(inputs: DbCredentialInputs) -> Value {
    let uri = format!(
        "mysql://{}:{}@{}:{}/{}?reconnect=true",
        inputs.username, inputs.password, inputs.endpoint, inputs.port, inputs.database
    );
    let jdbc_url = format!(
        "jdbc:mysql://{}:{}/{}?user={}&password={}",
        inputs.endpoint, inputs.port, inputs.database, inputs.username, inputs.password
    );
    let jdbc_url_mariadb = format!(
        "jdbc:mariadb://{}:{}/{}?user={}&password={}",
        inputs.endpoint, inputs.port, inputs.database, inputs.username, inputs.password
    );

    let mut creds = json!({
        "host": inputs.endpoint,
        "hostname": inputs.endpoint,
        "port": inputs.port,
        "name": inputs.database,
        "database": inputs.database,
        "user": inputs.username,
        "password": inputs.password,
        "uri": uri,
        "database_uri": uri,
        "jdbcUrl": jdbc_url,
        "jdbcUrlMariaDb": jdbc_url_mariadb,
    });

    if inputs.monitoring_enabled {
        if let Some(domain) = inputs.monitoring_domain {
            let endpoints: Vec<String> = (0..3)
                .map(|i| format!("http://{}-{}.{domain}/metrics", inputs.cluster_name, i))
                .collect();
            creds["metrics"] = json!(endpoints.clone());
            creds["metricsEndpoints"] = json!(endpoints);
        }
    }

    let _ = inputs.parent_id; // retained for signature fidelity with spec §4.6; not embedded in output today
    creds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_and_database_uri_are_identical() {
        let creds = assemble_db_credentials(DbCredentialInputs {
            endpoint: "mariadb.svc",
            port: 3306,
            username: "binding-1",
            password: "pw",
            database: "inst-1",
            parent_id: "parent-1",
            cluster_name: "cluster-1",
            monitoring_enabled: false,
            monitoring_domain: None,
        });
        assert_eq!(creds["uri"], creds["database_uri"]);
    }

    #[test]
    fn monitoring_disabled_omits_metrics() {
        let creds = assemble_db_credentials(DbCredentialInputs {
            endpoint: "mariadb.svc",
            port: 3306,
            username: "u",
            password: "p",
            database: "d",
            parent_id: "parent",
            cluster_name: "cluster",
            monitoring_enabled: false,
            monitoring_domain: Some("metrics.example.org"),
        });
        assert!(creds.get("metrics").is_none());
    }

    #[test]
    fn monitoring_enabled_emits_metrics_urls() {
        let creds = assemble_db_credentials(DbCredentialInputs {
            endpoint: "mariadb.svc",
            port: 3306,
            username: "u",
            password: "p",
            database: "d",
            parent_id: "parent",
            cluster_name: "cluster",
            monitoring_enabled: true,
            monitoring_domain: Some("metrics.example.org"),
        });
        assert_eq!(creds["metrics"].as_array().unwrap().len(), 3);
    }
}
