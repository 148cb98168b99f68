//! Label/annotation codec (spec §4.1).
//!
//! Reads the orchestrator's string-to-string label map into a typed [`InstanceLabels`], and the
//! inverse: composes a label map for create/update from a plan plus an instance id and principal.
//!
//! Label key mapping (the keys themselves are named in spec §6; the spec does not pin each key to
//! a field, so this mapping is a DESIGN.md-recorded decision, not a silent guess):
//!
//! | key suffix | field          |
//! |------------|----------------|
//! | `id`       | service id     |
//! | `name`     | plan name      |
//! | `plan`     | plan id        |
//! | `cluster`  | service kind   |
//! | `sla`      | SLA            |
//! | `instance` | instance id    |
//! | `parent`   | parent id      |
//! | `bindable` | bindable flag  |
//! | `updatable`| updatable flag |
//! | `deleted`  | deleted flag   |
//! | `principal`| principal      |

use crate::error::BrokerError;
use crate::model::{InstanceLabels, ServiceKind};
use std::collections::BTreeMap;

pub const LABEL_BASE: &str = "broker.example.org";

pub fn key_id() -> String { format!("{LABEL_BASE}/id") }
pub fn key_name() -> String { format!("{LABEL_BASE}/name") }
pub fn key_plan() -> String { format!("{LABEL_BASE}/plan") }
pub fn key_cluster() -> String { format!("{LABEL_BASE}/cluster") }
pub fn key_sla() -> String { format!("{LABEL_BASE}/sla") }
pub fn key_instance() -> String { format!("{LABEL_BASE}/instance") }
pub fn key_parent() -> String { format!("{LABEL_BASE}/parent") }
pub fn key_bindable() -> String { format!("{LABEL_BASE}/bindable") }
pub fn key_updatable() -> String { format!("{LABEL_BASE}/updatable") }
pub fn key_deleted() -> String { format!("{LABEL_BASE}/deleted") }
pub fn key_principal() -> String { format!("{LABEL_BASE}/principal") }

pub const ANNOTATION_DESCRIPTION: &str = "broker.example.org/description";
pub const ANNOTATION_METADATA: &str = "broker.example.org/metadata";
pub const ANNOTATION_TAGS: &str = "broker.example.org/tags";

/// Splits `{size}-{sla}` into `(size, sla)`. If no SLA suffix is present, the whole name is the
/// size and the SLA is empty, per spec §4.1.
pub fn split_plan_name<'a>(plan_name: &'a str, sla: &str) -> (&'a str, &'a str) {
    let suffix = format!("-{sla}");
    match plan_name.strip_suffix(suffix.as_str()) {
        Some(size) => (size, sla),
        None => (plan_name, ""),
    }
}

fn parse_bool(raw: Option<&String>, default: bool, field: &str) -> Result<bool, BrokerError> {
    match raw {
        None => Ok(default),
        Some(s) => match s.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(BrokerError::Validation(format!(
                "invalid boolean value {other:?} for label {field}"
            ))),
        },
    }
}

/// Parses a raw string-to-string label map into typed [`InstanceLabels`].
pub fn parse_labels(raw: &BTreeMap<String, String>) -> Result<InstanceLabels, BrokerError> {
    let kind_str = raw.get(&key_cluster()).ok_or_else(|| {
        BrokerError::Validation(format!("missing label {}", key_cluster()))
    })?;
    let service_kind = ServiceKind::parse(kind_str)
        .ok_or_else(|| BrokerError::Validation(format!("unknown service kind {kind_str:?}")))?;

    let service_id = raw
        .get(&key_id())
        .ok_or_else(|| BrokerError::Validation(format!("missing label {}", key_id())))?
        .clone();

    let plan_name = raw
        .get(&key_name())
        .ok_or_else(|| BrokerError::Validation(format!("missing label {}", key_name())))?
        .clone();

    let sla = raw.get(&key_sla()).cloned().unwrap_or_default();
    let (plan_size, _) = split_plan_name(&plan_name, &sla);
    let plan_size = plan_size.to_string();

    let instance_id = raw
        .get(&key_instance())
        .ok_or_else(|| BrokerError::Validation(format!("missing label {}", key_instance())))?
        .clone();

    let parent_id = raw.get(&key_parent()).cloned();
    let bindable = parse_bool(raw.get(&key_bindable()), true, "bindable")?;
    let updatable = parse_bool(raw.get(&key_updatable()), false, "updatable")?;
    let deleted = parse_bool(raw.get(&key_deleted()), false, "deleted")?;
    let principal = raw.get(&key_principal()).cloned();

    Ok(InstanceLabels {
        service_kind,
        service_id,
        plan_name,
        plan_size,
        sla,
        instance_id,
        parent_id,
        bindable,
        updatable,
        deleted,
        principal,
    })
}

/// Composes the label map for a new or updated instance: fixed keys copied from the plan, plus
/// the instance id, an optional parent id, and the requesting principal.
pub fn emit_labels(
    plan: &crate::model::Plan,
    instance_id: &str,
    parent_id: Option<&str>,
    principal: Option<&str>,
) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    out.insert(key_id(), plan.service_id.clone());
    out.insert(key_name(), plan.plan_name.clone());
    out.insert(key_plan(), plan.plan_id.clone());
    out.insert(key_cluster(), plan.service_kind.as_str().to_string());
    out.insert(key_sla(), plan.sla.clone());
    out.insert(key_instance(), instance_id.to_string());
    out.insert(key_bindable(), plan.bindable.to_string());
    out.insert(key_updatable(), "false".to_string());
    out.insert(key_deleted(), "false".to_string());
    if let Some(parent) = parent_id {
        out.insert(key_parent(), parent.to_string());
    }
    if let Some(p) = principal {
        out.insert(key_principal(), p.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> crate::model::Plan {
        crate::model::Plan {
            plan_id: "1-1".into(),
            plan_name: "small-standard".into(),
            plan_size: "small".into(),
            sla: "standard".into(),
            service_id: "1".into(),
            service_kind: ServiceKind::CacheCluster,
            gvk: crate::model::Gvk { group: "g".into(), version: "v1".into(), kind: "RedisCluster".into() },
            description: "d".into(),
            tags: vec![],
            metadata: serde_json::json!({}),
            bindable: true,
        }
    }

    #[test]
    fn split_plan_name_strips_sla_suffix() {
        assert_eq!(split_plan_name("small-standard", "standard"), ("small", "standard"));
    }

    #[test]
    fn split_plan_name_falls_back_to_whole_name() {
        assert_eq!(split_plan_name("small", "standard"), ("small", ""));
    }

    #[test]
    fn round_trip_label_emit_then_parse() {
        let plan = sample_plan();
        let raw = emit_labels(&plan, "inst-1", Some("parent-1"), Some("alice"));
        let parsed = parse_labels(&raw).unwrap();
        assert_eq!(parsed.service_kind, plan.service_kind);
        assert_eq!(parsed.service_id, plan.service_id);
        assert_eq!(parsed.plan_name, plan.plan_name);
        assert_eq!(parsed.plan_size, "small");
        assert_eq!(parsed.sla, plan.sla);
        assert_eq!(parsed.instance_id, "inst-1");
        assert_eq!(parsed.parent_id.as_deref(), Some("parent-1"));
        assert!(parsed.bindable);
        assert!(!parsed.updatable);
        assert!(!parsed.deleted);
        assert_eq!(parsed.principal.as_deref(), Some("alice"));
    }

    #[test]
    fn unknown_service_kind_fails_validation() {
        let mut raw = BTreeMap::new();
        raw.insert(key_cluster(), "something-else".to_string());
        raw.insert(key_id(), "1".to_string());
        raw.insert(key_name(), "small".to_string());
        raw.insert(key_instance(), "i1".to_string());
        let err = parse_labels(&raw).unwrap_err();
        assert!(matches!(err, BrokerError::Validation(_)));
    }

    #[test]
    fn unknown_boolean_value_fails_validation() {
        let plan = sample_plan();
        let mut raw = emit_labels(&plan, "inst-1", None, None);
        raw.insert(key_bindable(), "maybe".to_string());
        let err = parse_labels(&raw).unwrap_err();
        assert!(matches!(err, BrokerError::Validation(_)));
    }
}
