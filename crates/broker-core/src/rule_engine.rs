//! Plan-update rule engine (spec §4.3): parses two rule strings and decides whether a
//! (old-plan, new-plan) pair is an admissible update.

use crate::model::Plan;
use std::collections::BTreeSet;

/// A set of admissible `(from, to)` token transitions, parsed from a `old1>new1|old2>new2|...`
/// rule string. Unknown tokens simply never match, per spec §4.3.
#[derive(Debug, Clone, Default)]
pub struct TransitionRules {
    pairs: BTreeSet<(String, String)>,
}

impl TransitionRules {
    pub fn parse(raw: &str) -> Self {
        let pairs = raw
            .split('|')
            .filter(|rule| !rule.is_empty())
            .filter_map(|rule| rule.split_once('>'))
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        Self { pairs }
    }

    pub fn allows(&self, from: &str, to: &str) -> bool {
        self.pairs.contains(&(from.to_string(), to.to_string()))
    }
}

/// Constructed from the two rule strings (spec §4.3); `AllowUpdate` is the sole decision point.
pub struct PlanUpdateRules {
    size_rules: TransitionRules,
    sla_rules: TransitionRules,
}

impl PlanUpdateRules {
    pub fn new(size_rules_raw: &str, sla_rules_raw: &str) -> Self {
        Self {
            size_rules: TransitionRules::parse(size_rules_raw),
            sla_rules: TransitionRules::parse(sla_rules_raw),
        }
    }

    /// `AllowUpdate(from, to)` per spec §4.3.
    pub fn allow_update(&self, from: &Plan, to: &Plan) -> bool {
        if from.service_id != to.service_id {
            return false;
        }

        let size_changed = from.plan_size != to.plan_size;
        let sla_changed = from.sla != to.sla;

        if size_changed && sla_changed {
            return false;
        }

        if size_changed {
            return self.size_rules.allows(&from.plan_size, &to.plan_size);
        }
        if sla_changed {
            return self.sla_rules.allows(&from.sla, &to.sla);
        }
        // Neither changed: no-op update, always allowed.
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Gvk, ServiceKind};

    fn plan(service_id: &str, size: &str, sla: &str) -> Plan {
        Plan {
            plan_id: format!("{service_id}-{size}-{sla}"),
            plan_name: format!("{size}-{sla}"),
            plan_size: size.to_string(),
            sla: sla.to_string(),
            service_id: service_id.to_string(),
            service_kind: ServiceKind::DbInCluster,
            gvk: Gvk { group: "g".into(), version: "v1".into(), kind: "K".into() },
            description: String::new(),
            tags: vec![],
            metadata: serde_json::json!({}),
            bindable: true,
        }
    }

    #[test]
    fn same_plan_is_always_allowed() {
        let rules = PlanUpdateRules::new("", "");
        let p = plan("1", "small", "standard");
        assert!(rules.allow_update(&p, &p));
    }

    #[test]
    fn different_service_id_is_never_allowed() {
        let rules = PlanUpdateRules::new("small>large", "standard>premium");
        let a = plan("1", "small", "standard");
        let b = plan("2", "small", "standard");
        assert!(!rules.allow_update(&a, &b));
    }

    #[test]
    fn both_size_and_sla_changing_is_never_allowed() {
        let rules = PlanUpdateRules::new("small>large", "standard>premium");
        let a = plan("1", "small", "standard");
        let b = plan("1", "large", "premium");
        assert!(!rules.allow_update(&a, &b));
    }

    #[test]
    fn size_change_requires_matching_rule() {
        let rules = PlanUpdateRules::new("small>large", "");
        let a = plan("1", "small", "standard");
        let b = plan("1", "large", "standard");
        assert!(rules.allow_update(&a, &b));

        let c = plan("1", "medium", "standard");
        assert!(!rules.allow_update(&a, &c));
    }

    #[test]
    fn plan_update_rejected_scenario_from_spec() {
        // size rules empty, sla rules standard>premium|premium>standard
        let rules = PlanUpdateRules::new("", "standard>premium|premium>standard");
        let small_standard = plan("1", "small", "standard");
        let large_standard = plan("1", "large", "standard");
        assert!(!rules.allow_update(&small_standard, &large_standard));
    }

    #[test]
    fn plan_update_accepted_scenario_from_spec() {
        let rules = PlanUpdateRules::new("", "standard>premium|premium>standard");
        let small_standard = plan("1", "small", "standard");
        let small_premium = plan("1", "small", "premium");
        assert!(rules.allow_update(&small_standard, &small_premium));
    }

    #[test]
    fn unknown_tokens_are_rejected() {
        let rules = PlanUpdateRules::new("small>large", "");
        let a = plan("1", "tiny", "standard");
        let b = plan("1", "huge", "standard");
        assert!(!rules.allow_update(&a, &b));
    }
}
