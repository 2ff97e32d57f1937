//! Administrative whitelist of rules eligible for auto-justification.
//!
//! The whitelist maps a portfolio to the rule ids approved for it. Filtering
//! admits an entry when its portfolio is a key and its rule id appears in
//! the union of every portfolio's rules; the rule set is deliberately not
//! checked per portfolio.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use tracing::debug;

use crate::pipeline::types::{MonitorEntry, RuleDetailEntry};

/// Portfolio → approved rule ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Whitelist {
    scopes: BTreeMap<String, BTreeSet<i64>>,
}

impl Whitelist {
    pub fn new<I, R>(scopes: I) -> Self
    where
        I: IntoIterator<Item = (String, R)>,
        R: IntoIterator<Item = i64>,
    {
        Self {
            scopes: scopes
                .into_iter()
                .map(|(portfolio, rules)| (portfolio, rules.into_iter().collect()))
                .collect(),
        }
    }

    /// Parse the JSON form used in configuration: `{"P1": [10, 20]}`.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Number of portfolios in scope.
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn covers_portfolio(&self, portfolio_id: &str) -> bool {
        self.scopes.contains_key(portfolio_id)
    }

    /// Union of every portfolio's approved rules.
    pub fn rule_ids(&self) -> BTreeSet<i64> {
        self.scopes.values().flatten().copied().collect()
    }

    /// Flagged positions whose portfolio is in scope, in input order.
    pub fn scoped_positions<'a>(&self, monitor: &'a [MonitorEntry]) -> Vec<&'a MonitorEntry> {
        monitor
            .iter()
            .filter(|m| self.covers_portfolio(&m.portfolio_id))
            .collect()
    }

    /// Keep only whitelisted entries, preserving order.
    pub fn filter(&self, entries: &[RuleDetailEntry]) -> Vec<RuleDetailEntry> {
        let rules = self.rule_ids();
        let kept: Vec<RuleDetailEntry> = entries
            .iter()
            .filter(|e| self.covers_portfolio(&e.source_portfolio) && rules.contains(&e.rule_id))
            .cloned()
            .collect();

        debug!(
            total = entries.len(),
            kept = kept.len(),
            "Applied rule whitelist"
        );
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::PositionDate;

    fn entry(portfolio: &str, message_id: &str, rule_id: i64) -> RuleDetailEntry {
        RuleDetailEntry {
            message_id: message_id.into(),
            rule_id,
            rule_name: None,
            exploded: false,
            variant_id: None,
            source_portfolio: portfolio.into(),
        }
    }

    fn whitelist() -> Whitelist {
        Whitelist::new([
            ("P1".to_string(), vec![10, 11]),
            ("P2".to_string(), vec![20]),
        ])
    }

    #[test]
    fn parses_json_mapping() {
        let wl = Whitelist::from_json(r#"{"P1": [10, 11], "P2": [20]}"#).unwrap();
        assert_eq!(wl, whitelist());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(Whitelist::from_json(r#"{"P1": "10"}"#).is_err());
    }

    #[test]
    fn rule_ids_are_the_union() {
        let ids: Vec<i64> = whitelist().rule_ids().into_iter().collect();
        assert_eq!(ids, vec![10, 11, 20]);
    }

    #[test]
    fn filter_drops_rules_outside_the_union() {
        let entries = vec![entry("P1", "G1", 10), entry("P1", "G1", 99)];
        let kept = whitelist().filter(&entries);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].rule_id, 10);
    }

    #[test]
    fn filter_uses_union_not_per_portfolio_rules() {
        // Rule 20 is approved for P2 only, but the union admits it for P1 too.
        let entries = vec![entry("P1", "G1", 20)];
        assert_eq!(whitelist().filter(&entries).len(), 1);
    }

    #[test]
    fn filter_drops_portfolios_outside_scope() {
        let entries = vec![entry("P9", "G9", 10)];
        assert!(whitelist().filter(&entries).is_empty());
    }

    #[test]
    fn filter_preserves_order() {
        let entries = vec![
            entry("P2", "G3", 20),
            entry("P1", "G1", 11),
            entry("P1", "G2", 10),
        ];
        let kept = whitelist().filter(&entries);
        let ids: Vec<&str> = kept.iter().map(|e| e.message_id.as_str()).collect();
        assert_eq!(ids, vec!["G3", "G1", "G2"]);
    }

    #[test]
    fn empty_whitelist_yields_nothing() {
        let wl = Whitelist::default();
        assert!(wl.is_empty());
        assert!(wl.filter(&[entry("P1", "G1", 10)]).is_empty());
    }

    #[test]
    fn scoped_positions_follow_portfolio_keys() {
        let monitor = vec![
            MonitorEntry {
                message_id: "G1".into(),
                portfolio_id: "P1".into(),
                position_date: PositionDate::new("2024-03-15"),
            },
            MonitorEntry {
                message_id: "G9".into(),
                portfolio_id: "P9".into(),
                position_date: PositionDate::new("2024-03-15"),
            },
        ];
        let scoped = whitelist().scoped_positions(&monitor);
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].portfolio_id, "P1");
    }
}
