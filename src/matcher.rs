use crate::schema::Transaction;
use crate::structure::{normalize_label, Structure};
use std::collections::BTreeMap;

const MISSING_LABEL: &str = "(sem rótulo)";

/// Which step of the fallback chain produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    Level2Exact,
    Level1Exact,
    Substring,
}

pub struct Matcher<'a> {
    structure: &'a Structure,
    substring_fallback: bool,
}

/// Transactions partitioned by the structure line they landed on.
#[derive(Debug)]
pub struct MatchOutcome<'t> {
    pub by_node: Vec<Vec<&'t Transaction>>,
    pub matched: usize,
    pub unmatched: usize,
    pub unmatched_labels: BTreeMap<String, usize>,
}

impl<'a> Matcher<'a> {
    pub fn new(structure: &'a Structure, substring_fallback: bool) -> Self {
        Self {
            structure,
            substring_fallback,
        }
    }

    pub fn match_transaction(&self, transaction: &Transaction) -> Option<(usize, MatchRule)> {
        let level2 = transaction.level2.as_deref().map(normalize_label);
        let level1 = transaction.level1.as_deref().map(normalize_label);

        if let Some(idx) = level2.as_deref().and_then(|l| self.structure.lookup_label(l)) {
            return Some((idx, MatchRule::Level2Exact));
        }

        if let Some(idx) = level1.as_deref().and_then(|l| self.structure.lookup_label(l)) {
            return Some((idx, MatchRule::Level1Exact));
        }

        if self.substring_fallback {
            for label in [level2.as_deref(), level1.as_deref()].into_iter().flatten() {
                if let Some(idx) = self.contains_match(label) {
                    return Some((idx, MatchRule::Substring));
                }
            }
        }

        None
    }

    fn contains_match(&self, label: &str) -> Option<usize> {
        if label.is_empty() {
            return None;
        }
        self.structure
            .labels()
            .iter()
            .find(|(key, _)| key.contains(label) || label.contains(key.as_str()))
            .map(|(_, idx)| *idx)
    }

    pub fn partition<'t, I>(&self, transactions: I) -> MatchOutcome<'t>
    where
        I: IntoIterator<Item = &'t Transaction>,
    {
        let mut outcome = MatchOutcome {
            by_node: vec![Vec::new(); self.structure.len()],
            matched: 0,
            unmatched: 0,
            unmatched_labels: BTreeMap::new(),
        };

        for transaction in transactions {
            match self.match_transaction(transaction) {
                Some((idx, _)) => {
                    outcome.by_node[idx].push(transaction);
                    outcome.matched += 1;
                }
                None => {
                    outcome.unmatched += 1;
                    let label = [&transaction.level2, &transaction.level1]
                        .into_iter()
                        .filter_map(|l| l.as_deref().map(str::trim))
                        .find(|l| !l.is_empty())
                        .unwrap_or(MISSING_LABEL);
                    *outcome.unmatched_labels.entry(label.to_string()).or_default() += 1;
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::OperationType::{Add, Subtract, Total};
    use crate::schema::{ReportSettings, StructureNode};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn structure() -> Structure {
        let nodes = vec![
            StructureNode::new("fat", "Faturamento", Add, 1),
            StructureNode::new("rb", "Receita Bruta", Total, 2),
            StructureNode::new("cmv", "Custo das Mercadorias", Subtract, 3),
            StructureNode::new("desp", "Despesas Administrativas", Subtract, 4),
            StructureNode::new("alug", "Aluguel", Subtract, 5).with_parent("desp"),
        ];
        Structure::build(&nodes, &ReportSettings::default()).unwrap()
    }

    fn tx() -> Transaction {
        Transaction::new(NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(), dec!(10), "REAL")
    }

    #[test]
    fn test_level2_exact_match_is_case_insensitive() {
        let structure = structure();
        let matcher = Matcher::new(&structure, false);
        let result = matcher.match_transaction(&tx().with_level2("  faturamento "));
        assert_eq!(result, Some((structure.find("fat").unwrap(), MatchRule::Level2Exact)));
    }

    #[test]
    fn test_level1_used_when_level2_misses() {
        let structure = structure();
        let matcher = Matcher::new(&structure, false);

        let only_n1 = tx().with_level1("Despesas Administrativas");
        assert_eq!(
            matcher.match_transaction(&only_n1),
            Some((structure.find("desp").unwrap(), MatchRule::Level1Exact))
        );

        let both = tx().with_level1("Despesas Administrativas").with_level2("Aluguel");
        assert_eq!(
            matcher.match_transaction(&both),
            Some((structure.find("alug").unwrap(), MatchRule::Level2Exact))
        );
    }

    #[test]
    fn test_totalizers_never_receive_transactions() {
        let structure = structure();
        let matcher = Matcher::new(&structure, true);
        assert_eq!(matcher.match_transaction(&tx().with_level2("Receita Bruta")), None);
    }

    #[test]
    fn test_substring_fallback_only_when_enabled() {
        let structure = structure();
        let inconsistent = tx().with_level2("Custo das Mercadorias Vendidas");

        assert_eq!(Matcher::new(&structure, false).match_transaction(&inconsistent), None);
        assert_eq!(
            Matcher::new(&structure, true).match_transaction(&inconsistent),
            Some((structure.find("cmv").unwrap(), MatchRule::Substring))
        );

        let shorter = tx().with_level2("aluguel");
        assert_eq!(
            Matcher::new(&structure, true).match_transaction(&shorter),
            Some((structure.find("alug").unwrap(), MatchRule::Level2Exact))
        );
    }

    #[test]
    fn test_partition_counts_unmatched() {
        let structure = structure();
        let matcher = Matcher::new(&structure, false);
        let transactions = vec![
            tx().with_level2("Faturamento"),
            tx().with_level2("Faturamento"),
            tx().with_level2("Marketing"),
            tx().with_level2("Marketing"),
            tx(),
        ];

        let outcome = matcher.partition(&transactions);
        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.unmatched, 3);
        assert_eq!(outcome.by_node[structure.find("fat").unwrap()].len(), 2);
        assert_eq!(outcome.unmatched_labels.get("Marketing"), Some(&2));
        assert_eq!(outcome.unmatched_labels.get(MISSING_LABEL), Some(&1));
    }

    #[test]
    fn test_unmatched_label_skips_blank_level2() {
        let structure = structure();
        let matcher = Matcher::new(&structure, false);
        let transactions = vec![
            tx().with_level2("   ").with_level1("Viagens"),
            tx().with_level2("").with_level1("  "),
        ];

        let outcome = matcher.partition(&transactions);
        assert_eq!(outcome.unmatched, 2);
        assert_eq!(outcome.unmatched_labels.get("Viagens"), Some(&1));
        assert_eq!(outcome.unmatched_labels.get(MISSING_LABEL), Some(&1));
    }
}
