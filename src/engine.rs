use crate::matcher::MatchOutcome;
use crate::period::{Granularity, PeriodAxis, PeriodBucket, PeriodKeys};
use crate::schema::{OperationType, ReportSettings, Transaction};
use crate::sign::normalize;
use crate::structure::Structure;
use log::debug;
use rayon::prelude::*;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

pub type PeriodSeries = BTreeMap<PeriodBucket, Decimal>;

pub const UNCLASSIFIED: &str = "Sem classificação";

/// Values of one line for every bucket of the axis, plus the whole-range total.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesSet {
    pub monthly: PeriodSeries,
    pub quarterly: PeriodSeries,
    pub annual: PeriodSeries,
    pub total: Decimal,
}

impl SeriesSet {
    /// Every bucket of the axis present with a zero value.
    pub fn zeroed(axis: &PeriodAxis) -> Self {
        let fill = |buckets: &[PeriodBucket]| buckets.iter().map(|b| (*b, Decimal::ZERO)).collect();
        Self {
            monthly: fill(&axis.months),
            quarterly: fill(&axis.quarters),
            annual: fill(&axis.years),
            total: Decimal::ZERO,
        }
    }

    pub fn series(&self, granularity: Granularity) -> &PeriodSeries {
        match granularity {
            Granularity::Monthly => &self.monthly,
            Granularity::Quarterly => &self.quarterly,
            Granularity::Annual => &self.annual,
        }
    }

    fn series_mut(&mut self, granularity: Granularity) -> &mut PeriodSeries {
        match granularity {
            Granularity::Monthly => &mut self.monthly,
            Granularity::Quarterly => &mut self.quarterly,
            Granularity::Annual => &mut self.annual,
        }
    }

    fn record(&mut self, keys: &PeriodKeys, amount: Decimal) {
        if !self.monthly.contains_key(&keys.month) {
            debug!("Bucket {} is outside the report axis, skipping", keys.month);
            return;
        }
        for granularity in Granularity::ALL {
            if let Some(value) = self.series_mut(granularity).get_mut(&keys.get(granularity)) {
                *value += amount;
            }
        }
        self.total += amount;
    }

    /// Adds `other` bucket by bucket. Both sides share the same axis.
    pub fn accumulate(&mut self, other: &SeriesSet) {
        for granularity in Granularity::ALL {
            let target = self.series_mut(granularity);
            for (bucket, value) in other.series(granularity) {
                *target.entry(*bucket).or_insert(Decimal::ZERO) += *value;
            }
        }
        self.total += other.total;
    }

    pub fn normalized(&self, operation_type: OperationType) -> Self {
        let apply = |series: &PeriodSeries| {
            series
                .iter()
                .map(|(bucket, value)| (*bucket, normalize(operation_type, *value)))
                .collect()
        };
        Self {
            monthly: apply(&self.monthly),
            quarterly: apply(&self.quarterly),
            annual: apply(&self.annual),
            total: normalize(operation_type, self.total),
        }
    }
}

/// Realized and budget figures of one line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeFigures {
    pub realized: SeriesSet,
    pub budget: SeriesSet,
}

impl NodeFigures {
    pub fn zeroed(axis: &PeriodAxis) -> Self {
        Self {
            realized: SeriesSet::zeroed(axis),
            budget: SeriesSet::zeroed(axis),
        }
    }

    pub fn accumulate(&mut self, other: &NodeFigures) {
        self.realized.accumulate(&other.realized);
        self.budget.accumulate(&other.budget);
    }

    pub fn normalized(&self, operation_type: OperationType) -> Self {
        Self {
            realized: self.realized.normalized(operation_type),
            budget: self.budget.normalized(operation_type),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationFigures {
    pub label: String,
    pub figures: NodeFigures,
}

/// Per-line figures for a whole statement, indexed like the [`Structure`].
#[derive(Debug, Clone, Default)]
pub struct AggregatedStatement {
    pub nodes: Vec<NodeFigures>,
    pub classifications: Vec<Vec<ClassificationFigures>>,
}

pub struct Aggregator<'a> {
    structure: &'a Structure,
    axis: &'a PeriodAxis,
    settings: &'a ReportSettings,
}

impl<'a> Aggregator<'a> {
    pub fn new(structure: &'a Structure, axis: &'a PeriodAxis, settings: &'a ReportSettings) -> Self {
        Self {
            structure,
            axis,
            settings,
        }
    }

    /// Raw (unsigned-policy) sums of `transactions`, split by series and zero-filled.
    pub fn raw_sums(&self, transactions: &[&Transaction]) -> NodeFigures {
        let mut figures = NodeFigures::zeroed(self.axis);
        for transaction in transactions {
            let keys = PeriodKeys::from_date(transaction.date);
            let target = if self.settings.is_budget(&transaction.source) {
                &mut figures.budget
            } else {
                &mut figures.realized
            };
            target.record(&keys, transaction.amount);
        }
        figures
    }

    fn classify(&self, operation_type: OperationType, transactions: &[&Transaction]) -> Vec<ClassificationFigures> {
        let mut groups: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
        for transaction in transactions {
            let label = transaction
                .classification
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(UNCLASSIFIED);
            groups.entry(label).or_default().push(*transaction);
        }

        groups
            .into_iter()
            .map(|(label, members)| ClassificationFigures {
                label: label.to_string(),
                figures: self.raw_sums(&members).normalized(operation_type),
            })
            .collect()
    }

    /// Aggregates every non-totalizer line. Totalizers are left zeroed for the
    /// [`TotalizerResolver`](crate::totalizer::TotalizerResolver).
    pub fn aggregate(&self, outcome: &MatchOutcome<'_>) -> AggregatedStatement {
        let nodes = self.structure.nodes();

        let partial: Vec<(NodeFigures, Vec<ClassificationFigures>)> = (0..nodes.len())
            .into_par_iter()
            .map(|idx| {
                let node = &nodes[idx];
                if node.is_totalizer() {
                    return (NodeFigures::zeroed(self.axis), Vec::new());
                }
                let matched = &outcome.by_node[idx];
                let raw = self.raw_sums(matched);
                let classifications = if node.classifications {
                    self.classify(node.operation_type, matched)
                } else {
                    Vec::new()
                };
                (raw, classifications)
            })
            .collect();

        let (raw, classifications): (Vec<NodeFigures>, Vec<Vec<ClassificationFigures>>) =
            partial.into_iter().unzip();

        let mut figures: Vec<NodeFigures> = vec![NodeFigures::default(); nodes.len()];

        for (idx, node) in nodes.iter().enumerate() {
            if !node.is_totalizer() && !node.is_top_level() {
                figures[idx] = raw[idx].normalized(node.operation_type);
            }
        }

        for (idx, node) in nodes.iter().enumerate() {
            if node.is_totalizer() {
                figures[idx] = raw[idx].clone();
            } else if node.is_top_level() {
                let mut combined = raw[idx].normalized(node.operation_type);
                for &child in &node.children {
                    combined.accumulate(&figures[child]);
                }
                figures[idx] = combined.normalized(node.operation_type);
            }
        }

        debug!(
            "Aggregated {} lines over {} months",
            nodes.len(),
            self.axis.months.len()
        );

        AggregatedStatement {
            nodes: figures,
            classifications,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::Matcher;
    use crate::schema::OperationType::{Add, Signed, Subtract, Total};
    use crate::schema::StructureNode;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn month(year: i32, month: u32) -> PeriodBucket {
        PeriodBucket::Month { year, month }
    }

    fn run(nodes: Vec<StructureNode>, transactions: &[Transaction]) -> (Structure, AggregatedStatement) {
        let settings = ReportSettings::default();
        let structure = Structure::build(&nodes, &settings).unwrap();
        let axis = PeriodAxis::spanning(date(2025, 1, 1), date(2025, 4, 30));
        let outcome = Matcher::new(&structure, false).partition(transactions);
        let aggregated = Aggregator::new(&structure, &axis, &settings).aggregate(&outcome);
        (structure, aggregated)
    }

    #[test]
    fn test_sign_policy_applied_per_bucket() {
        let transactions = vec![
            Transaction::new(date(2025, 1, 5), dec!(-100), "REAL").with_level2("Vendas"),
            Transaction::new(date(2025, 1, 20), dec!(-50), "REAL").with_level2("Vendas"),
            Transaction::new(date(2025, 2, 5), dec!(300), "REAL").with_level2("Impostos"),
            Transaction::new(date(2025, 3, 5), dec!(40), "REAL").with_level2("Outros"),
            Transaction::new(date(2025, 3, 6), dec!(-90), "REAL").with_level2("Outros"),
        ];
        let nodes = vec![
            StructureNode::new("v", "Vendas", Add, 1),
            StructureNode::new("i", "Impostos", Subtract, 2),
            StructureNode::new("o", "Outros", Signed, 3),
        ];
        let (structure, aggregated) = run(nodes, &transactions);

        let vendas = &aggregated.nodes[structure.find("v").unwrap()];
        assert_eq!(vendas.realized.monthly[&month(2025, 1)], dec!(150));
        assert_eq!(vendas.realized.monthly[&month(2025, 2)], Decimal::ZERO);
        assert_eq!(vendas.realized.total, dec!(150));

        let impostos = &aggregated.nodes[structure.find("i").unwrap()];
        assert_eq!(impostos.realized.monthly[&month(2025, 2)], dec!(-300));
        assert_eq!(
            impostos.realized.quarterly[&PeriodBucket::Quarter { year: 2025, quarter: 1 }],
            dec!(-300)
        );

        let outros = &aggregated.nodes[structure.find("o").unwrap()];
        assert_eq!(outros.realized.monthly[&month(2025, 3)], dec!(-50));
        assert_eq!(outros.realized.annual[&PeriodBucket::Year { year: 2025 }], dec!(-50));
    }

    #[test]
    fn test_sign_policy_applied_to_each_granularity_sum() {
        let transactions = vec![
            Transaction::new(date(2025, 1, 10), dec!(100), "REAL").with_level2("Vendas"),
            Transaction::new(date(2025, 2, 10), dec!(-50), "REAL").with_level2("Vendas"),
        ];
        let (structure, aggregated) = run(vec![StructureNode::new("v", "Vendas", Add, 1)], &transactions);

        let vendas = &aggregated.nodes[structure.find("v").unwrap()].realized;
        assert_eq!(vendas.monthly[&month(2025, 1)], dec!(100));
        assert_eq!(vendas.monthly[&month(2025, 2)], dec!(50));
        assert_eq!(
            vendas.quarterly[&PeriodBucket::Quarter { year: 2025, quarter: 1 }],
            dec!(50)
        );
        assert_eq!(vendas.annual[&PeriodBucket::Year { year: 2025 }], dec!(50));
        assert_eq!(vendas.total, dec!(50));
    }

    #[test]
    fn test_budget_rows_are_kept_apart() {
        let transactions = vec![
            Transaction::new(date(2025, 1, 5), dec!(1000), "REAL").with_level2("Vendas"),
            Transaction::new(date(2025, 1, 5), dec!(1200), "orc").with_level2("Vendas"),
        ];
        let (structure, aggregated) = run(vec![StructureNode::new("v", "Vendas", Add, 1)], &transactions);

        let vendas = &aggregated.nodes[structure.find("v").unwrap()];
        assert_eq!(vendas.realized.monthly[&month(2025, 1)], dec!(1000));
        assert_eq!(vendas.budget.monthly[&month(2025, 1)], dec!(1200));
        assert_eq!(vendas.budget.total, dec!(1200));
    }

    #[test]
    fn test_zero_fill_covers_whole_axis() {
        let transactions = vec![Transaction::new(date(2025, 2, 1), dec!(10), "REAL").with_level2("Vendas")];
        let (structure, aggregated) = run(
            vec![
                StructureNode::new("v", "Vendas", Add, 1),
                StructureNode::new("c", "Custos", Subtract, 2),
                StructureNode::new("t", "Total", Total, 3),
            ],
            &transactions,
        );

        for figures in &aggregated.nodes {
            assert_eq!(figures.realized.monthly.len(), 4);
            assert_eq!(figures.budget.quarterly.len(), 2);
            assert_eq!(figures.realized.annual.len(), 1);
        }
        let custos = &aggregated.nodes[structure.find("c").unwrap()];
        assert!(custos.realized.monthly.values().all(|v| v.is_zero()));
    }

    #[test]
    fn test_group_value_includes_children() {
        let transactions = vec![
            Transaction::new(date(2025, 1, 5), dec!(100), "REAL").with_level2("Aluguel"),
            Transaction::new(date(2025, 1, 6), dec!(-40), "REAL").with_level2("Energia"),
            Transaction::new(date(2025, 1, 7), dec!(10), "REAL").with_level1("Despesas"),
        ];
        let nodes = vec![
            StructureNode::new("d", "Despesas", Subtract, 1),
            StructureNode::new("a", "Aluguel", Subtract, 2).with_parent("d"),
            StructureNode::new("e", "Energia", Subtract, 3).with_parent("d"),
        ];
        let (structure, aggregated) = run(nodes, &transactions);

        assert_eq!(
            aggregated.nodes[structure.find("a").unwrap()].realized.monthly[&month(2025, 1)],
            dec!(-100)
        );
        assert_eq!(
            aggregated.nodes[structure.find("d").unwrap()].realized.monthly[&month(2025, 1)],
            dec!(-150)
        );
    }

    #[test]
    fn test_classification_groups() {
        let transactions = vec![
            Transaction::new(date(2025, 1, 5), dec!(100), "REAL")
                .with_level2("Vendas")
                .with_classification("Loja B"),
            Transaction::new(date(2025, 1, 6), dec!(50), "REAL")
                .with_level2("Vendas")
                .with_classification("Loja A"),
            Transaction::new(date(2025, 2, 6), dec!(25), "REAL")
                .with_level2("Vendas")
                .with_classification("Loja A"),
            Transaction::new(date(2025, 2, 7), dec!(5), "REAL").with_level2("Vendas"),
        ];
        let nodes = vec![StructureNode::new("v", "Vendas", Add, 1).with_classifications()];
        let (structure, aggregated) = run(nodes, &transactions);

        let groups = &aggregated.classifications[structure.find("v").unwrap()];
        let labels: Vec<&str> = groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["Loja A", "Loja B", UNCLASSIFIED]);
        assert_eq!(groups[0].figures.realized.total, dec!(75));
        assert_eq!(groups[0].figures.realized.monthly[&month(2025, 2)], dec!(25));
        assert_eq!(groups[0].figures.realized.monthly.len(), 4);
    }

    #[test]
    fn test_transactions_outside_axis_are_ignored() {
        let transactions = vec![
            Transaction::new(date(2024, 12, 31), dec!(999), "REAL").with_level2("Vendas"),
            Transaction::new(date(2025, 1, 1), dec!(1), "REAL").with_level2("Vendas"),
        ];
        let (structure, aggregated) = run(vec![StructureNode::new("v", "Vendas", Add, 1)], &transactions);
        let vendas = &aggregated.nodes[structure.find("v").unwrap()];
        assert!(!vendas.realized.monthly.contains_key(&month(2024, 12)));
        assert_eq!(vendas.realized.monthly[&month(2025, 1)], dec!(1));
        assert_eq!(vendas.realized.total, dec!(1));
    }
}
