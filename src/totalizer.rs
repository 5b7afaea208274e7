use crate::engine::{AggregatedStatement, NodeFigures, SeriesSet};
use crate::error::{Result, StatementError};
use crate::period::{Granularity, PeriodAxis};
use crate::structure::Structure;
use log::debug;
use rust_decimal::Decimal;

/// Resolves "=" lines from the already sign-normalized values of their scope.
///
/// Dependencies are added as-is; the sign each one carries comes from its own line.
pub struct TotalizerResolver<'a> {
    structure: &'a Structure,
    axis: &'a PeriodAxis,
}

impl<'a> TotalizerResolver<'a> {
    pub fn new(structure: &'a Structure, axis: &'a PeriodAxis) -> Self {
        Self { structure, axis }
    }

    /// Fills every totalizer in declared order, so a totalizer may build on
    /// earlier ones computed from the same aggregates.
    pub fn resolve(&self, aggregated: &mut AggregatedStatement) {
        let totalizers: Vec<usize> = self.structure.totalizers().collect();

        for totalizer in totalizers {
            let value = self.expected(totalizer, aggregated);
            aggregated.nodes[totalizer] = value;
        }

        debug!(
            "Resolved totalizers: {} positional",
            self.structure.positional_totalizers().len()
        );
    }

    fn expected(&self, totalizer: usize, aggregated: &AggregatedStatement) -> NodeFigures {
        let mut value = NodeFigures::zeroed(self.axis);
        if let Some(scope) = &self.structure.node(totalizer).scope {
            for &member in scope.members() {
                value.accumulate(&aggregated.nodes[member]);
            }
        }
        value
    }

    /// Re-checks every totalizer against its scope, bucket by bucket.
    pub fn verify(&self, aggregated: &AggregatedStatement, tolerance: Decimal) -> Result<()> {
        for totalizer in self.structure.totalizers() {
            let expected = self.expected(totalizer, aggregated);
            let actual = &aggregated.nodes[totalizer];

            self.compare(totalizer, "realized", &expected.realized, &actual.realized, tolerance)?;
            self.compare(totalizer, "budget", &expected.budget, &actual.budget, tolerance)?;
        }
        Ok(())
    }

    fn compare(
        &self,
        totalizer: usize,
        series: &str,
        expected: &SeriesSet,
        actual: &SeriesSet,
        tolerance: Decimal,
    ) -> Result<()> {
        let mismatch = |period: String, expected: Decimal, actual: Decimal| {
            StatementError::TotalizerMismatch {
                totalizer: self.structure.node(totalizer).name.clone(),
                period,
                series: series.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            }
        };

        for granularity in Granularity::ALL {
            for (bucket, want) in expected.series(granularity) {
                let got = actual
                    .series(granularity)
                    .get(bucket)
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                if (got - *want).abs() > tolerance {
                    return Err(mismatch(bucket.to_string(), *want, got));
                }
            }
        }

        if (actual.total - expected.total).abs() > tolerance {
            return Err(mismatch("total".to_string(), expected.total, actual.total));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Aggregator;
    use crate::matcher::Matcher;
    use crate::period::PeriodBucket;
    use crate::schema::OperationType::{Add, Signed, Subtract, Total};
    use crate::schema::{ReportSettings, StructureNode, Transaction};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn jan() -> PeriodBucket {
        PeriodBucket::Month { year: 2025, month: 1 }
    }

    fn nodes() -> Vec<StructureNode> {
        vec![
            StructureNode::new("fat", "Faturamento", Add, 1),
            StructureNode::new("rb", "Receita Bruta", Total, 2),
            StructureNode::new("trib", "Tributos", Subtract, 3),
            StructureNode::new("rl", "Receita Líquida", Total, 4).with_dependencies(&["rb", "trib"]),
            StructureNode::new("cmv", "CMV", Subtract, 5),
            StructureNode::new("fin", "Resultado Financeiro", Signed, 6),
            StructureNode::new("lucro", "Lucro", Total, 7).with_dependencies(&["rl", "cmv", "fin"]),
        ]
    }

    fn transactions() -> Vec<Transaction> {
        vec![
            Transaction::new(date(2025, 1, 2), dec!(1000), "REAL").with_level2("Faturamento"),
            Transaction::new(date(2025, 1, 3), dec!(150), "REAL").with_level2("Tributos"),
            Transaction::new(date(2025, 1, 4), dec!(-400), "REAL").with_level2("CMV"),
            Transaction::new(date(2025, 1, 5), dec!(-25.5), "REAL").with_level2("Resultado Financeiro"),
            Transaction::new(date(2025, 1, 6), dec!(900), "ORC").with_level2("Faturamento"),
        ]
    }

    fn resolved() -> (Structure, PeriodAxis, AggregatedStatement) {
        let settings = ReportSettings::default();
        let structure = Structure::build(&nodes(), &settings).unwrap();
        let axis = PeriodAxis::spanning(date(2025, 1, 1), date(2025, 1, 31));
        let txs = transactions();
        let outcome = Matcher::new(&structure, false).partition(&txs);
        let mut aggregated = Aggregator::new(&structure, &axis, &settings).aggregate(&outcome);
        TotalizerResolver::new(&structure, &axis).resolve(&mut aggregated);
        (structure, axis, aggregated)
    }

    #[test]
    fn test_cascading_totalizers() {
        let (structure, _, aggregated) = resolved();
        let value = |id: &str| aggregated.nodes[structure.find(id).unwrap()].realized.monthly[&jan()];

        assert_eq!(value("rb"), dec!(1000));
        assert_eq!(value("rl"), dec!(850));
        assert_eq!(value("lucro"), dec!(424.5));

        let budget = |id: &str| aggregated.nodes[structure.find(id).unwrap()].budget.total;
        assert_eq!(budget("rb"), dec!(900));
        assert_eq!(budget("lucro"), dec!(900));
    }

    #[test]
    fn test_verify_accepts_resolved_statement() {
        let (structure, axis, aggregated) = resolved();
        let resolver = TotalizerResolver::new(&structure, &axis);
        assert!(resolver.verify(&aggregated, Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_verify_detects_tampering() {
        let (structure, axis, mut aggregated) = resolved();
        let rl = structure.find("rl").unwrap();
        aggregated.nodes[rl].realized.monthly.insert(jan(), dec!(1));

        let resolver = TotalizerResolver::new(&structure, &axis);
        let err = resolver.verify(&aggregated, dec!(0.01)).unwrap_err();
        assert!(matches!(
            err,
            StatementError::TotalizerMismatch { ref totalizer, ref period, .. }
                if totalizer == "Receita Líquida" && period == "2025-01"
        ));
    }
}
