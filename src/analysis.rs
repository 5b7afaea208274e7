//! Horizontal, vertical and realized-vs-budget analyses.
//!
//! Ratios are percentages kept as [`Decimal`]s. Anything that cannot be computed
//! (first period, zero divisor, missing base) is [`Ratio::NoData`], which the
//! report renders as a dash.

use crate::engine::{NodeFigures, PeriodSeries, SeriesSet};
use crate::period::{Granularity, PeriodBucket};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Presentation-layer marker for a ratio that is not computable.
pub const NO_DATA: &str = "–";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ratio {
    Value(Decimal),
    NoData,
}

impl Ratio {
    pub fn value(&self) -> Option<Decimal> {
        match self {
            Self::Value(v) => Some(*v),
            Self::NoData => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData)
    }

    /// `12.34%`, or the dash.
    pub fn display(&self) -> String {
        match self {
            Self::Value(v) => format!("{}%", v),
            Self::NoData => NO_DATA.to_string(),
        }
    }
}

impl Serialize for Ratio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value().and_then(|v| v.to_f64()) {
            Some(v) => serializer.serialize_f64(v),
            None => serializer.serialize_str(NO_DATA),
        }
    }
}

pub type RatioSeries = BTreeMap<PeriodBucket, Ratio>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RatioSet {
    pub monthly: RatioSeries,
    pub quarterly: RatioSeries,
    pub annual: RatioSeries,
}

impl RatioSet {
    fn build(mut per_granularity: impl FnMut(Granularity) -> RatioSeries) -> Self {
        Self {
            monthly: per_granularity(Granularity::Monthly),
            quarterly: per_granularity(Granularity::Quarterly),
            annual: per_granularity(Granularity::Annual),
        }
    }

    pub fn series(&self, granularity: Granularity) -> &RatioSeries {
        match granularity {
            Granularity::Monthly => &self.monthly,
            Granularity::Quarterly => &self.quarterly,
            Granularity::Annual => &self.annual,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeAnalysis {
    pub horizontal: RatioSet,
    pub vertical: RatioSet,
    pub vertical_budget: RatioSet,
    pub realized_vs_budget: RatioSet,
    pub vertical_total: Ratio,
    pub realized_vs_budget_total: Ratio,
}

#[derive(Debug, Clone, Copy)]
pub struct AnalysisEngine {
    precision: u32,
}

impl AnalysisEngine {
    pub fn new(precision: u32) -> Self {
        Self { precision }
    }

    /// `numerator / denominator * 100`, or no data when the denominator is zero.
    pub fn percentage(&self, numerator: Decimal, denominator: Decimal) -> Ratio {
        if denominator.is_zero() {
            return Ratio::NoData;
        }
        numerator
            .checked_div(denominator)
            .and_then(|q| q.checked_mul(Decimal::ONE_HUNDRED))
            .map(|v| Ratio::Value(v.round_dp(self.precision).normalize()))
            .unwrap_or(Ratio::NoData)
    }

    pub fn horizontal(&self, current: Decimal, previous: Option<Decimal>) -> Ratio {
        match previous {
            Some(previous) => self.percentage(current - previous, previous),
            None => Ratio::NoData,
        }
    }

    pub fn vertical(&self, current: Decimal, base: Option<Decimal>) -> Ratio {
        match base {
            Some(base) => self.percentage(current, base),
            None => Ratio::NoData,
        }
    }

    pub fn realized_vs_budget(&self, realized: Decimal, budget: Decimal) -> Ratio {
        self.percentage(realized, budget)
    }

    /// Period-over-period change; the series must be chronological and gap-free.
    pub fn horizontal_series(&self, series: &PeriodSeries) -> RatioSeries {
        let mut previous = None;
        series
            .iter()
            .map(|(bucket, value)| {
                let ratio = self.horizontal(*value, previous);
                previous = Some(*value);
                (*bucket, ratio)
            })
            .collect()
    }

    pub fn vertical_series(&self, series: &PeriodSeries, base: Option<&PeriodSeries>) -> RatioSeries {
        series
            .iter()
            .map(|(bucket, value)| {
                let base_value = base.and_then(|b| b.get(bucket)).copied();
                (*bucket, self.vertical(*value, base_value))
            })
            .collect()
    }

    pub fn realized_vs_budget_series(&self, realized: &PeriodSeries, budget: &PeriodSeries) -> RatioSeries {
        realized
            .iter()
            .map(|(bucket, value)| {
                let planned = budget.get(bucket).copied().unwrap_or(Decimal::ZERO);
                (*bucket, self.realized_vs_budget(*value, planned))
            })
            .collect()
    }

    fn vertical_set(&self, series: &SeriesSet, base: Option<&SeriesSet>) -> RatioSet {
        RatioSet::build(|g| self.vertical_series(series.series(g), base.map(|b| b.series(g))))
    }

    /// All analyses of one line. `base` is the reference line for vertical analysis;
    /// each series is compared with the same series of the base.
    pub fn analyze(&self, figures: &NodeFigures, base: Option<&NodeFigures>) -> NodeAnalysis {
        NodeAnalysis {
            horizontal: RatioSet::build(|g| self.horizontal_series(figures.realized.series(g))),
            vertical: self.vertical_set(&figures.realized, base.map(|b| &b.realized)),
            vertical_budget: self.vertical_set(&figures.budget, base.map(|b| &b.budget)),
            realized_vs_budget: RatioSet::build(|g| {
                self.realized_vs_budget_series(figures.realized.series(g), figures.budget.series(g))
            }),
            vertical_total: self.vertical(figures.realized.total, base.map(|b| b.realized.total)),
            realized_vs_budget_total: self
                .realized_vs_budget(figures.realized.total, figures.budget.total),
        }
    }
}
