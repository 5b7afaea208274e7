use crate::analysis::{AnalysisEngine, NodeAnalysis, Ratio, RatioSeries};
use crate::engine::{AggregatedStatement, NodeFigures, PeriodSeries};
use crate::ingestion::MalformedRow;
use crate::period::{Granularity, PeriodAxis};
use crate::schema::{NestedBase, NodeLevel, OperationType, ReportSettings, StatementKind};
use crate::structure::Structure;
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowKind {
    #[serde(rename = "totalizador")]
    Totalizer,
    #[serde(rename = "grupo")]
    Group,
    #[serde(rename = "conta")]
    Leaf,
    #[serde(rename = "classificacao")]
    Classification,
}

impl From<NodeLevel> for RowKind {
    fn from(level: NodeLevel) -> Self {
        match level {
            NodeLevel::Totalizer => Self::Totalizer,
            NodeLevel::Group => Self::Group,
            NodeLevel::Leaf | NodeLevel::Classification => Self::Leaf,
        }
    }
}

/// One row of the statement as handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "tipo")]
    pub operation_type: OperationType,
    #[serde(rename = "nivel")]
    pub kind: RowKind,

    #[serde(rename = "valor")]
    pub total: Decimal,
    #[serde(rename = "orcamento")]
    pub budget_total: Decimal,

    #[serde(rename = "valores_mensais")]
    pub monthly: PeriodSeries,
    #[serde(rename = "valores_trimestrais")]
    pub quarterly: PeriodSeries,
    #[serde(rename = "valores_anuais")]
    pub annual: PeriodSeries,

    #[serde(rename = "orcamentos_mensais")]
    pub budget_monthly: PeriodSeries,
    #[serde(rename = "orcamentos_trimestrais")]
    pub budget_quarterly: PeriodSeries,
    #[serde(rename = "orcamentos_anuais")]
    pub budget_annual: PeriodSeries,

    #[serde(rename = "horizontal_mensais")]
    pub horizontal_monthly: RatioSeries,
    #[serde(rename = "horizontal_trimestrais")]
    pub horizontal_quarterly: RatioSeries,
    #[serde(rename = "horizontal_anuais")]
    pub horizontal_annual: RatioSeries,

    #[serde(rename = "vertical_mensais")]
    pub vertical_monthly: RatioSeries,
    #[serde(rename = "vertical_trimestrais")]
    pub vertical_quarterly: RatioSeries,
    #[serde(rename = "vertical_anuais")]
    pub vertical_annual: RatioSeries,
    #[serde(rename = "vertical_total")]
    pub vertical_total: Ratio,

    #[serde(rename = "vertical_orcamentos_mensais")]
    pub budget_vertical_monthly: RatioSeries,
    #[serde(rename = "vertical_orcamentos_trimestrais")]
    pub budget_vertical_quarterly: RatioSeries,
    #[serde(rename = "vertical_orcamentos_anuais")]
    pub budget_vertical_annual: RatioSeries,

    #[serde(rename = "real_vs_orcamento_mensais")]
    pub realized_vs_budget_monthly: RatioSeries,
    #[serde(rename = "real_vs_orcamento_trimestrais")]
    pub realized_vs_budget_quarterly: RatioSeries,
    #[serde(rename = "real_vs_orcamento_anuais")]
    pub realized_vs_budget_annual: RatioSeries,
    #[serde(rename = "real_vs_orcamento_total")]
    pub realized_vs_budget_total: Ratio,

    #[serde(rename = "classificacoes")]
    pub children: Vec<ReportNode>,
}

impl ReportNode {
    fn new(
        id: Option<String>,
        name: String,
        operation_type: OperationType,
        kind: RowKind,
        figures: &NodeFigures,
        analysis: NodeAnalysis,
    ) -> Self {
        Self {
            id,
            name,
            operation_type,
            kind,
            total: figures.realized.total,
            budget_total: figures.budget.total,
            monthly: figures.realized.monthly.clone(),
            quarterly: figures.realized.quarterly.clone(),
            annual: figures.realized.annual.clone(),
            budget_monthly: figures.budget.monthly.clone(),
            budget_quarterly: figures.budget.quarterly.clone(),
            budget_annual: figures.budget.annual.clone(),
            horizontal_monthly: analysis.horizontal.monthly,
            horizontal_quarterly: analysis.horizontal.quarterly,
            horizontal_annual: analysis.horizontal.annual,
            vertical_monthly: analysis.vertical.monthly,
            vertical_quarterly: analysis.vertical.quarterly,
            vertical_annual: analysis.vertical.annual,
            vertical_total: analysis.vertical_total,
            budget_vertical_monthly: analysis.vertical_budget.monthly,
            budget_vertical_quarterly: analysis.vertical_budget.quarterly,
            budget_vertical_annual: analysis.vertical_budget.annual,
            realized_vs_budget_monthly: analysis.realized_vs_budget.monthly,
            realized_vs_budget_quarterly: analysis.realized_vs_budget.quarterly,
            realized_vs_budget_annual: analysis.realized_vs_budget.annual,
            realized_vs_budget_total: analysis.realized_vs_budget_total,
            children: Vec::new(),
        }
    }

    pub fn series(&self, granularity: Granularity) -> &PeriodSeries {
        match granularity {
            Granularity::Monthly => &self.monthly,
            Granularity::Quarterly => &self.quarterly,
            Granularity::Annual => &self.annual,
        }
    }

    pub fn budget_series(&self, granularity: Granularity) -> &PeriodSeries {
        match granularity {
            Granularity::Monthly => &self.budget_monthly,
            Granularity::Quarterly => &self.budget_quarterly,
            Granularity::Annual => &self.budget_annual,
        }
    }

    /// Depth-first walk over this row and everything nested under it.
    pub fn walk(&self) -> Vec<(usize, &ReportNode)> {
        let mut rows = Vec::new();
        self.collect(0, &mut rows);
        rows
    }

    fn collect<'a>(&'a self, depth: usize, rows: &mut Vec<(usize, &'a ReportNode)>) {
        rows.push((depth, self));
        for child in &self.children {
            child.collect(depth + 1, rows);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub total_rows: usize,
    pub realized_rows: usize,
    pub budget_rows: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub outside_window: usize,
    pub malformed: usize,
    pub unmatched_labels: BTreeMap<String, usize>,
    pub malformed_rows: Vec<MalformedRow>,
    pub base_line: Option<String>,
    pub positional_totalizers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementReport {
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "demonstrativo")]
    pub kind: StatementKind,
    #[serde(rename = "periodos")]
    pub periods: PeriodAxis,
    #[serde(rename = "linhas")]
    pub rows: Vec<ReportNode>,
    #[serde(rename = "diagnostico")]
    pub diagnostics: Diagnostics,
}

impl StatementReport {
    /// Finds a row anywhere in the tree by name.
    pub fn find(&self, name: &str) -> Option<&ReportNode> {
        self.rows
            .iter()
            .flat_map(|row| row.walk())
            .map(|(_, row)| row)
            .find(|row| row.name == name)
    }
}

/// Walks the structure in report order and emits one [`ReportNode`] per line.
pub struct ReportAssembler<'a> {
    structure: &'a Structure,
    aggregated: &'a AggregatedStatement,
    base_line: Option<usize>,
    nested_base: NestedBase,
    engine: AnalysisEngine,
}

impl<'a> ReportAssembler<'a> {
    pub fn new(
        structure: &'a Structure,
        aggregated: &'a AggregatedStatement,
        base_line: Option<usize>,
        settings: &ReportSettings,
    ) -> Self {
        Self {
            structure,
            aggregated,
            base_line,
            nested_base: settings.nested_base,
            engine: AnalysisEngine::new(settings.ratio_precision),
        }
    }

    /// Vertical base for rows nested under `parent`.
    fn nested_base_for(&self, parent: usize) -> Option<usize> {
        match self.nested_base {
            NestedBase::BaseLine => self.base_line,
            NestedBase::GoverningTotalizer => self.structure.node(parent).governing_totalizer,
            NestedBase::ParentLine => Some(parent),
        }
    }

    fn figures(&self, idx: Option<usize>) -> Option<&NodeFigures> {
        idx.map(|i| &self.aggregated.nodes[i])
    }

    fn build_row(&self, idx: usize) -> ReportNode {
        let node = self.structure.node(idx);
        let figures = &self.aggregated.nodes[idx];

        let base = match node.parent {
            Some(parent) => self.nested_base_for(parent),
            None => self.base_line,
        };

        let mut row = ReportNode::new(
            Some(node.id.clone()),
            node.name.clone(),
            node.operation_type,
            node.level.into(),
            figures,
            self.engine.analyze(figures, self.figures(base)),
        );

        let classification_base = self.figures(self.nested_base_for(idx));
        row.children = self.aggregated.classifications[idx]
            .iter()
            .map(|group| {
                ReportNode::new(
                    None,
                    group.label.clone(),
                    node.operation_type,
                    RowKind::Classification,
                    &group.figures,
                    self.engine.analyze(&group.figures, classification_base),
                )
            })
            .collect();

        row
    }

    pub fn assemble(&self) -> Vec<ReportNode> {
        let mut rows: Vec<Option<ReportNode>> = (0..self.structure.len())
            .into_par_iter()
            .map(|idx| Some(self.build_row(idx)))
            .collect();

        let mut report = Vec::new();
        for idx in self.structure.top_level() {
            let Some(mut row) = rows[idx].take() else {
                continue;
            };
            let mut children: Vec<ReportNode> = self
                .structure
                .node(idx)
                .children
                .iter()
                .filter_map(|&child| rows[child].take())
                .collect();
            children.append(&mut row.children);
            row.children = children;
            report.push(row);
        }
        report
    }
}
