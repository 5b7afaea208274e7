//! # Financial Statement Builder
//!
//! Turns a flat ledger of dated transactions into hierarchical, multi-period
//! management statements (DRE income statements and DFC cash-flow statements)
//! with horizontal, vertical and realized-vs-budget analyses.
//!
//! ## Core Concepts
//!
//! - **Structure**: An ordered list of lines. Each line has a sign policy (`+`, `-`, `+/-`)
//!   or is a totalizer (`=`) computed from other lines
//! - **Matching**: Transactions land on a line by their N2 label, then their N1 label
//! - **Period Axis**: Every line carries a value for every month, quarter and year of the
//!   report, zero-filled where nothing happened
//! - **Budget**: Rows whose source is a budget marker (`ORC`) form a parallel series
//! - **Analyses**: Ratios that cannot be computed are a dash, never an error
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_statement_builder::*;
//! use chrono::NaiveDate;
//! use rust_decimal_macros::dec;
//!
//! let definition = StatementDefinition::new(
//!     "DRE Gerencial",
//!     StatementKind::Dre,
//!     vec![
//!         StructureNode::new("fat", "Faturamento", OperationType::Add, 1),
//!         StructureNode::new("rb", "Receita Bruta", OperationType::Total, 2),
//!         StructureNode::new("trib", "Tributos", OperationType::Subtract, 3),
//!         StructureNode::new("rl", "Receita Líquida", OperationType::Total, 4)
//!             .with_dependencies(&["rb", "trib"]),
//!     ],
//! );
//!
//! let transactions = vec![
//!     Transaction::new(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(), dec!(1000), "REAL")
//!         .with_level2("Faturamento"),
//!     Transaction::new(NaiveDate::from_ymd_opt(2025, 2, 10).unwrap(), dec!(-200), "REAL")
//!         .with_level2("Tributos"),
//! ];
//!
//! let report = build_statement(&definition, &transactions).unwrap();
//! println!("{}", report.to_json().unwrap());
//! ```

pub mod analysis;
pub mod engine;
pub mod error;
pub mod export;
pub mod ingestion;
pub mod matcher;
pub mod period;
pub mod report;
pub mod schema;
pub mod sign;
pub mod structure;
pub mod totalizer;

pub use analysis::{AnalysisEngine, NodeAnalysis, Ratio, RatioSeries, RatioSet, NO_DATA};
pub use engine::{
    AggregatedStatement, Aggregator, ClassificationFigures, NodeFigures, PeriodSeries, SeriesSet,
    UNCLASSIFIED,
};
pub use error::{Result, StatementError};
pub use ingestion::*;
pub use matcher::{MatchOutcome, MatchRule, Matcher};
pub use period::{Granularity, PeriodAxis, PeriodBucket, PeriodKeys};
pub use report::{Diagnostics, ReportAssembler, ReportNode, RowKind, StatementReport};
pub use schema::*;
pub use sign::normalize;
pub use structure::{normalize_label, LineNode, Structure, TotalizerScope};
pub use totalizer::TotalizerResolver;

use log::{debug, info, warn};
use rust_decimal::Decimal;

/// Largest scale a [`Decimal`] can hold.
const MAX_RATIO_PRECISION: u32 = 28;

pub struct StatementProcessor;

impl StatementProcessor {
    pub fn process(
        definition: &StatementDefinition,
        transactions: &[Transaction],
    ) -> Result<StatementReport> {
        Self::run(definition, transactions, Vec::new(), None)
    }

    /// Normalizes loosely typed rows first; rows that cannot be read are
    /// reported in the diagnostics instead of failing the report.
    pub fn process_raw(
        definition: &StatementDefinition,
        rows: &[RawTransaction],
    ) -> Result<StatementReport> {
        let ingested = normalize_rows(rows);
        for row in &ingested.malformed {
            warn!("Skipping malformed row #{}: {}", row.index, row.reason);
        }
        Self::run(definition, &ingested.transactions, ingested.malformed, None)
    }

    pub fn process_from_source(
        definition: &StatementDefinition,
        source: &dyn TransactionSource,
    ) -> Result<StatementReport> {
        let rows = source.fetch()?;
        Self::process_raw(definition, &rows)
    }

    /// Like [`process`](Self::process), but re-checks every totalizer against its
    /// scope before the report is assembled.
    pub fn process_with_verification(
        definition: &StatementDefinition,
        transactions: &[Transaction],
        tolerance: Decimal,
    ) -> Result<StatementReport> {
        Self::run(definition, transactions, Vec::new(), Some(tolerance))
    }

    fn run(
        definition: &StatementDefinition,
        transactions: &[Transaction],
        malformed: Vec<MalformedRow>,
        tolerance: Option<Decimal>,
    ) -> Result<StatementReport> {
        let settings = definition.settings();
        validate_settings(&settings)?;

        info!(
            "Building {:?} statement '{}' from {} transactions",
            definition.kind,
            definition.name,
            transactions.len()
        );
        debug!(
            "Structure contains {} lines, {} malformed rows were excluded",
            definition.nodes.len(),
            malformed.len()
        );

        let structure = Structure::build(&definition.nodes, &settings)?;

        match settings.worker_threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
                pool.install(|| {
                    build_report(definition, &structure, &settings, transactions, malformed, tolerance)
                })
            }
            None => build_report(definition, &structure, &settings, transactions, malformed, tolerance),
        }
    }
}

pub fn build_statement(
    definition: &StatementDefinition,
    transactions: &[Transaction],
) -> Result<StatementReport> {
    StatementProcessor::process(definition, transactions)
}

pub fn build_statement_from_raw(
    definition: &StatementDefinition,
    rows: &[RawTransaction],
) -> Result<StatementReport> {
    StatementProcessor::process_raw(definition, rows)
}

pub fn process_with_verification(
    definition: &StatementDefinition,
    transactions: &[Transaction],
    tolerance: Decimal,
) -> Result<StatementReport> {
    StatementProcessor::process_with_verification(definition, transactions, tolerance)
}

fn validate_settings(settings: &ReportSettings) -> Result<()> {
    if settings.worker_threads == Some(0) {
        return Err(StatementError::InvalidSettings(
            "worker_threads must be at least 1".to_string(),
        ));
    }

    if let Some(window) = &settings.window {
        if window.end < window.start {
            return Err(StatementError::InvalidSettings(format!(
                "window ends on {} before it starts on {}",
                window.end, window.start
            )));
        }
    }

    if settings.ratio_precision > MAX_RATIO_PRECISION {
        return Err(StatementError::InvalidSettings(format!(
            "ratio_precision {} exceeds {}",
            settings.ratio_precision, MAX_RATIO_PRECISION
        )));
    }

    Ok(())
}

/// The report axis: the configured window, or the span of the transactions.
fn report_axis(settings: &ReportSettings, transactions: &[&Transaction]) -> PeriodAxis {
    if let Some(window) = &settings.window {
        return PeriodAxis::spanning(window.start, window.end);
    }

    let first = transactions.iter().map(|t| t.date).min();
    let last = transactions.iter().map(|t| t.date).max();
    match (first, last) {
        (Some(first), Some(last)) => PeriodAxis::spanning(first, last),
        _ => PeriodAxis::empty(),
    }
}

fn build_report(
    definition: &StatementDefinition,
    structure: &Structure,
    settings: &ReportSettings,
    transactions: &[Transaction],
    malformed: Vec<MalformedRow>,
    tolerance: Option<Decimal>,
) -> Result<StatementReport> {
    let in_window: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| settings.window.map_or(true, |w| w.contains(t.date)))
        .collect();
    let outside_window = transactions.len() - in_window.len();

    let axis = report_axis(settings, &in_window);

    let outcome = Matcher::new(structure, settings.substring_fallback)
        .partition(in_window.iter().copied());
    debug!(
        "Matched {} transactions, {} unmatched, {} outside the window",
        outcome.matched, outcome.unmatched, outside_window
    );

    let mut aggregated = Aggregator::new(structure, &axis, settings).aggregate(&outcome);

    let resolver = TotalizerResolver::new(structure, &axis);
    resolver.resolve(&mut aggregated);
    if let Some(tolerance) = tolerance {
        resolver.verify(&aggregated, tolerance)?;
    }

    let base_line = structure.find_first(&settings.base_lines);
    if base_line.is_none() {
        warn!(
            "None of the base lines {:?} exist in '{}'; vertical analysis will have no data",
            settings.base_lines, definition.name
        );
    }

    let rows = ReportAssembler::new(structure, &aggregated, base_line, settings).assemble();

    let budget_rows = in_window
        .iter()
        .filter(|t| settings.is_budget(&t.source))
        .count();

    let diagnostics = Diagnostics {
        total_rows: transactions.len() + malformed.len(),
        realized_rows: in_window.len() - budget_rows,
        budget_rows,
        matched: outcome.matched,
        unmatched: outcome.unmatched,
        outside_window,
        malformed: malformed.len(),
        unmatched_labels: outcome.unmatched_labels,
        malformed_rows: malformed,
        base_line: base_line.map(|idx| structure.node(idx).name.clone()),
        positional_totalizers: structure.positional_totalizers(),
    };

    Ok(StatementReport {
        title: definition.name.clone(),
        kind: definition.kind,
        periods: axis,
        rows,
        diagnostics,
    })
}
