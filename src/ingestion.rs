//! Normalization of loosely typed ledger rows into [`Transaction`]s.
//!
//! Rows arrive from spreadsheets and SQL views with text dates and amounts in
//! whatever format the source used. Rows that cannot be read are excluded and
//! reported back, never fatal.

use crate::error::{Result, StatementError};
use crate::period::parse_date;
use crate::schema::Transaction;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RawAmount {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawTransaction {
    #[serde(default, alias = "data")]
    pub date: Option<String>,

    #[serde(default, alias = "valor")]
    pub amount: Option<RawAmount>,

    #[serde(default, alias = "origem")]
    pub source: Option<String>,

    #[serde(default, alias = "classificacao")]
    pub classification: Option<String>,

    #[serde(default, alias = "n1")]
    pub level1: Option<String>,

    #[serde(default, alias = "n2")]
    pub level2: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MalformedRow {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct IngestedTransactions {
    pub transactions: Vec<Transaction>,
    pub malformed: Vec<MalformedRow>,
}

/// Supplies raw ledger rows to the engine. The engine keeps nothing between calls,
/// so any caching belongs to the implementor.
pub trait TransactionSource {
    fn fetch(&self) -> Result<Vec<RawTransaction>>;
}

pub struct InMemorySource {
    rows: Vec<RawTransaction>,
}

impl InMemorySource {
    pub fn new(rows: Vec<RawTransaction>) -> Self {
        Self { rows }
    }
}

impl TransactionSource for InMemorySource {
    fn fetch(&self) -> Result<Vec<RawTransaction>> {
        Ok(self.rows.clone())
    }
}

/// Reads a JSON array of rows from disk on every fetch.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TransactionSource for JsonFileSource {
    fn fetch(&self) -> Result<Vec<RawTransaction>> {
        let file = File::open(&self.path)?;
        let rows = serde_json::from_reader(BufReader::new(file))?;
        Ok(rows)
    }
}

pub fn normalize_rows(rows: &[RawTransaction]) -> IngestedTransactions {
    let mut ingested = IngestedTransactions::default();

    for (index, row) in rows.iter().enumerate() {
        match normalize_row(row) {
            Ok(transaction) => ingested.transactions.push(transaction),
            Err(e) => ingested.malformed.push(MalformedRow {
                index,
                reason: e.to_string(),
            }),
        }
    }

    ingested
}

pub fn normalize_row(row: &RawTransaction) -> Result<Transaction> {
    let date = match &row.date {
        Some(raw) => parse_date(raw)?,
        None => return Err(StatementError::InvalidDate("missing date".to_string())),
    };

    let amount = match &row.amount {
        Some(RawAmount::Number(value)) => Decimal::from_f64(*value)
            .ok_or_else(|| StatementError::InvalidAmount(value.to_string()))?,
        Some(RawAmount::Text(text)) => parse_amount(text)?,
        None => return Err(StatementError::InvalidAmount("missing amount".to_string())),
    };

    Ok(Transaction {
        date,
        amount,
        source: row.source.as_deref().map(str::trim).unwrap_or_default().to_string(),
        classification: non_empty(&row.classification),
        level1: non_empty(&row.level1),
        level2: non_empty(&row.level2),
    })
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parses an amount as written in Brazilian or international ledgers.
///
/// Handles `1234.56`, `1.234,56`, `1,234.56`, an `R$` prefix and accounting
/// parentheses for negatives. A lone dot grouping three digits (`1.500`) is a
/// thousands separator.
pub fn parse_amount(raw: &str) -> Result<Decimal> {
    let invalid = || StatementError::InvalidAmount(format!("'{}'", raw.trim()));

    let mut text: String = raw
        .replace("R$", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let parenthesized = text.starts_with('(') && text.ends_with(')');
    if parenthesized {
        text = text[1..text.len() - 1].to_string();
    }

    let normalized = match (text.rfind(','), text.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => text.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => text.replace(',', ""),
        (Some(_), None) if text.matches(',').count() == 1 => text.replace(',', "."),
        (Some(_), None) => text.replace(',', ""),
        (None, Some(_)) if text.matches('.').count() > 1 => text.replace('.', ""),
        (None, Some(dot)) if is_thousands_group(&text, dot) => text.replace('.', ""),
        _ => text,
    };

    if normalized.is_empty() {
        return Err(invalid());
    }

    let value = Decimal::from_str(&normalized).map_err(|_| invalid())?;
    Ok(if parenthesized { -value } else { value })
}

/// `1.500` in a Brazilian ledger is fifteen hundred: a lone dot followed by
/// exactly three digits and preceded by at most three.
fn is_thousands_group(text: &str, dot: usize) -> bool {
    let (integer, fraction) = (&text[..dot], &text[dot + 1..]);
    let integer = integer.trim_start_matches(['-', '+']);
    fraction.len() == 3
        && fraction.chars().all(|c| c.is_ascii_digit())
        && (1..=3).contains(&integer.len())
        && integer.chars().all(|c| c.is_ascii_digit())
}
