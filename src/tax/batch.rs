//! JSON line codec for batches of operations and their taxes

use super::cgt::{Operation, OperationKind, OperationResult, TaxError};
use super::money::{Currency, Money};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("invalid batch json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("operation {index}: {source}")]
    Operation {
        index: usize,
        #[source]
        source: TaxError,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One operation as it appears on the wire
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OperationRecord {
    /// Either "buy" or "sell"
    pub operation: String,
    /// Price paid or received per share
    #[serde(rename = "unit-cost")]
    #[schemars(with = "f64")]
    pub unit_cost: Decimal,
    /// Number of shares traded
    pub quantity: i64,
    /// Currency of the unit cost (defaults to BRL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// One input line: the operations of a single portfolio, in order
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct BatchInput(pub Vec<OperationRecord>);

impl TryFrom<OperationRecord> for Operation {
    type Error = TaxError;

    fn try_from(record: OperationRecord) -> Result<Self, Self::Error> {
        let kind: OperationKind = record.operation.parse()?;
        let currency = match record.currency.as_deref() {
            Some(code) => code.parse::<Currency>()?,
            None => Currency::default(),
        };
        Ok(Operation {
            kind,
            unit_cost: Money::new(record.unit_cost, currency)?,
            quantity: record.quantity,
        })
    }
}

/// Tax owed for one operation, as written on the output line
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TaxRecord {
    #[serde(with = "rust_decimal::serde::float")]
    pub tax: Decimal,
}

impl From<&OperationResult> for TaxRecord {
    fn from(result: &OperationResult) -> Self {
        TaxRecord {
            tax: result.tax.amount(),
        }
    }
}

/// Decode one JSON array of operations.
pub fn parse_batch(line: &str) -> Result<Vec<Operation>, BatchError> {
    let BatchInput(records): BatchInput = serde_json::from_str(line)?;
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            Operation::try_from(record).map_err(|source| BatchError::Operation { index, source })
        })
        .collect()
}

/// Iterate over the non-blank lines of a reader, keeping their 1-based line numbers.
pub fn batch_lines<R: BufRead>(
    reader: R,
) -> impl Iterator<Item = std::io::Result<(usize, String)>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(i, line)| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(Ok((i + 1, line))),
            Err(e) => Some(Err(e)),
        })
}

/// Write the taxes of one batch as a single JSON line.
pub fn write_taxes<W: Write>(results: &[OperationResult], mut writer: W) -> Result<(), BatchError> {
    let records: Vec<TaxRecord> = results.iter().map(TaxRecord::from).collect();
    serde_json::to_writer(&mut writer, &records)?;
    writer.write_all(b"\n")?;
    Ok(())
}
