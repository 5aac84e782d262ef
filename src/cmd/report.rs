//! Report command - per-operation view of position and tax for every batch

use crate::cmd::open_input;
use anyhow::Context;
use capital_gains::tax::{
    batch_lines, parse_batch, process_batch, Currency, Money, Operation, OperationResult,
};
use clap::Args;
use serde::Serialize;
use std::io::BufRead;
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct ReportCommand {
    /// File with one JSON array of operations per line. Reads from stdin if not specified.
    #[arg(default_value = "-")]
    file: PathBuf,

    /// Output as JSON instead of formatted tables
    #[arg(long)]
    json: bool,
}

/// One processed input line
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub line: usize,
    pub steps: Vec<Step>,
    #[serde(skip)]
    pub total_tax: Money,
}

#[derive(Debug, Serialize)]
pub struct Step {
    pub operation: Operation,
    #[serde(flatten)]
    pub result: OperationResult,
}

/// Row for the report table output
#[derive(Debug, Clone, Tabled)]
struct StepRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Operation")]
    kind: String,
    #[tabled(rename = "Quantity")]
    quantity: i64,
    #[tabled(rename = "Unit Cost")]
    unit_cost: String,
    #[tabled(rename = "Held")]
    held: i64,
    #[tabled(rename = "Avg Cost")]
    average_cost: String,
    #[tabled(rename = "Loss")]
    loss: String,
    #[tabled(rename = "Tax")]
    tax: String,
}

impl ReportCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let reports = build_reports(open_input(&self.file)?)?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        } else {
            print_tables(&reports);
        }
        Ok(())
    }
}

pub fn build_reports<R: BufRead>(reader: R) -> anyhow::Result<Vec<BatchReport>> {
    let mut reports = Vec::new();
    for line in batch_lines(reader) {
        let (line_no, line) = line.context("failed to read input")?;
        let operations = parse_batch(&line).with_context(|| format!("line {}", line_no))?;
        let results = process_batch(&operations).with_context(|| format!("line {}", line_no))?;

        let currency = results.first().map_or(Currency::default(), |r| r.tax.currency());
        let mut total_tax = Money::zero(currency);
        for result in &results {
            total_tax = total_tax.checked_add(result.tax)?;
        }

        reports.push(BatchReport {
            line: line_no,
            steps: operations
                .into_iter()
                .zip(results)
                .map(|(operation, result)| Step { operation, result })
                .collect(),
            total_tax,
        });
    }
    log::info!("Built report for {} batches", reports.len());
    Ok(reports)
}

fn print_tables(reports: &[BatchReport]) {
    if reports.is_empty() {
        println!("No batches found");
        return;
    }

    for report in reports {
        println!();
        println!("BATCH (line {})", report.line);

        if report.steps.is_empty() {
            println!("  (no operations)");
            continue;
        }

        let rows: Vec<StepRow> = report
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| StepRow {
                index: i + 1,
                kind: step.operation.kind.to_string(),
                quantity: step.operation.quantity,
                unit_cost: format_amount(&step.operation.unit_cost),
                held: step.result.position.quantity,
                average_cost: format_amount(&step.result.position.average_cost),
                loss: format_amount(&step.result.position.accumulated_loss),
                tax: format_amount(&step.result.tax),
            })
            .collect();

        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{}", table);
        println!("  Total tax: {}", report.total_tax);
    }
    println!();
}

fn format_amount(money: &Money) -> String {
    format!("{:.2}", money.amount())
}
