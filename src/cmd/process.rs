//! Process command - one line of taxes for every line of operations

use crate::cmd::open_input;
use anyhow::Context;
use capital_gains::tax::{batch_lines, parse_batch, process_batch, write_taxes};
use clap::Args;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ProcessCommand {
    /// File with one JSON array of operations per line. Reads from stdin if not specified.
    #[arg(default_value = "-")]
    file: PathBuf,

    /// Log and skip lines that fail instead of aborting the run
    #[arg(long)]
    skip_invalid: bool,
}

impl Default for ProcessCommand {
    fn default() -> Self {
        ProcessCommand {
            file: PathBuf::from("-"),
            skip_invalid: false,
        }
    }
}

/// Counts reported once the input is exhausted
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSummary {
    pub batches: usize,
    pub operations: usize,
    pub skipped: usize,
}

impl ProcessCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let reader = open_input(&self.file)?;
        let stdout = io::stdout();
        let writer = BufWriter::new(stdout.lock());
        let summary = self.run(reader, writer)?;
        log::info!(
            "Processed {} batches ({} operations), skipped {}",
            summary.batches,
            summary.operations,
            summary.skipped
        );
        Ok(())
    }

    /// Stream batches from `reader` to `writer`, flushing after every line.
    pub fn run<R: BufRead, W: Write>(
        &self,
        reader: R,
        mut writer: W,
    ) -> anyhow::Result<ProcessSummary> {
        let mut summary = ProcessSummary::default();
        for line in batch_lines(reader) {
            let (line_no, line) = line.context("failed to read input")?;
            let outcome = parse_batch(&line)
                .map_err(anyhow::Error::from)
                .and_then(|ops| Ok((ops.len(), process_batch(&ops)?)));

            match outcome {
                Ok((count, results)) => {
                    write_taxes(&results, &mut writer)
                        .with_context(|| format!("failed to write result for line {}", line_no))?;
                    writer.flush()?;
                    summary.batches += 1;
                    summary.operations += count;
                }
                Err(e) if self.skip_invalid => {
                    log::warn!("Skipping line {}: {:#}", line_no, e);
                    summary.skipped += 1;
                }
                Err(e) => return Err(e.context(format!("line {}", line_no))),
            }
        }
        Ok(summary)
    }
}
