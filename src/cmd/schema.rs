//! Schema command - print the expected input format

use capital_gains::tax::BatchInput;
use clap::Args;
use schemars::schema_for;

#[derive(Args, Debug)]
pub struct SchemaCommand {}

impl SchemaCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        println!("{}", batch_schema()?);
        Ok(())
    }
}

/// JSON Schema for one input line
pub fn batch_schema() -> serde_json::Result<String> {
    let schema = schema_for!(BatchInput);
    serde_json::to_string_pretty(&schema)
}
