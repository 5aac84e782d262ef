use clap::{Parser, Subcommand};

use crate::cmd::process::ProcessCommand;
use crate::cmd::report::ReportCommand;
use crate::cmd::schema::SchemaCommand;

mod cmd;

#[derive(Parser, Debug)]
#[command(
    name = "capital-gains",
    version,
    about = "Calculate capital gains tax on stock trades",
    long_about = "Reads one JSON array of buy/sell operations per line and writes one JSON \
                  array of taxes per line. Each line is an independent portfolio."
)]
struct Cli {
    /// Log engine transitions (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute taxes, one output line per input line (the default)
    Process(ProcessCommand),
    /// Show the position and tax after every operation
    Report(ReportCommand),
    /// Print the JSON Schema of an input line
    Schema(SchemaCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match cli.command {
        Some(Command::Process(cmd)) => cmd.exec(),
        Some(Command::Report(cmd)) => cmd.exec(),
        Some(Command::Schema(cmd)) => cmd.exec(),
        None => ProcessCommand::default().exec(),
    }
}

fn init_logger(verbose: bool) {
    let mut builder = pretty_env_logger::formatted_builder();
    match std::env::var("RUST_LOG") {
        Ok(filters) => {
            builder.parse_filters(&filters);
        }
        Err(_) if verbose => {
            builder.filter_level(log::LevelFilter::Debug);
        }
        Err(_) => {
            builder.filter_level(log::LevelFilter::Warn);
        }
    }
    builder.init();
}
