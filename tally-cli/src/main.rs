use std::io;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use eyre::Result;
use serde_json::Value as JsonValue;
use tally::{Config, QueryResult, Store};

#[derive(Parser, Debug)]
#[clap(name = "tally", about, version)]
struct Args {
    /// Path to the configuration file.
    #[clap(short, long, default_value = "tally.yaml")]
    config: String,

    /// Increase output logging verbosity.
    #[clap(short, long)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the database from the configured layout and data sources.
    Refresh {
        /// Path to an XML file with data (can be repeated).
        #[clap(short, long = "file")]
        files: Vec<String>,
    },
    /// Execute a pre-configured report.
    Report {
        /// Report to be executed.
        name: String,
        /// NAME=VALUE pair defining a global query parameter to be used for
        /// each query in the report (can be repeated).
        #[clap(short, long = "param")]
        params: Vec<String>,
    },
    /// Execute a query against the database.
    Query {
        /// How to format the output ("table" or "csv").
        #[clap(short, long, default_value = "table")]
        output: String,
        /// Query to be executed.
        sql: String,
    },
}

fn main() {
    let args = Args::parse();
    simple_logger::init_with_level(if args.verbose {
        log::Level::Debug
    } else {
        log::Level::Info
    })
    .unwrap();

    if let Err(e) = run(&args) {
        log::error!("Failed: {}", e);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let config = Config::load(&args.config)?;
    let store = Store::open(&config.data.db_uri)?;
    match &args.command {
        Command::Refresh { files } => {
            let files: Vec<PathBuf> = files.iter().map(PathBuf::from).collect();
            tally::refresh(&store, &config, &files)?;
        }
        Command::Report { name, params } => {
            let rendered = tally::run_report(&store, &config, name, params)?;
            println!("{}", rendered);
        }
        Command::Query { output, sql } => {
            let result = store.query(sql)?;
            match output.as_str() {
                "table" => print_table(&result),
                "csv" => write_csv(&result)?,
                other => log::error!("Unknown output format {}", other),
            }
        }
    }
    Ok(())
}

fn cell(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn print_table(result: &QueryResult) {
    let mut widths: Vec<usize> = result.header.iter().map(String::len).collect();
    let rows: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(cell).collect())
        .collect();
    for row in &rows {
        for (i, value) in row.iter().enumerate() {
            if value.len() > widths[i] {
                widths[i] = value.len();
            }
        }
    }
    let line = |values: &[String]| {
        values
            .iter()
            .enumerate()
            .map(|(i, value)| format!("{:<width$}", value, width = widths[i]))
            .collect::<Vec<String>>()
            .join("  ")
    };
    println!("{}", line(&result.header));
    println!(
        "{}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<String>>()
            .join("  ")
    );
    for row in &rows {
        println!("{}", line(row));
    }
}

fn write_csv(result: &QueryResult) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(&result.header)?;
    for row in &result.rows {
        writer.write_record(row.iter().map(|value| cell(value)))?;
    }
    writer.flush()?;
    Ok(())
}
