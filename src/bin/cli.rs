//! Flare CLI
//!
//! Command-line interface for running stored query documents:
//! - Print a query document
//! - List and summarize matching spans
//! - Export span (or gap) frames as CSV

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use flare::config::generate_default_config;
use flare::query::{Delta, Stream, StreamPath};
use flare::{Align, Client, Config, Cursor, LoggingConfig};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "flare")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Temporal pattern queries over event streams")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the usual locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Query service URL
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// API key
    #[arg(long, global = true)]
    pub auth_key: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pretty-print a query document
    Ast {
        /// Path to the JSON query document
        file: PathBuf,
    },

    /// Run a query document and list its spans
    Spans {
        file: PathBuf,
        /// Stop after this many spans
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Run a query document and summarize span lengths
    Stats { file: PathBuf },

    /// Run a query document and export its frames as CSV
    Export {
        file: PathBuf,
        /// Fixed window per span, e.g. "1h" or "30m 15s"
        #[arg(short, long)]
        window: Option<Delta>,
        /// Window placement inside each span
        #[arg(short, long, value_enum, default_value = "center")]
        align: AlignArg,
        /// Resampling frequency
        #[arg(long)]
        freq: Option<Delta>,
        /// Sliding windows: history kept before each prediction point
        #[arg(long, requires = "freq")]
        lookback: Option<Delta>,
        /// Sliding windows: time after each prediction point
        #[arg(long, requires = "lookback")]
        horizon: Option<Delta>,
        /// Sliding windows: step between windows (default: the frequency)
        #[arg(long, requires = "lookback")]
        slide: Option<Delta>,
        /// Export the gaps between spans instead
        #[arg(long)]
        inverse: bool,
        /// Columns as stream:attr.path (default: all)
        #[arg(short = 'C', long)]
        columns: Vec<String>,
        /// Drop the stream: prefix from column names
        #[arg(long)]
        drop_stream_names: bool,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum AlignArg {
    Left,
    Center,
    Right,
}

impl From<AlignArg> for Align {
    fn from(a: AlignArg) -> Self {
        match a {
            AlignArg::Left => Align::Left,
            AlignArg::Center => Align::Center,
            AlignArg::Right => Align::Right,
        }
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("flare={}", logging.level)),
    );
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so CSV and JSON output stay clean
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(host) = &cli.host {
        config.client.host = host.clone();
    }
    if let Some(key) = &cli.auth_key {
        config.client.auth_key = key.clone();
    }
    Ok(config)
}

fn read_document(path: &Path) -> anyhow::Result<serde_json::Value> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// `stream:attr.path` to a column selector
fn parse_column(column: &str) -> anyhow::Result<StreamPath> {
    match column.split_once(':') {
        Some((stream, path)) if !stream.is_empty() && !path.is_empty() => {
            Ok(Stream::new(stream).attr(path))
        }
        _ => bail!("invalid column {:?}, expected stream:attr.path", column),
    }
}

fn output_writer(output: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    })
}

fn format_duration(d: chrono::Duration) -> String {
    let secs = d.num_seconds();
    if secs >= 86400 {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    } else if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

async fn run_query(client: &Client, file: &Path) -> anyhow::Result<Cursor> {
    let document = read_document(file)?;
    Ok(client.submit_document(&document).await?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let config = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, config)?;
                println!("Config written to {}", path.display());
            }
            None => print!("{}", config),
        }
        return Ok(());
    }

    let mut config = load_config(&cli)?;
    init_logging(&config.logging);

    match &cli.command {
        Commands::Ast { file } => {
            let document = read_document(file)?;
            println!("{}", serde_json::to_string_pretty(&document)?);
        }

        Commands::Spans { file, limit } => {
            if let Some(limit) = limit {
                config.client = config.client.span_limit(*limit);
            }
            let client = Client::new(config.client)?;
            let cursor = run_query(&client, file).await?;

            if cli.format == "json" {
                println!("{}", cursor.json().await?);
            } else {
                let spans = cursor.spans(false).await?;
                if spans.is_empty() {
                    println!("No matching spans.");
                } else {
                    println!("{:<27} {:<27} {}", "Start", "End", "Duration");
                    println!("{}", "-".repeat(66));
                    for span in spans.iter() {
                        println!(
                            "{:<27} {:<27} {}",
                            span.start.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into()),
                            span.end.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into()),
                            span.duration().map(format_duration).unwrap_or_else(|| "open".into()),
                        );
                    }
                }
            }
        }

        Commands::Stats { file } => {
            let client = Client::new(config.client)?;
            let cursor = run_query(&client, file).await?;

            match cursor.stats().await? {
                None => println!("No closed spans."),
                Some(stats) if cli.format == "json" => {
                    let body = serde_json::json!({
                        "count": stats.count,
                        "min": stats.min.num_milliseconds() as f64 / 1000.0,
                        "max": stats.max.num_milliseconds() as f64 / 1000.0,
                        "mean": stats.mean.num_milliseconds() as f64 / 1000.0,
                        "median": stats.median.num_milliseconds() as f64 / 1000.0,
                    });
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                Some(stats) => {
                    println!("Spans:  {}", stats.count);
                    println!("Min:    {}", format_duration(stats.min));
                    println!("Max:    {}", format_duration(stats.max));
                    println!("Mean:   {}", format_duration(stats.mean));
                    println!("Median: {}", format_duration(stats.median));
                }
            }
        }

        Commands::Export {
            file,
            window,
            align,
            freq,
            lookback,
            horizon,
            slide,
            inverse,
            columns,
            drop_stream_names,
            output,
        } => {
            let columns = columns
                .iter()
                .map(|c| parse_column(c))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let client = Client::new(config.client)?;
            let cursor = run_query(&client, file).await?;

            let mut group = match (lookback, freq) {
                (Some(lookback), Some(freq)) => cursor.sliding(
                    *lookback,
                    horizon.unwrap_or_else(Delta::zero),
                    slide.unwrap_or(*freq),
                    *freq,
                ),
                (Some(_), None) => bail!("--lookback needs --freq"),
                _ => cursor.dataset(*window, (*align).into(), *freq),
            };
            if *inverse {
                group = group.inverse();
            }

            let frame = group.dataframe(&columns, *drop_stream_names).await?;
            tracing::info!(rows = frame.len(), "exporting frames");
            frame.write_csv(output_writer(output.as_deref())?)?;

            if let Some(path) = output {
                println!("Exported {} rows to {}", frame.len(), path.display());
            }
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}
