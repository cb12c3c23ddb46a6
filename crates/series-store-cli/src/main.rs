//! CLI tool for writing and reading versioned time series.

mod error;
mod input;
mod output;

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use series_store_core::{
    QueryBuilder, ReadOptions, VersionedSeriesStore, WriteOptions, metadata::write_mode::WriteMode,
};
use snafu::ResultExt;
use tracing_subscriber::EnvFilter;

use crate::{
    error::{CliResult, InvalidFilterSnafu, ListSnafu, OpenStoreSnafu, ReadKeySnafu, WriteKeySnafu},
    output::{ReadOpts, ReadResult, print_read_result, write_rows_file},
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormatArg {
    Csv,
    Jsonl,
}

impl From<OutputFormatArg> for output::OutputFormat {
    fn from(v: OutputFormatArg) -> Self {
        match v {
            OutputFormatArg::Csv => output::OutputFormat::Csv,
            OutputFormatArg::Jsonl => output::OutputFormat::Jsonl,
        }
    }
}

#[derive(Debug, Args)]
struct StoreArg {
    /// Store configuration, e.g. `/data/ticks?library=fx&write_style=append`
    #[arg(long)]
    store: String,
}

#[derive(Debug, Args)]
struct WriteArgs {
    #[command(flatten)]
    store: StoreArg,

    #[arg(long)]
    key: String,

    /// JSON lines: {"ts": "<RFC 3339>", "<field>": <number>, ...}
    #[arg(long)]
    input: PathBuf,

    /// Discard every older version once the new one commits. Without the
    /// flag the store's `prune_previous_versions` option applies.
    #[arg(long)]
    prune: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replace a key's contents (creating the key if needed)
    Write(WriteArgs),

    /// Add rows strictly after a key's last row
    Append(WriteArgs),

    /// Replace the rows inside the input's time span
    Update(WriteArgs),

    /// Read one version of a key
    Read {
        #[command(flatten)]
        store: StoreArg,

        #[arg(long)]
        key: String,

        /// Read the latest version created at or before this time
        #[arg(long = "as-of", value_parser = input::parse_time)]
        as_of: Option<DateTime<Utc>>,

        #[arg(long, value_parser = input::parse_time)]
        start: Option<DateTime<Utc>>,

        #[arg(long, value_parser = input::parse_time)]
        end: Option<DateTime<Utc>>,

        /// Repeatable field names (default: all)
        #[arg(long = "field")]
        field: Vec<String>,

        /// Row filter, e.g. "bid > 1.2 and not ask > 2"
        #[arg(long)]
        filter: Option<String>,

        #[arg(long, default_value_t = 10)]
        max_rows: usize,

        /// Also write every row to this file
        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = OutputFormatArg::Csv)]
        format: OutputFormatArg,
    },

    /// List the retained versions of a key
    Versions {
        #[command(flatten)]
        store: StoreArg,

        #[arg(long)]
        key: String,
    },

    /// List the keys of the library
    Keys {
        #[command(flatten)]
        store: StoreArg,
    },
}

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

struct ReadArgs {
    key: String,
    as_of: Option<DateTime<Utc>>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    field: Vec<String>,
    filter: Option<String>,
    opts: ReadOpts,
}

fn fmt_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

async fn open_store(arg: &StoreArg) -> CliResult<VersionedSeriesStore> {
    VersionedSeriesStore::open_str(&arg.store)
        .await
        .context(OpenStoreSnafu {
            spec: arg.store.clone(),
        })
}

async fn cmd_write(mode: WriteMode, args: WriteArgs) -> CliResult<()> {
    let rows = input::read_rows(&args.input)?;
    let store = open_store(&args.store).await?;

    let mut opts = WriteOptions::mode(mode);
    if args.prune {
        opts = opts.prune(true);
    }

    let handle = store
        .write(&args.key, rows, opts)
        .await
        .context(WriteKeySnafu {
            mode: mode.to_string(),
            key: args.key.clone(),
        })?;

    println!(
        "{} {}: version {} created at {}",
        mode,
        handle.key,
        handle.version,
        fmt_time(handle.created_at)
    );
    Ok(())
}

async fn cmd_read(store: &StoreArg, args: ReadArgs) -> CliResult<()> {
    let store = open_store(store).await?;

    let mut read = ReadOptions::default().range(args.start, args.end);
    read.as_of = args.as_of;
    if !args.field.is_empty() {
        read = read.fields(args.field);
    }
    if let Some(expr) = args.filter {
        let query: QueryBuilder = expr.parse().context(InvalidFilterSnafu { expr: &expr })?;
        read = read.query(query);
    }

    let rows = store
        .read(&args.key, read)
        .await
        .context(ReadKeySnafu { key: &args.key })?;

    if let Some(path) = &args.opts.output {
        write_rows_file(&rows, path, args.opts.format)?;
    }
    let res = ReadResult::from_rows(&rows, args.opts.max_rows);
    print_read_result(&res, &args.opts)
}

async fn cmd_versions(store: &StoreArg, key: &str) -> CliResult<()> {
    let store = open_store(store).await?;
    let versions = store
        .list_versions(key)
        .await
        .context(ListSnafu {
            what: format!("versions of {key:?}"),
        })?;

    for v in versions {
        println!(
            "{}\t{}\t{}\trows={}",
            v.version,
            fmt_time(v.created_at),
            v.operation,
            v.row_count
        );
    }
    Ok(())
}

async fn cmd_keys(store: &StoreArg) -> CliResult<()> {
    let store = open_store(store).await?;
    let keys = store.list_keys().await.context(ListSnafu { what: "keys" })?;
    for key in keys {
        println!("{key}");
    }
    Ok(())
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Write(args) => cmd_write(WriteMode::Write, args).await,
        Command::Append(args) => cmd_write(WriteMode::Append, args).await,
        Command::Update(args) => cmd_write(WriteMode::Update, args).await,

        Command::Read {
            store,
            key,
            as_of,
            start,
            end,
            field,
            filter,
            max_rows,
            output,
            format,
        } => {
            cmd_read(
                &store,
                ReadArgs {
                    key,
                    as_of,
                    start,
                    end,
                    field,
                    filter,
                    opts: ReadOpts {
                        max_rows,
                        output,
                        format: format.into(),
                    },
                },
            )
            .await
        }

        Command::Versions { store, key } => cmd_versions(&store, &key).await,

        Command::Keys { store } => cmd_keys(&store).await,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
