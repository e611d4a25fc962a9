use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use newsparser::config::Config;
use newsparser::feed::FeedFetcher;
use newsparser::ingest::{dispatch_all, select_sources, Ingestor, SelectError, Worker};
use newsparser::storage::{Database, DatabaseError, NewSource, Source, DEFAULT_COUNTRY};
use newsparser::util::validate_url;

#[derive(Parser, Debug)]
#[command(
    name = "newsparser",
    version,
    about = "Fetch RSS/Atom news sources into a SQLite database"
)]
struct Args {
    /// Config file (missing file means defaults)
    #[arg(long, global = true, value_name = "FILE", default_value = "newsparser.toml")]
    config: PathBuf,

    /// SQLite database path, overrides `database_path` from the config
    #[arg(long, global = true, value_name = "PATH")]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch feeds and store new items
    ParseRss {
        /// Parse only this source, even if it is inactive
        #[arg(long, value_name = "ID")]
        source_id: Option<i64>,

        /// Queue one message per source for workers instead of parsing inline
        #[arg(long = "async")]
        async_mode: bool,
    },

    /// Process queued parse messages
    Worker {
        /// Exit once the queue is empty
        #[arg(long)]
        once: bool,
    },

    /// Register a news source
    AddSource {
        #[arg(long)]
        name: String,

        /// Feed URL (absolute http or https)
        #[arg(long)]
        url: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long, default_value = DEFAULT_COUNTRY)]
        country: String,

        /// Register the source as inactive (skipped by batch runs)
        #[arg(long)]
        inactive: bool,
    },

    /// List registered sources
    Sources,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config file '{}'", args.config.display()))?;
    if let Some(path) = args.database {
        config.database_path = path;
    }

    let db = open_database(&config.database_path).await?;

    match args.command {
        Command::ParseRss {
            source_id,
            async_mode,
        } => parse_rss(&config, db, source_id, async_mode).await,
        Command::Worker { once } => run_worker(&config, db, once).await,
        Command::AddSource {
            name,
            url,
            description,
            country,
            inactive,
        } => {
            add_source(&db, name, url, description, country, !inactive).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Sources => {
            list_sources(&db).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn open_database(path: &str) -> Result<Database> {
    match Database::open(path).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::Locked) => anyhow::bail!(
            "Database '{}' is locked by another process. Retry once it finishes.",
            path
        ),
        Err(e) => Err(e).with_context(|| format!("Failed to open database '{}'", path)),
    }
}

async fn parse_rss(
    config: &Config,
    db: Database,
    source_id: Option<i64>,
    async_mode: bool,
) -> Result<ExitCode> {
    let sources = match select_sources(&db, source_id).await {
        Ok(sources) => sources,
        Err(SelectError::SourceNotFound(id)) => {
            eprintln!("Error: source #{} not found", id);
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e).context("Failed to load sources"),
    };

    if sources.is_empty() {
        tracing::warn!("No active sources found");
        println!("No active sources to parse.");
        return Ok(ExitCode::SUCCESS);
    }

    if async_mode {
        let queued = dispatch_all(&db, &sources)
            .await
            .context("Failed to queue parse messages")?;
        for source in &sources {
            println!("  queued  {} (#{})", source.name, source.id);
        }
        println!("Queued {} source(s) for asynchronous parsing.", queued);
        return Ok(ExitCode::SUCCESS);
    }

    let fetcher = FeedFetcher::from_config(config).context("Failed to build HTTP client")?;
    let report = Ingestor::new(fetcher, db).run_batch(sources).await;

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(count) => println!(
                "  ok      {} (#{}): {} new item(s)",
                outcome.name, outcome.source_id, count
            ),
            Err(e) => println!("  failed  {} (#{}): {}", outcome.name, outcome.source_id, e),
        }
    }
    println!(
        "Done: {} succeeded, {} failed, {} new item(s) in total.",
        report.succeeded, report.failed, report.total_items
    );

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run_worker(config: &Config, db: Database, once: bool) -> Result<ExitCode> {
    let fetcher = FeedFetcher::from_config(config).context("Failed to build HTTP client")?;
    let worker = Worker::new(Ingestor::new(fetcher, db.clone()), db, config);

    if once {
        let handled = worker
            .run_until_empty()
            .await
            .context("Worker failed while reading the queue")?;
        println!("Processed {} message(s).", handled);
        return Ok(ExitCode::SUCCESS);
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("Failed to listen for ctrl-c");
            return;
        }
        tracing::info!("Shutdown requested, finishing current message");
        let _ = cancel_tx.send(true);
    });

    let handled = worker.run(cancel_rx).await;
    println!("Processed {} message(s).", handled);
    Ok(ExitCode::SUCCESS)
}

async fn add_source(
    db: &Database,
    name: String,
    url: String,
    description: Option<String>,
    country: String,
    is_active: bool,
) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Source name must not be empty");
    }
    validate_url(&url).with_context(|| format!("Rejected source URL '{}'", url))?;

    let source = db
        .insert_source(&NewSource {
            name: name.to_string(),
            url: url.trim().to_string(),
            description: description.filter(|d| !d.trim().is_empty()),
            is_active,
            country,
        })
        .await
        .context("Failed to save source")?;

    println!("Added source #{}: {} <{}>", source.id, source.name, source.url);
    Ok(())
}

fn format_timestamp(ts: Option<i64>) -> String {
    ts.and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string())
}

async fn list_sources(db: &Database) -> Result<()> {
    let sources: Vec<Source> = db.list_sources().await.context("Failed to load sources")?;
    if sources.is_empty() {
        println!("No sources registered. Add one with `newsparser add-source`.");
        return Ok(());
    }

    println!(
        "{:>4}  {:<24}  {:<6}  {:<19}  {:>6}  URL",
        "ID", "NAME", "ACTIVE", "LAST PARSED", "ITEMS"
    );
    for source in &sources {
        let items = db
            .count_items_for_source(source.id)
            .await
            .context("Failed to count items")?;
        println!(
            "{:>4}  {:<24}  {:<6}  {:<19}  {:>6}  {}",
            source.id,
            source.name,
            if source.is_active { "yes" } else { "no" },
            format_timestamp(source.last_parsed_at),
            items,
            source.url
        );
    }
    Ok(())
}
