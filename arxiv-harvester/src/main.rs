use anyhow::Context;
use arxiv_harvester::daemon::validate_groups;
use arxiv_harvester::{
    parse_day, AppConfig, CacheQuery, CrawlDaemon, DailyCache, DailyLookup, Fetcher,
    FilterConfig, Harvester, PgRecordSink, RecordSet, SnapshotStore, Taxonomy,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "arxiv-harvester", about = "Harvest and cache daily arXiv listings")]
struct Cli {
    #[arg(short, long, default_value = "harvester.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl the configured groups every day into PostgreSQL
    Crawl {
        /// Comma separated category groups, overriding the configuration
        #[arg(short, long, value_delimiter = ',')]
        groups: Vec<String>,
    },
    /// Print one day's records for some groups or categories
    Fetch {
        #[arg(short, long)]
        date: String,
        #[arg(short, long)]
        group: Vec<String>,
        #[arg(short = 'C', long)]
        category: Vec<String>,
    },
    /// Print one day's records selected by a filter file
    Query {
        #[arg(short, long)]
        date: String,
        #[arg(short, long)]
        filter: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_or_default(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let taxonomy = Arc::new(Taxonomy::load_or_builtin(config.taxonomy_path.as_deref())?);
    let harvester = Arc::new(Harvester::new(
        Fetcher::new(&config.harvest)?,
        config.harvest.clone(),
    ));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            signal.cancel();
        }
    });

    match cli.command {
        Command::Crawl { groups } => {
            let requested = if groups.is_empty() {
                config.daemon.groups.clone()
            } else {
                groups
            };
            let groups = validate_groups(&requested, &taxonomy)?;
            let database_url = config
                .database
                .url
                .clone()
                .context("no database configured, set DATABASE_URL or [database].url")?;

            let sink = PgRecordSink::connect(&database_url).await?;
            sink.ensure_schema().await?;

            let daemon = CrawlDaemon::new(groups, harvester, sink, config.daemon.wake_interval());
            daemon.run(shutdown).await?;
        }
        Command::Fetch {
            date,
            group,
            category,
        } => {
            let query = if category.is_empty() {
                CacheQuery::Groups(group)
            } else {
                CacheQuery::Categories(category)
            };
            let cache = DailyCache::new(harvester, SnapshotStore::new(&config.cache.root), taxonomy)
                .with_cancellation(shutdown);
            let result = match parse_day(&date) {
                Ok(day) => cache.get_by_date(day, &query).await.map(|l| (day, l)),
                Err(e) => Err(e),
            };
            print_result(&date, result)?;
        }
        Command::Query { date, filter } => {
            let content = std::fs::read_to_string(&filter)
                .with_context(|| format!("failed to read filter {:?}", filter))?;
            let filter = FilterConfig::from_toml_str(&content)?;
            let cache = DailyCache::new(harvester, SnapshotStore::new(&config.cache.root), taxonomy)
                .with_cancellation(shutdown);
            let result = match parse_day(&date) {
                Ok(day) => cache.query(day, &filter).await.map(|l| (day, l)),
                Err(e) => Err(e),
            };
            print_result(&date, result)?;
        }
    }

    Ok(())
}

fn print_result(
    date: &str,
    result: arxiv_harvester::Result<(NaiveDate, DailyLookup)>,
) -> anyhow::Result<()> {
    match result {
        Ok((_, DailyLookup::Available(records))) => print_records(&records),
        Ok((day, DailyLookup::Unavailable)) => {
            info!("{} is not a complete day yet", day);
            println!("no data for {}", date);
            Ok(())
        }
        Err(e) => {
            error!("Lookup for {} failed: {}", date, e);
            println!("no data for {}", date);
            Ok(())
        }
    }
}

fn print_records(records: &RecordSet) -> anyhow::Result<()> {
    for record in records {
        println!("{}", serde_json::to_string(record)?);
    }
    Ok(())
}
