use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobfit_core::{PostingId, UserId};
use jobfit_ingest::{FixtureSource, IngestConfig, IngestPipeline, ListingApiSource, PostingSource};
use jobfit_query::{BrowseRequest, JobpostService, QueryConfig};
use jobfit_storage::{HttpFetcher, PgStore};
use jobfit_taxonomy::{CompiledRule, TaxonomyRules};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "jobfit")]
#[command(about = "Job posting ingestion, taxonomy extraction and recommendations")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply database migrations.
    Migrate,
    /// Ingest a captured batch file of companies and postings.
    Ingest { batch: PathBuf },
    /// Scrape the configured listing API and ingest the result.
    Scrape,
    /// Validate the rule files without touching the database.
    CheckRules,
    /// List postings with filters, sorting and pagination.
    Browse {
        #[arg(long)]
        viewer: Option<UserId>,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        order: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
        /// Repeatable `key=value` filter.
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
    },
    /// Rank postings for a user.
    Recommend {
        #[arg(long)]
        user: UserId,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    Like {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        posting: PostingId,
    },
    Unlike {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        posting: PostingId,
    },
    /// Show one posting with its company.
    Detail { posting: PostingId },
    /// Address, stack and keyword facets for filter menus.
    Facets,
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
    if key.trim().is_empty() {
        return Err(format!("empty filter key in {raw:?}"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn connect(config: &IngestConfig) -> Result<Arc<PgStore>> {
    let store = PgStore::connect(&config.database_url)
        .await
        .context("connecting to the jobfit database")?;
    Ok(Arc::new(store))
}

fn query_service(store: Arc<PgStore>) -> JobpostService {
    JobpostService::new(store.clone(), store, QueryConfig::from_env())
}

async fn ingest(
    config: &IngestConfig,
    store: Arc<PgStore>,
    source: &dyn PostingSource,
) -> Result<()> {
    let pipeline = IngestPipeline::from_config(config, store).await?;
    let run_id = Uuid::new_v4();
    let batch = source
        .fetch_batch(run_id)
        .await
        .with_context(|| format!("fetching batch from {}", source.source_id()))?;
    let summary = pipeline.run(&batch).await;
    info!(
        source = source.source_id(),
        created = summary.created,
        updated = summary.updated,
        failed = summary.failed,
        "ingest complete"
    );
    print_json(&summary)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = IngestConfig::from_env();

    match cli.command.unwrap_or(Commands::Migrate) {
        Commands::Migrate => {
            let store = connect(&config).await?;
            store.migrate().await?;
            info!("migrations applied");
        }
        Commands::Ingest { batch } => {
            let store = connect(&config).await?;
            ingest(&config, store, &FixtureSource::new(batch)).await?;
        }
        Commands::Scrape => {
            let store = connect(&config).await?;
            let fetcher = HttpFetcher::new(config.http_client_config())?;
            let source = ListingApiSource::new(fetcher, config.listing_api_config());
            ingest(&config, store, &source).await?;
        }
        Commands::CheckRules => {
            let rules = TaxonomyRules::from_dir(&config.rules_dir)?;
            for rule in &rules.keywords {
                CompiledRule::keyword(rule)?;
            }
            for rule in &rules.stacks {
                CompiledRule::stack(rule)?;
            }
            println!(
                "rules ok: keywords={} stacks={}",
                rules.keywords.len(),
                rules.stacks.len()
            );
        }
        Commands::Browse {
            viewer,
            sort,
            order,
            limit,
            offset,
            filters,
        } => {
            let service = query_service(connect(&config).await?);
            let request = BrowseRequest {
                viewer,
                sort,
                order,
                limit,
                offset,
                filters: filters.into_iter().collect::<BTreeMap<_, _>>(),
            };
            print_json(&service.browse(&request).await?)?;
        }
        Commands::Recommend { user, limit } => {
            let service = query_service(connect(&config).await?);
            print_json(&service.recommend(user, limit).await?)?;
        }
        Commands::Like { user, posting } => {
            query_service(connect(&config).await?)
                .like(user, posting)
                .await;
        }
        Commands::Unlike { user, posting } => {
            query_service(connect(&config).await?)
                .unlike(user, posting)
                .await;
        }
        Commands::Detail { posting } => {
            let service = query_service(connect(&config).await?);
            print_json(&service.detail(posting).await)?;
        }
        Commands::Facets => {
            let service = query_service(connect(&config).await?);
            print_json(&service.facets().await?)?;
        }
    }

    Ok(())
}
