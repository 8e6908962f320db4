use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use callgrade::{
    AnalysisDispatcher, AnalyzeRequest, AnthropicScorer, AppState, CallStore, Config,
    DispatchConfig, Direction, MemoryStore, OpenPhoneClient, PollPipeline, SqliteStore,
    SyncOptions, SyncScheduler, WebhookProcessor, router,
};

#[derive(Parser)]
#[command(name = "callgrade")]
#[command(author, version, about = "Call ingestion and quality scoring service", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use an in-memory store instead of DATABASE_PATH
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve webhooks and run the daily sync
    Serve,

    /// Run one sync now
    Sync {
        /// Days to look back (defaults to SYNC_DAYS)
        #[arg(long)]
        days: Option<u32>,

        /// Only sync this line id
        #[arg(long)]
        line: Option<String>,

        /// Store calls and transcripts without analyzing them
        #[arg(long)]
        no_analyze: bool,
    },

    /// Score a stored call
    Analyze {
        /// Call id
        call_id: String,

        /// Score with this rubric instead of the call's direction
        #[arg(long, value_parser = parse_direction)]
        direction: Option<Direction>,
    },
}

fn parse_direction(value: &str) -> Result<Direction, String> {
    Direction::parse(value).ok_or_else(|| format!("unknown direction: {value}"))
}

struct Services {
    config: Config,
    store: Arc<dyn CallStore>,
    dispatcher: Arc<AnalysisDispatcher>,
    pipeline: Arc<PollPipeline>,
    telephony: Arc<OpenPhoneClient>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let services = build_services(cli.memory)?;

    match cli.command {
        Commands::Serve => serve(services).await,
        Commands::Sync {
            days,
            line,
            no_analyze,
        } => sync_once(services, days, line, no_analyze).await,
        Commands::Analyze { call_id, direction } => analyze(services, call_id, direction).await,
    }
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "callgrade=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_services(in_memory: bool) -> Result<Services> {
    let config = Config::from_env().context("Failed to load configuration")?;

    let store: Arc<dyn CallStore> = if in_memory {
        info!("Using in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        info!("Opening database {:?}", config.database_path);
        Arc::new(
            SqliteStore::open(&config.database_path)
                .with_context(|| format!("Failed to open {:?}", config.database_path))?,
        )
    };

    let telephony = Arc::new(
        OpenPhoneClient::new(config.openphone()).context("Failed to create telephony client")?,
    );
    let scorer = Arc::new(AnthropicScorer::new(config.anthropic()));
    let dispatcher = Arc::new(AnalysisDispatcher::new(
        store.clone(),
        scorer,
        config.line_policy(),
        DispatchConfig::default(),
    ));
    let pipeline = Arc::new(PollPipeline::new(
        telephony.clone(),
        store.clone(),
        dispatcher.clone(),
    ));

    Ok(Services {
        config,
        store,
        dispatcher,
        pipeline,
        telephony,
    })
}

async fn serve(services: Services) -> Result<()> {
    let Services {
        config,
        store,
        dispatcher,
        pipeline,
        telephony,
    } = services;

    let scheduler = Arc::new(SyncScheduler::new(
        pipeline,
        store.clone(),
        config.sync_lines(),
        config.sync_time,
    ));
    let webhooks = Arc::new(WebhookProcessor::new(
        telephony,
        store.clone(),
        dispatcher.clone(),
        config.transcript_fetch_delay,
    ));

    tokio::spawn(scheduler.clone().run());

    let app = router(AppState {
        store,
        dispatcher,
        webhooks,
        scheduler,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Listening on {}", config.bind_addr);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn sync_once(
    services: Services,
    days: Option<u32>,
    line: Option<String>,
    no_analyze: bool,
) -> Result<()> {
    let lines: Vec<SyncOptions> = match line {
        Some(line) => vec![SyncOptions {
            days: services.config.sync_days,
            ..SyncOptions::new(line)
        }],
        None => services.config.sync_lines(),
    };

    let mut failed = 0;
    for mut options in lines {
        if let Some(days) = days {
            options.days = days;
        }
        options.auto_analyze = !no_analyze;

        let report = services.pipeline.run(&options).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        if !report.success {
            failed += 1;
        }
    }

    if failed > 0 {
        anyhow::bail!("{} line(s) failed to sync", failed);
    }
    Ok(())
}

async fn analyze(services: Services, call_id: String, direction: Option<Direction>) -> Result<()> {
    let outcome = services
        .dispatcher
        .analyze(AnalyzeRequest {
            direction,
            ..AnalyzeRequest::new(call_id.clone())
        })
        .await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.success {
        warn!("Analysis of {} failed", call_id);
        anyhow::bail!(outcome.error.unwrap_or_else(|| "analysis failed".to_string()));
    }
    Ok(())
}
