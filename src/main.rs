use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use peownerfinder::cli::{Cli, Commands, FirmsCommands};
use peownerfinder::config::{self, AppConfig};
use peownerfinder::input;
use peownerfinder::logger::{self, VerbosityLevel};
use peownerfinder::orchestrator::{BatchOutcome, Orchestrator};
use peownerfinder::report;
use peownerfinder::research::GeminiClient;
use peownerfinder::server::{self, AppState};
use peownerfinder::store::{JsonStore, StateStore};
use peownerfinder::task_registry::TaskRegistry;

const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Handle --init flag first (before any other processing)
    if cli.init {
        match AppConfig::create_default_config() {
            Ok(path) => {
                println!("✅ Created default configuration file at: {}", path.display());
                println!("   Edit this file to customize settings, then run peownerfinder again.");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        }
    }

    let app_config = load_config(cli.config.as_deref());
    logger::init(VerbosityLevel::from_verbose_count(cli.verbose), cli.log_file.as_deref())?;

    let store = Arc::new(JsonStore::new(&app_config.storage));
    store.ensure_dirs()?;

    match cli.command {
        None => run_server(app_config, store, None).await,
        Some(Commands::Serve { bind }) => run_server(app_config, store, bind).await,
        Some(Commands::Analyze {
            input,
            output,
            concurrency,
        }) => run_analyze(app_config, store, &input, output, concurrency).await,
        Some(Commands::Firms { action }) => run_firms(store.as_ref(), action),
    }
}

fn load_config(path: Option<&Path>) -> AppConfig {
    let loaded = match path {
        Some(path) => AppConfig::load_from_path(path),
        None => AppConfig::load(),
    };
    match loaded {
        Ok(cfg) => cfg,
        Err(config::ConfigError::FileNotFound(path)) => {
            // Config not found - prompt to create if interactive
            match AppConfig::prompt_create_config() {
                Ok(Some(created_path)) => {
                    println!("✅ Created default configuration file at: {}", created_path.display());
                    println!("   Edit this file to customize settings, then run peownerfinder again.");
                    std::process::exit(0);
                }
                Ok(None) => {
                    eprintln!("❌ Configuration file not found at: {}", path.display());
                    eprintln!("   Run with --init to create a default configuration file.");
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("❌ Failed to create configuration file: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

fn build_orchestrator(app_config: &AppConfig, store: Arc<JsonStore>) -> Orchestrator {
    let clients = GeminiClient::factory(app_config.gemini.clone(), app_config.rate_limit.clone());
    Orchestrator::new(store, clients, TaskRegistry::new(), app_config.analysis.clone())
}

fn env_api_key() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty())
}

async fn run_server(mut app_config: AppConfig, store: Arc<JsonStore>, bind: Option<String>) -> Result<()> {
    if let Some(bind) = bind {
        app_config.server.bind_address = bind;
    }

    let fallback_api_key = env_api_key();
    if store.load_settings().api_key().is_none() && fallback_api_key.is_none() {
        warn!("No Gemini API key configured; set one in the settings page or via {}", API_KEY_ENV);
    }

    let state = AppState {
        orchestrator: build_orchestrator(&app_config, store.clone()),
        uploads_dir: store.uploads_dir().to_path_buf(),
        fallback_api_key,
    };
    server::serve(state, &app_config.server).await
}

async fn run_analyze(
    mut app_config: AppConfig,
    store: Arc<JsonStore>,
    input_path: &Path,
    output: Option<PathBuf>,
    concurrency: Option<usize>,
) -> Result<()> {
    if let Some(concurrency) = concurrency {
        anyhow::ensure!(concurrency > 0, "--concurrency must be at least 1");
        app_config.analysis.concurrency = concurrency;
    }

    let sheet = input::read_sheet(input_path)
        .with_context(|| format!("Failed to read input file: {}", input_path.display()))?;
    let names = sheet.require_company_names()?;
    eprintln!("🔍 Analyzing {} companies from {}", names.len(), input_path.display());

    let api_key = store.load_settings().api_key().map(str::to_string).or_else(env_api_key);
    let orchestrator = build_orchestrator(&app_config, store.clone());
    // No source file: the user's input must survive a later delete of this batch
    let (ticket, handle) = orchestrator.submit(names, None, api_key.as_deref()).await?;

    let tasks = orchestrator.tasks().clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⚠️  Interrupt received. Cancelling analysis...");
            tasks.cancel(ticket.report_id);
        }
    });
    let joined = handle.await;
    interrupt.abort();

    match joined.context("Analysis task failed")?? {
        BatchOutcome::Completed(report) => {
            let output = output.unwrap_or_else(|| PathBuf::from(report::download_filename(&report)));
            report::export_report(&report, &sheet, &output)?;

            let flagged = report.companies.iter().filter(|c| c.flagged_as_pe_account).count();
            let review = report.companies.iter().filter(|c| c.needs_review).count();
            let failed = report.companies.iter().filter(|c| c.error.is_some()).count();
            println!("✅ {} ({:.1}s)", report.report_name, report.duration_seconds);
            println!("   Companies analyzed: {}", report.companies.len());
            println!("   Flagged as PE accounts: {}", flagged);
            println!("   Needing review: {}", review);
            println!("   Failed: {}", failed);
            println!("   PE firms researched: {}", report.pe_insights.len());
            println!("📄 Report written to: {}", output.display());
            info!("Report ID: {}", report.report_id);
            Ok(())
        }
        BatchOutcome::Cancelled => {
            eprintln!("❌ Analysis cancelled; no report was written.");
            std::process::exit(130);
        }
    }
}

fn run_firms(store: &dyn StateStore, action: FirmsCommands) -> Result<()> {
    match action {
        FirmsCommands::List => {
            let firms = store.load_known_firms();
            for firm in &firms {
                println!("{}", firm);
            }
            eprintln!("{} known PE firms", firms.len());
        }
        FirmsCommands::Add { names } => {
            let added = store.merge_known_firms(&names)?;
            println!("✅ Added {} new firm(s) to the registry", added);
        }
    }
    Ok(())
}
