// =============================================================================
// HTF Scanner — Main Entry Point
// =============================================================================
//
//   htf-scanner scan          one scan, write the CSV, exit (2 if all failed)
//   htf-scanner serve         API server + cron-scheduled scans
//   htf-scanner check-setup   evaluate a London-session setup from JSON
// =============================================================================

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use htf_scanner::api;
use htf_scanner::app_state::AppState;
use htf_scanner::config::ScannerConfig;
use htf_scanner::market_data::Candle;
use htf_scanner::scanner;
use htf_scanner::scheduler::{run_scheduled_scans, ScanSchedule};
use htf_scanner::setup::{check_setup, SetupBar, SetupParams, SetupVerdict};
use htf_scanner::yahoo::YahooClient;

#[derive(Parser)]
#[command(name = "htf-scanner")]
#[command(about = "4H EMA34/EMA200 trend scanner", long_about = None)]
struct Cli {
    /// Scanner configuration file (JSON). Defaults apply when it is missing.
    #[arg(long, env = "HTF_CONFIG", default_value = "scanner_config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scan and write the results file
    Scan,

    /// Serve the shortlist API and run scheduled scans
    Serve {
        /// Do not start the cron scheduler
        #[arg(long)]
        no_schedule: bool,
    },

    /// Check a single annotated bar against the London-session setup rules
    CheckSetup {
        /// JSON file with `bar`, `params`, `last_cross_idx`, `current_idx`
        /// and `history`
        input: PathBuf,
    },
}

/// Input document for `check-setup`.
#[derive(Deserialize)]
struct SetupInput {
    bar: SetupBar,
    params: SetupParams,
    last_cross_idx: usize,
    current_idx: usize,
    #[serde(default)]
    history: Vec<Candle>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "htf-scanner failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    if let Commands::CheckSetup { input } = &cli.command {
        return check_setup_file(input);
    }

    let config = load_config(&cli.config)?;
    let source = YahooClient::new()?.keep_partial(config.include_partial_candle);

    match cli.command {
        Commands::Scan => {
            let report = scanner::execute(&source, &config).await?;
            let code = report.exit_code();
            if code != 0 {
                error!(code, "all downloads failed");
            }
            Ok(ExitCode::from(code))
        }
        Commands::Serve { no_schedule } => {
            serve(config, Arc::new(source), !no_schedule).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::CheckSetup { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn load_config(path: &Path) -> Result<ScannerConfig> {
    let mut config = ScannerConfig::load(path).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        ScannerConfig::default()
    });
    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate().context("invalid scanner configuration")?;

    info!(
        symbols = config.watchlist.len(),
        timeframe = %config.timeframe,
        output = %config.output_csv,
        "configuration ready"
    );
    Ok(config)
}

async fn serve(
    config: ScannerConfig,
    source: Arc<YahooClient>,
    schedule_enabled: bool,
) -> Result<()> {
    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        HTF Scanner — Starting Up                         ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let schedule = ScanSchedule::parse(&config.schedule)?;
    let bind_addr = config.bind_addr.clone();
    let scan_on_startup = config.scan_on_startup;

    let push_token = std::env::var("PUSH_TOKEN").ok();
    if push_token.as_deref().map_or(true, str::is_empty) {
        warn!("PUSH_TOKEN is not set; POST /api/v1/scan will reject every request");
    }

    let state = Arc::new(AppState::new(config, source).with_push_token(push_token));

    // ── Scans ────────────────────────────────────────────────────────────
    if scan_on_startup {
        let st = state.clone();
        tokio::spawn(async move {
            match st.run_scan_cycle().await {
                Some(Ok(summary)) => info!(rows = summary.rows_written, "startup scan complete"),
                Some(Err(e)) => error!(error = %e, "startup scan failed"),
                None => warn!("startup scan skipped, another scan is running"),
            }
        });
    }

    if schedule_enabled {
        tokio::spawn(run_scheduled_scans(state.clone(), schedule));
    } else {
        info!("scheduler disabled");
    }

    // ── API server ───────────────────────────────────────────────────────
    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server to {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            warn!("shutdown signal received, stopping gracefully");
        })
        .await
        .context("API server failed")?;

    info!("HTF Scanner shut down complete.");
    Ok(())
}

fn check_setup_file(path: &Path) -> Result<ExitCode> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let input: SetupInput = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse setup input {}", path.display()))?;

    let verdict = check_setup(
        &input.bar,
        input.last_cross_idx,
        input.current_idx,
        &input.history,
        &input.params,
    );

    match verdict {
        SetupVerdict::Candidate(details) => {
            println!("{}", serde_json::to_string_pretty(&details)?);
            Ok(ExitCode::SUCCESS)
        }
        SetupVerdict::Rejected(reason) => {
            println!("{reason}");
            Ok(ExitCode::from(1))
        }
    }
}
