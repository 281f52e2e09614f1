use clap::{Parser, Subcommand};
use tracing::{error, info};

use pump_scanner::config::Config;
use pump_scanner::logger::init_logger;
use pump_scanner::sim::SyntheticConfig;

/// Spot-market pump scanner
#[derive(Parser, Debug)]
#[command(name = "pump-scanner")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan Bitget spot markets on a fixed interval
    Run {
        /// Seconds between cycle starts (overrides SCAN_INTERVAL)
        #[arg(long)]
        interval: Option<u64>,
        /// Minimum composite score to alert on (overrides SCORE_THRESHOLD)
        #[arg(long)]
        score_threshold: Option<u8>,
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Drive the scanner against a synthetic market
    Simulate {
        #[arg(long, default_value_t = 30)]
        cycles: usize,
        #[arg(long, default_value_t = 40)]
        instruments: usize,
        #[arg(long, default_value_t = 7)]
        seed: u64,
    },
}

#[tokio::main]
async fn main() {
    // a missing .env is fine; the process environment still applies
    dotenvy::dotenv().ok();
    init_logger("pump-scanner");

    let cli = Cli::parse();

    let mut cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %format!("{e:#}"), "invalid configuration");
            std::process::exit(2);
        }
    };

    let command = cli.command.unwrap_or(Commands::Run { interval: None, score_threshold: None, once: false });
    if let Commands::Run { interval, score_threshold, .. } = &command {
        if let Some(i) = interval {
            cfg.scan_interval_secs = *i;
        }
        if let Some(s) = score_threshold {
            cfg.score_threshold = *s;
        }
    }
    if let Err(e) = cfg.validate() {
        error!(%e, "invalid configuration");
        std::process::exit(2);
    }

    #[cfg(feature = "with-metrics")]
    if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
        error!(%e, "failed to install prometheus exporter");
    }

    match command {
        Commands::Run { once: true, .. } => {
            info!("Running a single scan cycle...");
            match pump_scanner::run_once(cfg).await {
                Ok(report) => info!(%report, "cycle complete"),
                Err(e) => error!(error = %format!("{e:#}"), "cycle failed"),
            }
        }
        Commands::Run { .. } => {
            info!(interval_secs = cfg.scan_interval_secs, "Starting scanner...");
            let (tx, rx) = tokio::sync::oneshot::channel::<()>();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = tx.send(());
                }
            });
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(e) = pump_scanner::run(cfg, shutdown).await {
                error!(error = %format!("{e:#}"), "Scanner failed");
            }
        }
        Commands::Simulate { cycles, instruments, seed } => {
            info!(cycles, instruments, seed, "Running simulator...");
            let synth = SyntheticConfig { instruments, seed, ..SyntheticConfig::default() };
            match pump_scanner::simulate(cfg, synth, cycles).await {
                Ok(reports) => {
                    for (i, r) in reports.iter().enumerate() {
                        println!("cycle {:>3}: {}", i + 1, r);
                    }
                }
                Err(e) => error!(error = %format!("{e:#}"), "Simulator failed"),
            }
        }
    }
}
