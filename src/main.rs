use clap::{Parser, Subcommand};
use cryptotracker::analysis::alerts::{AlertEngine, AlertOutcome};
use cryptotracker::analysis::report::{ReportGenerator, ReportOutcome};
use cryptotracker::api::coingecko::MarketFetcher;
use cryptotracker::config::TrackerConfig;
use cryptotracker::error::TrackerError;
use cryptotracker::store::FileStore;
use cryptotracker::ui::dashboard::Dashboard;
use env_logger::{Builder, Target};
use log::{error, info, LevelFilter};
use std::error::Error;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about = "Crypto market tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the snapshot and history files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Directory holding the alert file
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Directory the report files are written to
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Absolute 24h change (percent) that raises an alert
    #[arg(long, global = true)]
    threshold: Option<f64>,

    /// Number of coins to fetch and display
    #[arg(long, global = true)]
    top_n: Option<usize>,

    /// Dashboard refresh interval in seconds
    #[arg(long, global = true)]
    poll_secs: Option<u64>,

    /// Quote currency, e.g. usd or eur
    #[arg(long, global = true)]
    vs_currency: Option<String>,

    /// Debug logging for this crate
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Fetch the top coins, replace the snapshot and append to history
    Scrape,
    /// Flag snapshot rows whose 24h move crosses the threshold
    Alerts,
    /// Write the summary, top gainers and top losers files
    Report,
    /// Live terminal dashboard over the snapshot, history and alert files
    Dashboard,
}

impl Cli {
    fn apply_overrides(&self, mut config: TrackerConfig) -> Result<TrackerConfig, TrackerError> {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(top_n) = self.top_n {
            config.top_n = top_n;
        }
        if let Some(secs) = self.poll_secs {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(currency) = &self.vs_currency {
            config.vs_currency = currency.to_lowercase();
        }
        config.validate()?;
        Ok(config)
    }
}

/// The dashboard owns the terminal, so its log lines go to a file in the log
/// directory instead of stderr.
fn log_target(command: Commands, config: &TrackerConfig) -> io::Result<Target> {
    if command != Commands::Dashboard {
        return Ok(Target::Stderr);
    }
    fs::create_dir_all(&config.log_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.dashboard_log_path())?;
    Ok(Target::Pipe(Box::new(file)))
}

fn init_logging(verbose: bool, target: Target) {
    let own = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("cryptotracker", own)
        .format(|buf, record| {
            let ts = chrono::Local::now().format("%H:%M:%S%.3f");
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                ts,
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(target)
        .init();
}

async fn scrape(config: &TrackerConfig) -> Result<(), TrackerError> {
    let fetcher = MarketFetcher::new(config)?;
    let records = fetcher.fetch_top(config.top_n, &config.vs_currency).await?;

    let store = FileStore::new(config);
    store.write_snapshot(&records)?;
    info!("Saved snapshot: {}", store.snapshot_path().display());
    store.append_history(&records)?;
    info!("Appended to history: {}", store.history_path().display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = match TrackerConfig::from_env().and_then(|c| cli.apply_overrides(c)) {
        Ok(config) => config,
        Err(e) => {
            init_logging(cli.verbose, Target::Stderr);
            error!("{}", e);
            return Err(e.into());
        }
    };
    init_logging(cli.verbose, log_target(cli.command, &config)?);
    let store = FileStore::new(&config);

    let result = match cli.command {
        Commands::Scrape => scrape(&config).await,
        Commands::Alerts => AlertEngine::new(config.threshold)
            .evaluate(&store)
            .map(|outcome| {
                if outcome == AlertOutcome::NoSnapshot {
                    info!("Nothing to evaluate yet");
                }
            }),
        Commands::Report => ReportGenerator::new(config.report_top)
            .generate(&store)
            .map(|outcome| {
                if let ReportOutcome::Written { rows } = outcome {
                    info!("Report covers {} coins", rows);
                }
            }),
        Commands::Dashboard => {
            let mut dashboard = Dashboard::new(&config);
            if let Err(e) = dashboard.run() {
                error!("Dashboard error: {}", e);
                return Err(e);
            }
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("{} failed: {}", cli.command.name(), e);
        return Err(e.into());
    }
    Ok(())
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Scrape => "scrape",
            Commands::Alerts => "alerts",
            Commands::Report => "report",
            Commands::Dashboard => "dashboard",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_root(label: &str) -> PathBuf {
        let unique_id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "cryptotracker_main_{}_{}_{}",
            std::process::id(),
            unique_id,
            label
        ))
    }

    #[test]
    fn test_cli_flag_overrides_out_of_range_env_value() {
        let env = TrackerConfig::from_lookup(|key| {
            (key == "TRACKER_TOP_N").then(|| "300".to_string())
        })
        .unwrap();

        let cli = Cli::try_parse_from(["cryptotracker", "--top-n", "50", "scrape"]).unwrap();
        let config = cli.apply_overrides(env.clone()).unwrap();
        assert_eq!(config.top_n, 50);

        let cli = Cli::try_parse_from(["cryptotracker", "scrape"]).unwrap();
        assert!(matches!(cli.apply_overrides(env), Err(TrackerError::Config(_))));
    }

    #[test]
    fn test_dashboard_logs_to_file() {
        let root = temp_root("dashboard_log");
        let config = TrackerConfig {
            log_dir: root.join("logs"),
            ..TrackerConfig::default()
        };

        assert!(matches!(
            log_target(Commands::Scrape, &config).unwrap(),
            Target::Stderr
        ));
        assert!(matches!(
            log_target(Commands::Dashboard, &config).unwrap(),
            Target::Pipe(_)
        ));
        assert!(config.dashboard_log_path().exists());

        fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_rejected_fetch_writes_nothing() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4096];
            stream.read(&mut buf).ok();
            stream
                .write_all(b"HTTP/1.1 429 Too Many Requests\r\ncontent-length: 0\r\n\r\n")
                .ok();
        });
        let root = temp_root("rejected_fetch");
        let config = TrackerConfig {
            data_dir: root.join("data"),
            api_url: format!("http://{}", addr),
            ..TrackerConfig::default()
        };

        let result = scrape(&config).await;

        assert!(matches!(result, Err(TrackerError::Network(_))));
        assert!(!config.snapshot_path().exists());
        assert!(!config.history_path().exists());
        fs::remove_dir_all(&root).ok();
    }
}
