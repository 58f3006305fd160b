use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use qr_relay::capture::ImageSequenceSource;
use qr_relay::config::{RelayConfig, load_accounts};
use qr_relay::decoder::{DecodeEngine, SearchSpace};
use qr_relay::dispatch::TracingObserver;
use qr_relay::tools::{
    bench_limit_from_env, dataset_images, dataset_root_from_env, load_pixel_buffer,
    measure_reading_rate, smoke_from_env,
};
use qr_relay::{Relay, ResultSet, ScanOutcome};

#[derive(Parser)]
#[command(
    name = "qrrelay",
    version,
    about = "Scan a QR code and relay it for every registered account"
)]
struct Cli {
    /// Configuration file (TOML); `QR_RELAY_*` variables override it
    #[arg(long, global = true, env = "QR_RELAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full decode search on one image
    Decode {
        #[arg(long)]
        image: PathBuf,
    },
    /// Run the single live-tier attempt on one image
    Live {
        #[arg(long)]
        image: PathBuf,
    },
    /// Decode rate over a labelled dataset
    ReadingRate {
        #[arg(long)]
        root: Option<PathBuf>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        smoke: bool,
    },
    /// Log every account in ahead of a scan
    Prewarm {
        #[arg(long)]
        accounts: PathBuf,
        /// Drop cached tokens first
        #[arg(long)]
        refresh: bool,
    },
    /// Replay frames through the escalation pipeline and dispatch the result
    Scan {
        /// Frames to replay, in order (looped)
        #[arg(long, num_args = 1.., required = true)]
        frames: Vec<PathBuf>,
        #[arg(long)]
        accounts: PathBuf,
        /// Stop after this many seconds without a decode
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("qr_relay=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = RelayConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Decode { image } => decode_cmd(&config, &image),
        Command::Live { image } => live_cmd(&image),
        Command::ReadingRate { root, limit, smoke } => {
            reading_rate_cmd(&config, root, limit, smoke)
        }
        Command::Prewarm { accounts, refresh } => prewarm_cmd(&config, &accounts, refresh).await,
        Command::Scan {
            frames,
            accounts,
            timeout_secs,
        } => scan_cmd(&config, &frames, &accounts, timeout_secs).await,
    }
}

fn engine(config: &RelayConfig) -> DecodeEngine {
    let space = SearchSpace::full().with_max_candidate_pixels(config.scan.max_candidate_pixels);
    DecodeEngine::new().with_space(space)
}

fn decode_cmd(config: &RelayConfig, image: &Path) -> Result<()> {
    let buffer = load_pixel_buffer(image).with_context(|| format!("loading {}", image.display()))?;
    println!("Image: {} ({}x{})", image.display(), buffer.width(), buffer.height());
    match engine(config).search(&buffer) {
        Ok(outcome) => {
            println!("Payload: {}", outcome.payload);
            println!("Found at {} after {} attempts", outcome.descriptor, outcome.attempts);
            Ok(())
        }
        Err(err) => bail!("no QR code decoded: {err}"),
    }
}

fn live_cmd(image: &Path) -> Result<()> {
    let buffer = load_pixel_buffer(image).with_context(|| format!("loading {}", image.display()))?;
    match DecodeEngine::new().decode_live(&buffer) {
        Some(payload) => {
            println!("Payload: {payload}");
            Ok(())
        }
        None => bail!("live attempt decoded nothing"),
    }
}

fn reading_rate_cmd(
    config: &RelayConfig,
    root: Option<PathBuf>,
    limit: Option<usize>,
    smoke: bool,
) -> Result<()> {
    let root = root.unwrap_or_else(dataset_root_from_env);
    let limit = limit.or_else(bench_limit_from_env);
    let smoke = smoke || smoke_from_env();
    if !root.exists() {
        bail!("dataset root not found: {}", root.display());
    }

    let images = dataset_images(&root, limit, smoke);
    if images.is_empty() {
        bail!("no images found under {}", root.display());
    }

    let report = measure_reading_rate(&engine(config), &images);
    println!("Reading rate over {} images", images.len());
    println!("=====================================");
    for (category, rate) in &report.categories {
        let mean_attempts = if rate.decoded == 0 {
            0.0
        } else {
            rate.attempts as f64 / rate.decoded as f64
        };
        println!(
            "  {:<16} {:>4}/{:<4} = {:>6.2}%  avg attempts {:>5.1}  {:?}",
            category,
            rate.decoded,
            rate.total,
            rate.rate(),
            mean_attempts,
            rate.elapsed
        );
    }
    if !report.unreadable.is_empty() {
        println!("  ({} images could not be loaded)", report.unreadable.len());
    }
    println!("=====================================");
    println!("Average Reading Rate: {:.2}%", report.average_rate());
    Ok(())
}

fn relay(config: &RelayConfig, accounts: &Path) -> Result<Relay> {
    let accounts = load_accounts(accounts)
        .with_context(|| format!("loading accounts from {}", accounts.display()))?;
    if accounts.is_empty() {
        bail!("no [[account]] entries found");
    }
    Ok(Relay::from_config(config, accounts, Arc::new(TracingObserver))?)
}

async fn prewarm_cmd(config: &RelayConfig, accounts: &Path, refresh: bool) -> Result<()> {
    let relay = relay(config, accounts)?;
    if refresh {
        for account in relay.accounts() {
            relay.dispatcher().sessions().invalidate(&account.id);
        }
    }
    let results = relay.prewarm().await;
    for (account, result) in &results {
        match result {
            Ok(_) => println!("  {account}: ready"),
            Err(err) => println!("  {account}: {err}"),
        }
    }
    if !relay.is_ready() {
        bail!("not every account could be logged in");
    }
    Ok(())
}

async fn scan_cmd(
    config: &RelayConfig,
    frames: &[PathBuf],
    accounts: &Path,
    timeout_secs: u64,
) -> Result<()> {
    let relay = relay(config, accounts)?;
    let mut capture = ImageSequenceSource::from_paths(frames, config.scan.frame_interval())?;

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = tokio::time::sleep(std::time::Duration::from_secs(timeout_secs)) => {}
        }
        stopper.cancel();
    });

    let mut report = relay.scan(&mut capture, cancel).await?;
    let ScanOutcome::Decoded { payload, tier, .. } = &report.outcome else {
        bail!("scan cancelled before a code was decoded");
    };
    println!("Decoded {payload} via {tier} tier");

    if let Some(results) = &report.results {
        print_results(results);
    }
    let retried = relay.retry_failed(&mut report).await;
    if retried > 0 {
        println!("Retried {retried} accounts:");
        if let Some(results) = &report.results {
            print_results(results);
        }
    }
    for err in report.errors(relay.accounts()) {
        eprintln!("  {err}");
    }
    Ok(())
}

fn print_results(results: &ResultSet) {
    for result in results.entries() {
        match &result.code {
            Some(code) => println!("  {:<24} {} ({})", result.display_name, result.status, code),
            None => println!("  {:<24} {}", result.display_name, result.status),
        }
    }
}
