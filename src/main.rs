//! Mizuchi Backup - incremental directory backup to S3
//!
//! Uploads every file under a directory whose content changed since the last
//! run, compressing where it helps.

use anyhow::{bail, Context};
use clap::Parser;
use mizuchi_backup::backup::progress::readable_bytes;
use mizuchi_backup::s3::{Credentials, CredentialsProvider, S3Store};
use mizuchi_backup::{config::Config, logging, metrics, prompt, Backup, RunSummary};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Mizuchi Backup - incremental, checksum-based backup to S3
#[derive(Parser, Debug)]
#[command(name = "mizuchi-backup")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory to back up
    path: PathBuf,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Destination bucket
    #[arg(long)]
    bucket: Option<String>,

    /// Bucket region
    #[arg(long)]
    region: Option<String>,

    /// Custom endpoint for S3-compatible stores (enables path-style addressing)
    #[arg(long)]
    endpoint: Option<String>,

    /// Access key ID
    #[arg(long)]
    access_key: Option<String>,

    /// Secret access key
    #[arg(long)]
    secret_key: Option<String>,

    /// Key prefix for every object (e.g. the root as given to older backup scripts)
    #[arg(long)]
    prefix: Option<String>,

    /// Number of concurrent workers
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// Write Prometheus metrics to this file when the run ends
    #[arg(long)]
    metrics_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Never prompt for missing bucket or credentials
    #[arg(long)]
    no_prompt: bool,
}

impl Args {
    /// Flags override values from the config file
    fn apply(&self, config: &mut Config) {
        if let Some(ref bucket) = self.bucket {
            config.s3.bucket = Some(bucket.clone());
        }
        if let Some(ref region) = self.region {
            config.s3.region = region.clone();
        }
        if let Some(ref endpoint) = self.endpoint {
            config.s3.endpoint = Some(endpoint.clone());
        }
        if let Some(ref access_key) = self.access_key {
            config.s3.access_key = Some(access_key.clone());
        }
        if let Some(ref secret_key) = self.secret_key {
            config.s3.secret_key = Some(secret_key.clone());
        }
        if let Some(ref prefix) = self.prefix {
            config.backup.key_prefix = prefix.clone();
        }
        if let Some(workers) = self.workers {
            config.backup.workers = workers;
        }
        if let Some(ref path) = self.metrics_file {
            config.metrics.textfile = Some(path.clone());
        }
    }

    fn can_prompt(&self) -> bool {
        !self.no_prompt && prompt::is_interactive()
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = logging::init_logging(&args.log_level, args.json_logs) {
        eprintln!("Error: {}", e);
        return ExitCode::from(2);
    }

    match run(args).await {
        Ok(summary) if summary.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            error!(error = %format!("{:#}", e), "Backup aborted");
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<RunSummary> {
    info!("Starting Mizuchi Backup v{}", mizuchi_backup::VERSION);

    let mut config = match args.config {
        Some(ref path) => {
            let config = Config::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    let bucket = resolve_bucket(&args, &config)?;
    let credentials = resolve_credentials(&args, &config)?;

    let store = S3Store::connect(&config.s3, &bucket, credentials).await?;
    info!(bucket = %bucket, region = %store.region(), "Connected to object store");

    let result = Backup::new(&args.path, Arc::new(store), &config).run().await;

    if let Some(ref path) = config.metrics.textfile {
        if let Err(e) = metrics::write_textfile(path) {
            warn!(path = %path.display(), error = %e, "Failed to write metrics file");
        }
    }

    let summary = result?;
    print_summary(&summary);
    Ok(summary)
}

fn resolve_bucket(args: &Args, config: &Config) -> anyhow::Result<String> {
    if let Some(ref bucket) = config.s3.bucket {
        return Ok(bucket.clone());
    }
    if !args.can_prompt() {
        bail!("No bucket given: pass --bucket or set s3.bucket in the config file");
    }

    let bucket = prompt::prompt("Bucket: ")?;
    if bucket.trim().is_empty() {
        bail!("Bucket name cannot be empty");
    }
    Ok(bucket.trim().to_string())
}

fn resolve_credentials(args: &Args, config: &Config) -> anyhow::Result<Credentials> {
    let err = match CredentialsProvider::resolve(
        config.s3.access_key.as_deref(),
        config.s3.secret_key.as_deref(),
    ) {
        Ok(credentials) => return Ok(credentials),
        Err(e) => e,
    };

    if !args.can_prompt() {
        return Err(err.into());
    }

    let access_key = match config.s3.access_key {
        Some(ref key) => key.clone(),
        None => prompt::prompt("Access key: ")?,
    };
    let secret_key = prompt::prompt_hidden("Secret key: ")?;

    Ok(CredentialsProvider::resolve(Some(&access_key), Some(&secret_key))?)
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} files: {} uploaded, {} unchanged, {} failed; {} scanned, {} sent in {:.1}s",
        summary.total_files,
        summary.files_uploaded,
        summary.files_skipped,
        summary.files_failed,
        readable_bytes(summary.bytes_done),
        readable_bytes(summary.bytes_transferred),
        summary.elapsed.as_secs_f64()
    );
    for failure in &summary.failures {
        println!("  failed: {} ({})", failure.path.display(), failure.error);
    }
}
