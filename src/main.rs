use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tollgate::config::TollgateConfig;
use tollgate::ratelimit::RateLimiter;
use tollgate::store::RedisBucketStore;

/// Run rate limit checks for one identity against a configured route.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about)]
struct Args {
    /// Path to a YAML configuration file; built-in routes are used if omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Route whose limiter to use
    #[arg(short, long)]
    route: String,

    /// Caller identity, e.g. a client address
    #[arg(short, long)]
    identity: String,

    /// Number of checks to run
    #[arg(short = 'n', long, default_value_t = 1)]
    count: u32,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => TollgateConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => TollgateConfig::default(),
    };
    info!(redis_url = %config.redis.url, routes = config.routes.len(), "Configuration loaded");

    let limiter_config = config
        .route(&args.route)
        .cloned()
        .with_context(|| format!("route '{}' is not configured", args.route))?;

    let store = Arc::new(RedisBucketStore::new(config.redis.clone())?);
    let limiter = RateLimiter::new(limiter_config, store)?;

    for _ in 0..args.count {
        let decision = limiter.check(&args.identity).await;
        println!("{}", serde_json::to_string(&decision)?);

        if let Some(rejection) = decision.rejection() {
            println!("{}", serde_json::to_string(&rejection)?);
        }
    }

    Ok(())
}
