use anyhow::{Context, Result};
use clap::Parser;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cache;
mod config;
mod error;
mod proxy;

use cache::{Cache, MemoryCache, RedisCache};
use config::{Config, LogFormat, LoggingConfig, Overrides};
use proxy::CachingProxy;

#[derive(Parser, Debug)]
#[command(name = "caching-proxy")]
#[command(about = "A caching HTTP reverse proxy")]
struct Args {
    /// Optional YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Origin to proxy to
    #[arg(short, long)]
    origin: Option<String>,

    /// URL to connect to Redis (optional)
    #[arg(long)]
    redis_url: Option<String>,

    /// Wipe the cache store before serving
    #[arg(long)]
    clear_cache: bool,

    /// Check the configuration and exit
    #[arg(long)]
    validate_config: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            host: self.host.clone(),
            port: self.port,
            origin: self.origin.clone(),
            redis_url: self.redis_url.clone(),
            clear_cache: self.clear_cache,
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.clone().into());

    match logging.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

async fn build_cache(config: &Config) -> Result<Arc<dyn Cache>> {
    let cache: Arc<dyn Cache> = match &config.cache.redis_url {
        Some(url) => Arc::new(
            RedisCache::connect(url)
                .await
                .context("Failed to initialize redis cache")?,
        ),
        None => {
            info!("Using in-memory cache store");
            Arc::new(MemoryCache::new())
        }
    };

    if config.cache.clear_on_startup {
        cache
            .clear_all()
            .await
            .context("Failed to clear cache on startup")?;
        info!("Cache cleared on startup");
    }

    Ok(cache)
}

/// Serve until `shutdown` resolves. A bind or serve failure is returned as an error.
async fn serve_until_shutdown<F>(
    proxy: Arc<CachingProxy>,
    host: &str,
    port: u16,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::select! {
        _ = shutdown => {
            info!("Received shutdown signal");
            Ok(())
        }
        result = proxy.serve(host, port) => {
            result.with_context(|| format!("Caching proxy server on {}:{} failed", host, port))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path).await?,
        None => Config::default(),
    };
    config.apply_overrides(args.overrides());

    init_tracing(&config.logging);

    config.validate()?;
    let origin = config.origin_url()?;

    if args.validate_config {
        info!("Configuration is valid");
        return Ok(());
    }

    info!("Starting caching proxy");

    let cache = build_cache(&config).await?;
    let proxy = Arc::new(CachingProxy::new(
        origin,
        cache,
        config.cache.key_strategy.build(),
    )?);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    serve_until_shutdown(proxy, &config.server.host, config.server.port, shutdown).await?;

    info!("Caching proxy shutdown complete");
    Ok(())
}
