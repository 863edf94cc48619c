//! Proxy rotator CLI
//!
//! Loads a rotator configuration, builds the in-memory rotator, and leases
//! proxies from a namespace:
//! 1. Reads TOML config (pool, namespaces, defaults)
//! 2. Leases `--count` proxies, printing one per line
//! 3. Optionally waits out cooldowns instead of skipping (`--wait`)
//! 4. Optionally prints the status summary and Prometheus metrics

mod config;
mod metrics;

use anyhow::{Context, Result, bail};
use proxy_rotator::{Error as LeaseError, Rotator};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Parsed command-line flags
#[derive(Debug, PartialEq)]
struct Args {
    config: Option<String>,
    namespace: Option<String>,
    count: usize,
    wait: bool,
    status: bool,
    metrics: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: None,
            namespace: None,
            count: 1,
            wait: false,
            status: false,
            metrics: false,
        }
    }
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => parsed.config = Some(value_for(&mut iter, arg)?),
            "--namespace" => parsed.namespace = Some(value_for(&mut iter, arg)?),
            "--count" => {
                let raw = value_for(&mut iter, arg)?;
                parsed.count = raw
                    .parse()
                    .with_context(|| format!("--count expects a number, got {raw:?}"))?;
            }
            "--wait" => parsed.wait = true,
            "--status" => parsed.status = true,
            "--metrics" => parsed.metrics = true,
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(parsed)
}

fn value_for<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<String> {
    iter.next()
        .cloned()
        .with_context(|| format!("{flag} requires a value"))
}

/// Build a rotator from loaded configuration.
///
/// Namespaces are applied before the pool so the pool's reconciliation pass
/// seeds every namespace in one go.
fn build_rotator(config: &Config) -> Rotator {
    let rotator = Rotator::with_settings(config.rotator.settings());
    rotator.set_namespaces(config.namespaces.iter().cloned());
    rotator.set_pool(config.pool.proxies.iter().cloned());
    rotator
}

/// Lease one proxy; with `wait`, sleep through cooldowns until one frees up.
async fn lease_with_wait(
    rotator: &Rotator,
    namespace: Option<&str>,
    wait: bool,
) -> proxy_rotator::Result<String> {
    loop {
        match rotator.lease(namespace) {
            Err(LeaseError::NoAvailableResource { retry_after, .. })
                if wait && !rotator.pool().is_empty() =>
            {
                debug!(
                    retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                    "waiting for cooldown"
                );
                tokio::time::sleep(retry_after).await;
            }
            outcome => return outcome,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let prometheus = metrics::install_recorder()?;

    let cli: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&cli)?;

    let config_path = Config::resolve_path(args.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        proxies = config.pool.proxies.len(),
        namespaces = config.namespaces.len(),
        default_cooldown_ms = config.rotator.default_cooldown_ms,
        "configuration loaded"
    );
    if config.pool.proxies.is_empty() {
        warn!("no proxies configured, every lease will be refused");
    }

    let rotator = build_rotator(&config);
    let namespace = args.namespace.as_deref();

    for _ in 0..args.count {
        match lease_with_wait(&rotator, namespace, args.wait).await {
            Ok(proxy) => println!("{proxy}"),
            Err(e @ LeaseError::NoAvailableResource { .. }) => {
                warn!(error = %e, "lease refused");
            }
            Err(e @ LeaseError::UnknownNamespace(_)) => {
                return Err(e).context("check the namespace against the config");
            }
        }
    }

    if args.status {
        println!("{}", serde_json::to_string_pretty(&rotator.status())?);
    }
    if args.metrics {
        print!("{}", prometheus.render());
    }
    Ok(())
}
