//! feed-relay batch entrypoint.
//! Runs one ingest → select → schedule → publish cycle and exits.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feed_relay::clock::SystemClock;
use feed_relay::extract::ExtractorRegistry;
use feed_relay::ingest::http::ReqwestFetcher;
use feed_relay::ingest::rss::SyndicationParser;
use feed_relay::metrics::TextfileExporter;
use feed_relay::notify::TelegramDeliverer;
use feed_relay::relevance::RelevanceClassifier;
use feed_relay::{Relay, RelayConfig, StateStores};

/// `RUST_LOG` filter (default `info`); `RELAY_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let json = std::env::var("RELAY_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    // Misconfiguration is fatal and happens before any network activity.
    let cfg = RelayConfig::load().context("loading relay configuration")?;
    let classifier = RelevanceClassifier::load(cfg.lexicon_path.as_deref())
        .context("loading relevance lexicon")?;

    let exporter = match &cfg.metrics_textfile {
        Some(p) => Some(TextfileExporter::install(p.clone())?),
        None => None,
    };

    let fetcher = ReqwestFetcher::new()?;
    let parser = SyndicationParser;
    let extractor = ExtractorRegistry::with_defaults();
    let deliverer = TelegramDeliverer::new(cfg.bot_token.clone());
    let clock = SystemClock;

    let mut stores = StateStores::open(
        &cfg.state_dir,
        cfg.fingerprint_retention,
        cfg.rotation_capacity,
    );
    info!(
        state_dir = %cfg.state_dir.display(),
        known_fingerprints = stores.fingerprints.len(),
        sources = cfg.primary_sources.len(),
        "relay starting"
    );

    let relay = Relay {
        config: &cfg,
        classifier: &classifier,
        fetcher: &fetcher,
        parser: &parser,
        extractor: &extractor,
        deliverer: &deliverer,
        clock: &clock,
    };
    let mut rng = StdRng::from_os_rng();
    let summary = relay.run_cycle(&mut stores, &mut rng).await;

    if let Some(x) = exporter {
        if let Err(e) = x.flush() {
            warn!(error = %e, path = %x.path().display(), "metrics textfile not written");
        }
    }

    info!(
        delivered = summary.delivered(),
        failed = summary.failed(),
        "relay finished"
    );
    Ok(())
}
