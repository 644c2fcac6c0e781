//! ReelNexus worker - serves the slot engine over stdin/stdout.
//!
//! Stdout carries the protocol, so logs go to stderr.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelnexus_engine::{serve, GameAuthority, SlotEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reelnexus_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let starting_balance: u64 = std::env::var("REELNEXUS_STARTING_BALANCE")
        .unwrap_or_else(|_| "1000".into())
        .parse()
        .unwrap_or(1000);
    let engine: Arc<dyn GameAuthority> = match std::env::var("REELNEXUS_SEED")
        .ok()
        .and_then(|s| s.parse().ok())
    {
        Some(seed) => Arc::new(SlotEngine::seeded(starting_balance, seed)),
        None => Arc::new(SlotEngine::new(starting_balance)),
    };

    tracing::info!(starting_balance, "Starting ReelNexus worker");
    serve(engine, tokio::io::stdin(), tokio::io::stdout()).await?;
    Ok(())
}
