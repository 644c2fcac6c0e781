//! ReelNexus Player - headless console client.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelnexus_engine::{GameAuthority, SlotEngine};
use reelnexus_player::config::AppConfig;
use reelnexus_player::console::{self, Command};
use reelnexus_player::AppContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local first, then .env; neither overrides variables already set.
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reelnexus_player=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = AppConfig::load()?;
    tracing::info!(transport = %config.transport.mode, "Starting ReelNexus player");

    let authority: Arc<dyn GameAuthority> = match config.local.seed {
        Some(seed) => Arc::new(SlotEngine::seeded(config.local.starting_balance, seed)),
        None => Arc::new(SlotEngine::new(config.local.starting_balance)),
    };
    let app = AppContext::build(config, Some(authority));

    app.ui_bus()
        .subscribe(|event| println!("  {}", console::describe(&event)));

    if let Err(e) = app.start().await {
        // The transport stays installed, so `retry` or `mode` can recover.
        tracing::error!(error = %e, "Startup failed");
    }
    println!("{}", console::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(command) => {
                if let ControlFlow::Break(()) = console::execute(&app, command).await {
                    break;
                }
            }
            Err(e) => println!("! {e}"),
        }
    }

    app.shutdown().await;
    Ok(())
}
