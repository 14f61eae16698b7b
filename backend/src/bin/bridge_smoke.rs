//! Headless smoke test for the GramJS bridge
//!
//! Connects with the credentials from TG_API_ID / TG_API_HASH / TG_SESSION,
//! lists dialogs and optionally listens for a few seconds.
//! Usage: bridge_smoke [listen-seconds]

use anyhow::Context;
use std::sync::Arc;
use telegram_session_backend::bridge::{BridgeProbe, BridgeSession};
use telegram_session_backend::config::Config;
use telegram_session_backend::library::LibraryGate;
use telegram_session_backend::session::{Describe, Orchestrator, SessionUpdate, Status};
use tokio::time::{timeout, Duration};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let listen_secs: u64 = std::env::args()
        .nth(1)
        .map(|arg| arg.parse::<u64>())
        .transpose()
        .context("listen-seconds must be a number")?
        .unwrap_or(0);

    let config = Config::from_env();
    println!("Starting bridge: {}", config.bridge.script_path.display());

    let session = BridgeSession::spawn(&config.bridge).await?;
    let gate = LibraryGate::new(Arc::new(BridgeProbe::new(session.clone())), config.readiness);
    let (orchestrator, mut updates) = Orchestrator::bootstrap(&gate, config.client).await?;
    println!("Library ready");

    let result = orchestrator
        .connect(
            config.prefill.app_id.unwrap_or(0),
            &config.prefill.app_secret,
            &config.prefill.session_token,
        )
        .await;
    println!("1. {}", Status::of(&result).message);
    result?;

    let listing = orchestrator.list_conversations().await;
    println!("2. {}", Status::of(&listing).message);
    for summary in listing.map(|l| l.summaries).unwrap_or_default() {
        println!("   [{}] {} ({})", summary.kind.as_str(), summary.title, summary.info_line());
    }

    if listen_secs > 0 {
        let started = orchestrator.start_listening().await;
        println!("3. {}", Status::of(&started).message);

        let deadline = Duration::from_secs(listen_secs);
        let _ = timeout(deadline, async {
            while let Some(update) = updates.recv().await {
                if let SessionUpdate::MessageReceived { message, .. } = &update {
                    println!("   {}: {}", message.heading(), message.text);
                }
                println!("   {}", update.describe().message);
            }
        })
        .await;
    }

    orchestrator.teardown().await;
    session.kill().await?;
    println!("✓ Bridge smoke test completed!");
    Ok(())
}
