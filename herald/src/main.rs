use std::io::Read;
use std::sync::Arc;

use anyhow::Context;
use herald::archive::{Archiver, JsonFileArchiver};
use herald::config::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH, HeraldConfig};
use herald::logging::{init_logging, prune_logs};
use herald::{HeraldContext, Notification, NotificationRequest};
use tracing::{info, warn};

/// Directory for notification summaries; archiving is off when unset.
const ARCHIVE_DIR_ENV: &str = "HERALD_ARCHIVE_DIR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config_path =
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = HeraldConfig::load(&config_path)
        .await
        .with_context(|| format!("Failed to load configuration from {config_path}"))?;

    let _logging = init_logging(&config.logging)?;
    prune_logs(&config.logging).await;

    let ctx = Arc::new(HeraldContext::from_config(&config));
    for issue in ctx.issues() {
        warn!("Configuration issue: {}", issue);
    }

    let raw = match std::env::args().nth(1) {
        Some(arg) => arg,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read notification request from stdin")?;
            buffer
        }
    };
    let request: NotificationRequest =
        serde_json::from_str(&raw).context("Invalid notification request")?;

    let mut notification = Notification::new(ctx, request)?;
    let delivered = notification.deliver().await;
    let summary = notification.summary();

    if let Ok(dir) = std::env::var(ARCHIVE_DIR_ENV) {
        if let Err(e) = JsonFileArchiver::new(dir).archive(&summary).await {
            warn!("Failed to archive notification {}: {}", summary.id, e);
        }
    }

    info!(notification_id = %summary.id, delivered, "Done");
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
