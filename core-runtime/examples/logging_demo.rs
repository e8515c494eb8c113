//! Logging system demonstration
//!
//! Shows the log output of a typical game session in each format, mirrored
//! into a [`ConsoleLogger`] sink the way the host mirrors it into the plugin
//! log file.
//!
//! Run with:
//! ```bash
//! # Pretty format (default in debug)
//! cargo run --example logging_demo
//!
//! # JSON format
//! cargo run --example logging_demo -- json
//!
//! # Compact format with a custom filter
//! cargo run --example logging_demo -- compact "logging_demo=trace"
//! ```

use bridge_traits::{ConsoleLogger, LogLevel};
use core_runtime::logging::{init_logging, strip_path, LogFormat, LoggingConfig};
use std::env;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[tokio::main]
async fn main() -> core_runtime::Result<()> {
    let args: Vec<String> = env::args().collect();

    let format = match args.get(1).map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        Some(_) => LogFormat::Pretty,
        None => LogFormat::default(),
    };

    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Trace)
        .with_logger_sink(Arc::new(ConsoleLogger::default()))
        .with_spans(true)
        .with_target(true);
    if let Some(filter) = args.get(2) {
        config = config.with_filter(format!("warn,logging_demo=trace,{}", filter));
    } else {
        config = config.with_filter("warn,logging_demo=trace");
    }

    init_logging(config)?;
    info!(format = ?format, "Logging initialized");

    game_session(1245620, 4242).await;
    screenshot("/home/deck/.steam/steam/userdata/1/760/remote/1245620/screenshots/1_1.jpg");

    Ok(())
}

#[instrument]
async fn game_session(app_id: i64, pid: i32) {
    info!("Game started");
    debug!(pid, "Pausing game for download");
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    info!(target_id = app_id, operation = "download", exit_code = 0, "Sync finished");
    debug!(pid, "Resuming game");

    info!("Game stopped");
    warn!(target_id = app_id, operation = "upload", exit_code = 1, "Sync failed");
}

fn screenshot(url: &str) {
    // the full url carries the Steam user id
    info!(screenshot = %strip_path(url), "Uploading screenshot");
}
