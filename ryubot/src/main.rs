//! RyuBot - Main entry point.

use anyhow::Result;
use ryubot::start_bot;
use ryubot_common::config::Config;
use ryubot_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load_with_env()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("RyuBot v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        let err = ryubot_common::Error::from(e);
        tracing::error!(error = %err, "Invalid configuration");
        std::process::exit(err.exit_code());
    }

    start_bot(&config).await
}
