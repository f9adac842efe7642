pub mod config;
pub mod logging;
pub mod model;
pub mod model_gateway;
pub mod providers;
pub mod repl;
pub mod timestamp;
pub mod usage;
pub mod usage_log;

use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use std::env;
use std::time::Duration;
use tracing::{error, info};

use config::Config;
use model_gateway::HttpModelGateway;
use repl::{ChatSession, run_repl};

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = logging::init();

    let cfg = Config::load().inspect_err(|err| error!(error = %err, "configuration error"))?;
    info!(
        model = %cfg.model,
        api_url = %cfg.api_url,
        timezone = %cfg.timezone_alias,
        utc_offset_hours = cfg.timezone.offset_hours(),
        usage_log = %cfg.usage_log_path.display(),
        polling_rate_ms = cfg.polling_rate_ms,
        "loaded runtime configuration"
    );

    let client = Client::builder()
        .timeout(Duration::from_secs(cfg.request_timeout_secs))
        .build()
        .context("Failed to initialize HTTP client")?;
    let gateway = HttpModelGateway::new(&client, &cfg);

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        return run_repl(gateway, &cfg).await;
    }

    let session = ChatSession::new(gateway, &cfg);
    let turn = session.run_turn(&args.join(" ")).await?;
    let answer = turn
        .reply
        .map_err(|err| anyhow!("Failed to extract assistant reply: {err:#}"))?;
    println!("{}", answer.trim());
    turn.usage?;
    Ok(())
}
