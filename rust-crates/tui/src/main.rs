use clap::{
    ArgGroup,
    Parser,
};
use color_eyre::eyre::Result;
use loud_game::orchestrator::{
    DEFAULT_POLL_ATTEMPTS,
    DEFAULT_POLL_INTERVAL,
    DEFAULT_SETTLE_DELAY,
};
use url::Url;

mod client;
mod config;
mod rest_ledger;
mod ui;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Terminal RPG whose every action is a signed ledger operation",
    long_about = None,
    group(
        ArgGroup::new("ledger")
            .args(["offline", "ledger_url"])
            .required(true)
    )
)]
pub struct Args {
    /// Player name; records are keyed by it.
    #[arg(short, long, env = "LOUD_PLAYER")]
    pub player: String,

    /// Play against an in-process simulated ledger.
    #[arg(long)]
    pub offline: bool,

    /// REST gateway of the ledger node.
    #[arg(short, long, env = "LOUD_LEDGER_URL")]
    pub ledger_url: Option<Url>,

    #[arg(long, default_value = "~/.loud/players.db")]
    pub db: String,

    /// JSON file replacing the built-in recipe table.
    #[arg(long)]
    pub catalog: Option<String>,

    #[arg(long, default_value = "~/.loud/logs")]
    pub log_dir: String,

    #[arg(long, default_value_t = DEFAULT_SETTLE_DELAY.as_millis() as u64)]
    pub settle_ms: u64,

    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    pub poll_interval_ms: u64,

    #[arg(long, default_value_t = DEFAULT_POLL_ATTEMPTS)]
    pub poll_attempts: u32,

    #[arg(long, default_value_t = 30)]
    pub refresh_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let config = config::AppConfig::from_args(&args)?;
    let _log_guard = client::init_tracing(&config.log_dir)?;
    tracing::info!(player = %config.player, ledger = %config.ledger, "starting loud client");
    client::run_app(config).await
}
