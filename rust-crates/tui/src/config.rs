use crate::Args;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use loud_game::{
    catalog::GameCatalog,
    orchestrator::PollSettings,
};
use std::{
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};
use url::Url;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerTarget {
    Remote(Url),
    Simulated,
}

impl fmt::Display for LedgerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerTarget::Remote(url) => write!(f, "{url}"),
            LedgerTarget::Simulated => f.write_str("offline"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub player: String,
    pub ledger: LedgerTarget,
    pub db_path: PathBuf,
    pub log_dir: PathBuf,
    pub catalog: GameCatalog,
    pub poll: PollSettings,
    pub refresh_every: Duration,
}

impl AppConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        let player = args.player.trim();
        if player.is_empty() {
            return Err(eyre!("--player must not be empty"));
        }
        let ledger = match (&args.ledger_url, args.offline) {
            (Some(_), true) => {
                return Err(eyre!("--offline and --ledger-url are mutually exclusive"));
            }
            (Some(url), false) => LedgerTarget::Remote(url.clone()),
            (None, _) => LedgerTarget::Simulated,
        };
        if args.poll_attempts == 0 {
            return Err(eyre!("--poll-attempts must be at least 1"));
        }
        if args.refresh_secs == 0 {
            return Err(eyre!("--refresh-secs must be at least 1"));
        }
        let catalog = match &args.catalog {
            Some(raw) => load_catalog(&expand_path(raw)?)?,
            None => GameCatalog::default(),
        };
        Ok(Self {
            player: player.to_string(),
            ledger,
            db_path: expand_path(&args.db)?,
            log_dir: expand_path(&args.log_dir)?,
            catalog,
            poll: PollSettings {
                settle_delay: Duration::from_millis(args.settle_ms),
                poll_interval: Duration::from_millis(args.poll_interval_ms),
                max_attempts: args.poll_attempts,
            },
            refresh_every: Duration::from_secs(args.refresh_secs),
        })
    }
}

fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded =
        shellexpand::full(raw).wrap_err_with(|| format!("failed to expand path {raw}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

fn load_catalog(path: &Path) -> Result<GameCatalog> {
    let json = fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read catalog {}", path.display()))?;
    GameCatalog::from_json(&json)
        .wrap_err_with(|| format!("invalid catalog {}", path.display()))
}
