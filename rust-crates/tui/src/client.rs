use crate::{
    config::{
        AppConfig,
        LedgerTarget,
    },
    rest_ledger::RestLedger,
    ui::{
        self,
        UiCommand,
    },
};
use color_eyre::eyre::{
    Report,
    Result,
    WrapErr,
};
use loud_game::{
    LedgerError,
    SessionError,
    catalog::OperationDescriptor,
    engine::Session,
    ledger::{
        InMemoryLedger,
        Ledger,
        OperationId,
        PollStatus,
        Signer,
    },
    market::Offer,
    orchestrator::BackgroundEvent,
    record::{
        AccountState,
        Credential,
    },
    store::{
        PlayerStore,
        SledPlayerStore,
    },
};
use std::{
    path::Path,
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    time::{
        self,
        MissedTickBehavior,
    },
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

type GameSession = Session<SledPlayerStore, AnyLedger>;

/// The ledger picked on the command line.
pub enum AnyLedger {
    Remote(RestLedger),
    Simulated(InMemoryLedger),
}

impl Ledger for AnyLedger {
    async fn submit_operation(
        &self,
        signer: &Signer,
        descriptor: &OperationDescriptor,
    ) -> Result<OperationId, LedgerError> {
        match self {
            AnyLedger::Remote(ledger) => ledger.submit_operation(signer, descriptor).await,
            AnyLedger::Simulated(ledger) => ledger.submit_operation(signer, descriptor).await,
        }
    }

    async fn poll_operation(&self, id: &OperationId) -> Result<PollStatus, LedgerError> {
        match self {
            AnyLedger::Remote(ledger) => ledger.poll_operation(id).await,
            AnyLedger::Simulated(ledger) => ledger.poll_operation(id).await,
        }
    }

    async fn query_account(&self, player: &str) -> Result<AccountState, LedgerError> {
        match self {
            AnyLedger::Remote(ledger) => ledger.query_account(player).await,
            AnyLedger::Simulated(ledger) => ledger.query_account(player).await,
        }
    }

    async fn provision_credential(&self, player: &str) -> Result<Credential, LedgerError> {
        match self {
            AnyLedger::Remote(ledger) => ledger.provision_credential(player).await,
            AnyLedger::Simulated(ledger) => ledger.provision_credential(player).await,
        }
    }

    async fn list_offers(&self) -> Result<Vec<Offer>, LedgerError> {
        match self {
            AnyLedger::Remote(ledger) => ledger.list_offers().await,
            AnyLedger::Simulated(ledger) => ledger.list_offers().await,
        }
    }
}

/// Routes logs to a daily rolling file; the terminal belongs to the UI.
pub fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .wrap_err_with(|| format!("failed to create log dir {}", log_dir.display()))?;
    let appender = tracing_appender::rolling::daily(log_dir, "loud.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|err| Report::msg(err.to_string()))
        .wrap_err("failed to install tracing subscriber")?;
    Ok(guard)
}

fn build_ledger(config: &AppConfig, store: &SledPlayerStore) -> Result<AnyLedger> {
    let ledger = match &config.ledger {
        LedgerTarget::Remote(url) => {
            AnyLedger::Remote(RestLedger::new(url.clone()).wrap_err("ledger client setup failed")?)
        }
        LedgerTarget::Simulated => {
            let ledger = InMemoryLedger::new(Arc::new(config.catalog.clone()));
            // the simulated chain starts empty every run; seed it from the cache
            if let Some(record) = store.load(&config.player)? {
                ledger.restore(&record);
            }
            AnyLedger::Simulated(ledger)
        }
    };
    Ok(ledger)
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let store = Arc::new(SledPlayerStore::open(&config.db_path).wrap_err_with(|| {
        format!("failed to open player store {}", config.db_path.display())
    })?);
    let ledger = Arc::new(build_ledger(&config, &store)?);
    let (session, events) = Session::open(
        &config.player,
        store.clone(),
        ledger,
        Arc::new(config.catalog.clone()),
        config.poll,
    )
    .await
    .wrap_err("failed to open session")?;

    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();
    tracing::info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(
        session,
        events,
        config.refresh_every,
        &mut ui_state,
        &mut input_events,
    )
    .await;
    ui::terminal_exit()?;
    store.close().wrap_err("failed to close player store")?;
    res
}

fn fatal(err: SessionError) -> Report {
    tracing::error!(error = %err, "session cannot continue");
    Report::new(err).wrap_err("player store failed")
}

async fn run_loop(
    mut session: GameSession,
    mut events: mpsc::UnboundedReceiver<BackgroundEvent>,
    refresh_every: Duration,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    tracing::info!("Running app loop");
    let mut refresh = time::interval(refresh_every);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
    refresh.tick().await;
    let mut force_draw = true;

    let res = loop {
        let snapshot = session.snapshot();
        if snapshot.dirty || force_draw {
            if let Err(err) = ui::draw(ui_state, &snapshot) {
                break Err(err.wrap_err("draw failed"));
            }
            force_draw = false;
        }

        tokio::select! {
            maybe_event = events.recv() => {
                let Some(event) = maybe_event else {
                    tracing::warn!("background channel closed");
                    break Ok(());
                };
                if let Err(err) = session.handle_background(event) {
                    break Err(fatal(err));
                }
            }
            _ = refresh.tick() => {
                session.request_refresh();
            }
            _ = tokio::signal::ctrl_c() => {
                break Ok(());
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = match raw_ev {
                    Ok(event) => event,
                    Err(err) => break Err(err),
                };
                let Some(command) = ui::interpret_event(session.state(), event) else {
                    continue;
                };
                match command {
                    UiCommand::Quit => break Ok(()),
                    UiCommand::Refresh => session.request_refresh(),
                    UiCommand::Redraw => force_draw = true,
                    UiCommand::Input(input) => {
                        if let Err(err) = session.handle_input(&input) {
                            break Err(fatal(err));
                        }
                    }
                }
            }
        }
    };
    session.shutdown();
    res
}
