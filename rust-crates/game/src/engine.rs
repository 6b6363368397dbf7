//! The foreground session: owns the state machine and the in-memory player
//! record, routes input to the machine and background events back into it.
//!
//! Nothing here awaits network I/O except [`Session::open`]; submitted
//! operations and refreshes run on the [`Orchestrator`]'s tasks.
use crate::{
    catalog::GameCatalog,
    error::{
        SessionError,
        SyncError,
    },
    ledger::{
        Ledger,
        Signer,
    },
    market::MarketBook,
    orchestrator::{
        BackgroundEvent,
        Completion,
        OperationOutcome,
        Orchestrator,
        PollSettings,
    },
    record::{
        Location,
        PlayerRecord,
    },
    roster::{
        Loaded,
        Roster,
    },
    session::{
        Effect,
        GameView,
        InputEvent,
        SessionMachine,
        SessionState,
    },
    store::PlayerStore,
    sync::{
        Refresh,
        RemoteSync,
        SyncStatus,
    },
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{
    debug,
    info,
    warn,
};

/// Everything the presentation layer needs for one frame.
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub player: PlayerRecord,
    pub market: MarketBook,
    pub catalog: Arc<GameCatalog>,
    pub sync_status: SyncStatus,
    pub in_flight: usize,
    /// Something changed since the previous snapshot.
    pub dirty: bool,
}

pub struct Session<S, L> {
    machine: SessionMachine,
    record: PlayerRecord,
    market: MarketBook,
    catalog: Arc<GameCatalog>,
    store: Arc<S>,
    orchestrator: Orchestrator<S, L>,
    sync_status: SyncStatus,
    dirty: bool,
}

impl<S: PlayerStore, L: Ledger> Session<S, L> {
    /// Loads (or creates) the player's record, syncs it with the ledger and
    /// fetches the offer book. Ledger failures leave the session usable on
    /// cached values; storage failures are fatal.
    pub async fn open(
        name: &str,
        store: Arc<S>,
        ledger: Arc<L>,
        catalog: Arc<GameCatalog>,
        settings: PollSettings,
    ) -> Result<(Self, mpsc::UnboundedReceiver<BackgroundEvent>), SessionError> {
        let sync = RemoteSync::new(store.clone(), ledger.clone());
        let Loaded {
            mut record,
            mut status,
            created,
        } = Roster::new(store.clone(), sync.clone()).get(name).await?;
        if !created {
            match sync.sync(&record).await {
                Ok(synced) => {
                    record = synced;
                    status = SyncStatus::Synced;
                }
                Err(SyncError::Storage(err)) => return Err(err.into()),
                Err(SyncError::Ledger(err)) => {
                    warn!(player = name, error = %err, "using cached record");
                    status = SyncStatus::Stale(err.to_string());
                }
            }
        }
        let market = match sync.market().await {
            Ok(market) => market,
            Err(err) => {
                warn!(error = %err, "offer listing failed");
                MarketBook::default()
            }
        };
        let (orchestrator, events) = Orchestrator::new(ledger, sync, settings);
        info!(
            player = name,
            location = %record.location(),
            gold = record.gold(),
            pylon = record.pylon(),
            offers = market.len(),
            "session opened"
        );
        let session = Self {
            machine: SessionMachine::new(record.location()),
            record,
            market,
            catalog,
            store,
            orchestrator,
            sync_status: status,
            dirty: true,
        };
        Ok((session, events))
    }

    pub fn view(&self) -> GameView<'_> {
        GameView {
            player: &self.record,
            catalog: self.catalog.as_ref(),
            market: &self.market,
        }
    }

    pub fn state(&self) -> &SessionState {
        self.machine.state()
    }

    pub fn player(&self) -> &PlayerRecord {
        &self.record
    }

    pub fn market(&self) -> &MarketBook {
        &self.market
    }

    pub fn sync_status(&self) -> &SyncStatus {
        &self.sync_status
    }

    pub fn handle_input(&mut self, event: &InputEvent) -> Result<(), SessionError> {
        let view = GameView {
            player: &self.record,
            catalog: self.catalog.as_ref(),
            market: &self.market,
        };
        match self.machine.handle_input(event, &view) {
            Effect::Ignored => {}
            Effect::Render => self.dirty = true,
            Effect::Relocate(location) => {
                self.relocate(location)?;
                self.dirty = true;
            }
            Effect::Submit { seq, descriptor } => {
                match self.record.credential() {
                    Some(credential) => {
                        let signer = Signer {
                            player: self.record.name().to_string(),
                            credential: credential.clone(),
                        };
                        debug!(seq, ?descriptor, "submitting operation");
                        self.orchestrator
                            .submit(seq, signer, descriptor, self.record.clone());
                    }
                    None => {
                        self.orchestrator
                            .fail(seq, "no ledger credential yet, refresh and retry");
                    }
                }
                self.dirty = true;
            }
        }
        Ok(())
    }

    fn relocate(&mut self, location: Location) -> Result<(), SessionError> {
        self.record.set_location(location);
        let updated = self
            .store
            .update(self.record.name(), &mut |stored| stored.set_location(location))?;
        if updated.is_none() {
            self.store.put(&self.record)?;
        }
        debug!(player = self.record.name(), %location, "moved");
        Ok(())
    }

    /// Applies an event from the orchestrator. Only a storage failure
    /// escapes; every other failure ends up on screen.
    pub fn handle_background(&mut self, event: BackgroundEvent) -> Result<(), SessionError> {
        match event {
            BackgroundEvent::Submitted { seq, operation_id } => {
                if self.machine.note_submitted(seq, &operation_id) {
                    self.dirty = true;
                }
            }
            BackgroundEvent::Finished(Completion { seq, outcome }) => {
                let current = self.machine.awaits(seq);
                let outcome = match outcome {
                    OperationOutcome::Succeeded { report, refresh } => {
                        self.absorb(current, refresh)?;
                        Ok(report)
                    }
                    OperationOutcome::Failed { reason, .. } => Err(reason),
                };
                if self.machine.complete(seq, outcome) {
                    self.dirty = true;
                } else {
                    debug!(seq, current = self.machine.seq(), "discarded stale completion");
                }
            }
            BackgroundEvent::Refreshed { seq, result } => {
                let current = seq == self.machine.seq();
                if !current {
                    debug!(seq, current = self.machine.seq(), "discarded stale refresh");
                }
                self.absorb(current, result)?;
            }
        }
        Ok(())
    }

    fn absorb(
        &mut self,
        current: bool,
        result: Result<Refresh, SyncError>,
    ) -> Result<(), SessionError> {
        match result {
            Err(SyncError::Storage(err)) => Err(err.into()),
            _ if !current => Ok(()),
            Ok(refresh) => {
                self.apply_refresh(refresh);
                Ok(())
            }
            Err(SyncError::Ledger(err)) => {
                warn!(error = %err, "refresh failed");
                self.sync_status = SyncStatus::Stale(err.to_string());
                self.dirty = true;
                Ok(())
            }
        }
    }

    fn apply_refresh(&mut self, refresh: Refresh) {
        let Refresh { mut record, market } = refresh;
        record.set_location(self.record.location());
        self.record = record;
        if let Some(market) = market {
            self.market = market;
        }
        self.sync_status = SyncStatus::Synced;
        self.dirty = true;
    }

    /// Starts a background sync of the record and offer book.
    pub fn request_refresh(&mut self) {
        self.orchestrator
            .refresh(self.machine.seq(), self.record.clone());
    }

    pub fn snapshot(&mut self) -> SessionSnapshot {
        let dirty = std::mem::take(&mut self.dirty);
        SessionSnapshot {
            state: self.machine.state().clone(),
            player: self.record.clone(),
            market: self.market.clone(),
            catalog: self.catalog.clone(),
            sync_status: self.sync_status.clone(),
            in_flight: self.orchestrator.in_flight(),
            dirty,
        }
    }

    pub fn shutdown(&mut self) {
        self.orchestrator.shutdown();
        info!(player = self.record.name(), "session closed");
    }
}
