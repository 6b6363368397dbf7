//! Reconciles cached player records with the ledger.
use crate::{
    error::{
        LedgerError,
        SyncError,
    },
    ledger::{
        Ledger,
        OperationId,
    },
    market::MarketBook,
    record::{
        Credential,
        PlayerRecord,
    },
    store::PlayerStore,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{
    debug,
    info,
    warn,
};

/// How current the session's view of the ledger is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    /// Loaded from the cache, not yet compared with the ledger.
    Cached,
    Synced,
    /// Last sync failed; values shown are the last known ones.
    Stale(String),
}

#[derive(Clone, Debug)]
pub struct Refresh {
    pub record: PlayerRecord,
    /// `None` when the offer listing could not be fetched.
    pub market: Option<MarketBook>,
}

pub struct RemoteSync<S, L> {
    store: Arc<S>,
    ledger: Arc<L>,
}

impl<S, L> Clone for RemoteSync<S, L> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ledger: self.ledger.clone(),
        }
    }
}

impl<S: PlayerStore, L: Ledger> RemoteSync<S, L> {
    pub fn new(store: Arc<S>, ledger: Arc<L>) -> Self {
        Self { store, ledger }
    }

    pub async fn sync(&self, record: &PlayerRecord) -> Result<PlayerRecord, SyncError> {
        self.sync_after(record, None).await
    }

    /// Full replace of balances, inventory and characters from the ledger,
    /// provisioning a credential first if the player has none. A freshly
    /// provisioned credential is persisted straight away; everything else is
    /// written only once the account query answered.
    pub async fn sync_after(
        &self,
        record: &PlayerRecord,
        confirmed: Option<&OperationId>,
    ) -> Result<PlayerRecord, SyncError> {
        let name = record.name();
        let credential = match record.credential() {
            Some(_) => None,
            None => Some(self.known_or_provisioned_credential(record).await?),
        };
        let account = self.ledger.query_account(name).await?;
        let synced_at = Utc::now();
        let mut apply = |stored: &mut PlayerRecord| {
            if let Some(credential) = &credential {
                stored.set_credential(credential.clone());
            }
            stored.apply_account(account.clone(), synced_at);
            if let Some(id) = confirmed {
                stored.record_operation(id.as_str());
            }
        };
        let updated = match self.store.update(name, &mut apply)? {
            Some(updated) => updated,
            None => {
                let mut fresh = record.clone();
                apply(&mut fresh);
                self.store.put(&fresh)?;
                fresh
            }
        };
        debug!(
            player = name,
            gold = updated.gold(),
            pylon = updated.pylon(),
            items = updated.items().len(),
            "synced player record"
        );
        Ok(updated)
    }

    /// A credential persisted by an earlier, partly failed sync wins over
    /// provisioning a new one.
    async fn known_or_provisioned_credential(
        &self,
        record: &PlayerRecord,
    ) -> Result<Credential, SyncError> {
        let name = record.name();
        let stored = self.store.load(name)?;
        if let Some(credential) = stored.as_ref().and_then(|stored| stored.credential()) {
            return Ok(credential.clone());
        }
        let credential = self.ledger.provision_credential(name).await?;
        info!(player = name, credential = %credential.fingerprint(), "provisioned credential");
        let mut keep = |stored: &mut PlayerRecord| {
            stored.set_credential(credential.clone());
        };
        if self.store.update(name, &mut keep)?.is_none() {
            let mut fresh = record.clone();
            keep(&mut fresh);
            self.store.put(&fresh)?;
        }
        Ok(credential)
    }

    pub async fn market(&self) -> Result<MarketBook, LedgerError> {
        let offers = self.ledger.list_offers().await?;
        Ok(MarketBook::from_offers(offers))
    }

    /// Record sync followed by a market listing. A failed listing does not
    /// fail the refresh.
    pub async fn refresh(
        &self,
        record: &PlayerRecord,
        confirmed: Option<&OperationId>,
    ) -> Result<Refresh, SyncError> {
        let record = self.sync_after(record, confirmed).await?;
        let market = match self.market().await {
            Ok(market) => Some(market),
            Err(err) => {
                warn!(error = %err, "offer listing failed");
                None
            }
        };
        Ok(Refresh { record, market })
    }
}
