//! Per-tier wager/payout ledger shared by every room of a tier.
//!
//! Each tier is a shard behind its own async mutex; the shard map is only write-locked to
//! insert a tier the first time it is seen. Every mutation writes the updated record through
//! to the repository while the shard is held, so durable writes of one tier stay ordered.
//! A failed write is logged and the in-memory record stays authoritative.

use fishhunt_types::{Inventory, Tier};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Durable storage for inventory records.
pub trait InventoryRepository: Clone + Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load a single tier's record, if one was ever saved.
    fn load(&self, tier: Tier) -> impl Future<Output = Result<Option<Inventory>, Self::Error>> + Send;

    /// Persist a record, replacing any previous one for its tier.
    fn save(&self, inventory: Inventory) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Load every stored record (used for startup hydration).
    fn load_all(&self) -> impl Future<Output = Result<HashMap<Tier, Inventory>, Self::Error>> + Send;
}

#[derive(Debug, Error)]
#[error("inventory store unavailable")]
pub struct StoreUnavailable;

#[derive(Default)]
struct MemoryStore {
    records: HashMap<Tier, Inventory>,
    saves: usize,
    fail_saves: bool,
    fail_loads: bool,
}

/// Process-local repository. Failure switches let callers exercise degraded paths.
#[derive(Clone, Default)]
pub struct MemoryInventoryRepository {
    store: Arc<StdMutex<MemoryStore>>,
}

impl MemoryInventoryRepository {
    fn store(&self) -> std::sync::MutexGuard<'_, MemoryStore> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, inventory: Inventory) {
        self.store().records.insert(inventory.tier, inventory);
    }

    pub fn stored(&self, tier: Tier) -> Option<Inventory> {
        self.store().records.get(&tier).cloned()
    }

    pub fn save_count(&self) -> usize {
        self.store().saves
    }

    pub fn fail_saves(&self, fail: bool) {
        self.store().fail_saves = fail;
    }

    pub fn fail_loads(&self, fail: bool) {
        self.store().fail_loads = fail;
    }
}

impl InventoryRepository for MemoryInventoryRepository {
    type Error = StoreUnavailable;

    async fn load(&self, tier: Tier) -> Result<Option<Inventory>, Self::Error> {
        let store = self.store();
        if store.fail_loads {
            return Err(StoreUnavailable);
        }
        Ok(store.records.get(&tier).cloned())
    }

    async fn save(&self, inventory: Inventory) -> Result<(), Self::Error> {
        let mut store = self.store();
        if store.fail_saves {
            return Err(StoreUnavailable);
        }
        store.saves += 1;
        store.records.insert(inventory.tier, inventory);
        Ok(())
    }

    async fn load_all(&self) -> Result<HashMap<Tier, Inventory>, Self::Error> {
        let store = self.store();
        if store.fail_loads {
            return Err(StoreUnavailable);
        }
        Ok(store.records.clone())
    }
}

type Shard = Arc<Mutex<Inventory>>;

pub struct InventoryLedger<R: InventoryRepository> {
    repository: R,
    shards: RwLock<HashMap<Tier, Shard>>,
}

impl<R: InventoryRepository> InventoryLedger<R> {
    pub fn new(repository: R) -> Self {
        Self {
            repository,
            shards: RwLock::new(HashMap::new()),
        }
    }

    /// Replace in-memory records with everything the repository holds.
    ///
    /// Returns the number of tiers loaded. Repository failure leaves the ledger empty.
    pub async fn hydrate(&self) -> usize {
        let stored = match self.repository.load_all().await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(?err, "failed to hydrate inventory; starting from zero");
                return 0;
            }
        };
        let count = stored.len();
        let mut shards = self.shards.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        for (tier, inventory) in stored {
            info!(
                %tier,
                total_in = inventory.total_in,
                total_out = inventory.total_out,
                "hydrated inventory"
            );
            shards.insert(tier, Arc::new(Mutex::new(inventory)));
        }
        count
    }

    pub async fn get_inventory(&self, tier: Tier) -> Inventory {
        self.shard(tier).await.lock().await.clone()
    }

    pub async fn add_bet(&self, tier: Tier, amount: i64) {
        self.mutate(tier, amount, Inventory::add_bet).await;
    }

    pub async fn add_win(&self, tier: Tier, amount: i64) {
        self.mutate(tier, amount, Inventory::add_win).await;
    }

    async fn mutate(&self, tier: Tier, amount: i64, apply: fn(&mut Inventory, i64) -> bool) {
        if amount <= 0 {
            return;
        }
        let shard = self.shard(tier).await;
        let mut inventory = shard.lock().await;
        if !apply(&mut inventory, amount) {
            return;
        }
        debug!(
            %tier,
            amount,
            total_in = inventory.total_in,
            total_out = inventory.total_out,
            rtp = inventory.current_rtp,
            "inventory updated"
        );
        if let Err(err) = self.repository.save(inventory.clone()).await {
            warn!(%tier, ?err, "failed to persist inventory");
        }
    }

    /// Fetch a tier's shard, creating it from the repository (or zero) on first access.
    async fn shard(&self, tier: Tier) -> Shard {
        if let Some(shard) = self.existing(tier) {
            return shard;
        }
        let initial = match self.repository.load(tier).await {
            Ok(Some(inventory)) => inventory,
            Ok(None) => Inventory::new(tier),
            Err(err) => {
                warn!(%tier, ?err, "failed to load inventory; starting from zero");
                Inventory::new(tier)
            }
        };
        let mut shards = self.shards.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        shards
            .entry(tier)
            .or_insert_with(|| Arc::new(Mutex::new(initial)))
            .clone()
    }

    fn existing(&self, tier: Tier) -> Option<Shard> {
        self.shards
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&tier)
            .cloned()
    }
}
