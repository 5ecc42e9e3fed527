//! Wallet seam.
//!
//! The wallet service is the source of truth for balances. A call either applies fully and
//! returns `Ok` or does not apply and returns an error. [`WalletShim`] bounds every call with a
//! timeout and maps both failure and timeout into [`GameError`] so rooms can roll back their
//! optimistic state the same way in either case. The shim never retries.

use fishhunt_types::{GameError, WalletId, WalletOperation};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::warn;

pub const REASON_BULLET_COST: &str = "game_bullet_cost";
pub const REASON_FISH_REWARD: &str = "game_fish_reward";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub wallet_id: WalletId,
    pub amount: i64,
    pub reason: &'static str,
    /// Idempotency reference, e.g. `game:{room}:bullet:{id}`.
    pub reference: String,
}

/// Transactional wallet ledger.
pub trait Wallet: Clone + Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn debit(&self, transfer: Transfer) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn credit(&self, transfer: Transfer) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn balance(&self, wallet_id: WalletId) -> impl Future<Output = Result<i64, Self::Error>> + Send;
}

#[derive(Clone)]
pub struct WalletShim<W: Wallet> {
    wallet: W,
    timeout: Duration,
}

impl<W: Wallet> WalletShim<W> {
    pub fn new(wallet: W, timeout: Duration) -> Self {
        Self { wallet, timeout }
    }

    pub fn inner(&self) -> &W {
        &self.wallet
    }

    pub async fn debit(&self, transfer: Transfer) -> Result<(), GameError> {
        let fut = self.wallet.debit(transfer);
        self.call(WalletOperation::Debit, fut).await
    }

    pub async fn credit(&self, transfer: Transfer) -> Result<(), GameError> {
        let fut = self.wallet.credit(transfer);
        self.call(WalletOperation::Credit, fut).await
    }

    pub async fn balance(&self, wallet_id: WalletId) -> Result<i64, GameError> {
        let fut = self.wallet.balance(wallet_id);
        self.call(WalletOperation::Balance, fut).await
    }

    async fn call<T>(
        &self,
        operation: WalletOperation,
        fut: impl Future<Output = Result<T, W::Error>>,
    ) -> Result<T, GameError> {
        match timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                warn!(%operation, %err, "wallet call failed");
                Err(GameError::Wallet {
                    operation,
                    reason: err.to_string(),
                })
            }
            Err(_) => {
                let timeout_ms = self.timeout.as_millis() as u64;
                warn!(%operation, timeout_ms, "wallet call timed out");
                Err(GameError::WalletTimeout {
                    operation,
                    timeout_ms,
                })
            }
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoryWalletError {
    #[error("insufficient funds in wallet {wallet_id}: balance {balance}, requested {amount}")]
    InsufficientFunds {
        wallet_id: WalletId,
        balance: i64,
        amount: i64,
    },
    #[error("non-positive amount {0}")]
    InvalidAmount(i64),
    #[error("{0} rejected by ledger")]
    Rejected(WalletOperation),
}

#[derive(Default)]
struct MemoryLedger {
    balances: HashMap<WalletId, i64>,
    opening_balance: i64,
    transfers: Vec<(WalletOperation, Transfer)>,
    fail_debits: bool,
    fail_credits: bool,
    delay: Duration,
}

/// Process-local wallet ledger.
///
/// Unknown wallets open lazily with `opening_balance`. Failure switches and an artificial
/// delay are applied before any balance changes, so a timed-out call never partially applies.
#[derive(Clone, Default)]
pub struct MemoryWallet {
    ledger: Arc<Mutex<MemoryLedger>>,
}

impl MemoryWallet {
    pub fn new(opening_balance: i64) -> Self {
        let wallet = Self::default();
        wallet.ledger().opening_balance = opening_balance;
        wallet
    }

    pub fn with_balance(wallet_id: WalletId, balance: i64) -> Self {
        let wallet = Self::default();
        wallet.set_balance(wallet_id, balance);
        wallet
    }

    fn ledger(&self) -> MutexGuard<'_, MemoryLedger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_balance(&self, wallet_id: WalletId, balance: i64) {
        self.ledger().balances.insert(wallet_id, balance);
    }

    pub fn balance_of(&self, wallet_id: WalletId) -> Option<i64> {
        self.ledger().balances.get(&wallet_id).copied()
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        self.ledger()
            .transfers
            .iter()
            .map(|(_, transfer)| transfer.clone())
            .collect()
    }

    pub fn fail_debits(&self, fail: bool) {
        self.ledger().fail_debits = fail;
    }

    pub fn fail_credits(&self, fail: bool) {
        self.ledger().fail_credits = fail;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.ledger().delay = delay;
    }

    async fn pause(&self) {
        let delay = self.ledger().delay;
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }

    fn apply(&self, operation: WalletOperation, transfer: Transfer) -> Result<(), MemoryWalletError> {
        if transfer.amount <= 0 {
            return Err(MemoryWalletError::InvalidAmount(transfer.amount));
        }
        let mut ledger = self.ledger();
        let rejected = match operation {
            WalletOperation::Debit => ledger.fail_debits,
            _ => ledger.fail_credits,
        };
        if rejected {
            return Err(MemoryWalletError::Rejected(operation));
        }
        let opening = ledger.opening_balance;
        let balance = ledger.balances.entry(transfer.wallet_id).or_insert(opening);
        match operation {
            WalletOperation::Debit => {
                if *balance < transfer.amount {
                    return Err(MemoryWalletError::InsufficientFunds {
                        wallet_id: transfer.wallet_id,
                        balance: *balance,
                        amount: transfer.amount,
                    });
                }
                *balance -= transfer.amount;
            }
            _ => *balance = balance.saturating_add(transfer.amount),
        }
        ledger.transfers.push((operation, transfer));
        Ok(())
    }
}

impl Wallet for MemoryWallet {
    type Error = MemoryWalletError;

    async fn debit(&self, transfer: Transfer) -> Result<(), Self::Error> {
        self.pause().await;
        self.apply(WalletOperation::Debit, transfer)
    }

    async fn credit(&self, transfer: Transfer) -> Result<(), Self::Error> {
        self.pause().await;
        self.apply(WalletOperation::Credit, transfer)
    }

    async fn balance(&self, wallet_id: WalletId) -> Result<i64, Self::Error> {
        self.pause().await;
        let mut ledger = self.ledger();
        let opening = ledger.opening_balance;
        Ok(*ledger.balances.entry(wallet_id).or_insert(opening))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(amount: i64) -> Transfer {
        Transfer {
            wallet_id: 1,
            amount,
            reason: REASON_BULLET_COST,
            reference: "game:test:bullet:1".into(),
        }
    }

    #[tokio::test]
    async fn test_debit_and_credit_apply() {
        let wallet = MemoryWallet::with_balance(1, 100);
        let shim = WalletShim::new(wallet.clone(), Duration::from_secs(1));
        shim.debit(transfer(30)).await.unwrap();
        shim.credit(transfer(5)).await.unwrap();
        assert_eq!(shim.balance(1).await.unwrap(), 75);
        assert_eq!(wallet.transfers().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_maps_to_resource_error() {
        let wallet = MemoryWallet::with_balance(1, 100);
        wallet.fail_debits(true);
        let shim = WalletShim::new(wallet.clone(), Duration::from_secs(1));
        let err = shim.debit(transfer(30)).await.unwrap_err();
        assert!(matches!(
            err,
            GameError::Wallet {
                operation: WalletOperation::Debit,
                ..
            }
        ));
        assert_eq!(wallet.balance_of(1), Some(100));
    }

    #[tokio::test]
    async fn test_overdraft_rejected_without_change() {
        let wallet = MemoryWallet::with_balance(1, 20);
        let shim = WalletShim::new(wallet.clone(), Duration::from_secs(1));
        assert!(shim.debit(transfer(21)).await.is_err());
        assert_eq!(wallet.balance_of(1), Some(20));
        assert!(wallet.transfers().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_wallet_opens_with_opening_balance() {
        let wallet = MemoryWallet::new(1_000);
        let shim = WalletShim::new(wallet, Duration::from_secs(1));
        assert_eq!(shim.balance(42).await.unwrap(), 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_wallet_times_out() {
        let wallet = MemoryWallet::with_balance(1, 100);
        wallet.set_delay(Duration::from_secs(5));
        let shim = WalletShim::new(wallet.clone(), Duration::from_millis(200));
        let err = shim.credit(transfer(1)).await.unwrap_err();
        assert!(wallet.transfers().is_empty());
        assert_eq!(
            err,
            GameError::WalletTimeout {
                operation: WalletOperation::Credit,
                timeout_ms: 200
            }
        );
    }
}
