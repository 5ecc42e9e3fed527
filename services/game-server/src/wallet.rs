//! Wallet backends selectable from config.

use fishhunt_execution::wallet::MemoryWalletError;
use fishhunt_execution::{MemoryWallet, Transfer, Wallet};
use fishhunt_types::WalletId;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::WalletConfig;

#[derive(Debug, Error)]
pub enum HttpWalletError {
    #[error("wallet request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("wallet service returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

#[derive(Serialize)]
struct TransferBody<'a> {
    amount: i64,
    reason: &'a str,
    reference: &'a str,
}

#[derive(Deserialize)]
struct BalanceBody {
    balance: i64,
}

/// Client for the external wallet service.
///
/// Timeouts are applied by the room's wallet shim, not here.
#[derive(Clone)]
pub struct HttpWallet {
    client: Client,
    base_url: String,
}

impl HttpWallet {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn wallet_url(&self, wallet_id: WalletId) -> String {
        format!("{}/wallets/{wallet_id}", self.base_url)
    }

    async fn transfer(&self, action: &str, transfer: Transfer) -> Result<(), HttpWalletError> {
        let url = format!("{}/{action}", self.wallet_url(transfer.wallet_id));
        let response = self
            .client
            .post(url)
            .json(&TransferBody {
                amount: transfer.amount,
                reason: transfer.reason,
                reference: &transfer.reference,
            })
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, HttpWalletError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(HttpWalletError::Status { status, body })
}

impl Wallet for HttpWallet {
    type Error = HttpWalletError;

    async fn debit(&self, transfer: Transfer) -> Result<(), Self::Error> {
        self.transfer("debit", transfer).await
    }

    async fn credit(&self, transfer: Transfer) -> Result<(), Self::Error> {
        self.transfer("credit", transfer).await
    }

    async fn balance(&self, wallet_id: WalletId) -> Result<i64, Self::Error> {
        let response = self.client.get(self.wallet_url(wallet_id)).send().await?;
        let body: BalanceBody = check_status(response).await?.json().await?;
        Ok(body.balance)
    }
}

#[derive(Debug, Error)]
pub enum WalletBackendError {
    #[error(transparent)]
    Memory(#[from] MemoryWalletError),
    #[error(transparent)]
    Http(#[from] HttpWalletError),
}

#[derive(Clone)]
pub enum WalletBackend {
    Memory(MemoryWallet),
    Http(HttpWallet),
}

impl WalletBackend {
    pub fn from_config(config: &WalletConfig) -> Self {
        match config {
            WalletConfig::Memory {
                initial_balance, ..
            } => WalletBackend::Memory(MemoryWallet::new(*initial_balance)),
            WalletConfig::Http { base_url, .. } => WalletBackend::Http(HttpWallet::new(base_url)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WalletBackend::Memory(_) => "memory",
            WalletBackend::Http(_) => "http",
        }
    }
}

impl Wallet for WalletBackend {
    type Error = WalletBackendError;

    async fn debit(&self, transfer: Transfer) -> Result<(), Self::Error> {
        match self {
            WalletBackend::Memory(wallet) => Ok(wallet.debit(transfer).await?),
            WalletBackend::Http(wallet) => Ok(wallet.debit(transfer).await?),
        }
    }

    async fn credit(&self, transfer: Transfer) -> Result<(), Self::Error> {
        match self {
            WalletBackend::Memory(wallet) => Ok(wallet.credit(transfer).await?),
            WalletBackend::Http(wallet) => Ok(wallet.credit(transfer).await?),
        }
    }

    async fn balance(&self, wallet_id: WalletId) -> Result<i64, Self::Error> {
        match self {
            WalletBackend::Memory(wallet) => Ok(wallet.balance(wallet_id).await?),
            WalletBackend::Http(wallet) => Ok(wallet.balance(wallet_id).await?),
        }
    }
}
