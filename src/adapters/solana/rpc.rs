//! Solana RPC client
//!
//! Async wrapper over the blocking `RpcClient`; every call runs on the
//! blocking pool.

use std::str::FromStr;
use std::sync::Arc;

use solana_client::rpc_client::RpcClient;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::native_token::lamports_to_sol;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::{TransactionError, VersionedTransaction};
use thiserror::Error;

/// Byte offset of `decimals` in an SPL mint account
const MINT_DECIMALS_OFFSET: usize = 44;

#[derive(Debug, Error)]
pub enum SolanaClientError {
    #[error("RPC request failed: {0}")]
    RpcError(String),
    #[error("Transaction failed: {0}")]
    TransactionError(String),
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("Not a mint account: {0}")]
    InvalidMint(String),
}

/// On-chain state of a submitted transaction
#[derive(Debug, Clone, PartialEq)]
pub enum SignatureState {
    Unknown,
    Succeeded,
    Failed(TransactionError),
}

#[derive(Clone)]
pub struct SolanaClient {
    client: Arc<RpcClient>,
}

impl SolanaClient {
    pub fn new(rpc_url: String) -> Self {
        let client = Arc::new(RpcClient::new_with_commitment(rpc_url, CommitmentConfig::confirmed()));
        Self { client }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, SolanaClientError>
    where
        T: Send + 'static,
        F: FnOnce(&RpcClient) -> Result<T, SolanaClientError> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || f(&client))
            .await
            .map_err(|e| SolanaClientError::RpcError(format!("Task join error: {}", e)))?
    }

    /// SOL balance in SOL
    pub async fn get_balance(&self, owner: &str) -> Result<f64, SolanaClientError> {
        let owner = parse_pubkey(owner)?;
        let lamports = self
            .blocking(move |c| {
                c.get_balance(&owner)
                    .map_err(|e| SolanaClientError::RpcError(e.to_string()))
            })
            .await?;
        Ok(lamports_to_sol(lamports))
    }

    /// Total UI balance of `mint` across the owner's token accounts
    pub async fn get_token_balance(&self, owner: &str, mint: &str) -> Result<f64, SolanaClientError> {
        let owner = parse_pubkey(owner)?;
        let mint = parse_pubkey(mint)?;
        self.blocking(move |c| {
            let accounts = c
                .get_token_accounts_by_owner(&owner, TokenAccountsFilter::Mint(mint))
                .map_err(|e| SolanaClientError::RpcError(e.to_string()))?;
            let mut total = 0.0;
            for account in accounts {
                let pubkey = parse_pubkey(&account.pubkey)?;
                let balance = c
                    .get_token_account_balance(&pubkey)
                    .map_err(|e| SolanaClientError::RpcError(e.to_string()))?;
                total += balance.ui_amount.unwrap_or(0.0);
            }
            Ok(total)
        })
        .await
    }

    /// Decimals of an SPL (or Token-2022) mint
    pub async fn mint_decimals(&self, mint: &str) -> Result<u8, SolanaClientError> {
        let pubkey = parse_pubkey(mint)?;
        let label = mint.to_string();
        self.blocking(move |c| {
            let data = c
                .get_account_data(&pubkey)
                .map_err(|e| SolanaClientError::RpcError(e.to_string()))?;
            data.get(MINT_DECIMALS_OFFSET)
                .copied()
                .ok_or(SolanaClientError::InvalidMint(label))
        })
        .await
    }

    /// Broadcast a signed transaction, returning its signature
    pub async fn send_transaction(&self, tx: VersionedTransaction) -> Result<String, SolanaClientError> {
        self.blocking(move |c| {
            c.send_transaction(&tx)
                .map(|sig| sig.to_string())
                .map_err(|e| SolanaClientError::TransactionError(e.to_string()))
        })
        .await
    }

    pub async fn signature_state(&self, signature: &str) -> Result<SignatureState, SolanaClientError> {
        let signature = Signature::from_str(signature)
            .map_err(|e| SolanaClientError::InvalidSignature(e.to_string()))?;
        let status = self
            .blocking(move |c| {
                c.get_signature_status(&signature)
                    .map_err(|e| SolanaClientError::RpcError(e.to_string()))
            })
            .await?;
        Ok(match status {
            None => SignatureState::Unknown,
            Some(Ok(())) => SignatureState::Succeeded,
            Some(Err(e)) => SignatureState::Failed(e),
        })
    }
}

fn parse_pubkey(s: &str) -> Result<Pubkey, SolanaClientError> {
    Pubkey::from_str(s).map_err(|e| SolanaClientError::InvalidPublicKey(e.to_string()))
}
