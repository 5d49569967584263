//! Paper wallet for demo mode.
//!
//! Tracks simulated base and asset balances. It refuses to sign, so nothing
//! it holds can ever reach the chain.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::Side;
use crate::ports::{SignedTransaction, SimulatedFill, UnsignedTransaction, Wallet, WalletError};

#[derive(Debug)]
struct Balances {
    base: f64,
    assets: HashMap<String, f64>,
}

#[derive(Debug)]
pub struct PaperWallet {
    address: String,
    balances: Mutex<Balances>,
}

impl PaperWallet {
    pub fn new(address: String, starting_balance: f64) -> Self {
        Self {
            address,
            balances: Mutex::new(Balances {
                base: starting_balance,
                assets: HashMap::new(),
            }),
        }
    }

    fn balances(&self) -> std::sync::MutexGuard<'_, Balances> {
        self.balances.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Wallet for PaperWallet {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn sign_transaction(&self, _tx: UnsignedTransaction) -> Result<SignedTransaction, WalletError> {
        Err(WalletError::Signing("paper wallet cannot sign".into()))
    }

    async fn get_balance(&self) -> Result<f64, WalletError> {
        Ok(self.balances().base)
    }

    async fn asset_balance(&self, asset_id: &str) -> Result<f64, WalletError> {
        Ok(self.balances().assets.get(asset_id).copied().unwrap_or(0.0))
    }

    fn record_simulated_fill(&self, fill: &SimulatedFill) {
        let mut balances = self.balances();
        match fill.side {
            Side::Buy => {
                balances.base -= fill.base_amount;
                *balances.assets.entry(fill.asset_id.clone()).or_default() += fill.asset_amount;
            }
            Side::Sell => {
                balances.base += fill.base_amount;
                let held = balances.assets.entry(fill.asset_id.clone()).or_default();
                *held = (*held - fill.asset_amount).max(0.0);
                if *held <= 0.0 {
                    balances.assets.remove(&fill.asset_id);
                }
            }
        }
        tracing::debug!(
            "Paper fill {} {}: base balance now {:.6}",
            fill.side,
            fill.asset_id,
            balances.base
        );
    }
}
