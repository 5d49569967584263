use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::VersionedTransaction;

use super::rpc::SolanaClient;
use crate::ports::{SignedTransaction, UnsignedTransaction, Wallet, WalletError};

/// Load a keypair from a Solana CLI keypair file (JSON array of bytes)
pub fn load_keypair<P: AsRef<Path>>(path: P) -> Result<Keypair, WalletError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .map_err(|e| WalletError::Keypair(format!("Failed to read {}: {}", path.display(), e)))?;
    let bytes: Vec<u8> = serde_json::from_str(&contents)
        .map_err(|e| WalletError::Keypair(format!("Invalid JSON format: {}", e)))?;
    Keypair::try_from(bytes.as_slice()).map_err(|e| WalletError::Keypair(e.to_string()))
}

/// Sign a serialized versioned transaction, returning the new bytes and the
/// fee payer signature
pub fn sign_versioned(keypair: &Keypair, bytes: &[u8]) -> Result<(Vec<u8>, String), WalletError> {
    let unsigned: VersionedTransaction =
        bincode::deserialize(bytes).map_err(|e| WalletError::Signing(format!("decode: {}", e)))?;
    let signed = VersionedTransaction::try_new(unsigned.message, &[keypair])
        .map_err(|e| WalletError::Signing(e.to_string()))?;
    let signature = signed
        .signatures
        .first()
        .map(|s| s.to_string())
        .ok_or_else(|| WalletError::Signing("transaction has no signatures".into()))?;
    let bytes = bincode::serialize(&signed).map_err(|e| WalletError::Signing(format!("encode: {}", e)))?;
    Ok((bytes, signature))
}

/// Hot wallet backed by a local keypair. The key never leaves this type.
pub struct KeypairWallet {
    keypair: Keypair,
    rpc: Arc<SolanaClient>,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair, rpc: Arc<SolanaClient>) -> Self {
        Self { keypair, rpc }
    }

    pub fn from_file<P: AsRef<Path>>(path: P, rpc: Arc<SolanaClient>) -> Result<Self, WalletError> {
        Ok(Self::new(load_keypair(path)?, rpc))
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}

#[async_trait]
impl Wallet for KeypairWallet {
    fn address(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    async fn sign_transaction(&self, tx: UnsignedTransaction) -> Result<SignedTransaction, WalletError> {
        let (bytes, signature) = sign_versioned(&self.keypair, &tx.bytes)?;
        Ok(SignedTransaction { bytes, signature })
    }

    async fn get_balance(&self) -> Result<f64, WalletError> {
        self.rpc
            .get_balance(&self.address())
            .await
            .map_err(|e| WalletError::Rpc(e.to_string()))
    }

    async fn asset_balance(&self, asset_id: &str) -> Result<f64, WalletError> {
        self.rpc
            .get_token_balance(&self.address(), asset_id)
            .await
            .map_err(|e| WalletError::Rpc(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::hash::Hash;
    use solana_sdk::message::{v0, VersionedMessage};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn unsigned_bytes(payer: &Pubkey) -> Vec<u8> {
        let message = v0::Message::try_compile(payer, &[], &[], Hash::default()).unwrap();
        let tx = VersionedTransaction {
            signatures: vec![Default::default()],
            message: VersionedMessage::V0(message),
        };
        bincode::serialize(&tx).unwrap()
    }

    #[test]
    fn test_load_keypair_from_file() {
        let keypair = Keypair::new();
        let mut file = NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file.flush().unwrap();

        let loaded = load_keypair(file.path()).unwrap();
        assert_eq!(loaded.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_load_keypair_rejects_garbage() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not valid json").unwrap();
        file.flush().unwrap();
        assert!(matches!(load_keypair(file.path()), Err(WalletError::Keypair(_))));
    }

    #[test]
    fn test_sign_versioned_sets_payer_signature() {
        let keypair = Keypair::new();
        let (bytes, signature) = sign_versioned(&keypair, &unsigned_bytes(&keypair.pubkey())).unwrap();

        let signed: VersionedTransaction = bincode::deserialize(&bytes).unwrap();
        assert_eq!(signed.signatures[0].to_string(), signature);
        assert!(signed.verify_with_results().iter().all(|ok| *ok));
    }

    #[test]
    fn test_sign_versioned_rejects_foreign_payer() {
        let keypair = Keypair::new();
        let other = Keypair::new();
        assert!(sign_versioned(&keypair, &unsigned_bytes(&other.pubkey())).is_err());
    }
}
