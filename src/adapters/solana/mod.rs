pub mod paper;
pub mod rpc;
pub mod wallet;

pub use paper::PaperWallet;
pub use rpc::{SignatureState, SolanaClient, SolanaClientError};
pub use wallet::{load_keypair, KeypairWallet};
