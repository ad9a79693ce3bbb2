pub mod config;
pub mod contract;
pub mod error;
pub mod faucet;
pub mod fee;
pub mod keystore;
pub mod ledger;
pub mod msg;
pub mod network;
pub mod session;
pub mod tx_builder;
pub mod wallet;

pub use config::{Config, NetworkOptions};
pub use contract::{ContractFactory, ContractInstance, WasmSource};
pub use error::{Error, Result};
pub use keystore::KeyStore;
pub use network::Network;
pub use session::LedgerSession;
pub use wallet::SigningIdentity;
