pub mod lcd;
#[cfg(test)]
pub(crate) mod mock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::msg::Coin;
use crate::tx_builder::StdTx;

pub use lcd::LcdClient;

/// On-chain account state needed to sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
	pub address: String,
	#[serde(default)]
	pub coins: Vec<Coin>,
	#[serde(default, with = "crate::msg::u64_string")]
	pub account_number: u64,
	#[serde(default, with = "crate::msg::u64_string")]
	pub sequence: u64,
}

impl Account {
	pub fn balance(&self, denom: &str) -> u128 {
		self.coins
			.iter()
			.filter(|c| c.denom == denom)
			.map(|c| c.amount)
			.sum()
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
	pub key: String,
	pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxLog {
	#[serde(default)]
	pub msg_index: u32,
	#[serde(default)]
	pub log: String,
	#[serde(default)]
	pub events: Vec<Event>,
}

/// What the node answers to a block-mode broadcast.  A non-zero `code`
/// means the transaction was rejected; `raw_log` says why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResponse {
	#[serde(default, with = "crate::msg::u64_string")]
	pub height: u64,
	pub txhash: String,
	#[serde(default)]
	pub code: Option<u32>,
	#[serde(default)]
	pub raw_log: String,
	#[serde(default)]
	pub logs: Vec<TxLog>,
}

impl BroadcastResponse {
	pub fn is_err(&self) -> bool {
		self.code.is_some_and(|c| c != 0)
	}
}

/// Transport to a ledger node.  Implementations report node-side failures
/// with the node's own text: `Error::Query` for reads, `Error::Transaction`
/// for a broadcast the node refused to accept.
#[async_trait::async_trait]
pub trait Ledger: Send + Sync {
	/// `None` when the address has never received funds.
	async fn account(&self, address: &str) -> Result<Option<Account>>;

	/// Run a smart query (raw JSON bytes) against a contract.
	async fn query_smart(&self, contract: &str, query: &[u8]) -> Result<Value>;

	/// Submit a signed transaction and wait for it to be included.
	async fn broadcast(&self, tx: &StdTx) -> Result<BroadcastResponse>;
}

#[async_trait::async_trait]
impl<L: Ledger + ?Sized> Ledger for std::sync::Arc<L> {
	async fn account(&self, address: &str) -> Result<Option<Account>> {
		(**self).account(address).await
	}

	async fn query_smart(&self, contract: &str, query: &[u8]) -> Result<Value> {
		(**self).query_smart(contract, query).await
	}

	async fn broadcast(&self, tx: &StdTx) -> Result<BroadcastResponse> {
		(**self).broadcast(tx).await
	}
}

/// Value of the first `key` attribute on an event of type `kind`.
pub fn find_attribute<'a>(logs: &'a [TxLog], kind: &str, key: &str) -> Option<&'a str> {
	logs.iter()
		.flat_map(|log| &log.events)
		.filter(|event| event.kind == kind)
		.flat_map(|event| &event.attributes)
		.find(|attr| attr.key == key)
		.map(|attr| attr.value.as_str())
}
