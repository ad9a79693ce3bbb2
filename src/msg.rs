//! Wire messages for the bonsai contract and the ledger-level messages a
//! session can sign directly.  Each enum serializes to a JSON object with a
//! single top-level key naming the variant.

use serde::{Deserialize, Serialize};

/// A token amount.  `amount` travels as a decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
	pub denom: String,
	#[serde(with = "u128_string")]
	pub amount: u128,
}

impl Coin {
	pub fn new(amount: u128, denom: impl Into<String>) -> Self {
		Self {
			denom: denom.into(),
			amount,
		}
	}
}

// -- Contract messages --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitMsg {
	pub price: Coin,
	pub number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum ExecuteMsg {
	BecomeGardener { name: String },
	BuyBonsai { b_id: String },
	SellBonsai { b_id: String, recipient: String },
	CutBonsai { b_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum QueryMsg {
	GetBonsais {},
	GetGardener { sender: String },
	GetGardeners {},
}

// -- Contract responses --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bonsai {
	pub id: u64,
	/// Block height at which the bonsai was grown.
	pub birth_date: u64,
	pub price: Coin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonsaiList {
	pub bonsais: Vec<Bonsai>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gardener {
	pub name: String,
	pub address: String,
	pub bonsais: Vec<Bonsai>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllGardenersResponse {
	pub gardeners: Vec<Gardener>,
}

// -- Ledger-level messages --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CosmosMsg {
	Bank(BankMsg),
	Staking(StakingMsg),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankMsg {
	Send {
		from_address: String,
		to_address: String,
		amount: Vec<Coin>,
	},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakingMsg {
	Delegate {
		validator: String,
		amount: Coin,
	},
	Undelegate {
		validator: String,
		amount: Coin,
	},
	Redelegate {
		src_validator: String,
		dst_validator: String,
		amount: Coin,
	},
	Withdraw {
		validator: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		recipient: Option<String>,
	},
}

// -- Serde helpers for integers carried as strings --

pub(crate) mod u128_string {
	use serde::{de::Error, Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(value: &u128, s: S) -> Result<S::Ok, S::Error> {
		s.collect_str(value)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
		String::deserialize(d)?.parse().map_err(D::Error::custom)
	}
}

pub(crate) mod u64_string {
	use serde::{de::Error, Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(value: &u64, s: S) -> Result<S::Ok, S::Error> {
		s.collect_str(value)
	}

	/// Accepts `"12"` as well as `12`; LCD servers disagree on which they send.
	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
		#[derive(Deserialize)]
		#[serde(untagged)]
		enum Repr {
			Str(String),
			Num(u64),
		}
		match Repr::deserialize(d)? {
			Repr::Str(s) if s.is_empty() => Ok(0),
			Repr::Str(s) => s.parse().map_err(D::Error::custom),
			Repr::Num(n) => Ok(n),
		}
	}
}
