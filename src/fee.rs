use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{FeeMode, NetworkOptions};
use crate::msg::Coin;

/// Transaction kinds that carry their own gas budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxCategory {
	Upload,
	Init,
	Migrate,
	Exec,
	Send,
	ChangeAdmin,
}

impl TxCategory {
	pub const ALL: [TxCategory; 6] = [
		Self::Upload,
		Self::Init,
		Self::Migrate,
		Self::Exec,
		Self::Send,
		Self::ChangeAdmin,
	];
}

impl fmt::Display for TxCategory {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::Upload => "upload",
			Self::Init => "init",
			Self::Migrate => "migrate",
			Self::Exec => "exec",
			Self::Send => "send",
			Self::ChangeAdmin => "changeAdmin",
		};
		f.write_str(s)
	}
}

/// Worst-case gas observed per category.  These are tuning values for a
/// given network, not something derived from the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasLimits {
	pub upload: u64,
	pub init: u64,
	pub migrate: u64,
	pub exec: u64,
	pub send: u64,
	pub change_admin: u64,
}

impl Default for GasLimits {
	fn default() -> Self {
		Self {
			upload: 1_500_000,
			init: 600_000,
			migrate: 600_000,
			exec: 200_000,
			send: 80_000,
			change_admin: 80_000,
		}
	}
}

impl GasLimits {
	pub fn get(&self, category: TxCategory) -> u64 {
		match category {
			TxCategory::Upload => self.upload,
			TxCategory::Init => self.init,
			TxCategory::Migrate => self.migrate,
			TxCategory::Exec => self.exec,
			TxCategory::Send => self.send,
			TxCategory::ChangeAdmin => self.change_admin,
		}
	}
}

/// Fee attached to a transaction: the coins paid and the gas ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdFee {
	pub amount: Vec<Coin>,
	#[serde(with = "crate::msg::u64_string")]
	pub gas: u64,
}

/// Fees resolved ahead of time, one per category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeTable {
	pub upload: StdFee,
	pub init: StdFee,
	pub migrate: StdFee,
	pub exec: StdFee,
	pub send: StdFee,
	pub change_admin: StdFee,
}

impl FeeTable {
	pub fn get(&self, category: TxCategory) -> &StdFee {
		match category {
			TxCategory::Upload => &self.upload,
			TxCategory::Init => &self.init,
			TxCategory::Migrate => &self.migrate,
			TxCategory::Exec => &self.exec,
			TxCategory::Send => &self.send,
			TxCategory::ChangeAdmin => &self.change_admin,
		}
	}
}

/// Build the precomputed table: `floor(limit * gas_price)` of `fee_token`
/// for every category.
pub fn build_fee_table(fee_token: &str, gas_price: f64, limits: &GasLimits) -> FeeTable {
	let fee = |category| {
		let gas = limits.get(category);
		StdFee {
			amount: vec![Coin::new(gas_cost(gas, gas_price, f64::floor), fee_token)],
			gas,
		}
	};

	FeeTable {
		upload: fee(TxCategory::Upload),
		init: fee(TxCategory::Init),
		migrate: fee(TxCategory::Migrate),
		exec: fee(TxCategory::Exec),
		send: fee(TxCategory::Send),
		change_admin: fee(TxCategory::ChangeAdmin),
	}
}

/// `gas * price` rounded with `round`.  Products within float noise of a
/// whole number snap to it so 0.025 * 200000 is 5000 under either rounding.
fn gas_cost(gas: u64, price: f64, round: fn(f64) -> f64) -> u128 {
	let raw = gas as f64 * price;
	let nearest = raw.round();
	if (raw - nearest).abs() < 1e-6 {
		nearest as u128
	} else {
		round(raw) as u128
	}
}

/// How a session pays for its transactions.  Which variant applies is a
/// property of the network profile.
#[derive(Debug, Clone, PartialEq)]
pub enum FeeModel {
	/// Fees fixed when the session is built.
	Table(FeeTable),
	/// Fees computed at submission from a shared price and per-category limits.
	GasPrice {
		price: f64,
		denom: String,
		limits: GasLimits,
	},
}

impl FeeModel {
	pub fn from_options(options: &NetworkOptions) -> Self {
		match options.fee_mode {
			FeeMode::Table => Self::Table(build_fee_table(
				&options.fee_token,
				options.gas_price,
				&options.gas_limits,
			)),
			FeeMode::GasPrice => Self::GasPrice {
				price: options.gas_price,
				denom: options.fee_token.clone(),
				limits: options.gas_limits,
			},
		}
	}

	/// Resolve the fee for one transaction of the given category.
	pub fn fee_for(&self, category: TxCategory) -> StdFee {
		match self {
			Self::Table(table) => table.get(category).clone(),
			Self::GasPrice {
				price,
				denom,
				limits,
			} => {
				let gas = limits.get(category);
				StdFee {
					amount: vec![Coin::new(gas_cost(gas, *price, f64::ceil), denom)],
					gas,
				}
			}
		}
	}
}
