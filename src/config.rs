use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fee::GasLimits;

/// Cosmos Hub derivation path, account 0.
pub const DEFAULT_HD_PATH: &str = "m/44'/118'/0'/0/0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	pub default: String,
	pub profiles: BTreeMap<String, NetworkOptions>,
}

/// Everything needed to talk to one network.  Fixed for the lifetime of a
/// session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkOptions {
	pub http_url: String,
	pub network_id: String,
	pub fee_token: String,
	pub gas_price: f64,
	pub bech32_prefix: String,
	#[serde(default = "default_hd_path")]
	pub hd_path: String,
	#[serde(default)]
	pub fee_mode: FeeMode,
	#[serde(default)]
	pub gas_limits: GasLimits,
	#[serde(default)]
	pub faucet: Option<FaucetOptions>,
	/// Key file; `~/.<network>.key` when unset.
	#[serde(default)]
	pub key_file: Option<PathBuf>,
	/// Request timeout for every HTTP call.  The transport default applies
	/// when unset.
	#[serde(default)]
	pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeMode {
	/// Fees precomputed per category.
	#[default]
	Table,
	/// Shared gas price, fee computed per transaction from the category limit.
	GasPrice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaucetOptions {
	pub url: String,
	pub token: String,
	#[serde(default)]
	pub field: FaucetField,
}

/// JSON key the faucet expects for the token name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaucetField {
	#[default]
	Ticker,
	Denom,
}

fn default_hd_path() -> String {
	DEFAULT_HD_PATH.into()
}

impl NetworkOptions {
	pub fn coralnet() -> Self {
		Self {
			http_url: "https://lcd.coralnet.cosmwasm.com".into(),
			network_id: "cosmwasm-coral".into(),
			fee_token: "ushell".into(),
			gas_price: 0.025,
			bech32_prefix: "coral".into(),
			hd_path: default_hd_path(),
			fee_mode: FeeMode::Table,
			gas_limits: GasLimits::default(),
			faucet: Some(FaucetOptions {
				url: "https://faucet.coralnet.cosmwasm.com/credit".into(),
				token: "SHELL".into(),
				field: FaucetField::Ticker,
			}),
			key_file: None,
			timeout_secs: None,
		}
	}

	pub fn helder() -> Self {
		Self {
			http_url: "https://lcd.helder.cosmwasm.com".into(),
			network_id: "helder-1".into(),
			fee_token: "ucosm".into(),
			gas_price: 0.025,
			bech32_prefix: "wasm".into(),
			hd_path: default_hd_path(),
			fee_mode: FeeMode::GasPrice,
			gas_limits: GasLimits::default(),
			faucet: Some(FaucetOptions {
				url: "https://faucet.helder.cosmwasm.com/credit".into(),
				token: "ucosm".into(),
				field: FaucetField::Denom,
			}),
			key_file: None,
			timeout_secs: None,
		}
	}

	pub fn musselnet() -> Self {
		Self {
			http_url: "https://lcd.musselnet.cosmwasm.com".into(),
			network_id: "musselnet-4".into(),
			fee_token: "umayo".into(),
			gas_price: 0.025,
			bech32_prefix: "wasm".into(),
			hd_path: default_hd_path(),
			fee_mode: FeeMode::GasPrice,
			gas_limits: GasLimits::default(),
			faucet: Some(FaucetOptions {
				url: "https://faucet.musselnet.cosmwasm.com/credit".into(),
				token: "umayo".into(),
				field: FaucetField::Denom,
			}),
			key_file: None,
			timeout_secs: None,
		}
	}

	/// Reject settings that would make fees or addresses meaningless.
	pub fn validate(&self) -> Result<()> {
		if self.http_url.trim().is_empty() {
			return Err(Error::Config("http_url is empty".into()));
		}
		if self.network_id.trim().is_empty() {
			return Err(Error::Config("network_id is empty".into()));
		}
		if self.bech32_prefix.is_empty() {
			return Err(Error::Config("bech32_prefix is empty".into()));
		}
		if self.fee_token.is_empty() {
			return Err(Error::Config("fee_token is empty".into()));
		}
		if !self.gas_price.is_finite() || self.gas_price <= 0.0 {
			return Err(Error::Config(format!(
				"gas_price must be positive, got {}",
				self.gas_price
			)));
		}
		Ok(())
	}

	/// Key file to use when the caller does not name one.
	pub fn default_key_file(&self) -> Result<PathBuf> {
		if let Some(path) = &self.key_file {
			return Ok(path.clone());
		}
		let name = self
			.network_id
			.split('-')
			.find(|part| *part != "cosmwasm")
			.unwrap_or(&self.network_id);
		dirs::home_dir()
			.map(|home| home.join(format!(".{name}.key")))
			.ok_or_else(|| Error::Config("could not determine home directory".into()))
	}

	pub fn timeout(&self) -> Option<std::time::Duration> {
		self.timeout_secs.map(std::time::Duration::from_secs)
	}
}

impl Default for Config {
	fn default() -> Self {
		let mut profiles = BTreeMap::new();
		profiles.insert("coralnet".to_owned(), NetworkOptions::coralnet());
		profiles.insert("helder".to_owned(), NetworkOptions::helder());
		profiles.insert("musselnet".to_owned(), NetworkOptions::musselnet());
		Self {
			default: "coralnet".into(),
			profiles,
		}
	}
}

impl Config {
	/// Directory where client state is stored (~/.bonsai-client/).
	pub fn dir() -> Result<PathBuf> {
		dirs::home_dir()
			.map(|home| home.join(".bonsai-client"))
			.ok_or_else(|| Error::Config("could not determine home directory".into()))
	}

	/// Path to the config file.
	pub fn path() -> Result<PathBuf> {
		Ok(Self::dir()?.join("config.toml"))
	}

	/// Load config from disk, falling back to defaults if no file exists.
	pub fn load() -> Result<Self> {
		Self::load_from(&Self::path()?)
	}

	pub fn load_from(path: &std::path::Path) -> Result<Self> {
		if !path.exists() {
			return Ok(Self::default());
		}
		let content = std::fs::read_to_string(path)?;
		let config: Self = toml::from_str(&content)
			.map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
		for options in config.profiles.values() {
			options.validate()?;
		}
		Ok(config)
	}

	/// Persist the current config to disk, creating the directory if needed.
	pub fn save(&self) -> Result<()> {
		self.save_to(&Self::path()?)
	}

	pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
		std::fs::write(path, content)?;
		Ok(())
	}

	/// Options for the named profile.
	pub fn profile(&self, name: &str) -> Result<&NetworkOptions> {
		self.profiles
			.get(name)
			.ok_or_else(|| Error::Config(format!("unknown network profile: {name}")))
	}

	pub fn default_profile(&self) -> Result<&NetworkOptions> {
		self.profile(&self.default)
	}
}
