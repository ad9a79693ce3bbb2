use log::{debug, info};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::msg::{AllGardenersResponse, BonsaiList, ExecuteMsg, Gardener, InitMsg, QueryMsg};
use crate::session::{ExecuteOptions, InstantiateOptions, LedgerSession};
use crate::tx_builder::UploadMeta;

pub const DEFAULT_BUILDER: &str = "cosmwasm/rust-optimizer:0.10.3";

/// Where the contract binary comes from, and what to record about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WasmSource {
	/// Location the binary is downloaded from.
	pub url: String,
	/// Provenance recorded on chain (usually the source repository).
	pub source: String,
	pub builder: String,
	/// Expected SHA-256 of the binary, hex encoded.
	pub checksum: Option<String>,
}

impl WasmSource {
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			source: String::new(),
			builder: DEFAULT_BUILDER.into(),
			checksum: None,
		}
	}

	pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
		self.checksum = Some(checksum.into());
		self
	}

	fn meta(&self) -> UploadMeta {
		UploadMeta {
			source: self.source.clone(),
			builder: self.builder.clone(),
		}
	}
}

/// Deploys the bonsai contract and hands out bound instances.
pub struct ContractFactory<'a> {
	session: &'a LedgerSession,
	source: WasmSource,
	http: reqwest::Client,
}

impl<'a> ContractFactory<'a> {
	pub fn new(session: &'a LedgerSession, source: WasmSource) -> Result<Self> {
		let mut builder = reqwest::Client::builder();
		if let Some(timeout) = session.options().timeout() {
			builder = builder.timeout(timeout);
		}
		Ok(Self {
			session,
			source,
			http: builder.build()?,
		})
	}

	/// Fetch the binary and check it against the expected checksum.
	pub async fn download(&self) -> Result<Vec<u8>> {
		let url = &self.source.url;
		let fail = |message: String| Error::Download {
			url: url.clone(),
			message,
		};

		debug!("GET {url}");
		let resp = self.http.get(url).send().await.map_err(|e| fail(e.to_string()))?;
		let status = resp.status();
		if !status.is_success() {
			return Err(fail(format!("status {status}")));
		}
		let wasm = resp.bytes().await.map_err(|e| fail(e.to_string()))?.to_vec();

		if let Some(expected) = &self.source.checksum {
			let actual = hex::encode(Sha256::digest(&wasm));
			if !actual.eq_ignore_ascii_case(expected.trim()) {
				return Err(fail(format!("checksum mismatch: expected {expected}, got {actual}")));
			}
		}
		Ok(wasm)
	}

	/// Download the binary and store it on chain; returns the code id.
	pub async fn upload(&self) -> Result<u64> {
		let wasm = self.download().await?;
		self.upload_bytes(&wasm).await
	}

	/// Store an already fetched binary under this source's metadata.
	pub async fn upload_bytes(&self, wasm: &[u8]) -> Result<u64> {
		let result = self.session.upload(wasm, &self.source.meta()).await?;
		info!("code {} stored in tx {}", result.code_id, result.tx.tx_hash);
		Ok(result.code_id)
	}

	/// Create a new contract from `code_id`.  An empty memo in `opts` is
	/// replaced by `Init <label>`.
	pub async fn instantiate(
		&self,
		code_id: u64,
		init: &InitMsg,
		label: &str,
		opts: &InstantiateOptions,
	) -> Result<ContractInstance<'a>> {
		let mut opts = opts.clone();
		if opts.memo.is_empty() {
			opts.memo = format!("Init {label}");
		}
		let result = self.session.instantiate(code_id, init, label, &opts).await?;
		Ok(self.use_contract(&result.contract_address))
	}

	/// Bind to an existing contract.  No network traffic.
	pub fn use_contract(&self, contract_address: &str) -> ContractInstance<'a> {
		ContractInstance {
			session: self.session,
			contract_address: contract_address.to_owned(),
		}
	}
}

/// Handle on one deployed bonsai contract.  Actions return the transaction
/// hash and are sent exactly once; there is no retry.
#[derive(Clone)]
pub struct ContractInstance<'a> {
	session: &'a LedgerSession,
	contract_address: String,
}

impl ContractInstance<'_> {
	pub fn contract_address(&self) -> &str {
		&self.contract_address
	}

	pub async fn get_bonsais(&self) -> Result<BonsaiList> {
		self.query(&QueryMsg::GetBonsais {}).await
	}

	/// Gardener registered under `address` (the session's own address when
	/// `None`).
	pub async fn get_gardener(&self, address: Option<&str>) -> Result<Option<Gardener>> {
		let sender = address.unwrap_or(self.session.sender_address()).to_owned();
		self.query(&QueryMsg::GetGardener { sender }).await
	}

	pub async fn get_gardeners(&self) -> Result<AllGardenersResponse> {
		self.query(&QueryMsg::GetGardeners {}).await
	}

	pub async fn become_gardener(&self, name: &str) -> Result<String> {
		self.execute(
			&ExecuteMsg::BecomeGardener {
				name: name.to_owned(),
			},
			&ExecuteOptions::default(),
		)
		.await
	}

	/// Coins in `opts.funds` are sent to the contract with the purchase.
	pub async fn buy_bonsai(&self, b_id: &str, opts: &ExecuteOptions) -> Result<String> {
		self.execute(
			&ExecuteMsg::BuyBonsai {
				b_id: b_id.to_owned(),
			},
			opts,
		)
		.await
	}

	pub async fn sell_bonsai(&self, recipient: &str, b_id: &str) -> Result<String> {
		self.execute(
			&ExecuteMsg::SellBonsai {
				b_id: b_id.to_owned(),
				recipient: recipient.to_owned(),
			},
			&ExecuteOptions::default(),
		)
		.await
	}

	pub async fn cut_bonsai(&self, b_id: &str) -> Result<String> {
		self.execute(
			&ExecuteMsg::CutBonsai {
				b_id: b_id.to_owned(),
			},
			&ExecuteOptions::default(),
		)
		.await
	}

	async fn query<T: serde::de::DeserializeOwned>(&self, msg: &QueryMsg) -> Result<T> {
		self.session.query_as(&self.contract_address, msg).await
	}

	async fn execute(&self, msg: &ExecuteMsg, opts: &ExecuteOptions) -> Result<String> {
		let result = self
			.session
			.execute(&self.contract_address, msg, opts)
			.await?;
		Ok(result.tx_hash)
	}
}
