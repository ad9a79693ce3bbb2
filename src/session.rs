use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::NetworkOptions;
use crate::error::{Error, Result};
use crate::fee::{FeeModel, TxCategory};
use crate::ledger::{find_attribute, Account, Ledger, LcdClient, TxLog};
use crate::msg::{BankMsg, Coin, CosmosMsg};
use crate::tx_builder::{self, SignerData, TxMsg, UploadMeta};
use crate::wallet::{validate_address, SigningIdentity};

/// Outcome of an accepted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResult {
	pub tx_hash: String,
	pub height: u64,
	pub raw_log: String,
	pub logs: Vec<TxLog>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
	pub code_id: u64,
	pub tx: TxResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantiateResult {
	pub contract_address: String,
	pub tx: TxResult,
}

/// Optional parts of an `execute` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
	/// Coins sent along with the message.
	pub funds: Vec<Coin>,
	pub memo: String,
}

/// Optional parts of an `instantiate` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstantiateOptions {
	/// Address allowed to migrate the contract later.
	pub admin: Option<String>,
	pub memo: String,
	pub funds: Vec<Coin>,
}

/// A signing identity bound to one network.
///
/// Operations are meant to be issued one at a time: every transaction reads
/// the account sequence right before signing, so two concurrent submissions
/// from the same session can collide on it.
pub struct LedgerSession {
	ledger: Box<dyn Ledger>,
	identity: SigningIdentity,
	options: NetworkOptions,
	fees: FeeModel,
}

impl LedgerSession {
	/// Bind `identity` to the LCD endpoint named in `options`.
	pub fn connect(identity: SigningIdentity, options: NetworkOptions) -> Result<Self> {
		let lcd = LcdClient::new(&options.http_url, options.timeout())?;
		Self::with_ledger(identity, options, Box::new(lcd))
	}

	/// Like [`connect`](Self::connect) over an arbitrary transport.
	pub fn with_ledger(
		identity: SigningIdentity,
		options: NetworkOptions,
		ledger: Box<dyn Ledger>,
	) -> Result<Self> {
		options.validate()?;
		if identity.prefix() != options.bech32_prefix {
			return Err(Error::Config(format!(
				"identity uses prefix {}, network {} expects {}",
				identity.prefix(),
				options.network_id,
				options.bech32_prefix
			)));
		}
		let fees = FeeModel::from_options(&options);
		Ok(Self {
			ledger,
			identity,
			options,
			fees,
		})
	}

	pub fn sender_address(&self) -> &str {
		self.identity.address()
	}

	pub fn identity(&self) -> &SigningIdentity {
		&self.identity
	}

	pub fn options(&self) -> &NetworkOptions {
		&self.options
	}

	pub fn fees(&self) -> &FeeModel {
		&self.fees
	}

	/// On-chain state of `address`, or of the session's own address when
	/// `None`.  Unfunded addresses yield `Ok(None)`.
	pub async fn get_account(&self, address: Option<&str>) -> Result<Option<Account>> {
		let address = address.unwrap_or(self.sender_address());
		self.ledger.account(address).await
	}

	// -- Queries --

	pub async fn query<Q: Serialize>(&self, contract: &str, msg: &Q) -> Result<Value> {
		let raw = serde_json::to_vec(msg)?;
		debug!("query {contract}: {}", String::from_utf8_lossy(&raw));
		self.ledger.query_smart(contract, &raw).await
	}

	/// [`query`](Self::query) decoded into the response type.
	pub async fn query_as<T, Q>(&self, contract: &str, msg: &Q) -> Result<T>
	where
		T: DeserializeOwned,
		Q: Serialize,
	{
		let value = self.query(contract, msg).await?;
		serde_json::from_value(value)
			.map_err(|e| Error::Query(format!("unexpected response from {contract}: {e}")))
	}

	// -- Transactions --

	pub async fn execute<M: Serialize>(
		&self,
		contract: &str,
		msg: &M,
		opts: &ExecuteOptions,
	) -> Result<TxResult> {
		let msg = tx_builder::execute(
			self.sender_address(),
			contract,
			serde_json::to_value(msg)?,
			&opts.funds,
		);
		self.sign_and_broadcast(TxCategory::Exec, vec![msg], &opts.memo)
			.await
	}

	/// Store a wasm binary; returns the code id the ledger assigned.
	pub async fn upload(&self, wasm: &[u8], meta: &UploadMeta) -> Result<UploadResult> {
		let msg = tx_builder::store_code(self.sender_address(), wasm, meta);
		let tx = self
			.sign_and_broadcast(TxCategory::Upload, vec![msg], "")
			.await
			.map_err(retag(Error::Upload))?;
		let code_id = find_attribute(&tx.logs, "message", "code_id")
			.ok_or_else(|| Error::Upload(format!("no code_id in logs of tx {}", tx.tx_hash)))?
			.parse()
			.map_err(|e| Error::Upload(format!("bad code_id in tx {}: {e}", tx.tx_hash)))?;
		info!("uploaded {} bytes as code {code_id}", wasm.len());
		Ok(UploadResult { code_id, tx })
	}

	pub async fn instantiate<M: Serialize>(
		&self,
		code_id: u64,
		msg: &M,
		label: &str,
		opts: &InstantiateOptions,
	) -> Result<InstantiateResult> {
		if label.trim().is_empty() {
			return Err(Error::Instantiate("label must not be empty".into()));
		}
		if let Some(admin) = &opts.admin {
			validate_address(admin, &self.options.bech32_prefix)?;
		}
		let msg = tx_builder::instantiate(
			self.sender_address(),
			code_id,
			serde_json::to_value(msg)?,
			label,
			opts.admin.as_deref(),
			&opts.funds,
		);
		let tx = self
			.sign_and_broadcast(TxCategory::Init, vec![msg], &opts.memo)
			.await
			.map_err(retag(Error::Instantiate))?;
		let contract_address = find_attribute(&tx.logs, "message", "contract_address")
			.ok_or_else(|| {
				Error::Instantiate(format!("no contract_address in logs of tx {}", tx.tx_hash))
			})?
			.to_owned();
		info!("instantiated code {code_id} as {contract_address} ({label})");
		Ok(InstantiateResult {
			contract_address,
			tx,
		})
	}

	/// Move `contract` to new code.  Only its admin may do this.
	pub async fn migrate<M: Serialize>(&self, contract: &str, code_id: u64, msg: &M) -> Result<TxResult> {
		let msg = tx_builder::migrate(
			self.sender_address(),
			contract,
			code_id,
			serde_json::to_value(msg)?,
		);
		self.sign_and_broadcast(TxCategory::Migrate, vec![msg], "")
			.await
	}

	pub async fn update_admin(&self, contract: &str, new_admin: &str) -> Result<TxResult> {
		validate_address(new_admin, &self.options.bech32_prefix)?;
		let msg = tx_builder::update_admin(self.sender_address(), contract, new_admin);
		self.sign_and_broadcast(TxCategory::ChangeAdmin, vec![msg], "")
			.await
	}

	pub async fn send_tokens(&self, recipient: &str, amount: &[Coin], memo: &str) -> Result<TxResult> {
		validate_address(recipient, &self.options.bech32_prefix)?;
		let msg = CosmosMsg::Bank(BankMsg::Send {
			from_address: self.sender_address().to_owned(),
			to_address: recipient.to_owned(),
			amount: amount.to_vec(),
		});
		self.submit(&[msg], memo).await
	}

	/// Sign ledger-level messages in one transaction.  Bank-only batches pay
	/// the `send` fee, anything else the `exec` fee.
	pub async fn submit(&self, msgs: &[CosmosMsg], memo: &str) -> Result<TxResult> {
		if msgs.is_empty() {
			return Err(Error::Transaction("no messages to submit".into()));
		}
		let category = if msgs.iter().all(|m| matches!(m, CosmosMsg::Bank(_))) {
			TxCategory::Send
		} else {
			TxCategory::Exec
		};
		let mut tx_msgs = Vec::with_capacity(msgs.len());
		for msg in msgs {
			tx_msgs.extend(tx_builder::from_cosmos_msg(self.sender_address(), msg)?);
		}
		self.sign_and_broadcast(category, tx_msgs, memo).await
	}

	async fn sign_and_broadcast(
		&self,
		category: TxCategory,
		msgs: Vec<TxMsg>,
		memo: &str,
	) -> Result<TxResult> {
		let sender = self.sender_address();
		let account = self.ledger.account(sender).await?.ok_or_else(|| {
			Error::Transaction(format!("account {sender} does not exist on chain"))
		})?;

		let fee = self.fees.fee_for(category);
		let signer = SignerData {
			chain_id: self.options.network_id.clone(),
			account_number: account.account_number,
			sequence: account.sequence,
		};
		debug!(
			"{category} tx from {sender}: {} msgs, seq {}, gas {}",
			msgs.len(),
			signer.sequence,
			fee.gas
		);
		let tx = tx_builder::sign_tx(&self.identity, msgs, fee, memo, &signer)?;

		let resp = self.ledger.broadcast(&tx).await?;
		if resp.is_err() {
			debug!("tx {} rejected: {}", resp.txhash, resp.raw_log);
			return Err(Error::Transaction(resp.raw_log));
		}
		debug!("tx {} included at height {}", resp.txhash, resp.height);
		Ok(TxResult {
			tx_hash: resp.txhash,
			height: resp.height,
			raw_log: resp.raw_log,
			logs: resp.logs,
		})
	}
}

/// Report a ledger rejection under a more specific variant.
fn retag(wrap: fn(String) -> Error) -> impl Fn(Error) -> Error {
	move |err| match err {
		Error::Transaction(text) => wrap(text),
		other => other,
	}
}
