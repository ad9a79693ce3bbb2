//! In-memory ledger running the bonsai contract, plus a one-shot HTTP stub.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use k256::ecdsa::{signature::Verifier, Signature, VerifyingKey};
use serde_json::Value;
use sha2::{Digest, Sha256};
use axum::body::Bytes;
use axum::extract::State as AxumState;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Router;
use tokio::sync::oneshot;

use super::{Account, Attribute, BroadcastResponse, Event, Ledger, TxLog};
use crate::error::{Error, Result};
use crate::msg::{
	AllGardenersResponse, Bonsai, BonsaiList, Coin, ExecuteMsg, Gardener, InitMsg, QueryMsg,
};
use crate::tx_builder::{sign_bytes, SignerData, StdTx, TxMsg};
use crate::wallet::address_from_pubkey;

pub(crate) struct MockLedger {
	chain_id: String,
	prefix: String,
	state: Mutex<State>,
}

#[derive(Clone, Default)]
struct State {
	height: u64,
	tx_count: u64,
	next_account_number: u64,
	next_code_id: u64,
	accounts: BTreeMap<String, MockAccount>,
	codes: BTreeMap<u64, Vec<u8>>,
	contracts: BTreeMap<String, MockContract>,
	delegations: BTreeMap<(String, String), u128>,
	last_memo: String,
}

#[derive(Clone, Default)]
struct MockAccount {
	number: u64,
	sequence: u64,
	coins: BTreeMap<String, u128>,
}

#[derive(Clone)]
struct MockContract {
	code_id: u64,
	admin: Option<String>,
	bonsais: Vec<Bonsai>,
	gardeners: BTreeMap<String, Gardener>,
}

/// A failed transaction: ABCI code and log.
struct Reject(u32, String);

impl MockLedger {
	pub fn new(chain_id: &str, prefix: &str) -> Self {
		Self {
			chain_id: chain_id.to_owned(),
			prefix: prefix.to_owned(),
			state: Mutex::new(State {
				height: 1,
				next_code_id: 1,
				..State::default()
			}),
		}
	}

	pub fn with_next_code_id(self, code_id: u64) -> Self {
		self.state.lock().unwrap().next_code_id = code_id;
		self
	}

	pub fn fund(&self, address: &str, coins: &[Coin]) {
		let mut state = self.state.lock().unwrap();
		let account = state.account_mut(address);
		for coin in coins {
			*account.coins.entry(coin.denom.clone()).or_default() += coin.amount;
		}
	}

	pub fn balance(&self, address: &str, denom: &str) -> u128 {
		let state = self.state.lock().unwrap();
		state
			.accounts
			.get(address)
			.and_then(|a| a.coins.get(denom).copied())
			.unwrap_or(0)
	}

	pub fn sequence(&self, address: &str) -> u64 {
		let state = self.state.lock().unwrap();
		state.accounts.get(address).map(|a| a.sequence).unwrap_or(0)
	}

	pub fn tx_count(&self) -> u64 {
		self.state.lock().unwrap().tx_count
	}

	pub fn last_memo(&self) -> String {
		self.state.lock().unwrap().last_memo.clone()
	}

	pub fn admin(&self, contract: &str) -> Option<String> {
		let state = self.state.lock().unwrap();
		state.contracts.get(contract).and_then(|c| c.admin.clone())
	}

	pub fn code_id_of(&self, contract: &str) -> Option<u64> {
		let state = self.state.lock().unwrap();
		state.contracts.get(contract).map(|c| c.code_id)
	}

	pub fn delegation(&self, delegator: &str, validator: &str) -> u128 {
		let state = self.state.lock().unwrap();
		state
			.delegations
			.get(&(delegator.to_owned(), validator.to_owned()))
			.copied()
			.unwrap_or(0)
	}

	fn check_signature(&self, tx: &StdTx, account: &MockAccount) -> std::result::Result<String, Reject> {
		let [sig] = tx.signatures.as_slice() else {
			return Err(Reject(4, "expected exactly one signature".into()));
		};
		let pubkey = BASE64
			.decode(&sig.pub_key.value)
			.map_err(|_| Reject(4, "bad pubkey encoding".into()))?;
		let signature = BASE64
			.decode(&sig.signature)
			.map_err(|_| Reject(4, "bad signature encoding".into()))?;
		let key = VerifyingKey::from_sec1_bytes(&pubkey)
			.map_err(|_| Reject(4, "invalid pubkey".into()))?;
		let signature =
			Signature::from_slice(&signature).map_err(|_| Reject(4, "invalid signature".into()))?;

		let signer = SignerData {
			chain_id: self.chain_id.clone(),
			account_number: account.number,
			sequence: account.sequence,
		};
		let bytes = sign_bytes(&tx.msg, &tx.fee, &tx.memo, &signer)
			.map_err(|e| Reject(2, e.to_string()))?;
		key.verify(&bytes, &signature).map_err(|_| {
			Reject(
				4,
				"signature verification failed; verify correct account sequence and chain-id".into(),
			)
		})?;
		address_from_pubkey(&pubkey, &self.prefix).map_err(|e| Reject(4, e.to_string()))
	}

	fn process(&self, state: &mut State, tx: &StdTx) -> std::result::Result<Vec<TxLog>, Reject> {
		let signer = tx
			.msg
			.first()
			.map(|m| m.signer().to_owned())
			.ok_or_else(|| Reject(2, "no messages".into()))?;
		let account = state
			.accounts
			.get(&signer)
			.cloned()
			.ok_or_else(|| Reject(9, format!("account {signer} does not exist")))?;

		let recovered = self.check_signature(tx, &account)?;
		if tx.msg.iter().any(|m| m.signer() != recovered) {
			return Err(Reject(8, "pubkey does not match signer address".into()));
		}

		// Ante handler: fee and sequence are charged even if a message fails.
		for coin in &tx.fee.amount {
			state
				.debit(&signer, coin)
				.map_err(|log| Reject(5, format!("insufficient fees; {log}")))?;
		}
		state.account_mut(&signer).sequence += 1;

		let mut scratch = state.clone();
		let mut logs = Vec::with_capacity(tx.msg.len());
		for (index, msg) in tx.msg.iter().enumerate() {
			let attributes = scratch.apply(&self.prefix, msg).map_err(|reason| {
				Reject(
					5,
					format!("failed to execute message; message index: {index}: {reason}"),
				)
			})?;
			logs.push(TxLog {
				msg_index: index as u32,
				log: String::new(),
				events: vec![Event {
					kind: "message".into(),
					attributes,
				}],
			});
		}
		*state = scratch;
		Ok(logs)
	}
}

#[async_trait::async_trait]
impl Ledger for MockLedger {
	async fn account(&self, address: &str) -> Result<Option<Account>> {
		let state = self.state.lock().unwrap();
		Ok(state.accounts.get(address).map(|a| Account {
			address: address.to_owned(),
			coins: a
				.coins
				.iter()
				.map(|(denom, amount)| Coin::new(*amount, denom))
				.collect(),
			account_number: a.number,
			sequence: a.sequence,
		}))
	}

	async fn query_smart(&self, contract: &str, query: &[u8]) -> Result<Value> {
		let state = self.state.lock().unwrap();
		let c = state
			.contracts
			.get(contract)
			.ok_or_else(|| Error::Query(format!("contract {contract}: not found")))?;
		let msg: QueryMsg = serde_json::from_slice(query)
			.map_err(|e| Error::Query(format!("Error parsing into type QueryMsg: {e}")))?;
		let value = match msg {
			QueryMsg::GetBonsais {} => serde_json::to_value(BonsaiList {
				bonsais: c.bonsais.clone(),
			})?,
			QueryMsg::GetGardener { sender } => serde_json::to_value(c.gardeners.get(&sender))?,
			QueryMsg::GetGardeners {} => serde_json::to_value(AllGardenersResponse {
				gardeners: c.gardeners.values().cloned().collect(),
			})?,
		};
		Ok(value)
	}

	async fn broadcast(&self, tx: &StdTx) -> Result<BroadcastResponse> {
		let mut state = self.state.lock().unwrap();
		state.height += 1;
		state.tx_count += 1;
		state.last_memo = tx.memo.clone();
		let txhash = hex::encode_upper(Sha256::digest(
			[serde_json::to_vec(tx)?, state.tx_count.to_be_bytes().to_vec()].concat(),
		));
		let height = state.height;

		Ok(match self.process(&mut state, tx) {
			Ok(logs) => BroadcastResponse {
				height,
				txhash,
				code: None,
				raw_log: serde_json::to_string(&logs)?,
				logs,
			},
			Err(Reject(code, raw_log)) => BroadcastResponse {
				height,
				txhash,
				code: Some(code),
				raw_log,
				logs: Vec::new(),
			},
		})
	}
}

impl State {
	fn account_mut(&mut self, address: &str) -> &mut MockAccount {
		let next = &mut self.next_account_number;
		self.accounts.entry(address.to_owned()).or_insert_with(|| {
			let number = *next;
			*next += 1;
			MockAccount {
				number,
				..MockAccount::default()
			}
		})
	}

	fn debit(&mut self, address: &str, coin: &Coin) -> std::result::Result<(), String> {
		let have = self
			.accounts
			.get(address)
			.and_then(|a| a.coins.get(&coin.denom).copied())
			.unwrap_or(0);
		if have < coin.amount {
			return Err(format!(
				"insufficient funds: {have}{} < {}{}",
				coin.denom, coin.amount, coin.denom
			));
		}
		let account = self.account_mut(address);
		*account.coins.entry(coin.denom.clone()).or_default() -= coin.amount;
		Ok(())
	}

	fn credit(&mut self, address: &str, coin: &Coin) {
		*self
			.account_mut(address)
			.coins
			.entry(coin.denom.clone())
			.or_default() += coin.amount;
	}

	fn transfer(&mut self, from: &str, to: &str, coins: &[Coin]) -> std::result::Result<(), String> {
		for coin in coins {
			self.debit(from, coin)?;
			self.credit(to, coin);
		}
		Ok(())
	}

	fn apply(&mut self, prefix: &str, msg: &TxMsg) -> std::result::Result<Vec<Attribute>, String> {
		let mut attrs = vec![attr("sender", msg.signer())];
		match msg {
			TxMsg::StoreCode(m) => {
				let wasm = BASE64.decode(&m.wasm_byte_code).map_err(|e| e.to_string())?;
				if wasm.is_empty() {
					return Err("empty wasm code".into());
				}
				let code_id = self.next_code_id;
				self.next_code_id += 1;
				self.codes.insert(code_id, wasm);
				attrs.push(attr("module", "wasm"));
				attrs.push(attr("code_id", &code_id.to_string()));
			}
			TxMsg::Instantiate(m) => {
				if !self.codes.contains_key(&m.code_id) {
					return Err(format!("no code with id {}: not found", m.code_id));
				}
				let init: InitMsg = serde_json::from_value(m.init_msg.clone())
					.map_err(|e| format!("Error parsing into type InitMsg: {e}"))?;
				let address = address_from_pubkey(
					format!("contract/{}/{}", m.code_id, self.contracts.len()).as_bytes(),
					prefix,
				)
				.map_err(|e| e.to_string())?;
				self.transfer(&m.sender, &address, &m.init_funds)?;
				let bonsais = (0..u64::from(init.number))
					.map(|id| Bonsai {
						id,
						birth_date: self.height,
						price: init.price.clone(),
					})
					.collect();
				self.contracts.insert(
					address.clone(),
					MockContract {
						code_id: m.code_id,
						admin: m.admin.clone(),
						bonsais,
						gardeners: BTreeMap::new(),
					},
				);
				attrs.push(attr("module", "wasm"));
				attrs.push(attr("contract_address", &address));
			}
			TxMsg::Execute(m) => {
				if !self.contracts.contains_key(&m.contract) {
					return Err(format!("contract {}: not found", m.contract));
				}
				self.transfer(&m.sender, &m.contract, &m.sent_funds)?;
				let action: ExecuteMsg = serde_json::from_value(m.msg.clone())
					.map_err(|e| format!("Error parsing into type HandleMsg: {e}"))?;
				self.execute_bonsai(&m.contract, &m.sender, action)
					.map_err(|reason| format!("{reason}: execute wasm contract failed"))?;
				attrs.push(attr("module", "wasm"));
				attrs.push(attr("contract_address", &m.contract));
			}
			TxMsg::Migrate(m) => {
				if !self.codes.contains_key(&m.code_id) {
					return Err(format!("no code with id {}: not found", m.code_id));
				}
				let contract = self.admin_contract(&m.contract, &m.sender)?;
				contract.code_id = m.code_id;
			}
			TxMsg::UpdateAdmin(m) => {
				let contract = self.admin_contract(&m.contract, &m.sender)?;
				contract.admin = Some(m.new_admin.clone());
			}
			TxMsg::Send(m) => {
				self.transfer(&m.from_address, &m.to_address, &m.amount)?;
				attrs.push(attr("module", "bank"));
			}
			TxMsg::Delegate(m) => {
				self.debit(&m.delegator_address, &m.amount)?;
				*self
					.delegations
					.entry((m.delegator_address.clone(), m.validator_address.clone()))
					.or_default() += m.amount.amount;
			}
			TxMsg::Undelegate(m) => {
				self.undelegate(&m.delegator_address, &m.validator_address, m.amount.amount)?;
				self.credit(&m.delegator_address, &m.amount);
			}
			TxMsg::Redelegate(m) => {
				self.undelegate(
					&m.delegator_address,
					&m.validator_src_address,
					m.amount.amount,
				)?;
				*self
					.delegations
					.entry((m.delegator_address.clone(), m.validator_dst_address.clone()))
					.or_default() += m.amount.amount;
			}
			TxMsg::WithdrawReward(_) | TxMsg::SetWithdrawAddress(_) => {}
		}
		Ok(attrs)
	}

	fn undelegate(&mut self, delegator: &str, validator: &str, amount: u128) -> std::result::Result<(), String> {
		let key = (delegator.to_owned(), validator.to_owned());
		let bonded = self.delegations.get(&key).copied().unwrap_or(0);
		if bonded < amount {
			return Err(format!("insufficient delegation: {bonded} < {amount}"));
		}
		self.delegations.insert(key, bonded - amount);
		Ok(())
	}

	fn admin_contract(&mut self, address: &str, sender: &str) -> std::result::Result<&mut MockContract, String> {
		let contract = self
			.contracts
			.get_mut(address)
			.ok_or_else(|| format!("contract {address}: not found"))?;
		if contract.admin.as_deref() != Some(sender) {
			return Err("unauthorized: caller is not the contract admin".into());
		}
		Ok(contract)
	}

	/// The bonsai contract's handle logic.
	fn execute_bonsai(&mut self, contract: &str, sender: &str, msg: ExecuteMsg) -> std::result::Result<(), String> {
		match msg {
			ExecuteMsg::BecomeGardener { name } => {
				let c = self.contracts.get_mut(contract).expect("checked by caller");
				if c.gardeners.contains_key(sender) {
					return Err("A gardener with the sender address already exist".into());
				}
				c.gardeners.insert(
					sender.to_owned(),
					Gardener {
						name,
						address: sender.to_owned(),
						bonsais: vec![],
					},
				);
			}
			ExecuteMsg::BuyBonsai { b_id } => {
				let c = &self.contracts[contract];
				let bonsai = c
					.bonsais
					.iter()
					.find(|b| b.id.to_string() == b_id)
					.cloned()
					.ok_or_else(|| "Bonsai not found".to_owned())?;
				if !c.gardeners.contains_key(sender) {
					return Err("gardener not found".into());
				}
				self.debit(sender, &bonsai.price)
					.map_err(|_| "Insufficient funds to buy the bonsai".to_owned())?;
				self.credit(contract, &bonsai.price);

				let c = self.contracts.get_mut(contract).expect("checked by caller");
				c.bonsais.retain(|b| b.id != bonsai.id);
				c.gardeners
					.get_mut(sender)
					.expect("checked above")
					.bonsais
					.push(bonsai);
			}
			ExecuteMsg::SellBonsai { b_id, recipient } => {
				let c = &self.contracts[contract];
				let bonsai = c
					.gardeners
					.get(sender)
					.and_then(|g| g.bonsais.iter().find(|b| b.id.to_string() == b_id))
					.cloned()
					.ok_or_else(|| format!("No bonsai with {b_id} id found"))?;
				if !c.gardeners.contains_key(&recipient) {
					return Err(format!("{recipient} is not a gardener"));
				}
				let funds = self
					.accounts
					.get(&recipient)
					.and_then(|a| a.coins.get(&bonsai.price.denom).copied())
					.unwrap_or(0);
				if funds < bonsai.price.amount {
					return Err("Insufficient buyers funds".into());
				}

				let c = self.contracts.get_mut(contract).expect("checked by caller");
				if let Some(seller) = c.gardeners.get_mut(sender) {
					seller.bonsais.retain(|b| b.id != bonsai.id);
				}
				c.gardeners
					.get_mut(&recipient)
					.expect("checked above")
					.bonsais
					.push(bonsai);
			}
			ExecuteMsg::CutBonsai { b_id } => {
				let c = self.contracts.get_mut(contract).expect("checked by caller");
				if let Some(owner) = c.gardeners.get_mut(sender) {
					owner.bonsais.retain(|b| b.id.to_string() != b_id);
				}
			}
		}
		Ok(())
	}
}

fn attr(key: &str, value: &str) -> Attribute {
	Attribute {
		key: key.to_owned(),
		value: value.to_owned(),
	}
}

#[derive(Clone)]
struct Stub {
	status: StatusCode,
	body: Bytes,
	seen: Arc<Mutex<Option<oneshot::Sender<String>>>>,
}

/// Serve `status` and `body` for any request on a local port.  The handle
/// resolves to the first request as `METHOD /path?query`, a blank line,
/// then the body.
pub(crate) async fn serve_once(
	status: u16,
	body: Vec<u8>,
) -> (String, tokio::task::JoinHandle<String>) {
	let (tx, rx) = oneshot::channel();
	let stub = Stub {
		status: StatusCode::from_u16(status).unwrap(),
		body: Bytes::from(body),
		seen: Arc::new(Mutex::new(Some(tx))),
	};
	let app = Router::new().fallback(answer).with_state(stub);

	let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		let _ = axum::serve(listener, app).await;
	});

	let handle = tokio::spawn(async move { rx.await.unwrap_or_default() });
	(format!("http://{addr}"), handle)
}

async fn answer(
	AxumState(stub): AxumState<Stub>,
	method: Method,
	uri: Uri,
	body: Bytes,
) -> impl IntoResponse {
	if let Some(tx) = stub.seen.lock().unwrap().take() {
		let _ = tx.send(format!("{method} {uri}\r\n\r\n{}", String::from_utf8_lossy(&body)));
	}
	(stub.status, [(header::CONTENT_TYPE, "application/json")], stub.body)
}
