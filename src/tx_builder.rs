use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::fee::StdFee;
use crate::msg::{BankMsg, Coin, CosmosMsg, StakingMsg};
use crate::wallet::SigningIdentity;

/// A message as it appears inside a legacy amino-JSON transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum TxMsg {
	#[serde(rename = "wasm/MsgStoreCode")]
	StoreCode(MsgStoreCode),
	#[serde(rename = "wasm/MsgInstantiateContract")]
	Instantiate(MsgInstantiateContract),
	#[serde(rename = "wasm/MsgExecuteContract")]
	Execute(MsgExecuteContract),
	#[serde(rename = "wasm/MsgMigrateContract")]
	Migrate(MsgMigrateContract),
	#[serde(rename = "wasm/MsgUpdateAdmin")]
	UpdateAdmin(MsgUpdateAdmin),
	#[serde(rename = "cosmos-sdk/MsgSend")]
	Send(MsgSend),
	#[serde(rename = "cosmos-sdk/MsgDelegate")]
	Delegate(MsgDelegate),
	#[serde(rename = "cosmos-sdk/MsgUndelegate")]
	Undelegate(MsgDelegate),
	#[serde(rename = "cosmos-sdk/MsgBeginRedelegate")]
	Redelegate(MsgBeginRedelegate),
	#[serde(rename = "cosmos-sdk/MsgWithdrawDelegationReward")]
	WithdrawReward(MsgWithdrawDelegationReward),
	#[serde(rename = "cosmos-sdk/MsgModifyWithdrawAddress")]
	SetWithdrawAddress(MsgSetWithdrawAddress),
}

impl TxMsg {
	/// Address that must sign for this message.
	pub fn signer(&self) -> &str {
		match self {
			Self::StoreCode(m) => &m.sender,
			Self::Instantiate(m) => &m.sender,
			Self::Execute(m) => &m.sender,
			Self::Migrate(m) => &m.sender,
			Self::UpdateAdmin(m) => &m.sender,
			Self::Send(m) => &m.from_address,
			Self::Delegate(m) | Self::Undelegate(m) => &m.delegator_address,
			Self::Redelegate(m) => &m.delegator_address,
			Self::WithdrawReward(m) => &m.delegator_address,
			Self::SetWithdrawAddress(m) => &m.delegator_address,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgStoreCode {
	pub sender: String,
	/// Base64 of the wasm binary.
	pub wasm_byte_code: String,
	pub source: String,
	pub builder: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgInstantiateContract {
	pub sender: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub admin: Option<String>,
	#[serde(with = "crate::msg::u64_string")]
	pub code_id: u64,
	pub label: String,
	pub init_msg: Value,
	pub init_funds: Vec<Coin>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgExecuteContract {
	pub sender: String,
	pub contract: String,
	pub msg: Value,
	pub sent_funds: Vec<Coin>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgMigrateContract {
	pub sender: String,
	pub contract: String,
	#[serde(with = "crate::msg::u64_string")]
	pub code_id: u64,
	pub msg: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUpdateAdmin {
	pub sender: String,
	pub new_admin: String,
	pub contract: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSend {
	pub from_address: String,
	pub to_address: String,
	pub amount: Vec<Coin>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgDelegate {
	pub delegator_address: String,
	pub validator_address: String,
	pub amount: Coin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgBeginRedelegate {
	pub delegator_address: String,
	pub validator_src_address: String,
	pub validator_dst_address: String,
	pub amount: Coin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgWithdrawDelegationReward {
	pub delegator_address: String,
	pub validator_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSetWithdrawAddress {
	pub delegator_address: String,
	pub withdraw_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKey {
	#[serde(rename = "type")]
	pub type_: String,
	pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdSignature {
	pub pub_key: PubKey,
	pub signature: String,
}

/// A signed transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdTx {
	pub msg: Vec<TxMsg>,
	pub fee: StdFee,
	pub signatures: Vec<StdSignature>,
	pub memo: String,
}

/// Chain position of the signer at signing time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerData {
	pub chain_id: String,
	pub account_number: u64,
	pub sequence: u64,
}

// -- Message builders --

/// Metadata recorded alongside uploaded code.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UploadMeta {
	pub source: String,
	pub builder: String,
}

pub fn store_code(sender: &str, wasm: &[u8], meta: &UploadMeta) -> TxMsg {
	TxMsg::StoreCode(MsgStoreCode {
		sender: sender.to_owned(),
		wasm_byte_code: BASE64.encode(wasm),
		source: meta.source.clone(),
		builder: meta.builder.clone(),
	})
}

pub fn instantiate(
	sender: &str,
	code_id: u64,
	init_msg: Value,
	label: &str,
	admin: Option<&str>,
	funds: &[Coin],
) -> TxMsg {
	TxMsg::Instantiate(MsgInstantiateContract {
		sender: sender.to_owned(),
		admin: admin.map(str::to_owned),
		code_id,
		label: label.to_owned(),
		init_msg,
		init_funds: funds.to_vec(),
	})
}

pub fn execute(sender: &str, contract: &str, msg: Value, funds: &[Coin]) -> TxMsg {
	TxMsg::Execute(MsgExecuteContract {
		sender: sender.to_owned(),
		contract: contract.to_owned(),
		msg,
		sent_funds: funds.to_vec(),
	})
}

pub fn migrate(sender: &str, contract: &str, code_id: u64, msg: Value) -> TxMsg {
	TxMsg::Migrate(MsgMigrateContract {
		sender: sender.to_owned(),
		contract: contract.to_owned(),
		code_id,
		msg,
	})
}

pub fn update_admin(sender: &str, contract: &str, new_admin: &str) -> TxMsg {
	TxMsg::UpdateAdmin(MsgUpdateAdmin {
		sender: sender.to_owned(),
		new_admin: new_admin.to_owned(),
		contract: contract.to_owned(),
	})
}

/// Translate a ledger-level message into the transaction messages that
/// carry it.  A withdrawal to a different recipient needs two.
pub fn from_cosmos_msg(sender: &str, msg: &CosmosMsg) -> Result<Vec<TxMsg>> {
	let msgs = match msg {
		CosmosMsg::Bank(BankMsg::Send {
			from_address,
			to_address,
			amount,
		}) => {
			if from_address != sender {
				return Err(Error::Transaction(format!(
					"bank send from {from_address} cannot be signed by {sender}"
				)));
			}
			vec![TxMsg::Send(MsgSend {
				from_address: from_address.clone(),
				to_address: to_address.clone(),
				amount: amount.clone(),
			})]
		}
		CosmosMsg::Staking(StakingMsg::Delegate { validator, amount }) => {
			vec![TxMsg::Delegate(delegation(sender, validator, amount))]
		}
		CosmosMsg::Staking(StakingMsg::Undelegate { validator, amount }) => {
			vec![TxMsg::Undelegate(delegation(sender, validator, amount))]
		}
		CosmosMsg::Staking(StakingMsg::Redelegate {
			src_validator,
			dst_validator,
			amount,
		}) => vec![TxMsg::Redelegate(MsgBeginRedelegate {
			delegator_address: sender.to_owned(),
			validator_src_address: src_validator.clone(),
			validator_dst_address: dst_validator.clone(),
			amount: amount.clone(),
		})],
		CosmosMsg::Staking(StakingMsg::Withdraw {
			validator,
			recipient,
		}) => {
			let mut msgs = Vec::with_capacity(2);
			if let Some(recipient) = recipient {
				msgs.push(TxMsg::SetWithdrawAddress(MsgSetWithdrawAddress {
					delegator_address: sender.to_owned(),
					withdraw_address: recipient.clone(),
				}));
			}
			msgs.push(TxMsg::WithdrawReward(MsgWithdrawDelegationReward {
				delegator_address: sender.to_owned(),
				validator_address: validator.clone(),
			}));
			msgs
		}
	};
	Ok(msgs)
}

fn delegation(sender: &str, validator: &str, amount: &Coin) -> MsgDelegate {
	MsgDelegate {
		delegator_address: sender.to_owned(),
		validator_address: validator.to_owned(),
		amount: amount.clone(),
	}
}

// -- Signing --

/// Canonical amino-JSON sign bytes: keys sorted, no whitespace, and
/// `&`, `<`, `>` escaped as the node's JSON encoder writes them.
pub fn sign_bytes(msgs: &[TxMsg], fee: &StdFee, memo: &str, signer: &SignerData) -> Result<Vec<u8>> {
	let doc = serde_json::json!({
		"account_number": signer.account_number.to_string(),
		"chain_id": signer.chain_id,
		"fee": fee,
		"memo": memo,
		"msgs": msgs,
		"sequence": signer.sequence.to_string(),
	});
	Ok(escape_html(serde_json::to_vec(&doc)?))
}

/// These bytes only occur inside JSON strings, so escaping them in the
/// serialized output is safe.
fn escape_html(json: Vec<u8>) -> Vec<u8> {
	let mut out = Vec::with_capacity(json.len());
	for b in json {
		match b {
			b'&' => out.extend_from_slice(br"\u0026"),
			b'<' => out.extend_from_slice(br"\u003c"),
			b'>' => out.extend_from_slice(br"\u003e"),
			_ => out.push(b),
		}
	}
	out
}

/// Sign `msgs` with `identity` and assemble the broadcastable transaction.
pub fn sign_tx(
	identity: &SigningIdentity,
	msgs: Vec<TxMsg>,
	fee: StdFee,
	memo: &str,
	signer: &SignerData,
) -> Result<StdTx> {
	let bytes = sign_bytes(&msgs, &fee, memo, signer)?;
	let signature = identity.sign(&bytes);

	Ok(StdTx {
		msg: msgs,
		fee,
		signatures: vec![StdSignature {
			pub_key: PubKey {
				type_: "tendermint/PubKeySecp256k1".into(),
				value: BASE64.encode(identity.public_key()),
			},
			signature: BASE64.encode(signature),
		}],
		memo: memo.to_owned(),
	})
}
