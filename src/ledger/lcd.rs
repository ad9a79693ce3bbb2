use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::debug;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Account, BroadcastResponse, Ledger};
use crate::error::{Error, Result};
use crate::tx_builder::StdTx;

/// Client for the legacy LCD REST API of a CosmWasm node.
///
/// Accounts come from `/auth/accounts`, smart queries from
/// `/wasm/contract/{addr}/smart/{hex}` and transactions are posted to
/// `/txs` in `block` mode so the response already carries the logs.
pub struct LcdClient {
	url: String,
	http: reqwest::Client,
}

/// LCD responses wrap their payload as `{"height": .., "result": ..}`.
#[derive(Deserialize)]
struct Wrapped<T> {
	result: T,
}

#[derive(Deserialize)]
struct AccountEnvelope {
	value: Account,
}

#[derive(Deserialize)]
struct SmartResult {
	smart: String,
}

impl LcdClient {
	pub fn new(url: &str, timeout: Option<Duration>) -> Result<Self> {
		let mut builder = reqwest::Client::builder();
		if let Some(timeout) = timeout {
			builder = builder.timeout(timeout);
		}
		Ok(Self {
			url: url.trim_end_matches('/').to_owned(),
			http: builder.build()?,
		})
	}

	pub fn url(&self) -> &str {
		&self.url
	}

	/// GET `path`.  A non-success status is a query error carrying the
	/// node's text.
	async fn get(&self, path: &str) -> Result<Value> {
		let url = format!("{}{path}", self.url);
		debug!("GET {url}");
		let resp = self.http.get(&url).send().await?;
		let status = resp.status();
		let body = resp.text().await?;
		if !status.is_success() {
			return Err(Error::Query(format!("{status}: {}", error_text(&body))));
		}
		Ok(serde_json::from_str(&body)?)
	}
}

#[async_trait::async_trait]
impl Ledger for LcdClient {
	async fn account(&self, address: &str) -> Result<Option<Account>> {
		let body = self.get(&format!("/auth/accounts/{address}")).await?;
		let wrapped: Wrapped<AccountEnvelope> = serde_json::from_value(body)?;
		let account = wrapped.result.value;
		// Unknown accounts come back as an empty shell.
		if account.address.is_empty() {
			return Ok(None);
		}
		Ok(Some(account))
	}

	async fn query_smart(&self, contract: &str, query: &[u8]) -> Result<Value> {
		let path = format!(
			"/wasm/contract/{contract}/smart/{}?encoding=hex",
			hex::encode(query)
		);
		let body = self.get(&path).await?;
		let wrapped: Wrapped<SmartResult> = serde_json::from_value(body)
			.map_err(|e| Error::Query(format!("unexpected smart query response: {e}")))?;
		let raw = BASE64
			.decode(wrapped.result.smart)
			.map_err(|e| Error::Query(format!("smart query result is not base64: {e}")))?;
		serde_json::from_slice(&raw)
			.map_err(|e| Error::Query(format!("smart query result is not JSON: {e}")))
	}

	async fn broadcast(&self, tx: &StdTx) -> Result<BroadcastResponse> {
		let url = format!("{}/txs", self.url);
		debug!("POST {url} ({} msgs)", tx.msg.len());
		let body = json!({ "tx": tx, "mode": "block" });
		let resp = self.http.post(&url).json(&body).send().await?;
		let status = resp.status();
		let text = resp.text().await?;
		if !status.is_success() {
			return Err(Error::Transaction(format!("{status}: {}", error_text(&text))));
		}
		Ok(serde_json::from_str(&text)?)
	}
}

/// Pull the message out of `{"error": "..."}` bodies; fall back to the raw
/// body otherwise.
fn error_text(body: &str) -> String {
	serde_json::from_str::<Value>(body)
		.ok()
		.and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned))
		.unwrap_or_else(|| body.trim().to_owned())
}
