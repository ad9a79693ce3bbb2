use std::time::Duration;

use log::{debug, info};
use serde_json::json;

use crate::config::FaucetField;
use crate::error::{Error, Result};

/// Asks a test-network faucet to credit an address.  One request, no retry.
pub struct FaucetClient {
	http: reqwest::Client,
}

impl FaucetClient {
	pub fn new(timeout: Option<Duration>) -> Result<Self> {
		let mut builder = reqwest::Client::builder();
		if let Some(timeout) = timeout {
			builder = builder.timeout(timeout);
		}
		Ok(Self {
			http: builder.build()?,
		})
	}

	/// POST `{"<field>": token, "address": address}` to `url`.  Any 2xx
	/// counts as success.
	pub async fn credit(&self, url: &str, address: &str, token: &str, field: FaucetField) -> Result<()> {
		let key = match field {
			FaucetField::Ticker => "ticker",
			FaucetField::Denom => "denom",
		};
		let body = json!({ key: token, "address": address });
		debug!("POST {url} {body}");

		let resp = self
			.http
			.post(url)
			.json(&body)
			.send()
			.await
			.map_err(|e| Error::Faucet(e.to_string()))?;
		let status = resp.status();
		if !status.is_success() {
			let text = resp.text().await.unwrap_or_default();
			return Err(Error::Faucet(format!("{status}: {}", text.trim())));
		}
		info!("faucet credited {token} to {address}");
		Ok(())
	}
}
