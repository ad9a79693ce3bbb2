use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::{FaucetOptions, NetworkOptions};
use crate::error::Result;
use crate::faucet::FaucetClient;
use crate::keystore::KeyStore;
use crate::ledger::Ledger;
use crate::session::LedgerSession;
use crate::wallet::SigningIdentity;

/// Entry point for one network profile: opens the key file and returns a
/// connected session.
pub struct Network {
	options: NetworkOptions,
	keystore: KeyStore,
}

impl Network {
	pub fn new(options: NetworkOptions) -> Result<Self> {
		options.validate()?;
		let keystore = KeyStore::new(&options.bech32_prefix, &options.hd_path);
		Ok(Self { options, keystore })
	}

	/// Replace the key store, e.g. to change the KDF cost.
	pub fn with_keystore(mut self, keystore: KeyStore) -> Self {
		self.keystore = keystore;
		self
	}

	pub fn options(&self) -> &NetworkOptions {
		&self.options
	}

	/// Load (or create) the key, connect to the LCD endpoint and, for an
	/// address the chain has never seen, ask the faucet for tokens.
	pub async fn setup(&self, password: &str, key_file: Option<&Path>) -> Result<LedgerSession> {
		let identity = self.load_identity(password, key_file)?;
		let session = LedgerSession::connect(identity, self.options.clone())?;
		self.ensure_funded(&session).await;
		Ok(session)
	}

	/// [`setup`](Self::setup) over a caller-supplied transport.
	pub async fn setup_with_ledger(
		&self,
		password: &str,
		key_file: Option<&Path>,
		ledger: Box<dyn Ledger>,
	) -> Result<LedgerSession> {
		let identity = self.load_identity(password, key_file)?;
		let session = LedgerSession::with_ledger(identity, self.options.clone(), ledger)?;
		self.ensure_funded(&session).await;
		Ok(session)
	}

	/// The recovery phrase behind the key file.  Creates the file if it does
	/// not exist yet.
	pub fn recover_mnemonic(&self, password: &str, key_file: Option<&Path>) -> Result<String> {
		let path = self.key_path(key_file)?;
		self.keystore.recover_mnemonic(&path, password)
	}

	fn load_identity(&self, password: &str, key_file: Option<&Path>) -> Result<SigningIdentity> {
		let path = self.key_path(key_file)?;
		self.keystore.load_or_create(&path, password)
	}

	fn key_path(&self, key_file: Option<&Path>) -> Result<PathBuf> {
		match key_file {
			Some(path) => Ok(path.to_path_buf()),
			None => self.options.default_key_file(),
		}
	}

	/// Best effort: failures are logged and the session stays usable.
	async fn ensure_funded(&self, session: &LedgerSession) {
		let Some(faucet) = &self.options.faucet else {
			return;
		};
		let address = session.sender_address();
		match session.get_account(None).await {
			Ok(Some(_)) => return,
			Ok(None) => {}
			Err(e) => {
				warn!("cannot look up account {address}: {e}");
				return;
			}
		}

		info!("getting {} from faucet for {address}", self.options.fee_token);
		if let Err(e) = self.hit_faucet(faucet, address).await {
			warn!("faucet credit for {address} failed: {e}");
		}
	}

	async fn hit_faucet(&self, faucet: &FaucetOptions, address: &str) -> Result<()> {
		FaucetClient::new(self.options.timeout())?
			.credit(&faucet.url, address, &faucet.token, faucet.field)
			.await
	}
}
