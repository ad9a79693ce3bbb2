use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure the client can surface.  Ledger and transport text is kept
/// verbatim so callers can diagnose rejections.
#[derive(Debug, Error)]
pub enum Error {
	/// The key file decrypted with the wrong password (or was tampered with).
	#[error("cannot decrypt key file {}: wrong password", path.display())]
	Authentication { path: PathBuf },

	/// The key file is missing, truncated, corrupt, or could not be written.
	#[error("key file {}: {message}", path.display())]
	Storage { path: PathBuf, message: String },

	/// Invalid mnemonic, derivation path, or address.
	#[error("key error: {0}")]
	Key(String),

	#[error("download of {url} failed: {message}")]
	Download { url: String, message: String },

	#[error("upload rejected: {0}")]
	Upload(String),

	#[error("instantiate rejected: {0}")]
	Instantiate(String),

	#[error("transaction rejected: {0}")]
	Transaction(String),

	#[error("query failed: {0}")]
	Query(String),

	#[error("faucet request failed: {0}")]
	Faucet(String),

	#[error("invalid configuration: {0}")]
	Config(String),

	#[error(transparent)]
	Transport(#[from] reqwest::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl Error {
	pub(crate) fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
		Self::Storage {
			path: path.into(),
			message: message.into(),
		}
	}
}
