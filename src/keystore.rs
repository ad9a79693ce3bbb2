use std::io::Write;
use std::path::Path;

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::wallet::SigningIdentity;

const RECORD_VERSION: u32 = 1;
const CIPHER: &str = "xchacha20poly1305";
const KDF: &str = "argon2id";
const SALT_SIZE: usize = 32;
const KEY_SIZE: usize = 32;

/// Upper bounds on the cost parameters accepted from a record on disk.
const MAX_M_COST: u32 = 1024 * 1024;
const MAX_T_COST: u32 = 16;
const MAX_P_COST: u32 = 16;

/// Argon2id cost parameters.  Stored in every record so a record written
/// with one setting still opens after the default changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
	/// Memory in KiB.
	pub m_cost: u32,
	pub t_cost: u32,
	pub p_cost: u32,
}

impl Default for KdfParams {
	fn default() -> Self {
		Self {
			m_cost: 19 * 1024,
			t_cost: 2,
			p_cost: 1,
		}
	}
}

#[derive(Serialize, Deserialize)]
struct KdfRecord {
	algorithm: String,
	#[serde(flatten)]
	params: KdfParams,
	salt: String,
}

/// On-disk envelope.  Everything but `ciphertext` is public.
#[derive(Serialize, Deserialize)]
struct EncryptedKeyRecord {
	version: u32,
	kdf: KdfRecord,
	cipher: String,
	nonce: String,
	ciphertext: String,
}

/// Decrypted payload.
#[derive(Serialize, Deserialize)]
struct KeyPayload {
	mnemonic: String,
	hd_path: String,
	prefix: String,
}

/// Loads or creates the password-protected signing identity for one
/// network (address prefix and HD path).
#[derive(Debug, Clone)]
pub struct KeyStore {
	prefix: String,
	hd_path: String,
	kdf: KdfParams,
}

impl KeyStore {
	pub fn new(prefix: impl Into<String>, hd_path: impl Into<String>) -> Self {
		Self {
			prefix: prefix.into(),
			hd_path: hd_path.into(),
			kdf: KdfParams::default(),
		}
	}

	/// Override the KDF cost used for newly written records.
	pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
		self.kdf = kdf;
		self
	}

	/// Decrypt the identity at `path`, or generate and persist a new one if
	/// nothing is there.  An existing file is never written on this path.
	pub fn load_or_create(&self, path: &Path, password: &str) -> Result<SigningIdentity> {
		match std::fs::read(path) {
			Ok(raw) => self.decrypt(path, &raw, password),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.create(path, password),
			Err(e) => Err(Error::storage(path, e.to_string())),
		}
	}

	/// Generate and persist a new identity.  If another writer created the
	/// file in the meantime, its record wins and is decrypted instead.
	fn create(&self, path: &Path, password: &str) -> Result<SigningIdentity> {
		let identity = SigningIdentity::generate(&self.prefix, &self.hd_path)?;
		let record = self.encrypt(&identity, password)?;
		match write_new(path, &record) {
			Ok(()) => {
				info!("created new key file {} for {}", path.display(), identity.address());
				Ok(identity)
			}
			Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
				warn!("key file {} appeared while creating it, loading that one", path.display());
				let raw = std::fs::read(path).map_err(|e| Error::storage(path, e.to_string()))?;
				self.decrypt(path, &raw, password)
			}
			Err(e) => Err(Error::storage(path, e.to_string())),
		}
	}

	/// Same load path as [`load_or_create`](Self::load_or_create), returning
	/// the recovery phrase for backup.
	pub fn recover_mnemonic(&self, path: &Path, password: &str) -> Result<String> {
		let identity = self.load_or_create(path, password)?;
		Ok(identity.mnemonic().to_owned())
	}

	/// Serialize `identity` encrypted under `password`.
	pub fn encrypt(&self, identity: &SigningIdentity, password: &str) -> Result<Vec<u8>> {
		let salt: [u8; SALT_SIZE] = rand::random();
		let nonce: [u8; 24] = rand::random();
		let key = derive_key(password, &salt, &self.kdf)?;

		let payload = Zeroizing::new(serde_json::to_vec(&KeyPayload {
			mnemonic: identity.mnemonic().to_owned(),
			hd_path: identity.hd_path().to_owned(),
			prefix: identity.prefix().to_owned(),
		})?);

		let cipher = XChaCha20Poly1305::new_from_slice(&key[..])
			.map_err(|e| Error::Key(format!("cipher key: {e}")))?;
		let ciphertext = cipher
			.encrypt(XNonce::from_slice(&nonce), payload.as_slice())
			.map_err(|_| Error::Key("encryption failed".into()))?;

		let record = EncryptedKeyRecord {
			version: RECORD_VERSION,
			kdf: KdfRecord {
				algorithm: KDF.into(),
				params: self.kdf,
				salt: hex::encode(salt),
			},
			cipher: CIPHER.into(),
			nonce: hex::encode(nonce),
			ciphertext: hex::encode(ciphertext),
		};
		Ok(serde_json::to_vec_pretty(&record)?)
	}

	/// Open a record read from `path`.  Malformed records are storage
	/// errors; a failed authentication tag is a wrong password.
	pub fn decrypt(&self, path: &Path, raw: &[u8], password: &str) -> Result<SigningIdentity> {
		let record: EncryptedKeyRecord = serde_json::from_slice(raw)
			.map_err(|e| Error::storage(path, format!("unreadable key record: {e}")))?;

		if record.version != RECORD_VERSION {
			return Err(Error::storage(
				path,
				format!("unsupported record version {}", record.version),
			));
		}
		if record.cipher != CIPHER || record.kdf.algorithm != KDF {
			return Err(Error::storage(
				path,
				format!("unsupported scheme {}/{}", record.kdf.algorithm, record.cipher),
			));
		}

		let salt = decode_field(path, "salt", &record.kdf.salt)?;
		let nonce = decode_field(path, "nonce", &record.nonce)?;
		let ciphertext = decode_field(path, "ciphertext", &record.ciphertext)?;
		if nonce.len() != 24 {
			return Err(Error::storage(path, "nonce must be 24 bytes"));
		}

		let params = &record.kdf.params;
		if !(1..=MAX_M_COST).contains(&params.m_cost)
			|| !(1..=MAX_T_COST).contains(&params.t_cost)
			|| !(1..=MAX_P_COST).contains(&params.p_cost)
		{
			return Err(Error::storage(
				path,
				format!(
					"kdf parameters out of range: m_cost={} t_cost={} p_cost={}",
					params.m_cost, params.t_cost, params.p_cost
				),
			));
		}

		let key = derive_key(password, &salt, params)
			.map_err(|e| Error::storage(path, e.to_string()))?;
		let cipher = XChaCha20Poly1305::new_from_slice(&key[..])
			.map_err(|e| Error::storage(path, e.to_string()))?;
		let payload = Zeroizing::new(
			cipher
				.decrypt(XNonce::from_slice(&nonce), ciphertext.as_slice())
				.map_err(|_| Error::Authentication {
					path: path.to_path_buf(),
				})?,
		);

		let payload: KeyPayload = serde_json::from_slice(&payload)
			.map_err(|e| Error::storage(path, format!("corrupt key payload: {e}")))?;
		let mnemonic = Zeroizing::new(payload.mnemonic);
		let identity = SigningIdentity::from_mnemonic(&mnemonic, &payload.prefix, &payload.hd_path)?;
		debug!("decrypted key file {}", path.display());
		Ok(identity)
	}
}

fn decode_field(path: &Path, name: &str, value: &str) -> Result<Vec<u8>> {
	hex::decode(value).map_err(|e| Error::storage(path, format!("bad {name}: {e}")))
}

fn derive_key(password: &str, salt: &[u8], params: &KdfParams) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
	let params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(KEY_SIZE))
		.map_err(|e| Error::Key(format!("kdf parameters: {e}")))?;
	let mut key = Zeroizing::new([0u8; KEY_SIZE]);
	Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
		.hash_password_into(password.as_bytes(), salt, &mut key[..])
		.map_err(|e| Error::Key(format!("kdf: {e}")))?;
	Ok(key)
}

/// Write `data` to a sibling temp file, sync it, then link it into place
/// at `path`.  A reader never sees a half-written record, and an existing
/// file is left alone (`AlreadyExists`).
fn write_new(path: &Path, data: &[u8]) -> std::io::Result<()> {
	let dir = match path.parent() {
		Some(p) if !p.as_os_str().is_empty() => p,
		_ => Path::new("."),
	};
	std::fs::create_dir_all(dir)?;

	let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
	tmp.write_all(data)?;
	tmp.as_file().sync_all()?;

	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;
		std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600))?;
	}

	tmp.persist_noclobber(path).map_err(|e| e.error)?;
	Ok(())
}
