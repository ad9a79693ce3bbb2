use bech32::{Bech32, Hrp};
use bip39::{Language, Mnemonic};
use hmac::{Hmac, Mac};
use k256::ecdsa::{signature::Signer, Signature, SigningKey};
use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, Scalar};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256, Sha512};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

type HmacSha512 = Hmac<Sha512>;

/// Entropy behind a freshly generated 12-word mnemonic.
const ENTROPY_BYTES: usize = 16;
const HARDENED: u32 = 0x8000_0000;

/// An account exposed by a signing identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountData {
	pub address: String,
	pub algo: &'static str,
	/// Compressed SEC1 public key (33 bytes).
	pub pubkey: Vec<u8>,
}

/// A secp256k1 key derived from a BIP-39 mnemonic along a fixed HD path,
/// bound to a bech32 address prefix.
#[derive(Clone)]
pub struct SigningIdentity {
	mnemonic: Zeroizing<String>,
	hd_path: String,
	prefix: String,
	key: SigningKey,
	address: String,
}

impl std::fmt::Debug for SigningIdentity {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SigningIdentity")
			.field("address", &self.address)
			.field("hd_path", &self.hd_path)
			.finish_non_exhaustive()
	}
}

impl SigningIdentity {
	/// Generate a new identity from 128 bits of OS randomness.
	pub fn generate(prefix: &str, hd_path: &str) -> Result<Self> {
		let entropy = Zeroizing::new(rand::random::<[u8; ENTROPY_BYTES]>());
		let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy[..])
			.map_err(|e| Error::Key(format!("cannot build mnemonic: {e}")))?;
		Self::from_mnemonic(&mnemonic.to_string(), prefix, hd_path)
	}

	pub fn from_mnemonic(phrase: &str, prefix: &str, hd_path: &str) -> Result<Self> {
		let mnemonic = Mnemonic::parse_in(Language::English, phrase)
			.map_err(|e| Error::Key(format!("invalid mnemonic: {e}")))?;
		let seed = Zeroizing::new(mnemonic.to_seed(""));
		let path = parse_hd_path(hd_path)?;
		let key = derive_key(&seed[..], &path)?;
		let address = address_from_pubkey(&compressed_pubkey(&key), prefix)?;

		Ok(Self {
			mnemonic: Zeroizing::new(mnemonic.to_string()),
			hd_path: hd_path.to_owned(),
			prefix: prefix.to_owned(),
			key,
			address,
		})
	}

	pub fn mnemonic(&self) -> &str {
		&self.mnemonic
	}

	pub fn hd_path(&self) -> &str {
		&self.hd_path
	}

	pub fn prefix(&self) -> &str {
		&self.prefix
	}

	pub fn address(&self) -> &str {
		&self.address
	}

	pub fn public_key(&self) -> Vec<u8> {
		compressed_pubkey(&self.key)
	}

	/// Accounts controlled by this identity.  Always exactly one.
	pub fn accounts(&self) -> Vec<AccountData> {
		vec![AccountData {
			address: self.address.clone(),
			algo: "secp256k1",
			pubkey: self.public_key(),
		}]
	}

	/// ECDSA over SHA-256 of `message`; 64-byte `r || s`, low-S normalized.
	pub fn sign(&self, message: &[u8]) -> [u8; 64] {
		let sig: Signature = self.key.sign(message);
		let mut out = [0u8; 64];
		out.copy_from_slice(&sig.to_bytes());
		out
	}
}

/// One step of an HD path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildIndex(u32);

impl ChildIndex {
	pub fn is_hardened(self) -> bool {
		self.0 & HARDENED != 0
	}
}

/// Parse `m/44'/118'/0'/0/0` into child indices.  Both `'` and `h` mark a
/// hardened step.
pub fn parse_hd_path(path: &str) -> Result<Vec<ChildIndex>> {
	let mut parts = path.split('/');
	if parts.next() != Some("m") {
		return Err(Error::Key(format!("hd path must start with m/: {path}")));
	}
	parts
		.map(|part| {
			let (digits, hardened) = match part.strip_suffix(|c: char| c == '\'' || c == 'h') {
				Some(d) => (d, true),
				None => (part, false),
			};
			let index: u32 = digits
				.parse()
				.map_err(|_| Error::Key(format!("invalid hd path component: {part}")))?;
			if index >= HARDENED {
				return Err(Error::Key(format!("hd path index out of range: {part}")));
			}
			Ok(ChildIndex(if hardened { index | HARDENED } else { index }))
		})
		.collect()
}

/// BIP-32 private key derivation from a seed.
fn derive_key(seed: &[u8], path: &[ChildIndex]) -> Result<SigningKey> {
	let (mut key, mut chain_code) = split_hmac(b"Bitcoin seed", &[seed])?;

	for index in path {
		let index_bytes = index.0.to_be_bytes();
		let (tweak, next_chain) = if index.is_hardened() {
			split_hmac(&chain_code[..], &[&[0u8][..], &key[..], &index_bytes[..]])?
		} else {
			let pubkey = compressed_pubkey(&signing_key(&key)?);
			split_hmac(&chain_code[..], &[&pubkey[..], &index_bytes[..]])?
		};

		let child = scalar(&key)? + scalar(&tweak)?;
		if bool::from(child.is_zero()) {
			return Err(Error::Key("derived key is zero".into()));
		}
		key.copy_from_slice(&child.to_bytes());
		chain_code = next_chain;
	}

	signing_key(&key)
}

type Half = Zeroizing<[u8; 32]>;

fn split_hmac(key: &[u8], data: &[&[u8]]) -> Result<(Half, Half)> {
	let mut mac = HmacSha512::new_from_slice(key)
		.map_err(|e| Error::Key(format!("hmac key: {e}")))?;
	for chunk in data {
		mac.update(chunk);
	}
	let out = mac.finalize().into_bytes();
	let mut left = Zeroizing::new([0u8; 32]);
	let mut right = Zeroizing::new([0u8; 32]);
	left.copy_from_slice(&out[..32]);
	right.copy_from_slice(&out[32..]);
	Ok((left, right))
}

fn scalar(bytes: &[u8; 32]) -> Result<Scalar> {
	Option::from(Scalar::from_repr(FieldBytes::clone_from_slice(bytes)))
		.ok_or_else(|| Error::Key("derived key out of curve order".into()))
}

fn signing_key(bytes: &[u8; 32]) -> Result<SigningKey> {
	SigningKey::from_slice(bytes).map_err(|e| Error::Key(format!("invalid secret key: {e}")))
}

fn compressed_pubkey(key: &SigningKey) -> Vec<u8> {
	key.verifying_key().to_sec1_bytes().to_vec()
}

/// bech32(prefix, RIPEMD160(SHA256(pubkey))).
pub fn address_from_pubkey(pubkey: &[u8], prefix: &str) -> Result<String> {
	let hrp = Hrp::parse(prefix).map_err(|e| Error::Key(format!("invalid prefix {prefix}: {e}")))?;
	let hash = Ripemd160::digest(Sha256::digest(pubkey));
	bech32::encode::<Bech32>(hrp, &hash).map_err(|e| Error::Key(format!("bech32: {e}")))
}

/// Check that `address` is a 20-byte bech32 address with the given prefix.
pub fn validate_address(address: &str, prefix: &str) -> Result<()> {
	let (hrp, data) =
		bech32::decode(address).map_err(|e| Error::Key(format!("invalid address {address}: {e}")))?;
	if hrp.as_str() != prefix {
		return Err(Error::Key(format!(
			"address {address} has prefix {}, expected {prefix}",
			hrp.as_str()
		)));
	}
	if data.len() != 20 {
		return Err(Error::Key(format!(
			"address {address} decodes to {} bytes, expected 20",
			data.len()
		)));
	}
	Ok(())
}
