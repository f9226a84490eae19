//! Opaque MCP session-ID encryption (§4.8, §9 design notes): AES-256-GCM
//! over the upstream-chosen session id, nonce prepended to ciphertext and
//! base64-encoded. Grounded on the teacher's `http::sessionpersistence::aes`
//! module, generalized from a single key to a seed list so
//! `mcpSessionEncryptionSeed` rotation (current seed + fallbacks) can still
//! decrypt sessions minted under an older seed; encryption always uses the
//! first (current) key (§9 "Design Notes", verbatim).

use aws_lc_rs::aead::{Aad, Nonce, RandomizedNonceKey, AES_256_GCM};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
	#[error("invalid session encoding")]
	InvalidEncoding,
	#[error("encryption failed")]
	EncryptionFailed,
	#[error("no encryption seed configured")]
	NoSeed,
}

/// Each seed is SHA-256-hashed to derive a 32-byte AES-256-GCM key. `seeds`
/// mirrors the `mcpSessionEncryptionSeed` CLI flag: comma-separated, first
/// entry current, remainder decryption-only fallbacks.
#[derive(Debug)]
pub struct SessionEncoder {
	keys: Vec<RandomizedNonceKey>,
}

impl SessionEncoder {
	pub fn new(seeds: &[String]) -> Self {
		let keys = seeds
			.iter()
			.map(|seed| {
				let digest = Sha256::digest(seed.as_bytes());
				RandomizedNonceKey::new(&AES_256_GCM, &digest)
					.expect("a sha-256 digest is exactly the 32 bytes AES-256-GCM requires")
			})
			.collect();
		SessionEncoder { keys }
	}

	pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
		let key = self.keys.first().ok_or(CryptoError::NoSeed)?;
		let mut in_out = plaintext.as_bytes().to_vec();
		let nonce = key
			.seal_in_place_append_tag(Aad::empty(), &mut in_out)
			.map_err(|_| CryptoError::EncryptionFailed)?;
		let mut result = nonce.as_ref().to_vec();
		result.extend_from_slice(&in_out);
		Ok(STANDARD.encode(result))
	}

	/// Tries each configured seed in order, current first, and accepts the
	/// first one that authenticates.
	pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
		let data = STANDARD.decode(encoded).map_err(|_| CryptoError::InvalidEncoding)?;
		if data.len() < NONCE_LEN {
			return Err(CryptoError::InvalidEncoding);
		}
		let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
		for key in &self.keys {
			let Ok(nonce) = Nonce::try_assume_unique_for_key(nonce_bytes) else {
				continue;
			};
			let mut in_out = ciphertext.to_vec();
			if let Ok(plaintext) = key.open_in_place(nonce, Aad::empty(), &mut in_out) {
				return String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::InvalidEncoding);
			}
		}
		Err(CryptoError::InvalidEncoding)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_through_the_current_seed() {
		let enc = SessionEncoder::new(&["mcp".to_string()]);
		let token = enc.encrypt("upstream-session-id").unwrap();
		assert_eq!(enc.decrypt(&token).unwrap(), "upstream-session-id");
	}

	#[test]
	fn decrypts_under_a_rotated_fallback_seed() {
		let old = SessionEncoder::new(&["old-seed".to_string()]);
		let token = old.encrypt("session-42").unwrap();

		let rotated = SessionEncoder::new(&["new-seed".to_string(), "old-seed".to_string()]);
		assert_eq!(rotated.decrypt(&token).unwrap(), "session-42");
	}

	#[test]
	fn encryption_always_uses_the_current_seed_not_a_fallback() {
		let rotated = SessionEncoder::new(&["new-seed".to_string(), "old-seed".to_string()]);
		let token = rotated.encrypt("session-7").unwrap();

		let new_only = SessionEncoder::new(&["new-seed".to_string()]);
		assert_eq!(new_only.decrypt(&token).unwrap(), "session-7");
	}

	#[test]
	fn rejects_garbage_input() {
		let enc = SessionEncoder::new(&["mcp".to_string()]);
		assert!(enc.decrypt("not-base64!!!").is_err());
	}
}
