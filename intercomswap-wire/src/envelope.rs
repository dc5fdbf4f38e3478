//! The signed swap envelope and its canonical encoding.
//!
//! Every message on the sidechannel bus is an [`Envelope`]. Peers must
//! produce bitwise-identical encodings of the unsigned form, so the
//! canonical encoding is JSON with lexicographically sorted keys, no
//! whitespace, and integers restricted to the interoperable 2^53 range;
//! amounts that may exceed that range travel as decimal strings. The
//! envelope id is the SHA-256 of that encoding, and the Ed25519 signature
//! is made over the same bytes.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hex::{DisplayHex, FromHex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::WireError;
use crate::kinds::Kind;
use crate::{APP_HASH_DOMAIN, WIRE_VERSION};

/// Largest integer that round-trips through every peer's JSON stack.
const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// A message on the sidechannel bus.
///
/// `signer` and `sig` are absent on the unsigned form; the signature covers
/// the canonical encoding of all other fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
	pub v: u8,
	pub kind: Kind,
	pub trade_id: String,
	pub ts_ms: u64,
	pub body: Value,
	/// 32-byte Ed25519 verifying key, lower hex.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub signer: Option<String>,
	/// 64-byte Ed25519 signature, lower hex.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sig: Option<String>,
}

/// Builds the unsigned form of an envelope.
///
/// The trade id must be 1–128 characters drawn from `[A-Za-z0-9_.:-]` and
/// the body must be a JSON object.
pub fn build_unsigned(
	kind: Kind, trade_id: &str, ts_ms: u64, body: Value,
) -> Result<Envelope, WireError> {
	if !is_valid_trade_id(trade_id) {
		return Err(WireError::MalformedEnvelope(format!("invalid trade_id: {:?}", trade_id)));
	}
	if !body.is_object() {
		return Err(WireError::MalformedEnvelope("body must be a JSON object".to_string()));
	}
	Ok(Envelope {
		v: WIRE_VERSION,
		kind,
		trade_id: trade_id.to_string(),
		ts_ms,
		body,
		signer: None,
		sig: None,
	})
}

/// Returns whether `trade_id` matches `[A-Za-z0-9_.:-]{1,128}`.
pub fn is_valid_trade_id(trade_id: &str) -> bool {
	!trade_id.is_empty()
		&& trade_id.len() <= 128
		&& trade_id
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-'))
}

/// Serializes a JSON value canonically: object keys sorted lexicographically
/// at every level, no whitespace, integers only.
pub fn canonical_json(value: &Value) -> Result<String, WireError> {
	let mut out = String::new();
	write_canonical(value, &mut out)?;
	Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), WireError> {
	match value {
		Value::Null => out.push_str("null"),
		Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
		Value::Number(n) => {
			let i = n.as_i64().ok_or_else(|| {
				WireError::CanonicalEncoding(format!("non-integer JSON number: {}", n))
			})?;
			if !(-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&i) {
				return Err(WireError::CanonicalEncoding(format!(
					"integer {} outside the interoperable 2^53 range; use a decimal string",
					i
				)));
			}
			out.push_str(&i.to_string());
		},
		Value::String(s) => {
			let escaped = serde_json::to_string(s).map_err(|e| {
				WireError::CanonicalEncoding(format!("string encoding failed: {}", e))
			})?;
			out.push_str(&escaped);
		},
		Value::Array(items) => {
			out.push('[');
			for (i, item) in items.iter().enumerate() {
				if i > 0 {
					out.push(',');
				}
				write_canonical(item, out)?;
			}
			out.push(']');
		},
		Value::Object(map) => {
			let mut keys: Vec<&String> = map.keys().collect();
			keys.sort();
			out.push('{');
			for (i, key) in keys.iter().enumerate() {
				if i > 0 {
					out.push(',');
				}
				let escaped = serde_json::to_string(key).map_err(|e| {
					WireError::CanonicalEncoding(format!("key encoding failed: {}", e))
				})?;
				out.push_str(&escaped);
				out.push(':');
				// unwrap safety: the key was taken from this map.
				write_canonical(map.get(*key).unwrap(), out)?;
			}
			out.push('}');
		},
	}
	Ok(())
}

fn unsigned_value(env: &Envelope) -> Value {
	serde_json::json!({
		"v": env.v,
		"kind": env.kind.as_str(),
		"trade_id": env.trade_id,
		"ts_ms": env.ts_ms,
		"body": env.body,
	})
}

/// Canonical encoding of the unsigned form (all fields except `signer` and
/// `sig`). Identical for the signed and unsigned variants of one envelope.
pub fn canonical_unsigned_json(env: &Envelope) -> Result<String, WireError> {
	canonical_json(&unsigned_value(env))
}

/// SHA-256 over the canonical unsigned encoding.
pub fn hash_unsigned(env: &Envelope) -> Result<[u8; 32], WireError> {
	let encoded = canonical_unsigned_json(env)?;
	let mut hasher = Sha256::new();
	hasher.update(encoded.as_bytes());
	Ok(hasher.finalize().into())
}

/// The envelope id: lower-hex SHA-256 of the canonical unsigned encoding.
pub fn envelope_id(env: &Envelope) -> Result<String, WireError> {
	Ok(hash_unsigned(env)?.to_lower_hex_string())
}

/// Stable hash over a TERMS envelope, used by ACCEPT to commit to the
/// exact terms it answers.
pub fn hash_terms(env: &Envelope) -> Result<[u8; 32], WireError> {
	if env.kind != Kind::Terms {
		return Err(WireError::MalformedEnvelope(format!(
			"hash_terms over {} envelope",
			env.kind.as_str()
		)));
	}
	hash_unsigned(env)
}

/// Signs the canonical unsigned encoding, filling `signer` and `sig`.
pub fn sign(env: &Envelope, keypair: &SigningKey) -> Result<Envelope, WireError> {
	let encoded = canonical_unsigned_json(env)?;
	let signature = keypair.sign(encoded.as_bytes());
	let mut signed = env.clone();
	signed.signer = Some(keypair.verifying_key().to_bytes().to_lower_hex_string());
	signed.sig = Some(signature.to_bytes().to_lower_hex_string());
	Ok(signed)
}

/// Verifies version, trade id, and the Ed25519 signature over the canonical
/// unsigned encoding.
pub fn verify(env: &Envelope) -> Result<(), WireError> {
	if env.v != WIRE_VERSION {
		return Err(WireError::MalformedEnvelope(format!("unsupported version {}", env.v)));
	}
	if !is_valid_trade_id(&env.trade_id) {
		return Err(WireError::MalformedEnvelope(format!("invalid trade_id: {:?}", env.trade_id)));
	}
	let signer_hex = env
		.signer
		.as_deref()
		.ok_or_else(|| WireError::SignatureInvalid("missing signer".to_string()))?;
	let sig_hex = env
		.sig
		.as_deref()
		.ok_or_else(|| WireError::SignatureInvalid("missing sig".to_string()))?;

	let signer_bytes = <[u8; 32]>::from_hex(signer_hex)
		.map_err(|e| WireError::SignatureInvalid(format!("signer is not 32-byte hex: {}", e)))?;
	let sig_bytes = <[u8; 64]>::from_hex(sig_hex)
		.map_err(|e| WireError::SignatureInvalid(format!("sig is not 64-byte hex: {}", e)))?;

	let verifying_key = VerifyingKey::from_bytes(&signer_bytes)
		.map_err(|e| WireError::SignatureInvalid(format!("bad signer key: {}", e)))?;
	let signature = Signature::from_bytes(&sig_bytes);

	let encoded = canonical_unsigned_json(env)?;
	verifying_key
		.verify(encoded.as_bytes(), &signature)
		.map_err(|e| WireError::SignatureInvalid(format!("signature check failed: {}", e)))
}

/// Derives the application hash binding envelopes to one escrow program
/// deployment: lower-hex SHA-256 of `"intercomswap" || program_id_base58`.
pub fn app_hash(solana_program_id_base58: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(APP_HASH_DOMAIN.as_bytes());
	hasher.update(solana_program_id_base58.as_bytes());
	let digest: [u8; 32] = hasher.finalize().into();
	digest.to_lower_hex_string()
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn test_keypair() -> SigningKey {
		SigningKey::from_bytes(&[7u8; 32])
	}

	fn sample_envelope() -> Envelope {
		build_unsigned(
			Kind::Status,
			"svc:demo:1",
			1_700_000_000_000,
			json!({"state": "init", "note": "waiting_terms"}),
		)
		.unwrap()
	}

	#[test]
	fn sign_verify_round_trip() {
		let env = sample_envelope();
		let signed = sign(&env, &test_keypair()).unwrap();
		verify(&signed).unwrap();

		// Signature fields are excluded from the envelope id.
		assert_eq!(hash_unsigned(&signed).unwrap(), hash_unsigned(&env).unwrap());
		assert_eq!(envelope_id(&signed).unwrap(), envelope_id(&env).unwrap());
	}

	#[test]
	fn tampered_envelope_fails_verification() {
		let env = sample_envelope();
		let mut signed = sign(&env, &test_keypair()).unwrap();
		signed.body = json!({"state": "init", "note": "changed"});
		assert!(matches!(verify(&signed), Err(WireError::SignatureInvalid(_))));

		let mut wrong_signer = sign(&env, &test_keypair()).unwrap();
		wrong_signer.signer =
			Some(SigningKey::from_bytes(&[9u8; 32]).verifying_key().to_bytes().to_lower_hex_string());
		assert!(verify(&wrong_signer).is_err());
	}

	#[test]
	fn canonical_encoding_is_key_order_independent() {
		let a = json!({"b": 1, "a": {"y": "2", "x": 3}});
		let b: Value =
			serde_json::from_str("{\"a\":{\"x\":3,\"y\":\"2\"},\"b\":1}").unwrap();
		assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
		assert_eq!(canonical_json(&a).unwrap(), "{\"a\":{\"x\":3,\"y\":\"2\"},\"b\":1}");
	}

	#[test]
	fn canonical_encoding_rejects_floats_and_large_integers() {
		assert!(canonical_json(&json!({"x": 1.5})).is_err());
		assert!(canonical_json(&json!({"x": 9_007_199_254_740_993u64})).is_err());
		assert!(canonical_json(&json!({"x": 9_007_199_254_740_991u64})).is_ok());
	}

	#[test]
	fn trade_id_charset_is_enforced() {
		assert!(is_valid_trade_id("svc:demo:1"));
		assert!(is_valid_trade_id("a"));
		assert!(is_valid_trade_id(&"x".repeat(128)));
		assert!(!is_valid_trade_id(""));
		assert!(!is_valid_trade_id(&"x".repeat(129)));
		assert!(!is_valid_trade_id("has space"));
		assert!(!is_valid_trade_id("emoji🚀"));

		assert!(build_unsigned(Kind::Rfq, "bad id", 0, json!({})).is_err());
	}

	#[test]
	fn app_hash_is_deterministic_and_program_bound() {
		let a = app_hash("EscrowProg1111111111111111111111111111111111");
		let b = app_hash("EscrowProg1111111111111111111111111111111111");
		let c = app_hash("OtherProg11111111111111111111111111111111111");
		assert_eq!(a, b);
		assert_ne!(a, c);
		assert_eq!(a.len(), 64);
	}

	#[test]
	fn hash_terms_rejects_non_terms_kind() {
		let env = sample_envelope();
		assert!(hash_terms(&env).is_err());
	}
}
