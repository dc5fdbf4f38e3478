// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! In-memory secrets vault.
//!
//! Hot material (full envelopes, preimages) is bound to opaque `sec:<token>`
//! handles so it can travel through tool arguments without re-serialization.
//! The vault is process-local and never persisted.

use std::collections::HashMap;
use std::sync::Mutex;

use hex::DisplayHex;
use rand::RngCore;
use serde_json::Value;

use crate::util::now_ms;

const HANDLE_PREFIX: &str = "sec:";

struct SecretEntry {
	value: String,
	#[allow(dead_code)]
	metadata: Value,
	#[allow(dead_code)]
	created_at_ms: u64,
}

#[derive(Default)]
pub struct SecretsVault {
	entries: Mutex<HashMap<String, SecretEntry>>,
}

impl SecretsVault {
	pub fn new() -> Self {
		Self::default()
	}

	/// Stores a value and returns a fresh opaque handle for it.
	pub fn put(&self, value: impl Into<String>, metadata: Value) -> String {
		let mut token_bytes = [0u8; 16];
		rand::thread_rng().fill_bytes(&mut token_bytes);
		let handle = format!("{}{}", HANDLE_PREFIX, token_bytes.to_lower_hex_string());
		let entry =
			SecretEntry { value: value.into(), metadata, created_at_ms: now_ms() };
		self.entries.lock().expect("vault lock poisoned").insert(handle.clone(), entry);
		handle
	}

	/// Returns the value behind a handle, or an error message naming it.
	pub fn get(&self, handle: &str) -> Result<String, String> {
		self.entries
			.lock()
			.expect("vault lock poisoned")
			.get(handle)
			.map(|entry| entry.value.clone())
			.ok_or_else(|| format!("unknown secret handle {}", handle))
	}

	/// Transparently resolves a string argument: `sec:`-prefixed strings are
	/// looked up, everything else passes through unchanged.
	pub fn resolve_str(&self, value: &str) -> Result<String, String> {
		if value.starts_with(HANDLE_PREFIX) {
			self.get(value)
		} else {
			Ok(value.to_string())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn put_get_resolve() {
		let vault = SecretsVault::new();
		let handle = vault.put("s3cret-preimage", json!({"kind": "preimage"}));
		assert!(handle.starts_with("sec:"));
		assert_eq!(vault.get(&handle).unwrap(), "s3cret-preimage");
		assert_eq!(vault.resolve_str(&handle).unwrap(), "s3cret-preimage");
		assert_eq!(vault.resolve_str("plain").unwrap(), "plain");
		assert!(vault.get("sec:missing").is_err());
		assert!(vault.resolve_str("sec:missing").is_err());
	}

	#[test]
	fn handles_are_unique() {
		let vault = SecretsVault::new();
		let a = vault.put("x", json!({}));
		let b = vault.put("x", json!({}));
		assert_ne!(a, b);
	}
}
