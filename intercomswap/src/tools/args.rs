// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Uniform tool-argument validation.
//!
//! Every tool receives a plain JSON object. Keys outside the tool's
//! allowed set are rejected, strings are trimmed and pattern-checked,
//! integers are range-checked, and `sec:` handles are transparently
//! resolved from the vault in string positions.

use serde_json::{Map, Value};

use intercomswap_wire::validate::{is_base58, is_decimal_amount, is_hex_32b, is_hex_33b};

use crate::tools::error::ToolError;
use crate::vault::SecretsVault;

/// A tool's validated argument view.
pub struct Args<'a> {
	tool: &'a str,
	map: &'a Map<String, Value>,
	vault: &'a SecretsVault,
}

impl<'a> std::fmt::Debug for Args<'a> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Args")
			.field("tool", &self.tool)
			.field("map", &self.map)
			.finish()
	}
}

impl<'a> Args<'a> {
	/// Wraps the raw argument object, rejecting keys outside `allowed`.
	pub fn new(
		tool: &'a str, raw: &'a Value, vault: &'a SecretsVault, allowed: &[&str],
	) -> Result<Self, ToolError> {
		let map = raw.as_object().ok_or_else(|| {
			ToolError::invalid(format!("{}: arguments must be a JSON object", tool))
		})?;
		for key in map.keys() {
			if !allowed.contains(&key.as_str()) {
				return Err(ToolError::invalid(format!(
					"{}: unknown argument {:?} (allowed: {})",
					tool,
					key,
					allowed.join(", ")
				)));
			}
		}
		Ok(Self { tool, map, vault })
	}

	fn err(&self, msg: String) -> ToolError {
		ToolError::invalid(format!("{}: {}", self.tool, msg))
	}

	/// Trimmed, vault-resolved string; `None` when absent or null.
	pub fn opt_str(&self, key: &str, min: usize, max: usize) -> Result<Option<String>, ToolError> {
		let value = match self.map.get(key) {
			None | Some(Value::Null) => return Ok(None),
			Some(v) => v,
		};
		let s = value
			.as_str()
			.ok_or_else(|| self.err(format!("{} must be a string", key)))?;
		let resolved = self
			.vault
			.resolve_str(s.trim())
			.map_err(|e| self.err(format!("{}: {}", key, e)))?;
		let trimmed = resolved.trim().to_string();
		if trimmed.len() < min || trimmed.len() > max {
			return Err(self.err(format!(
				"{} length {} outside [{}, {}]",
				key,
				trimmed.len(),
				min,
				max
			)));
		}
		Ok(Some(trimmed))
	}

	pub fn req_str(&self, key: &str, min: usize, max: usize) -> Result<String, ToolError> {
		self.opt_str(key, min, max)?
			.ok_or_else(|| self.err(format!("missing required argument {}", key)))
	}

	pub fn opt_u64(&self, key: &str, min: u64, max: u64) -> Result<Option<u64>, ToolError> {
		let value = match self.map.get(key) {
			None | Some(Value::Null) => return Ok(None),
			Some(v) => v,
		};
		let n = value
			.as_u64()
			.ok_or_else(|| self.err(format!("{} must be a non-negative integer", key)))?;
		if n < min || n > max {
			return Err(self.err(format!("{} = {} outside [{}, {}]", key, n, min, max)));
		}
		Ok(Some(n))
	}

	pub fn req_u64(&self, key: &str, min: u64, max: u64) -> Result<u64, ToolError> {
		self.opt_u64(key, min, max)?
			.ok_or_else(|| self.err(format!("missing required argument {}", key)))
	}

	pub fn opt_u32(&self, key: &str, min: u32, max: u32) -> Result<Option<u32>, ToolError> {
		Ok(self.opt_u64(key, min as u64, max as u64)?.map(|n| n as u32))
	}

	pub fn opt_bool(&self, key: &str) -> Result<Option<bool>, ToolError> {
		match self.map.get(key) {
			None | Some(Value::Null) => Ok(None),
			Some(v) => {
				v.as_bool().map(Some).ok_or_else(|| self.err(format!("{} must be a boolean", key)))
			},
		}
	}

	/// Atomic amount: decimal-string integer, `^[0-9]+$`.
	pub fn req_amount(&self, key: &str) -> Result<String, ToolError> {
		let s = self.req_str(key, 1, 38)?;
		if !is_decimal_amount(&s) {
			return Err(self.err(format!("{} must match ^[0-9]+$", key)));
		}
		Ok(s)
	}

	/// 32-byte lower hex (`^[0-9a-f]{64}$`).
	pub fn req_hex32(&self, key: &str) -> Result<String, ToolError> {
		let s = self.req_str(key, 64, 64)?;
		if !is_hex_32b(&s) {
			return Err(self.err(format!("{} must match ^[0-9a-f]{{64}}$", key)));
		}
		Ok(s)
	}

	pub fn opt_hex32(&self, key: &str) -> Result<Option<String>, ToolError> {
		match self.opt_str(key, 64, 64)? {
			None => Ok(None),
			Some(s) if is_hex_32b(&s) => Ok(Some(s)),
			Some(_) => Err(self.err(format!("{} must match ^[0-9a-f]{{64}}$", key))),
		}
	}

	/// 33-byte lower hex (`^[0-9a-f]{66}$`), i.e. an LN node id.
	pub fn req_hex33(&self, key: &str) -> Result<String, ToolError> {
		let s = self.req_str(key, 66, 66)?;
		if !is_hex_33b(&s) {
			return Err(self.err(format!("{} must match ^[0-9a-f]{{66}}$", key)));
		}
		Ok(s)
	}

	/// Strict bitcoin-alphabet base58.
	pub fn req_base58(&self, key: &str) -> Result<String, ToolError> {
		let s = self.req_str(key, 1, 64)?;
		if !is_base58(&s) {
			return Err(self.err(format!("{} must be base58", key)));
		}
		Ok(s)
	}

	pub fn opt_base58(&self, key: &str) -> Result<Option<String>, ToolError> {
		match self.opt_str(key, 1, 64)? {
			None => Ok(None),
			Some(s) if is_base58(&s) => Ok(Some(s)),
			Some(_) => Err(self.err(format!("{} must be base58", key))),
		}
	}

	/// Raw JSON value passthrough (arrays, nested objects).
	pub fn opt_value(&self, key: &str) -> Option<&Value> {
		match self.map.get(key) {
			None | Some(Value::Null) => None,
			Some(v) => Some(v),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn vault() -> SecretsVault {
		SecretsVault::new()
	}

	#[test]
	fn rejects_unknown_keys() {
		let vault = vault();
		let raw = json!({"a": 1, "rogue": 2});
		let err = Args::new("demo_tool", &raw, &vault, &["a"]).unwrap_err();
		assert!(err.message.contains("rogue"));
		assert!(err.message.contains("demo_tool"));
	}

	#[test]
	fn string_trim_bounds_and_patterns() {
		let vault = vault();
		let raw = json!({
			"name": "  padded  ",
			"amount": "50000000",
			"hash": "aa".repeat(32),
			"addr": "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB",
		});
		let args =
			Args::new("demo", &raw, &vault, &["name", "amount", "hash", "addr"]).unwrap();
		assert_eq!(args.req_str("name", 1, 16).unwrap(), "padded");
		assert_eq!(args.req_amount("amount").unwrap(), "50000000");
		assert_eq!(args.req_hex32("hash").unwrap(), "aa".repeat(32));
		args.req_base58("addr").unwrap();
		assert!(args.req_str("name", 10, 16).is_err());
		assert!(args.req_str("missing", 1, 16).is_err());
	}

	#[test]
	fn integer_ranges() {
		let vault = vault();
		let raw = json!({"sats": 50000, "neg": -1, "float": 1.5});
		let args = Args::new("demo", &raw, &vault, &["sats", "neg", "float"]).unwrap();
		assert_eq!(args.req_u64("sats", 1, 1_000_000).unwrap(), 50_000);
		assert!(args.req_u64("sats", 100_000, 1_000_000).is_err());
		assert!(args.req_u64("neg", 0, 10).is_err());
		assert!(args.req_u64("float", 0, 10).is_err());
		assert_eq!(args.opt_u64("absent", 0, 10).unwrap(), None);
	}

	#[test]
	fn resolves_secret_handles_in_string_positions() {
		let vault = vault();
		let handle = vault.put("resolved-value", json!({}));
		let raw = json!({"payload": handle});
		let args = Args::new("demo", &raw, &vault, &["payload"]).unwrap();
		assert_eq!(args.req_str("payload", 1, 64).unwrap(), "resolved-value");

		let raw = json!({"payload": "sec:doesnotexist"});
		let args = Args::new("demo", &raw, &vault, &["payload"]).unwrap();
		assert!(args.req_str("payload", 1, 64).is_err());
	}

	#[test]
	fn rejects_bad_amounts_and_hex() {
		let vault = vault();
		let raw = json!({"amount": "12.5", "hash": "zz".repeat(32)});
		let args = Args::new("demo", &raw, &vault, &["amount", "hash"]).unwrap();
		assert!(args.req_amount("amount").is_err());
		assert!(args.req_hex32("hash").is_err());
	}
}
