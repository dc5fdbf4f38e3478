// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use std::fmt;
use std::io;

use crate::liquidity::LiquidityShortfall;
use crate::locks::LockError;
use crate::rpc::RpcError;
use crate::verifier::VerifyError;

pub struct ToolError {
	// The error message containing a generic description of the error condition in English.
	// It is intended for a human audience only and should not be parsed to extract any
	// information programmatically; the automation loop keys off `code` and a small set of
	// stable phrases.
	pub message: String,

	// The error code uniquely identifying an error condition.
	// It is meant to be read and understood programmatically by code that detects/handles
	// errors by type.
	pub code: ToolErrorCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorCode {
	/// Malformed argument, schema failure, signature invalid, hash mismatch.
	/// Surfaced to the caller, never retried.
	InvalidRequest,

	/// Auto-approve missing or identity mismatch. Never retried.
	Unauthorized,

	/// Expired envelope, listing filled or in progress, fee mismatch vs
	/// on-chain, app-hash mismatch. Permanent: the automation loop aborts
	/// the stage.
	InvariantViolation,

	/// Insufficient liquidity or funds, unroutable invoice. Retried a
	/// bounded number of times with cooldown.
	Precondition,

	/// RPC unavailable, socket closed, container warming up. Retried
	/// transparently.
	Transient,

	/// Preimage/hash mismatch after an LN pay. Fatal integrity event.
	Integrity,

	/// Unexpected internal failure (store corruption, poisoned state).
	Internal,
}

impl ToolErrorCode {
	pub fn as_str(&self) -> &'static str {
		match self {
			ToolErrorCode::InvalidRequest => "invalid_request",
			ToolErrorCode::Unauthorized => "unauthorized",
			ToolErrorCode::InvariantViolation => "invariant_violation",
			ToolErrorCode::Precondition => "precondition",
			ToolErrorCode::Transient => "transient",
			ToolErrorCode::Integrity => "integrity",
			ToolErrorCode::Internal => "internal",
		}
	}

	/// Whether the automation loop must stop retrying on this code.
	pub fn is_permanent(&self) -> bool {
		matches!(
			self,
			ToolErrorCode::InvalidRequest
				| ToolErrorCode::Unauthorized
				| ToolErrorCode::InvariantViolation
				| ToolErrorCode::Integrity
		)
	}
}

impl ToolError {
	pub fn new(code: ToolErrorCode, message: impl Into<String>) -> Self {
		Self { code, message: message.into() }
	}

	pub fn invalid(message: impl Into<String>) -> Self {
		Self::new(ToolErrorCode::InvalidRequest, message)
	}

	pub fn unauthorized(message: impl Into<String>) -> Self {
		Self::new(ToolErrorCode::Unauthorized, message)
	}

	pub fn invariant(message: impl Into<String>) -> Self {
		Self::new(ToolErrorCode::InvariantViolation, message)
	}

	pub fn precondition(message: impl Into<String>) -> Self {
		Self::new(ToolErrorCode::Precondition, message)
	}

	pub fn transient(message: impl Into<String>) -> Self {
		Self::new(ToolErrorCode::Transient, message)
	}

	pub fn integrity(message: impl Into<String>) -> Self {
		Self::new(ToolErrorCode::Integrity, message)
	}

	pub fn internal(message: impl Into<String>) -> Self {
		Self::new(ToolErrorCode::Internal, message)
	}
}

impl fmt::Display for ToolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.message, self.code.as_str())
	}
}

impl fmt::Debug for ToolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ToolError {{ code: {}, message: {:?} }}", self.code.as_str(), self.message)
	}
}

impl std::error::Error for ToolError {}

impl From<RpcError> for ToolError {
	fn from(e: RpcError) -> Self {
		if e.transient {
			ToolError::transient(e.message)
		} else {
			ToolError::precondition(e.message)
		}
	}
}

impl From<LockError> for ToolError {
	fn from(e: LockError) -> Self {
		match e {
			LockError::Filled { .. } | LockError::InProgress { .. } => {
				ToolError::invariant(e.to_string())
			},
			LockError::Store(inner) => ToolError::internal(inner.to_string()),
		}
	}
}

impl From<io::Error> for ToolError {
	fn from(e: io::Error) -> Self {
		ToolError::internal(e.to_string())
	}
}

impl From<VerifyError> for ToolError {
	fn from(e: VerifyError) -> Self {
		ToolError::invariant(e.to_string())
	}
}

impl From<intercomswap_wire::WireError> for ToolError {
	fn from(e: intercomswap_wire::WireError) -> Self {
		ToolError::invalid(e.to_string())
	}
}

impl From<LiquidityShortfall> for ToolError {
	fn from(e: LiquidityShortfall) -> Self {
		ToolError::precondition(e.to_string())
	}
}
