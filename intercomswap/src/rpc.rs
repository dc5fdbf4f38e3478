// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Shared error and timeout plumbing for the external capability traits.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::util::clamp_io_timeout_ms;

/// Error from an external service (Lightning node, Solana RPC, bus).
///
/// Carries a human-readable message and whether the failure looks
/// transient; the automation loop uses the flag to pick retry or abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
	pub message: String,
	pub transient: bool,
}

impl RpcError {
	pub fn transient(message: impl Into<String>) -> Self {
		Self { message: message.into(), transient: true }
	}

	pub fn permanent(message: impl Into<String>) -> Self {
		Self { message: message.into(), transient: false }
	}
}

impl fmt::Display for RpcError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.message)
	}
}

impl std::error::Error for RpcError {}

/// Runs `fut` under the clamped wall-clock bound, mapping elapsed time to a
/// transient [`RpcError`].
pub async fn with_io_timeout<T, F>(what: &str, timeout_ms: u64, fut: F) -> Result<T, RpcError>
where
	F: Future<Output = Result<T, RpcError>>,
{
	let bound = Duration::from_millis(clamp_io_timeout_ms(timeout_ms));
	match tokio::time::timeout(bound, fut).await {
		Ok(result) => result,
		Err(_) => Err(RpcError::transient(format!("{} timed out after {:?}", what, bound))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn timeout_maps_to_transient_error() {
		let err = with_io_timeout("slow op", 250, async {
			tokio::time::sleep(Duration::from_secs(5)).await;
			Ok::<_, RpcError>(())
		})
		.await
		.unwrap_err();
		assert!(err.transient);
		assert!(err.message.contains("slow op"));

		let ok = with_io_timeout("fast op", 250, async { Ok::<_, RpcError>(7u32) }).await;
		assert_eq!(ok, Ok(7));
	}
}
