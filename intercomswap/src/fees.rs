// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Fee snapshot from the on-chain config PDAs.
//!
//! Fees are never negotiated per trade: quotes and terms copy the numbers
//! read here, so downstream verifiers can test equality instead of
//! inequality.

use serde::Serialize;

use crate::rpc::RpcError;
use crate::sol::SolanaRpc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeSnapshot {
	pub platform_fee_bps: u32,
	pub platform_fee_collector: String,
	pub trade_fee_bps: u32,
	pub trade_fee_collector: String,
}

/// Reads the global platform config PDA and the per-collector trade config
/// PDA. Missing PDAs are permanent errors: an uninitialized deployment
/// cannot price trades.
pub async fn fee_snapshot(
	sol: &dyn SolanaRpc, trade_fee_collector: &str,
) -> Result<FeeSnapshot, RpcError> {
	let platform = sol
		.get_config_state()
		.await?
		.ok_or_else(|| RpcError::permanent("platform config PDA not initialized"))?;
	let trade = sol.get_trade_config_state(trade_fee_collector).await?.ok_or_else(|| {
		RpcError::permanent(format!(
			"trade config PDA not initialized for collector {}",
			trade_fee_collector
		))
	})?;
	Ok(FeeSnapshot {
		platform_fee_bps: platform.fee_bps,
		platform_fee_collector: platform.fee_collector,
		trade_fee_bps: trade.fee_bps,
		trade_fee_collector: trade.fee_collector,
	})
}
