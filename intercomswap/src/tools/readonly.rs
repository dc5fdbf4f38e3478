// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Read-only tools: environment, sidechannel state, on-chain reads and
//! receipts listings. None of these mutate anything, so they run without
//! the auto-approve gate.

use serde_json::{json, Value};

use crate::fees::fee_snapshot;
use crate::rpc::with_io_timeout;
use crate::service::EngineContext;
use crate::tools::args::Args;
use crate::tools::error::ToolError;
use crate::util::now_unix;

pub(crate) async fn handle_env_get(ctx: &EngineContext, raw: &Value) -> Result<Value, ToolError> {
	Args::new("env_get", raw, &ctx.vault, &[])?;
	Ok(json!({
		"pair": intercomswap_wire::PAIR,
		"program_id": ctx.sol.program_id(),
		"mint": ctx.config.solana.mint,
		"app_hash": intercomswap_wire::envelope::app_hash(&ctx.sol.program_id()),
		"channels": ctx.config.sidechannel.channels,
		"ln_backend": ctx.ln.backend(),
		"trace_enabled": ctx.trace.enabled(),
		"trace": ctx.trace.snapshot(),
	}))
}

pub(crate) async fn handle_sc_info(ctx: &EngineContext, raw: &Value) -> Result<Value, ToolError> {
	Args::new("sc_info", raw, &ctx.vault, &[])?;
	let peer = with_io_timeout(
		"sidechannel info",
		ctx.config.swap.io_timeout_ms,
		ctx.session.local_peer(),
	)
	.await?;
	Ok(json!({
		"peer": peer,
		"subscriptions": ctx.session.subscriptions(),
		"last_seq": ctx.session.last_seq(),
	}))
}

pub(crate) async fn handle_sol_escrow_get(
	ctx: &EngineContext, raw: &Value,
) -> Result<Value, ToolError> {
	let args = Args::new("sol_escrow_get", raw, &ctx.vault, &["payment_hash"])?;
	let payment_hash = args.req_hex32("payment_hash")?;
	let escrow = with_io_timeout(
		"sol get_escrow_state",
		ctx.config.swap.io_timeout_ms,
		ctx.sol.get_escrow_state(&payment_hash),
	)
	.await?;
	let (escrow_pda, vault_ata) = with_io_timeout(
		"sol derive_escrow_pda",
		ctx.config.swap.io_timeout_ms,
		ctx.sol.derive_escrow_pda(&payment_hash),
	)
	.await?;
	Ok(json!({
		"payment_hash": payment_hash,
		"escrow_pda": escrow_pda,
		"vault_ata": vault_ata,
		"state": escrow,
	}))
}

pub(crate) async fn handle_sol_config_get(
	ctx: &EngineContext, raw: &Value,
) -> Result<Value, ToolError> {
	let args = Args::new("sol_config_get", raw, &ctx.vault, &["trade_fee_collector"])?;
	let collector = match args.opt_base58("trade_fee_collector")? {
		Some(collector) => collector,
		None => ctx
			.config
			.solana
			.trade_fee_collector
			.clone()
			.unwrap_or_else(|| ctx.sol.local_signer()),
	};
	let fees = with_io_timeout(
		"fee snapshot",
		ctx.config.swap.io_timeout_ms,
		fee_snapshot(ctx.sol.as_ref(), &collector),
	)
	.await?;
	Ok(serde_json::to_value(&fees).map_err(|e| ToolError::internal(e.to_string()))?)
}

pub(crate) async fn handle_trades_list(
	ctx: &EngineContext, raw: &Value,
) -> Result<Value, ToolError> {
	let args = Args::new("receipts_trades_list", raw, &ctx.vault, &["limit", "offset"])?;
	let limit = args.opt_u64("limit", 1, 1000)?.unwrap_or(50) as u32;
	let offset = args.opt_u64("offset", 0, u32::MAX as u64)?.unwrap_or(0) as u32;
	let trades = ctx.store.list_trades(limit, offset)?;
	Ok(json!({ "trades": trades, "limit": limit, "offset": offset }))
}

pub(crate) async fn handle_trade_get(
	ctx: &EngineContext, raw: &Value,
) -> Result<Value, ToolError> {
	let args = Args::new("receipts_trade_get", raw, &ctx.vault, &["trade_id", "payment_hash"])?;
	let trade = match (args.opt_str("trade_id", 1, 128)?, args.opt_hex32("payment_hash")?) {
		(Some(trade_id), None) => ctx.store.get_trade(&trade_id)?,
		(None, Some(hash)) => ctx.store.get_trade_by_payment_hash(&hash)?,
		_ => {
			return Err(ToolError::invalid(
				"receipts_trade_get: provide exactly one of trade_id or payment_hash",
			));
		},
	};
	let events = match &trade {
		Some(trade) => ctx.store.list_events(&trade.trade_id)?,
		None => Vec::new(),
	};
	Ok(json!({ "trade": trade, "events": events }))
}

pub(crate) async fn handle_locks_list(
	ctx: &EngineContext, raw: &Value,
) -> Result<Value, ToolError> {
	let args = Args::new("receipts_locks_list", raw, &ctx.vault, &["trade_id"])?;
	let locks = match args.opt_str("trade_id", 1, 128)? {
		Some(trade_id) => ctx.store.locks_by_trade(&trade_id)?,
		None => ctx.store.list_locks()?,
	};
	Ok(json!({ "locks": locks }))
}

pub(crate) async fn handle_claims_list(
	ctx: &EngineContext, raw: &Value,
) -> Result<Value, ToolError> {
	Args::new("receipts_claims_list", raw, &ctx.vault, &[])?;
	let claims = ctx.store.list_open_claims()?;
	Ok(json!({ "claims": claims }))
}

pub(crate) async fn handle_refunds_list(
	ctx: &EngineContext, raw: &Value,
) -> Result<Value, ToolError> {
	let args = Args::new("receipts_refunds_list", raw, &ctx.vault, &["now_unix"])?;
	let now = args.opt_u64("now_unix", 1, u64::MAX)?.unwrap_or_else(now_unix);
	let refunds = ctx.store.list_open_refunds(now)?;
	Ok(json!({ "refunds": refunds, "now_unix": now }))
}
