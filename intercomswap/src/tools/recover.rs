// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Operator-driven recovery over journaled trades.
//!
//! `swaprecover_claim` redeems an escrow whose LN leg already settled;
//! `swaprecover_refund` returns funds once the timelock passed. Both
//! re-read on-chain state and validate the local signer's role before
//! moving anything. Recovery does not depend on the swap channel still
//! existing; a refund announcement is sent only if we still happen to be
//! in the channel.

use serde_json::{json, Value};

use intercomswap_wire::kinds::SolRefundedBody;
use intercomswap_wire::Kind;

use crate::io::persist::types::{TradePatch, TradeRecord, TradeState};
use crate::rpc::with_io_timeout;
use crate::service::{EngineContext, ExecuteOpts};
use crate::sol::EscrowStatus;
use crate::tools::args::Args;
use crate::tools::error::ToolError;
use crate::tools::{dry_run_result, sign_and_send};
use crate::util::now_unix;

const CLAIM_TOOL: &str = "swaprecover_claim";
const REFUND_TOOL: &str = "swaprecover_refund";
const ALLOWED: &[&str] = &["trade_id", "payment_hash"];

fn resolve_trade(
	ctx: &EngineContext, tool: &str, trade_id: Option<String>, payment_hash: Option<String>,
) -> Result<TradeRecord, ToolError> {
	match (trade_id, payment_hash) {
		(Some(trade_id), None) => ctx
			.store
			.get_trade(&trade_id)?
			.ok_or_else(|| ToolError::precondition(format!("unknown trade {}", trade_id))),
		(None, Some(hash)) => ctx
			.store
			.get_trade_by_payment_hash(&hash)?
			.ok_or_else(|| ToolError::precondition(format!("no trade for payment hash {}", hash))),
		_ => Err(ToolError::invalid(format!(
			"{}: provide exactly one of trade_id or payment_hash",
			tool
		))),
	}
}

pub(crate) async fn handle_claim(
	ctx: &EngineContext, raw: &Value, opts: &ExecuteOpts,
) -> Result<Value, ToolError> {
	let args = Args::new(CLAIM_TOOL, raw, &ctx.vault, ALLOWED)?;
	let trade = resolve_trade(
		ctx,
		CLAIM_TOOL,
		args.opt_str("trade_id", 1, 128)?,
		args.opt_hex32("payment_hash")?,
	)?;
	let trade_id = trade.trade_id.clone();
	let payment_hash = trade.ln_payment_hash_hex.clone().ok_or_else(|| {
		ToolError::precondition(format!("trade {} has no payment hash", trade_id))
	})?;
	let timeout_ms = ctx.config.swap.io_timeout_ms;

	let preimage_hex = match trade.ln_preimage_hex.clone() {
		Some(preimage) => preimage,
		None => with_io_timeout(
			"ln preimage_get",
			timeout_ms,
			ctx.ln.preimage_get(&payment_hash),
		)
		.await?
		.ok_or_else(|| {
			ToolError::precondition(format!("no preimage known for trade {}", trade_id))
		})?,
	};

	let escrow = with_io_timeout(
		"sol get_escrow_state",
		timeout_ms,
		ctx.sol.get_escrow_state(&payment_hash),
	)
	.await?
	.ok_or_else(|| {
		ToolError::precondition(format!("no on-chain escrow for payment hash {}", payment_hash))
	})?;
	let local_signer = ctx.sol.local_signer();
	if escrow.recipient != local_signer {
		return Err(ToolError::unauthorized(format!(
			"escrow recipient is {}, local signer is {}",
			escrow.recipient, local_signer
		)));
	}
	if escrow.status != EscrowStatus::Active {
		return Err(ToolError::invariant(format!("escrow is already {:?}", escrow.status)));
	}

	if opts.dry_run {
		return Ok(dry_run_result(
			CLAIM_TOOL,
			json!({ "trade_id": trade_id, "payment_hash": payment_hash }),
		));
	}

	let tx = with_io_timeout(
		"sol build_claim_escrow_tx",
		timeout_ms,
		ctx.sol.build_claim_escrow_tx(&payment_hash, &preimage_hex),
	)
	.await?;
	let signature =
		with_io_timeout("sol send_raw_transaction", timeout_ms, ctx.sol.send_raw_transaction(&tx))
			.await?;
	with_io_timeout(
		"sol confirm_transaction",
		timeout_ms,
		ctx.sol.confirm_transaction(&signature),
	)
	.await?;

	ctx.store.upsert_trade(
		&trade_id,
		&TradePatch { state: Some(TradeState::Claimed), ..Default::default() },
	)?;
	ctx.locks.fill_for_trade(&trade_id)?;

	Ok(json!({ "trade_id": trade_id, "payment_hash": payment_hash, "tx_sig": signature }))
}

pub(crate) async fn handle_refund(
	ctx: &EngineContext, raw: &Value, opts: &ExecuteOpts,
) -> Result<Value, ToolError> {
	let args = Args::new(REFUND_TOOL, raw, &ctx.vault, ALLOWED)?;
	let trade = resolve_trade(
		ctx,
		REFUND_TOOL,
		args.opt_str("trade_id", 1, 128)?,
		args.opt_hex32("payment_hash")?,
	)?;
	let trade_id = trade.trade_id.clone();
	let payment_hash = trade.ln_payment_hash_hex.clone().ok_or_else(|| {
		ToolError::precondition(format!("trade {} has no payment hash", trade_id))
	})?;
	let timeout_ms = ctx.config.swap.io_timeout_ms;

	let escrow = with_io_timeout(
		"sol get_escrow_state",
		timeout_ms,
		ctx.sol.get_escrow_state(&payment_hash),
	)
	.await?
	.ok_or_else(|| {
		ToolError::precondition(format!("no on-chain escrow for payment hash {}", payment_hash))
	})?;
	let local_signer = ctx.sol.local_signer();
	if escrow.refund != local_signer {
		return Err(ToolError::unauthorized(format!(
			"escrow refund address is {}, local signer is {}",
			escrow.refund, local_signer
		)));
	}
	if escrow.status != EscrowStatus::Active {
		return Err(ToolError::invariant(format!("escrow is already {:?}", escrow.status)));
	}
	let now = now_unix();
	if now < escrow.refund_after_unix {
		return Err(ToolError::precondition(format!(
			"refund locked until {} (now {})",
			escrow.refund_after_unix, now
		)));
	}

	if opts.dry_run {
		return Ok(dry_run_result(
			REFUND_TOOL,
			json!({ "trade_id": trade_id, "payment_hash": payment_hash }),
		));
	}

	let tx = with_io_timeout(
		"sol build_refund_escrow_tx",
		timeout_ms,
		ctx.sol.build_refund_escrow_tx(&payment_hash),
	)
	.await?;
	let signature =
		with_io_timeout("sol send_raw_transaction", timeout_ms, ctx.sol.send_raw_transaction(&tx))
			.await?;
	with_io_timeout(
		"sol confirm_transaction",
		timeout_ms,
		ctx.sol.confirm_transaction(&signature),
	)
	.await?;

	ctx.store.upsert_trade(
		&trade_id,
		&TradePatch { state: Some(TradeState::Refunded), ..Default::default() },
	)?;
	ctx.locks.release_for_trade(&trade_id)?;

	// Best-effort courtesy announcement; the refund itself never depends
	// on the swap channel.
	if let Some(swap_channel) = trade.swap_channel.clone() {
		if ctx.session.subscriptions().contains(&swap_channel) {
			let body = SolRefundedBody {
				payment_hash: payment_hash.clone(),
				tx_sig: Some(signature.clone()),
				refunded_at_unix: now,
			};
			if let Ok(value) = serde_json::to_value(&body) {
				if let Err(e) =
					sign_and_send(ctx, &swap_channel, Kind::SolRefunded, &trade_id, value).await
				{
					log::warn!("refund announcement for {} failed: {}", trade_id, e);
				}
			}
		}
	}

	Ok(json!({ "trade_id": trade_id, "payment_hash": payment_hash, "tx_sig": signature }))
}
