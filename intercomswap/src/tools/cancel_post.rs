// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! `swap_cancel_post` — abort a trade before any USDT is locked.
//!
//! CANCEL is only safe pre-escrow: once SOL_ESCROW_CREATED exists the
//! maker's funds can only move by claim or post-timeout refund, so the
//! guard checks both the receipts state and the bus log.

use serde_json::{json, Value};

use intercomswap_wire::kinds::CancelBody;
use intercomswap_wire::Kind;

use crate::io::persist::types::{TradePatch, TradeState};
use crate::service::{EngineContext, ExecuteOpts};
use crate::tools::args::Args;
use crate::tools::error::ToolError;
use crate::tools::{dry_run_result, log_has_escrow_created, sign_and_send};

const TOOL: &str = "swap_cancel_post";
const ALLOWED: &[&str] = &["trade_id", "reason", "channel"];

pub(crate) async fn handle(
	ctx: &EngineContext, raw: &Value, opts: &ExecuteOpts,
) -> Result<Value, ToolError> {
	let args = Args::new(TOOL, raw, &ctx.vault, ALLOWED)?;
	let trade_id = args.req_str("trade_id", 1, 128)?;
	let reason = args.opt_str("reason", 1, 256)?;
	let channel_override = args.opt_str("channel", 1, 128)?;

	let trade = ctx.store.get_trade(&trade_id)?;
	if let Some(trade) = &trade {
		match trade.state {
			TradeState::Escrow | TradeState::LnPaid => {
				return Err(ToolError::invariant(format!(
					"cancel not allowed after escrow creation (trade {} is {})",
					trade_id,
					trade.state.as_str()
				)));
			},
			state if state.is_terminal() => {
				return Err(ToolError::invariant(format!(
					"trade {} is already terminal ({})",
					trade_id,
					state.as_str()
				)));
			},
			_ => {},
		}
	}
	// The receipts state can lag a crash; the bus log is the second witness.
	if log_has_escrow_created(ctx, &trade_id) {
		return Err(ToolError::invariant(format!(
			"cancel not allowed: SOL_ESCROW_CREATED observed for trade {}",
			trade_id
		)));
	}

	let channel = channel_override
		.or_else(|| trade.as_ref().and_then(|t| t.swap_channel.clone()))
		.ok_or_else(|| {
			ToolError::precondition(format!("trade {} has no channel to cancel on", trade_id))
		})?;

	if opts.dry_run {
		return Ok(dry_run_result(TOOL, json!({ "trade_id": trade_id, "channel": channel })));
	}

	let body = CancelBody { reason: reason.clone() };
	let (_, envelope_id) = sign_and_send(
		ctx,
		&channel,
		Kind::Cancel,
		&trade_id,
		serde_json::to_value(&body).map_err(|e| ToolError::internal(e.to_string()))?,
	)
	.await?;

	ctx.store.upsert_trade(
		&trade_id,
		&TradePatch {
			state: Some(TradeState::Canceled),
			last_error: reason,
			..Default::default()
		},
	)?;
	ctx.locks.release_for_trade(&trade_id)?;

	Ok(json!({ "trade_id": trade_id, "channel": channel, "envelope_id": envelope_id }))
}
