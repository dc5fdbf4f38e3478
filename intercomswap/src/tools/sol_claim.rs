// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! `sol_claim_and_post` — taker redeems the escrow with the preimage.

use serde_json::{json, Value};

use intercomswap_wire::kinds::SolClaimedBody;
use intercomswap_wire::Kind;

use crate::io::persist::types::{TradePatch, TradeState};
use crate::rpc::with_io_timeout;
use crate::service::{EngineContext, ExecuteOpts};
use crate::sol::EscrowStatus;
use crate::tools::args::Args;
use crate::tools::error::ToolError;
use crate::tools::{dry_run_result, sign_and_send};
use crate::util::now_unix;

const TOOL: &str = "sol_claim_and_post";
const ALLOWED: &[&str] = &["trade_id", "mint"];

pub(crate) async fn handle(
	ctx: &EngineContext, raw: &Value, opts: &ExecuteOpts,
) -> Result<Value, ToolError> {
	let args = Args::new(TOOL, raw, &ctx.vault, ALLOWED)?;
	let trade_id = args.req_str("trade_id", 1, 128)?;
	let mint = args.req_base58("mint")?;

	let trade = ctx
		.store
		.get_trade(&trade_id)?
		.ok_or_else(|| ToolError::precondition(format!("unknown trade {}", trade_id)))?;
	let payment_hash = trade.ln_payment_hash_hex.clone().ok_or_else(|| {
		ToolError::precondition(format!("trade {} has no payment hash", trade_id))
	})?;
	let timeout_ms = ctx.config.swap.io_timeout_ms;
	let preimage_hex = match trade.ln_preimage_hex.clone() {
		Some(preimage) => preimage,
		// A crash between pay and journal can lose the preimage locally;
		// the node still knows it.
		None => with_io_timeout(
			"ln preimage_get",
			timeout_ms,
			ctx.ln.preimage_get(&payment_hash),
		)
		.await?
		.ok_or_else(|| {
			ToolError::precondition(format!(
				"no preimage known for trade {} (payment hash {})",
				trade_id, payment_hash
			))
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
			"escrow pays out to {}, local signer is {}",
			escrow.recipient, local_signer
		)));
	}
	if escrow.mint != mint {
		return Err(ToolError::invariant(format!(
			"escrow mint {} does not match requested mint {}",
			escrow.mint, mint
		)));
	}
	if escrow.status != EscrowStatus::Active {
		return Err(ToolError::invariant(format!("escrow is already {:?}", escrow.status)));
	}

	if opts.dry_run {
		return Ok(dry_run_result(
			TOOL,
			json!({
				"trade_id": trade_id,
				"payment_hash": payment_hash,
				"net_amount": escrow.net_amount.to_string(),
			}),
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

	let body = SolClaimedBody {
		payment_hash: payment_hash.clone(),
		tx_sig: Some(signature.clone()),
		claimed_at_unix: now_unix(),
	};
	let envelope_id = match trade.swap_channel {
		Some(swap_channel) => {
			let (_, id) = sign_and_send(
				ctx,
				&swap_channel,
				Kind::SolClaimed,
				&trade_id,
				serde_json::to_value(&body).map_err(|e| ToolError::internal(e.to_string()))?,
			)
			.await?;
			Some(id)
		},
		None => None,
	};

	Ok(json!({
		"trade_id": trade_id,
		"payment_hash": payment_hash,
		"tx_sig": signature,
		"net_amount": escrow.net_amount.to_string(),
		"envelope_id": envelope_id,
	}))
}
