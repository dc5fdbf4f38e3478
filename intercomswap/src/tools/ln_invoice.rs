// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! `ln_invoice_create_and_post` — maker side of the Lightning leg.
//!
//! Asserts aggregate inbound liquidity can absorb the payment, creates the
//! invoice, journals it and announces it on the swap channel. Atomic from
//! the caller's view: on any failure nothing is announced.

use serde_json::{json, Value};

use intercomswap_wire::kinds::LnInvoiceBody;
use intercomswap_wire::Kind;

use crate::io::persist::types::{TradePatch, TradeState};
use crate::liquidity::{
	assert_liquidity, normalize_channels, summarize, LiquidityMode, LiquiditySide,
};
use crate::rpc::with_io_timeout;
use crate::service::{EngineContext, ExecuteOpts};
use crate::tools::args::Args;
use crate::tools::error::ToolError;
use crate::tools::{dry_run_result, sign_and_send};

const TOOL: &str = "ln_invoice_create_and_post";
const ALLOWED: &[&str] = &["trade_id", "expiry_sec"];

pub(crate) async fn handle(
	ctx: &EngineContext, raw: &Value, opts: &ExecuteOpts,
) -> Result<Value, ToolError> {
	let args = Args::new(TOOL, raw, &ctx.vault, ALLOWED)?;
	let trade_id = args.req_str("trade_id", 1, 128)?;
	let expiry_sec =
		args.opt_u64("expiry_sec", 60, 24 * 3600)?.unwrap_or(ctx.config.swap.invoice_expiry_sec);

	let trade = ctx
		.store
		.get_trade(&trade_id)?
		.ok_or_else(|| ToolError::precondition(format!("unknown trade {}", trade_id)))?;
	let swap_channel = trade.swap_channel.clone().ok_or_else(|| {
		ToolError::precondition(format!("trade {} has no swap channel", trade_id))
	})?;
	let btc_sats = trade
		.btc_sats
		.ok_or_else(|| ToolError::precondition(format!("trade {} has no btc_sats", trade_id)))?;
	let amount_msat = btc_sats
		.checked_mul(1000)
		.ok_or_else(|| ToolError::invalid(format!("btc_sats {} overflows msat", btc_sats)))?;

	let timeout_ms = ctx.config.swap.io_timeout_ms;

	// The invoice is worthless if our channels cannot receive it.
	let raw_channels =
		with_io_timeout("ln list_channels", timeout_ms, ctx.ln.list_channels()).await?;
	let summary = summarize(&normalize_channels(ctx.ln.backend(), &raw_channels));
	assert_liquidity(&summary, LiquidityMode::Aggregate, LiquiditySide::Inbound, btc_sats)?;

	if opts.dry_run {
		return Ok(dry_run_result(
			TOOL,
			json!({
				"trade_id": trade_id,
				"amount_msat": amount_msat,
				"inbound_total_sats": summary.total_inbound_sats,
			}),
		));
	}

	let created = with_io_timeout(
		"ln invoice",
		timeout_ms,
		ctx.ln.invoice(amount_msat, &trade_id, &format!("intercomswap {}", trade_id), expiry_sec),
	)
	.await?;
	let decoded =
		with_io_timeout("ln decodepay", timeout_ms, ctx.ln.decodepay(&created.bolt11)).await?;

	ctx.store.upsert_trade(
		&trade_id,
		&TradePatch {
			state: Some(TradeState::Invoice),
			ln_invoice_bolt11: Some(created.bolt11.clone()),
			ln_payment_hash_hex: Some(created.payment_hash.clone()),
			..Default::default()
		},
	)?;

	let body = LnInvoiceBody {
		bolt11: created.bolt11.clone(),
		payment_hash: created.payment_hash.clone(),
		amount_msat: amount_msat.to_string(),
		expires_at_unix: decoded.expires_at_unix,
	};
	let (_, envelope_id) = sign_and_send(
		ctx,
		&swap_channel,
		Kind::LnInvoice,
		&trade_id,
		serde_json::to_value(&body).map_err(|e| ToolError::internal(e.to_string()))?,
	)
	.await?;

	Ok(json!({
		"trade_id": trade_id,
		"bolt11": created.bolt11,
		"payment_hash": created.payment_hash,
		"amount_msat": amount_msat.to_string(),
		"expires_at_unix": decoded.expires_at_unix,
		"envelope_id": envelope_id,
	}))
}
