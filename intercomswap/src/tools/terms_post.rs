// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! `swap_terms_post` — maker publishes the full signed commitment.
//!
//! Fees come from the on-chain snapshot, the receiving node id from the
//! local Lightning node, and the refund address from the local Solana
//! signer; the taker's claim address arrives via QUOTE_ACCEPT.

use serde_json::{json, Value};

use intercomswap_wire::envelope::{app_hash, hash_terms};
use intercomswap_wire::kinds::TermsBody;
use intercomswap_wire::validate::validate_terms;
use intercomswap_wire::{Kind, PAIR, REFUND_WINDOW_MAX_SEC, REFUND_WINDOW_MIN_SEC};

use hex::DisplayHex;

use crate::fees::fee_snapshot;
use crate::io::persist::types::{TradePatch, TradeRole, TradeState};
use crate::rpc::with_io_timeout;
use crate::service::{EngineContext, ExecuteOpts};
use crate::tools::args::Args;
use crate::tools::error::ToolError;
use crate::tools::{dry_run_result, sign_and_send};
use crate::util::now_unix;

const TOOL: &str = "swap_terms_post";
const ALLOWED: &[&str] = &[
	"trade_id",
	"btc_sats",
	"usdt_amount",
	"sol_recipient",
	"ln_payer_peer",
	"refund_window_sec",
	"valid_until_unix",
];

pub(crate) async fn handle(
	ctx: &EngineContext, raw: &Value, opts: &ExecuteOpts,
) -> Result<Value, ToolError> {
	let args = Args::new(TOOL, raw, &ctx.vault, ALLOWED)?;
	let trade_id = args.req_str("trade_id", 1, 128)?;
	let btc_sats = args.req_u64("btc_sats", 1, u64::MAX / 1000)?;
	let usdt_amount = args.req_amount("usdt_amount")?;
	let sol_recipient = args.req_base58("sol_recipient")?;
	let ln_payer_peer = args.req_hex32("ln_payer_peer")?;
	let refund_window_sec = args
		.opt_u64("refund_window_sec", REFUND_WINDOW_MIN_SEC, REFUND_WINDOW_MAX_SEC)?
		.unwrap_or(ctx.config.swap.refund_window_sec);
	let valid_until_unix = args.opt_u64("valid_until_unix", 1, u64::MAX)?;

	let trade = ctx
		.store
		.get_trade(&trade_id)?
		.ok_or_else(|| ToolError::precondition(format!("unknown trade {}", trade_id)))?;
	let swap_channel = trade.swap_channel.ok_or_else(|| {
		ToolError::precondition(format!("trade {} has no swap channel yet", trade_id))
	})?;

	let timeout_ms = ctx.config.swap.io_timeout_ms;
	let info = with_io_timeout("ln get_info", timeout_ms, ctx.ln.get_info()).await?;
	let collector = ctx
		.config
		.solana
		.trade_fee_collector
		.clone()
		.unwrap_or_else(|| ctx.sol.local_signer());
	let fees =
		with_io_timeout("fee snapshot", timeout_ms, fee_snapshot(ctx.sol.as_ref(), &collector))
			.await?;

	let sol_refund_after_unix = now_unix() + refund_window_sec;
	let body = TermsBody {
		pair: PAIR.to_string(),
		btc_sats,
		usdt_amount: usdt_amount.clone(),
		sol_mint: ctx.config.solana.mint.clone(),
		sol_recipient: sol_recipient.clone(),
		sol_refund: ctx.sol.local_signer(),
		sol_refund_after_unix,
		ln_receiver_peer: info.node_id.clone(),
		ln_payer_peer: ln_payer_peer.clone(),
		platform_fee_bps: fees.platform_fee_bps,
		trade_fee_bps: fees.trade_fee_bps,
		platform_fee_collector: Some(fees.platform_fee_collector.clone()),
		trade_fee_collector: fees.trade_fee_collector.clone(),
		app_hash: app_hash(&ctx.sol.program_id()),
		terms_valid_until_unix: valid_until_unix,
	};
	validate_terms(&body)?;

	if opts.dry_run {
		return Ok(dry_run_result(
			TOOL,
			json!({
				"trade_id": trade_id,
				"swap_channel": swap_channel,
				"sol_refund_after_unix": sol_refund_after_unix,
			}),
		));
	}

	let (signed, envelope_id) = sign_and_send(
		ctx,
		&swap_channel,
		Kind::Terms,
		&trade_id,
		serde_json::to_value(&body).map_err(|e| ToolError::internal(e.to_string()))?,
	)
	.await?;
	let terms_hash = hash_terms(&signed)?.to_lower_hex_string();

	ctx.store.upsert_trade(
		&trade_id,
		&TradePatch {
			role: Some(TradeRole::Maker),
			state: Some(TradeState::Terms),
			btc_sats: Some(btc_sats),
			usdt_amount: Some(usdt_amount),
			sol_mint: Some(body.sol_mint.clone()),
			sol_program_id: Some(ctx.sol.program_id()),
			sol_recipient: Some(sol_recipient),
			sol_refund: Some(body.sol_refund.clone()),
			sol_refund_after_unix: Some(sol_refund_after_unix),
			taker_peer: Some(ln_payer_peer),
			..Default::default()
		},
	)?;

	Ok(json!({
		"trade_id": trade_id,
		"swap_channel": swap_channel,
		"envelope_id": envelope_id,
		"terms_hash": terms_hash,
		"sol_refund_after_unix": sol_refund_after_unix,
	}))
}
