// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! `swap_quote_accept` — taker commits to a quote.
//!
//! Reserves the RFQ listing lock in flight (exactly one accept wins on a
//! shared table) and attaches an outbound-liquidity hint the maker uses to
//! size the invite.

use serde_json::{json, Value};

use intercomswap_wire::kinds::{LnLiquidityHint, QuoteAcceptBody};
use intercomswap_wire::validate::validate_quote_accept;
use intercomswap_wire::Kind;

use crate::io::persist::types::{ListingType, TradePatch, TradeRole, TradeState};
use crate::liquidity::{normalize_channels, summarize};
use crate::locks::rfq_key;
use crate::rpc::with_io_timeout;
use crate::service::{EngineContext, ExecuteOpts};
use crate::tools::args::Args;
use crate::tools::error::ToolError;
use crate::tools::{dry_run_result, sign_and_send};
use crate::util::now_unix;

const TOOL: &str = "swap_quote_accept";
const ALLOWED: &[&str] =
	&["channel", "trade_id", "rfq_id", "quote_id", "offer_id", "line_index", "required_sats"];

pub(crate) async fn handle(
	ctx: &EngineContext, raw: &Value, opts: &ExecuteOpts,
) -> Result<Value, ToolError> {
	let args = Args::new(TOOL, raw, &ctx.vault, ALLOWED)?;
	let channel = args.req_str("channel", 1, 128)?;
	let trade_id = args.req_str("trade_id", 1, 128)?;
	let rfq_id = args.req_hex32("rfq_id")?;
	let quote_id = args.req_hex32("quote_id")?;
	let offer_id = args.opt_hex32("offer_id")?;
	let line_index = args.opt_u32("line_index", 0, u32::MAX)?;
	let required_sats = args.req_u64("required_sats", 1, u64::MAX / 1000)?;

	let raw_channels = with_io_timeout(
		"ln list_channels",
		ctx.config.swap.io_timeout_ms,
		ctx.ln.list_channels(),
	)
	.await?;
	let summary = summarize(&normalize_channels(ctx.ln.backend(), &raw_channels));
	let mode = if summary.max_outbound_sats >= required_sats {
		"single_channel"
	} else {
		"aggregate"
	};
	let hint = LnLiquidityHint {
		mode: mode.to_string(),
		required_sats,
		max_single_outbound_sats: summary.max_outbound_sats,
		total_outbound_sats: summary.total_outbound_sats,
		active_channels: summary.channels_active,
		observed_at_unix: now_unix(),
	};

	let body = QuoteAcceptBody {
		rfq_id: rfq_id.clone(),
		quote_id: quote_id.clone(),
		offer_id,
		line_index,
		sol_recipient: ctx.sol.local_signer(),
		ln_liquidity_hint: hint.clone(),
	};
	validate_quote_accept(&body)?;

	if opts.dry_run {
		return Ok(dry_run_result(
			TOOL,
			json!({ "channel": channel, "trade_id": trade_id, "rfq_id": rfq_id, "hint": hint }),
		));
	}

	// Reserve the RFQ before telling anyone; the loser of a concurrent
	// accept sees listing_in_progress here and backs off.
	ctx.locks.acquire(
		ListingType::Rfq,
		&rfq_id,
		&rfq_key(&rfq_id),
		&trade_id,
		None,
		None,
		true,
	)?;

	let (_, envelope_id) = sign_and_send(
		ctx,
		&channel,
		Kind::QuoteAccept,
		&trade_id,
		serde_json::to_value(&body).map_err(|e| ToolError::internal(e.to_string()))?,
	)
	.await?;

	ctx.store.upsert_trade(
		&trade_id,
		&TradePatch {
			role: Some(TradeRole::Taker),
			state: Some(TradeState::Rfq),
			..Default::default()
		},
	)?;

	Ok(json!({
		"trade_id": trade_id,
		"rfq_id": rfq_id,
		"quote_id": quote_id,
		"envelope_id": envelope_id,
		"ln_liquidity_hint": hint,
	}))
}
