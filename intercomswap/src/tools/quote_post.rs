// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! `swap_quote_post` — maker's quote, optionally bound to an offer line.
//!
//! Fee numbers always come from the on-chain snapshot; a quote is refused
//! when its offer line is filled or held by another trade.

use serde_json::{json, Value};

use intercomswap_wire::envelope::app_hash;
use intercomswap_wire::kinds::QuoteBody;
use intercomswap_wire::validate::validate_quote;
use intercomswap_wire::{Kind, PAIR};

use crate::fees::fee_snapshot;
use crate::io::persist::types::{TradePatch, TradeRole, TradeState};
use crate::locks::offer_line_key;
use crate::rpc::with_io_timeout;
use crate::service::{EngineContext, ExecuteOpts};
use crate::tools::args::Args;
use crate::tools::error::ToolError;
use crate::tools::{dry_run_result, sign_and_send};
use crate::util::now_unix;

const TOOL: &str = "swap_quote_post";
const ALLOWED: &[&str] = &[
	"channel",
	"trade_id",
	"rfq_id",
	"btc_sats",
	"usdt_amount",
	"offer_id",
	"line_index",
	"ttl_sec",
];

pub(crate) async fn handle(
	ctx: &EngineContext, raw: &Value, opts: &ExecuteOpts,
) -> Result<Value, ToolError> {
	let args = Args::new(TOOL, raw, &ctx.vault, ALLOWED)?;
	let channel = args.req_str("channel", 1, 128)?;
	let trade_id = args.req_str("trade_id", 1, 128)?;
	let rfq_id = args.req_hex32("rfq_id")?;
	let btc_sats = args.req_u64("btc_sats", 1, u64::MAX / 1000)?;
	let usdt_amount = args.req_amount("usdt_amount")?;
	let offer_id = args.opt_hex32("offer_id")?;
	let line_index = args.opt_u32("line_index", 0, u32::MAX)?;
	let ttl_sec = args.opt_u64("ttl_sec", 10, 24 * 3600)?.unwrap_or(600);

	if offer_id.is_some() != line_index.is_some() {
		return Err(ToolError::invalid(format!(
			"{}: offer_id and line_index must be set together",
			TOOL
		)));
	}

	// A line already sold (or reserved by a different trade) is not quotable.
	if let (Some(offer_id), Some(line_index)) = (&offer_id, line_index) {
		ctx.locks.check(&offer_line_key(offer_id, line_index), &trade_id, true)?;
	}

	let collector = ctx
		.config
		.solana
		.trade_fee_collector
		.clone()
		.unwrap_or_else(|| ctx.sol.local_signer());
	let fees = with_io_timeout(
		"fee snapshot",
		ctx.config.swap.io_timeout_ms,
		fee_snapshot(ctx.sol.as_ref(), &collector),
	)
	.await?;

	let body = QuoteBody {
		pair: PAIR.to_string(),
		rfq_id: rfq_id.clone(),
		offer_id: offer_id.clone(),
		line_index,
		btc_sats,
		usdt_amount: usdt_amount.clone(),
		platform_fee_bps: fees.platform_fee_bps,
		trade_fee_bps: fees.trade_fee_bps,
		platform_fee_collector: Some(fees.platform_fee_collector.clone()),
		trade_fee_collector: fees.trade_fee_collector.clone(),
		valid_until_unix: Some(now_unix() + ttl_sec),
		app_hash: app_hash(&ctx.sol.program_id()),
	};
	validate_quote(&body)?;

	if opts.dry_run {
		return Ok(dry_run_result(
			TOOL,
			json!({
				"channel": channel,
				"trade_id": trade_id,
				"rfq_id": rfq_id,
				"platform_fee_bps": fees.platform_fee_bps,
				"trade_fee_bps": fees.trade_fee_bps,
			}),
		));
	}

	let (_, envelope_id) = sign_and_send(
		ctx,
		&channel,
		Kind::Quote,
		&trade_id,
		serde_json::to_value(&body).map_err(|e| ToolError::internal(e.to_string()))?,
	)
	.await?;

	ctx.store.upsert_trade(
		&trade_id,
		&TradePatch {
			role: Some(TradeRole::Maker),
			state: Some(TradeState::Rfq),
			btc_sats: Some(btc_sats),
			usdt_amount: Some(usdt_amount),
			..Default::default()
		},
	)?;

	Ok(json!({
		"trade_id": trade_id,
		"rfq_id": rfq_id,
		"envelope_id": envelope_id,
		"platform_fee_bps": fees.platform_fee_bps,
		"trade_fee_bps": fees.trade_fee_bps,
		"trade_fee_collector": fees.trade_fee_collector,
	}))
}
