// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! `swap_rfq_post` — taker's request for quote.

use serde_json::{json, Value};

use intercomswap_wire::envelope::app_hash;
use intercomswap_wire::kinds::RfqBody;
use intercomswap_wire::validate::validate_rfq;
use intercomswap_wire::{
	Kind, MAX_PLATFORM_FEE_BPS, MAX_TOTAL_FEE_BPS, MAX_TRADE_FEE_BPS, PAIR,
};

use crate::io::persist::types::{TradePatch, TradeRole, TradeState};
use crate::service::{EngineContext, ExecuteOpts};
use crate::tools::args::Args;
use crate::tools::error::ToolError;
use crate::tools::{dry_run_result, gen_hex32, sign_and_send};
use crate::util::now_unix;

const TOOL: &str = "swap_rfq_post";
const ALLOWED: &[&str] = &[
	"channel",
	"trade_id",
	"btc_sats",
	"usdt_amount",
	"max_platform_fee_bps",
	"max_trade_fee_bps",
	"max_total_fee_bps",
	"refund_window_min_sec",
	"refund_window_max_sec",
	"ttl_sec",
];

pub(crate) async fn handle(
	ctx: &EngineContext, raw: &Value, opts: &ExecuteOpts,
) -> Result<Value, ToolError> {
	let args = Args::new(TOOL, raw, &ctx.vault, ALLOWED)?;
	let channel = args.req_str("channel", 1, 128)?;
	let trade_id = args
		.opt_str("trade_id", 1, 128)?
		.unwrap_or_else(|| format!("svc:{}", &gen_hex32()[..16]));
	let btc_sats = args.req_u64("btc_sats", 1, 21_000_000 * 100_000_000)?;
	let usdt_amount = args.req_amount("usdt_amount")?;
	let max_platform_fee_bps = args
		.opt_u32("max_platform_fee_bps", 0, MAX_PLATFORM_FEE_BPS)?
		.unwrap_or(MAX_PLATFORM_FEE_BPS);
	let max_trade_fee_bps =
		args.opt_u32("max_trade_fee_bps", 0, MAX_TRADE_FEE_BPS)?.unwrap_or(MAX_TRADE_FEE_BPS);
	let max_total_fee_bps =
		args.opt_u32("max_total_fee_bps", 0, MAX_TOTAL_FEE_BPS)?.unwrap_or(MAX_TOTAL_FEE_BPS);
	let refund_window_min_sec = args.opt_u64("refund_window_min_sec", 1, u64::MAX)?;
	let refund_window_max_sec = args.opt_u64("refund_window_max_sec", 1, u64::MAX)?;
	let ttl_sec = args.opt_u64("ttl_sec", 10, 24 * 3600)?.unwrap_or(600);

	let rfq_id = gen_hex32();
	let body = RfqBody {
		pair: PAIR.to_string(),
		rfq_id: rfq_id.clone(),
		btc_sats,
		usdt_amount: usdt_amount.clone(),
		max_platform_fee_bps,
		max_trade_fee_bps,
		max_total_fee_bps,
		refund_window_min_sec,
		refund_window_max_sec,
		valid_until_unix: Some(now_unix() + ttl_sec),
		app_hash: app_hash(&ctx.sol.program_id()),
	};
	validate_rfq(&body)?;

	if opts.dry_run {
		return Ok(dry_run_result(
			TOOL,
			json!({ "channel": channel, "trade_id": trade_id, "rfq_id": rfq_id, "btc_sats": btc_sats }),
		));
	}

	let (_, envelope_id) = sign_and_send(
		ctx,
		&channel,
		Kind::Rfq,
		&trade_id,
		serde_json::to_value(&body).map_err(|e| ToolError::internal(e.to_string()))?,
	)
	.await?;

	ctx.store.upsert_trade(
		&trade_id,
		&TradePatch {
			role: Some(TradeRole::Taker),
			state: Some(TradeState::Rfq),
			btc_sats: Some(btc_sats),
			usdt_amount: Some(usdt_amount),
			..Default::default()
		},
	)?;

	Ok(json!({
		"trade_id": trade_id,
		"rfq_id": rfq_id,
		"channel": channel,
		"envelope_id": envelope_id,
		"valid_until_unix": body.valid_until_unix,
	}))
}
