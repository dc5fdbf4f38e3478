// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! `swap_offer_post` — broadcast a maker offer (`swap.svc_announce`).

use serde_json::{json, Value};

use intercomswap_wire::envelope::app_hash;
use intercomswap_wire::kinds::{OfferLine, SvcAnnounceBody};
use intercomswap_wire::validate::validate_svc_announce;
use intercomswap_wire::{Kind, PAIR, REFUND_WINDOW_MAX_SEC, REFUND_WINDOW_MIN_SEC};

use crate::fees::fee_snapshot;
use crate::rpc::with_io_timeout;
use crate::service::{EngineContext, ExecuteOpts};
use crate::tools::args::Args;
use crate::tools::error::ToolError;
use crate::tools::{dry_run_result, gen_hex32, sign_and_send};
use crate::util::now_unix;

const TOOL: &str = "swap_offer_post";
const ALLOWED: &[&str] = &["channel", "offer_id", "lines", "rfq_channels", "ttl_sec"];

struct OfferPostArgs {
	channel: String,
	offer_id: String,
	lines: Vec<LineSpec>,
	rfq_channels: Vec<String>,
	ttl_sec: u64,
}

struct LineSpec {
	btc_sats: u64,
	usdt_amount: String,
	refund_window_min_sec: u64,
	refund_window_max_sec: u64,
}

fn parse_args(ctx: &EngineContext, raw: &Value) -> Result<OfferPostArgs, ToolError> {
	let args = Args::new(TOOL, raw, &ctx.vault, ALLOWED)?;
	let channel = args.req_str("channel", 1, 128)?;
	let offer_id = args.opt_hex32("offer_id")?.unwrap_or_else(gen_hex32);
	let ttl_sec = args.opt_u64("ttl_sec", 60, 7 * 24 * 3600)?.unwrap_or(3600);
	let rfq_channels = match args.opt_value("rfq_channels") {
		None => vec![channel.clone()],
		Some(value) => parse_string_array(value)?,
	};

	let lines_value = args
		.opt_value("lines")
		.ok_or_else(|| ToolError::invalid(format!("{}: missing required argument lines", TOOL)))?;
	let entries = lines_value
		.as_array()
		.ok_or_else(|| ToolError::invalid(format!("{}: lines must be an array", TOOL)))?;
	if entries.is_empty() {
		return Err(ToolError::invalid(format!("{}: lines must not be empty", TOOL)));
	}
	let mut lines = Vec::with_capacity(entries.len());
	for (i, entry) in entries.iter().enumerate() {
		let btc_sats = entry
			.get("btc_sats")
			.and_then(Value::as_u64)
			.filter(|sats| *sats > 0)
			.ok_or_else(|| {
				ToolError::invalid(format!("{}: lines[{}].btc_sats must be a positive integer", TOOL, i))
			})?;
		let usdt_amount = entry
			.get("usdt_amount")
			.and_then(Value::as_str)
			.filter(|s| intercomswap_wire::validate::is_decimal_amount(s))
			.ok_or_else(|| {
				ToolError::invalid(format!("{}: lines[{}].usdt_amount must match ^[0-9]+$", TOOL, i))
			})?
			.to_string();
		let refund_window_min_sec = entry
			.get("refund_window_min_sec")
			.and_then(Value::as_u64)
			.unwrap_or(REFUND_WINDOW_MIN_SEC);
		let refund_window_max_sec = entry
			.get("refund_window_max_sec")
			.and_then(Value::as_u64)
			.unwrap_or(REFUND_WINDOW_MAX_SEC);
		lines.push(LineSpec {
			btc_sats,
			usdt_amount,
			refund_window_min_sec,
			refund_window_max_sec,
		});
	}
	Ok(OfferPostArgs { channel, offer_id, lines, rfq_channels, ttl_sec })
}

fn parse_string_array(value: &Value) -> Result<Vec<String>, ToolError> {
	value
		.as_array()
		.map(|items| {
			items
				.iter()
				.map(|item| {
					item.as_str().map(str::to_string).ok_or_else(|| {
						ToolError::invalid(format!("{}: rfq_channels entries must be strings", TOOL))
					})
				})
				.collect()
		})
		.unwrap_or_else(|| {
			Err(ToolError::invalid(format!("{}: rfq_channels must be an array", TOOL)))
		})
}

pub(crate) async fn handle(
	ctx: &EngineContext, raw: &Value, opts: &ExecuteOpts,
) -> Result<Value, ToolError> {
	let args = parse_args(ctx, raw)?;

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

	let body = SvcAnnounceBody {
		offer_id: args.offer_id.clone(),
		pair: PAIR.to_string(),
		lines: args
			.lines
			.iter()
			.enumerate()
			.map(|(i, line)| OfferLine {
				line_index: i as u32,
				btc_sats: line.btc_sats,
				usdt_amount: line.usdt_amount.clone(),
				platform_fee_bps: fees.platform_fee_bps,
				trade_fee_bps: fees.trade_fee_bps,
				refund_window_min_sec: line.refund_window_min_sec,
				refund_window_max_sec: line.refund_window_max_sec,
			})
			.collect(),
		rfq_channels: args.rfq_channels.clone(),
		valid_until_unix: Some(now_unix() + args.ttl_sec),
		app_hash: app_hash(&ctx.sol.program_id()),
	};
	validate_svc_announce(&body)?;

	if opts.dry_run {
		return Ok(dry_run_result(
			TOOL,
			json!({ "channel": args.channel, "offer_id": args.offer_id, "lines": body.lines.len() }),
		));
	}

	let trade_id = format!("offer:{}", args.offer_id);
	let (_, envelope_id) = sign_and_send(
		ctx,
		&args.channel,
		Kind::SvcAnnounce,
		&trade_id,
		serde_json::to_value(&body).map_err(|e| ToolError::internal(e.to_string()))?,
	)
	.await?;

	Ok(json!({
		"offer_id": args.offer_id,
		"channel": args.channel,
		"envelope_id": envelope_id,
		"valid_until_unix": body.valid_until_unix,
	}))
}
