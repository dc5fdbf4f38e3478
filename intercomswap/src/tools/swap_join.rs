// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! `swap_join` — taker joins the maker's private swap channel.

use serde_json::{json, Value};

use crate::io::persist::types::{TradePatch, TradeRole, TradeState};
use crate::rpc::with_io_timeout;
use crate::service::{EngineContext, ExecuteOpts};
use crate::tools::args::Args;
use crate::tools::error::ToolError;
use crate::tools::dry_run_result;

const TOOL: &str = "swap_join";
const ALLOWED: &[&str] = &["trade_id", "swap_channel", "invite", "welcome", "inviter_key"];

pub(crate) async fn handle(
	ctx: &EngineContext, raw: &Value, opts: &ExecuteOpts,
) -> Result<Value, ToolError> {
	let args = Args::new(TOOL, raw, &ctx.vault, ALLOWED)?;
	let trade_id = args.req_str("trade_id", 1, 128)?;
	let swap_channel = args.req_str("swap_channel", 6, 128)?;
	let invite = args.req_str("invite", 1, 1024)?;
	let welcome = args.req_str("welcome", 1, 1024)?;
	let inviter_key = args.req_hex32("inviter_key")?;

	if swap_channel.strip_prefix("swap:") != Some(trade_id.as_str()) {
		return Err(ToolError::invalid(format!(
			"{}: swap_channel {:?} does not match trade {:?}",
			TOOL, swap_channel, trade_id
		)));
	}

	if opts.dry_run {
		return Ok(dry_run_result(TOOL, json!({ "swap_channel": swap_channel })));
	}

	let timeout_ms = ctx.config.swap.io_timeout_ms;
	with_io_timeout(
		"sidechannel add_inviter_key",
		timeout_ms,
		ctx.session.add_inviter_key(&inviter_key),
	)
	.await?;
	// Welcome verification happens bus-side during join.
	with_io_timeout(
		"sidechannel join",
		timeout_ms,
		ctx.session.join(&swap_channel, Some(&invite), Some(&welcome)),
	)
	.await?;

	// Auth control message carrying the invite, so the inviter sees us.
	let auth = json!({ "type": "auth", "invite": invite }).to_string();
	with_io_timeout("sidechannel auth", timeout_ms, ctx.session.send_text(&swap_channel, &auth))
		.await?;

	ctx.store.upsert_trade(
		&trade_id,
		&TradePatch {
			role: Some(TradeRole::Taker),
			state: Some(TradeState::Rfq),
			swap_channel: Some(swap_channel.clone()),
			maker_peer: Some(inviter_key.clone()),
			..Default::default()
		},
	)?;

	Ok(json!({ "trade_id": trade_id, "joined": swap_channel, "inviter_key": inviter_key }))
}
