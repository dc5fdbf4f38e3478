// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! `swap_accept_post` — taker commits to the exact terms envelope by hash.

use serde_json::{json, Value};

use intercomswap_wire::kinds::AcceptBody;
use intercomswap_wire::Kind;

use crate::io::persist::types::{TradePatch, TradeState};
use crate::service::{EngineContext, ExecuteOpts};
use crate::tools::args::Args;
use crate::tools::error::ToolError;
use crate::tools::{dry_run_result, sign_and_send};

const TOOL: &str = "swap_accept_post";
const ALLOWED: &[&str] = &["trade_id", "terms_hash"];

pub(crate) async fn handle(
	ctx: &EngineContext, raw: &Value, opts: &ExecuteOpts,
) -> Result<Value, ToolError> {
	let args = Args::new(TOOL, raw, &ctx.vault, ALLOWED)?;
	let trade_id = args.req_str("trade_id", 1, 128)?;
	let terms_hash = args.req_hex32("terms_hash")?;

	let trade = ctx
		.store
		.get_trade(&trade_id)?
		.ok_or_else(|| ToolError::precondition(format!("unknown trade {}", trade_id)))?;
	let swap_channel = trade.swap_channel.ok_or_else(|| {
		ToolError::precondition(format!("trade {} has no swap channel yet", trade_id))
	})?;

	if opts.dry_run {
		return Ok(dry_run_result(TOOL, json!({ "trade_id": trade_id, "terms_hash": terms_hash })));
	}

	let body = AcceptBody { terms_hash: terms_hash.clone() };
	let (_, envelope_id) = sign_and_send(
		ctx,
		&swap_channel,
		Kind::Accept,
		&trade_id,
		serde_json::to_value(&body).map_err(|e| ToolError::internal(e.to_string()))?,
	)
	.await?;

	ctx.store.upsert_trade(
		&trade_id,
		&TradePatch { state: Some(TradeState::Accepted), ..Default::default() },
	)?;

	Ok(json!({ "trade_id": trade_id, "terms_hash": terms_hash, "envelope_id": envelope_id }))
}
