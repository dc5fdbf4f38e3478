// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! `swap_status_post` — free-form progress signal (`swap.status`).

use serde_json::{json, Value};

use intercomswap_wire::kinds::StatusBody;
use intercomswap_wire::validate::validate_status;
use intercomswap_wire::Kind;

use crate::service::{EngineContext, ExecuteOpts};
use crate::tools::args::Args;
use crate::tools::error::ToolError;
use crate::tools::{dry_run_result, sign_and_send};

const TOOL: &str = "swap_status_post";
const ALLOWED: &[&str] = &["trade_id", "channel", "state", "note"];

pub(crate) async fn handle(
	ctx: &EngineContext, raw: &Value, opts: &ExecuteOpts,
) -> Result<Value, ToolError> {
	let args = Args::new(TOOL, raw, &ctx.vault, ALLOWED)?;
	let trade_id = args.req_str("trade_id", 1, 128)?;
	let state = args.req_str("state", 1, 64)?;
	let note = args.opt_str("note", 1, 512)?;
	let channel_override = args.opt_str("channel", 1, 128)?;

	let channel = match channel_override {
		Some(channel) => channel,
		None => ctx
			.store
			.get_trade(&trade_id)?
			.and_then(|t| t.swap_channel)
			.ok_or_else(|| {
				ToolError::precondition(format!("trade {} has no channel for status", trade_id))
			})?,
	};

	let body = StatusBody { state: state.clone(), note: note.clone() };
	validate_status(&body)?;

	if opts.dry_run {
		return Ok(dry_run_result(TOOL, json!({ "trade_id": trade_id, "state": state })));
	}

	let (_, envelope_id) = sign_and_send(
		ctx,
		&channel,
		Kind::Status,
		&trade_id,
		serde_json::to_value(&body).map_err(|e| ToolError::internal(e.to_string()))?,
	)
	.await?;

	Ok(json!({ "trade_id": trade_id, "channel": channel, "envelope_id": envelope_id }))
}
