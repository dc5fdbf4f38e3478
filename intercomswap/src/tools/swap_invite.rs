// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! `swap_invite_send` — maker opens the private `swap:<trade_id>` channel.
//!
//! The invite and welcome tokens are Ed25519 signatures over the channel
//! tag, verifiable by the bus once the taker registers the inviter key.
//! Sending the invite reserves the bound offer line.

use ed25519_dalek::Signer;
use hex::DisplayHex;
use serde_json::{json, Value};

use intercomswap_wire::kinds::SwapInviteBody;
use intercomswap_wire::validate::validate_swap_invite;
use intercomswap_wire::Kind;

use crate::io::persist::types::{ListingType, TradePatch, TradeRole, TradeState};
use crate::locks::offer_line_key;
use crate::rpc::with_io_timeout;
use crate::service::{EngineContext, ExecuteOpts};
use crate::tools::args::Args;
use crate::tools::error::ToolError;
use crate::tools::{dry_run_result, sign_and_send};
use crate::util::now_unix;

const TOOL: &str = "swap_invite_send";
const ALLOWED: &[&str] =
	&["channel", "trade_id", "invitee", "offer_id", "line_index", "ttl_sec"];

pub(crate) async fn handle(
	ctx: &EngineContext, raw: &Value, opts: &ExecuteOpts,
) -> Result<Value, ToolError> {
	let args = Args::new(TOOL, raw, &ctx.vault, ALLOWED)?;
	let channel = args.req_str("channel", 1, 128)?;
	let trade_id = args.req_str("trade_id", 1, 122)?;
	let invitee = args.opt_hex32("invitee")?;
	let offer_id = args.opt_hex32("offer_id")?;
	let line_index = args.opt_u32("line_index", 0, u32::MAX)?;
	let ttl_sec = args.opt_u64("ttl_sec", 10, 24 * 3600)?.unwrap_or(600);

	if offer_id.is_some() != line_index.is_some() {
		return Err(ToolError::invalid(format!(
			"{}: offer_id and line_index must be set together",
			TOOL
		)));
	}

	let swap_channel = format!("swap:{}", trade_id);
	let invite = ctx
		.envelope_key
		.sign(format!("invite:{}", swap_channel).as_bytes())
		.to_bytes()
		.to_lower_hex_string();
	let welcome = ctx
		.envelope_key
		.sign(format!("welcome:{}", swap_channel).as_bytes())
		.to_bytes()
		.to_lower_hex_string();

	let body = SwapInviteBody {
		swap_channel: swap_channel.clone(),
		invite,
		welcome,
		invitee: invitee.clone(),
		offer_id: offer_id.clone(),
		line_index,
		valid_until_unix: Some(now_unix() + ttl_sec),
	};
	validate_swap_invite(&body)?;

	if opts.dry_run {
		return Ok(dry_run_result(
			TOOL,
			json!({ "channel": channel, "trade_id": trade_id, "swap_channel": swap_channel }),
		));
	}

	// SWAP_INVITE is what takes the offer line off the market.
	if let (Some(offer_id), Some(line_index)) = (&offer_id, line_index) {
		ctx.locks.acquire(
			ListingType::OfferLine,
			&format!("{}:{}", offer_id, line_index),
			&offer_line_key(offer_id, line_index),
			&trade_id,
			None,
			None,
			true,
		)?;
	}

	with_io_timeout(
		"sidechannel subscribe",
		ctx.config.swap.io_timeout_ms,
		ctx.session.subscribe(&[swap_channel.clone()]),
	)
	.await?;

	let (_, envelope_id) = sign_and_send(
		ctx,
		&channel,
		Kind::SwapInvite,
		&trade_id,
		serde_json::to_value(&body).map_err(|e| ToolError::internal(e.to_string()))?,
	)
	.await?;

	ctx.store.upsert_trade(
		&trade_id,
		&TradePatch {
			role: Some(TradeRole::Maker),
			state: Some(TradeState::Rfq),
			swap_channel: Some(swap_channel.clone()),
			taker_peer: invitee,
			..Default::default()
		},
	)?;

	Ok(json!({
		"trade_id": trade_id,
		"swap_channel": swap_channel,
		"envelope_id": envelope_id,
		"valid_until_unix": body.valid_until_unix,
	}))
}
