// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use hex::DisplayHex;
use rand::RngCore;
use serde_json::{json, Value};

use intercomswap_wire::envelope::{envelope_id, sign};
use intercomswap_wire::{build_unsigned, Envelope, Kind};

use crate::rpc::with_io_timeout;
use crate::service::EngineContext;
use crate::tools::error::ToolError;
use crate::util::now_ms;

pub(crate) mod args;
pub mod error;

pub(crate) mod accept_post;
pub(crate) mod cancel_post;
pub(crate) mod ln_invoice;
pub(crate) mod ln_pay;
pub(crate) mod offer_post;
pub(crate) mod quote_accept;
pub(crate) mod quote_post;
pub(crate) mod readonly;
pub(crate) mod recover;
pub(crate) mod rfq_post;
pub(crate) mod sol_claim;
pub(crate) mod sol_escrow;
pub(crate) mod status_post;
pub(crate) mod swap_invite;
pub(crate) mod swap_join;
pub(crate) mod terms_post;

/// The standard result shape for `dry_run` executions.
pub(crate) fn dry_run_result(tool: &str, would: Value) -> Value {
	json!({ "type": "dry_run", "tool": tool, "would": would })
}

/// Fresh 32-byte lower-hex identifier (rfq ids, offer ids).
pub(crate) fn gen_hex32() -> String {
	let mut bytes = [0u8; 32];
	rand::thread_rng().fill_bytes(&mut bytes);
	bytes.to_lower_hex_string()
}

/// Builds, signs and sends an envelope on `channel`, journaling it under
/// the trade. Returns the signed envelope and its id.
pub(crate) async fn sign_and_send(
	ctx: &EngineContext, channel: &str, kind: Kind, trade_id: &str, body: Value,
) -> Result<(Envelope, String), ToolError> {
	let unsigned = build_unsigned(kind, trade_id, now_ms(), body)?;
	let signed = sign(&unsigned, &ctx.envelope_key)?;
	let id = envelope_id(&signed)?;
	with_io_timeout(
		"sidechannel send",
		ctx.config.swap.io_timeout_ms,
		ctx.session.send_envelope(channel, &signed),
	)
	.await?;
	ctx.store.append_event(trade_id, kind.as_str(), &signed.body)?;
	ctx.trace.record("tool.send", format!("{} on {} ({})", kind.as_str(), channel, trade_id));
	Ok((signed, id))
}

/// Scans the session log for an escrow-creation envelope of this trade.
/// Used by the cancel guard alongside the receipts state.
pub(crate) fn log_has_escrow_created(ctx: &EngineContext, trade_id: &str) -> bool {
	ctx.session.events_since(0, usize::MAX, u64::MAX).iter().any(|event| {
		event
			.envelope()
			.map(|env| env.kind == Kind::SolEscrowCreated && env.trade_id == trade_id)
			.unwrap_or(false)
	})
}
