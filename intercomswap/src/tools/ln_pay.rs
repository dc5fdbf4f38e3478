// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! `ln_pay_and_post_verified` — taker pays the invoice, but only after the
//! full cross-leg verification and a route precheck pass.
//!
//! The preimage learned on settlement must hash back to the payment hash;
//! a mismatch is a fatal integrity event and nothing is announced.

use hex::{DisplayHex, FromHex};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use intercomswap_wire::envelope::verify;
use intercomswap_wire::kinds::LnPaidBody;
use intercomswap_wire::{Envelope, Kind};

use crate::io::persist::types::{TradePatch, TradeState};
use crate::liquidity::{
	assert_liquidity, normalize_channels, route_probe, summarize, LiquidityMode, LiquiditySide,
};
use crate::rpc::with_io_timeout;
use crate::service::{EngineContext, ExecuteOpts};
use crate::tools::args::Args;
use crate::tools::error::ToolError;
use crate::tools::{dry_run_result, sign_and_send};
use crate::util::now_unix;
use crate::verifier::{verify_pre_pay, PrePayInputs};

const TOOL: &str = "ln_pay_and_post_verified";
const ALLOWED: &[&str] = &["trade_id", "terms_env", "invoice_env", "escrow_env"];

fn parse_envelope(name: &str, payload: &str) -> Result<Envelope, ToolError> {
	let env: Envelope = serde_json::from_str(payload)
		.map_err(|e| ToolError::invalid(format!("{} is not an envelope: {}", name, e)))?;
	verify(&env)
		.map_err(|e| ToolError::invalid(format!("{} signature rejected: {}", name, e)))?;
	Ok(env)
}

pub(crate) async fn handle(
	ctx: &EngineContext, raw: &Value, opts: &ExecuteOpts,
) -> Result<Value, ToolError> {
	let args = Args::new(TOOL, raw, &ctx.vault, ALLOWED)?;
	let trade_id = args.req_str("trade_id", 1, 128)?;
	let terms_env = parse_envelope("terms_env", &args.req_str("terms_env", 1, 65536)?)?;
	let invoice_env = parse_envelope("invoice_env", &args.req_str("invoice_env", 1, 65536)?)?;
	let escrow_env = parse_envelope("escrow_env", &args.req_str("escrow_env", 1, 65536)?)?;

	if terms_env.trade_id != trade_id {
		return Err(ToolError::invalid(format!(
			"terms_env belongs to trade {}, not {}",
			terms_env.trade_id, trade_id
		)));
	}

	let timeout_ms = ctx.config.swap.io_timeout_ms;
	let bolt11 = invoice_env
		.body
		.get("bolt11")
		.and_then(Value::as_str)
		.ok_or_else(|| ToolError::invalid("invoice_env carries no bolt11"))?
		.to_string();
	let decoded = with_io_timeout("ln decodepay", timeout_ms, ctx.ln.decodepay(&bolt11)).await?;

	let escrow_state = with_io_timeout(
		"sol get_escrow_state",
		timeout_ms,
		ctx.sol.get_escrow_state(&decoded.payment_hash),
	)
	.await?
	.ok_or_else(|| {
		ToolError::precondition(format!(
			"no on-chain escrow for payment hash {}",
			decoded.payment_hash
		))
	})?;
	let (derived_pda, _) = with_io_timeout(
		"sol derive_escrow_pda",
		timeout_ms,
		ctx.sol.derive_escrow_pda(&decoded.payment_hash),
	)
	.await?;

	let verified = verify_pre_pay(&PrePayInputs {
		terms_env: &terms_env,
		invoice_env: &invoice_env,
		escrow_env: &escrow_env,
		escrow_state: &escrow_state,
		decoded_invoice: &decoded,
		configured_program_id: &ctx.sol.program_id(),
		derived_escrow_pda: &derived_pda,
		now_unix: now_unix(),
	})?;

	// Identity gates: we must be the payer the terms name, and the escrow
	// must pay out to our Solana signer.
	let local_peer =
		with_io_timeout("sidechannel info", timeout_ms, ctx.session.local_peer()).await?;
	if verified.terms.ln_payer_peer != local_peer {
		return Err(ToolError::unauthorized(format!(
			"terms name payer {}, local peer is {}",
			verified.terms.ln_payer_peer, local_peer
		)));
	}
	let local_sol_signer = ctx.sol.local_signer();
	if verified.terms.sol_recipient != local_sol_signer {
		return Err(ToolError::unauthorized(format!(
			"terms pay out to {}, local signer is {}",
			verified.terms.sol_recipient, local_sol_signer
		)));
	}

	// Route precheck: prefer a single direct channel with enough outbound;
	// otherwise fall back to aggregate capacity, probing the graph when
	// the invoice carries no hints.
	let btc_sats = verified.terms.btc_sats;
	let raw_channels =
		with_io_timeout("ln list_channels", timeout_ms, ctx.ln.list_channels()).await?;
	let channels = normalize_channels(ctx.ln.backend(), &raw_channels);
	let summary = summarize(&channels);
	let direct_sufficient = channels
		.iter()
		.any(|ch| ch.active && ch.peer == decoded.destination && ch.local_sats >= btc_sats);
	let mode =
		if direct_sufficient { LiquidityMode::SingleChannel } else { LiquidityMode::Aggregate };
	assert_liquidity(&summary, mode, LiquiditySide::Outbound, btc_sats).map_err(|e| {
		ToolError::precondition(format!(
			"{} (destination {}, route hints {})",
			e, decoded.destination, decoded.route_hint_count
		))
	})?;
	if !direct_sufficient && decoded.route_hint_count == 0 {
		route_probe(ctx.ln.as_ref(), &decoded.destination, btc_sats).await.map_err(|e| {
			ToolError::precondition(format!(
				"unroutable invoice precheck: {} (destination {}, route hints 0, \
				 max_single_outbound {}, total_outbound {})",
				e.message, decoded.destination, summary.max_outbound_sats,
				summary.total_outbound_sats
			))
		})?;
	}

	if opts.dry_run {
		return Ok(dry_run_result(
			TOOL,
			json!({
				"trade_id": trade_id,
				"payment_hash": decoded.payment_hash,
				"amount_msat": decoded.amount_msat,
				"mode": mode.as_str(),
			}),
		));
	}

	let pay = with_io_timeout(
		"ln pay",
		timeout_ms,
		ctx.ln.pay(&bolt11, &Default::default()),
	)
	.await?;

	// The settlement preimage must hash to the invoice's payment hash;
	// anything else means the node lied and the escrow claim would fail.
	let preimage = <[u8; 32]>::from_hex(&pay.preimage_hex).map_err(|e| {
		ToolError::integrity(format!("settlement preimage is not 32-byte hex: {}", e))
	})?;
	let digest: [u8; 32] = Sha256::digest(preimage).into();
	if digest.to_lower_hex_string() != decoded.payment_hash {
		return Err(ToolError::integrity(format!(
			"preimage does not hash to payment hash {} (got {})",
			decoded.payment_hash,
			digest.to_lower_hex_string()
		)));
	}

	let preimage_handle =
		ctx.vault.put(pay.preimage_hex.clone(), json!({ "trade_id": trade_id, "kind": "preimage" }));

	ctx.store.upsert_trade(
		&trade_id,
		&TradePatch {
			state: Some(TradeState::LnPaid),
			ln_preimage_hex: Some(pay.preimage_hex.clone()),
			ln_payment_hash_hex: Some(decoded.payment_hash.clone()),
			ln_invoice_bolt11: Some(bolt11),
			sol_escrow_pda: Some(verified.escrow.escrow_pda.clone()),
			sol_vault_ata: Some(verified.escrow.vault_ata.clone()),
			sol_program_id: Some(verified.escrow.program_id.clone()),
			sol_mint: Some(verified.terms.sol_mint.clone()),
			sol_recipient: Some(verified.terms.sol_recipient.clone()),
			sol_refund: Some(verified.terms.sol_refund.clone()),
			sol_refund_after_unix: Some(verified.terms.sol_refund_after_unix),
			btc_sats: Some(btc_sats),
			usdt_amount: Some(verified.terms.usdt_amount.clone()),
			..Default::default()
		},
	)?;

	let swap_channel = ctx
		.store
		.get_trade(&trade_id)?
		.and_then(|t| t.swap_channel)
		.unwrap_or_else(|| format!("swap:{}", trade_id));
	let body = LnPaidBody { payment_hash: decoded.payment_hash.clone(), paid_at_unix: now_unix() };
	let (_, envelope_id) = sign_and_send(
		ctx,
		&swap_channel,
		Kind::LnPaid,
		&trade_id,
		serde_json::to_value(&body).map_err(|e| ToolError::internal(e.to_string()))?,
	)
	.await?;

	Ok(json!({
		"trade_id": trade_id,
		"payment_hash": decoded.payment_hash,
		"preimage_handle": preimage_handle,
		"fee_msat": pay.fee_msat,
		"mode": mode.as_str(),
		"envelope_id": envelope_id,
	}))
}
