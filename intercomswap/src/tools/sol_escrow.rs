// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! `sol_escrow_init_and_post` — maker locks USDT under the payment hash.
//!
//! Gated on the payer's route precheck: the maker will not lock funds
//! until a `STATUS{state=accepted, note=ln_route_precheck_ok...}` from the
//! payer arrived with a log sequence above our LN_INVOICE announcement. A
//! later `ln_route_precheck_fail` (higher seq wins) aborts the trade while
//! CANCEL is still allowed.

use serde_json::{json, Value};

use intercomswap_wire::kinds::{SolEscrowCreatedBody, StatusBody};
use intercomswap_wire::{Envelope, Kind};

use crate::fees::fee_snapshot;
use crate::io::persist::types::{TradePatch, TradeState};
use crate::rpc::with_io_timeout;
use crate::service::{EngineContext, ExecuteOpts};
use crate::sol::{CreateEscrowParams, ESCROW_ACCOUNT_SPACE, TOKEN_ACCOUNT_SPACE};
use crate::tools::args::Args;
use crate::tools::error::ToolError;
use crate::tools::{dry_run_result, sign_and_send};

const TOOL: &str = "sol_escrow_init_and_post";
const ALLOWED: &[&str] = &["trade_id"];

pub(crate) const ROUTE_PRECHECK_OK_PREFIX: &str = "ln_route_precheck_ok";
pub(crate) const ROUTE_PRECHECK_FAIL_PREFIX: &str = "ln_route_precheck_fail";

/// Outcome of scanning the swap channel for the payer's precheck verdict.
enum PrecheckGate {
	/// `ln_route_precheck_ok` seen after our invoice announcement.
	Passed,
	/// Nothing authoritative yet; wait and retry.
	Waiting(String),
	/// A later `ln_route_precheck_fail` is authoritative; abort.
	Failed(String),
}

fn scan_precheck_gate(
	ctx: &EngineContext, trade_id: &str, swap_channel: &str, payer_peer: &str,
) -> PrecheckGate {
	let events = ctx.session.events_since(0, usize::MAX, u64::MAX);

	let invoice_seq = events
		.iter()
		.filter(|event| event.channel == swap_channel)
		.filter_map(|event| event.envelope().map(|env| (event.seq, env)))
		.filter(|(_, env)| env.kind == Kind::LnInvoice && env.trade_id == trade_id)
		.map(|(seq, _)| seq)
		.max();
	let invoice_seq = match invoice_seq {
		Some(seq) => seq,
		None => {
			// Keep the marker phrase in this message too: the automation
			// loop parks waiting outcomes on it, and an invoice evicted
			// from the log ring must not burn the stage's retry budget.
			return PrecheckGate::Waiting(format!(
				"no ln_route_precheck_ok yet for trade {} (no LN_INVOICE in the session log)",
				trade_id
			));
		},
	};

	let mut last_ok: Option<u64> = None;
	let mut last_fail: Option<u64> = None;
	for event in events.iter().filter(|event| event.channel == swap_channel) {
		let env: Envelope = match event.envelope() {
			Some(env) => env,
			None => continue,
		};
		if env.kind != Kind::Status
			|| env.trade_id != trade_id
			|| env.signer.as_deref() != Some(payer_peer)
			|| event.seq <= invoice_seq
		{
			continue;
		}
		let status: StatusBody = match serde_json::from_value(env.body) {
			Ok(status) => status,
			Err(_) => continue,
		};
		let note = status.note.unwrap_or_default();
		if status.state == "accepted" && note.starts_with(ROUTE_PRECHECK_OK_PREFIX) {
			last_ok = Some(last_ok.map_or(event.seq, |s| s.max(event.seq)));
		} else if note.starts_with(ROUTE_PRECHECK_FAIL_PREFIX) {
			last_fail = Some(last_fail.map_or(event.seq, |s| s.max(event.seq)));
		}
	}

	// The higher sequence number is authoritative.
	match (last_ok, last_fail) {
		(Some(ok), Some(fail)) if fail > ok => {
			PrecheckGate::Failed(format!("payer reported ln_route_precheck_fail at seq {}", fail))
		},
		(Some(_), _) => PrecheckGate::Passed,
		(None, Some(fail)) => {
			PrecheckGate::Failed(format!("payer reported ln_route_precheck_fail at seq {}", fail))
		},
		(None, None) => PrecheckGate::Waiting(format!(
			"no ln_route_precheck_ok from payer {} after invoice seq {}",
			payer_peer, invoice_seq
		)),
	}
}

pub(crate) async fn handle(
	ctx: &EngineContext, raw: &Value, opts: &ExecuteOpts,
) -> Result<Value, ToolError> {
	let args = Args::new(TOOL, raw, &ctx.vault, ALLOWED)?;
	let trade_id = args.req_str("trade_id", 1, 128)?;

	let trade = ctx
		.store
		.get_trade(&trade_id)?
		.ok_or_else(|| ToolError::precondition(format!("unknown trade {}", trade_id)))?;
	let swap_channel = trade.swap_channel.clone().ok_or_else(|| {
		ToolError::precondition(format!("trade {} has no swap channel", trade_id))
	})?;
	let payment_hash = trade.ln_payment_hash_hex.clone().ok_or_else(|| {
		ToolError::precondition(format!("trade {} has no payment hash yet", trade_id))
	})?;
	let payer_peer = trade.taker_peer.clone().ok_or_else(|| {
		ToolError::precondition(format!("trade {} has no payer peer recorded", trade_id))
	})?;
	let recipient = trade.sol_recipient.clone().ok_or_else(|| {
		ToolError::precondition(format!("trade {} has no sol_recipient", trade_id))
	})?;
	let refund_after_unix = trade.sol_refund_after_unix.ok_or_else(|| {
		ToolError::precondition(format!("trade {} has no refund deadline", trade_id))
	})?;
	let amount: u64 = trade
		.usdt_amount
		.as_deref()
		.and_then(|s| s.parse().ok())
		.ok_or_else(|| ToolError::precondition(format!("trade {} has no usdt_amount", trade_id)))?;
	let mint = trade.sol_mint.clone().unwrap_or_else(|| ctx.config.solana.mint.clone());

	match scan_precheck_gate(ctx, &trade_id, &swap_channel, &payer_peer) {
		PrecheckGate::Passed => {},
		PrecheckGate::Waiting(why) => return Err(ToolError::precondition(why)),
		PrecheckGate::Failed(why) => return Err(ToolError::invariant(why)),
	}

	let timeout_ms = ctx.config.swap.io_timeout_ms;
	let collector = ctx
		.config
		.solana
		.trade_fee_collector
		.clone()
		.unwrap_or_else(|| ctx.sol.local_signer());
	let fees =
		with_io_timeout("fee snapshot", timeout_ms, fee_snapshot(ctx.sol.as_ref(), &collector))
			.await?;

	let params = CreateEscrowParams {
		payment_hash_hex: payment_hash.clone(),
		mint: mint.clone(),
		recipient: recipient.clone(),
		refund: ctx.sol.local_signer(),
		refund_after_unix,
		amount,
		trade_fee_collector: fees.trade_fee_collector.clone(),
	};
	let tx = with_io_timeout(
		"sol build_create_escrow_tx",
		timeout_ms,
		ctx.sol.build_create_escrow_tx(&params),
	)
	.await?;

	let (escrow_pda, vault_ata) = with_io_timeout(
		"sol derive_escrow_pda",
		timeout_ms,
		ctx.sol.derive_escrow_pda(&payment_hash),
	)
	.await?;

	// Lamports guardrail: the tx fee plus rent for every account this
	// creation may have to bring into existence.
	let tx_fee =
		with_io_timeout("sol get_fee_for_message", timeout_ms, ctx.sol.get_fee_for_message(&tx))
			.await?;
	let escrow_rent = with_io_timeout(
		"sol rent escrow",
		timeout_ms,
		ctx.sol.get_minimum_balance_for_rent_exemption(ESCROW_ACCOUNT_SPACE),
	)
	.await?;
	let token_rent = with_io_timeout(
		"sol rent token account",
		timeout_ms,
		ctx.sol.get_minimum_balance_for_rent_exemption(TOKEN_ACCOUNT_SPACE),
	)
	.await?;
	let mut missing_token_accounts = 0u64;
	let platform_ata = with_io_timeout(
		"sol ata platform",
		timeout_ms,
		ctx.sol.get_associated_token_address(&fees.platform_fee_collector, &mint),
	)
	.await?;
	let trade_ata = with_io_timeout(
		"sol ata trade",
		timeout_ms,
		ctx.sol.get_associated_token_address(&fees.trade_fee_collector, &mint),
	)
	.await?;
	for account in [&vault_ata, &platform_ata, &trade_ata] {
		let info =
			with_io_timeout("sol get_account_info", timeout_ms, ctx.sol.get_account_info(account))
				.await?;
		if info.is_none() {
			missing_token_accounts += 1;
		}
	}
	let need = tx_fee + escrow_rent + missing_token_accounts * token_rent;
	let payer = ctx.sol.local_signer();
	let balance =
		with_io_timeout("sol get_balance", timeout_ms, ctx.sol.get_balance(&payer)).await?;
	if balance < need {
		return Err(ToolError::precondition(format!(
			"insufficient lamports for escrow init: need {} (fee {} + escrow rent {} + {} token accounts x {}), have {}",
			need, tx_fee, escrow_rent, missing_token_accounts, token_rent, balance
		)));
	}

	if opts.dry_run {
		return Ok(dry_run_result(
			TOOL,
			json!({
				"trade_id": trade_id,
				"escrow_pda": escrow_pda,
				"vault_ata": vault_ata,
				"amount": amount.to_string(),
				"lamports_needed": need,
			}),
		));
	}

	let signature =
		with_io_timeout("sol send_raw_transaction", timeout_ms, ctx.sol.send_raw_transaction(&tx))
			.await?;
	with_io_timeout(
		"sol confirm_transaction",
		timeout_ms,
		ctx.sol.confirm_transaction(&signature),
	)
	.await?;

	ctx.store.upsert_trade(
		&trade_id,
		&TradePatch {
			state: Some(TradeState::Escrow),
			sol_program_id: Some(ctx.sol.program_id()),
			sol_escrow_pda: Some(escrow_pda.clone()),
			sol_vault_ata: Some(vault_ata.clone()),
			sol_mint: Some(mint),
			..Default::default()
		},
	)?;

	let body = SolEscrowCreatedBody {
		program_id: ctx.sol.program_id(),
		escrow_pda: escrow_pda.clone(),
		vault_ata: vault_ata.clone(),
		payment_hash: payment_hash.clone(),
		refund_after_unix,
		tx_sig: Some(signature.clone()),
	};
	let (_, envelope_id) = sign_and_send(
		ctx,
		&swap_channel,
		Kind::SolEscrowCreated,
		&trade_id,
		serde_json::to_value(&body).map_err(|e| ToolError::internal(e.to_string()))?,
	)
	.await?;

	Ok(json!({
		"trade_id": trade_id,
		"escrow_pda": escrow_pda,
		"vault_ata": vault_ata,
		"tx_sig": signature,
		"envelope_id": envelope_id,
	}))
}
