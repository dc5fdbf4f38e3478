// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Pre-pay verifier.
//!
//! Before the taker pays the Lightning invoice, the TERMS envelope, the
//! LN_INVOICE envelope, the SOL_ESCROW_CREATED envelope and the live
//! on-chain escrow state must all agree. Every check failing here is a
//! business invariant: the automation loop treats it as permanent.

use std::fmt;

use intercomswap_wire::envelope::app_hash;
use intercomswap_wire::kinds::{LnInvoiceBody, SolEscrowCreatedBody, TermsBody};
use intercomswap_wire::{Envelope, Kind};

use crate::ln::DecodedInvoice;
use crate::sol::{EscrowState, EscrowStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyError {
	pub check: &'static str,
	pub message: String,
}

impl VerifyError {
	fn new(check: &'static str, message: impl Into<String>) -> Self {
		Self { check, message: message.into() }
	}
}

impl fmt::Display for VerifyError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "pre-pay check {} failed: {}", self.check, self.message)
	}
}

impl std::error::Error for VerifyError {}

/// Everything the verifier needs; all I/O happens at the caller.
pub struct PrePayInputs<'a> {
	pub terms_env: &'a Envelope,
	pub invoice_env: &'a Envelope,
	pub escrow_env: &'a Envelope,
	pub escrow_state: &'a EscrowState,
	pub decoded_invoice: &'a DecodedInvoice,
	pub configured_program_id: &'a str,
	/// `(escrow_pda, vault_ata)` derived locally from the payment hash.
	pub derived_escrow_pda: &'a str,
	pub now_unix: u64,
}

/// The typed bodies of the three envelopes once all checks pass.
#[derive(Debug)]
pub struct VerifiedSwap {
	pub terms: TermsBody,
	pub invoice: LnInvoiceBody,
	pub escrow: SolEscrowCreatedBody,
}

pub fn verify_pre_pay(inputs: &PrePayInputs<'_>) -> Result<VerifiedSwap, VerifyError> {
	let terms = parse_body::<TermsBody>(inputs.terms_env, Kind::Terms)?;
	let invoice = parse_body::<LnInvoiceBody>(inputs.invoice_env, Kind::LnInvoice)?;
	let escrow = parse_body::<SolEscrowCreatedBody>(inputs.escrow_env, Kind::SolEscrowCreated)?;

	// 1. One trade id across all three envelopes.
	if inputs.terms_env.trade_id != inputs.invoice_env.trade_id
		|| inputs.terms_env.trade_id != inputs.escrow_env.trade_id
	{
		return Err(VerifyError::new(
			"trade_id",
			format!(
				"terms={} invoice={} escrow={}",
				inputs.terms_env.trade_id, inputs.invoice_env.trade_id, inputs.escrow_env.trade_id
			),
		));
	}

	// 2. Terms are bound to our program deployment.
	let expected_app_hash = app_hash(inputs.configured_program_id);
	if terms.app_hash != expected_app_hash {
		return Err(VerifyError::new(
			"app_hash",
			format!("terms bound to {}, expected {}", terms.app_hash, expected_app_hash),
		));
	}

	// 3. The escrow was created under that same program.
	if escrow.program_id != inputs.configured_program_id {
		return Err(VerifyError::new(
			"program_id",
			format!("escrow under {}, configured {}", escrow.program_id, inputs.configured_program_id),
		));
	}

	// 4. The invoice pays the right node the right amount.
	if inputs.decoded_invoice.destination != terms.ln_receiver_peer {
		return Err(VerifyError::new(
			"invoice_destination",
			format!(
				"invoice pays {}, terms name {}",
				inputs.decoded_invoice.destination, terms.ln_receiver_peer
			),
		));
	}
	let expected_msat = terms.btc_sats.checked_mul(1000).ok_or_else(|| {
		VerifyError::new("invoice_amount", format!("btc_sats {} overflows msat", terms.btc_sats))
	})?;
	match inputs.decoded_invoice.amount_msat {
		Some(amount_msat) if amount_msat == expected_msat => {},
		Some(amount_msat) => {
			return Err(VerifyError::new(
				"invoice_amount",
				format!("invoice {} msat, terms require {} msat", amount_msat, expected_msat),
			));
		},
		None => {
			return Err(VerifyError::new("invoice_amount", "amountless invoice rejected"));
		},
	}
	if inputs.decoded_invoice.payment_hash != invoice.payment_hash
		|| escrow.payment_hash != invoice.payment_hash
	{
		return Err(VerifyError::new(
			"payment_hash",
			format!(
				"decoded={} invoice_env={} escrow_env={}",
				inputs.decoded_invoice.payment_hash, invoice.payment_hash, escrow.payment_hash
			),
		));
	}

	// 5. The on-chain escrow matches the terms field by field.
	let state = inputs.escrow_state;
	if escrow.escrow_pda != inputs.derived_escrow_pda {
		return Err(VerifyError::new(
			"escrow_pda",
			format!("announced {}, derived {}", escrow.escrow_pda, inputs.derived_escrow_pda),
		));
	}
	if state.payment_hash_hex != invoice.payment_hash {
		return Err(VerifyError::new(
			"escrow_payment_hash",
			format!("on-chain {}, invoice {}", state.payment_hash_hex, invoice.payment_hash),
		));
	}
	if state.status != EscrowStatus::Active {
		return Err(VerifyError::new("escrow_status", format!("escrow is {:?}", state.status)));
	}
	if state.recipient != terms.sol_recipient {
		return Err(VerifyError::new(
			"escrow_recipient",
			format!("on-chain {}, terms {}", state.recipient, terms.sol_recipient),
		));
	}
	if state.refund != terms.sol_refund {
		return Err(VerifyError::new(
			"escrow_refund",
			format!("on-chain {}, terms {}", state.refund, terms.sol_refund),
		));
	}
	if state.mint != terms.sol_mint {
		return Err(VerifyError::new(
			"escrow_mint",
			format!("on-chain {}, terms {}", state.mint, terms.sol_mint),
		));
	}
	if state.refund_after_unix != terms.sol_refund_after_unix {
		return Err(VerifyError::new(
			"escrow_refund_after",
			format!("on-chain {}, terms {}", state.refund_after_unix, terms.sol_refund_after_unix),
		));
	}
	let total = state
		.net_amount
		.checked_add(state.platform_fee_amount)
		.and_then(|sum| sum.checked_add(state.trade_fee_amount))
		.ok_or_else(|| VerifyError::new("escrow_amount", "escrow amounts overflow"))?;
	let terms_amount: u64 = terms.usdt_amount.parse().map_err(|_| {
		VerifyError::new("escrow_amount", format!("terms usdt_amount {:?} not a u64", terms.usdt_amount))
	})?;
	if total != terms_amount {
		return Err(VerifyError::new(
			"escrow_amount",
			format!(
				"net {} + platform fee {} + trade fee {} = {} != terms {}",
				state.net_amount,
				state.platform_fee_amount,
				state.trade_fee_amount,
				total,
				terms_amount
			),
		));
	}

	// 6. Fee guardrails: terms must equal the on-chain configuration.
	if state.platform_fee_bps != terms.platform_fee_bps {
		return Err(VerifyError::new(
			"platform_fee_bps",
			format!("on-chain {}, terms {}", state.platform_fee_bps, terms.platform_fee_bps),
		));
	}
	if state.trade_fee_bps != terms.trade_fee_bps {
		return Err(VerifyError::new(
			"trade_fee_bps",
			format!("on-chain {}, terms {}", state.trade_fee_bps, terms.trade_fee_bps),
		));
	}
	if state.trade_fee_collector != terms.trade_fee_collector {
		return Err(VerifyError::new(
			"trade_fee_collector",
			format!("on-chain {}, terms {}", state.trade_fee_collector, terms.trade_fee_collector),
		));
	}

	// 7. Both legs must still have time to settle.
	if inputs.now_unix >= inputs.decoded_invoice.expires_at_unix {
		return Err(VerifyError::new(
			"invoice_expiry",
			format!(
				"invoice expired at {}, now {}",
				inputs.decoded_invoice.expires_at_unix, inputs.now_unix
			),
		));
	}
	if inputs.now_unix >= state.refund_after_unix {
		return Err(VerifyError::new(
			"refund_window",
			format!(
				"escrow refundable since {}, now {}",
				state.refund_after_unix, inputs.now_unix
			),
		));
	}

	Ok(VerifiedSwap { terms, invoice, escrow })
}

fn parse_body<T: serde::de::DeserializeOwned>(
	env: &Envelope, expected: Kind,
) -> Result<T, VerifyError> {
	if env.kind != expected {
		return Err(VerifyError::new(
			"envelope_kind",
			format!("expected {}, got {}", expected.as_str(), env.kind.as_str()),
		));
	}
	serde_json::from_value(env.body.clone())
		.map_err(|e| VerifyError::new("envelope_body", format!("{}: {}", expected.as_str(), e)))
}
