//! Structural validation applied to every envelope before dispatch.
//!
//! This layer is purely shape-and-range: required/optional keys per kind
//! (unknown keys rejected by the typed bodies), the fixed trading pair,
//! fee ceilings, refund-window bounds, and field formats. Cross-envelope
//! and on-chain consistency live in the pre-pay verifier, not here.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::envelope::{is_valid_trade_id, Envelope};
use crate::error::WireError;
use crate::kinds::{
	AcceptBody, CancelBody, Kind, LnInvoiceBody, LnPaidBody, QuoteAcceptBody, QuoteBody, RfqBody,
	SolClaimedBody, SolEscrowCreatedBody, SolRefundedBody, StatusBody, SvcAnnounceBody,
	SwapInviteBody, TermsBody,
};
use crate::{
	MAX_PLATFORM_FEE_BPS, MAX_TOTAL_FEE_BPS, MAX_TRADE_FEE_BPS, PAIR, REFUND_WINDOW_MAX_SEC,
	REFUND_WINDOW_MIN_SEC, WIRE_VERSION,
};

/// Returns whether `s` is exactly 64 lower-hex characters (32 bytes).
pub fn is_hex_32b(s: &str) -> bool {
	s.len() == 64 && s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Returns whether `s` is exactly 66 lower-hex characters (33 bytes).
pub fn is_hex_33b(s: &str) -> bool {
	s.len() == 66 && s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Returns whether `s` is a non-negative decimal-string integer (`^[0-9]+$`).
pub fn is_decimal_amount(s: &str) -> bool {
	!s.is_empty() && s.len() <= 38 && s.chars().all(|c| c.is_ascii_digit())
}

/// Returns whether `s` decodes under the strict bitcoin base58 alphabet.
pub fn is_base58(s: &str) -> bool {
	!s.is_empty() && s.len() <= 64 && bs58::decode(s).into_vec().is_ok()
}

fn fail(kind: Kind, msg: impl Into<String>) -> WireError {
	WireError::SchemaViolation(format!("{}: {}", kind.as_str(), msg.into()))
}

fn parse_body<T: DeserializeOwned>(kind: Kind, body: &Value) -> Result<T, WireError> {
	serde_json::from_value(body.clone()).map_err(|e| fail(kind, e.to_string()))
}

fn check_pair(kind: Kind, pair: &str) -> Result<(), WireError> {
	if pair != PAIR {
		return Err(fail(kind, format!("pair must be {}, got {:?}", PAIR, pair)));
	}
	Ok(())
}

fn check_fee_bps(kind: Kind, platform_bps: u32, trade_bps: u32) -> Result<(), WireError> {
	if platform_bps > MAX_PLATFORM_FEE_BPS {
		return Err(fail(kind, format!("platform_fee_bps {} > {}", platform_bps, MAX_PLATFORM_FEE_BPS)));
	}
	if trade_bps > MAX_TRADE_FEE_BPS {
		return Err(fail(kind, format!("trade_fee_bps {} > {}", trade_bps, MAX_TRADE_FEE_BPS)));
	}
	if platform_bps + trade_bps > MAX_TOTAL_FEE_BPS {
		return Err(fail(
			kind,
			format!("platform + trade fee {} > {}", platform_bps + trade_bps, MAX_TOTAL_FEE_BPS),
		));
	}
	Ok(())
}

fn check_refund_window(kind: Kind, min_sec: u64, max_sec: u64) -> Result<(), WireError> {
	if min_sec < REFUND_WINDOW_MIN_SEC || max_sec > REFUND_WINDOW_MAX_SEC || min_sec > max_sec {
		return Err(fail(
			kind,
			format!(
				"refund window [{}, {}] outside [{}, {}]",
				min_sec, max_sec, REFUND_WINDOW_MIN_SEC, REFUND_WINDOW_MAX_SEC
			),
		));
	}
	Ok(())
}

fn check_hex_32b(kind: Kind, field: &str, value: &str) -> Result<(), WireError> {
	if !is_hex_32b(value) {
		return Err(fail(kind, format!("{} must be 32-byte lower hex", field)));
	}
	Ok(())
}

fn check_base58(kind: Kind, field: &str, value: &str) -> Result<(), WireError> {
	if !is_base58(value) {
		return Err(fail(kind, format!("{} must be base58", field)));
	}
	Ok(())
}

fn check_amount(kind: Kind, field: &str, value: &str) -> Result<(), WireError> {
	if !is_decimal_amount(value) {
		return Err(fail(kind, format!("{} must be a decimal-string integer", field)));
	}
	Ok(())
}

/// Validates an envelope's shape and its kind-specific body.
///
/// Signature verification is separate (`envelope::verify`); malformed
/// envelopes are rejected here before any dispatch or signature work.
pub fn validate_envelope(env: &Envelope) -> Result<(), WireError> {
	if env.v != WIRE_VERSION {
		return Err(WireError::MalformedEnvelope(format!("unsupported version {}", env.v)));
	}
	if !is_valid_trade_id(&env.trade_id) {
		return Err(WireError::MalformedEnvelope(format!("invalid trade_id: {:?}", env.trade_id)));
	}
	if !env.body.is_object() {
		return Err(WireError::MalformedEnvelope("body must be a JSON object".to_string()));
	}
	match env.kind {
		Kind::Rfq => validate_rfq(&parse_body(env.kind, &env.body)?),
		Kind::Quote => validate_quote(&parse_body(env.kind, &env.body)?),
		Kind::QuoteAccept => validate_quote_accept(&parse_body(env.kind, &env.body)?),
		Kind::SwapInvite => validate_swap_invite(&parse_body(env.kind, &env.body)?),
		Kind::Terms => validate_terms(&parse_body(env.kind, &env.body)?),
		Kind::Accept => validate_accept(&parse_body(env.kind, &env.body)?),
		Kind::LnInvoice => validate_ln_invoice(&parse_body(env.kind, &env.body)?),
		Kind::SolEscrowCreated => validate_sol_escrow_created(&parse_body(env.kind, &env.body)?),
		Kind::LnPaid => validate_ln_paid(&parse_body(env.kind, &env.body)?),
		Kind::SolClaimed => validate_sol_claimed(&parse_body(env.kind, &env.body)?),
		Kind::SolRefunded => validate_sol_refunded(&parse_body(env.kind, &env.body)?),
		Kind::Cancel => validate_cancel(&parse_body(env.kind, &env.body)?),
		Kind::Status => validate_status(&parse_body(env.kind, &env.body)?),
		Kind::SvcAnnounce => validate_svc_announce(&parse_body(env.kind, &env.body)?),
	}
}

pub fn validate_rfq(body: &RfqBody) -> Result<(), WireError> {
	let kind = Kind::Rfq;
	check_pair(kind, &body.pair)?;
	check_hex_32b(kind, "rfq_id", &body.rfq_id)?;
	check_amount(kind, "usdt_amount", &body.usdt_amount)?;
	if body.btc_sats == 0 {
		return Err(fail(kind, "btc_sats must be positive"));
	}
	// The taker's ceilings live inside the same hard bounds as real fees.
	if body.max_platform_fee_bps > MAX_PLATFORM_FEE_BPS {
		return Err(fail(kind, format!("max_platform_fee_bps > {}", MAX_PLATFORM_FEE_BPS)));
	}
	if body.max_trade_fee_bps > MAX_TRADE_FEE_BPS {
		return Err(fail(kind, format!("max_trade_fee_bps > {}", MAX_TRADE_FEE_BPS)));
	}
	if body.max_total_fee_bps > MAX_TOTAL_FEE_BPS {
		return Err(fail(kind, format!("max_total_fee_bps > {}", MAX_TOTAL_FEE_BPS)));
	}
	if let (Some(min), Some(max)) = (body.refund_window_min_sec, body.refund_window_max_sec) {
		check_refund_window(kind, min, max)?;
	}
	check_hex_32b(kind, "app_hash", &body.app_hash)?;
	Ok(())
}

pub fn validate_quote(body: &QuoteBody) -> Result<(), WireError> {
	let kind = Kind::Quote;
	check_pair(kind, &body.pair)?;
	check_hex_32b(kind, "rfq_id", &body.rfq_id)?;
	if let Some(offer_id) = &body.offer_id {
		check_hex_32b(kind, "offer_id", offer_id)?;
	}
	if body.offer_id.is_some() != body.line_index.is_some() {
		return Err(fail(kind, "offer_id and line_index must be set together"));
	}
	if body.btc_sats == 0 {
		return Err(fail(kind, "btc_sats must be positive"));
	}
	check_amount(kind, "usdt_amount", &body.usdt_amount)?;
	check_fee_bps(kind, body.platform_fee_bps, body.trade_fee_bps)?;
	if let Some(collector) = &body.platform_fee_collector {
		check_base58(kind, "platform_fee_collector", collector)?;
	}
	check_base58(kind, "trade_fee_collector", &body.trade_fee_collector)?;
	check_hex_32b(kind, "app_hash", &body.app_hash)?;
	Ok(())
}

pub fn validate_quote_accept(body: &QuoteAcceptBody) -> Result<(), WireError> {
	let kind = Kind::QuoteAccept;
	check_hex_32b(kind, "rfq_id", &body.rfq_id)?;
	check_hex_32b(kind, "quote_id", &body.quote_id)?;
	if let Some(offer_id) = &body.offer_id {
		check_hex_32b(kind, "offer_id", offer_id)?;
	}
	check_base58(kind, "sol_recipient", &body.sol_recipient)?;
	let hint = &body.ln_liquidity_hint;
	if hint.mode != "single_channel" && hint.mode != "aggregate" {
		return Err(fail(kind, format!("unknown liquidity hint mode {:?}", hint.mode)));
	}
	Ok(())
}

pub fn validate_swap_invite(body: &SwapInviteBody) -> Result<(), WireError> {
	let kind = Kind::SwapInvite;
	let suffix = body
		.swap_channel
		.strip_prefix("swap:")
		.ok_or_else(|| fail(kind, "swap_channel must start with \"swap:\""))?;
	if !is_valid_trade_id(suffix) {
		return Err(fail(kind, "swap_channel suffix is not a valid trade id"));
	}
	if body.invite.trim().is_empty() || body.welcome.trim().is_empty() {
		return Err(fail(kind, "invite and welcome must be non-empty"));
	}
	if let Some(invitee) = &body.invitee {
		check_hex_32b(kind, "invitee", invitee)?;
	}
	if let Some(offer_id) = &body.offer_id {
		check_hex_32b(kind, "offer_id", offer_id)?;
	}
	if body.offer_id.is_some() != body.line_index.is_some() {
		return Err(fail(kind, "offer_id and line_index must be set together"));
	}
	Ok(())
}

pub fn validate_terms(body: &TermsBody) -> Result<(), WireError> {
	let kind = Kind::Terms;
	check_pair(kind, &body.pair)?;
	if body.btc_sats == 0 {
		return Err(fail(kind, "btc_sats must be positive"));
	}
	check_amount(kind, "usdt_amount", &body.usdt_amount)?;
	check_base58(kind, "sol_mint", &body.sol_mint)?;
	check_base58(kind, "sol_recipient", &body.sol_recipient)?;
	check_base58(kind, "sol_refund", &body.sol_refund)?;
	if body.sol_refund_after_unix == 0 {
		return Err(fail(kind, "sol_refund_after_unix must be set"));
	}
	if !is_hex_33b(&body.ln_receiver_peer) {
		return Err(fail(kind, "ln_receiver_peer must be a 33-byte hex node id"));
	}
	check_hex_32b(kind, "ln_payer_peer", &body.ln_payer_peer)?;
	check_fee_bps(kind, body.platform_fee_bps, body.trade_fee_bps)?;
	if let Some(collector) = &body.platform_fee_collector {
		check_base58(kind, "platform_fee_collector", collector)?;
	}
	check_base58(kind, "trade_fee_collector", &body.trade_fee_collector)?;
	check_hex_32b(kind, "app_hash", &body.app_hash)?;
	Ok(())
}

pub fn validate_accept(body: &AcceptBody) -> Result<(), WireError> {
	check_hex_32b(Kind::Accept, "terms_hash", &body.terms_hash)
}

pub fn validate_ln_invoice(body: &LnInvoiceBody) -> Result<(), WireError> {
	let kind = Kind::LnInvoice;
	if !body.bolt11.trim().to_ascii_lowercase().starts_with("ln") {
		return Err(fail(kind, "bolt11 must be a lightning invoice"));
	}
	check_hex_32b(kind, "payment_hash", &body.payment_hash)?;
	check_amount(kind, "amount_msat", &body.amount_msat)?;
	if body.expires_at_unix == 0 {
		return Err(fail(kind, "expires_at_unix must be set"));
	}
	Ok(())
}

pub fn validate_sol_escrow_created(body: &SolEscrowCreatedBody) -> Result<(), WireError> {
	let kind = Kind::SolEscrowCreated;
	check_base58(kind, "program_id", &body.program_id)?;
	check_base58(kind, "escrow_pda", &body.escrow_pda)?;
	check_base58(kind, "vault_ata", &body.vault_ata)?;
	check_hex_32b(kind, "payment_hash", &body.payment_hash)?;
	if body.refund_after_unix == 0 {
		return Err(fail(kind, "refund_after_unix must be set"));
	}
	if let Some(tx_sig) = &body.tx_sig {
		if !is_base58_sig(tx_sig) {
			return Err(fail(kind, "tx_sig must be base58"));
		}
	}
	Ok(())
}

pub fn validate_ln_paid(body: &LnPaidBody) -> Result<(), WireError> {
	check_hex_32b(Kind::LnPaid, "payment_hash", &body.payment_hash)
}

pub fn validate_sol_claimed(body: &SolClaimedBody) -> Result<(), WireError> {
	let kind = Kind::SolClaimed;
	check_hex_32b(kind, "payment_hash", &body.payment_hash)?;
	if let Some(tx_sig) = &body.tx_sig {
		if !is_base58_sig(tx_sig) {
			return Err(fail(kind, "tx_sig must be base58"));
		}
	}
	Ok(())
}

pub fn validate_sol_refunded(body: &SolRefundedBody) -> Result<(), WireError> {
	let kind = Kind::SolRefunded;
	check_hex_32b(kind, "payment_hash", &body.payment_hash)?;
	if let Some(tx_sig) = &body.tx_sig {
		if !is_base58_sig(tx_sig) {
			return Err(fail(kind, "tx_sig must be base58"));
		}
	}
	Ok(())
}

pub fn validate_cancel(body: &CancelBody) -> Result<(), WireError> {
	if let Some(reason) = &body.reason {
		if reason.len() > 256 {
			return Err(fail(Kind::Cancel, "reason longer than 256 characters"));
		}
	}
	Ok(())
}

pub fn validate_status(body: &StatusBody) -> Result<(), WireError> {
	let kind = Kind::Status;
	let state = body.state.trim();
	if state.is_empty() || state.len() > 64 {
		return Err(fail(kind, "state must be 1-64 characters"));
	}
	if let Some(note) = &body.note {
		if note.len() > 512 {
			return Err(fail(kind, "note longer than 512 characters"));
		}
	}
	Ok(())
}

pub fn validate_svc_announce(body: &SvcAnnounceBody) -> Result<(), WireError> {
	let kind = Kind::SvcAnnounce;
	check_hex_32b(kind, "offer_id", &body.offer_id)?;
	check_pair(kind, &body.pair)?;
	if body.lines.is_empty() {
		return Err(fail(kind, "offer must carry at least one line"));
	}
	for line in &body.lines {
		if line.btc_sats == 0 {
			return Err(fail(kind, format!("line {} btc_sats must be positive", line.line_index)));
		}
		check_amount(kind, "usdt_amount", &line.usdt_amount)?;
		check_fee_bps(kind, line.platform_fee_bps, line.trade_fee_bps)?;
		check_refund_window(kind, line.refund_window_min_sec, line.refund_window_max_sec)?;
	}
	for channel in &body.rfq_channels {
		if channel.is_empty() || channel.len() > 128 {
			return Err(fail(kind, "rfq_channels entries must be 1-128 characters"));
		}
	}
	check_hex_32b(kind, "app_hash", &body.app_hash)?;
	Ok(())
}

// Solana transaction signatures are 64 bytes and encode past the 64-char
// bound used for addresses.
fn is_base58_sig(s: &str) -> bool {
	!s.is_empty() && s.len() <= 96 && bs58::decode(s).into_vec().is_ok()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::envelope::{app_hash, build_unsigned};
	use serde_json::json;

	const HEX32: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
	const MINT: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";

	fn rfq_value() -> serde_json::Value {
		json!({
			"pair": PAIR,
			"rfq_id": HEX32,
			"btc_sats": 50000u64,
			"usdt_amount": "50000000",
			"max_platform_fee_bps": 10,
			"max_trade_fee_bps": 10,
			"max_total_fee_bps": 20,
			"app_hash": app_hash(MINT),
		})
	}

	#[test]
	fn accepts_valid_rfq() {
		let env = build_unsigned(Kind::Rfq, "svc:demo:1", 1, rfq_value()).unwrap();
		validate_envelope(&env).unwrap();
	}

	#[test]
	fn rejects_unknown_keys() {
		let mut value = rfq_value();
		value["surprise"] = json!(true);
		let env = build_unsigned(Kind::Rfq, "svc:demo:1", 1, value).unwrap();
		assert!(matches!(validate_envelope(&env), Err(WireError::SchemaViolation(_))));
	}

	#[test]
	fn rejects_missing_and_mistyped_fields() {
		let mut missing = rfq_value();
		missing.as_object_mut().unwrap().remove("rfq_id");
		let env = build_unsigned(Kind::Rfq, "t", 1, missing).unwrap();
		assert!(validate_envelope(&env).is_err());

		let mut mistyped = rfq_value();
		mistyped["btc_sats"] = json!("50000");
		let env = build_unsigned(Kind::Rfq, "t", 1, mistyped).unwrap();
		assert!(validate_envelope(&env).is_err());
	}

	#[test]
	fn rejects_wrong_pair() {
		let mut value = rfq_value();
		value["pair"] = json!("BTC_LN:USDC_SOL");
		let env = build_unsigned(Kind::Rfq, "t", 1, value).unwrap();
		assert!(validate_envelope(&env).is_err());
	}

	#[test]
	fn rejects_non_decimal_amount() {
		let mut value = rfq_value();
		value["usdt_amount"] = json!("50_000_000");
		let env = build_unsigned(Kind::Rfq, "t", 1, value).unwrap();
		assert!(validate_envelope(&env).is_err());

		let mut negative = rfq_value();
		negative["usdt_amount"] = json!("-5");
		let env = build_unsigned(Kind::Rfq, "t", 1, negative).unwrap();
		assert!(validate_envelope(&env).is_err());
	}

	#[test]
	fn fee_ceilings_are_enforced() {
		let quote = QuoteBody {
			pair: PAIR.to_string(),
			rfq_id: HEX32.to_string(),
			offer_id: None,
			line_index: None,
			btc_sats: 1000,
			usdt_amount: "1000000".to_string(),
			platform_fee_bps: 501,
			trade_fee_bps: 10,
			platform_fee_collector: None,
			trade_fee_collector: MINT.to_string(),
			valid_until_unix: None,
			app_hash: app_hash(MINT),
		};
		assert!(validate_quote(&quote).is_err());

		let trade_heavy = QuoteBody { platform_fee_bps: 10, trade_fee_bps: 1001, ..quote.clone() };
		assert!(validate_quote(&trade_heavy).is_err());

		// The combined ceiling is inclusive: 500 + 1000 = 1500 still passes.
		let at_cap = QuoteBody { platform_fee_bps: 500, trade_fee_bps: 1000, ..quote };
		assert!(validate_quote(&at_cap).is_ok());
	}

	#[test]
	fn refund_window_bounds() {
		assert!(check_refund_window(Kind::SvcAnnounce, 3600, 604800).is_ok());
		assert!(check_refund_window(Kind::SvcAnnounce, 3599, 604800).is_err());
		assert!(check_refund_window(Kind::SvcAnnounce, 3600, 604801).is_err());
		assert!(check_refund_window(Kind::SvcAnnounce, 7200, 3600).is_err());
	}

	#[test]
	fn field_format_helpers() {
		assert!(is_hex_32b(HEX32));
		assert!(!is_hex_32b(&HEX32[..62]));
		assert!(!is_hex_32b(&HEX32.to_uppercase()));
		assert!(is_hex_33b(&format!("02{}", HEX32)));
		assert!(is_decimal_amount("0"));
		assert!(is_decimal_amount("50000000"));
		assert!(!is_decimal_amount(""));
		assert!(!is_decimal_amount("12.5"));
		assert!(is_base58(MINT));
		// 0, O, I, l are outside the bitcoin alphabet.
		assert!(!is_base58("0OIl"));
	}

	#[test]
	fn status_and_cancel_bounds() {
		assert!(validate_status(&StatusBody { state: "accepted".into(), note: None }).is_ok());
		assert!(validate_status(&StatusBody { state: "".into(), note: None }).is_err());
		assert!(validate_status(&StatusBody {
			state: "init".into(),
			note: Some("x".repeat(513)),
		})
		.is_err());
		assert!(validate_cancel(&CancelBody { reason: Some("x".repeat(257)) }).is_err());
		assert!(validate_cancel(&CancelBody { reason: None }).is_ok());
	}

	#[test]
	fn terms_requires_well_formed_identities() {
		let terms = TermsBody {
			pair: PAIR.to_string(),
			btc_sats: 50000,
			usdt_amount: "50000000".to_string(),
			sol_mint: MINT.to_string(),
			sol_recipient: MINT.to_string(),
			sol_refund: MINT.to_string(),
			sol_refund_after_unix: 1_700_259_200,
			ln_receiver_peer: format!("02{}", HEX32),
			ln_payer_peer: HEX32.to_string(),
			platform_fee_bps: 10,
			trade_fee_bps: 10,
			platform_fee_collector: None,
			trade_fee_collector: MINT.to_string(),
			app_hash: app_hash(MINT),
			terms_valid_until_unix: None,
		};
		assert!(validate_terms(&terms).is_ok());

		let bad_node = TermsBody { ln_receiver_peer: HEX32.to_string(), ..terms.clone() };
		assert!(validate_terms(&bad_node).is_err());

		let bad_payer = TermsBody { ln_payer_peer: format!("02{}", HEX32), ..terms.clone() };
		assert!(validate_terms(&bad_payer).is_err());

		let bad_mint = TermsBody { sol_mint: "not-base58-0OIl".to_string(), ..terms };
		assert!(validate_terms(&bad_mint).is_err());
	}
}
