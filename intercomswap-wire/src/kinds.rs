//! The closed set of envelope kinds and their typed bodies.
//!
//! Bodies travel as JSON objects inside [`crate::Envelope::body`]; the
//! structs here are the typed view used by builders and the validator.
//! All of them reject unknown keys on deserialization.

use serde::{Deserialize, Serialize};

/// Message kind, as spelled on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
	#[serde(rename = "swap.rfq")]
	Rfq,
	#[serde(rename = "swap.quote")]
	Quote,
	#[serde(rename = "swap.quote_accept")]
	QuoteAccept,
	#[serde(rename = "swap.swap_invite")]
	SwapInvite,
	#[serde(rename = "swap.terms")]
	Terms,
	#[serde(rename = "swap.accept")]
	Accept,
	#[serde(rename = "swap.ln_invoice")]
	LnInvoice,
	#[serde(rename = "swap.sol_escrow_created")]
	SolEscrowCreated,
	#[serde(rename = "swap.ln_paid")]
	LnPaid,
	#[serde(rename = "swap.sol_claimed")]
	SolClaimed,
	#[serde(rename = "swap.sol_refunded")]
	SolRefunded,
	#[serde(rename = "swap.cancel")]
	Cancel,
	#[serde(rename = "swap.status")]
	Status,
	#[serde(rename = "swap.svc_announce")]
	SvcAnnounce,
}

impl Kind {
	pub fn as_str(&self) -> &'static str {
		match self {
			Kind::Rfq => "swap.rfq",
			Kind::Quote => "swap.quote",
			Kind::QuoteAccept => "swap.quote_accept",
			Kind::SwapInvite => "swap.swap_invite",
			Kind::Terms => "swap.terms",
			Kind::Accept => "swap.accept",
			Kind::LnInvoice => "swap.ln_invoice",
			Kind::SolEscrowCreated => "swap.sol_escrow_created",
			Kind::LnPaid => "swap.ln_paid",
			Kind::SolClaimed => "swap.sol_claimed",
			Kind::SolRefunded => "swap.sol_refunded",
			Kind::Cancel => "swap.cancel",
			Kind::Status => "swap.status",
			Kind::SvcAnnounce => "swap.svc_announce",
		}
	}

	pub fn from_str(s: &str) -> Option<Kind> {
		match s {
			"swap.rfq" => Some(Kind::Rfq),
			"swap.quote" => Some(Kind::Quote),
			"swap.quote_accept" => Some(Kind::QuoteAccept),
			"swap.swap_invite" => Some(Kind::SwapInvite),
			"swap.terms" => Some(Kind::Terms),
			"swap.accept" => Some(Kind::Accept),
			"swap.ln_invoice" => Some(Kind::LnInvoice),
			"swap.sol_escrow_created" => Some(Kind::SolEscrowCreated),
			"swap.ln_paid" => Some(Kind::LnPaid),
			"swap.sol_claimed" => Some(Kind::SolClaimed),
			"swap.sol_refunded" => Some(Kind::SolRefunded),
			"swap.cancel" => Some(Kind::Cancel),
			"swap.status" => Some(Kind::Status),
			"swap.svc_announce" => Some(Kind::SvcAnnounce),
			_ => None,
		}
	}

	/// Whether observing this kind ends a trade.
	pub fn is_terminal(&self) -> bool {
		matches!(self, Kind::SolClaimed | Kind::SolRefunded | Kind::Cancel)
	}
}

/// Taker's request for quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RfqBody {
	/// Always `BTC_LN:USDT_SOL`.
	pub pair: String,
	/// 32-byte hex id reserving the RFQ listing lock.
	pub rfq_id: String,
	pub btc_sats: u64,
	/// Atomic USDT amount as a decimal string.
	pub usdt_amount: String,
	/// Ceiling the taker will accept for the platform fee.
	pub max_platform_fee_bps: u32,
	/// Ceiling the taker will accept for the trade fee.
	pub max_trade_fee_bps: u32,
	/// Ceiling the taker will accept for platform + trade combined.
	pub max_total_fee_bps: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub refund_window_min_sec: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub refund_window_max_sec: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub valid_until_unix: Option<u64>,
	pub app_hash: String,
}

/// Maker's price + fee commitment, bound to an offer line when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuoteBody {
	pub pair: String,
	pub rfq_id: String,
	/// Offer this quote is bound to, if any.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub offer_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub line_index: Option<u32>,
	pub btc_sats: u64,
	pub usdt_amount: String,
	/// From the on-chain fee snapshot, never negotiated.
	pub platform_fee_bps: u32,
	pub trade_fee_bps: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub platform_fee_collector: Option<String>,
	pub trade_fee_collector: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub valid_until_unix: Option<u64>,
	pub app_hash: String,
}

/// Outbound-liquidity observation the taker attaches to QUOTE_ACCEPT so
/// the maker can size the invite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LnLiquidityHint {
	/// `single_channel` or `aggregate`.
	pub mode: String,
	pub required_sats: u64,
	pub max_single_outbound_sats: u64,
	pub total_outbound_sats: u64,
	pub active_channels: u32,
	pub observed_at_unix: u64,
}

/// Taker's commitment to a quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuoteAcceptBody {
	pub rfq_id: String,
	/// Envelope id of the accepted quote.
	pub quote_id: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub offer_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub line_index: Option<u32>,
	/// Taker's Solana claim address, base58; the maker copies it into
	/// TERMS as `sol_recipient`.
	pub sol_recipient: String,
	pub ln_liquidity_hint: LnLiquidityHint,
}

/// Maker's signed invitation to a private `swap:<trade_id>` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwapInviteBody {
	pub swap_channel: String,
	/// Opaque bus invite token.
	pub invite: String,
	/// Opaque bus welcome token for join verification.
	pub welcome: String,
	/// Sidechannel peer the invite is restricted to, if any.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub invitee: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub offer_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub line_index: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub valid_until_unix: Option<u64>,
}

/// The full signed commitment for one swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TermsBody {
	pub pair: String,
	pub btc_sats: u64,
	pub usdt_amount: String,
	/// SPL mint of the escrowed stablecoin, base58.
	pub sol_mint: String,
	/// Taker's claim address, base58.
	pub sol_recipient: String,
	/// Maker's refund address, base58.
	pub sol_refund: String,
	pub sol_refund_after_unix: u64,
	/// LN node id the invoice must pay to (33-byte hex).
	pub ln_receiver_peer: String,
	/// Sidechannel peer expected to pay the invoice (32-byte hex).
	pub ln_payer_peer: String,
	pub platform_fee_bps: u32,
	pub trade_fee_bps: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub platform_fee_collector: Option<String>,
	pub trade_fee_collector: String,
	pub app_hash: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub terms_valid_until_unix: Option<u64>,
}

/// Taker's acceptance, committing to the exact terms envelope by hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcceptBody {
	/// `hash_terms` of the TERMS envelope, lower hex.
	pub terms_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LnInvoiceBody {
	pub bolt11: String,
	pub payment_hash: String,
	/// Millisatoshi amount as a decimal string.
	pub amount_msat: String,
	pub expires_at_unix: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolEscrowCreatedBody {
	pub program_id: String,
	pub escrow_pda: String,
	pub vault_ata: String,
	pub payment_hash: String,
	pub refund_after_unix: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tx_sig: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LnPaidBody {
	pub payment_hash: String,
	pub paid_at_unix: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolClaimedBody {
	pub payment_hash: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tx_sig: Option<String>,
	pub claimed_at_unix: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolRefundedBody {
	pub payment_hash: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tx_sig: Option<String>,
	pub refunded_at_unix: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelBody {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusBody {
	pub state: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub note: Option<String>,
}

/// One sellable line of a broadcast offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OfferLine {
	pub line_index: u32,
	pub btc_sats: u64,
	pub usdt_amount: String,
	pub platform_fee_bps: u32,
	pub trade_fee_bps: u32,
	pub refund_window_min_sec: u64,
	pub refund_window_max_sec: u64,
}

/// Periodic offer broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SvcAnnounceBody {
	/// 32-byte hex offer id; lines are addressed as `{offer_id}:{line_index}`.
	pub offer_id: String,
	pub pair: String,
	pub lines: Vec<OfferLine>,
	/// Negotiation channels this offer is willing to quote on.
	pub rfq_channels: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub valid_until_unix: Option<u64>,
	pub app_hash: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn kind_strings_round_trip() {
		let all = [
			Kind::Rfq,
			Kind::Quote,
			Kind::QuoteAccept,
			Kind::SwapInvite,
			Kind::Terms,
			Kind::Accept,
			Kind::LnInvoice,
			Kind::SolEscrowCreated,
			Kind::LnPaid,
			Kind::SolClaimed,
			Kind::SolRefunded,
			Kind::Cancel,
			Kind::Status,
			Kind::SvcAnnounce,
		];
		for kind in all {
			assert_eq!(Kind::from_str(kind.as_str()), Some(kind));
			let json = serde_json::to_string(&kind).unwrap();
			assert_eq!(json, format!("\"{}\"", kind.as_str()));
			let back: Kind = serde_json::from_str(&json).unwrap();
			assert_eq!(back, kind);
		}
		assert_eq!(Kind::from_str("swap.unknown"), None);
	}

	#[test]
	fn terminal_kinds() {
		assert!(Kind::SolClaimed.is_terminal());
		assert!(Kind::SolRefunded.is_terminal());
		assert!(Kind::Cancel.is_terminal());
		assert!(!Kind::LnPaid.is_terminal());
		assert!(!Kind::Status.is_terminal());
	}
}
