// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Storage types for the durable trade journal.
//!
//! These types are separate from the wire definitions to decouple the
//! storage schema from the bus format; the journal can evolve without
//! touching what peers exchange.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which side of the swap this process plays for a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeRole {
	Maker,
	Taker,
}

impl TradeRole {
	pub fn as_str(&self) -> &'static str {
		match self {
			TradeRole::Maker => "maker",
			TradeRole::Taker => "taker",
		}
	}

	pub fn from_str(s: &str) -> Option<Self> {
		match s {
			"maker" => Some(TradeRole::Maker),
			"taker" => Some(TradeRole::Taker),
			_ => None,
		}
	}
}

/// Trade pipeline state.
///
/// States advance monotonically along the pipeline; `Claimed`, `Refunded`
/// and `Canceled` are terminal and may be branched into from any earlier
/// state, but never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeState {
	Rfq,
	Terms,
	Accepted,
	Invoice,
	Escrow,
	LnPaid,
	Claimed,
	Refunded,
	Canceled,
}

impl TradeState {
	pub fn as_str(&self) -> &'static str {
		match self {
			TradeState::Rfq => "rfq",
			TradeState::Terms => "terms",
			TradeState::Accepted => "accepted",
			TradeState::Invoice => "invoice",
			TradeState::Escrow => "escrow",
			TradeState::LnPaid => "ln_paid",
			TradeState::Claimed => "claimed",
			TradeState::Refunded => "refunded",
			TradeState::Canceled => "canceled",
		}
	}

	pub fn from_str(s: &str) -> Option<Self> {
		match s {
			"rfq" => Some(TradeState::Rfq),
			"terms" => Some(TradeState::Terms),
			"accepted" => Some(TradeState::Accepted),
			"invoice" => Some(TradeState::Invoice),
			"escrow" => Some(TradeState::Escrow),
			"ln_paid" => Some(TradeState::LnPaid),
			"claimed" => Some(TradeState::Claimed),
			"refunded" => Some(TradeState::Refunded),
			"canceled" => Some(TradeState::Canceled),
			_ => None,
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, TradeState::Claimed | TradeState::Refunded | TradeState::Canceled)
	}

	/// Position along the non-terminal pipeline, for monotonicity checks.
	pub fn pipeline_rank(&self) -> Option<u8> {
		match self {
			TradeState::Rfq => Some(0),
			TradeState::Terms => Some(1),
			TradeState::Accepted => Some(2),
			TradeState::Invoice => Some(3),
			TradeState::Escrow => Some(4),
			TradeState::LnPaid => Some(5),
			_ => None,
		}
	}
}

/// A durable trade journal row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
	pub trade_id: String,
	pub role: Option<TradeRole>,
	pub swap_channel: Option<String>,
	pub maker_peer: Option<String>,
	pub taker_peer: Option<String>,
	pub btc_sats: Option<u64>,
	/// Atomic USDT amount as a decimal string.
	pub usdt_amount: Option<String>,
	pub sol_mint: Option<String>,
	pub sol_program_id: Option<String>,
	pub sol_recipient: Option<String>,
	pub sol_refund: Option<String>,
	pub sol_escrow_pda: Option<String>,
	pub sol_vault_ata: Option<String>,
	pub sol_refund_after_unix: Option<u64>,
	pub ln_invoice_bolt11: Option<String>,
	pub ln_payment_hash_hex: Option<String>,
	pub ln_preimage_hex: Option<String>,
	pub state: TradeState,
	pub last_error: Option<String>,
	pub updated_at: u64,
}

/// Partial update applied by `upsert_trade`; unset fields are preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradePatch {
	pub role: Option<TradeRole>,
	pub swap_channel: Option<String>,
	pub maker_peer: Option<String>,
	pub taker_peer: Option<String>,
	pub btc_sats: Option<u64>,
	pub usdt_amount: Option<String>,
	pub sol_mint: Option<String>,
	pub sol_program_id: Option<String>,
	pub sol_recipient: Option<String>,
	pub sol_refund: Option<String>,
	pub sol_escrow_pda: Option<String>,
	pub sol_vault_ata: Option<String>,
	pub sol_refund_after_unix: Option<u64>,
	pub ln_invoice_bolt11: Option<String>,
	pub ln_payment_hash_hex: Option<String>,
	pub ln_preimage_hex: Option<String>,
	pub state: Option<TradeState>,
	pub last_error: Option<String>,
}

/// Append-only per-trade journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
	pub trade_id: String,
	pub seq: u64,
	pub kind: String,
	pub ts: u64,
	pub body: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingType {
	Rfq,
	OfferLine,
}

impl ListingType {
	pub fn as_str(&self) -> &'static str {
		match self {
			ListingType::Rfq => "rfq",
			ListingType::OfferLine => "offer_line",
		}
	}

	pub fn from_str(s: &str) -> Option<Self> {
		match s {
			"rfq" => Some(ListingType::Rfq),
			"offer_line" => Some(ListingType::OfferLine),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
	InFlight,
	Filled,
}

impl LockState {
	pub fn as_str(&self) -> &'static str {
		match self {
			LockState::InFlight => "in_flight",
			LockState::Filled => "filled",
		}
	}

	pub fn from_str(s: &str) -> Option<Self> {
		match s {
			"in_flight" => Some(LockState::InFlight),
			"filled" => Some(LockState::Filled),
			_ => None,
		}
	}
}

/// Row reserving an RFQ or offer line as in-flight or filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingLock {
	/// `rfq:{rfq_id}` or `offer_line:{offer_id}:{idx}`.
	pub listing_key: String,
	pub listing_type: ListingType,
	pub listing_id: String,
	pub trade_id: Option<String>,
	pub state: LockState,
	pub note: Option<String>,
	pub meta: Option<Value>,
	pub updated_at: u64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn state_strings_round_trip() {
		for state in [
			TradeState::Rfq,
			TradeState::Terms,
			TradeState::Accepted,
			TradeState::Invoice,
			TradeState::Escrow,
			TradeState::LnPaid,
			TradeState::Claimed,
			TradeState::Refunded,
			TradeState::Canceled,
		] {
			assert_eq!(TradeState::from_str(state.as_str()), Some(state));
		}
		assert_eq!(TradeState::from_str("nope"), None);
	}

	#[test]
	fn terminal_states_have_no_rank() {
		assert!(TradeState::Claimed.is_terminal());
		assert!(TradeState::Refunded.is_terminal());
		assert!(TradeState::Canceled.is_terminal());
		assert_eq!(TradeState::Claimed.pipeline_rank(), None);
		assert_eq!(TradeState::Rfq.pipeline_rank(), Some(0));
		assert_eq!(TradeState::LnPaid.pipeline_rank(), Some(5));
	}
}
