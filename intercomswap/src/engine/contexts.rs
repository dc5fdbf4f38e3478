// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Per-tick context building.
//!
//! The retained event window is partitioned into a negotiation view per
//! trade id (RFQ through SWAP_INVITE) and a settlement view per swap
//! channel (TERMS through the terminal envelopes). Both are plain maps
//! keyed by trade id / channel; no back-pointers.

use std::collections::HashMap;

use intercomswap_wire::kinds::{
	AcceptBody, LnInvoiceBody, QuoteAcceptBody, QuoteBody, RfqBody, SolEscrowCreatedBody,
	StatusBody, SvcAnnounceBody, SwapInviteBody, TermsBody,
};
use intercomswap_wire::{Envelope, Kind};

use crate::sidechannel::LogEvent;

/// One log event with its parsed envelope.
#[derive(Debug, Clone)]
pub struct EventView {
	pub seq: u64,
	pub ts: u64,
	pub channel: String,
	pub local: bool,
	pub env: Envelope,
}

impl EventView {
	pub fn signer(&self) -> Option<&str> {
		self.env.signer.as_deref()
	}

	pub fn from_log(event: &LogEvent) -> Option<Self> {
		let env = event.envelope()?;
		Some(Self {
			seq: event.seq,
			ts: event.ts,
			channel: event.channel.clone(),
			local: event.local,
			env,
		})
	}
}

/// Negotiation-phase view of one trade.
#[derive(Default)]
pub struct NegotiationView {
	pub trade_id: String,
	pub rfq: Option<(EventView, RfqBody)>,
	pub quotes: Vec<(EventView, QuoteBody)>,
	pub quote_accepts: Vec<(EventView, QuoteAcceptBody)>,
	pub invites: Vec<(EventView, SwapInviteBody)>,
}

impl NegotiationView {
	/// Our own quote for this trade, if we posted one.
	pub fn local_quote(&self) -> Option<&(EventView, QuoteBody)> {
		self.quotes.iter().find(|(event, _)| event.local)
	}

	pub fn local_quote_accept(&self) -> Option<&(EventView, QuoteAcceptBody)> {
		self.quote_accepts.iter().find(|(event, _)| event.local)
	}

	pub fn local_invite(&self) -> Option<&(EventView, SwapInviteBody)> {
		self.invites.iter().find(|(event, _)| event.local)
	}
}

/// Settlement-phase view of one swap channel.
#[derive(Default)]
pub struct SettlementView {
	pub swap_channel: String,
	pub trade_id: String,
	pub terms: Option<(EventView, TermsBody)>,
	pub accept: Option<(EventView, AcceptBody)>,
	pub invoice: Option<(EventView, LnInvoiceBody)>,
	pub escrow: Option<(EventView, SolEscrowCreatedBody)>,
	pub ln_paid: Option<EventView>,
	pub statuses: Vec<(EventView, StatusBody)>,
	pub claimed: Option<EventView>,
	pub refunded: Option<EventView>,
	pub canceled: Option<EventView>,
}

impl SettlementView {
	/// A trade is terminal once any of the three terminal envelopes exist.
	pub fn is_terminal(&self) -> bool {
		self.claimed.is_some() || self.refunded.is_some() || self.canceled.is_some()
	}
}

/// A locally broadcast offer, matched against incoming RFQs.
pub struct LocalOffer {
	pub event: EventView,
	pub body: SvcAnnounceBody,
}

#[derive(Default)]
pub struct TickContexts {
	pub negotiation: HashMap<String, NegotiationView>,
	pub settlement: HashMap<String, SettlementView>,
	pub local_offers: Vec<LocalOffer>,
}

fn parse<T: serde::de::DeserializeOwned>(env: &Envelope) -> Option<T> {
	serde_json::from_value(env.body.clone()).ok()
}

/// Partitions the retained event window into per-trade and per-channel
/// views. Events with unparseable bodies are dropped here; they already
/// failed schema validation upstream.
pub fn build_contexts(events: &[LogEvent]) -> TickContexts {
	let mut contexts = TickContexts::default();

	for log_event in events {
		let view = match EventView::from_log(log_event) {
			Some(view) => view,
			None => continue,
		};
		let trade_id = view.env.trade_id.clone();

		match view.env.kind {
			Kind::Rfq => {
				if let Some(body) = parse::<RfqBody>(&view.env) {
					let entry = negotiation_entry(&mut contexts.negotiation, &trade_id);
					// Keep the first sighting; replays do not reset it.
					if entry.rfq.is_none() {
						entry.rfq = Some((view, body));
					}
				}
			},
			Kind::Quote => {
				if let Some(body) = parse::<QuoteBody>(&view.env) {
					negotiation_entry(&mut contexts.negotiation, &trade_id)
						.quotes
						.push((view, body));
				}
			},
			Kind::QuoteAccept => {
				if let Some(body) = parse::<QuoteAcceptBody>(&view.env) {
					negotiation_entry(&mut contexts.negotiation, &trade_id)
						.quote_accepts
						.push((view, body));
				}
			},
			Kind::SwapInvite => {
				if let Some(body) = parse::<SwapInviteBody>(&view.env) {
					negotiation_entry(&mut contexts.negotiation, &trade_id)
						.invites
						.push((view, body));
				}
			},
			Kind::SvcAnnounce => {
				if view.local {
					if let Some(body) = parse::<SvcAnnounceBody>(&view.env) {
						contexts.local_offers.push(LocalOffer { event: view, body });
					}
				}
			},
			Kind::Terms => {
				if let Some(body) = parse::<TermsBody>(&view.env) {
					let entry = settlement_entry(&mut contexts.settlement, &view, &trade_id);
					entry.terms = Some((view, body));
				}
			},
			Kind::Accept => {
				if let Some(body) = parse::<AcceptBody>(&view.env) {
					let entry = settlement_entry(&mut contexts.settlement, &view, &trade_id);
					entry.accept = Some((view, body));
				}
			},
			Kind::LnInvoice => {
				if let Some(body) = parse::<LnInvoiceBody>(&view.env) {
					let entry = settlement_entry(&mut contexts.settlement, &view, &trade_id);
					entry.invoice = Some((view, body));
				}
			},
			Kind::SolEscrowCreated => {
				if let Some(body) = parse::<SolEscrowCreatedBody>(&view.env) {
					let entry = settlement_entry(&mut contexts.settlement, &view, &trade_id);
					entry.escrow = Some((view, body));
				}
			},
			Kind::LnPaid => {
				let entry = settlement_entry(&mut contexts.settlement, &view, &trade_id);
				entry.ln_paid = Some(view);
			},
			Kind::Status => {
				if let Some(body) = parse::<StatusBody>(&view.env) {
					let entry = settlement_entry(&mut contexts.settlement, &view, &trade_id);
					entry.statuses.push((view, body));
				}
			},
			Kind::SolClaimed => {
				let entry = settlement_entry(&mut contexts.settlement, &view, &trade_id);
				entry.claimed = Some(view);
			},
			Kind::SolRefunded => {
				let entry = settlement_entry(&mut contexts.settlement, &view, &trade_id);
				entry.refunded = Some(view);
			},
			Kind::Cancel => {
				let entry = settlement_entry(&mut contexts.settlement, &view, &trade_id);
				entry.canceled = Some(view);
			},
		}
	}

	contexts
}

fn negotiation_entry<'a>(
	map: &'a mut HashMap<String, NegotiationView>, trade_id: &str,
) -> &'a mut NegotiationView {
	map.entry(trade_id.to_string()).or_insert_with(|| NegotiationView {
		trade_id: trade_id.to_string(),
		..Default::default()
	})
}

fn settlement_entry<'a>(
	map: &'a mut HashMap<String, SettlementView>, view: &EventView, trade_id: &str,
) -> &'a mut SettlementView {
	map.entry(view.channel.clone()).or_insert_with(|| SettlementView {
		swap_channel: view.channel.clone(),
		trade_id: trade_id.to_string(),
		..Default::default()
	})
}
