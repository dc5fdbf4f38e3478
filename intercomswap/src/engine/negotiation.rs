// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Negotiation-phase automation: auto-quote, auto-accept, auto-invite and
//! auto-join.

use serde_json::json;

use intercomswap_wire::envelope::envelope_id;
use intercomswap_wire::kinds::{OfferLine, RfqBody, SvcAnnounceBody};
use intercomswap_wire::{REFUND_WINDOW_MAX_SEC, REFUND_WINDOW_MIN_SEC};

use crate::engine::contexts::{LocalOffer, NegotiationView, TickContexts};
use crate::engine::{AutomationLoop, LoopState, StageOutcome};
use crate::util::now_unix;

impl AutomationLoop {
	pub(crate) async fn advance_negotiation(
		&self, state: &mut LoopState, contexts: &TickContexts, local_peer: &str, now: u64,
	) {
		let swap_cfg = self.executor().context().config.swap.clone();
		let trade_ids: Vec<String> = contexts.negotiation.keys().cloned().collect();

		for trade_id in trade_ids {
			let view = &contexts.negotiation[&trade_id];
			if state.force_abort.contains(&trade_id) {
				continue;
			}
			if swap_cfg.enable_auto_quote {
				self.auto_quote(state, contexts, view, now).await;
			}
			if swap_cfg.enable_auto_accept {
				self.auto_accept(state, view, now).await;
			}
			if swap_cfg.enable_auto_invite {
				self.auto_invite(state, view, now).await;
			}
			if swap_cfg.enable_auto_join {
				self.auto_join(state, view, local_peer, now).await;
			}
		}
	}

	/// Maker: quote every live foreign RFQ that matches one of our offer
	/// lines (or quote bare when configured).
	async fn auto_quote(
		&self, state: &mut LoopState, contexts: &TickContexts, view: &NegotiationView, now: u64,
	) {
		let ctx = self.executor().context();
		let Some((rfq_event, rfq)) = &view.rfq else { return };
		if rfq_event.local || view.local_quote().is_some() {
			return;
		}
		let key = format!("{}:auto_quote", view.trade_id);
		if !Self::stage_ready(state, &key, now) {
			return;
		}

		if rfq.valid_until_unix.map_or(false, |valid_until| valid_until < now_unix()) {
			ctx.trace.record("auto_quote_skip_expired_rfq", view.trade_id.clone());
			Self::stage_mark_done(state, &key, now);
			return;
		}

		// The on-chain fee configuration must fit under the taker's caps;
		// fees are never negotiated down.
		let fees = match self
			.executor()
			.execute("sol_config_get", &json!({}), &Default::default())
			.await
		{
			Ok(fees) => fees,
			Err(e) => {
				ctx.trace.record("auto_quote", format!("fee snapshot failed: {}", e));
				return;
			},
		};
		let platform_bps = fees.get("platform_fee_bps").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
		let trade_bps = fees.get("trade_fee_bps").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
		if trade_bps > rfq.max_trade_fee_bps {
			ctx.trace.record(
				"auto_quote",
				format!(
					"{}: on-chain trade fee exceeds RFQ max_trade_fee_bps ({} > {})",
					view.trade_id, trade_bps, rfq.max_trade_fee_bps
				),
			);
			Self::stage_mark_done(state, &key, now);
			return;
		}
		if platform_bps > rfq.max_platform_fee_bps
			|| platform_bps + trade_bps > rfq.max_total_fee_bps
		{
			ctx.trace.record(
				"auto_quote",
				format!(
					"{}: on-chain fees exceed RFQ caps (platform {} trade {})",
					view.trade_id, platform_bps, trade_bps
				),
			);
			Self::stage_mark_done(state, &key, now);
			return;
		}

		let matched = find_matching_line(contexts, rfq, &rfq_event.channel);
		let mut args = json!({
			"channel": rfq_event.channel,
			"trade_id": view.trade_id,
			"rfq_id": rfq.rfq_id,
			"btc_sats": rfq.btc_sats,
			"usdt_amount": rfq.usdt_amount,
		});
		match matched {
			Some((offer, line)) => {
				args["offer_id"] = json!(offer.body.offer_id);
				args["line_index"] = json!(line.line_index);
			},
			None if ctx.config.swap.enable_quote_from_rfqs => {},
			None => return,
		}

		self.run_stage(
			state,
			&key,
			&view.trade_id,
			None,
			"swap_quote_post",
			args,
			ctx.config.swap.stage_retry_cooldown_ms,
			None,
		)
		.await;
	}

	/// Taker: accept the first quote answering one of our live RFQs, as
	/// long as it respects the caps we asked for.
	async fn auto_accept(&self, state: &mut LoopState, view: &NegotiationView, now: u64) {
		let ctx = self.executor().context();
		let Some((rfq_event, rfq)) = &view.rfq else { return };
		if !rfq_event.local || view.local_quote_accept().is_some() {
			return;
		}
		let key = format!("{}:auto_accept", view.trade_id);
		if !Self::stage_ready(state, &key, now) {
			return;
		}
		if rfq.valid_until_unix.map_or(false, |valid_until| valid_until < now_unix()) {
			Self::stage_mark_done(state, &key, now);
			return;
		}

		let Some((quote_event, quote)) = view
			.quotes
			.iter()
			.filter(|(event, _)| !event.local)
			.min_by_key(|(event, _)| event.seq)
		else {
			return;
		};
		if quote.platform_fee_bps > rfq.max_platform_fee_bps
			|| quote.trade_fee_bps > rfq.max_trade_fee_bps
			|| quote.platform_fee_bps + quote.trade_fee_bps > rfq.max_total_fee_bps
		{
			ctx.trace.record(
				"auto_accept",
				format!("{}: quote fees exceed RFQ caps, ignoring", view.trade_id),
			);
			Self::stage_mark_done(state, &key, now);
			return;
		}
		let quote_id = match envelope_id(&quote_event.env) {
			Ok(id) => id,
			Err(_) => return,
		};

		let mut args = json!({
			"channel": quote_event.channel,
			"trade_id": view.trade_id,
			"rfq_id": rfq.rfq_id,
			"quote_id": quote_id,
			"required_sats": quote.btc_sats,
		});
		if let (Some(offer_id), Some(line_index)) = (&quote.offer_id, quote.line_index) {
			args["offer_id"] = json!(offer_id);
			args["line_index"] = json!(line_index);
		}

		self.run_stage(
			state,
			&key,
			&view.trade_id,
			None,
			"swap_quote_accept",
			args,
			ctx.config.swap.stage_retry_cooldown_ms,
			None,
		)
		.await;
	}

	/// Maker: invite the accepting taker into the private swap channel,
	/// but only when its liquidity hint can actually cover the payment.
	async fn auto_invite(&self, state: &mut LoopState, view: &NegotiationView, now: u64) {
		let ctx = self.executor().context();
		let Some((quote_event, quote)) = view.local_quote() else { return };
		if view.local_invite().is_some() {
			return;
		}
		let my_quote_id = match envelope_id(&quote_event.env) {
			Ok(id) => id,
			Err(_) => return,
		};
		let Some((accept_event, accept)) = view
			.quote_accepts
			.iter()
			.find(|(event, accept)| !event.local && accept.quote_id == my_quote_id)
		else {
			return;
		};
		let key = format!("{}:auto_invite", view.trade_id);
		if !Self::stage_ready(state, &key, now) {
			return;
		}

		let hint = &accept.ln_liquidity_hint;
		let have = match hint.mode.as_str() {
			"single_channel" => hint.max_single_outbound_sats,
			_ => hint.total_outbound_sats,
		};
		if have < quote.btc_sats || hint.active_channels == 0 {
			ctx.trace.record(
				"auto_invite",
				format!(
					"{}: ln_liquidity_hint insufficient ({} mode, have {} < required {})",
					view.trade_id, hint.mode, have, quote.btc_sats
				),
			);
			Self::stage_mark_done(state, &key, now);
			return;
		}
		let Some(invitee) = accept_event.signer().map(str::to_string) else { return };

		let mut args = json!({
			"channel": accept_event.channel,
			"trade_id": view.trade_id,
			"invitee": invitee,
		});
		if let (Some(offer_id), Some(line_index)) = (&quote.offer_id, quote.line_index) {
			args["offer_id"] = json!(offer_id);
			args["line_index"] = json!(line_index);
		}

		self.run_stage(
			state,
			&key,
			&view.trade_id,
			None,
			"swap_invite_send",
			args,
			ctx.config.swap.stage_retry_cooldown_ms,
			None,
		)
		.await;
	}

	/// Taker: join the swap channel we were invited into.
	async fn auto_join(
		&self, state: &mut LoopState, view: &NegotiationView, local_peer: &str, now: u64,
	) {
		let ctx = self.executor().context();
		if view.local_quote_accept().is_none() {
			return;
		}
		let Some((invite_event, invite)) = view
			.invites
			.iter()
			.filter(|(event, invite)| {
				!event.local
					&& invite.invitee.as_deref().map_or(true, |invitee| invitee == local_peer)
			})
			.min_by_key(|(event, _)| event.seq)
		else {
			return;
		};
		let key = format!("{}:auto_join", view.trade_id);
		if !Self::stage_ready(state, &key, now) {
			return;
		}
		if invite.valid_until_unix.map_or(false, |valid_until| valid_until < now_unix()) {
			ctx.trace.record("auto_join", format!("{}: invite expired", view.trade_id));
			Self::stage_mark_done(state, &key, now);
			return;
		}
		let Some(inviter_key) = invite_event.signer().map(str::to_string) else { return };

		let args = json!({
			"trade_id": view.trade_id,
			"swap_channel": invite.swap_channel,
			"invite": invite.invite,
			"welcome": invite.welcome,
			"inviter_key": inviter_key,
		});
		if let StageOutcome::Ok(_) = self
			.run_stage(
				state,
				&key,
				&view.trade_id,
				Some(invite.swap_channel.as_str()),
				"swap_join",
				args,
				ctx.config.swap.stage_retry_cooldown_ms,
				None,
			)
			.await
		{
			// Start the waiting-terms protocol for the fresh channel.
			state.waiting_terms.entry(view.trade_id.clone()).or_insert(
				crate::engine::WaitingTermsState {
					first_seen_at_ms: now,
					pings: 0,
					next_ping_at_ms: now,
					rejoins: 0,
				},
			);
		}
	}
}

/// Pair, amounts, fee ceilings, refund-window overlap, offer expiry and
/// channel allowance all have to line up for an offer line to match.
fn find_matching_line<'a>(
	contexts: &'a TickContexts, rfq: &RfqBody, rfq_channel: &str,
) -> Option<(&'a LocalOffer, &'a OfferLine)> {
	let now = now_unix();
	for offer in &contexts.local_offers {
		let body: &SvcAnnounceBody = &offer.body;
		if body.valid_until_unix.map_or(false, |valid_until| valid_until < now) {
			continue;
		}
		if !body.rfq_channels.iter().any(|channel| channel == rfq_channel) {
			continue;
		}
		if body.pair != rfq.pair {
			continue;
		}
		for line in &body.lines {
			if line.btc_sats != rfq.btc_sats || line.usdt_amount != rfq.usdt_amount {
				continue;
			}
			if line.platform_fee_bps > rfq.max_platform_fee_bps
				|| line.trade_fee_bps > rfq.max_trade_fee_bps
				|| line.platform_fee_bps + line.trade_fee_bps > rfq.max_total_fee_bps
			{
				continue;
			}
			let rfq_min = rfq.refund_window_min_sec.unwrap_or(REFUND_WINDOW_MIN_SEC);
			let rfq_max = rfq.refund_window_max_sec.unwrap_or(REFUND_WINDOW_MAX_SEC);
			if line.refund_window_min_sec > rfq_max || rfq_min > line.refund_window_max_sec {
				continue;
			}
			return Some((offer, line));
		}
	}
	None
}
