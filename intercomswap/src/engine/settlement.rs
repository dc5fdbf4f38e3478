// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Settlement-phase automation, per swap channel:
//! `terms_post -> terms_accept -> ln_route_precheck -> ln_invoice ->
//! sol_escrow -> ln_pay -> sol_claim`, plus the terms-replay and
//! waiting-terms side protocols and the LN-pay failure accounting.

use hex::DisplayHex;
use serde_json::json;

use intercomswap_wire::envelope::{app_hash, hash_terms};

use crate::engine::contexts::{SettlementView, TickContexts};
use crate::engine::{
	AutomationLoop, LnPayFailState, LoopState, StageOutcome, TermsReplayState,
};
use crate::io::persist::types::{TradeRecord, TradeRole, TradeState};
use crate::liquidity::{
	assert_liquidity, normalize_channels, route_probe, summarize, LiquidityMode, LiquiditySide,
};
use crate::service::ExecuteOpts;
use crate::util::now_unix;

impl AutomationLoop {
	pub(crate) async fn advance_settlement(
		&self, state: &mut LoopState, contexts: &TickContexts, local_peer: &str, now: u64,
	) {
		let channels: Vec<String> = contexts.settlement.keys().cloned().collect();
		for channel in channels {
			let view = &contexts.settlement[&channel];
			self.advance_one_settlement(state, contexts, view, local_peer, now).await;
		}

		// Joined trades whose swap channel is still silent have no view yet;
		// the maker's terms_post starts from exactly this spot.
		let ctx = self.executor().context();
		if let Ok(trades) = ctx.store.list_trades(500, 0) {
			for trade in trades {
				let Some(channel) = trade.swap_channel.clone() else { continue };
				if trade.state.is_terminal() || contexts.settlement.contains_key(&channel) {
					continue;
				}
				let view = SettlementView {
					swap_channel: channel,
					trade_id: trade.trade_id.clone(),
					..Default::default()
				};
				self.advance_one_settlement(state, contexts, &view, local_peer, now).await;
			}
		}

		self.tick_waiting_terms(state, contexts, now).await;
	}

	async fn advance_one_settlement(
		&self, state: &mut LoopState, contexts: &TickContexts, view: &SettlementView,
		local_peer: &str, now: u64,
	) {
		let ctx = self.executor().context();
		let trade_id = view.trade_id.clone();

		if view.is_terminal() {
			self.observe_terminal(view).await;
			state.terms_replay.remove(&trade_id);
			state.waiting_terms.remove(&trade_id);
			return;
		}
		if state.force_abort.contains(&trade_id) {
			return;
		}

		let trade = match ctx.store.get_trade(&trade_id) {
			Ok(trade) => trade,
			Err(e) => {
				ctx.trace.record("settlement", format!("{}: store read failed: {}", trade_id, e));
				return;
			},
		};
		// A channel we have no journal entry for is not our trade.
		let Some(trade) = trade else { return };
		if trade.state.is_terminal() {
			return;
		}

		match trade.role {
			Some(TradeRole::Maker) => {
				self.maker_ladder(state, contexts, view, &trade, now).await;
			},
			Some(TradeRole::Taker) => {
				self.taker_ladder(state, view, &trade, local_peer, now).await;
			},
			None => {},
		}
	}

	async fn maker_ladder(
		&self, state: &mut LoopState, contexts: &TickContexts, view: &SettlementView,
		trade: &TradeRecord, now: u64,
	) {
		let ctx = self.executor().context();
		let swap_cfg = ctx.config.swap.clone();
		let trade_id = &view.trade_id;

		// terms_post: needs the taker's QUOTE_ACCEPT (claim address, payer
		// peer) and our quote (amounts).
		if view.terms.is_none() {
			let key = format!("{}:terms_post", trade_id);
			if Self::stage_ready(state, &key, now) {
				if let Some(neg) = contexts.negotiation.get(trade_id) {
					let accept = neg
						.quote_accepts
						.iter()
						.find(|(event, _)| !event.local)
						.map(|(event, body)| (event.signer().map(str::to_string), body.clone()));
					let quote = neg.local_quote().map(|(_, body)| body.clone());
					if let (Some((Some(payer_peer), accept_body)), Some(quote_body)) =
						(accept, quote)
					{
						let args = json!({
							"trade_id": trade_id,
							"btc_sats": quote_body.btc_sats,
							"usdt_amount": quote_body.usdt_amount,
							"sol_recipient": accept_body.sol_recipient,
							"ln_payer_peer": payer_peer,
						});
						self.run_stage(
							state,
							&key,
							trade_id,
							Some(&view.swap_channel),
							"swap_terms_post",
							args,
							swap_cfg.stage_retry_cooldown_ms,
							None,
						)
						.await;
					}
				}
			}
			return;
		}

		// Terms replay until ACCEPT arrives or the terms expire.
		if let Some((terms_event, terms_body)) = &view.terms {
			if terms_event.local && view.accept.is_none() {
				let expired = terms_body
					.terms_valid_until_unix
					.map_or(false, |valid_until| valid_until < now_unix());
				if expired {
					state.terms_replay.remove(trade_id);
				} else {
					let replay = state
						.terms_replay
						.entry(trade_id.clone())
						.or_insert(TermsReplayState { count: 0, next_at_ms: 0 });
					if replay.count < swap_cfg.terms_replay_max
						&& now >= replay.next_at_ms
						&& state.actions_left > 0
					{
						state.actions_left -= 1;
						replay.count += 1;
						replay.next_at_ms = now + swap_cfg.terms_replay_cooldown_ms;
						if let Err(e) = ctx
							.session
							.send_envelope(&view.swap_channel, &terms_event.env)
							.await
						{
							ctx.trace.record(
								"terms_replay",
								format!("{}: resend failed: {}", trade_id, e),
							);
						} else {
							ctx.trace.record(
								"terms_replay",
								format!("{} ({}/{})", trade_id, replay.count,
									swap_cfg.terms_replay_max),
							);
						}
					}
				}
			} else {
				state.terms_replay.remove(trade_id);
			}
		}

		// ln_invoice: after the taker's ACCEPT commits to our exact terms.
		if view.invoice.is_none() {
			if let (Some((terms_event, _)), Some((accept_event, accept_body))) =
				(&view.terms, &view.accept)
			{
				if accept_event.local {
					return;
				}
				let key = format!("{}:ln_invoice", trade_id);
				if !Self::stage_ready(state, &key, now) {
					return;
				}
				let expected = match hash_terms(&terms_event.env) {
					Ok(hash) => hash.to_lower_hex_string(),
					Err(_) => return,
				};
				if accept_body.terms_hash != expected {
					ctx.trace.record(
						"settlement",
						format!("{}: ACCEPT commits to foreign terms hash", trade_id),
					);
					Self::stage_mark_done(state, &key, now);
					return;
				}
				self.run_stage(
					state,
					&key,
					trade_id,
					Some(&view.swap_channel),
					"ln_invoice_create_and_post",
					json!({ "trade_id": trade_id }),
					swap_cfg.stage_retry_cooldown_ms,
					None,
				)
				.await;
			}
			return;
		}

		// sol_escrow: gated inside the tool on the payer's route precheck;
		// "waiting" outcomes park the stage without burning a retry.
		if view.escrow.is_none() && trade.state == TradeState::Invoice {
			let key = format!("{}:sol_escrow", trade_id);
			self.run_stage(
				state,
				&key,
				trade_id,
				Some(&view.swap_channel),
				"sol_escrow_init_and_post",
				json!({ "trade_id": trade_id }),
				swap_cfg.ln_route_precheck_wait_ms,
				Some("ln_route_precheck_ok"),
			)
			.await;
		}
	}

	async fn taker_ladder(
		&self, state: &mut LoopState, view: &SettlementView, trade: &TradeRecord,
		local_peer: &str, now: u64,
	) {
		let ctx = self.executor().context();
		let swap_cfg = ctx.config.swap.clone();
		let trade_id = &view.trade_id;

		// TERMS arrived: the waiting-terms protocol is over.
		if view.terms.is_some() {
			state.waiting_terms.remove(trade_id);
		}

		// terms_accept.
		if view.accept.is_none() {
			let Some((terms_event, terms)) = &view.terms else { return };
			if terms_event.local {
				return;
			}
			let key = format!("{}:terms_accept", trade_id);
			if !Self::stage_ready(state, &key, now) {
				return;
			}
			if terms
				.terms_valid_until_unix
				.map_or(false, |valid_until| valid_until < now_unix())
			{
				ctx.trace.record("settlement", format!("{}: terms expired", trade_id));
				Self::stage_mark_done(state, &key, now);
				self.abort_trade(state, trade_id, Some(&view.swap_channel), "terms expired")
					.await;
				return;
			}
			if terms.ln_payer_peer != local_peer {
				// Terms for somebody else; never ours to accept.
				Self::stage_mark_done(state, &key, now);
				return;
			}
			if terms.sol_recipient != ctx.sol.local_signer() {
				ctx.trace.record(
					"settlement",
					format!("{}: terms pay out to a foreign Solana address", trade_id),
				);
				Self::stage_mark_done(state, &key, now);
				self.abort_trade(
					state,
					trade_id,
					Some(&view.swap_channel),
					"terms sol_recipient mismatch",
				)
				.await;
				return;
			}
			if terms.app_hash != app_hash(&ctx.sol.program_id()) {
				Self::stage_mark_done(state, &key, now);
				self.abort_trade(state, trade_id, Some(&view.swap_channel), "app_hash mismatch")
					.await;
				return;
			}
			let terms_hash = match hash_terms(&terms_event.env) {
				Ok(hash) => hash.to_lower_hex_string(),
				Err(_) => return,
			};
			self.run_stage(
				state,
				&key,
				trade_id,
				Some(&view.swap_channel),
				"swap_accept_post",
				json!({ "trade_id": trade_id, "terms_hash": terms_hash }),
				swap_cfg.stage_retry_cooldown_ms,
				None,
			)
			.await;
			return;
		}

		// ln_route_precheck: runs once the invoice arrived, and its verdict
		// is what unlocks the maker's escrow.
		if let Some((invoice_event, invoice)) = &view.invoice {
			if !invoice_event.local {
				let key = format!("{}:ln_route_precheck", trade_id);
				if Self::stage_ready(state, &key, now) {
					self.route_precheck_stage(state, view, &key, &invoice.bolt11, now).await;
				}
			}
		}

		// ln_pay: every piece (terms, invoice, escrow announcement) goes to
		// the verified-pay composite via vault handles.
		if view.ln_paid.is_none() && trade.state != TradeState::LnPaid {
			let Some((terms_event, _)) = &view.terms else { return };
			let Some((invoice_event, _)) = &view.invoice else { return };
			let Some((escrow_event, _)) = &view.escrow else { return };
			let precheck_done = state
				.stages
				.get(&format!("{}:ln_route_precheck", trade_id))
				.and_then(|stage| stage.done_at_ms)
				.is_some();
			if !precheck_done {
				return;
			}
			let key = format!("{}:ln_pay", trade_id);
			if !Self::stage_ready(state, &key, now) {
				return;
			}

			let terms_handle = ctx.vault.put(
				serde_json::to_string(&terms_event.env).unwrap_or_default(),
				json!({ "trade_id": trade_id, "kind": "terms_env" }),
			);
			let invoice_handle = ctx.vault.put(
				serde_json::to_string(&invoice_event.env).unwrap_or_default(),
				json!({ "trade_id": trade_id, "kind": "invoice_env" }),
			);
			let escrow_handle = ctx.vault.put(
				serde_json::to_string(&escrow_event.env).unwrap_or_default(),
				json!({ "trade_id": trade_id, "kind": "escrow_env" }),
			);
			let args = json!({
				"trade_id": trade_id,
				"terms_env": terms_handle,
				"invoice_env": invoice_handle,
				"escrow_env": escrow_handle,
			});
			let outcome = self
				.run_stage(
					state,
					&key,
					trade_id,
					Some(&view.swap_channel),
					"ln_pay_and_post_verified",
					args,
					swap_cfg.ln_pay_retry_cooldown_ms,
					None,
				)
				.await;

			if let StageOutcome::Failed(err) = outcome {
				let fail = state.ln_pay_fail.entry(trade_id.clone()).or_insert(LnPayFailState {
					failures: 0,
					first_fail_at_ms: now,
					last_fail_at_ms: now,
				});
				fail.failures += 1;
				fail.last_fail_at_ms = now;
				let waited_out = fail.failures >= swap_cfg.ln_pay_fail_leave_attempts
					&& now.saturating_sub(fail.first_fail_at_ms)
						>= swap_cfg.ln_pay_fail_leave_min_wait_ms;
				if waited_out || err.message.contains("unroutable invoice precheck") {
					self.abort_trade(
						state,
						trade_id,
						Some(&view.swap_channel),
						&format!("ln pay abandoned: {}", err.message),
					)
					.await;
				}
			}
			return;
		}

		// sol_claim.
		if view.claimed.is_none()
			&& (view.ln_paid.as_ref().map_or(false, |event| event.local)
				|| trade.state == TradeState::LnPaid)
		{
			let key = format!("{}:sol_claim", trade_id);
			let mint = trade
				.sol_mint
				.clone()
				.unwrap_or_else(|| ctx.config.solana.mint.clone());
			self.run_stage(
				state,
				&key,
				trade_id,
				Some(&view.swap_channel),
				"sol_claim_and_post",
				json!({ "trade_id": trade_id, "mint": mint }),
				swap_cfg.stage_retry_cooldown_ms,
				None,
			)
			.await;
		}
	}

	/// Taker's route precheck: direct channel first, aggregate fallback,
	/// LND graph probe when the invoice has no hints. The verdict goes out
	/// as a STATUS the maker's escrow gate keys on.
	async fn route_precheck_stage(
		&self, state: &mut LoopState, view: &SettlementView, key: &str, bolt11: &str, now: u64,
	) {
		let ctx = self.executor().context();
		let swap_cfg = ctx.config.swap.clone();
		let trade_id = &view.trade_id;
		if state.actions_left == 0 {
			return;
		}

		let verdict: Result<String, String> = async {
			let decoded =
				ctx.ln.decodepay(bolt11).await.map_err(|e| format!("decodepay: {}", e))?;
			let amount_sats = decoded.amount_msat.unwrap_or(0) / 1000;
			let raw = ctx
				.ln
				.list_channels()
				.await
				.map_err(|e| format!("list_channels: {}", e))?;
			let channels = normalize_channels(ctx.ln.backend(), &raw);
			let summary = summarize(&channels);
			let direct_sufficient = channels.iter().any(|ch| {
				ch.active && ch.peer == decoded.destination && ch.local_sats >= amount_sats
			});
			let mode = if direct_sufficient {
				LiquidityMode::SingleChannel
			} else {
				LiquidityMode::Aggregate
			};
			assert_liquidity(&summary, mode, LiquiditySide::Outbound, amount_sats)
				.map_err(|e| e.to_string())?;
			if !direct_sufficient && decoded.route_hint_count == 0 {
				route_probe(ctx.ln.as_ref(), &decoded.destination, amount_sats)
					.await
					.map_err(|e| e.message)?;
			}
			Ok(format!(
				"ln_route_precheck_ok mode={} required_sats={} max_single={} total={} channels={}",
				mode.as_str(),
				amount_sats,
				summary.max_outbound_sats,
				summary.total_outbound_sats,
				summary.channels_active
			))
		}
		.await;

		let opts = ExecuteOpts { auto_approve: true, dry_run: false };
		match verdict {
			Ok(note) => {
				let args = json!({
					"trade_id": trade_id,
					"channel": view.swap_channel,
					"state": "accepted",
					"note": note,
				});
				state.actions_left = state.actions_left.saturating_sub(1);
				match self.executor().execute("swap_status_post", &args, &opts).await {
					Ok(_) => Self::stage_mark_done(state, key, now),
					Err(e) => {
						let stage = state.stages.entry(key.to_string()).or_default();
						stage.retry_after_ms = now + swap_cfg.ln_route_precheck_retry_ms;
						ctx.trace
							.record("ln_route_precheck", format!("{}: post failed: {}", trade_id, e));
					},
				}
			},
			Err(why) => {
				let note = format!("ln_route_precheck_fail: {}", truncate(&why, 400));
				let args = json!({
					"trade_id": trade_id,
					"channel": view.swap_channel,
					"state": "error",
					"note": note,
				});
				state.actions_left = state.actions_left.saturating_sub(1);
				let _ = self.executor().execute("swap_status_post", &args, &opts).await;
				let stage = state.stages.entry(key.to_string()).or_default();
				stage.retry_count += 1;
				stage.retry_after_ms = now + swap_cfg.ln_route_precheck_retry_ms;
				ctx.trace.record("ln_route_precheck", format!("{}: {}", trade_id, why));
				if stage.retry_count > swap_cfg.stage_retry_max {
					stage.done_at_ms = Some(now);
					self.abort_trade(
						state,
						trade_id,
						Some(&view.swap_channel),
						&format!("unroutable invoice precheck: {}", why),
					)
					.await;
				}
			},
		}
	}

	/// Taker, post-join / pre-TERMS: ping, replay our QUOTE_ACCEPT, post a
	/// waiting status, and give up after the configured window.
	async fn tick_waiting_terms(
		&self, state: &mut LoopState, contexts: &TickContexts, now: u64,
	) {
		let ctx = self.executor().context();
		let swap_cfg = ctx.config.swap.clone();
		let waiting: Vec<String> = state.waiting_terms.keys().cloned().collect();

		for trade_id in waiting {
			let swap_channel = format!("swap:{}", trade_id);
			let terms_present = contexts
				.settlement
				.get(&swap_channel)
				.map(|view| view.terms.is_some())
				.unwrap_or(false);
			if terms_present || state.force_abort.contains(&trade_id) {
				state.waiting_terms.remove(&trade_id);
				continue;
			}

			let Some(wt) = state.waiting_terms.get_mut(&trade_id) else { continue };
			if now.saturating_sub(wt.first_seen_at_ms) >= swap_cfg.waiting_terms_max_wait_ms {
				ctx.trace.record("waiting_terms", format!("{}: timed out", trade_id));
				state.waiting_terms.remove(&trade_id);
				if swap_cfg.waiting_terms_leave_on_timeout {
					self.abort_trade(state, &trade_id, Some(&swap_channel), "waiting_terms timeout")
						.await;
				}
				continue;
			}
			if now < wt.next_ping_at_ms || state.actions_left == 0 {
				continue;
			}
			wt.pings += 1;
			wt.next_ping_at_ms = now + swap_cfg.waiting_terms_ping_ms;
			state.actions_left = state.actions_left.saturating_sub(1);

			// Auth ping on the swap channel.
			let ping = json!({ "type": "ping", "trade_id": trade_id }).to_string();
			if let Err(e) = ctx.session.send_text(&swap_channel, &ping).await {
				ctx.trace.record("waiting_terms", format!("{}: ping failed: {}", trade_id, e));
			}
			// Replay our QUOTE_ACCEPT on the upstream negotiation channel.
			if let Some((accept_event, _)) = contexts
				.negotiation
				.get(&trade_id)
				.and_then(|view| view.local_quote_accept())
			{
				let _ = ctx.session.send_envelope(&accept_event.channel, &accept_event.env).await;
			}
			// And a visible waiting status.
			let args = json!({
				"trade_id": trade_id,
				"channel": swap_channel,
				"state": "init",
				"note": "waiting_terms",
			});
			let opts = ExecuteOpts { auto_approve: true, dry_run: false };
			let _ = self.executor().execute("swap_status_post", &args, &opts).await;
		}
	}
}

fn truncate(s: &str, max: usize) -> &str {
	match s.char_indices().nth(max) {
		Some((idx, _)) => &s[..idx],
		None => s,
	}
}
