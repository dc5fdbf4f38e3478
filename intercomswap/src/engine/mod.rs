// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Trade automation loop.
//!
//! A single cooperative task scans the bus log and advances every
//! concurrent trade toward a terminal state. Correctness never depends on
//! the in-memory bookkeeping here: every decision is a function of the
//! receipts store, the bus log and on-chain state, so a crash and restart
//! converge to the same action set. The per-stage caches only rate-limit.

pub mod contexts;
mod negotiation;
mod settlement;
#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::engine::contexts::{build_contexts, TickContexts};
use crate::io::persist::types::{TradePatch, TradeState};
use crate::service::{ExecuteOpts, ToolExecutor};
use crate::sidechannel::LogEvent;
use crate::tools::error::ToolError;
use crate::util::{now_ms, now_unix};

/// Retained-event cap, above the per-tick ingest bound so slow trades keep
/// their context.
const EVENT_BUFFER_CAP: usize = 4000;

/// Errors that must never be retried, matched on stable phrases in
/// addition to the error code.
const PERMANENT_ERROR_MARKERS: &[&str] = &[
	"expired",
	"terminal",
	"already joined",
	"already accepted",
	"already active",
	"listing_filled",
	"listing_in_progress",
	"swap_invite_exists",
	"exceeds RFQ max",
];

pub(crate) fn is_permanent_error(err: &ToolError) -> bool {
	err.code.is_permanent()
		|| PERMANENT_ERROR_MARKERS.iter().any(|marker| err.message.contains(marker))
}

#[derive(Default, Clone)]
pub(crate) struct StageState {
	pub done_at_ms: Option<u64>,
	pub in_flight: bool,
	pub retry_after_ms: u64,
	pub retry_count: u32,
}

pub(crate) struct TermsReplayState {
	pub count: u32,
	pub next_at_ms: u64,
}

pub(crate) struct WaitingTermsState {
	pub first_seen_at_ms: u64,
	pub pings: u32,
	pub next_ping_at_ms: u64,
	#[allow(dead_code)]
	pub rejoins: u32,
}

pub(crate) struct LnPayFailState {
	pub failures: u32,
	pub first_fail_at_ms: u64,
	pub last_fail_at_ms: u64,
}

struct LeaveBackoffState {
	attempts: u32,
	next_at_ms: u64,
}

pub(crate) struct LoopState {
	last_seq: u64,
	last_keepalive_ms: u64,
	last_hygiene_ms: u64,
	buffered: Vec<LogEvent>,
	seen: HashMap<String, u64>,
	pub(crate) stages: HashMap<String, StageState>,
	pub(crate) local_peer: Option<String>,
	pub(crate) terms_replay: HashMap<String, TermsReplayState>,
	pub(crate) waiting_terms: HashMap<String, WaitingTermsState>,
	pub(crate) ln_pay_fail: HashMap<String, LnPayFailState>,
	leave_backoff: HashMap<String, LeaveBackoffState>,
	pub(crate) force_abort: HashSet<String>,
	pub(crate) actions_left: u32,
}

impl LoopState {
	fn new() -> Self {
		Self {
			last_seq: 0,
			last_keepalive_ms: 0,
			last_hygiene_ms: 0,
			buffered: Vec::new(),
			seen: HashMap::new(),
			stages: HashMap::new(),
			local_peer: None,
			terms_replay: HashMap::new(),
			waiting_terms: HashMap::new(),
			ln_pay_fail: HashMap::new(),
			leave_backoff: HashMap::new(),
			force_abort: HashSet::new(),
			actions_left: 0,
		}
	}
}

/// Outcome of one stage attempt, after bookkeeping was applied.
pub(crate) enum StageOutcome {
	/// Stage not ready (done, in flight, cooling down) or out of budget.
	NotRun,
	Ok(Value),
	Failed(ToolError),
}

pub struct AutomationLoop {
	executor: Arc<ToolExecutor>,
	state: Mutex<LoopState>,
	tick_in_flight: AtomicBool,
	stopped: AtomicBool,
}

impl AutomationLoop {
	pub fn new(executor: Arc<ToolExecutor>) -> Arc<Self> {
		Arc::new(Self {
			executor,
			state: Mutex::new(LoopState::new()),
			tick_in_flight: AtomicBool::new(false),
			stopped: AtomicBool::new(false),
		})
	}

	pub(crate) fn executor(&self) -> &Arc<ToolExecutor> {
		&self.executor
	}

	/// Runs ticks at the configured interval until `stop` is called.
	pub async fn run(self: Arc<Self>) {
		let tick_ms = self.executor.context().config.swap.tick_interval_ms;
		let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
		interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		loop {
			interval.tick().await;
			if self.stopped.load(Ordering::SeqCst) {
				break;
			}
			self.tick().await;
		}
	}

	/// Cooperative stop: no new tick starts, the running one drains, then
	/// the per-trade caches are cleared.
	pub async fn stop(&self) {
		self.stopped.store(true, Ordering::SeqCst);
		while self.tick_in_flight.load(Ordering::SeqCst) {
			tokio::time::sleep(Duration::from_millis(20)).await;
		}
		let mut state = self.state.lock().await;
		*state = LoopState::new();
	}

	/// One tick. At most one runs at a time; overlapping calls return
	/// immediately.
	pub async fn tick(&self) {
		if self
			.tick_in_flight
			.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
			.is_err()
		{
			return;
		}
		let mut state = self.state.lock().await;
		self.tick_inner(&mut state).await;
		drop(state);
		self.tick_in_flight.store(false, Ordering::SeqCst);
	}

	async fn tick_inner(&self, state: &mut LoopState) {
		let ctx = self.executor.context();
		let swap_cfg = &ctx.config.swap;
		let now = now_ms();
		state.actions_left = swap_cfg.actions_per_tick;

		// 1. Keepalive: reassert the configured subscriptions.
		if now.saturating_sub(state.last_keepalive_ms) >= swap_cfg.keepalive_interval_ms {
			state.last_keepalive_ms = now;
			if !ctx.config.sidechannel.channels.is_empty() {
				if let Err(e) = ctx.session.subscribe(&ctx.config.sidechannel.channels).await {
					ctx.trace.record("tick.keepalive", format!("subscribe failed: {}", e));
				}
			}
		}

		// 2. Ingest new events, bounded and deduplicated.
		self.ingest(state, now);

		// 3. Identity; a transient lookup error falls back to the cache.
		match ctx.session.local_peer().await {
			Ok(peer) => state.local_peer = Some(peer),
			Err(e) => {
				if state.local_peer.is_none() {
					ctx.trace.record("tick.identity", format!("no local peer yet: {}", e));
					return;
				}
			},
		}
		let local_peer = match &state.local_peer {
			Some(peer) => peer.clone(),
			None => return,
		};

		// 4. Build the negotiation and settlement contexts.
		let tick_contexts = build_contexts(&state.buffered);

		// 5. Hygiene: leave stale or terminal swap channels.
		if now.saturating_sub(state.last_hygiene_ms) >= swap_cfg.hygiene_interval_ms {
			state.last_hygiene_ms = now;
			self.hygiene(state, &tick_contexts, now).await;
		}

		// 6. Advance.
		self.advance_negotiation(state, &tick_contexts, &local_peer, now).await;
		self.advance_settlement(state, &tick_contexts, &local_peer, now).await;
	}

	fn ingest(&self, state: &mut LoopState, now: u64) {
		let ctx = self.executor.context();
		let swap_cfg = &ctx.config.swap;
		let events = ctx.session.events_since(
			state.last_seq,
			swap_cfg.max_events_per_tick,
			swap_cfg.event_max_age_ms,
		);
		// The cursor only advances past events actually returned; anything
		// beyond the per-tick bound comes back next tick.
		if let Some(last) = events.last() {
			state.last_seq = state.last_seq.max(last.seq);
		}

		for event in events {
			let env = match event.envelope() {
				Some(env) => env,
				None => continue,
			};
			let dedupe_key = format!(
				"{}|{}|{}|{}|{}",
				event.channel,
				env.kind.as_str(),
				env.trade_id,
				env.signer.as_deref().unwrap_or(""),
				env.sig.as_deref().unwrap_or("")
			);
			match state.seen.get(&dedupe_key) {
				Some(first_seen)
					if now.saturating_sub(*first_seen) <= swap_cfg.done_max_age_ms =>
				{
					continue;
				},
				_ => {
					state.seen.insert(dedupe_key, now);
				},
			}
			state.buffered.push(event);
		}

		let done_max_age_ms = swap_cfg.done_max_age_ms;
		state.seen.retain(|_, first_seen| now.saturating_sub(*first_seen) <= done_max_age_ms);
		state.buffered.retain(|event| now.saturating_sub(event.ts) <= done_max_age_ms);
		if state.buffered.len() > EVENT_BUFFER_CAP {
			let excess = state.buffered.len() - EVENT_BUFFER_CAP;
			state.buffered.drain(..excess);
		}
	}

	async fn hygiene(&self, state: &mut LoopState, contexts: &TickContexts, now: u64) {
		let ctx = self.executor.context();
		let swap_cfg = ctx.config.swap.clone();
		for channel in ctx.session.subscriptions() {
			let trade_id = match channel.strip_prefix("swap:") {
				Some(suffix) => suffix.to_string(),
				None => continue,
			};

			let terminal_on_bus =
				contexts.settlement.get(&channel).map(|view| view.is_terminal()).unwrap_or(false);
			let terminal_in_receipts = ctx
				.store
				.get_trade(&trade_id)
				.ok()
				.flatten()
				.map(|trade| trade.state.is_terminal())
				.unwrap_or(false);
			let invite_expired = contexts
				.negotiation
				.get(&trade_id)
				.and_then(|view| view.local_invite())
				.and_then(|(_, invite)| invite.valid_until_unix)
				.map(|valid_until| valid_until < now_unix())
				.unwrap_or(false);
			let aborted = state.force_abort.contains(&trade_id);
			let no_settlement_yet =
				contexts.settlement.get(&channel).map(|v| v.terms.is_none()).unwrap_or(true);

			if !(terminal_on_bus || terminal_in_receipts || aborted || (invite_expired && no_settlement_yet))
			{
				continue;
			}

			let backoff = state
				.leave_backoff
				.entry(channel.clone())
				.or_insert(LeaveBackoffState { attempts: 0, next_at_ms: 0 });
			if backoff.attempts >= swap_cfg.swap_leave_max_attempts || now < backoff.next_at_ms {
				continue;
			}
			match ctx.session.leave(&channel).await {
				Ok(()) => {
					ctx.trace.record("hygiene.leave", format!("left {}", channel));
					state.leave_backoff.remove(&channel);
					state.waiting_terms.remove(&trade_id);
					state.terms_replay.remove(&trade_id);
				},
				Err(e) => {
					backoff.attempts += 1;
					let delay = (swap_cfg.swap_leave_backoff_ms << backoff.attempts.min(8))
						.min(swap_cfg.swap_leave_backoff_max_ms);
					backoff.next_at_ms = now + delay;
					ctx.trace.record(
						"hygiene.leave",
						format!("leave {} failed (attempt {}): {}", channel, backoff.attempts, e),
					);
				},
			}
		}
	}

	/// Whether a stage may run now: not done, not in flight, past its
	/// cooldown, and action budget remains.
	pub(crate) fn stage_ready(state: &LoopState, key: &str, now: u64) -> bool {
		if state.actions_left == 0 {
			return false;
		}
		match state.stages.get(key) {
			None => true,
			Some(stage) => {
				stage.done_at_ms.is_none() && !stage.in_flight && now >= stage.retry_after_ms
			},
		}
	}

	/// Marks a stage permanently finished without running a tool (skips,
	/// matched-nothing cases).
	pub(crate) fn stage_mark_done(state: &mut LoopState, key: &str, now: u64) {
		let stage = state.stages.entry(key.to_string()).or_default();
		stage.done_at_ms = Some(now);
		stage.in_flight = false;
	}

	/// Runs one stage through the tool executor with the retry/abort
	/// discipline applied. `waiting_marker`: a precondition error whose
	/// message contains it parks the stage on a short cooldown without
	/// consuming a retry (used by the maker's escrow gate).
	pub(crate) async fn run_stage(
		&self, state: &mut LoopState, key: &str, trade_id: &str, swap_channel: Option<&str>,
		tool: &str, args: Value, cooldown_ms: u64, waiting_marker: Option<&str>,
	) -> StageOutcome {
		let now = now_ms();
		if !Self::stage_ready(state, key, now) {
			return StageOutcome::NotRun;
		}
		state.actions_left -= 1;
		{
			let stage = state.stages.entry(key.to_string()).or_default();
			stage.in_flight = true;
		}

		let opts = ExecuteOpts { auto_approve: true, dry_run: false };
		let result = self.executor.execute(tool, &args, &opts).await;
		let ctx = self.executor.context();
		let now = now_ms();
		let stage = state.stages.entry(key.to_string()).or_default();
		stage.in_flight = false;

		match result {
			Ok(value) => {
				stage.done_at_ms = Some(now);
				ctx.trace.record("stage.ok", format!("{} via {}", key, tool));
				StageOutcome::Ok(value)
			},
			Err(err) => {
				if let Some(marker) = waiting_marker {
					if err.code == crate::tools::error::ToolErrorCode::Precondition
						&& err.message.contains(marker)
					{
						// Still waiting on the counterparty, not a failure.
						stage.retry_after_ms = now + cooldown_ms;
						ctx.trace.record("stage.wait", format!("{}: {}", key, err.message));
						return StageOutcome::Failed(err);
					}
				}

				let permanent = is_permanent_error(&err);
				stage.retry_count += 1;
				stage.retry_after_ms = now + cooldown_ms;
				let exhausted = stage.retry_count > ctx.config.swap.stage_retry_max;
				ctx.trace.record(
					"stage.err",
					format!(
						"{} via {} failed (attempt {}, permanent {}): {}",
						key, tool, stage.retry_count, permanent, err.message
					),
				);
				if permanent || exhausted {
					stage.done_at_ms = Some(now);
					self.abort_trade(state, trade_id, swap_channel, &err.message).await;
				}
				StageOutcome::Failed(err)
			},
		}
	}

	/// Aborts a trade: journals the reason, emits CANCEL while still safe
	/// (the cancel tool enforces the pre-escrow guard itself) and leaves
	/// the swap channel.
	pub(crate) async fn abort_trade(
		&self, state: &mut LoopState, trade_id: &str, swap_channel: Option<&str>, reason: &str,
	) {
		if !state.force_abort.insert(trade_id.to_string()) {
			return;
		}
		let ctx = self.executor.context();
		ctx.trace.record("trade.abort", format!("{}: {}", trade_id, reason));
		let _ = ctx.store.upsert_trade(
			trade_id,
			&TradePatch { last_error: Some(reason.to_string()), ..Default::default() },
		);

		let cancel_args = serde_json::json!({ "trade_id": trade_id, "reason": reason });
		let opts = ExecuteOpts { auto_approve: true, dry_run: false };
		match self.executor.execute("swap_cancel_post", &cancel_args, &opts).await {
			Ok(_) => {},
			Err(e) => {
				// Post-escrow the guard refuses by design; everything else
				// is merely diagnostic here.
				ctx.trace.record("trade.abort", format!("{}: cancel skipped: {}", trade_id, e));
			},
		}

		let channel = swap_channel
			.map(str::to_string)
			.or_else(|| {
				ctx.store.get_trade(trade_id).ok().flatten().and_then(|t| t.swap_channel)
			});
		if let Some(channel) = channel {
			if let Err(e) = ctx.session.leave(&channel).await {
				ctx.trace.record("trade.abort", format!("leave {} failed: {}", channel, e));
			}
		}
		state.waiting_terms.remove(trade_id);
		state.terms_replay.remove(trade_id);
		state.ln_pay_fail.remove(trade_id);
	}

	/// Reconciles receipts and listing locks when a terminal envelope from
	/// the counterparty shows up on the bus.
	pub(crate) async fn observe_terminal(
		&self, view: &contexts::SettlementView,
	) {
		let ctx = self.executor.context();
		let trade_id = &view.trade_id;
		let trade = match ctx.store.get_trade(trade_id) {
			Ok(trade) => trade,
			Err(_) => return,
		};
		let Some(trade) = trade else { return };
		if trade.state.is_terminal() {
			return;
		}

		if view.claimed.is_some() {
			let _ = ctx.store.upsert_trade(
				trade_id,
				&TradePatch { state: Some(TradeState::Claimed), ..Default::default() },
			);
			let _ = ctx.locks.fill_for_trade(trade_id);
		} else if view.refunded.is_some() {
			let _ = ctx.store.upsert_trade(
				trade_id,
				&TradePatch { state: Some(TradeState::Refunded), ..Default::default() },
			);
			let _ = ctx.locks.release_for_trade(trade_id);
		} else if view.canceled.is_some() {
			// Cancel from the counterparty is only honored pre-escrow.
			if trade.state.pipeline_rank().map_or(false, |rank| {
				rank < TradeState::Escrow.pipeline_rank().unwrap_or(u8::MAX)
			}) {
				let _ = ctx.store.upsert_trade(
					trade_id,
					&TradePatch { state: Some(TradeState::Canceled), ..Default::default() },
				);
				let _ = ctx.locks.release_for_trade(trade_id);
			}
		}
	}
}
