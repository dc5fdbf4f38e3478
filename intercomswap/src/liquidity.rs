// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Lightning liquidity precheck.
//!
//! Both supported node backends report channels differently: LND-style
//! nodes expose `local_balance`/`remote_balance` per channel, CLN-style
//! nodes expose msat fields and a channel `state`. This module flattens
//! either shape into one row type, summarizes outbound/inbound capacity,
//! and asserts `need <= have` before any money moves.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::ln::{LightningRpc, LnBackend};
use crate::rpc::RpcError;

/// Normalized view of one channel, independent of backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelView {
	pub id: String,
	/// Remote node id, hex.
	pub peer: String,
	pub active: bool,
	pub local_sats: u64,
	pub remote_sats: u64,
	pub capacity_sats: u64,
}

/// Per-side capacity summary over all normalized channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LiquiditySummary {
	pub channels_active: u32,
	pub max_outbound_sats: u64,
	pub total_outbound_sats: u64,
	pub max_inbound_sats: u64,
	pub total_inbound_sats: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidityMode {
	/// `have` is the single best channel.
	SingleChannel,
	/// `have` is the sum across active channels.
	Aggregate,
}

impl LiquidityMode {
	pub fn as_str(&self) -> &'static str {
		match self {
			LiquidityMode::SingleChannel => "single_channel",
			LiquidityMode::Aggregate => "aggregate",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquiditySide {
	Outbound,
	Inbound,
}

/// Precheck failure carrying every observed number for operator diagnosis.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidityShortfall {
	pub side: LiquiditySide,
	pub mode: LiquidityMode,
	pub required_sats: u64,
	pub have_sats: u64,
	pub summary: LiquiditySummary,
}

impl fmt::Display for LiquidityShortfall {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let side = match self.side {
			LiquiditySide::Outbound => "outbound",
			LiquiditySide::Inbound => "inbound",
		};
		write!(
			f,
			"insufficient {} liquidity: required {} sats, have {} sats ({} mode; \
			 active_channels={}, max_outbound={}, total_outbound={}, max_inbound={}, total_inbound={})",
			side,
			self.required_sats,
			self.have_sats,
			self.mode.as_str(),
			self.summary.channels_active,
			self.summary.max_outbound_sats,
			self.summary.total_outbound_sats,
			self.summary.max_inbound_sats,
			self.summary.total_inbound_sats,
		)
	}
}

impl std::error::Error for LiquidityShortfall {}

/// Flattens a backend's raw `list_channels` JSON into normalized rows.
/// Unparseable entries are skipped rather than failing the whole view.
pub fn normalize_channels(backend: LnBackend, raw: &Value) -> Vec<ChannelView> {
	let channels = raw
		.get("channels")
		.and_then(Value::as_array)
		.map(Vec::as_slice)
		.unwrap_or_default();
	channels
		.iter()
		.filter_map(|ch| match backend {
			LnBackend::Lnd => normalize_lnd_channel(ch),
			LnBackend::Cln => normalize_cln_channel(ch),
		})
		.collect()
}

fn normalize_lnd_channel(ch: &Value) -> Option<ChannelView> {
	let id = ch
		.get("chan_id")
		.or_else(|| ch.get("channel_point"))
		.and_then(value_as_string)?;
	let peer = ch.get("remote_pubkey").and_then(value_as_string)?;
	let local_sats = ch.get("local_balance").and_then(value_as_u64)?;
	let remote_sats = ch.get("remote_balance").and_then(value_as_u64)?;
	let capacity_sats =
		ch.get("capacity").and_then(value_as_u64).unwrap_or(local_sats + remote_sats);
	let active = ch.get("active").and_then(Value::as_bool).unwrap_or(false);
	Some(ChannelView { id, peer, active, local_sats, remote_sats, capacity_sats })
}

fn normalize_cln_channel(ch: &Value) -> Option<ChannelView> {
	let id = ch
		.get("short_channel_id")
		.or_else(|| ch.get("channel_id"))
		.and_then(value_as_string)?;
	let peer = ch.get("peer_id").and_then(value_as_string)?;
	let spendable_msat = ch.get("spendable_msat").and_then(value_as_msat)?;
	let receivable_msat = ch.get("receivable_msat").and_then(value_as_msat).unwrap_or(0);
	let total_msat = ch
		.get("total_msat")
		.and_then(value_as_msat)
		.unwrap_or(spendable_msat + receivable_msat);
	let state = ch.get("state").and_then(Value::as_str).unwrap_or("");
	Some(ChannelView {
		id,
		peer,
		active: state == "CHANNELD_NORMAL",
		local_sats: spendable_msat / 1000,
		remote_sats: receivable_msat / 1000,
		capacity_sats: total_msat / 1000,
	})
}

fn value_as_string(v: &Value) -> Option<String> {
	match v {
		Value::String(s) => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		_ => None,
	}
}

// LND reports balances either as numbers or as numeric strings depending
// on transport.
fn value_as_u64(v: &Value) -> Option<u64> {
	match v {
		Value::Number(n) => n.as_u64(),
		Value::String(s) => s.parse().ok(),
		_ => None,
	}
}

// CLN msat fields appear as plain numbers or as "123msat" strings.
fn value_as_msat(v: &Value) -> Option<u64> {
	match v {
		Value::Number(n) => n.as_u64(),
		Value::String(s) => s.trim_end_matches("msat").parse().ok(),
		_ => None,
	}
}

/// Summarizes normalized channels; only active channels count.
pub fn summarize(channels: &[ChannelView]) -> LiquiditySummary {
	let mut summary = LiquiditySummary::default();
	for ch in channels.iter().filter(|ch| ch.active) {
		summary.channels_active += 1;
		summary.max_outbound_sats = summary.max_outbound_sats.max(ch.local_sats);
		summary.total_outbound_sats += ch.local_sats;
		summary.max_inbound_sats = summary.max_inbound_sats.max(ch.remote_sats);
		summary.total_inbound_sats += ch.remote_sats;
	}
	summary
}

/// Fails fast when `required > 0` and the selected side/mode cannot cover
/// it, or when no channel is active at all.
pub fn assert_liquidity(
	summary: &LiquiditySummary, mode: LiquidityMode, side: LiquiditySide, required_sats: u64,
) -> Result<(), LiquidityShortfall> {
	if required_sats == 0 {
		return Ok(());
	}
	let have_sats = match (mode, side) {
		(LiquidityMode::SingleChannel, LiquiditySide::Outbound) => summary.max_outbound_sats,
		(LiquidityMode::SingleChannel, LiquiditySide::Inbound) => summary.max_inbound_sats,
		(LiquidityMode::Aggregate, LiquiditySide::Outbound) => summary.total_outbound_sats,
		(LiquidityMode::Aggregate, LiquiditySide::Inbound) => summary.total_inbound_sats,
	};
	if summary.channels_active < 1 || have_sats < required_sats {
		return Err(LiquidityShortfall {
			side,
			mode,
			required_sats,
			have_sats,
			summary: *summary,
		});
	}
	Ok(())
}

const ROUTE_PROBE_ATTEMPTS: u32 = 3;
const ROUTE_PROBE_BACKOFF: Duration = Duration::from_millis(1500);

/// LND-only graph probe: asks the router for candidate routes to the
/// invoice destination. Used when the invoice carries no route hints and
/// no single direct channel has enough outbound.
pub async fn route_probe(
	ln: &dyn LightningRpc, destination: &str, amt_sats: u64,
) -> Result<(), RpcError> {
	if ln.backend() != LnBackend::Lnd {
		return Ok(());
	}
	let mut last_err = None;
	for attempt in 0..ROUTE_PROBE_ATTEMPTS {
		if attempt > 0 {
			tokio::time::sleep(ROUTE_PROBE_BACKOFF).await;
		}
		match ln.query_routes(destination, amt_sats, 1).await {
			Ok(routes) if routes > 0 => return Ok(()),
			Ok(_) => {
				last_err = Some(RpcError::permanent(format!(
					"unroutable invoice precheck: no route to {} for {} sats",
					destination, amt_sats
				)));
			},
			Err(e) if e.transient => last_err = Some(e),
			Err(e) => return Err(e),
		}
	}
	Err(last_err.unwrap_or_else(|| RpcError::permanent("unroutable invoice precheck")))
}
