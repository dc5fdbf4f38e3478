// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Opt-in diagnostic trace ring.
//!
//! The engine never logs by default; when `trace_enabled` is set, the last
//! 600 trace events are retained in memory and exposed through the `env_get`
//! read-only tool for operator diagnosis.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;

use crate::util::now_ms;

const TRACE_RING_CAPACITY: usize = 600;

#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
	pub ts_ms: u64,
	pub scope: String,
	pub message: String,
}

pub struct TraceRing {
	enabled: bool,
	entries: Mutex<VecDeque<TraceEntry>>,
}

impl TraceRing {
	pub fn new(enabled: bool) -> Self {
		Self { enabled, entries: Mutex::new(VecDeque::with_capacity(64)) }
	}

	pub fn enabled(&self) -> bool {
		self.enabled
	}

	pub fn record(&self, scope: &str, message: impl Into<String>) {
		if !self.enabled {
			return;
		}
		let message = message.into();
		log::debug!(target: "intercomswap::trace", "[{}] {}", scope, message);
		let mut entries = self.entries.lock().expect("trace ring lock poisoned");
		if entries.len() == TRACE_RING_CAPACITY {
			entries.pop_front();
		}
		entries.push_back(TraceEntry { ts_ms: now_ms(), scope: scope.to_string(), message });
	}

	pub fn snapshot(&self) -> Vec<TraceEntry> {
		self.entries.lock().expect("trace ring lock poisoned").iter().cloned().collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn disabled_ring_records_nothing() {
		let ring = TraceRing::new(false);
		ring.record("tick", "ignored");
		assert!(ring.snapshot().is_empty());
	}

	#[test]
	fn ring_is_bounded() {
		let ring = TraceRing::new(true);
		for i in 0..(TRACE_RING_CAPACITY + 50) {
			ring.record("tick", format!("event {}", i));
		}
		let snapshot = ring.snapshot();
		assert_eq!(snapshot.len(), TRACE_RING_CAPACITY);
		assert_eq!(snapshot.first().unwrap().message, "event 50");
		assert_eq!(snapshot.last().unwrap().message, format!("event {}", TRACE_RING_CAPACITY + 49));
	}
}
