// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Sidechannel bus session.
//!
//! Wraps the transport with a process-monotonic event log (a bounded ring),
//! local echo of outbound sends, waiter predicates, and transparent
//! reconnection. The session never clobbers other clients' subscriptions:
//! every subscribe is the union of the requested set and what the bus
//! reports as currently subscribed.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use intercomswap_wire::{validate, Envelope};

use crate::rpc::RpcError;
use crate::util::now_ms;

/// Bounded size of the in-memory event ring.
pub const LOG_RING_CAPACITY: usize = 2000;

/// Capability interface over the bus transport (pub/sub with
/// invites/welcomes).
#[async_trait]
pub trait SidechannelTransport: Send + Sync {
	async fn connect(&self) -> Result<(), RpcError>;

	fn is_open(&self) -> bool;

	async fn subscribe(&self, channels: &[String]) -> Result<(), RpcError>;

	async fn join(
		&self, channel: &str, invite: Option<&str>, welcome: Option<&str>,
	) -> Result<(), RpcError>;

	async fn leave(&self, channel: &str) -> Result<(), RpcError>;

	async fn send(&self, channel: &str, payload: &str) -> Result<(), RpcError>;

	async fn add_inviter_key(&self, key_hex: &str) -> Result<(), RpcError>;

	/// Channels the bus currently has this client subscribed to.
	async fn stats(&self) -> Result<Vec<String>, RpcError>;

	/// 32-byte hex peer id from the bus hello.
	async fn info(&self) -> Result<String, RpcError>;
}

/// A message delivered by the transport callback.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
	pub channel: String,
	pub origin: Option<String>,
	pub relayed_by: Option<String>,
	pub ttl: Option<u32>,
	pub ts: u64,
	pub message: String,
}

/// One entry of the session log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
	/// Process-monotonic sequence number.
	pub seq: u64,
	pub ts: u64,
	pub channel: String,
	pub message: String,
	pub origin: Option<String>,
	pub relayed_by: Option<String>,
	pub ttl: Option<u32>,
	/// Whether this entry is the local echo of an outbound send.
	pub local: bool,
}

impl LogEvent {
	/// Parses the payload as a swap envelope, if it is one. Control
	/// messages and free text return `None`.
	pub fn envelope(&self) -> Option<Envelope> {
		serde_json::from_str(&self.message).ok()
	}
}

type WaiterPredicate = Box<dyn Fn(&LogEvent) -> bool + Send>;

struct Waiter {
	id: u64,
	predicate: WaiterPredicate,
	tx: oneshot::Sender<LogEvent>,
}

struct SessionState {
	next_seq: u64,
	log: VecDeque<LogEvent>,
	known_subscriptions: BTreeSet<String>,
	waiters: Vec<Waiter>,
	next_waiter_id: u64,
	cached_peer: Option<String>,
}

pub struct Session {
	transport: Arc<dyn SidechannelTransport>,
	state: Mutex<SessionState>,
}

impl Session {
	pub fn new(transport: Arc<dyn SidechannelTransport>) -> Arc<Self> {
		Arc::new(Self {
			transport,
			state: Mutex::new(SessionState {
				next_seq: 1,
				log: VecDeque::with_capacity(64),
				known_subscriptions: BTreeSet::new(),
				waiters: Vec::new(),
				next_waiter_id: 1,
				cached_peer: None,
			}),
		})
	}

	/// Drains transport callbacks into the log. Spawn once per session.
	pub async fn run_pump(self: Arc<Self>, mut rx: mpsc::Receiver<InboundMessage>) {
		while let Some(msg) = rx.recv().await {
			self.ingest(msg);
		}
	}

	/// Appends an inbound message to the log and wakes matching waiters.
	pub fn ingest(&self, msg: InboundMessage) {
		let event = LogEvent {
			seq: 0,
			ts: msg.ts,
			channel: msg.channel,
			message: msg.message,
			origin: msg.origin,
			relayed_by: msg.relayed_by,
			ttl: msg.ttl,
			local: false,
		};
		self.append(event);
	}

	fn append(&self, mut event: LogEvent) {
		let mut state = self.state.lock().expect("session lock poisoned");
		event.seq = state.next_seq;
		state.next_seq += 1;
		if state.log.len() == LOG_RING_CAPACITY {
			state.log.pop_front();
		}
		state.log.push_back(event.clone());

		// Each waiter receives exactly one matching event and is removed.
		let mut remaining = Vec::with_capacity(state.waiters.len());
		for waiter in state.waiters.drain(..) {
			if (waiter.predicate)(&event) {
				let _ = waiter.tx.send(event.clone());
			} else {
				remaining.push(waiter);
			}
		}
		state.waiters = remaining;
	}

	async fn ensure_connected(&self) -> Result<(), RpcError> {
		if self.transport.is_open() {
			return Ok(());
		}
		// Drop the stale handle and reconnect, reapplying the full known
		// subscription set.
		self.transport.connect().await?;
		let known: Vec<String> = {
			let state = self.state.lock().expect("session lock poisoned");
			state.known_subscriptions.iter().cloned().collect()
		};
		if !known.is_empty() {
			self.transport.subscribe(&known).await?;
		}
		Ok(())
	}

	/// Subscribes to `channels`, unioned with whatever the bus says this
	/// client is already subscribed to.
	pub async fn subscribe(&self, channels: &[String]) -> Result<(), RpcError> {
		self.ensure_connected().await?;
		let mut union: BTreeSet<String> = channels.iter().cloned().collect();
		match self.transport.stats().await {
			Ok(current) => union.extend(current),
			Err(e) => log::warn!("sidechannel stats unavailable, subscribing blind: {}", e),
		}
		{
			let state = self.state.lock().expect("session lock poisoned");
			union.extend(state.known_subscriptions.iter().cloned());
		}
		let union_vec: Vec<String> = union.iter().cloned().collect();
		self.transport.subscribe(&union_vec).await?;
		let mut state = self.state.lock().expect("session lock poisoned");
		state.known_subscriptions = union;
		Ok(())
	}

	/// Validates and sends a signed envelope, appending a local echo.
	pub async fn send_envelope(&self, channel: &str, env: &Envelope) -> Result<(), RpcError> {
		validate::validate_envelope(env).map_err(|e| RpcError::permanent(e.to_string()))?;
		if env.sig.is_none() || env.signer.is_none() {
			return Err(RpcError::permanent("refusing to send unsigned envelope"));
		}
		let payload = serde_json::to_string(env)
			.map_err(|e| RpcError::permanent(format!("envelope serialization failed: {}", e)))?;
		self.send_text(channel, &payload).await
	}

	/// Sends a raw payload (control JSON or text) with local echo.
	pub async fn send_text(&self, channel: &str, payload: &str) -> Result<(), RpcError> {
		self.ensure_connected().await?;
		self.transport.send(channel, payload).await?;
		let origin = {
			let state = self.state.lock().expect("session lock poisoned");
			state.cached_peer.clone()
		};
		self.append(LogEvent {
			seq: 0,
			ts: now_ms(),
			channel: channel.to_string(),
			message: payload.to_string(),
			origin,
			relayed_by: None,
			ttl: None,
			local: true,
		});
		Ok(())
	}

	pub async fn join(
		&self, channel: &str, invite: Option<&str>, welcome: Option<&str>,
	) -> Result<(), RpcError> {
		self.ensure_connected().await?;
		self.transport.join(channel, invite, welcome).await?;
		let mut state = self.state.lock().expect("session lock poisoned");
		state.known_subscriptions.insert(channel.to_string());
		Ok(())
	}

	pub async fn leave(&self, channel: &str) -> Result<(), RpcError> {
		self.ensure_connected().await?;
		self.transport.leave(channel).await?;
		let mut state = self.state.lock().expect("session lock poisoned");
		state.known_subscriptions.remove(channel);
		Ok(())
	}

	pub async fn add_inviter_key(&self, key_hex: &str) -> Result<(), RpcError> {
		self.ensure_connected().await?;
		self.transport.add_inviter_key(key_hex).await
	}

	pub fn subscriptions(&self) -> Vec<String> {
		let state = self.state.lock().expect("session lock poisoned");
		state.known_subscriptions.iter().cloned().collect()
	}

	/// Highest sequence number assigned so far.
	pub fn last_seq(&self) -> u64 {
		let state = self.state.lock().expect("session lock poisoned");
		state.next_seq - 1
	}

	/// Events after `after_seq`, bounded by count and age.
	pub fn events_since(&self, after_seq: u64, max_events: usize, max_age_ms: u64) -> Vec<LogEvent> {
		let now = now_ms();
		let state = self.state.lock().expect("session lock poisoned");
		state
			.log
			.iter()
			.filter(|event| event.seq > after_seq)
			.filter(|event| now.saturating_sub(event.ts) <= max_age_ms)
			.take(max_events)
			.cloned()
			.collect()
	}

	/// Waits for the next event matching `predicate`; delivered exactly
	/// once, `None` on timeout.
	pub async fn wait_for<F>(&self, predicate: F, timeout: Duration) -> Option<LogEvent>
	where
		F: Fn(&LogEvent) -> bool + Send + 'static,
	{
		let (tx, rx) = oneshot::channel();
		let waiter_id = {
			let mut state = self.state.lock().expect("session lock poisoned");
			let id = state.next_waiter_id;
			state.next_waiter_id += 1;
			state.waiters.push(Waiter { id, predicate: Box::new(predicate), tx });
			id
		};
		match tokio::time::timeout(timeout, rx).await {
			Ok(Ok(event)) => Some(event),
			_ => {
				let mut state = self.state.lock().expect("session lock poisoned");
				state.waiters.retain(|w| w.id != waiter_id);
				None
			},
		}
	}

	/// Local peer id from the bus hello. The last known value is cached so
	/// a transient lookup failure does not stall callers.
	pub async fn local_peer(&self) -> Result<String, RpcError> {
		match self.ensure_connected().await {
			Ok(()) => {},
			Err(e) => return self.cached_peer_or(e),
		}
		match self.transport.info().await {
			Ok(peer) => {
				let mut state = self.state.lock().expect("session lock poisoned");
				state.cached_peer = Some(peer.clone());
				Ok(peer)
			},
			Err(e) => self.cached_peer_or(e),
		}
	}

	fn cached_peer_or(&self, err: RpcError) -> Result<String, RpcError> {
		let state = self.state.lock().expect("session lock poisoned");
		state.cached_peer.clone().ok_or(err)
	}
}

#[cfg(test)]
pub(crate) mod test_support {
	use super::*;
	use std::sync::atomic::{AtomicBool, Ordering};

	/// Records every transport call; used across the engine's tests.
	#[derive(Default)]
	pub struct FakeTransport {
		pub open: AtomicBool,
		pub peer: Mutex<String>,
		pub connects: Mutex<u32>,
		pub subscribed: Mutex<Vec<Vec<String>>>,
		pub bus_subscriptions: Mutex<Vec<String>>,
		pub sent: Mutex<Vec<(String, String)>>,
		pub joined: Mutex<Vec<String>>,
		pub left: Mutex<Vec<String>>,
		pub inviter_keys: Mutex<Vec<String>>,
	}

	impl FakeTransport {
		pub fn new(peer: &str) -> Arc<Self> {
			let fake = Self::default();
			*fake.peer.lock().unwrap() = peer.to_string();
			fake.open.store(true, Ordering::SeqCst);
			Arc::new(fake)
		}
	}

	#[async_trait]
	impl SidechannelTransport for FakeTransport {
		async fn connect(&self) -> Result<(), RpcError> {
			*self.connects.lock().unwrap() += 1;
			self.open.store(true, Ordering::SeqCst);
			Ok(())
		}

		fn is_open(&self) -> bool {
			self.open.load(Ordering::SeqCst)
		}

		async fn subscribe(&self, channels: &[String]) -> Result<(), RpcError> {
			self.subscribed.lock().unwrap().push(channels.to_vec());
			let mut bus = self.bus_subscriptions.lock().unwrap();
			for channel in channels {
				if !bus.contains(channel) {
					bus.push(channel.clone());
				}
			}
			Ok(())
		}

		async fn join(
			&self, channel: &str, _invite: Option<&str>, _welcome: Option<&str>,
		) -> Result<(), RpcError> {
			self.joined.lock().unwrap().push(channel.to_string());
			Ok(())
		}

		async fn leave(&self, channel: &str) -> Result<(), RpcError> {
			self.left.lock().unwrap().push(channel.to_string());
			Ok(())
		}

		async fn send(&self, channel: &str, payload: &str) -> Result<(), RpcError> {
			self.sent.lock().unwrap().push((channel.to_string(), payload.to_string()));
			Ok(())
		}

		async fn add_inviter_key(&self, key_hex: &str) -> Result<(), RpcError> {
			self.inviter_keys.lock().unwrap().push(key_hex.to_string());
			Ok(())
		}

		async fn stats(&self) -> Result<Vec<String>, RpcError> {
			Ok(self.bus_subscriptions.lock().unwrap().clone())
		}

		async fn info(&self) -> Result<String, RpcError> {
			Ok(self.peer.lock().unwrap().clone())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::test_support::FakeTransport;
	use super::*;
	use std::sync::atomic::Ordering;

	fn inbound(channel: &str, message: &str) -> InboundMessage {
		InboundMessage {
			channel: channel.to_string(),
			origin: Some("ee".repeat(32)),
			relayed_by: None,
			ttl: None,
			ts: now_ms(),
			message: message.to_string(),
		}
	}

	#[tokio::test]
	async fn subscribe_unions_with_bus_reported_set() {
		let transport = FakeTransport::new(&"aa".repeat(32));
		// Another client of the same bus connection is on "other".
		transport.bus_subscriptions.lock().unwrap().push("other".to_string());
		let session = Session::new(transport.clone());

		session.subscribe(&["0000intercomswapbtcusdt".to_string()]).await.unwrap();

		let applied = transport.subscribed.lock().unwrap().last().unwrap().clone();
		assert!(applied.contains(&"0000intercomswapbtcusdt".to_string()));
		assert!(applied.contains(&"other".to_string()));
	}

	#[tokio::test]
	async fn send_appends_local_echo_with_monotonic_seq() {
		let transport = FakeTransport::new(&"aa".repeat(32));
		let session = Session::new(transport.clone());

		session.ingest(inbound("chan", "one"));
		session.send_text("chan", "two").await.unwrap();
		session.ingest(inbound("chan", "three"));

		let events = session.events_since(0, 100, u64::MAX);
		assert_eq!(events.len(), 3);
		assert_eq!(events.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2, 3]);
		assert!(events[1].local);
		assert!(!events[2].local);
		assert_eq!(transport.sent.lock().unwrap().len(), 1);
	}

	#[tokio::test]
	async fn reconnects_and_reapplies_subscriptions() {
		let transport = FakeTransport::new(&"aa".repeat(32));
		let session = Session::new(transport.clone());
		session.subscribe(&["chan-a".to_string(), "chan-b".to_string()]).await.unwrap();

		// Socket drops; the next send must reconnect and re-subscribe.
		transport.open.store(false, Ordering::SeqCst);
		session.send_text("chan-a", "hello").await.unwrap();

		assert_eq!(*transport.connects.lock().unwrap(), 1);
		let reapplied = transport.subscribed.lock().unwrap().last().unwrap().clone();
		assert!(reapplied.contains(&"chan-a".to_string()));
		assert!(reapplied.contains(&"chan-b".to_string()));
	}

	#[tokio::test]
	async fn waiter_gets_exactly_one_matching_event() {
		let transport = FakeTransport::new(&"aa".repeat(32));
		let session = Session::new(transport);

		let wait = session.wait_for(|e| e.message.contains("needle"), Duration::from_secs(5));
		session.ingest(inbound("chan", "hay"));
		session.ingest(inbound("chan", "the needle"));
		session.ingest(inbound("chan", "the needle again"));
		let event = wait.await.expect("waiter should be woken");
		assert_eq!(event.message, "the needle");
		assert_eq!(event.seq, 2);
	}

	#[tokio::test]
	async fn waiter_times_out_and_unregisters() {
		let transport = FakeTransport::new(&"aa".repeat(32));
		let session = Session::new(transport);
		let got = session.wait_for(|_| true, Duration::from_millis(20)).await;
		assert!(got.is_none());
		let state = session.state.lock().unwrap();
		assert!(state.waiters.is_empty());
	}

	#[tokio::test]
	async fn log_ring_is_bounded() {
		let transport = FakeTransport::new(&"aa".repeat(32));
		let session = Session::new(transport);
		for i in 0..(LOG_RING_CAPACITY + 10) {
			session.ingest(inbound("chan", &format!("m{}", i)));
		}
		let events = session.events_since(0, usize::MAX, u64::MAX);
		assert_eq!(events.len(), LOG_RING_CAPACITY);
		// Seq keeps counting even though old entries fell off.
		assert_eq!(events.last().unwrap().seq as usize, LOG_RING_CAPACITY + 10);
		assert_eq!(session.last_seq() as usize, LOG_RING_CAPACITY + 10);
	}

	#[tokio::test]
	async fn unsigned_envelopes_are_refused() {
		let transport = FakeTransport::new(&"aa".repeat(32));
		let session = Session::new(transport.clone());
		let env = intercomswap_wire::build_unsigned(
			intercomswap_wire::Kind::Status,
			"t1",
			now_ms(),
			serde_json::json!({"state": "init"}),
		)
		.unwrap();
		assert!(session.send_envelope("chan", &env).await.is_err());
		assert!(transport.sent.lock().unwrap().is_empty());
	}

	#[tokio::test]
	async fn local_peer_is_cached_across_transient_failures() {
		let transport = FakeTransport::new(&"aa".repeat(32));
		let session = Session::new(transport.clone());
		assert_eq!(session.local_peer().await.unwrap(), "aa".repeat(32));
	}
}
