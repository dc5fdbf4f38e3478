// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! JSON-RPC adapters for the external capability traits.
//!
//! The engine consumes the bus, the Lightning node and the Solana signer
//! through daemon endpoints speaking a uniform JSON-RPC dialect whose
//! method names match the capability operations one to one. Everything
//! protocol-specific (bolt11 parsing, transaction building, PDA math)
//! lives behind those endpoints.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::ln::{
	CreatedInvoice, DecodedInvoice, LightningRpc, LnBackend, LnInfo, PayOptions, PayResult,
	PayState,
};
use crate::rpc::RpcError;
use crate::sidechannel::{InboundMessage, SidechannelTransport};
use crate::sol::{
	BuiltTransaction, ConfigState, CreateEscrowParams, EscrowState, SolanaRpc, TradeConfigState,
};

const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Minimal JSON-RPC 2.0 client over HTTP POST.
pub struct JsonRpcClient {
	url: String,
	auth_token: Option<String>,
	http: reqwest::Client,
	next_id: AtomicU64,
}

impl JsonRpcClient {
	pub fn new(url: String, auth_token: Option<String>) -> Self {
		Self { url, auth_token, http: reqwest::Client::new(), next_id: AtomicU64::new(1) }
	}

	pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
		let mut request = self.http.post(&self.url).json(&body);
		if let Some(token) = &self.auth_token {
			request = request.bearer_auth(token);
		}
		let response = request
			.send()
			.await
			.map_err(|e| RpcError::transient(format!("{} {}: {}", self.url, method, e)))?;
		let status = response.status();
		let payload: Value = response
			.json()
			.await
			.map_err(|e| RpcError::transient(format!("{} {}: bad response: {}", self.url, method, e)))?;
		if !status.is_success() {
			return Err(RpcError::transient(format!(
				"{} {}: http {}: {}",
				self.url, method, status, payload
			)));
		}
		if let Some(error) = payload.get("error").filter(|e| !e.is_null()) {
			// Remote application errors are not retried blindly; the
			// endpoint marks retryable conditions explicitly.
			let transient = error.get("transient").and_then(Value::as_bool).unwrap_or(false);
			let message = error
				.get("message")
				.and_then(Value::as_str)
				.unwrap_or("unspecified remote error")
				.to_string();
			let err = format!("{}: {}", method, message);
			return Err(if transient { RpcError::transient(err) } else { RpcError::permanent(err) });
		}
		let result = payload
			.get("result")
			.cloned()
			.ok_or_else(|| RpcError::transient(format!("{}: response carries no result", method)))?;
		serde_json::from_value(result)
			.map_err(|e| RpcError::permanent(format!("{}: malformed result: {}", method, e)))
	}
}

/// Sidechannel bus over JSON-RPC, with a background long-poll feeding the
/// session's event pump.
pub struct RemoteSidechannel {
	rpc: JsonRpcClient,
	open: AtomicBool,
	last_polled_seq: AtomicU64,
}

impl RemoteSidechannel {
	pub fn new(url: String) -> Arc<Self> {
		Arc::new(Self {
			rpc: JsonRpcClient::new(url, None),
			open: AtomicBool::new(false),
			last_polled_seq: AtomicU64::new(0),
		})
	}

	/// Polls the bus for new messages and forwards them to `tx` until the
	/// channel closes. Spawn alongside the session pump.
	pub async fn run_event_poll(self: Arc<Self>, tx: mpsc::Sender<InboundMessage>) {
		loop {
			tokio::time::sleep(EVENT_POLL_INTERVAL).await;
			if !self.is_open() {
				continue;
			}
			let after = self.last_polled_seq.load(Ordering::Relaxed);
			let batch: Result<Vec<Value>, RpcError> =
				self.rpc.call("poll_events", json!({ "after_seq": after })).await;
			let batch = match batch {
				Ok(batch) => batch,
				Err(e) => {
					log::debug!("sidechannel poll failed: {}", e);
					self.open.store(false, Ordering::SeqCst);
					continue;
				},
			};
			for event in batch {
				if let Some(seq) = event.get("seq").and_then(Value::as_u64) {
					self.last_polled_seq.fetch_max(seq, Ordering::Relaxed);
				}
				let message = InboundMessage {
					channel: event
						.get("channel")
						.and_then(Value::as_str)
						.unwrap_or_default()
						.to_string(),
					origin: event.get("origin").and_then(Value::as_str).map(str::to_string),
					relayed_by: event
						.get("relayedBy")
						.and_then(Value::as_str)
						.map(str::to_string),
					ttl: event.get("ttl").and_then(Value::as_u64).map(|ttl| ttl as u32),
					ts: event.get("ts").and_then(Value::as_u64).unwrap_or(0),
					message: event
						.get("message")
						.and_then(Value::as_str)
						.unwrap_or_default()
						.to_string(),
				};
				if tx.send(message).await.is_err() {
					return;
				}
			}
		}
	}
}

#[async_trait]
impl SidechannelTransport for RemoteSidechannel {
	async fn connect(&self) -> Result<(), RpcError> {
		let _: Value = self.rpc.call("connect", json!({})).await?;
		self.open.store(true, Ordering::SeqCst);
		Ok(())
	}

	fn is_open(&self) -> bool {
		self.open.load(Ordering::SeqCst)
	}

	async fn subscribe(&self, channels: &[String]) -> Result<(), RpcError> {
		let _: Value = self.rpc.call("subscribe", json!({ "channels": channels })).await?;
		Ok(())
	}

	async fn join(
		&self, channel: &str, invite: Option<&str>, welcome: Option<&str>,
	) -> Result<(), RpcError> {
		let _: Value = self
			.rpc
			.call("join", json!({ "channel": channel, "invite": invite, "welcome": welcome }))
			.await?;
		Ok(())
	}

	async fn leave(&self, channel: &str) -> Result<(), RpcError> {
		let _: Value = self.rpc.call("leave", json!({ "channel": channel })).await?;
		Ok(())
	}

	async fn send(&self, channel: &str, payload: &str) -> Result<(), RpcError> {
		let result: Result<Value, RpcError> = self
			.rpc
			.call("send", json!({ "channel": channel, "message": payload }))
			.await;
		if result.is_err() {
			// Drop the handle so the next operation reconnects.
			self.open.store(false, Ordering::SeqCst);
		}
		result.map(|_| ())
	}

	async fn add_inviter_key(&self, key_hex: &str) -> Result<(), RpcError> {
		let _: Value = self.rpc.call("addInviterKey", json!({ "key": key_hex })).await?;
		Ok(())
	}

	async fn stats(&self) -> Result<Vec<String>, RpcError> {
		let stats: Value = self.rpc.call("stats", json!({})).await?;
		Ok(stats
			.get("channels")
			.and_then(Value::as_array)
			.map(|channels| {
				channels
					.iter()
					.filter_map(|channel| channel.as_str().map(str::to_string))
					.collect()
			})
			.unwrap_or_default())
	}

	async fn info(&self) -> Result<String, RpcError> {
		let info: Value = self.rpc.call("info", json!({})).await?;
		info.get("peer")
			.and_then(Value::as_str)
			.map(str::to_string)
			.ok_or_else(|| RpcError::permanent("bus info carries no peer key"))
	}
}

/// Lightning node behind a JSON-RPC shim.
pub struct RemoteLightningRpc {
	rpc: JsonRpcClient,
	backend: LnBackend,
}

impl RemoteLightningRpc {
	pub fn new(url: String, auth_token: Option<String>, backend: LnBackend) -> Self {
		Self { rpc: JsonRpcClient::new(url, auth_token), backend }
	}
}

#[async_trait]
impl LightningRpc for RemoteLightningRpc {
	fn backend(&self) -> LnBackend {
		self.backend
	}

	async fn get_info(&self) -> Result<LnInfo, RpcError> {
		self.rpc.call("get_info", json!({})).await
	}

	async fn new_addr(&self) -> Result<String, RpcError> {
		self.rpc.call("new_addr", json!({})).await
	}

	async fn list_funds(&self) -> Result<Value, RpcError> {
		self.rpc.call("list_funds", json!({})).await
	}

	async fn list_peers(&self) -> Result<Value, RpcError> {
		self.rpc.call("list_peers", json!({})).await
	}

	async fn list_channels(&self) -> Result<Value, RpcError> {
		self.rpc.call("list_channels", json!({})).await
	}

	async fn connect_peer(&self, peer_uri: &str) -> Result<(), RpcError> {
		let _: Value = self.rpc.call("connect", json!({ "peer_uri": peer_uri })).await?;
		Ok(())
	}

	async fn fund_channel(
		&self, node_id: &str, amount_sats: u64, sat_per_vbyte: Option<u64>, push_sats: u64,
	) -> Result<String, RpcError> {
		self.rpc
			.call(
				"fund_channel",
				json!({
					"node_id": node_id,
					"amount_sats": amount_sats,
					"sat_per_vbyte": sat_per_vbyte,
					"push_sats": push_sats,
				}),
			)
			.await
	}

	async fn close_channel(&self, channel_id: &str, force: bool) -> Result<(), RpcError> {
		let _: Value = self
			.rpc
			.call("close_channel", json!({ "channel_id": channel_id, "force": force }))
			.await?;
		Ok(())
	}

	async fn splice_channel(&self, channel_id: &str, delta_sats: i64) -> Result<(), RpcError> {
		let _: Value = self
			.rpc
			.call("splice_channel", json!({ "channel_id": channel_id, "delta_sats": delta_sats }))
			.await?;
		Ok(())
	}

	async fn invoice(
		&self, amount_msat: u64, label: &str, description: &str, expiry_sec: u64,
	) -> Result<CreatedInvoice, RpcError> {
		self.rpc
			.call(
				"invoice",
				json!({
					"amount_msat": amount_msat,
					"label": label,
					"description": description,
					"expiry_sec": expiry_sec,
				}),
			)
			.await
	}

	async fn decodepay(&self, bolt11: &str) -> Result<DecodedInvoice, RpcError> {
		self.rpc.call("decodepay", json!({ "bolt11": bolt11 })).await
	}

	async fn pay(&self, bolt11: &str, opts: &PayOptions) -> Result<PayResult, RpcError> {
		self.rpc.call("pay", json!({ "bolt11": bolt11, "options": opts })).await
	}

	async fn pay_status(&self, payment_hash_hex: &str) -> Result<PayState, RpcError> {
		self.rpc.call("pay_status", json!({ "payment_hash": payment_hash_hex })).await
	}

	async fn query_routes(
		&self, destination: &str, amt_sats: u64, num_routes: u32,
	) -> Result<u32, RpcError> {
		let result: Value = self
			.rpc
			.call(
				"query_routes",
				json!({
					"destination": destination,
					"amt_sats": amt_sats,
					"num_routes": num_routes,
				}),
			)
			.await?;
		Ok(result.get("routes_found").and_then(Value::as_u64).unwrap_or(0) as u32)
	}

	async fn preimage_get(&self, payment_hash_hex: &str) -> Result<Option<String>, RpcError> {
		self.rpc.call("preimage_get", json!({ "payment_hash": payment_hash_hex })).await
	}
}

/// Solana RPC + escrow program signer behind a JSON-RPC shim.
pub struct RemoteSolanaRpc {
	rpc: JsonRpcClient,
	local_signer: String,
	program_id: String,
}

impl RemoteSolanaRpc {
	pub fn new(url: String, local_signer: String, program_id: String) -> Self {
		Self { rpc: JsonRpcClient::new(url, None), local_signer, program_id }
	}

	/// Queries the signer endpoint for its pubkey; used at startup when the
	/// config does not pin one.
	pub async fn fetch_local_signer(url: &str) -> Result<String, RpcError> {
		let rpc = JsonRpcClient::new(url.to_string(), None);
		let result: Value = rpc.call("get_signer", json!({})).await?;
		result
			.get("pubkey")
			.and_then(Value::as_str)
			.map(str::to_string)
			.ok_or_else(|| RpcError::permanent("signer endpoint carries no pubkey"))
	}
}

#[async_trait]
impl SolanaRpc for RemoteSolanaRpc {
	fn local_signer(&self) -> String {
		self.local_signer.clone()
	}

	fn program_id(&self) -> String {
		self.program_id.clone()
	}

	async fn get_balance(&self, pubkey: &str) -> Result<u64, RpcError> {
		self.rpc.call("get_balance", json!({ "pubkey": pubkey })).await
	}

	async fn get_account_info(&self, pubkey: &str) -> Result<Option<Value>, RpcError> {
		self.rpc.call("get_account_info", json!({ "pubkey": pubkey })).await
	}

	async fn get_associated_token_address(
		&self, owner: &str, mint: &str,
	) -> Result<String, RpcError> {
		self.rpc
			.call("get_associated_token_address", json!({ "owner": owner, "mint": mint }))
			.await
	}

	async fn get_latest_blockhash(&self) -> Result<String, RpcError> {
		self.rpc.call("get_latest_blockhash", json!({})).await
	}

	async fn get_fee_for_message(&self, tx: &BuiltTransaction) -> Result<u64, RpcError> {
		self.rpc.call("get_fee_for_message", json!({ "tx": tx })).await
	}

	async fn get_minimum_balance_for_rent_exemption(
		&self, space: usize,
	) -> Result<u64, RpcError> {
		self.rpc
			.call("get_minimum_balance_for_rent_exemption", json!({ "space": space }))
			.await
	}

	async fn request_airdrop(&self, pubkey: &str, lamports: u64) -> Result<String, RpcError> {
		self.rpc
			.call("request_airdrop", json!({ "pubkey": pubkey, "lamports": lamports }))
			.await
	}

	async fn send_raw_transaction(&self, tx: &BuiltTransaction) -> Result<String, RpcError> {
		self.rpc.call("send_raw_transaction", json!({ "tx": tx })).await
	}

	async fn confirm_transaction(&self, signature: &str) -> Result<(), RpcError> {
		let _: Value =
			self.rpc.call("confirm_transaction", json!({ "signature": signature })).await?;
		Ok(())
	}

	async fn derive_escrow_pda(
		&self, payment_hash_hex: &str,
	) -> Result<(String, String), RpcError> {
		let result: Value =
			self.rpc.call("derive_escrow_pda", json!({ "payment_hash": payment_hash_hex })).await?;
		let pda = result
			.get("escrow_pda")
			.and_then(Value::as_str)
			.ok_or_else(|| RpcError::permanent("derive_escrow_pda: no escrow_pda"))?;
		let vault = result
			.get("vault_ata")
			.and_then(Value::as_str)
			.ok_or_else(|| RpcError::permanent("derive_escrow_pda: no vault_ata"))?;
		Ok((pda.to_string(), vault.to_string()))
	}

	async fn get_escrow_state(
		&self, payment_hash_hex: &str,
	) -> Result<Option<EscrowState>, RpcError> {
		self.rpc.call("get_escrow_state", json!({ "payment_hash": payment_hash_hex })).await
	}

	async fn get_config_state(&self) -> Result<Option<ConfigState>, RpcError> {
		self.rpc.call("get_config_state", json!({})).await
	}

	async fn get_trade_config_state(
		&self, collector: &str,
	) -> Result<Option<TradeConfigState>, RpcError> {
		self.rpc.call("get_trade_config_state", json!({ "collector": collector })).await
	}

	async fn build_create_escrow_tx(
		&self, params: &CreateEscrowParams,
	) -> Result<BuiltTransaction, RpcError> {
		self.rpc.call("build_create_escrow_tx", json!({ "params": params })).await
	}

	async fn build_claim_escrow_tx(
		&self, payment_hash_hex: &str, preimage_hex: &str,
	) -> Result<BuiltTransaction, RpcError> {
		self.rpc
			.call(
				"build_claim_escrow_tx",
				json!({ "payment_hash": payment_hash_hex, "preimage": preimage_hex }),
			)
			.await
	}

	async fn build_refund_escrow_tx(
		&self, payment_hash_hex: &str,
	) -> Result<BuiltTransaction, RpcError> {
		self.rpc
			.call("build_refund_escrow_tx", json!({ "payment_hash": payment_hash_hex }))
			.await
	}
}
