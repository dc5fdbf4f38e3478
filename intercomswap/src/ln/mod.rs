// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Lightning node capability interface.
//!
//! The engine never embeds a node; it talks to an external LND- or
//! CLN-style daemon through this trait. `list_channels` returns the
//! backend's raw JSON view — normalization across the two shapes lives in
//! [`crate::liquidity`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rpc::RpcError;

/// Which wire dialect the connected node speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LnBackend {
	Lnd,
	Cln,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LnInfo {
	/// 33-byte hex node id.
	pub node_id: String,
	pub alias: Option<String>,
	pub backend: LnBackend,
}

/// Result of `decodepay` on a bolt11 invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedInvoice {
	/// 33-byte hex destination node id.
	pub destination: String,
	/// 32-byte hex payment hash.
	pub payment_hash: String,
	pub amount_msat: Option<u64>,
	pub expires_at_unix: u64,
	/// Number of route hint hops carried by the invoice.
	pub route_hint_count: u32,
	pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedInvoice {
	pub bolt11: String,
	/// 32-byte hex payment hash.
	pub payment_hash: String,
}

/// Routing constraints for `pay`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayOptions {
	pub outgoing_chan_id: Option<String>,
	pub last_hop_pubkey: Option<String>,
	pub fee_limit_sat: Option<u64>,
	pub allow_self_payment: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayResult {
	/// 32-byte hex payment hash.
	pub payment_hash: String,
	/// 32-byte hex preimage learned on settlement.
	pub preimage_hex: String,
	pub fee_msat: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayState {
	Pending,
	Succeeded,
	Failed,
}

/// Capability interface over the external Lightning node RPC.
#[async_trait]
pub trait LightningRpc: Send + Sync {
	fn backend(&self) -> LnBackend;

	async fn get_info(&self) -> Result<LnInfo, RpcError>;

	async fn new_addr(&self) -> Result<String, RpcError>;

	async fn list_funds(&self) -> Result<Value, RpcError>;

	async fn list_peers(&self) -> Result<Value, RpcError>;

	/// Raw backend channel view; see [`crate::liquidity::normalize_channels`].
	async fn list_channels(&self) -> Result<Value, RpcError>;

	async fn connect_peer(&self, peer_uri: &str) -> Result<(), RpcError>;

	async fn fund_channel(
		&self, node_id: &str, amount_sats: u64, sat_per_vbyte: Option<u64>, push_sats: u64,
	) -> Result<String, RpcError>;

	async fn close_channel(&self, channel_id: &str, force: bool) -> Result<(), RpcError>;

	async fn splice_channel(&self, channel_id: &str, delta_sats: i64) -> Result<(), RpcError>;

	async fn invoice(
		&self, amount_msat: u64, label: &str, description: &str, expiry_sec: u64,
	) -> Result<CreatedInvoice, RpcError>;

	async fn decodepay(&self, bolt11: &str) -> Result<DecodedInvoice, RpcError>;

	async fn pay(&self, bolt11: &str, opts: &PayOptions) -> Result<PayResult, RpcError>;

	async fn pay_status(&self, payment_hash_hex: &str) -> Result<PayState, RpcError>;

	/// LND-only graph probe; returns the number of viable routes found.
	async fn query_routes(
		&self, destination: &str, amt_sats: u64, num_routes: u32,
	) -> Result<u32, RpcError>;

	async fn preimage_get(&self, payment_hash_hex: &str) -> Result<Option<String>, RpcError>;
}
