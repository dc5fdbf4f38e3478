// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! In-memory fakes and the two-peer harness used across the test suite.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use hex::{DisplayHex, FromHex};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::engine::AutomationLoop;
use crate::io::persist::sqlite_store::SqliteStore;
use crate::ln::{
	CreatedInvoice, DecodedInvoice, LightningRpc, LnBackend, LnInfo, PayOptions, PayResult,
	PayState,
};
use crate::locks::LockManager;
use crate::rpc::RpcError;
use crate::service::{EngineContext, ToolExecutor};
use crate::sidechannel::test_support::FakeTransport;
use crate::sidechannel::{InboundMessage, Session};
use crate::sol::{
	BuiltTransaction, ConfigState, CreateEscrowParams, EscrowState, EscrowStatus, SolanaRpc,
	TradeConfigState,
};
use crate::trace::TraceRing;
use crate::util::config::{
	Config, LightningConfig, SidechannelConfig, SolanaConfig, SwapConfig,
};
use crate::util::{now_ms, now_unix};
use crate::vault::SecretsVault;

pub(crate) const NEGOTIATION_CHANNEL: &str = "0000intercomswapbtcusdt";
pub(crate) const PROGRAM_ID: &str = "EscrowProg1111111111111111111111111111111111";
pub(crate) const MINT: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";

fn base58_of(tag: &str, material: &str) -> String {
	let digest = Sha256::digest(format!("{}:{}", tag, material).as_bytes());
	bs58::encode(&digest[..24]).into_string()
}

/// Shared Lightning "network": invoices decodable by every node, preimages
/// revealed on pay.
#[derive(Default)]
pub(crate) struct FakeLnHub {
	invoices: Mutex<HashMap<String, DecodedInvoice>>,
	preimages: Mutex<HashMap<String, String>>,
	counter: AtomicU64,
}

pub(crate) struct FakeLightningRpc {
	pub hub: Arc<FakeLnHub>,
	pub node_id: String,
	pub channels: Mutex<Value>,
	pub pay_should_fail: AtomicBool,
	pub routes_found: AtomicU64,
}

impl FakeLightningRpc {
	pub fn new(hub: Arc<FakeLnHub>, node_id: &str) -> Arc<Self> {
		Arc::new(Self {
			hub,
			node_id: node_id.to_string(),
			channels: Mutex::new(json!({ "channels": [] })),
			pay_should_fail: AtomicBool::new(false),
			routes_found: AtomicU64::new(1),
		})
	}

	pub fn set_channels(&self, peer: &str, local_sats: u64, remote_sats: u64) {
		*self.channels.lock().unwrap() = json!({
			"channels": [{
				"chan_id": "100x1x0",
				"remote_pubkey": peer,
				"active": true,
				"local_balance": local_sats,
				"remote_balance": remote_sats,
				"capacity": local_sats + remote_sats,
			}]
		});
	}
}

#[async_trait]
impl LightningRpc for FakeLightningRpc {
	fn backend(&self) -> LnBackend {
		LnBackend::Lnd
	}

	async fn get_info(&self) -> Result<LnInfo, RpcError> {
		Ok(LnInfo { node_id: self.node_id.clone(), alias: None, backend: LnBackend::Lnd })
	}

	async fn new_addr(&self) -> Result<String, RpcError> {
		Ok("bcrt1qfaketestaddress".to_string())
	}

	async fn list_funds(&self) -> Result<Value, RpcError> {
		Ok(json!({}))
	}

	async fn list_peers(&self) -> Result<Value, RpcError> {
		Ok(json!({}))
	}

	async fn list_channels(&self) -> Result<Value, RpcError> {
		Ok(self.channels.lock().unwrap().clone())
	}

	async fn connect_peer(&self, _peer_uri: &str) -> Result<(), RpcError> {
		Ok(())
	}

	async fn fund_channel(
		&self, _node_id: &str, _amount_sats: u64, _sat_per_vbyte: Option<u64>, _push_sats: u64,
	) -> Result<String, RpcError> {
		Ok("fundingtxid".to_string())
	}

	async fn close_channel(&self, _channel_id: &str, _force: bool) -> Result<(), RpcError> {
		Ok(())
	}

	async fn splice_channel(&self, _channel_id: &str, _delta_sats: i64) -> Result<(), RpcError> {
		Ok(())
	}

	async fn invoice(
		&self, amount_msat: u64, _label: &str, _description: &str, expiry_sec: u64,
	) -> Result<CreatedInvoice, RpcError> {
		let n = self.hub.counter.fetch_add(1, Ordering::Relaxed);
		let mut preimage = [0u8; 32];
		preimage[..8].copy_from_slice(&n.to_le_bytes());
		preimage[8] = 0x5a;
		let payment_hash: [u8; 32] = Sha256::digest(preimage).into();
		let payment_hash_hex = payment_hash.to_lower_hex_string();
		let bolt11 = format!("lnbcrt1fake{}", n);
		self.hub.invoices.lock().unwrap().insert(
			bolt11.clone(),
			DecodedInvoice {
				destination: self.node_id.clone(),
				payment_hash: payment_hash_hex.clone(),
				amount_msat: Some(amount_msat),
				expires_at_unix: now_unix() + expiry_sec,
				route_hint_count: 0,
				description: None,
			},
		);
		self.hub
			.preimages
			.lock()
			.unwrap()
			.insert(payment_hash_hex.clone(), preimage.to_lower_hex_string());
		Ok(CreatedInvoice { bolt11, payment_hash: payment_hash_hex })
	}

	async fn decodepay(&self, bolt11: &str) -> Result<DecodedInvoice, RpcError> {
		self.hub
			.invoices
			.lock()
			.unwrap()
			.get(bolt11)
			.cloned()
			.ok_or_else(|| RpcError::permanent(format!("unknown invoice {}", bolt11)))
	}

	async fn pay(&self, bolt11: &str, _opts: &PayOptions) -> Result<PayResult, RpcError> {
		if self.pay_should_fail.load(Ordering::SeqCst) {
			return Err(RpcError::transient("payment attempt failed: no route"));
		}
		let decoded = self.decodepay(bolt11).await?;
		let preimage = self
			.hub
			.preimages
			.lock()
			.unwrap()
			.get(&decoded.payment_hash)
			.cloned()
			.ok_or_else(|| RpcError::permanent("no preimage for invoice"))?;
		Ok(PayResult {
			payment_hash: decoded.payment_hash,
			preimage_hex: preimage,
			fee_msat: Some(1),
		})
	}

	async fn pay_status(&self, _payment_hash_hex: &str) -> Result<PayState, RpcError> {
		Ok(PayState::Succeeded)
	}

	async fn query_routes(
		&self, _destination: &str, _amt_sats: u64, _num_routes: u32,
	) -> Result<u32, RpcError> {
		Ok(self.routes_found.load(Ordering::Relaxed) as u32)
	}

	async fn preimage_get(&self, payment_hash_hex: &str) -> Result<Option<String>, RpcError> {
		Ok(self.hub.preimages.lock().unwrap().get(payment_hash_hex).cloned())
	}
}

/// Shared Solana "chain": escrow PDAs and fee config.
pub(crate) struct FakeSolanaHub {
	pub escrows: Mutex<HashMap<String, EscrowState>>,
	pub platform_config: Mutex<Option<ConfigState>>,
	pub trade_configs: Mutex<HashMap<String, TradeConfigState>>,
}

impl FakeSolanaHub {
	pub fn new(platform_bps: u32, trade_bps: u32, trade_collector: &str) -> Arc<Self> {
		let platform_collector = base58_of("collector", "platform");
		let hub = Self {
			escrows: Mutex::new(HashMap::new()),
			platform_config: Mutex::new(Some(ConfigState {
				v: 1,
				authority: base58_of("authority", "platform"),
				fee_collector: platform_collector,
				fee_bps: platform_bps,
				bump: 255,
			})),
			trade_configs: Mutex::new(HashMap::new()),
		};
		hub.trade_configs.lock().unwrap().insert(
			trade_collector.to_string(),
			TradeConfigState {
				v: 1,
				authority: base58_of("authority", "trade"),
				fee_collector: trade_collector.to_string(),
				fee_bps: trade_bps,
				bump: 255,
			},
		);
		Arc::new(hub)
	}

	pub fn set_trade_fee_bps(&self, collector: &str, fee_bps: u32) {
		if let Some(config) = self.trade_configs.lock().unwrap().get_mut(collector) {
			config.fee_bps = fee_bps;
		}
	}
}

pub(crate) struct FakeSolanaRpc {
	pub hub: Arc<FakeSolanaHub>,
	pub signer: String,
	pub balance: AtomicU64,
}

impl FakeSolanaRpc {
	pub fn new(hub: Arc<FakeSolanaHub>, signer: &str) -> Arc<Self> {
		Arc::new(Self {
			hub,
			signer: signer.to_string(),
			balance: AtomicU64::new(10_000_000_000),
		})
	}
}

#[async_trait]
impl SolanaRpc for FakeSolanaRpc {
	fn local_signer(&self) -> String {
		self.signer.clone()
	}

	fn program_id(&self) -> String {
		PROGRAM_ID.to_string()
	}

	async fn get_balance(&self, _pubkey: &str) -> Result<u64, RpcError> {
		Ok(self.balance.load(Ordering::Relaxed))
	}

	async fn get_account_info(&self, _pubkey: &str) -> Result<Option<Value>, RpcError> {
		Ok(Some(json!({ "lamports": 2_039_280 })))
	}

	async fn get_associated_token_address(
		&self, owner: &str, mint: &str,
	) -> Result<String, RpcError> {
		Ok(base58_of("ata", &format!("{}:{}", owner, mint)))
	}

	async fn get_latest_blockhash(&self) -> Result<String, RpcError> {
		Ok(base58_of("blockhash", "latest"))
	}

	async fn get_fee_for_message(&self, _tx: &BuiltTransaction) -> Result<u64, RpcError> {
		Ok(5_000)
	}

	async fn get_minimum_balance_for_rent_exemption(
		&self, space: usize,
	) -> Result<u64, RpcError> {
		Ok(space as u64 * 6_960)
	}

	async fn request_airdrop(&self, _pubkey: &str, _lamports: u64) -> Result<String, RpcError> {
		Ok(base58_of("sig", "airdrop"))
	}

	async fn send_raw_transaction(&self, tx: &BuiltTransaction) -> Result<String, RpcError> {
		let op: Value = serde_json::from_slice(&tx.raw)
			.map_err(|e| RpcError::permanent(format!("bad fake tx: {}", e)))?;
		match op.get("op").and_then(Value::as_str) {
			Some("create") => {
				let params: CreateEscrowParams =
					serde_json::from_value(op["params"].clone())
						.map_err(|e| RpcError::permanent(e.to_string()))?;
				let platform = self
					.hub
					.platform_config
					.lock()
					.unwrap()
					.clone()
					.ok_or_else(|| RpcError::permanent("platform config missing"))?;
				let trade = self
					.hub
					.trade_configs
					.lock()
					.unwrap()
					.get(&params.trade_fee_collector)
					.cloned()
					.ok_or_else(|| RpcError::permanent("trade config missing"))?;
				let platform_fee = params.amount * platform.fee_bps as u64 / 10_000;
				let trade_fee = params.amount * trade.fee_bps as u64 / 10_000;
				let state = EscrowState {
					v: 1,
					status: EscrowStatus::Active,
					payment_hash_hex: params.payment_hash_hex.clone(),
					recipient: params.recipient.clone(),
					refund: params.refund.clone(),
					refund_after_unix: params.refund_after_unix,
					mint: params.mint.clone(),
					amount: params.amount,
					net_amount: params.amount - platform_fee - trade_fee,
					platform_fee_amount: platform_fee,
					platform_fee_bps: platform.fee_bps,
					platform_fee_collector: platform.fee_collector,
					trade_fee_amount: trade_fee,
					trade_fee_bps: trade.fee_bps,
					trade_fee_collector: trade.fee_collector,
					vault: base58_of("vault", &params.payment_hash_hex),
					bump: 254,
				};
				self.hub
					.escrows
					.lock()
					.unwrap()
					.insert(params.payment_hash_hex.clone(), state);
			},
			Some("claim") => {
				let payment_hash = op["payment_hash"].as_str().unwrap_or_default().to_string();
				let preimage_hex = op["preimage"].as_str().unwrap_or_default();
				let preimage = <[u8; 32]>::from_hex(preimage_hex)
					.map_err(|_| RpcError::permanent("claim: bad preimage"))?;
				let digest: [u8; 32] = Sha256::digest(preimage).into();
				let mut escrows = self.hub.escrows.lock().unwrap();
				let state = escrows
					.get_mut(&payment_hash)
					.ok_or_else(|| RpcError::permanent("claim: no escrow"))?;
				if digest.to_lower_hex_string() != state.payment_hash_hex {
					return Err(RpcError::permanent("claim: preimage mismatch"));
				}
				state.status = EscrowStatus::Claimed;
			},
			Some("refund") => {
				let payment_hash = op["payment_hash"].as_str().unwrap_or_default().to_string();
				let mut escrows = self.hub.escrows.lock().unwrap();
				let state = escrows
					.get_mut(&payment_hash)
					.ok_or_else(|| RpcError::permanent("refund: no escrow"))?;
				if now_unix() < state.refund_after_unix {
					return Err(RpcError::permanent("refund: timelock not reached"));
				}
				state.status = EscrowStatus::Refunded;
			},
			other => {
				return Err(RpcError::permanent(format!("unknown fake tx op {:?}", other)));
			},
		}
		Ok(tx.signature.clone())
	}

	async fn confirm_transaction(&self, _signature: &str) -> Result<(), RpcError> {
		Ok(())
	}

	async fn derive_escrow_pda(
		&self, payment_hash_hex: &str,
	) -> Result<(String, String), RpcError> {
		Ok((base58_of("pda", payment_hash_hex), base58_of("vault", payment_hash_hex)))
	}

	async fn get_escrow_state(
		&self, payment_hash_hex: &str,
	) -> Result<Option<EscrowState>, RpcError> {
		Ok(self.hub.escrows.lock().unwrap().get(payment_hash_hex).cloned())
	}

	async fn get_config_state(&self) -> Result<Option<ConfigState>, RpcError> {
		Ok(self.hub.platform_config.lock().unwrap().clone())
	}

	async fn get_trade_config_state(
		&self, collector: &str,
	) -> Result<Option<TradeConfigState>, RpcError> {
		Ok(self.hub.trade_configs.lock().unwrap().get(collector).cloned())
	}

	async fn build_create_escrow_tx(
		&self, params: &CreateEscrowParams,
	) -> Result<BuiltTransaction, RpcError> {
		let raw = serde_json::to_vec(&json!({ "op": "create", "params": params }))
			.map_err(|e| RpcError::permanent(e.to_string()))?;
		let signature = base58_of("sig", &format!("create:{}", params.payment_hash_hex));
		Ok(BuiltTransaction { raw, signature })
	}

	async fn build_claim_escrow_tx(
		&self, payment_hash_hex: &str, preimage_hex: &str,
	) -> Result<BuiltTransaction, RpcError> {
		let raw = serde_json::to_vec(
			&json!({ "op": "claim", "payment_hash": payment_hash_hex, "preimage": preimage_hex }),
		)
		.map_err(|e| RpcError::permanent(e.to_string()))?;
		let signature = base58_of("sig", &format!("claim:{}", payment_hash_hex));
		Ok(BuiltTransaction { raw, signature })
	}

	async fn build_refund_escrow_tx(
		&self, payment_hash_hex: &str,
	) -> Result<BuiltTransaction, RpcError> {
		let raw =
			serde_json::to_vec(&json!({ "op": "refund", "payment_hash": payment_hash_hex }))
				.map_err(|e| RpcError::permanent(e.to_string()))?;
		let signature = base58_of("sig", &format!("refund:{}", payment_hash_hex));
		Ok(BuiltTransaction { raw, signature })
	}
}

/// Engine tunables with every cooldown collapsed for deterministic ticks.
pub(crate) fn test_config() -> Config {
	let mut swap = SwapConfig::default();
	swap.tick_interval_ms = 250;
	swap.keepalive_interval_ms = 0;
	swap.hygiene_interval_ms = 0;
	swap.stage_retry_cooldown_ms = 0;
	swap.ln_route_precheck_wait_ms = 0;
	swap.ln_route_precheck_retry_ms = 0;
	swap.ln_pay_retry_cooldown_ms = 0;
	swap.ln_pay_fail_leave_min_wait_ms = 0;
	swap.terms_replay_cooldown_ms = 0;
	swap.waiting_terms_ping_ms = 0;
	swap.swap_leave_backoff_ms = 0;
	Config {
		onchain_root: PathBuf::from("onchain"),
		receipts_db_path: None,
		envelope_key_path: PathBuf::from("unused.key"),
		trace_enabled: true,
		log_level: log::LevelFilter::Off,
		sidechannel: SidechannelConfig {
			url: "test://bus".to_string(),
			channels: vec![NEGOTIATION_CHANNEL.to_string()],
		},
		lightning: LightningConfig {
			backend: LnBackend::Lnd,
			rpc_url: "test://ln".to_string(),
			auth_token: None,
		},
		solana: SolanaConfig {
			rpc_url: "test://sol".to_string(),
			program_id: PROGRAM_ID.to_string(),
			mint: MINT.to_string(),
			keypair_path: None,
			trade_fee_collector: None,
		},
		swap,
	}
}

/// One side of a two-peer test network.
pub(crate) struct TestPeer {
	pub executor: Arc<ToolExecutor>,
	pub automation: Arc<AutomationLoop>,
	pub transport: Arc<FakeTransport>,
	pub session: Arc<Session>,
	pub ln: Arc<FakeLightningRpc>,
	pub sol: Arc<FakeSolanaRpc>,
	pub peer_hex: String,
	sent_cursor: usize,
}

impl TestPeer {
	pub fn new(
		key_byte: u8, ln: Arc<FakeLightningRpc>, sol: Arc<FakeSolanaRpc>, config: Config,
	) -> Self {
		let envelope_key = SigningKey::from_bytes(&[key_byte; 32]);
		let peer_hex = envelope_key.verifying_key().to_bytes().to_lower_hex_string();
		let transport = FakeTransport::new(&peer_hex);
		let session = Session::new(transport.clone());
		let store = Arc::new(SqliteStore::open_in_memory().unwrap());
		let ctx = Arc::new(EngineContext {
			config: Arc::new(config),
			session: Arc::clone(&session),
			store: Arc::clone(&store),
			locks: LockManager::new(store),
			ln: ln.clone(),
			sol: sol.clone(),
			vault: Arc::new(SecretsVault::new()),
			trace: Arc::new(TraceRing::new(true)),
			envelope_key,
		});
		let executor = Arc::new(ToolExecutor::new(ctx));
		let automation = AutomationLoop::new(Arc::clone(&executor));
		Self { executor, automation, transport, session, ln, sol, peer_hex, sent_cursor: 0 }
	}

	fn reachable_channels(&self) -> Vec<String> {
		let mut channels = self.transport.bus_subscriptions.lock().unwrap().clone();
		channels.extend(self.transport.joined.lock().unwrap().iter().cloned());
		channels
	}
}

/// Delivers every undelivered outbound message to the other peer, honoring
/// its subscription/join set like the real bus would.
pub(crate) fn pump(peers: &mut [TestPeer; 2]) {
	for sender_idx in 0..2 {
		let receiver_idx = 1 - sender_idx;
		let outbound: Vec<(String, String)> = {
			let sent = peers[sender_idx].transport.sent.lock().unwrap();
			sent[peers[sender_idx].sent_cursor..].to_vec()
		};
		peers[sender_idx].sent_cursor += outbound.len();
		let origin = peers[sender_idx].peer_hex.clone();
		let reachable = peers[receiver_idx].reachable_channels();
		for (channel, message) in outbound {
			if !reachable.contains(&channel) {
				continue;
			}
			peers[receiver_idx].session.ingest(InboundMessage {
				channel,
				origin: Some(origin.clone()),
				relayed_by: None,
				ttl: None,
				ts: now_ms(),
				message,
			});
		}
	}
}

/// Runs `rounds` of maker-tick, taker-tick, pump.
pub(crate) async fn run_rounds(peers: &mut [TestPeer; 2], rounds: usize) {
	for _ in 0..rounds {
		peers[0].automation.tick().await;
		pump(peers);
		peers[1].automation.tick().await;
		pump(peers);
	}
}
