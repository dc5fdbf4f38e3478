// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! End-to-end exercises of the automation loop over the in-memory fakes:
//! two peers, one shared Lightning network and one shared chain.

use std::sync::Arc;

use serde_json::json;

use intercomswap_wire::{Envelope, Kind};

use crate::io::persist::types::{
	ListingType, LockState, TradePatch, TradeRole, TradeState,
};
use crate::ln::LightningRpc;
use crate::locks::rfq_key;
use crate::service::ExecuteOpts;
use crate::sidechannel::InboundMessage;
use crate::sol::{EscrowStatus, SolanaRpc};
use crate::testutil::{
	pump, run_rounds, test_config, FakeLightningRpc, FakeLnHub, FakeSolanaHub, FakeSolanaRpc,
	TestPeer, MINT, NEGOTIATION_CHANNEL,
};
use crate::util::{now_ms, now_unix};

const MAKER_NODE_SUFFIX: &str = "aa";
const TAKER_NODE_SUFFIX: &str = "bb";

fn maker_node_id() -> String {
	format!("02{}", MAKER_NODE_SUFFIX.repeat(32))
}

fn taker_node_id() -> String {
	format!("03{}", TAKER_NODE_SUFFIX.repeat(32))
}

struct Network {
	peers: [TestPeer; 2],
	#[allow(dead_code)]
	ln_hub: Arc<FakeLnHub>,
	sol_hub: Arc<FakeSolanaHub>,
}

/// Maker at index 0, taker at index 1, both on the negotiation channel.
async fn setup_network(platform_bps: u32, trade_bps: u32) -> Network {
	let ln_hub = Arc::new(FakeLnHub::default());
	let maker_signer = bs58::encode(b"maker-signer-pubkey-0001").into_string();
	let taker_signer = bs58::encode(b"taker-signer-pubkey-0001").into_string();
	let sol_hub = FakeSolanaHub::new(platform_bps, trade_bps, &maker_signer);

	let maker_ln = FakeLightningRpc::new(Arc::clone(&ln_hub), &maker_node_id());
	// The maker receives over Lightning: inbound capacity matters.
	maker_ln.set_channels(&taker_node_id(), 10_000, 100_000);
	let taker_ln = FakeLightningRpc::new(Arc::clone(&ln_hub), &taker_node_id());
	// The taker pays: a direct channel to the maker with enough outbound.
	taker_ln.set_channels(&maker_node_id(), 60_000, 40_000);

	let maker_sol = FakeSolanaRpc::new(Arc::clone(&sol_hub), &maker_signer);
	let taker_sol = FakeSolanaRpc::new(Arc::clone(&sol_hub), &taker_signer);

	let maker = TestPeer::new(1, maker_ln, maker_sol, test_config());
	let taker = TestPeer::new(2, taker_ln, taker_sol, test_config());
	for peer in [&maker, &taker] {
		peer.session.subscribe(&[NEGOTIATION_CHANNEL.to_string()]).await.unwrap();
	}
	Network { peers: [maker, taker], ln_hub, sol_hub }
}

async fn post_offer(maker: &TestPeer) {
	let opts = ExecuteOpts { auto_approve: true, dry_run: false };
	maker
		.executor
		.execute(
			"swap_offer_post",
			&json!({
				"channel": NEGOTIATION_CHANNEL,
				"lines": [{ "btc_sats": 50_000u64, "usdt_amount": "50000000" }],
			}),
			&opts,
		)
		.await
		.unwrap();
}

async fn post_rfq(taker: &TestPeer) {
	let opts = ExecuteOpts { auto_approve: true, dry_run: false };
	taker
		.executor
		.execute(
			"swap_rfq_post",
			&json!({
				"channel": NEGOTIATION_CHANNEL,
				"trade_id": "svc:demo:1",
				"btc_sats": 50_000u64,
				"usdt_amount": "50000000",
				"max_platform_fee_bps": 10,
				"max_trade_fee_bps": 10,
				"max_total_fee_bps": 20,
			}),
			&opts,
		)
		.await
		.unwrap();
}

fn sent_kinds(peer: &TestPeer) -> Vec<Kind> {
	peer.transport
		.sent
		.lock()
		.unwrap()
		.iter()
		.filter_map(|(_, payload)| serde_json::from_str::<Envelope>(payload).ok())
		.map(|env| env.kind)
		.collect()
}

#[tokio::test]
async fn s1_happy_path_reaches_claimed_on_both_sides() {
	let mut network = setup_network(10, 10).await;
	post_offer(&network.peers[0]).await;
	post_rfq(&network.peers[1]).await;
	pump(&mut network.peers);

	run_rounds(&mut network.peers, 15).await;

	let maker_store = &network.peers[0].executor.context().store;
	let taker_store = &network.peers[1].executor.context().store;

	let maker_trade = maker_store.get_trade("svc:demo:1").unwrap().unwrap();
	let taker_trade = taker_store.get_trade("svc:demo:1").unwrap().unwrap();
	assert_eq!(taker_trade.state, TradeState::Claimed, "taker: {:?}", taker_trade.last_error);
	assert_eq!(maker_trade.state, TradeState::Claimed, "maker: {:?}", maker_trade.last_error);
	assert_eq!(maker_trade.role, Some(TradeRole::Maker));
	assert_eq!(taker_trade.role, Some(TradeRole::Taker));

	// The escrow on chain is claimed and the preimage invariant held.
	let payment_hash = taker_trade.ln_payment_hash_hex.clone().unwrap();
	let escrow = network.sol_hub.escrows.lock().unwrap()[&payment_hash].clone();
	assert_eq!(escrow.status, EscrowStatus::Claimed);
	assert!(taker_trade.ln_preimage_hex.is_some());

	// Each side's listing lock ended up filled.
	let maker_locks = maker_store.locks_by_trade("svc:demo:1").unwrap();
	let taker_locks = taker_store.locks_by_trade("svc:demo:1").unwrap();
	assert!(!maker_locks.is_empty());
	assert!(!taker_locks.is_empty());
	assert!(maker_locks.iter().all(|lock| lock.state == LockState::Filled));
	assert!(taker_locks.iter().all(|lock| lock.state == LockState::Filled));
	assert!(maker_locks.iter().any(|lock| lock.listing_type == ListingType::OfferLine));
	assert!(taker_locks.iter().any(|lock| lock.listing_type == ListingType::Rfq));

	// The full pipeline appeared on the bus in order.
	let maker_kinds = sent_kinds(&network.peers[0]);
	for kind in [Kind::Quote, Kind::SwapInvite, Kind::Terms, Kind::LnInvoice, Kind::SolEscrowCreated]
	{
		assert!(maker_kinds.contains(&kind), "maker never sent {:?}", kind);
	}
	let taker_kinds = sent_kinds(&network.peers[1]);
	for kind in [Kind::Rfq, Kind::QuoteAccept, Kind::Accept, Kind::LnPaid, Kind::SolClaimed] {
		assert!(taker_kinds.contains(&kind), "taker never sent {:?}", kind);
	}

	// Hygiene left the terminal swap channel on both sides.
	assert!(network.peers[0]
		.transport
		.left
		.lock()
		.unwrap()
		.contains(&"swap:svc:demo:1".to_string()));
	assert!(network.peers[1]
		.transport
		.left
		.lock()
		.unwrap()
		.contains(&"swap:svc:demo:1".to_string()));
}

#[tokio::test]
async fn terminal_trade_stops_advancing() {
	let mut network = setup_network(10, 10).await;
	post_offer(&network.peers[0]).await;
	post_rfq(&network.peers[1]).await;
	pump(&mut network.peers);
	run_rounds(&mut network.peers, 15).await;

	let maker_sent = network.peers[0].transport.sent.lock().unwrap().len();
	let taker_sent = network.peers[1].transport.sent.lock().unwrap().len();

	run_rounds(&mut network.peers, 5).await;

	assert_eq!(network.peers[0].transport.sent.lock().unwrap().len(), maker_sent);
	assert_eq!(network.peers[1].transport.sent.lock().unwrap().len(), taker_sent);
}

#[tokio::test]
async fn s2_on_chain_fee_above_rfq_cap_blocks_auto_quote() {
	let mut network = setup_network(10, 50).await;
	post_offer(&network.peers[0]).await;
	// The offer itself would announce 50 bps lines; the RFQ caps at 10.
	post_rfq(&network.peers[1]).await;
	pump(&mut network.peers);

	run_rounds(&mut network.peers, 4).await;

	let maker_kinds = sent_kinds(&network.peers[0]);
	assert!(!maker_kinds.contains(&Kind::Quote));
	let trace = network.peers[0].executor.context().trace.snapshot();
	assert!(trace
		.iter()
		.any(|entry| entry.message.contains("on-chain trade fee exceeds RFQ max_trade_fee_bps")));
	// No locks were touched on either side.
	assert!(network.peers[0].executor.context().store.list_locks().unwrap().is_empty());
	assert!(network.peers[1].executor.context().store.list_locks().unwrap().is_empty());
}

#[tokio::test]
async fn s4_expired_rfq_is_skipped_without_lock_activity() {
	let mut network = setup_network(10, 10).await;
	post_offer(&network.peers[0]).await;
	pump(&mut network.peers);

	// Deliver an already-expired RFQ straight into the maker's log.
	let taker_key = ed25519_dalek::SigningKey::from_bytes(&[2u8; 32]);
	let rfq = intercomswap_wire::build_unsigned(
		Kind::Rfq,
		"svc:demo:expired",
		now_ms(),
		json!({
			"pair": intercomswap_wire::PAIR,
			"rfq_id": "cd".repeat(32),
			"btc_sats": 50_000u64,
			"usdt_amount": "50000000",
			"max_platform_fee_bps": 10,
			"max_trade_fee_bps": 10,
			"max_total_fee_bps": 20,
			"valid_until_unix": now_unix() - 60,
			"app_hash": intercomswap_wire::envelope::app_hash(crate::testutil::PROGRAM_ID),
		}),
	)
	.unwrap();
	let signed = intercomswap_wire::sign(&rfq, &taker_key).unwrap();
	network.peers[0].session.ingest(InboundMessage {
		channel: NEGOTIATION_CHANNEL.to_string(),
		origin: None,
		relayed_by: None,
		ttl: None,
		ts: now_ms(),
		message: serde_json::to_string(&signed).unwrap(),
	});

	run_rounds(&mut network.peers, 3).await;

	assert!(!sent_kinds(&network.peers[0]).contains(&Kind::Quote));
	let trace = network.peers[0].executor.context().trace.snapshot();
	assert!(trace.iter().any(|entry| entry.scope == "auto_quote_skip_expired_rfq"));
	assert!(network.peers[0].executor.context().store.list_locks().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn s3_unroutable_invoice_aborts_pre_escrow() {
	let mut network = setup_network(10, 10).await;
	// No direct channel to the maker and the graph probe finds nothing.
	network.peers[1].ln.set_channels(&format!("02{}", "77".repeat(32)), 60_000, 40_000);
	network.peers[1].ln.routes_found.store(0, std::sync::atomic::Ordering::SeqCst);

	post_offer(&network.peers[0]).await;
	post_rfq(&network.peers[1]).await;
	pump(&mut network.peers);

	run_rounds(&mut network.peers, 20).await;

	let taker_trade = network.peers[1]
		.executor
		.context()
		.store
		.get_trade("svc:demo:1")
		.unwrap()
		.unwrap();
	assert_eq!(taker_trade.state, TradeState::Canceled);

	// The payer's failed precheck reached the maker, which never escrowed
	// and canceled its side too.
	let maker_kinds = sent_kinds(&network.peers[0]);
	assert!(!maker_kinds.contains(&Kind::SolEscrowCreated));
	assert!(maker_kinds.contains(&Kind::Cancel));
	assert!(network.sol_hub.escrows.lock().unwrap().is_empty());
}

#[tokio::test]
async fn replayed_envelopes_dispatch_once() {
	let mut network = setup_network(10, 10).await;
	post_offer(&network.peers[0]).await;
	pump(&mut network.peers);

	let taker_key = ed25519_dalek::SigningKey::from_bytes(&[2u8; 32]);
	let rfq = intercomswap_wire::build_unsigned(
		Kind::Rfq,
		"svc:demo:replay",
		now_ms(),
		json!({
			"pair": intercomswap_wire::PAIR,
			"rfq_id": "ef".repeat(32),
			"btc_sats": 50_000u64,
			"usdt_amount": "50000000",
			"max_platform_fee_bps": 10,
			"max_trade_fee_bps": 10,
			"max_total_fee_bps": 20,
			"valid_until_unix": now_unix() + 600,
			"app_hash": intercomswap_wire::envelope::app_hash(crate::testutil::PROGRAM_ID),
		}),
	)
	.unwrap();
	let signed = intercomswap_wire::sign(&rfq, &taker_key).unwrap();
	let message = serde_json::to_string(&signed).unwrap();
	for _ in 0..2 {
		network.peers[0].session.ingest(InboundMessage {
			channel: NEGOTIATION_CHANNEL.to_string(),
			origin: None,
			relayed_by: None,
			ttl: None,
			ts: now_ms(),
			message: message.clone(),
		});
	}

	run_rounds(&mut network.peers, 3).await;

	let quotes = sent_kinds(&network.peers[0])
		.into_iter()
		.filter(|kind| *kind == Kind::Quote)
		.count();
	assert_eq!(quotes, 1);
}

#[tokio::test]
async fn escrow_gate_requires_precheck_ok_and_honors_later_fail() {
	let network = setup_network(10, 10).await;
	let maker = &network.peers[0];
	let ctx = maker.executor.context();
	let taker_key = ed25519_dalek::SigningKey::from_bytes(&[2u8; 32]);
	use hex::DisplayHex;
	let taker_peer = taker_key.verifying_key().to_bytes().to_lower_hex_string();
	let opts = ExecuteOpts { auto_approve: true, dry_run: false };

	// A journaled trade ready for escrow, except for the gate.
	let swap_channel = "swap:svc:gate:1";
	ctx.session.subscribe(&[swap_channel.to_string()]).await.unwrap();
	let invoice = maker.ln.invoice(50_000_000, "svc:gate:1", "gate", 3600).await.unwrap();
	ctx.store
		.upsert_trade(
			"svc:gate:1",
			&TradePatch {
				role: Some(TradeRole::Maker),
				state: Some(TradeState::Invoice),
				swap_channel: Some(swap_channel.to_string()),
				taker_peer: Some(taker_peer.clone()),
				btc_sats: Some(50_000),
				usdt_amount: Some("50000000".to_string()),
				sol_recipient: Some(bs58::encode(b"taker-signer-pubkey-0001").into_string()),
				sol_refund_after_unix: Some(now_unix() + 259_200),
				ln_payment_hash_hex: Some(invoice.payment_hash.clone()),
				ln_invoice_bolt11: Some(invoice.bolt11.clone()),
				..Default::default()
			},
		)
		.unwrap();
	let escrow_args = json!({ "trade_id": "svc:gate:1" });

	// 1. Without our own LN_INVOICE on the channel: waiting.
	let err = maker.executor.execute("sol_escrow_init_and_post", &escrow_args, &opts).await;
	assert!(err.unwrap_err().message.contains("no LN_INVOICE"));

	// Announce the invoice ourselves (local echo gives it a log seq).
	let invoice_env = intercomswap_wire::build_unsigned(
		Kind::LnInvoice,
		"svc:gate:1",
		now_ms(),
		json!({
			"bolt11": invoice.bolt11,
			"payment_hash": invoice.payment_hash,
			"amount_msat": "50000000",
			"expires_at_unix": now_unix() + 3600,
		}),
	)
	.unwrap();
	let invoice_env =
		intercomswap_wire::sign(&invoice_env, &ctx.envelope_key).unwrap();
	ctx.session.send_envelope(swap_channel, &invoice_env).await.unwrap();

	// 2. Invoice announced but no precheck verdict: still waiting.
	let err = maker.executor.execute("sol_escrow_init_and_post", &escrow_args, &opts).await;
	assert!(err.unwrap_err().message.contains("no ln_route_precheck_ok"));

	let mut send_status = |state: &str, note: &str| {
		let status = intercomswap_wire::build_unsigned(
			Kind::Status,
			"svc:gate:1",
			now_ms(),
			json!({ "state": state, "note": note }),
		)
		.unwrap();
		let status = intercomswap_wire::sign(&status, &taker_key).unwrap();
		ctx.session.ingest(InboundMessage {
			channel: swap_channel.to_string(),
			origin: Some(taker_peer.clone()),
			relayed_by: None,
			ttl: None,
			ts: now_ms(),
			message: serde_json::to_string(&status).unwrap(),
		});
	};

	// 3. ok then a LATER fail: the higher seq wins and the gate aborts.
	send_status("accepted", "ln_route_precheck_ok mode=single_channel");
	send_status("error", "ln_route_precheck_fail: channels went away");
	let err =
		maker.executor.execute("sol_escrow_init_and_post", &escrow_args, &opts).await.unwrap_err();
	assert_eq!(err.code, crate::tools::error::ToolErrorCode::InvariantViolation);

	// 4. A fresh ok above the fail reopens the gate; escrow goes through.
	send_status("accepted", "ln_route_precheck_ok mode=single_channel retry");
	maker.executor.execute("sol_escrow_init_and_post", &escrow_args, &opts).await.unwrap();
	assert!(network
		.sol_hub
		.escrows
		.lock()
		.unwrap()
		.contains_key(&maker.executor.context().store.get_trade("svc:gate:1").unwrap().unwrap()
			.ln_payment_hash_hex
			.unwrap()));
}

#[tokio::test]
async fn escrow_gate_waits_without_burning_retries_when_invoice_leaves_the_ring() {
	use hex::DisplayHex;
	let network = setup_network(10, 10).await;
	let taker_key = ed25519_dalek::SigningKey::from_bytes(&[2u8; 32]);
	let taker_peer = taker_key.verifying_key().to_bytes().to_lower_hex_string();
	let maker_signer = network.peers[0].sol.local_signer();
	let taker_signer = bs58::encode(b"taker-signer-pubkey-0001").into_string();
	let refund_after = now_unix() + 259_200;

	let (swap_channel, trade_id) = ("swap:svc:wait:1", "svc:wait:1");
	{
		let maker = &network.peers[0];
		let ctx = maker.executor.context();
		ctx.session.subscribe(&[swap_channel.to_string()]).await.unwrap();
		let invoice = maker.ln.invoice(50_000_000, trade_id, "wait", 3600).await.unwrap();
		ctx.store
			.upsert_trade(
				trade_id,
				&TradePatch {
					role: Some(TradeRole::Maker),
					state: Some(TradeState::Invoice),
					swap_channel: Some(swap_channel.to_string()),
					taker_peer: Some(taker_peer.clone()),
					btc_sats: Some(50_000),
					usdt_amount: Some("50000000".to_string()),
					sol_recipient: Some(taker_signer.clone()),
					sol_refund_after_unix: Some(refund_after),
					ln_payment_hash_hex: Some(invoice.payment_hash.clone()),
					ln_invoice_bolt11: Some(invoice.bolt11.clone()),
					..Default::default()
				},
			)
			.unwrap();

		// Put the full TERMS/ACCEPT/LN_INVOICE exchange on the channel so
		// the ladder walks all the way to the escrow stage.
		let terms = intercomswap_wire::build_unsigned(
			Kind::Terms,
			trade_id,
			now_ms(),
			json!({
				"pair": intercomswap_wire::PAIR,
				"btc_sats": 50_000u64,
				"usdt_amount": "50000000",
				"sol_mint": MINT,
				"sol_recipient": taker_signer,
				"sol_refund": maker_signer,
				"sol_refund_after_unix": refund_after,
				"ln_receiver_peer": maker_node_id(),
				"ln_payer_peer": taker_peer,
				"platform_fee_bps": 10,
				"trade_fee_bps": 10,
				"trade_fee_collector": maker_signer,
				"app_hash": intercomswap_wire::envelope::app_hash(crate::testutil::PROGRAM_ID),
			}),
		)
		.unwrap();
		let terms = intercomswap_wire::sign(&terms, &ctx.envelope_key).unwrap();
		ctx.session.send_envelope(swap_channel, &terms).await.unwrap();

		let terms_hash = intercomswap_wire::hash_terms(&terms).unwrap().to_lower_hex_string();
		let accept = intercomswap_wire::build_unsigned(
			Kind::Accept,
			trade_id,
			now_ms(),
			json!({ "terms_hash": terms_hash }),
		)
		.unwrap();
		let accept = intercomswap_wire::sign(&accept, &taker_key).unwrap();
		ctx.session.ingest(InboundMessage {
			channel: swap_channel.to_string(),
			origin: Some(taker_peer.clone()),
			relayed_by: None,
			ttl: None,
			ts: now_ms(),
			message: serde_json::to_string(&accept).unwrap(),
		});

		let invoice_env = intercomswap_wire::build_unsigned(
			Kind::LnInvoice,
			trade_id,
			now_ms(),
			json!({
				"bolt11": invoice.bolt11,
				"payment_hash": invoice.payment_hash,
				"amount_msat": "50000000",
				"expires_at_unix": now_unix() + 3600,
			}),
		)
		.unwrap();
		let invoice_env = intercomswap_wire::sign(&invoice_env, &ctx.envelope_key).unwrap();
		ctx.session.send_envelope(swap_channel, &invoice_env).await.unwrap();
	}

	// First tick buffers the exchange and runs the escrow stage once: the
	// invoice is still in the ring, so the gate waits on the precheck.
	network.peers[0].automation.tick().await;

	// Noise evicts the invoice from the ring; the engine's retained window
	// still drives the stage, which now hits the no-invoice wait case.
	for i in 0..crate::sidechannel::LOG_RING_CAPACITY {
		network.peers[0].session.ingest(InboundMessage {
			channel: "noise".to_string(),
			origin: None,
			relayed_by: None,
			ttl: None,
			ts: now_ms(),
			message: format!("noise {}", i),
		});
	}

	// Well past stage_retry_max attempts: a waiting gate must never abort.
	for _ in 0..6 {
		network.peers[0].automation.tick().await;
	}

	let ctx = network.peers[0].executor.context();
	let trade = ctx.store.get_trade(trade_id).unwrap().unwrap();
	assert_eq!(trade.state, TradeState::Invoice, "last_error: {:?}", trade.last_error);
	assert!(!sent_kinds(&network.peers[0]).contains(&Kind::Cancel));
	assert!(network.sol_hub.escrows.lock().unwrap().is_empty());

	let trace = ctx.trace.snapshot();
	assert!(
		trace.iter().any(|entry| entry.scope == "stage.wait"
			&& entry.message.contains("no LN_INVOICE in the session log")),
		"gate should park on the waiting path, not the retry path"
	);
	assert!(!trace.iter().any(|entry| entry.scope == "trade.abort"));
}

#[tokio::test]
async fn s5_recovery_refund_after_timelock() {
	let network = setup_network(10, 10).await;
	let maker = &network.peers[0];
	let ctx = maker.executor.context();
	let opts = ExecuteOpts { auto_approve: true, dry_run: false };

	// An escrowed trade whose timelock passed 10 seconds ago.
	let payment_hash = "ab".repeat(32);
	let refund_after = now_unix() - 10;
	ctx.store
		.upsert_trade(
			"svc:refund:1",
			&TradePatch {
				role: Some(TradeRole::Maker),
				state: Some(TradeState::Escrow),
				ln_payment_hash_hex: Some(payment_hash.clone()),
				sol_refund_after_unix: Some(refund_after),
				usdt_amount: Some("50000000".to_string()),
				..Default::default()
			},
		)
		.unwrap();
	ctx.locks
		.acquire(
			ListingType::Rfq,
			"ab",
			&rfq_key("ab"),
			"svc:refund:1",
			None,
			None,
			true,
		)
		.unwrap();
	maker
		.sol
		.send_raw_transaction(
			&maker
				.sol
				.build_create_escrow_tx(&crate::sol::CreateEscrowParams {
					payment_hash_hex: payment_hash.clone(),
					mint: MINT.to_string(),
					recipient: bs58::encode(b"taker-signer-pubkey-0001").into_string(),
					refund: maker.sol.local_signer(),
					refund_after_unix: refund_after,
					amount: 50_000_000,
					trade_fee_collector: maker.sol.local_signer(),
				})
				.await
				.unwrap(),
		)
		.await
		.unwrap();

	let listed = maker
		.executor
		.execute("receipts_refunds_list", &json!({}), &ExecuteOpts::default())
		.await
		.unwrap();
	assert_eq!(listed["refunds"].as_array().unwrap().len(), 1);

	maker
		.executor
		.execute("swaprecover_refund", &json!({ "trade_id": "svc:refund:1" }), &opts)
		.await
		.unwrap();

	let trade = ctx.store.get_trade("svc:refund:1").unwrap().unwrap();
	assert_eq!(trade.state, TradeState::Refunded);
	assert!(ctx.store.locks_by_trade("svc:refund:1").unwrap().is_empty());
	assert_eq!(
		network.sol_hub.escrows.lock().unwrap()[&payment_hash].status,
		EscrowStatus::Refunded
	);
}
