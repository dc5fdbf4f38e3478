// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Rusqlite-backed receipts store: trade journal, per-trade event log and
//! the listing-lock table.

use std::io;
use std::path::Path;
use std::sync::Mutex;

use hex::{DisplayHex, FromHex};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use sha2::{Digest, Sha256};

use crate::io::persist::types::{
	ListingLock, ListingType, LockState, TradeEvent, TradePatch, TradeRecord, TradeRole,
	TradeState,
};
use crate::util::now_unix;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS trades (
	trade_id TEXT PRIMARY KEY NOT NULL,
	role TEXT,
	swap_channel TEXT,
	maker_peer TEXT,
	taker_peer TEXT,
	btc_sats INTEGER,
	usdt_amount TEXT,
	sol_mint TEXT,
	sol_program_id TEXT,
	sol_recipient TEXT,
	sol_refund TEXT,
	sol_escrow_pda TEXT,
	sol_vault_ata TEXT,
	sol_refund_after_unix INTEGER,
	ln_invoice_bolt11 TEXT,
	ln_payment_hash_hex TEXT,
	ln_preimage_hex TEXT,
	state TEXT NOT NULL,
	last_error TEXT,
	updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS trades_by_payment_hash ON trades(ln_payment_hash_hex);
CREATE INDEX IF NOT EXISTS trades_by_state ON trades(state);
CREATE TABLE IF NOT EXISTS trade_events (
	trade_id TEXT NOT NULL,
	seq INTEGER NOT NULL,
	kind TEXT NOT NULL,
	ts INTEGER NOT NULL,
	body_json TEXT NOT NULL,
	PRIMARY KEY (trade_id, seq)
);
CREATE TABLE IF NOT EXISTS listing_locks (
	listing_key TEXT PRIMARY KEY NOT NULL,
	listing_type TEXT NOT NULL,
	listing_id TEXT NOT NULL,
	trade_id TEXT,
	state TEXT NOT NULL,
	note TEXT,
	meta_json TEXT,
	updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS listing_locks_by_trade ON listing_locks(trade_id);
";

fn sql_err(e: rusqlite::Error) -> io::Error {
	io::Error::new(io::ErrorKind::Other, format!("receipts store: {}", e))
}

fn invalid(msg: impl Into<String>) -> io::Error {
	io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Durable receipts store. All access funnels through one connection held
/// behind a mutex; composite tools keep their critical sections short.
pub struct SqliteStore {
	conn: Mutex<Connection>,
}

impl SqliteStore {
	pub fn new(db_path: &Path) -> io::Result<Self> {
		if let Some(parent) = db_path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let conn = Connection::open(db_path).map_err(sql_err)?;
		conn.execute_batch(SCHEMA).map_err(sql_err)?;
		Ok(Self { conn: Mutex::new(conn) })
	}

	/// In-memory store, for tests and dry runs.
	pub fn open_in_memory() -> io::Result<Self> {
		let conn = Connection::open_in_memory().map_err(sql_err)?;
		conn.execute_batch(SCHEMA).map_err(sql_err)?;
		Ok(Self { conn: Mutex::new(conn) })
	}

	/// Idempotent merge-upsert: fields absent from the patch keep their
	/// stored value. Enforces state monotonicity (terminal states are
	/// never left, the pipeline never moves backwards) and the preimage
	/// integrity invariant.
	pub fn upsert_trade(&self, trade_id: &str, patch: &TradePatch) -> io::Result<TradeRecord> {
		let mut conn = self.conn.lock().expect("receipts store lock poisoned");
		let tx = conn.transaction().map_err(sql_err)?;
		let existing = get_trade_tx(&tx, trade_id)?;
		let merged = merge_trade(trade_id, existing, patch)?;
		put_trade_tx(&tx, &merged)?;
		tx.commit().map_err(sql_err)?;
		Ok(merged)
	}

	pub fn get_trade(&self, trade_id: &str) -> io::Result<Option<TradeRecord>> {
		let mut conn = self.conn.lock().expect("receipts store lock poisoned");
		let tx = conn.transaction().map_err(sql_err)?;
		get_trade_tx(&tx, trade_id)
	}

	pub fn get_trade_by_payment_hash(
		&self, payment_hash_hex: &str,
	) -> io::Result<Option<TradeRecord>> {
		let conn = self.conn.lock().expect("receipts store lock poisoned");
		let mut stmt = conn
			.prepare("SELECT * FROM trades WHERE ln_payment_hash_hex = ?1 LIMIT 1")
			.map_err(sql_err)?;
		stmt.query_row(params![payment_hash_hex], row_to_trade).optional().map_err(sql_err)
	}

	pub fn list_trades(&self, limit: u32, offset: u32) -> io::Result<Vec<TradeRecord>> {
		let conn = self.conn.lock().expect("receipts store lock poisoned");
		let mut stmt = conn
			.prepare("SELECT * FROM trades ORDER BY updated_at DESC, trade_id LIMIT ?1 OFFSET ?2")
			.map_err(sql_err)?;
		let rows = stmt.query_map(params![limit, offset], row_to_trade).map_err(sql_err)?;
		rows.collect::<Result<Vec<_>, _>>().map_err(sql_err)
	}

	/// Trades paid on the LN side but not yet claimed on Solana.
	pub fn list_open_claims(&self) -> io::Result<Vec<TradeRecord>> {
		let conn = self.conn.lock().expect("receipts store lock poisoned");
		let mut stmt = conn
			.prepare("SELECT * FROM trades WHERE state = 'ln_paid' ORDER BY updated_at")
			.map_err(sql_err)?;
		let rows = stmt.query_map([], row_to_trade).map_err(sql_err)?;
		rows.collect::<Result<Vec<_>, _>>().map_err(sql_err)
	}

	/// Escrowed trades whose refund timelock has passed.
	pub fn list_open_refunds(&self, now_unix: u64) -> io::Result<Vec<TradeRecord>> {
		let conn = self.conn.lock().expect("receipts store lock poisoned");
		let mut stmt = conn
			.prepare(
				"SELECT * FROM trades WHERE state = 'escrow' \
				 AND sol_refund_after_unix IS NOT NULL AND sol_refund_after_unix <= ?1 \
				 ORDER BY sol_refund_after_unix",
			)
			.map_err(sql_err)?;
		let rows = stmt.query_map(params![now_unix], row_to_trade).map_err(sql_err)?;
		rows.collect::<Result<Vec<_>, _>>().map_err(sql_err)
	}

	/// Appends an event to the per-trade journal, assigning the next `seq`.
	pub fn append_event(
		&self, trade_id: &str, kind: &str, body: &serde_json::Value,
	) -> io::Result<TradeEvent> {
		let mut conn = self.conn.lock().expect("receipts store lock poisoned");
		let tx = conn.transaction().map_err(sql_err)?;
		let seq: u64 = tx
			.query_row(
				"SELECT COALESCE(MAX(seq), 0) + 1 FROM trade_events WHERE trade_id = ?1",
				params![trade_id],
				|row| row.get(0),
			)
			.map_err(sql_err)?;
		let ts = now_unix();
		let body_json = body.to_string();
		tx.execute(
			"INSERT INTO trade_events (trade_id, seq, kind, ts, body_json) VALUES (?1, ?2, ?3, ?4, ?5)",
			params![trade_id, seq, kind, ts, body_json],
		)
		.map_err(sql_err)?;
		tx.commit().map_err(sql_err)?;
		Ok(TradeEvent { trade_id: trade_id.to_string(), seq, kind: kind.to_string(), ts, body: body.clone() })
	}

	pub fn list_events(&self, trade_id: &str) -> io::Result<Vec<TradeEvent>> {
		let conn = self.conn.lock().expect("receipts store lock poisoned");
		let mut stmt = conn
			.prepare(
				"SELECT trade_id, seq, kind, ts, body_json FROM trade_events \
				 WHERE trade_id = ?1 ORDER BY seq",
			)
			.map_err(sql_err)?;
		let rows = stmt
			.query_map(params![trade_id], |row| {
				let body_json: String = row.get(4)?;
				Ok((
					TradeEvent {
						trade_id: row.get(0)?,
						seq: row.get(1)?,
						kind: row.get(2)?,
						ts: row.get(3)?,
						body: serde_json::Value::Null,
					},
					body_json,
				))
			})
			.map_err(sql_err)?;
		let mut events = Vec::new();
		for row in rows {
			let (mut event, body_json) = row.map_err(sql_err)?;
			event.body = serde_json::from_str(&body_json)
				.map_err(|e| invalid(format!("corrupt event body for {}: {}", trade_id, e)))?;
			events.push(event);
		}
		Ok(events)
	}

	pub fn upsert_lock(&self, lock: &ListingLock) -> io::Result<()> {
		let conn = self.conn.lock().expect("receipts store lock poisoned");
		let meta_json = lock.meta.as_ref().map(|m| m.to_string());
		conn.execute(
			"INSERT INTO listing_locks \
			 (listing_key, listing_type, listing_id, trade_id, state, note, meta_json, updated_at) \
			 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
			 ON CONFLICT(listing_key) DO UPDATE SET \
			 listing_type = excluded.listing_type, listing_id = excluded.listing_id, \
			 trade_id = excluded.trade_id, state = excluded.state, note = excluded.note, \
			 meta_json = excluded.meta_json, updated_at = excluded.updated_at",
			params![
				lock.listing_key,
				lock.listing_type.as_str(),
				lock.listing_id,
				lock.trade_id,
				lock.state.as_str(),
				lock.note,
				meta_json,
				lock.updated_at,
			],
		)
		.map_err(sql_err)?;
		Ok(())
	}

	/// Inserts a lock only if no row exists for its key. Returns whether the
	/// insertion won; the statement is atomic, so concurrent acquirers on
	/// the same database race safely.
	pub fn try_insert_lock(&self, lock: &ListingLock) -> io::Result<bool> {
		let conn = self.conn.lock().expect("receipts store lock poisoned");
		let meta_json = lock.meta.as_ref().map(|m| m.to_string());
		let changed = conn
			.execute(
				"INSERT INTO listing_locks \
				 (listing_key, listing_type, listing_id, trade_id, state, note, meta_json, updated_at) \
				 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
				 ON CONFLICT(listing_key) DO NOTHING",
				params![
					lock.listing_key,
					lock.listing_type.as_str(),
					lock.listing_id,
					lock.trade_id,
					lock.state.as_str(),
					lock.note,
					meta_json,
					lock.updated_at,
				],
			)
			.map_err(sql_err)?;
		Ok(changed == 1)
	}

	pub fn get_lock(&self, listing_key: &str) -> io::Result<Option<ListingLock>> {
		let conn = self.conn.lock().expect("receipts store lock poisoned");
		let mut stmt = conn
			.prepare("SELECT * FROM listing_locks WHERE listing_key = ?1")
			.map_err(sql_err)?;
		stmt.query_row(params![listing_key], row_to_lock).optional().map_err(sql_err)
	}

	pub fn list_locks(&self) -> io::Result<Vec<ListingLock>> {
		let conn = self.conn.lock().expect("receipts store lock poisoned");
		let mut stmt =
			conn.prepare("SELECT * FROM listing_locks ORDER BY listing_key").map_err(sql_err)?;
		let rows = stmt.query_map([], row_to_lock).map_err(sql_err)?;
		rows.collect::<Result<Vec<_>, _>>().map_err(sql_err)
	}

	pub fn locks_by_trade(&self, trade_id: &str) -> io::Result<Vec<ListingLock>> {
		let conn = self.conn.lock().expect("receipts store lock poisoned");
		let mut stmt = conn
			.prepare("SELECT * FROM listing_locks WHERE trade_id = ?1 ORDER BY listing_key")
			.map_err(sql_err)?;
		let rows = stmt.query_map(params![trade_id], row_to_lock).map_err(sql_err)?;
		rows.collect::<Result<Vec<_>, _>>().map_err(sql_err)
	}

	pub fn delete_lock(&self, listing_key: &str) -> io::Result<()> {
		let conn = self.conn.lock().expect("receipts store lock poisoned");
		conn.execute("DELETE FROM listing_locks WHERE listing_key = ?1", params![listing_key])
			.map_err(sql_err)?;
		Ok(())
	}

	pub fn delete_locks_by_trade(&self, trade_id: &str) -> io::Result<()> {
		let conn = self.conn.lock().expect("receipts store lock poisoned");
		conn.execute("DELETE FROM listing_locks WHERE trade_id = ?1", params![trade_id])
			.map_err(sql_err)?;
		Ok(())
	}
}

fn get_trade_tx(tx: &Transaction<'_>, trade_id: &str) -> io::Result<Option<TradeRecord>> {
	let mut stmt =
		tx.prepare("SELECT * FROM trades WHERE trade_id = ?1").map_err(sql_err)?;
	stmt.query_row(params![trade_id], row_to_trade).optional().map_err(sql_err)
}

fn put_trade_tx(tx: &Transaction<'_>, record: &TradeRecord) -> io::Result<()> {
	tx.execute(
		"INSERT OR REPLACE INTO trades (trade_id, role, swap_channel, maker_peer, taker_peer, \
		 btc_sats, usdt_amount, sol_mint, sol_program_id, sol_recipient, sol_refund, \
		 sol_escrow_pda, sol_vault_ata, sol_refund_after_unix, ln_invoice_bolt11, \
		 ln_payment_hash_hex, ln_preimage_hex, state, last_error, updated_at) \
		 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
		params![
			record.trade_id,
			record.role.map(|r| r.as_str()),
			record.swap_channel,
			record.maker_peer,
			record.taker_peer,
			record.btc_sats,
			record.usdt_amount,
			record.sol_mint,
			record.sol_program_id,
			record.sol_recipient,
			record.sol_refund,
			record.sol_escrow_pda,
			record.sol_vault_ata,
			record.sol_refund_after_unix,
			record.ln_invoice_bolt11,
			record.ln_payment_hash_hex,
			record.ln_preimage_hex,
			record.state.as_str(),
			record.last_error,
			record.updated_at,
		],
	)
	.map_err(sql_err)?;
	Ok(())
}

fn merge_trade(
	trade_id: &str, existing: Option<TradeRecord>, patch: &TradePatch,
) -> io::Result<TradeRecord> {
	let mut record = existing.unwrap_or(TradeRecord {
		trade_id: trade_id.to_string(),
		role: None,
		swap_channel: None,
		maker_peer: None,
		taker_peer: None,
		btc_sats: None,
		usdt_amount: None,
		sol_mint: None,
		sol_program_id: None,
		sol_recipient: None,
		sol_refund: None,
		sol_escrow_pda: None,
		sol_vault_ata: None,
		sol_refund_after_unix: None,
		ln_invoice_bolt11: None,
		ln_payment_hash_hex: None,
		ln_preimage_hex: None,
		state: patch.state.unwrap_or(TradeState::Rfq),
		last_error: None,
		updated_at: 0,
	});

	if let Some(next_state) = patch.state {
		if record.state.is_terminal() && next_state != record.state {
			return Err(invalid(format!(
				"trade {} is terminal ({}), refusing transition to {}",
				trade_id,
				record.state.as_str(),
				next_state.as_str()
			)));
		}
		if let (Some(old_rank), Some(new_rank)) =
			(record.state.pipeline_rank(), next_state.pipeline_rank())
		{
			if new_rank < old_rank {
				return Err(invalid(format!(
					"trade {} state cannot move backwards ({} -> {})",
					trade_id,
					record.state.as_str(),
					next_state.as_str()
				)));
			}
		}
		record.state = next_state;
	}

	merge_field(&mut record.role, &patch.role);
	merge_field(&mut record.swap_channel, &patch.swap_channel);
	merge_field(&mut record.maker_peer, &patch.maker_peer);
	merge_field(&mut record.taker_peer, &patch.taker_peer);
	merge_field(&mut record.btc_sats, &patch.btc_sats);
	merge_field(&mut record.usdt_amount, &patch.usdt_amount);
	merge_field(&mut record.sol_mint, &patch.sol_mint);
	merge_field(&mut record.sol_program_id, &patch.sol_program_id);
	merge_field(&mut record.sol_recipient, &patch.sol_recipient);
	merge_field(&mut record.sol_refund, &patch.sol_refund);
	merge_field(&mut record.sol_escrow_pda, &patch.sol_escrow_pda);
	merge_field(&mut record.sol_vault_ata, &patch.sol_vault_ata);
	merge_field(&mut record.sol_refund_after_unix, &patch.sol_refund_after_unix);
	merge_field(&mut record.ln_invoice_bolt11, &patch.ln_invoice_bolt11);
	merge_field(&mut record.ln_payment_hash_hex, &patch.ln_payment_hash_hex);
	merge_field(&mut record.ln_preimage_hex, &patch.ln_preimage_hex);
	merge_field(&mut record.last_error, &patch.last_error);

	if let (Some(preimage), Some(payment_hash)) =
		(&record.ln_preimage_hex, &record.ln_payment_hash_hex)
	{
		check_preimage(trade_id, preimage, payment_hash)?;
	}

	record.updated_at = now_unix();
	Ok(record)
}

fn merge_field<T: Clone>(slot: &mut Option<T>, patch: &Option<T>) {
	if let Some(value) = patch {
		*slot = Some(value.clone());
	}
}

fn check_preimage(trade_id: &str, preimage_hex: &str, payment_hash_hex: &str) -> io::Result<()> {
	let preimage = <[u8; 32]>::from_hex(preimage_hex)
		.map_err(|e| invalid(format!("trade {}: preimage is not 32-byte hex: {}", trade_id, e)))?;
	let mut hasher = Sha256::new();
	hasher.update(preimage);
	let digest: [u8; 32] = hasher.finalize().into();
	if digest.to_lower_hex_string() != payment_hash_hex {
		return Err(invalid(format!(
			"trade {}: preimage does not hash to payment hash {}",
			trade_id, payment_hash_hex
		)));
	}
	Ok(())
}

fn row_to_trade(row: &rusqlite::Row<'_>) -> rusqlite::Result<TradeRecord> {
	let role: Option<String> = row.get("role")?;
	let state: String = row.get("state")?;
	Ok(TradeRecord {
		trade_id: row.get("trade_id")?,
		role: role.as_deref().and_then(TradeRole::from_str),
		swap_channel: row.get("swap_channel")?,
		maker_peer: row.get("maker_peer")?,
		taker_peer: row.get("taker_peer")?,
		btc_sats: row.get("btc_sats")?,
		usdt_amount: row.get("usdt_amount")?,
		sol_mint: row.get("sol_mint")?,
		sol_program_id: row.get("sol_program_id")?,
		sol_recipient: row.get("sol_recipient")?,
		sol_refund: row.get("sol_refund")?,
		sol_escrow_pda: row.get("sol_escrow_pda")?,
		sol_vault_ata: row.get("sol_vault_ata")?,
		sol_refund_after_unix: row.get("sol_refund_after_unix")?,
		ln_invoice_bolt11: row.get("ln_invoice_bolt11")?,
		ln_payment_hash_hex: row.get("ln_payment_hash_hex")?,
		ln_preimage_hex: row.get("ln_preimage_hex")?,
		state: TradeState::from_str(&state).unwrap_or(TradeState::Rfq),
		last_error: row.get("last_error")?,
		updated_at: row.get("updated_at")?,
	})
}

fn row_to_lock(row: &rusqlite::Row<'_>) -> rusqlite::Result<ListingLock> {
	let listing_type: String = row.get("listing_type")?;
	let state: String = row.get("state")?;
	let meta_json: Option<String> = row.get("meta_json")?;
	Ok(ListingLock {
		listing_key: row.get("listing_key")?,
		listing_type: ListingType::from_str(&listing_type).unwrap_or(ListingType::Rfq),
		listing_id: row.get("listing_id")?,
		trade_id: row.get("trade_id")?,
		state: LockState::from_str(&state).unwrap_or(LockState::InFlight),
		note: row.get("note")?,
		meta: meta_json.and_then(|json| serde_json::from_str(&json).ok()),
		updated_at: row.get("updated_at")?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn store() -> SqliteStore {
		SqliteStore::open_in_memory().unwrap()
	}

	fn preimage_pair() -> (String, String) {
		let preimage = [3u8; 32];
		let mut hasher = Sha256::new();
		hasher.update(preimage);
		let digest: [u8; 32] = hasher.finalize().into();
		(preimage.to_lower_hex_string(), digest.to_lower_hex_string())
	}

	#[test]
	fn upsert_merges_and_preserves_unset_fields() {
		let store = store();
		store
			.upsert_trade(
				"t1",
				&TradePatch {
					role: Some(TradeRole::Maker),
					btc_sats: Some(50_000),
					..Default::default()
				},
			)
			.unwrap();
		let merged = store
			.upsert_trade(
				"t1",
				&TradePatch { usdt_amount: Some("50000000".into()), ..Default::default() },
			)
			.unwrap();

		assert_eq!(merged.role, Some(TradeRole::Maker));
		assert_eq!(merged.btc_sats, Some(50_000));
		assert_eq!(merged.usdt_amount.as_deref(), Some("50000000"));

		let loaded = store.get_trade("t1").unwrap().unwrap();
		assert_eq!(loaded, merged);
	}

	#[test]
	fn lookup_by_payment_hash() {
		let store = store();
		let (_, hash) = preimage_pair();
		store
			.upsert_trade(
				"t1",
				&TradePatch { ln_payment_hash_hex: Some(hash.clone()), ..Default::default() },
			)
			.unwrap();
		let found = store.get_trade_by_payment_hash(&hash).unwrap().unwrap();
		assert_eq!(found.trade_id, "t1");
		assert!(store.get_trade_by_payment_hash(&"ff".repeat(32)).unwrap().is_none());
	}

	#[test]
	fn state_never_moves_backwards_or_leaves_terminal() {
		let store = store();
		store
			.upsert_trade("t1", &TradePatch { state: Some(TradeState::Escrow), ..Default::default() })
			.unwrap();
		assert!(store
			.upsert_trade("t1", &TradePatch { state: Some(TradeState::Terms), ..Default::default() })
			.is_err());

		store
			.upsert_trade(
				"t1",
				&TradePatch { state: Some(TradeState::Refunded), ..Default::default() },
			)
			.unwrap();
		assert!(store
			.upsert_trade(
				"t1",
				&TradePatch { state: Some(TradeState::Claimed), ..Default::default() },
			)
			.is_err());
		// Same-state patches on a terminal trade remain fine.
		store
			.upsert_trade(
				"t1",
				&TradePatch {
					state: Some(TradeState::Refunded),
					last_error: Some("post-mortem".into()),
					..Default::default()
				},
			)
			.unwrap();
	}

	#[test]
	fn preimage_must_hash_to_payment_hash() {
		let store = store();
		let (preimage, hash) = preimage_pair();
		store
			.upsert_trade(
				"t1",
				&TradePatch { ln_payment_hash_hex: Some(hash), ..Default::default() },
			)
			.unwrap();
		assert!(store
			.upsert_trade(
				"t1",
				&TradePatch { ln_preimage_hex: Some("00".repeat(32)), ..Default::default() },
			)
			.is_err());
		store
			.upsert_trade("t1", &TradePatch { ln_preimage_hex: Some(preimage), ..Default::default() })
			.unwrap();
	}

	#[test]
	fn open_claims_and_refunds_queries() {
		let store = store();
		store
			.upsert_trade(
				"paid",
				&TradePatch { state: Some(TradeState::LnPaid), ..Default::default() },
			)
			.unwrap();
		store
			.upsert_trade(
				"escrowed",
				&TradePatch {
					state: Some(TradeState::Escrow),
					sol_refund_after_unix: Some(1_000),
					..Default::default()
				},
			)
			.unwrap();
		store
			.upsert_trade(
				"pending",
				&TradePatch {
					state: Some(TradeState::Escrow),
					sol_refund_after_unix: Some(9_999_999_999),
					..Default::default()
				},
			)
			.unwrap();

		let claims = store.list_open_claims().unwrap();
		assert_eq!(claims.len(), 1);
		assert_eq!(claims[0].trade_id, "paid");

		let refunds = store.list_open_refunds(2_000).unwrap();
		assert_eq!(refunds.len(), 1);
		assert_eq!(refunds[0].trade_id, "escrowed");
	}

	#[test]
	fn event_seq_increments_per_trade() {
		let store = store();
		let a = store.append_event("t1", "swap.rfq", &json!({"n": 1})).unwrap();
		let b = store.append_event("t1", "swap.quote", &json!({"n": 2})).unwrap();
		let other = store.append_event("t2", "swap.rfq", &json!({})).unwrap();
		assert_eq!(a.seq, 1);
		assert_eq!(b.seq, 2);
		assert_eq!(other.seq, 1);

		let events = store.list_events("t1").unwrap();
		assert_eq!(events.len(), 2);
		assert_eq!(events[1].body, json!({"n": 2}));
	}

	#[test]
	fn lock_crud_round_trip() {
		let store = store();
		let lock = ListingLock {
			listing_key: "rfq:aa".into(),
			listing_type: ListingType::Rfq,
			listing_id: "aa".into(),
			trade_id: Some("t1".into()),
			state: LockState::InFlight,
			note: None,
			meta: Some(json!({"channel": "demo"})),
			updated_at: 1,
		};
		store.upsert_lock(&lock).unwrap();
		assert_eq!(store.get_lock("rfq:aa").unwrap().unwrap(), lock);
		assert_eq!(store.locks_by_trade("t1").unwrap().len(), 1);

		store.delete_locks_by_trade("t1").unwrap();
		assert!(store.get_lock("rfq:aa").unwrap().is_none());
	}
}
