// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Listing-lock manager.
//!
//! A lock reserves an RFQ or offer line while a trade is in flight so a
//! single listing is never double-sold: quoting against a line requires its
//! lock to be absent or held by the same trade, QUOTE_ACCEPT reserves the
//! RFQ, SWAP_INVITE reserves the offer line, a claim marks every lock of
//! the trade filled, and cancel/refund releases them.

use std::fmt;
use std::io;
use std::sync::Arc;

use serde_json::Value;

use crate::io::persist::sqlite_store::SqliteStore;
use crate::io::persist::types::{ListingLock, ListingType, LockState};
use crate::util::now_unix;

#[derive(Debug)]
pub enum LockError {
	/// The listing was already sold.
	Filled { listing_key: String },
	/// Another trade holds the listing in flight.
	InProgress { listing_key: String, trade_id: Option<String> },
	Store(io::Error),
}

impl fmt::Display for LockError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			LockError::Filled { listing_key } => write!(f, "listing_filled: {}", listing_key),
			LockError::InProgress { listing_key, trade_id } => match trade_id {
				Some(trade_id) => {
					write!(f, "listing_in_progress: {} (trade {})", listing_key, trade_id)
				},
				None => write!(f, "listing_in_progress: {}", listing_key),
			},
			LockError::Store(e) => write!(f, "listing lock store error: {}", e),
		}
	}
}

impl std::error::Error for LockError {}

impl From<io::Error> for LockError {
	fn from(e: io::Error) -> Self {
		LockError::Store(e)
	}
}

/// Key for an RFQ lock.
pub fn rfq_key(rfq_id: &str) -> String {
	format!("rfq:{}", rfq_id)
}

/// Key for an offer-line lock.
pub fn offer_line_key(offer_id: &str, line_index: u32) -> String {
	format!("offer_line:{}:{}", offer_id, line_index)
}

pub struct LockManager {
	store: Arc<SqliteStore>,
}

impl LockManager {
	pub fn new(store: Arc<SqliteStore>) -> Self {
		Self { store }
	}

	/// Checks whether a listing can be entered by `trade_id` without
	/// mutating anything. Quoting uses this; reservation uses `acquire`.
	pub fn check(
		&self, listing_key: &str, trade_id: &str, allow_same_trade_in_flight: bool,
	) -> Result<(), LockError> {
		match self.store.get_lock(listing_key)? {
			None => Ok(()),
			Some(existing) => evaluate_conflict(existing, trade_id, allow_same_trade_in_flight),
		}
	}

	/// Reserves a listing in flight for `trade_id`. Exactly one concurrent
	/// acquirer wins the insertion; losers observe the winner's row.
	pub fn acquire(
		&self, listing_type: ListingType, listing_id: &str, listing_key: &str, trade_id: &str,
		note: Option<String>, meta: Option<Value>, allow_same_trade_in_flight: bool,
	) -> Result<(), LockError> {
		let lock = ListingLock {
			listing_key: listing_key.to_string(),
			listing_type,
			listing_id: listing_id.to_string(),
			trade_id: Some(trade_id.to_string()),
			state: LockState::InFlight,
			note,
			meta,
			updated_at: now_unix(),
		};
		if self.store.try_insert_lock(&lock)? {
			return Ok(());
		}
		let existing = self.store.get_lock(listing_key)?.ok_or_else(|| {
			LockError::Store(io::Error::new(
				io::ErrorKind::Other,
				format!("lock {} vanished during acquire", listing_key),
			))
		})?;
		evaluate_conflict(existing, trade_id, allow_same_trade_in_flight)
	}

	/// Marks every lock held by the trade as filled (terminal sale).
	pub fn fill_for_trade(&self, trade_id: &str) -> Result<(), LockError> {
		for mut lock in self.store.locks_by_trade(trade_id)? {
			lock.state = LockState::Filled;
			lock.updated_at = now_unix();
			self.store.upsert_lock(&lock)?;
		}
		Ok(())
	}

	/// Releases (deletes) every lock held by the trade.
	pub fn release_for_trade(&self, trade_id: &str) -> Result<(), LockError> {
		self.store.delete_locks_by_trade(trade_id)?;
		Ok(())
	}

	pub fn locks_by_trade(&self, trade_id: &str) -> Result<Vec<ListingLock>, LockError> {
		Ok(self.store.locks_by_trade(trade_id)?)
	}
}

fn evaluate_conflict(
	existing: ListingLock, trade_id: &str, allow_same_trade_in_flight: bool,
) -> Result<(), LockError> {
	match existing.state {
		LockState::Filled => Err(LockError::Filled { listing_key: existing.listing_key }),
		LockState::InFlight => {
			if allow_same_trade_in_flight && existing.trade_id.as_deref() == Some(trade_id) {
				Ok(())
			} else {
				Err(LockError::InProgress {
					listing_key: existing.listing_key,
					trade_id: existing.trade_id,
				})
			}
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn manager() -> (LockManager, Arc<SqliteStore>) {
		let store = Arc::new(SqliteStore::open_in_memory().unwrap());
		(LockManager::new(Arc::clone(&store)), store)
	}

	#[test]
	fn second_acquirer_sees_in_progress() {
		let (locks, _) = manager();
		let key = rfq_key(&"aa".repeat(32));

		locks.acquire(ListingType::Rfq, "aa", &key, "trade-1", None, None, true).unwrap();
		let err = locks
			.acquire(ListingType::Rfq, "aa", &key, "trade-2", None, None, true)
			.unwrap_err();
		match err {
			LockError::InProgress { trade_id, .. } => {
				assert_eq!(trade_id.as_deref(), Some("trade-1"))
			},
			other => panic!("expected listing_in_progress, got {}", other),
		}

		// Re-entry by the same trade is allowed.
		locks.acquire(ListingType::Rfq, "aa", &key, "trade-1", None, None, true).unwrap();
		// ...but not when same-trade re-entry is disabled.
		assert!(locks.acquire(ListingType::Rfq, "aa", &key, "trade-1", None, None, false).is_err());
	}

	#[test]
	fn filled_listing_stays_filled() {
		let (locks, _) = manager();
		let key = offer_line_key("bb", 0);

		locks.acquire(ListingType::OfferLine, "bb:0", &key, "trade-1", None, None, true).unwrap();
		locks.fill_for_trade("trade-1").unwrap();

		let err = locks.check(&key, "trade-2", true).unwrap_err();
		assert!(matches!(err, LockError::Filled { .. }));
		// Even the winning trade cannot re-enter a filled listing.
		let err = locks.check(&key, "trade-1", true).unwrap_err();
		assert!(matches!(err, LockError::Filled { .. }));
	}

	#[test]
	fn release_clears_all_of_a_trades_locks() {
		let (locks, store) = manager();
		locks
			.acquire(ListingType::Rfq, "aa", &rfq_key("aa"), "trade-1", None, None, true)
			.unwrap();
		locks
			.acquire(
				ListingType::OfferLine,
				"bb:1",
				&offer_line_key("bb", 1),
				"trade-1",
				None,
				None,
				true,
			)
			.unwrap();
		assert_eq!(store.locks_by_trade("trade-1").unwrap().len(), 2);

		locks.release_for_trade("trade-1").unwrap();
		assert!(store.locks_by_trade("trade-1").unwrap().is_empty());
		locks.check(&rfq_key("aa"), "trade-2", true).unwrap();
	}
}
