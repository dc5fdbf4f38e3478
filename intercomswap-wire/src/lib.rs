//! Wire-level model for the intercomswap sidechannel protocol.
//!
//! This crate defines the signed swap envelope, its canonical encoding and
//! hashing rules, the closed set of message kinds exchanged between peers,
//! and the structural validation applied to every envelope before dispatch.
//!
//! The types here are deliberately decoupled from the engine's storage and
//! tool layers so that the wire format can evolve independently.

pub mod envelope;
pub mod error;
pub mod kinds;
pub mod validate;

pub use envelope::{
	app_hash, build_unsigned, canonical_json, canonical_unsigned_json, envelope_id, hash_terms,
	hash_unsigned, sign, verify, Envelope,
};
pub use error::WireError;
pub use kinds::Kind;

/// Protocol version carried in every envelope.
pub const WIRE_VERSION: u8 = 1;

/// The only asset pair this protocol trades.
pub const PAIR: &str = "BTC_LN:USDT_SOL";

/// Domain tag mixed into the application hash.
pub const APP_HASH_DOMAIN: &str = "intercomswap";

/// Hard ceiling on the platform fee, in basis points.
pub const MAX_PLATFORM_FEE_BPS: u32 = 500;

/// Hard ceiling on the per-collector trade fee, in basis points.
pub const MAX_TRADE_FEE_BPS: u32 = 1000;

/// Hard ceiling on the combined platform + trade fee, in basis points.
pub const MAX_TOTAL_FEE_BPS: u32 = 1500;

/// Smallest refund window a maker may offer, in seconds.
pub const REFUND_WINDOW_MIN_SEC: u64 = 3600;

/// Largest refund window a maker may offer, in seconds.
pub const REFUND_WINDOW_MAX_SEC: u64 = 7 * 24 * 3600;

/// Refund window applied when neither side constrains it, in seconds.
pub const REFUND_WINDOW_DEFAULT_SEC: u64 = 72 * 3600;
