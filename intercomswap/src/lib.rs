//! intercomswap — peer-to-peer BTC-LN ⇄ USDT-SOL atomic swap engine.
//!
//! The engine orchestrates hash-time-locked swaps between a maker offering
//! USDT on Solana and a taker paying a Lightning invoice. Peers rendezvous
//! on an authenticated sidechannel bus, negotiate terms, and settle through
//! an on-chain escrow program keyed by the invoice payment hash.
//!
//! Lightning, Solana and the bus transport are consumed through capability
//! traits ([`ln::LightningRpc`], [`sol::SolanaRpc`],
//! [`sidechannel::SidechannelTransport`]); everything above those seams is
//! this crate.

pub mod autopost;
pub mod bootstrap;
pub mod clients;
pub mod engine;
pub mod fees;
pub mod io;
pub mod liquidity;
pub mod ln;
pub mod locks;
pub mod rpc;
pub mod service;
pub mod sidechannel;
pub mod sol;
#[cfg(test)]
pub(crate) mod testutil;
pub mod tools;
pub mod trace;
pub mod util;
pub mod vault;
pub mod verifier;
