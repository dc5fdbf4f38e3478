// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Solana RPC + escrow program capability interface.
//!
//! The escrow program locks USDT under a PDA derived from the Lightning
//! payment hash; the engine reads PDA state and submits program
//! transactions through this trait without embedding a Solana SDK.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::rpc::RpcError;

/// On-chain size of the escrow account, used for rent estimation.
pub const ESCROW_ACCOUNT_SPACE: usize = 256;

/// On-chain size of an SPL token account.
pub const TOKEN_ACCOUNT_SPACE: usize = 165;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowStatus {
	Active,
	Claimed,
	Refunded,
}

/// Deserialized escrow PDA state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowState {
	pub v: u8,
	pub status: EscrowStatus,
	/// 32-byte hex payment hash the PDA is derived from.
	pub payment_hash_hex: String,
	pub recipient: String,
	pub refund: String,
	pub refund_after_unix: u64,
	pub mint: String,
	/// Gross locked amount in atomic units.
	pub amount: u64,
	pub net_amount: u64,
	pub platform_fee_amount: u64,
	pub platform_fee_bps: u32,
	pub platform_fee_collector: String,
	pub trade_fee_amount: u64,
	pub trade_fee_bps: u32,
	pub trade_fee_collector: String,
	pub vault: String,
	pub bump: u8,
}

/// Global platform config PDA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigState {
	pub v: u8,
	pub authority: String,
	pub fee_collector: String,
	pub fee_bps: u32,
	pub bump: u8,
}

/// Per-collector trade config PDA; same layout as the platform config.
pub type TradeConfigState = ConfigState;

/// Escrow-create parameters; amounts are atomic units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateEscrowParams {
	pub payment_hash_hex: String,
	pub mint: String,
	pub recipient: String,
	pub refund: String,
	pub refund_after_unix: u64,
	pub amount: u64,
	pub trade_fee_collector: String,
}

/// An unsent, fully built program transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuiltTransaction {
	/// Serialized signed transaction bytes.
	pub raw: Vec<u8>,
	/// Base58 signature the transaction will confirm under.
	pub signature: String,
}

/// Capability interface over Solana RPC plus the escrow program helpers.
#[async_trait]
pub trait SolanaRpc: Send + Sync {
	/// Base58 pubkey of the local fee payer / program signer.
	fn local_signer(&self) -> String;

	/// Base58 id of the configured escrow program.
	fn program_id(&self) -> String;

	async fn get_balance(&self, pubkey: &str) -> Result<u64, RpcError>;

	/// `None` when the account does not exist.
	async fn get_account_info(&self, pubkey: &str) -> Result<Option<serde_json::Value>, RpcError>;

	async fn get_associated_token_address(
		&self, owner: &str, mint: &str,
	) -> Result<String, RpcError>;

	async fn get_latest_blockhash(&self) -> Result<String, RpcError>;

	async fn get_fee_for_message(&self, tx: &BuiltTransaction) -> Result<u64, RpcError>;

	async fn get_minimum_balance_for_rent_exemption(&self, space: usize)
		-> Result<u64, RpcError>;

	async fn request_airdrop(&self, pubkey: &str, lamports: u64) -> Result<String, RpcError>;

	async fn send_raw_transaction(&self, tx: &BuiltTransaction) -> Result<String, RpcError>;

	async fn confirm_transaction(&self, signature: &str) -> Result<(), RpcError>;

	/// Derives `(escrow_pda, vault_ata)` for a payment hash under the
	/// configured program.
	async fn derive_escrow_pda(&self, payment_hash_hex: &str)
		-> Result<(String, String), RpcError>;

	async fn get_escrow_state(
		&self, payment_hash_hex: &str,
	) -> Result<Option<EscrowState>, RpcError>;

	async fn get_config_state(&self) -> Result<Option<ConfigState>, RpcError>;

	async fn get_trade_config_state(
		&self, collector: &str,
	) -> Result<Option<TradeConfigState>, RpcError>;

	async fn build_create_escrow_tx(
		&self, params: &CreateEscrowParams,
	) -> Result<BuiltTransaction, RpcError>;

	async fn build_claim_escrow_tx(
		&self, payment_hash_hex: &str, preimage_hex: &str,
	) -> Result<BuiltTransaction, RpcError>;

	async fn build_refund_escrow_tx(
		&self, payment_hash_hex: &str,
	) -> Result<BuiltTransaction, RpcError>;
}
