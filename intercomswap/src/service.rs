//! Tool executor: the uniform dispatcher over the closed tool surface.
//!
//! Tools are a closed tagged enum; dispatch is a `match`, not a
//! string-indexed map. Every mutating tool is gated on `auto_approve` and
//! supports `dry_run`, which reports what would happen without touching
//! any external system.

use std::sync::Arc;

use ed25519_dalek::SigningKey;
use serde_json::Value;

use crate::io::persist::sqlite_store::SqliteStore;
use crate::ln::LightningRpc;
use crate::locks::LockManager;
use crate::sidechannel::Session;
use crate::sol::SolanaRpc;
use crate::tools;
use crate::tools::error::ToolError;
use crate::trace::TraceRing;
use crate::util::config::Config;
use crate::vault::SecretsVault;

/// Shared engine state handed to every tool handler.
pub struct EngineContext {
	pub config: Arc<Config>,
	pub session: Arc<Session>,
	pub store: Arc<SqliteStore>,
	pub locks: LockManager,
	pub ln: Arc<dyn LightningRpc>,
	pub sol: Arc<dyn SolanaRpc>,
	pub vault: Arc<SecretsVault>,
	pub trace: Arc<TraceRing>,
	pub envelope_key: SigningKey,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOpts {
	/// Required for any tool that mutates external state.
	pub auto_approve: bool,
	/// Report the would-be effect without performing it.
	pub dry_run: bool,
}

/// The closed tool surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
	SwapOfferPost,
	SwapRfqPost,
	SwapQuotePost,
	SwapQuoteAccept,
	SwapInviteSend,
	SwapJoin,
	SwapTermsPost,
	SwapAcceptPost,
	SwapCancelPost,
	SwapStatusPost,
	LnInvoiceCreateAndPost,
	SolEscrowInitAndPost,
	LnPayAndPostVerified,
	SolClaimAndPost,
	SwapRecoverClaim,
	SwapRecoverRefund,
	EnvGet,
	ScInfo,
	SolEscrowGet,
	SolConfigGet,
	ReceiptsTradesList,
	ReceiptsTradeGet,
	ReceiptsLocksList,
	ReceiptsClaimsList,
	ReceiptsRefundsList,
}

impl Tool {
	pub fn from_name(name: &str) -> Option<Tool> {
		match name {
			"swap_offer_post" => Some(Tool::SwapOfferPost),
			"swap_rfq_post" => Some(Tool::SwapRfqPost),
			"swap_quote_post" => Some(Tool::SwapQuotePost),
			"swap_quote_accept" => Some(Tool::SwapQuoteAccept),
			"swap_invite_send" => Some(Tool::SwapInviteSend),
			"swap_join" => Some(Tool::SwapJoin),
			"swap_terms_post" => Some(Tool::SwapTermsPost),
			"swap_accept_post" => Some(Tool::SwapAcceptPost),
			"swap_cancel_post" => Some(Tool::SwapCancelPost),
			"swap_status_post" => Some(Tool::SwapStatusPost),
			"ln_invoice_create_and_post" => Some(Tool::LnInvoiceCreateAndPost),
			"sol_escrow_init_and_post" => Some(Tool::SolEscrowInitAndPost),
			"ln_pay_and_post_verified" => Some(Tool::LnPayAndPostVerified),
			"sol_claim_and_post" => Some(Tool::SolClaimAndPost),
			"swaprecover_claim" => Some(Tool::SwapRecoverClaim),
			"swaprecover_refund" => Some(Tool::SwapRecoverRefund),
			"env_get" => Some(Tool::EnvGet),
			"sc_info" => Some(Tool::ScInfo),
			"sol_escrow_get" => Some(Tool::SolEscrowGet),
			"sol_config_get" => Some(Tool::SolConfigGet),
			"receipts_trades_list" => Some(Tool::ReceiptsTradesList),
			"receipts_trade_get" => Some(Tool::ReceiptsTradeGet),
			"receipts_locks_list" => Some(Tool::ReceiptsLocksList),
			"receipts_claims_list" => Some(Tool::ReceiptsClaimsList),
			"receipts_refunds_list" => Some(Tool::ReceiptsRefundsList),
			_ => None,
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			Tool::SwapOfferPost => "swap_offer_post",
			Tool::SwapRfqPost => "swap_rfq_post",
			Tool::SwapQuotePost => "swap_quote_post",
			Tool::SwapQuoteAccept => "swap_quote_accept",
			Tool::SwapInviteSend => "swap_invite_send",
			Tool::SwapJoin => "swap_join",
			Tool::SwapTermsPost => "swap_terms_post",
			Tool::SwapAcceptPost => "swap_accept_post",
			Tool::SwapCancelPost => "swap_cancel_post",
			Tool::SwapStatusPost => "swap_status_post",
			Tool::LnInvoiceCreateAndPost => "ln_invoice_create_and_post",
			Tool::SolEscrowInitAndPost => "sol_escrow_init_and_post",
			Tool::LnPayAndPostVerified => "ln_pay_and_post_verified",
			Tool::SolClaimAndPost => "sol_claim_and_post",
			Tool::SwapRecoverClaim => "swaprecover_claim",
			Tool::SwapRecoverRefund => "swaprecover_refund",
			Tool::EnvGet => "env_get",
			Tool::ScInfo => "sc_info",
			Tool::SolEscrowGet => "sol_escrow_get",
			Tool::SolConfigGet => "sol_config_get",
			Tool::ReceiptsTradesList => "receipts_trades_list",
			Tool::ReceiptsTradeGet => "receipts_trade_get",
			Tool::ReceiptsLocksList => "receipts_locks_list",
			Tool::ReceiptsClaimsList => "receipts_claims_list",
			Tool::ReceiptsRefundsList => "receipts_refunds_list",
		}
	}

	/// Whether the tool mutates external state (bus, chain, node or store).
	pub fn is_mutating(&self) -> bool {
		!matches!(
			self,
			Tool::EnvGet
				| Tool::ScInfo
				| Tool::SolEscrowGet
				| Tool::SolConfigGet
				| Tool::ReceiptsTradesList
				| Tool::ReceiptsTradeGet
				| Tool::ReceiptsLocksList
				| Tool::ReceiptsClaimsList
				| Tool::ReceiptsRefundsList
		)
	}
}

pub struct ToolExecutor {
	ctx: Arc<EngineContext>,
}

impl ToolExecutor {
	pub fn new(ctx: Arc<EngineContext>) -> Self {
		Self { ctx }
	}

	pub fn context(&self) -> &Arc<EngineContext> {
		&self.ctx
	}

	/// Runs a tool by name. Errors come back prefixed with the tool name.
	pub async fn execute(
		&self, tool_name: &str, args: &Value, opts: &ExecuteOpts,
	) -> Result<Value, ToolError> {
		let tool = Tool::from_name(tool_name)
			.ok_or_else(|| ToolError::invalid(format!("{}: unknown tool", tool_name)))?;

		if tool.is_mutating() && !opts.dry_run && !opts.auto_approve {
			return Err(ToolError::unauthorized(format!(
				"{}: blocked (auto_approve is false)",
				tool.name()
			)));
		}

		let ctx = &self.ctx;
		let result = match tool {
			Tool::SwapOfferPost => tools::offer_post::handle(ctx, args, opts).await,
			Tool::SwapRfqPost => tools::rfq_post::handle(ctx, args, opts).await,
			Tool::SwapQuotePost => tools::quote_post::handle(ctx, args, opts).await,
			Tool::SwapQuoteAccept => tools::quote_accept::handle(ctx, args, opts).await,
			Tool::SwapInviteSend => tools::swap_invite::handle(ctx, args, opts).await,
			Tool::SwapJoin => tools::swap_join::handle(ctx, args, opts).await,
			Tool::SwapTermsPost => tools::terms_post::handle(ctx, args, opts).await,
			Tool::SwapAcceptPost => tools::accept_post::handle(ctx, args, opts).await,
			Tool::SwapCancelPost => tools::cancel_post::handle(ctx, args, opts).await,
			Tool::SwapStatusPost => tools::status_post::handle(ctx, args, opts).await,
			Tool::LnInvoiceCreateAndPost => tools::ln_invoice::handle(ctx, args, opts).await,
			Tool::SolEscrowInitAndPost => tools::sol_escrow::handle(ctx, args, opts).await,
			Tool::LnPayAndPostVerified => tools::ln_pay::handle(ctx, args, opts).await,
			Tool::SolClaimAndPost => tools::sol_claim::handle(ctx, args, opts).await,
			Tool::SwapRecoverClaim => tools::recover::handle_claim(ctx, args, opts).await,
			Tool::SwapRecoverRefund => tools::recover::handle_refund(ctx, args, opts).await,
			Tool::EnvGet => tools::readonly::handle_env_get(ctx, args).await,
			Tool::ScInfo => tools::readonly::handle_sc_info(ctx, args).await,
			Tool::SolEscrowGet => tools::readonly::handle_sol_escrow_get(ctx, args).await,
			Tool::SolConfigGet => tools::readonly::handle_sol_config_get(ctx, args).await,
			Tool::ReceiptsTradesList => tools::readonly::handle_trades_list(ctx, args).await,
			Tool::ReceiptsTradeGet => tools::readonly::handle_trade_get(ctx, args).await,
			Tool::ReceiptsLocksList => tools::readonly::handle_locks_list(ctx, args).await,
			Tool::ReceiptsClaimsList => tools::readonly::handle_claims_list(ctx, args).await,
			Tool::ReceiptsRefundsList => tools::readonly::handle_refunds_list(ctx, args).await,
		};

		result.map_err(|mut e| {
			if !e.message.starts_with(tool.name()) {
				e.message = format!("{}: {}", tool.name(), e.message);
			}
			e
		})
	}
}
