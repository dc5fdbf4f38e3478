// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use std::path::PathBuf;
use std::str::FromStr;
use std::{fs, io};

use clap::Parser;
use hex::FromHex;
use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::ln::LnBackend;

const DEFAULT_REFUND_WINDOW_SEC: u64 = intercomswap_wire::REFUND_WINDOW_DEFAULT_SEC;
const MIN_TICK_INTERVAL_MS: u64 = 250;

/// Runtime configuration for the swap engine.
#[derive(Debug, Clone)]
pub struct Config {
	/// Repo-local root every persisted path must stay under.
	pub onchain_root: PathBuf,
	/// Operator-provided receipts DB path, relative to `onchain_root`.
	pub receipts_db_path: Option<String>,
	/// Path to the 32-byte hex Ed25519 envelope signing key.
	pub envelope_key_path: PathBuf,
	pub trace_enabled: bool,
	pub log_level: LevelFilter,
	pub sidechannel: SidechannelConfig,
	pub lightning: LightningConfig,
	pub solana: SolanaConfig,
	pub swap: SwapConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SidechannelConfig {
	pub url: String,
	/// Negotiation channels to keep subscribed.
	pub channels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightningConfig {
	pub backend: LnBackend,
	pub rpc_url: String,
	/// Macaroon (LND) or rune (CLN), hex/base64 as the backend expects.
	pub auth_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolanaConfig {
	pub rpc_url: String,
	pub program_id: String,
	/// SPL mint of the traded stablecoin.
	pub mint: String,
	pub keypair_path: Option<String>,
	/// Trade-fee collector this operator quotes under; defaults to the
	/// local signer.
	pub trade_fee_collector: Option<String>,
}

/// Engine tunables. Every default matches the automation loop's documented
/// cadence; the loader clamps the tick floor.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapConfig {
	pub tick_interval_ms: u64,
	pub max_events_per_tick: usize,
	pub event_max_age_ms: u64,
	pub actions_per_tick: u32,
	pub stage_retry_max: u32,
	pub stage_retry_cooldown_ms: u64,
	pub done_max_age_ms: u64,
	pub keepalive_interval_ms: u64,
	pub hygiene_interval_ms: u64,
	pub swap_leave_backoff_ms: u64,
	pub swap_leave_backoff_max_ms: u64,
	pub swap_leave_max_attempts: u32,
	pub terms_replay_cooldown_ms: u64,
	pub terms_replay_max: u32,
	pub waiting_terms_ping_ms: u64,
	pub waiting_terms_max_wait_ms: u64,
	pub waiting_terms_leave_on_timeout: bool,
	pub ln_pay_retry_cooldown_ms: u64,
	pub ln_pay_fail_leave_attempts: u32,
	pub ln_pay_fail_leave_min_wait_ms: u64,
	pub ln_route_precheck_retry_ms: u64,
	pub ln_route_precheck_wait_ms: u64,
	pub enable_auto_quote: bool,
	pub enable_quote_from_rfqs: bool,
	pub enable_auto_accept: bool,
	pub enable_auto_invite: bool,
	pub enable_auto_join: bool,
	pub refund_window_sec: u64,
	pub invoice_expiry_sec: u64,
	pub io_timeout_ms: u64,
	pub autopost: Vec<AutopostJobConfig>,
}

impl Default for SwapConfig {
	fn default() -> Self {
		Self {
			tick_interval_ms: 1000,
			max_events_per_tick: 1500,
			event_max_age_ms: 10 * 60 * 1000,
			actions_per_tick: 12,
			stage_retry_max: 2,
			stage_retry_cooldown_ms: 10_000,
			done_max_age_ms: 40 * 60 * 1000,
			keepalive_interval_ms: 5_000,
			hygiene_interval_ms: 10_000,
			swap_leave_backoff_ms: 10_000,
			swap_leave_backoff_max_ms: 120_000,
			swap_leave_max_attempts: 5,
			terms_replay_cooldown_ms: 6_000,
			terms_replay_max: 40,
			waiting_terms_ping_ms: 6_000,
			waiting_terms_max_wait_ms: 3 * 60 * 1000,
			waiting_terms_leave_on_timeout: true,
			ln_pay_retry_cooldown_ms: 10_000,
			ln_pay_fail_leave_attempts: 2,
			ln_pay_fail_leave_min_wait_ms: 5_000,
			ln_route_precheck_retry_ms: 10_000,
			ln_route_precheck_wait_ms: 4_000,
			enable_auto_quote: true,
			enable_quote_from_rfqs: false,
			enable_auto_accept: true,
			enable_auto_invite: true,
			enable_auto_join: true,
			refund_window_sec: DEFAULT_REFUND_WINDOW_SEC,
			invoice_expiry_sec: 3600,
			io_timeout_ms: 25_000,
			autopost: Vec::new(),
		}
	}
}

/// A fire-and-forget periodic broadcast job.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AutopostJobConfig {
	pub name: String,
	pub tool: String,
	pub args: toml::Value,
	pub interval_sec: u64,
	pub ttl_sec: u64,
	pub valid_until_unix: Option<u64>,
}

/// A builder for `Config`.
#[derive(Default)]
struct ConfigBuilder {
	onchain_root: Option<String>,
	receipts_db_path: Option<String>,
	envelope_key_path: Option<String>,
	trace_enabled: Option<bool>,
	log_level: Option<String>,
	sidechannel_url: Option<String>,
	sidechannel_channels: Option<Vec<String>>,
	ln_backend: Option<String>,
	ln_rpc_url: Option<String>,
	ln_auth_token: Option<String>,
	sol_rpc_url: Option<String>,
	sol_program_id: Option<String>,
	sol_mint: Option<String>,
	sol_keypair_path: Option<String>,
	sol_trade_fee_collector: Option<String>,
	swap: SwapConfig,
}

impl ConfigBuilder {
	fn merge_toml(&mut self, toml: TomlConfig) {
		if let Some(node) = toml.node {
			self.onchain_root = node.onchain_root.or(self.onchain_root.clone());
			self.receipts_db_path = node.receipts_db_path.or(self.receipts_db_path.clone());
			self.envelope_key_path = node.envelope_key_path.or(self.envelope_key_path.clone());
			self.trace_enabled = node.trace_enabled.or(self.trace_enabled);
		}
		if let Some(log) = toml.log {
			self.log_level = log.level.or(self.log_level.clone());
		}
		if let Some(sidechannel) = toml.sidechannel {
			self.sidechannel_url = Some(sidechannel.url);
			self.sidechannel_channels =
				sidechannel.channels.or(self.sidechannel_channels.clone());
		}
		if let Some(lightning) = toml.lightning {
			self.ln_backend = lightning.backend.or(self.ln_backend.clone());
			self.ln_rpc_url = Some(lightning.rpc_url);
			self.ln_auth_token = lightning.auth_token.or(self.ln_auth_token.clone());
		}
		if let Some(solana) = toml.solana {
			self.sol_rpc_url = Some(solana.rpc_url);
			self.sol_program_id = Some(solana.program_id);
			self.sol_mint = Some(solana.mint);
			self.sol_keypair_path = solana.keypair_path.or(self.sol_keypair_path.clone());
			self.sol_trade_fee_collector =
				solana.trade_fee_collector.or(self.sol_trade_fee_collector.clone());
		}
		if let Some(swap) = toml.swap {
			merge_swap_toml(&mut self.swap, swap);
		}
	}

	fn merge_args(&mut self, args: &ArgsConfig) {
		if let Some(onchain_root) = &args.onchain_root {
			self.onchain_root = Some(onchain_root.clone());
		}
		if let Some(receipts_db_path) = &args.receipts_db_path {
			self.receipts_db_path = Some(receipts_db_path.clone());
		}
		if let Some(envelope_key_path) = &args.envelope_key_path {
			self.envelope_key_path = Some(envelope_key_path.clone());
		}
		if args.trace {
			self.trace_enabled = Some(true);
		}
		if let Some(sidechannel_url) = &args.sidechannel_url {
			self.sidechannel_url = Some(sidechannel_url.clone());
		}
		if let Some(channels) = &args.sidechannel_channels {
			self.sidechannel_channels = Some(channels.clone());
		}
		if let Some(ln_rpc_url) = &args.lightning_rpc_url {
			self.ln_rpc_url = Some(ln_rpc_url.clone());
		}
		if let Some(sol_rpc_url) = &args.solana_rpc_url {
			self.sol_rpc_url = Some(sol_rpc_url.clone());
		}
	}

	fn build(self) -> io::Result<Config> {
		let onchain_root =
			PathBuf::from(self.onchain_root.unwrap_or_else(|| "onchain".to_string()));
		let envelope_key_path = PathBuf::from(
			self.envelope_key_path.ok_or_else(|| missing_field_err("envelope_key_path"))?,
		);

		let log_level = self
			.log_level
			.as_ref()
			.map(|level_str| {
				LevelFilter::from_str(level_str).map_err(|e| {
					io::Error::new(
						io::ErrorKind::InvalidInput,
						format!("Invalid log level configured: {}", e),
					)
				})
			})
			.transpose()?
			.unwrap_or(LevelFilter::Warn);

		let sidechannel = SidechannelConfig {
			url: self.sidechannel_url.ok_or_else(|| missing_field_err("sidechannel.url"))?,
			channels: self.sidechannel_channels.unwrap_or_default(),
		};

		let ln_backend = match self.ln_backend.as_deref() {
			None | Some("lnd") => LnBackend::Lnd,
			Some("cln") => LnBackend::Cln,
			Some(other) => {
				return Err(io::Error::new(
					io::ErrorKind::InvalidInput,
					format!("Unknown lightning backend {:?}, expected \"lnd\" or \"cln\"", other),
				));
			},
		};
		let lightning = LightningConfig {
			backend: ln_backend,
			rpc_url: self.ln_rpc_url.ok_or_else(|| missing_field_err("lightning.rpc_url"))?,
			auth_token: self.ln_auth_token,
		};

		let solana = SolanaConfig {
			rpc_url: self.sol_rpc_url.ok_or_else(|| missing_field_err("solana.rpc_url"))?,
			program_id: self
				.sol_program_id
				.ok_or_else(|| missing_field_err("solana.program_id"))?,
			mint: self.sol_mint.ok_or_else(|| missing_field_err("solana.mint"))?,
			keypair_path: self.sol_keypair_path,
			trade_fee_collector: self.sol_trade_fee_collector,
		};

		let mut swap = self.swap;
		swap.tick_interval_ms = swap.tick_interval_ms.max(MIN_TICK_INTERVAL_MS);

		Ok(Config {
			onchain_root,
			receipts_db_path: self.receipts_db_path,
			envelope_key_path,
			trace_enabled: self.trace_enabled.unwrap_or(false),
			log_level,
			sidechannel,
			lightning,
			solana,
			swap,
		})
	}
}

macro_rules! merge_opt {
	($dst:expr, $src:expr) => {
		if let Some(value) = $src {
			$dst = value;
		}
	};
}

fn merge_swap_toml(swap: &mut SwapConfig, toml: SwapTomlConfig) {
	merge_opt!(swap.tick_interval_ms, toml.tick_interval_ms);
	merge_opt!(swap.max_events_per_tick, toml.max_events_per_tick);
	merge_opt!(swap.event_max_age_ms, toml.event_max_age_ms);
	merge_opt!(swap.actions_per_tick, toml.actions_per_tick);
	merge_opt!(swap.stage_retry_max, toml.stage_retry_max);
	merge_opt!(swap.stage_retry_cooldown_ms, toml.stage_retry_cooldown_ms);
	merge_opt!(swap.done_max_age_ms, toml.done_max_age_ms);
	merge_opt!(swap.keepalive_interval_ms, toml.keepalive_interval_ms);
	merge_opt!(swap.hygiene_interval_ms, toml.hygiene_interval_ms);
	merge_opt!(swap.swap_leave_backoff_ms, toml.swap_leave_backoff_ms);
	merge_opt!(swap.swap_leave_backoff_max_ms, toml.swap_leave_backoff_max_ms);
	merge_opt!(swap.swap_leave_max_attempts, toml.swap_leave_max_attempts);
	merge_opt!(swap.terms_replay_cooldown_ms, toml.terms_replay_cooldown_ms);
	merge_opt!(swap.terms_replay_max, toml.terms_replay_max);
	merge_opt!(swap.waiting_terms_ping_ms, toml.waiting_terms_ping_ms);
	merge_opt!(swap.waiting_terms_max_wait_ms, toml.waiting_terms_max_wait_ms);
	merge_opt!(swap.waiting_terms_leave_on_timeout, toml.waiting_terms_leave_on_timeout);
	merge_opt!(swap.ln_pay_retry_cooldown_ms, toml.ln_pay_retry_cooldown_ms);
	merge_opt!(swap.ln_pay_fail_leave_attempts, toml.ln_pay_fail_leave_attempts);
	merge_opt!(swap.ln_pay_fail_leave_min_wait_ms, toml.ln_pay_fail_leave_min_wait_ms);
	merge_opt!(swap.ln_route_precheck_retry_ms, toml.ln_route_precheck_retry_ms);
	merge_opt!(swap.ln_route_precheck_wait_ms, toml.ln_route_precheck_wait_ms);
	merge_opt!(swap.enable_auto_quote, toml.enable_auto_quote);
	merge_opt!(swap.enable_quote_from_rfqs, toml.enable_quote_from_rfqs);
	merge_opt!(swap.enable_auto_accept, toml.enable_auto_accept);
	merge_opt!(swap.enable_auto_invite, toml.enable_auto_invite);
	merge_opt!(swap.enable_auto_join, toml.enable_auto_join);
	merge_opt!(swap.refund_window_sec, toml.refund_window_sec);
	merge_opt!(swap.invoice_expiry_sec, toml.invoice_expiry_sec);
	merge_opt!(swap.io_timeout_ms, toml.io_timeout_ms);
	if let Some(autopost) = toml.autopost {
		swap.autopost = autopost;
	}
}

/// Configuration loaded from a TOML file.
#[derive(Deserialize, Serialize)]
pub struct TomlConfig {
	node: Option<NodeTomlConfig>,
	log: Option<LogTomlConfig>,
	sidechannel: Option<SidechannelTomlConfig>,
	lightning: Option<LightningTomlConfig>,
	solana: Option<SolanaTomlConfig>,
	swap: Option<SwapTomlConfig>,
}

#[derive(Deserialize, Serialize)]
struct NodeTomlConfig {
	onchain_root: Option<String>,
	receipts_db_path: Option<String>,
	envelope_key_path: Option<String>,
	trace_enabled: Option<bool>,
}

#[derive(Deserialize, Serialize)]
struct LogTomlConfig {
	level: Option<String>,
}

#[derive(Deserialize, Serialize)]
struct SidechannelTomlConfig {
	url: String,
	channels: Option<Vec<String>>,
}

#[derive(Deserialize, Serialize)]
struct LightningTomlConfig {
	backend: Option<String>,
	rpc_url: String,
	auth_token: Option<String>,
}

#[derive(Deserialize, Serialize)]
struct SolanaTomlConfig {
	rpc_url: String,
	program_id: String,
	mint: String,
	keypair_path: Option<String>,
	trade_fee_collector: Option<String>,
}

#[derive(Default, Deserialize, Serialize)]
struct SwapTomlConfig {
	tick_interval_ms: Option<u64>,
	max_events_per_tick: Option<usize>,
	event_max_age_ms: Option<u64>,
	actions_per_tick: Option<u32>,
	stage_retry_max: Option<u32>,
	stage_retry_cooldown_ms: Option<u64>,
	done_max_age_ms: Option<u64>,
	keepalive_interval_ms: Option<u64>,
	hygiene_interval_ms: Option<u64>,
	swap_leave_backoff_ms: Option<u64>,
	swap_leave_backoff_max_ms: Option<u64>,
	swap_leave_max_attempts: Option<u32>,
	terms_replay_cooldown_ms: Option<u64>,
	terms_replay_max: Option<u32>,
	waiting_terms_ping_ms: Option<u64>,
	waiting_terms_max_wait_ms: Option<u64>,
	waiting_terms_leave_on_timeout: Option<bool>,
	ln_pay_retry_cooldown_ms: Option<u64>,
	ln_pay_fail_leave_attempts: Option<u32>,
	ln_pay_fail_leave_min_wait_ms: Option<u64>,
	ln_route_precheck_retry_ms: Option<u64>,
	ln_route_precheck_wait_ms: Option<u64>,
	enable_auto_quote: Option<bool>,
	enable_quote_from_rfqs: Option<bool>,
	enable_auto_accept: Option<bool>,
	enable_auto_invite: Option<bool>,
	enable_auto_join: Option<bool>,
	refund_window_sec: Option<u64>,
	invoice_expiry_sec: Option<u64>,
	io_timeout_ms: Option<u64>,
	autopost: Option<Vec<AutopostJobConfig>>,
}

#[derive(Parser, Debug)]
#[command(
	version,
	about = "intercomswap engine configuration",
	long_about = None,
	override_usage = "intercomswap [config_path]"
)]
pub struct ArgsConfig {
	#[arg(required = false, help = "The configuration file for running the swap engine.")]
	pub config_file: Option<String>,

	#[arg(long, env = "INTERCOMSWAP_ONCHAIN_ROOT", help = "Repo-local root for persisted state.")]
	onchain_root: Option<String>,

	#[arg(
		long,
		env = "INTERCOMSWAP_RECEIPTS_DB_PATH",
		help = "Receipts database path, relative to the onchain root."
	)]
	receipts_db_path: Option<String>,

	#[arg(
		long,
		env = "INTERCOMSWAP_ENVELOPE_KEY_PATH",
		help = "Path to the 32-byte hex Ed25519 envelope signing key."
	)]
	envelope_key_path: Option<String>,

	#[arg(long, env = "INTERCOMSWAP_TRACE", help = "Enable the in-memory diagnostic trace ring.")]
	trace: bool,

	#[arg(long, env = "INTERCOMSWAP_SIDECHANNEL_URL", help = "Sidechannel bus URL.")]
	sidechannel_url: Option<String>,

	#[arg(
		long,
		env = "INTERCOMSWAP_SIDECHANNEL_CHANNELS",
		help = "Negotiation channels to subscribe on startup."
	)]
	sidechannel_channels: Option<Vec<String>>,

	#[arg(long, env = "INTERCOMSWAP_LIGHTNING_RPC_URL", help = "Lightning node RPC URL.")]
	lightning_rpc_url: Option<String>,

	#[arg(long, env = "INTERCOMSWAP_SOLANA_RPC_URL", help = "Solana RPC URL.")]
	solana_rpc_url: Option<String>,
}

pub fn load_config(args: &ArgsConfig) -> io::Result<Config> {
	let mut builder = ConfigBuilder::default();

	if let Some(path) = &args.config_file {
		let content = fs::read_to_string(path).map_err(|e| {
			io::Error::new(e.kind(), format!("Failed to read config file '{:?}': {}", path, e))
		})?;
		let toml_config: TomlConfig = toml::from_str(&content).map_err(|e| {
			io::Error::new(
				io::ErrorKind::InvalidData,
				format!("Config file contains invalid TOML format: {}", e),
			)
		})?;
		builder.merge_toml(toml_config);
	}

	builder.merge_args(args);

	builder.build()
}

/// Loads the Ed25519 envelope signing key: a file holding 64 hex chars.
pub fn load_envelope_key(path: &std::path::Path) -> io::Result<ed25519_dalek::SigningKey> {
	let content = fs::read_to_string(path).map_err(|e| {
		io::Error::new(e.kind(), format!("Failed to read envelope key '{:?}': {}", path, e))
	})?;
	let bytes = <[u8; 32]>::from_hex(content.trim()).map_err(|e| {
		io::Error::new(
			io::ErrorKind::InvalidData,
			format!("Envelope key must be 32-byte hex: {}", e),
		)
	})?;
	Ok(ed25519_dalek::SigningKey::from_bytes(&bytes))
}

fn missing_field_err(field: &str) -> io::Error {
	io::Error::new(
		io::ErrorKind::InvalidInput,
		format!(
			"Missing `{}`. Please provide it via config file, CLI argument, or environment variable.",
			field
		),
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	const DEFAULT_CONFIG: &str = r#"
				[node]
				onchain_root = "onchain"
				envelope_key_path = "onchain/envelope.key"
				trace_enabled = true

				[log]
				level = "Debug"

				[sidechannel]
				url = "ws://127.0.0.1:8787"
				channels = ["0000intercomswapbtcusdt"]

				[lightning]
				backend = "cln"
				rpc_url = "http://127.0.0.1:9737"

				[solana]
				rpc_url = "http://127.0.0.1:8899"
				program_id = "EscrowProg1111111111111111111111111111111111"
				mint = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB"

				[swap]
				tick_interval_ms = 100
				terms_replay_max = 7

				[[swap.autopost]]
				name = "announce"
				tool = "swap_offer_post"
				interval_sec = 30
				ttl_sec = 3600
				[swap.autopost.args]
				channel = "0000intercomswapbtcusdt"
				"#;

	fn empty_args_config() -> ArgsConfig {
		ArgsConfig {
			config_file: None,
			onchain_root: None,
			receipts_db_path: None,
			envelope_key_path: None,
			trace: false,
			sidechannel_url: None,
			sidechannel_channels: None,
			lightning_rpc_url: None,
			solana_rpc_url: None,
		}
	}

	fn write_config(name: &str, content: &str) -> ArgsConfig {
		let path = std::env::temp_dir().join(name);
		fs::write(&path, content).unwrap();
		let mut args = empty_args_config();
		args.config_file = Some(path.to_string_lossy().to_string());
		args
	}

	#[test]
	fn test_config_from_file() {
		let args = write_config("intercomswap_test_config.toml", DEFAULT_CONFIG);
		let config = load_config(&args).unwrap();

		assert_eq!(config.onchain_root, PathBuf::from("onchain"));
		assert!(config.trace_enabled);
		assert_eq!(config.log_level, LevelFilter::Debug);
		assert_eq!(config.sidechannel.url, "ws://127.0.0.1:8787");
		assert_eq!(config.sidechannel.channels, vec!["0000intercomswapbtcusdt".to_string()]);
		assert_eq!(config.lightning.backend, LnBackend::Cln);
		assert_eq!(config.solana.mint, "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB");
		// The tick floor is clamped.
		assert_eq!(config.swap.tick_interval_ms, 250);
		assert_eq!(config.swap.terms_replay_max, 7);
		// Untouched tunables keep their defaults.
		assert_eq!(config.swap.actions_per_tick, 12);
		assert_eq!(config.swap.stage_retry_max, 2);
		assert_eq!(config.swap.autopost.len(), 1);
		assert_eq!(config.swap.autopost[0].tool, "swap_offer_post");
	}

	#[test]
	fn test_config_missing_fields() {
		let without_sidechannel = DEFAULT_CONFIG.replace("[sidechannel]", "[ignored]");
		let args =
			write_config("intercomswap_test_missing_sc.toml", &without_sidechannel);
		let err = load_config(&args).unwrap_err();
		assert!(err.to_string().contains("sidechannel.url"), "got: {}", err);

		let without_key = DEFAULT_CONFIG.replace("envelope_key_path", "ignored_key_path");
		let args = write_config("intercomswap_test_missing_key.toml", &without_key);
		let err = load_config(&args).unwrap_err();
		assert!(err.to_string().contains("envelope_key_path"), "got: {}", err);
	}

	#[test]
	fn test_args_config_overrides_file() {
		let mut args = write_config("intercomswap_test_override.toml", DEFAULT_CONFIG);
		args.sidechannel_url = Some("ws://10.0.0.1:9999".to_string());
		args.trace = false; // flag absent leaves the file's value

		let config = load_config(&args).unwrap();
		assert_eq!(config.sidechannel.url, "ws://10.0.0.1:9999");
		assert!(config.trace_enabled);
	}

	#[test]
	fn test_unknown_backend_rejected() {
		let bad = DEFAULT_CONFIG.replace("backend = \"cln\"", "backend = \"eclair\"");
		let args = write_config("intercomswap_test_backend.toml", &bad);
		assert!(load_config(&args).is_err());
	}

	#[test]
	fn envelope_key_loading() {
		let path = std::env::temp_dir().join("intercomswap_test_envelope.key");
		fs::write(&path, format!("{}\n", "ab".repeat(32))).unwrap();
		let key = load_envelope_key(&path).unwrap();
		assert_eq!(key.to_bytes(), [0xab; 32]);

		fs::write(&path, "not-hex").unwrap();
		assert!(load_envelope_key(&path).is_err());
	}
}
