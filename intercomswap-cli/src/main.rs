// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Operator CLI over the swap engine's tool surface.
//!
//! Builds the engine in-process from the same configuration as the daemon
//! and runs exactly one tool. Mutating tools require `--auto-approve`
//! unless `--dry-run` is given; results print as JSON.

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use intercomswap::bootstrap::build_engine;
use intercomswap::service::ExecuteOpts;
use intercomswap::util::config::{load_config, ArgsConfig};

#[derive(Parser, Debug)]
#[command(version, about = "intercomswap operator CLI", long_about = None)]
struct Cli {
	/// Engine configuration file (same format as the daemon's).
	#[arg(long, short = 'c')]
	config: String,

	/// Confirm mutating tools.
	#[arg(long)]
	auto_approve: bool,

	/// Report what would happen without touching anything.
	#[arg(long)]
	dry_run: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run any tool by name with a JSON argument object.
	Tool {
		name: String,
		/// JSON object, e.g. '{"trade_id":"svc:demo:1"}'.
		#[arg(long, default_value = "{}")]
		args: String,
	},
	/// List journaled trades.
	Trades {
		#[arg(long, default_value_t = 50)]
		limit: u64,
		#[arg(long, default_value_t = 0)]
		offset: u64,
	},
	/// Show one trade with its event journal.
	Trade {
		trade_id: String,
	},
	/// List listing locks, optionally for one trade.
	Locks {
		#[arg(long)]
		trade_id: Option<String>,
	},
	/// Trades paid on Lightning but not yet claimed.
	Claims,
	/// Escrowed trades whose refund timelock has passed.
	Refunds,
	/// Claim a settled escrow (operator recovery).
	RecoverClaim {
		#[arg(long)]
		trade_id: Option<String>,
		#[arg(long)]
		payment_hash: Option<String>,
	},
	/// Refund an expired escrow (operator recovery).
	RecoverRefund {
		#[arg(long)]
		trade_id: Option<String>,
		#[arg(long)]
		payment_hash: Option<String>,
	},
	/// Read on-chain escrow state for a payment hash.
	EscrowGet {
		payment_hash: String,
	},
	/// Read the on-chain fee configuration.
	FeeConfig,
	/// Sidechannel identity and subscriptions.
	ScInfo,
	/// Engine environment summary (includes the trace ring when enabled).
	Env,
}

fn command_to_call(command: &Command) -> anyhow::Result<(String, Value)> {
	Ok(match command {
		Command::Tool { name, args } => {
			let parsed: Value = serde_json::from_str(args)
				.map_err(|e| anyhow::anyhow!("--args is not valid JSON: {}", e))?;
			(name.clone(), parsed)
		},
		Command::Trades { limit, offset } => {
			("receipts_trades_list".into(), json!({ "limit": limit, "offset": offset }))
		},
		Command::Trade { trade_id } => {
			("receipts_trade_get".into(), json!({ "trade_id": trade_id }))
		},
		Command::Locks { trade_id } => match trade_id {
			Some(trade_id) => ("receipts_locks_list".into(), json!({ "trade_id": trade_id })),
			None => ("receipts_locks_list".into(), json!({})),
		},
		Command::Claims => ("receipts_claims_list".into(), json!({})),
		Command::Refunds => ("receipts_refunds_list".into(), json!({})),
		Command::RecoverClaim { trade_id, payment_hash } => {
			("swaprecover_claim".into(), recover_args(trade_id, payment_hash))
		},
		Command::RecoverRefund { trade_id, payment_hash } => {
			("swaprecover_refund".into(), recover_args(trade_id, payment_hash))
		},
		Command::EscrowGet { payment_hash } => {
			("sol_escrow_get".into(), json!({ "payment_hash": payment_hash }))
		},
		Command::FeeConfig => ("sol_config_get".into(), json!({})),
		Command::ScInfo => ("sc_info".into(), json!({})),
		Command::Env => ("env_get".into(), json!({})),
	})
}

fn recover_args(trade_id: &Option<String>, payment_hash: &Option<String>) -> Value {
	let mut args = serde_json::Map::new();
	if let Some(trade_id) = trade_id {
		args.insert("trade_id".into(), json!(trade_id));
	}
	if let Some(payment_hash) = payment_hash {
		args.insert("payment_hash".into(), json!(payment_hash));
	}
	Value::Object(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	let mut config_args = ArgsConfig::parse_from(["intercomswap", cli.config.as_str()]);
	config_args.config_file = Some(cli.config.clone());
	let config = load_config(&config_args)?;

	let engine = build_engine(config).await.map_err(|e| anyhow::anyhow!(e))?;
	let (tool, args) = command_to_call(&cli.command)?;
	let opts = ExecuteOpts { auto_approve: cli.auto_approve, dry_run: cli.dry_run };

	let outcome = engine.executor.execute(&tool, &args, &opts).await;
	for task in engine.background {
		task.abort();
	}
	match outcome {
		Ok(result) => {
			println!("{}", serde_json::to_string_pretty(&result)?);
			Ok(())
		},
		Err(e) => Err(anyhow::anyhow!(e.to_string())),
	}
}
