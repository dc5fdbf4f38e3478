// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Shared engine bring-up for the daemon and the CLI.

use std::io;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::clients::{RemoteLightningRpc, RemoteSidechannel, RemoteSolanaRpc};
use crate::io::persist::{resolve_db_path, sqlite_store::SqliteStore};
use crate::locks::LockManager;
use crate::service::{EngineContext, ToolExecutor};
use crate::sidechannel::Session;
use crate::trace::TraceRing;
use crate::util::config::{load_envelope_key, Config};
use crate::vault::SecretsVault;

/// Everything a binary needs to drive the engine.
pub struct Engine {
	pub executor: Arc<ToolExecutor>,
	/// Background tasks (bus poll + session pump); abort on shutdown.
	pub background: Vec<JoinHandle<()>>,
}

/// Builds the engine from a loaded configuration: receipts store, bus
/// session with its event pump, capability clients and the tool executor.
pub async fn build_engine(config: Config) -> io::Result<Engine> {
	let config = Arc::new(config);

	let envelope_key = load_envelope_key(&config.envelope_key_path)?;

	let db_path = resolve_db_path(&config.onchain_root, config.receipts_db_path.as_deref())?;
	let store = Arc::new(SqliteStore::new(&db_path)?);

	let transport = RemoteSidechannel::new(config.sidechannel.url.clone());
	let session = Session::new(transport.clone());
	let (event_tx, event_rx) = mpsc::channel(1024);
	let poll_task = tokio::spawn(Arc::clone(&transport).run_event_poll(event_tx));
	let pump_task = tokio::spawn(Arc::clone(&session).run_pump(event_rx));

	let ln = Arc::new(RemoteLightningRpc::new(
		config.lightning.rpc_url.clone(),
		config.lightning.auth_token.clone(),
		config.lightning.backend,
	));

	let local_signer = match &config.solana.keypair_path {
		// A pinned keypair path names the signer file; its pubkey is in
		// `<path>.pub`, matching the signer shim's layout.
		Some(path) => std::fs::read_to_string(format!("{}.pub", path))
			.map(|s| s.trim().to_string())
			.map_err(|e| {
				io::Error::new(e.kind(), format!("Failed to read signer pubkey: {}", e))
			})?,
		None => RemoteSolanaRpc::fetch_local_signer(&config.solana.rpc_url)
			.await
			.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?,
	};
	let sol = Arc::new(RemoteSolanaRpc::new(
		config.solana.rpc_url.clone(),
		local_signer,
		config.solana.program_id.clone(),
	));

	let ctx = Arc::new(EngineContext {
		config: Arc::clone(&config),
		session,
		store: Arc::clone(&store),
		locks: LockManager::new(store),
		ln,
		sol,
		vault: Arc::new(SecretsVault::new()),
		trace: Arc::new(TraceRing::new(config.trace_enabled)),
		envelope_key,
	});

	Ok(Engine { executor: Arc::new(ToolExecutor::new(ctx)), background: vec![poll_task, pump_task] })
}
