use std::sync::Arc;

use clap::Parser;
use log::{LevelFilter, Metadata, Record};

use intercomswap::autopost;
use intercomswap::bootstrap::build_engine;
use intercomswap::engine::AutomationLoop;
use intercomswap::util::config::{load_config, ArgsConfig};

struct StderrLogger {
	level: LevelFilter,
}

impl log::Log for StderrLogger {
	fn enabled(&self, metadata: &Metadata) -> bool {
		metadata.level() <= self.level
	}

	fn log(&self, record: &Record) {
		if self.enabled(record.metadata()) {
			eprintln!(
				"[{}] {} {}: {}",
				chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
				record.level(),
				record.target(),
				record.args()
			);
		}
	}

	fn flush(&self) {}
}

fn main() {
	let args = ArgsConfig::parse();
	let config = match load_config(&args) {
		Ok(config) => config,
		Err(e) => {
			eprintln!("Invalid configuration: {}", e);
			std::process::exit(-1);
		},
	};

	let logger = Box::new(StderrLogger { level: config.log_level });
	if log::set_boxed_logger(logger).is_ok() {
		log::set_max_level(config.log_level);
	}

	let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
		Ok(runtime) => Arc::new(runtime),
		Err(e) => {
			eprintln!("Failed to setup tokio runtime: {}", e);
			std::process::exit(-1);
		},
	};

	runtime.block_on(async {
		let engine = match build_engine(config.clone()).await {
			Ok(engine) => engine,
			Err(e) => {
				eprintln!("Failed to start up swap engine: {}", e);
				std::process::exit(-1);
			},
		};

		let ctx = engine.executor.context();
		if !config.sidechannel.channels.is_empty() {
			if let Err(e) = ctx.session.subscribe(&config.sidechannel.channels).await {
				log::warn!("initial subscribe failed, will retry on keepalive: {}", e);
			}
		}

		let automation = AutomationLoop::new(Arc::clone(&engine.executor));
		let automation_task = tokio::spawn(Arc::clone(&automation).run());

		let autopost_tasks = autopost::spawn_jobs(
			Arc::clone(&engine.executor),
			config.swap.autopost.clone(),
		);

		println!("intercomswap engine running (peer channels: {:?})", config.sidechannel.channels);

		let mut sigterm_stream =
			match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
				Ok(stream) => stream,
				Err(e) => {
					eprintln!("Failed to register for SIGTERM stream: {}", e);
					std::process::exit(-1);
				},
			};
		tokio::select! {
			_ = tokio::signal::ctrl_c() => {
				println!("Received CTRL-C, shutting down..");
			}
			_ = sigterm_stream.recv() => {
				println!("Received SIGTERM, shutting down..");
			}
		}

		automation.stop().await;
		automation_task.abort();
		for task in autopost_tasks {
			task.abort();
		}
		for task in engine.background {
			task.abort();
		}
	});

	println!("Shutdown complete..");
}
