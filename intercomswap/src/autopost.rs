// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Fire-and-forget periodic broadcasters (offers, RFQs).
//!
//! Each configured job runs a tool on an interval until its TTL elapses.
//! Purely an operational convenience; failures are logged and the next
//! firing proceeds.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;

use crate::service::{ExecuteOpts, ToolExecutor};
use crate::util::config::AutopostJobConfig;
use crate::util::now_unix;

/// Converts the TOML argument table into the JSON object tools expect.
fn toml_to_json(value: &toml::Value) -> Value {
	match value {
		toml::Value::String(s) => Value::String(s.clone()),
		toml::Value::Integer(i) => Value::from(*i),
		toml::Value::Float(f) => {
			serde_json::Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null)
		},
		toml::Value::Boolean(b) => Value::Bool(*b),
		toml::Value::Datetime(dt) => Value::String(dt.to_string()),
		toml::Value::Array(items) => Value::Array(items.iter().map(toml_to_json).collect()),
		toml::Value::Table(table) => Value::Object(
			table.iter().map(|(key, value)| (key.clone(), toml_to_json(value))).collect(),
		),
	}
}

/// Spawns one task per job; each stops itself when its TTL or
/// `valid_until_unix` passes.
pub fn spawn_jobs(
	executor: Arc<ToolExecutor>, jobs: Vec<AutopostJobConfig>,
) -> Vec<JoinHandle<()>> {
	jobs.into_iter()
		.map(|job| {
			let executor = Arc::clone(&executor);
			tokio::spawn(async move {
				run_job(executor, job).await;
			})
		})
		.collect()
}

async fn run_job(executor: Arc<ToolExecutor>, job: AutopostJobConfig) {
	let args = toml_to_json(&job.args);
	let started_unix = now_unix();
	let opts = ExecuteOpts { auto_approve: true, dry_run: false };
	let mut interval = tokio::time::interval(Duration::from_secs(job.interval_sec.max(1)));
	interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

	loop {
		interval.tick().await;
		let now = now_unix();
		if now.saturating_sub(started_unix) >= job.ttl_sec {
			log::info!("autopost job {} reached its TTL, stopping", job.name);
			break;
		}
		if job.valid_until_unix.map_or(false, |valid_until| now >= valid_until) {
			log::info!("autopost job {} passed valid_until, stopping", job.name);
			break;
		}
		if let Err(e) = executor.execute(&job.tool, &args, &opts).await {
			log::warn!("autopost job {} ({}): {}", job.name, job.tool, e);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn toml_args_convert_to_json() {
		let table: toml::Value = toml::from_str(
			r#"
			channel = "0000intercomswapbtcusdt"
			btc_sats = 50000
			nested = { a = [1, 2], b = true }
			"#,
		)
		.unwrap();
		let json = toml_to_json(&table);
		assert_eq!(json["channel"], "0000intercomswapbtcusdt");
		assert_eq!(json["btc_sats"], 50000);
		assert_eq!(json["nested"]["a"][1], 2);
		assert_eq!(json["nested"]["b"], true);
	}
}
