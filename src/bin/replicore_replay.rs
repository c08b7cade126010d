//! replicore-replay: offline sync-activity replay
//!
//! Seeds an in-memory store from a YAML fixture, pushes the fixture's
//! sync-activity tasks through the execution cache and activity replicator,
//! and prints one JSON line per task followed by a metrics summary line.
//!
//! ## Usage
//! ```text
//! replicore-replay <fixture.yaml> [--config path]
//! ```
//!
//! ## Configuration
//! - REPLICORE_CONFIG: configuration file (overridden by --config)
//! - REPLICORE_LOG: log filter (default: info), written to stderr

use std::sync::Arc;

use tracing::{error, info};

use replicore::config::Config;
use replicore::metrics::InMemoryMetrics;
use replicore::replay::{replay, ReplayFixture};
use replicore::utils::bootstrap::{init_tracing, parse_config_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = parse_config_path(args.iter().cloned());
    let fixture_path = args
        .iter()
        .enumerate()
        .find(|(i, arg)| {
            !arg.starts_with("--") && (*i == 0 || args[*i - 1] != "--config")
        })
        .map(|(_, arg)| arg.clone())
        .ok_or("usage: replicore-replay <fixture.yaml> [--config path]")?;

    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let raw = std::fs::read_to_string(&fixture_path)?;
    let fixture: ReplayFixture = serde_yaml::from_str(&raw)?;
    info!(
        fixture = %fixture_path,
        executions = fixture.executions.len(),
        tasks = fixture.tasks.len(),
        "Starting replay"
    );

    let metrics = Arc::new(InMemoryMetrics::new());
    let records = replay(fixture, &config, metrics.clone()).await?;
    for record in &records {
        println!("{}", serde_json::to_string(record)?);
    }

    let summary: serde_json::Map<String, serde_json::Value> = metrics
        .snapshot()
        .into_iter()
        .map(|(name, value)| (name, value.into()))
        .collect();
    println!("{}", serde_json::json!({ "metrics": summary }));

    Ok(())
}
