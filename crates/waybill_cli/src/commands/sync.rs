//! Sync command implementation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use waybill_core::{LocalStore, StoreConfig};
use waybill_sync_engine::{CycleReport, HttpTransport, RunOutcome, StaticToken, SyncConfig, SyncEngine};

/// Runs one push-then-pull cycle against `server`.
pub fn run(
    path: &Path,
    server: &str,
    token: &str,
    max_retries: u32,
    timeout_secs: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(LocalStore::open(path, StoreConfig::default())?);
    let config = SyncConfig::new(server)
        .with_max_retries(max_retries)
        .with_timeout(Duration::from_secs(timeout_secs));

    info!(server, path = %path.display(), "starting sync cycle");
    let transport = HttpTransport::from_config(&config)?;
    let engine = SyncEngine::new(config, store, transport, Arc::new(StaticToken::new(token)));

    match engine.sync()? {
        RunOutcome::Completed(report) => print_report(&report),
        RunOutcome::Skipped => println!("Another sync run is active"),
    }

    let stuck = engine.outbox().exhausted()?.len();
    if stuck > 0 {
        println!();
        println!("{} entries reached the retry cap; see `waybill stuck`", stuck);
    }
    Ok(())
}

fn print_report(report: &CycleReport) {
    let push = &report.push;
    println!("Push:");
    println!("  Attempted:   {}", push.attempted);
    println!("  Delivered:   {}", push.pushed);
    println!("  Superseded:  {}", push.superseded);
    println!("  Failed:      {}", push.failures.len());
    for failure in &push.failures {
        println!(
            "    #{} {} {}: {} (attempt {})",
            failure.entry_id, failure.entity_type, failure.entity_id, failure.message, failure.attempts
        );
    }

    let pull = &report.pull;
    println!("Pull:");
    println!("  Received:    {}", pull.received);
    println!("  Created:     {}", pull.created);
    println!("  Updated:     {}", pull.updated);
    println!("  Unchanged:   {}", pull.unchanged);
    println!("  Deleted:     {}", pull.deleted);
    println!("  Deferred:    {}", pull.deferred);
    if !pull.ignored_keys.is_empty() {
        println!("  Ignored:     {}", pull.ignored_keys.join(", "));
    }
    println!("  Watermark:   {}", super::describe_millis(pull.watermark));
}
