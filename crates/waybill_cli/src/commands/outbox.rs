//! Outbox listing and repair commands.

use super::{describe_millis, open_existing};
use std::path::Path;
use waybill_sync_engine::{Outbox, OutboxEntry};

/// Lists entries in delivery order; `stuck_only` keeps those at the cap.
pub fn list(
    path: &Path,
    max_retries: u32,
    stuck_only: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let outbox = Outbox::new(open_existing(path)?, max_retries);
    let entries = if stuck_only {
        outbox.exhausted()?
    } else {
        outbox.entries()?
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        _ => {
            if entries.is_empty() {
                println!("{}", if stuck_only { "No stuck entries" } else { "Outbox is empty" });
            }
            for entry in &entries {
                println!("{}", describe(entry, max_retries));
            }
        }
    }
    Ok(())
}

/// Resets one entry, or every failed entry with `all`.
pub fn retry(
    path: &Path,
    max_retries: u32,
    id: Option<u64>,
    all: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let outbox = Outbox::new(open_existing(path)?, max_retries);
    match (id, all) {
        (_, true) => {
            let count = outbox.reset_all()?;
            println!("Reset {} entries", count);
        }
        (Some(id), false) => {
            if !outbox.reset(id)? {
                return Err(format!("No outbox entry {}", id).into());
            }
            println!("Reset entry {}", id);
        }
        (None, false) => return Err("Entry id or --all required".into()),
    }
    Ok(())
}

/// Drops an entry without delivering it.
pub fn discard(path: &Path, max_retries: u32, id: u64) -> Result<(), Box<dyn std::error::Error>> {
    let outbox = Outbox::new(open_existing(path)?, max_retries);
    match outbox.discard(id)? {
        Some(entry) => {
            println!("Discarded {}", describe(&entry, max_retries));
            Ok(())
        }
        None => Err(format!("No outbox entry {}", id).into()),
    }
}

/// One-line summary of an entry.
pub fn describe(entry: &OutboxEntry, max_retries: u32) -> String {
    let mut line = format!(
        "#{:<6} {:<7} {:<15} {:<24} p{:<3} attempts {}/{}",
        entry.id,
        entry.operation.as_str(),
        entry.entity_type.tag(),
        entry.entity_id,
        entry.priority.value(),
        entry.attempts,
        max_retries,
    );
    if let Some(at) = entry.last_attempt_at {
        line.push_str(&format!(" last {}", describe_millis(at)));
    }
    if let Some(error) = &entry.last_error {
        line.push_str(&format!(" error: {}", error));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use waybill_core::{LocalStore, StoreConfig};
    use waybill_sync_protocol::{EntityType, Operation, Priority};

    fn store_with_delete(dir: &Path) -> Outbox {
        let store = Arc::new(LocalStore::open(dir, StoreConfig::default()).unwrap());
        let outbox = Outbox::new(store, 3);
        outbox
            .enqueue("pr-9", EntityType::PickupRequest, Operation::Delete, None, Priority::HIGH)
            .unwrap();
        outbox
    }

    #[test]
    fn describe_shows_failure_state() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = store_with_delete(dir.path());
        let id = outbox.entries().unwrap()[0].id;
        let failed = outbox.record_failure(id, "server error 503: down").unwrap().unwrap();

        let line = describe(&failed, 3);
        assert!(line.starts_with(&format!("#{id}")));
        assert!(line.contains("delete"));
        assert!(line.contains("pickup-request"));
        assert!(line.contains("attempts 1/3"));
        assert!(line.ends_with("error: server error 503: down"));
    }

    #[test]
    fn retry_and_discard_work_on_a_closed_store() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let outbox = store_with_delete(dir.path());
            let id = outbox.entries().unwrap()[0].id;
            for _ in 0..3 {
                outbox.record_failure(id, "timeout").unwrap();
            }
            id
        };

        retry(dir.path(), 3, Some(id), false).unwrap();
        assert!(retry(dir.path(), 3, Some(id + 100), false).is_err());
        discard(dir.path(), 3, id).unwrap();
        assert!(discard(dir.path(), 3, id).is_err());
    }
}
