//! Status command implementation.

use super::{describe_millis, open_existing};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use waybill_core::LocalStore;
use waybill_sync_engine::{Outbox, Records, Watermark};
use waybill_sync_protocol::EntityType;

/// Store status summary.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Store path.
    pub path: String,
    /// Journal size in bytes.
    pub journal_bytes: u64,
    /// Last committed frame.
    pub last_seq: u64,
    /// Frames since the last compaction.
    pub frames_since_compaction: u64,
    /// Entries in the outbox.
    pub outbox_entries: usize,
    /// Entries still eligible for delivery.
    pub pending: usize,
    /// Entries at the retry cap.
    pub stuck: usize,
    /// Pull watermark, epoch millis.
    pub watermark: i64,
    /// Per entity type record counts.
    pub entities: Vec<EntityStatus>,
}

/// Record counts for one entity type.
#[derive(Debug, Serialize)]
pub struct EntityStatus {
    /// Entity type tag.
    pub entity_type: String,
    /// Stored records.
    pub records: usize,
    /// Records with local changes not yet accepted.
    pub unsynced: usize,
}

/// Runs the status command.
pub fn run(path: &Path, max_retries: u32, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let report = collect(path, store, max_retries)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text_output(&report),
    }
    Ok(())
}

/// Gathers the status of an open store.
pub fn collect(
    path: &Path,
    store: Arc<LocalStore>,
    max_retries: u32,
) -> Result<StatusReport, Box<dyn std::error::Error>> {
    let stats = store.stats();
    let outbox = Outbox::new(Arc::clone(&store), max_retries);
    let records = Records::new(Arc::clone(&store));

    let entities = EntityType::ALL
        .into_iter()
        .map(|entity_type| {
            Ok(EntityStatus {
                entity_type: entity_type.to_string(),
                records: records.count(entity_type),
                unsynced: records.unsynced(entity_type)?.len(),
            })
        })
        .collect::<Result<Vec<_>, waybill_sync_engine::SyncError>>()?;

    Ok(StatusReport {
        path: path.display().to_string(),
        journal_bytes: stats.journal_bytes,
        last_seq: stats.last_seq,
        frames_since_compaction: stats.frames_since_compaction,
        outbox_entries: outbox.len(),
        pending: outbox.pending_count()?,
        stuck: outbox.exhausted()?.len(),
        watermark: Watermark::new(store).get(),
        entities,
    })
}

fn print_text_output(report: &StatusReport) {
    println!("Waybill Store: {}", report.path);
    println!();
    println!("Journal:");
    println!("  Size:              {} bytes", report.journal_bytes);
    println!("  Last sequence:     {}", report.last_seq);
    println!("  Since compaction:  {} frames", report.frames_since_compaction);
    println!();
    println!("Outbox:");
    println!("  Entries:           {}", report.outbox_entries);
    println!("  Pending:           {}", report.pending);
    println!("  Stuck:             {}", report.stuck);
    println!();
    println!("Last pull:           {}", describe_millis(report.watermark));
    println!();
    println!("Records:");
    for entity in &report.entities {
        println!(
            "  {:<16} {:>6} ({} unsynced)",
            entity.entity_type, entity.records, entity.unsynced
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waybill_core::StoreConfig;
    use waybill_sync_engine::{MockTransport, StaticToken, SyncConfig, SyncEngine};
    use waybill_sync_protocol::mapper::{Signature, SignatureMapper};

    #[test]
    fn status_counts_outbox_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::open(dir.path(), StoreConfig::default()).unwrap());
        let engine = SyncEngine::new(
            SyncConfig::default(),
            Arc::clone(&store),
            MockTransport::new(),
            Arc::new(StaticToken::new("t")),
        );
        engine
            .save_local::<SignatureMapper>(&Signature {
                id: "sg-1".into(),
                pickup_request_id: "pr-1".into(),
                signer_name: "Sari".into(),
                image_data: "aGk=".into(),
                signed_at: 0,
            })
            .unwrap();

        let report = collect(dir.path(), store, 3).unwrap();
        assert_eq!(report.outbox_entries, 1);
        assert_eq!(report.pending, 1);
        assert_eq!(report.stuck, 0);
        assert_eq!(report.watermark, 0);
        let signatures = report
            .entities
            .iter()
            .find(|e| e.entity_type == "signature")
            .unwrap();
        assert_eq!((signatures.records, signatures.unsynced), (1, 1));
    }
}
