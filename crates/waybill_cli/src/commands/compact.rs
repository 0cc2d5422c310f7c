//! Compact command implementation.

use super::open_existing;
use std::path::Path;

/// Rewrites the journal as one snapshot frame.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let before = store.stats();

    println!("Compacting journal at {:?}", path);
    store.compact()?;
    let after = store.stats();

    println!("  Records:     {}", after.records);
    println!("  Size before: {} bytes", before.journal_bytes);
    println!("  Size after:  {} bytes", after.journal_bytes);
    println!("✓ Compaction complete");
    Ok(())
}
