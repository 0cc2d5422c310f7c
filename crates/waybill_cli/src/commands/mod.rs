//! CLI command implementations.

pub mod compact;
pub mod outbox;
pub mod status;
pub mod sync;
pub mod watermark;

use std::path::Path;
use std::sync::Arc;
use waybill_core::{LocalStore, StoreConfig};
use waybill_sync_protocol::time::format_iso_millis;

/// Opens a store that must already exist.
pub fn open_existing(path: &Path) -> Result<Arc<LocalStore>, Box<dyn std::error::Error>> {
    if !path.join("journal.log").exists() {
        return Err(format!("No store found at {:?}", path).into());
    }
    Ok(Arc::new(LocalStore::open(path, StoreConfig::default())?))
}

/// Renders epoch millis for humans; zero reads as "never".
pub fn describe_millis(millis: i64) -> String {
    if millis <= 0 {
        "never".to_string()
    } else {
        format!("{} ({})", format_iso_millis(millis), millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let Err(err) = open_existing(&dir.path().join("nope")) else {
            panic!("opened a store that does not exist");
        };
        assert!(err.to_string().contains("No store found"));
    }

    #[test]
    fn zero_millis_is_never() {
        assert_eq!(describe_millis(0), "never");
        assert_eq!(
            describe_millis(1_714_000_000_000),
            "2024-04-24T23:06:40.000Z (1714000000000)"
        );
    }
}
