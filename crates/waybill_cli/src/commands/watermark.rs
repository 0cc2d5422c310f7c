//! Watermark command implementation.

use super::{describe_millis, open_existing};
use std::path::Path;
use waybill_sync_engine::Watermark;

/// Shows the pull watermark, or resets it to zero.
pub fn run(path: &Path, reset: bool) -> Result<(), Box<dyn std::error::Error>> {
    let watermark = Watermark::new(open_existing(path)?);
    let current = watermark.get();

    if reset {
        watermark.reset()?;
        println!("Watermark reset (was {})", describe_millis(current));
        println!("The next pull fetches every entity from the server");
    } else {
        println!("Last pull: {}", describe_millis(current));
    }
    Ok(())
}
