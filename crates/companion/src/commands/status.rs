//! One-shot status query

use anyhow::{Context, Result};
use guard_lib::sync::{StatusStore, StoreError};

use crate::output::{print_status, print_warning, OutputFormat};

/// Pull the latest record and print it
pub async fn show_status(store: &dyn StatusStore, format: OutputFormat) -> Result<()> {
    match store.pull().await {
        Ok(record) => {
            print_status(&record, format);
            Ok(())
        }
        Err(StoreError::Empty) => {
            print_warning("No status published yet");
            Ok(())
        }
        Err(e) => Err(e).context("Failed to fetch latest status"),
    }
}
