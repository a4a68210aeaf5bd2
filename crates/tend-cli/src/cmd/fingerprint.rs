//! Fingerprint command

use crate::manifest::load_config_map;
use anyhow::{Context, Result};
use std::path::Path;
use tend_schema::Fingerprint;

/// Print the fingerprint the engine would compute for `file`.
pub async fn fingerprint(file: &Path, config: bool) -> Result<()> {
    let fp = if config {
        Fingerprint::of_config(&load_config_map(file).await?)
    } else {
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;
        Fingerprint::of_bytes(&bytes)
    };
    println!("{fp}");
    Ok(())
}
