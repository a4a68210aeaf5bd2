//! Serialize command

use crate::manifest::load_config_map;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tend_schema::{Format, serializer};

/// Write the TOML config map in `file` to stdout in `format`.
pub async fn serialize(file: &Path, format: Format) -> Result<()> {
    let map = load_config_map(file).await?;
    let mut stdout = std::io::stdout().lock();
    serializer(format)
        .serialize(&map, &mut stdout)
        .with_context(|| format!("Failed to write {format}"))?;
    // Pretty JSON ends without a newline; the line formats end with one.
    if format == Format::Json {
        writeln!(stdout)?;
    }
    Ok(())
}
