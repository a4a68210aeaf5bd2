//! Score command

use anyhow::{Context, Result};
use tend_schema::{ActiveTags, TagExpr};

/// Print how well `expr` matches the comma separated `tags`.
///
/// Unlike the engine, which treats a malformed expression as a
/// registration error, this reports the parse error to the user.
pub fn score(expr: &str, tags: &str) -> Result<()> {
    let parsed = TagExpr::parse(expr).with_context(|| format!("Invalid expression '{expr}'"))?;
    let active = ActiveTags::parse_list(tags);
    println!("{}", parsed.score(&active));
    if !parsed.matches(&active) {
        tracing::debug!("'{expr}' does not match [{active}]");
    }
    Ok(())
}
