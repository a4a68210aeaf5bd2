//! Terminal output for `tend apply`
//!
//! A comfy-table summary of the installation state, and a listener that
//! prints transitions as they happen in `--watch` mode.

use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};
use tend_core::{InstallationEvent, InstallationListener, InstallationState, ResourceSnapshot};

/// Render the state as a table: active resources first, then shadowed ones.
pub fn state_table(state: &InstallationState) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["kind", "entity", "url", "version", "priority", "state", "detail"]);

    for snapshot in &state.active {
        table.add_row(row(snapshot, ""));
    }
    for snapshot in &state.shadowed {
        table.add_row(row(snapshot, "shadowed"));
    }
    table
}

fn row(snapshot: &ResourceSnapshot, note: &str) -> Vec<String> {
    let detail = snapshot
        .error
        .clone()
        .unwrap_or_else(|| note.to_string());
    vec![
        snapshot.kind.to_string(),
        snapshot.entity.to_string(),
        snapshot.url.to_string(),
        snapshot
            .version
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string),
        snapshot.priority.to_string(),
        snapshot.state.to_string(),
        detail,
    ]
}

/// One-line summary printed after the table.
pub fn summary(state: &InstallationState) -> String {
    let errors = state.errors().count();
    if state.is_converged() && errors == 0 {
        format!("Converged after {} cycle(s).", state.cycle)
    } else {
        format!(
            "{} group(s) pending, {errors} error(s) after {} cycle(s).",
            state.pending, state.cycle
        )
    }
}

/// Prints every transition to stdout.
#[derive(Debug, Default)]
pub struct ConsoleListener;

impl InstallationListener for ConsoleListener {
    fn on_event(&self, event: &InstallationEvent) {
        if let InstallationEvent::Processed(s) = event {
            match &s.error {
                Some(error) => println!("  {} {} -> {} ({error})", s.kind, s.url, s.state),
                None => println!("  {} {} -> {}", s.kind, s.url, s.state),
            }
        }
    }
}
