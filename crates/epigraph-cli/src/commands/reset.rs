use std::path::Path;

use anyhow::Result;

use epigraph_state::FileRegistry;
use epigraph_types::ExpertId;

/// Execute the `reset-expert` command: drop the expert's replay
/// checkpoint so its sequence replays from the beginning.
pub fn execute(config_path: &Path, log_level: Option<&str>, expert: &str) -> Result<()> {
    let config = super::load_config(config_path, log_level)?;
    let storage = super::open_storage(&config)?;
    let registry = FileRegistry::new(storage);

    let expert = ExpertId::new(expert);
    match registry.load_record(&expert)? {
        Some(record) => {
            registry.delete_record(&expert)?;
            tracing::info!(
                expert = %expert,
                index = record.index,
                line = record.line,
                "replay record deleted"
            );
            println!("Checkpoint for expert '{expert}' deleted (was index {}, line {}).", record.index, record.line);
        }
        None => {
            println!("No checkpoint stored for expert '{expert}'.");
        }
    }
    Ok(())
}
