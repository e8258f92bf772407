use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use epigraph_core::graph::{GraphExecutor, HttpGraphClient};

/// Execute the `check` command: validate config, storage, and graph
/// connectivity without starting the tasks.
pub async fn execute(config_path: &Path, log_level: Option<&str>) -> Result<()> {
    let config = super::load_config(config_path, log_level)?;
    println!("Config:        OK");

    let storage_ok = match super::open_storage(&config) {
        Ok(_) => {
            println!("Storage:       OK");
            true
        }
        Err(e) => {
            println!("Storage:       FAILED — {e}");
            false
        }
    };

    let graph_ok = if config.graph.address.is_empty() {
        println!("Graph store:   FAILED — no graph address configured");
        false
    } else {
        let graph = Arc::new(HttpGraphClient::new(config.graph.clone()));
        match graph.query("SHOW SPACES;").await {
            Ok(_) => {
                println!("Graph store:   OK");
                true
            }
            Err(e) => {
                println!("Graph store:   FAILED — {e}");
                false
            }
        }
    };

    if storage_ok && graph_ok {
        println!("\nAll checks passed.");
        Ok(())
    } else {
        anyhow::bail!("one or more checks failed")
    }
}
