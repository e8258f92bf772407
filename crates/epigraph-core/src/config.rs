//! YAML configuration model.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub task: TaskConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// SSH private key used by the remote-shell fallback retrieval.
    #[serde(default)]
    pub key_path: String,
}

fn default_app_name() -> String {
    "epigraph".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
            key_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address of the HTTP query/export façade.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Base URL of the HTTP listing service; empty disables the
    /// listing-driven download task.
    #[serde(default)]
    pub listing_url: String,
    /// Experts acquired from the storage-deal chain.
    #[serde(default)]
    pub experts: Vec<String>,
    /// Demote already-downloaded files back to `New` on the next listing
    /// reconciliation.
    #[serde(default)]
    pub refresh: bool,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            listing_url: String::new(),
            experts: Vec::new(),
            refresh: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of the embedded key-value database.
    #[serde(default = "default_db_dir")]
    pub db_dir: String,
    /// Directory data files are materialized into.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_db_dir() -> String {
    "data/db".to_string()
}
fn default_data_dir() -> String {
    "data/files".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_dir: default_db_dir(),
            data_dir: default_data_dir(),
        }
    }
}

/// One chain node files can be exported from or retrieved through.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub ssh_host: String,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(default)]
    pub ssh_user: String,

    #[serde(default)]
    pub miner: String,
    #[serde(default)]
    pub rpc_host: String,
    #[serde(default)]
    pub rpc_token: String,
}

fn default_ssh_port() -> u16 {
    22
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub address: String,
    #[serde(default = "default_graph_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Static expert → domain fallback, consulted when a file declares no
    /// namespace of its own.
    #[serde(default)]
    pub spaces: HashMap<String, String>,
    /// Seconds to wait after DDL statements for schema propagation.
    #[serde(default = "default_ddl_wait")]
    pub ddl_wait_secs: u64,
}

fn default_graph_port() -> u16 {
    8090
}
fn default_ddl_wait() -> u64 {
    10
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: default_graph_port(),
            username: String::new(),
            password: String::new(),
            spaces: HashMap::new(),
            ddl_wait_secs: default_ddl_wait(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Scheduler cadence between passes.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

fn default_interval() -> u64 {
    180
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Fails when the file can't be read or doesn't parse.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config: {}", path.display()))?;
        tracing::info!(path = %path.display(), "load config");
        Ok(config)
    }
}
