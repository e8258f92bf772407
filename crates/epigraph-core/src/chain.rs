//! Storage-deal chain client boundary.
//!
//! The retrieve task needs two things from a chain node: the on-chain
//! registry of an expert's data files, and a local export of a file the
//! node already holds. Both go through the node's JSON-RPC endpoint.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ChainConfig;

/// One data file as registered on chain for an expert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainFileInfo {
    #[serde(rename = "PieceID", default)]
    pub piece_cid: String,
    #[serde(rename = "RootID", default)]
    pub root_cid: String,
    #[serde(rename = "PieceSize", default)]
    pub piece_size: u64,
}

/// Chain node capability used by acquisition.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// The on-chain file registry of `expert`.
    async fn expert_files(&self, expert: &str) -> Result<Vec<ChainFileInfo>>;

    /// Export the file rooted at `root_cid` to `path` on the node.
    async fn export(&self, root_cid: &str, path: &str) -> Result<()>;
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// JSON-RPC client against one chain node.
pub struct RpcChainClient {
    conf: ChainConfig,
    session: OnceCell<reqwest::Client>,
}

impl RpcChainClient {
    #[must_use]
    pub fn new(conf: ChainConfig) -> Self {
        Self {
            conf,
            session: OnceCell::new(),
        }
    }

    fn session(&self) -> &reqwest::Client {
        self.session.get_or_init(reqwest::Client::new)
    }

    /// Issue one JSON-RPC call; `Ok(None)` when the method returns null.
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let resp: RpcResponse<T> = self
            .session()
            .post(format!("http://{}/rpc/v0", self.conf.rpc_host))
            .bearer_auth(&self.conf.rpc_token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("chain rpc {method} failed"))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("chain rpc {method}: invalid response"))?;

        if let Some(err) = resp.error {
            bail!("chain rpc {method} error code:{}, message:{}", err.code, err.message);
        }
        Ok(resp.result)
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn expert_files(&self, expert: &str) -> Result<Vec<ChainFileInfo>> {
        let infos = self
            .call(
                "Filecoin.StateExpertDatas",
                json!([expert, null, false, null]),
            )
            .await?;
        Ok(infos.unwrap_or_default())
    }

    async fn export(&self, root_cid: &str, path: &str) -> Result<()> {
        // Export returns null on success; only the error branch matters.
        self.call::<serde_json::Value>(
            "Filecoin.ClientExport",
            json!([{ "Root": { "/": root_cid } }, { "Path": path }]),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_file_info_parses_rpc_shape() {
        let raw = r#"{"PieceID": "baga6ea...", "RootID": "bafk2bza...", "PieceSize": 2048}"#;
        let info: ChainFileInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(info.piece_cid, "baga6ea...");
        assert_eq!(info.root_cid, "bafk2bza...");
        assert_eq!(info.piece_size, 2048);
    }

    #[test]
    fn rpc_error_surfaces() {
        let resp: RpcResponse<Vec<ChainFileInfo>> =
            serde_json::from_str(r#"{"error": {"code": 1, "message": "no such expert"}}"#).unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, 1);
        assert_eq!(err.message, "no such expert");
    }
}
