//! External graph store client boundary.
//!
//! The engine only needs "execute a statement scoped to a namespace" and
//! "run a query"; [`GraphExecutor`] is that boundary. The production
//! implementation talks to a graph HTTP gateway; tests use
//! [`RecordingGraph`].

use std::sync::Mutex;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::config::GraphConfig;

/// Failure executing against the graph store.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The store rejected the statement with a machine-readable code.
    #[error("graph execute error code:{code}, message:{message}")]
    Execute { code: i64, message: String },

    /// Transport-level failure reaching the gateway.
    #[error("graph transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// One result table returned by a query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphResult {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub data: Vec<GraphRow>,
    #[serde(default)]
    pub space_name: String,
}

/// One row with its metadata, both kept as raw JSON values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphRow {
    #[serde(default)]
    pub row: Vec<serde_json::Value>,
    #[serde(default)]
    pub meta: Vec<serde_json::Value>,
}

/// Client capability of the external graph store.
#[async_trait]
pub trait GraphExecutor: Send + Sync {
    /// Execute a mutation statement. With `space` set, the statement runs
    /// scoped to that namespace (`USE <space>;` prefix); space-creation
    /// statements pass `None`.
    async fn execute(&self, space: Option<&str>, stmt: &str) -> Result<(), GraphError>;

    /// Run a query and return its result tables.
    async fn query(&self, stmt: &str) -> Result<Vec<GraphResult>, GraphError>;
}

#[derive(Serialize)]
struct ExecRequest<'a> {
    username: &'a str,
    password: &'a str,
    gql: &'a str,
}

#[derive(Deserialize)]
struct ExecResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    results: Vec<GraphResult>,
}

/// HTTP gateway client. The underlying connection pool is established
/// lazily on first use and reused for the life of the task that owns it.
pub struct HttpGraphClient {
    conf: GraphConfig,
    session: OnceCell<reqwest::Client>,
}

impl HttpGraphClient {
    #[must_use]
    pub fn new(conf: GraphConfig) -> Self {
        Self {
            conf,
            session: OnceCell::new(),
        }
    }

    fn session(&self) -> &reqwest::Client {
        self.session.get_or_init(reqwest::Client::new)
    }

    fn endpoint(&self) -> String {
        format!("http://{}:{}/api/db/exec", self.conf.address, self.conf.port)
    }

    async fn exec_raw(&self, gql: &str) -> Result<ExecResponse, GraphError> {
        let request = ExecRequest {
            username: &self.conf.username,
            password: &self.conf.password,
            gql,
        };
        let resp = self
            .session()
            .post(self.endpoint())
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<ExecResponse>()
            .await?;
        if resp.code != 0 {
            return Err(GraphError::Execute {
                code: resp.code,
                message: resp.message,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl GraphExecutor for HttpGraphClient {
    async fn execute(&self, space: Option<&str>, stmt: &str) -> Result<(), GraphError> {
        let gql = match space {
            Some(space) => format!("USE {space};{stmt}"),
            None => stmt.to_string(),
        };
        self.exec_raw(&gql).await?;
        Ok(())
    }

    async fn query(&self, stmt: &str) -> Result<Vec<GraphResult>, GraphError> {
        let resp = self.exec_raw(stmt).await?;
        tracing::debug!(gql = stmt, results = resp.results.len(), "graph query");
        Ok(resp.results)
    }
}

/// In-memory executor for tests: records every statement in order and can
/// be primed to fail from a given statement on.
#[derive(Default)]
pub struct RecordingGraph {
    statements: Mutex<Vec<(Option<String>, String)>>,
    fail_from: Option<usize>,
}

impl RecordingGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every execute call from the `n`-th (0-based) on.
    #[must_use]
    pub fn failing_from(n: usize) -> Self {
        Self {
            statements: Mutex::new(Vec::new()),
            fail_from: Some(n),
        }
    }

    /// Statements executed so far, in order, with their space scope.
    #[must_use]
    pub fn statements(&self) -> Vec<(Option<String>, String)> {
        self.statements.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl GraphExecutor for RecordingGraph {
    async fn execute(&self, space: Option<&str>, stmt: &str) -> Result<(), GraphError> {
        let mut statements = self.statements.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(n) = self.fail_from {
            if statements.len() >= n {
                return Err(GraphError::Execute {
                    code: -1005,
                    message: "injected failure".to_string(),
                });
            }
        }
        statements.push((space.map(str::to_string), stmt.to_string()));
        Ok(())
    }

    async fn query(&self, _stmt: &str) -> Result<Vec<GraphResult>, GraphError> {
        Ok(Vec::new())
    }
}
