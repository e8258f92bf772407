//! HTTP façade: query and export endpoints proxying the graph store
//! client directly, bypassing the replay engine.

use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::graph::{GraphExecutor, GraphResult};

#[derive(Clone)]
struct ApiState {
    graph: Arc<dyn GraphExecutor>,
}

/// Build the façade router.
pub fn router(graph: Arc<dyn GraphExecutor>) -> Router {
    Router::new()
        .route("/graph/query", post(graph_query))
        .route("/graph/export", post(graph_export))
        .with_state(ApiState { graph })
}

#[derive(Serialize)]
struct ApiResponse<T> {
    code: i64,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            code: 0,
            message: "ok".to_string(),
            data: Some(data),
        })
    }

    fn error(message: String) -> Json<Self> {
        Json(Self {
            code: -1,
            message,
            data: None,
        })
    }
}

#[derive(Deserialize)]
struct QueryRequest {
    sql: String,
}

async fn graph_query(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> Json<ApiResponse<Vec<GraphResult>>> {
    match state.graph.query(&req.sql).await {
        Ok(results) => ApiResponse::ok(results),
        Err(e) => ApiResponse::error(e.to_string()),
    }
}

#[derive(Deserialize)]
struct ExportRequest {
    space: String,
    path: String,
}

#[derive(Serialize)]
struct ExportSummary {
    vertices: usize,
    edges: usize,
}

async fn graph_export(
    State(state): State<ApiState>,
    Json(req): Json<ExportRequest>,
) -> Json<ApiResponse<ExportSummary>> {
    match flatten_space(state.graph.as_ref(), &req.space, Path::new(&req.path)).await {
        Ok(summary) => ApiResponse::ok(summary),
        Err(e) => ApiResponse::error(e.to_string()),
    }
}

/// Flatten a space to `<space>_vertex.csv` / `<space>_edge.csv`: every
/// tag's vertices, then the 1-step subgraph of each vertex.
async fn flatten_space(
    graph: &dyn GraphExecutor,
    space: &str,
    base: &Path,
) -> anyhow::Result<ExportSummary> {
    let tag_results = graph.query(&format!("USE {space};SHOW TAGS;")).await?;
    let mut tags = Vec::new();
    for result in &tag_results {
        for row in &result.data {
            for value in &row.row {
                if let Some(tag) = value.as_str() {
                    tags.push(tag.to_string());
                }
            }
        }
    }

    let mut ids = Vec::new();
    for tag in &tags {
        let results = graph
            .query(&format!("USE {space};MATCH (v:{tag}) RETURN v;"))
            .await?;
        for result in &results {
            for row in &result.data {
                for meta in &row.meta {
                    if let Some(id) = meta.get("id").and_then(serde_json::Value::as_str) {
                        ids.push(id.to_string());
                    }
                }
            }
        }
    }

    let mut vertices = vec!["id,attributes".to_string()];
    let mut edges = vec!["type,src,dst,rank,name,attributes".to_string()];
    for id in &ids {
        let results = graph
            .query(&format!(
                "USE {space};GET SUBGRAPH WITH PROP 1 STEPS FROM '{id}';"
            ))
            .await?;
        for result in &results {
            for row in &result.data {
                for (at, meta_group) in row.meta.iter().enumerate() {
                    let Some(metas) = meta_group.as_array() else {
                        continue;
                    };
                    let rows = row
                        .row
                        .get(at)
                        .and_then(serde_json::Value::as_array)
                        .cloned()
                        .unwrap_or_default();
                    for (i, meta) in metas.iter().enumerate() {
                        let attributes = rows
                            .get(i)
                            .map(ToString::to_string)
                            .unwrap_or_default();
                        match meta.get("type").and_then(serde_json::Value::as_str) {
                            Some("vertex") => {
                                let Some(vid) =
                                    meta.get("id").and_then(serde_json::Value::as_str)
                                else {
                                    continue;
                                };
                                vertices.push(format!("{vid},{attributes}"));
                            }
                            Some("edge") => {
                                let Some(eid) = meta.get("id") else { continue };
                                let kind =
                                    eid.get("type").and_then(serde_json::Value::as_i64).unwrap_or(0);
                                let src =
                                    eid.get("src").and_then(serde_json::Value::as_str).unwrap_or("");
                                let dst =
                                    eid.get("dst").and_then(serde_json::Value::as_str).unwrap_or("");
                                let name = eid
                                    .get("name")
                                    .and_then(serde_json::Value::as_str)
                                    .unwrap_or("");
                                let rank = eid
                                    .get("ranking")
                                    .and_then(serde_json::Value::as_i64)
                                    .unwrap_or(0);
                                edges.push(format!(
                                    "{kind},{src},{dst},{rank},{name},{attributes}"
                                ));
                            }
                            _ => {}
                        }
                    }
                }
            }
        }
    }

    let summary = ExportSummary {
        vertices: vertices.len() - 1,
        edges: edges.len() - 1,
    };
    tokio::fs::create_dir_all(base).await?;
    tokio::fs::write(
        base.join(format!("{space}_vertex.csv")),
        vertices.join("\n") + "\n",
    )
    .await?;
    tokio::fs::write(base.join(format!("{space}_edge.csv")), edges.join("\n") + "\n").await?;
    tracing::info!(
        space,
        vertices = summary.vertices,
        edges = summary.edges,
        "space exported"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RecordingGraph;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn query_endpoint_returns_ok_envelope() {
        let app = router(Arc::new(RecordingGraph::new()));
        let request = Request::builder()
            .method("POST")
            .uri("/graph/query")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"sql": "SHOW SPACES;"}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], 0);
        assert_eq!(json["message"], "ok");
    }

    #[tokio::test]
    async fn export_endpoint_writes_csv_headers() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(Arc::new(RecordingGraph::new()));
        let body = serde_json::json!({
            "space": "spaceA",
            "path": dir.path().to_str().unwrap(),
        });
        let request = Request::builder()
            .method("POST")
            .uri("/graph/export")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let vertex_csv =
            std::fs::read_to_string(dir.path().join("spaceA_vertex.csv")).unwrap();
        assert!(vertex_csv.starts_with("id,attributes"));
        let edge_csv = std::fs::read_to_string(dir.path().join("spaceA_edge.csv")).unwrap();
        assert!(edge_csv.starts_with("type,src,dst,rank,name,attributes"));
    }
}
