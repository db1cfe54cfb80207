//! # Local Tools
//!
//! The fixed registry of in-process tools. Each is an async function
//! `parameters -> Result<Value, String>`; the service turns the result into
//! the terminal TaskResult.

use serde_json::{json, Value};
use tracing::debug;

/// Invoke a local tool by name; `None` when the name is not a local tool
pub async fn run_local_tool(name: &str, parameters: &Value) -> Option<Result<Value, String>> {
    match name {
        "web_search" => Some(web_search(parameters).await),
        "web_scrape" => Some(web_scrape(parameters).await),
        "file_rw" => Some(file_rw(parameters).await),
        "local_file_retriever" => Some(local_file_retriever(parameters).await),
        _ => None,
    }
}

fn require_str<'a>(parameters: &'a Value, field: &str) -> Result<&'a str, String> {
    parameters
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("missing required parameter '{field}'"))
}

/// Offline search: deterministic result listing echoing the query. A
/// deployment wanting a real engine swaps this function for an API call.
async fn web_search(parameters: &Value) -> Result<Value, String> {
    let query = require_str(parameters, "query")?;
    let max_results = parameters
        .get("max_results")
        .and_then(Value::as_u64)
        .unwrap_or(3)
        .min(50) as usize;

    debug!(query, max_results, "web_search");
    let results: Vec<Value> = (1..=max_results)
        .map(|rank| {
            json!({
                "rank": rank,
                "title": format!("Result {rank} for {query}"),
                "url": format!("https://search.example/{rank}?q={}", query.replace(' ', "+")),
                "snippet": format!("Summary {rank} covering {query}."),
            })
        })
        .collect();

    Ok(json!({"query": query, "results": results}))
}

async fn web_scrape(parameters: &Value) -> Result<Value, String> {
    let url = require_str(parameters, "url")?;
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .map_err(|e| e.to_string())?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("fetch failed: {e}"))?;
    let status = response.status().as_u16();
    if !(200..300).contains(&status) {
        return Err(format!("fetch failed with status {status}"));
    }
    let body = response.text().await.map_err(|e| e.to_string())?;

    Ok(json!({"url": url, "status": status, "content": body}))
}

async fn file_rw(parameters: &Value) -> Result<Value, String> {
    let mode = require_str(parameters, "mode")?;
    let path = require_str(parameters, "path")?;

    match mode {
        "read" => {
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| format!("read failed: {e}"))?;
            Ok(json!({"path": path, "content": content}))
        }
        "write" | "append" => {
            let content = parameters
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| "missing required parameter 'content'".to_string())?;
            if mode == "write" {
                tokio::fs::write(path, content)
                    .await
                    .map_err(|e| format!("write failed: {e}"))?;
            } else {
                use tokio::io::AsyncWriteExt;
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await
                    .map_err(|e| format!("open failed: {e}"))?;
                file.write_all(content.as_bytes())
                    .await
                    .map_err(|e| format!("append failed: {e}"))?;
            }
            Ok(json!({"path": path, "bytes_written": content.len()}))
        }
        "delete" => {
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| format!("delete failed: {e}"))?;
            Ok(json!({"path": path, "deleted": true}))
        }
        other => Err(format!("unsupported mode '{other}'")),
    }
}

async fn local_file_retriever(parameters: &Value) -> Result<Value, String> {
    let path = require_str(parameters, "path")?;
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| format!("stat failed: {e}"))?;
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("read failed: {e}"))?;
    Ok(json!({
        "path": path,
        "size_bytes": metadata.len(),
        "content": content,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn web_search_echoes_query() {
        let result = run_local_tool("web_search", &json!({"query": "foo"}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result["query"], "foo");
        assert_eq!(result["results"].as_array().unwrap().len(), 3);
        assert!(result.to_string().contains("foo"));
    }

    #[tokio::test]
    async fn web_search_requires_query() {
        let err = run_local_tool("web_search", &json!({}))
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.contains("query"));
    }

    #[tokio::test]
    async fn file_rw_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        let path_str = path.to_str().unwrap();

        run_local_tool(
            "file_rw",
            &json!({"mode": "write", "path": path_str, "content": "hello"}),
        )
        .await
        .unwrap()
        .unwrap();

        let read = run_local_tool("file_rw", &json!({"mode": "read", "path": path_str}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read["content"], "hello");

        run_local_tool("file_rw", &json!({"mode": "delete", "path": path_str}))
            .await
            .unwrap()
            .unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn file_rw_append_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let path_str = path.to_str().unwrap();

        for chunk in ["one", "two"] {
            run_local_tool(
                "file_rw",
                &json!({"mode": "append", "path": path_str, "content": chunk}),
            )
            .await
            .unwrap()
            .unwrap();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "onetwo");
    }

    #[tokio::test]
    async fn local_file_retriever_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{\"k\": 1}").unwrap();

        let result = run_local_tool(
            "local_file_retriever",
            &json!({"path": path.to_str().unwrap()}),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(result["size_bytes"], 8);
        assert!(result["content"].as_str().unwrap().contains("\"k\""));
    }

    #[tokio::test]
    async fn unknown_name_is_none() {
        assert!(run_local_tool("nope", &json!({})).await.is_none());
    }
}
