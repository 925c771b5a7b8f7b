//! Search-index collaborators.
//!
//! The import pipeline hands each successfully committed file's
//! [`SearchDocument`]s to a [`SearchIndex`] in batches of
//! `[search].batch_size`, after deleting the identifiers that a reimport
//! made stale.
//!
//! | Provider | Backend |
//! |----------|---------|
//! | `disabled` | [`DisabledIndex`], nothing is indexed |
//! | `elasticsearch` | [`ElasticsearchIndex`], `POST {url}/_bulk` with NDJSON bodies |
//!
//! [`MemoryIndex`] keeps documents in a map and backs dry runs and tests.
//!
//! The Elasticsearch client retries HTTP 429, 5xx and network errors with
//! exponential backoff (1s, 2s, 4s, ... capped at 32s) up to
//! `max_retries` times; other 4xx responses fail immediately.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;

use crate::config::SearchConfig;
use crate::models::SearchDocument;

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Insert or replace documents keyed by `stable_id`.
    async fn bulk_upsert(&self, documents: &[SearchDocument]) -> Result<()>;

    /// Remove documents by stable identifier; unknown ids are ignored.
    async fn bulk_delete(&self, stable_ids: &[String]) -> Result<()>;
}

/// Build the index configured under `[search]`.
pub fn create_index(config: &SearchConfig) -> Result<Arc<dyn SearchIndex>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledIndex)),
        "elasticsearch" => Ok(Arc::new(ElasticsearchIndex::new(config)?)),
        other => bail!("unknown search provider: {}", other),
    }
}

/// Send `documents` in chunks of `batch_size`.
pub async fn upsert_in_batches(
    index: &dyn SearchIndex,
    documents: &[SearchDocument],
    batch_size: usize,
) -> Result<()> {
    for batch in documents.chunks(batch_size.max(1)) {
        index.bulk_upsert(batch).await?;
    }
    Ok(())
}

pub async fn delete_in_batches(
    index: &dyn SearchIndex,
    stable_ids: &[String],
    batch_size: usize,
) -> Result<()> {
    for batch in stable_ids.chunks(batch_size.max(1)) {
        index.bulk_delete(batch).await?;
    }
    Ok(())
}

pub struct DisabledIndex;

#[async_trait]
impl SearchIndex for DisabledIndex {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn bulk_upsert(&self, _documents: &[SearchDocument]) -> Result<()> {
        Ok(())
    }

    async fn bulk_delete(&self, _stable_ids: &[String]) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    documents: Arc<Mutex<BTreeMap<String, SearchDocument>>>,
    calls: Arc<Mutex<Vec<usize>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, stable_id: &str) -> Option<SearchDocument> {
        self.documents.lock().ok()?.get(stable_id).cloned()
    }

    /// Sizes of the upsert batches received so far.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    fn name(&self) -> &str {
        "memory"
    }

    async fn bulk_upsert(&self, documents: &[SearchDocument]) -> Result<()> {
        let mut map = self
            .documents
            .lock()
            .map_err(|_| anyhow!("memory index lock poisoned"))?;
        for doc in documents {
            map.insert(doc.stable_id.clone(), doc.clone());
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(documents.len());
        }
        Ok(())
    }

    async fn bulk_delete(&self, stable_ids: &[String]) -> Result<()> {
        let mut map = self
            .documents
            .lock()
            .map_err(|_| anyhow!("memory index lock poisoned"))?;
        for id in stable_ids {
            map.remove(id);
        }
        Ok(())
    }
}

pub struct ElasticsearchIndex {
    client: reqwest::Client,
    bulk_url: String,
    index_name: String,
    max_retries: u32,
}

impl ElasticsearchIndex {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("search.url required for elasticsearch"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(ElasticsearchIndex {
            client,
            bulk_url: format!("{}/_bulk", url.trim_end_matches('/')),
            index_name: config.index_name.clone(),
            max_retries: config.max_retries,
        })
    }

    fn upsert_body(&self, documents: &[SearchDocument]) -> Result<String> {
        let mut body = String::new();
        for doc in documents {
            let action = serde_json::json!({
                "index": { "_index": self.index_name, "_id": doc.stable_id }
            });
            body.push_str(&serde_json::to_string(&action)?);
            body.push('\n');
            body.push_str(&serde_json::to_string(doc).context("serializing search document")?);
            body.push('\n');
        }
        Ok(body)
    }

    fn delete_body(&self, stable_ids: &[String]) -> Result<String> {
        let mut body = String::new();
        for id in stable_ids {
            let action = serde_json::json!({
                "delete": { "_index": self.index_name, "_id": id }
            });
            body.push_str(&serde_json::to_string(&action)?);
            body.push('\n');
        }
        Ok(body)
    }

    /// POST an NDJSON body to `_bulk` with retry/backoff.
    async fn send_bulk(&self, body: String) -> Result<()> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, "retrying bulk request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.bulk_url)
                .header("Content-Type", "application/x-ndjson")
                .body(body.clone())
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return check_bulk_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow!("elasticsearch error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("elasticsearch error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("bulk request failed after retries")))
    }
}

/// Fail on the first item error of a `_bulk` response. Deleting a missing
/// document (404) is not an error.
fn check_bulk_response(json: &serde_json::Value) -> Result<()> {
    if !json.get("errors").and_then(|e| e.as_bool()).unwrap_or(false) {
        return Ok(());
    }
    let items = json
        .get("items")
        .and_then(|i| i.as_array())
        .ok_or_else(|| anyhow!("invalid bulk response: missing items"))?;

    for item in items {
        let Some((action, result)) = item.as_object().and_then(|o| o.iter().next()) else {
            continue;
        };
        let status = result.get("status").and_then(|s| s.as_u64()).unwrap_or(0);
        if status < 300 || (action == "delete" && status == 404) {
            continue;
        }
        let id = result.get("_id").and_then(|i| i.as_str()).unwrap_or("?");
        let reason = result
            .pointer("/error/reason")
            .and_then(|r| r.as_str())
            .unwrap_or("unknown error");
        bail!("bulk {} of {} failed ({}): {}", action, id, status, reason);
    }
    Ok(())
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    async fn bulk_upsert(&self, documents: &[SearchDocument]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let body = self.upsert_body(documents)?;
        self.send_bulk(body).await
    }

    async fn bulk_delete(&self, stable_ids: &[String]) -> Result<()> {
        if stable_ids.is_empty() {
            return Ok(());
        }
        let body = self.delete_body(stable_ids)?;
        self.send_bulk(body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn doc(id: &str) -> SearchDocument {
        SearchDocument {
            stable_id: id.into(),
            record_type: RecordKind::Component,
            category: "archives".into(),
            root_stable_id: "r".into(),
            parent_stable_id: None,
            path: vec![0],
            title: "T".into(),
            unitid: None,
            eadid: "E".into(),
            service_code: "S".into(),
            service_name: "S".into(),
            publisher: None,
            originators: Vec::new(),
            dates: None,
            index_entries: Vec::new(),
            digitized: false,
            scopecontent: None,
        }
    }

    fn es_config() -> SearchConfig {
        SearchConfig {
            provider: "elasticsearch".into(),
            url: Some("http://localhost:9200/".into()),
            ..SearchConfig::default()
        }
    }

    #[tokio::test]
    async fn batches_respect_batch_size() {
        let index = MemoryIndex::new();
        let docs: Vec<SearchDocument> = (0..65).map(|i| doc(&format!("d{}", i))).collect();
        upsert_in_batches(&index, &docs, 30).await.unwrap();
        assert_eq!(index.batch_sizes(), vec![30, 30, 5]);
        assert_eq!(index.len(), 65);

        delete_in_batches(&index, &["d0".to_string(), "nope".to_string()], 30)
            .await
            .unwrap();
        assert_eq!(index.len(), 64);
        assert!(index.get("d0").is_none());
    }

    #[test]
    fn bulk_bodies_are_ndjson() {
        let index = ElasticsearchIndex::new(&es_config()).unwrap();
        assert_eq!(index.bulk_url, "http://localhost:9200/_bulk");

        let body = index.upsert_body(&[doc("a"), doc("b")]).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 4);
        let action: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["index"]["_id"], "a");
        let source: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(source["record_type"], "component");
        assert!(body.ends_with('\n'));

        let body = index.delete_body(&["a".to_string()]).unwrap();
        assert!(body.starts_with(r#"{"delete":"#));
    }

    #[test]
    fn bulk_response_errors() {
        let ok = serde_json::json!({"errors": false, "items": []});
        assert!(check_bulk_response(&ok).is_ok());

        let missing = serde_json::json!({"errors": true, "items": [
            {"delete": {"_id": "a", "status": 404}}
        ]});
        assert!(check_bulk_response(&missing).is_ok());

        let failed = serde_json::json!({"errors": true, "items": [
            {"index": {"_id": "a", "status": 400, "error": {"reason": "mapper_parsing_exception"}}}
        ]});
        let err = check_bulk_response(&failed).unwrap_err().to_string();
        assert!(err.contains("mapper_parsing_exception"));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = SearchConfig {
            provider: "solr".into(),
            ..SearchConfig::default()
        };
        assert!(create_index(&config).is_err());
        assert_eq!(create_index(&SearchConfig::default()).unwrap().name(), "disabled");
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    /// One-shot HTTP server answering each connection with the next status
    /// of `statuses` (the last one repeats). Status 0 drops the connection.
    async fn bulk_server(statuses: Vec<u16>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let status = statuses[n.min(statuses.len() - 1)];
                if status == 0 {
                    drop(socket);
                    continue;
                }
                read_request(&mut socket).await;
                let body = if status == 200 {
                    r#"{"errors":false,"items":[]}"#
                } else {
                    r#"{"error":"unavailable"}"#
                };
                let response = format!(
                    "HTTP/1.1 {} Test\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{}", addr), hits)
    }

    fn index_at(url: String, max_retries: u32) -> ElasticsearchIndex {
        ElasticsearchIndex::new(&SearchConfig {
            provider: "elasticsearch".into(),
            url: Some(url),
            max_retries,
            timeout_secs: 5,
            ..SearchConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let (url, hits) = bulk_server(vec![503, 200]).await;
        let index = index_at(url, 1);
        index.bulk_upsert(&[doc("a")]).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retries_dropped_connections() {
        let (url, hits) = bulk_server(vec![0, 200]).await;
        let index = index_at(url, 1);
        index.bulk_delete(&["a".to_string()]).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_last_attempt() {
        let (url, hits) = bulk_server(vec![429]).await;
        let index = index_at(url, 1);
        let err = index.bulk_upsert(&[doc("a")]).await.unwrap_err().to_string();
        assert!(err.contains("429"), "{}", err);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (url, hits) = bulk_server(vec![400]).await;
        let index = index_at(url, 3);
        assert!(index.bulk_upsert(&[doc("a")]).await.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
