//! The wire boundary: a document-oriented search backend.
//!
//! Everything above this module builds queries as JSON; this module is the
//! only place that talks to a real index. The trait keeps the engine
//! testable against scripted backends, and the HTTP implementation makes
//! exactly one round trip per page fetch.

use serde::Serialize;
use serde_json::Value;

/// A backend problem, pre-sorted for operational tooling: "the index is
/// down" alerts differently from "the index rejected this query".
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The index cannot be reached at all.
    #[error("search backend unavailable: {0}")]
    Unavailable(String),
    /// The index answered, but refused the request.
    #[error("search backend rejected request: {0}")]
    Rejected(String),
}

/// One ranked hit from a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendHit {
    pub work_id: work_model::WorkId,
    pub score: Option<f64>,
    /// The hit's backend sort key; feeds cursor pagination.
    pub sort: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendResponse {
    pub hits: Vec<BackendHit>,
}

/// One document submitted for (re)indexing.
#[derive(Debug, Clone)]
pub struct BulkAction {
    pub id: String,
    pub document: Value,
}

/// A per-document bulk failure. `transient` distinguishes "try again"
/// from "this document is permanently malformed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkItemFailure {
    pub id: String,
    pub error: String,
    pub transient: bool,
}

/// Per-document outcome of one bulk submission. A failing document never
/// aborts the batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<BulkItemFailure>,
}

impl BulkOutcome {
    pub fn all_failed_transiently(&self) -> bool {
        self.succeeded.is_empty()
            && !self.failed.is_empty()
            && self.failed.iter().all(|f| f.transient)
    }
}

/// The engine's only external seam. Read queries are idempotent and safe
/// to retry; bulk indexing is not, and retry policy belongs to the caller.
pub trait SearchBackend: Send + Sync {
    /// Cheap connectivity check used at service construction.
    fn ping(&self) -> Result<(), BackendError>;
    /// Execute one search request body.
    fn search(&self, body: &Value) -> Result<BackendResponse, BackendError>;
    /// Submit a batch of documents, reporting per-document outcomes.
    fn bulk(&self, actions: &[BulkAction]) -> Result<BulkOutcome, BackendError>;
}

/// Painless source for the stored script named by
/// [`crate::filter::WORK_LAST_UPDATE_SCRIPT`]. A work's effective
/// last-update time is the latest of its bibliographic edit time, the
/// availability times of its pools in the collections named by
/// `params.collection_ids`, and its first appearances on the lists named
/// by `params.list_ids` — so updates in irrelevant collections and lists
/// never affect freshness ordering.
pub const WORK_LAST_UPDATE_SOURCE: &str = r#"
double champion = -1;
if (doc['last_update_time'].size() > 0) {
  champion = doc['last_update_time'].value;
}
if (params._source.licensepools != null && params.collection_ids != null) {
  for (pool in params._source.licensepools) {
    if (params.collection_ids.contains(pool.collection_id)
        && pool.availability_time != null
        && pool.availability_time > champion) {
      champion = pool.availability_time;
    }
  }
}
if (params._source.customlists != null && params.list_ids != null) {
  for (list in params._source.customlists) {
    if (params.list_ids.contains(list.list_id)
        && list.first_appearance != null
        && list.first_appearance > champion) {
      champion = list.first_appearance;
    }
  }
}
return champion;
"#;

/// Elasticsearch-compatible backend over HTTP.
pub struct ElasticsearchBackend {
    endpoint: String,
    index: String,
    agent: ureq::Agent,
}

impl ElasticsearchBackend {
    pub fn new(endpoint: impl Into<String>, index: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            index: index.into(),
            agent: ureq::AgentBuilder::new().build(),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Install (or replace) a stored script. Sort orders that need
    /// server-side computation reference scripts by name, so they must be
    /// provisioned before the first such query runs.
    pub fn put_stored_script(&self, name: &str, source: &str) -> Result<(), BackendError> {
        let url = format!("{}/_scripts/{}", self.endpoint, name);
        self.agent
            .put(&url)
            .set("Content-Type", "application/json")
            .send_json(serde_json::json!({
                "script": { "lang": "painless", "source": source },
            }))
            .map_err(Self::classify)?;
        Ok(())
    }

    fn classify(error: ureq::Error) -> BackendError {
        match error {
            ureq::Error::Transport(transport) => {
                BackendError::Unavailable(transport.to_string())
            }
            ureq::Error::Status(code, response) => {
                let body = response.into_string().unwrap_or_default();
                BackendError::Rejected(format!("HTTP {code}: {body}"))
            }
        }
    }
}

impl SearchBackend for ElasticsearchBackend {
    fn ping(&self) -> Result<(), BackendError> {
        self.agent
            .get(&self.endpoint)
            .call()
            .map_err(Self::classify)?;
        Ok(())
    }

    fn search(&self, body: &Value) -> Result<BackendResponse, BackendError> {
        let url = format!("{}/{}/_search", self.endpoint, self.index);
        tracing::debug!(index = %self.index, "executing search query");
        let response = self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_json(body.clone())
            .map_err(Self::classify)?;
        let parsed: Value = response
            .into_json()
            .map_err(|e| BackendError::Rejected(format!("unreadable response: {e}")))?;
        Ok(parse_search_response(&parsed))
    }

    fn bulk(&self, actions: &[BulkAction]) -> Result<BulkOutcome, BackendError> {
        if actions.is_empty() {
            return Ok(BulkOutcome::default());
        }
        let url = format!("{}/_bulk", self.endpoint);
        let mut payload = String::new();
        for action in actions {
            payload.push_str(
                &serde_json::json!({
                    "index": { "_index": self.index, "_id": action.id },
                })
                .to_string(),
            );
            payload.push('\n');
            payload.push_str(&action.document.to_string());
            payload.push('\n');
        }
        tracing::debug!(index = %self.index, documents = actions.len(), "bulk indexing");
        let response = self
            .agent
            .post(&url)
            .set("Content-Type", "application/x-ndjson")
            .send_string(&payload)
            .map_err(Self::classify)?;
        let parsed: Value = response
            .into_json()
            .map_err(|e| BackendError::Rejected(format!("unreadable response: {e}")))?;
        Ok(parse_bulk_response(&parsed))
    }
}

fn parse_search_response(body: &Value) -> BackendResponse {
    let mut out = BackendResponse::default();
    let Some(hits) = body["hits"]["hits"].as_array() else {
        return out;
    };
    for hit in hits {
        let work_id = hit["_source"]["work_id"]
            .as_i64()
            .or_else(|| hit["_id"].as_str().and_then(|id| id.parse().ok()));
        let Some(work_id) = work_id else { continue };
        out.hits.push(BackendHit {
            work_id,
            score: hit["_score"].as_f64(),
            sort: hit.get("sort").filter(|s| !s.is_null()).cloned(),
        });
    }
    out
}

fn parse_bulk_response(body: &Value) -> BulkOutcome {
    let mut outcome = BulkOutcome::default();
    let Some(items) = body["items"].as_array() else {
        return outcome;
    };
    for item in items {
        let result = item
            .get("index")
            .or_else(|| item.get("create"))
            .or_else(|| item.get("update"))
            .unwrap_or(item);
        let id = result["_id"].as_str().unwrap_or_default().to_string();
        let status = result["status"].as_u64().unwrap_or(0);
        if (200..300).contains(&status) {
            outcome.succeeded.push(id);
        } else {
            let error = &result["error"];
            let reason = error["reason"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            outcome.failed.push(BulkItemFailure {
                id,
                transient: is_transient(status, &reason),
                error: reason,
            });
        }
    }
    outcome
}

/// Overload and timeout failures are worth retrying; mapping and parsing
/// failures are not.
fn is_transient(status: u64, reason: &str) -> bool {
    if status == 429 || status == 503 {
        return true;
    }
    let reason = reason.to_lowercase();
    reason.contains("timeout") || reason.contains("rejected_execution")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_hits_map_to_work_ids_scores_and_sort_keys() {
        let response = parse_search_response(&json!({
            "hits": {"hits": [
                {"_id": "212", "_score": 12.5,
                 "_source": {"work_id": 212},
                 "sort": ["melville", "moby dick", 212]},
                {"_id": "213", "_score": 3.25, "_source": {"work_id": 213}},
            ]},
        }));
        assert_eq!(response.hits.len(), 2);
        assert_eq!(response.hits[0].work_id, 212);
        assert_eq!(
            response.hits[0].sort,
            Some(json!(["melville", "moby dick", 212]))
        );
        assert_eq!(response.hits[1].sort, None);
    }

    #[test]
    fn work_id_falls_back_to_the_document_id() {
        let response = parse_search_response(&json!({
            "hits": {"hits": [{"_id": "99", "_score": 1.0, "_source": {}}]},
        }));
        assert_eq!(response.hits[0].work_id, 99);
    }

    #[test]
    fn bulk_outcomes_are_partitioned_per_document() {
        let outcome = parse_bulk_response(&json!({
            "errors": true,
            "items": [
                {"index": {"_id": "1", "status": 201}},
                {"index": {"_id": "2", "status": 400,
                           "error": {"type": "mapper_parsing_exception",
                                     "reason": "failed to parse field"}}},
                {"index": {"_id": "3", "status": 429,
                           "error": {"type": "es_rejected_execution_exception",
                                     "reason": "queue full"}}},
            ],
        }));
        assert_eq!(outcome.succeeded, vec!["1"]);
        assert_eq!(
            outcome.failed,
            vec![
                BulkItemFailure {
                    id: "2".to_string(),
                    error: "failed to parse field".to_string(),
                    transient: false,
                },
                BulkItemFailure {
                    id: "3".to_string(),
                    error: "queue full".to_string(),
                    transient: true,
                },
            ]
        );
        assert!(!outcome.all_failed_transiently());
    }

    #[test]
    fn connection_timeouts_count_as_transient() {
        assert!(is_transient(200, "Connection Timeout!"));
        assert!(is_transient(503, "anything"));
        assert!(!is_transient(400, "failed to parse field"));
    }

    #[test]
    fn a_batch_of_only_transient_failures_is_retryable() {
        let outcome = BulkOutcome {
            succeeded: vec![],
            failed: vec![BulkItemFailure {
                id: "1".to_string(),
                error: "Connection Timeout!".to_string(),
                transient: true,
            }],
        };
        assert!(outcome.all_failed_transiently());
    }
}
