//! The search facade: one entry point for querying and feeding the index.
//!
//! [`SearchService`] orchestrates the whole pipeline per request: parse
//! structure out of the free text, build the hypothesis query, compile the
//! filter, thread the pagination cursor, execute exactly one backend round
//! trip, and hand back ranked work ids plus the next cursor. It holds no
//! per-request state; the cursor is owned by the caller.

use std::sync::Arc;

use search_index::{
    BackendError, BackendHit, BulkAction, ConfigError, ElasticsearchBackend, EnglishLexicon,
    Filter, Lexicon, Query, SearchBackend, SearchConfig, SortKeyPagination,
    StandardUniversalFilters, UniversalFilters,
};
use serde_json::Value;
use work_model::{WorkDocument, WorkId};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The index could not be reached or initialized. Operationally this
    /// is "search is down", not "this query is wrong".
    #[error("error communicating with search index: {0}")]
    Configuration(String),
    /// The caller asked for something the engine cannot compile.
    #[error("invalid search request: {0}")]
    InvalidRequest(#[from] ConfigError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub endpoint: String,
    pub index: String,
    pub search: SearchConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9200".to_string(),
            index: "catalog-works".to_string(),
            search: SearchConfig::default(),
        }
    }
}

/// Per-document failure from a bulk indexing run. `transient` separates
/// "worth retrying later" from "this document is permanently malformed".
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct WorkFailure {
    pub work_id: WorkId,
    pub error: String,
    pub transient: bool,
}

/// Outcome of a bulk indexing run, partitioned per document.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct BulkReport {
    pub successes: Vec<WorkId>,
    pub failures: Vec<WorkFailure>,
}

pub struct SearchService {
    backend: Box<dyn SearchBackend>,
    search_config: SearchConfig,
    lexicon: Arc<dyn Lexicon>,
    universal: Box<dyn UniversalFilters>,
}

impl SearchService {
    /// Connect to an HTTP backend. A connectivity failure here is a
    /// configuration problem and fails fast.
    pub fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        let backend = ElasticsearchBackend::new(&config.endpoint, &config.index);
        // The scripted last-update sort references this by name; install
        // it up front so the first restricted feed does not 404.
        backend
            .put_stored_script(
                search_index::WORK_LAST_UPDATE_SCRIPT,
                search_index::WORK_LAST_UPDATE_SOURCE,
            )
            .map_err(|e| ServiceError::Configuration(e.to_string()))?;
        Self::with_backend(Box::new(backend), config.search)
    }

    /// Build against any backend; used by tests and embedded deployments.
    pub fn with_backend(
        backend: Box<dyn SearchBackend>,
        search_config: SearchConfig,
    ) -> Result<Self, ServiceError> {
        backend
            .ping()
            .map_err(|e| ServiceError::Configuration(e.to_string()))?;
        Ok(Self {
            backend,
            search_config,
            lexicon: Arc::new(EnglishLexicon::default()),
            universal: Box::new(StandardUniversalFilters),
        })
    }

    /// Swap the word knowledge used for fuzzy-match weighting.
    pub fn with_lexicon(mut self, lexicon: Arc<dyn Lexicon>) -> Self {
        self.lexicon = lexicon;
        self
    }

    /// Swap the always-applied index invariants.
    pub fn with_universal_filters(mut self, universal: Box<dyn UniversalFilters>) -> Self {
        self.universal = universal;
        self
    }

    /// Run one page of a search. Returns ranked hits and records the page
    /// on the cursor so the caller can derive the next one.
    pub fn query_works(
        &self,
        query_string: &str,
        filter: Option<&Filter>,
        pagination: &mut SortKeyPagination,
    ) -> Result<Vec<BackendHit>, ServiceError> {
        let query = Query::new(query_string, self.search_config.clone(), self.lexicon.as_ref());
        let body = query.build(filter, self.universal.as_ref(), Some(pagination))?;
        tracing::debug!(query = %query_string, size = pagination.size, "query_works");
        let response = self.backend.search(&body)?;
        let sort_keys: Vec<Value> = response
            .hits
            .iter()
            .map(|hit| hit.sort.clone().unwrap_or(Value::Null))
            .collect();
        pagination.page_loaded(&sort_keys);
        Ok(response.hits)
    }

    /// The raw search body for a request, without executing it. Useful for
    /// debugging relevance.
    pub fn search_body(
        &self,
        query_string: &str,
        filter: Option<&Filter>,
        pagination: Option<&SortKeyPagination>,
    ) -> Result<Value, ServiceError> {
        let query = Query::new(query_string, self.search_config.clone(), self.lexicon.as_ref());
        Ok(query.build(filter, self.universal.as_ref(), pagination)?)
    }

    /// Mirror a batch of works into the index.
    ///
    /// Every document gets an individual verdict; one malformed work never
    /// aborts the batch. A wholesale transient failure (the backend was
    /// unreachable, or every document bounced with a retryable error) is
    /// retried exactly once before the failures are considered durable.
    /// Works are indexed whether or not they are presentation-ready; the
    /// universal filters hide the unready ones at query time.
    pub fn bulk_update(&self, works: &[WorkDocument]) -> Result<BulkReport, ServiceError> {
        let mut report = BulkReport::default();
        let mut actions = Vec::with_capacity(works.len());
        for work in works {
            match serde_json::to_value(work) {
                Ok(document) => actions.push(BulkAction {
                    id: work.work_id.to_string(),
                    document,
                }),
                // A document we cannot even serialize is permanently
                // malformed; it must not poison the rest of the batch.
                Err(e) => report.failures.push(WorkFailure {
                    work_id: work.work_id,
                    error: e.to_string(),
                    transient: false,
                }),
            }
        }
        if actions.is_empty() {
            return Ok(report);
        }

        let outcome = match self.try_bulk(&actions) {
            Ok(outcome) if outcome.all_failed_transiently() => {
                tracing::warn!(
                    documents = actions.len(),
                    "bulk update failed transiently; retrying once"
                );
                self.try_bulk(&actions)?
            }
            Ok(outcome) => outcome,
            Err(BackendError::Unavailable(reason)) => {
                tracing::warn!(%reason, "bulk update could not reach index; retrying once");
                self.try_bulk(&actions)?
            }
            Err(other) => return Err(other.into()),
        };

        for id in outcome.succeeded {
            if let Ok(work_id) = id.parse() {
                report.successes.push(work_id);
            }
        }
        for failure in outcome.failed {
            if let Ok(work_id) = failure.id.parse() {
                report.failures.push(WorkFailure {
                    work_id,
                    error: failure.error,
                    transient: failure.transient,
                });
            }
        }
        Ok(report)
    }

    fn try_bulk(&self, actions: &[BulkAction]) -> Result<search_index::BulkOutcome, BackendError> {
        self.backend.bulk(actions)
    }
}
