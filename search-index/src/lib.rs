//! Query construction and filtering for the catalog search index.
//!
//! The crate turns a free-text query plus a [`Filter`] into one executable
//! request against an Elasticsearch-compatible backend: a dis-max of scored
//! hypotheses, a compiled boolean filter tree (main document plus nested
//! subdocument clauses), a deterministic sort order, and a sort-key
//! pagination cursor.

pub mod backend;
pub mod dsl;
pub mod facets;
pub mod filter;
pub mod lexicon;
pub mod pagination;
pub mod parser;
pub mod query;
pub mod vocab;

pub use backend::{
    BackendError, BackendHit, BackendResponse, BulkAction, BulkItemFailure, BulkOutcome,
    ElasticsearchBackend, SearchBackend, WORK_LAST_UPDATE_SOURCE,
};
pub use facets::{CollectionScope, FacetStrategy, FeaturedFacets, SearchFacets};
pub use filter::{
    and_chain, scrub, scrub_list, AuthorSpec, Availability, ConfigError, Filter, NestedFilters,
    NoUniversalFilters, RestrictionSet, SortOrder, StandardUniversalFilters, UniversalFilters,
    WORK_LAST_UPDATE_SCRIPT,
};
pub use lexicon::{EnglishLexicon, Lexicon};
pub use pagination::{InvalidPage, SortKeyPagination};
pub use parser::ParsedQuery;
pub use query::{display_name_to_sort_name, make_target_age_query, Query, SearchConfig};
