//! Builders for the JSON query language spoken by the search backend.
//!
//! Every function returns a plain `serde_json::Value` so query trees can be
//! composed, inspected in tests, and shipped over the wire without an
//! intermediate AST.

use serde_json::{json, Value};

/// Subdocument array paths. A clause against `licensepools.medium` must be
/// wrapped in a `nested` query; a clause against `medium` must not.
pub const NESTED_PATHS: [&str; 6] = [
    "licensepools",
    "genres",
    "customlists",
    "contributors",
    "identifiers",
    "classifications",
];

/// Exact match of a single field against a single value.
pub fn term(field: &str, value: impl Into<Value>) -> Value {
    let value: Value = value.into();
    json!({ "term": { field: value } })
}

/// Match any one of several values.
pub fn terms(field: &str, values: impl Into<Value>) -> Value {
    let values: Value = values.into();
    json!({ "terms": { field: values } })
}

/// Phrase match against an analyzed field.
pub fn match_phrase(field: &str, value: &str) -> Value {
    json!({ "match_phrase": { field: value } })
}

/// Loose match against an analyzed field.
pub fn match_query(field: &str, body: Value) -> Value {
    json!({ "match": { field: body } })
}

/// Range comparison, e.g. `range("target_age.upper", "gte", 5)`.
pub fn range(field: &str, operator: &str, value: impl Into<Value>) -> Value {
    let value: Value = value.into();
    json!({ "range": { field: { operator: value } } })
}

pub fn exists(field: &str) -> Value {
    json!({ "exists": { "field": field } })
}

/// Matches only documents with no value at all for `field`.
pub fn not_exists(field: &str) -> Value {
    json!({ "bool": { "must_not": [exists(field)] } })
}

pub fn match_all() -> Value {
    json!({ "match_all": {} })
}

pub fn match_none() -> Value {
    json!({ "match_none": {} })
}

/// Wrap a query so it is evaluated against each element of the subdocument
/// array at `path` independently.
pub fn nested(path: &str, query: Value) -> Value {
    json!({ "nested": { "path": path, "query": query } })
}

/// Pick the best-scoring query out of several. An empty hypothesis list
/// degenerates to match-everything, which is what a blank search means.
pub fn combine_hypotheses(hypotheses: Vec<Value>) -> Value {
    if hypotheses.is_empty() {
        match_all()
    } else {
        json!({ "dis_max": { "queries": hypotheses } })
    }
}

/// Returns the nested path owning `field`, if any.
pub fn nested_path_of(field: &str) -> Option<&'static str> {
    NESTED_PATHS
        .iter()
        .find(|path| {
            field.len() > path.len()
                && field.starts_with(*path)
                && field.as_bytes()[path.len()] == b'.'
        })
        .copied()
}

/// Wrap `query` in a nested query if (and only if) `field` lives in a
/// subdocument.
pub fn nestable(field: &str, query: Value) -> Value {
    match nested_path_of(field) {
        Some(path) => nested(path, query),
        None => query,
    }
}

/// Exact match helper that nests itself when the field requires it.
pub fn match_term(field: &str, value: impl Into<Value>) -> Value {
    nestable(field, term(field, value))
}

/// Incremental builder for `bool` queries; collects clauses and omits the
/// groups that stay empty.
#[derive(Debug, Default)]
pub struct BoolBuilder {
    must: Vec<Value>,
    should: Vec<Value>,
    must_not: Vec<Value>,
    filter: Vec<Value>,
    minimum_should_match: Option<u32>,
    boost: Option<f64>,
}

impl BoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, clause: Value) -> Self {
        self.must.push(clause);
        self
    }

    pub fn must_all(mut self, clauses: Vec<Value>) -> Self {
        self.must.extend(clauses);
        self
    }

    pub fn should(mut self, clause: Value) -> Self {
        self.should.push(clause);
        self
    }

    pub fn should_all(mut self, clauses: Vec<Value>) -> Self {
        self.should.extend(clauses);
        self
    }

    pub fn must_not(mut self, clause: Value) -> Self {
        self.must_not.push(clause);
        self
    }

    pub fn filter(mut self, clause: Value) -> Self {
        self.filter.push(clause);
        self
    }

    pub fn filter_all(mut self, clauses: Vec<Value>) -> Self {
        self.filter.extend(clauses);
        self
    }

    pub fn minimum_should_match(mut self, n: u32) -> Self {
        self.minimum_should_match = Some(n);
        self
    }

    pub fn boost(mut self, boost: f64) -> Self {
        self.boost = Some(boost);
        self
    }

    pub fn build(self) -> Value {
        let mut body = serde_json::Map::new();
        if !self.must.is_empty() {
            body.insert("must".into(), Value::Array(self.must));
        }
        if !self.should.is_empty() {
            body.insert("should".into(), Value::Array(self.should));
        }
        if !self.must_not.is_empty() {
            body.insert("must_not".into(), Value::Array(self.must_not));
        }
        if !self.filter.is_empty() {
            body.insert("filter".into(), Value::Array(self.filter));
        }
        if let Some(n) = self.minimum_should_match {
            body.insert("minimum_should_match".into(), n.into());
        }
        if let Some(b) = self.boost {
            body.insert("boost".into(), b.into());
        }
        json!({ "bool": Value::Object(body) })
    }
}

/// Convert one or more queries into a boosted query.
///
/// With several queries, only one has to match for the boost to apply
/// unless `all_must_match` is set. Extra `filters` are attached as
/// non-scoring conjuncts.
pub fn boost(weight: f64, queries: Vec<Value>, filters: Vec<Value>, all_must_match: bool) -> Value {
    let mut builder = BoolBuilder::new().boost(weight);
    if all_must_match || queries.len() == 1 {
        builder = builder.must_all(queries);
    } else {
        builder = builder.should_all(queries).minimum_should_match(1);
    }
    builder.filter_all(filters).build()
}
