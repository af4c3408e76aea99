//! Free-text query construction.
//!
//! A search string is ambiguous: it might be a title, an author, a topic,
//! a quoted phrase, or a misspelling of any of those. Rather than guess,
//! [`Query`] generates one scored hypothesis per interpretation and lets
//! the backend rank each document by its single best hypothesis (dis-max,
//! never a sum: a book should not win just because many fields match
//! loosely).

use serde_json::{json, Value};

use crate::dsl::{
    boost, combine_hypotheses, match_all, match_phrase, match_query, nested, range, term,
    BoolBuilder,
};
use crate::filter::{ConfigError, Filter, UniversalFilters};
use crate::lexicon::Lexicon;
use crate::pagination::SortKeyPagination;
use crate::parser::ParsedQuery;
use work_model::roles;

/// Fields searched one at a time by the per-field hypotheses.
pub const SEARCHABLE_FIELDS: [&str; 5] = ["title", "subtitle", "series", "publisher", "imprint"];

/// Fields with a `.with_stopwords` variant worth testing when the query
/// itself contains stopwords ("the title of the book").
pub const STOPWORD_FIELDS: [&str; 3] = ["title", "subtitle", "series"];

/// Fields whose stemmed form is worth a (discounted) loose match.
pub const STEMMABLE_FIELDS: [&str; 3] = ["title", "subtitle", "series"];

/// Weights and knobs for hypothesis scoring. The numbers are empirically
/// tuned, not principled; they live here as configuration so deployments
/// can adjust them without touching query construction.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub title_weight: f64,
    pub subtitle_weight: f64,
    pub series_weight: f64,
    pub author_weight: f64,
    pub summary_weight: f64,
    pub publisher_weight: f64,
    pub imprint_weight: f64,
    /// Multiplier for an exact keyword match over the field baseline.
    pub keyword_multiplier: f64,
    /// Boost for the stopword-preserving phrase variant.
    pub slightly_above_baseline: f64,
    /// Discount for stemmed matches, which over-match.
    pub stemmed_multiplier: f64,
    /// Boost for hypotheses constrained by a parsed filter.
    pub parsed_filter_boost: f64,
    /// Fuzzy weight when every query word looks well-formed.
    pub reduced_fuzzy_coefficient: f64,
    /// Loose matches must agree on at least this many terms.
    pub min_terms_for_loose_match: u32,
    pub fuzziness: String,
    pub fuzzy_prefix_length: u32,
    /// Boost applied to a target-age range recognized in the query text.
    pub target_age_boost: f64,
    /// Field list for the residual simple-query-string match.
    pub simple_query_string_fields: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            title_weight: 140.0,
            subtitle_weight: 130.0,
            series_weight: 120.0,
            author_weight: 120.0,
            summary_weight: 80.0,
            publisher_weight: 40.0,
            imprint_weight: 40.0,
            keyword_multiplier: 1000.0,
            slightly_above_baseline: 1.1,
            stemmed_multiplier: 0.75,
            parsed_filter_boost: 1.1,
            reduced_fuzzy_coefficient: 0.5,
            min_terms_for_loose_match: 2,
            fuzziness: "AUTO".to_string(),
            fuzzy_prefix_length: 1,
            target_age_boost: 40.0,
            simple_query_string_fields: vec![
                "title^1".to_string(),
                "subtitle^3".to_string(),
                "series^1".to_string(),
                "author^4".to_string(),
                "summary^5".to_string(),
            ],
        }
    }
}

impl SearchConfig {
    /// Baseline weight for a field; contributor name fields score at the
    /// author weight.
    pub fn weight_for(&self, field: &str) -> f64 {
        match field {
            "title" => self.title_weight,
            "subtitle" => self.subtitle_weight,
            "series" => self.series_weight,
            "author" => self.author_weight,
            "summary" => self.summary_weight,
            "publisher" => self.publisher_weight,
            "imprint" => self.imprint_weight,
            "contributors.display_name" | "contributors.sort_name" => self.author_weight,
            _ => 1.0,
        }
    }
}

/// Scoring query matching works whose target age overlaps `range`. The
/// `must` half requires overlap; the `should` half grants extra credit
/// when the work's range fits entirely inside ours, so a narrower match
/// outranks a sprawling one.
pub fn make_target_age_query(age_range: (i64, i64), boost_weight: f64) -> Value {
    let (lower, upper) = age_range;
    BoolBuilder::new()
        .must(range("target_age.upper", "gte", lower))
        .must(range("target_age.lower", "lte", upper))
        .should(range("target_age.upper", "lte", upper))
        .should(range("target_age.lower", "gte", lower))
        .boost(boost_weight)
        .build()
}

/// Heuristic conversion of "Ursula Le Guin" into "Le Guin, Ursula".
/// Particles stay attached to the family name.
pub fn display_name_to_sort_name(display_name: &str) -> String {
    const PARTICLES: [&str; 10] = ["de", "la", "le", "van", "von", "der", "du", "den", "del", "di"];
    let words: Vec<&str> = display_name.split_whitespace().collect();
    if words.len() < 2 {
        return display_name.to_string();
    }
    let mut split = words.len() - 1;
    while split > 1 && PARTICLES.contains(&words[split - 1].to_lowercase().as_str()) {
        split -= 1;
    }
    format!("{}, {}", words[split..].join(" "), words[..split].join(" "))
}

/// One free-text query string, with the per-query word analysis computed
/// once at construction. Immutable afterwards.
#[derive(Debug, Clone)]
pub struct Query {
    query_string: String,
    config: SearchConfig,
    contains_stopwords: bool,
    fuzzy_coefficient: f64,
}

impl Query {
    pub fn new(query_string: &str, config: SearchConfig, lexicon: &dyn Lexicon) -> Self {
        let query_string = query_string.trim().to_string();
        let words = query_words(&query_string);
        let contains_stopwords = words.iter().any(|w| lexicon.is_stopword(w));
        let all_recognized = words.iter().all(|w| lexicon.is_recognized(w));
        // Fuzzy hypotheses earn full weight only when the query gives a
        // reason to doubt it is well-formed.
        let fuzzy_coefficient = if contains_stopwords || !all_recognized {
            1.0
        } else {
            config.reduced_fuzzy_coefficient
        };
        Self {
            query_string,
            config,
            contains_stopwords,
            fuzzy_coefficient,
        }
    }

    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    pub fn contains_stopwords(&self) -> bool {
        self.contains_stopwords
    }

    pub fn fuzzy_coefficient(&self) -> f64 {
        self.fuzzy_coefficient
    }

    fn word_count(&self) -> usize {
        query_words(&self.query_string).len()
    }

    /// The best-of-N-hypotheses relevance query. An empty string means the
    /// search is really just a filter, and matches everything.
    pub fn relevance_query(&self) -> Value {
        if self.query_string.is_empty() {
            return match_all();
        }
        let mut hypotheses = Vec::new();
        for field in SEARCHABLE_FIELDS {
            for (hypothesis, weight) in self.match_one_field_hypotheses(field, &self.query_string)
            {
                self.hypothesize(&mut hypotheses, hypothesis, weight, Vec::new());
            }
        }
        for (hypothesis, weight) in self.match_author_hypotheses() {
            self.hypothesize(&mut hypotheses, hypothesis, weight, Vec::new());
        }
        for (hypothesis, weight) in self.match_topic_hypotheses() {
            self.hypothesize(&mut hypotheses, hypothesis, weight, Vec::new());
        }
        for other_field in ["subtitle", "series", "author"] {
            for (hypothesis, weight) in self.title_multi_match_for(other_field) {
                self.hypothesize(&mut hypotheses, hypothesis, weight, Vec::new());
            }
        }
        if let Some((match_queries, filters)) = self.parsed_query_matches() {
            // The parsed interpretation scores slightly above its parts,
            // but only for works that also satisfy the parsed filter.
            hypotheses.push(boost(
                self.config.parsed_filter_boost,
                match_queries,
                filters,
                false,
            ));
        }
        combine_hypotheses(hypotheses)
    }

    fn hypothesize(
        &self,
        hypotheses: &mut Vec<Value>,
        hypothesis: Value,
        weight: f64,
        filters: Vec<Value>,
    ) {
        hypotheses.push(boost(weight, vec![hypothesis], filters, false));
    }

    /// Up to five hypotheses that the query targets a single field: exact
    /// keyword, phrase, fuzzy, stopword-preserving phrase, stemmed.
    pub fn match_one_field_hypotheses(
        &self,
        field: &str,
        query_string: &str,
    ) -> Vec<(Value, f64)> {
        let base_weight = self.config.weight_for(field);
        let mut out = Vec::new();
        out.push((
            term(&format!("{field}.keyword"), query_string),
            base_weight * self.config.keyword_multiplier,
        ));
        out.push((
            match_phrase(&format!("{field}.minimal"), query_string),
            base_weight,
        ));
        if self.fuzzy_coefficient > 0.0 {
            for (hypothesis, coefficient) in
                self.fuzzy_matches(&format!("{field}.minimal"), query_string)
            {
                out.push((hypothesis, base_weight * coefficient));
            }
        }
        if STOPWORD_FIELDS.contains(&field) && self.contains_stopwords {
            out.push((
                match_phrase(&format!("{field}.with_stopwords"), query_string),
                base_weight * self.config.slightly_above_baseline,
            ));
        }
        if STEMMABLE_FIELDS.contains(&field) {
            out.push((
                match_query(
                    field,
                    json!({
                        "query": query_string,
                        "minimum_should_match": self.config.min_terms_for_loose_match,
                    }),
                ),
                base_weight * self.config.stemmed_multiplier,
            ));
        }
        out
    }

    /// Fuzzy variants of a field match. A fuzzy match is loose, so at
    /// least two words of a multi-word query must participate.
    fn fuzzy_matches(&self, field: &str, query_string: &str) -> Vec<(Value, f64)> {
        vec![(
            match_query(
                field,
                json!({
                    "query": query_string,
                    "minimum_should_match": self.config.min_terms_for_loose_match,
                    "fuzziness": self.config.fuzziness,
                    "prefix_length": self.config.fuzzy_prefix_length,
                }),
            ),
            self.fuzzy_coefficient,
        )]
    }

    /// The query as an author name: as a display name, and as a sort name
    /// (converted heuristically unless it already looks like "Last, First").
    pub fn match_author_hypotheses(&self) -> Vec<(Value, f64)> {
        let mut out = Vec::new();
        out.extend(self.author_field_must_match("display_name", &self.query_string));
        let sort_name = if self.query_string.contains(',') {
            self.query_string.clone()
        } else {
            display_name_to_sort_name(&self.query_string)
        };
        out.extend(self.author_field_must_match("sort_name", &sort_name));
        out
    }

    fn author_field_must_match(&self, base_field: &str, query_string: &str) -> Vec<(Value, f64)> {
        self.match_one_field_hypotheses(&format!("contributors.{base_field}"), query_string)
            .into_iter()
            .map(|(hypothesis, weight)| (role_must_also_match(hypothesis), weight))
            .collect()
    }

    /// A topical query matches summary prose or classification terms with
    /// equal validity; score by whichever is stronger.
    pub fn match_topic_hypotheses(&self) -> Vec<(Value, f64)> {
        vec![(
            json!({
                "multi_match": {
                    "query": self.query_string,
                    "fields": ["summary", "classifications.term"],
                    "type": "best_fields",
                },
            }),
            self.config.summary_weight,
        )]
    }

    /// The query as title text plus text from another field. Only worth
    /// testing for multi-word queries, and weighted to land between a
    /// perfect single-field match and a weak one.
    pub fn title_multi_match_for(&self, other_field: &str) -> Vec<(Value, f64)> {
        if self.word_count() < 2 {
            return Vec::new();
        }
        let other_weight = self.config.weight_for(other_field);
        let weight = other_weight * (other_weight / self.config.title_weight);
        vec![(
            json!({
                "multi_match": {
                    "query": self.query_string,
                    "fields": [
                        "title.minimal",
                        format!("{other_field}.minimal"),
                    ],
                    "type": "cross_fields",
                    "operator": "and",
                    "minimum_should_match": "100%",
                },
            }),
            weight,
        )]
    }

    /// Structured interpretation of the query string, if the parser found
    /// one: `(scoring queries, filter fragments)`.
    pub fn parsed_query_matches(&self) -> Option<(Vec<Value>, Vec<Value>)> {
        let parsed = ParsedQuery::parse(&self.query_string, &self.config);
        if parsed.is_passthrough() {
            return None;
        }
        Some((parsed.match_queries, parsed.filters))
    }

    /// Assemble the executable search body: relevance query, compiled
    /// filter (main + universal + per-path nested), scoring functions,
    /// sort order, and the pagination window.
    pub fn build(
        &self,
        filter: Option<&Filter>,
        universal: &dyn UniversalFilters,
        pagination: Option<&SortKeyPagination>,
    ) -> Result<Value, ConfigError> {
        let mut bool_query = BoolBuilder::new().must(self.relevance_query());

        let (main, nested_filters) = match filter {
            Some(filter) => filter.build(),
            None => (None, crate::filter::NestedFilters::new()),
        };
        let mut base = None;
        if let Some(main) = main {
            base = crate::filter::and_chain(base, main);
        }
        if let Some(universal_base) = universal.base_filter() {
            base = crate::filter::and_chain(base, universal_base);
        }
        if let Some(base) = base {
            bool_query = bool_query.filter(base);
        }
        let universal_nested = universal.nested_filters();
        for (path, clauses) in nested_filters.iter().chain(universal_nested.iter()) {
            for clause in clauses {
                bool_query = bool_query.filter(nested(
                    path,
                    BoolBuilder::new().filter(clause.clone()).build(),
                ));
            }
        }

        let mut query = bool_query.build();
        if let Some(filter) = filter {
            if !filter.scoring_functions.is_empty() {
                query = json!({
                    "function_score": {
                        "query": query,
                        "functions": filter.scoring_functions,
                        "score_mode": "sum",
                    },
                });
            }
        }

        let mut body = json!({ "query": query });
        if let Some(filter) = filter {
            let sort = filter.sort_order()?;
            if !sort.is_empty() {
                body["sort"] = Value::Array(sort);
            }
            if !filter.script_fields.is_empty() {
                let fields: serde_json::Map<String, Value> = filter
                    .script_fields
                    .iter()
                    .map(|(name, definition)| (name.clone(), definition.clone()))
                    .collect();
                body["script_fields"] = Value::Object(fields);
            }
        }
        if let Some(pagination) = pagination {
            body["size"] = pagination.size.into();
            pagination.modify_search_query(&mut body);
        }
        Ok(body)
    }
}

/// Restrict a contributor-field hypothesis to contributions library
/// patrons actually search for, and nest it for per-contributor matching.
fn role_must_also_match(hypothesis: Value) -> Value {
    let restricted = BoolBuilder::new()
        .must(hypothesis)
        .must(crate::dsl::terms(
            "contributors.role",
            roles::AUTHOR_MATCH_ROLES.to_vec(),
        ))
        .build();
    nested("contributors", restricted)
}

fn query_words(query_string: &str) -> Vec<String> {
    query_string
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric() || *c == '\'')
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}
