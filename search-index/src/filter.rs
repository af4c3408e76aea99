//! The restriction model for one search, and its compiler.
//!
//! A [`Filter`] captures everything that narrows a result set without
//! scoring it: media, language, audience, fiction status, target age,
//! genre/list restriction sets, collection and data-source limits, author,
//! identifiers, and an update-time cutoff. `build()` compiles it into a
//! main-document clause plus per-path nested clauses, because license,
//! genre, list, contributor and identifier data live in nested subdocument
//! arrays and must be matched element-by-element.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use work_model::{medium, roles, IdentifierDoc, UNKNOWN_AUTHOR};

use crate::dsl::{match_all, match_none, nested, range, term, terms, BoolBuilder};

/// Stored script that computes a work's effective last-update time from the
/// bibliographic edit time plus the license-pool and list-appearance times
/// relevant to the active restrictions.
pub const WORK_LAST_UPDATE_SCRIPT: &str = "catalog.work_last_update";

/// Nested filter clauses grouped by subdocument path.
pub type NestedFilters = BTreeMap<&'static str, Vec<Value>>;

/// A caller bug: the request asked for something the engine cannot compile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("don't know how to sort by {0}")]
    UnsupportedSort(String),
}

/// Normalize a value the way the index normalizes its filterable keyword
/// fields: lowercased, all spaces removed. Idempotent.
pub fn scrub(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Scrub every value in a list, dropping empties.
pub fn scrub_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| scrub(v))
        .filter(|v| !v.is_empty())
        .collect()
}

/// AND-of-OR id restriction: a work must match at least one id from every
/// inner list. An empty outer list is no restriction at all; an empty
/// *inner* list demands zero matches in that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestrictionSet(Vec<Vec<i64>>);

impl RestrictionSet {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn new(sets: Vec<Vec<i64>>) -> Self {
        Self(sets)
    }

    /// Single conjunct: match any of `ids`.
    pub fn any_of(ids: Vec<i64>) -> Self {
        Self(vec![ids])
    }

    pub fn is_unrestricted(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sets(&self) -> &[Vec<i64>] {
        &self.0
    }

    pub fn push(&mut self, set: Vec<i64>) {
        self.0.push(set);
    }

    /// Union of every inner list, first appearance wins.
    pub fn all_ids(&self) -> Vec<i64> {
        let mut out = Vec::new();
        for set in &self.0 {
            for id in set {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
        }
        out
    }
}

/// Normalized contributor descriptor for an author restriction. At least
/// one populated field must match a contributor record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorSpec {
    pub sort_name: Option<String>,
    pub display_name: Option<String>,
    pub viaf: Option<String>,
    pub lc: Option<String>,
}

impl AuthorSpec {
    pub fn with_sort_name(name: impl Into<String>) -> Self {
        Self {
            sort_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_display_name(name: impl Into<String>) -> Self {
        Self {
            display_name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Which license pools count as "available" for this search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Everything a library owns, loanable right now or not.
    All,
    /// Open access or with a copy available for immediate loan.
    Now,
    /// Open-access pools only.
    OpenAccessOnly,
}

/// Logical sort orders, resolved against the index's physical fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortOrder {
    Title,
    Author,
    SeriesPosition,
    WorkId,
    AddedToCollection,
    LastUpdate,
    Random,
    /// Escape hatch for sorting on another scalar index field.
    Field(String),
}

impl SortOrder {
    fn field_name(&self) -> &str {
        match self {
            SortOrder::Title => "sort_title",
            SortOrder::Author => "sort_author",
            SortOrder::SeriesPosition => "series_position",
            SortOrder::WorkId => "work_id",
            SortOrder::AddedToCollection => "licensepools.availability_time",
            SortOrder::LastUpdate => "last_update_time",
            SortOrder::Random => "random",
            SortOrder::Field(name) => name,
        }
    }
}

/// Filters applied to every query regardless of the caller's restrictions.
/// Injected so tests can run without them instead of patching shared state.
pub trait UniversalFilters: Send + Sync {
    /// Restriction on the main document.
    fn base_filter(&self) -> Option<Value>;
    /// Restrictions per nested subdocument path.
    fn nested_filters(&self) -> NestedFilters;
}

/// The invariants of the production index: works must be presentation
/// ready, and a license pool only counts if it is not suppressed and is
/// either open access or currently licensed.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardUniversalFilters;

impl UniversalFilters for StandardUniversalFilters {
    fn base_filter(&self) -> Option<Value> {
        Some(term("presentation_ready", true))
    }

    fn nested_filters(&self) -> NestedFilters {
        let currently_owned = BoolBuilder::new()
            .should(term("licensepools.licensed", true))
            .should(term("licensepools.open_access", true))
            .build();
        let mut nested = NestedFilters::new();
        nested.insert(
            "licensepools",
            vec![term("licensepools.suppressed", false), currently_owned],
        );
        nested
    }
}

/// No universal restrictions; for tests and offline tooling.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoUniversalFilters;

impl UniversalFilters for NoUniversalFilters {
    fn base_filter(&self) -> Option<Value> {
        None
    }

    fn nested_filters(&self) -> NestedFilters {
        NestedFilters::new()
    }
}

/// Combine filter clauses with logical AND. The reducer used by
/// [`Filter::build`]; swappable for tests and batching.
pub fn and_chain(acc: Option<Value>, clause: Value) -> Option<Value> {
    match acc {
        None => Some(clause),
        Some(mut existing) => {
            if let Some(must) = existing
                .get_mut("bool")
                .and_then(|b| b.get_mut("must"))
                .and_then(|m| m.as_array_mut())
            {
                must.push(clause);
                return Some(existing);
            }
            Some(BoolBuilder::new().must(existing).must(clause).build())
        }
    }
}

/// Everything that restricts or biases one search. Constructed fresh per
/// request, compiled once, then discarded.
#[derive(Debug, Clone)]
pub struct Filter {
    pub media: Vec<String>,
    pub languages: Vec<String>,
    /// Tri-state: `Some(true)` fiction only, `Some(false)` nonfiction only.
    pub fiction: Option<bool>,
    pub audiences: Vec<String>,
    /// Inclusive age range; either bound may be absent.
    pub target_age: Option<(Option<i64>, Option<i64>)>,
    pub genre_restriction_sets: RestrictionSet,
    pub customlist_restriction_sets: RestrictionSet,
    /// `None` is unrestricted. `Some(vec![])` matches nothing: a caller
    /// scoped to a library that owns no collections sees an empty catalog.
    pub collection_ids: Option<Vec<i64>>,
    pub license_datasources: Option<Vec<i64>>,
    /// Data sources whose audiobook pools are excluded outright.
    pub excluded_audiobook_data_sources: Vec<i64>,
    /// When false, only immediately-available or open-access pools qualify.
    pub allow_holds: bool,
    pub identifiers: Vec<IdentifierDoc>,
    pub updated_after: Option<DateTime<Utc>>,
    pub author: Option<AuthorSpec>,
    /// Escape hatch forcing an empty result set.
    pub match_nothing: bool,
    pub availability: Option<Availability>,
    /// Main-document quality floor (featured-collection scope).
    pub min_quality: Option<f64>,
    /// Hide open-access pools below this quality (main-collection scope).
    pub exclude_low_quality_open_access: Option<f64>,
    pub order: Option<SortOrder>,
    pub order_ascending: bool,
    /// Scoring functions injected by a facet policy; they bias ranking
    /// without restricting membership.
    pub scoring_functions: Vec<Value>,
    pub script_fields: BTreeMap<String, Value>,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            media: Vec::new(),
            languages: Vec::new(),
            fiction: None,
            audiences: Vec::new(),
            target_age: None,
            genre_restriction_sets: RestrictionSet::none(),
            customlist_restriction_sets: RestrictionSet::none(),
            collection_ids: None,
            license_datasources: None,
            excluded_audiobook_data_sources: Vec::new(),
            allow_holds: true,
            identifiers: Vec::new(),
            updated_after: None,
            author: None,
            match_nothing: false,
            availability: None,
            min_quality: None,
            exclude_low_quality_open_access: None,
            order: None,
            order_ascending: false,
            scoring_functions: Vec::new(),
            script_fields: BTreeMap::new(),
        }
    }
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a raw target-age request so lower <= upper.
    pub fn set_target_age(&mut self, lower: Option<i64>, upper: Option<i64>) {
        self.target_age = match (lower, upper) {
            (None, None) => None,
            (Some(lo), Some(hi)) if lo > hi => Some((Some(hi), Some(lo))),
            other => Some(other),
        };
    }

    /// Compile with the default AND reducer.
    pub fn build(&self) -> (Option<Value>, NestedFilters) {
        self.build_with(and_chain)
    }

    /// Compile into `(main_filter, nested_filters)`, combining the
    /// main-document clauses through `chain`.
    pub fn build_with<C>(&self, mut chain: C) -> (Option<Value>, NestedFilters)
    where
        C: FnMut(Option<Value>, Value) -> Option<Value>,
    {
        let mut nested_filters = NestedFilters::new();
        if self.match_nothing {
            return (Some(match_none()), nested_filters);
        }

        let mut main = None;
        let media = scrub_list(&self.media);
        if !media.is_empty() {
            main = chain(main, terms("medium", media));
        }
        let languages = scrub_list(&self.languages);
        if !languages.is_empty() {
            main = chain(main, terms("language", languages));
        }
        if let Some(fiction) = self.fiction {
            let value = if fiction { "fiction" } else { "nonfiction" };
            main = chain(main, term("fiction", value));
        }
        let audiences = scrub_list(&self.audiences);
        if !audiences.is_empty() {
            main = chain(main, terms("audience", audiences));
        }
        if let Some(age) = self.target_age_filter() {
            main = chain(main, age);
        }
        if let Some(quality) = self.min_quality {
            main = chain(main, BoolBuilder::new().must(range("quality", "gte", quality)).build());
        }
        if let Some(after) = self.updated_after {
            main = chain(
                main,
                BoolBuilder::new()
                    .must(range("last_update_time", "gte", after.timestamp()))
                    .build(),
            );
        }

        let pools = self.licensepool_filters();
        if !pools.is_empty() {
            nested_filters.insert("licensepools", pools);
        }

        main = self.restriction_set_filters(
            main,
            &mut chain,
            &mut nested_filters,
            "genres",
            "genres.term",
            &self.genre_restriction_sets,
        );
        main = self.restriction_set_filters(
            main,
            &mut chain,
            &mut nested_filters,
            "customlists",
            "customlists.list_id",
            &self.customlist_restriction_sets,
        );

        if let Some(author) = self.author_filter() {
            nested_filters.entry("contributors").or_default().push(author);
        }
        if let Some(identifiers) = self.identifier_filter() {
            nested_filters.entry("identifiers").or_default().push(identifiers);
        }

        (main, nested_filters)
    }

    fn licensepool_filters(&self) -> Vec<Value> {
        let mut pools = Vec::new();
        if let Some(ids) = &self.collection_ids {
            pools.push(terms("licensepools.collection_id", ids.clone()));
        }
        if let Some(ids) = &self.license_datasources {
            pools.push(terms("licensepools.data_source_id", ids.clone()));
        }
        if !self.excluded_audiobook_data_sources.is_empty() {
            let excluded_audio = BoolBuilder::new()
                .must(term("licensepools.medium", medium::AUDIO))
                .must(terms(
                    "licensepools.data_source_id",
                    self.excluded_audiobook_data_sources.clone(),
                ))
                .build();
            pools.push(BoolBuilder::new().must_not(excluded_audio).build());
        }
        if !self.allow_holds {
            pools.push(
                BoolBuilder::new()
                    .should(term("licensepools.available", true))
                    .should(term("licensepools.open_access", true))
                    .build(),
            );
        }
        match self.availability {
            Some(Availability::Now) => pools.push(
                BoolBuilder::new()
                    .should(term("licensepools.open_access", true))
                    .should(term("licensepools.available", true))
                    .minimum_should_match(1)
                    .build(),
            ),
            Some(Availability::OpenAccessOnly) => {
                pools.push(term("licensepools.open_access", true));
            }
            Some(Availability::All) | None => {}
        }
        if let Some(quality) = self.exclude_low_quality_open_access {
            pools.push(
                BoolBuilder::new()
                    .should(term("licensepools.open_access", false))
                    .should(range("licensepools.quality", "gte", quality))
                    .build(),
            );
        }
        pools
    }

    /// One nested clause per inner list keeps the AND-of-OR intent intact
    /// under nesting. The empty inner list ("must have none") cannot be
    /// expressed from inside a nested context, so it becomes a main-filter
    /// prohibition on having any such subdocument.
    fn restriction_set_filters<C>(
        &self,
        mut main: Option<Value>,
        chain: &mut C,
        nested_filters: &mut NestedFilters,
        path: &'static str,
        id_field: &'static str,
        restrictions: &RestrictionSet,
    ) -> Option<Value>
    where
        C: FnMut(Option<Value>, Value) -> Option<Value>,
    {
        for set in restrictions.sets() {
            if set.is_empty() {
                let has_any = nested(path, match_all());
                main = chain(main, BoolBuilder::new().must_not(has_any).build());
            } else {
                nested_filters
                    .entry(path)
                    .or_default()
                    .push(terms(id_field, set.clone()));
            }
        }
        main
    }

    /// Target-age overlap: the work's upper bound must reach our lower
    /// bound (or be absent), AND its lower bound must not exceed our upper
    /// bound (or be absent). Works with no age metadata match everything.
    pub fn target_age_filter(&self) -> Option<Value> {
        let (lower, upper) = self.target_age?;
        let old_enough = lower.map(|lo| {
            BoolBuilder::new()
                .should(range("target_age.upper", "gte", lo))
                .should(crate::dsl::not_exists("target_age.upper"))
                .minimum_should_match(1)
                .build()
        });
        let young_enough = upper.map(|hi| {
            BoolBuilder::new()
                .should(range("target_age.lower", "lte", hi))
                .should(crate::dsl::not_exists("target_age.lower"))
                .minimum_should_match(1)
                .build()
        });
        match (old_enough, young_enough) {
            (Some(lo), Some(hi)) => Some(BoolBuilder::new().must(hi).must(lo).build()),
            (Some(single), None) | (None, Some(single)) => Some(single),
            (None, None) => None,
        }
    }

    /// Authorship filter on the `contributors` subdocument: the role must
    /// be an authorship role AND at least one identifying field must match.
    /// The `[Unknown]` sentinel never counts as a name match; an author
    /// about whom nothing is known legitimately matches no books.
    pub fn author_filter(&self) -> Option<Value> {
        let author = self.author.as_ref()?;
        let mut identity = Vec::new();
        if let Some(name) = &author.sort_name {
            if name != UNKNOWN_AUTHOR {
                identity.push(term("contributors.sort_name.keyword", name.clone()));
            }
        }
        if let Some(name) = &author.display_name {
            if name != UNKNOWN_AUTHOR {
                identity.push(term("contributors.display_name.keyword", name.clone()));
            }
        }
        if let Some(viaf) = &author.viaf {
            identity.push(term("contributors.viaf", viaf.clone()));
        }
        if let Some(lc) = &author.lc {
            identity.push(term("contributors.lc", lc.clone()));
        }
        let role_match = terms("contributors.role", roles::AUTHOR_MATCH_ROLES.to_vec());
        let identity_match = BoolBuilder::new()
            .should_all(identity)
            .minimum_should_match(1)
            .build();
        Some(BoolBuilder::new().must(role_match).must(identity_match).build())
    }

    fn identifier_filter(&self) -> Option<Value> {
        if self.identifiers.is_empty() {
            return None;
        }
        let subclauses = self
            .identifiers
            .iter()
            .map(|id| {
                BoolBuilder::new()
                    .must(term("identifiers.identifier", id.identifier.clone()))
                    .must(term("identifiers.type", id.identifier_type.clone()))
                    .build()
            })
            .collect();
        Some(
            BoolBuilder::new()
                .should_all(subclauses)
                .minimum_should_match(1)
                .build(),
        )
    }

    /// Resolve the requested ordering into backend sort clauses, primary
    /// field first, terminated by fixed tiebreakers so any two works are
    /// totally ordered and cursor pagination stays well-defined.
    pub fn sort_order(&self) -> Result<Vec<Value>, ConfigError> {
        let order = match &self.order {
            None => return Ok(Vec::new()),
            Some(order) => order,
        };
        let direction = if self.order_ascending { "asc" } else { "desc" };

        let primary_field = order.field_name().to_string();
        let primary = match order {
            SortOrder::AddedToCollection => self.availability_time_sort(direction),
            SortOrder::LastUpdate => self.last_update_sort(direction),
            other => {
                let field = other.field_name();
                if field.contains('.') {
                    return Err(ConfigError::UnsupportedSort(field.to_string()));
                }
                serde_json::json!({ field: direction })
            }
        };

        let mut out = vec![primary];
        let tiebreakers: &[&str] = if matches!(order, SortOrder::SeriesPosition) {
            &["sort_title", "sort_author", "work_id"]
        } else {
            &["sort_author", "sort_title", "work_id"]
        };
        for field in tiebreakers {
            if *field != primary_field {
                out.push(serde_json::json!({ field: "asc" }));
            }
        }
        Ok(out)
    }

    /// "Added to collection" needs an aggregate: the earliest availability
    /// time across the work's pools, and when a collection restriction is
    /// active, only pools inside those collections may contribute.
    fn availability_time_sort(&self, direction: &str) -> Value {
        let mut config = serde_json::json!({ "mode": "min", "order": direction });
        if let Some(ids) = &self.collection_ids {
            if !ids.is_empty() {
                config["nested"] = serde_json::json!({
                    "path": "licensepools",
                    "filter": { "terms": { "licensepools.collection_id": ids } },
                });
            }
        }
        serde_json::json!({ "licensepools.availability_time": config })
    }

    /// "Last update" is a plain field sort until collections or lists are
    /// in play; then the true value depends on which pools and lists are
    /// relevant, and a stored server-side script computes it per document.
    fn last_update_sort(&self, direction: &str) -> Value {
        let has_collections = self
            .collection_ids
            .as_ref()
            .map(|ids| !ids.is_empty())
            .unwrap_or(false);
        let has_lists = !self.customlist_restriction_sets.is_unrestricted();
        if !has_collections && !has_lists {
            return serde_json::json!({ "last_update_time": direction });
        }
        serde_json::json!({
            "_script": {
                "order": direction,
                "type": "number",
                "script": {
                    "stored": WORK_LAST_UPDATE_SCRIPT,
                    "params": {
                        "collection_ids": self.collection_ids.clone().unwrap_or_default(),
                        "list_ids": self.customlist_restriction_sets.all_ids(),
                    },
                },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    /// A chain that collects clauses into a flat list so tests can inspect
    /// each small filter instead of one merged bool tree.
    fn list_chain(acc: Option<Value>, clause: Value) -> Option<Value> {
        match acc {
            None => Some(Value::Array(vec![clause])),
            Some(Value::Array(mut list)) => {
                list.push(clause);
                Some(Value::Array(list))
            }
            Some(other) => Some(Value::Array(vec![other, clause])),
        }
    }

    #[test]
    fn scrub_lowercases_and_strips_spaces_idempotently() {
        assert_eq!(scrub("foo"), "foo");
        assert_eq!(scrub("Young Adult"), "youngadult");
        assert_eq!(scrub(&scrub("Young Adult")), "youngadult");
    }

    #[test]
    fn scrub_list_handles_scalars_and_empties() {
        assert_eq!(scrub_list(&[]), Vec::<String>::new());
        assert_eq!(
            scrub_list(&["Young Adult".to_string(), "Adult".to_string()]),
            vec!["youngadult".to_string(), "adult".to_string()]
        );
    }

    #[test]
    fn empty_filter_builds_nothing() {
        let filter = Filter::new();
        let (main, nested) = filter.build();
        assert_eq!(main, None);
        assert!(nested.is_empty());
    }

    #[test]
    fn media_and_language_chain_into_a_conjunction() {
        let mut filter = Filter::new();
        filter.media = vec!["a medium".to_string()];
        let (main, nested) = filter.build();
        let medium_built = json!({"terms": {"medium": ["amedium"]}});
        assert_eq!(main, Some(medium_built.clone()));
        assert!(nested.is_empty());

        filter.languages = vec!["lang1".to_string(), "LANG2".to_string()];
        let (main, _) = filter.build();
        let language_built = json!({"terms": {"language": ["lang1", "lang2"]}});
        assert_eq!(
            main,
            Some(json!({"bool": {"must": [medium_built, language_built]}}))
        );
    }

    #[test]
    fn fully_loaded_filter_splits_main_and_nested_clauses() {
        let mut filter = Filter::new();
        filter.media = vec!["a medium".to_string()];
        filter.languages = vec!["lang1".to_string(), "LANG2".to_string()];
        filter.collection_ids = Some(vec![60]);
        filter.fiction = Some(true);
        filter.audiences = vec!["CHILDREN".to_string()];
        filter.set_target_age(Some(2), Some(3));
        filter.excluded_audiobook_data_sources = vec![4];
        filter.allow_holds = false;
        filter.license_datasources = Some(vec![4]);
        filter.author = Some(AuthorSpec::with_sort_name("Ebrity, Sel"));
        filter.genre_restriction_sets = RestrictionSet::new(vec![vec![10], vec![11, 12]]);
        filter.customlist_restriction_sets = RestrictionSet::new(vec![vec![20], vec![21]]);
        filter.identifiers = vec![
            IdentifierDoc {
                identifier_type: "ISBN".to_string(),
                identifier: "i1".to_string(),
            },
            IdentifierDoc {
                identifier_type: "Overdrive ID".to_string(),
                identifier: "i2".to_string(),
            },
        ];
        filter.updated_after = Some(Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap());

        let (main, mut nested) = filter.build_with(list_chain);

        let pools = nested.remove("licensepools").expect("licensepool filters");
        assert_eq!(
            pools[0],
            json!({"terms": {"licensepools.collection_id": [60]}})
        );
        assert_eq!(
            pools[1],
            json!({"terms": {"licensepools.data_source_id": [4]}})
        );
        let excluded_audio = json!({"bool": {"must": [
            {"term": {"licensepools.medium": "Audio"}},
            {"terms": {"licensepools.data_source_id": [4]}},
        ]}});
        assert_eq!(pools[2], json!({"bool": {"must_not": [excluded_audio]}}));
        assert_eq!(
            pools[3],
            json!({"bool": {"should": [
                {"term": {"licensepools.available": true}},
                {"term": {"licensepools.open_access": true}},
            ]}})
        );
        assert_eq!(pools.len(), 4);

        let genres = nested.remove("genres").expect("genre filters");
        assert_eq!(
            genres,
            vec![
                json!({"terms": {"genres.term": [10]}}),
                json!({"terms": {"genres.term": [11, 12]}}),
            ]
        );

        let lists = nested.remove("customlists").expect("list filters");
        assert_eq!(
            lists,
            vec![
                json!({"terms": {"customlists.list_id": [20]}}),
                json!({"terms": {"customlists.list_id": [21]}}),
            ]
        );

        let contributors = nested.remove("contributors").expect("author filter");
        assert_eq!(contributors, vec![filter.author_filter().unwrap()]);

        let identifiers = nested.remove("identifiers").expect("identifier filter");
        assert_eq!(
            identifiers,
            vec![json!({"bool": {
                "should": [
                    {"bool": {"must": [
                        {"term": {"identifiers.identifier": "i1"}},
                        {"term": {"identifiers.type": "ISBN"}},
                    ]}},
                    {"bool": {"must": [
                        {"term": {"identifiers.identifier": "i2"}},
                        {"term": {"identifiers.type": "Overdrive ID"}},
                    ]}},
                ],
                "minimum_should_match": 1,
            }})]
        );
        assert!(nested.is_empty());

        let main = main.expect("main filter");
        let clauses = main.as_array().expect("list chain output");
        assert_eq!(clauses[0], json!({"terms": {"medium": ["amedium"]}}));
        assert_eq!(
            clauses[1],
            json!({"terms": {"language": ["lang1", "lang2"]}})
        );
        assert_eq!(clauses[2], json!({"term": {"fiction": "fiction"}}));
        assert_eq!(clauses[3], json!({"terms": {"audience": ["children"]}}));
        assert_eq!(clauses[4], filter.target_age_filter().unwrap());
        // 2019-01-01 as seconds since epoch.
        assert_eq!(
            clauses[5],
            json!({"bool": {"must": [
                {"range": {"last_update_time": {"gte": 1_546_300_800}}}
            ]}})
        );
        assert_eq!(clauses.len(), 6);
    }

    #[test]
    fn nonfiction_compiles_to_its_scrubbed_term() {
        let mut filter = Filter::new();
        filter.fiction = Some(false);
        let (main, _) = filter.build();
        assert_eq!(main, Some(json!({"term": {"fiction": "nonfiction"}})));
    }

    #[test]
    fn match_nothing_short_circuits_everything_else() {
        let mut filter = Filter::new();
        filter.fiction = Some(true);
        filter.collection_ids = Some(vec![1]);
        filter.match_nothing = true;
        let (main, nested) = filter.build();
        assert_eq!(main, Some(json!({"match_none": {}})));
        assert!(nested.is_empty());
    }

    #[test]
    fn empty_inner_restriction_list_requires_zero_subdocuments() {
        let mut filter = Filter::new();
        filter.genre_restriction_sets = RestrictionSet::new(vec![vec![]]);
        let (main, nested) = filter.build();
        assert!(nested.is_empty());
        assert_eq!(
            main,
            Some(json!({"bool": {"must_not": [
                {"nested": {"path": "genres", "query": {"match_all": {}}}}
            ]}}))
        );
    }

    #[test]
    fn empty_collection_list_is_a_restriction_but_none_is_not() {
        let mut filter = Filter::new();
        filter.collection_ids = Some(vec![]);
        let (_, nested) = filter.build();
        assert_eq!(
            nested["licensepools"],
            vec![json!({"terms": {"licensepools.collection_id": []}})]
        );

        filter.collection_ids = None;
        let (main, nested) = filter.build();
        assert_eq!(main, None);
        assert!(nested.is_empty());
    }

    #[test]
    fn target_age_filter_tolerates_missing_metadata() {
        let mut filter = Filter::new();
        filter.set_target_age(Some(2), Some(5));
        let built = filter.target_age_filter().expect("age filter");
        assert_eq!(
            built,
            json!({"bool": {"must": [
                {"bool": {"should": [
                    {"range": {"target_age.lower": {"lte": 5}}},
                    {"bool": {"must_not": [{"exists": {"field": "target_age.lower"}}]}},
                ], "minimum_should_match": 1}},
                {"bool": {"should": [
                    {"range": {"target_age.upper": {"gte": 2}}},
                    {"bool": {"must_not": [{"exists": {"field": "target_age.upper"}}]}},
                ], "minimum_should_match": 1}},
            ]}})
        );

        // "Ten and under": only the lower bound of the work matters.
        filter.set_target_age(None, Some(10));
        assert_eq!(
            filter.target_age_filter().unwrap(),
            json!({"bool": {"should": [
                {"range": {"target_age.lower": {"lte": 10}}},
                {"bool": {"must_not": [{"exists": {"field": "target_age.lower"}}]}},
            ], "minimum_should_match": 1}})
        );

        // "Twelve and up".
        filter.set_target_age(Some(12), None);
        assert_eq!(
            filter.target_age_filter().unwrap(),
            json!({"bool": {"should": [
                {"range": {"target_age.upper": {"gte": 12}}},
                {"bool": {"must_not": [{"exists": {"field": "target_age.upper"}}]}},
            ], "minimum_should_match": 1}})
        );

        filter.target_age = None;
        assert_eq!(filter.target_age_filter(), None);
        filter.set_target_age(None, None);
        assert_eq!(filter.target_age_filter(), None);
    }

    #[test]
    fn author_filter_requires_role_and_identity() {
        let mut filter = Filter::new();
        assert_eq!(filter.author_filter(), None);

        filter.author = Some(AuthorSpec {
            display_name: Some("Ann Leckie".to_string()),
            sort_name: Some("Leckie, Ann".to_string()),
            viaf: Some("73520345".to_string()),
            lc: Some("n2013008575".to_string()),
        });
        let built = filter.author_filter().expect("author filter");
        assert_eq!(
            built,
            json!({"bool": {"must": [
                {"terms": {"contributors.role": ["Primary Author", "Author", "Narrator"]}},
                {"bool": {"should": [
                    {"term": {"contributors.sort_name.keyword": "Leckie, Ann"}},
                    {"term": {"contributors.display_name.keyword": "Ann Leckie"}},
                    {"term": {"contributors.viaf": "73520345"}},
                    {"term": {"contributors.lc": "n2013008575"}},
                ], "minimum_should_match": 1}},
            ]}})
        );
    }

    #[test]
    fn unknown_author_sentinel_never_matches_name_fields() {
        let mut filter = Filter::new();
        filter.author = Some(AuthorSpec {
            sort_name: Some(UNKNOWN_AUTHOR.to_string()),
            display_name: Some(UNKNOWN_AUTHOR.to_string()),
            viaf: Some("123".to_string()),
            lc: None,
        });
        let built = filter.author_filter().expect("author filter");
        assert_eq!(
            built,
            json!({"bool": {"must": [
                {"terms": {"contributors.role": ["Primary Author", "Author", "Narrator"]}},
                {"bool": {"should": [
                    {"term": {"contributors.viaf": "123"}},
                ], "minimum_should_match": 1}},
            ]}})
        );

        // Nothing identifiable at all: the filter degrades to a shape that
        // matches no contributor, which is a legitimate empty result.
        filter.author = Some(AuthorSpec {
            sort_name: Some(UNKNOWN_AUTHOR.to_string()),
            display_name: Some(UNKNOWN_AUTHOR.to_string()),
            viaf: None,
            lc: None,
        });
        let built = filter.author_filter().expect("author filter");
        assert_eq!(
            built["bool"]["must"][1],
            json!({"bool": {"minimum_should_match": 1}})
        );
    }

    #[test]
    fn chain_returns_first_filter_unchanged_then_conjoins() {
        let f1 = term("key", "value");
        let f2 = term("key2", "value2");
        assert_eq!(and_chain(None, f1.clone()), Some(f1.clone()));
        assert_eq!(
            and_chain(Some(f1.clone()), f2.clone()),
            Some(json!({"bool": {"must": [f1, f2]}}))
        );
    }

    #[test]
    fn universal_base_filter_requires_presentation_ready() {
        let universal = StandardUniversalFilters;
        assert_eq!(
            universal.base_filter(),
            Some(json!({"term": {"presentation_ready": true}}))
        );
    }

    #[test]
    fn universal_nested_filters_restrict_licensepools() {
        let mut nested = StandardUniversalFilters.nested_filters();
        let pools = nested.remove("licensepools").expect("licensepool filters");
        assert!(nested.is_empty());
        assert_eq!(
            pools,
            vec![
                json!({"term": {"licensepools.suppressed": false}}),
                json!({"bool": {"should": [
                    {"term": {"licensepools.licensed": true}},
                    {"term": {"licensepools.open_access": true}},
                ]}}),
            ]
        );
    }

    #[test]
    fn sort_order_appends_tiebreakers_minus_the_primary() {
        let mut filter = Filter::new();
        assert_eq!(filter.sort_order().unwrap(), Vec::<Value>::new());
        assert!(!filter.order_ascending);

        filter.order = Some(SortOrder::Title);
        assert_eq!(
            filter.sort_order().unwrap(),
            vec![
                json!({"sort_title": "desc"}),
                json!({"sort_author": "asc"}),
                json!({"work_id": "asc"}),
            ]
        );

        filter.order_ascending = true;
        filter.order = Some(SortOrder::Random);
        assert_eq!(
            filter.sort_order().unwrap(),
            vec![
                json!({"random": "asc"}),
                json!({"sort_author": "asc"}),
                json!({"sort_title": "asc"}),
                json!({"work_id": "asc"}),
            ]
        );

        // Series feeds are tie-broken by title before author.
        filter.order = Some(SortOrder::SeriesPosition);
        assert_eq!(
            filter.sort_order().unwrap(),
            vec![
                json!({"series_position": "asc"}),
                json!({"sort_title": "asc"}),
                json!({"sort_author": "asc"}),
                json!({"work_id": "asc"}),
            ]
        );
    }

    #[test]
    fn sorting_by_an_unmapped_subdocument_field_fails_loudly() {
        let mut filter = Filter::new();
        filter.order = Some(SortOrder::Field("subdocument.field".to_string()));
        assert_eq!(
            filter.sort_order(),
            Err(ConfigError::UnsupportedSort("subdocument.field".to_string()))
        );
    }

    #[test]
    fn added_to_collection_sorts_by_earliest_availability() {
        let mut filter = Filter::new();
        filter.order = Some(SortOrder::AddedToCollection);
        filter.order_ascending = true;
        let order = filter.sort_order().unwrap();
        assert_eq!(
            order[0],
            json!({"licensepools.availability_time": {"mode": "min", "order": "asc"}})
        );

        // A collection restriction scopes which pools feed the aggregate.
        filter.collection_ids = Some(vec![60]);
        let order = filter.sort_order().unwrap();
        assert_eq!(
            order[0],
            json!({"licensepools.availability_time": {
                "mode": "min",
                "order": "asc",
                "nested": {
                    "path": "licensepools",
                    "filter": {"terms": {"licensepools.collection_id": [60]}},
                },
            }})
        );
    }

    #[test]
    fn last_update_sort_escalates_to_a_stored_script_under_restrictions() {
        let mut filter = Filter::new();
        filter.order = Some(SortOrder::LastUpdate);
        filter.order_ascending = true;
        assert_eq!(
            filter.sort_order().unwrap()[0],
            json!({"last_update_time": "asc"})
        );

        filter.collection_ids = Some(vec![60]);
        filter.customlist_restriction_sets = RestrictionSet::new(vec![vec![1], vec![1, 2]]);
        assert_eq!(
            filter.sort_order().unwrap()[0],
            json!({"_script": {
                "order": "asc",
                "type": "number",
                "script": {
                    "stored": WORK_LAST_UPDATE_SCRIPT,
                    "params": {"collection_ids": [60], "list_ids": [1, 2]},
                },
            }})
        );
    }

    #[test]
    fn target_age_bounds_are_normalized() {
        let mut filter = Filter::new();
        filter.set_target_age(Some(6), Some(3));
        assert_eq!(filter.target_age, Some((Some(3), Some(6))));
    }
}
