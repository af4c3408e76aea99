//! Facet policies: how a caller's view of the catalog shapes a search.
//!
//! A facet policy gets exactly two capabilities: restricting the filter
//! and injecting scoring functions. Concrete policies implement the
//! [`FacetStrategy`] trait; nothing probes for optional methods.

use serde_json::{json, Value};

use crate::dsl::{nested, term, terms, BoolBuilder};
use crate::filter::{Availability, Filter, SortOrder};

/// The two operations a facet object may perform on a search.
pub trait FacetStrategy {
    /// Restrict or reorder the filter before it is compiled.
    fn modify_search_filter(&self, filter: &mut Filter);
    /// Scoring functions that bias ranking without restricting membership.
    fn scoring_functions(&self, filter: &Filter) -> Vec<Value>;
}

impl Filter {
    /// Run a facet policy against this filter and record the scoring
    /// functions it wants applied.
    pub fn apply_facets(&mut self, facets: &dyn FacetStrategy) {
        facets.modify_search_filter(self);
        self.scoring_functions = facets.scoring_functions(self);
    }
}

/// Which slice of the collection a patron-facing feed shows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollectionScope {
    /// Everything.
    Full,
    /// Hide open-access books known to be of low quality.
    Main,
    /// Only books good enough to feature.
    Featured,
}

/// Ordering and availability facets for a standard catalog feed.
#[derive(Debug, Clone)]
pub struct SearchFacets {
    pub collection: CollectionScope,
    pub availability: Availability,
    pub order: Option<SortOrder>,
    pub order_ascending: bool,
    /// Quality floor for the featured scope.
    pub minimum_featured_quality: f64,
    /// Open-access quality floor for the main scope.
    pub low_quality_open_access_cutoff: f64,
}

impl Default for SearchFacets {
    fn default() -> Self {
        Self {
            collection: CollectionScope::Full,
            availability: Availability::All,
            order: None,
            order_ascending: false,
            minimum_featured_quality: 0.65,
            low_quality_open_access_cutoff: 0.3,
        }
    }
}

impl FacetStrategy for SearchFacets {
    fn modify_search_filter(&self, filter: &mut Filter) {
        filter.order = self.order.clone();
        filter.order_ascending = self.order_ascending;
        match self.collection {
            CollectionScope::Full => {}
            CollectionScope::Main => {
                filter.exclude_low_quality_open_access =
                    Some(self.low_quality_open_access_cutoff);
            }
            CollectionScope::Featured => {
                filter.min_quality = Some(self.minimum_featured_quality);
            }
        }
        if self.availability != Availability::All {
            filter.availability = Some(self.availability);
        }
    }

    fn scoring_functions(&self, _filter: &Filter) -> Vec<Value> {
        Vec::new()
    }
}

/// Scoring script for featurability: quality counts, but only up to the
/// featurability cutoff, so everything above the bar competes on even
/// footing.
pub fn featurable_script(cutoff: f64, exponent: f64) -> String {
    format!("Math.pow(Math.min({cutoff:.5}, doc['quality'].value), {exponent:.5}) * 5")
}

/// "Featured" ordering: quality up to a cutoff, current availability, a
/// featured spot on a relevant list, and a pinch of randomness.
#[derive(Debug, Clone)]
pub struct FeaturedFacets {
    pub minimum_featured_quality: f64,
    /// Seed for the random scoring component. `None` removes the random
    /// component entirely and makes the ordering deterministic.
    pub random_seed: Option<i64>,
}

impl FeaturedFacets {
    pub fn new(minimum_featured_quality: f64, random_seed: Option<i64>) -> Self {
        Self {
            minimum_featured_quality,
            random_seed,
        }
    }
}

impl FacetStrategy for FeaturedFacets {
    fn modify_search_filter(&self, _filter: &mut Filter) {
        // Featured ordering restricts nothing; it only rescores.
    }

    fn scoring_functions(&self, filter: &Filter) -> Vec<Value> {
        let mut functions = vec![
            json!({
                "script_score": {
                    "script": {
                        "source": featurable_script(self.minimum_featured_quality.powi(2), 2.0),
                    },
                },
            }),
            json!({
                "filter": nested("licensepools", term("licensepools.available", true)),
                "weight": 5.0,
            }),
        ];
        // Any list in play will do; being featured on one is a strong
        // signal regardless of which restriction set mentioned it.
        let list_ids = filter.customlist_restriction_sets.all_ids();
        if !list_ids.is_empty() {
            let featured_on_list = BoolBuilder::new()
                .must(term("customlists.featured", true))
                .must(terms("customlists.list_id", list_ids))
                .build();
            functions.push(json!({
                "filter": nested("customlists", featured_on_list),
                "weight": 11.0,
            }));
        }
        if let Some(seed) = self.random_seed {
            functions.push(json!({
                "random_score": { "seed": seed, "field": "work_id" },
                "weight": 1.1,
            }));
        }
        functions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::RestrictionSet;
    use serde_json::json;

    #[test]
    fn search_facets_inject_order_and_scope_restrictions() {
        let mut filter = Filter::new();
        let facets = SearchFacets {
            collection: CollectionScope::Main,
            availability: Availability::Now,
            order: Some(SortOrder::Title),
            order_ascending: true,
            ..SearchFacets::default()
        };
        filter.apply_facets(&facets);
        assert_eq!(filter.order, Some(SortOrder::Title));
        assert!(filter.order_ascending);
        assert_eq!(filter.exclude_low_quality_open_access, Some(0.3));
        assert_eq!(filter.availability, Some(Availability::Now));
        assert!(filter.scoring_functions.is_empty());

        // The main-scope restriction compiles to a nested licensepool
        // clause: not open access, or decent quality.
        let (_, nested_filters) = filter.build();
        let pools = &nested_filters["licensepools"];
        assert!(pools.contains(&json!({"bool": {"should": [
            {"term": {"licensepools.open_access": false}},
            {"range": {"licensepools.quality": {"gte": 0.3}}},
        ]}})));
    }

    #[test]
    fn featured_scope_raises_the_quality_floor_on_the_main_document() {
        let mut filter = Filter::new();
        let facets = SearchFacets {
            collection: CollectionScope::Featured,
            ..SearchFacets::default()
        };
        filter.apply_facets(&facets);
        let (main, nested_filters) = filter.build();
        assert!(nested_filters.is_empty());
        assert_eq!(
            main,
            Some(json!({"bool": {"must": [{"range": {"quality": {"gte": 0.65}}}]}}))
        );
    }

    #[test]
    fn open_access_availability_is_a_nested_licensepool_restriction() {
        let mut filter = Filter::new();
        let facets = SearchFacets {
            availability: Availability::OpenAccessOnly,
            ..SearchFacets::default()
        };
        filter.apply_facets(&facets);
        let (_, nested_filters) = filter.build();
        assert_eq!(
            nested_filters["licensepools"],
            vec![json!({"term": {"licensepools.open_access": true}})]
        );
    }

    #[test]
    fn featured_facets_set_three_scoring_functions() {
        let facets = FeaturedFacets::new(0.55, Some(42));
        let mut filter = Filter::new();
        filter.apply_facets(&facets);
        let [featurable, available_now, random] = &filter.scoring_functions[..] else {
            panic!("expected three scoring functions");
        };

        // Featurability: quality capped at cutoff^2.
        assert_eq!(
            featurable["script_score"]["script"]["source"],
            featurable_script(0.55_f64.powi(2), 2.0)
        );

        // Availability boost.
        assert_eq!(
            available_now["filter"],
            json!({"nested": {
                "path": "licensepools",
                "query": {"term": {"licensepools.available": true}},
            }})
        );
        assert_eq!(available_now["weight"], 5.0);

        // A pinch of luck.
        assert_eq!(random["random_score"]["seed"], 42);
        assert_eq!(random["weight"], 1.1);
    }

    #[test]
    fn deterministic_featured_facets_drop_the_random_component() {
        let facets = FeaturedFacets::new(0.55, None);
        let functions = facets.scoring_functions(&Filter::new());
        assert_eq!(functions.len(), 2);
        assert!(functions
            .iter()
            .all(|f| f.get("random_score").is_none()));
    }

    #[test]
    fn list_membership_scores_only_when_lists_are_in_play() {
        let facets = FeaturedFacets::new(0.55, None);
        let mut filter = Filter::new();
        filter.customlist_restriction_sets = RestrictionSet::new(vec![vec![1, 2], vec![3]]);
        let functions = facets.scoring_functions(&filter);
        let featured_on_list = &functions[2];
        assert_eq!(
            featured_on_list["filter"],
            json!({"nested": {
                "path": "customlists",
                "query": {"bool": {"must": [
                    {"term": {"customlists.featured": true}},
                    {"terms": {"customlists.list_id": [1, 2, 3]}},
                ]}},
            }})
        );
        assert_eq!(featured_on_list["weight"], 11.0);
    }
}
