//! Derives structure from freeform search requests.
//!
//! "science fiction about dogs" is really a genre restriction plus a
//! residual topic search. The parser recognizes genre, fiction/nonfiction,
//! audience and target-age phrasings in a fixed precedence order, removes
//! each match from the working text, and hands whatever is left back to the
//! hypothesis builder.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use crate::dsl::match_term;
use crate::query::{make_target_age_query, SearchConfig};
use crate::vocab::{genres_longest_first, AUDIENCE_KEYWORDS};

// Genres are recognized before fiction/nonfiction so "science fiction"
// is not chomped by a search for "fiction".
static GRADE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bgrades?\s+(\d+)(?:\s*(?:to|through|-)\s*(\d+))?\b").expect("static regex")
});
static AGE_AND_UP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:ages?\s+)?(\d+)\s+and\s+up\b").expect("static regex"));
static AGE_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bages?\s+(\d+)\s*(?:to|through|-)\s*(\d+)\b").expect("static regex")
});
static AGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bages?\s+(\d+)\b").expect("static regex"));

/// US school grades map onto reader ages with a five-year offset.
const GRADE_TO_AGE: i64 = 5;
/// "N and up" is open-ended in intent but needs a concrete range to score;
/// four years is wide enough to catch the plausible matches.
const AND_UP_SPAN: i64 = 4;

/// The outcome of parsing one query string.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    /// The query string as received (whitespace-trimmed).
    pub original_query_string: String,
    /// Whatever could not be parsed into structure.
    pub final_query_string: String,
    /// Filter fragments derived from the recognized pieces.
    pub filters: Vec<Value>,
    /// Scoring queries: one per recognized piece, plus a field-weighted
    /// match for the residual string.
    pub match_queries: Vec<Value>,
    /// Concrete age range recognized in the text, if any.
    pub target_age: Option<(i64, i64)>,
}

impl ParsedQuery {
    /// True when no structure could be derived and the whole string passes
    /// through to the hypothesis builder untouched.
    pub fn is_passthrough(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn parse(query_string: &str, config: &SearchConfig) -> Self {
        let original = query_string.trim().to_string();
        let mut working = original.to_lowercase();
        let mut parsed = ParsedQuery {
            original_query_string: original,
            final_query_string: String::new(),
            filters: Vec::new(),
            match_queries: Vec::new(),
            target_age: None,
        };

        for genre in genres_longest_first() {
            if let Some(found) = find_word_start(&working, &genre.to_lowercase()) {
                parsed.add_match_query(match_term("genres.name", genre));
                working = without_match(&working, found);
            }
        }

        // "nonfiction" first: it would otherwise satisfy a "fiction" scan.
        if let Some(found) = find_word_start(&working, "nonfiction") {
            parsed.add_match_query(match_term("fiction", "nonfiction"));
            working = without_match(&working, found);
        } else if let Some(found) = find_word_start(&working, "fiction") {
            parsed.add_match_query(match_term("fiction", "fiction"));
            working = without_match(&working, found);
        }

        for (keyword, audience) in AUDIENCE_KEYWORDS {
            if let Some(found) = find_word_start(&working, keyword) {
                parsed.add_match_query(match_term("audience", audience));
                working = without_match(&working, found);
                break;
            }
        }

        if let Some((age_range, span)) = parse_target_age(&working) {
            parsed.target_age = Some(age_range);
            parsed.add_match_query(make_target_age_query(age_range, config.target_age_boost));
            working = without_match(&working, span);
        }

        parsed.final_query_string = collapse_whitespace(&working);
        if parsed.is_passthrough() {
            // Nothing was recognized; leave match_queries empty and let the
            // hypothesis builder handle the entire string.
            parsed.final_query_string = parsed.original_query_string.clone();
            return parsed;
        }
        if !parsed.final_query_string.is_empty() {
            parsed.match_queries.push(simple_query_string(
                &parsed.final_query_string,
                &config.simple_query_string_fields,
            ));
        }
        parsed
    }

    fn add_match_query(&mut self, query: Value) {
        self.filters.push(query.clone());
        self.match_queries.push(query);
    }
}

fn simple_query_string(query: &str, fields: &[String]) -> Value {
    json!({ "simple_query_string": { "query": query, "fields": fields } })
}

/// Byte span of `needle` in `haystack`, accepted only at a word start.
/// The match may end mid-word; removal runs through the end of that word.
fn find_word_start(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(needle) {
        let start = from + offset;
        let at_word_start = start == 0
            || !haystack[..start]
                .chars()
                .next_back()
                .map(char::is_alphanumeric)
                .unwrap_or(false);
        if at_word_start {
            return Some((start, start + needle.len()));
        }
        from = start + needle.len();
    }
    None
}

/// Remove a matched span, extending through the end of a partially-matched
/// word: removing "children" from "children's books" leaves " books".
fn without_match(text: &str, (start, end): (usize, usize)) -> String {
    let base = end;
    let mut end = end;
    for (idx, c) in text[base..].char_indices() {
        if c.is_alphanumeric() || c == '\'' {
            end = base + idx + c.len_utf8();
        } else {
            break;
        }
    }
    format!("{}{}", &text[..start], &text[end..])
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_target_age(text: &str) -> Option<((i64, i64), (usize, usize))> {
    if let Some(captures) = GRADE_RE.captures(text) {
        let whole = captures.get(0).expect("regex matched");
        let lower: i64 = captures[1].parse().ok()?;
        let upper: i64 = captures
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(lower);
        return Some((
            (lower + GRADE_TO_AGE, upper + GRADE_TO_AGE),
            (whole.start(), whole.end()),
        ));
    }
    if let Some(captures) = AGE_AND_UP_RE.captures(text) {
        let whole = captures.get(0).expect("regex matched");
        let lower: i64 = captures[1].parse().ok()?;
        return Some(((lower, lower + AND_UP_SPAN), (whole.start(), whole.end())));
    }
    if let Some(captures) = AGE_RANGE_RE.captures(text) {
        let whole = captures.get(0).expect("regex matched");
        let lower: i64 = captures[1].parse().ok()?;
        let upper: i64 = captures[2].parse().ok()?;
        return Some(((lower.min(upper), lower.max(upper)), (whole.start(), whole.end())));
    }
    if let Some(captures) = AGE_RE.captures(text) {
        let whole = captures.get(0).expect("regex matched");
        let age: i64 = captures[1].parse().ok()?;
        return Some(((age, age), (whole.start(), whole.end())));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(query: &str) -> ParsedQuery {
        ParsedQuery::parse(query, &SearchConfig::default())
    }

    fn genre_filter(name: &str) -> Value {
        json!({"nested": {"path": "genres", "query": {"term": {"genres.name": name}}}})
    }

    #[test]
    fn genre_is_extracted_and_the_rest_survives() {
        let parsed = parse("science fiction about dogs");
        assert_eq!(parsed.original_query_string, "science fiction about dogs");
        assert_eq!(parsed.final_query_string, "about dogs");
        assert_eq!(parsed.filters, vec![genre_filter("Science Fiction")]);
        // The residual becomes a weighted simple-query-string match.
        assert_eq!(parsed.match_queries.len(), 2);
        assert_eq!(
            parsed.match_queries[1]["simple_query_string"]["query"],
            "about dogs"
        );
    }

    #[test]
    fn leading_and_trailing_whitespace_is_insignificant() {
        let parsed = parse(" abc ");
        assert_eq!(parsed.original_query_string, "abc");
    }

    #[test]
    fn audience_phrasing_is_recognized() {
        let parsed = parse("children's picture books");
        assert_eq!(parsed.filters, vec![json!({"term": {"audience": "children"}})]);
        assert_eq!(parsed.final_query_string, "picture books");
    }

    #[test]
    fn the_entire_query_can_be_consumed() {
        let parsed = parse("young adult romance");
        assert_eq!(
            parsed.filters,
            vec![
                genre_filter("Romance"),
                json!({"term": {"audience": "youngadult"}}),
            ]
        );
        assert_eq!(parsed.final_query_string, "");
        // No residual, so no residual match query either.
        assert_eq!(parsed.match_queries.len(), 2);
    }

    #[test]
    fn fiction_and_nonfiction_are_distinguished() {
        let parsed = parse("fiction dinosaurs");
        assert_eq!(parsed.filters, vec![json!({"term": {"fiction": "fiction"}})]);
        assert_eq!(parsed.final_query_string, "dinosaurs");

        // Genres parse first, so the genre keeps its "fiction" and the
        // standalone "nonfiction" is still seen.
        let parsed = parse("science fiction or nonfiction dinosaurs");
        assert_eq!(
            parsed.filters,
            vec![
                genre_filter("Science Fiction"),
                json!({"term": {"fiction": "nonfiction"}}),
            ]
        );
        assert_eq!(parsed.final_query_string, "or dinosaurs");
    }

    #[test]
    fn grade_levels_map_to_age_ranges() {
        let parsed = parse("grade 5 science");
        assert_eq!(parsed.target_age, Some((10, 10)));
        assert_eq!(parsed.filters[0], genre_filter("Science"));
        assert_eq!(parsed.final_query_string, "");
        // The age query scores with its configured boost.
        assert_eq!(parsed.match_queries[1]["bool"]["boost"], 40.0);
    }

    #[test]
    fn ages_and_up_becomes_a_bounded_range() {
        let parsed = parse("divorce ages 10 and up");
        assert_eq!(parsed.target_age, Some((10, 14)));
        assert_eq!(parsed.final_query_string, "divorce");
    }

    #[test]
    fn age_ranges_and_single_ages_parse() {
        assert_eq!(parse("stories ages 7-9").target_age, Some((7, 9)));
        assert_eq!(parse("age 9").target_age, Some((9, 9)));
    }

    #[test]
    fn unrecognized_queries_pass_through_unchanged() {
        let parsed = parse("octavia butler");
        assert!(parsed.is_passthrough());
        assert_eq!(parsed.final_query_string, "octavia butler");
        assert!(parsed.match_queries.is_empty());
    }

    #[test]
    fn partial_word_matches_remove_through_the_end_of_the_word() {
        assert_eq!(without_match("young adult fiction", (0, 11)), " fiction");
        assert_eq!(without_match("children's books", (0, 8)), " books");
        assert_eq!(without_match("adulting", (0, 5)), "");
    }

    #[test]
    fn matches_inside_words_are_rejected() {
        // "fiction" occurs inside "nonfiction" but not at a word start.
        assert_eq!(find_word_start("nonfiction", "fiction"), None);
        assert_eq!(find_word_start("read fiction", "fiction"), Some((5, 12)));
    }
}
