//! Shared catalog models used across crates.
//!
//! The central type is [`WorkDocument`]: the denormalized, index-ready shape
//! of one catalog work, with its one-to-many license/genre/list/contributor
//! records carried as nested subdocument arrays.

use serde::{Deserialize, Serialize};

/// Internal numeric identifier for a catalog work.
pub type WorkId = i64;

/// Media constants as they appear on editions and license pools.
pub mod medium {
    pub const BOOK: &str = "Book";
    pub const AUDIO: &str = "Audio";
}

/// Contributor roles, plus the subset that counts as authorship when
/// matching or filtering on a person's name.
pub mod roles {
    pub const PRIMARY_AUTHOR: &str = "Primary Author";
    pub const AUTHOR: &str = "Author";
    pub const NARRATOR: &str = "Narrator";
    pub const CONTRIBUTOR: &str = "Contributor";

    /// Roles that make someone "the author" for search purposes. A person
    /// credited only as a generic contributor does not qualify.
    pub const AUTHOR_MATCH_ROLES: [&str; 3] = [PRIMARY_AUTHOR, AUTHOR, NARRATOR];
}

/// Placeholder name assigned to works whose author is not known. Matching
/// on this value would make every anonymous work an author match, so search
/// code must skip it.
pub const UNKNOWN_AUTHOR: &str = "[Unknown]";

/// Audience values, stored scrubbed (lowercased, spaces removed).
pub mod audience {
    pub const CHILDREN: &str = "children";
    pub const YOUNG_ADULT: &str = "youngadult";
    pub const ADULT: &str = "adult";
    pub const ADULTS_ONLY: &str = "adultsonly";
}

/// Inclusive target-age range attached to a work. Either bound may be
/// missing; a work with no range at all suits every reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetAgeDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper: Option<i64>,
}

/// One vendor/collection's licensing terms and current availability for a
/// work. Lives in the `licensepools` nested array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicensePoolDoc {
    pub collection_id: i64,
    pub data_source_id: i64,
    pub open_access: bool,
    pub suppressed: bool,
    pub licensed: bool,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
    /// Epoch seconds when the pool first became available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_time: Option<i64>,
}

/// Genre assignment. `term` is the numeric genre id used by filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreDoc {
    pub term: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// Membership of a work on a curated list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomListDoc {
    pub list_id: i64,
    pub featured: bool,
    /// Epoch seconds of the work's first appearance on the list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_appearance: Option<i64>,
}

/// One person's contribution to a work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viaf: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lc: Option<String>,
    pub role: String,
}

/// Standard identifier (ISBN, Overdrive id, ...) attached to a work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierDoc {
    #[serde(rename = "type")]
    pub identifier_type: String,
    pub identifier: String,
}

/// Subject classification term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    pub term: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// The index document for one catalog work.
///
/// Scalar bibliographic fields are stored at the top level; everything with
/// one-to-many cardinality (license pools, genres, list memberships,
/// contributors, identifiers, classifications) is a nested array so filters
/// can be evaluated per element rather than against a flattened bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkDocument {
    pub work_id: WorkId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_position: Option<i64>,
    /// Display name of the primary author, denormalized for cross-field
    /// matching against the title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// "fiction" or "nonfiction", scrubbed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiction: Option<String>,
    /// Scrubbed audience value (see [`audience`]).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
    #[serde(default)]
    pub target_age: TargetAgeDoc,
    /// Epoch seconds of the last bibliographic update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<i64>,
    pub presentation_ready: bool,
    /// Stable per-work dither value used by randomized orderings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random: Option<u64>,
    #[serde(default)]
    pub licensepools: Vec<LicensePoolDoc>,
    #[serde(default)]
    pub genres: Vec<GenreDoc>,
    #[serde(default)]
    pub customlists: Vec<CustomListDoc>,
    #[serde(default)]
    pub contributors: Vec<ContributorDoc>,
    #[serde(default)]
    pub identifiers: Vec<IdentifierDoc>,
    #[serde(default)]
    pub classifications: Vec<ClassificationDoc>,
}

impl WorkDocument {
    /// A minimal presentation-ready document; callers fill in the rest.
    pub fn new(work_id: WorkId, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            work_id,
            sort_title: Some(title.to_lowercase()),
            title: Some(title),
            subtitle: None,
            series: None,
            series_position: None,
            author: None,
            sort_author: None,
            publisher: None,
            imprint: None,
            summary: None,
            fiction: None,
            audience: None,
            medium: Some(medium::BOOK.to_string()),
            language: None,
            quality: None,
            target_age: TargetAgeDoc::default(),
            last_update_time: None,
            presentation_ready: true,
            random: None,
            licensepools: Vec::new(),
            genres: Vec::new(),
            customlists: Vec::new(),
            contributors: Vec::new(),
            identifiers: Vec::new(),
            classifications: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_document_serializes_nested_arrays_and_omits_absent_scalars() {
        let mut work = WorkDocument::new(7, "Moby Dick");
        work.licensepools.push(LicensePoolDoc {
            collection_id: 1,
            data_source_id: 2,
            open_access: false,
            suppressed: false,
            licensed: true,
            available: true,
            medium: Some(medium::BOOK.to_string()),
            quality: Some(0.5),
            availability_time: Some(1_546_300_800),
        });

        let value = serde_json::to_value(&work).expect("document serializes");
        assert_eq!(value["work_id"], 7);
        assert_eq!(value["licensepools"][0]["collection_id"], 1);
        // No subtitle was set, so the key must be entirely absent: the
        // index treats a null and a missing field differently.
        assert!(value.get("subtitle").is_none());
        // No target age: both bounds absent so `exists` checks fail.
        assert!(value["target_age"].get("lower").is_none());
    }

    #[test]
    fn author_match_roles_exclude_generic_contributors() {
        assert!(roles::AUTHOR_MATCH_ROLES.contains(&roles::PRIMARY_AUTHOR));
        assert!(!roles::AUTHOR_MATCH_ROLES.contains(&roles::CONTRIBUTOR));
    }
}
