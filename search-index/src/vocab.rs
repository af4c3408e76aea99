//! Classifier vocabulary used when deriving structure from free text.

/// Genre names as they appear in the index's `genres.name` field, paired
/// with their lowercased search form. Multi-word genres must sort before
/// their substrings ("science fiction" before "science") so the parser can
/// match longest-first.
pub const GENRES: [&str; 52] = [
    "Biography & Memoir",
    "Comics & Graphic Novels",
    "Crafts & Hobbies",
    "Historical Fiction",
    "Literary Fiction",
    "Political Science",
    "Science Fiction",
    "Short Stories",
    "Study Aids",
    "True Crime",
    "Urban Fiction",
    "Adventure",
    "Art",
    "Biography",
    "Business",
    "Classics",
    "Computers",
    "Cooking",
    "Drama",
    "Dystopian",
    "Economics",
    "Education",
    "Erotica",
    "Fantasy",
    "Folklore",
    "History",
    "Horror",
    "Humor",
    "Law",
    "Mathematics",
    "Medical",
    "Music",
    "Mystery",
    "Nature",
    "Parenting",
    "Pets",
    "Philosophy",
    "Photography",
    "Poetry",
    "Psychology",
    "Reference",
    "Religion",
    "Romance",
    "Science",
    "Self-Help",
    "Sports",
    "Suspense",
    "Technology",
    "Thriller",
    "Travel",
    "Westerns",
    "Women's Fiction",
];

/// Spoken phrasings for each audience, longest first, paired with the
/// scrubbed value stored in the index's `audience` field. "ya" is absent
/// on purpose: at two letters it chews up the start of too many ordinary
/// words ("yarn", "yacht").
pub const AUDIENCE_KEYWORDS: [(&str, &str); 7] = [
    ("adults only", work_model::audience::ADULTS_ONLY),
    ("young adult", work_model::audience::YOUNG_ADULT),
    ("children", work_model::audience::CHILDREN),
    ("child", work_model::audience::CHILDREN),
    ("kids", work_model::audience::CHILDREN),
    ("teens", work_model::audience::YOUNG_ADULT),
    ("teen", work_model::audience::YOUNG_ADULT),
];

/// Genres ordered longest-first for greedy matching.
pub fn genres_longest_first() -> Vec<&'static str> {
    let mut genres: Vec<&'static str> = GENRES.to_vec();
    genres.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    genres
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_first_puts_compound_genres_before_their_substrings() {
        let ordered = genres_longest_first();
        let science_fiction = ordered
            .iter()
            .position(|g| *g == "Science Fiction")
            .expect("compound genre present");
        let science = ordered
            .iter()
            .position(|g| *g == "Science")
            .expect("single-word genre present");
        assert!(science_fiction < science);
    }
}
