//! Cursor pagination keyed on sort keys.
//!
//! Offset pagination skips or duplicates results when the index changes
//! between page fetches. Instead, each page remembers the backend sort key
//! of its last hit, and the next page resumes strictly after that key.
//! This only works because every sort order ends in tiebreaker fields that
//! make the ordering total.

use serde_json::Value;

/// Malformed pagination input from an external request. A user problem,
/// not a crash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPage {
    #[error("Invalid page size: {0}")]
    Size(String),
    #[error("Invalid page key: {0}")]
    Key(String),
}

/// Forward-only pagination state for one page fetch.
///
/// The cursor moves through three states: fresh (nothing known), loaded
/// (`page_loaded` recorded this page's size and last sort key), and
/// exhausted (the loaded page was empty, so there is no next page).
/// Total counts, previous pages and numeric offsets are deliberately
/// unsupported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortKeyPagination {
    pub size: usize,
    /// Sort key of the last item on the previous page; the resume point.
    pub last_item_on_previous_page: Option<Value>,
    /// Set by `page_loaded`.
    pub this_page_size: Option<usize>,
    /// Set by `page_loaded`.
    pub last_item_on_this_page: Option<Value>,
}

impl SortKeyPagination {
    pub const DEFAULT_SIZE: usize = 50;
    pub const MAX_SIZE: usize = 100;

    pub fn new() -> Self {
        Self::with_size(Self::DEFAULT_SIZE)
    }

    pub fn with_size(size: usize) -> Self {
        Self {
            size,
            last_item_on_previous_page: None,
            this_page_size: None,
            last_item_on_this_page: None,
        }
    }

    /// Build a cursor from raw request parameters. `default_size` lets a
    /// caller override the page size used when the request has none.
    pub fn from_request(
        size: Option<&str>,
        key: Option<&str>,
        default_size: Option<usize>,
    ) -> Result<Self, InvalidPage> {
        let mut pagination = match size {
            None => Self::with_size(default_size.unwrap_or(Self::DEFAULT_SIZE)),
            Some(raw) => {
                let size: usize = raw
                    .parse()
                    .map_err(|_| InvalidPage::Size(raw.to_string()))?;
                Self::with_size(size.min(Self::MAX_SIZE))
            }
        };
        if let Some(raw) = key {
            let parsed: Value =
                serde_json::from_str(raw).map_err(|_| InvalidPage::Key(raw.to_string()))?;
            pagination.last_item_on_previous_page = Some(parsed);
        }
        Ok(pagination)
    }

    /// The opaque cursor for this page, suitable for a `key` parameter.
    pub fn pagination_key(&self) -> Option<String> {
        self.last_item_on_previous_page
            .as_ref()
            .map(|key| key.to_string())
    }

    /// Request parameters that reproduce this page.
    pub fn items(&self) -> Vec<(&'static str, String)> {
        let mut items = Vec::new();
        if let Some(key) = self.pagination_key() {
            items.push(("key", key));
        }
        items.push(("size", self.size.to_string()));
        items
    }

    /// Inject the resume point into a search body. A no-op until the
    /// previous page's last sort key is known.
    pub fn modify_search_query(&self, body: &mut Value) {
        if let Some(key) = &self.last_item_on_previous_page {
            body["search_after"] = key.clone();
        }
    }

    pub fn page_has_loaded(&self) -> bool {
        self.this_page_size.is_some()
    }

    /// Record what a page fetch returned: its size, and the sort key of
    /// its last hit.
    pub fn page_loaded(&mut self, sort_keys: &[Value]) {
        self.this_page_size = Some(sort_keys.len());
        self.last_item_on_this_page = sort_keys.last().cloned();
    }

    /// The cursor for the page after this one. Undefined until this page
    /// has loaded; terminal once a page comes back empty.
    pub fn next_page(&self) -> Option<Self> {
        match self.this_page_size {
            None | Some(0) => None,
            Some(_) => Some(Self {
                size: self.size,
                last_item_on_previous_page: self.last_item_on_this_page.clone(),
                this_page_size: None,
                last_item_on_this_page: None,
            }),
        }
    }

    /// Always zero: this strategy never counts past items.
    pub fn offset(&self) -> usize {
        0
    }

    /// Unknown by design; the backend is never asked for a total.
    pub fn total_size(&self) -> Option<usize> {
        None
    }

    /// Backwards navigation is not supported.
    pub fn previous_page(&self) -> Option<Self> {
        None
    }
}
