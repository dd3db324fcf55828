use serde::{Deserialize, Serialize};

/// One page of a list query plus the count metadata every list endpoint
/// returns. `total_items` comes from a separate count over the same
/// filter, so `total_pages` is correct even though count and page are not
/// read in one transaction. An empty result is `items: []` with
/// `total_pages: 0`, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
    pub total_items: u64,
}

impl<T> Page<T> {
    pub fn empty(page: u64, limit: u64) -> Self {
        Self {
            items: Vec::new(),
            page,
            limit,
            total_pages: 0,
            total_items: 0,
        }
    }
}
