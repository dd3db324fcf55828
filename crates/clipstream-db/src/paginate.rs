//! The join-and-paginate pattern every list endpoint runs: filter, sort,
//! page window, virtual joins, projection - plus a separate count over
//! the same filter for the page metadata.

use clipstream_types::page::Page;
use serde_json::Value;

use crate::error::Result;
use crate::pipeline::{Filter, Lookup, Projection, Stage};
use crate::{Collection, Database};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;

#[derive(Debug, Clone)]
pub struct SortSpec {
    pub field: String,
    pub descending: bool,
}

impl Default for SortSpec {
    /// Newest first - pagination needs a deterministic sort key.
    fn default() -> Self {
        Self {
            field: "created_at".to_string(),
            descending: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageRequest {
    pub filter: Filter,
    pub sort: SortSpec,
    pub page: u64,
    pub limit: u64,
    pub joins: Vec<Lookup>,
    pub projection: Option<Projection>,
}

impl PageRequest {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            sort: SortSpec::default(),
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            joins: Vec::new(),
            projection: None,
        }
    }

    pub fn sort(mut self, field: &str, descending: bool) -> Self {
        self.sort = SortSpec {
            field: field.to_string(),
            descending,
        };
        self
    }

    pub fn page(mut self, page: u64, limit: u64) -> Self {
        self.page = page;
        self.limit = limit;
        self
    }

    pub fn join(mut self, lookup: Lookup) -> Self {
        self.joins.push(lookup);
        self
    }

    pub fn project(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }
}

impl Database {
    /// Sort is applied before skip/limit; joins and projection only touch
    /// the page slice. The count query runs over the same filter but not
    /// in the same transaction - a slightly stale total under concurrent
    /// writes is accepted.
    pub fn paginate(&self, coll: Collection, req: &PageRequest) -> Result<Page<Value>> {
        // The API layer coerces page/limit from text; clamp here anyway so
        // a zero can never reach the window math.
        let page = req.page.max(1);
        let limit = req.limit.max(1);

        let total_items = self.count(coll, &req.filter)?;

        let mut stages = vec![
            Stage::Match(req.filter.clone()),
            Stage::Sort {
                field: req.sort.field.clone(),
                descending: req.sort.descending,
            },
            Stage::Skip((page - 1) * limit),
            Stage::Limit(limit),
        ];
        stages.extend(req.joins.iter().cloned().map(Stage::Lookup));
        if let Some(projection) = &req.projection {
            stages.push(Stage::Project(projection.clone()));
        }

        let items = self.aggregate(coll, &stages)?;

        Ok(Page {
            items,
            page,
            limit,
            total_pages: total_items.div_ceil(limit),
            total_items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seed_videos(db: &Database, count: usize) {
        for i in 0..count {
            db.insert(
                Collection::Videos,
                &json!({
                    "id": format!("v{i:02}"),
                    "owner": "u1",
                    "title": format!("video {i:02}"),
                    "views": i,
                    "created_at": format!("2024-01-{:02}T00:00:00Z", i + 1),
                }),
            )
            .unwrap();
        }
    }

    #[test]
    fn window_math_matches_the_count() {
        let db = Database::open_in_memory().unwrap();
        seed_videos(&db, 12);

        let req = PageRequest::new(Filter::new()).page(2, 5);
        let page = db.paginate(Collection::Videos, &req).unwrap();

        assert_eq!(page.items.len(), 5);
        assert_eq!(page.page, 2);
        assert_eq!(page.limit, 5);
        assert_eq!(page.total_items, 12);
        assert_eq!(page.total_pages, 3);

        // every page respects the limit, and the tail page holds the rest
        let last = db
            .paginate(Collection::Videos, &PageRequest::new(Filter::new()).page(3, 5))
            .unwrap();
        assert_eq!(last.items.len(), 2);
    }

    #[test]
    fn sort_is_applied_before_the_window() {
        let db = Database::open_in_memory().unwrap();
        seed_videos(&db, 12);

        // default sort: created_at descending - page 2 of 5 starts at the
        // sixth-newest video
        let req = PageRequest::new(Filter::new()).page(2, 5);
        let page = db.paginate(Collection::Videos, &req).unwrap();
        let ids: Vec<&str> = page
            .items
            .iter()
            .map(|v| v["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["v06", "v05", "v04", "v03", "v02"]);
    }

    #[test]
    fn empty_result_is_a_page_not_an_error() {
        let db = Database::open_in_memory().unwrap();

        let req = PageRequest::new(Filter::new().eq("owner", json!("nobody")));
        let page = db.paginate(Collection::Videos, &req).unwrap();

        assert!(page.items.is_empty());
        assert_eq!(page.total_items, 0);
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn filter_folds_into_the_count() {
        let db = Database::open_in_memory().unwrap();
        seed_videos(&db, 12);
        db.insert(
            Collection::Videos,
            &json!({
                "id": "other", "owner": "u2", "title": "not mine",
                "created_at": "2024-02-01T00:00:00Z",
            }),
        )
        .unwrap();

        let req = PageRequest::new(Filter::new().eq("owner", json!("u1"))).page(1, 20);
        let page = db.paginate(Collection::Videos, &req).unwrap();
        assert_eq!(page.total_items, 12);
        assert_eq!(page.items.len(), 12);
    }

    #[test]
    fn page_beyond_the_end_is_empty_with_correct_totals() {
        let db = Database::open_in_memory().unwrap();
        seed_videos(&db, 3);

        let req = PageRequest::new(Filter::new()).page(9, 5);
        let page = db.paginate(Collection::Videos, &req).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total_items, 3);
        assert_eq!(page.total_pages, 1);
    }
}
