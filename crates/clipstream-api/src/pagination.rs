//! Pagination/search query parameters. Everything arrives as text and is
//! coerced defensively: a non-numeric or non-positive page/limit falls
//! back to the default instead of failing the request.

use serde::Deserialize;

use clipstream_db::SortSpec;
use clipstream_db::paginate::{DEFAULT_LIMIT, DEFAULT_PAGE};

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    /// Free-text search across the endpoint's text fields.
    pub query: Option<String>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    #[serde(rename = "sortType")]
    pub sort_type: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

impl PageParams {
    pub fn page(&self) -> u64 {
        coerce(self.page.as_deref(), DEFAULT_PAGE)
    }

    pub fn limit(&self) -> u64 {
        coerce(self.limit.as_deref(), DEFAULT_LIMIT)
    }

    /// Sort key is whitelisted - an unknown key falls back to creation
    /// time rather than letting clients sort by arbitrary fields.
    pub fn sort(&self) -> SortSpec {
        let field = match self.sort_by.as_deref() {
            Some("views") => "views",
            Some("duration") => "duration",
            Some("title") => "title",
            _ => "created_at",
        };
        SortSpec {
            field: field.to_string(),
            descending: self.sort_type.as_deref() != Some("asc"),
        }
    }
}

fn coerce(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|n| *n >= 1)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_coercion_never_panics() {
        let params = PageParams {
            page: Some("abc".into()),
            limit: Some("-3".into()),
            ..Default::default()
        };
        assert_eq!(params.page(), DEFAULT_PAGE);
        assert_eq!(params.limit(), DEFAULT_LIMIT);

        let params = PageParams {
            page: Some("0".into()),
            limit: Some(" 25 ".into()),
            ..Default::default()
        };
        assert_eq!(params.page(), DEFAULT_PAGE);
        assert_eq!(params.limit(), 25);
    }

    #[test]
    fn sort_key_is_whitelisted() {
        let params = PageParams {
            sort_by: Some("password".into()),
            sort_type: Some("asc".into()),
            ..Default::default()
        };
        let sort = params.sort();
        assert_eq!(sort.field, "created_at");
        assert!(!sort.descending);
    }
}
