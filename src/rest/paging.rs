use std::collections::HashMap;

use serde::Serialize;

use crate::config::ApiConfig;
use crate::database::{Document, PageQuery, SortDirection, SortSpec};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 20;

/// Fallbacks applied when a paging request omits or garbles its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingDefaults {
    pub limit: u64,
    pub max_limit: Option<u64>,
}

impl Default for PagingDefaults {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            max_limit: None,
        }
    }
}

impl PagingDefaults {
    pub fn from_config(api: &ApiConfig) -> Self {
        Self {
            limit: api.default_page_limit.max(1),
            max_limit: api.max_page_limit,
        }
    }
}

/// Parsed `page`/`limit`/`sortProp`/`sortOrder` query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingParams {
    pub page: u64,
    pub limit: u64,
    pub sort_prop: Option<String>,
    /// Raw value as sent; only `ASC` (any case) sorts ascending.
    pub sort_order: Option<String>,
}

impl PagingParams {
    /// Never fails: unusable numbers fall back to the defaults.
    pub fn from_query(query: &HashMap<String, String>, defaults: &PagingDefaults) -> Self {
        let page = positive(query.get("page")).unwrap_or(DEFAULT_PAGE);
        let mut limit = positive(query.get("limit")).unwrap_or(defaults.limit);
        if let Some(max) = defaults.max_limit {
            limit = limit.min(max);
        }

        Self {
            page,
            limit,
            sort_prop: query
                .get("sortProp")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            sort_order: query.get("sortOrder").cloned(),
        }
    }

    pub fn direction(&self) -> SortDirection {
        match self.sort_order.as_deref() {
            None => SortDirection::Asc,
            Some(order) if order.trim().eq_ignore_ascii_case("ASC") => SortDirection::Asc,
            Some(_) => SortDirection::Desc,
        }
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn to_page_query(&self) -> PageQuery {
        PageQuery {
            skip: self.skip(),
            limit: self.limit,
            sort: self.sort_prop.clone().map(|field| SortSpec {
                field,
                direction: self.direction(),
            }),
        }
    }
}

fn positive(value: Option<&String>) -> Option<u64> {
    value?.trim().parse::<u64>().ok().filter(|n| *n > 0)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult {
    pub total_records: u64,
    pub page: u64,
    pub limit: u64,
    pub results: Vec<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_prop: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<String>,
}

impl PagedResult {
    pub fn new(total_records: u64, params: &PagingParams, results: Vec<Document>) -> Self {
        // sortOrder is only echoed alongside a sortProp
        let sort_order = params
            .sort_prop
            .as_ref()
            .map(|_| params.sort_order.clone().unwrap_or_else(|| "ASC".to_string()));

        Self {
            total_records,
            page: params.page,
            limit: params.limit,
            results,
            sort_prop: params.sort_prop.clone(),
            sort_order,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn empty_query_uses_defaults() {
        let params = PagingParams::from_query(&HashMap::new(), &PagingDefaults::default());
        assert_eq!(params.page, 1);
        assert_eq!(params.limit, 20);
        assert_eq!(params.skip(), 0);
        assert!(params.to_page_query().sort.is_none());
    }

    #[test]
    fn garbage_numbers_fall_back() {
        let defaults = PagingDefaults::default();
        for (page, limit) in [("abc", "xyz"), ("0", "0"), ("-2", "-5"), ("1.5", "")] {
            let params = PagingParams::from_query(&query(&[("page", page), ("limit", limit)]), &defaults);
            assert_eq!((params.page, params.limit), (1, 20), "page={page} limit={limit}");
        }
    }

    #[test]
    fn skip_is_page_offset() {
        let params = PagingParams::from_query(&query(&[("page", "3"), ("limit", "10")]), &PagingDefaults::default());
        assert_eq!(params.skip(), 20);
        assert_eq!(params.to_page_query().limit, 10);
    }

    #[test]
    fn limit_is_clamped_to_max() {
        let defaults = PagingDefaults {
            limit: 20,
            max_limit: Some(50),
        };
        let params = PagingParams::from_query(&query(&[("limit", "500")]), &defaults);
        assert_eq!(params.limit, 50);
    }

    #[test]
    fn only_asc_sorts_ascending() {
        let defaults = PagingDefaults::default();
        let direction = |order: &str| {
            PagingParams::from_query(&query(&[("sortProp", "title"), ("sortOrder", order)]), &defaults).direction()
        };

        assert_eq!(direction("asc"), SortDirection::Asc);
        assert_eq!(direction("ASC"), SortDirection::Asc);
        assert_eq!(direction("desc"), SortDirection::Desc);
        assert_eq!(direction("sideways"), SortDirection::Desc);

        let unspecified = PagingParams::from_query(&query(&[("sortProp", "title")]), &defaults);
        assert_eq!(unspecified.direction(), SortDirection::Asc);
    }

    #[test]
    fn sort_order_is_echoed_only_with_sort_prop() {
        let defaults = PagingDefaults::default();

        let unsorted = PagingParams::from_query(&query(&[("sortOrder", "DESC")]), &defaults);
        let body = serde_json::to_value(PagedResult::new(3, &unsorted, Vec::new())).unwrap();
        assert_eq!(body, json!({"totalRecords": 3, "page": 1, "limit": 20, "results": []}));

        let sorted = PagingParams::from_query(&query(&[("sortProp", "title")]), &defaults);
        let body = serde_json::to_value(PagedResult::new(3, &sorted, Vec::new())).unwrap();
        assert_eq!(body["sortProp"], "title");
        assert_eq!(body["sortOrder"], "ASC");
    }

    #[test]
    fn blank_sort_prop_means_unsorted() {
        let defaults = PagingDefaults::default();
        let params = PagingParams::from_query(&query(&[("sortProp", "  "), ("sortOrder", "DESC")]), &defaults);

        assert!(params.sort_prop.is_none());
        assert!(params.to_page_query().sort.is_none());
        let body = serde_json::to_value(PagedResult::new(0, &params, Vec::new())).unwrap();
        assert!(body.get("sortProp").is_none());
        assert!(body.get("sortOrder").is_none());
    }
}
