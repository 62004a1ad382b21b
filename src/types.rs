//! Shared types used across the codebase

use serde::{Deserialize, Serialize};

use crate::config;

/// Pagination query accepted by list endpoints (`?page=0&size=20&sort=date,desc`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub sort: Option<String>,
}

impl PageRequest {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(0)
    }

    /// Page size clamped to `1..=api.max_page_size`
    pub fn size(&self) -> u32 {
        let api = &config::config().api;
        self.size
            .unwrap_or(api.default_page_size)
            .clamp(1, api.max_page_size.max(1))
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page()) * i64::from(self.size())
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size())
    }

    /// Sort in `field,dir` form translated to the filter order syntax (`field dir`)
    pub fn order(&self) -> Option<serde_json::Value> {
        let sort = self.sort.as_deref()?.trim();
        if sort.is_empty() {
            return None;
        }
        let terms: Vec<String> = sort
            .split(';')
            .map(|term| term.replace(',', " "))
            .filter(|term| !term.trim().is_empty())
            .collect();
        Some(serde_json::Value::String(terms.join(", ")))
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize)]
pub struct Page<T: Serialize> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: i64,
    pub total_pages: i64,
}

impl<T: Serialize> Page<T> {
    pub fn new(content: Vec<T>, request: &PageRequest, total_elements: i64) -> Self {
        let size = request.size();
        let total_pages = if total_elements <= 0 {
            0
        } else {
            (total_elements + i64::from(size) - 1) / i64::from(size)
        };
        Self {
            content,
            page: request.page(),
            size,
            total_elements,
            total_pages,
        }
    }

    pub fn map<U: Serialize>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_is_clamped() {
        let max = config::config().api.max_page_size;
        let req = PageRequest { size: Some(max + 500), ..Default::default() };
        assert_eq!(req.size(), max);
        let req = PageRequest { size: Some(0), ..Default::default() };
        assert_eq!(req.size(), 1);
    }

    #[test]
    fn total_pages_round_up() {
        let req = PageRequest { page: Some(1), size: Some(10), sort: None };
        let page = Page::new(vec![1, 2, 3], &req, 23);
        assert_eq!(page.total_pages, 3);
        assert_eq!(req.offset(), 10);

        let empty: Page<i32> = Page::new(vec![], &req, 0);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn sort_translates_to_order() {
        let req = PageRequest { sort: Some("date,desc;category".into()), ..Default::default() };
        assert_eq!(req.order(), Some(serde_json::json!("date desc, category")));
    }
}
