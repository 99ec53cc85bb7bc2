//! Length-aware pagination.
//!
//! The rendered shape matches what existing clients of the expense API read:
//! `current_page`, `data`, `first_page_url`, `from`, `last_page`,
//! `last_page_url`, `links`, `next_page_url`, `path`, `per_page`,
//! `prev_page_url`, `to`, `total`.

use serde::{Deserialize, Serialize};
use url::Url;

/// Pages shown on each side of the current page before eliding with "..."
const ON_EACH_SIDE: u32 = 3;

/// Raw `?page=&per_page=` parameters. Kept as strings so bad input falls back
/// to defaults instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub per_page: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn from_query(query: &PageQuery, default_per_page: u32, max_per_page: u32) -> Self {
        let page = query
            .page
            .as_deref()
            .and_then(|p| p.trim().parse::<u32>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1);

        let per_page = query
            .per_page
            .as_deref()
            .and_then(|p| p.trim().parse::<u32>().ok())
            .unwrap_or(default_per_page)
            .clamp(1, max_per_page.max(1));

        Self::new(page, per_page)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub request: PageRequest,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self { items, total, request }
    }

    pub fn last_page(&self) -> u32 {
        let per_page = u64::from(self.request.per_page);
        let pages = self.total.div_ceil(per_page).max(1);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    /// Render with page URLs built from `path` (e.g. `http://host/expenses`)
    pub fn into_paginated(self, path: &Url) -> Paginated<T> {
        let current = self.request.page;
        let last = self.last_page();
        let page_url = |page: u32| -> String {
            let mut url = path.clone();
            url.query_pairs_mut().clear().append_pair("page", &page.to_string());
            url.to_string()
        };

        let (from, to) = if self.items.is_empty() {
            (None, None)
        } else {
            let from = self.request.offset() + 1;
            (Some(from), Some(from + self.items.len() as u64 - 1))
        };

        let prev_page_url = (current > 1).then(|| page_url(current - 1));
        let next_page_url = (current < last).then(|| page_url(current + 1));

        let mut links = Vec::new();
        links.push(PageLink {
            url: prev_page_url.clone(),
            label: "&laquo; Previous".to_string(),
            active: false,
        });
        for element in window(current, last) {
            links.push(match element {
                Some(page) => PageLink {
                    url: Some(page_url(page)),
                    label: page.to_string(),
                    active: page == current,
                },
                None => PageLink {
                    url: None,
                    label: "...".to_string(),
                    active: false,
                },
            });
        }
        links.push(PageLink {
            url: next_page_url.clone(),
            label: "Next &raquo;".to_string(),
            active: false,
        });

        Paginated {
            current_page: current,
            data: self.items,
            first_page_url: page_url(1),
            from,
            last_page: last,
            last_page_url: page_url(last),
            links,
            next_page_url,
            path: path.to_string(),
            per_page: self.request.per_page,
            prev_page_url,
            to,
            total: self.total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLink {
    pub url: Option<String>,
    pub label: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub current_page: u32,
    pub data: Vec<T>,
    pub first_page_url: String,
    pub from: Option<u64>,
    pub last_page: u32,
    pub last_page_url: String,
    pub links: Vec<PageLink>,
    pub next_page_url: Option<String>,
    pub path: String,
    pub per_page: u32,
    pub prev_page_url: Option<String>,
    pub to: Option<u64>,
    pub total: u64,
}

/// Page numbers to link, `None` marking an elided gap
fn window(current: u32, last: u32) -> Vec<Option<u32>> {
    let span = ON_EACH_SIDE + 4;

    if last < ON_EACH_SIDE * 2 + 8 {
        return (1..=last).map(Some).collect();
    }

    let mut elements = Vec::new();
    if current <= span {
        elements.extend((1..=span + ON_EACH_SIDE).map(Some));
        elements.push(None);
        elements.extend((last - 1..=last).map(Some));
    } else if current > last - span {
        elements.extend((1..=2).map(Some));
        elements.push(None);
        elements.extend((last - (span + ON_EACH_SIDE - 1)..=last).map(Some));
    } else {
        elements.extend((1..=2).map(Some));
        elements.push(None);
        elements.extend((current - ON_EACH_SIDE..=current + ON_EACH_SIDE).map(Some));
        elements.push(None);
        elements.extend((last - 1..=last).map(Some));
    }
    elements
}
