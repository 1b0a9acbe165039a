//! Paged list responses and the "fetch every page" helper.
//!
//! OpsRamp list endpoints answer `{ "results": [...], "nextPage": bool,
//! "totalPages": n }`. [`collect_pages`] walks pages `1, 2, …` while
//! `nextPage` is set and concatenates `results` in the order the server
//! returned them.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;

use crate::client::Reply;
use crate::error::{OpsRampError, Result};

/// Hard ceiling on pages fetched by one [`collect_pages`] walk.
pub const MAX_PAGES: u32 = 10_000;

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "PageRepr<T>")]
pub struct Page<T> {
    /// Entities on this page. A missing `results` key reads as empty.
    pub results: Vec<T>,
    /// Whether the server has another page after this one.
    pub next_page: bool,
    /// Server-reported page count, when present.
    pub total_pages: Option<u32>,
}

// Some endpoints (e.g. `deviceGroups/minimal`) answer with a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum PageRepr<T> {
    Paged {
        #[serde(default = "Vec::new")]
        results: Vec<T>,
        #[serde(default, rename = "nextPage")]
        next_page: bool,
        #[serde(default, rename = "totalPages")]
        total_pages: Option<u32>,
    },
    Bare(Vec<T>),
}

impl<T> From<PageRepr<T>> for Page<T> {
    fn from(repr: PageRepr<T>) -> Self {
        match repr {
            PageRepr::Paged {
                results,
                next_page,
                total_pages,
            } => Page {
                results,
                next_page,
                total_pages,
            },
            PageRepr::Bare(results) => Page {
                results,
                next_page: false,
                total_pages: Some(1),
            },
        }
    }
}

impl<T> Page<T> {
    /// A final page with no results.
    pub fn empty() -> Self {
        Page {
            results: Vec::new(),
            next_page: false,
            total_pages: None,
        }
    }
}

impl<T: DeserializeOwned> Page<T> {
    /// Reads a page from a reply. A successful reply with an empty body is
    /// an empty final page; a failed reply is an error.
    pub fn from_reply(reply: Reply) -> Result<Self> {
        match reply.into_result()? {
            None | Some(Value::Null) => Ok(Page::empty()),
            Some(body) => Ok(serde_json::from_value(body)?),
        }
    }
}

/// Fetches every page and concatenates the results.
///
/// `fetch` receives the 1-based page number. The walk stops when a page has
/// no `nextPage` flag, or when a page claims `nextPage` but carries no
/// results (the server is not making progress). Reaching [`MAX_PAGES`] is an
/// error rather than a silent truncation.
pub async fn collect_pages<T, F, Fut>(label: &str, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut all = Vec::new();
    let mut page_no = 1u32;

    loop {
        let page = fetch(page_no).await?;
        let received = page.results.len();
        all.extend(page.results);

        if !page.next_page {
            break;
        }
        if received == 0 {
            log::warn!("{label}: page {page_no} is empty but reports nextPage, stopping");
            break;
        }
        if page_no >= MAX_PAGES {
            return Err(OpsRampError::Pagination {
                label: label.to_string(),
                pages: page_no,
            });
        }

        match page.total_pages {
            Some(total) => log::debug!("{label}: fetching page {} of {total}", page_no + 1),
            None => log::debug!("{label}: fetching page {}", page_no + 1),
        }
        page_no += 1;
    }

    Ok(all)
}
