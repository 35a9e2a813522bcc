// src/api/pagination.rs
//! Cursor-based pagination over any Notion list endpoint.
//!
//! A `Pager` fetches one page per call and holds nothing but the next
//! cursor, so it can be dropped at any point and restarted later with
//! `Paginator::paginate_from`.

use super::resilient::ResilientClient;
use super::types::PaginatedResponse;
use super::{ApiRequest, HttpMethod};
use crate::constants::NOTION_API_PAGE_SIZE;
use crate::error::AppError;
use futures::Stream;
use serde_json::{json, Value};
use std::sync::Arc;

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 1-based position within this pagination
    pub number: u32,
    pub items: Vec<Value>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

impl Page {
    /// Whether no further page follows this one.
    pub fn is_last(&self) -> bool {
        !self.has_more || self.next_cursor.is_none()
    }
}

/// Issues paged requests with a fixed page size.
#[derive(Clone)]
pub struct Paginator {
    client: Arc<ResilientClient>,
    page_size: u32,
}

impl Paginator {
    pub fn new(client: Arc<ResilientClient>, page_size: u32) -> Self {
        Self {
            client,
            page_size: page_size.clamp(1, NOTION_API_PAGE_SIZE),
        }
    }

    pub fn client(&self) -> &Arc<ResilientClient> {
        &self.client
    }

    /// Starts a pagination from the first page.
    pub fn paginate(&self, request: ApiRequest) -> Pager {
        self.paginate_from(request, None)
    }

    /// Starts a pagination at a previously returned cursor.
    pub fn paginate_from(&self, request: ApiRequest, cursor: Option<String>) -> Pager {
        Pager {
            client: Arc::clone(&self.client),
            page_size: self.page_size,
            request,
            cursor,
            pages_fetched: 0,
            finished: false,
        }
    }
}

/// A lazy sequence of pages for one request.
pub struct Pager {
    client: Arc<ResilientClient>,
    page_size: u32,
    request: ApiRequest,
    cursor: Option<String>,
    pages_fetched: u32,
    finished: bool,
}

impl Pager {
    /// Fetches the next page, or `None` once the listing is exhausted.
    ///
    /// A failed fetch leaves the cursor where it was; calling again
    /// re-requests the same page.
    pub async fn next_page(&mut self) -> Result<Option<Page>, AppError> {
        if self.finished {
            return Ok(None);
        }

        let request = self.page_request();
        let value = self.client.execute(&request).await?;
        let response: PaginatedResponse = serde_json::from_value(value)?;

        self.pages_fetched += 1;
        let page = Page {
            number: self.pages_fetched,
            items: response.results,
            next_cursor: response.next_cursor,
            has_more: response.has_more,
        };
        log::debug!(
            "{} page {}: {} items, more: {}",
            self.request.endpoint(),
            page.number,
            page.items.len(),
            !page.is_last()
        );

        self.finished = page.is_last();
        self.cursor = if self.finished {
            None
        } else {
            page.next_cursor.clone()
        };
        Ok(Some(page))
    }

    /// Cursor the next call will request from, if any.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Drains every remaining page into one list.
    pub async fn collect_items(mut self) -> Result<Vec<Value>, AppError> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page.items);
        }
        Ok(items)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Page, AppError>> {
        futures::stream::try_unfold(self, |mut pager| async move {
            Ok(pager.next_page().await?.map(|page| (page, pager)))
        })
    }

    /// The request for the current cursor: query parameters for GET,
    /// body fields for POST.
    fn page_request(&self) -> ApiRequest {
        let mut request = self.request.clone();
        match request.method {
            HttpMethod::Get => {
                request = request.with_query("page_size", self.page_size.to_string());
                if let Some(cursor) = &self.cursor {
                    request = request.with_query("start_cursor", cursor.clone());
                }
            }
            HttpMethod::Post => {
                let mut body = request.body.take().unwrap_or_else(|| json!({}));
                if let Some(fields) = body.as_object_mut() {
                    fields.insert("page_size".to_string(), json!(self.page_size));
                    if let Some(cursor) = &self.cursor {
                        fields.insert("start_cursor".to_string(), json!(cursor));
                    }
                }
                request.body = Some(body);
            }
        }
        request
    }
}
