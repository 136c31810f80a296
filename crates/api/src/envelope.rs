//! The `{success, data, error}` response wrapper.

use serde::Serialize;

use orchestrator::Page;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_next: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_prev: Option<bool>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            total: None,
            page: None,
            limit: None,
            total_pages: None,
            has_next: None,
            has_prev: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            total: None,
            page: None,
            limit: None,
            total_pages: None,
            has_next: None,
            has_prev: None,
        }
    }

    pub fn with_total(mut self, total: usize) -> Self {
        self.total = Some(total);
        self
    }
}

impl<T> Envelope<Vec<T>> {
    /// A list response; `total` is the number of items.
    pub fn list(items: Vec<T>) -> Self {
        let total = items.len();
        Self::ok(items).with_total(total)
    }

    pub fn page(page: Page<T>) -> Self {
        let mut envelope = Self::ok(page.items).with_total(page.total);
        envelope.page = Some(page.page);
        envelope.limit = Some(page.limit);
        envelope.total_pages = Some(page.total_pages);
        envelope.has_next = Some(page.has_next);
        envelope.has_prev = Some(page.has_prev);
        envelope
    }
}
