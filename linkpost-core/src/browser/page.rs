use async_trait::async_trait;

use super::error::BrowserResult;

/// Handle to an element located on a page. Implementations re-resolve it by
/// selector, so it stays valid across re-renders of the same form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageElement {
    pub selector: String,
}

impl PageElement {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
        }
    }
}

/// The page operations the posting actor needs. Callers bound every call
/// with their own timeout.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn navigate(&self, url: &str) -> BrowserResult<()>;
    async fn find(&self, selector: &str) -> BrowserResult<Option<PageElement>>;
    async fn fill(&self, element: &PageElement, text: &str) -> BrowserResult<()>;
    async fn click(&self, element: &PageElement) -> BrowserResult<()>;
    async fn wait_for_navigation(&self) -> BrowserResult<()>;
    async fn screenshot(&self) -> BrowserResult<Vec<u8>>;
    async fn page_text(&self) -> BrowserResult<String>;
    async fn current_url(&self) -> BrowserResult<Option<String>>;
    /// Releases the page and whatever isolated context backs it.
    async fn close(&self) -> BrowserResult<()>;
}

/// Opens one isolated page per posting attempt.
#[async_trait]
pub trait BrowserContextFactory: Send + Sync {
    async fn open_page(&self) -> BrowserResult<Box<dyn BrowserPage>>;
}
