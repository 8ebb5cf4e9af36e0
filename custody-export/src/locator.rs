use tracing::{debug, instrument};

use crate::errors::ExportError;
use crate::page::{Download, ElementState, WebPage};
use crate::selector::Selector;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// Default timeout if none is specified on the locator itself
const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A high-level, Playwright-style handle on elements of the portal page
///
/// A locator is only a description; every call re-resolves the selector, so it
/// survives re-renders of the single-page application.
#[derive(Clone)]
pub struct Locator {
    page: Arc<dyn WebPage>,
    selector: Selector,
    timeout: Duration, // Default timeout for this locator instance
}

impl Locator {
    pub fn new(page: Arc<dyn WebPage>, selector: impl Into<Selector>) -> Self {
        Self {
            page,
            selector: selector.into(),
            timeout: DEFAULT_LOCATOR_TIMEOUT,
        }
    }

    /// Set a default timeout for waiting operations on this locator instance.
    /// This timeout is used if no specific timeout is passed to action/wait methods.
    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn selector_string(&self) -> String {
        format!("{:?}", self.selector)
    }

    fn append_selector(&self, selector_to_append: Selector) -> Locator {
        Locator {
            page: self.page.clone(),
            selector: self.selector.clone().then(selector_to_append),
            timeout: self.timeout,
        }
    }

    /// Get a nested locator
    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        self.append_selector(selector.into())
    }

    pub fn nth(&self, index: i32) -> Locator {
        self.append_selector(Selector::Nth(index))
    }

    pub fn first(&self) -> Locator {
        self.nth(0)
    }

    /// Narrows the matches to those containing `text`.
    pub fn filter_has_text(&self, text: &str) -> Locator {
        self.append_selector(Selector::HasText(text.to_string()))
    }

    /// Adds a filter to find elements based on their visibility.
    pub fn visible(&self, is_visible: bool) -> Locator {
        self.append_selector(Selector::Visible(is_visible))
    }

    fn check_valid(&self) -> Result<(), ExportError> {
        match self.selector.invalid_reason() {
            Some(reason) => Err(ExportError::InvalidSelector(reason.to_string())),
            None => Ok(()),
        }
    }

    pub async fn all(&self) -> Result<Vec<ElementState>, ExportError> {
        self.check_valid()?;
        self.page.query(&self.selector).await
    }

    pub async fn count(&self) -> Result<usize, ExportError> {
        Ok(self.all().await?.len())
    }

    async fn first_state(&self) -> Result<Option<ElementState>, ExportError> {
        Ok(self.all().await?.into_iter().next())
    }

    pub async fn is_visible(&self) -> Result<bool, ExportError> {
        Ok(self.first_state().await?.is_some_and(|s| s.visible))
    }

    pub async fn is_enabled(&self) -> Result<bool, ExportError> {
        Ok(self.first_state().await?.is_some_and(|s| s.enabled))
    }

    pub async fn is_checked(&self) -> Result<bool, ExportError> {
        Ok(self.first_state().await?.is_some_and(|s| s.checked))
    }

    /// Wait for a visible element matching the locator, up to the specified timeout.
    /// If no timeout is provided, uses the locator's default timeout.
    #[instrument(level = "debug", skip(self, timeout))]
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<ElementState, ExportError> {
        debug!("Waiting for element matching selector: {:?}", self.selector);
        let effective_timeout = timeout.unwrap_or(self.timeout);
        let deadline = Instant::now() + effective_timeout;

        loop {
            match self.first_state().await {
                Ok(Some(state)) if state.visible => return Ok(state),
                Ok(_) => {}
                Err(e @ ExportError::InvalidSelector(_)) => return Err(e),
                Err(e) => debug!("query failed while waiting: {e}"),
            }
            if Instant::now() >= deadline {
                return Err(ExportError::Timeout(format!(
                    "Timed out after {effective_timeout:?} waiting for element {:?}",
                    self.selector_string()
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn click(&self) -> Result<(), ExportError> {
        self.wait(None).await?;
        self.page.click(&self.selector).await
    }

    pub async fn fill(&self, value: &str) -> Result<(), ExportError> {
        self.wait(None).await?;
        self.page.fill(&self.selector, value).await
    }

    pub async fn press(&self, key: &str) -> Result<(), ExportError> {
        self.wait(None).await?;
        self.page.press(&self.selector, key).await
    }

    pub async fn check(&self) -> Result<(), ExportError> {
        self.wait(None).await?;
        self.page.check(&self.selector).await
    }

    pub async fn click_for_download(&self, timeout: Duration) -> Result<Download, ExportError> {
        self.wait(None).await?;
        self.page.click_for_download(&self.selector, timeout).await
    }
}
