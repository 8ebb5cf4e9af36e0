//! The seam between the portal logic and whatever drives the browser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::errors::ExportError;
use crate::selector::Selector;

/// Snapshot of one element matched by a selector
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ElementState {
    pub visible: bool,
    pub enabled: bool,
    pub checked: bool,
    #[serde(default)]
    pub text: String,
}

/// A finished browser download waiting in the staging directory
#[derive(Debug, Clone)]
pub struct Download {
    pub suggested_filename: String,
    pub path: PathBuf,
}

impl Download {
    /// Moves the downloaded file to `dest`, replacing whatever is there.
    pub fn save_as(&self, dest: &Path) -> Result<PathBuf, ExportError> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if dest.exists() {
            std::fs::remove_file(dest)?;
        }
        if std::fs::rename(&self.path, dest).is_err() {
            // staging dir may sit on another volume
            std::fs::copy(&self.path, dest)?;
            let _ = std::fs::remove_file(&self.path);
        }
        debug!(
            suggested = %self.suggested_filename,
            dest = %dest.display(),
            "download saved"
        );
        Ok(dest.to_path_buf())
    }
}

/// The common trait that all page drivers must implement.
///
/// Actions operate on the first element the selector resolves to and fail with
/// `ElementNotFound` when there is none; waiting is left to [`crate::Locator`].
#[async_trait::async_trait]
pub trait WebPage: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), ExportError>;

    /// State of every element currently matching the selector, in document order.
    async fn query(&self, selector: &Selector) -> Result<Vec<ElementState>, ExportError>;

    async fn click(&self, selector: &Selector) -> Result<(), ExportError>;

    /// Replaces the value of an input the way a user typing would.
    async fn fill(&self, selector: &Selector, value: &str) -> Result<(), ExportError>;

    async fn press(&self, selector: &Selector, key: &str) -> Result<(), ExportError>;

    async fn check(&self, selector: &Selector) -> Result<(), ExportError>;

    /// Clicks the element and waits for the download it triggers to finish.
    async fn click_for_download(
        &self,
        selector: &Selector,
        timeout: Duration,
    ) -> Result<Download, ExportError>;

    async fn screenshot(&self, path: &Path) -> Result<(), ExportError>;

    async fn close(&self) -> Result<(), ExportError>;
}
