//! Drives the operating system's native "Save As" dialog.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::DialogConfig;
use crate::errors::ExportError;
use crate::logging::ExportLog;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How a window title is matched
#[derive(Debug, Clone)]
pub enum TitleMatch {
    Exact(String),
    /// Matched from the start of the title
    Pattern(Regex),
}

impl TitleMatch {
    pub fn matches(&self, title: &str) -> bool {
        match self {
            TitleMatch::Exact(expected) => title == expected,
            TitleMatch::Pattern(re) => re.is_match(title),
        }
    }
}

/// One native window the controller can act on
pub trait DialogWindow: Send + Sync {
    fn title(&self) -> String;

    fn focus(&self) -> Result<(), ExportError>;

    /// Replaces the content of the window's file-name edit control.
    fn set_edit_text(&self, text: &str) -> Result<(), ExportError>;

    /// Clicks the first button whose name matches `name`.
    fn click_button(&self, name: &Regex) -> Result<(), ExportError>;
}

/// Enumerates native top-level windows
pub trait DialogBackend: Send + Sync {
    fn top_level_windows(
        &self,
        title: &TitleMatch,
    ) -> Result<Vec<Box<dyn DialogWindow>>, ExportError>;
}

fn anchored(pattern: &str, what: &str) -> Result<Regex, ExportError> {
    Regex::new(&format!("^(?:{pattern})"))
        .map_err(|e| ExportError::Config(format!("invalid {what} pattern '{pattern}': {e}")))
}

pub struct SaveDialogController {
    backend: Arc<dyn DialogBackend>,
    save_title: TitleMatch,
    save_button: Regex,
    overwrite_title: TitleMatch,
    overwrite_button: Regex,
    appear_timeout: Duration,
    settle: Duration,
    overwrite_timeout: Duration,
    log: ExportLog,
}

impl SaveDialogController {
    pub fn new(
        backend: Arc<dyn DialogBackend>,
        config: &DialogConfig,
        log: ExportLog,
    ) -> Result<Self, ExportError> {
        Ok(Self {
            backend,
            save_title: TitleMatch::Exact(config.save_title.clone()),
            save_button: anchored(&config.save_button, "save button")?,
            overwrite_title: TitleMatch::Pattern(anchored(&config.overwrite_title, "overwrite title")?),
            overwrite_button: anchored(&config.overwrite_button, "overwrite button")?,
            appear_timeout: config.appear_timeout(),
            settle: config.settle(),
            overwrite_timeout: config.overwrite_timeout(),
            log,
        })
    }

    async fn wait_for_save_windows(&self) -> Result<Vec<Box<dyn DialogWindow>>, ExportError> {
        let deadline = Instant::now() + self.appear_timeout;
        loop {
            let windows = self.backend.top_level_windows(&self.save_title)?;
            if !windows.is_empty() {
                return Ok(windows);
            }
            if Instant::now() >= deadline {
                return Err(ExportError::DialogNotFound(format!(
                    "no window titled {:?} within {:?}",
                    self.save_title, self.appear_timeout
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn save_in_window(
        &self,
        window: &dyn DialogWindow,
        destination: &Path,
    ) -> Result<(), ExportError> {
        window.focus()?;
        window.set_edit_text(&destination.to_string_lossy())?;
        window.click_button(&self.save_button)?;
        tokio::time::sleep(self.settle).await;
        self.confirm_overwrite().await?;
        Ok(())
    }

    /// Types the full destination path into the save dialog and confirms it.
    ///
    /// Every window carrying the dialog title is tried in turn; the first one
    /// that completes the sequence wins.
    #[instrument(level = "debug", skip(self, directory))]
    pub async fn save_through_dialog(
        &self,
        directory: &Path,
        file_name: &str,
    ) -> Result<PathBuf, ExportError> {
        let destination = directory.join(file_name);
        let windows = self.wait_for_save_windows().await?;
        let total = windows.len();
        let mut last_error = None;

        for (index, window) in windows.iter().enumerate() {
            debug!(index, title = %window.title(), "trying save dialog candidate");
            match self.save_in_window(window.as_ref(), &destination).await {
                Ok(()) => {
                    info!(path = %destination.display(), "saved through native dialog");
                    return Ok(destination);
                }
                Err(e) => {
                    warn!(index, "save dialog candidate failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        self.log
            .line(format!("save dialog failed on all {total} candidate windows: {reason}"));
        Err(ExportError::Dialog(format!(
            "all {total} save dialog candidates failed, last error: {reason}"
        )))
    }

    /// Clicks the affirmative button of a "file already exists" prompt if one
    /// shows up within the overwrite timeout. Returns whether it did.
    pub async fn confirm_overwrite(&self) -> Result<bool, ExportError> {
        let deadline = Instant::now() + self.overwrite_timeout;
        loop {
            match self.backend.top_level_windows(&self.overwrite_title) {
                Ok(windows) => {
                    for window in &windows {
                        if let Err(e) = window.focus() {
                            debug!("overwrite prompt did not take focus: {e}");
                        }
                        match window.click_button(&self.overwrite_button) {
                            Ok(()) => {
                                info!(title = %window.title(), "confirmed overwrite");
                                return Ok(true);
                            }
                            Err(e) => debug!("overwrite prompt button not clickable: {e}"),
                        }
                    }
                }
                Err(e @ ExportError::UnsupportedPlatform(_)) => return Err(e),
                Err(e) => debug!("enumerating overwrite prompts failed: {e}"),
            }
            if Instant::now() >= deadline {
                debug!("no overwrite confirmation appeared");
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
