use std::path::{Path, PathBuf};
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::config::BrowserConfig;
use crate::errors::ExportError;
use crate::page::{Download, ElementState, WebPage};
use crate::selector::Selector;

const DOM_QUERY: &str = include_str!("dom_query.js");
const MARK_ATTRIBUTE: &str = "data-custody-mark";

// Clears the marked input and leaves it focused for Input.insertText.
const PREPARE_FILL: &str = r#"(function (mark) {
  const el = document.querySelector(`[data-custody-mark="${mark}"]`);
  if (!el) return false;
  el.focus();
  const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
  const setter = Object.getOwnPropertyDescriptor(proto, "value").set;
  setter.call(el, "");
  el.dispatchEvent(new Event("input", { bubbles: true }));
  return true;
})"#;

const CHANGE_EVENT: &str = r#"(function (mark) {
  const el = document.querySelector(`[data-custody-mark="${mark}"]`);
  if (el) el.dispatchEvent(new Event("change", { bubbles: true }));
  return true;
})"#;

/// A visible Chrome (or Edge) window driven over the DevTools protocol.
pub struct ChromePage {
    browser: Mutex<Browser>,
    page: Page,
    handler_task: JoinHandle<()>,
    staging: TempDir,
    // throwaway profile when none is configured
    _profile: Option<TempDir>,
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

impl ChromePage {
    /// Launches the browser, opens a blank page and routes downloads into a
    /// private staging directory.
    #[instrument(skip(config))]
    pub async fn launch(config: &BrowserConfig) -> Result<Self, ExportError> {
        let executable = match &config.executable {
            Some(path) => path.clone(),
            None => find_chrome().ok_or_else(|| {
                ExportError::BrowserUnavailable(
                    "Chrome/Edge not found; set browser.executable in the configuration"
                        .to_string(),
                )
            })?,
        };

        let profile = match &config.user_data_dir {
            Some(_) => None,
            None => Some(TempDir::new()?),
        };
        let profile_dir = config
            .user_data_dir
            .clone()
            .or_else(|| profile.as_ref().map(|p| p.path().to_path_buf()))
            .unwrap_or_default();

        let cdp_config = CdpBrowserConfig::builder()
            .chrome_executable(&executable)
            .with_head()
            .viewport(None)
            .user_data_dir(&profile_dir)
            .launch_timeout(Duration::from_secs(config.launch_timeout_secs))
            .arg("--start-maximized")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-infobars")
            .build()
            .map_err(|e| ExportError::BrowserUnavailable(format!("Failed to configure browser: {e}")))?;

        let (browser, mut handler) = Browser::launch(cdp_config).await.map_err(|e| {
            ExportError::BrowserUnavailable(format!(
                "Failed to launch {}: {e}",
                executable.display()
            ))
        })?;
        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        let staging = TempDir::new()?;
        let behavior = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::AllowAndName)
            .download_path(staging.path().to_string_lossy().to_string())
            .events_enabled(true)
            .build()
            .map_err(ExportError::Browser)?;
        browser.execute(behavior).await?;

        let page = browser.new_page("about:blank").await?;
        info!(executable = %executable.display(), "browser launched");

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handler_task,
            staging,
            _profile: profile,
        })
    }

    async fn evaluate<T: serde::de::DeserializeOwned>(
        &self,
        expression: String,
    ) -> Result<T, ExportError> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(ExportError::Browser)?;
        self.page
            .evaluate_expression(params)
            .await?
            .into_value()
            .map_err(|e| ExportError::Browser(format!("unexpected script result: {e}")))
    }

    async fn run_query(
        &self,
        selector: &Selector,
        mark: Option<&str>,
    ) -> Result<Vec<ElementState>, ExportError> {
        if let Some(reason) = selector.invalid_reason() {
            return Err(ExportError::InvalidSelector(reason.to_string()));
        }
        let selector_json = serde_json::to_string(selector)
            .map_err(|e| ExportError::InvalidSelector(e.to_string()))?;
        let mark_json = serde_json::to_string(&mark)
            .map_err(|e| ExportError::InvalidSelector(e.to_string()))?;
        self.evaluate(format!("({DOM_QUERY})({selector_json}, {mark_json})"))
            .await
    }

    /// Resolves the selector, tags the first match and returns it as a CDP element.
    async fn resolve(&self, selector: &Selector) -> Result<(Element, String), ExportError> {
        let mark = uuid::Uuid::new_v4().to_string();
        let states = self.run_query(selector, Some(&mark)).await?;
        if states.is_empty() {
            return Err(ExportError::ElementNotFound(selector.to_string()));
        }
        let element = self
            .page
            .find_element(format!("[{MARK_ATTRIBUTE}=\"{mark}\"]"))
            .await?;
        Ok((element, mark))
    }

    async fn wait_for_download(
        &self,
        mut will_begin: impl futures::Stream<Item = std::sync::Arc<EventDownloadWillBegin>> + Unpin,
        mut progress: impl futures::Stream<Item = std::sync::Arc<EventDownloadProgress>> + Unpin,
    ) -> Result<Download, ExportError> {
        let closed = || ExportError::Download("browser event stream closed".to_string());
        let begin = will_begin.next().await.ok_or_else(closed)?;
        debug!(guid = %begin.guid, file = %begin.suggested_filename, "download started");
        loop {
            let update = progress.next().await.ok_or_else(closed)?;
            if update.guid != begin.guid {
                continue;
            }
            match update.state {
                DownloadProgressState::Completed => break,
                DownloadProgressState::Canceled => {
                    return Err(ExportError::Download(format!(
                        "download of {} was canceled",
                        begin.suggested_filename
                    )))
                }
                _ => {}
            }
        }
        Ok(Download {
            suggested_filename: begin.suggested_filename.clone(),
            path: self.staging.path().join(&begin.guid),
        })
    }
}

#[async_trait::async_trait]
impl WebPage for ChromePage {
    async fn goto(&self, url: &str) -> Result<(), ExportError> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn query(&self, selector: &Selector) -> Result<Vec<ElementState>, ExportError> {
        self.run_query(selector, None).await
    }

    async fn click(&self, selector: &Selector) -> Result<(), ExportError> {
        let (element, _) = self.resolve(selector).await?;
        element.click().await?;
        Ok(())
    }

    async fn fill(&self, selector: &Selector, value: &str) -> Result<(), ExportError> {
        let (_, mark) = self.resolve(selector).await?;
        let mark_json = serde_json::to_string(&mark)
            .map_err(|e| ExportError::InvalidSelector(e.to_string()))?;
        let ready: bool = self
            .evaluate(format!("({PREPARE_FILL})({mark_json})"))
            .await?;
        if !ready {
            return Err(ExportError::ElementNotFound(selector.to_string()));
        }
        if !value.is_empty() {
            self.page.execute(InsertTextParams::new(value)).await?;
        }
        let _: bool = self
            .evaluate(format!("({CHANGE_EVENT})({mark_json})"))
            .await?;
        Ok(())
    }

    async fn press(&self, selector: &Selector, key: &str) -> Result<(), ExportError> {
        let (element, _) = self.resolve(selector).await?;
        element.focus().await?;
        element.press_key(key).await?;
        Ok(())
    }

    async fn check(&self, selector: &Selector) -> Result<(), ExportError> {
        let states = self.run_query(selector, None).await?;
        match states.first() {
            Some(state) if state.checked => Ok(()),
            Some(_) => self.click(selector).await,
            None => Err(ExportError::ElementNotFound(selector.to_string())),
        }
    }

    async fn click_for_download(
        &self,
        selector: &Selector,
        timeout: Duration,
    ) -> Result<Download, ExportError> {
        let (will_begin, progress) = {
            let browser = self.browser.lock().await;
            (
                browser.event_listener::<EventDownloadWillBegin>().await?,
                browser.event_listener::<EventDownloadProgress>().await?,
            )
        };
        self.click(selector).await?;
        tokio::time::timeout(timeout, self.wait_for_download(will_begin, progress))
            .await
            .map_err(|_| {
                ExportError::Download(format!(
                    "no completed download within {timeout:?} after clicking {selector}"
                ))
            })?
    }

    async fn screenshot(&self, path: &Path) -> Result<(), ExportError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.page
            .save_screenshot(ScreenshotParams::builder().build(), path)
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), ExportError> {
        let mut browser = self.browser.lock().await;
        browser.close().await?;
        let _ = browser.wait().await;
        self.handler_task.abort();
        info!("browser closed");
        Ok(())
    }
}

fn which(program: &str) -> Option<PathBuf> {
    let finder = if cfg!(target_os = "windows") { "where" } else { "which" };
    let output = std::process::Command::new(finder).arg(program).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(PathBuf::from)
}

/// Find a Chrome, Chromium or Edge executable.
pub fn find_chrome() -> Option<PathBuf> {
    for program in ["google-chrome", "chromium", "chrome", "msedge"] {
        if let Some(path) = which(program) {
            return Some(path);
        }
    }

    let mut candidates: Vec<PathBuf> = [
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();
    if let Ok(local) = std::env::var("LOCALAPPDATA") {
        candidates.push(Path::new(&local).join(r"Google\Chrome\Application\chrome.exe"));
    }

    candidates.into_iter().find(|candidate| candidate.exists())
}
