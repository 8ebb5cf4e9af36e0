use std::sync::Arc;
use std::time::Duration;

use tokio::task;
use tracing::{debug, instrument};

use super::ncc::{match_template, TemplateMatch};
use super::screen::{ScreenDriver, ScreenPoint};
use super::template::{TemplateImage, TemplateLibrary};
use crate::config::MatcherConfig;
use crate::errors::ExportError;
use crate::logging::ExportLog;

/// Finds reference images on the live screen.
///
/// [`VisualLocator::locate`] only captures and matches; clicking is the
/// separate [`VisualLocator::click_at`] step.
#[derive(Clone)]
pub struct VisualLocator {
    screen: Arc<dyn ScreenDriver>,
    max_attempts: u32,
    interval: Duration,
    log: ExportLog,
}

impl VisualLocator {
    pub fn new(screen: Arc<dyn ScreenDriver>, config: &MatcherConfig, log: ExportLog) -> Self {
        Self {
            screen,
            max_attempts: config.max_attempts.max(1),
            interval: config.interval(),
            log,
        }
    }

    /// Same locator with a different attempt budget.
    pub fn with_attempts(&self, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..self.clone()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn screen(&self) -> &Arc<dyn ScreenDriver> {
        &self.screen
    }

    /// Captures and matches up to `max_attempts` times, `interval` apart.
    #[instrument(level = "debug", skip(self, template), fields(template = %template.name))]
    pub async fn locate(
        &self,
        template: &TemplateImage,
    ) -> Result<Option<TemplateMatch>, ExportError> {
        let mut best_score = f32::MIN;
        for attempt in 1..=self.max_attempts {
            if let Some(found) = self.capture_and_match(template).await? {
                debug!(attempt, score = found.score, "best candidate");
                if found.score >= template.threshold {
                    return Ok(Some(found));
                }
                best_score = best_score.max(found.score);
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }
        self.log.line(format!(
            "template {} not found after {} attempts (best score {:.3})",
            template.name, self.max_attempts, best_score
        ));
        Ok(None)
    }

    /// One capture of the screen matched against `template`, off the async
    /// worker threads.
    async fn capture_and_match(
        &self,
        template: &TemplateImage,
    ) -> Result<Option<TemplateMatch>, ExportError> {
        let frame = self.screen.capture()?;
        let pixels = template.pixels.clone();
        task::spawn_blocking(move || {
            let luma = image::DynamicImage::ImageRgba8(frame).to_luma8();
            match_template(&luma, &pixels)
        })
        .await
        .map_err(|e| ExportError::Screen(format!("Task join error: {e}")))
    }

    pub fn click_at(&self, point: ScreenPoint) -> Result<(), ExportError> {
        debug!(%point, "clicking");
        self.screen.click_at(point)
    }

    pub fn move_to(&self, point: ScreenPoint) -> Result<(), ExportError> {
        self.screen.move_to(point)
    }

    /// Locates the template and clicks at its centre shifted by `offset`.
    pub async fn locate_and_click(
        &self,
        template: &TemplateImage,
        offset: (i32, i32),
    ) -> Result<Option<ScreenPoint>, ExportError> {
        let Some(found) = self.locate(template).await? else {
            return Ok(None);
        };
        let point = found.center().offset(offset.0, offset.1);
        self.click_at(point)?;
        Ok(Some(point))
    }

    /// Loads `name` from the library first; a missing or undecodable file is
    /// logged and reported as not found.
    pub async fn locate_named(
        &self,
        library: &TemplateLibrary,
        name: &str,
    ) -> Result<Option<TemplateMatch>, ExportError> {
        match library.load(name) {
            Ok(template) => self.locate(&template).await,
            Err(e) => {
                self.log.line(format!("template {name} unavailable: {e}"));
                Ok(None)
            }
        }
    }

    pub async fn locate_named_and_click(
        &self,
        library: &TemplateLibrary,
        name: &str,
        offset: (i32, i32),
    ) -> Result<Option<ScreenPoint>, ExportError> {
        let Some(found) = self.locate_named(library, name).await? else {
            return Ok(None);
        };
        let point = found.center().offset(offset.0, offset.1);
        self.click_at(point)?;
        Ok(Some(point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemoryLogSink;
    use crate::tests::FakeScreen;
    use crate::vision::ncc::fixtures::noise_patch;

    fn locator(screen: Arc<FakeScreen>, attempts: u32) -> (VisualLocator, MemoryLogSink) {
        let memory = MemoryLogSink::new();
        let log = ExportLog::new().with_sink(Arc::new(memory.clone()));
        let config = MatcherConfig {
            max_attempts: attempts,
            interval_ms: 1000,
            ..MatcherConfig::default()
        };
        (VisualLocator::new(screen, &config, log), memory)
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_exactly_max_attempts() {
        let screen = Arc::new(FakeScreen::new(240, 160));
        let (locator, memory) = locator(screen.clone(), 4);
        let template = TemplateImage::from_pixels("absent.bmp", noise_patch(24, 16, 5), 0.8);

        let found = locator.locate(&template).await.unwrap();

        assert!(found.is_none());
        assert_eq!(screen.captures(), 4);
        assert!(screen.clicks().is_empty());
        assert!(memory.lines()[0].contains("not found after 4 attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_locate_and_click_applies_offset() {
        let screen = Arc::new(FakeScreen::new(240, 160));
        let patch = noise_patch(24, 16, 9);
        screen.show("printer", &patch, 100, 40);
        let (locator, _) = locator(screen.clone(), 3);
        let template = TemplateImage::from_pixels(crate::vision::TARGET_PRINTER, patch, 0.8);

        let clicked = locator.locate_and_click(&template, (250, 0)).await.unwrap();

        assert_eq!(clicked, Some(ScreenPoint::new(112 + 250, 48)));
        assert_eq!(screen.clicks(), vec![ScreenPoint::new(362, 48)]);
        assert_eq!(screen.captures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_template_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let library = TemplateLibrary::new(dir.path().join("seek"), dir.path().to_path_buf(), 0.5);
        let screen = Arc::new(FakeScreen::new(64, 64));
        let (locator, memory) = locator(screen.clone(), 2);

        let found = locator.locate_named(&library, "nowhere.bmp").await.unwrap();

        assert!(found.is_none());
        assert_eq!(screen.captures(), 0);
        assert!(memory.lines()[0].contains("nowhere.bmp"));
    }
}
