use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::time::Instant;
use tracing::{debug, info, instrument};

use super::ExportSet;
use crate::errors::ExportError;
use crate::model::{AttemptOutcome, DocumentKind, ExportTarget};
use crate::selector::Selector;
use crate::session::PortalSession;
use crate::vision::{
    ScreenPoint, MENU_PRINT, PRINT_DIALOG_TEMPLATES, SAVE_AS_PDF_DEFAULT, SAVE_AS_PDF_HOVER,
    SAVE_BUTTON, TARGET_PRINTER,
};

const OUTPUT_POLL: Duration = Duration::from_millis(250);

/// What an output path held before the save dialog ran.
#[derive(Debug, Default)]
pub struct PriorOutput {
    modified: Option<SystemTime>,
    contents: Option<Vec<u8>>,
}

impl PriorOutput {
    pub fn capture(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(meta) => Self {
                modified: meta.modified().ok(),
                contents: std::fs::read(path).ok(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Whether `path` holds something written after the capture.
    fn replaced_by(&self, path: &Path) -> bool {
        let Some(previous) = &self.contents else {
            return true;
        };
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        modified != self.modified || std::fs::read(path).is_ok_and(|now| &now != previous)
    }
}

/// Waits until `path` holds a non-empty file that differs from `prior`.
pub async fn wait_for_output(
    path: &Path,
    prior: &PriorOutput,
    timeout: Duration,
) -> Result<PathBuf, ExportError> {
    let deadline = Instant::now() + timeout;
    loop {
        let written = std::fs::metadata(path).is_ok_and(|m| m.len() > 0);
        if written && prior.replaced_by(path) {
            return Ok(path.to_path_buf());
        }
        if Instant::now() >= deadline {
            let shown = path.display().to_string();
            return Err(if written {
                ExportError::StaleOutput(shown)
            } else {
                ExportError::EmptyOutput(shown)
            });
        }
        tokio::time::sleep(OUTPUT_POLL).await;
    }
}

impl ExportSet {
    async fn open_print_menu(&self, session: &PortalSession) -> Result<bool, ExportError> {
        let layout = session.layout();
        if let Some(item) = self.find_menu_item(session, &layout.print_menu_item).await? {
            item.click().await?;
            return Ok(true);
        }
        debug!("print entry not in any dropdown, trying the menu template");
        let clicked = self
            .visual
            .with_attempts(self.matcher.menu_template_attempts)
            .locate_named_and_click(&self.templates, MENU_PRINT, (0, 0))
            .await?;
        Ok(clicked.is_some())
    }

    async fn choose_save_as_pdf(&self, printer_dropdown: ScreenPoint) -> Result<(), ExportError> {
        let single = self.visual.with_attempts(1);
        let hover_point = printer_dropdown.offset(0, self.matcher.hover_offset_y);
        for attempt in 1..=self.matcher.save_as_pdf_attempts {
            self.visual.move_to(hover_point)?;
            for name in [SAVE_AS_PDF_DEFAULT, SAVE_AS_PDF_HOVER] {
                if single
                    .locate_named_and_click(&self.templates, name, (0, 0))
                    .await?
                    .is_some()
                {
                    debug!(attempt, template = name, "save as pdf selected");
                    return Ok(());
                }
            }
            if attempt < self.matcher.save_as_pdf_attempts {
                tokio::time::sleep(self.matcher.interval()).await;
            }
        }
        Err(ExportError::TemplateNotFound(format!(
            "{SAVE_AS_PDF_DEFAULT} / {SAVE_AS_PDF_HOVER}"
        )))
    }

    /// Reconciliation PDF through the browser's print preview and the native
    /// save dialog.
    ///
    /// A template that never shows up on screen skips the document; a template
    /// file that cannot be loaded fails it.
    #[instrument(skip_all)]
    pub async fn export_reconciliation(
        &self,
        session: &PortalSession,
        target: &ExportTarget,
    ) -> Result<AttemptOutcome, ExportError> {
        let layout = session.layout();
        session
            .locator(Selector::role("button", &layout.print_button))
            .click()
            .await?;
        tokio::time::sleep(self.timeouts.menu_settle()).await;

        if !self.open_print_menu(session).await? {
            return Ok(AttemptOutcome::Skipped(format!(
                "menu item not found: {}",
                layout.print_menu_item
            )));
        }

        self.templates.require(&PRINT_DIALOG_TEMPLATES)?;
        tokio::time::sleep(self.timeouts.print_preview()).await;

        match self.print_to_pdf(target).await {
            Ok(path) => {
                info!(path = %path.display(), "reconciliation saved");
                Ok(AttemptOutcome::Success(path))
            }
            Err(ExportError::TemplateNotFound(name)) => Ok(AttemptOutcome::Skipped(format!(
                "template not found on screen: {name}"
            ))),
            Err(e) => Err(e),
        }
    }

    async fn print_to_pdf(&self, target: &ExportTarget) -> Result<PathBuf, ExportError> {
        let printer = self
            .visual
            .locate_named(&self.templates, TARGET_PRINTER)
            .await?
            .ok_or_else(|| ExportError::TemplateNotFound(TARGET_PRINTER.to_string()))?;
        let dropdown = printer.center().offset(self.matcher.printer_offset_x, 0);
        self.visual.click_at(dropdown)?;

        self.choose_save_as_pdf(dropdown).await?;

        self.visual
            .locate_named_and_click(&self.templates, SAVE_BUTTON, (0, 0))
            .await?
            .ok_or_else(|| ExportError::TemplateNotFound(SAVE_BUTTON.to_string()))?;

        let kind = DocumentKind::Reconciliation;
        let directory = target.ensure_dir(kind)?;
        let prior = PriorOutput::capture(&target.path_for(kind));
        let saved = self
            .dialogs
            .save_through_dialog(&directory, &target.file_name_for(kind))
            .await?;
        wait_for_output(&saved, &prior, self.after_save).await
    }
}
