use tracing::{info, instrument};

use super::ExportSet;
use crate::errors::ExportError;
use crate::model::{AttemptOutcome, DocumentKind, ExportTarget};
use crate::selector::Selector;
use crate::session::PortalSession;

impl ExportSet {
    /// Receipt PDF: export button, then the "voucher export" entry of
    /// whichever dropdown shows it.
    #[instrument(skip_all)]
    pub async fn export_receipt(
        &self,
        session: &PortalSession,
        target: &ExportTarget,
    ) -> Result<AttemptOutcome, ExportError> {
        let layout = session.layout();
        session
            .locator(Selector::role("button", &layout.export_button))
            .click()
            .await?;
        tokio::time::sleep(self.timeouts.menu_settle()).await;

        let Some(item) = self.find_menu_item(session, &layout.receipt_menu_item).await? else {
            return Ok(AttemptOutcome::Skipped(format!(
                "menu item not found: {}",
                layout.receipt_menu_item
            )));
        };

        let download = item.click_for_download(self.timeouts.download()).await?;
        target.ensure_dir(DocumentKind::Receipt)?;
        let path = download.save_as(&target.path_for(DocumentKind::Receipt))?;
        info!(path = %path.display(), "receipt saved");
        Ok(AttemptOutcome::Success(path))
    }

    /// Statement spreadsheet: export button, then the statement entry.
    #[instrument(skip_all)]
    pub async fn export_statement(
        &self,
        session: &PortalSession,
        target: &ExportTarget,
    ) -> Result<AttemptOutcome, ExportError> {
        let layout = session.layout();
        session
            .locator(Selector::role("button", &layout.export_button))
            .click()
            .await?;
        let download = session
            .locator(Selector::text_exact(&layout.statement_menu_item))
            .click_for_download(self.timeouts.download())
            .await?;
        target.ensure_dir(DocumentKind::Statement)?;
        let path = download.save_as(&target.path_for(DocumentKind::Statement))?;
        info!(path = %path.display(), "statement saved");
        Ok(AttemptOutcome::Success(path))
    }
}
