//! The three per-account export operations.

mod download;
mod print;

use std::time::Duration;

use tracing::debug;

use crate::config::{AppConfig, MatcherConfig, Timeouts};
use crate::dialog::SaveDialogController;
use crate::errors::ExportError;
use crate::locator::Locator;
use crate::logging::ExportLog;
use crate::model::{AttemptOutcome, DocumentKind, ExportTarget};
use crate::selector::Selector;
use crate::session::PortalSession;
use crate::utils::find_first;
use crate::vision::{TemplateLibrary, VisualLocator};

pub use print::{wait_for_output, PriorOutput};

/// Everything the export operations need besides the portal session.
pub struct ExportSet {
    visual: VisualLocator,
    templates: TemplateLibrary,
    dialogs: SaveDialogController,
    timeouts: Timeouts,
    matcher: MatcherConfig,
    after_save: Duration,
    log: ExportLog,
}

impl ExportSet {
    pub fn new(
        config: &AppConfig,
        visual: VisualLocator,
        templates: TemplateLibrary,
        dialogs: SaveDialogController,
        log: ExportLog,
    ) -> Self {
        Self {
            visual,
            templates,
            dialogs,
            timeouts: config.timeouts.clone(),
            matcher: config.matcher.clone(),
            after_save: config.dialog.after_save(),
            log,
        }
    }

    pub fn visual(&self) -> &VisualLocator {
        &self.visual
    }

    /// Runs the operation producing `kind`.
    ///
    /// `Ok` carries success or a skip; `Err` is a failed attempt.
    pub async fn export(
        &self,
        session: &PortalSession,
        target: &ExportTarget,
        kind: DocumentKind,
    ) -> Result<AttemptOutcome, ExportError> {
        match kind {
            DocumentKind::Receipt => self.export_receipt(session, target).await,
            DocumentKind::Statement => self.export_statement(session, target).await,
            DocumentKind::Reconciliation => self.export_reconciliation(session, target).await,
        }
    }

    /// Scans the numbered dropdown containers for the first visible one that
    /// contains `item`, and returns a locator on the item inside it.
    pub async fn find_menu_item(
        &self,
        session: &PortalSession,
        item: &str,
    ) -> Result<Option<Locator>, ExportError> {
        let menus = session.locator(Selector::css(&session.layout().dropdown_menus));
        let count = menus.count().await?;
        debug!(count, item, "scanning dropdown menus");

        let candidates = (0..count).map(|i| menus.nth(i as i32).filter_has_text(item));
        let found = find_first(candidates, |candidate: Locator| async move {
            candidate.is_visible().await.unwrap_or(false)
        })
        .await;
        Ok(found.map(|menu| menu.locator(Selector::text(item))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{export_fixture, FakeNode};

    #[tokio::test(start_paused = true)]
    async fn test_menu_scan_picks_first_visible_match() {
        let fixture = export_fixture();
        let page = &fixture.page;
        page.with_dom(|dom| {
            let body = dom.root();
            let hidden = dom.add(body, FakeNode::new("div").id("dropdown-menu-1").hidden());
            dom.add(hidden, FakeNode::new("li").text("凭证导出"));
            let other = dom.add(body, FakeNode::new("div").id("dropdown-menu-2"));
            dom.add(other, FakeNode::new("li").text("全部导出"));
            let wanted = dom.add(body, FakeNode::new("div").id("dropdown-menu-3"));
            dom.add(wanted, FakeNode::new("li").text("凭证导出").tag_as("third"));
            let later = dom.add(body, FakeNode::new("div").id("dropdown-menu-4"));
            dom.add(later, FakeNode::new("li").text("凭证导出").tag_as("fourth"));
        });

        let item = fixture
            .exports
            .find_menu_item(&fixture.session, "凭证导出")
            .await
            .unwrap()
            .expect("visible menu item");
        item.click().await.unwrap();

        assert_eq!(page.clicked_tags(), vec!["third".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_menu_scan_reports_absence() {
        let fixture = export_fixture();
        let found = fixture
            .exports
            .find_menu_item(&fixture.session, "凭证导出")
            .await
            .unwrap();
        assert!(found.is_none());

        fixture.page.with_dom(|dom| {
            let body = dom.root();
            let menu = dom.add(body, FakeNode::new("div").id("dropdown-menu-7").hidden());
            dom.add(menu, FakeNode::new("li").text("凭证导出"));
        });
        let found = fixture
            .exports
            .find_menu_item(&fixture.session, "凭证导出")
            .await
            .unwrap();
        assert!(found.is_none());
    }
}
