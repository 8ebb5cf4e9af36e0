//! Batch export of bank statements, receipts and printed reconciliations from
//! a custody web portal.
//!
//! A visible browser is driven through the portal while the print-to-PDF step,
//! which leaves the page for the browser's print preview and the operating
//! system's save dialog, is driven through screen template matching and
//! native window automation.

use std::sync::Arc;

use tracing::{info, warn};

pub mod batch;
pub mod browser;
pub mod config;
pub mod dialog;
pub mod errors;
pub mod exports;
pub mod locator;
pub mod logging;
pub mod model;
pub mod page;
pub mod platforms;
pub mod selector;
pub mod session;
#[cfg(test)]
mod tests;
pub mod utils;
pub mod vision;

pub use batch::{AccountReport, AccountStatus, BatchReport, BatchRunner, RunContext, Stage};
pub use config::AppConfig;
pub use errors::{ExportError, Severity};
pub use locator::Locator;
pub use logging::{ChannelLogSink, ExportLog, FileLogSink, LogSink, MemoryLogSink};
pub use model::{
    AccountBatch, AccountEntry, AttemptOutcome, DateRange, DocumentKind, ExportTarget,
    PreviousAccount,
};
pub use page::{Download, ElementState, WebPage};
pub use selector::Selector;
pub use session::{PortalLayout, PortalSession, RowSelection};

/// Runs a whole batch against the real portal: launches the browser, logs in,
/// processes every account and closes the browser again.
///
/// Only session start-up errors are returned; everything after that is
/// reported per account in the [`BatchReport`].
pub async fn run_export(
    config: &AppConfig,
    accounts: &AccountBatch,
    range: DateRange,
    log: ExportLog,
) -> Result<BatchReport, ExportError> {
    let desktop = platforms::create_desktop()?;
    let page: Arc<dyn WebPage> = Arc::new(browser::ChromePage::launch(&config.browser).await?);

    let mut ctx = RunContext::start(config, page, desktop, log).await?;
    let report = BatchRunner::new(&mut ctx).run(accounts, range).await;
    if let Err(e) = ctx.shutdown().await {
        warn!("closing browser: {e}");
    }
    info!(accounts = report.accounts.len(), "export run complete");
    Ok(report)
}
