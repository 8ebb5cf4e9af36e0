//! Per-account state machine over a logged-in session.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument, warn};

use crate::config::AppConfig;
use crate::dialog::SaveDialogController;
use crate::errors::ExportError;
use crate::exports::ExportSet;
use crate::logging::ExportLog;
use crate::model::{
    AccountBatch, AccountEntry, AttemptOutcome, DateRange, DocumentKind, ExportTarget,
    PreviousAccount,
};
use crate::page::WebPage;
use crate::platforms::Desktop;
use crate::session::{PortalSession, RowSelection};
use crate::vision::{save_screenshot, ScreenDriver, TemplateLibrary, VisualLocator};

/// Where in the per-account sequence something went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Select,
    Query,
    Rows,
    NoData,
    Menu,
    Receipt,
    Statement,
    Print,
}

impl Stage {
    pub fn for_document(kind: DocumentKind) -> Self {
        match kind {
            DocumentKind::Receipt => Stage::Receipt,
            DocumentKind::Statement => Stage::Statement,
            DocumentKind::Reconciliation => Stage::Print,
        }
    }

    /// Stage named by the screenshot of a skipped document.
    pub fn for_skipped(kind: DocumentKind) -> Self {
        match kind {
            DocumentKind::Receipt | DocumentKind::Statement => Stage::Menu,
            DocumentKind::Reconciliation => Stage::Print,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Select => "select",
            Stage::Query => "query",
            Stage::Rows => "rows",
            Stage::NoData => "no_data",
            Stage::Menu => "menu",
            Stage::Receipt => "receipt",
            Stage::Statement => "statement",
            Stage::Print => "print",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountStatus {
    /// All three operations were attempted
    Processed,
    NoData,
    Failed { stage: Stage, error: String },
}

#[derive(Debug, Clone)]
pub struct AccountReport {
    pub entry: AccountEntry,
    pub status: AccountStatus,
    pub outcomes: Vec<(DocumentKind, AttemptOutcome)>,
}

impl AccountReport {
    pub fn outcome(&self, kind: DocumentKind) -> Option<&AttemptOutcome> {
        self.outcomes.iter().find(|(k, _)| *k == kind).map(|(_, o)| o)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub accounts: Vec<AccountReport>,
}

impl BatchReport {
    pub fn account(&self, project_name: &str) -> Option<&AccountReport> {
        self.accounts
            .iter()
            .find(|a| a.entry.project_name == project_name)
    }

    pub fn exported_files(&self) -> Vec<&Path> {
        self.accounts
            .iter()
            .flat_map(|a| a.outcomes.iter())
            .filter_map(|(_, outcome)| match outcome {
                AttemptOutcome::Success(path) => Some(path.as_path()),
                _ => None,
            })
            .collect()
    }

    pub fn failed_accounts(&self) -> usize {
        self.accounts
            .iter()
            .filter(|a| matches!(a.status, AccountStatus::Failed { .. }))
            .count()
    }
}

/// A logged-in session plus everything needed to export from it.
pub struct RunContext {
    session: PortalSession,
    exports: ExportSet,
    screen: Arc<dyn ScreenDriver>,
    download_root: PathBuf,
    log: ExportLog,
}

impl RunContext {
    /// Logs in and opens the account detail page. Any error here is fatal to
    /// the batch; the page is closed before it is returned.
    #[instrument(skip_all)]
    pub async fn start(
        config: &AppConfig,
        page: Arc<dyn WebPage>,
        desktop: Desktop,
        log: ExportLog,
    ) -> Result<Self, ExportError> {
        let session = PortalSession::new(
            page.clone(),
            config.layout.clone(),
            config.timeouts.clone(),
            Duration::from_secs(config.browser.default_timeout_secs),
            log.clone(),
        );

        let ready = async {
            session.login(&config.portal).await?;
            session.navigate_to_account_detail().await
        };
        if let Err(e) = ready.await {
            error!("session start failed: {e}");
            log.line(format!("session start failed: {e}"));
            if let Err(close_err) = page.close().await {
                warn!("closing browser after failed start: {close_err}");
            }
            return Err(e);
        }

        let visual = VisualLocator::new(desktop.screen.clone(), &config.matcher, log.clone());
        let templates = TemplateLibrary::new(
            config.resource_dir(),
            config.base_dir.clone(),
            config.matcher.threshold,
        );
        let dialogs = SaveDialogController::new(desktop.dialogs.clone(), &config.dialog, log.clone())?;
        let exports = ExportSet::new(config, visual, templates, dialogs, log.clone());

        Ok(Self {
            session,
            exports,
            screen: desktop.screen,
            download_root: config.download_root.clone(),
            log,
        })
    }

    pub fn session(&self) -> &PortalSession {
        &self.session
    }

    /// Closes the browser.
    pub async fn shutdown(self) -> Result<(), ExportError> {
        self.session.close().await
    }

    /// Saves a screenshot for a failed or skipped stage, preferring the full screen so
    /// native dialogs show up too.
    async fn diagnostic_screenshot(&self, stage: Stage, entry: &AccountEntry) -> Option<PathBuf> {
        let path = self
            .download_root
            .join(format!("error_{stage}_{}.png", entry.folder_name()));
        match save_screenshot(self.screen.as_ref(), &path) {
            Ok(()) => return Some(path),
            Err(e) => warn!("screen capture failed, falling back to page screenshot: {e}"),
        }
        match self.session.page().screenshot(&path).await {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("diagnostic screenshot failed: {e}");
                None
            }
        }
    }
}

/// Walks an account list through one [`RunContext`].
pub struct BatchRunner<'a> {
    ctx: &'a mut RunContext,
    previous: Option<PreviousAccount>,
}

impl<'a> BatchRunner<'a> {
    pub fn new(ctx: &'a mut RunContext) -> Self {
        Self {
            ctx,
            previous: None,
        }
    }

    /// Project whose label the portal's search box currently carries.
    pub fn previous(&self) -> Option<&PreviousAccount> {
        self.previous.as_ref()
    }

    /// Processes every account in order. Per-account errors are logged and
    /// recorded; they never stop the batch.
    pub async fn run(&mut self, accounts: &AccountBatch, range: DateRange) -> BatchReport {
        let mut report = BatchReport::default();
        self.ctx.log.line(format!(
            "starting batch of {} accounts for {range}",
            accounts.len()
        ));
        for entry in accounts.entries() {
            let account = self.process(entry, range).await;
            report.accounts.push(account);
        }
        self.ctx.log.line(format!(
            "batch finished: {} accounts, {} files exported, {} accounts failed",
            report.accounts.len(),
            report.exported_files().len(),
            report.failed_accounts()
        ));
        report
    }

    async fn fail(&self, entry: &AccountEntry, stage: Stage, error: ExportError) -> AccountReport {
        error!(project = %entry.project_name, %stage, "account failed: {error}");
        self.ctx.log.line(format!(
            "{} ({}) failed at {stage}: {error}",
            entry.project_name, entry.account_identifier
        ));
        self.ctx.diagnostic_screenshot(stage, entry).await;
        AccountReport {
            entry: entry.clone(),
            status: AccountStatus::Failed {
                stage,
                error: error.to_string(),
            },
            outcomes: Vec::new(),
        }
    }

    #[instrument(skip_all, fields(project = %entry.project_name))]
    async fn process(&mut self, entry: &AccountEntry, range: DateRange) -> AccountReport {
        info!(account = %entry.account_identifier, "processing account");
        self.ctx.log.line(format!(
            "processing {} ({})",
            entry.project_name, entry.account_identifier
        ));

        if let Err(e) = self
            .ctx
            .session
            .search_and_select(entry, self.previous.as_ref())
            .await
        {
            return self.fail(entry, Stage::Select, e).await;
        }
        if let Err(e) = self.ctx.session.apply_date_range(&range).await {
            return self.fail(entry, Stage::Query, e).await;
        }
        if let Err(e) = self.ctx.session.run_query().await {
            return self.fail(entry, Stage::Query, e).await;
        }
        match self.ctx.session.select_all_rows().await {
            Ok(RowSelection::Selected) => {}
            Ok(RowSelection::NoData) => {
                self.ctx.log.line(format!(
                    "{} ({}) has no data for {range}, skipped",
                    entry.project_name, entry.account_identifier
                ));
                self.ctx.diagnostic_screenshot(Stage::NoData, entry).await;
                return AccountReport {
                    entry: entry.clone(),
                    status: AccountStatus::NoData,
                    outcomes: Vec::new(),
                };
            }
            Err(e) => return self.fail(entry, Stage::Rows, e).await,
        }

        let target = ExportTarget::new(&self.ctx.download_root, entry, range);
        let mut outcomes = Vec::with_capacity(DocumentKind::ALL.len());
        for kind in DocumentKind::ALL {
            let outcome = match self.ctx.exports.export(&self.ctx.session, &target, kind).await {
                Ok(outcome @ AttemptOutcome::Skipped(_)) => {
                    self.ctx
                        .diagnostic_screenshot(Stage::for_skipped(kind), entry)
                        .await;
                    outcome
                }
                Ok(outcome) => outcome,
                Err(e) => {
                    let stage = Stage::for_document(kind);
                    warn!(%stage, "export failed: {e}");
                    self.ctx.diagnostic_screenshot(stage, entry).await;
                    AttemptOutcome::Failed(e.to_string())
                }
            };
            self.ctx
                .log
                .line(format!("{} {kind}: {outcome}", entry.project_name));
            outcomes.push((kind, outcome));
        }

        self.previous = Some(PreviousAccount::new(&entry.project_name));
        AccountReport {
            entry: entry.clone(),
            status: AccountStatus::Processed,
            outcomes,
        }
    }
}
