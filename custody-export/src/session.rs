//! Logged-in session against the custody portal.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::{PortalCredentials, Timeouts};
use crate::errors::ExportError;
use crate::locator::Locator;
use crate::logging::ExportLog;
use crate::model::{AccountEntry, DateRange, PreviousAccount};
use crate::page::WebPage;
use crate::selector::Selector;

/// Every label the driver targets on the portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalLayout {
    pub username_field: String,
    pub password_field: String,
    /// Text that only appears once the user is logged in
    pub login_landmark: String,
    pub account_menu_link: String,
    pub account_detail_link: String,
    pub search_box: String,
    pub expand_filters: String,
    pub start_date_field: String,
    pub end_date_field: String,
    pub query_button: String,
    pub select_all_checkbox: String,
    pub export_button: String,
    pub print_button: String,
    /// CSS for the dynamically numbered dropdown containers
    pub dropdown_menus: String,
    pub receipt_menu_item: String,
    pub statement_menu_item: String,
    pub print_menu_item: String,
}

impl Default for PortalLayout {
    fn default() -> Self {
        Self {
            username_field: "用户名".to_string(),
            password_field: "请输入您的密码".to_string(),
            login_landmark: "账户管理".to_string(),
            account_menu_link: "账户管理".to_string(),
            account_detail_link: "账户明细".to_string(),
            search_box: "输入项目名称或项目对应账号关键字进行查询".to_string(),
            expand_filters: "展开".to_string(),
            start_date_field: "开始日期".to_string(),
            end_date_field: "结束日期".to_string(),
            query_button: "查询".to_string(),
            select_all_checkbox: "Toggle Selection of All Rows".to_string(),
            export_button: "导出".to_string(),
            print_button: "打印".to_string(),
            dropdown_menus: "[id^='dropdown-menu-']".to_string(),
            receipt_menu_item: "凭证导出".to_string(),
            statement_menu_item: "对账单导出".to_string(),
            print_menu_item: "对账单打印".to_string(),
        }
    }
}

/// Whether the result grid had anything to select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSelection {
    Selected,
    NoData,
}

pub struct PortalSession {
    page: Arc<dyn WebPage>,
    layout: PortalLayout,
    timeouts: Timeouts,
    default_timeout: Duration,
    log: ExportLog,
    date_range_applied: bool,
}

impl PortalSession {
    pub fn new(
        page: Arc<dyn WebPage>,
        layout: PortalLayout,
        timeouts: Timeouts,
        default_timeout: Duration,
        log: ExportLog,
    ) -> Self {
        Self {
            page,
            layout,
            timeouts,
            default_timeout,
            log,
            date_range_applied: false,
        }
    }

    pub fn page(&self) -> &Arc<dyn WebPage> {
        &self.page
    }

    pub fn layout(&self) -> &PortalLayout {
        &self.layout
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Locator on the session page using the session's default timeout.
    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        Locator::new(self.page.clone(), selector).set_default_timeout(self.default_timeout)
    }

    fn textbox(&self, name: &str) -> Locator {
        self.locator(Selector::role("textbox", name))
    }

    /// Fills the credentials and waits for the post-login landmark.
    ///
    /// The wait is long so a human can finish a CAPTCHA in the visible window.
    #[instrument(skip(self, credentials), fields(url = %credentials.login_url))]
    pub async fn login(&self, credentials: &PortalCredentials) -> Result<(), ExportError> {
        self.page.goto(&credentials.login_url).await?;
        self.textbox(&self.layout.username_field)
            .fill(&credentials.username)
            .await?;
        self.textbox(&self.layout.password_field)
            .fill(&credentials.password)
            .await?;
        self.log.line("credentials entered, waiting for login to complete");

        let landmark = self.locator(Selector::text(&self.layout.login_landmark));
        match landmark.wait(Some(self.timeouts.login())).await {
            Ok(_) => {
                info!("logged in");
                self.log.line("login succeeded");
                Ok(())
            }
            Err(ExportError::Timeout(_)) => Err(ExportError::LoginTimeout(format!(
                "'{}' did not appear within {:?}",
                self.layout.login_landmark,
                self.timeouts.login()
            ))),
            Err(e) => Err(e),
        }
    }

    pub async fn navigate_to_account_detail(&self) -> Result<(), ExportError> {
        self.locator(Selector::role("link", &self.layout.account_menu_link))
            .click()
            .await?;
        self.locator(Selector::role("link", &self.layout.account_detail_link))
            .click()
            .await?;
        debug!("on account detail page");
        Ok(())
    }

    /// Searches for the account and selects its project.
    ///
    /// Once a project has been selected the search box is labelled after it,
    /// so later searches go through the box named by `previous`.
    #[instrument(skip(self, entry, previous), fields(project = %entry.project_name))]
    pub async fn search_and_select(
        &self,
        entry: &AccountEntry,
        previous: Option<&PreviousAccount>,
    ) -> Result<(), ExportError> {
        let default_box = self.textbox(&self.layout.search_box);
        match previous {
            None => {
                default_box.click().await?;
                default_box.fill(&entry.account_identifier).await?;
                tokio::time::sleep(self.timeouts.search_settle()).await;
                self.locator(Selector::from("role:listitem"))
                    .filter_has_text(&entry.project_name)
                    .locator("css:span")
                    .nth(2)
                    .click()
                    .await?;
            }
            Some(previous) => {
                default_box.click().await?;
                self.textbox(&previous.search_label())
                    .fill(&entry.account_identifier)
                    .await?;
                tokio::time::sleep(self.timeouts.search_settle()).await;
                self.locator(Selector::role("link", &entry.account_identifier))
                    .click()
                    .await?;
            }
        }
        debug!("project selected");
        Ok(())
    }

    /// Opens the filter panel and enters the period. Only the first call per
    /// session does anything; the portal keeps the filter afterwards.
    pub async fn apply_date_range(&mut self, range: &DateRange) -> Result<(), ExportError> {
        if self.date_range_applied {
            return Ok(());
        }
        self.locator(Selector::text(&self.layout.expand_filters))
            .first()
            .click()
            .await?;
        let start = self.textbox(&self.layout.start_date_field);
        start.fill(&range.start_str()).await?;
        start.press("Enter").await?;
        let end = self.textbox(&self.layout.end_date_field);
        end.fill(&range.end_str()).await?;
        end.press("Enter").await?;
        self.date_range_applied = true;
        debug!(%range, "date range applied");
        Ok(())
    }

    pub fn date_range_applied(&self) -> bool {
        self.date_range_applied
    }

    pub async fn run_query(&self) -> Result<(), ExportError> {
        self.locator(Selector::role("button", &self.layout.query_button))
            .click()
            .await
    }

    /// Checks the select-all box of the result grid.
    ///
    /// A box that never shows up, or is not both visible and enabled, means
    /// the account has no rows for the period.
    pub async fn select_all_rows(&self) -> Result<RowSelection, ExportError> {
        let checkbox = self.locator(Selector::role("checkbox", &self.layout.select_all_checkbox));
        match checkbox.wait(Some(self.timeouts.rows())).await {
            Ok(_) => {}
            Err(ExportError::Timeout(_)) => return Ok(RowSelection::NoData),
            Err(e) => return Err(e),
        }
        let visible = checkbox.is_visible().await?;
        let enabled = checkbox.is_enabled().await?;
        if !(visible && enabled) {
            return Ok(RowSelection::NoData);
        }
        if !checkbox.is_checked().await? {
            checkbox.check().await?;
        }
        Ok(RowSelection::Selected)
    }

    pub async fn close(&self) -> Result<(), ExportError> {
        self.page.close().await
    }
}
