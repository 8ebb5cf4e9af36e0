//! Plain data carried through a batch: accounts, dates, export targets and outcomes.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::ExportError;

const DATE_FORMAT: &str = "%Y-%m-%d";

static UNSAFE_PATH_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\\/:*?<>|"\n]+"#).expect("static regex"));

/// One (project, account) pair of the input list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub project_name: String,
    pub account_identifier: String,
}

impl AccountEntry {
    pub fn new(project_name: impl Into<String>, account_identifier: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            account_identifier: account_identifier.into(),
        }
    }

    /// Project name made safe for use as a directory or file name component.
    pub fn folder_name(&self) -> String {
        sanitize_path_component(&self.project_name)
    }
}

/// Ordered account list, unique by project name.
#[derive(Debug, Clone, Default)]
pub struct AccountBatch {
    entries: Vec<AccountEntry>,
}

impl AccountBatch {
    pub fn new(entries: Vec<AccountEntry>) -> Result<Self, ExportError> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.project_name.trim().is_empty() || entry.account_identifier.trim().is_empty() {
                return Err(ExportError::InvalidArgument(format!(
                    "account entry has an empty field: {entry:?}"
                )));
            }
            if !seen.insert(entry.project_name.as_str()) {
                return Err(ExportError::InvalidArgument(format!(
                    "duplicate project name in batch: {}",
                    entry.project_name
                )));
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[AccountEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Inclusive statement period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ExportError> {
        if start > end {
            return Err(ExportError::InvalidArgument(format!(
                "start date {start} is after end date {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parses both bounds as `YYYY-MM-DD`.
    pub fn parse(start: &str, end: &str) -> Result<Self, ExportError> {
        let parse = |value: &str| {
            NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|e| {
                ExportError::InvalidArgument(format!("invalid date '{value}' (expected YYYY-MM-DD): {e}"))
            })
        };
        Self::new(parse(start)?, parse(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn start_str(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start_str(), self.end_str())
    }
}

/// The three documents produced per account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Statement,
    Receipt,
    Reconciliation,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 3] = [
        DocumentKind::Receipt,
        DocumentKind::Statement,
        DocumentKind::Reconciliation,
    ];

    /// Directory under the project folder.
    pub fn category_dir(&self) -> &'static str {
        match self {
            DocumentKind::Statement => "银行流水",
            DocumentKind::Receipt => "银行回单",
            DocumentKind::Reconciliation => "银行对账单",
        }
    }

    /// Document-type label embedded in the file name.
    pub fn file_label(&self) -> &'static str {
        match self {
            DocumentKind::Statement => "银行流水",
            DocumentKind::Receipt => "银行回单",
            DocumentKind::Reconciliation => "对账单打印",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Statement => "xlsx",
            DocumentKind::Receipt | DocumentKind::Reconciliation => "pdf",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentKind::Statement => "statement",
            DocumentKind::Receipt => "receipt",
            DocumentKind::Reconciliation => "reconciliation print",
        };
        f.write_str(name)
    }
}

/// Canonical output locations for one account.
#[derive(Debug, Clone)]
pub struct ExportTarget {
    project_dir: PathBuf,
    folder_name: String,
    range: DateRange,
}

impl ExportTarget {
    pub fn new(download_root: &Path, entry: &AccountEntry, range: DateRange) -> Self {
        let folder_name = entry.folder_name();
        Self {
            project_dir: download_root.join(&folder_name),
            folder_name,
            range,
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn dir_for(&self, kind: DocumentKind) -> PathBuf {
        self.project_dir.join(kind.category_dir())
    }

    pub fn file_name_for(&self, kind: DocumentKind) -> String {
        format!(
            "{}_{}_{}_{}.{}",
            self.folder_name,
            kind.file_label(),
            self.range.start_str(),
            self.range.end_str(),
            kind.extension()
        )
    }

    pub fn path_for(&self, kind: DocumentKind) -> PathBuf {
        self.dir_for(kind).join(self.file_name_for(kind))
    }

    /// Creates the category directory if needed and returns it.
    pub fn ensure_dir(&self, kind: DocumentKind) -> Result<PathBuf, ExportError> {
        let dir = self.dir_for(kind);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// Project whose selection drove the portal's search-box label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviousAccount {
    project_name: String,
}

impl PreviousAccount {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
        }
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Accessible name the search box carries after this project was selected.
    pub fn search_label(&self) -> String {
        format!("- {}", self.project_name)
    }
}

/// Result of one export operation for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(PathBuf),
    Skipped(String),
    Failed(String),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success(_))
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success(path) => write!(f, "completed: {}", path.display()),
            AttemptOutcome::Skipped(reason) => write!(f, "skipped: {reason}"),
            AttemptOutcome::Failed(error) => write!(f, "failed: {error}"),
        }
    }
}

pub fn sanitize_path_component(name: &str) -> String {
    UNSAFE_PATH_CHARS.replace_all(name.trim(), "_").into_owned()
}
