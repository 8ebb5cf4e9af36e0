use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use custody_export::{AccountBatch, AccountEntry};

/// Header cells recognised in the first row.
const PROJECT_HEADERS: [&str; 3] = ["project", "project_name", "项目名称"];

/// Reads a two-column `project,account` list. A header row is optional.
pub fn load_accounts(path: &Path) -> Result<AccountBatch> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open accounts file: {}", path.display()))?;
    parse_accounts(file, &path.display().to_string())
}

fn parse_accounts(input: impl std::io::Read, source: &str) -> Result<AccountBatch> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input);

    let mut entries = Vec::new();
    for (line_num, result) in reader.records().enumerate() {
        let record = result
            .with_context(|| format!("Failed to parse CSV line {} in {}", line_num + 1, source))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let project = record.get(0).unwrap_or("");
        let account = record.get(1).unwrap_or("");
        if line_num == 0 && PROJECT_HEADERS.contains(&project.to_lowercase().as_str()) {
            continue;
        }
        if account.is_empty() {
            bail!("{source} line {}: missing account for '{project}'", line_num + 1);
        }
        entries.push(AccountEntry::new(project, account));
    }

    if entries.is_empty() {
        bail!("{source} contains no accounts");
    }
    Ok(AccountBatch::new(entries)?)
}
