//! Filtering, rendering and export of existing aliases.

use std::io;
use std::path::{Path, PathBuf};

use regex::{Regex, RegexBuilder};
use tokio::fs;

use crate::client::{AliasService, ServiceError};
use crate::models::alias::{AliasRecord, HmeEmail};
use crate::zone::Zone;

const CREATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const EXPORT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const MISSING_LABEL: &str = "N/A";
const CSV_HEADER: [&str; 5] = ["No.", "Label", "Email", "Created", "Status"];

#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error("invalid search pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("failed to fetch aliases: {0}")]
    Service(#[from] ServiceError),
    #[error("failed to write export {path}: {source}")]
    Export { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityFilter {
    Active,
    Inactive,
    All,
}

impl ActivityFilter {
    fn admits(self, is_active: bool) -> bool {
        match self {
            Self::Active => is_active,
            Self::Inactive => !is_active,
            Self::All => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListingQuery {
    activity: ActivityFilter,
    search: Option<Regex>,
}

impl ListingQuery {
    /// `search` is a case-insensitive regular expression matched anywhere in the label.
    pub fn new(activity: ActivityFilter, search: Option<&str>) -> Result<Self, ListingError> {
        let search = search
            .map(str::trim)
            .filter(|pattern| !pattern.is_empty())
            .map(|pattern| RegexBuilder::new(pattern).case_insensitive(true).build())
            .transpose()?;
        Ok(Self { activity, search })
    }

    fn admits(&self, email: &HmeEmail, label: &str) -> bool {
        self.activity.admits(email.is_active)
            && self
                .search
                .as_ref()
                .is_none_or(|pattern| pattern.is_match(label))
    }
}

pub async fn fetch(
    service: &dyn AliasService,
    query: &ListingQuery,
    zone: Zone,
) -> Result<Vec<AliasRecord>, ListingError> {
    let emails = service.list().await?;
    Ok(select(emails, query, zone))
}

/// Sequence numbers are positions in the unfiltered vendor list, starting at 1.
pub fn select(emails: Vec<HmeEmail>, query: &ListingQuery, zone: Zone) -> Vec<AliasRecord> {
    emails
        .into_iter()
        .enumerate()
        .filter_map(|(index, email)| {
            let label = email
                .label
                .clone()
                .filter(|label| !label.is_empty())
                .unwrap_or_else(|| MISSING_LABEL.to_string());
            if !query.admits(&email, &label) {
                return None;
            }
            Some(AliasRecord {
                sequence_number: index + 1,
                label,
                created_at: zone
                    .format_millis(email.create_timestamp, CREATED_FORMAT)
                    .unwrap_or_else(|| "unknown".to_string()),
                address: email.hme,
                is_active: email.is_active,
            })
        })
        .collect()
}

/// Plain-text table sized to its widest cells.
pub fn render_table(records: &[AliasRecord]) -> String {
    let rows: Vec<[String; 5]> = records
        .iter()
        .map(|record| {
            [
                record.sequence_number.to_string(),
                record.label.clone(),
                record.address.clone(),
                record.created_at.clone(),
                record.status().to_string(),
            ]
        })
        .collect();

    let mut widths = CSV_HEADER.map(|title| title.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &CSV_HEADER.map(str::to_string), &widths);
    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    out.push_str(&rule.join("-+-"));
    out.push('\n');
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[String; 5], widths: &[usize; 5]) {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    out.push_str(padded.join(" | ").trim_end());
    out.push('\n');
}

pub fn to_csv(records: &[AliasRecord]) -> String {
    let mut out = CSV_HEADER.join(",");
    out.push('\n');
    for record in records {
        let fields = [
            record.sequence_number.to_string(),
            csv_field(&record.label),
            csv_field(&record.address),
            record.created_at.clone(),
            record.status().to_string(),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Writes `existing_emails_<timestamp>.csv` into `dir`.
pub async fn export(
    records: &[AliasRecord],
    dir: &Path,
    zone: Zone,
) -> Result<PathBuf, ListingError> {
    let timestamp = zone.now(EXPORT_TIMESTAMP_FORMAT);
    let path = dir.join(format!("existing_emails_{timestamp}.csv"));
    let to_error = |source: io::Error| ListingError::Export {
        path: path.clone(),
        source,
    };
    fs::create_dir_all(dir).await.map_err(to_error)?;
    fs::write(&path, to_csv(records)).await.map_err(to_error)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::client::stub::ScriptedService;

    fn utc() -> Zone {
        Zone::parse("UTC").unwrap()
    }

    fn email(hme: &str, label: Option<&str>, is_active: bool) -> HmeEmail {
        HmeEmail {
            hme: hme.to_string(),
            label: label.map(str::to_string),
            is_active,
            create_timestamp: 1_700_000_000_000,
        }
    }

    fn sample() -> Vec<HmeEmail> {
        vec![
            email("one@icloud.com", Some("Shopping"), true),
            email("two@icloud.com", None, true),
            email("three@icloud.com", Some("newsletters"), false),
            email("four@icloud.com", Some("Shop, misc"), true),
        ]
    }

    #[test]
    fn active_filter_keeps_vendor_sequence_numbers() {
        let query = ListingQuery::new(ActivityFilter::Active, None).unwrap();
        let records = select(sample(), &query, utc());
        let numbers: Vec<_> = records.iter().map(|r| r.sequence_number).collect();
        assert_eq!(numbers, vec![1, 2, 4]);
        assert_eq!(records[1].label, "N/A");
        assert_eq!(records[0].created_at, "2023-11-14 22:13:20");
    }

    #[test]
    fn created_timestamps_use_configured_zone() {
        let query = ListingQuery::new(ActivityFilter::All, None).unwrap();
        let moscow = Zone::parse("Europe/Moscow").unwrap();
        let records = select(sample(), &query, moscow);
        assert_eq!(records[0].created_at, "2023-11-15 01:13:20");

        let mut broken = sample();
        broken[0].create_timestamp = i64::MAX;
        let records = select(broken, &query, moscow);
        assert_eq!(records[0].created_at, "unknown");
    }

    #[test]
    fn search_is_case_insensitive_regex_on_label() {
        let query = ListingQuery::new(ActivityFilter::All, Some("^shop")).unwrap();
        let records = select(sample(), &query, utc());
        let addresses: Vec<_> = records.iter().map(|r| r.address.as_str()).collect();
        assert_eq!(addresses, vec!["one@icloud.com", "four@icloud.com"]);
    }

    #[test]
    fn inactive_filter_and_bad_pattern() {
        let query = ListingQuery::new(ActivityFilter::Inactive, Some("  ")).unwrap();
        let records = select(sample(), &query, utc());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status(), "Inactive");

        assert!(matches!(
            ListingQuery::new(ActivityFilter::All, Some("(")),
            Err(ListingError::Pattern(_))
        ));
    }

    #[test]
    fn csv_quotes_fields_with_separators() {
        let query = ListingQuery::new(ActivityFilter::All, Some("misc")).unwrap();
        let csv = to_csv(&select(sample(), &query, utc()));
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[0], "No.,Label,Email,Created,Status");
        assert_eq!(
            lines[1],
            "4,\"Shop, misc\",four@icloud.com,2023-11-14 22:13:20,Active"
        );
    }

    #[test]
    fn table_aligns_columns() {
        let query = ListingQuery::new(ActivityFilter::All, None).unwrap();
        let table = render_table(&select(sample(), &query, utc()));
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("No. | Label"));
        let column = lines[0].find("| Email").unwrap();
        assert_eq!(lines[2].find("| one@icloud.com"), Some(column));
    }

    #[tokio::test]
    async fn fetch_and_export_round_through_service() {
        let service = Arc::new(ScriptedService::always_succeeding().with_listing(sample()));
        let query = ListingQuery::new(ActivityFilter::Active, None).unwrap();
        let records = fetch(service.as_ref(), &query, utc()).await.unwrap();
        assert_eq!(records.len(), 3);

        let dir = tempfile::tempdir().unwrap();
        let path = export(&records, dir.path(), utc()).await.unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("existing_emails_") && name.ends_with(".csv"));
        let written = fs::read_to_string(&path).await.unwrap();
        assert_eq!(written.lines().count(), 4);
    }
}
