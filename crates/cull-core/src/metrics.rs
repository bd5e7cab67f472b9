//! Traffic metrics: CSV import, key normalization, annotated re-export.
//!
//! A metrics report is a CSV whose first column identifies a page (a slug, a
//! path, or a full URL) and whose remaining columns are whatever the analytics
//! tool exported. Keys are normalized so that `/about/`, `about` and
//! `https://example.com/about?utm=x` all land on the same row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{Result, TriageError};

/// Prefix written into the first field of rows marked for removal on export.
pub const REMOVE_MARKER: &str = "[REMOVE] ";

/// A single metric cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Interpret a raw CSV cell, turning numeric-looking text into a number.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Some(number) = parse_number(trimmed) {
            Self::Number(number)
        } else {
            Self::Text(trimmed.to_string())
        }
    }

    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) if n.fract().abs() < f64::EPSILON && n.abs() < 1e15 => write!(f, "{n:.0}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(t) => f.write_str(t),
        }
    }
}

fn parse_number(trimmed: &str) -> Option<f64> {
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        return n.is_finite().then_some(n);
    }
    // Thousands separators, e.g. "1,234".
    let grouped = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'));
    if grouped && trimmed.contains(',') && !trimmed.starts_with(',') {
        return trimmed
            .replace(',', "")
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite());
    }
    None
}

/// Metric columns for one page, keyed by normalized column name.
pub type MetricRow = BTreeMap<String, MetricValue>;

/// One data record exactly as it appeared in the source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Normalized key, empty when the record had no key.
    pub key: String,
    /// Source text without the line terminator.
    pub text: String,
    /// Line ending as read, followed by any blank lines after the record.
    /// Empty for a last record with no trailing newline.
    #[serde(default)]
    pub terminator: String,
}

/// An imported metrics report.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsTable {
    /// Normalized metric column names, excluding the key column.
    pub columns: Vec<String>,
    pub rows: BTreeMap<String, MetricRow>,
    pub header_line: String,
    #[serde(default)]
    pub header_terminator: String,
    pub raw_records: Vec<RawRecord>,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub imported_at: Option<DateTime<Utc>>,
}

impl MetricsTable {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Metrics for a page. The key is normalized before lookup.
    #[must_use]
    pub fn row_for(&self, key: &str) -> Option<&MetricRow> {
        self.rows.get(&normalize_key(key))
    }

    #[must_use]
    pub fn value(&self, key: &str, column: &str) -> Option<&MetricValue> {
        self.row_for(key)?.get(&normalize_column(column))
    }

    #[must_use]
    pub fn with_source(mut self, source_name: impl Into<String>, at: DateTime<Utc>) -> Self {
        self.source_name = source_name.into();
        self.imported_at = Some(at);
        self
    }
}

/// Normalize a page identifier to its path key.
///
/// Scheme and host are dropped from full URLs, as are query and fragment.
/// Leading and trailing slashes are stripped and the site root becomes `/`.
#[must_use]
pub fn normalize_key(raw: &str) -> String {
    let mut rest = raw.trim();

    if let Some(idx) = rest.find("://") {
        rest = &rest[idx + 3..];
        rest = rest.find('/').map_or("", |slash| &rest[slash..]);
    } else if let Some(stripped) = rest.strip_prefix("//") {
        rest = stripped.find('/').map_or("", |slash| &stripped[slash..]);
    }

    if let Some(end) = rest.find(['?', '#']) {
        rest = &rest[..end];
    }

    let path = rest.trim_matches('/');
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

/// Normalize a column header to lowercase snake case.
#[must_use]
pub fn normalize_column(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

struct CsvRecord<'a> {
    fields: Vec<String>,
    raw: &'a str,
    terminator: String,
}

/// Close the record spanning `line`, terminator included. Blank lines are
/// folded into the previous record's terminator.
fn finish_record<'a>(
    records: &mut Vec<CsvRecord<'a>>,
    fields: &mut Vec<String>,
    field: &mut String,
    line: &'a str,
) {
    fields.push(std::mem::take(field));
    let record = std::mem::take(fields);
    let raw = line.strip_suffix('\n').unwrap_or(line);
    let raw = raw.strip_suffix('\r').unwrap_or(raw);

    if raw.trim().is_empty() {
        if let Some(previous) = records.last_mut() {
            previous.terminator.push_str(line);
        }
        return;
    }
    records.push(CsvRecord {
        fields: record,
        raw,
        terminator: line[raw.len()..].to_string(),
    });
}

fn split_records(input: &str) -> Result<Vec<CsvRecord<'_>>> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut at_field_start = true;
    let mut record_start = 0;
    let mut chars = input.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek().is_some_and(|&(_, next)| next == '"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(ch);
            }
            continue;
        }

        match ch {
            '"' if at_field_start => {
                in_quotes = true;
                at_field_start = false;
            }
            ',' => {
                fields.push(std::mem::take(&mut field));
                at_field_start = true;
            }
            '\r' if chars.peek().is_some_and(|&(_, next)| next == '\n') => {}
            '\n' => {
                finish_record(
                    &mut records,
                    &mut fields,
                    &mut field,
                    &input[record_start..=idx],
                );
                record_start = idx + 1;
                at_field_start = true;
            }
            _ => {
                field.push(ch);
                at_field_start = false;
            }
        }
    }

    if in_quotes {
        return Err(TriageError::malformed_csv("unterminated quoted field"));
    }
    if record_start < input.len() {
        finish_record(
            &mut records,
            &mut fields,
            &mut field,
            &input[record_start..],
        );
    }

    Ok(records)
}

/// Parse a metrics CSV report.
///
/// The first column is the page key, every other column becomes a metric.
/// Duplicate keys keep the last row.
///
/// # Errors
///
/// Returns a malformed-CSV validation error for empty input, a quoted field
/// that never closes, a header with fewer than two columns, or a file without
/// data rows.
pub fn parse_csv(raw: &str) -> Result<MetricsTable> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    if raw.trim().is_empty() {
        return Err(TriageError::malformed_csv("input is empty"));
    }

    let mut records = split_records(raw)?.into_iter();
    let Some(header) = records.next() else {
        return Err(TriageError::malformed_csv("input is empty"));
    };
    if header.fields.len() < 2 {
        return Err(TriageError::malformed_csv(
            "header needs a key column and at least one metric column",
        ));
    }

    let columns: Vec<String> = header.fields[1..]
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let normalized = normalize_column(name);
            if normalized.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                normalized
            }
        })
        .collect();

    let mut table = MetricsTable {
        columns,
        header_line: header.raw.to_string(),
        header_terminator: header.terminator,
        ..MetricsTable::default()
    };

    for record in records {
        let raw_key = record.fields.first().map_or("", |f| f.trim());
        let key = if raw_key.is_empty() {
            String::new()
        } else {
            normalize_key(raw_key)
        };

        if !key.is_empty() {
            let row: MetricRow = table
                .columns
                .iter()
                .zip(record.fields.iter().skip(1))
                .map(|(column, value)| (column.clone(), MetricValue::parse(value)))
                .collect();
            table.rows.insert(key.clone(), row);
        }

        table.raw_records.push(RawRecord {
            key,
            text: record.raw.to_string(),
            terminator: record.terminator,
        });
    }

    if table.raw_records.is_empty() {
        return Err(TriageError::malformed_csv("no data rows after the header"));
    }

    Ok(table)
}

/// Re-export an imported report, marking rows whose key is in `removed_keys`.
///
/// Unmarked records are written exactly as imported, line endings included.
/// Marked records get [`REMOVE_MARKER`] at the start of their first field,
/// inside the opening quote when that field is quoted.
#[must_use]
pub fn export_csv(table: &MetricsTable, removed_keys: &BTreeSet<String>) -> String {
    let mut out = table.header_line.clone();
    out.push_str(line_end(&table.header_terminator));

    let last = table.raw_records.len().saturating_sub(1);
    for (idx, record) in table.raw_records.iter().enumerate() {
        if !record.key.is_empty() && removed_keys.contains(&record.key) {
            out.push_str(&mark_for_removal(&record.text));
        } else {
            out.push_str(&record.text);
        }
        if idx == last {
            out.push_str(&record.terminator);
        } else {
            out.push_str(line_end(&record.terminator));
        }
    }
    out
}

// Imports stored before terminators were kept have none recorded.
fn line_end(terminator: &str) -> &str {
    if terminator.is_empty() { "\n" } else { terminator }
}

fn mark_for_removal(text: &str) -> String {
    text.strip_prefix('"').map_or_else(
        || format!("{REMOVE_MARKER}{text}"),
        |rest| format!("\"{REMOVE_MARKER}{rest}"),
    )
}
