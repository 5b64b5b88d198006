//! CSV ingestion: turn an export file into ordered [`Record`]s.
//!
//! Exports from different tools name their columns differently, so each
//! logical column is picked from a list of candidate header names (exact
//! match first, then case-insensitive). Rows whose timestamp is missing or
//! unparseable are skipped and counted rather than failing the file.

use crate::error::ExportError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

const CAND_CREATED_AT: &[&str] = &["Created At", "created_at", "Date", "date", "Time", "time"];
const CAND_TEXT: &[&str] = &["Text", "text", "Full Text", "full_text", "Content", "content"];
const CAND_LINK: &[&str] = &["Tweet URL", "tweet_url", "URL", "url", "Link", "link"];
const CAND_MEDIA: &[&str] = &["media_urls", "Media URLs", "media", "images", "image_urls"];
const CAND_ID: &[&str] = &["ID", "id"];

static RE_MEDIA_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\r\n]+|[;,]\s*").unwrap());
static RE_UNSAFE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.-]+").unwrap());

/// One timestamped post from the CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub created_at: NaiveDateTime,
    pub text: String,
    pub link: String,
    /// Absolute http/https URLs in the order they appear in the cell.
    pub media_urls: Vec<String>,
}

/// Records read from a CSV plus how many rows were dropped.
#[derive(Debug, Clone, Default)]
pub struct Ingested {
    pub records: Vec<Record>,
    pub skipped_rows: usize,
}

/// Read and parse the CSV at `path`.
pub fn read_records(path: &Path) -> Result<Ingested, ExportError> {
    if !path.exists() {
        return Err(ExportError::CsvNotFound {
            path: path.to_path_buf(),
        });
    }

    let reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| ExportError::CsvRead {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    let ingested = parse_records(reader, path)?;
    info!(
        "Read {} records from {} ({} rows skipped)",
        ingested.records.len(),
        path.display(),
        ingested.skipped_rows
    );
    Ok(ingested)
}

/// Parse records from any CSV reader. `origin` is only used in errors.
pub fn parse_records<R: std::io::Read>(
    mut reader: csv::Reader<R>,
    origin: &Path,
) -> Result<Ingested, ExportError> {
    let csv_err = |e: csv::Error| ExportError::CsvRead {
        path: origin.to_path_buf(),
        detail: e.to_string(),
    };

    let header: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let (col_dt, col_text, col_link) = match (
        pick_column(&header, CAND_CREATED_AT),
        pick_column(&header, CAND_TEXT),
        pick_column(&header, CAND_LINK),
    ) {
        (Some(d), Some(t), Some(l)) => (d, t, l),
        _ => return Err(ExportError::MissingColumns { header }),
    };
    let col_media = pick_column(&header, CAND_MEDIA);
    let col_id = pick_column(&header, CAND_ID);

    let mut out = Ingested::default();
    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(csv_err)?;
        let cell = |idx: usize| row.get(idx).unwrap_or("");

        let dt_raw = cell(col_dt).trim();
        let created_at = match parse_datetime(dt_raw) {
            Some(dt) => dt,
            None => {
                debug!("Skipping row {}: unparseable date {:?}", line + 2, dt_raw);
                out.skipped_rows += 1;
                continue;
            }
        };

        let link = cell(col_link).trim().to_string();
        let raw_id = col_id
            .map(|i| cell(i).trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                let tail = link.trim_end_matches('/').rsplit('/').next();
                tail.unwrap_or("").to_string()
            });

        out.records.push(Record {
            id: safe_record_id(&raw_id),
            created_at,
            text: unescape_html(cell(col_text)),
            link,
            media_urls: col_media.map(|i| split_media_urls(cell(i))).unwrap_or_default(),
        });
    }

    Ok(out)
}

/// Index of the first header matching a candidate, exact before case-insensitive.
fn pick_column(header: &[String], candidates: &[&str]) -> Option<usize> {
    candidates
        .iter()
        .find_map(|c| header.iter().position(|h| h.trim() == *c))
        .or_else(|| {
            candidates.iter().find_map(|c| {
                header
                    .iter()
                    .position(|h| h.trim().eq_ignore_ascii_case(c))
            })
        })
}

/// Parse the timestamp formats seen in exports.
///
/// `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD HH:MM`, `YYYY-MM-DD` (midnight), then
/// ISO-8601 with `T` separator or an RFC 3339 offset (kept as wall time).
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    None
}

/// Split a media cell on newlines, commas or semicolons, keeping http(s) URLs.
pub fn split_media_urls(cell: &str) -> Vec<String> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Vec::new();
    }
    RE_MEDIA_SPLIT
        .split(cell)
        .map(str::trim)
        .filter(|p| p.starts_with("http://") || p.starts_with("https://"))
        .map(str::to_string)
        .collect()
}

fn safe_record_id(raw: &str) -> String {
    let cleaned = RE_UNSAFE_ID.replace_all(raw.trim(), "_");
    let truncated: String = cleaned.chars().take(80).collect();
    let trimmed = truncated.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "tweet".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Decode HTML character references (named and numeric) left in exported text.
pub fn unescape_html(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(csv_text: &str) -> Result<Ingested, ExportError> {
        let reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(csv_text.as_bytes());
        parse_records(reader, Path::new("test.csv"))
    }

    #[test]
    fn parses_standard_columns() {
        let got = parse(
            "Created At,Text,Tweet URL,media_urls\n\
             2024-01-02 03:04:05,hello &amp; bye,https://x.com/u/status/123,\"https://pbs.twimg.com/a.jpg\nhttps://pbs.twimg.com/b.jpg\"\n",
        )
        .unwrap();
        assert_eq!(got.records.len(), 1);
        let r = &got.records[0];
        assert_eq!(r.id, "123");
        assert_eq!(r.text, "hello & bye");
        assert_eq!(r.created_at.to_string(), "2024-01-02 03:04:05");
        assert_eq!(
            r.media_urls,
            vec!["https://pbs.twimg.com/a.jpg", "https://pbs.twimg.com/b.jpg"]
        );
    }

    #[test]
    fn case_insensitive_headers_and_id_column() {
        let got = parse("DATE,FULL_TEXT,LINK,ID\n2024-05-06,hi,https://x/1,abc/def\n").unwrap();
        let r = &got.records[0];
        assert_eq!(r.id, "abc_def");
        assert_eq!(r.created_at.to_string(), "2024-05-06 00:00:00");
        assert!(r.media_urls.is_empty());
    }

    #[test]
    fn missing_required_column_is_error() {
        let err = parse("date,text\n2024-01-01,x\n").unwrap_err();
        assert!(matches!(err, ExportError::MissingColumns { .. }));
    }

    #[test]
    fn bad_dates_are_skipped_and_counted() {
        let got = parse(
            "date,text,url\n\
             ,empty,https://x/1\n\
             yesterday,bad,https://x/2\n\
             2024-01-01T10:00:00Z,ok,https://x/3\n",
        )
        .unwrap();
        assert_eq!(got.records.len(), 1);
        assert_eq!(got.skipped_rows, 2);
        assert_eq!(got.records[0].text, "ok");
    }

    #[test]
    fn datetime_formats() {
        assert!(parse_datetime("2024-01-02 03:04").is_some());
        assert!(parse_datetime("2024-01-02T03:04:05.123").is_some());
        assert!(parse_datetime("2024-01-02T03:04:05+08:00").is_some());
        assert!(parse_datetime("02/01/2024").is_none());
    }

    #[test]
    fn media_cell_splitting() {
        assert_eq!(
            split_media_urls("https://a/1.jpg; https://a/2.jpg,ftp://no, junk ,http://a/3.png"),
            vec!["https://a/1.jpg", "https://a/2.jpg", "http://a/3.png"]
        );
        assert!(split_media_urls("  ").is_empty());
    }

    #[test]
    fn record_id_sanitised() {
        assert_eq!(safe_record_id("..__"), "tweet");
        assert_eq!(safe_record_id("a b/c"), "a_b_c");
        assert_eq!(safe_record_id(&"x".repeat(200)).len(), 80);
    }

    #[test]
    fn entities_decoded() {
        assert_eq!(unescape_html("&lt;b&gt; &#39;q&#x27; &unknown;"), "<b> 'q' &unknown;");
    }

    #[test]
    fn named_entities_beyond_the_basic_set_decode() {
        assert_eq!(
            unescape_html("wait&hellip; 2020&ndash;2024 &mdash; &copy; &eacute;t&eacute;"),
            "wait\u{2026} 2020\u{2013}2024 \u{2014} \u{a9} \u{e9}t\u{e9}"
        );
    }

    #[test]
    fn nonexistent_file_is_not_found() {
        let err = read_records(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, ExportError::CsvNotFound { .. }));
    }
}
