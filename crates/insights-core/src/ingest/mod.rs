//! Reading customer comments out of spreadsheets and CSV exports.
//!
//! The first row is the header. The comment column is found by name (exact,
//! then substring) or, failing that, as the first mostly-textual column.
//! Optional NPS and satisfaction columns are picked up when present.

mod error;
mod reader;

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::Comment;

pub use error::IngestError;
pub use reader::{cell_text, read_table, SourceFormat};

/// Header names that identify the comment column, in priority order.
pub const COMMENT_HEADERS: &[&str] = &[
    "comentario",
    "comentarios",
    "comment",
    "comments",
    "feedback",
    "opinion",
    "opinión",
    "observacion",
    "observación",
    "observaciones",
    "texto",
    "text",
    "respuesta",
    "review",
    "reseña",
    "descripcion",
    "descripción",
    "mensaje",
];

const NPS_HEADERS: &[&str] = &["nps"];
const SATISFACTION_HEADERS: &[&str] = &["satisf", "rating", "calificacion", "score"];
const PLACEHOLDERS: &[&str] = &["nan", "null", "none", "n/a", "-"];
const MIN_COMMENT_CHARS: usize = 3;

/// A column picked out of the header row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnRef {
    pub index: usize,
    pub header: String,
}

/// Columns the ingester will read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMap {
    pub comment: ColumnRef,
    pub nps: Option<ColumnRef>,
    pub satisfaction: Option<ColumnRef>,
}

/// Comments read from one file plus what happened to the other rows.
#[derive(Debug, Clone)]
pub struct IngestedFile {
    pub path: PathBuf,
    pub sheet: Option<String>,
    pub headers: Vec<String>,
    pub columns: ColumnMap,
    pub comments: Vec<Comment>,
    /// Data rows in the file (header excluded).
    pub rows_read: usize,
    /// Blank, too short or placeholder rows.
    pub rows_skipped: usize,
    /// Valid rows dropped because of `max_comments`.
    pub rows_truncated: usize,
}

/// Summary of a file without its comments.
#[derive(Debug, Clone, Serialize)]
pub struct FileInspection {
    pub path: PathBuf,
    pub sheet: Option<String>,
    pub headers: Vec<String>,
    pub columns: ColumnMap,
    pub rows_read: usize,
    pub rows_kept: usize,
    pub rows_skipped: usize,
    pub rows_truncated: usize,
}

impl IngestedFile {
    pub fn inspection(&self) -> FileInspection {
        FileInspection {
            path: self.path.clone(),
            sheet: self.sheet.clone(),
            headers: self.headers.clone(),
            columns: self.columns.clone(),
            rows_read: self.rows_read,
            rows_kept: self.comments.len(),
            rows_skipped: self.rows_skipped,
            rows_truncated: self.rows_truncated,
        }
    }
}

/// Read up to `max_comments` comments from `path`.
pub fn read_comments(path: impl AsRef<Path>, max_comments: usize) -> Result<IngestedFile, IngestError> {
    let path = path.as_ref();
    let (mut rows, sheet) = read_table(path)?;
    if rows.len() < 2 {
        return Err(IngestError::EmptyFile {
            path: path.to_path_buf(),
        });
    }
    let headers = rows.remove(0);
    let columns = detect_columns(&headers, &rows).ok_or_else(|| IngestError::NoCommentColumn {
        path: path.to_path_buf(),
        headers: headers.join(", "),
    })?;

    let mut comments = Vec::new();
    let mut rows_skipped = 0;
    let mut rows_truncated = 0;
    for (i, row) in rows.iter().enumerate() {
        let text = row.get(columns.comment.index).map(String::as_str).unwrap_or("");
        if !is_usable_comment(text) {
            rows_skipped += 1;
            continue;
        }
        if comments.len() >= max_comments {
            rows_truncated += 1;
            continue;
        }
        let mut comment = Comment::new(i + 1, text.trim());
        if let Some(nps) = columns.nps.as_ref().and_then(|c| parse_nps(cell(row, c))) {
            comment = comment.with_nps(nps);
        }
        if let Some(score) = columns
            .satisfaction
            .as_ref()
            .and_then(|c| parse_satisfaction(cell(row, c)))
        {
            comment = comment.with_satisfaction(score);
        }
        comments.push(comment);
    }

    if rows_truncated > 0 {
        warn!(
            path = %path.display(),
            max_comments = max_comments,
            dropped = rows_truncated,
            "comment limit reached; remaining rows ignored"
        );
    }
    info!(
        path = %path.display(),
        column = %columns.comment.header,
        rows = rows.len(),
        kept = comments.len(),
        skipped = rows_skipped,
        "comments ingested"
    );

    Ok(IngestedFile {
        path: path.to_path_buf(),
        sheet,
        headers,
        columns,
        comments,
        rows_read: rows.len(),
        rows_skipped,
        rows_truncated,
    })
}

/// Column detection and row counts, no comments returned.
pub fn inspect_file(path: impl AsRef<Path>, max_comments: usize) -> Result<FileInspection, IngestError> {
    read_comments(path, max_comments).map(|file| file.inspection())
}

/// Pick the comment, NPS and satisfaction columns.
pub fn detect_columns(headers: &[String], rows: &[Vec<String>]) -> Option<ColumnMap> {
    let normalized: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    let comment = find_comment_column(&normalized, rows)?;

    let taken = |i: usize| i == comment;
    let nps = find_by_substring(&normalized, NPS_HEADERS, &taken);
    let satisfaction = find_by_substring(&normalized, SATISFACTION_HEADERS, &|i: usize| {
        taken(i) || Some(i) == nps
    });

    let column = |index: usize| ColumnRef {
        index,
        header: headers[index].trim().to_string(),
    };
    Some(ColumnMap {
        comment: column(comment),
        nps: nps.map(column),
        satisfaction: satisfaction.map(column),
    })
}

fn find_comment_column(headers: &[String], rows: &[Vec<String>]) -> Option<usize> {
    for candidate in COMMENT_HEADERS {
        if let Some(i) = headers.iter().position(|h| h.as_str() == *candidate) {
            return Some(i);
        }
    }
    for candidate in COMMENT_HEADERS {
        if let Some(i) = headers.iter().position(|h| h.contains(candidate)) {
            return Some(i);
        }
    }
    (0..headers.len()).find(|&i| is_mostly_text(rows, i))
}

fn find_by_substring(
    headers: &[String],
    needles: &[&str],
    taken: &dyn Fn(usize) -> bool,
) -> Option<usize> {
    needles.iter().find_map(|needle| {
        headers
            .iter()
            .enumerate()
            .find(|(i, h)| !taken(*i) && h.contains(needle))
            .map(|(i, _)| i)
    })
}

fn is_mostly_text(rows: &[Vec<String>], column: usize) -> bool {
    let values: Vec<&str> = rows
        .iter()
        .filter_map(|row| row.get(column))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return false;
    }
    let textual = values.iter().filter(|v| v.parse::<f64>().is_err()).count();
    textual * 2 > values.len()
}

fn cell<'a>(row: &'a [String], column: &ColumnRef) -> &'a str {
    row.get(column.index).map(String::as_str).unwrap_or("")
}

/// Blank, too short and placeholder comments are not worth a model call.
pub fn is_usable_comment(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.chars().count() < MIN_COMMENT_CHARS {
        return false;
    }
    let lower = trimmed.to_lowercase();
    !PLACEHOLDERS.contains(&lower.as_str())
}

fn parse_nps(raw: &str) -> Option<u8> {
    let value = raw.trim().parse::<f64>().ok()?;
    if !value.is_finite() || !(0.0..=10.0).contains(&value) {
        return None;
    }
    Some(value.round() as u8)
}

fn parse_satisfaction(raw: &str) -> Option<f64> {
    let value = raw.trim().parse::<f64>().ok()?;
    (value.is_finite() && (0.0..=100.0).contains(&value)).then_some(value)
}
