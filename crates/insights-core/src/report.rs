//! Presentation of a [`FileAnalysis`]: Excel workbook, terminal markdown, JSON.

use std::path::Path;

use umya_spreadsheet::{Spreadsheet, Worksheet};

use crate::domain::{CommentInsight, FileAnalysis, SentimentCategory};

pub const SUMMARY_SHEET: &str = "Executive Summary";
pub const DETAIL_SHEET: &str = "Comment Detail";
pub const DISTRIBUTION_SHEET: &str = "Sentiment Distribution";
pub const INSIGHTS_SHEET: &str = "Insights";
pub const EMOTIONS_SHEET: &str = "Emotional Analysis";
pub const GLOSSARY_SHEET: &str = "Glossary";

const TOP_N: usize = 10;
const BAR_WIDTH: usize = 30;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to add sheet {name}: {message}")]
    Sheet { name: &'static str, message: String },

    #[error("failed to write workbook {path}: {message}")]
    Workbook { path: String, message: String },

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

const GLOSSARY: &[(&str, &str)] = &[
    ("Sentiment", "Overall polarity of a comment: positive, neutral or negative."),
    ("Confidence", "Model certainty in [0, 1]; batches below the threshold are retried."),
    ("Dominant trend", "Most frequent sentiment; ties resolve to neutral."),
    ("Emotion intensity", "Strength of an emotion in [0, 1], summed across comments."),
    ("Theme relevance", "How central a theme is to a comment, summed across comments."),
    ("Pain point severity", "Impact of a problem: >= 0.7 critical, >= 0.4 moderate, else low."),
    ("Urgency", "How soon the comment needs a response: low, medium or high."),
    ("NPS", "Net Promoter Score reported in the source file, 0-10."),
    ("Low confidence", "Best available answer kept after retries stayed under the threshold."),
    ("Failed batches", "Batches dropped after retries; their comments are not counted."),
    ("Fallback", "Neutral stand-in results used because every batch failed."),
];

/// Write the full workbook to `path`.
pub fn write_excel_report(analysis: &FileAnalysis, path: &Path) -> Result<(), ReportError> {
    let mut book = umya_spreadsheet::new_file();
    match book.get_sheet_mut(&0) {
        Some(sheet) => {
            sheet.set_name(SUMMARY_SHEET);
            write_summary(sheet, analysis);
        }
        None => write_summary(add_sheet(&mut book, SUMMARY_SHEET)?, analysis),
    }
    write_detail(add_sheet(&mut book, DETAIL_SHEET)?, analysis);
    write_distribution(add_sheet(&mut book, DISTRIBUTION_SHEET)?, analysis);
    write_insights(add_sheet(&mut book, INSIGHTS_SHEET)?, analysis);
    write_emotions(add_sheet(&mut book, EMOTIONS_SHEET)?, analysis);
    write_glossary(add_sheet(&mut book, GLOSSARY_SHEET)?);

    umya_spreadsheet::writer::xlsx::write(&book, path).map_err(|e| ReportError::Workbook {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    tracing::info!(path = %path.display(), comments = analysis.comments.len(), "excel report written");
    Ok(())
}

/// Pretty JSON dump of the whole analysis.
pub fn write_json(analysis: &FileAnalysis, path: &Path) -> Result<(), ReportError> {
    let content = serde_json::to_string_pretty(analysis)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Terminal summary: headline metrics plus text bar charts.
pub fn render_summary_markdown(analysis: &FileAnalysis) -> String {
    let agg = &analysis.aggregate;
    let mut out = String::new();
    out.push_str("# Comment Insights\n\n");
    out.push_str(&format!(
        "- analysis: `{}`\n- model: {}\n- comments analyzed: {}\n- dominant trend: {}\n- confidence: {:.2}\n- batches: {} total, {} failed, {} low confidence\n- tokens: {}\n",
        analysis.analysis_id,
        analysis.model,
        agg.total_comments,
        agg.dominant_trend,
        agg.overall_confidence,
        agg.batches_total,
        agg.batches_failed,
        agg.low_confidence_batches,
        agg.usage.total_tokens,
    ));
    if agg.fallback_used {
        out.push_str("\n> Every batch failed; results are neutral stand-ins.\n");
    } else if agg.batches_failed > 0 {
        out.push_str(&format!(
            "\n> {} of {} batches failed; their comments are not included.\n",
            agg.batches_failed, agg.batches_total
        ));
    }

    out.push_str("\n## Sentiment\n");
    let rows: Vec<(String, f64)> = SentimentCategory::ALL
        .iter()
        .map(|c| (c.as_str().to_string(), agg.count(*c) as f64))
        .collect();
    push_bars(&mut out, &rows, |v| format!("{v:.0}"));

    let themes = agg.top_themes(5);
    if !themes.is_empty() {
        out.push_str("\n## Top themes\n");
        push_bars(&mut out, &themes, |v| format!("{v:.2}"));
    }
    let emotions = agg.top_emotions(5);
    if !emotions.is_empty() {
        out.push_str("\n## Top emotions\n");
        push_bars(&mut out, &emotions, |v| format!("{v:.2}"));
    }

    let critical = analysis.critical_comments().count();
    if critical > 0 {
        out.push_str(&format!("\n{critical} comment(s) report a critical pain point.\n"));
    }
    out
}

fn push_bars(out: &mut String, rows: &[(String, f64)], fmt: impl Fn(f64) -> String) {
    let max = rows.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
    let label_width = rows.iter().map(|(l, _)| l.chars().count()).max().unwrap_or(0);
    out.push_str("```\n");
    for (label, value) in rows {
        out.push_str(&format!(
            "{label:<label_width$}  {} {}\n",
            bar(*value, max),
            fmt(*value)
        ));
    }
    out.push_str("```\n");
}

/// `BAR_WIDTH`-scaled bar; any non-zero value gets at least one block.
fn bar(value: f64, max: f64) -> String {
    if max <= 0.0 || value <= 0.0 {
        return String::new();
    }
    let len = ((value / max) * BAR_WIDTH as f64).round().max(1.0) as usize;
    "█".repeat(len)
}

fn add_sheet<'a>(book: &'a mut Spreadsheet, name: &'static str) -> Result<&'a mut Worksheet, ReportError> {
    book.new_sheet(name).map_err(|e| ReportError::Sheet {
        name,
        message: e.to_string(),
    })
}

/// Row cursor over one worksheet.
struct SheetWriter<'a> {
    sheet: &'a mut Worksheet,
    row: u32,
}

impl<'a> SheetWriter<'a> {
    /// Bold title merged across `columns` on row 1; content starts on row 3.
    fn new(sheet: &'a mut Worksheet, title: &str, columns: u32) -> Self {
        sheet.get_cell_mut((1u32, 1u32)).set_value(title);
        sheet.get_style_mut((1u32, 1u32)).get_font_mut().set_bold(true);
        if columns > 1 {
            let last = column_letter(columns);
            sheet.add_merge_cells(format!("A1:{last}1"));
        }
        Self { sheet, row: 3 }
    }

    fn header(&mut self, labels: &[&str]) {
        for (i, label) in labels.iter().enumerate() {
            let col = i as u32 + 1;
            self.sheet.get_cell_mut((col, self.row)).set_value(*label);
            self.sheet
                .get_style_mut((col, self.row))
                .get_font_mut()
                .set_bold(true);
        }
        self.row += 1;
    }

    fn row(&mut self, cells: &[Cell]) {
        for (i, cell) in cells.iter().enumerate() {
            let target = self.sheet.get_cell_mut((i as u32 + 1, self.row));
            match cell {
                Cell::Text(text) => {
                    target.set_value(text.as_str());
                }
                Cell::Number(n) => {
                    target.set_value_number(*n);
                }
                Cell::Empty => {}
            }
        }
        self.row += 1;
    }

    fn blank(&mut self) {
        self.row += 1;
    }

    fn widths(&mut self, widths: &[f64]) {
        for (i, width) in widths.iter().enumerate() {
            self.sheet
                .get_column_dimension_mut(&column_letter(i as u32 + 1))
                .set_width(*width);
        }
    }
}

enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

fn text(value: impl Into<String>) -> Cell {
    Cell::Text(value.into())
}

fn num(value: impl Into<f64>) -> Cell {
    Cell::Number(value.into())
}

fn count(value: usize) -> Cell {
    Cell::Number(value as f64)
}

fn column_letter(mut column: u32) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        column = (column - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn write_summary(sheet: &mut Worksheet, analysis: &FileAnalysis) {
    let agg = &analysis.aggregate;
    let mut w = SheetWriter::new(sheet, "Comment Insights - Executive Summary", 4);
    w.widths(&[34.0, 40.0]);
    w.header(&["Metric", "Value"]);
    w.row(&[text("Analysis id"), text(analysis.analysis_id.to_string())]);
    w.row(&[text("Model"), text(analysis.model.as_str())]);
    w.row(&[text("Started"), text(analysis.started_at.to_rfc3339())]);
    w.row(&[text("Comments analyzed"), count(agg.total_comments)]);
    w.row(&[text("Dominant trend"), text(agg.dominant_trend.as_str())]);
    w.row(&[text("Overall confidence"), num(agg.overall_confidence)]);
    for category in SentimentCategory::ALL {
        w.row(&[
            text(format!("Share {}", category.as_str())),
            num(agg.share(category)),
        ]);
    }
    w.row(&[text("Batches total"), count(agg.batches_total)]);
    w.row(&[text("Batches failed"), count(agg.batches_failed)]);
    w.row(&[text("Low-confidence batches"), count(agg.low_confidence_batches)]);
    w.row(&[
        text("Fallback results"),
        text(if agg.fallback_used { "yes" } else { "no" }),
    ]);
    w.row(&[text("Critical comments"), count(analysis.critical_comments().count())]);
    w.row(&[text("Tokens used"), num(agg.usage.total_tokens as f64)]);
    w.row(&[text("Elapsed (ms)"), num(agg.elapsed_ms as f64)]);
}

fn write_detail(sheet: &mut Worksheet, analysis: &FileAnalysis) {
    let mut w = SheetWriter::new(sheet, "Comment Detail", 10);
    w.widths(&[8.0, 60.0, 12.0, 12.0, 8.0, 14.0, 18.0, 30.0, 30.0, 10.0]);
    w.header(&[
        "Row",
        "Comment",
        "Sentiment",
        "Confidence",
        "NPS",
        "Satisfaction",
        "Dominant emotion",
        "Themes",
        "Pain points",
        "Urgency",
    ]);
    for insight in &analysis.comments {
        w.row(&detail_row(insight));
    }
}

fn detail_row(insight: &CommentInsight) -> Vec<Cell> {
    let comment = &insight.comment;
    let mut cells = vec![count(comment.row), text(comment.text.as_str())];
    let Some(analysis) = &insight.analysis else {
        cells.push(text("not analyzed"));
        return cells;
    };
    let themes = analysis
        .themes()
        .iter()
        .map(|t| t.category().as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let pain_points = analysis
        .pain_points()
        .iter()
        .map(|p| format!("{} ({})", p.kind().as_str(), p.impact().as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    cells.extend([
        text(analysis.sentiment().category().as_str()),
        num(analysis.sentiment().confidence()),
        comment.nps.map_or(Cell::Empty, num),
        comment.satisfaction.map_or(Cell::Empty, num),
        analysis
            .dominant_emotion()
            .map_or(Cell::Empty, |e| text(e.kind().as_str())),
        text(themes),
        text(pain_points),
        analysis.urgency().map_or(Cell::Empty, |u| text(u.as_str())),
    ]);
    cells
}

fn write_distribution(sheet: &mut Worksheet, analysis: &FileAnalysis) {
    let agg = &analysis.aggregate;
    let mut w = SheetWriter::new(sheet, "Sentiment Distribution", 3);
    w.widths(&[16.0, 10.0, 12.0]);
    w.header(&["Sentiment", "Count", "Share"]);
    for category in SentimentCategory::ALL {
        w.row(&[
            text(category.as_str()),
            count(agg.count(category)),
            num(agg.share(category)),
        ]);
    }
    w.row(&[text("total"), count(agg.total_comments), num(1.0)]);
}

fn write_insights(sheet: &mut Worksheet, analysis: &FileAnalysis) {
    let agg = &analysis.aggregate;
    let mut w = SheetWriter::new(sheet, "Insights", 3);
    w.widths(&[24.0, 60.0, 14.0]);
    w.header(&["Theme", "Relevance"]);
    for (theme, weight) in agg.top_themes(TOP_N) {
        w.row(&[text(theme), num(weight)]);
    }
    w.blank();
    w.header(&["Critical row", "Comment", "Pain points"]);
    for insight in analysis.critical_comments() {
        let pain_points = insight
            .analysis
            .as_ref()
            .map(|a| {
                a.pain_points()
                    .iter()
                    .filter(|p| p.is_critical())
                    .map(|p| p.kind().as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        w.row(&[
            count(insight.comment.row),
            text(insight.comment.text.as_str()),
            text(pain_points),
        ]);
    }
}

fn write_emotions(sheet: &mut Worksheet, analysis: &FileAnalysis) {
    let mut w = SheetWriter::new(sheet, "Emotional Analysis", 2);
    w.widths(&[20.0, 14.0]);
    w.header(&["Emotion", "Intensity"]);
    for (emotion, weight) in analysis.aggregate.top_emotions(TOP_N) {
        w.row(&[text(emotion), num(weight)]);
    }
}

fn write_glossary(sheet: &mut Worksheet) {
    let mut w = SheetWriter::new(sheet, "Glossary", 2);
    w.widths(&[22.0, 80.0]);
    w.header(&["Term", "Meaning"]);
    for (term, meaning) in GLOSSARY {
        w.row(&[text(*term), text(*meaning)]);
    }
}
