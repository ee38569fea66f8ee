//! Reading comments from CSV and Excel files on disk.

use std::path::Path;

use insights_core::{inspect_file, read_comments, IngestError};
use tempfile::TempDir;

fn write_csv(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_csv_with_spanish_headers_and_ratings() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(
        dir.path(),
        "encuesta.csv",
        "ID,Comentario del cliente,NPS,Satisfacción\n\
         1,Excelente atención en la sucursal,10,95\n\
         2,  ,8,80\n\
         3,n/a,7,70\n\
         4,La entrega tardó demasiado,3,abc\n\
         5,ok,9,90\n\
         6,Precio razonable,11,60\n",
    );

    let file = read_comments(&path, 100).unwrap();
    assert_eq!(file.columns.comment.header, "Comentario del cliente");
    assert_eq!(file.columns.nps.as_ref().map(|c| c.index), Some(2));
    assert_eq!(file.columns.satisfaction.as_ref().map(|c| c.index), Some(3));
    assert_eq!(file.rows_read, 6);
    assert_eq!(file.rows_skipped, 3);
    assert!(file.sheet.is_none());

    let rows: Vec<usize> = file.comments.iter().map(|c| c.row).collect();
    assert_eq!(rows, vec![1, 4, 6]);
    assert_eq!(file.comments[0].nps, Some(10));
    assert_eq!(file.comments[0].satisfaction, Some(95.0));
    assert_eq!(file.comments[1].satisfaction, None);
    // out-of-range NPS is dropped, the comment is kept
    assert_eq!(file.comments[2].nps, None);
    assert_eq!(file.comments[2].satisfaction, Some(60.0));
}

#[test]
fn test_max_comments_truncates() {
    let dir = TempDir::new().unwrap();
    let body: String = (1..=10).map(|i| format!("comment number {i}\n")).collect();
    let path = write_csv(dir.path(), "feedback.csv", &format!("feedback\n{body}"));

    let file = read_comments(&path, 4).unwrap();
    assert_eq!(file.comments.len(), 4);
    assert_eq!(file.rows_truncated, 6);
    assert_eq!(file.comments[3].text, "comment number 4");

    let inspection = inspect_file(&path, 4).unwrap();
    assert_eq!(inspection.rows_kept, 4);
    assert_eq!(inspection.rows_read, 10);
}

#[test]
fn test_xlsx_round_trip_through_workbook() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("survey.xlsx");

    let mut book = umya_spreadsheet::new_file();
    let sheet = book.get_sheet_mut(&0).unwrap();
    sheet.get_cell_mut("A1").set_value("Review");
    sheet.get_cell_mut("B1").set_value("NPS");
    sheet.get_cell_mut("A2").set_value("Great coffee and friendly staff");
    sheet.get_cell_mut("B2").set_value_number(9);
    sheet.get_cell_mut("A3").set_value("null");
    sheet.get_cell_mut("B3").set_value_number(5);
    sheet.get_cell_mut("A4").set_value("Card payment failed twice");
    sheet.get_cell_mut("B4").set_value_number(2);
    umya_spreadsheet::writer::xlsx::write(&book, &path).unwrap();

    let file = read_comments(&path, 100).unwrap();
    assert!(file.sheet.is_some());
    assert_eq!(file.columns.comment.header, "Review");
    assert_eq!(file.comments.len(), 2);
    assert_eq!(file.comments[0].nps, Some(9));
    assert_eq!(file.comments[1].row, 3);
    assert_eq!(file.comments[1].text, "Card payment failed twice");
}

#[test]
fn test_unsupported_extension() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(dir.path(), "notes.txt", "comment\nhello there\n");
    assert!(matches!(
        read_comments(&path, 10),
        Err(IngestError::UnsupportedExtension { .. })
    ));
}

#[test]
fn test_header_only_file_is_empty() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(dir.path(), "empty.csv", "comment\n");
    assert!(matches!(
        read_comments(&path, 10),
        Err(IngestError::EmptyFile { .. })
    ));
}

#[test]
fn test_numeric_only_file_has_no_comment_column() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(dir.path(), "scores.csv", "id,value\n1,3.5\n2,4\n");
    let err = read_comments(&path, 10).unwrap_err();
    assert!(matches!(err, IngestError::NoCommentColumn { .. }));
    assert!(err.to_string().contains("id, value"));
}
