#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use biblio_core::mutation::batch::BatchOutcome;
use biblio_core::{Context, ExErrorKind, RecordType};
use common::{dataset, publication, repo, user};
use std::io::{BufRead, Cursor, Read};

fn outcomes(output: &[u8]) -> Vec<BatchOutcome> {
    String::from_utf8(output.to_vec())
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn test_stream_reports_every_line() {
    // Given: Two datasets and a stream mixing good and bad lines
    let (_dir, repo) = repo();
    let ctx = Context::new();
    repo.save_dataset(&ctx, dataset("d1", "A"), &user()).unwrap();
    repo.save_dataset(&ctx, dataset("d2", "B"), &user()).unwrap();
    let input = [
        r#"{"id": "d1", "op": "add_keyword", "args": ["dna", "rna"]}"#,
        "",
        r#"{"id": "d2", "op": "bogus"}"#,
        "not json",
        r#"{"id": "d404", "op": "set_title", "args": ["X"]}"#,
        r#"{"id": "d2", "op": "set_title", "args": ["Renamed"]}"#,
    ]
    .join("\n");

    // When: The stream is applied
    let mut output = Vec::new();
    let summary = repo
        .mutate_stream(&ctx, RecordType::Dataset, Cursor::new(input), &mut output, &user())
        .unwrap();

    // Then: One outcome per non-blank line, numbered from the input
    assert_eq!(summary.processed, 5);
    assert_eq!(summary.saved, 2);
    assert_eq!(summary.failed, 3);

    let out = outcomes(&output);
    let lines: Vec<usize> = out.iter().map(|o| o.line).collect();
    assert_eq!(lines, vec![1, 3, 4, 5, 6]);
    assert!(out[0].version_id.is_some());
    assert!(out[1].error.as_deref().unwrap().contains("bogus"));
    assert!(out[2].error.as_deref().unwrap().contains("malformed"));
    assert_eq!(out[3].id, "d404");
    assert!(out[3].error.is_some());
    assert!(out[4].error.is_none());

    // And: Successful lines were persisted
    let d1 = repo.get_dataset(&ctx, "d1").unwrap();
    assert_eq!(d1.keyword, vec!["dna".to_string(), "rna".to_string()]);
    assert_eq!(out[0].version_id, d1.snapshot.version_id);
    assert_eq!(repo.get_dataset(&ctx, "d2").unwrap().title.as_deref(), Some("Renamed"));
}

#[test]
fn test_stream_targets_the_requested_record_type() {
    let (_dir, repo) = repo();
    let ctx = Context::new();
    repo.save_publication(&ctx, publication("x1", "Publication"), &user()).unwrap();

    let input = r#"{"id": "x1", "op": "set_year", "args": ["1999"]}"#;
    let mut output = Vec::new();
    let summary = repo
        .mutate_stream(&ctx, RecordType::Dataset, Cursor::new(input), &mut output, &user())
        .unwrap();
    assert_eq!(summary.failed, 1);

    let mut output = Vec::new();
    let summary = repo
        .mutate_stream(&ctx, RecordType::Publication, Cursor::new(input), &mut output, &user())
        .unwrap();
    assert_eq!(summary.saved, 1);
    assert_eq!(repo.get_publication(&ctx, "x1").unwrap().year.as_deref(), Some("1999"));
}

#[test]
fn test_cancelled_stream_stops() {
    let (_dir, repo) = repo();
    let ctx = Context::new();
    ctx.cancel();

    let input = r#"{"id": "d1", "op": "set_title", "args": ["X"]}"#;
    let mut output = Vec::new();
    let err = repo
        .mutate_stream(&ctx, RecordType::Dataset, Cursor::new(input), &mut output, &user())
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Cancelled);
    assert!(output.is_empty());
}

struct FailingReader;

impl Read for FailingReader {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"))
    }
}

impl BufRead for FailingReader {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"))
    }

    fn consume(&mut self, _amt: usize) {}
}

#[test]
fn test_unreadable_input_aborts_the_stream() {
    let (_dir, repo) = repo();
    let ctx = Context::new();

    let mut output = Vec::new();
    let err = repo
        .mutate_stream(&ctx, RecordType::Dataset, FailingReader, &mut output, &user())
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Io);
}
