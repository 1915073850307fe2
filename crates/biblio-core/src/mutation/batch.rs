//! JSON-lines bulk mutation input and output
//!
//! Input: one `{"id": "...", "op": "...", "args": [...]}` document per line.
//! Output: one `BatchOutcome` per processed line.

use serde::{Deserialize, Serialize};
use std::io::BufRead;

use super::{ArgumentError, Mutation};
use crate::errors::{ExError, ExErrorKind};

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub line: usize,
    pub id: String,
    pub mutation: Mutation,
}

#[derive(Deserialize)]
struct RawLine {
    id: String,
    op: String,
    #[serde(default)]
    args: Vec<String>,
}

/// Parse one input line; blank lines yield `None`
///
/// # Errors
///
/// `ArgumentError` carrying `line_no` when the line is not a valid record.
pub fn parse_line(line_no: usize, text: &str) -> Result<Option<BatchItem>, ArgumentError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let raw: RawLine = serde_json::from_str(text).map_err(|e| ArgumentError {
        message: format!("malformed mutation: {}", e),
        line: Some(line_no),
    })?;
    if raw.id.trim().is_empty() {
        return Err(ArgumentError {
            message: "missing id".to_string(),
            line: Some(line_no),
        });
    }
    Ok(Some(BatchItem {
        line: line_no,
        id: raw.id,
        mutation: Mutation::new(raw.op, raw.args).at_line(line_no),
    }))
}

/// Iterator over the records of a JSON-lines stream
///
/// Each item is independent: a malformed line yields an error and reading
/// continues with the next line.
pub struct BatchReader<B> {
    input: B,
    line_no: usize,
}

impl<B: BufRead> BatchReader<B> {
    pub fn new(input: B) -> Self {
        Self { input, line_no: 0 }
    }
}

impl<B: BufRead> Iterator for BatchReader<B> {
    type Item = Result<BatchItem, ExError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut buf = String::new();
            match self.input.read_line(&mut buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    return Some(Err(ExError::new(ExErrorKind::Io)
                        .with_op("read_batch")
                        .with_message(e.to_string())))
                }
            }
            self.line_no += 1;
            match parse_line(self.line_no, &buf) {
                Ok(None) => continue,
                Ok(Some(item)) => return Some(Ok(item)),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

/// Result of one processed line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub line: usize,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchOutcome {
    pub fn saved(line: usize, id: impl Into<String>, version_id: impl Into<String>) -> Self {
        Self {
            line,
            id: id.into(),
            version_id: Some(version_id.into()),
            error: None,
        }
    }

    pub fn failed(line: usize, id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            line,
            id: id.into(),
            version_id: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_numbers_lines_and_skips_blanks() {
        let input = "{\"id\":\"p1\",\"op\":\"add_keyword\",\"args\":[\"x\"]}\n\n\
                     not json\n\
                     {\"id\":\"p2\",\"op\":\"lock\"}\n";
        let items: Vec<_> = BatchReader::new(input.as_bytes()).collect();
        assert_eq!(items.len(), 3);

        let first = items[0].as_ref().unwrap();
        assert_eq!(first.line, 1);
        assert_eq!(first.mutation.name, "add_keyword");
        assert_eq!(first.mutation.line, Some(1));

        let bad = items[1].as_ref().unwrap_err();
        assert_eq!(bad.kind(), ExErrorKind::Argument);
        assert_eq!(bad.line(), Some(3));

        let last = items[2].as_ref().unwrap();
        assert_eq!(last.line, 4);
        assert!(last.mutation.args.is_empty());
    }

    #[test]
    fn test_outcome_serialization_omits_empty_fields() {
        let ok = serde_json::to_string(&BatchOutcome::saved(1, "p1", "v1")).unwrap();
        assert_eq!(ok, r#"{"line":1,"id":"p1","version_id":"v1"}"#);
        let err = serde_json::to_string(&BatchOutcome::failed(2, "p2", "boom")).unwrap();
        assert_eq!(err, r#"{"line":2,"id":"p2","error":"boom"}"#);
    }
}
