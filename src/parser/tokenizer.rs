//! Streaming lexer for the EXTF CSV dialect.
//!
//! Fields are separated by `;`, quoted with `"` and `""` escapes a quote
//! inside a quoted field. Outside quotes CR, LF or CRLF end a record; inside
//! quotes every byte (line breaks included) belongs to the field.

use std::ops::Range;

use crate::core::{Diagnostic, Location, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FieldStart,
    InUnquoted,
    InQuoted,
    QuoteInQuoted,
}

/// One logical record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Unescaped field values.
    pub values: Vec<String>,
    /// Fields exactly as they appear in the source, quotes included.
    pub raw_tokens: Vec<String>,
    /// First and last physical line (1-based).
    pub line_span: (usize, usize),
    /// Byte range of the record content in the decoded text, terminator
    /// excluded. `raw_tokens.join(";")` equals this slice.
    pub span: Range<usize>,
}

/// A record whose quoted field was still open at end of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizeError {
    pub line: usize,
    /// The first physical line of the broken record, terminator excluded.
    /// Tokenizing resumes on the next line.
    pub span: Range<usize>,
}

impl TokenizeError {
    pub const CODE: &'static str = "DVL-CSV-002";

    pub fn to_diagnostic(&self, file: &str) -> Diagnostic {
        Diagnostic::new(
            Self::CODE,
            Severity::Error,
            format!("unclosed quoted field in record starting at line {}", self.line),
            Location::file(file).with_line(self.line),
        )
    }
}

impl std::fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unbalanced quotes at line {}", self.line)
    }
}

impl std::error::Error for TokenizeError {}

/// Lazy, single-pass record iterator over decoded text.
///
/// Records whose fields are all empty are skipped. Once exhausted the
/// tokenizer stays exhausted; a second pass needs a new tokenizer.
#[derive(Debug)]
pub struct Tokenizer {
    text: String,
    pos: usize,
    line: usize,
}

struct FieldBuf {
    bytes: Vec<u8>,
}

impl FieldBuf {
    fn take(&mut self) -> String {
        let bytes = std::mem::take(&mut self.bytes);
        // Splits happen only at ASCII bytes, so the buffer is valid UTF-8.
        String::from_utf8(bytes)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
    }
}

impl Tokenizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pos: 0,
            line: 1,
        }
    }

    /// The text being tokenized.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Current physical line.
    pub fn line(&self) -> usize {
        self.line
    }

    fn next_record(&mut self) -> Option<Result<Record, TokenizeError>> {
        loop {
            if self.pos >= self.text.len() {
                return None;
            }
            match self.scan_record() {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }

    /// Scan one record starting at `self.pos`. `Ok(None)` means the record
    /// was blank and has been skipped.
    fn scan_record(&mut self) -> Result<Option<Record>, TokenizeError> {
        let bytes = self.text.as_bytes();
        let len = bytes.len();
        let start = self.pos;
        let start_line = self.line;

        let mut values = Vec::new();
        let mut raw_tokens = Vec::new();
        let mut buf = FieldBuf { bytes: Vec::new() };
        let mut token_start = start;
        let mut state = State::FieldStart;
        let mut line = self.line;
        let mut i = start;

        let (content_end, next_pos, end_line) = loop {
            if i >= len {
                if state == State::InQuoted {
                    let line_end = self.resume_after_error(start, start_line);
                    return Err(TokenizeError {
                        line: start_line,
                        span: start..line_end,
                    });
                }
                values.push(buf.take());
                raw_tokens.push(self.text[token_start..len].to_string());
                break (len, len, line);
            }

            let b = bytes[i];
            let at_terminator = b == b'\r' || b == b'\n';

            match state {
                State::InQuoted => {
                    if b == b'"' {
                        state = State::QuoteInQuoted;
                    } else {
                        if b == b'\n' || (b == b'\r' && bytes.get(i + 1) != Some(&b'\n')) {
                            line += 1;
                        }
                        buf.bytes.push(b);
                    }
                    i += 1;
                    continue;
                }
                State::QuoteInQuoted if b == b'"' => {
                    buf.bytes.push(b'"');
                    state = State::InQuoted;
                    i += 1;
                    continue;
                }
                State::FieldStart if b == b'"' => {
                    state = State::InQuoted;
                    i += 1;
                    continue;
                }
                _ => {}
            }

            if b == b';' {
                values.push(buf.take());
                raw_tokens.push(self.text[token_start..i].to_string());
                token_start = i + 1;
                state = State::FieldStart;
                i += 1;
            } else if at_terminator {
                values.push(buf.take());
                raw_tokens.push(self.text[token_start..i].to_string());
                let next = if b == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
                    i + 2
                } else {
                    i + 1
                };
                break (i, next, line);
            } else {
                // Content after a closing quote is kept, leniently.
                buf.bytes.push(b);
                state = State::InUnquoted;
                i += 1;
            }
        };

        self.pos = next_pos;
        self.line = if next_pos > content_end { end_line + 1 } else { end_line };

        if values.iter().all(|v| v.is_empty()) {
            return Ok(None);
        }
        Ok(Some(Record {
            values,
            raw_tokens,
            line_span: (start_line, end_line),
            span: start..content_end,
        }))
    }

    /// Continue after the first line terminator at or after `start`. Returns
    /// where that first physical line ends, terminator excluded.
    fn resume_after_error(&mut self, start: usize, start_line: usize) -> usize {
        let bytes = self.text.as_bytes();
        match bytes[start..].iter().position(|&b| b == b'\r' || b == b'\n') {
            Some(offset) => {
                let at = start + offset;
                self.pos = if bytes[at] == b'\r' && bytes.get(at + 1) == Some(&b'\n') {
                    at + 2
                } else {
                    at + 1
                };
                self.line = start_line + 1;
                at
            }
            None => {
                self.pos = bytes.len();
                bytes.len()
            }
        }
    }
}

impl Iterator for Tokenizer {
    type Item = Result<Record, TokenizeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record()
    }
}

/// Quote a value for output, doubling embedded quotes.
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Whether a value must be quoted to survive tokenizing.
pub fn needs_quotes(value: &str) -> bool {
    value.contains([';', '"', '\r', '\n'])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(text: &str) -> Vec<Result<Record, TokenizeError>> {
        Tokenizer::new(text).collect()
    }

    fn values(text: &str) -> Vec<Vec<String>> {
        records(text)
            .into_iter()
            .map(|r| r.unwrap().values)
            .collect()
    }

    #[test]
    fn simple_records() {
        assert_eq!(
            values("a;b;c\r\n1;2;3\r\n"),
            vec![vec!["a", "b", "c"], vec!["1", "2", "3"]]
        );
    }

    #[test]
    fn quoted_fields_and_escapes() {
        assert_eq!(
            values("\"a;b\";\"say \"\"hi\"\"\";x"),
            vec![vec!["a;b", "say \"hi\"", "x"]]
        );
    }

    #[test]
    fn empty_fields_kept() {
        assert_eq!(values("a;;\"\";d\r\n"), vec![vec!["a", "", "", "d"]]);
    }

    #[test]
    fn line_feed_inside_quotes_belongs_to_field() {
        let recs = records("\"line1\nline2\";x\r\nnext;y\r\n");
        let first = recs[0].as_ref().unwrap();
        assert_eq!(first.values, vec!["line1\nline2", "x"]);
        assert_eq!(first.line_span, (1, 2));
        let second = recs[1].as_ref().unwrap();
        assert_eq!(second.line_span, (3, 3));
    }

    #[test]
    fn lf_and_cr_terminators() {
        assert_eq!(values("a\nb\rc"), vec![vec!["a"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn blank_records_are_skipped() {
        let recs = records("a\r\n\r\n;;\r\nb\r\n");
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[1].as_ref().unwrap().line_span, (4, 4));
    }

    #[test]
    fn raw_tokens_reproduce_span() {
        let text = "\"EXTF\";700;\"a\"\"b\";;x y\r\n";
        let rec = records(text).remove(0).unwrap();
        assert_eq!(rec.raw_tokens, vec!["\"EXTF\"", "700", "\"a\"\"b\"", "", "x y"]);
        assert_eq!(rec.raw_tokens.join(";"), &text[rec.span.clone()]);
    }

    #[test]
    fn unclosed_quote_reports_line_and_resumes() {
        let text = "ok;1\r\n\"open;2\r\nnext;3";
        let recs = records(text);
        assert_eq!(recs.len(), 3);
        assert!(recs[0].is_ok());
        let err = recs[1].as_ref().unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(&text[err.span.clone()], "\"open;2");
        assert_eq!(err.to_diagnostic("f").code, "DVL-CSV-002");
        assert_eq!(recs[2].as_ref().unwrap().values, vec!["next", "3"]);
        assert_eq!(recs[2].as_ref().unwrap().line_span, (3, 3));
    }

    #[test]
    fn content_after_closing_quote_is_lenient() {
        assert_eq!(values("\"ab\"cd;e"), vec![vec!["abcd", "e"]]);
    }

    #[test]
    fn quote_helpers() {
        assert_eq!(quote("a\"b"), "\"a\"\"b\"");
        assert!(needs_quotes("a;b"));
        assert!(!needs_quotes("plain"));
    }
}
