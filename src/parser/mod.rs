//! Streaming parser for DATEV EXTF Buchungsstapel files.
//!
//! Bytes are decoded (BOM, UTF-8 or Windows-1252), split into records by a
//! quote-aware state machine, and turned into a typed header, a column
//! mapping and a lazy stream of [`BookingRow`]s. Raw values are kept
//! verbatim so a file can be rewritten without touching unrelated bytes.
//!
//! # Example
//!
//! ```
//! use datev_lint::parser::parse_bytes;
//!
//! let data = "\"EXTF\";700;21;\"Buchungsstapel\";13;;;;;;1001;1;20250101;4;20250101;20251231\r\n\
//!             Umsatz;Soll/Haben-Kennzeichen;Konto;Gegenkonto;Belegdatum\r\n\
//!             100,00;S;1200;8400;1503\r\n";
//! let parsed = parse_bytes(data.as_bytes(), "batch.csv").unwrap();
//! assert_eq!(parsed.head.header.header_version, 700);
//!
//! let (rows, diagnostics) = parsed.rows.materialize();
//! assert_eq!(rows[0].raw("konto"), Some("1200"));
//! assert!(diagnostics.is_empty());
//! ```

mod accounts;
mod columns;
mod dates;
mod encoding;
mod field_dict;
mod header;
mod rows;
mod tokenizer;

use std::path::Path;

use tracing::{debug, info};

pub use accounts::ChartOfAccounts;
pub use columns::{ColumnMapping, MappedColumn, map_columns};
pub use dates::{DateConfidence, DateContext, DerivedDate, derive, parse_ttmm};
pub use encoding::{
    Decoded, Encoding, Format, PROBE_SIZE, decode, decode_cp1252, detect_encoding, detect_format,
    encode, fits_cp1252,
};
pub use field_dict::{
    FIELDS, FieldDef, FieldKind, generated_id, lookup, normalize_label, required_fields,
};
pub use header::{BOOKING_BATCH_CATEGORY, DatevHeader, HEADER_VERSIONS, parse_header};
pub use rows::{BookingRow, RowConverter, TypedValue, format_decimal, parse_decimal, row_checksum};
pub use tokenizer::{Record, TokenizeError, Tokenizer, needs_quotes, quote};

use crate::core::{Diagnostic, Location, ParseError, Severity};

/// Maximum number of data rows DATEV accepts in one file.
pub const MAX_DATA_ROWS: usize = 99_999;

/// Row number of the first data record.
pub const FIRST_DATA_ROW: usize = 3;

/// Everything known before the first data row.
#[derive(Debug, Clone)]
pub struct FileHead {
    pub file: String,
    pub encoding: Encoding,
    pub format: Format,
    pub header: DatevHeader,
    pub columns: ColumnMapping,
    /// Decoding diagnostics.
    pub parse_diagnostics: Vec<Diagnostic>,
    pub header_diagnostics: Vec<Diagnostic>,
    pub column_diagnostics: Vec<Diagnostic>,
}

/// Output of [`parse_bytes`]: the file head plus the lazy row stream.
#[derive(Debug)]
pub struct ParseResult {
    pub head: FileHead,
    pub rows: RowStream,
}

/// Single-pass, non-restartable stream of data rows.
///
/// `Err` items are record-level diagnostics (unbalanced quotes, row limit);
/// the stream continues after them. To read the rows twice, parse again.
#[derive(Debug)]
pub struct RowStream {
    tokenizer: Tokenizer,
    converter: RowConverter,
    file: String,
    next_row_no: usize,
    data_rows: usize,
    pending: Option<BookingRow>,
}

impl RowStream {
    /// Collect all rows and record-level diagnostics.
    pub fn materialize(self) -> (Vec<BookingRow>, Vec<Diagnostic>) {
        let mut rows = Vec::new();
        let mut diagnostics = Vec::new();
        for item in self {
            match item {
                Ok(row) => rows.push(row),
                Err(diag) => diagnostics.push(diag),
            }
        }
        (rows, diagnostics)
    }

    /// Data rows produced so far.
    pub fn rows_read(&self) -> usize {
        self.data_rows
    }
}

impl Iterator for RowStream {
    type Item = Result<BookingRow, Diagnostic>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(row) = self.pending.take() {
            return Some(Ok(row));
        }
        let record = self.tokenizer.next()?;
        let row_no = self.next_row_no;
        self.next_row_no += 1;

        let record = match record {
            Ok(record) => record,
            Err(err) => {
                let mut diag = err.to_diagnostic(&self.file);
                diag.location.row_no = Some(row_no);
                return Some(Err(diag));
            }
        };

        let row = self.converter.convert(record, row_no);
        self.data_rows += 1;
        if self.data_rows == MAX_DATA_ROWS + 1 {
            let diag = Diagnostic::new(
                "DVL-ROW-001",
                Severity::Warn,
                format!("file has more than {} data rows", MAX_DATA_ROWS),
                Location::file(&self.file)
                    .with_row(row_no)
                    .with_line(row.line_span.0),
            );
            self.pending = Some(row);
            return Some(Err(diag));
        }
        Some(Ok(row))
    }
}

fn next_structural_record(
    tokenizer: &mut Tokenizer,
    found: usize,
) -> Result<Record, ParseError> {
    match tokenizer.next() {
        None => Err(ParseError::InsufficientRecords { found }),
        Some(Ok(record)) => Ok(record),
        Some(Err(err)) => Err(ParseError::Header {
            code: TokenizeError::CODE,
            line: err.line,
            message: "unclosed quoted field".into(),
        }),
    }
}

/// Parse an in-memory file.
///
/// Fails only on fatal problems: undecidable encoding, missing header or
/// column records, or an unusable header. Everything else is reported as
/// diagnostics on the head or in the row stream.
pub fn parse_bytes(data: &[u8], file: &str) -> Result<ParseResult, ParseError> {
    let decoded = decode(data, file)?;
    let format = detect_format(&decoded.text);
    let mut tokenizer = Tokenizer::new(decoded.text);

    let header_record = next_structural_record(&mut tokenizer, 0)?;
    let (header, header_diagnostics) = parse_header(&header_record, file)?;
    let label_record = next_structural_record(&mut tokenizer, 1)?;
    let (columns, column_diagnostics) = map_columns(&label_record, file);

    info!(
        file,
        encoding = decoded.encoding.as_str(),
        version = header.header_version,
        columns = columns.len(),
        "parsed EXTF header"
    );
    debug!(
        header = header_diagnostics.len(),
        columns = column_diagnostics.len(),
        "head diagnostics"
    );

    let converter = RowConverter::new(columns.clone(), header.date_context(), file);
    Ok(ParseResult {
        head: FileHead {
            file: file.to_string(),
            encoding: decoded.encoding,
            format,
            header,
            columns,
            parse_diagnostics: decoded.diagnostics,
            header_diagnostics,
            column_diagnostics,
        },
        rows: RowStream {
            tokenizer,
            converter,
            file: file.to_string(),
            next_row_no: FIRST_DATA_ROW,
            data_rows: 0,
            pending: None,
        },
    })
}

/// Read and parse a file from disk.
pub fn parse_file(path: impl AsRef<Path>) -> Result<ParseResult, ParseError> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_bytes(&data, &path.display().to_string())
}
