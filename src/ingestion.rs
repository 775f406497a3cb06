use crate::error::{Result, SalesInsightsError};
use crate::normalizer::RecordNormalizer;
use crate::schema::{CellValue, IngestionConfig, RawRow, SalesRecord};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// An uploaded file: its display name (the extension picks the parser) and raw bytes.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self> {
        let name = display_name(path);
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| SalesInsightsError::UnreadableFile {
                file_name: name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { name, bytes })
    }

    pub fn kind(&self) -> SourceKind {
        let lower = self.name.to_lowercase();
        if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
            SourceKind::Spreadsheet
        } else {
            SourceKind::DelimitedText
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Spreadsheet,
    DelimitedText,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFile {
    pub file_name: String,
    pub records: Vec<SalesRecord>,
    /// Rows dropped as malformed or incomplete.
    pub skipped_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFailure {
    pub file_name: String,
    pub reason: String,
}

/// Settled result of ingesting one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Parsed(ParsedFile),
    Failed(FileFailure),
}

impl FileOutcome {
    pub fn file_name(&self) -> &str {
        match self {
            FileOutcome::Parsed(parsed) => &parsed.file_name,
            FileOutcome::Failed(failure) => &failure.file_name,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, FileOutcome::Parsed(_))
    }
}

/// Parses one file. Every failure is captured in the returned outcome.
pub fn ingest_file(file: &SourceFile, config: &IngestionConfig) -> FileOutcome {
    let parsed = config.validate().and_then(|_| match file.kind() {
        SourceKind::Spreadsheet => parse_spreadsheet(&file.name, &file.bytes, config),
        SourceKind::DelimitedText => {
            let text = decode_text(&file.bytes);
            parse_delimited_text(&file.name, &text, config)
        }
    });

    match parsed {
        Ok(parsed) => FileOutcome::Parsed(parsed),
        Err(e) => {
            warn!("Rejected {}: {}", file.name, e);
            FileOutcome::Failed(FileFailure {
                file_name: file.name.clone(),
                reason: e.to_string(),
            })
        }
    }
}

/// Ingests every file as an independent unit; one failure never stops the
/// others. Outcomes come back in input order.
pub async fn ingest_batch(files: &[SourceFile], config: &IngestionConfig) -> Vec<FileOutcome> {
    join_all(files.iter().map(|file| async move { ingest_file(file, config) })).await
}

/// Reads and ingests files from disk. A read error becomes that file's failure.
pub async fn ingest_paths(paths: &[PathBuf], config: &IngestionConfig) -> Vec<FileOutcome> {
    join_all(paths.iter().map(|path| async move {
        match SourceFile::from_path(path).await {
            Ok(file) => ingest_file(&file, config),
            Err(e) => FileOutcome::Failed(FileFailure {
                file_name: display_name(path),
                reason: e.to_string(),
            }),
        }
    }))
    .await
}

/// First sheet of an xlsx/xls workbook.
pub fn parse_spreadsheet(
    file_name: &str,
    bytes: &[u8],
    config: &IngestionConfig,
) -> Result<ParsedFile> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| SalesInsightsError::Spreadsheet(format!("{}: {}", file_name, e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| {
            SalesInsightsError::Spreadsheet(format!("{} has no worksheets", file_name))
        })?
        .map_err(|e| SalesInsightsError::Spreadsheet(format!("{}: {}", file_name, e)))?;

    let rows: Vec<Vec<CellValue>> = range
        .rows()
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect();

    parse_sheet_rows(file_name, rows, config)
}

/// Locates the header row in a decoded sheet and normalizes what follows.
/// A cell is a header marker when it contains one of the marker tokens.
pub fn parse_sheet_rows(
    file_name: &str,
    rows: Vec<Vec<CellValue>>,
    config: &IngestionConfig,
) -> Result<ParsedFile> {
    let header_idx = rows
        .iter()
        .position(|row| {
            row.iter().any(|cell| {
                let text = cell.to_text();
                config
                    .header_markers
                    .iter()
                    .any(|marker| !marker.is_empty() && text.contains(marker.as_str()))
            })
        })
        .ok_or_else(|| SalesInsightsError::MissingHeader {
            file_name: file_name.to_string(),
        })?;
    debug!("{}: header found at row {}", file_name, header_idx + 1);

    let mut rows = rows.into_iter().skip(header_idx);
    let headers: Vec<String> = rows
        .next()
        .unwrap_or_default()
        .iter()
        .map(|cell| cell.to_text().trim().to_string())
        .collect();

    let data_rows = rows
        .filter(|row| row.iter().any(CellValue::is_present))
        .map(RawRow::Positional);

    let normalizer = RecordNormalizer::new(&config.columns, config.number_locale);
    let batch = normalizer.normalize(&headers, data_rows);

    info!(
        "{}: {} records ({} rows skipped)",
        file_name,
        batch.records.len(),
        batch.skipped
    );

    Ok(ParsedFile {
        file_name: file_name.to_string(),
        records: batch.records,
        skipped_rows: batch.skipped,
    })
}

/// Delimited text: the header is the first line starting with a marker token.
/// Fields are split quote-aware; rows whose field count differs from the
/// header's are dropped as malformed.
pub fn parse_delimited_text(
    file_name: &str,
    text: &str,
    config: &IngestionConfig,
) -> Result<ParsedFile> {
    let lines: Vec<&str> = text.lines().collect();
    let header_idx = lines
        .iter()
        .position(|line| is_header_line(line, &config.header_markers))
        .ok_or_else(|| SalesInsightsError::MissingHeader {
            file_name: file_name.to_string(),
        })?;
    debug!("{}: header found at line {}", file_name, header_idx + 1);

    let delimiter = u8::try_from(config.csv_delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| {
            SalesInsightsError::InvalidConfig(format!(
                "csv_delimiter must be a single ASCII character, got '{}'",
                config.csv_delimiter
            ))
        })?;

    let body = lines[header_idx..].join("\n");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(delimiter)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    let mut malformed = 0usize;
    let mut rows = Vec::new();
    for result in reader.records() {
        match result {
            Ok(record) if record.len() == headers.len() => rows.push(RawRow::Positional(
                record.iter().map(|v| CellValue::Text(v.to_string())).collect(),
            )),
            Ok(_) => malformed += 1,
            Err(e) => {
                debug!("{}: unreadable line skipped: {}", file_name, e);
                malformed += 1;
            }
        }
    }

    let normalizer = RecordNormalizer::new(&config.columns, config.number_locale);
    let batch = normalizer.normalize(&headers, rows);

    info!(
        "{}: {} records ({} rows skipped, {} malformed lines)",
        file_name,
        batch.records.len(),
        batch.skipped,
        malformed
    );

    Ok(ParsedFile {
        file_name: file_name.to_string(),
        records: batch.records,
        skipped_rows: batch.skipped + malformed,
    })
}

fn is_header_line(line: &str, markers: &[String]) -> bool {
    let line = line.trim_start_matches('\u{feff}');
    let line = line.strip_prefix('"').unwrap_or(line);
    markers
        .iter()
        .any(|marker| !marker.is_empty() && line.starts_with(marker.as_str()))
}

/// UTF-8 when valid, otherwise Windows-1252, which is what older
/// point-of-sale exports use for accented headers.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.trim_start_matches('\u{feff}').to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

fn cell_from_data(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
            CellValue::Text(s.trim().to_string())
        }
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) => CellValue::Text(value.format("%Y-%m-%d").to_string()),
            None => CellValue::Number(dt.as_f64()),
        },
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}
