use crate::columns::ColumnResolver;
use crate::error::{Result, SalesInsightsError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The normalized sales transaction every aggregate is computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    pub store: String,
    pub product: String,
    /// Kept as the text found in the source file; parsed on demand.
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ean: Option<String>,
    #[serde(rename = "grupo", default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub qty: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

impl SalesRecord {
    /// Group name, or `fallback` when the record is unclassified.
    pub fn group_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.group.as_deref().unwrap_or(fallback)
    }
}

/// Optional display metadata for a product group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductGroup {
    pub group_name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    pub color: String,
}

/// Bookkeeping entry for one imported file, used to delete a whole import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub file_name: String,
    pub records_count: usize,
    pub uploaded_at: DateTime<Utc>,
}

/// A single spreadsheet cell as handed to the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Present and not an empty string.
    pub fn is_present(&self) -> bool {
        match self {
            CellValue::Empty => false,
            CellValue::Text(s) => !s.is_empty(),
            CellValue::Number(_) => true,
        }
    }

    /// Text rendering, with integral numbers printed without a fraction.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
        }
    }

    /// Text rendering for values that must be "truthy": empty text, zero and
    /// NaN count as absent.
    pub fn truthy_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) if s.is_empty() => None,
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Number(n) if *n == 0.0 || n.is_nan() => None,
            CellValue::Number(n) => Some(format_number(*n)),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

pub type KeyedRow = HashMap<String, CellValue>;

/// A source row either aligned positionally with a header list or already
/// keyed by header name.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRow {
    Positional(Vec<CellValue>),
    Keyed(KeyedRow),
}

impl RawRow {
    /// Converts to the keyed representation. Empty header names are skipped
    /// and a repeated header keeps the value of its last column.
    pub fn into_keyed(self, headers: &[String]) -> KeyedRow {
        match self {
            RawRow::Keyed(map) => map,
            RawRow::Positional(values) => {
                let mut map = HashMap::with_capacity(headers.len());
                for (idx, header) in headers.iter().enumerate() {
                    if header.is_empty() {
                        continue;
                    }
                    let value = values.get(idx).cloned().unwrap_or(CellValue::Empty);
                    map.insert(header.clone(), value);
                }
                map
            }
        }
    }
}

/// How thousands and decimal separators are read from text cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberLocale {
    /// Quantities drop every `,` and `.`; prices drop every `,`.
    #[default]
    Legacy,
    /// `,` groups thousands and `.` marks decimals ("1,234.50").
    DotDecimal,
    /// `.` groups thousands and `,` marks decimals ("1.234,50").
    CommaDecimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub number_locale: NumberLocale,
    pub header_markers: Vec<String>,
    pub csv_delimiter: char,
    pub columns: ColumnResolver,
    pub batch_size: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            number_locale: NumberLocale::default(),
            header_markers: vec!["FECHA".to_string(), "EAN".to_string(), "TIENDA".to_string()],
            csv_delimiter: ',',
            columns: ColumnResolver::default(),
            batch_size: 500,
        }
    }
}

impl IngestionConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SalesInsightsError::InvalidConfig(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if self.header_markers.iter().all(|m| m.is_empty()) {
            return Err(SalesInsightsError::InvalidConfig(
                "at least one non-empty header marker is required".to_string(),
            ));
        }
        if !self.csv_delimiter.is_ascii() {
            return Err(SalesInsightsError::InvalidConfig(format!(
                "csv_delimiter must be a single ASCII character, got '{}'",
                self.csv_delimiter
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub top_n: usize,
    pub store_top_groups: usize,
    pub store_recent_months: usize,
    pub unclassified_label: String,
    pub default_group_color: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            store_top_groups: 5,
            store_recent_months: 12,
            unclassified_label: "Unclassified".to_string(),
            default_group_color: "#6b7280".to_string(),
        }
    }
}

impl MetricsConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            return Err(SalesInsightsError::InvalidConfig(
                "top_n must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
