use crate::columns::{CanonicalField, ColumnResolver};
use crate::schema::{CellValue, NumberLocale, RawRow, SalesRecord};
use crate::utils::classify_year;
use log::{debug, info};

/// Records produced from one header + rows input, with the count of rows
/// that could not become a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    pub records: Vec<SalesRecord>,
    pub skipped: usize,
}

pub struct RecordNormalizer<'a> {
    columns: &'a ColumnResolver,
    locale: NumberLocale,
}

impl<'a> RecordNormalizer<'a> {
    pub fn new(columns: &'a ColumnResolver, locale: NumberLocale) -> Self {
        Self { columns, locale }
    }

    pub fn normalize<I>(&self, headers: &[String], rows: I) -> NormalizedBatch
    where
        I: IntoIterator<Item = RawRow>,
    {
        let mut batch = NormalizedBatch::default();
        let mut seen = 0usize;

        for row in rows {
            seen += 1;
            match self.normalize_row(headers, row) {
                Some(record) => batch.records.push(record),
                None => batch.skipped += 1,
            }
        }

        debug!("Detected columns: {:?}", headers);
        info!(
            "Normalized {} rows: {} valid records, {} skipped",
            seen,
            batch.records.len(),
            batch.skipped
        );

        batch
    }

    /// Builds a record from one row, or `None` when store, product or a
    /// non-zero quantity cannot be resolved.
    pub fn normalize_row(&self, headers: &[String], row: RawRow) -> Option<SalesRecord> {
        let row = row.into_keyed(headers);
        let field = |f: CanonicalField| self.columns.resolve(&row, f);

        let store = field(CanonicalField::Store).and_then(CellValue::truthy_text)?;
        let product = field(CanonicalField::Product).and_then(CellValue::truthy_text)?;

        let qty = parse_quantity(field(CanonicalField::Quantity), self.locale)?;
        if qty == 0 {
            return None;
        }

        let price = field(CanonicalField::Price).and_then(|v| parse_price(v, self.locale));

        let date = field(CanonicalField::Date)
            .and_then(CellValue::truthy_text)
            .unwrap_or_default();
        let year = classify_year(&date);

        let ean = field(CanonicalField::Ean).and_then(CellValue::truthy_text);
        let group = field(CanonicalField::Group).and_then(CellValue::truthy_text);

        Some(SalesRecord {
            store,
            product,
            date,
            year,
            ean,
            group,
            qty,
            price,
            total: price.map(|p| qty as f64 * p),
        })
    }
}

/// Quantity coercion. Numeric cells are truncated to whole units; text is
/// stripped of grouping characters and read as a leading integer. An absent
/// or empty value reads as zero.
pub fn parse_quantity(value: Option<&CellValue>, locale: NumberLocale) -> Option<i64> {
    match value {
        None | Some(CellValue::Empty) => Some(0),
        Some(CellValue::Number(n)) if n.is_finite() => Some(n.trunc() as i64),
        Some(CellValue::Number(_)) => None,
        Some(CellValue::Text(text)) => {
            let cleaned: String = match locale {
                NumberLocale::Legacy => text.chars().filter(|c| *c != ',' && *c != '.').collect(),
                NumberLocale::DotDecimal => text.chars().filter(|c| *c != ',').collect(),
                NumberLocale::CommaDecimal => text.chars().filter(|c| *c != '.').collect(),
            };
            if cleaned.is_empty() {
                return Some(0);
            }
            parse_leading_int(&cleaned)
        }
    }
}

/// Price coercion. A numeric zero counts as "no price"; text is stripped of
/// grouping characters and read as a leading decimal.
pub fn parse_price(value: &CellValue, locale: NumberLocale) -> Option<f64> {
    match value {
        CellValue::Empty => None,
        CellValue::Number(n) if *n == 0.0 || n.is_nan() => None,
        CellValue::Number(n) => Some(*n),
        CellValue::Text(text) if text.is_empty() => None,
        CellValue::Text(text) => {
            let cleaned: String = match locale {
                NumberLocale::Legacy | NumberLocale::DotDecimal => {
                    text.chars().filter(|c| *c != ',').collect()
                }
                NumberLocale::CommaDecimal => text
                    .chars()
                    .filter(|c| *c != '.')
                    .map(|c| if c == ',' { '.' } else { c })
                    .collect(),
            };
            if cleaned.is_empty() {
                return Some(0.0);
            }
            parse_leading_float(&cleaned)
        }
    }
}

/// Reads an optionally signed run of digits at the start of `text`, ignoring
/// leading whitespace and anything after the digits.
pub fn parse_leading_int(text: &str) -> Option<i64> {
    let s = text.trim_start();
    let (negative, rest) = split_sign(s);
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let magnitude: i64 = digits.parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Like [`parse_leading_int`] but accepts one decimal point.
pub fn parse_leading_float(text: &str) -> Option<f64> {
    let s = text.trim_start();
    let (negative, rest) = split_sign(s);

    let mut literal = String::new();
    let mut seen_dot = false;
    let mut seen_digit = false;
    for c in rest.chars() {
        if c.is_ascii_digit() {
            seen_digit = true;
            literal.push(c);
        } else if c == '.' && !seen_dot {
            seen_dot = true;
            literal.push(c);
        } else {
            break;
        }
    }
    if !seen_digit {
        return None;
    }
    let magnitude: f64 = literal.trim_end_matches('.').parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

fn split_sign(s: &str) -> (bool, &str) {
    if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest)
    } else {
        (false, s)
    }
}
