use crate::schema::SalesRecord;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::hash::Hash;

pub const MONTH_NAMES: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

const MONTH_SHORT: [&str; 12] = [
    "ene", "feb", "mar", "abr", "may", "jun", "jul", "ago", "sept", "oct", "nov", "dic",
];

static DAY_MONTH_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}/\d{1,2}/(\d{4})$").expect("valid regex"));
static YEAR_DASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-\d{1,2}-\d{1,2}$").expect("valid regex"));
static YEAR_SLASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})/\d{1,2}/\d{1,2}$").expect("valid regex"));

/// Extracts the year from `D/M/YYYY`, `YYYY-M-D` or `YYYY/M/D` text. Any
/// other shape yields `None`.
pub fn classify_year(date: &str) -> Option<i32> {
    [&*DAY_MONTH_YEAR, &*YEAR_DASH, &*YEAR_SLASH]
        .iter()
        .find_map(|re| re.captures(date))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y"];
const DATE_TIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%d/%m/%Y %H:%M:%S"];

/// Parses a record date into a calendar date. Slash dates are read day first.
pub fn parse_sale_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }

    for format in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt.date());
        }
    }

    // "2024-03-01T00:00:00Z" and friends
    chrono::DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Year of a record: the one captured at ingestion, else the parsed date's.
pub fn record_year(record: &SalesRecord) -> Option<i32> {
    record
        .year
        .or_else(|| parse_sale_date(&record.date).map(|d| d.year()))
}

/// Zero-based calendar month of a record date.
pub fn record_month0(record: &SalesRecord) -> Option<usize> {
    parse_sale_date(&record.date).map(|d| d.month0() as usize)
}

/// "enero de 2024"
pub fn month_label(year: i32, month: u32) -> String {
    let idx = (month.clamp(1, 12) - 1) as usize;
    format!("{} de {}", MONTH_NAMES[idx].to_lowercase(), year)
}

/// "ene 2024"
pub fn short_month_label(year: i32, month: u32) -> String {
    let idx = (month.clamp(1, 12) - 1) as usize;
    format!("{} {}", MONTH_SHORT[idx], year)
}

pub fn month_key(year: i32, month: u32) -> String {
    format!("{:04}-{:02}", year, month)
}

/// Colombian peso rendering without decimals, e.g. `$ 1.234.567`.
pub fn format_cop(value: f64) -> String {
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    if rounded < 0 {
        format!("-$ {}", grouped)
    } else {
        format!("$ {}", grouped)
    }
}

/// Insertion-ordered sum accumulator. Sorting its entries with a stable sort
/// leaves ties in first-seen order.
#[derive(Debug, Clone)]
pub(crate) struct Tally<K> {
    index: HashMap<K, usize>,
    entries: Vec<(K, i64)>,
}

impl<K: Eq + Hash + Clone> Tally<K> {
    pub(crate) fn new() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }

    pub(crate) fn add(&mut self, key: K, value: i64) {
        match self.index.get(&key) {
            Some(&pos) => self.entries[pos].1 += value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub(crate) fn into_entries(self) -> Vec<(K, i64)> {
        self.entries
    }

    /// Entries sorted by value, largest first.
    pub(crate) fn into_ranked(self) -> Vec<(K, i64)> {
        let mut entries = self.entries;
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_year() {
        assert_eq!(classify_year("15/01/2024"), Some(2024));
        assert_eq!(classify_year("2023-7-4"), Some(2023));
        assert_eq!(classify_year("2022/12/31"), Some(2022));
        assert_eq!(classify_year("2024-01-01 10:00"), None);
        assert_eq!(classify_year(" 2024-01-01"), None);
        assert_eq!(classify_year("enero"), None);
    }

    #[test]
    fn test_parse_sale_date() {
        let jan_15 = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(parse_sale_date("2024-01-15"), Some(jan_15));
        assert_eq!(parse_sale_date("2024/1/15"), Some(jan_15));
        assert_eq!(parse_sale_date("15/01/2024"), Some(jan_15));
        assert_eq!(parse_sale_date("15-1-2024"), Some(jan_15));
        assert_eq!(parse_sale_date("2024-01-15T08:30:00"), Some(jan_15));
        assert_eq!(parse_sale_date("2024-01-15T08:30:00Z"), Some(jan_15));
        assert_eq!(parse_sale_date(""), None);
        assert_eq!(parse_sale_date("sin fecha"), None);
    }

    #[test]
    fn test_month_labels() {
        assert_eq!(month_label(2024, 3), "marzo de 2024");
        assert_eq!(short_month_label(2023, 12), "dic 2023");
        assert_eq!(month_key(2024, 2), "2024-02");
    }

    #[test]
    fn test_format_cop() {
        assert_eq!(format_cop(1_234_567.4), "$ 1.234.567");
        assert_eq!(format_cop(999.0), "$ 999");
        assert_eq!(format_cop(0.0), "$ 0");
        assert_eq!(format_cop(-1500.0), "-$ 1.500");
    }

    #[test]
    fn test_tally_keeps_first_seen_order_for_ties() {
        let mut tally = Tally::new();
        tally.add("b", 2);
        tally.add("a", 5);
        tally.add("c", 2);
        tally.add("b", 0);
        let ranked = tally.into_ranked();
        assert_eq!(ranked, vec![("a", 5), ("b", 2), ("c", 2)]);
    }
}
