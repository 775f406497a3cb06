use crate::schema::SalesRecord;
use crate::utils::{record_month0, record_year, Tally};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Filters shared by the report tables. `month` is 1-based.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportFilters {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub store: Option<String>,
    pub line: Option<String>,
}

impl ReportFilters {
    pub fn matches(&self, record: &SalesRecord) -> bool {
        if let Some(year) = self.year {
            if record_year(record) != Some(year) {
                return false;
            }
        }
        if let Some(month) = self.month {
            if record_month0(record).map(|m| m as u32 + 1) != Some(month) {
                return false;
            }
        }
        if let Some(store) = self.store.as_deref() {
            if record.store != store {
                return false;
            }
        }
        if let Some(line) = self.line.as_deref() {
            if record.group.as_deref() != Some(line) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreReportRow {
    pub store_name: String,
    pub lines: BTreeMap<String, i64>,
    pub total: i64,
}

/// Store x product-line pivot with row and column totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreReport {
    /// Sorted by `total`, largest first.
    pub rows: Vec<StoreReportRow>,
    pub line_names: Vec<String>,
    pub line_totals: BTreeMap<String, i64>,
    pub grand_total: i64,
}

pub fn generate_store_report(
    records: &[SalesRecord],
    filters: &ReportFilters,
    unclassified_label: &str,
) -> StoreReport {
    let mut order: Vec<&str> = Vec::new();
    let mut stores: HashMap<&str, StoreReportRow> = HashMap::new();
    let mut line_totals: BTreeMap<String, i64> = BTreeMap::new();

    for record in records.iter().filter(|r| filters.matches(r)) {
        let line = record.group_or(unclassified_label);
        let row = stores.entry(record.store.as_str()).or_insert_with(|| {
            order.push(record.store.as_str());
            StoreReportRow {
                store_name: record.store.clone(),
                lines: BTreeMap::new(),
                total: 0,
            }
        });
        *row.lines.entry(line.to_string()).or_insert(0) += record.qty;
        row.total += record.qty;
        *line_totals.entry(line.to_string()).or_insert(0) += record.qty;
    }

    let mut rows: Vec<StoreReportRow> = order
        .into_iter()
        .filter_map(|store| stores.remove(store))
        .collect();
    rows.sort_by(|a, b| b.total.cmp(&a.total));

    StoreReport {
        grand_total: rows.iter().map(|r| r.total).sum(),
        line_names: line_totals.keys().cloned().collect(),
        line_totals,
        rows,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductMonthly {
    pub product_name: String,
    pub monthly_units: [i64; 12],
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedProductData {
    pub store_name: String,
    /// Sorted by product total, largest first.
    pub products: Vec<ProductMonthly>,
    pub total: i64,
}

/// Store -> product -> month pivot. The month filter does not apply here.
pub fn generate_detailed_product_report(
    records: &[SalesRecord],
    filters: &ReportFilters,
) -> Vec<DetailedProductData> {
    let filters = ReportFilters {
        month: None,
        ..filters.clone()
    };

    let mut store_order: Vec<&str> = Vec::new();
    let mut stores: HashMap<&str, (Vec<&str>, HashMap<&str, [i64; 12]>)> = HashMap::new();

    for record in records.iter().filter(|r| filters.matches(r)) {
        let store = record.store.as_str();
        let (product_order, products) = stores.entry(store).or_insert_with(|| {
            store_order.push(store);
            (Vec::new(), HashMap::new())
        });
        let product = record.product.as_str();
        let months = products.entry(product).or_insert_with(|| {
            product_order.push(product);
            [0; 12]
        });
        if let Some(month) = record_month0(record) {
            months[month] += record.qty;
        }
    }

    let mut result: Vec<DetailedProductData> = store_order
        .into_iter()
        .filter_map(|store| stores.remove(store).map(|entry| (store, entry)))
        .map(|(store, (product_order, products))| {
            let mut rows: Vec<ProductMonthly> = product_order
                .into_iter()
                .map(|product| {
                    let monthly_units = products[product];
                    ProductMonthly {
                        product_name: product.to_string(),
                        monthly_units,
                        total: monthly_units.iter().sum(),
                    }
                })
                .collect();
            rows.sort_by(|a, b| b.total.cmp(&a.total));
            DetailedProductData {
                store_name: store.to_string(),
                total: rows.iter().map(|p| p.total).sum(),
                products: rows,
            }
        })
        .collect();
    result.sort_by(|a, b| b.total.cmp(&a.total));
    result
}

/// Distinct years present, newest first.
pub fn available_years(records: &[SalesRecord]) -> Vec<i32> {
    let years: BTreeSet<i32> = records.iter().filter_map(record_year).collect();
    years.into_iter().rev().collect()
}

pub fn unique_stores(records: &[SalesRecord]) -> Vec<String> {
    let stores: BTreeSet<&str> = records.iter().map(|r| r.store.as_str()).collect();
    stores.into_iter().map(str::to_string).collect()
}

/// Distinct non-empty group names, sorted.
pub fn unique_lines(records: &[SalesRecord]) -> Vec<String> {
    let lines: BTreeSet<&str> = records
        .iter()
        .filter_map(|r| r.group.as_deref())
        .filter(|g| !g.is_empty())
        .collect();
    lines.into_iter().map(str::to_string).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodDelta {
    pub name: String,
    pub current: i64,
    pub previous: i64,
    pub change: i64,
    /// Percentage change; absent when `previous` is zero.
    pub change_pct: Option<f64>,
}

impl PeriodDelta {
    fn new(name: impl Into<String>, current: i64, previous: i64) -> Self {
        Self {
            name: name.into(),
            current,
            previous,
            change: current - previous,
            change_pct: change_pct(current, previous),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearComparison {
    pub current_year: i32,
    pub previous_year: i32,
    pub totals: PeriodDelta,
    /// Twelve entries, January first.
    pub by_month: Vec<PeriodDelta>,
    /// Sorted by absolute change, largest first.
    pub by_store: Vec<PeriodDelta>,
}

/// Unit volume of `current` against `previous`, overall, per calendar month
/// and per store.
pub fn compare_years(records: &[SalesRecord], current: i32, previous: i32) -> YearComparison {
    let mut months = [[0i64; 12]; 2];
    let mut current_stores = Tally::new();
    let mut previous_stores = Tally::new();

    for record in records {
        let slot = match record_year(record) {
            Some(y) if y == current => 0,
            Some(y) if y == previous => 1,
            _ => continue,
        };
        if let Some(month) = record_month0(record) {
            months[slot][month] += record.qty;
        }
        if slot == 0 {
            current_stores.add(record.store.as_str(), record.qty);
            previous_stores.add(record.store.as_str(), 0);
        } else {
            previous_stores.add(record.store.as_str(), record.qty);
            current_stores.add(record.store.as_str(), 0);
        }
    }

    let current_total: i64 = records
        .iter()
        .filter(|r| record_year(r) == Some(current))
        .map(|r| r.qty)
        .sum();
    let previous_total: i64 = records
        .iter()
        .filter(|r| record_year(r) == Some(previous))
        .map(|r| r.qty)
        .sum();

    let previous_by_store: HashMap<&str, i64> = previous_stores.into_entries().into_iter().collect();
    let mut by_store: Vec<PeriodDelta> = current_stores
        .into_entries()
        .into_iter()
        .map(|(store, units)| {
            PeriodDelta::new(store, units, previous_by_store.get(store).copied().unwrap_or(0))
        })
        .collect();
    by_store.sort_by(|a, b| b.change.abs().cmp(&a.change.abs()));

    YearComparison {
        current_year: current,
        previous_year: previous,
        totals: PeriodDelta::new(current.to_string(), current_total, previous_total),
        by_month: crate::utils::MONTH_NAMES
            .iter()
            .enumerate()
            .map(|(idx, name)| PeriodDelta::new(*name, months[0][idx], months[1][idx]))
            .collect(),
        by_store,
    }
}

fn change_pct(current: i64, previous: i64) -> Option<f64> {
    if previous == 0 {
        None
    } else {
        Some((current - previous) as f64 / previous.abs() as f64 * 100.0)
    }
}
