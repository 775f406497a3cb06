//! Dashboard aggregates over the active record set.
//!
//! Everything here is a pure function of the records passed in; nothing is
//! cached or persisted. Ranked lists are sorted with a stable sort, so equal
//! values keep the order in which their keys were first seen.

use crate::schema::{MetricsConfig, ProductGroup, SalesRecord};
use crate::utils::{month_key, month_label, parse_sale_date, record_year, short_month_label, Tally};
use chrono::{Datelike, NaiveDate};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub date: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

impl DateRange {
    pub fn unknown() -> Self {
        Self {
            start: "-".to_string(),
            end: "-".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMetrics {
    pub group_name: String,
    pub total_units: i64,
    pub unique_products: usize,
    pub unique_stores: usize,
    /// Share of all units, 0-100.
    pub percentage: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupUnits {
    pub group_name: String,
    pub units: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthMetrics {
    /// `YYYY-MM`
    pub key: String,
    /// Localized label, e.g. "enero de 2024".
    pub month: String,
    pub year: i32,
    pub total_units: i64,
    pub unique_products: usize,
    pub unique_stores: usize,
    pub by_group: Vec<GroupUnits>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthUnits {
    pub month: String,
    pub units: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMetrics {
    pub store_name: String,
    pub total_units: i64,
    pub unique_products: usize,
    pub by_group: Vec<GroupUnits>,
    /// Most recent months, oldest first.
    pub by_month: Vec<MonthUnits>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesMetrics {
    pub total_units: i64,
    pub total_revenue: f64,
    pub unique_stores: usize,
    pub unique_products: usize,
    pub unique_groups: usize,
    pub average_units_per_day: f64,
    pub top_stores: Vec<NamedValue>,
    pub top_products: Vec<NamedValue>,
    pub top_groups: Vec<NamedValue>,
    pub timeline: Vec<TimelinePoint>,
    pub date_range: DateRange,
    pub by_group: Vec<GroupMetrics>,
    pub by_month: Vec<MonthMetrics>,
    pub by_store: Vec<StoreMetrics>,
}

impl SalesMetrics {
    pub fn empty() -> Self {
        Self {
            total_units: 0,
            total_revenue: 0.0,
            unique_stores: 0,
            unique_products: 0,
            unique_groups: 0,
            average_units_per_day: 0.0,
            top_stores: Vec::new(),
            top_products: Vec::new(),
            top_groups: Vec::new(),
            timeline: Vec::new(),
            date_range: DateRange::unknown(),
            by_group: Vec::new(),
            by_month: Vec::new(),
            by_store: Vec::new(),
        }
    }
}

pub struct MetricsAggregator<'a> {
    config: &'a MetricsConfig,
    groups: &'a [ProductGroup],
}

impl<'a> MetricsAggregator<'a> {
    pub fn new(config: &'a MetricsConfig, groups: &'a [ProductGroup]) -> Self {
        Self { config, groups }
    }

    pub fn compute(&self, records: &[SalesRecord]) -> SalesMetrics {
        if records.is_empty() {
            return SalesMetrics::empty();
        }

        let dates: Vec<Option<NaiveDate>> =
            records.iter().map(|r| parse_sale_date(&r.date)).collect();

        let total_units: i64 = records.iter().map(|r| r.qty).sum();
        let total_revenue: f64 = records.iter().filter_map(|r| r.total).sum();
        let unique_stores = records.iter().map(|r| &r.store).collect::<HashSet<_>>().len();
        let unique_products = records
            .iter()
            .map(|r| &r.product)
            .collect::<HashSet<_>>()
            .len();
        let unique_groups = records
            .iter()
            .filter_map(|r| r.group.as_deref())
            .filter(|g| !g.is_empty())
            .collect::<HashSet<_>>()
            .len();

        let (date_range, average_units_per_day) =
            date_span(records, &dates, total_units);

        let mut stores = Tally::new();
        let mut products = Tally::new();
        let mut groups = Tally::new();
        let mut days = Tally::new();
        let mut day_dates: HashMap<&str, NaiveDate> = HashMap::new();

        for (record, date) in records.iter().zip(&dates) {
            stores.add(record.store.as_str(), record.qty);
            products.add(record.product.as_str(), record.qty);
            if let Some(group) = record.group.as_deref().filter(|g| !g.is_empty()) {
                groups.add(group, record.qty);
            }
            if let Some(date) = date {
                days.add(record.date.as_str(), record.qty);
                day_dates.entry(record.date.as_str()).or_insert(*date);
            }
        }

        let undated = dates.iter().filter(|d| d.is_none()).count();
        if undated > 0 {
            debug!("{} records have unparseable dates and are left out of the timeline", undated);
        }

        let mut timeline: Vec<TimelinePoint> = days
            .into_entries()
            .into_iter()
            .map(|(date, value)| TimelinePoint {
                date: date.to_string(),
                value,
            })
            .collect();
        timeline.sort_by_key(|point| day_dates[point.date.as_str()]);

        SalesMetrics {
            total_units,
            total_revenue,
            unique_stores,
            unique_products,
            unique_groups,
            average_units_per_day,
            top_stores: self.top(stores),
            top_products: self.top(products),
            top_groups: self.top(groups),
            timeline,
            date_range,
            by_group: self.group_metrics(records, total_units),
            by_month: self.month_metrics(records, &dates),
            by_store: self.store_metrics(records, &dates),
        }
    }

    fn top(&self, tally: Tally<&str>) -> Vec<NamedValue> {
        tally
            .into_ranked()
            .into_iter()
            .take(self.config.top_n)
            .map(|(name, value)| NamedValue {
                name: name.to_string(),
                value,
            })
            .collect()
    }

    fn group_metrics(&self, records: &[SalesRecord], total_units: i64) -> Vec<GroupMetrics> {
        let colors: HashMap<&str, &str> = self
            .groups
            .iter()
            .map(|g| (g.group_name.as_str(), g.color.as_str()))
            .collect();

        let mut order: Vec<&str> = Vec::new();
        let mut buckets: HashMap<&str, (i64, HashSet<&str>, HashSet<&str>)> = HashMap::new();
        for record in records {
            let group = record.group_or(&self.config.unclassified_label);
            let bucket = buckets.entry(group).or_insert_with(|| {
                order.push(group);
                (0, HashSet::new(), HashSet::new())
            });
            bucket.0 += record.qty;
            bucket.1.insert(record.product.as_str());
            bucket.2.insert(record.store.as_str());
        }

        let mut result: Vec<GroupMetrics> = order
            .into_iter()
            .map(|group| {
                let (units, products, stores) = &buckets[group];
                GroupMetrics {
                    group_name: group.to_string(),
                    total_units: *units,
                    unique_products: products.len(),
                    unique_stores: stores.len(),
                    percentage: percentage(*units, total_units),
                    color: colors
                        .get(group)
                        .copied()
                        .unwrap_or(&self.config.default_group_color)
                        .to_string(),
                }
            })
            .collect();
        result.sort_by(|a, b| b.total_units.cmp(&a.total_units));
        result
    }

    fn month_metrics(
        &self,
        records: &[SalesRecord],
        dates: &[Option<NaiveDate>],
    ) -> Vec<MonthMetrics> {
        struct Bucket<'r> {
            units: i64,
            products: HashSet<&'r str>,
            stores: HashSet<&'r str>,
            groups: Tally<&'r str>,
        }

        let mut months: BTreeMap<(i32, u32), Bucket> = BTreeMap::new();
        for (record, date) in records.iter().zip(dates) {
            let Some(date) = date else { continue };
            let bucket = months
                .entry((date.year(), date.month()))
                .or_insert_with(|| Bucket {
                    units: 0,
                    products: HashSet::new(),
                    stores: HashSet::new(),
                    groups: Tally::new(),
                });
            bucket.units += record.qty;
            bucket.products.insert(record.product.as_str());
            bucket.stores.insert(record.store.as_str());
            bucket
                .groups
                .add(record.group_or(&self.config.unclassified_label), record.qty);
        }

        months
            .into_iter()
            .map(|((year, month), bucket)| MonthMetrics {
                key: month_key(year, month),
                month: month_label(year, month),
                year,
                total_units: bucket.units,
                unique_products: bucket.products.len(),
                unique_stores: bucket.stores.len(),
                by_group: group_units(bucket.groups, usize::MAX),
            })
            .collect()
    }

    fn store_metrics(
        &self,
        records: &[SalesRecord],
        dates: &[Option<NaiveDate>],
    ) -> Vec<StoreMetrics> {
        struct Bucket<'r> {
            units: i64,
            products: HashSet<&'r str>,
            groups: Tally<&'r str>,
            months: BTreeMap<(i32, u32), i64>,
        }

        let mut order: Vec<&str> = Vec::new();
        let mut stores: HashMap<&str, Bucket> = HashMap::new();
        for (record, date) in records.iter().zip(dates) {
            let store = record.store.as_str();
            let bucket = stores.entry(store).or_insert_with(|| {
                order.push(store);
                Bucket {
                    units: 0,
                    products: HashSet::new(),
                    groups: Tally::new(),
                    months: BTreeMap::new(),
                }
            });
            bucket.units += record.qty;
            bucket.products.insert(record.product.as_str());
            bucket
                .groups
                .add(record.group_or(&self.config.unclassified_label), record.qty);
            if let Some(date) = date {
                *bucket.months.entry((date.year(), date.month())).or_insert(0) += record.qty;
            }
        }

        let mut result: Vec<StoreMetrics> = order
            .into_iter()
            .filter_map(|store| stores.remove(store).map(|bucket| (store, bucket)))
            .map(|(store, bucket)| {
                let skip = bucket
                    .months
                    .len()
                    .saturating_sub(self.config.store_recent_months);
                StoreMetrics {
                    store_name: store.to_string(),
                    total_units: bucket.units,
                    unique_products: bucket.products.len(),
                    by_group: group_units(bucket.groups, self.config.store_top_groups),
                    by_month: bucket
                        .months
                        .into_iter()
                        .skip(skip)
                        .map(|((year, month), units)| MonthUnits {
                            month: short_month_label(year, month),
                            units,
                        })
                        .collect(),
                }
            })
            .collect();
        result.sort_by(|a, b| b.total_units.cmp(&a.total_units));
        result
    }
}

/// Computes metrics with the default configuration.
pub fn calculate_metrics(records: &[SalesRecord], groups: &[ProductGroup]) -> SalesMetrics {
    let config = MetricsConfig::default();
    MetricsAggregator::new(&config, groups).compute(records)
}

/// Records whose year (captured or parsed) equals `year`; `None` keeps all.
pub fn filter_by_year(records: &[SalesRecord], year: Option<i32>) -> Vec<SalesRecord> {
    match year {
        None => records.to_vec(),
        Some(year) => records
            .iter()
            .filter(|r| record_year(r) == Some(year))
            .cloned()
            .collect(),
    }
}

fn date_span(
    records: &[SalesRecord],
    dates: &[Option<NaiveDate>],
    total_units: i64,
) -> (DateRange, f64) {
    let mut first: Option<(NaiveDate, &str)> = None;
    let mut last: Option<(NaiveDate, &str)> = None;
    for (record, date) in records.iter().zip(dates) {
        let Some(date) = *date else { continue };
        if first.map_or(true, |(d, _)| date < d) {
            first = Some((date, record.date.as_str()));
        }
        if last.map_or(true, |(d, _)| date >= d) {
            last = Some((date, record.date.as_str()));
        }
    }

    match (first, last) {
        (Some((start, start_text)), Some((end, end_text))) => {
            let days = (end - start).num_days().max(1);
            (
                DateRange {
                    start: start_text.to_string(),
                    end: end_text.to_string(),
                },
                total_units as f64 / days as f64,
            )
        }
        _ => (DateRange::unknown(), total_units as f64),
    }
}

fn group_units(tally: Tally<&str>, limit: usize) -> Vec<GroupUnits> {
    tally
        .into_ranked()
        .into_iter()
        .take(limit)
        .map(|(group_name, units)| GroupUnits {
            group_name: group_name.to_string(),
            units,
        })
        .collect()
}

fn percentage(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
