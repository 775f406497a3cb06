use crate::reports::ReportFilters;
use crate::schema::SalesRecord;
use crate::utils::{record_month0, record_year, MONTH_NAMES};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRankingData {
    pub store_name: String,
    /// Units per calendar month, January first.
    pub monthly_units: [i64; 12],
    pub total_year: i64,
    /// Rank per calendar month, 1 = most units.
    pub rankings: [u32; 12],
    pub accumulated_ranking: u32,
    pub trend: Trend,
}

impl MonthlyRankingData {
    /// Month name / units pairs for table rendering.
    pub fn named_months(&self) -> impl Iterator<Item = (&'static str, i64)> + '_ {
        MONTH_NAMES.iter().copied().zip(self.monthly_units.iter().copied())
    }
}

/// Builds one ranking row per store from records matching the year and line
/// filters. Months from different years share a bucket unless a year is set.
pub fn generate_monthly_ranking(
    records: &[SalesRecord],
    filters: &ReportFilters,
) -> Vec<MonthlyRankingData> {
    let filtered: Vec<&SalesRecord> = records
        .iter()
        .filter(|r| filters.year.map_or(true, |y| record_year(r) == Some(y)))
        .filter(|r| {
            filters
                .line
                .as_deref()
                .map_or(true, |line| r.group.as_deref() == Some(line))
        })
        .collect();

    if filters.year.is_none() {
        let years: BTreeSet<i32> = filtered.iter().filter_map(|r| record_year(r)).collect();
        if years.len() > 1 {
            warn!(
                "Monthly ranking without a year filter merges {} years into the same month buckets",
                years.len()
            );
        }
    }

    let mut order: Vec<&str> = Vec::new();
    let mut monthly: HashMap<&str, [i64; 12]> = HashMap::new();
    for record in filtered {
        let store = record.store.as_str();
        let slots = monthly.entry(store).or_insert_with(|| {
            order.push(store);
            [0; 12]
        });
        if let Some(month) = record_month0(record) {
            slots[month] += record.qty;
        }
    }

    let mut rows: Vec<MonthlyRankingData> = order
        .into_iter()
        .map(|store| {
            let monthly_units = monthly[store];
            MonthlyRankingData {
                store_name: store.to_string(),
                monthly_units,
                total_year: monthly_units.iter().sum(),
                rankings: [0; 12],
                accumulated_ranking: 0,
                trend: Trend::Stable,
            }
        })
        .collect();

    assign_rankings(&mut rows);

    rows.sort_by(|a, b| b.total_year.cmp(&a.total_year));
    rows
}

/// Ranks stores per month (ties keep enumeration order), then derives the
/// accumulated rank and the trend for each store.
pub fn assign_rankings(rows: &mut [MonthlyRankingData]) {
    for month in 0..12 {
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by(|&a, &b| rows[b].monthly_units[month].cmp(&rows[a].monthly_units[month]));
        for (rank, idx) in order.into_iter().enumerate() {
            rows[idx].rankings[month] = rank as u32 + 1;
        }
    }

    for row in rows.iter_mut() {
        let sum: u32 = row.rankings.iter().sum();
        row.accumulated_ranking = (sum as f64 / 12.0).round() as u32;
        row.trend = classify_trend(&row.rankings);
    }
}

/// Compares the mean rank of the first six months against the last six. The
/// second half must be more than one rank better (lower) for `Up`, or more
/// than one rank worse for `Down`.
pub fn classify_trend(rankings: &[u32; 12]) -> Trend {
    let (first, second) = rankings.split_at(6);
    // mean(second) < mean(first) - 1  <=>  sum(second) < sum(first) - 6
    let first: i64 = first.iter().map(|&r| r as i64).sum();
    let second: i64 = second.iter().map(|&r| r as i64).sum();

    if second < first - 6 {
        Trend::Up
    } else if second > first + 6 {
        Trend::Down
    } else {
        Trend::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sale(store: &str, date: &str, qty: i64, group: Option<&str>) -> SalesRecord {
        SalesRecord {
            store: store.to_string(),
            product: "P".to_string(),
            date: date.to_string(),
            year: crate::utils::classify_year(date),
            ean: None,
            group: group.map(str::to_string),
            qty,
            price: None,
            total: None,
        }
    }

    #[test]
    fn test_ranks_form_a_permutation_each_month() {
        let records = vec![
            sale("A", "2024-01-05", 10, None),
            sale("B", "2024-01-07", 10, None),
            sale("C", "2024-01-09", 30, None),
            sale("B", "2024-06-01", 5, None),
            sale("D", "2024-12-01", 1, None),
        ];
        let rows = generate_monthly_ranking(&records, &ReportFilters::default());
        assert_eq!(rows.len(), 4);

        for month in 0..12 {
            let mut ranks: Vec<u32> = rows.iter().map(|r| r.rankings[month]).collect();
            ranks.sort();
            assert_eq!(ranks, vec![1, 2, 3, 4]);
        }

        let by_name = |name: &str| rows.iter().find(|r| r.store_name == name).unwrap();
        // January: C first, then the A/B tie in enumeration order
        assert_eq!(by_name("C").rankings[0], 1);
        assert_eq!(by_name("A").rankings[0], 2);
        assert_eq!(by_name("B").rankings[0], 3);
        assert_eq!(by_name("B").rankings[5], 1);
    }

    #[test]
    fn test_sorted_by_total_year() {
        let records = vec![
            sale("A", "2024-01-05", 1, None),
            sale("B", "2024-02-05", 7, None),
            sale("C", "2024-03-05", 3, None),
        ];
        let rows = generate_monthly_ranking(&records, &ReportFilters::default());
        let names: Vec<&str> = rows.iter().map(|r| r.store_name.as_str()).collect();
        assert_eq!(names, vec!["B", "C", "A"]);
        assert_eq!(rows[0].total_year, 7);
        assert_eq!(rows[0].monthly_units[1], 7);
    }

    #[test]
    fn test_trend_thresholds() {
        assert_eq!(classify_trend(&[3, 3, 3, 3, 3, 3, 1, 1, 1, 1, 1, 1]), Trend::Up);
        assert_eq!(classify_trend(&[1, 1, 1, 1, 1, 1, 3, 3, 3, 3, 3, 3]), Trend::Down);
        // exactly one rank better is still stable
        assert_eq!(classify_trend(&[3, 3, 3, 3, 3, 3, 2, 2, 2, 2, 2, 2]), Trend::Stable);
        assert_eq!(classify_trend(&[2, 2, 2, 2, 2, 2, 3, 3, 3, 3, 3, 3]), Trend::Stable);
        // 13/6 vs 6/6: a gap of 7/6 ranks
        assert_eq!(classify_trend(&[3, 2, 2, 2, 2, 2, 1, 1, 1, 1, 1, 1]), Trend::Up);
    }

    #[test]
    fn test_accumulated_ranking_rounds_mean() {
        let mut rows = vec![
            MonthlyRankingData {
                store_name: "A".into(),
                monthly_units: [5, 5, 5, 5, 5, 5, 0, 0, 0, 0, 0, 0],
                total_year: 30,
                rankings: [0; 12],
                accumulated_ranking: 0,
                trend: Trend::Stable,
            },
            MonthlyRankingData {
                store_name: "B".into(),
                monthly_units: [0, 0, 0, 0, 0, 0, 5, 5, 5, 5, 5, 5],
                total_year: 30,
                rankings: [0; 12],
                accumulated_ranking: 0,
                trend: Trend::Stable,
            },
        ];
        assign_rankings(&mut rows);

        // mean 1.5 rounds up
        assert_eq!(rows[0].accumulated_ranking, 2);
        assert_eq!(rows[0].trend, Trend::Stable);
        assert_eq!(rows[1].rankings, [2, 2, 2, 2, 2, 2, 1, 1, 1, 1, 1, 1]);
        assert_eq!(rows[1].accumulated_ranking, 2);
    }

    #[test]
    fn test_trend_detects_climbing_store() {
        let mut records = Vec::new();
        for month in 1..=12 {
            let date = format!("2024-{:02}-15", month);
            let (a, b, c) = if month <= 6 { (1, 5, 9) } else { (9, 5, 1) };
            records.push(sale("A", &date, a, None));
            records.push(sale("B", &date, b, None));
            records.push(sale("C", &date, c, None));
        }
        let rows = generate_monthly_ranking(&records, &ReportFilters::default());
        let trend = |name: &str| rows.iter().find(|r| r.store_name == name).unwrap().trend;
        assert_eq!(trend("A"), Trend::Up);
        assert_eq!(trend("B"), Trend::Stable);
        assert_eq!(trend("C"), Trend::Down);
    }

    #[test]
    fn test_year_and_line_filters() {
        let records = vec![
            sale("A", "2023-01-05", 100, Some("Cantos")),
            sale("A", "2024-01-05", 2, Some("Cantos")),
            sale("A", "2024-01-06", 40, Some("Rollos")),
            sale("B", "2024-02-05", 1, Some("Rollos")),
        ];
        let filters = ReportFilters {
            year: Some(2024),
            line: Some("Cantos".into()),
            ..ReportFilters::default()
        };
        let rows = generate_monthly_ranking(&records, &filters);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].monthly_units[0], 2);

        // no year filter merges both Januaries
        let merged = generate_monthly_ranking(
            &records,
            &ReportFilters {
                line: Some("Cantos".into()),
                ..ReportFilters::default()
            },
        );
        assert_eq!(merged[0].monthly_units[0], 102);
    }
}
