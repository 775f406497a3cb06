//! Natural-language questions over the record set.
//!
//! The assistant narrows the records with filters read from the question
//! itself, summarizes what is left and asks the completion service to phrase
//! the answer. Chart data is computed locally; the model only writes text.

use crate::error::Result;
use crate::llm::prompts::{
    build_chat_prompt, strip_code_fences, CHAT_FALLBACK_HTML, CHAT_NO_DATA_HTML,
    CHAT_SYSTEM_INSTRUCTION,
};
use crate::llm::{CompletionRequest, TextCompletionService};
use crate::schema::SalesRecord;
use crate::utils::{format_cop, parse_sale_date};
use chrono::{Datelike, Days, Local, NaiveDate};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

const STORE_KEYWORDS: [&str; 4] = ["tienda", "sede", "sucursal", "local"];
const PRODUCT_KEYWORDS: [&str; 4] = ["producto", "canto", "rollo", "vinilo"];
const HISTORY_TURNS: usize = 4;
const CHART_ENTRIES: usize = 10;
const CHAT_TEMPERATURE: f32 = 0.5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionFilters {
    pub store: Option<String>,
    pub product: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl QuestionFilters {
    /// Store and product match case-insensitively as substrings. With a date
    /// bound set, records whose date does not parse are left out.
    pub fn matches(&self, record: &SalesRecord) -> bool {
        if let Some(store) = &self.store {
            if !contains_ignore_case(&record.store, store) {
                return false;
            }
        }
        if let Some(product) = &self.product {
            if !contains_ignore_case(&record.product, product) {
                return false;
            }
        }
        if self.start_date.is_none() && self.end_date.is_none() {
            return true;
        }
        match parse_sale_date(&record.date) {
            Some(date) => {
                self.start_date.map_or(true, |start| date >= start)
                    && self.end_date.map_or(true, |end| date <= end)
            }
            None => false,
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next.pred_opt()?))
}

fn relative_period(lower: &str, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    if lower.contains("este mes") {
        return month_bounds(today.year(), today.month());
    }
    if lower.contains("mes pasado") {
        let (year, month) = if today.month() == 1 {
            (today.year() - 1, 12)
        } else {
            (today.year(), today.month() - 1)
        };
        return month_bounds(year, month);
    }
    if lower.contains("última semana") {
        return Some((today.checked_sub_days(Days::new(7))?, today));
    }
    if lower.contains("últimos 30 días") {
        return Some((today.checked_sub_days(Days::new(30))?, today));
    }
    None
}

/// Reads store, product and relative-period filters out of a question. A
/// store or product keyword captures every word after it, minus question marks.
pub fn extract_question_filters(question: &str, today: NaiveDate) -> QuestionFilters {
    let lower = question.to_lowercase();
    let mut filters = QuestionFilters::default();

    if let Some((start, end)) = relative_period(&lower, today) {
        filters.start_date = Some(start);
        filters.end_date = Some(end);
    }

    let words: Vec<&str> = question.split_whitespace().collect();
    let trailing = |from: usize| -> Option<String> {
        let text: String = words[from..]
            .join(" ")
            .chars()
            .filter(|c| *c != '¿' && *c != '?')
            .collect();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    };

    for (i, word) in words.iter().enumerate() {
        let word = word.to_lowercase();
        let has_next = i + 1 < words.len();

        if has_next && STORE_KEYWORDS.iter().any(|k| word.contains(k)) {
            filters.store = trailing(i + 1);
            break;
        }
        if has_next && PRODUCT_KEYWORDS.iter().any(|k| word.contains(k)) {
            filters.product = trailing(i + 1);
            break;
        }
    }

    filters
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Pie => "pie",
        }
    }
}

/// Chart suggested by the wording of the question, if any.
pub fn determine_chart_kind(question: &str, data_len: usize) -> Option<ChartKind> {
    let lower = question.to_lowercase();
    let any = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if any(&["tendencia", "tiempo", "evolución", "histórico"]) {
        Some(ChartKind::Line)
    } else if any(&["comparar", "top", "mayor", "mejor"]) {
        Some(ChartKind::Bar)
    } else if any(&["distribución", "porcentaje", "participación"]) {
        Some(ChartKind::Pie)
    } else if data_len > 5 && any(&["tienda", "producto"]) {
        Some(ChartKind::Bar)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedAmount {
    pub name: String,
    pub value: f64,
    pub units: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatedAmount {
    pub date: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChartData {
    Ranked(Vec<RankedAmount>),
    Series(Vec<DatedAmount>),
}

fn revenue_by<'a>(
    records: &[&'a SalesRecord],
    key: impl Fn(&'a SalesRecord) -> &'a str,
) -> Vec<RankedAmount> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut rows: Vec<RankedAmount> = Vec::new();
    for &record in records {
        let name = key(record);
        let slot = *index.entry(name).or_insert_with(|| {
            rows.push(RankedAmount {
                name: name.to_string(),
                value: 0.0,
                units: 0,
            });
            rows.len() - 1
        });
        rows[slot].value += record.total.unwrap_or(0.0);
        rows[slot].units += record.qty;
    }
    rows.sort_by(|a, b| b.value.total_cmp(&a.value));
    rows
}

fn revenue_by_date(records: &[&SalesRecord]) -> Vec<DatedAmount> {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for record in records {
        *totals.entry(record.date.as_str()).or_insert(0.0) += record.total.unwrap_or(0.0);
    }
    let mut series: Vec<DatedAmount> = totals
        .into_iter()
        .map(|(date, value)| DatedAmount {
            date: date.to_string(),
            value,
        })
        .collect();
    series.sort_by(|a, b| {
        (parse_sale_date(&a.date), &a.date).cmp(&(parse_sale_date(&b.date), &b.date))
    });
    series
}

fn chart_data(
    question: &str,
    kind: ChartKind,
    filters: &QuestionFilters,
    records: &[&SalesRecord],
) -> ChartData {
    let lower = question.to_lowercase();
    let top = |rows: Vec<RankedAmount>| -> Vec<RankedAmount> {
        rows.into_iter().take(CHART_ENTRIES).collect()
    };

    if lower.contains("tienda") && filters.store.is_none() {
        ChartData::Ranked(top(revenue_by(records, |r| r.store.as_str())))
    } else if lower.contains("producto") && filters.product.is_none() {
        ChartData::Ranked(top(revenue_by(records, |r| r.product.as_str())))
    } else if kind == ChartKind::Line {
        ChartData::Series(revenue_by_date(records))
    } else {
        ChartData::Ranked(top(revenue_by(records, |r| r.store.as_str())))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Figures handed to the model for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub total_records: usize,
    pub total_revenue: String,
    pub total_units: i64,
    pub unique_stores: usize,
    pub unique_products: usize,
    pub date_range: SummaryRange,
}

impl ChatSummary {
    pub fn from_records(records: &[&SalesRecord]) -> Self {
        let revenue: f64 = records.iter().filter_map(|r| r.total).sum();
        Self {
            total_records: records.len(),
            total_revenue: format_cop(revenue),
            total_units: records.iter().map(|r| r.qty).sum(),
            unique_stores: records.iter().map(|r| r.store.as_str()).collect::<HashSet<_>>().len(),
            unique_products: records
                .iter()
                .map(|r| r.product.as_str())
                .collect::<HashSet<_>>()
                .len(),
            date_range: SummaryRange {
                start: records.first().map(|r| r.date.clone()),
                end: records.last().map(|r| r.date.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAnswer {
    /// HTML fragment.
    pub content: String,
    pub chart_data: Option<ChartData>,
    pub chart_kind: Option<ChartKind>,
    pub filters: QuestionFilters,
}

pub struct ChatAssistant<'a, S: TextCompletionService + ?Sized> {
    service: &'a S,
    today: Option<NaiveDate>,
}

impl<'a, S: TextCompletionService + ?Sized> ChatAssistant<'a, S> {
    pub fn new(service: &'a S) -> Self {
        Self {
            service,
            today: None,
        }
    }

    /// Pins the reference date for relative periods; defaults to the local date.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// `records` should be in date order, as `RecordStore::get_all` returns them.
    pub async fn ask(
        &self,
        question: &str,
        history: &[ChatTurn],
        records: &[SalesRecord],
    ) -> Result<ChatAnswer> {
        let today = self.today.unwrap_or_else(|| Local::now().date_naive());
        let filters = extract_question_filters(question, today);
        let filtered: Vec<&SalesRecord> = records.iter().filter(|r| filters.matches(r)).collect();
        debug!("Question filters {:?} matched {} records", filters, filtered.len());

        if filtered.is_empty() {
            return Ok(ChatAnswer {
                content: CHAT_NO_DATA_HTML.to_string(),
                chart_data: None,
                chart_kind: None,
                filters,
            });
        }

        let summary = ChatSummary::from_records(&filtered);
        let chart_kind = determine_chart_kind(question, filtered.len());
        let chart = chart_kind.map(|kind| chart_data(question, kind, &filters, &filtered));

        let start = history.len().saturating_sub(HISTORY_TURNS);
        let conversation = history[start..]
            .iter()
            .map(|turn| format!("{}: {}", turn.role, turn.content))
            .collect::<Vec<_>>()
            .join("\n");

        let summary_json = serde_json::to_string_pretty(&summary)?;
        let prompt = build_chat_prompt(
            question,
            &summary_json,
            (!conversation.is_empty()).then_some(conversation.as_str()),
            chart_kind.map(|k| k.as_str()),
        );
        let request = CompletionRequest::new(prompt)
            .with_system_instruction(CHAT_SYSTEM_INSTRUCTION)
            .with_temperature(CHAT_TEMPERATURE);

        info!("Answering question over {} records", filtered.len());
        let text = self.service.complete(request).await?;
        let content = strip_code_fences(&text);

        Ok(ChatAnswer {
            content: if content.is_empty() {
                CHAT_FALLBACK_HTML.to_string()
            } else {
                content
            },
            chart_data: chart,
            chart_kind,
            filters,
        })
    }
}
