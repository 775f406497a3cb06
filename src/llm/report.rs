use crate::error::Result;
use crate::llm::prompts::{
    build_report_prompt, strip_code_fences, REPORT_FALLBACK_HTML, REPORT_SYSTEM_INSTRUCTION,
};
use crate::llm::{CompletionRequest, TextCompletionService};
use crate::metrics::{DateRange, NamedValue, SalesMetrics, TimelinePoint};
use log::info;
use serde::{Deserialize, Serialize};

const TOP_ENTRIES: usize = 5;
const MAX_TIMELINE_POINTS: usize = 20;
const REPORT_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupShare {
    pub group_name: String,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimelineSummary {
    Points(Vec<TimelinePoint>),
    Note(String),
}

/// Compact view of the dashboard metrics sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPayload {
    pub period: DateRange,
    pub total_revenue: f64,
    pub total_units: i64,
    pub unique_stores: usize,
    pub unique_products: usize,
    pub average_units_per_day: f64,
    pub top_5_stores_by_units: Vec<NamedValue>,
    pub top_5_products_by_units: Vec<NamedValue>,
    pub top_5_groups_by_units: Vec<NamedValue>,
    pub group_shares: Vec<GroupShare>,
    pub daily_trend_summary: TimelineSummary,
}

impl ReportPayload {
    pub fn from_metrics(metrics: &SalesMetrics) -> Self {
        let top = |values: &[NamedValue]| -> Vec<NamedValue> {
            values.iter().take(TOP_ENTRIES).cloned().collect()
        };

        let daily_trend_summary = if metrics.timeline.len() > MAX_TIMELINE_POINTS {
            TimelineSummary::Note("Data available but truncated for brevity".to_string())
        } else {
            TimelineSummary::Points(metrics.timeline.clone())
        };

        Self {
            period: metrics.date_range.clone(),
            total_revenue: metrics.total_revenue,
            total_units: metrics.total_units,
            unique_stores: metrics.unique_stores,
            unique_products: metrics.unique_products,
            average_units_per_day: metrics.average_units_per_day,
            top_5_stores_by_units: top(&metrics.top_stores),
            top_5_products_by_units: top(&metrics.top_products),
            top_5_groups_by_units: top(&metrics.top_groups),
            group_shares: metrics
                .by_group
                .iter()
                .map(|g| GroupShare {
                    group_name: g.group_name.clone(),
                    percentage: g.percentage,
                })
                .collect(),
            daily_trend_summary,
        }
    }
}

/// Turns dashboard metrics into an HTML executive report.
pub struct ReportGenerator<'a, S: TextCompletionService + ?Sized> {
    service: &'a S,
}

impl<'a, S: TextCompletionService + ?Sized> ReportGenerator<'a, S> {
    pub fn new(service: &'a S) -> Self {
        Self { service }
    }

    pub fn build_request(&self, metrics: &SalesMetrics) -> Result<CompletionRequest> {
        let payload = ReportPayload::from_metrics(metrics);
        let payload_json = serde_json::to_string(&payload)?;
        Ok(CompletionRequest::new(build_report_prompt(&payload_json))
            .with_system_instruction(REPORT_SYSTEM_INSTRUCTION)
            .with_temperature(REPORT_TEMPERATURE))
    }

    pub async fn generate(&self, metrics: &SalesMetrics) -> Result<String> {
        let request = self.build_request(metrics)?;
        info!(
            "Requesting executive report for {} to {}",
            metrics.date_range.start, metrics.date_range.end
        );
        let text = self.service.complete(request).await?;

        let html = strip_code_fences(&text);
        if html.is_empty() {
            Ok(REPORT_FALLBACK_HTML.to_string())
        } else {
            Ok(html)
        }
    }
}
