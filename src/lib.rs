//! # Sales Insights
//!
//! A library for turning heterogeneous point-of-sale exports (CSV and
//! spreadsheet files with inconsistent headers) into canonical sales records,
//! and for computing the dashboard aggregates and reports built on them.
//!
//! ## Core Concepts
//!
//! - **Ingestion**: Locates the header row, maps column aliases onto canonical
//!   fields and normalizes quantities, prices and dates. Bad rows are counted
//!   and skipped; a bad file fails alone without stopping its batch.
//! - **Record Store**: An async capability holding the canonical records,
//!   written in fixed-size chunks and tagged by upload.
//! - **Metrics**: Totals, top-N rankings, timelines and per group, month and
//!   store breakdowns for the dashboard.
//! - **Reports**: Store x line pivots, store x product x month detail, monthly
//!   store rankings with trends, and year-over-year comparison.
//! - **LLM**: An executive report and a question-answering assistant over the
//!   records, written against a narrow text-completion trait.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sales_insights::*;
//!
//! let store = InMemoryRecordStore::new();
//! let files = vec![SourceFile::new("ventas.csv", std::fs::read("ventas.csv")?)];
//!
//! let summary = import_files(&store, &files, &IngestionConfig::default()).await?;
//! println!("{}", summary.notice().message);
//!
//! let groups = load_product_groups(&store).await;
//! let metrics = calculate_metrics(&summary.records, &groups);
//! let ranking = generate_monthly_ranking(
//!     &summary.records,
//!     &ReportFilters { year: Some(2024), ..Default::default() },
//! );
//! ```

pub mod columns;
pub mod error;
pub mod ingestion;
pub mod llm;
pub mod metrics;
pub mod normalizer;
pub mod pipeline;
pub mod ranking;
pub mod reports;
pub mod schema;
pub mod store;
pub mod utils;

pub use columns::{find_column_value, CanonicalField, ColumnResolver};
pub use error::{Result, SalesInsightsError};
pub use ingestion::*;
pub use llm::{
    ChatAnswer, ChatAssistant, ChatTurn, CompletionRequest, ReportGenerator, ReportPayload,
    TextCompletionService,
};
pub use metrics::*;
pub use normalizer::{parse_price, parse_quantity, NormalizedBatch, RecordNormalizer};
pub use pipeline::{import_files, ImportNotice, ImportSummary, NoticeSeverity};
pub use ranking::{assign_rankings, classify_trend, generate_monthly_ranking, MonthlyRankingData, Trend};
pub use reports::*;
pub use schema::*;
pub use store::*;
pub use utils::{format_cop, month_label, parse_sale_date, record_year, MONTH_NAMES};
