use crate::error::{Result, SalesInsightsError};
use crate::ingestion::{ingest_batch, FileFailure, FileOutcome, SourceFile};
use crate::schema::{IngestionConfig, SalesRecord, UploadedFile};
use crate::store::{add_batch, RecordStore};
use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeSeverity {
    Success,
    Warning,
    Error,
    Nothing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportNotice {
    pub severity: NoticeSeverity,
    pub message: String,
}

/// What one upload batch did to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub records_added: usize,
    /// Entries registered for the files that were stored.
    pub files: Vec<UploadedFile>,
    pub failures: Vec<FileFailure>,
    /// Full record set after the reload.
    pub records: Vec<SalesRecord>,
}

impl ImportSummary {
    pub fn notice(&self) -> ImportNotice {
        let failed = self.failures.len();
        let (severity, message) = match (self.records_added, failed) {
            (0, 0) => (NoticeSeverity::Nothing, String::new()),
            (0, failed) => (
                NoticeSeverity::Error,
                format!("Error al procesar {} archivo(s).", failed),
            ),
            (added, 0) => (
                NoticeSeverity::Success,
                format!("{} registros guardados exitosamente.", added),
            ),
            (added, failed) => (
                NoticeSeverity::Warning,
                format!("{} registros guardados. Fallaron: {} archivos.", added, failed),
            ),
        };
        ImportNotice { severity, message }
    }
}

/// Ingests `files`, stores every parsed file under its own id and reloads the
/// record set once. Parse failures are reported in the summary; a store write
/// failure aborts the import. Chunks committed before a failed write stay in
/// the store and are registered under the error's `file_id` with the committed
/// count, so `list_files` and `delete_file` can reach them.
pub async fn import_files<S: RecordStore + ?Sized>(
    store: &S,
    files: &[SourceFile],
    config: &IngestionConfig,
) -> Result<ImportSummary> {
    let outcomes = ingest_batch(files, config).await;

    let mut records_added = 0;
    let mut stored = Vec::new();
    let mut failures = Vec::new();

    for outcome in outcomes {
        match outcome {
            FileOutcome::Parsed(parsed) => {
                if parsed.records.is_empty() {
                    continue;
                }
                let file_id = Uuid::new_v4().to_string();
                if let Err(e) = add_batch(store, &file_id, &parsed.records, config.batch_size).await {
                    if let SalesInsightsError::BatchWrite { offset, .. } = &e {
                        if *offset > 0 {
                            warn!(
                                "{}: partial import of {} records kept as {}",
                                parsed.file_name, offset, file_id
                            );
                            store
                                .register_file(UploadedFile {
                                    id: file_id.clone(),
                                    file_name: parsed.file_name.clone(),
                                    records_count: *offset,
                                    uploaded_at: Utc::now(),
                                })
                                .await?;
                        }
                    }
                    return Err(e);
                }

                let entry = UploadedFile {
                    id: file_id,
                    file_name: parsed.file_name,
                    records_count: parsed.records.len(),
                    uploaded_at: Utc::now(),
                };
                store.register_file(entry.clone()).await?;

                records_added += entry.records_count;
                stored.push(entry);
            }
            FileOutcome::Failed(failure) => failures.push(failure),
        }
    }

    let records = store.get_all().await?;
    info!(
        "Import finished: {} records from {} files, {} failed, {} total",
        records_added,
        stored.len(),
        failures.len(),
        records.len()
    );

    Ok(ImportSummary {
        records_added,
        files: stored,
        failures,
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRecordStore;

    const GOOD: &str = "FECHA,TIENDA,DESCRIPCION,Cantidad\n\
                        2024-01-05,Centro,Canto PVC,4\n\
                        2024-01-06,Norte,Canto PVC,6\n";

    fn source(name: &str, text: &str) -> SourceFile {
        SourceFile::new(name, text.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_import_isolates_failed_files() {
        let store = InMemoryRecordStore::new();
        let files = vec![
            source("bad.csv", "nombre,valor\nx,1\n"),
            source("good.csv", GOOD),
        ];
        let summary = import_files(&store, &files, &IngestionConfig::default())
            .await
            .unwrap();

        assert_eq!(summary.records_added, 2);
        assert_eq!(summary.records.len(), 2);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].file_name, "bad.csv");
        assert!(summary.failures[0].reason.contains("bad.csv"));

        let notice = summary.notice();
        assert_eq!(notice.severity, NoticeSeverity::Warning);
        assert_eq!(notice.message, "2 registros guardados. Fallaron: 1 archivos.");
    }

    #[tokio::test]
    async fn test_each_file_gets_its_own_entry() {
        let store = InMemoryRecordStore::new();
        let files = vec![source("a.csv", GOOD), source("b.csv", GOOD)];
        let summary = import_files(&store, &files, &IngestionConfig::default())
            .await
            .unwrap();

        assert_eq!(summary.files.len(), 2);
        assert_ne!(summary.files[0].id, summary.files[1].id);
        assert_eq!(summary.notice().severity, NoticeSeverity::Success);

        let removed = store.delete_file(&summary.files[0].id).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_only_failures_is_an_error_notice() {
        let store = InMemoryRecordStore::new();
        let files = vec![source("x.csv", "a,b\n1,2\n")];
        let summary = import_files(&store, &files, &IngestionConfig::default())
            .await
            .unwrap();
        assert_eq!(summary.records_added, 0);
        assert_eq!(summary.notice().severity, NoticeSeverity::Error);
        assert_eq!(summary.notice().message, "Error al procesar 1 archivo(s).");
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = InMemoryRecordStore::new();
        store.fail_after_chunks(0).await;
        let files = vec![source("a.csv", GOOD)];
        let err = import_files(&store, &files, &IngestionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SalesInsightsError::BatchWrite { chunk_index: 0, .. }));
        // nothing was committed, so nothing is registered
        assert!(store.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_write_is_registered_and_deletable() {
        let store = InMemoryRecordStore::new();
        store.fail_after_chunks(1).await;
        let config = IngestionConfig {
            batch_size: 1,
            ..IngestionConfig::default()
        };
        let err = import_files(&store, &[source("a.csv", GOOD)], &config)
            .await
            .unwrap_err();

        let file_id = match err {
            SalesInsightsError::BatchWrite { file_id, offset, .. } => {
                assert_eq!(offset, 1);
                file_id
            }
            other => panic!("unexpected error: {}", other),
        };

        let files = store.list_files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, file_id);
        assert_eq!(files[0].records_count, 1);

        assert_eq!(store.delete_file(&file_id).await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.list_files().await.unwrap().is_empty());
    }
}
