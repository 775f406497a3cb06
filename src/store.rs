use crate::error::{Result, SalesInsightsError};
use crate::schema::{ProductGroup, SalesRecord, UploadedFile};
use crate::utils::parse_sale_date;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Persistence for canonical records. Implementations wrap whatever
/// datastore backs the dashboard.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every stored record, ordered by date ascending.
    async fn get_all(&self) -> Result<Vec<SalesRecord>>;

    /// Writes one chunk of records belonging to `file_id`.
    async fn insert_chunk(&self, file_id: &str, records: &[SalesRecord]) -> Result<()>;

    async fn register_file(&self, file: UploadedFile) -> Result<()>;

    async fn list_files(&self) -> Result<Vec<UploadedFile>>;

    /// Removes a file entry and all of its records; returns how many records went.
    async fn delete_file(&self, file_id: &str) -> Result<usize>;

    async fn clear(&self) -> Result<()>;

    async fn count(&self) -> Result<usize>;

    async fn get_product_groups(&self) -> Result<Vec<ProductGroup>>;
}

/// Writes `records` in chunks of `batch_size`. The first failing chunk stops
/// the write; chunks committed before it stay in the store.
pub async fn add_batch<S: RecordStore + ?Sized>(
    store: &S,
    file_id: &str,
    records: &[SalesRecord],
    batch_size: usize,
) -> Result<()> {
    let batch_size = batch_size.max(1);
    let chunks = records.len().div_ceil(batch_size);

    for (chunk_index, chunk) in records.chunks(batch_size).enumerate() {
        let offset = chunk_index * batch_size;
        store
            .insert_chunk(file_id, chunk)
            .await
            .map_err(|e| SalesInsightsError::BatchWrite {
                file_id: file_id.to_string(),
                chunk_index,
                offset,
                reason: e.to_string(),
            })?;
        debug!(
            "Stored chunk {}/{} for {} ({} records)",
            chunk_index + 1,
            chunks,
            file_id,
            chunk.len()
        );
    }

    Ok(())
}

/// Product group metadata is decorative; a failing lookup yields no groups.
pub async fn load_product_groups<S: RecordStore + ?Sized>(store: &S) -> Vec<ProductGroup> {
    match store.get_product_groups().await {
        Ok(groups) => groups,
        Err(e) => {
            warn!("Product groups unavailable, using defaults: {}", e);
            Vec::new()
        }
    }
}

#[derive(Debug, Clone)]
struct StoredRecord {
    file_id: String,
    record: SalesRecord,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<StoredRecord>,
    files: Vec<UploadedFile>,
    groups: Vec<ProductGroup>,
    fail_after_chunks: Option<usize>,
}

/// Process-local store, suitable for tests and for single-user sessions.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    state: RwLock<MemoryState>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product_groups(groups: Vec<ProductGroup>) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                groups,
                ..MemoryState::default()
            }),
        }
    }

    /// Makes every chunk insert after the next `chunks` successful ones fail.
    pub async fn fail_after_chunks(&self, chunks: usize) {
        self.state.write().await.fail_after_chunks = Some(chunks);
    }

    pub async fn records_for_file(&self, file_id: &str) -> Vec<SalesRecord> {
        self.state
            .read()
            .await
            .records
            .iter()
            .filter(|stored| stored.file_id == file_id)
            .map(|stored| stored.record.clone())
            .collect()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_all(&self) -> Result<Vec<SalesRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<SalesRecord> =
            state.records.iter().map(|stored| stored.record.clone()).collect();
        // undated records sort last
        records.sort_by_cached_key(|r| match parse_sale_date(&r.date) {
            Some(date) => (false, Some(date)),
            None => (true, None),
        });
        Ok(records)
    }

    async fn insert_chunk(&self, file_id: &str, records: &[SalesRecord]) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(remaining) = state.fail_after_chunks {
            if remaining == 0 {
                return Err(SalesInsightsError::Store("simulated write failure".to_string()));
            }
            state.fail_after_chunks = Some(remaining - 1);
        }
        state.records.extend(records.iter().map(|record| StoredRecord {
            file_id: file_id.to_string(),
            record: record.clone(),
        }));
        Ok(())
    }

    async fn register_file(&self, file: UploadedFile) -> Result<()> {
        self.state.write().await.files.push(file);
        Ok(())
    }

    async fn list_files(&self) -> Result<Vec<UploadedFile>> {
        let mut files = self.state.read().await.files.clone();
        files.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(files)
    }

    async fn delete_file(&self, file_id: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let before = state.records.len();
        state.records.retain(|stored| stored.file_id != file_id);
        state.files.retain(|file| file.id != file_id);
        let removed = before - state.records.len();
        info!("Deleted file {} ({} records)", file_id, removed);
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.records.clear();
        state.files.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().await.records.len())
    }

    async fn get_product_groups(&self) -> Result<Vec<ProductGroup>> {
        let mut groups = self.state.read().await.groups.clone();
        groups.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(groups)
    }
}

/// Whether the one-time copy from the legacy store has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    #[default]
    Uninitialized,
    Migrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationOutcome {
    pub migrated: bool,
    pub record_count: usize,
}

pub const LEGACY_MIGRATION_FILE_ID: &str = "legacy-migration";

/// Idempotent startup step: when the legacy store still holds records, copy
/// them into `primary`, empty the legacy store and report `Migrated`. On
/// error the state is left for the caller to retry on the next start.
pub async fn run_migration<L, P>(
    legacy: &L,
    primary: &P,
    state: MigrationState,
    batch_size: usize,
) -> Result<(MigrationState, MigrationOutcome)>
where
    L: RecordStore + ?Sized,
    P: RecordStore + ?Sized,
{
    let nothing = MigrationOutcome {
        migrated: false,
        record_count: 0,
    };

    if state == MigrationState::Migrated {
        return Ok((state, nothing));
    }

    if legacy.count().await? == 0 {
        return Ok((MigrationState::Migrated, nothing));
    }

    let records = legacy.get_all().await?;
    if records.is_empty() {
        return Ok((MigrationState::Migrated, nothing));
    }

    add_batch(primary, LEGACY_MIGRATION_FILE_ID, &records, batch_size).await?;
    primary
        .register_file(UploadedFile {
            id: LEGACY_MIGRATION_FILE_ID.to_string(),
            file_name: "legacy store".to_string(),
            records_count: records.len(),
            uploaded_at: chrono::Utc::now(),
        })
        .await?;
    legacy.clear().await?;

    info!("Migrated {} legacy records", records.len());
    Ok((
        MigrationState::Migrated,
        MigrationOutcome {
            migrated: true,
            record_count: records.len(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sale(date: &str, qty: i64) -> SalesRecord {
        SalesRecord {
            store: "A".into(),
            product: "P".into(),
            date: date.into(),
            year: None,
            ean: None,
            group: None,
            qty,
            price: None,
            total: None,
        }
    }

    #[tokio::test]
    async fn test_get_all_orders_by_date() {
        let store = InMemoryRecordStore::new();
        let records = vec![sale("2024-03-01", 1), sale("n/d", 2), sale("15/01/2024", 3)];
        add_batch(&store, "f1", &records, 500).await.unwrap();

        let all = store.get_all().await.unwrap();
        let qtys: Vec<i64> = all.iter().map(|r| r.qty).collect();
        assert_eq!(qtys, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_failed_chunk_keeps_committed_chunks() {
        let store = InMemoryRecordStore::new();
        store.fail_after_chunks(2).await;
        let records: Vec<SalesRecord> = (1..=7).map(|q| sale("2024-01-01", q)).collect();

        let err = add_batch(&store, "f1", &records, 3).await.unwrap_err();
        match err {
            SalesInsightsError::BatchWrite {
                chunk_index, offset, ..
            } => {
                assert_eq!(chunk_index, 2);
                assert_eq!(offset, 6);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(store.count().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_delete_file_removes_its_records() {
        let store = InMemoryRecordStore::new();
        add_batch(&store, "f1", &[sale("2024-01-01", 1)], 500).await.unwrap();
        add_batch(&store, "f2", &[sale("2024-01-02", 2), sale("2024-01-03", 3)], 500)
            .await
            .unwrap();

        assert_eq!(store.delete_file("f2").await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.records_for_file("f1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_product_groups_by_priority() {
        let store = InMemoryRecordStore::with_product_groups(vec![
            ProductGroup {
                group_name: "Rollos".into(),
                keywords: vec![],
                priority: 1,
                color: "#111111".into(),
            },
            ProductGroup {
                group_name: "Cantos".into(),
                keywords: vec!["canto".into()],
                priority: 5,
                color: "#222222".into(),
            },
        ]);
        let groups = load_product_groups(&store).await;
        assert_eq!(groups[0].group_name, "Cantos");
    }

    #[tokio::test]
    async fn test_migration_runs_once() {
        let legacy = InMemoryRecordStore::new();
        let primary = InMemoryRecordStore::new();
        add_batch(&legacy, "old", &[sale("2023-05-01", 4), sale("2023-05-02", 6)], 500)
            .await
            .unwrap();

        let (state, outcome) =
            run_migration(&legacy, &primary, MigrationState::Uninitialized, 500)
                .await
                .unwrap();
        assert_eq!(state, MigrationState::Migrated);
        assert!(outcome.migrated);
        assert_eq!(outcome.record_count, 2);
        assert_eq!(primary.count().await.unwrap(), 2);
        assert_eq!(legacy.count().await.unwrap(), 0);

        let (state, outcome) = run_migration(&legacy, &primary, state, 500).await.unwrap();
        assert_eq!(state, MigrationState::Migrated);
        assert!(!outcome.migrated);
        assert_eq!(primary.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_migration_with_empty_legacy_store() {
        let legacy = InMemoryRecordStore::new();
        let primary = InMemoryRecordStore::new();
        let (state, outcome) =
            run_migration(&legacy, &primary, MigrationState::Uninitialized, 500)
                .await
                .unwrap();
        assert_eq!(state, MigrationState::Migrated);
        assert_eq!(outcome.record_count, 0);
    }
}
