//! Sync engine: owner-scoped load and replace-by-partition save on top of a
//! [`TableStore`](crate::sheets::TableStore).
//!
//! `load` never fails: any configuration, connection or read problem is
//! logged and yields an empty set. `save` re-reads the whole table, swaps the
//! owner's partition and writes everything back. Saves inside one process are
//! serialized; writers in other processes can still race.

pub mod normalize;

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};
use crate::models::{RecordSet, HEADER};
use crate::sheets::{ConnectionCache, RawRow, TableStore};

pub use normalize::{coerce_count, coerce_unit_mass};

pub struct SyncEngine {
    connection: ConnectionCache,
    save_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(connection: ConnectionCache) -> Self {
        Self {
            connection,
            save_lock: Mutex::new(()),
        }
    }

    async fn handle(&self) -> AppResult<Arc<dyn TableStore>> {
        self.connection.get().await?.ok_or_else(|| {
            AppError::Configuration(
                self.connection
                    .configuration_problem()
                    .unwrap_or_else(|| "No table store configured".to_string()),
            )
        })
    }

    pub async fn try_load(&self, owner: &str) -> AppResult<RecordSet> {
        let store = self.handle().await?;
        let rows = store.read_all().await?;
        let records = normalize::scoped_records(&rows, owner);
        tracing::debug!(
            "Loaded {} of {} rows for owner={}",
            records.len(),
            rows.len(),
            owner
        );
        Ok(records)
    }

    /// The owner's records; empty on any failure.
    pub async fn load(&self, owner: &str) -> RecordSet {
        match self.try_load(owner).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Failed to load inventory for owner={}: {}", owner, e);
                RecordSet::empty(owner)
            }
        }
    }

    /// Replaces every stored row of `owner` with `scoped`.
    pub async fn try_save(&self, owner: &str, scoped: &RecordSet) -> AppResult<()> {
        let _guard = self.save_lock.lock().await;
        let store = self.handle().await?;

        // Fresh read: other owners may have saved since our last load
        let rows = store.read_all().await?;
        Self::write_partition(store.as_ref(), &rows, owner, scoped).await
    }

    /// Load, mutate and save as one step under the save lock, so concurrent
    /// updates of the same owner apply on top of each other.
    pub async fn update<F, T>(&self, owner: &str, mutate: F) -> AppResult<T>
    where
        F: FnOnce(&mut RecordSet) -> AppResult<T> + Send,
        T: Send,
    {
        let _guard = self.save_lock.lock().await;
        let store = self.handle().await?;

        let rows = store.read_all().await?;
        let mut scoped = normalize::scoped_records(&rows, owner);
        let result = mutate(&mut scoped)?;
        Self::write_partition(store.as_ref(), &rows, owner, &scoped).await?;
        Ok(result)
    }

    async fn write_partition(
        store: &dyn TableStore,
        rows: &[RawRow],
        owner: &str,
        scoped: &RecordSet,
    ) -> AppResult<()> {
        let combined = normalize::merge_partition(rows, owner, scoped);
        let total = combined.len();

        store.write_all(&HEADER, combined).await?;
        tracing::info!(
            "Saved {} rows for owner={} ({} rows total)",
            scoped.len(),
            owner,
            total
        );
        Ok(())
    }

    pub async fn save(&self, owner: &str, scoped: &RecordSet) -> bool {
        match self.try_save(owner, scoped).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to save inventory for owner={}: {}", owner, e);
                false
            }
        }
    }

    /// Forgets the cached store handle (logout).
    pub async fn invalidate_connection(&self) {
        self.connection.invalidate().await;
    }

    pub fn is_configured(&self) -> bool {
        self.connection.is_configured()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SheetsConfig;
    use crate::models::{Category, Highlight, Record};
    use crate::sheets::connection::DEFAULT_CONNECTION_TTL;
    use crate::sheets::{MemoryConnector, MemoryTable, SheetsConnector, StoreConnector};
    use std::time::Duration;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn seeded() -> Vec<Vec<String>> {
        grid(&[
            &HEADER,
            &["anna", "Vulkan", "Batterie", "2", "10", "", "Grün"],
            &["ben", "Kanonenschlag", "Böller", "abc", "3,5", "", "Rot"],
            &["anna", "Fontäne", "Leuchtfeuerwerk", "3", "5", "", "Kein"],
            &["ben", "Rakete", "Raketen", "7", "", "", ""],
        ])
    }

    fn engine_with(table: Arc<MemoryTable>) -> SyncEngine {
        let connector = Arc::new(MemoryConnector::new(table));
        SyncEngine::new(ConnectionCache::new(connector, DEFAULT_CONNECTION_TTL))
    }

    fn rows_of(grid: &[Vec<String>], owner: &str) -> Vec<Vec<String>> {
        grid.iter()
            .skip(1)
            .filter(|r| r[0] == owner)
            .cloned()
            .collect()
    }

    #[tokio::test]
    async fn test_load_filters_by_owner() {
        let engine = engine_with(Arc::new(MemoryTable::with_grid("Tabelle1", seeded())));

        let anna = engine.load("anna").await;
        let names: Vec<_> = anna.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Vulkan", "Fontäne"]);
        assert!(anna.iter().all(|r| r.owner == "anna"));
        assert_eq!(anna.total_items(), 5);
        assert!((anna.total_mass_kg() - 0.035).abs() < 1e-12);

        assert!(engine.load("Anna").await.is_empty());
    }

    #[tokio::test]
    async fn test_load_coerces_numbers() {
        let engine = engine_with(Arc::new(MemoryTable::with_grid("Tabelle1", seeded())));
        let ben = engine.load("ben").await;
        assert_eq!(ben.records()[0].count, 0);
        assert_eq!(ben.records()[0].unit_mass, 0.0);
        assert_eq!(ben.records()[1].count, 7);
        assert_eq!(ben.records()[1].highlight, Highlight::None);
    }

    #[tokio::test]
    async fn test_load_synthesizes_missing_columns() {
        let table = MemoryTable::with_grid(
            "Tabelle1",
            grid(&[&["User_ID", "Name"], &["anna", "Vulkan"]]),
        );
        let engine = engine_with(Arc::new(table));
        let anna = engine.load("anna").await;
        assert_eq!(anna.len(), 1);
        let record = &anna.records()[0];
        assert_eq!(record.count, 0);
        assert_eq!(record.unit_mass, 0.0);
        assert_eq!(record.image_path, "");
        assert_eq!(record.highlight, Highlight::None);
    }

    #[tokio::test]
    async fn test_save_of_load_is_idempotent() {
        let table = Arc::new(MemoryTable::with_grid("Tabelle1", seeded()));
        let engine = engine_with(table.clone());

        let before = engine.load("anna").await;
        assert!(engine.save("anna", &before).await);
        let after = engine.load("anna").await;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_save_leaves_other_partitions_untouched() {
        let table = Arc::new(MemoryTable::with_grid("Tabelle1", seeded()));
        let engine = engine_with(table.clone());
        let ben_before = rows_of(&table.snapshot().await, "ben");

        let mut anna = engine.load("anna").await;
        let mut added = Record::new("", "Single Vulkan");
        added.category = Category::SingleShot;
        added.count = 4;
        added.unit_mass = 12.5;
        anna.push(added);
        let first = anna.records()[0].id;
        anna.remove(first).unwrap();
        assert!(engine.save("anna", &anna).await);

        let grid = table.snapshot().await;
        assert_eq!(grid[0], HEADER);
        assert_eq!(rows_of(&grid, "ben"), ben_before);

        let reloaded = engine.load("anna").await;
        let names: Vec<_> = reloaded.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Fontäne", "Single Vulkan"]);
        assert_eq!(reloaded.records()[1].unit_mass, 12.5);
    }

    #[tokio::test]
    async fn test_save_forces_owner() {
        let table = Arc::new(MemoryTable::with_grid("Tabelle1", seeded()));
        let engine = engine_with(table.clone());

        // A set built for someone else is written under the saving owner
        let foreign = RecordSet::new("mallory", vec![Record::new("mallory", "X")]);
        assert!(engine.save("anna", &foreign).await);

        let grid = table.snapshot().await;
        assert!(rows_of(&grid, "mallory").is_empty());
        assert_eq!(rows_of(&grid, "anna").len(), 1);
    }

    #[tokio::test]
    async fn test_save_into_empty_sheet() {
        let table = Arc::new(MemoryTable::new("Tabelle1"));
        let engine = engine_with(table.clone());
        let set = RecordSet::new("anna", vec![Record::new("", "Vulkan")]);
        assert!(engine.save("anna", &set).await);
        assert_eq!(table.snapshot().await.len(), 2);
        assert_eq!(engine.load("anna").await.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_credentials_degrade_to_empty() {
        let config = SheetsConfig {
            worksheet: "Tabelle1".to_string(),
            ..Default::default()
        };
        let connector = Arc::new(SheetsConnector::new(&config, Duration::from_secs(1)).unwrap());
        let engine = SyncEngine::new(ConnectionCache::new(connector, DEFAULT_CONNECTION_TTL));

        assert!(!engine.is_configured());
        assert!(engine.load("anna").await.is_empty());
        assert!(matches!(
            engine.try_load("anna").await,
            Err(AppError::Configuration(_))
        ));
        assert!(!engine.save("anna", &RecordSet::empty("anna")).await);
    }

    struct BrokenTable;

    #[tonic::async_trait]
    impl TableStore for BrokenTable {
        async fn read_all(&self) -> AppResult<Vec<RawRow>> {
            Err(AppError::Read("HTTP 503".to_string()))
        }

        async fn write_all(&self, _: &[&str], _: Vec<Vec<String>>) -> AppResult<()> {
            Err(AppError::Write("HTTP 503".to_string()))
        }

        fn table_name(&self) -> &str {
            "broken"
        }
    }

    struct BrokenConnector;

    #[tonic::async_trait]
    impl StoreConnector for BrokenConnector {
        async fn connect(&self) -> AppResult<Option<Arc<dyn TableStore>>> {
            Ok(Some(Arc::new(BrokenTable)))
        }

        fn configuration_problem(&self) -> Option<String> {
            None
        }
    }

    #[tokio::test]
    async fn test_read_failure_is_not_fatal() {
        let engine = SyncEngine::new(ConnectionCache::new(
            Arc::new(BrokenConnector),
            DEFAULT_CONNECTION_TTL,
        ));
        assert!(engine.load("anna").await.is_empty());
        assert!(matches!(engine.try_load("anna").await, Err(AppError::Read(_))));
        assert!(!engine.save("anna", &RecordSet::empty("anna")).await);
    }

    /// Memory table whose reads yield to the scheduler before answering.
    struct SlowTable {
        inner: MemoryTable,
    }

    #[tonic::async_trait]
    impl TableStore for SlowTable {
        async fn read_all(&self) -> AppResult<Vec<RawRow>> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.inner.read_all().await
        }

        async fn write_all(&self, columns: &[&str], rows: Vec<Vec<String>>) -> AppResult<()> {
            self.inner.write_all(columns, rows).await
        }

        fn table_name(&self) -> &str {
            self.inner.table_name()
        }
    }

    struct SlowConnector {
        table: Arc<SlowTable>,
    }

    #[tonic::async_trait]
    impl StoreConnector for SlowConnector {
        async fn connect(&self) -> AppResult<Option<Arc<dyn TableStore>>> {
            Ok(Some(self.table.clone()))
        }

        fn configuration_problem(&self) -> Option<String> {
            None
        }
    }

    #[tokio::test]
    async fn test_concurrent_updates_of_one_owner_are_not_lost() {
        let table = Arc::new(SlowTable {
            inner: MemoryTable::with_grid(
                "Tabelle1",
                grid(&[&HEADER, &["anna", "Vulkan", "Batterie", "0", "10", "", "Kein"]]),
            ),
        });
        let engine = SyncEngine::new(ConnectionCache::new(
            Arc::new(SlowConnector { table }),
            DEFAULT_CONNECTION_TTL,
        ));
        let id = engine.load("anna").await.records()[0].id;

        let increment = |set: &mut RecordSet| set.adjust_quantity(id, 1).map(|r| r.count);
        let (a, b) = tokio::join!(
            engine.update("anna", increment),
            engine.update("anna", increment)
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(engine.load("anna").await.records()[0].count, 2);
    }

    #[tokio::test]
    async fn test_failed_mutation_writes_nothing() {
        let table = Arc::new(MemoryTable::with_grid("Tabelle1", seeded()));
        let engine = engine_with(table.clone());
        let before = table.snapshot().await;

        let foreign = crate::models::RecordId::derive("ben", "Rakete", 0);
        let result = engine
            .update("anna", |set| set.remove(foreign).map(|_| ()))
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(table.snapshot().await, before);
    }
}
