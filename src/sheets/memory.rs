use std::sync::Arc;
use tokio::sync::RwLock;

use super::{rows_from_grid, RawRow, StoreConnector, TableStore};
use crate::error::AppResult;

/// Process-local table holding the same header + rows grid a worksheet would.
pub struct MemoryTable {
    name: String,
    grid: RwLock<Vec<Vec<String>>>,
}

impl MemoryTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_grid(name, Vec::new())
    }

    pub fn with_grid(name: impl Into<String>, grid: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            grid: RwLock::new(grid),
        }
    }

    /// Current grid including the header row.
    pub async fn snapshot(&self) -> Vec<Vec<String>> {
        self.grid.read().await.clone()
    }
}

#[tonic::async_trait]
impl TableStore for MemoryTable {
    async fn read_all(&self) -> AppResult<Vec<RawRow>> {
        Ok(rows_from_grid(&self.grid.read().await))
    }

    async fn write_all(&self, columns: &[&str], rows: Vec<Vec<String>>) -> AppResult<()> {
        let mut grid = Vec::with_capacity(rows.len() + 1);
        grid.push(columns.iter().map(|c| c.to_string()).collect());
        grid.extend(rows);
        *self.grid.write().await = grid;
        Ok(())
    }

    fn table_name(&self) -> &str {
        &self.name
    }
}

/// Always hands out the same shared table.
pub struct MemoryConnector {
    table: Arc<MemoryTable>,
}

impl MemoryConnector {
    pub fn new(table: Arc<MemoryTable>) -> Self {
        Self { table }
    }
}

#[tonic::async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self) -> AppResult<Option<Arc<dyn TableStore>>> {
        Ok(Some(self.table.clone()))
    }

    fn configuration_problem(&self) -> Option<String> {
        None
    }
}
