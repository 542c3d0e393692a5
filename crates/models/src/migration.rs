use serde::{Deserialize, Serialize};

use crate::organization::StorageLocation;

/// How a relocation moved the documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStrategy {
    /// Server-side rename of the partition, no data copied
    AtomicRename,
    /// Streamed, batched copy into the target followed by a source drop
    BatchedCopy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Running,
    Completed,
    CompletedWithFailures,
}

/// Result of moving one tenant's documents between locations.
///
/// Lives only for the duration of a relocate call and is handed back to the
/// caller; it is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationJob {
    pub source_location: StorageLocation,
    pub target_location: StorageLocation,
    pub strategy: MigrationStrategy,
    pub total_count: u64,
    pub migrated_count: u64,
    pub failed_count: u64,
    pub status: MigrationStatus,
}

impl MigrationJob {
    pub fn start(source: StorageLocation, target: StorageLocation, total_count: u64) -> Self {
        Self {
            source_location: source,
            target_location: target,
            strategy: MigrationStrategy::AtomicRename,
            total_count,
            migrated_count: 0,
            failed_count: 0,
            status: MigrationStatus::Running,
        }
    }

    /// Mark the whole partition as moved in one step
    pub fn renamed(mut self) -> Self {
        self.strategy = MigrationStrategy::AtomicRename;
        self.migrated_count = self.total_count;
        self.failed_count = 0;
        self.status = MigrationStatus::Completed;
        self
    }

    pub fn record_batch_inserted(&mut self, count: u64) {
        self.migrated_count += count;
    }

    pub fn record_batch_failed(&mut self, count: u64) {
        self.failed_count += count;
    }

    pub fn finish(&mut self) {
        self.status = if self.failed_count == 0 {
            MigrationStatus::Completed
        } else {
            MigrationStatus::CompletedWithFailures
        };
    }

    pub fn has_failures(&self) -> bool {
        self.failed_count > 0
    }

    /// Percentage of documents migrated, 0 for an empty migration
    pub fn success_rate(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        let rate = self.migrated_count as f64 / self.total_count as f64 * 100.0;
        (rate * 100.0).round() / 100.0
    }
}
