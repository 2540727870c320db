use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a file record. Stored as INTEGER 1..=4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadStatus {
    Pending = 1,
    InProgress = 2,
    Completed = 3,
    Failed = 4,
}

impl UploadStatus {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(UploadStatus::Pending),
            2 => Some(UploadStatus::InProgress),
            3 => Some(UploadStatus::Completed),
            4 => Some(UploadStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadStatus::Pending => "pending",
            UploadStatus::InProgress => "in_progress",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl ToSql for UploadStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for UploadStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = value.as_i64()?;
        UploadStatus::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

/// Batch status shares the record lifecycle codes. Batches are created
/// Pending and are not advanced by the coordinator.
pub type BatchStatus = UploadStatus;

/// One directory-scan-and-upload run.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: String,
    pub status: BatchStatus,
    pub created_at: i64,
    pub root_dir: String,
}

impl Batch {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Batch {
            id: row.get("id")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
            root_dir: row.get("root_dir")?,
        })
    }
}

/// A file discovered by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: String,
    pub batch_id: String,
    pub size: u64,
    pub last_modified: i64,
    pub permissions: String,
    pub file_name: String,
    pub file_path: String,
    pub status: UploadStatus,
}

impl FileRecord {
    pub(crate) const COLUMNS: &'static str =
        "id, batch_id, size, last_modified, permissions, file_name, file_path, status";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let size: i64 = row.get("size")?;
        let size = u64::try_from(size).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                row.as_ref().column_index("size").unwrap_or(2),
                Type::Integer,
                Box::new(err),
            )
        })?;

        Ok(FileRecord {
            id: row.get("id")?,
            batch_id: row.get("batch_id")?,
            size,
            last_modified: row.get("last_modified")?,
            permissions: row.get("permissions")?,
            file_name: row.get("file_name")?,
            file_path: row.get("file_path")?,
            status: row.get("status")?,
        })
    }
}

/// Attributes captured by the catalog before a record id is assigned.
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub size: u64,
    pub last_modified: i64,
    pub permissions: String,
    pub file_name: String,
    pub file_path: String,
}

/// One dispatch attempt of one file within one batch.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub id: String,
    pub batch_id: String,
    pub file_id: String,
    pub status: UploadStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl UploadJob {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(UploadJob {
            id: row.get("id")?,
            batch_id: row.get("batch_id")?,
            file_id: row.get("file_id")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Record counts per lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub failed: i64,
}

impl StatusCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.in_progress + self.completed + self.failed
    }
}
