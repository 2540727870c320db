pub mod models;
pub mod queries;
pub mod sqlite;

pub use models::{Batch, BatchStatus, FileRecord, NewFileRecord, StatusCounts, UploadJob, UploadStatus};
pub use sqlite::Database;
