use super::models::*;
use super::sqlite::Database;
use rusqlite::{params, OptionalExtension, Params, Result};
use tracing::debug;
use uuid::Uuid;

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl Database {
    // ── Batches ──────────────────────────────────────────────────

    pub fn create_batch(&self, root_dir: &str) -> Result<Batch> {
        let batch = Batch {
            id: new_id(),
            status: BatchStatus::Pending,
            created_at: now_epoch(),
            root_dir: root_dir.to_string(),
        };
        self.connection().execute(
            "INSERT INTO batch_job (id, status, created_at, root_dir) VALUES (?1, ?2, ?3, ?4)",
            params![batch.id, batch.status, batch.created_at, batch.root_dir],
        )?;
        debug!("Created batch {} for {}", batch.id, batch.root_dir);
        Ok(batch)
    }

    /// Most recently created batch, if any.
    pub fn latest_batch(&self) -> Result<Option<Batch>> {
        self.connection()
            .query_row(
                "SELECT id, status, created_at, root_dir FROM batch_job \
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                [],
                Batch::from_row,
            )
            .optional()
    }

    // ── File Records ─────────────────────────────────────────────

    /// Insert a Pending record unless one already exists for the same
    /// (file_name, file_path). Returns whether a row was created.
    pub fn insert_file_record(&self, batch_id: &str, file: &NewFileRecord) -> Result<bool> {
        let size = i64::try_from(file.size)
            .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;
        let inserted = self.connection().execute(
            "INSERT INTO file_record \
             (id, batch_id, size, last_modified, permissions, file_name, file_path, status) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(file_name, file_path) DO NOTHING",
            params![
                new_id(),
                batch_id,
                size,
                file.last_modified,
                file.permissions,
                file.file_name,
                file.file_path,
                UploadStatus::Pending,
            ],
        )?;
        Ok(inserted == 1)
    }

    pub fn get_file_record(&self, file_id: &str) -> Result<Option<FileRecord>> {
        let sql = format!("SELECT {} FROM file_record WHERE id = ?1", FileRecord::COLUMNS);
        self.connection()
            .query_row(&sql, params![file_id], FileRecord::from_row)
            .optional()
    }

    pub fn count_file_records(&self) -> Result<i64> {
        self.connection()
            .query_row("SELECT COUNT(*) FROM file_record", [], |row| row.get(0))
    }

    pub fn pending_count(&self) -> Result<i64> {
        self.connection().query_row(
            "SELECT COUNT(*) FROM file_record WHERE status = ?1",
            params![UploadStatus::Pending],
            |row| row.get(0),
        )
    }

    pub fn status_counts(&self) -> Result<StatusCounts> {
        let mut stmt = self
            .connection()
            .prepare("SELECT status, COUNT(*) FROM file_record GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, UploadStatus>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>>>()?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            match status {
                UploadStatus::Pending => counts.pending = count,
                UploadStatus::InProgress => counts.in_progress = count,
                UploadStatus::Completed => counts.completed = count,
                UploadStatus::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }

    /// One work-queue page: Pending records strictly after `after` in the
    /// (size, id) ordering.
    pub fn fetch_pending_page(
        &self,
        after: Option<(u64, &str)>,
        page_size: usize,
    ) -> Result<Vec<FileRecord>> {
        let limit = page_size as i64;
        match after {
            None => {
                let sql = format!(
                    "SELECT {} FROM file_record WHERE status = ?1 \
                     ORDER BY size ASC, id ASC LIMIT ?2",
                    FileRecord::COLUMNS
                );
                self.query_records(&sql, params![UploadStatus::Pending, limit])
            }
            Some((size, id)) => {
                let size = i64::try_from(size)
                    .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;
                let sql = format!(
                    "SELECT {} FROM file_record WHERE status = ?1 \
                     AND (size > ?2 OR (size = ?2 AND id > ?3)) \
                     ORDER BY size ASC, id ASC LIMIT ?4",
                    FileRecord::COLUMNS
                );
                self.query_records(&sql, params![UploadStatus::Pending, size, id, limit])
            }
        }
    }

    fn query_records<P: Params>(&self, sql: &str, params: P) -> Result<Vec<FileRecord>> {
        let mut stmt = self.connection().prepare_cached(sql)?;
        let mut records = Vec::new();
        for record in stmt.query_map(params, FileRecord::from_row)? {
            records.push(record?);
        }
        Ok(records)
    }

    // ── Status transitions ───────────────────────────────────────

    /// Pending → InProgress, recording an upload job for `batch_id`.
    /// Returns the job id, or `None` when the record was no longer Pending.
    pub fn begin_upload(&self, batch_id: &str, file_id: &str) -> Result<Option<String>> {
        let tx = self.connection().unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE file_record SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![UploadStatus::InProgress, file_id, UploadStatus::Pending],
        )?;
        if changed == 0 {
            return Ok(None);
        }

        let job_id = new_id();
        let now = now_epoch();
        tx.execute(
            "INSERT INTO upload_job (id, batch_id, file_id, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![job_id, batch_id, file_id, UploadStatus::InProgress, now],
        )?;
        tx.commit()?;
        Ok(Some(job_id))
    }

    /// InProgress → Completed | Failed for both the record and its job.
    /// Returns false when the record was not InProgress.
    pub fn finish_upload(&self, job_id: &str, file_id: &str, status: UploadStatus) -> Result<bool> {
        if !status.is_terminal() {
            return Err(rusqlite::Error::ToSqlConversionFailure(
                format!("{} is not a terminal status", status).into(),
            ));
        }

        let tx = self.connection().unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE file_record SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![status, file_id, UploadStatus::InProgress],
        )?;
        if changed == 0 {
            return Ok(false);
        }
        tx.execute(
            "UPDATE upload_job SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status, now_epoch(), job_id],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Failed → Pending. Completed records are left untouched.
    pub fn reset_failed_to_pending(&self) -> Result<usize> {
        let count = self.connection().execute(
            "UPDATE file_record SET status = ?1 WHERE status = ?2",
            params![UploadStatus::Pending, UploadStatus::Failed],
        )?;
        debug!("Reset {} failed records to pending", count);
        Ok(count)
    }

    /// Every record back to Pending, including Completed and stuck InProgress ones.
    pub fn reset_all_to_pending(&self) -> Result<usize> {
        let count = self.connection().execute(
            "UPDATE file_record SET status = ?1 WHERE status != ?1",
            params![UploadStatus::Pending],
        )?;
        debug!("Reset {} records to pending", count);
        Ok(count)
    }

    // ── Upload jobs ──────────────────────────────────────────────

    pub fn upload_jobs_for_file(&self, file_id: &str) -> Result<Vec<UploadJob>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, batch_id, file_id, status, created_at, updated_at \
             FROM upload_job WHERE file_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let jobs = stmt
            .query_map(params![file_id], UploadJob::from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(jobs)
    }
}
