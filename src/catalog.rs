use crate::error::Result;
use crate::platform;
use crate::progress::ProgressReporter;
use crate::storage::{Database, NewFileRecord};
use glob::Pattern;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Counts from one catalog scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    /// Records created by this scan.
    pub created: usize,
    /// Files left out because their path is not valid UTF-8.
    pub skipped: usize,
}

/// Materializes file records for every regular file under a root directory.
pub struct FileCatalog<'a> {
    db: &'a Database,
    ignore_patterns: Vec<Pattern>,
}

impl<'a> FileCatalog<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            ignore_patterns: Vec::new(),
        }
    }

    pub fn with_ignore_patterns(mut self, globs: &[String]) -> Self {
        self.ignore_patterns = globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();
        self
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }

    /// Walk `root_dir` and insert a Pending record per regular file, owned by
    /// `batch_id`. Each insert commits on its own; a walk or stat error stops
    /// the scan but keeps what was already inserted.
    ///
    /// Paths that are not valid UTF-8 cannot be stored without losing
    /// information, so those files are skipped and counted.
    pub fn scan(
        &self,
        batch_id: &str,
        root_dir: &Path,
        reporter: &dyn ProgressReporter,
    ) -> Result<ScanStats> {
        let root = fs::canonicalize(root_dir)?;
        let root_display = root.to_string_lossy().into_owned();
        reporter.on_scan_start(&root_display);
        info!("Scanning {}", root_display);

        let start = Instant::now();
        let mut seen = 0usize;
        let mut stats = ScanStats::default();

        let walker = WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !self.is_ignored(entry.path()));

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let (Some(file_path), Some(file_name)) =
                (path.to_str(), path.file_name().and_then(|f| f.to_str()))
            else {
                warn!("Skipping file with non UTF-8 path: {}", path.display());
                stats.skipped += 1;
                continue;
            };
            let metadata = entry.metadata()?;

            let file = NewFileRecord {
                size: metadata.len(),
                last_modified: platform::modified_epoch_secs(&metadata),
                permissions: platform::permission_bits(&metadata),
                file_name: file_name.to_string(),
                file_path: file_path.to_string(),
            };

            seen += 1;
            match self.db.insert_file_record(batch_id, &file) {
                Ok(true) => {
                    stats.created += 1;
                    debug!("Cataloged {} ({} bytes)", file.file_path, file.size);
                }
                Ok(false) => debug!("Already cataloged: {}", file.file_path),
                Err(e) => error!("Error inserting record for {}: {}", file.file_path, e),
            }
            reporter.on_scan_progress(seen, &file.file_path);
        }

        let duration = start.elapsed();
        info!(
            "Scan complete: {} files seen, {} new records, {} skipped in {:.2}s",
            seen,
            stats.created,
            stats.skipped,
            duration.as_secs_f64()
        );
        reporter.on_scan_complete(stats.created, duration.as_secs_f64());
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::progress::SilentReporter;
    use crate::storage::UploadStatus;

    fn create_tree(root: &Path) {
        fs::create_dir_all(root.join("nested/deeper")).unwrap();
        fs::create_dir_all(root.join("skipme")).unwrap();
        fs::write(root.join("a.txt"), vec![b'a'; 10]).unwrap();
        fs::write(root.join("nested/b.txt"), vec![b'b'; 50]).unwrap();
        fs::write(root.join("nested/deeper/c.txt"), vec![b'c'; 20]).unwrap();
        fs::write(root.join("skipme/d.txt"), "ignored").unwrap();
    }

    #[test]
    fn test_scan_creates_pending_records_for_files_only() {
        let tmp = tempfile::tempdir().unwrap();
        create_tree(tmp.path());
        let db = Database::open_in_memory().unwrap();
        let batch = db.create_batch(&tmp.path().to_string_lossy()).unwrap();

        let stats = FileCatalog::new(&db)
            .scan(&batch.id, tmp.path(), &SilentReporter)
            .unwrap();
        assert_eq!(stats, ScanStats { created: 4, skipped: 0 });

        let counts = db.status_counts().unwrap();
        assert_eq!(counts.pending, 4);
        assert_eq!(counts.total(), 4);

        let (name, path, size, status): (String, String, i64, UploadStatus) = db
            .connection()
            .query_row(
                "SELECT file_name, file_path, size, status FROM file_record WHERE file_name = 'c.txt'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();
        assert_eq!(name, "c.txt");
        assert!(path.ends_with("nested/deeper/c.txt"));
        assert!(Path::new(&path).is_absolute());
        assert_eq!(size, 20);
        assert_eq!(status, UploadStatus::Pending);
    }

    #[test]
    fn test_rescan_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        create_tree(tmp.path());
        let db = Database::open_in_memory().unwrap();
        let batch = db.create_batch("root").unwrap();
        let catalog = FileCatalog::new(&db);

        assert_eq!(catalog.scan(&batch.id, tmp.path(), &SilentReporter).unwrap().created, 4);
        assert_eq!(catalog.scan(&batch.id, tmp.path(), &SilentReporter).unwrap().created, 0);
        assert_eq!(db.count_file_records().unwrap(), 4);

        let duplicates: i64 = db
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM (SELECT file_name, file_path FROM file_record \
                 GROUP BY file_name, file_path HAVING COUNT(*) > 1)",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(duplicates, 0);
    }

    #[test]
    fn test_rescan_picks_up_new_files() {
        let tmp = tempfile::tempdir().unwrap();
        create_tree(tmp.path());
        let db = Database::open_in_memory().unwrap();
        let batch = db.create_batch("root").unwrap();
        let catalog = FileCatalog::new(&db);
        catalog.scan(&batch.id, tmp.path(), &SilentReporter).unwrap();

        fs::write(tmp.path().join("late.txt"), "late").unwrap();
        assert_eq!(catalog.scan(&batch.id, tmp.path(), &SilentReporter).unwrap().created, 1);
        assert_eq!(db.count_file_records().unwrap(), 5);
    }

    #[test]
    fn test_ignore_patterns_prune_subtrees() {
        let tmp = tempfile::tempdir().unwrap();
        create_tree(tmp.path());
        let db = Database::open_in_memory().unwrap();
        let batch = db.create_batch("root").unwrap();

        let stats = FileCatalog::new(&db)
            .with_ignore_patterns(&["**/skipme".to_string(), "[".to_string()])
            .scan(&batch.id, tmp.path(), &SilentReporter)
            .unwrap();
        assert_eq!(stats.created, 3);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_names_are_skipped_not_merged() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(OsStr::from_bytes(b"\xff.txt")), "one").unwrap();
        fs::write(tmp.path().join(OsStr::from_bytes(b"\xfe.txt")), "two").unwrap();
        fs::write(tmp.path().join("plain.txt"), "three").unwrap();
        let db = Database::open_in_memory().unwrap();
        let batch = db.create_batch("root").unwrap();

        let stats = FileCatalog::new(&db)
            .scan(&batch.id, tmp.path(), &SilentReporter)
            .unwrap();

        assert_eq!(stats, ScanStats { created: 1, skipped: 2 });
        let names: Vec<String> = db
            .fetch_pending_page(None, 10)
            .unwrap()
            .into_iter()
            .map(|r| r.file_name)
            .collect();
        assert_eq!(names, vec!["plain.txt"]);
    }

    #[test]
    fn test_missing_root_aborts_scan() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let batch = db.create_batch("root").unwrap();

        let result = FileCatalog::new(&db).scan(&batch.id, &tmp.path().join("gone"), &SilentReporter);
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(db.count_file_records().unwrap(), 0);
    }
}
