use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::info;

use crate::zone::Zone;

const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const MAX_BACKUP_COLLISIONS: u32 = 1_000;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("refusing to persist an empty alias list")]
    Empty,
    #[error("failed to inspect {path}: {source}")]
    Inspect { path: PathBuf, source: io::Error },
    #[error("failed to create backup directory {path}: {source}")]
    BackupDir { path: PathBuf, source: io::Error },
    #[error("no free backup name for {stem} at {timestamp}")]
    BackupNameExhausted { stem: String, timestamp: String },
    #[error("failed to move {from} to {to}: {source}")]
    Rotate {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistReport {
    pub path: PathBuf,
    pub written: usize,
    pub backup: Option<PathBuf>,
}

/// Flat results file, one alias per line, with the previous contents rotated
/// into `<backup_dir>/<stem>_<YYYYMMDD_HHMMSS>.bak` before each write.
#[derive(Debug, Clone)]
pub struct ResultStore {
    results_file: PathBuf,
    backup_dir: PathBuf,
    zone: Zone,
}

impl ResultStore {
    pub fn new(results_file: PathBuf, backup_dir: PathBuf, zone: Zone) -> Self {
        assert!(
            results_file.file_name().is_some(),
            "Results file must name a file"
        );
        Self {
            results_file,
            backup_dir,
            zone,
        }
    }

    pub fn results_file(&self) -> &Path {
        &self.results_file
    }

    pub async fn persist(&self, addresses: &[String]) -> Result<PersistReport, StoreError> {
        if addresses.is_empty() {
            return Err(StoreError::Empty);
        }

        let backup = self.rotate().await?;

        if let Some(parent) = non_empty_parent(&self.results_file) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Write {
                    path: self.results_file.clone(),
                    source,
                })?;
        }

        let mut contents = addresses.join("\n");
        contents.push('\n');
        fs::write(&self.results_file, contents)
            .await
            .map_err(|source| StoreError::Write {
                path: self.results_file.clone(),
                source,
            })?;

        info!(
            "Saved {} aliases to {}",
            addresses.len(),
            self.results_file.display()
        );
        Ok(PersistReport {
            path: self.results_file.clone(),
            written: addresses.len(),
            backup,
        })
    }

    async fn rotate(&self) -> Result<Option<PathBuf>, StoreError> {
        let exists = fs::try_exists(&self.results_file)
            .await
            .map_err(|source| StoreError::Inspect {
                path: self.results_file.clone(),
                source,
            })?;
        if !exists {
            return Ok(None);
        }

        fs::create_dir_all(&self.backup_dir)
            .await
            .map_err(|source| StoreError::BackupDir {
                path: self.backup_dir.clone(),
                source,
            })?;

        let target = self.free_backup_path().await?;
        fs::rename(&self.results_file, &target)
            .await
            .map_err(|source| StoreError::Rotate {
                from: self.results_file.clone(),
                to: target.clone(),
                source,
            })?;
        info!("Previous results moved to {}", target.display());
        Ok(Some(target))
    }

    async fn free_backup_path(&self) -> Result<PathBuf, StoreError> {
        let stem = self
            .results_file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "results".to_string());
        let timestamp = self.zone.now(BACKUP_TIMESTAMP_FORMAT);

        for collision in 0..MAX_BACKUP_COLLISIONS {
            let name = if collision == 0 {
                format!("{stem}_{timestamp}.bak")
            } else {
                format!("{stem}_{timestamp}_{collision}.bak")
            };
            let candidate = self.backup_dir.join(name);
            let taken = fs::try_exists(&candidate)
                .await
                .map_err(|source| StoreError::Inspect {
                    path: candidate.clone(),
                    source,
                })?;
            if !taken {
                return Ok(candidate);
            }
        }
        Err(StoreError::BackupNameExhausted { stem, timestamp })
    }
}

fn non_empty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|parent| !parent.as_os_str().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> ResultStore {
        ResultStore::new(
            dir.join("generated_emails.txt"),
            dir.join("backups"),
            Zone::parse("Europe/Moscow").unwrap(),
        )
    }

    fn aliases(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    async fn backups(dir: &Path) -> Vec<PathBuf> {
        let mut entries = Vec::new();
        let Ok(mut reader) = fs::read_dir(dir.join("backups")).await else {
            return entries;
        };
        while let Some(entry) = reader.next_entry().await.unwrap() {
            entries.push(entry.path());
        }
        entries.sort();
        entries
    }

    #[tokio::test]
    async fn first_persist_writes_without_backup() {
        let dir = tempfile::tempdir().unwrap();
        let report = store(dir.path())
            .persist(&aliases(&["a@icloud.com", "b@icloud.com"]))
            .await
            .unwrap();

        assert_eq!(report.written, 2);
        assert!(report.backup.is_none());
        let contents = fs::read_to_string(&report.path).await.unwrap();
        assert_eq!(contents, "a@icloud.com\nb@icloud.com\n");
        assert!(backups(dir.path()).await.is_empty());
    }

    #[tokio::test]
    async fn each_persist_rotates_exactly_one_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        store.persist(&aliases(&["first@icloud.com"])).await.unwrap();
        let second = store.persist(&aliases(&["second@icloud.com"])).await.unwrap();
        let third = store.persist(&aliases(&["third@icloud.com"])).await.unwrap();

        let rotated = backups(dir.path()).await;
        assert_eq!(rotated.len(), 2);
        assert_ne!(second.backup, third.backup);

        let current = fs::read_to_string(store.results_file()).await.unwrap();
        assert_eq!(current, "third@icloud.com\n");

        let second_backup = fs::read_to_string(third.backup.unwrap()).await.unwrap();
        assert_eq!(second_backup, "second@icloud.com\n");

        let name = second.backup.unwrap();
        let name = name.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("generated_emails_"));
        assert!(name.ends_with(".bak"));
    }

    #[tokio::test]
    async fn empty_list_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = store(dir.path()).persist(&[]).await;
        assert!(matches!(outcome, Err(StoreError::Empty)));
    }

    #[tokio::test]
    async fn unwritable_target_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("occupied");
        fs::write(&blocker, "file, not a directory").await.unwrap();
        let store = ResultStore::new(
            blocker.join("generated_emails.txt"),
            dir.path().join("backups"),
            Zone::parse("UTC").unwrap(),
        );
        let outcome = store.persist(&aliases(&["a@icloud.com"])).await;
        assert!(outcome.is_err());
    }
}
