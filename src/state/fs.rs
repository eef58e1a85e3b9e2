use super::{check_path, job_key, JobStore};
use crate::error::CrosswalkError;
use crate::Result;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// Filesystem job store rooted at a directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never observes a half-written document.
pub struct FsJobStore {
    root: PathBuf,
}

impl FsJobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, job_id: Uuid, path: &str) -> PathBuf {
        self.root.join(job_key(job_id, path))
    }
}

#[async_trait::async_trait]
impl JobStore for FsJobStore {
    async fn read(&self, job_id: Uuid, path: &str) -> Result<Vec<u8>> {
        check_path(path)?;
        let target = self.object_path(job_id, path);
        debug!(path = %target.display(), "Reading job object");

        fs::read(&target).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => CrosswalkError::NotFound {
                job_id,
                path: path.to_string(),
            },
            _ => CrosswalkError::IoError(e),
        })
    }

    async fn write(&self, job_id: Uuid, path: &str, bytes: Vec<u8>) -> Result<String> {
        check_path(path)?;
        let target = self.object_path(job_id, path);
        let parent = target
            .parent()
            .ok_or_else(|| CrosswalkError::StoreError(format!("no parent for {:?}", path)))?;
        fs::create_dir_all(parent).await?;

        let file_name = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        debug!(path = %target.display(), bytes = bytes.len(), "Writing job object");
        fs::write(&staging, &bytes).await?;
        if let Err(e) = fs::rename(&staging, &target).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }

        Ok(job_key(job_id, path))
    }

    async fn list(&self, job_id: Uuid, prefix: &str) -> Result<Vec<String>> {
        let job_dir = self.root.join(job_key(job_id, ""));
        let full_prefix = job_key(job_id, prefix);

        let mut keys = Vec::new();
        let mut pending = vec![job_dir];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    continue;
                }

                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }

                let relative = path
                    .strip_prefix(&self.root)
                    .map_err(|e| CrosswalkError::StoreError(e.to_string()))?;
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");

                if key.starts_with(&full_prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsJobStore::new(dir.path());
        let job_id = Uuid::new_v4();

        let location = store
            .write(job_id, "crosswalk-data.json", b"{\"a\":1}".to_vec())
            .await
            .unwrap();
        assert_eq!(location, format!("jobs/{}/crosswalk-data.json", job_id));
        assert!(dir.path().join(&location).exists());

        let bytes = store.read(job_id, "crosswalk-data.json").await.unwrap();
        assert_eq!(bytes, b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsJobStore::new(dir.path());
        let job_id = Uuid::new_v4();

        store.write(job_id, "input.json", b"1".to_vec()).await.unwrap();
        store.write(job_id, "input.json", b"2".to_vec()).await.unwrap();
        store.write(job_id, "sections/01.md", b"x".to_vec()).await.unwrap();

        assert_eq!(store.read(job_id, "input.json").await.unwrap(), b"2");
        assert_eq!(
            store.list(job_id, "").await.unwrap(),
            vec![
                format!("jobs/{}/input.json", job_id),
                format!("jobs/{}/sections/01.md", job_id),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_file_and_missing_job() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsJobStore::new(dir.path());
        let job_id = Uuid::new_v4();

        assert!(matches!(
            store.read(job_id, "input.json").await,
            Err(CrosswalkError::NotFound { .. })
        ));
        assert!(store.list(job_id, "").await.unwrap().is_empty());
    }
}
