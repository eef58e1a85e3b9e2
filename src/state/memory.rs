use super::{check_path, job_key, JobStore};
use crate::error::CrosswalkError;
use crate::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory job store for development and tests
#[derive(Clone)]
pub struct InMemoryJobStore {
    objects: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl JobStore for InMemoryJobStore {
    async fn read(&self, job_id: Uuid, path: &str) -> Result<Vec<u8>> {
        check_path(path)?;
        let objects = self.objects.read().await;
        objects
            .get(&job_key(job_id, path))
            .cloned()
            .ok_or_else(|| CrosswalkError::NotFound {
                job_id,
                path: path.to_string(),
            })
    }

    async fn write(&self, job_id: Uuid, path: &str, bytes: Vec<u8>) -> Result<String> {
        check_path(path)?;
        let key = job_key(job_id, path);
        let mut objects = self.objects.write().await;
        objects.insert(key.clone(), bytes);
        Ok(key)
    }

    async fn list(&self, job_id: Uuid, prefix: &str) -> Result<Vec<String>> {
        let full_prefix = job_key(job_id, prefix);
        let objects = self.objects.read().await;
        Ok(objects
            .keys()
            .filter(|key| key.starts_with(&full_prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_write_list() {
        let store = InMemoryJobStore::new();
        let job_id = Uuid::new_v4();

        let location = store
            .write(job_id, "sections/01.md", b"# Intro".to_vec())
            .await
            .unwrap();
        assert_eq!(location, job_key(job_id, "sections/01.md"));
        store.write(job_id, "input.json", b"{}".to_vec()).await.unwrap();
        store
            .write(Uuid::new_v4(), "input.json", b"{}".to_vec())
            .await
            .unwrap();

        assert_eq!(store.read(job_id, "sections/01.md").await.unwrap(), b"# Intro");
        assert_eq!(store.list(job_id, "").await.unwrap().len(), 2);
        assert_eq!(
            store.list(job_id, "sections/").await.unwrap(),
            vec![job_key(job_id, "sections/01.md")]
        );
        assert_eq!(store.len().await, 3);
    }
}
