use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::id::new_id;
use crate::models::JobRecord;

/// In-memory table of analysis jobs for the life of the process.
///
/// Every field write goes through [`JobRegistry::update`], so readers only
/// ever see whole transitions.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, JobRecord>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh `queued` record and return a copy of it.
    pub async fn create(&self) -> JobRecord {
        self.create_with(|_| {}).await
    }

    /// Like [`JobRegistry::create`], but `init` fills in the record before it
    /// becomes visible to readers.
    pub async fn create_with<F>(&self, init: F) -> JobRecord
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut jobs = self.jobs.write().await;
        let mut id = new_id();
        while jobs.contains_key(&id) {
            id = new_id();
        }
        let mut job = JobRecord::new(id);
        init(&mut job);
        jobs.insert(job.id.clone(), job.clone());
        job
    }

    pub async fn get(&self, id: &str) -> Option<JobRecord> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Apply `mutation` to the record under the write lock.
    /// Returns false when no record has this id.
    pub async fn update<F>(&self, id: &str, mutation: F) -> bool
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(id) {
            Some(job) => {
                mutation(job);
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
