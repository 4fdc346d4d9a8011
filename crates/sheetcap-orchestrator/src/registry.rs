//! In-process job registry, replacing the teacher's Redis-Streams queue
//! (§5 grounding: every job lives in the orchestrating process's memory for
//! the process lifetime, there is no distributed broker in this system).

use dashmap::DashMap;
use sheetcap_models::{Job, JobId};

use crate::error::{OrchestratorError, OrchestratorResult};

/// Thread-safe map of every job the process currently knows about, keyed by
/// `JobId`. Jobs are never removed except by an explicit `purge`.
#[derive(Default)]
pub struct JobRegistry {
    jobs: DashMap<JobId, Job>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self { jobs: DashMap::new() }
    }

    pub fn insert(&self, job: Job) {
        self.jobs.insert(job.id.clone(), job);
    }

    pub fn get(&self, id: &JobId) -> OrchestratorResult<Job> {
        self.jobs
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| OrchestratorError::JobNotFound(id.to_string()))
    }

    /// Apply `mutate` to the stored job and persist the result. Returns the
    /// updated job.
    pub fn update<F>(&self, id: &JobId, mutate: F) -> OrchestratorResult<Job>
    where
        F: FnOnce(Job) -> Job,
    {
        let mut entry = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| OrchestratorError::JobNotFound(id.to_string()))?;
        let current = entry.value().clone();
        let updated = mutate(current);
        *entry.value_mut() = updated.clone();
        Ok(updated)
    }

    pub fn remove(&self, id: &JobId) -> Option<Job> {
        self.jobs.remove(id).map(|(_, job)| job)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetcap_models::{PipelineOptions, SourceDescriptor, TimeWindow};
    use std::path::PathBuf;

    fn sample_job() -> Job {
        Job::new(
            PathBuf::from("/tmp/jobs/x"),
            SourceDescriptor::LocalPath { path: PathBuf::from("/tmp/in.mp4") },
            TimeWindow::default(),
            PipelineOptions::default(),
        )
    }

    #[test]
    fn insert_then_get_round_trips() {
        let registry = JobRegistry::new();
        let job = sample_job();
        let id = job.id.clone();
        registry.insert(job);
        assert_eq!(registry.get(&id).unwrap().id, id);
    }

    #[test]
    fn get_missing_job_errors() {
        let registry = JobRegistry::new();
        let result = registry.get(&JobId::from_string("missing"));
        assert!(matches!(result, Err(OrchestratorError::JobNotFound(_))));
    }

    #[test]
    fn update_persists_mutation() {
        let registry = JobRegistry::new();
        let job = sample_job();
        let id = job.id.clone();
        registry.insert(job);
        let updated = registry.update(&id, |j| j.start()).unwrap();
        assert_eq!(registry.get(&id).unwrap().state, updated.state);
    }
}
