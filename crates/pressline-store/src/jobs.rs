use crate::kv;
use crate::layout::StoreLayout;
use crate::StoreError;
use pressline_schema::PromotionJob;
use std::fs;
use tracing::warn;

/// Checksummed JSON store of [`PromotionJob`] records.
#[derive(Debug, Clone)]
pub struct JobStore {
    layout: StoreLayout,
}

impl JobStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn put(&self, job: &PromotionJob) -> Result<(), StoreError> {
        let dir = self.layout.jobs_dir();
        let dest = dir.join(job.job_id.as_str());
        kv::write_record(&dir, &dest, job)
    }

    pub fn get(&self, job_id: &str) -> Result<PromotionJob, StoreError> {
        let path = self.layout.jobs_dir().join(job_id);
        if !path.exists() {
            return Err(StoreError::JobNotFound(job_id.to_owned()));
        }
        kv::read_record(&path, job_id)
    }

    pub fn list(&self) -> Result<Vec<PromotionJob>, StoreError> {
        let mut results = Vec::new();
        for id in kv::list_ids(&self.layout.jobs_dir())? {
            match self.get(&id) {
                Ok(job) => results.push(job),
                Err(e) => {
                    warn!("skipping corrupted job record '{id}': {e}");
                }
            }
        }
        Ok(results)
    }

    /// Cascade helper: jobs reference environments weakly, so deleting an
    /// environment removes every job that names it as source or target.
    pub fn remove_for_env(&self, env_id: &str) -> Result<usize, StoreError> {
        let mut removed = 0;
        for job in self.list()? {
            if job.source == *env_id || job.target == *env_id {
                fs::remove_file(self.layout.jobs_dir().join(job.job_id.as_str()))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressline_schema::{EnvId, JobId, JobStatus, PromotionKind};

    fn test_store() -> (tempfile::TempDir, JobStore) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        (dir, JobStore::new(layout))
    }

    fn sample_job(id: &str, source: &str, target: &str) -> PromotionJob {
        PromotionJob {
            job_id: JobId::new(id),
            source: EnvId::new(source),
            target: EnvId::new(target),
            kind: PromotionKind::Code,
            options: serde_json::json!({}),
            status: JobStatus::Running,
            snapshot: None,
            started_at: "2026-01-15T12:00:00Z".to_owned(),
            finished_at: None,
            error: None,
            checksum: None,
        }
    }

    #[test]
    fn put_get_roundtrip() {
        let (_dir, store) = test_store();
        let job = sample_job("job-1", "site-dev", "site-staging");
        store.put(&job).unwrap();
        let back = store.get("job-1").unwrap();
        assert_eq!(back.job_id, job.job_id);
        assert!(back.checksum.is_some());
    }

    #[test]
    fn missing_job_reports_not_found() {
        let (_dir, store) = test_store();
        assert!(matches!(
            store.get("nope"),
            Err(StoreError::JobNotFound(_))
        ));
    }

    #[test]
    fn remove_for_env_matches_either_side() {
        let (_dir, store) = test_store();
        store.put(&sample_job("job-1", "site-dev", "site-staging")).unwrap();
        store.put(&sample_job("job-2", "site-staging", "site-prod")).unwrap();
        store.put(&sample_job("job-3", "other-dev", "other-prod")).unwrap();

        let removed = store.remove_for_env("site-staging").unwrap();
        assert_eq!(removed, 2);
        let rest = store.list().unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].job_id.as_str(), "job-3");
    }

    #[test]
    fn terminal_status_overwrite() {
        let (_dir, store) = test_store();
        let mut job = sample_job("job-1", "site-dev", "site-staging");
        store.put(&job).unwrap();

        job.status = JobStatus::Completed;
        job.finished_at = Some("2026-01-15T12:05:00Z".to_owned());
        store.put(&job).unwrap();

        let back = store.get("job-1").unwrap();
        assert_eq!(back.status, JobStatus::Completed);
        assert!(back.is_terminal());
    }
}
