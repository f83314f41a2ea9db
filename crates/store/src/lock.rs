//! Cross-process cron run locks.
//!
//! Each running job holds an `fs2` exclusive advisory lock on
//! `data_dir/cron-locks/<job_id>.lock`. The open handle is the token: the
//! lock releases when the guard drops, so a crashed process never leaves a
//! stale "running" marker behind.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use nextai_domain::error::{Error, Result};

const LOCK_DIR: &str = "cron-locks";

/// Held for the duration of one cron job run.
#[derive(Debug)]
pub struct CronJobLock {
    path: PathBuf,
    file: File,
}

impl CronJobLock {
    /// Try to acquire the per-job lock. Fails immediately with
    /// `cron_max_concurrency_reached` when this or another process already
    /// holds it.
    pub fn acquire(data_dir: &Path, job_id: &str) -> Result<Self> {
        let dir = data_dir.join(LOCK_DIR);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{job_id}.lock"));

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .read(true)
            .open(&path)?;

        file.try_lock_exclusive()
            .map_err(|_| Error::CronMaxConcurrencyReached(job_id.to_owned()))?;

        Ok(Self { path, file })
    }
}

impl Drop for CronJobLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquisition_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();

        let first = CronJobLock::acquire(dir.path(), "job-a").unwrap();
        let second = CronJobLock::acquire(dir.path(), "job-a");
        assert!(second.is_err(), "lock must be exclusive");
        assert_eq!(
            second.unwrap_err().code(),
            "cron_max_concurrency_reached"
        );

        drop(first);
        let third = CronJobLock::acquire(dir.path(), "job-a");
        assert!(third.is_ok(), "lock is free again after release");
    }

    #[test]
    fn different_jobs_lock_independently() {
        let dir = tempfile::tempdir().unwrap();
        let _a = CronJobLock::acquire(dir.path(), "job-a").unwrap();
        let b = CronJobLock::acquire(dir.path(), "job-b");
        assert!(b.is_ok());
    }

    #[test]
    fn lock_file_is_removed_on_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCK_DIR).join("job-a.lock");
        {
            let _guard = CronJobLock::acquire(dir.path(), "job-a").unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
