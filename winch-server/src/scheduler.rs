//! Job scheduler
//!
//! Periodically promotes queued jobs to running by handing them to the
//! executor. Creating a job never starts it synchronously; this loop is
//! what guarantees every queued job eventually runs.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, error, info, warn};
use winch_core::domain::job::JobStatus;

use crate::db::Db;
use crate::executor::Executor;
use crate::repository::job_repository;
use crate::service::job::JobError;

pub struct Scheduler {
    db: Db,
    executor: Arc<Executor>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(db: Db, executor: Arc<Executor>, interval: Duration) -> Self {
        Self {
            db,
            executor,
            interval,
        }
    }

    /// Spawns the scheduling loop onto the runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Runs the scheduling loop until the shutdown signal fires.
    ///
    /// In-flight starts are not interrupted by shutdown; the hand-off to
    /// the executor is fire-and-forget.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting scheduler (interval: {:?})", self.interval);

        let mut tick = time::interval(self.interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match self.tick_once().await {
                        Ok(started) if started > 0 => {
                            info!("Started {} job(s) this tick", started);
                        }
                        Ok(_) => {}
                        Err(e) => error!("Scheduler tick failed: {:#}", e),
                    }
                }
                _ = shutdown.changed() => {
                    info!("Scheduler shutting down");
                    break;
                }
            }
        }
    }

    /// Performs a single scheduling pass.
    ///
    /// One job's failure to start never stops the pass: spawn errors are
    /// logged and the loop moves to the next queued job. A job claimed by
    /// a concurrent caller between the listing and the start is skipped.
    async fn tick_once(&self) -> Result<usize, JobError> {
        let queued = job_repository::list(&self.db, Some(JobStatus::Queued)).await?;

        if queued.is_empty() {
            debug!("No queued jobs");
            return Ok(0);
        }

        let mut started = 0;
        for job in queued {
            match self.executor.start(job.id).await {
                Ok(()) => started += 1,
                Err(JobError::InvalidState(_)) => {
                    debug!("Job {} already claimed, skipping", job.id);
                }
                Err(e) => warn!("Failed to start job {}: {:#}", job.id, e),
            }
        }

        Ok(started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::JobBroker;
    use crate::overlay::StaticOverlay;
    use crate::test_util::test_db;
    use std::collections::HashMap;
    use winch_core::dto::job::CreateJob;

    #[tokio::test]
    async fn test_queued_job_is_picked_up_and_driven_terminal() {
        let (db, dir) = test_db().await;
        let executor = Arc::new(Executor::new(
            db.clone(),
            JobBroker::new(),
            Arc::new(StaticOverlay::default()),
            dir.path().to_path_buf(),
        ));

        let req = CreateJob {
            command: "echo".to_string(),
            args: vec!["scheduled".to_string()],
            env_overrides: HashMap::new(),
        };
        let job = job_repository::create(&db, &req).await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = Scheduler::new(db.clone(), executor, Duration::from_millis(20));
        let handle = scheduler.spawn(shutdown_rx);

        let mut terminal = None;
        for _ in 0..200 {
            let fetched = job_repository::find_by_id(&db, job.id)
                .await
                .unwrap()
                .unwrap();
            if fetched.status.is_terminal() {
                terminal = Some(fetched);
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        let job = terminal.expect("scheduler should have driven the job terminal");
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.exit_code, Some(0));

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler should stop on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_one_bad_job_does_not_stop_the_pass() {
        let (db, dir) = test_db().await;
        let executor = Arc::new(Executor::new(
            db.clone(),
            JobBroker::new(),
            Arc::new(StaticOverlay::default()),
            dir.path().to_path_buf(),
        ));

        // Created first, so the newest-first pass hits the good job after
        // the broken one has already failed to spawn
        let good = job_repository::create(
            &db,
            &CreateJob {
                command: "echo".to_string(),
                args: vec!["ok".to_string()],
                env_overrides: HashMap::new(),
            },
        )
        .await
        .unwrap();
        let bad = job_repository::create(
            &db,
            &CreateJob {
                command: "definitely-not-a-real-binary".to_string(),
                args: Vec::new(),
                env_overrides: HashMap::new(),
            },
        )
        .await
        .unwrap();

        let scheduler = Scheduler::new(db.clone(), executor, Duration::from_millis(20));
        let started = scheduler.tick_once().await.unwrap();
        assert_eq!(started, 1);

        let bad = job_repository::find_by_id(&db, bad.id).await.unwrap().unwrap();
        assert_eq!(bad.status, JobStatus::Failed);
        assert_eq!(bad.exit_code, Some(-1));

        // The good job was still handed to the executor
        let good = job_repository::find_by_id(&db, good.id)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(good.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_shutdown_stops_an_idle_scheduler() {
        let (db, dir) = test_db().await;
        let executor = Arc::new(Executor::new(
            db.clone(),
            JobBroker::new(),
            Arc::new(StaticOverlay::default()),
            dir.path().to_path_buf(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle =
            Scheduler::new(db, executor, Duration::from_secs(3600)).spawn(shutdown_rx);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler should stop even mid-interval")
            .unwrap();
    }
}
