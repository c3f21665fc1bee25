//! Process Executor
//!
//! Runs one job's command as a subprocess and drives the job state
//! machine: `queued -> running -> succeeded | failed`. Output is captured
//! line-by-line from both pipes concurrently, redacted, and appended to
//! the store; a watcher task records the terminal status once the process
//! exits.
//!
//! Telemetry failures never abort a running job: a log line that cannot be
//! persisted is logged and dropped, and a read error on one pipe does not
//! stop capture of the other.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use winch_core::domain::job::JobStatus;
use winch_core::domain::log::{LogEntry, LogStream};
use winch_core::redact::redact_line;

use crate::db::Db;
use crate::events::JobBroker;
use crate::overlay::EnvironmentOverlay;
use crate::repository::{job_repository, log_repository};
use crate::service::job::JobError;

#[derive(Clone)]
pub struct Executor {
    db: Db,
    broker: JobBroker,
    overlay: Arc<dyn EnvironmentOverlay>,
    data_root: PathBuf,
}

impl Executor {
    pub fn new(
        db: Db,
        broker: JobBroker,
        overlay: Arc<dyn EnvironmentOverlay>,
        data_root: PathBuf,
    ) -> Self {
        Self {
            db,
            broker,
            overlay,
            data_root,
        }
    }

    /// Start a queued job's subprocess.
    ///
    /// Returns once the process is spawned and its capture tasks are
    /// attached; completion is recorded in the background. The transition
    /// out of `queued` is a compare-and-set, so concurrent callers racing
    /// on the same job spawn it exactly once — the losers get
    /// `InvalidState`.
    pub async fn start(&self, job_id: i64) -> Result<(), JobError> {
        let job = job_repository::find_by_id(&self.db, job_id)
            .await?
            .ok_or(JobError::NotFound(job_id))?;

        if !job_repository::try_mark_running(&self.db, job_id, chrono::Utc::now()).await? {
            return Err(JobError::InvalidState(format!(
                "job {job_id} is not queued"
            )));
        }
        self.broker.notify(job_id);

        // Operator defaults first, then the job's own overrides on top
        let mut env = self.overlay.resolve();
        for (key, value) in &job.env_overrides {
            env.insert(key.clone(), value.clone());
        }

        let spawned = Command::new(&job.command)
            .args(&job.args)
            .envs(env)
            .current_dir(&self.data_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn '{}' for job {}: {}", job.command, job_id, e);
                self.append_line(job_id, LogStream::Stderr, format!("[spawn error: {e}]"))
                    .await;
                self.finish(job_id, JobStatus::Failed, -1).await;
                return Err(e.into());
            }
        };

        info!("Job {} running: {} {:?}", job_id, job.command, job.args);

        let mut readers = JoinSet::new();
        if let Some(stdout) = child.stdout.take() {
            let executor = self.clone();
            readers.spawn(async move {
                executor.capture_stream(job_id, LogStream::Stdout, stdout).await;
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let executor = self.clone();
            readers.spawn(async move {
                executor.capture_stream(job_id, LogStream::Stderr, stderr).await;
            });
        }

        let executor = self.clone();
        tokio::spawn(async move {
            // Both pipes close at process exit; drain them before the
            // terminal write so a session never sees `complete` with
            // lines still in flight.
            while let Some(joined) = readers.join_next().await {
                if let Err(e) = joined {
                    warn!("Capture task for job {} panicked: {}", job_id, e);
                }
            }

            let (status, exit_code) = match child.wait().await {
                Ok(exit) if exit.success() => (JobStatus::Succeeded, 0),
                Ok(exit) => (JobStatus::Failed, exit.code().unwrap_or(-1)),
                Err(e) => {
                    error!("Failed to wait on subprocess for job {}: {}", job_id, e);
                    (JobStatus::Failed, -1)
                }
            };

            info!("Job {} exited with code {}", job_id, exit_code);
            executor.finish(job_id, status, exit_code).await;
        });

        Ok(())
    }

    /// Mark jobs left `running` by a previous process as failed.
    ///
    /// A job interrupted by a restart has no subprocess and would
    /// otherwise look live forever. Run once at startup, before the
    /// scheduler begins promoting queued work.
    pub async fn recover_orphaned(&self) -> Result<usize, JobError> {
        let orphaned = job_repository::list(&self.db, Some(JobStatus::Running)).await?;

        for job in &orphaned {
            warn!("Job {} was running at startup, marking failed", job.id);
            self.append_line(
                job.id,
                LogStream::Stderr,
                "[job interrupted: the server restarted while the process was running]"
                    .to_string(),
            )
            .await;
            self.finish(job.id, JobStatus::Failed, -1).await;
        }

        Ok(orphaned.len())
    }

    /// Read one pipe line-by-line until it closes, redacting and appending
    /// each line. A read error becomes one synthetic log line; the other
    /// stream keeps going.
    async fn capture_stream<R>(&self, job_id: i64, stream: LogStream, pipe: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(pipe).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let content = redact_line(&line).into_owned();
                    self.append_line(job_id, stream, content).await;
                }
                Ok(None) => break,
                Err(e) => {
                    self.append_line(job_id, stream, format!("[stream error: {e}]"))
                        .await;
                    break;
                }
            }
        }
    }

    /// Best-effort log append: a persistence failure is logged and the
    /// line dropped, never surfaced into the capture path.
    async fn append_line(&self, job_id: i64, stream: LogStream, content: String) {
        let entry = LogEntry {
            job_id,
            stream,
            content,
            timestamp: chrono::Utc::now(),
        };
        if let Err(e) = log_repository::append(&self.db, &entry).await {
            warn!("Dropping log line for job {}: {}", job_id, e);
        }
        self.broker.notify(job_id);
    }

    /// Record the terminal status. The repository guard makes this a
    /// no-op if completion was already written.
    async fn finish(&self, job_id: i64, status: JobStatus, exit_code: i32) {
        if let Err(e) =
            job_repository::mark_completed(&self.db, job_id, status, exit_code, chrono::Utc::now())
                .await
        {
            error!("Failed to record completion for job {}: {}", job_id, e);
        }
        self.broker.notify(job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::StaticOverlay;
    use crate::test_util::test_db;
    use std::collections::HashMap;
    use std::time::Duration;
    use winch_core::domain::job::Job;
    use winch_core::dto::job::CreateJob;

    fn test_executor(db: &Db, data_root: PathBuf) -> Executor {
        Executor::new(
            db.clone(),
            JobBroker::new(),
            Arc::new(StaticOverlay::default()),
            data_root,
        )
    }

    fn overlay_executor(
        db: &Db,
        data_root: PathBuf,
        vars: HashMap<String, String>,
    ) -> Executor {
        Executor::new(
            db.clone(),
            JobBroker::new(),
            Arc::new(StaticOverlay::new(vars)),
            data_root,
        )
    }

    async fn create_job(db: &Db, command: &str, args: &[&str]) -> i64 {
        create_job_with_env(db, command, args, HashMap::new()).await
    }

    async fn create_job_with_env(
        db: &Db,
        command: &str,
        args: &[&str],
        env_overrides: HashMap<String, String>,
    ) -> i64 {
        let req = CreateJob {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env_overrides,
        };
        job_repository::create(db, &req).await.unwrap().id
    }

    async fn wait_terminal(db: &Db, job_id: i64) -> Job {
        for _ in 0..200 {
            let job = job_repository::find_by_id(db, job_id)
                .await
                .unwrap()
                .unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("job {job_id} never reached a terminal state");
    }

    #[tokio::test]
    async fn test_echo_job_succeeds_with_stdout_captured() {
        let (db, dir) = test_db().await;
        let executor = test_executor(&db, dir.path().to_path_buf());
        let job_id = create_job(&db, "echo", &["hello", "world"]).await;

        executor.start(job_id).await.unwrap();
        let job = wait_terminal(&db, job_id).await;

        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.exit_code, Some(0));
        assert!(job.started_at.is_some());
        assert!(job.completed_at.unwrap() >= job.started_at.unwrap());

        let logs = log_repository::find_by_job(&db, job_id, None).await.unwrap();
        assert!(
            logs.iter()
                .any(|e| e.stream == LogStream::Stdout && e.content.contains("hello world")),
            "stdout log should contain the echoed line, got {logs:?}"
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails_with_the_reported_code() {
        let (db, dir) = test_db().await;
        let executor = test_executor(&db, dir.path().to_path_buf());
        let job_id = create_job(&db, "sh", &["-c", "exit 42"]).await;

        executor.start(job_id).await.unwrap();
        let job = wait_terminal(&db, job_id).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.exit_code, Some(42));
    }

    #[tokio::test]
    async fn test_stderr_is_captured_on_its_own_stream() {
        let (db, dir) = test_db().await;
        let executor = test_executor(&db, dir.path().to_path_buf());
        let job_id = create_job(&db, "sh", &["-c", "echo out; echo err 1>&2"]).await;

        executor.start(job_id).await.unwrap();
        wait_terminal(&db, job_id).await;

        let logs = log_repository::find_by_job(&db, job_id, None).await.unwrap();
        assert!(
            logs.iter()
                .any(|e| e.stream == LogStream::Stdout && e.content == "out")
        );
        assert!(
            logs.iter()
                .any(|e| e.stream == LogStream::Stderr && e.content == "err")
        );
    }

    #[tokio::test]
    async fn test_missing_binary_fails_without_lingering_running() {
        let (db, dir) = test_db().await;
        let executor = test_executor(&db, dir.path().to_path_buf());
        let job_id = create_job(&db, "definitely-not-a-real-binary", &[]).await;

        let err = executor.start(job_id).await.unwrap_err();
        assert!(matches!(err, JobError::Spawn(_)));

        let job = job_repository::find_by_id(&db, job_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.exit_code, Some(-1));
        assert!(job.completed_at.is_some());

        // The reason is observable in the log
        let logs = log_repository::find_by_job(&db, job_id, None).await.unwrap();
        assert!(logs.iter().any(|e| e.content.starts_with("[spawn error:")));
    }

    #[tokio::test]
    async fn test_start_unknown_job_is_not_found() {
        let (db, dir) = test_db().await;
        let executor = test_executor(&db, dir.path().to_path_buf());

        let err = executor.start(12345).await.unwrap_err();
        assert!(matches!(err, JobError::NotFound(12345)));
    }

    #[tokio::test]
    async fn test_concurrent_starts_spawn_exactly_once() {
        let (db, dir) = test_db().await;
        let executor = test_executor(&db, dir.path().to_path_buf());
        let job_id = create_job(&db, "echo", &["once"]).await;

        let (first, second) = tokio::join!(executor.start(job_id), executor.start(job_id));
        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            outcomes
                .iter()
                .any(|r| matches!(r, Err(JobError::InvalidState(_))))
        );

        let job = wait_terminal(&db, job_id).await;
        assert_eq!(job.status, JobStatus::Succeeded);

        // Exactly one spawn: the line appears exactly once
        let logs = log_repository::find_by_job(&db, job_id, None).await.unwrap();
        let echoes = logs.iter().filter(|e| e.content == "once").count();
        assert_eq!(echoes, 1);
    }

    #[tokio::test]
    async fn test_job_env_overrides_win_over_overlay_defaults() {
        let (db, dir) = test_db().await;
        let mut defaults = HashMap::new();
        defaults.insert("GREETING".to_string(), "from-overlay".to_string());
        defaults.insert("REGION".to_string(), "eu-west".to_string());
        let executor = overlay_executor(&db, dir.path().to_path_buf(), defaults);

        let mut overrides = HashMap::new();
        overrides.insert("GREETING".to_string(), "from-job".to_string());
        let job_id = create_job_with_env(
            &db,
            "sh",
            &["-c", "echo $GREETING $REGION"],
            overrides,
        )
        .await;

        executor.start(job_id).await.unwrap();
        wait_terminal(&db, job_id).await;

        let logs = log_repository::find_by_job(&db, job_id, None).await.unwrap();
        assert!(logs.iter().any(|e| e.content == "from-job eu-west"));
    }

    #[tokio::test]
    async fn test_captured_lines_are_redacted() {
        let (db, dir) = test_db().await;
        let executor = test_executor(&db, dir.path().to_path_buf());
        let job_id = create_job(&db, "sh", &["-c", "echo PASSWORD=supersecret"]).await;

        executor.start(job_id).await.unwrap();
        wait_terminal(&db, job_id).await;

        let logs = log_repository::find_by_job(&db, job_id, None).await.unwrap();
        assert!(logs.iter().any(|e| e.content == "PASSWORD=[REDACTED]"));
        assert!(!logs.iter().any(|e| e.content.contains("supersecret")));
    }

    #[tokio::test]
    async fn test_working_directory_is_the_data_root() {
        let (db, dir) = test_db().await;
        let executor = test_executor(&db, dir.path().to_path_buf());
        let job_id = create_job(&db, "pwd", &[]).await;

        executor.start(job_id).await.unwrap();
        wait_terminal(&db, job_id).await;

        let logs = log_repository::find_by_job(&db, job_id, None).await.unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert!(
            logs.iter()
                .any(|e| e.content == expected.display().to_string()),
            "pwd output should be the data root, got {logs:?}"
        );
    }

    #[tokio::test]
    async fn test_recover_orphaned_fails_stuck_jobs() {
        let (db, dir) = test_db().await;
        let executor = test_executor(&db, dir.path().to_path_buf());

        let stuck = create_job(&db, "echo", &[]).await;
        job_repository::try_mark_running(&db, stuck, chrono::Utc::now())
            .await
            .unwrap();
        let queued = create_job(&db, "echo", &[]).await;

        let recovered = executor.recover_orphaned().await.unwrap();
        assert_eq!(recovered, 1);

        let job = job_repository::find_by_id(&db, stuck).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.exit_code, Some(-1));

        let untouched = job_repository::find_by_id(&db, queued)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(untouched.status, JobStatus::Queued);
    }
}
