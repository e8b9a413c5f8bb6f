//! Binds sessions to engine runs.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info_span, Instrument};

use super::joblog::JobLogHook;
use super::orchestrator::CrawlSession;
use super::types::CrawlError;
use crate::engine::{CrawlEngine, EngineRun, Job, JobArgs, JobId, JobRegistry, SeedMode, SignalBus};

/// A resolved, instantiated job waiting for its run.
pub struct PreparedJob {
    pub job_id: JobId,
    pub job: Box<dyn Job>,
    pub seed_mode: SeedMode,
}

impl std::fmt::Debug for PreparedJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedJob")
            .field("job_id", &self.job_id)
            .field("job", &self.job.name())
            .field("seed_mode", &self.seed_mode)
            .finish()
    }
}

/// Resolves jobs and runs them with a session attached.
pub struct EngineAdapter {
    engine: Arc<dyn CrawlEngine>,
    registry: Arc<dyn JobRegistry>,
    /// Root of per-job log files; `None` disables them.
    log_dir: Option<PathBuf>,
}

impl EngineAdapter {
    pub fn new(
        engine: Arc<dyn CrawlEngine>,
        registry: Arc<dyn JobRegistry>,
        log_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            engine,
            registry,
            log_dir,
        }
    }

    pub fn registry(&self) -> &Arc<dyn JobRegistry> {
        &self.registry
    }

    /// Resolve `job_name`, check `job_args` and instantiate the job.
    ///
    /// Nothing is handed to the engine yet, so failures here leave no run
    /// behind.
    pub fn prepare(
        &self,
        job_name: &str,
        job_args: JobArgs,
        seed_mode: SeedMode,
    ) -> Result<PreparedJob, CrawlError> {
        let factory = self
            .registry
            .get(job_name)
            .ok_or_else(|| CrawlError::NotFound(format!("Spider not found: {}", job_name)))?;

        let members = factory.members();
        if let Some(key) = job_args.keys().find(|key| members.contains(key)) {
            return Err(CrawlError::InvalidArgument(format!(
                "Crawl argument cannot override spider method. Got '{}' which is a callable member of job '{}'",
                key, job_name
            )));
        }

        let job = factory.create(job_args, seed_mode)?;
        let job_id = JobId::next();
        debug!(job = %job_name, %job_id, ?seed_mode, "Prepared job");

        Ok(PreparedJob {
            job_id,
            job,
            seed_mode,
        })
    }

    /// Run a prepared job with `session` observing it.
    ///
    /// The session is always marked finished and the job log always closed,
    /// whether or not the engine run succeeds.
    pub async fn run(
        &self,
        prepared: PreparedJob,
        session: &mut CrawlSession,
    ) -> Result<(), CrawlError> {
        let PreparedJob { job_id, job, .. } = prepared;
        let job_name = job.name().to_string();
        let span = info_span!("job", job_id = job_id.as_u64(), job = %job_name);

        let mut log_hook = self
            .log_dir
            .as_deref()
            .map(|dir| JobLogHook::new(dir, &job_name, job_id));

        let outcome = {
            let mut bus = SignalBus::new();
            bus.connect(&mut *session);
            if let Some(hook) = log_hook.as_mut() {
                bus.connect(hook);
            }
            self.engine
                .run(EngineRun { job_id, job }, &mut bus)
                .instrument(span)
                .await
        };
        drop(log_hook);

        match outcome {
            Ok(report) => {
                session.finish(report.stats);
                Ok(())
            }
            Err(e) => {
                error!("Engine failed running job '{}': {}", job_name, e);
                session.finish(Default::default());
                Err(e.into())
            }
        }
    }
}
