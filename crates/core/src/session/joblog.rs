//! Per-job log files.
//!
//! [`JobLogHook`] opens `<log_dir>/<job>/<timestamp>.log` through
//! `tracing-appender` when its job opens, and flushes and closes it when
//! dropped. [`JobLogLayer`] is a `fmt` layer that writes every event
//! recorded inside a `job` span carrying a `job_id` field to that job's
//! file.

use chrono::Utc;
use once_cell::sync::Lazy;
use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{warn, Event, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::fmt::writer::{MakeWriter, OptionalWriter};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, Layer};

use crate::engine::{JobId, Signal, SignalAck, SignalContext, SignalKind, SignalObserver};

/// Name of the span field identifying the job.
pub const JOB_ID_FIELD: &str = "job_id";

/// Writers of the job logs currently open.
static WRITERS: Lazy<RwLock<HashMap<u64, NonBlocking>>> = Lazy::new(Default::default);

thread_local! {
    /// Job whose event the layer is formatting on this thread.
    static CURRENT_JOB: Cell<Option<u64>> = const { Cell::new(None) };
}

fn writers() -> RwLockReadGuard<'static, HashMap<u64, NonBlocking>> {
    WRITERS.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn writers_mut() -> RwLockWriteGuard<'static, HashMap<u64, NonBlocking>> {
    WRITERS.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Log file of a job run started now.
pub fn job_log_path(log_dir: &Path, job_name: &str) -> PathBuf {
    log_dir
        .join(job_name)
        .join(format!("{}.log", Utc::now().format("%Y-%m-%dT%H%M%S%.6f")))
}

/// Opens the log file of one job run once the job is confirmed open.
pub struct JobLogHook {
    log_dir: PathBuf,
    job_name: String,
    job_id: JobId,
    path: Option<PathBuf>,
    guard: Option<WorkerGuard>,
}

impl std::fmt::Debug for JobLogHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobLogHook")
            .field("job_name", &self.job_name)
            .field("job_id", &self.job_id)
            .field("path", &self.path)
            .finish()
    }
}

impl JobLogHook {
    pub fn new(log_dir: &Path, job_name: &str, job_id: JobId) -> Self {
        Self {
            log_dir: log_dir.to_path_buf(),
            job_name: job_name.to_string(),
            job_id,
            path: None,
            guard: None,
        }
    }

    /// The file being written, once the job has opened.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn open(&mut self) {
        let path = job_log_path(&self.log_dir, &self.job_name);
        let (Some(dir), Some(file_name)) = (path.parent(), path.file_name()) else {
            return;
        };

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(file_name.to_string_lossy())
            .build(dir);

        match appender {
            Ok(appender) => {
                let (writer, guard) = NonBlockingBuilder::default()
                    .lossy(false)
                    .thread_name("crawlrt-job-log")
                    .finish(appender);
                writers_mut().insert(self.job_id.as_u64(), writer);
                self.guard = Some(guard);
                self.path = Some(path);
            }
            Err(e) => warn!("Failed to open job log {}: {}", path.display(), e),
        }
    }
}

impl SignalObserver for JobLogHook {
    fn interests(&self) -> &[SignalKind] {
        &[SignalKind::JobOpened]
    }

    fn on_signal(&mut self, signal: &Signal<'_>, _ctx: &mut SignalContext<'_>) -> SignalAck {
        if signal.job() == Some(self.job_id) && self.path.is_none() {
            self.open();
        }
        SignalAck::Continue
    }
}

impl Drop for JobLogHook {
    fn drop(&mut self) {
        if self.guard.is_some() {
            writers_mut().remove(&self.job_id.as_u64());
        }
        // Dropping the guard flushes the remaining lines.
    }
}

struct JobTag(u64);

struct JobIdVisitor(Option<u64>);

impl Visit for JobIdVisitor {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == JOB_ID_FIELD {
            self.0 = Some(value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if field.name() == JOB_ID_FIELD {
            self.0 = u64::try_from(value).ok();
        }
    }

    fn record_debug(&mut self, _field: &Field, _value: &dyn std::fmt::Debug) {}
}

/// Hands the `fmt` layer the writer of the job being logged.
#[derive(Debug, Clone, Copy, Default)]
struct JobWriters;

impl<'a> MakeWriter<'a> for JobWriters {
    type Writer = OptionalWriter<NonBlocking>;

    fn make_writer(&'a self) -> Self::Writer {
        CURRENT_JOB
            .with(Cell::get)
            .and_then(|job_id| writers().get(&job_id).cloned())
            .into()
    }
}

/// Routes events recorded inside a job span to that job's log file.
pub struct JobLogLayer<S> {
    fmt: fmt::Layer<S, DefaultFields, Format, JobWriters>,
}

impl<S> JobLogLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    pub fn new() -> Self {
        Self {
            fmt: fmt::layer().with_ansi(false).with_writer(JobWriters),
        }
    }
}

impl<S> Default for JobLogLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn default() -> Self {
        Self::new()
    }
}

fn job_of<S>(event: &Event<'_>, ctx: &Context<'_, S>) -> Option<u64>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    ctx.event_scope(event)?
        .from_root()
        .find_map(|span| span.extensions().get::<JobTag>().map(|tag| tag.0))
}

impl<S> Layer<S> for JobLogLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = JobIdVisitor(None);
        attrs.record(&mut visitor);
        if let Some(job_id) = visitor.0 {
            if let Some(span) = ctx.span(id) {
                span.extensions_mut().insert(JobTag(job_id));
            }
        }
        self.fmt.on_new_span(attrs, id, ctx);
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        self.fmt.on_record(id, values, ctx);
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(job_id) = job_of(event, &ctx) else {
            return;
        };
        if !writers().contains_key(&job_id) {
            return;
        }

        CURRENT_JOB.with(|current| current.set(Some(job_id)));
        self.fmt.on_event(event, ctx);
        CURRENT_JOB.with(|current| current.set(None));
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        self.fmt.on_close(id, ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{JobFactory, SeedMode, SignalBus};
    use crate::testing::ScriptedJobFactory;
    use std::fs;
    use tracing_subscriber::layer::SubscriberExt;

    fn opened_hook(dir: &Path, job_id: JobId) -> JobLogHook {
        let job = ScriptedJobFactory::new("test")
            .create(Default::default(), SeedMode::Autonomous)
            .unwrap();
        let mut hook = JobLogHook::new(dir, "test", job_id);
        {
            let mut bus = SignalBus::new();
            bus.connect(&mut hook);
            bus.emit(&Signal::JobOpened { job: job_id }, job.as_ref());
        }
        hook
    }

    #[test]
    fn test_job_log_path_layout() {
        let path = job_log_path(Path::new("logs"), "pages");
        assert!(path.starts_with("logs/pages"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with(".log"));
        // e.g. 2024-01-31T120000.123456.log
        assert_eq!(name.len(), "2024-01-31T120000.123456.log".len());
    }

    #[test]
    fn test_events_in_job_span_reach_job_file() {
        let dir = tempfile::tempdir().unwrap();
        let job_id = JobId::next();
        let hook = opened_hook(dir.path(), job_id);
        let path = hook.path().unwrap().to_path_buf();
        assert!(path.starts_with(dir.path().join("test")));

        let subscriber = tracing_subscriber::registry().with(JobLogLayer::new());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("outside any job");
            let span = tracing::info_span!("job", job_id = job_id.as_u64(), job = "test");
            let _guard = span.enter();
            tracing::info!(url = "http://x/", "inside the job");
        });
        drop(hook);

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("inside the job"));
        assert!(contents.contains("http://x/"));
        assert!(contents.contains("INFO"));
        assert!(!contents.contains("outside any job"));
    }

    #[test]
    fn test_jobs_write_to_their_own_files() {
        let dir = tempfile::tempdir().unwrap();
        let (first, second) = (JobId::next(), JobId::next());
        let first_hook = opened_hook(&dir.path().join("a"), first);
        let second_hook = opened_hook(&dir.path().join("b"), second);
        let first_path = first_hook.path().unwrap().to_path_buf();
        let second_path = second_hook.path().unwrap().to_path_buf();

        let subscriber = tracing_subscriber::registry().with(JobLogLayer::new());
        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("job", job_id = first.as_u64());
            span.in_scope(|| tracing::info!("first job event"));
            let span = tracing::info_span!("job", job_id = second.as_u64());
            span.in_scope(|| tracing::info!("second job event"));
        });
        drop(first_hook);
        drop(second_hook);

        let first_log = fs::read_to_string(&first_path).unwrap();
        let second_log = fs::read_to_string(&second_path).unwrap();
        assert!(first_log.contains("first job event"));
        assert!(!first_log.contains("second job event"));
        assert!(second_log.contains("second job event"));
        assert!(!second_log.contains("first job event"));
    }

    #[test]
    fn test_closed_job_stops_logging() {
        let dir = tempfile::tempdir().unwrap();
        let job_id = JobId::next();
        let hook = opened_hook(dir.path(), job_id);
        let path = hook.path().unwrap().to_path_buf();
        drop(hook);

        let subscriber = tracing_subscriber::registry().with(JobLogLayer::new());
        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("job", job_id = job_id.as_u64());
            span.in_scope(|| tracing::info!("after close"));
        });

        assert!(!fs::read_to_string(&path).unwrap().contains("after close"));
    }

    #[test]
    fn test_foreign_job_opened_does_not_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let job = ScriptedJobFactory::new("test")
            .create(Default::default(), SeedMode::Autonomous)
            .unwrap();
        let mut hook = JobLogHook::new(dir.path(), "test", JobId::next());
        {
            let mut bus = SignalBus::new();
            bus.connect(&mut hook);
            bus.emit(&Signal::JobOpened { job: JobId::next() }, job.as_ref());
        }
        assert!(hook.path().is_none());
    }
}
