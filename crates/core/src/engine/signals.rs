//! Typed signal dispatch between an engine run and its observers.

use tracing::debug;

use super::job::Job;
use super::types::{CloseReason, Item, JobFailure, JobId, ResponseSummary};
use crate::request::CrawlRequest;

/// Lifecycle events emitted by an engine.
#[derive(Debug, Clone, Copy)]
pub enum Signal<'a> {
    EngineOpened,
    JobOpened {
        job: JobId,
    },
    ItemScraped {
        item: &'a Item,
        response: Option<&'a ResponseSummary>,
        job: JobId,
    },
    ItemDropped {
        item: &'a Item,
        response: Option<&'a ResponseSummary>,
        reason: &'a str,
        job: JobId,
    },
    RequestScheduled {
        request: &'a CrawlRequest,
        job: JobId,
    },
    JobIdle {
        job: JobId,
    },
    JobError {
        failure: &'a JobFailure,
        job: JobId,
    },
    JobClosed {
        job: JobId,
        reason: &'a CloseReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    EngineOpened,
    JobOpened,
    ItemScraped,
    ItemDropped,
    RequestScheduled,
    JobIdle,
    JobError,
    JobClosed,
}

impl Signal<'_> {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::EngineOpened => SignalKind::EngineOpened,
            Signal::JobOpened { .. } => SignalKind::JobOpened,
            Signal::ItemScraped { .. } => SignalKind::ItemScraped,
            Signal::ItemDropped { .. } => SignalKind::ItemDropped,
            Signal::RequestScheduled { .. } => SignalKind::RequestScheduled,
            Signal::JobIdle { .. } => SignalKind::JobIdle,
            Signal::JobError { .. } => SignalKind::JobError,
            Signal::JobClosed { .. } => SignalKind::JobClosed,
        }
    }

    /// The job the signal originates from.
    pub fn job(&self) -> Option<JobId> {
        match self {
            Signal::EngineOpened => None,
            Signal::JobOpened { job }
            | Signal::ItemScraped { job, .. }
            | Signal::ItemDropped { job, .. }
            | Signal::RequestScheduled { job, .. }
            | Signal::JobIdle { job }
            | Signal::JobError { job, .. }
            | Signal::JobClosed { job, .. } => Some(*job),
        }
    }
}

/// An observer's answer to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalAck {
    #[default]
    Continue,
    /// Keep the job open although it is idle.
    DontClose,
}

/// Instructions an observer hands back to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    Crawl(CrawlRequest),
    Close(CloseReason),
}

/// What observers see of the running job while handling a signal.
pub struct SignalContext<'a> {
    job: &'a dyn Job,
    commands: Vec<EngineCommand>,
}

impl<'a> SignalContext<'a> {
    pub fn new(job: &'a dyn Job) -> Self {
        Self {
            job,
            commands: Vec::new(),
        }
    }

    /// The live job instance.
    pub fn job(&self) -> &dyn Job {
        self.job
    }

    /// Schedule a request on the job.
    pub fn crawl(&mut self, request: CrawlRequest) {
        self.commands.push(EngineCommand::Crawl(request));
    }

    /// Stop the job. The first close reason wins.
    pub fn close_job(&mut self, reason: CloseReason) {
        self.commands.push(EngineCommand::Close(reason));
    }

    pub fn into_commands(self) -> Vec<EngineCommand> {
        self.commands
    }
}

/// Receives the signals it declared interest in.
pub trait SignalObserver: Send {
    fn interests(&self) -> &[SignalKind];

    /// Handle one signal. Nothing may escape a handler; failures become
    /// observer state.
    fn on_signal(&mut self, signal: &Signal<'_>, ctx: &mut SignalContext<'_>) -> SignalAck;
}

/// Outcome of delivering one signal.
#[derive(Debug, Default)]
pub struct Delivery {
    pub ack: SignalAck,
    pub commands: Vec<EngineCommand>,
}

/// The observers bound to one engine run.
#[derive(Default)]
pub struct SignalBus<'a> {
    observers: Vec<&'a mut dyn SignalObserver>,
}

impl<'a> SignalBus<'a> {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn connect(&mut self, observer: &'a mut dyn SignalObserver) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver `signal` to every interested observer, in connection order.
    ///
    /// The ack is [`SignalAck::DontClose`] if any observer asked for it.
    pub fn emit(&mut self, signal: &Signal<'_>, job: &dyn Job) -> Delivery {
        let kind = signal.kind();
        let mut ctx = SignalContext::new(job);
        let mut ack = SignalAck::Continue;

        for observer in self.observers.iter_mut() {
            if !observer.interests().contains(&kind) {
                continue;
            }
            if observer.on_signal(signal, &mut ctx) == SignalAck::DontClose {
                ack = SignalAck::DontClose;
            }
        }

        let commands = ctx.into_commands();
        if !commands.is_empty() {
            debug!(signal = ?kind, commands = commands.len(), "Observers issued commands");
        }
        Delivery { ack, commands }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CrawlResponse, JobOutput};
    use async_trait::async_trait;

    struct NullJob;

    #[async_trait]
    impl Job for NullJob {
        fn name(&self) -> &str {
            "null"
        }
        fn has_callback(&self, _name: &str) -> bool {
            false
        }
        fn has_errback(&self, _name: &str) -> bool {
            false
        }
        fn start_requests(&self) -> Vec<CrawlRequest> {
            Vec::new()
        }
        async fn parse(&self, _: &str, _: &CrawlResponse) -> anyhow::Result<JobOutput> {
            Ok(JobOutput::default())
        }
        async fn handle_failure(&self, _: &str, _: &JobFailure) -> anyhow::Result<JobOutput> {
            Ok(JobOutput::default())
        }
    }

    struct Recorder {
        interests: Vec<SignalKind>,
        seen: Vec<SignalKind>,
        ack: SignalAck,
    }

    impl SignalObserver for Recorder {
        fn interests(&self) -> &[SignalKind] {
            &self.interests
        }

        fn on_signal(&mut self, signal: &Signal<'_>, ctx: &mut SignalContext<'_>) -> SignalAck {
            self.seen.push(signal.kind());
            if signal.kind() == SignalKind::JobIdle {
                ctx.close_job(CloseReason::Other("recorder".into()));
            }
            self.ack
        }
    }

    #[test]
    fn test_only_interested_observers_are_called() {
        let job = JobId::next();
        let mut idle = Recorder {
            interests: vec![SignalKind::JobIdle],
            seen: Vec::new(),
            ack: SignalAck::Continue,
        };
        let mut opened = Recorder {
            interests: vec![SignalKind::JobOpened],
            seen: Vec::new(),
            ack: SignalAck::Continue,
        };

        {
            let mut bus = SignalBus::new();
            bus.connect(&mut idle);
            bus.connect(&mut opened);
            bus.emit(&Signal::JobOpened { job }, &NullJob);
            let delivery = bus.emit(&Signal::JobIdle { job }, &NullJob);
            assert_eq!(
                delivery.commands,
                vec![EngineCommand::Close(CloseReason::Other("recorder".into()))]
            );
        }

        assert_eq!(idle.seen, vec![SignalKind::JobIdle]);
        assert_eq!(opened.seen, vec![SignalKind::JobOpened]);
    }

    #[test]
    fn test_any_dont_close_wins() {
        let job = JobId::next();
        let mut keep_open = Recorder {
            interests: vec![SignalKind::JobIdle],
            seen: Vec::new(),
            ack: SignalAck::DontClose,
        };
        let mut indifferent = Recorder {
            interests: vec![SignalKind::JobIdle],
            seen: Vec::new(),
            ack: SignalAck::Continue,
        };

        let mut bus = SignalBus::new();
        bus.connect(&mut keep_open);
        bus.connect(&mut indifferent);
        let delivery = bus.emit(&Signal::JobIdle { job }, &NullJob);
        assert_eq!(delivery.ack, SignalAck::DontClose);
    }

    #[test]
    fn test_signal_job_identity() {
        let job = JobId::next();
        assert_eq!(Signal::EngineOpened.job(), None);
        assert_eq!(Signal::JobIdle { job }.job(), Some(job));
    }
}
