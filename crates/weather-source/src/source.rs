//! Periodic document pusher.
//!
//! A [`ContentSource`] owns a generated identity, its own Lamport clock,
//! and the document it pushes. Each push opens a fresh connection, merges
//! the server's greeting clock, sends a stamped `PUT`, and merges the
//! response clock.
//!
//! Transport failures schedule a single retry after a fixed backoff,
//! independent of the periodic timer. While a retry is pending no second
//! one is scheduled; a retry that fails again waits another backoff. Both
//! the periodic task and any pending retry are cancelled by
//! [`ContentSource::shutdown`] or by dropping the last handle.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use weather_core::LamportClock;
use weather_types::{Document, SourceId};
use weather_wire::message::{LAMPORT_CLOCK, SERVER_ID, WEATHER_PATH};
use weather_wire::{Method, Request, StatusCode, read_greeting, read_response, write_request};

use crate::error::SourceError;

/// Default time between periodic pushes.
pub const DEFAULT_PUSH_INTERVAL: Duration = Duration::from_secs(30);
/// Default delay before retrying a failed push.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(15);
/// Default bound on one connect-and-exchange.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection and timing settings for a content source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Aggregator address as `host:port`.
    pub addr: String,
    /// Time between periodic pushes.
    pub push_interval: Duration,
    /// Delay before retrying after a transport failure.
    pub retry_backoff: Duration,
    /// Bound on one connect-and-exchange.
    pub exchange_timeout: Duration,
}

impl SourceConfig {
    /// Settings for `host:port` with default timings.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            push_interval: DEFAULT_PUSH_INTERVAL,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
        }
    }
}

/// How the aggregator answered a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// `201 Created`: first contact, or first push after going stale.
    Created,
    /// `200 OK`: an update from a known live source.
    Updated,
    /// Any other status.
    Rejected(StatusCode),
}

impl PushOutcome {
    /// Whether the aggregator accepted the document.
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }
}

#[derive(Debug)]
struct Shared {
    id: SourceId,
    clock: LamportClock,
    config: SourceConfig,
    document: RwLock<Document>,
}

impl Shared {
    fn document(&self) -> Document {
        self.document
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn push_once(&self) -> Result<PushOutcome, SourceError> {
        let limit = self.config.exchange_timeout;
        match tokio::time::timeout(limit, self.exchange()).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(limit)),
        }
    }

    async fn exchange(&self) -> Result<PushOutcome, SourceError> {
        let addr = &self.config.addr;
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| SourceError::Connect {
                addr: addr.clone(),
                source,
            })?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let greeting = read_greeting(&mut reader).await?;
        self.clock.receive(greeting);

        let body = serde_json::to_vec(&self.document())?;
        let request = Request::new(Method::Put, WEATHER_PATH)
            .header(SERVER_ID, &self.id)
            .header(LAMPORT_CLOCK, self.clock.send())
            .json_body(body);
        write_request(&mut write_half, &request).await?;

        let response = read_response(&mut reader).await?;
        self.clock.receive(response.lamport_clock());

        Ok(match response.status {
            StatusCode::CREATED => PushOutcome::Created,
            StatusCode::OK => PushOutcome::Updated,
            other => PushOutcome::Rejected(other),
        })
    }
}

/// Background task handles. Owned only by user-facing handles, so the
/// last [`ContentSource`] dropped stops every task.
#[derive(Debug)]
struct Tasks {
    periodic: Mutex<Option<JoinHandle<()>>>,
    retry: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl Tasks {
    fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            periodic: Mutex::new(None),
            retry: Mutex::new(None),
            shutdown,
        }
    }

    fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Spawn a retry unless one is pending or the source is stopped.
    fn schedule_retry(&self, shared: &Arc<Shared>) {
        let mut slot = lock(&self.retry);
        // Checked under the slot lock so `stop` cannot miss a new retry.
        if self.is_stopped() {
            return;
        }
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("retry already pending");
            return;
        }
        *slot = Some(tokio::spawn(run_retry(
            Arc::clone(shared),
            self.shutdown.subscribe(),
        )));
    }

    /// Raise the stop flag, then abort both tasks. Returns whether a
    /// pending retry was cancelled.
    fn stop(&self) -> bool {
        self.shutdown.send_replace(true);
        let periodic = lock(&self.periodic).take();
        if let Some(handle) = periodic {
            handle.abort();
        }
        let retry = lock(&self.retry).take();
        retry.is_some_and(|handle| {
            let pending = !handle.is_finished();
            handle.abort();
            pending
        })
    }
}

impl Drop for Tasks {
    fn drop(&mut self) {
        if self.stop() {
            debug!("pending retry cancelled on drop");
        }
    }
}

/// A content source. Cloning yields another handle to the same source.
///
/// Background tasks stop on [`ContentSource::shutdown`] or when the last
/// handle is dropped.
#[derive(Debug, Clone)]
pub struct ContentSource {
    shared: Arc<Shared>,
    tasks: Arc<Tasks>,
}

impl ContentSource {
    /// Create a source with a freshly generated identity.
    pub fn new(config: SourceConfig, document: Document) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: SourceId::generate(),
                clock: LamportClock::new(),
                config,
                document: RwLock::new(document),
            }),
            tasks: Arc::new(Tasks::new()),
        }
    }

    /// This source's identity, sent as `ServerID`.
    pub fn id(&self) -> &SourceId {
        &self.shared.id
    }

    /// This source's Lamport clock.
    pub fn clock(&self) -> &LamportClock {
        &self.shared.clock
    }

    /// The connection settings.
    pub fn config(&self) -> &SourceConfig {
        &self.shared.config
    }

    /// A copy of the document that will be pushed.
    pub fn document(&self) -> Document {
        self.shared.document()
    }

    /// Replace the document sent by subsequent pushes.
    pub fn set_document(&self, document: Document) {
        *self
            .shared
            .document
            .write()
            .unwrap_or_else(PoisonError::into_inner) = document;
    }

    /// Whether a retry is scheduled and has not yet run to completion.
    pub fn has_pending_retry(&self) -> bool {
        lock(&self.tasks.retry)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Push the document once, without retrying.
    pub async fn push_once(&self) -> Result<PushOutcome, SourceError> {
        self.shared.push_once().await
    }

    /// Push the document, scheduling a retry on transport failure.
    pub async fn push(&self) -> Result<PushOutcome, SourceError> {
        push_with_retry(&self.shared, &Arc::downgrade(&self.tasks)).await
    }

    /// Start pushing periodically. The first push happens immediately.
    ///
    /// Calling this again while the periodic task is running, or after
    /// [`ContentSource::shutdown`], does nothing.
    pub fn start(&self) {
        let mut slot = lock(&self.tasks.periodic);
        if self.tasks.is_stopped() || slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        *slot = Some(tokio::spawn(run_periodic(
            Arc::clone(&self.shared),
            Arc::downgrade(&self.tasks),
            self.tasks.shutdown.subscribe(),
        )));
        info!(
            source = %self.shared.id,
            addr = self.shared.config.addr,
            interval_secs = self.shared.config.push_interval.as_secs(),
            "content source started"
        );
    }

    /// Stop the periodic task and cancel any pending retry.
    pub fn shutdown(&self) {
        if self.tasks.stop() {
            debug!("pending retry cancelled");
        }
        info!(source = %self.shared.id, "content source stopped");
    }
}

/// Push once and, on a transport failure, hand a retry to `tasks` if the
/// source still has a live handle.
async fn push_with_retry(
    shared: &Arc<Shared>,
    tasks: &Weak<Tasks>,
) -> Result<PushOutcome, SourceError> {
    let result = shared.push_once().await;
    match &result {
        Ok(outcome) => log_outcome(*outcome, shared.clock.current()),
        Err(e) if e.is_transport() => {
            warn!(error = %e, "push failed, scheduling retry");
            if let Some(tasks) = tasks.upgrade() {
                tasks.schedule_retry(shared);
            }
        }
        Err(e) => warn!(error = %e, "push failed"),
    }
    result
}

async fn run_periodic(
    shared: Arc<Shared>,
    tasks: Weak<Tasks>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(shared.config.push_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let _ = push_with_retry(&shared, &tasks).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn run_retry(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let backoff = shared.config.retry_backoff;
    loop {
        tokio::select! {
            () = tokio::time::sleep(backoff) => {}
            _ = shutdown.wait_for(|stopped| *stopped) => {
                debug!("retry cancelled");
                return;
            }
        }
        match shared.push_once().await {
            Ok(outcome) => {
                log_outcome(outcome, shared.clock.current());
                break;
            }
            Err(e) if e.is_transport() => {
                warn!(error = %e, backoff_ms = millis(backoff), "retry failed, retrying again");
            }
            Err(e) => {
                warn!(error = %e, "retry failed");
                break;
            }
        }
    }
}

fn log_outcome(outcome: PushOutcome, clock: u64) {
    match outcome {
        PushOutcome::Created | PushOutcome::Updated => {
            info!(outcome = ?outcome, clock, "document pushed");
        }
        PushOutcome::Rejected(status) => {
            warn!(status = %status, clock, "document rejected");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
