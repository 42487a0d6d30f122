//! Aggregation server lifecycle.
//!
//! [`AggregationServer::bootstrap`] restores the content store from disk,
//! and [`AggregationServer::start`] binds the listener and spawns four
//! tasks:
//!
//! - **acceptor**: accepts a connection, sends the clock greeting, and
//!   queues the connection.
//! - **worker**: takes one queued connection at a time, decodes the
//!   request, dispatches it, writes the response, and closes.
//! - **persistence** and **eviction**: periodic jobs from [`crate::tasks`].
//!
//! The returned [`ServerHandle`] stops everything via
//! [`ServerHandle::shutdown`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use weather_core::config::AggregatorConfig;
use weather_core::persist::{LoadOutcome, load_snapshot};
use weather_core::{ContentStore, LamportClock};
use weather_wire::{StatusCode, WireError, read_request, write_greeting, write_response};

use crate::dispatch::Dispatcher;
use crate::error::ServerError;
use crate::tasks;

/// An accepted connection waiting for the worker.
#[derive(Debug)]
struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
}

/// A configured server whose store has been restored but which is not yet
/// listening.
#[derive(Debug)]
pub struct AggregationServer {
    config: AggregatorConfig,
    store: Arc<ContentStore>,
    clock: Arc<LamportClock>,
}

impl AggregationServer {
    /// Build the store and restore it from the primary or bootstrap snapshot.
    pub async fn bootstrap(config: AggregatorConfig) -> Self {
        let store = Arc::new(ContentStore::new(config.eviction.staleness()));
        let outcome = load_snapshot(&config.persistence.paths()).await;
        let source = match &outcome {
            LoadOutcome::Primary(_) => "primary",
            LoadOutcome::Bootstrap(_) => "bootstrap",
            LoadOutcome::Empty => "empty",
        };
        store.restore(outcome.into_snapshot());
        info!(
            source,
            stations = store.station_count(),
            readings = store.reading_count(),
            "content store restored"
        );

        Self {
            config,
            store,
            clock: Arc::new(LamportClock::new()),
        }
    }

    /// The content store the server will serve from.
    pub const fn store(&self) -> &Arc<ContentStore> {
        &self.store
    }

    /// Bind the listener and spawn all server tasks.
    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let request_timeout = self.config.server.request_timeout();

        let acceptor = tokio::spawn(accept_loop(
            listener,
            queue_tx,
            Arc::clone(&self.clock),
            request_timeout,
            shutdown_rx.clone(),
        ));
        let worker = tokio::spawn(work_loop(
            queue_rx,
            Dispatcher::new(Arc::clone(&self.store), Arc::clone(&self.clock)),
            self.config.server.worker_poll(),
            request_timeout,
            shutdown_rx.clone(),
        ));
        let persistence = tasks::spawn_persistence(
            Arc::clone(&self.store),
            self.config.persistence.paths(),
            self.config.persistence.interval(),
            shutdown_rx.clone(),
        );
        let eviction = tasks::spawn_eviction(
            Arc::clone(&self.store),
            self.config.eviction.interval(),
            self.config.eviction.staleness(),
            shutdown_rx,
        );

        info!(%local_addr, "aggregation server listening");

        Ok(ServerHandle {
            local_addr,
            config: self.config,
            store: self.store,
            clock: self.clock,
            shutdown: shutdown_tx,
            acceptor,
            worker,
            persistence,
            eviction,
        })
    }
}

/// Handle to a running server.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    config: AggregatorConfig,
    store: Arc<ContentStore>,
    clock: Arc<LamportClock>,
    shutdown: watch::Sender<bool>,
    acceptor: JoinHandle<()>,
    worker: JoinHandle<()>,
    persistence: JoinHandle<()>,
    eviction: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The shared content store.
    pub const fn store(&self) -> &Arc<ContentStore> {
        &self.store
    }

    /// The server's Lamport clock.
    pub const fn clock(&self) -> &Arc<LamportClock> {
        &self.clock
    }

    /// Stop accepting, stop periodic tasks, and drain the worker.
    ///
    /// Periodic tasks get their configured grace period before they are
    /// aborted. A final snapshot is written when `persist_on_shutdown` is
    /// set.
    pub async fn shutdown(self) {
        info!("aggregation server shutting down");
        let _ = self.shutdown.send(true);

        if let Err(e) = self.acceptor.await {
            warn!(error = %e, "acceptor ended abnormally");
        }
        tasks::stop_with_grace(
            "persistence",
            self.persistence,
            self.config.persistence.shutdown_grace(),
        )
        .await;
        tasks::stop_with_grace("eviction", self.eviction, self.config.eviction.shutdown_grace())
            .await;
        if let Err(e) = self.worker.await {
            warn!(error = %e, "worker ended abnormally");
        }

        if self.config.persistence.persist_on_shutdown {
            tasks::persist_once(&self.store, &self.config.persistence.paths()).await;
        }
        info!(clock = self.clock.current(), "aggregation server stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    queue: mpsc::UnboundedSender<Connection>,
    clock: Arc<LamportClock>,
    greeting_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((mut stream, peer)) => {
                    let greeting = write_greeting(&mut stream, clock.current());
                    match tokio::time::timeout(greeting_timeout, greeting).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            debug!(%peer, error = %e, "greeting failed, dropping connection");
                            continue;
                        }
                        Err(_) => {
                            debug!(%peer, "greeting timed out, dropping connection");
                            continue;
                        }
                    }
                    if queue.send(Connection { stream, peer }).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
        }
    }
    debug!("acceptor stopped");
}

async fn work_loop(
    mut queue: mpsc::UnboundedReceiver<Connection>,
    dispatcher: Dispatcher,
    poll: Duration,
    request_timeout: Duration,
    shutdown: watch::Receiver<bool>,
) {
    while !*shutdown.borrow() {
        match tokio::time::timeout(poll, queue.recv()).await {
            Ok(Some(connection)) => serve(connection, &dispatcher, request_timeout).await,
            Ok(None) => break,
            // Poll timeout; loop to observe shutdown.
            Err(_) => {}
        }
    }
    debug!(pending = queue.len(), "worker stopped");
}

async fn serve(connection: Connection, dispatcher: &Dispatcher, limit: Duration) {
    let Connection { stream, peer } = connection;
    match tokio::time::timeout(limit, exchange(stream, dispatcher)).await {
        Ok(Ok(status)) => debug!(%peer, status = status.as_u16(), "request served"),
        Ok(Err(e)) => warn!(%peer, error = %e, "connection failed"),
        Err(_) => warn!(
            %peer,
            timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            "request timed out"
        ),
    }
}

/// Read one request, answer it, and close the connection.
async fn exchange(stream: TcpStream, dispatcher: &Dispatcher) -> Result<StatusCode, WireError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let response = match read_request(&mut reader).await {
        Ok(request) => dispatcher.dispatch(&request),
        Err(e) if e.is_transport() => return Err(e),
        Err(e) => dispatcher.reject(&e),
    };

    write_response(&mut write_half, &response).await?;
    write_half.shutdown().await?;
    Ok(response.status)
}
