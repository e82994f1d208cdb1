//! Watchlist Session
//!
//! The single event loop that owns the watchlist, the quote reconciler, and
//! the active stream subscription. User commands and source events are
//! processed strictly one at a time, so no lock guards the quote.
//!
//! # Data Flow
//!
//! ```text
//! SessionHandle ──commands──┐
//! Stream connector ─events──┼──► WatchlistSession ──watch──► SessionSnapshot
//! Poll/profile/batch tasks ─┘
//! ```
//!
//! Every symbol-scoped operation is tagged with the [`Generation`] that
//! started it; results arriving after the selection moved on are dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::sidebar::{SidebarEntry, SidebarPrices};
use crate::application::ports::{
    BatchQuote, CompanyProfile, PollError, PolledQuote, PriceStreamPort, QuotePort, StreamEvent,
    StreamSink, StreamSubscription, TaggedStreamEvent, WatchlistPersistence,
};
use crate::domain::quote::{ConnectionState, Observation, Quote};
use crate::domain::reconciliation::{Generation, QuoteReconciler};
use crate::domain::watchlist::{Symbol, Watchlist, WatchlistChange};
use crate::infrastructure::metrics::{self, PollKind, PollOutcome, StaleSource};

/// Error shown when the selected symbol's quote poll fails.
pub const POLL_ERROR_MESSAGE: &str = "Failed to fetch last quote (after-hours fallback)";

const EVENT_BUFFER: usize = 256;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// =============================================================================
// Settings
// =============================================================================

/// Tunables for the session loop.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Interval between sidebar batch polls.
    pub sidebar_interval: Duration,
    /// Capacity of the command channel.
    pub command_buffer: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            sidebar_interval: Duration::from_secs(30),
            command_buffer: 64,
        }
    }
}

/// Adapters the session drives.
#[derive(Clone)]
pub struct SessionPorts {
    /// Push price stream.
    pub stream: Arc<dyn PriceStreamPort>,
    /// Point-in-time quotes and profiles.
    pub quotes: Arc<dyn QuotePort>,
    /// Watchlist storage.
    pub persistence: Arc<dyn WatchlistPersistence>,
}

// =============================================================================
// Commands and Snapshot
// =============================================================================

/// User commands accepted by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Add a symbol and select it.
    Add(String),
    /// Remove a symbol.
    Remove(String),
    /// Select a tracked symbol.
    Select(String),
    /// Poll sidebar prices now.
    RefreshSidebar,
}

/// Serializable view of the session published after every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Selected symbol.
    pub selected: Option<Symbol>,
    /// Company name of the selected symbol.
    pub company_name: Option<String>,
    /// Current authoritative quote.
    pub quote: Option<Quote>,
    /// Quote change against the previous close, in percent.
    pub change_percent: Option<f64>,
    /// Stream connection state.
    pub connection: ConnectionState,
    /// Single human-readable error. Stream errors win over poll errors.
    pub error: Option<String>,
    /// Tracked symbols in order.
    pub watchlist: Vec<Symbol>,
    /// Sidebar rows in watchlist order.
    pub sidebar: Vec<SidebarEntry>,
    /// Sidebar error.
    pub sidebar_error: Option<String>,
    /// Current selection epoch.
    pub generation: Generation,
}

/// The session task has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("watchlist session is not running")]
pub struct SessionClosed;

/// Cloneable handle for sending commands and reading snapshots.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    /// Add a symbol and select it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionClosed`] if the session has stopped.
    pub async fn add(&self, raw: impl Into<String>) -> Result<(), SessionClosed> {
        self.send(SessionCommand::Add(raw.into())).await
    }

    /// Remove a symbol.
    ///
    /// # Errors
    ///
    /// Returns [`SessionClosed`] if the session has stopped.
    pub async fn remove(&self, raw: impl Into<String>) -> Result<(), SessionClosed> {
        self.send(SessionCommand::Remove(raw.into())).await
    }

    /// Select a tracked symbol.
    ///
    /// # Errors
    ///
    /// Returns [`SessionClosed`] if the session has stopped.
    pub async fn select(&self, raw: impl Into<String>) -> Result<(), SessionClosed> {
        self.send(SessionCommand::Select(raw.into())).await
    }

    /// Poll sidebar prices now.
    ///
    /// # Errors
    ///
    /// Returns [`SessionClosed`] if the session has stopped.
    pub async fn refresh_sidebar(&self) -> Result<(), SessionClosed> {
        self.send(SessionCommand::RefreshSidebar).await
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    async fn send(&self, command: SessionCommand) -> Result<(), SessionClosed> {
        self.commands.send(command).await.map_err(|_| SessionClosed)
    }
}

// =============================================================================
// Internal Events
// =============================================================================

#[derive(Debug)]
enum TaskEvent {
    Polled {
        generation: Generation,
        result: Result<Option<PolledQuote>, PollError>,
    },
    Profile {
        generation: Generation,
        result: Result<Option<CompanyProfile>, PollError>,
    },
    Sidebar {
        revision: u64,
        results: Vec<BatchQuote>,
    },
}

// =============================================================================
// Session
// =============================================================================

/// Single-owner session state.
pub struct WatchlistSession {
    watchlist: Watchlist,
    reconciler: QuoteReconciler,
    connection: ConnectionState,
    stream_error: Option<String>,
    poll_error: Option<String>,
    company_name: Option<String>,
    sidebar: SidebarPrices,
    revision: u64,
    ports: SessionPorts,
    settings: SessionSettings,
    stream_tx: mpsc::Sender<TaggedStreamEvent>,
    stream_rx: mpsc::Receiver<TaggedStreamEvent>,
    task_tx: mpsc::Sender<TaskEvent>,
    task_rx: mpsc::Receiver<TaskEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    active: Option<StreamSubscription>,
    sidebar_task: Option<JoinHandle<()>>,
}

impl WatchlistSession {
    /// Create a session with the watchlist loaded from persistence.
    ///
    /// Returns the session and a handle whose command channel feeds it.
    #[must_use]
    pub fn new(
        ports: SessionPorts,
        settings: SessionSettings,
    ) -> (Self, SessionHandle, mpsc::Receiver<SessionCommand>) {
        let watchlist = load_watchlist(ports.persistence.as_ref());
        metrics::set_watchlist_size(watchlist.len());

        let (stream_tx, stream_rx) = mpsc::channel(EVENT_BUFFER);
        let (task_tx, task_rx) = mpsc::channel(EVENT_BUFFER);
        let (command_tx, command_rx) = mpsc::channel(settings.command_buffer.max(1));

        let mut session = Self {
            watchlist,
            reconciler: QuoteReconciler::new(),
            connection: ConnectionState::Idle,
            stream_error: None,
            poll_error: None,
            company_name: None,
            sidebar: SidebarPrices::new(),
            revision: 0,
            ports,
            settings,
            stream_tx,
            stream_rx,
            task_tx,
            task_rx,
            snapshot_tx: watch::Sender::new(SessionSnapshot::default()),
            active: None,
            sidebar_task: None,
        };
        session.snapshot_tx.send_replace(session.snapshot());

        let handle = SessionHandle {
            commands: command_tx,
            snapshot: session.snapshot_tx.subscribe(),
        };

        (session, handle, command_rx)
    }

    /// Create a session and run it on a background task.
    #[must_use]
    pub fn spawn(
        ports: SessionPorts,
        settings: SessionSettings,
        cancel: CancellationToken,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (session, handle, commands) = Self::new(ports, settings);
        let task = tokio::spawn(session.run(commands, cancel));
        (handle, task)
    }

    /// Process commands and events until cancelled or every handle is dropped.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        cancel: CancellationToken,
    ) {
        tracing::info!(
            symbols = ?self.watchlist.to_strings(),
            selected = ?self.watchlist.selected().map(Symbol::as_str),
            "Watchlist session started"
        );

        self.resubscribe();
        self.refresh_sidebar();
        self.publish();

        let period = self.settings.sidebar_interval;
        let mut sidebar_tick = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        sidebar_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!("Watchlist session cancelled");
                    break;
                }
                command = commands.recv() => {
                    let Some(command) = command else {
                        tracing::info!("All session handles dropped");
                        break;
                    };
                    self.handle_command(command).await;
                }
                Some(event) = self.stream_rx.recv() => {
                    self.handle_stream_event(event);
                }
                Some(event) = self.task_rx.recv() => {
                    self.handle_task_event(event);
                }
                _ = sidebar_tick.tick() => {
                    self.refresh_sidebar();
                }
            }

            self.publish();
        }

        self.shutdown().await;
    }

    // =========================================================================
    // Commands
    // =========================================================================

    async fn handle_command(&mut self, command: SessionCommand) {
        tracing::debug!(?command, "Handling session command");

        let change = match command {
            SessionCommand::Add(raw) => self.watchlist.add(&raw),
            SessionCommand::Remove(raw) => self.watchlist.remove(&raw),
            SessionCommand::Select(raw) => self.watchlist.select(&raw),
            SessionCommand::RefreshSidebar => {
                self.refresh_sidebar();
                return;
            }
        };

        self.apply_change(change).await;
    }

    async fn apply_change(&mut self, change: WatchlistChange) {
        if change.list_changed {
            self.revision += 1;
            self.persist().await;
            self.sidebar.retain(&self.watchlist);
            metrics::set_watchlist_size(self.watchlist.len());
            self.refresh_sidebar();
        }

        if change.selection_changed {
            self.resubscribe();
        }
    }

    /// Save the list on the blocking pool. Completes before the change is
    /// published.
    async fn persist(&mut self) {
        let persistence = Arc::clone(&self.ports.persistence);
        let symbols = self.watchlist.to_strings();

        match tokio::task::spawn_blocking(move || persistence.save(&symbols)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Failed to persist watchlist"),
            Err(e) => tracing::error!(error = %e, "Watchlist save task failed"),
        }
    }

    // =========================================================================
    // Subscription Lifecycle
    // =========================================================================

    /// Tear down the previous subscription, then start a new generation for
    /// the current selection.
    fn resubscribe(&mut self) {
        if let Some(previous) = self.active.take() {
            previous.teardown();
        }

        let selected = self.watchlist.selected().cloned();
        let generation = self.reconciler.reset(selected.clone());
        self.stream_error = None;
        self.poll_error = None;
        self.company_name = None;

        let Some(symbol) = selected else {
            self.connection = ConnectionState::Idle;
            tracing::info!(%generation, "No symbol selected");
            return;
        };

        tracing::info!(symbol = %symbol, %generation, "Subscribing to symbol");
        self.connection = ConnectionState::Connecting;

        let sink = StreamSink::new(generation, self.stream_tx.clone());
        self.active = Some(self.ports.stream.open(&symbol, sink));

        self.spawn_quote_poll(generation, symbol.clone());
        self.spawn_profile_lookup(generation, symbol);
    }

    fn spawn_quote_poll(&self, generation: Generation, symbol: Symbol) {
        let quotes = Arc::clone(&self.ports.quotes);
        let tx = self.task_tx.clone();
        tokio::spawn(async move {
            let result = quotes.fetch_quote(&symbol).await;
            let _ = tx.send(TaskEvent::Polled { generation, result }).await;
        });
    }

    fn spawn_profile_lookup(&self, generation: Generation, symbol: Symbol) {
        let quotes = Arc::clone(&self.ports.quotes);
        let tx = self.task_tx.clone();
        tokio::spawn(async move {
            let result = quotes.fetch_profile(&symbol).await;
            let _ = tx.send(TaskEvent::Profile { generation, result }).await;
        });
    }

    fn refresh_sidebar(&mut self) {
        if self.watchlist.is_empty() {
            return;
        }

        if !self.ports.quotes.has_credential() {
            self.sidebar.mark_missing_credential();
            return;
        }

        if let Some(previous) = self.sidebar_task.take() {
            previous.abort();
        }

        let quotes = Arc::clone(&self.ports.quotes);
        let tx = self.task_tx.clone();
        let symbols = self.watchlist.symbols().to_vec();
        let revision = self.revision;

        tracing::debug!(count = symbols.len(), revision, "Refreshing sidebar prices");

        self.sidebar_task = Some(tokio::spawn(async move {
            let results = quotes.fetch_quotes(&symbols).await;
            let _ = tx.send(TaskEvent::Sidebar { revision, results }).await;
        }));
    }

    // =========================================================================
    // Source Events
    // =========================================================================

    fn handle_stream_event(&mut self, tagged: TaggedStreamEvent) {
        let TaggedStreamEvent { generation, event } = tagged;

        if !self.reconciler.is_current(generation) {
            metrics::record_stale_result(StaleSource::Stream);
            tracing::trace!(%generation, "Dropping stream event from previous selection");
            return;
        }

        match event {
            StreamEvent::Status(state) => {
                tracing::debug!(%generation, state = %state, "Stream status");
                self.connection = state;
            }
            StreamEvent::Quote { price } => {
                metrics::record_stream_message();
                match self
                    .reconciler
                    .apply(generation, Observation::Stream { price }, Utc::now())
                {
                    Ok(_) => self.stream_error = None,
                    Err(rejection) => {
                        tracing::debug!(price, %rejection, "Stream price rejected");
                    }
                }
            }
            StreamEvent::Error(e) => {
                metrics::record_stream_error(e.kind());
                tracing::warn!(%generation, error = %e, "Stream error");
                self.stream_error = Some(e.to_string());
            }
        }
    }

    fn handle_task_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Polled { generation, result } => self.on_quote_polled(generation, result),
            TaskEvent::Profile { generation, result } => self.on_profile(generation, result),
            TaskEvent::Sidebar { revision, results } => self.on_sidebar(revision, results),
        }
    }

    fn on_quote_polled(
        &mut self,
        generation: Generation,
        result: Result<Option<PolledQuote>, PollError>,
    ) {
        if !self.reconciler.is_current(generation) {
            metrics::record_stale_result(StaleSource::Quote);
            tracing::debug!(%generation, "Discarding quote poll from previous selection");
            return;
        }

        match result {
            Ok(Some(quote)) => {
                metrics::record_poll(PollKind::Quote, PollOutcome::Success);
                if let Err(rejection) =
                    self.reconciler
                        .apply(generation, quote.observation(), Utc::now())
                {
                    tracing::debug!(%rejection, "Polled quote rejected");
                }
            }
            Ok(None) => {
                metrics::record_poll(PollKind::Quote, PollOutcome::Empty);
                tracing::debug!(%generation, "Quote poll returned no tradable data");
            }
            Err(e) => {
                metrics::record_poll(PollKind::Quote, PollOutcome::Failure);
                tracing::warn!(%generation, error = %e, "Quote poll failed");
                if self.poll_error.is_none() {
                    self.poll_error = Some(POLL_ERROR_MESSAGE.to_string());
                }
            }
        }
    }

    fn on_profile(
        &mut self,
        generation: Generation,
        result: Result<Option<CompanyProfile>, PollError>,
    ) {
        if !self.reconciler.is_current(generation) {
            metrics::record_stale_result(StaleSource::Profile);
            return;
        }

        match result {
            Ok(Some(profile)) => {
                metrics::record_poll(PollKind::Profile, PollOutcome::Success);
                self.company_name = Some(profile.name);
            }
            Ok(None) => metrics::record_poll(PollKind::Profile, PollOutcome::Empty),
            Err(e) => {
                metrics::record_poll(PollKind::Profile, PollOutcome::Failure);
                tracing::debug!(error = %e, "Profile lookup failed");
            }
        }
    }

    fn on_sidebar(&mut self, revision: u64, results: Vec<BatchQuote>) {
        if revision != self.revision {
            metrics::record_stale_result(StaleSource::Sidebar);
            tracing::debug!(revision, current = self.revision, "Discarding stale sidebar batch");
            return;
        }

        self.sidebar_task = None;
        let outcome = self.sidebar.apply_batch(results);

        for _ in 0..outcome.priced {
            metrics::record_poll(PollKind::Sidebar, PollOutcome::Success);
        }
        for _ in 0..outcome.empty {
            metrics::record_poll(PollKind::Sidebar, PollOutcome::Empty);
        }
        for _ in 0..outcome.failed {
            metrics::record_poll(PollKind::Sidebar, PollOutcome::Failure);
        }

        if outcome.failed > 0 {
            tracing::warn!(failed = outcome.failed, "Sidebar batch partially failed");
        }
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    fn snapshot(&self) -> SessionSnapshot {
        let quote = self.reconciler.current().cloned();
        SessionSnapshot {
            selected: self.watchlist.selected().cloned(),
            company_name: self.company_name.clone(),
            change_percent: quote.as_ref().and_then(Quote::change_percent),
            quote,
            connection: self.connection,
            error: self.stream_error.clone().or_else(|| self.poll_error.clone()),
            watchlist: self.watchlist.symbols().to_vec(),
            sidebar: self.sidebar.entries(&self.watchlist),
            sidebar_error: self.sidebar.error().map(str::to_string),
            generation: self.reconciler.generation(),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    async fn shutdown(mut self) {
        if let Some(task) = self.sidebar_task.take() {
            task.abort();
        }

        if let Some(active) = self.active.take()
            && tokio::time::timeout(SHUTDOWN_GRACE, active.shutdown())
                .await
                .is_err()
        {
            tracing::warn!("Stream subscription did not stop in time");
        }

        self.connection = ConnectionState::Closed;
        self.publish();
        tracing::info!("Watchlist session stopped");
    }
}

/// Load the persisted watchlist, falling back to the defaults.
fn load_watchlist(persistence: &dyn WatchlistPersistence) -> Watchlist {
    match persistence.load() {
        Ok(Some(symbols)) => Watchlist::from_symbols(symbols),
        Ok(None) => Watchlist::with_defaults(),
        Err(e) => {
            tracing::warn!(error = %e, "Unreadable watchlist, using defaults");
            Watchlist::with_defaults()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::application::ports::{MockWatchlistPersistence, PersistenceError, StreamError};

    // =========================================================================
    // Fakes
    // =========================================================================

    /// Records opened subscriptions and exposes their sinks.
    #[derive(Default)]
    struct FakeStream {
        opened: Mutex<Vec<Opened>>,
    }

    struct Opened {
        symbol: Symbol,
        /// Sink as handed to the connector, not bound to the subscription.
        raw: StreamSink,
        /// Sink bound to the subscription's cancellation token.
        bound: StreamSink,
        token: CancellationToken,
    }

    impl FakeStream {
        fn sink(&self, index: usize) -> StreamSink {
            self.opened.lock()[index].bound.clone()
        }

        fn raw_sink(&self, index: usize) -> StreamSink {
            self.opened.lock()[index].raw.clone()
        }

        fn token(&self, index: usize) -> CancellationToken {
            self.opened.lock()[index].token.clone()
        }

        fn symbols(&self) -> Vec<String> {
            self.opened
                .lock()
                .iter()
                .map(|o| o.symbol.as_str().to_string())
                .collect()
        }
    }

    impl PriceStreamPort for FakeStream {
        fn open(&self, symbol: &Symbol, sink: StreamSink) -> StreamSubscription {
            let token = CancellationToken::new();
            self.opened.lock().push(Opened {
                symbol: symbol.clone(),
                raw: sink.clone(),
                bound: sink.detach_on(&token),
                token: token.clone(),
            });
            StreamSubscription::inert(token)
        }
    }

    /// Quote port whose responses can be held back per symbol.
    #[derive(Default)]
    struct FakeQuotes {
        credential: bool,
        quotes: Mutex<HashMap<String, Result<Option<PolledQuote>, PollError>>>,
        gates: Mutex<HashMap<String, Arc<Semaphore>>>,
        names: Mutex<HashMap<String, String>>,
    }

    impl FakeQuotes {
        fn with_credential() -> Self {
            Self {
                credential: true,
                ..Self::default()
            }
        }

        fn set_quote(&self, symbol: &str, result: Result<Option<PolledQuote>, PollError>) {
            self.quotes.lock().insert(symbol.to_string(), result);
        }

        /// Block quote requests for `symbol` until a permit is added.
        fn hold(&self, symbol: &str) -> Arc<Semaphore> {
            let gate = Arc::new(Semaphore::new(0));
            self.gates.lock().insert(symbol.to_string(), Arc::clone(&gate));
            gate
        }

        fn set_name(&self, symbol: &str, name: &str) {
            self.names.lock().insert(symbol.to_string(), name.to_string());
        }
    }

    #[async_trait]
    impl QuotePort for FakeQuotes {
        fn has_credential(&self) -> bool {
            self.credential
        }

        async fn fetch_quote(&self, symbol: &Symbol) -> Result<Option<PolledQuote>, PollError> {
            let gate = self.gates.lock().get(symbol.as_str()).cloned();
            if let Some(gate) = gate {
                let _permit = gate.acquire().await;
            }
            self.quotes
                .lock()
                .get(symbol.as_str())
                .cloned()
                .unwrap_or(Ok(None))
        }

        async fn fetch_profile(
            &self,
            symbol: &Symbol,
        ) -> Result<Option<CompanyProfile>, PollError> {
            Ok(self
                .names
                .lock()
                .get(symbol.as_str())
                .map(|name| CompanyProfile { name: name.clone() }))
        }
    }

    fn persistence_with(stored: Option<Vec<String>>) -> MockWatchlistPersistence {
        let mut persistence = MockWatchlistPersistence::new();
        persistence
            .expect_load()
            .returning(move || Ok(stored.clone()));
        persistence.expect_save().returning(|_| Ok(()));
        persistence
    }

    struct Harness {
        stream: Arc<FakeStream>,
        handle: SessionHandle,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    }

    impl Harness {
        fn start(quotes: FakeQuotes, persistence: MockWatchlistPersistence) -> Self {
            let stream = Arc::new(FakeStream::default());
            let ports = SessionPorts {
                stream: stream.clone(),
                quotes: Arc::new(quotes),
                persistence: Arc::new(persistence),
            };
            let cancel = CancellationToken::new();
            let (handle, task) =
                WatchlistSession::spawn(ports, SessionSettings::default(), cancel.clone());
            Self {
                stream,
                handle,
                cancel,
                task,
            }
        }

        async fn wait_for(
            &self,
            predicate: impl FnMut(&SessionSnapshot) -> bool,
        ) -> SessionSnapshot {
            let mut rx = self.handle.subscribe();
            tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
                .await
                .expect("timed out waiting for snapshot")
                .expect("session stopped")
                .clone()
        }

        async fn raw_stale_quote(&self, index: usize, price: f64) -> bool {
            self.stream.raw_sink(index).quote(price).await
        }

        async fn stop(self) {
            self.cancel.cancel();
            self.task.await.unwrap();
        }
    }

    fn polled(price: f64, previous_close: Option<f64>) -> Result<Option<PolledQuote>, PollError> {
        Ok(Some(PolledQuote {
            price,
            previous_close,
        }))
    }

    // =========================================================================
    // Tests
    // =========================================================================

    #[tokio::test]
    async fn starts_with_defaults_and_subscribes_first_symbol() {
        let harness = Harness::start(FakeQuotes::default(), persistence_with(None));

        let snapshot = harness
            .wait_for(|s| s.connection == ConnectionState::Connecting)
            .await;

        assert_eq!(snapshot.selected.unwrap().as_str(), "META");
        assert_eq!(snapshot.watchlist.len(), 3);
        assert_eq!(harness.stream.symbols(), vec!["META"]);
        harness.stop().await;
    }

    #[tokio::test]
    async fn loads_persisted_watchlist() {
        let stored = Some(vec!["tsla".to_string(), "NVDA".to_string()]);
        let harness = Harness::start(FakeQuotes::default(), persistence_with(stored));

        let snapshot = harness.wait_for(|s| s.selected.is_some()).await;

        let symbols: Vec<&str> = snapshot.watchlist.iter().map(Symbol::as_str).collect();
        assert_eq!(symbols, vec!["TSLA", "NVDA"]);
        assert_eq!(snapshot.selected.unwrap().as_str(), "TSLA");
        harness.stop().await;
    }

    #[tokio::test]
    async fn unreadable_store_falls_back_to_defaults() {
        let mut persistence = MockWatchlistPersistence::new();
        persistence.expect_load().returning(|| {
            Err(PersistenceError::Json(
                serde_json::from_str::<Vec<String>>("{}").unwrap_err(),
            ))
        });
        persistence.expect_save().returning(|_| Ok(()));

        let harness = Harness::start(FakeQuotes::default(), persistence);
        let snapshot = harness.wait_for(|s| s.selected.is_some()).await;

        assert_eq!(snapshot.watchlist.len(), 3);
        harness.stop().await;
    }

    #[tokio::test]
    async fn stream_quote_keeps_polled_previous_close() {
        let quotes = FakeQuotes::with_credential();
        quotes.set_quote("META", polled(500.0, Some(480.0)));
        let harness = Harness::start(quotes, persistence_with(None));

        harness
            .wait_for(|s| s.quote.as_ref().is_some_and(|q| q.price == 500.0))
            .await;

        let sink = harness.stream.sink(0);
        sink.status(ConnectionState::Open).await;
        sink.quote(505.0).await;

        let snapshot = harness
            .wait_for(|s| s.quote.as_ref().is_some_and(|q| q.price == 505.0))
            .await;

        let quote = snapshot.quote.unwrap();
        assert_eq!(quote.previous_close, Some(480.0));
        assert_eq!(snapshot.connection, ConnectionState::Open);
        assert!(snapshot.change_percent.is_some());
        harness.stop().await;
    }

    #[tokio::test]
    async fn switching_symbol_discards_pending_poll() {
        let quotes = FakeQuotes::with_credential();
        quotes.set_quote("META", polled(999.0, None));
        let meta_gate = quotes.hold("META");
        quotes.set_quote("AAPL", polled(190.0, None));
        let harness = Harness::start(quotes, persistence_with(None));

        harness.wait_for(|s| s.selected.is_some()).await;
        harness.handle.select("AAPL").await.unwrap();
        harness
            .wait_for(|s| s.quote.as_ref().is_some_and(|q| q.price == 190.0))
            .await;

        // Releases both the pending META poll and META's sidebar entry.
        meta_gate.add_permits(1);
        harness
            .wait_for(|s| s.sidebar.iter().any(|e| e.price == Some(999.0)))
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let snapshot = harness.handle.snapshot();
        assert_eq!(snapshot.selected.unwrap().as_str(), "AAPL");
        assert_eq!(snapshot.quote.unwrap().price, 190.0);
        harness.stop().await;
    }

    #[tokio::test]
    async fn selection_change_tears_down_previous_stream() {
        let harness = Harness::start(FakeQuotes::default(), persistence_with(None));
        harness.wait_for(|s| s.selected.is_some()).await;

        harness.handle.select("GOOGL").await.unwrap();
        harness
            .wait_for(|s| s.selected.as_ref().is_some_and(|x| x.as_str() == "GOOGL"))
            .await;

        assert!(harness.stream.token(0).is_cancelled());
        assert!(!harness.stream.token(1).is_cancelled());
        assert_eq!(harness.stream.symbols(), vec!["META", "GOOGL"]);

        // Events from the old subscription never reach the session.
        assert!(!harness.stream.sink(0).quote(1.0).await);
        harness.stop().await;
    }

    #[tokio::test]
    async fn stale_stream_event_is_ignored() {
        let harness = Harness::start(FakeQuotes::default(), persistence_with(None));
        harness.wait_for(|s| s.selected.is_some()).await;

        harness.handle.select("AAPL").await.unwrap();
        harness
            .wait_for(|s| s.selected.as_ref().is_some_and(|x| x.as_str() == "AAPL"))
            .await;

        // An event already in flight from the old connector still arrives.
        assert!(harness.raw_stale_quote(0, 1.0).await);
        harness.stream.sink(1).status(ConnectionState::Open).await;

        let snapshot = harness
            .wait_for(|s| s.connection == ConnectionState::Open)
            .await;
        assert!(snapshot.quote.is_none());
        harness.stop().await;
    }

    #[tokio::test]
    async fn first_poll_error_sticks_and_stream_error_wins() {
        let quotes = FakeQuotes::with_credential();
        quotes.set_quote("META", Err(PollError::Status(500)));
        let harness = Harness::start(quotes, persistence_with(None));

        let snapshot = harness.wait_for(|s| s.error.is_some()).await;
        assert_eq!(snapshot.error.as_deref(), Some(POLL_ERROR_MESSAGE));

        let sink = harness.stream.sink(0);
        sink.status(ConnectionState::Error).await;
        sink.error(StreamError::ConnectTimeout).await;

        let snapshot = harness
            .wait_for(|s| s.connection == ConnectionState::Error)
            .await;
        assert_eq!(
            snapshot.error.as_deref(),
            Some("Socket did not open (token/network/firewall?)")
        );
        harness.stop().await;
    }

    #[tokio::test]
    async fn stream_quote_clears_stream_error() {
        let harness = Harness::start(FakeQuotes::default(), persistence_with(None));
        harness.wait_for(|s| s.selected.is_some()).await;

        let sink = harness.stream.sink(0);
        sink.error(StreamError::Transport("reset".into())).await;
        harness.wait_for(|s| s.error.is_some()).await;

        sink.quote(321.0).await;
        let snapshot = harness.wait_for(|s| s.quote.is_some()).await;
        assert!(snapshot.error.is_none());
        harness.stop().await;
    }

    #[tokio::test]
    async fn removing_last_symbol_goes_idle() {
        let stored = Some(vec!["AAPL".to_string()]);
        let harness = Harness::start(FakeQuotes::default(), persistence_with(stored));
        harness.wait_for(|s| s.selected.is_some()).await;

        harness.handle.remove("aapl").await.unwrap();
        let snapshot = harness
            .wait_for(|s| s.watchlist.is_empty())
            .await;

        assert!(snapshot.selected.is_none());
        assert_eq!(snapshot.connection, ConnectionState::Idle);
        assert!(harness.stream.token(0).is_cancelled());
        harness.stop().await;
    }

    #[tokio::test]
    async fn add_persists_full_list() {
        let saved = Arc::new(Mutex::new(Vec::new()));
        let mut persistence = MockWatchlistPersistence::new();
        persistence.expect_load().returning(|| Ok(None));
        persistence.expect_save().returning({
            let saved = Arc::clone(&saved);
            move |symbols| {
                *saved.lock() = symbols.to_vec();
                Ok(())
            }
        });

        let harness = Harness::start(FakeQuotes::default(), persistence);
        harness.handle.add(" nvda ").await.unwrap();
        let snapshot = harness
            .wait_for(|s| s.selected.as_ref().is_some_and(|x| x.as_str() == "NVDA"))
            .await;

        assert_eq!(snapshot.watchlist.len(), 4);
        assert_eq!(*saved.lock(), vec!["META", "AAPL", "GOOGL", "NVDA"]);
        harness.stop().await;
    }

    #[tokio::test]
    async fn persistence_failure_is_swallowed() {
        let mut persistence = MockWatchlistPersistence::new();
        persistence.expect_load().returning(|| Ok(None));
        persistence.expect_save().returning(|_| {
            Err(PersistenceError::Io(std::io::Error::other("disk full")))
        });

        let harness = Harness::start(FakeQuotes::default(), persistence);
        harness.handle.add("TSLA").await.unwrap();
        let snapshot = harness
            .wait_for(|s| s.selected.as_ref().is_some_and(|x| x.as_str() == "TSLA"))
            .await;

        assert_eq!(snapshot.watchlist.len(), 4);
        harness.stop().await;
    }

    #[tokio::test]
    async fn save_does_not_block_the_runtime_thread() {
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let released = Arc::new(Mutex::new(None));

        let mut persistence = MockWatchlistPersistence::new();
        persistence.expect_load().returning(|| Ok(None));
        persistence.expect_save().returning({
            let released = Arc::clone(&released);
            move |_| {
                let _ = started_tx.send(());
                let outcome = release_rx.lock().recv_timeout(Duration::from_secs(2));
                *released.lock() = Some(outcome.is_ok());
                Ok(())
            }
        });

        let harness = Harness::start(FakeQuotes::default(), persistence);
        harness.handle.add("TSLA").await.unwrap();

        // Only reachable while the save is in flight if it runs off this thread.
        tokio::time::timeout(Duration::from_secs(1), started_rx.recv())
            .await
            .expect("save never started")
            .unwrap();
        release_tx.send(()).unwrap();

        let snapshot = harness
            .wait_for(|s| s.selected.as_ref().is_some_and(|x| x.as_str() == "TSLA"))
            .await;
        assert_eq!(snapshot.watchlist.len(), 4);
        assert_eq!(*released.lock(), Some(true));
        harness.stop().await;
    }

    #[tokio::test]
    async fn sidebar_without_credential_reports_token_hint() {
        let harness = Harness::start(FakeQuotes::default(), persistence_with(None));

        let snapshot = harness.wait_for(|s| s.sidebar_error.is_some()).await;

        assert_eq!(
            snapshot.sidebar_error.as_deref(),
            Some("Add STOCK_API token to load prices")
        );
        assert!(snapshot.sidebar.iter().all(|e| e.price.is_none()));
        harness.stop().await;
    }

    #[tokio::test]
    async fn sidebar_prices_all_symbols() {
        let quotes = FakeQuotes::with_credential();
        quotes.set_quote("META", polled(300.0, Some(300.0)));
        quotes.set_quote("AAPL", polled(198.0, Some(200.0)));
        quotes.set_quote("GOOGL", Err(PollError::Network("timeout".into())));
        let harness = Harness::start(quotes, persistence_with(None));

        let snapshot = harness
            .wait_for(|s| s.sidebar.iter().filter(|e| e.price.is_some()).count() == 2)
            .await;

        assert!((snapshot.sidebar[1].change_percent.unwrap() + 1.0).abs() < 1e-9);
        assert!(snapshot.sidebar[2].price.is_none());
        assert!(snapshot.sidebar_error.is_some());
        harness.stop().await;
    }

    #[tokio::test]
    async fn company_name_follows_selection() {
        let quotes = FakeQuotes::with_credential();
        quotes.set_name("META", "Meta Platforms Inc");
        quotes.set_name("AAPL", "Apple Inc");
        let harness = Harness::start(quotes, persistence_with(None));

        harness
            .wait_for(|s| s.company_name.as_deref() == Some("Meta Platforms Inc"))
            .await;

        harness.handle.select("AAPL").await.unwrap();
        harness
            .wait_for(|s| s.company_name.as_deref() == Some("Apple Inc"))
            .await;
        harness.stop().await;
    }

    #[tokio::test]
    async fn shutdown_tears_down_subscription() {
        let harness = Harness::start(FakeQuotes::default(), persistence_with(None));
        harness.wait_for(|s| s.selected.is_some()).await;
        let token = harness.stream.token(0);
        let handle = harness.handle.clone();

        harness.stop().await;

        assert!(token.is_cancelled());
        assert_eq!(handle.snapshot().connection, ConnectionState::Closed);
        assert_eq!(handle.add("X").await, Err(SessionClosed));
    }
}
