// Streaming plugin contract
//
// A streamer owns one producer task that writes samples into a shared series
// collection. The host drives the lifecycle (`start`, `shutdown`), reads the
// collection under its lock and drains events from a channel.
//
// Shared plumbing lives in `StreamerBase`: the collection handle, the event
// channel, the lifecycle state and the cancellation token. Producer tasks get
// a `StreamerContext`, which is the only path through which they touch the
// collection.

use crate::series::{PlotDataMap, SharedDataMap};
use crate::streaming::parser::ParserFactory;
use crate::streaming::types::{StreamError, StreamResult, StreamState, StreamStats, StreamerEvent};
use async_trait::async_trait;
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default time a producer task gets to exit after cancellation
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A user-facing action offered by a streamer, e.g. "3 parse errors"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationAction {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Default)]
struct Counters {
    batches_written: AtomicU64,
    batches_refused: AtomicU64,
    parse_errors: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> StreamStats {
        StreamStats {
            batches_written: self.batches_written.load(Ordering::Relaxed),
            batches_refused: self.batches_refused.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
        }
    }
}

/// Receiving end of a streamer's events; clones share one queue.
///
/// Consecutive `DataReceived` events are coalesced: after one is queued, the
/// next is only sent once a receiver has taken the previous one. A consumer
/// that reads the collection after draining events sees every write.
#[derive(Debug, Clone)]
pub struct StreamerEvents {
    rx: Receiver<StreamerEvent>,
    data_pending: Arc<AtomicBool>,
}

impl StreamerEvents {
    /// Next queued event, without blocking
    pub fn try_recv(&self) -> Option<StreamerEvent> {
        let event = self.rx.try_recv().ok()?;
        if event == StreamerEvent::DataReceived {
            self.data_pending.store(false, Ordering::SeqCst);
        }
        Some(event)
    }

    /// Every event queued right now
    pub fn try_iter(&self) -> impl Iterator<Item = StreamerEvent> + '_ {
        std::iter::from_fn(move || self.try_recv())
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// State shared by every streamer implementation
pub struct StreamerBase {
    name: String,
    data: SharedDataMap,
    events_tx: Sender<StreamerEvent>,
    events: StreamerEvents,
    state: Arc<RwLock<StreamState>>,
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
    parsers: Option<Arc<ParserFactory>>,
    notification_label: String,
    notifications: Arc<AtomicUsize>,
    counters: Arc<Counters>,
    shutdown_grace: Duration,
}

impl StreamerBase {
    pub fn new(name: impl Into<String>) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            name: name.into(),
            data: SharedDataMap::default(),
            events_tx,
            events: StreamerEvents {
                rx: events_rx,
                data_pending: Arc::new(AtomicBool::new(false)),
            },
            state: Arc::new(RwLock::new(StreamState::Stopped)),
            cancel_token: CancellationToken::new(),
            task: None,
            parsers: None,
            notification_label: "Notifications".to_string(),
            notifications: Arc::new(AtomicUsize::new(0)),
            counters: Arc::new(Counters::default()),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Label shown next to the outstanding notification count
    pub fn with_notification_label(mut self, label: impl Into<String>) -> Self {
        self.notification_label = label.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_map(&self) -> &SharedDataMap {
        &self.data
    }

    /// Receiver for this streamer's events
    pub fn events(&self) -> StreamerEvents {
        self.events.clone()
    }

    pub fn state(&self) -> StreamState {
        *self.state.read()
    }

    pub fn is_running(&self) -> bool {
        self.state() == StreamState::Running
    }

    pub fn stats(&self) -> StreamStats {
        self.counters.snapshot()
    }

    pub fn set_maximum_range_x(&self, range: f64) {
        self.data.set_maximum_range_x(range);
    }

    pub fn set_available_parsers(&mut self, factory: Arc<ParserFactory>) {
        self.parsers = Some(factory);
    }

    /// The parser factory, or `None` when absent or empty
    pub fn available_parsers(&self) -> Option<Arc<ParserFactory>> {
        self.parsers
            .as_ref()
            .filter(|factory| !factory.is_empty())
            .cloned()
    }

    pub fn notification_action(&self) -> Option<NotificationAction> {
        match self.notifications.load(Ordering::Relaxed) {
            0 => None,
            count => Some(NotificationAction {
                label: self.notification_label.clone(),
                count,
            }),
        }
    }

    /// The user looked at the notifications; reset the counter
    pub fn acknowledge_notifications(&self) {
        if self.notifications.swap(0, Ordering::Relaxed) > 0 {
            let _ = self
                .events_tx
                .send(StreamerEvent::NotificationsChanged { count: 0 });
        }
    }

    pub fn set_shutdown_grace(&mut self, grace: Duration) {
        self.shutdown_grace = grace;
    }

    /// Move from `Stopped` to `Starting`.
    ///
    /// Implementations call this first in `start` and follow up with either
    /// [`launch`](Self::launch) or [`abort_start`](Self::abort_start).
    pub fn begin_start(&mut self) -> StreamResult<()> {
        {
            let mut state = self.state.write();
            if state.is_active() {
                return Err(StreamError::AlreadyRunning);
            }
            *state = StreamState::Starting;
        }
        // A task that ended on its own leaves a finished handle behind
        self.task = None;
        self.cancel_token = CancellationToken::new();
        log::info!("Starting streamer '{}'", self.name);
        Ok(())
    }

    /// Give up a start that failed before the producer task was spawned
    pub fn abort_start(&mut self, error: &StreamError) {
        log::warn!("Streamer '{}' failed to start: {}", self.name, error);
        *self.state.write() = StreamState::Stopped;
    }

    /// Context handed to the producer task
    pub fn context(&self) -> StreamerContext {
        StreamerContext {
            name: self.name.clone(),
            data: self.data.clone(),
            events: self.events_tx.clone(),
            data_pending: Arc::clone(&self.events.data_pending),
            cancel_token: self.cancel_token.clone(),
            notifications: Arc::clone(&self.notifications),
            counters: Arc::clone(&self.counters),
        }
    }

    /// Spawn the producer task and move to `Running`.
    ///
    /// When the task returns on its own (end of file, socket error) the
    /// streamer raises `Closed` and falls back to `Stopped`.
    pub fn launch<F>(&mut self, producer: F)
    where
        F: Future<Output = StreamResult<()>> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let events = self.events_tx.clone();
        let cancel_token = self.cancel_token.clone();
        let name = self.name.clone();

        self.task = Some(tokio::spawn(async move {
            let result = producer.await;
            if let Err(e) = &result {
                log::warn!("Streamer '{}' task failed: {}", name, e);
            }
            // Shutdown owns the state transition once cancellation started
            if !cancel_token.is_cancelled() {
                let _ = events.send(StreamerEvent::Closed);
                let mut state = state.write();
                if state.is_active() {
                    *state = StreamState::Stopped;
                    let _ = events.send(StreamerEvent::RunStatusChanged {
                        streamer: name.clone(),
                        running: false,
                    });
                }
            }
            log::debug!("Streamer '{}' task finished", name);
        }));

        let mut state = self.state.write();
        if *state == StreamState::Starting {
            *state = StreamState::Running;
            let _ = self.events_tx.send(StreamerEvent::RunStatusChanged {
                streamer: self.name.clone(),
                running: true,
            });
            log::info!("Streamer '{}' running", self.name);
        }
    }

    /// Cancel the producer task and wait for it to finish.
    ///
    /// Waits up to the grace period, then aborts the task. In both cases the
    /// task has completed when this returns. Safe to call when stopped.
    pub async fn shutdown_task(&mut self) -> StreamResult<()> {
        let was_running = {
            let mut state = self.state.write();
            let was_running = *state == StreamState::Running;
            if state.is_active() {
                *state = StreamState::Stopping;
            }
            was_running
        };

        self.cancel_token.cancel();

        if let Some(mut handle) = self.task.take() {
            log::info!("Stopping streamer '{}'", self.name);
            if tokio::time::timeout(self.shutdown_grace, &mut handle)
                .await
                .is_err()
            {
                log::warn!(
                    "Streamer '{}' did not stop within {:?}, aborting",
                    self.name,
                    self.shutdown_grace
                );
                handle.abort();
                if let Err(e) = handle.await {
                    if !e.is_cancelled() {
                        log::warn!("Streamer '{}' task panicked: {}", self.name, e);
                    }
                }
            }
        }

        *self.state.write() = StreamState::Stopped;
        if was_running {
            let _ = self.events_tx.send(StreamerEvent::RunStatusChanged {
                streamer: self.name.clone(),
                running: false,
            });
            log::info!("Streamer '{}' stopped", self.name);
        }
        Ok(())
    }
}

impl std::fmt::Debug for StreamerBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamerBase")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("parsers", &self.parsers)
            .finish()
    }
}

/// Handle through which a producer task writes data and raises events
#[derive(Debug, Clone)]
pub struct StreamerContext {
    name: String,
    data: SharedDataMap,
    events: Sender<StreamerEvent>,
    data_pending: Arc<AtomicBool>,
    cancel_token: CancellationToken,
    notifications: Arc<AtomicUsize>,
    counters: Arc<Counters>,
}

impl StreamerContext {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `write` on the collection inside one critical section.
    ///
    /// Returns `None` without calling `write` once shutdown was requested,
    /// so nothing is written after `shutdown()` begins.
    pub fn write_batch<R>(&self, write: impl FnOnce(&mut PlotDataMap) -> R) -> Option<R> {
        let result = {
            let mut map = self.data.lock();
            if self.cancel_token.is_cancelled() {
                self.counters.batches_refused.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            write(&mut map)
        };
        self.counters.batches_written.fetch_add(1, Ordering::Relaxed);
        self.data_received();
        Some(result)
    }

    /// Like [`write_batch`](Self::write_batch) for writes that can fail.
    ///
    /// A failed write is expected to leave the collection untouched; it is
    /// not counted as a batch and raises no `DataReceived`.
    pub fn try_write_batch<R, E>(
        &self,
        write: impl FnOnce(&mut PlotDataMap) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        let result = {
            let mut map = self.data.lock();
            if self.cancel_token.is_cancelled() {
                self.counters.batches_refused.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            write(&mut map)
        };
        if result.is_ok() {
            self.counters.batches_written.fetch_add(1, Ordering::Relaxed);
            self.data_received();
        }
        Some(result)
    }

    /// Drop every buffered sample.
    ///
    /// The event is queued while the lock is held so the consumer never sees
    /// data written after the clear without also seeing the event.
    pub fn clear_buffers(&self) -> bool {
        let mut map = self.data.lock();
        if self.cancel_token.is_cancelled() {
            return false;
        }
        map.clear();
        self.emit(StreamerEvent::BuffersCleared);
        true
    }

    /// Remove every channel of `group`, returning the removed names
    pub fn remove_group(&self, group: &str) -> Vec<String> {
        let mut map = self.data.lock();
        if self.cancel_token.is_cancelled() {
            return Vec::new();
        }
        let removed = map.remove_group(group);
        self.emit(StreamerEvent::GroupRemoved {
            group: group.to_string(),
        });
        removed
    }

    /// Record a recoverable problem the user should see
    pub fn notify(&self) {
        let count = self.notifications.fetch_add(1, Ordering::Relaxed) + 1;
        self.emit(StreamerEvent::NotificationsChanged { count });
    }

    pub fn record_parse_error(&self) {
        self.counters.parse_errors.fetch_add(1, Ordering::Relaxed);
        self.notify();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Resolves once shutdown was requested
    pub async fn cancelled(&self) {
        self.cancel_token.cancelled().await
    }

    fn data_received(&self) {
        if !self.data_pending.swap(true, Ordering::SeqCst) {
            self.emit(StreamerEvent::DataReceived);
        }
    }

    fn emit(&self, event: StreamerEvent) {
        // The base keeps a receiver alive, so sending only fails after drop
        let _ = self.events.send(event);
    }
}

/// Contract implemented by every data source plugin
#[async_trait]
pub trait DataStreamer: Send + Sync {
    fn base(&self) -> &StreamerBase;

    fn base_mut(&mut self) -> &mut StreamerBase;

    /// Connect to the source and spawn the producer task.
    ///
    /// On error the streamer stays `Stopped`.
    async fn start(&mut self, args: &[String]) -> StreamResult<()>;

    /// Stop the producer task; bounded by the grace period
    async fn shutdown(&mut self) -> StreamResult<()> {
        self.base_mut().shutdown_task().await
    }

    fn name(&self) -> &str {
        self.base().name()
    }

    fn is_running(&self) -> bool {
        self.base().is_running()
    }

    fn notification_action(&self) -> Option<NotificationAction> {
        self.base().notification_action()
    }

    fn data_map(&self) -> SharedDataMap {
        self.base().data_map().clone()
    }

    fn events(&self) -> StreamerEvents {
        self.base().events()
    }

    fn set_maximum_range_x(&self, range: f64) {
        self.base().set_maximum_range_x(range);
    }

    fn set_available_parsers(&mut self, factory: Arc<ParserFactory>) {
        self.base_mut().set_available_parsers(factory);
    }

    fn available_parsers(&self) -> Option<Arc<ParserFactory>> {
        self.base().available_parsers()
    }

    fn acknowledge_notifications(&self) {
        self.base().acknowledge_notifications();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes one sample per millisecond until cancelled
    struct Ticker {
        base: StreamerBase,
    }

    impl Ticker {
        fn new() -> Self {
            Self {
                base: StreamerBase::new("ticker"),
            }
        }
    }

    #[async_trait]
    impl DataStreamer for Ticker {
        fn base(&self) -> &StreamerBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut StreamerBase {
            &mut self.base
        }

        async fn start(&mut self, args: &[String]) -> StreamResult<()> {
            self.base.begin_start()?;
            if args.iter().any(|a| a == "fail=true") {
                let error = StreamError::Connection("refused".to_string());
                self.base.abort_start(&error);
                return Err(error);
            }
            let ctx = self.base.context();
            self.base.launch(async move {
                let mut t = 0.0;
                loop {
                    tokio::select! {
                        biased;
                        _ = ctx.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_millis(1)) => {
                            ctx.write_batch(|map| map.add_sample("tick", None, t, 1.0.into()));
                            t += 1.0;
                        }
                    }
                }
                Ok(())
            });
            Ok(())
        }
    }

    fn drain(rx: &StreamerEvents) -> Vec<StreamerEvent> {
        rx.try_iter().collect()
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let mut ticker = Ticker::new();
        let events = ticker.events();
        assert!(!ticker.is_running());

        ticker.start(&[]).await.unwrap();
        assert!(ticker.is_running());
        assert!(matches!(
            ticker.start(&[]).await,
            Err(StreamError::AlreadyRunning)
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        ticker.shutdown().await.unwrap();
        assert!(!ticker.is_running());
        assert_eq!(ticker.base().state(), StreamState::Stopped);

        let received = drain(&events);
        assert!(received.contains(&StreamerEvent::RunStatusChanged {
            streamer: "ticker".to_string(),
            running: true
        }));
        assert_eq!(
            received.last(),
            Some(&StreamerEvent::RunStatusChanged {
                streamer: "ticker".to_string(),
                running: false
            })
        );

        // No writes after shutdown returned
        let count = ticker.data_map().lock().sample_count();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(ticker.data_map().lock().sample_count(), count);

        // Restartable
        ticker.start(&[]).await.unwrap();
        ticker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_start_stays_stopped() {
        let mut ticker = Ticker::new();
        assert!(ticker.start(&["fail=true".to_string()]).await.is_err());
        assert_eq!(ticker.base().state(), StreamState::Stopped);
        ticker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_when_stopped() {
        let mut ticker = Ticker::new();
        ticker.shutdown().await.unwrap();
        ticker.shutdown().await.unwrap();
        assert!(drain(&ticker.events()).is_empty());
    }

    #[tokio::test]
    async fn test_stubborn_task_is_aborted() {
        let mut base = StreamerBase::new("stubborn");
        base.set_shutdown_grace(Duration::from_millis(20));
        base.begin_start().unwrap();
        base.launch(async {
            // Ignores cancellation
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });

        let started = std::time::Instant::now();
        base.shutdown_task().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(base.state(), StreamState::Stopped);
    }

    #[tokio::test]
    async fn test_task_ending_on_its_own() {
        let mut base = StreamerBase::new("oneshot");
        base.begin_start().unwrap();
        base.launch(async { Ok(()) });

        for _ in 0..100 {
            if !base.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(base.state(), StreamState::Stopped);
        assert!(drain(&base.events()).contains(&StreamerEvent::Closed));
        base.begin_start().unwrap();
    }

    #[tokio::test]
    async fn test_failed_task_raises_closed() {
        let mut base = StreamerBase::new("lost");
        let events = base.events();
        base.begin_start().unwrap();
        base.launch(async { Err(StreamError::Network("connection lost".to_string())) });

        for _ in 0..100 {
            if !base.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(base.state(), StreamState::Stopped);
        let received = drain(&events);
        assert!(received.contains(&StreamerEvent::Closed));
        assert!(received.contains(&StreamerEvent::RunStatusChanged {
            streamer: "lost".to_string(),
            running: false
        }));
    }

    #[tokio::test]
    async fn test_shutdown_does_not_raise_closed() {
        let mut ticker = Ticker::new();
        let events = ticker.events();
        ticker.start(&[]).await.unwrap();
        ticker.shutdown().await.unwrap();
        assert!(!drain(&events).contains(&StreamerEvent::Closed));
    }

    #[test]
    fn test_data_received_coalesced() {
        let base = StreamerBase::new("burst");
        let events = base.events();
        let ctx = base.context();
        for i in 0..1000 {
            ctx.write_batch(|map| map.add_sample("x", None, i as f64, 1.0.into()));
        }
        assert_eq!(events.len(), 1);
        assert_eq!(drain(&events), vec![StreamerEvent::DataReceived]);

        // Taking the event re-arms the notification
        ctx.write_batch(|map| map.add_sample("x", None, 1000.0, 1.0.into()));
        assert_eq!(drain(&events), vec![StreamerEvent::DataReceived]);
        assert_eq!(base.stats().batches_written, 1001);
    }

    #[test]
    fn test_write_refused_after_cancel() {
        let mut base = StreamerBase::new("ctx");
        base.begin_start().unwrap();
        let ctx = base.context();
        assert!(ctx.write_batch(|map| map.len()).is_some());
        base.cancel_token.cancel();
        assert!(ctx.write_batch(|map| map.len()).is_none());
        assert!(!ctx.clear_buffers());
        assert_eq!(base.stats().batches_refused, 1);
    }

    #[test]
    fn test_notifications() {
        let base = StreamerBase::new("n").with_notification_label("Parse errors");
        let ctx = base.context();
        assert!(base.notification_action().is_none());

        ctx.record_parse_error();
        ctx.record_parse_error();
        assert_eq!(
            base.notification_action(),
            Some(NotificationAction {
                label: "Parse errors".to_string(),
                count: 2
            })
        );
        assert_eq!(base.stats().parse_errors, 2);

        base.acknowledge_notifications();
        assert!(base.notification_action().is_none());
        assert_eq!(
            drain(&base.events()).last(),
            Some(&StreamerEvent::NotificationsChanged { count: 0 })
        );
    }

    #[test]
    fn test_available_parsers() {
        let mut base = StreamerBase::new("p");
        assert!(base.available_parsers().is_none());
        base.set_available_parsers(Arc::new(ParserFactory::new()));
        assert!(base.available_parsers().is_none());
        base.set_available_parsers(Arc::new(ParserFactory::with_builtins()));
        assert!(base.available_parsers().is_some());
    }

    #[test]
    fn test_group_removal_event() {
        let base = StreamerBase::new("g");
        let ctx = base.context();
        ctx.write_batch(|map| {
            map.add_sample("imu/x", Some("imu"), 0.0, 1.0.into()).unwrap();
            map.add_sample("gps/lat", Some("gps"), 0.0, 1.0.into()).unwrap();
        });
        assert_eq!(ctx.remove_group("imu"), vec!["imu/x".to_string()]);
        assert_eq!(base.data_map().lock().channel_names(), vec!["gps/lat"]);
        assert!(drain(&base.events()).contains(&StreamerEvent::GroupRemoved {
            group: "imu".to_string()
        }));
    }
}
