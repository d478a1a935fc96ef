// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The application-facing client.
//!
//! [`EdgeLog`] is a cheap handle (an `Arc`) owning the pipeline context:
//! router, local sink and, when an API key is configured, the batch scheduler
//! with its transmitter. Producing calls never block and never fail loudly;
//! at worst an event is rejected by the acceptance filter.

use std::cell::Cell;
use std::fmt::Display;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::log_level::Level;
use crate::config::runtime::RuntimeSettings;
use crate::config::Config;
use crate::edge::http::HttpConnector;
use crate::edge::transmitter::Transmitter;
use crate::edge::transport::EdgeConnector;
use crate::error::ClientError;
use crate::logs::completion::CompletionTracker;
use crate::logs::constants::ERROR_TAG;
use crate::logs::event::{Event, EventKind, Location, Record};
use crate::logs::local::{format_text, LocalSink};
use crate::logs::router::{Router, RouterHandle};
use crate::logs::scheduler::BatchScheduler;
use crate::tags::{TagStore, Tags};

/// Upper bound on the flush performed before a fatal event panics.
const FATAL_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

thread_local! {
    /// Set right before a fatal event panics so the panic hook does not
    /// record the same message again.
    static FATAL_RECORDED: Cell<bool> = const { Cell::new(false) };
}

struct Inner {
    router: RouterHandle,
    tracker: CompletionTracker,
    settings: Arc<RuntimeSettings>,
    tags: Arc<TagStore>,
    cancel_token: CancellationToken,
    panic_hook: AtomicBool,
}

/// Handle to a running log pipeline.
#[derive(Clone)]
pub struct EdgeLog {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EdgeLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeLog")
            .field("pending", &self.pending())
            .field("level", &self.level())
            .field("verbosity", &self.verbosity())
            .finish()
    }
}

/// Configures the collaborators of a client before starting it.
pub struct Builder {
    config: Config,
    connector: Option<Arc<dyn EdgeConnector>>,
    writer: Option<Box<dyn Write + Send>>,
}

impl Builder {
    /// Replaces the HTTP binding, e.g. with an in-memory collector.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn EdgeConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replaces stdout as the local sink.
    #[must_use]
    pub fn writer(mut self, writer: impl Write + Send + 'static) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Spawns the pipeline workers on the current tokio runtime.
    pub fn start(self) -> Result<EdgeLog, ClientError> {
        let config = self.config;
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        let tracker = CompletionTracker::new();
        let settings = Arc::new(RuntimeSettings::new(config.log_level, config.log_verbosity));
        let tags = Arc::new(TagStore::new());
        let cancel_token = CancellationToken::new();

        let writer = self
            .writer
            .unwrap_or_else(|| Box::new(std::io::stdout()) as Box<dyn Write + Send>);
        let (local_sink, local_tx) = LocalSink::new(
            config.local_queue_capacity,
            writer,
            config.log_json,
            tracker.clone(),
        );
        runtime.spawn(local_sink.run());

        let edge = match &config.api_key {
            Some(api_key) => {
                let connector = self.connector.unwrap_or_else(|| {
                    Arc::new(HttpConnector::new(
                        &config.edge_address,
                        config.edge_cert.clone(),
                        config.request_timeout,
                    ))
                });
                let transmitter = Transmitter::new(
                    connector,
                    api_key.clone(),
                    Arc::clone(&tags),
                    Arc::clone(&settings),
                    tracker.clone(),
                    config.retry_limit,
                );
                let (scheduler, edge_tx, flush) = BatchScheduler::new(
                    config.edge_queue_capacity,
                    transmitter,
                    local_tx.clone(),
                    Arc::clone(&settings),
                    tracker.clone(),
                    config.flush_interval,
                    cancel_token.clone(),
                );
                runtime.spawn(scheduler.run());
                Some((edge_tx, flush))
            }
            None => {
                debug!("No API key configured, logging locally only");
                None
            }
        };

        let (router, handle) = Router::new(
            local_tx,
            edge,
            Arc::clone(&settings),
            config.log_local,
            tracker.clone(),
            cancel_token.clone(),
        );
        runtime.spawn(router.run());

        Ok(EdgeLog {
            inner: Arc::new(Inner {
                router: handle,
                tracker,
                settings,
                tags,
                cancel_token,
                panic_hook: AtomicBool::new(false),
            }),
        })
    }
}

impl EdgeLog {
    #[must_use]
    pub fn builder(config: Config) -> Builder {
        Builder {
            config,
            connector: None,
            writer: None,
        }
    }

    /// Starts a client with the HTTP binding and stdout as local sink.
    pub fn start(config: Config) -> Result<Self, ClientError> {
        Self::builder(config).start()
    }

    /// Submits an event. Returns `false` when the acceptance filter rejected
    /// it or the pipeline is shut down.
    ///
    /// A fatal event flushes the pipeline (bounded by a few seconds) and then
    /// panics with the rendered event.
    pub fn emit(&self, event: Event) -> bool {
        if let EventKind::Structured(record) = &event.kind {
            if !self.inner.settings.accepts(record.level, record.verbosity) {
                return false;
            }
        }

        let rendered = (event.level() == Some(Level::Fatal)).then(|| format_text(&event));

        self.inner.tracker.add(1);
        if self.inner.router.send(Arc::new(event)).is_err() {
            self.inner.tracker.done(1);
            return false;
        }

        if let Some(rendered) = rendered {
            self.flush_blocking(Some(FATAL_FLUSH_TIMEOUT));
            if self.inner.panic_hook.load(Ordering::Relaxed) {
                FATAL_RECORDED.with(|recorded| recorded.set(true));
            }
            panic!("{rendered}");
        }
        true
    }

    /// Starts a structured event at the caller's location.
    #[track_caller]
    #[must_use]
    pub fn event(&self, level: Level) -> EventBuilder<'_> {
        EventBuilder {
            client: self,
            location: Location::caller(),
            level,
            verbosity: 0,
            tags: Tags::new(),
        }
    }

    #[track_caller]
    pub fn log(&self, level: Level, msg: impl Into<String>) -> bool {
        self.event(level).msg(msg)
    }

    #[track_caller]
    pub fn debug(&self, msg: impl Into<String>) -> bool {
        self.event(Level::Debug).msg(msg)
    }

    #[track_caller]
    pub fn info(&self, msg: impl Into<String>) -> bool {
        self.event(Level::Info).msg(msg)
    }

    #[track_caller]
    pub fn warn(&self, msg: impl Into<String>) -> bool {
        self.event(Level::Warn).msg(msg)
    }

    #[track_caller]
    pub fn error(&self, msg: impl Into<String>) -> bool {
        self.event(Level::Error).msg(msg)
    }

    /// Emits a fatal event, flushes and panics.
    #[track_caller]
    pub fn fatal(&self, msg: impl Into<String>) -> ! {
        let msg = msg.into();
        self.event(Level::Fatal).msg(msg.clone());
        // only reached when the event was filtered out or the pipeline is gone
        panic!("{msg}");
    }

    /// Submits an unstructured line. Raw lines bypass the acceptance filter.
    pub fn raw(&self, text: impl Into<String>) -> bool {
        self.emit(Event::raw(text))
    }

    /// Sets process-wide tags, synced to the collector with the next batch.
    pub fn global<I, K, V>(&self, tags: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Display,
    {
        self.inner.tags.set(tags);
    }

    #[must_use]
    pub fn global_tags(&self) -> Tags {
        self.inner.tags.snapshot()
    }

    pub fn set_level(&self, level: Level) {
        self.inner.settings.set_level(level);
    }

    #[must_use]
    pub fn level(&self) -> Level {
        self.inner.settings.level()
    }

    pub fn set_verbosity(&self, verbosity: i32) {
        self.inner.settings.set_verbosity(verbosity);
    }

    #[must_use]
    pub fn verbosity(&self) -> i32 {
        self.inner.settings.verbosity()
    }

    /// True once the collector rejected the API key.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.inner.settings.is_unauthorized()
    }

    /// Accepted events not yet written locally or acknowledged remotely,
    /// counted once per destination.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.tracker.pending()
    }

    fn request_flush(&self) {
        if self.inner.router.request_flush().is_err() {
            debug!("Flush requested after shutdown");
        }
    }

    /// Triggers a send and waits until every accepted event is done.
    pub async fn flush(&self) {
        self.request_flush();
        self.inner.tracker.wait().await;
    }

    /// Like [`EdgeLog::flush`], giving up after `timeout`. Returns `true` when
    /// everything was flushed.
    pub async fn flush_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.flush()).await.is_ok()
    }

    /// Flush for synchronous callers.
    ///
    /// On a multi-thread runtime worker the wait moves off the worker with
    /// `block_in_place`. On a current-thread runtime waiting would stall the
    /// very workers that have to make progress, so only the send is
    /// requested.
    pub fn flush_blocking(&self, timeout: Option<Duration>) -> bool {
        self.request_flush();
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::CurrentThread => {
                warn!("Cannot wait for a flush on a current-thread runtime");
                self.pending() == 0
            }
            Ok(_) => tokio::task::block_in_place(|| self.inner.tracker.wait_blocking(timeout)),
            Err(_) => self.inner.tracker.wait_blocking(timeout),
        }
    }

    /// Records panics as raw events and flushes before the previous hook
    /// runs. Panics raised by a fatal event are already recorded and only
    /// reach the previous hook.
    pub fn install_panic_hook(&self) {
        self.inner.panic_hook.store(true, Ordering::Relaxed);
        let client = self.clone();
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if !FATAL_RECORDED.with(|recorded| recorded.replace(false)) {
                let backtrace = std::backtrace::Backtrace::force_capture();
                client.raw(format!("{info}\n{backtrace}"));
                client.flush_blocking(Some(FATAL_FLUSH_TIMEOUT));
            }
            previous(info);
        }));
    }

    /// Forwards every line of `reader` as a raw event until EOF. Lines are
    /// trimmed and blank lines skipped. Returns the number of lines
    /// forwarded.
    pub async fn forward_lines<R>(&self, reader: R) -> std::io::Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut count = 0;
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if self.raw(line) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Stops the workers. Events already queued are still written locally
    /// and get one final delivery attempt; the rest are dropped.
    pub fn shutdown(&self) {
        self.inner.cancel_token.cancel();
    }
}

/// Fluent builder for one structured event.
#[must_use = "an event is only submitted by `msg`"]
pub struct EventBuilder<'a> {
    client: &'a EdgeLog,
    location: Location,
    level: Level,
    verbosity: i32,
    tags: Tags,
}

impl EventBuilder<'_> {
    /// Verbosity of the event. Lower is more important.
    pub fn v(mut self, verbosity: i32) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.tags.insert(key.into(), value.to_string());
        self
    }

    pub fn tags<I, K, V>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Display,
    {
        for (key, value) in tags {
            self.tags.insert(key.into(), value.to_string());
        }
        self
    }

    /// Attaches an error under the `error` tag.
    pub fn error(self, error: &dyn std::error::Error) -> Self {
        self.tag(ERROR_TAG, error)
    }

    /// Overrides the captured call site.
    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Submits the event. See [`EdgeLog::emit`].
    pub fn msg(self, msg: impl Into<String>) -> bool {
        self.client.emit(Event::structured(Record {
            location: self.location,
            level: self.level,
            verbosity: self.verbosity,
            message: msg.into(),
            tags: self.tags,
        }))
    }
}

/// Emits a structured event with a formatted message, capturing file,
/// module path and line of the call site.
///
/// ```ignore
/// edge_log!(client, Level::Info, "served {} in {}ms", path, elapsed);
/// ```
#[macro_export]
macro_rules! edge_log {
    ($client:expr, $level:expr, $($arg:tt)+) => {
        $client
            .event($level)
            .at($crate::Location::new(file!(), module_path!(), line!()))
            .msg(format!($($arg)+))
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn local_client(config: Config) -> (EdgeLog, SharedBuf) {
        let buf = SharedBuf::default();
        let client = EdgeLog::builder(config)
            .writer(buf.clone())
            .start()
            .unwrap();
        (client, buf)
    }

    #[test]
    fn test_start_requires_runtime() {
        assert!(matches!(
            EdgeLog::start(Config::default()),
            Err(ClientError::NoRuntime)
        ));
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let config = Config {
            retry_limit: 0,
            ..Default::default()
        };
        assert!(matches!(
            EdgeLog::start(config),
            Err(ClientError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_acceptance_filter() {
        let (client, buf) = local_client(Config {
            log_level: Level::Info,
            log_verbosity: 1,
            ..Default::default()
        });

        assert!(!client.debug("hidden"));
        assert!(client.info("shown"));
        assert!(!client.event(Level::Error).v(2).msg("too verbose"));
        assert!(client.event(Level::Error).v(1).msg("verbose enough"));
        assert!(client.raw("raw always passes"));

        client.set_level(Level::Debug);
        assert!(client.debug("now shown"));

        assert!(client.flush_timeout(Duration::from_secs(5)).await);
        let lines = buf.lines();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("shown"));
        assert_eq!(lines[2], "raw always passes");
    }

    #[tokio::test]
    async fn test_builder_tags_and_location() {
        let (client, buf) = local_client(Config::default());

        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let line = line!() + 1;
        client.event(Level::Warn).tag("attempt", 3).error(&err).msg("write failed");
        client.flush().await;

        let lines = buf.lines();
        assert!(lines[0].starts_with('W'));
        assert!(lines[0].contains(&format!("client.rs:{line} write failed")));
        assert!(lines[0].ends_with("attempt=3 error=disk full"));
    }

    #[tokio::test]
    async fn test_macro_captures_module() {
        let (client, buf) = local_client(Config {
            log_json: true,
            ..Default::default()
        });

        crate::edge_log!(client, Level::Info, "served {} in {}ms", "/", 12);
        client.flush().await;

        let value: serde_json::Value = serde_json::from_str(&buf.lines()[0]).unwrap();
        assert_eq!(value["msg"], "served / in 12ms");
        assert_eq!(value["file"], "client.rs");
        assert_eq!(value["type"], "info");
    }

    #[tokio::test]
    async fn test_forward_lines() {
        let (client, buf) = local_client(Config::default());
        let input: &[u8] = b"  first  \n\nsecond\n";

        let count = client.forward_lines(input).await.unwrap();
        client.flush().await;

        assert_eq!(count, 2);
        assert_eq!(buf.lines(), vec!["first", "second"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_flush_blocking_on_multi_thread_runtime() {
        let (client, buf) = local_client(Config::default());
        client.info("one");
        client.info("two");

        assert!(client.flush_blocking(Some(Duration::from_secs(5))));
        assert_eq!(buf.lines().len(), 2);
        assert_eq!(client.pending(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fatal_flushes_then_panics() {
        let (client, buf) = local_client(Config::default());
        client.info("before");

        let fatal_client = client.clone();
        let result = tokio::spawn(async move {
            fatal_client.fatal("cannot continue");
        })
        .await;

        assert!(result.unwrap_err().is_panic());
        let lines = buf.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with('F'));
        assert!(lines[1].ends_with("cannot continue"));
    }

    #[tokio::test]
    async fn test_emit_after_shutdown() {
        let (client, _buf) = local_client(Config::default());
        client.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!client.info("too late"));
        assert_eq!(client.pending(), 0);
    }
}
