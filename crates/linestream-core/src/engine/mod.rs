//! Stream engine
//!
//! Owns the Idle/Running/Paused/Stopped state machine and drives the
//! read-recover loop over one connection at a time.
//!
//! ```no_run
//! use linestream_core::{Credentials, RequestDescriptor, StreamEngine};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), linestream_core::StreamError> {
//! let credentials = Arc::new(Credentials::user("ck", "cs", "at", "ats"));
//! let url = url::Url::parse("https://stream.example.com/1.1/sample.json").unwrap();
//! let engine = StreamEngine::new(
//!     move || RequestDescriptor::get(url.clone()).with_credentials(credentials.clone()),
//!     |message| {
//!         println!("{}", message);
//!         true
//!     },
//! );
//! engine.start().await
//! # }
//! ```

mod run;
mod state;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use state::StreamState;

use self::state::StateCell;
use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::events::{EventHub, LifecycleEvent};
use crate::request::{GrantType, RequestDescriptor, RequestFactory};
use crate::transport::{ConnectionOpener, HttpConnectionOpener};
use crate::validate::{self, LineValidator};

type MessageHandler = Box<dyn FnMut(&str) -> bool + Send>;
type BeforeConnectHook = Arc<dyn Fn(&mut BeforeConnect<'_>) + Send + Sync>;

/// Passed to the before-connect hook ahead of every connection attempt
pub struct BeforeConnect<'a> {
    pub request: &'a RequestDescriptor,
    /// 1 for the initial connection, incremented on every reconnection
    pub attempt: u32,
    cancelled: bool,
}

impl<'a> BeforeConnect<'a> {
    fn new(request: &'a RequestDescriptor, attempt: u32) -> Self {
        Self {
            request,
            attempt,
            cancelled: false,
        }
    }

    /// Skip this attempt; the engine stops without an error
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// Handle to a streaming engine
///
/// Cheap to clone; clones control the same stream, so `pause`, `resume` and
/// `stop` can be called from any task while another awaits `start`.
#[derive(Clone)]
pub struct StreamEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    request_factory: RequestFactory,
    on_message: Mutex<MessageHandler>,
    validator: LineValidator,
    opener: Arc<dyn ConnectionOpener>,
    before_connect: Option<BeforeConnectHook>,
    config: StreamConfig,
    events: EventHub,
    state: StateCell,
    cancellation: Mutex<CancellationToken>,
    /// Set while a read loop is active
    looping: AtomicBool,
    /// Bumped by every `stop()`; lets `start` notice a stop issued mid-startup
    stop_requests: AtomicU64,
}

impl StreamEngine {
    /// Engine over HTTP with default configuration
    ///
    /// `request_factory` is called once per connection attempt. `on_message`
    /// receives every well-formed message; returning `false` stops the stream.
    pub fn new<F, M>(request_factory: F, on_message: M) -> Self
    where
        F: Fn() -> RequestDescriptor + Send + Sync + 'static,
        M: FnMut(&str) -> bool + Send + 'static,
    {
        Self::builder(request_factory, on_message).build()
    }

    pub fn builder<F, M>(request_factory: F, on_message: M) -> StreamEngineBuilder
    where
        F: Fn() -> RequestDescriptor + Send + Sync + 'static,
        M: FnMut(&str) -> bool + Send + 'static,
    {
        StreamEngineBuilder {
            request_factory: Arc::new(request_factory),
            on_message: Box::new(on_message),
            validator: validate::json_records(),
            opener: None,
            before_connect: None,
            config: StreamConfig::default(),
            events: EventHub::new(),
        }
    }

    pub fn state(&self) -> StreamState {
        self.inner.state.snapshot().state
    }

    /// Whether the engine has never entered `Running`
    pub fn is_new(&self) -> bool {
        self.inner.state.snapshot().is_new
    }

    /// Hub on which lifecycle events are raised
    pub fn events(&self) -> &EventHub {
        &self.inner.events
    }

    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    /// Connect and process messages until the stream ends
    ///
    /// Completes when the handler returns `false`, on `stop()`, or on an
    /// unrecoverable error. Spawn it to run the stream in the background.
    /// Starting an engine that already ran and stopped does nothing, and a
    /// `stop()` issued while `start` is still setting up ends it before it
    /// connects.
    pub async fn start(&self) -> Result<(), StreamError> {
        let inner = &self.inner;
        let stop_epoch = inner.stop_requests.load(Ordering::SeqCst);

        let entry = inner.state.snapshot();
        if entry.state == StreamState::Stopped && !entry.is_new {
            debug!("Start ignored: stream already ran and was stopped");
            return Ok(());
        }

        if inner.looping.swap(true, Ordering::SeqCst) {
            return Err(StreamError::AlreadyRunning);
        }
        let _looping = scopeguard::guard(&inner.looping, |flag| {
            flag.store(false, Ordering::SeqCst);
        });

        inner.config.validate()?;
        // Must precede the factory call: any stop() from here on cancels this run
        let cancel = inner.reset_cancellation();

        let request = (inner.request_factory)();
        check_credentials(&request, inner.config.required_grant)?;

        let entered = inner.state.transition_when(
            |current| {
                current.state == entry.state
                    && inner.stop_requests.load(Ordering::SeqCst) == stop_epoch
            },
            StreamState::Running,
            || {
                inner.events.emit(LifecycleEvent::Started);
                info!("Stream state -> {}", StreamState::Running);
                inner.events.emit(LifecycleEvent::StateChanged {
                    state: StreamState::Running,
                    error: None,
                });
            },
        );
        if !entered {
            info!("Stream stopped before it started");
            return Ok(());
        }

        match inner.run_stream(request, &cancel).await {
            Ok(()) => {
                inner.set_state(StreamState::Stopped, None);
                Ok(())
            }
            Err(error) => {
                warn!("Stream terminated: {}", error);
                inner.set_state(StreamState::Stopped, Some(error.clone()));
                Err(error)
            }
        }
    }

    /// Stop delivering messages without closing the connection
    pub fn pause(&self) {
        self.inner.transition_from(StreamState::Running, StreamState::Paused);
    }

    /// Resume delivering messages after `pause`
    pub fn resume(&self) {
        self.inner.transition_from(StreamState::Paused, StreamState::Running);
    }

    /// Close the connection and stop the stream; idempotent
    pub fn stop(&self) {
        self.inner.stop_requests.fetch_add(1, Ordering::SeqCst);
        self.inner.cancellation.lock().cancel();
        self.inner.set_state(StreamState::Stopped, None);
    }
}

impl EngineInner {
    fn state(&self) -> StreamState {
        self.state.snapshot().state
    }

    /// The single place where state changes; equal states are ignored
    fn set_state(&self, state: StreamState, error: Option<StreamError>) {
        self.state.transition(None, state, || {
            info!("Stream state -> {}", state);
            self.events.emit(LifecycleEvent::StateChanged { state, error });
        });
    }

    fn transition_from(&self, from: StreamState, to: StreamState) {
        let changed = self.state.transition(Some(from), to, || {
            info!("Stream state -> {}", to);
            self.events.emit(LifecycleEvent::StateChanged {
                state: to,
                error: None,
            });
        });
        if !changed {
            debug!("Ignoring {} request while {}", to, self.state());
        }
    }

    /// Fresh token for a new run
    fn reset_cancellation(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancellation.lock() = token.clone();
        token
    }
}

fn check_credentials(request: &RequestDescriptor, required: GrantType) -> Result<(), StreamError> {
    let credentials = request
        .credentials
        .as_ref()
        .ok_or(StreamError::MissingCredentials)?;
    if !credentials.grants(required) {
        return Err(StreamError::UnauthorizedCredentials { required });
    }
    Ok(())
}

/// Configures a [`StreamEngine`]
pub struct StreamEngineBuilder {
    request_factory: RequestFactory,
    on_message: MessageHandler,
    validator: LineValidator,
    opener: Option<Arc<dyn ConnectionOpener>>,
    before_connect: Option<BeforeConnectHook>,
    config: StreamConfig,
    events: EventHub,
}

impl StreamEngineBuilder {
    pub fn config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Predicate deciding whether a non-blank line is a well-formed message
    pub fn validator<V>(mut self, validator: V) -> Self
    where
        V: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.validator = Arc::new(validator);
        self
    }

    /// Replace the HTTP opener, e.g. with a proxy-aware or in-memory one
    pub fn opener(mut self, opener: Arc<dyn ConnectionOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    /// Inspect or cancel every connection attempt before it is made
    pub fn before_connect<H>(mut self, hook: H) -> Self
    where
        H: Fn(&mut BeforeConnect<'_>) + Send + Sync + 'static,
    {
        self.before_connect = Some(Arc::new(hook));
        self
    }

    /// Raise events on an existing hub
    pub fn events(mut self, events: EventHub) -> Self {
        self.events = events;
        self
    }

    pub fn build(self) -> StreamEngine {
        let opener = self.opener.unwrap_or_else(|| {
            Arc::new(HttpConnectionOpener::new(self.config.max_error_body_bytes))
        });

        StreamEngine {
            inner: Arc::new(EngineInner {
                request_factory: self.request_factory,
                on_message: Mutex::new(self.on_message),
                validator: self.validator,
                opener,
                before_connect: self.before_connect,
                config: self.config,
                events: self.events,
                state: StateCell::new(),
                cancellation: Mutex::new(CancellationToken::new()),
                looping: AtomicBool::new(false),
                stop_requests: AtomicU64::new(0),
            }),
        }
    }
}
