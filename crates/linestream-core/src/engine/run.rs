//! Read-recover loop

use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{BeforeConnect, EngineInner, StreamState};
use crate::error::StreamError;
use crate::events::LifecycleEvent;
use crate::recovery::{RecoveryAction, RecoveryPolicy};
use crate::request::RequestDescriptor;
use crate::transport::{ConnectionHandle, ReadOutcome};

/// Per-run connection state, owned by the loop
struct Session {
    request: RequestDescriptor,
    /// At most one open connection; dropped on every exit path
    handle: Option<ConnectionHandle>,
    failures: u32,
    attempts: u32,
    last_status: Option<u16>,
}

impl Session {
    fn install(&mut self, handle: ConnectionHandle) {
        self.last_status = Some(handle.status());
        self.handle = Some(handle);
    }

    fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
    }
}

/// Whether the loop should keep going after a step
enum Flow {
    Continue,
    Stop,
}

/// Await `future` unless the run gets cancelled first
async fn unless_cancelled<T>(
    cancel: &CancellationToken,
    future: impl Future<Output = Result<T, StreamError>>,
) -> Result<Option<T>, StreamError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(None),
        result = future => result.map(Some),
    }
}

impl EngineInner {
    pub(super) async fn run_stream(
        &self,
        request: RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<(), StreamError> {
        let mut session = Session {
            request,
            handle: None,
            failures: 0,
            attempts: 1,
            last_status: None,
        };

        let Some(handle) = self.connect(&session.request, 1, cancel).await? else {
            return Ok(());
        };
        session.install(handle);

        let stall = self.config.stall_timeout();
        let poll_interval = self.config.pause_poll_interval();
        // Read while a pause landed; delivered first after resume
        let mut held: Option<String> = None;

        loop {
            match self.state() {
                StreamState::Stopped => break,
                StreamState::Paused => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                    continue;
                }
                StreamState::Idle | StreamState::Running => {}
            }

            if let Some(message) = held.take() {
                if let Flow::Stop = self.deliver(&message) {
                    break;
                }
                continue;
            }

            let outcome = match session.handle.as_mut().and_then(|h| h.reader_mut()) {
                Some(reader) => reader.read_line(stall, cancel).await,
                None => Ok(ReadOutcome::Closed),
            };

            let flow = match outcome {
                Ok(ReadOutcome::Cancelled) => {
                    debug!("Stream read interrupted by stop");
                    Flow::Stop
                }
                Ok(ReadOutcome::TimedOut) => {
                    return Err(StreamError::timeout(session.request.url.as_str(), stall));
                }
                Ok(ReadOutcome::KeepAlive) => {
                    // Not a message; leaves the failure count alone
                    self.events.emit(LifecycleEvent::KeepAliveReceived);
                    Flow::Continue
                }
                Ok(ReadOutcome::Line(line)) => {
                    if !(self.validator)(&line) {
                        return Err(StreamError::server(session.last_status, &line));
                    }
                    session.failures = 0;
                    match self.state() {
                        StreamState::Paused => {
                            held = Some(line);
                            Flow::Continue
                        }
                        StreamState::Stopped => Flow::Stop,
                        StreamState::Idle | StreamState::Running => self.deliver(&line),
                    }
                }
                Ok(ReadOutcome::Closed) => {
                    self.recover(&mut session, cancel, "stream closed by server".to_string())
                        .await?
                }
                Err(error) => {
                    if cancel.is_cancelled() {
                        debug!("Read failed after stop, ignoring: {}", error);
                        Flow::Stop
                    } else {
                        self.recover(&mut session, cancel, error.to_string()).await?
                    }
                }
            };

            if let Flow::Stop = flow {
                break;
            }
        }

        session.close();
        Ok(())
    }

    /// Hand a message to the consumer; `Stop` when it asks to end the stream
    fn deliver(&self, message: &str) -> Flow {
        let keep_going = {
            let mut on_message = self.on_message.lock();
            on_message(message)
        };

        if keep_going {
            Flow::Continue
        } else {
            info!("Message handler ended the stream");
            self.set_state(StreamState::Stopped, None);
            Flow::Stop
        }
    }

    /// Run the before-connect hook and open a connection
    ///
    /// `None` when the hook or a stop cancelled the attempt.
    async fn connect(
        &self,
        request: &RequestDescriptor,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Result<Option<ConnectionHandle>, StreamError> {
        if let Some(hook) = &self.before_connect {
            let mut before = BeforeConnect::new(request, attempt);
            hook(&mut before);
            if before.is_cancelled() {
                info!("Connection attempt {} cancelled before connecting", attempt);
                return Ok(None);
            }
        }

        info!(
            "Connecting stream (attempt {}): {} {}",
            attempt,
            request.method,
            request.endpoint()
        );
        unless_cancelled(cancel, self.opener.open(request)).await
    }

    async fn recover(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
        cause: String,
    ) -> Result<Flow, StreamError> {
        let action = RecoveryPolicy::decide(session.failures);
        warn!(
            "Stream read failed ({}), consecutive failures: {}, action: {:?}",
            cause, session.failures, action
        );

        match action {
            RecoveryAction::RetryRead => {}
            RecoveryAction::ReopenReader => {
                let Some(handle) = session.handle.as_mut() else {
                    return Err(StreamError::transport(session.last_status, cause));
                };
                let reopened = unless_cancelled(
                    cancel,
                    self.opener.reopen_reader(handle, &session.request),
                )
                .await?;
                if reopened.is_none() {
                    return Ok(Flow::Stop);
                }
                session.last_status = Some(handle.status());
            }
            RecoveryAction::ReopenConnection => {
                let request = (self.request_factory)();
                session.attempts += 1;
                // Release the broken connection before opening its replacement
                session.close();
                match self.connect(&request, session.attempts, cancel).await? {
                    Some(handle) => {
                        session.request = request;
                        session.install(handle);
                    }
                    None => return Ok(Flow::Stop),
                }
            }
            RecoveryAction::GiveUp => {
                return Err(StreamError::transport(session.last_status, cause));
            }
        }

        session.failures += 1;
        Ok(Flow::Continue)
    }
}
