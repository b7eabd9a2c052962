//! Stream state tracking

use parking_lot::ReentrantMutex;
use serde::Serialize;
use std::cell::Cell;

/// Lifecycle state of a stream engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum StreamState {
    #[default]
    Idle,
    Running,
    Paused,
    Stopped,
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamState::Idle => write!(f, "idle"),
            StreamState::Running => write!(f, "running"),
            StreamState::Paused => write!(f, "paused"),
            StreamState::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Lifecycle {
    pub state: StreamState,
    /// True until the engine first enters `Running`
    pub is_new: bool,
}

/// State shared between the read loop and control calls
///
/// Reentrant so listeners notified under the lock can call back into the
/// engine.
pub(crate) struct StateCell {
    inner: ReentrantMutex<Cell<Lifecycle>>,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            inner: ReentrantMutex::new(Cell::new(Lifecycle {
                state: StreamState::Idle,
                is_new: true,
            })),
        }
    }

    pub fn snapshot(&self) -> Lifecycle {
        self.inner.lock().get()
    }

    /// Move to `state` and run `notify` while still holding the lock
    ///
    /// No-op when already in `state`. `from`, when given, restricts the
    /// transition to that source state. Returns whether a transition happened.
    pub fn transition<F>(&self, from: Option<StreamState>, state: StreamState, notify: F) -> bool
    where
        F: FnOnce(),
    {
        self.transition_when(
            |current| from.map_or(true, |from| from == current.state),
            state,
            notify,
        )
    }

    /// Like [`transition`](Self::transition), gated on `allowed` evaluated under the lock
    pub fn transition_when<P, F>(&self, allowed: P, state: StreamState, notify: F) -> bool
    where
        P: FnOnce(Lifecycle) -> bool,
        F: FnOnce(),
    {
        let guard = self.inner.lock();
        let mut current = guard.get();

        if current.state == state || !allowed(current) {
            return false;
        }

        if state == StreamState::Running {
            current.is_new = false;
        }
        current.state = state;
        guard.set(current);

        notify();
        true
    }
}
