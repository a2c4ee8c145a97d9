//! Per-stream health state machine.
//!
//! Shared between the engine (read path) and the stream's reconnect task,
//! so every transition goes through [`StreamHealth::apply`] under one lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{StreamHealthState, StreamId};
use tracing::{debug, info, warn};

/// Health record shared with the stream's reconnect task
pub(crate) type SharedHealth = Arc<Mutex<StreamHealth>>;

pub(crate) fn lock_health(health: &SharedHealth) -> MutexGuard<'_, StreamHealth> {
    health.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Inputs driving the health state machine
#[derive(Debug, Clone, PartialEq)]
pub enum HealthEvent {
    /// A read returned a frame
    FrameRead,
    /// A read failed (or a Ready stream stalled)
    ReadFailed { reason: String },
    /// The init deadline passed while still Initializing
    DeadlineElapsed,
    /// The reconnect task started a reopen attempt
    RetryStarted,
    /// Reopen succeeded; a new init deadline applies
    Reopened { deadline: f64 },
    /// Open (initial or reopen) failed
    OpenFailed { reason: String },
    /// Operator reset
    Reset { deadline: f64 },
}

/// Health record of one stream
#[derive(Debug, Clone)]
pub struct StreamHealth {
    stream_id: StreamId,
    state: StreamHealthState,
    /// Init deadline on the shared clock while Initializing
    deadline: Option<f64>,
    /// Bumped on every successful reopen
    epoch: u64,
    last_error: Option<String>,
    /// Set when the engine must hand the stream to its reconnect task
    reconnect_requested: bool,
}

impl StreamHealth {
    pub fn new(stream_id: StreamId, deadline: f64) -> Self {
        Self {
            stream_id,
            state: StreamHealthState::Initializing,
            deadline: Some(deadline),
            epoch: 0,
            last_error: None,
            reconnect_requested: false,
        }
    }

    pub fn state(&self) -> StreamHealthState {
        self.state
    }

    pub fn deadline(&self) -> Option<f64> {
        self.deadline
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Re-arm the init deadline of a stream that has not produced yet
    pub fn arm_deadline(&mut self, deadline: f64) {
        if self.state == StreamHealthState::Initializing {
            self.deadline = Some(deadline);
        }
    }

    /// True once after the stream entered a state that needs a reopen
    pub fn take_reconnect_request(&mut self) -> bool {
        std::mem::take(&mut self.reconnect_requested)
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_requested
    }

    /// Apply an event; returns the new state when it changed
    pub fn apply(&mut self, event: HealthEvent) -> Option<StreamHealthState> {
        use StreamHealthState::*;

        let previous = self.state;
        let next = match (previous, &event) {
            (Initializing, HealthEvent::FrameRead) => Some(Ready),
            (Initializing, HealthEvent::DeadlineElapsed) => Some(Timeout),
            (Ready, HealthEvent::ReadFailed { .. }) => Some(Error),
            (Error | Timeout, HealthEvent::RetryStarted) => Some(Reconnecting),
            (Reconnecting, HealthEvent::Reopened { .. }) => Some(Initializing),
            (Initializing | Reconnecting, HealthEvent::OpenFailed { .. }) => Some(Error),
            (_, HealthEvent::Reset { .. }) => Some(Initializing),
            _ => None,
        };

        let Some(next) = next else {
            debug!(
                stream_id = self.stream_id,
                state = %previous,
                event = ?event,
                "health event ignored"
            );
            return None;
        };

        match event {
            HealthEvent::FrameRead => {
                self.deadline = None;
                self.last_error = None;
            }
            HealthEvent::ReadFailed { reason } | HealthEvent::OpenFailed { reason } => {
                self.deadline = None;
                self.last_error = Some(reason);
                self.reconnect_requested = true;
            }
            HealthEvent::DeadlineElapsed => {
                self.deadline = None;
                self.last_error = Some("init deadline elapsed".into());
                self.reconnect_requested = true;
            }
            HealthEvent::RetryStarted => {}
            HealthEvent::Reopened { deadline } => {
                self.epoch += 1;
                self.deadline = Some(deadline);
            }
            HealthEvent::Reset { deadline } => {
                self.deadline = Some(deadline);
                self.last_error = None;
                self.reconnect_requested = false;
            }
        }

        self.state = next;
        match next {
            Error | Timeout => warn!(
                stream_id = self.stream_id,
                from = %previous,
                to = %next,
                reason = self.last_error.as_deref().unwrap_or(""),
                "stream health degraded"
            ),
            _ => info!(
                stream_id = self.stream_id,
                from = %previous,
                to = %next,
                "stream health changed"
            ),
        }
        Some(next)
    }
}
