//! Background open / reconnect supervisor
//!
//! One task per stream at a time. Opening may block on network I/O, so it
//! runs on the blocking pool; the delivery loop never waits for it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{ContractError, SharedClock, StreamSource, SyncEngineConfig};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::health::{lock_health, HealthEvent, SharedHealth};

/// Backoff settings for one stream
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReconnectPolicy {
    /// Wait before the first reopen
    pub backoff: Duration,
    /// Wait between failed reopens
    pub retry_interval: Duration,
    /// Init deadline granted after a reopen (s)
    pub reopen_timeout_s: f64,
}

impl ReconnectPolicy {
    pub fn from_config(config: &SyncEngineConfig) -> Result<Self, ContractError> {
        Ok(Self {
            backoff: config.reconnect_backoff()?,
            retry_interval: config.reconnect_retry_interval()?,
            reopen_timeout_s: config.reconnect_init_timeout_s,
        })
    }
}

/// Where the supervisor starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SuperviseMode {
    /// First open right after `initialize`
    InitialOpen,
    /// Stream is in Error/Timeout; back off, then reopen
    Reconnect,
}

/// Everything a supervisor task needs, detached from the engine
pub(crate) struct ReconnectContext {
    pub source: Arc<dyn StreamSource>,
    pub health: SharedHealth,
    pub clock: SharedClock,
    pub running: Arc<AtomicBool>,
    pub policy: ReconnectPolicy,
    /// One permit per stream; held by the blocking open until it returns
    pub open_gate: Arc<Semaphore>,
}

impl ReconnectContext {
    fn stream_id(&self) -> u32 {
        self.source.descriptor().id
    }

    fn apply(&self, event: HealthEvent) {
        if let Some(state) = lock_health(&self.health).apply(event) {
            observability::record_stream_health(self.stream_id(), state);
        }
    }
}

/// Open (or reopen) a stream until it succeeds or the engine stops
#[instrument(name = "stream_supervisor", skip(ctx), fields(stream_id = ctx.stream_id()))]
pub(crate) async fn supervise(ctx: ReconnectContext, mode: SuperviseMode) {
    if mode == SuperviseMode::InitialOpen {
        match open_blocking(&ctx, false).await {
            Ok(()) => {
                debug!("stream opened");
                return;
            }
            Err(e) => {
                if !ctx.running.load(Ordering::SeqCst) {
                    return;
                }
                warn!(error = %e, "initial open failed, retrying in background");
                let mut health = lock_health(&ctx.health);
                if let Some(state) = health.apply(HealthEvent::OpenFailed {
                    reason: e.to_string(),
                }) {
                    observability::record_stream_health(ctx.stream_id(), state);
                }
                // this task owns the retry loop from here on
                health.take_reconnect_request();
            }
        }
    }

    let mut wait = ctx.policy.backoff;
    let mut attempt: u32 = 0;
    loop {
        tokio::time::sleep(wait).await;
        if !ctx.running.load(Ordering::SeqCst) {
            return;
        }

        attempt += 1;
        ctx.apply(HealthEvent::RetryStarted);
        debug!(attempt, "reopening stream");

        let result = open_blocking(&ctx, true).await;
        if !ctx.running.load(Ordering::SeqCst) {
            return;
        }

        match result {
            Ok(()) => {
                let deadline = ctx.clock.now() + ctx.policy.reopen_timeout_s;
                ctx.apply(HealthEvent::Reopened { deadline });
                observability::record_reconnect_attempt(ctx.stream_id(), true);
                info!(attempt, "stream reopened");
                return;
            }
            Err(e) => {
                observability::record_reconnect_attempt(ctx.stream_id(), false);
                warn!(
                    attempt,
                    error = %e,
                    retry_in_s = ctx.policy.retry_interval.as_secs_f64(),
                    "reopen failed"
                );
                let mut health = lock_health(&ctx.health);
                if let Some(state) = health.apply(HealthEvent::OpenFailed {
                    reason: e.to_string(),
                }) {
                    observability::record_stream_health(ctx.stream_id(), state);
                }
                health.take_reconnect_request();
                wait = ctx.policy.retry_interval;
            }
        }
    }
}

/// Run `close` + `open` on the blocking pool
///
/// The stream's open permit moves into the blocking call, so an aborted
/// supervisor still serializes with its successor until `open` returns.
/// An initial open finds the source already open when an earlier,
/// abandoned attempt got there first. A stream that finishes opening after
/// the engine stopped is closed again before the blocking call returns.
async fn open_blocking(ctx: &ReconnectContext, close_first: bool) -> Result<(), ContractError> {
    let source = ctx.source.clone();
    let running = ctx.running.clone();
    let stream_id = ctx.stream_id();

    let permit = ctx
        .open_gate
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ContractError::stream_open(stream_id, "open gate closed"))?;
    if !running.load(Ordering::SeqCst) {
        return Err(ContractError::stream_open(stream_id, "engine stopped"));
    }

    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        if close_first {
            source.close();
        } else if source.is_open() {
            return Ok(());
        }
        let result = source.open();
        if !running.load(Ordering::SeqCst) {
            source.close();
        }
        result
    })
    .await
    .map_err(|e| ContractError::stream_open(stream_id, format!("open task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::StreamHealth;
    use contracts::{ManualClock, StreamDescriptor, StreamHealthState};
    use ingestion::{ScriptedHandle, ScriptedSource};
    use std::sync::Mutex;

    fn context(state_error: bool) -> (ReconnectContext, ScriptedHandle, Arc<ManualClock>) {
        let (source, handle) = ScriptedSource::new(StreamDescriptor::new(2, "scripted://cam2"));
        let clock = ManualClock::new();
        clock.set(100.0);
        let mut health = StreamHealth::new(2, 130.0);
        if state_error {
            health.apply(HealthEvent::FrameRead);
            health.apply(HealthEvent::ReadFailed {
                reason: "eof".into(),
            });
            health.take_reconnect_request();
        }
        let ctx = ReconnectContext {
            source: Arc::new(source),
            health: Arc::new(Mutex::new(health)),
            clock: clock.clone(),
            running: Arc::new(AtomicBool::new(true)),
            policy: ReconnectPolicy::from_config(&SyncEngineConfig::default()).unwrap(),
            open_gate: Arc::new(Semaphore::new(1)),
        };
        (ctx, handle, clock)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_waits_for_backoff() {
        let (ctx, handle, _clock) = context(true);
        let health = ctx.health.clone();
        let task = tokio::spawn(supervise(ctx, SuperviseMode::Reconnect));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(handle.open_calls(), 0);
        assert_eq!(lock_health(&health).state(), StreamHealthState::Error);

        task.await.unwrap();
        assert_eq!(handle.open_calls(), 1);
        let health = lock_health(&health);
        assert_eq!(health.state(), StreamHealthState::Initializing);
        assert_eq!(health.epoch(), 1);
        // reopen deadline = clock + reconnect_init_timeout_s
        assert_eq!(health.deadline(), Some(160.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reopen_escalates_to_retry_interval() {
        let (ctx, handle, _clock) = context(true);
        handle.fail_next_open("refused");
        let health = ctx.health.clone();
        let started = tokio::time::Instant::now();

        supervise(ctx, SuperviseMode::Reconnect).await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(35), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(36), "elapsed {elapsed:?}");
        assert_eq!(handle.open_calls(), 2);
        assert_eq!(lock_health(&health).state(), StreamHealthState::Initializing);
    }

    #[tokio::test]
    async fn test_initial_open_success_keeps_initializing() {
        let (ctx, handle, _clock) = context(false);
        let health = ctx.health.clone();

        supervise(ctx, SuperviseMode::InitialOpen).await;

        assert!(handle.is_open());
        assert_eq!(lock_health(&health).state(), StreamHealthState::Initializing);
        assert_eq!(lock_health(&health).epoch(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_open_failure_retries_in_background() {
        let (ctx, handle, _clock) = context(false);
        handle.fail_next_open("no route to host");
        let health = ctx.health.clone();

        supervise(ctx, SuperviseMode::InitialOpen).await;

        assert_eq!(handle.open_calls(), 2);
        assert!(handle.is_open());
        assert_eq!(lock_health(&health).state(), StreamHealthState::Initializing);
        assert!(!lock_health(&health).reconnect_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_engine_stops() {
        let (ctx, handle, _clock) = context(true);
        let running = ctx.running.clone();
        let task = tokio::spawn(supervise(ctx, SuperviseMode::Reconnect));

        tokio::time::sleep(Duration::from_secs(1)).await;
        running.store(false, Ordering::SeqCst);
        task.await.unwrap();

        assert_eq!(handle.open_calls(), 0);
    }
}
