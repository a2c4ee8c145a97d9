//! 检测分发 (fire-and-forget, at most one pass in flight)

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{clamp_detection_fps, CombinedFrame, DetectionConfig, DetectionHandler};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Upper bound on waiting for an in-flight detection pass at shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one dispatch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched,
    /// Previous pass still running
    SkippedBusy,
    /// Inside the minimum interval for the configured fps
    SkippedRate,
    Disabled,
    NoConsumer,
    /// Called outside a Tokio runtime
    NoRuntime,
}

impl DispatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Dispatched => "dispatched",
            Self::SkippedBusy => "skipped_busy",
            Self::SkippedRate => "skipped_rate",
            Self::Disabled => "disabled",
            Self::NoConsumer => "no_consumer",
            Self::NoRuntime => "no_runtime",
        }
    }
}

/// 检测分发计数快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DetectionStats {
    pub dispatched: u64,
    pub skipped_busy: u64,
    pub skipped_rate: u64,
    pub disabled: u64,
}

/// Operator-facing detection switch, shared with the CLI
#[derive(Debug)]
pub struct DetectionControl {
    enabled: AtomicBool,
    /// f64 bits
    fps: AtomicU64,
    busy: AtomicBool,
    /// f64 bits of the last dispatch time, NaN before the first one
    last_dispatch: AtomicU64,
    dispatched: AtomicU64,
    skipped_busy: AtomicU64,
    skipped_rate: AtomicU64,
    disabled: AtomicU64,
}

impl DetectionControl {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            enabled: AtomicBool::new(config.enabled),
            fps: AtomicU64::new(config.clamped_fps().to_bits()),
            busy: AtomicBool::new(false),
            last_dispatch: AtomicU64::new(f64::NAN.to_bits()),
            dispatched: AtomicU64::new(0),
            skipped_busy: AtomicU64::new(0),
            skipped_rate: AtomicU64::new(0),
            disabled: AtomicU64::new(0),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        debug!(enabled, "detection dispatch toggled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Set the detection rate; returns the clamped value
    pub fn set_fps(&self, fps: f64) -> f64 {
        let fps = clamp_detection_fps(fps);
        self.fps.store(fps.to_bits(), Ordering::SeqCst);
        fps
    }

    pub fn fps(&self) -> f64 {
        f64::from_bits(self.fps.load(Ordering::SeqCst))
    }

    /// A detection pass is in flight
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> DetectionStats {
        DetectionStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            skipped_busy: self.skipped_busy.load(Ordering::Relaxed),
            skipped_rate: self.skipped_rate.load(Ordering::Relaxed),
            disabled: self.disabled.load(Ordering::Relaxed),
        }
    }

    fn min_interval(&self) -> f64 {
        1.0 / self.fps()
    }

    fn within_interval(&self, now: f64) -> bool {
        let last = f64::from_bits(self.last_dispatch.load(Ordering::SeqCst));
        // NaN comparisons are false before the first dispatch
        now - last < self.min_interval()
    }

    fn count(&self, outcome: DispatchOutcome) {
        let counter = match outcome {
            DispatchOutcome::Dispatched => &self.dispatched,
            DispatchOutcome::SkippedBusy => &self.skipped_busy,
            DispatchOutcome::SkippedRate => &self.skipped_rate,
            DispatchOutcome::Disabled => &self.disabled,
            DispatchOutcome::NoConsumer | DispatchOutcome::NoRuntime => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        observability::record_detection_dispatch(outcome.label());
    }
}

/// Clears the busy flag when the pass ends, panics included
struct BusyGuard(Arc<DetectionControl>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.busy.store(false, Ordering::SeqCst);
    }
}

/// Hands combined frames to the registered detection consumer
pub(crate) struct DetectionDispatcher {
    handler: Option<Arc<dyn DetectionHandler>>,
    control: Arc<DetectionControl>,
    in_flight: Option<JoinHandle<()>>,
}

impl DetectionDispatcher {
    pub fn new(control: Arc<DetectionControl>) -> Self {
        Self {
            handler: None,
            control,
            in_flight: None,
        }
    }

    pub fn set_handler(&mut self, handler: Arc<dyn DetectionHandler>) {
        self.handler = Some(handler);
    }

    pub fn has_consumer(&self) -> bool {
        self.handler.is_some()
    }

    pub fn control(&self) -> &Arc<DetectionControl> {
        &self.control
    }

    /// Dispatch `frame` unless disabled, rate limited or busy
    pub fn try_dispatch(&mut self, frame: Arc<CombinedFrame>, now: f64) -> DispatchOutcome {
        let outcome = self.dispatch_inner(frame, now);
        self.control.count(outcome);
        trace!(outcome = outcome.label(), "detection dispatch");
        outcome
    }

    fn dispatch_inner(&mut self, frame: Arc<CombinedFrame>, now: f64) -> DispatchOutcome {
        let Some(handler) = self.handler.clone() else {
            return DispatchOutcome::NoConsumer;
        };
        if !self.control.is_enabled() {
            return DispatchOutcome::Disabled;
        }
        if self.control.within_interval(now) {
            return DispatchOutcome::SkippedRate;
        }
        if self
            .control
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return DispatchOutcome::SkippedBusy;
        }

        let guard = BusyGuard(self.control.clone());
        let Ok(runtime) = Handle::try_current() else {
            return DispatchOutcome::NoRuntime;
        };

        self.control
            .last_dispatch
            .store(now.to_bits(), Ordering::SeqCst);
        self.in_flight = Some(runtime.spawn_blocking(move || {
            let _guard = guard;
            handler.process(frame);
        }));
        DispatchOutcome::Dispatched
    }

    /// Disable dispatch and wait (bounded) for the in-flight pass
    pub async fn drain(&mut self) {
        self.control.set_enabled(false);
        if let Some(task) = self.in_flight.take() {
            match tokio::time::timeout(DRAIN_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "detection pass failed"),
                Err(_) => warn!(
                    timeout_s = DRAIN_TIMEOUT.as_secs_f64(),
                    "detection pass still running at shutdown"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ImageData;
    use std::sync::Mutex;

    fn frame(frame_id: u64) -> Arc<CombinedFrame> {
        Arc::new(CombinedFrame {
            frame_id,
            pts: 0.0,
            produced_at: 0.0,
            image: ImageData::filled(4, 4, [0, 0, 0]),
            tiles: Vec::new(),
        })
    }

    /// Records frame ids; blocks until released when `gate` is set
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<u64>>,
        gate: Mutex<Option<std::sync::mpsc::Receiver<()>>>,
    }

    impl DetectionHandler for Recorder {
        fn process(&self, frame: Arc<CombinedFrame>) {
            let gate = self.gate.lock().unwrap().take();
            if let Some(rx) = gate {
                let _ = rx.recv();
            }
            self.seen.lock().unwrap().push(frame.frame_id);
        }
    }

    fn dispatcher(fps: f64) -> (DetectionDispatcher, Arc<Recorder>) {
        let config = DetectionConfig {
            enabled: true,
            fps,
            ..Default::default()
        };
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher = DetectionDispatcher::new(Arc::new(DetectionControl::new(&config)));
        dispatcher.set_handler(recorder.clone());
        (dispatcher, recorder)
    }

    #[tokio::test]
    async fn test_no_consumer_or_disabled() {
        let control = Arc::new(DetectionControl::new(&DetectionConfig::default()));
        let mut bare = DetectionDispatcher::new(control);
        assert_eq!(bare.try_dispatch(frame(0), 0.0), DispatchOutcome::NoConsumer);

        let (mut dispatcher, _) = dispatcher(10.0);
        dispatcher.control().set_enabled(false);
        assert_eq!(dispatcher.try_dispatch(frame(0), 0.0), DispatchOutcome::Disabled);
        assert_eq!(dispatcher.control().stats().disabled, 1);
    }

    #[tokio::test]
    async fn test_busy_skips_until_pass_finishes() {
        let (mut dispatcher, recorder) = dispatcher(30.0);
        let (tx, rx) = std::sync::mpsc::channel();
        *recorder.gate.lock().unwrap() = Some(rx);

        assert_eq!(dispatcher.try_dispatch(frame(1), 0.0), DispatchOutcome::Dispatched);
        assert!(dispatcher.control().is_busy());
        assert_eq!(dispatcher.try_dispatch(frame(2), 1.0), DispatchOutcome::SkippedBusy);

        tx.send(()).unwrap();
        dispatcher.in_flight.take().unwrap().await.unwrap();
        assert!(!dispatcher.control().is_busy());

        assert_eq!(dispatcher.try_dispatch(frame(3), 2.0), DispatchOutcome::Dispatched);
        dispatcher.drain().await;
        assert_eq!(*recorder.seen.lock().unwrap(), vec![1, 3]);

        let stats = dispatcher.control().stats();
        assert_eq!(stats.dispatched, 2);
        assert_eq!(stats.skipped_busy, 1);
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let (mut dispatcher, _) = dispatcher(10.0);
        assert_eq!(dispatcher.try_dispatch(frame(0), 1.0), DispatchOutcome::Dispatched);
        dispatcher.in_flight.take().unwrap().await.unwrap();

        // 10 Hz → 100 ms minimum spacing
        assert_eq!(dispatcher.try_dispatch(frame(1), 1.05), DispatchOutcome::SkippedRate);
        assert_eq!(dispatcher.try_dispatch(frame(2), 1.1), DispatchOutcome::Dispatched);
        assert_eq!(dispatcher.control().stats().skipped_rate, 1);
    }

    #[test]
    fn test_fps_clamped() {
        let control = DetectionControl::new(&DetectionConfig::default());
        assert_eq!(control.fps(), 10.0);
        assert_eq!(control.set_fps(90.0), 30.0);
        assert_eq!(control.set_fps(0.2), 1.0);
    }

    #[test]
    fn test_no_runtime_releases_busy() {
        let (mut dispatcher, _) = dispatcher(10.0);
        assert_eq!(dispatcher.try_dispatch(frame(0), 0.0), DispatchOutcome::NoRuntime);
        assert!(!dispatcher.control().is_busy());
    }
}
