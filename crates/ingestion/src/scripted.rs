//! Scripted source
//!
//! Deterministic stream for tests and replay tooling: frames and failures
//! are queued through a [`ScriptedHandle`] and handed out one per `read`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{
    CapturedFrame, ContractError, ImageData, ReadOutcome, StreamDescriptor, StreamId, StreamSource,
};
use tracing::debug;

enum ScriptedRead {
    Frame(CapturedFrame),
    Fail(String),
}

#[derive(Default)]
struct ScriptState {
    open: bool,
    disconnected: bool,
    pending_open_failures: VecDeque<String>,
    reads: VecDeque<ScriptedRead>,
    next_sequence: u64,
    open_calls: u64,
    close_calls: u64,
}

fn lock(state: &Mutex<ScriptState>) -> MutexGuard<'_, ScriptState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Source whose behavior is fully driven by its handle
pub struct ScriptedSource {
    descriptor: StreamDescriptor,
    state: Arc<Mutex<ScriptState>>,
}

/// Control side of a [`ScriptedSource`]
#[derive(Clone)]
pub struct ScriptedHandle {
    stream_id: StreamId,
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedSource {
    pub fn new(descriptor: StreamDescriptor) -> (Self, ScriptedHandle) {
        let state = Arc::new(Mutex::new(ScriptState::default()));
        let handle = ScriptedHandle {
            stream_id: descriptor.id,
            state: state.clone(),
        };
        (Self { descriptor, state }, handle)
    }
}

impl ScriptedHandle {
    /// Queue a frame captured at `timestamp`
    pub fn push_frame(&self, image: ImageData, timestamp: f64) {
        let mut state = lock(&self.state);
        state.next_sequence += 1;
        let frame = CapturedFrame {
            stream_id: self.stream_id,
            timestamp,
            sequence: state.next_sequence,
            image,
        };
        state.reads.push_back(ScriptedRead::Frame(frame));
    }

    /// Queue a solid-color frame
    pub fn push_solid(&self, width: u32, height: u32, rgb: [u8; 3], timestamp: f64) {
        self.push_frame(ImageData::filled(width, height, rgb), timestamp);
    }

    /// Queue one failing read
    pub fn fail_next_read(&self, message: impl Into<String>) {
        lock(&self.state)
            .reads
            .push_back(ScriptedRead::Fail(message.into()));
    }

    /// Every read fails until the next successful `open`
    pub fn disconnect(&self) {
        let mut state = lock(&self.state);
        state.disconnected = true;
        state.reads.clear();
    }

    /// Make the next `open` call fail
    pub fn fail_next_open(&self, message: impl Into<String>) {
        lock(&self.state)
            .pending_open_failures
            .push_back(message.into());
    }

    pub fn queued_reads(&self) -> usize {
        lock(&self.state).reads.len()
    }

    pub fn open_calls(&self) -> u64 {
        lock(&self.state).open_calls
    }

    pub fn close_calls(&self) -> u64 {
        lock(&self.state).close_calls
    }

    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }
}

impl StreamSource for ScriptedSource {
    fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    fn open(&self) -> Result<(), ContractError> {
        let mut state = lock(&self.state);
        state.open_calls += 1;
        if let Some(message) = state.pending_open_failures.pop_front() {
            state.open = false;
            return Err(ContractError::stream_open(self.descriptor.id, message));
        }
        state.open = true;
        state.disconnected = false;
        debug!(stream_id = self.descriptor.id, "scripted source opened");
        Ok(())
    }

    fn read(&self) -> ReadOutcome {
        let mut state = lock(&self.state);
        if !state.open {
            return ReadOutcome::Failed(ContractError::stream_read(
                self.descriptor.id,
                "stream not open",
            ));
        }
        if state.disconnected {
            return ReadOutcome::Failed(ContractError::stream_read(
                self.descriptor.id,
                "connection lost",
            ));
        }
        match state.reads.pop_front() {
            Some(ScriptedRead::Frame(frame)) => ReadOutcome::Frame(frame),
            Some(ScriptedRead::Fail(message)) => {
                ReadOutcome::Failed(ContractError::stream_read(self.descriptor.id, message))
            }
            None => ReadOutcome::Pending,
        }
    }

    fn close(&self) {
        let mut state = lock(&self.state);
        state.open = false;
        state.close_calls += 1;
    }

    fn is_open(&self) -> bool {
        let state = lock(&self.state);
        state.open && !state.disconnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> (ScriptedSource, ScriptedHandle) {
        ScriptedSource::new(StreamDescriptor::new(5, "scripted://cam5"))
    }

    #[test]
    fn test_reads_require_open() {
        let (source, handle) = source();
        handle.push_solid(2, 2, [1, 2, 3], 0.5);
        assert!(matches!(source.read(), ReadOutcome::Failed(_)));

        source.open().unwrap();
        match source.read() {
            ReadOutcome::Frame(frame) => {
                assert_eq!(frame.stream_id, 5);
                assert_eq!(frame.sequence, 1);
                assert_eq!(frame.timestamp, 0.5);
            }
            other => panic!("expected frame, got {other:?}"),
        }
        assert!(matches!(source.read(), ReadOutcome::Pending));
    }

    #[test]
    fn test_scripted_failures_in_order() {
        let (source, handle) = source();
        source.open().unwrap();
        handle.fail_next_read("glitch");
        handle.push_solid(2, 2, [0, 0, 0], 1.0);
        assert_eq!(handle.queued_reads(), 2);

        assert!(matches!(source.read(), ReadOutcome::Failed(_)));
        assert!(matches!(source.read(), ReadOutcome::Frame(_)));
        assert_eq!(handle.queued_reads(), 0);
    }

    #[test]
    fn test_disconnect_until_reopen() {
        let (source, handle) = source();
        source.open().unwrap();
        handle.disconnect();
        assert!(!source.is_open());
        assert!(matches!(source.read(), ReadOutcome::Failed(_)));

        handle.fail_next_open("refused");
        assert!(source.open().is_err());
        assert!(source.open().is_ok());
        assert!(source.is_open());
        assert_eq!(handle.open_calls(), 3);
    }
}
