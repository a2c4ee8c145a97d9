//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace:
//! stream and frame types, tracking/fusion data, configuration structs and
//! the traits at each seam (`StreamSource`, `Tracker`, `DetectionHandler`,
//! `MetadataSink`, `Clock`).
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - All timestamps are seconds (f64) read from a shared [`Clock`]
//! - Capture timestamps and engine cycle times come from the same clock,
//!   so delay arithmetic never mixes time bases

mod blueprint;
mod clock;
mod config;
mod error;
mod frame;
mod sink;
mod stream;
mod stream_source;
mod track_id;
mod tracker;
mod tracking;

pub use blueprint::*;
pub use clock::{Clock, ManualClock, MonotonicClock, SharedClock};
pub use config::*;
pub use error::*;
pub use frame::*;
pub use sink::*;
pub use stream::*;
pub use stream_source::{ReadOutcome, StreamSource};
pub use track_id::TrackId;
pub use tracker::{DetectionHandler, Tracker};
pub use tracking::*;
